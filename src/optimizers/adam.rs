//! Adam (adaptive moment estimation) optimizer.

use crate::optimizers::Optimizer;

/// Adam optimizer with bias-corrected first and second moment estimates.
///
/// The update rule is:
///
/// ```text
/// m_t = β1 * m_{t-1} + (1 - β1) * gradient
/// v_t = β2 * v_{t-1} + (1 - β2) * gradient²
/// m_hat = m_t / (1 - β1^t)
/// v_hat = v_t / (1 - β2^t)
/// parameter = parameter - α * m_hat / (√v_hat + ε)
/// ```
///
/// Moment buffers are allocated lazily on the first `update` call and keyed to
/// that tensor's length; one `Adam` instance serves exactly one parameter
/// tensor.
///
/// # Reference
///
/// Kingma, D. P., & Ba, J. (2014). Adam: A method for stochastic optimization.
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    /// First moment estimates (momentum).
    m: Vec<f32>,
    /// Second moment estimates (adaptive learning rate).
    v: Vec<f32>,
    /// Time step counter for bias correction.
    t: usize,
}

impl Adam {
    /// Create a new Adam optimizer.
    ///
    /// The paper's defaults are `beta1 = 0.9`, `beta2 = 0.999`,
    /// `epsilon = 1e-8`.
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }
}

impl Optimizer for Adam {
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );

        if self.m.is_empty() {
            self.m = vec![0.0; parameters.len()];
            self.v = vec![0.0; parameters.len()];
        }
        assert_eq!(
            self.m.len(),
            parameters.len(),
            "Adam instance bound to a tensor of different length"
        );

        self.t += 1;
        let bias_correction1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - self.beta2.powi(self.t as i32);

        for i in 0..parameters.len() {
            self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * gradients[i];
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * gradients[i] * gradients[i];

            let m_hat = self.m[i] / bias_correction1;
            let v_hat = self.v[i] / bias_correction2;

            parameters[i] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }

    fn reset(&mut self) {
        self.m.clear();
        self.v.clear();
        self.t = 0;
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}
