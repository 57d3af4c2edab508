//! Vanilla stochastic gradient descent.

use crate::optimizers::Optimizer;

/// Stateless SGD: `parameter = parameter - learning_rate * gradient`.
pub struct Sgd {
    learning_rate: f32,
}

impl Sgd {
    /// Create a new SGD optimizer with the given learning rate.
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );
        for (param, &grad) in parameters.iter_mut().zip(gradients.iter()) {
            *param -= self.learning_rate * grad;
        }
    }

    fn reset(&mut self) {
        // No internal state.
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}
