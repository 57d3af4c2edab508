//! Spatial batch normalization for convolutional feature maps.
//!
//! Normalizes each channel over the batch and spatial positions combined,
//! then applies learnable per-channel scale (gamma) and shift (beta).
//! During training it uses batch statistics and maintains running averages
//! via exponential moving average; during inference it normalizes with the
//! accumulated running statistics.
//!
//! # References
//!
//! Ioffe, S., & Szegedy, C. (2015). Batch Normalization: Accelerating Deep
//! Network Training by Reducing Internal Covariate Shift. ICML.

use std::cell::RefCell;

use crate::layers::{Layer, ParamGrads};

/// Per-channel batch normalization over NCHW feature maps.
///
/// Buffers are laid out as `batch * (channels * spatial)` with each channel's
/// `spatial` values contiguous. Statistics for channel `c` are computed over
/// all `batch_size * spatial` values of that channel.
pub struct BatchNorm2DLayer {
    channels: usize,
    spatial: usize,
    epsilon: f32,
    momentum: f32,
    training: bool,

    gamma: Vec<f32>,
    beta: Vec<f32>,

    grad_gamma: RefCell<Vec<f32>>,
    grad_beta: RefCell<Vec<f32>>,

    // Running statistics, updated during training, used during inference.
    running_mean: RefCell<Vec<f32>>,
    running_var: RefCell<Vec<f32>>,

    // Cached values from forward pass needed by backward.
    cached_normalized: RefCell<Vec<f32>>,
    cached_std: RefCell<Vec<f32>>,
}

impl BatchNorm2DLayer {
    /// Create a new spatial batch norm layer.
    ///
    /// Gamma starts at 1.0 and beta at 0.0, so the layer is initially an
    /// identity transform up to normalization. Typical hyperparameters are
    /// `epsilon = 1e-5` and `momentum = 0.9`.
    pub fn new(channels: usize, spatial: usize, epsilon: f32, momentum: f32) -> Self {
        assert!(epsilon > 0.0, "epsilon must be positive");
        assert!(
            (0.0..=1.0).contains(&momentum),
            "momentum must be in range [0.0, 1.0]"
        );

        Self {
            channels,
            spatial,
            epsilon,
            momentum,
            training: true,

            gamma: vec![1.0f32; channels],
            beta: vec![0.0f32; channels],

            grad_gamma: RefCell::new(vec![0.0f32; channels]),
            grad_beta: RefCell::new(vec![0.0f32; channels]),

            running_mean: RefCell::new(vec![0.0f32; channels]),
            running_var: RefCell::new(vec![0.0f32; channels]),

            cached_normalized: RefCell::new(Vec::new()),
            cached_std: RefCell::new(Vec::new()),
        }
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn gamma(&self) -> &[f32] {
        &self.gamma
    }

    pub fn beta(&self) -> &[f32] {
        &self.beta
    }

    pub fn running_mean(&self) -> Vec<f32> {
        self.running_mean.borrow().clone()
    }

    pub fn running_var(&self) -> Vec<f32> {
        self.running_var.borrow().clone()
    }
}

impl Layer for BatchNorm2DLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let sample_size = self.channels * self.spatial;
        let total = batch_size * sample_size;
        assert_eq!(input.len(), total, "input len mismatch in batchnorm forward");
        assert_eq!(output.len(), total, "output len mismatch in batchnorm forward");

        if self.training {
            let count = (batch_size * self.spatial) as f32;
            let mut batch_mean = vec![0.0f32; self.channels];
            let mut batch_var = vec![0.0f32; self.channels];

            for b in 0..batch_size {
                for c in 0..self.channels {
                    let base = b * sample_size + c * self.spatial;
                    for s in 0..self.spatial {
                        batch_mean[c] += input[base + s];
                    }
                }
            }
            for mean in &mut batch_mean {
                *mean /= count;
            }

            for b in 0..batch_size {
                for c in 0..self.channels {
                    let base = b * sample_size + c * self.spatial;
                    for s in 0..self.spatial {
                        let diff = input[base + s] - batch_mean[c];
                        batch_var[c] += diff * diff;
                    }
                }
            }
            for var in &mut batch_var {
                *var /= count;
            }

            let std: Vec<f32> = batch_var
                .iter()
                .map(|&v| (v + self.epsilon).sqrt())
                .collect();

            let mut normalized = vec![0.0f32; total];
            for b in 0..batch_size {
                for c in 0..self.channels {
                    let base = b * sample_size + c * self.spatial;
                    for s in 0..self.spatial {
                        let idx = base + s;
                        normalized[idx] = (input[idx] - batch_mean[c]) / std[c];
                        output[idx] = self.gamma[c] * normalized[idx] + self.beta[c];
                    }
                }
            }

            // running = momentum * running + (1 - momentum) * batch
            let mut running_mean = self.running_mean.borrow_mut();
            let mut running_var = self.running_var.borrow_mut();
            for c in 0..self.channels {
                running_mean[c] =
                    self.momentum * running_mean[c] + (1.0 - self.momentum) * batch_mean[c];
                running_var[c] =
                    self.momentum * running_var[c] + (1.0 - self.momentum) * batch_var[c];
            }

            *self.cached_normalized.borrow_mut() = normalized;
            *self.cached_std.borrow_mut() = std;
        } else {
            let running_mean = self.running_mean.borrow();
            let running_var = self.running_var.borrow();
            for b in 0..batch_size {
                for c in 0..self.channels {
                    let base = b * sample_size + c * self.spatial;
                    let inv_std = 1.0 / (running_var[c] + self.epsilon).sqrt();
                    for s in 0..self.spatial {
                        let idx = base + s;
                        let normalized = (input[idx] - running_mean[c]) * inv_std;
                        output[idx] = self.gamma[c] * normalized + self.beta[c];
                    }
                }
            }
        }
    }

    fn backward(
        &self,
        _input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        let sample_size = self.channels * self.spatial;
        let total = batch_size * sample_size;
        assert_eq!(grad_output.len(), total, "grad_output len mismatch in batchnorm");
        assert_eq!(grad_input.len(), total, "grad_input len mismatch in batchnorm");

        if !self.training {
            // Inference mode: gradient passes through with gamma scaling.
            let running_var = self.running_var.borrow();
            for b in 0..batch_size {
                for c in 0..self.channels {
                    let base = b * sample_size + c * self.spatial;
                    let inv_std = 1.0 / (running_var[c] + self.epsilon).sqrt();
                    for s in 0..self.spatial {
                        let idx = base + s;
                        grad_input[idx] = grad_output[idx] * self.gamma[c] * inv_std;
                    }
                }
            }
            return;
        }

        let normalized = self.cached_normalized.borrow();
        let std = self.cached_std.borrow();
        assert_eq!(
            normalized.len(),
            total,
            "backward called without matching forward"
        );

        let mut grad_gamma = self.grad_gamma.borrow_mut();
        let mut grad_beta = self.grad_beta.borrow_mut();

        let count = (batch_size * self.spatial) as f32;

        // Per-channel sums of dy and dy * x_norm.
        let mut sum_dy = vec![0.0f32; self.channels];
        let mut sum_dy_xnorm = vec![0.0f32; self.channels];
        for b in 0..batch_size {
            for c in 0..self.channels {
                let base = b * sample_size + c * self.spatial;
                for s in 0..self.spatial {
                    let idx = base + s;
                    sum_dy[c] += grad_output[idx];
                    sum_dy_xnorm[c] += grad_output[idx] * normalized[idx];
                }
            }
        }

        for c in 0..self.channels {
            grad_gamma[c] += sum_dy_xnorm[c];
            grad_beta[c] += sum_dy[c];
        }

        // dx = (gamma / std) * (dy - mean(dy) - x_norm * mean(dy * x_norm))
        for b in 0..batch_size {
            for c in 0..self.channels {
                let base = b * sample_size + c * self.spatial;
                let scale = self.gamma[c] / std[c];
                let mean_dy = sum_dy[c] / count;
                let mean_dy_xnorm = sum_dy_xnorm[c] / count;
                for s in 0..self.spatial {
                    let idx = base + s;
                    grad_input[idx] =
                        scale * (grad_output[idx] - mean_dy - normalized[idx] * mean_dy_xnorm);
                }
            }
        }
    }

    fn param_grads(&mut self) -> Vec<ParamGrads<'_>> {
        vec![
            ParamGrads {
                params: &mut self.gamma,
                grads: self.grad_gamma.get_mut(),
            },
            ParamGrads {
                params: &mut self.beta,
                grads: self.grad_beta.get_mut(),
            },
        ]
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn input_size(&self) -> usize {
        self.channels * self.spatial
    }

    fn output_size(&self) -> usize {
        self.channels * self.spatial
    }

    fn parameter_count(&self) -> usize {
        2 * self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batchnorm2d_creation() {
        let layer = BatchNorm2DLayer::new(32, 100, 1e-5, 0.9);
        assert_eq!(layer.input_size(), 3200);
        assert_eq!(layer.output_size(), 3200);
        assert_eq!(layer.parameter_count(), 64);
        assert!(layer.is_training());
    }

    #[test]
    #[should_panic(expected = "epsilon must be positive")]
    fn test_batchnorm2d_invalid_epsilon() {
        let _layer = BatchNorm2DLayer::new(4, 9, 0.0, 0.9);
    }

    #[test]
    #[should_panic(expected = "momentum must be in range [0.0, 1.0]")]
    fn test_batchnorm2d_invalid_momentum() {
        let _layer = BatchNorm2DLayer::new(4, 9, 1e-5, 1.5);
    }

    #[test]
    fn test_batchnorm2d_normalizes_per_channel() {
        let mut layer = BatchNorm2DLayer::new(1, 2, 1e-5, 0.9);
        layer.set_training(true);

        // Channel values across batch and spatial: [0, 2, 4, 6], mean 3,
        // var 5, so normalized values are symmetric around zero.
        let input = vec![0.0f32, 2.0, 4.0, 6.0];
        let mut output = vec![0.0f32; 4];
        layer.forward(&input, &mut output, 2);

        let mean: f32 = output.iter().sum::<f32>() / 4.0;
        let var: f32 = output.iter().map(|&x| (x - mean) * (x - mean)).sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-5, "mean should be ~0, got {}", mean);
        assert!((var - 1.0).abs() < 1e-3, "variance should be ~1, got {}", var);
    }

    #[test]
    fn test_batchnorm2d_channels_independent() {
        let mut layer = BatchNorm2DLayer::new(2, 2, 1e-5, 0.9);
        layer.set_training(true);

        // Channel 0 has large values, channel 1 small ones; both normalize
        // to zero mean.
        let input = vec![
            100.0f32, 102.0, 0.1, 0.3, // sample 0: c0, c1
            104.0, 106.0, 0.5, 0.7, // sample 1
        ];
        let mut output = vec![0.0f32; 8];
        layer.forward(&input, &mut output, 2);

        let c0_mean = (output[0] + output[1] + output[4] + output[5]) / 4.0;
        let c1_mean = (output[2] + output[3] + output[6] + output[7]) / 4.0;
        assert!(c0_mean.abs() < 1e-4);
        assert!(c1_mean.abs() < 1e-4);
    }

    #[test]
    fn test_batchnorm2d_running_statistics() {
        let mut layer = BatchNorm2DLayer::new(1, 2, 1e-5, 0.9);
        layer.set_training(true);

        // Values [0, 2, 4, 6]: batch mean 3.0, batch var 5.0.
        let input = vec![0.0f32, 2.0, 4.0, 6.0];
        let mut output = vec![0.0f32; 4];
        layer.forward(&input, &mut output, 2);

        // running = 0.9 * 0 + 0.1 * batch
        let running_mean = layer.running_mean();
        let running_var = layer.running_var();
        assert!((running_mean[0] - 0.3).abs() < 1e-5);
        assert!((running_var[0] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_batchnorm2d_inference_uses_running_stats() {
        let mut layer = BatchNorm2DLayer::new(1, 2, 1e-5, 0.9);

        layer.set_training(true);
        let train_input = vec![0.0f32, 2.0, 4.0, 6.0];
        let mut train_output = vec![0.0f32; 4];
        layer.forward(&train_input, &mut train_output, 2);

        layer.set_training(false);
        let input = vec![1.0f32, 2.0];
        let mut first = vec![0.0f32; 2];
        let mut second = vec![0.0f32; 2];
        layer.forward(&input, &mut first, 1);
        layer.forward(&input, &mut second, 1);

        // Inference is deterministic and does not drift running stats.
        assert_eq!(first, second);
    }

    #[test]
    fn test_batchnorm2d_backward_gradients() {
        let mut layer = BatchNorm2DLayer::new(2, 2, 1e-5, 0.9);
        layer.set_training(true);

        let input = vec![0.0f32, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let mut output = vec![0.0f32; 8];
        layer.forward(&input, &mut output, 2);

        let grad_output = vec![1.0f32, 0.5, 2.0, 1.5, 0.25, 0.75, 1.25, 1.75];
        let mut grad_input = vec![0.0f32; 8];
        layer.backward(&input, &grad_output, &mut grad_input, 2);

        assert!(grad_input.iter().all(|&g| g.is_finite()));
        let grad_beta = layer.grad_beta.borrow();
        assert!(grad_beta.iter().any(|&g| g.abs() > 1e-10));
    }

    #[test]
    fn test_batchnorm2d_uniform_grad_cancels() {
        let mut layer = BatchNorm2DLayer::new(1, 2, 1e-5, 0.9);
        layer.set_training(true);

        let input = vec![0.0f32, 1.0, 2.0, 3.0];
        let mut output = vec![0.0f32; 4];
        layer.forward(&input, &mut output, 2);

        // A constant upstream gradient is removed by the mean subtraction.
        let grad_output = vec![1.0f32; 4];
        let mut grad_input = vec![0.0f32; 4];
        layer.backward(&input, &grad_output, &mut grad_input, 2);

        for &g in &grad_input {
            assert!(g.abs() < 1e-4, "expected near-zero gradient, got {}", g);
        }
    }
}
