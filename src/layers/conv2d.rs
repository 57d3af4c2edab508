//! 2D convolution layer implemented with explicit loops.
//!
//! Operates on flat buffers in NCHW layout: each sample is `channels *
//! height * width` contiguous values, channel-major. Weights use Xavier
//! uniform initialization over the kernel fan-in and fan-out.

use std::cell::RefCell;

use crate::layers::{Layer, ParamGrads};
use crate::utils::SimpleRng;

/// 2D convolutional layer with zero padding.
///
/// Spatial dimensions are fixed at construction so the layer can report its
/// input and output sizes and validate buffer lengths. Output dimensions
/// follow the usual formula `(in + 2 * padding - kernel) / stride + 1`.
pub struct Conv2DLayer {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    padding: isize,
    stride: usize,
    input_height: usize,
    input_width: usize,
    weights: Vec<f32>,
    biases: Vec<f32>,
    grad_weights: RefCell<Vec<f32>>,
    grad_biases: RefCell<Vec<f32>>,
}

impl Conv2DLayer {
    /// Create a convolution layer with Xavier-initialized weights and zero
    /// biases.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: isize,
        stride: usize,
        input_height: usize,
        input_width: usize,
        rng: &mut SimpleRng,
    ) -> Self {
        assert!(kernel_size > 0, "kernel_size must be positive");
        assert!(stride > 0, "stride must be positive");

        let fan_in = (in_channels * kernel_size * kernel_size) as f32;
        let fan_out = (out_channels * kernel_size * kernel_size) as f32;
        let limit = (6.0f32 / (fan_in + fan_out)).sqrt();

        let weight_count = out_channels * in_channels * kernel_size * kernel_size;
        let mut weights = vec![0.0f32; weight_count];
        for value in &mut weights {
            *value = rng.gen_range_f32(-limit, limit);
        }

        Self {
            in_channels,
            out_channels,
            kernel_size,
            padding,
            stride,
            input_height,
            input_width,
            weights,
            biases: vec![0.0f32; out_channels],
            grad_weights: RefCell::new(vec![0.0f32; weight_count]),
            grad_biases: RefCell::new(vec![0.0f32; out_channels]),
        }
    }

    pub fn output_height(&self) -> usize {
        ((self.input_height as isize + 2 * self.padding - self.kernel_size as isize)
            / self.stride as isize
            + 1) as usize
    }

    pub fn output_width(&self) -> usize {
        ((self.input_width as isize + 2 * self.padding - self.kernel_size as isize)
            / self.stride as isize
            + 1) as usize
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn biases(&self) -> &[f32] {
        &self.biases
    }
}

impl Layer for Conv2DLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let out_h = self.output_height();
        let out_w = self.output_width();
        let out_spatial = out_h * out_w;
        let in_spatial = self.input_height * self.input_width;

        assert_eq!(input.len(), batch_size * self.in_channels * in_spatial);
        assert_eq!(output.len(), batch_size * self.out_channels * out_spatial);

        for b in 0..batch_size {
            let in_base = b * (self.in_channels * in_spatial);
            let out_base_b = b * (self.out_channels * out_spatial);

            for oc in 0..self.out_channels {
                let bias = self.biases[oc];
                let out_base = out_base_b + oc * out_spatial;

                for oy in 0..out_h {
                    for ox in 0..out_w {
                        let mut sum = bias;

                        for ic in 0..self.in_channels {
                            let w_base =
                                (oc * self.in_channels + ic) * self.kernel_size * self.kernel_size;
                            let in_base_c = in_base + ic * in_spatial;

                            for ky in 0..self.kernel_size {
                                for kx in 0..self.kernel_size {
                                    let iy = oy as isize * self.stride as isize + ky as isize
                                        - self.padding;
                                    let ix = ox as isize * self.stride as isize + kx as isize
                                        - self.padding;

                                    if iy >= 0
                                        && iy < self.input_height as isize
                                        && ix >= 0
                                        && ix < self.input_width as isize
                                    {
                                        let in_idx =
                                            in_base_c + iy as usize * self.input_width + ix as usize;
                                        let w_idx = w_base + ky * self.kernel_size + kx;
                                        sum += input[in_idx] * self.weights[w_idx];
                                    }
                                }
                            }
                        }

                        output[out_base + oy * out_w + ox] = sum;
                    }
                }
            }
        }
    }

    fn backward(
        &self,
        input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        let out_h = self.output_height();
        let out_w = self.output_width();
        let out_spatial = out_h * out_w;
        let in_spatial = self.input_height * self.input_width;

        assert_eq!(grad_output.len(), batch_size * self.out_channels * out_spatial);
        assert_eq!(grad_input.len(), batch_size * self.in_channels * in_spatial);

        let mut grad_w = self.grad_weights.borrow_mut();
        let mut grad_b = self.grad_biases.borrow_mut();

        for v in grad_input.iter_mut() {
            *v = 0.0;
        }

        for b in 0..batch_size {
            let in_base = b * (self.in_channels * in_spatial);
            let g_base_b = b * (self.out_channels * out_spatial);

            for oc in 0..self.out_channels {
                let g_base = g_base_b + oc * out_spatial;

                for oy in 0..out_h {
                    for ox in 0..out_w {
                        grad_b[oc] += grad_output[g_base + oy * out_w + ox];
                    }
                }

                for ic in 0..self.in_channels {
                    let w_base = (oc * self.in_channels + ic) * self.kernel_size * self.kernel_size;
                    let in_base_c = in_base + ic * in_spatial;

                    for oy in 0..out_h {
                        for ox in 0..out_w {
                            let g = grad_output[g_base + oy * out_w + ox];

                            for ky in 0..self.kernel_size {
                                for kx in 0..self.kernel_size {
                                    let iy = oy as isize * self.stride as isize + ky as isize
                                        - self.padding;
                                    let ix = ox as isize * self.stride as isize + kx as isize
                                        - self.padding;

                                    if iy >= 0
                                        && iy < self.input_height as isize
                                        && ix >= 0
                                        && ix < self.input_width as isize
                                    {
                                        let in_idx =
                                            in_base_c + iy as usize * self.input_width + ix as usize;
                                        let w_idx = w_base + ky * self.kernel_size + kx;

                                        grad_w[w_idx] += g * input[in_idx];
                                        grad_input[in_idx] += g * self.weights[w_idx];
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    fn param_grads(&mut self) -> Vec<ParamGrads<'_>> {
        vec![
            ParamGrads {
                params: &mut self.weights,
                grads: self.grad_weights.get_mut(),
            },
            ParamGrads {
                params: &mut self.biases,
                grads: self.grad_biases.get_mut(),
            },
        ]
    }

    fn input_size(&self) -> usize {
        self.in_channels * self.input_height * self.input_width
    }

    fn output_size(&self) -> usize {
        self.out_channels * self.output_height() * self.output_width()
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}
