//! Fully connected layer.

use std::cell::RefCell;

use crate::layers::{Layer, ParamGrads};
use crate::utils::SimpleRng;

/// Dense (fully connected) layer computing `y = x W + b`.
///
/// Weights are stored row-major as `input_size x output_size` and use Xavier
/// uniform initialization; biases start at zero.
pub struct DenseLayer {
    input_size: usize,
    output_size: usize,
    weights: Vec<f32>,
    biases: Vec<f32>,
    grad_weights: RefCell<Vec<f32>>,
    grad_biases: RefCell<Vec<f32>>,
}

impl DenseLayer {
    pub fn new(input_size: usize, output_size: usize, rng: &mut SimpleRng) -> Self {
        let limit = (6.0f32 / (input_size + output_size) as f32).sqrt();
        let mut weights = vec![0.0f32; input_size * output_size];
        for w in &mut weights {
            *w = rng.gen_range_f32(-limit, limit);
        }

        Self {
            input_size,
            output_size,
            weights,
            biases: vec![0.0f32; output_size],
            grad_weights: RefCell::new(vec![0.0f32; input_size * output_size]),
            grad_biases: RefCell::new(vec![0.0f32; output_size]),
        }
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn biases(&self) -> &[f32] {
        &self.biases
    }
}

impl Layer for DenseLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        assert_eq!(input.len(), batch_size * self.input_size);
        assert_eq!(output.len(), batch_size * self.output_size);

        for b in 0..batch_size {
            let in_row = &input[b * self.input_size..(b + 1) * self.input_size];
            let out_row = &mut output[b * self.output_size..(b + 1) * self.output_size];

            for j in 0..self.output_size {
                let mut sum = self.biases[j];
                for i in 0..self.input_size {
                    sum += in_row[i] * self.weights[i * self.output_size + j];
                }
                out_row[j] = sum;
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
        assert_eq!(grad_output.len(), batch_size * self.output_size);
        assert_eq!(grad_input.len(), batch_size * self.input_size);

        let mut grad_w = self.grad_weights.borrow_mut();
        let mut grad_b = self.grad_biases.borrow_mut();

        for v in grad_input.iter_mut() {
            *v = 0.0;
        }

        for b in 0..batch_size {
            let in_row = &input[b * self.input_size..(b + 1) * self.input_size];
            let g_row = &grad_output[b * self.output_size..(b + 1) * self.output_size];
            let gi_row = &mut grad_input[b * self.input_size..(b + 1) * self.input_size];

            for j in 0..self.output_size {
                let g = g_row[j];
                grad_b[j] += g;
                for i in 0..self.input_size {
                    grad_w[i * self.output_size + j] += g * in_row[i];
                    gi_row[i] += g * self.weights[i * self.output_size + j];
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
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}
