//! 2x2 max pooling over NCHW feature maps.

use std::cell::RefCell;

use crate::layers::Layer;

/// Max pooling layer with square window and stride equal to the window size.
///
/// Output dimensions floor: a 25x25 input pooled by 2 yields 12x12, with the
/// trailing row and column ignored. The argmax position inside each window is
/// recorded during forward so backward can route the gradient to the winning
/// input only.
pub struct MaxPool2DLayer {
    channels: usize,
    input_height: usize,
    input_width: usize,
    pool: usize,
    // Argmax per output cell, encoded as dy * pool + dx within the window.
    indices: RefCell<Vec<u8>>,
}

impl MaxPool2DLayer {
    pub fn new(channels: usize, input_height: usize, input_width: usize, pool: usize) -> Self {
        assert!(pool > 0, "pool size must be positive");
        assert!(
            pool * pool <= u8::MAX as usize + 1,
            "pool window too large for index encoding"
        );
        Self {
            channels,
            input_height,
            input_width,
            pool,
            indices: RefCell::new(Vec::new()),
        }
    }

    pub fn output_height(&self) -> usize {
        self.input_height / self.pool
    }

    pub fn output_width(&self) -> usize {
        self.input_width / self.pool
    }
}

impl Layer for MaxPool2DLayer {
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) {
        let out_h = self.output_height();
        let out_w = self.output_width();
        let in_spatial = self.input_height * self.input_width;
        let out_spatial = out_h * out_w;

        assert_eq!(input.len(), batch_size * self.channels * in_spatial);
        assert_eq!(output.len(), batch_size * self.channels * out_spatial);

        let mut indices = self.indices.borrow_mut();
        indices.clear();
        indices.resize(batch_size * self.channels * out_spatial, 0);

        for b in 0..batch_size {
            for c in 0..self.channels {
                let in_base = (b * self.channels + c) * in_spatial;
                let out_base = (b * self.channels + c) * out_spatial;

                for oy in 0..out_h {
                    for ox in 0..out_w {
                        let iy0 = oy * self.pool;
                        let ix0 = ox * self.pool;

                        let mut best = f32::NEG_INFINITY;
                        let mut best_idx = 0u8;
                        for dy in 0..self.pool {
                            for dx in 0..self.pool {
                                let value = input
                                    [in_base + (iy0 + dy) * self.input_width + (ix0 + dx)];
                                if value > best {
                                    best = value;
                                    best_idx = (dy * self.pool + dx) as u8;
                                }
                            }
                        }

                        let out_idx = out_base + oy * out_w + ox;
                        output[out_idx] = best;
                        indices[out_idx] = best_idx;
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
        let out_h = self.output_height();
        let out_w = self.output_width();
        let in_spatial = self.input_height * self.input_width;
        let out_spatial = out_h * out_w;

        assert_eq!(grad_output.len(), batch_size * self.channels * out_spatial);
        assert_eq!(grad_input.len(), batch_size * self.channels * in_spatial);

        let indices = self.indices.borrow();
        assert_eq!(
            indices.len(),
            grad_output.len(),
            "backward called without matching forward"
        );

        for v in grad_input.iter_mut() {
            *v = 0.0;
        }

        for b in 0..batch_size {
            for c in 0..self.channels {
                let in_base = (b * self.channels + c) * in_spatial;
                let out_base = (b * self.channels + c) * out_spatial;

                for oy in 0..out_h {
                    for ox in 0..out_w {
                        let out_idx = out_base + oy * out_w + ox;
                        let win = indices[out_idx] as usize;
                        let dy = win / self.pool;
                        let dx = win % self.pool;
                        let in_idx = in_base
                            + (oy * self.pool + dy) * self.input_width
                            + (ox * self.pool + dx);
                        grad_input[in_idx] += grad_output[out_idx];
                    }
                }
            }
        }
    }

    fn input_size(&self) -> usize {
        self.channels * self.input_height * self.input_width
    }

    fn output_size(&self) -> usize {
        self.channels * self.output_height() * self.output_width()
    }

    fn parameter_count(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maxpool_dimensions_floor() {
        let layer = MaxPool2DLayer::new(128, 25, 25, 2);
        assert_eq!(layer.output_height(), 12);
        assert_eq!(layer.output_width(), 12);
        assert_eq!(layer.output_size(), 128 * 12 * 12);
        assert_eq!(layer.parameter_count(), 0);
    }

    #[test]
    fn test_maxpool_forward_picks_max() {
        let layer = MaxPool2DLayer::new(1, 4, 4, 2);
        #[rustfmt::skip]
        let input = vec![
            1.0f32, 2.0, 5.0, 6.0,
            3.0, 4.0, 7.0, 8.0,
            9.0, 10.0, 13.0, 14.0,
            11.0, 12.0, 15.0, 16.0,
        ];
        let mut output = vec![0.0f32; 4];
        layer.forward(&input, &mut output, 1);
        assert_eq!(output, vec![4.0, 8.0, 12.0, 16.0]);
    }

    #[test]
    fn test_maxpool_odd_input_drops_edge() {
        let layer = MaxPool2DLayer::new(1, 3, 3, 2);
        #[rustfmt::skip]
        let input = vec![
            1.0f32, 2.0, 99.0,
            3.0, 4.0, 99.0,
            99.0, 99.0, 99.0,
        ];
        let mut output = vec![0.0f32; 1];
        layer.forward(&input, &mut output, 1);
        // The last row and column fall outside the pooled region.
        assert_eq!(output[0], 4.0);
    }

    #[test]
    fn test_maxpool_backward_routes_to_argmax() {
        let layer = MaxPool2DLayer::new(1, 2, 2, 2);
        let input = vec![1.0f32, 3.0, 2.0, 0.5];
        let mut output = vec![0.0f32; 1];
        layer.forward(&input, &mut output, 1);
        assert_eq!(output[0], 3.0);

        let grad_output = vec![5.0f32];
        let mut grad_input = vec![0.0f32; 4];
        layer.backward(&input, &grad_output, &mut grad_input, 1);
        assert_eq!(grad_input, vec![0.0, 5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_maxpool_multi_channel_batch() {
        let layer = MaxPool2DLayer::new(2, 2, 2, 2);
        // Two samples, two channels each.
        let input = vec![
            1.0f32, 2.0, 3.0, 4.0, // s0 c0
            8.0, 7.0, 6.0, 5.0, // s0 c1
            -1.0, -2.0, -3.0, -4.0, // s1 c0
            0.0, 0.0, 0.0, 9.0, // s1 c1
        ];
        let mut output = vec![0.0f32; 4];
        layer.forward(&input, &mut output, 2);
        assert_eq!(output, vec![4.0, 8.0, -1.0, 9.0]);
    }
}
