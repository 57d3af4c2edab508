//! The convolutional classifier: stacked conv stages and a linear head.
//!
//! Each stage applies convolution, spatial batch normalization, ReLU, and
//! 2x2 max pooling. The final stage's pooled feature map is flattened and
//! fed to a fully connected layer producing one logit per class. The
//! flattened feature size is derived from the configured stages and input
//! resolution at construction, never assumed.

use std::error::Error;

use crate::layers::{
    BatchNorm2DLayer, Conv2DLayer, DenseLayer, Layer, MaxPool2DLayer, ParamGrads,
};
use crate::utils::{relu_inplace, SimpleRng};

const BN_EPSILON: f32 = 1e-5;
const BN_MOMENTUM: f32 = 0.9;
const POOL_SIZE: usize = 2;
const CONV_STRIDE: usize = 1;

/// Shape of one conv stage.
#[derive(Debug, Clone, Copy)]
pub struct StageConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub padding: isize,
}

/// Standard three-stage architecture for the fruit subset: 3 -> 32 -> 64 ->
/// 128 channels, 5x5 kernels with padding 2 so convolution preserves the
/// spatial dimensions.
pub const FRUIT_STAGES: [StageConfig; 3] = [
    StageConfig {
        in_channels: 3,
        out_channels: 32,
        kernel_size: 5,
        padding: 2,
    },
    StageConfig {
        in_channels: 32,
        out_channels: 64,
        kernel_size: 5,
        padding: 2,
    },
    StageConfig {
        in_channels: 64,
        out_channels: 128,
        kernel_size: 5,
        padding: 2,
    },
];

struct Stage {
    conv: Conv2DLayer,
    norm: BatchNorm2DLayer,
    pool: MaxPool2DLayer,
    // Forward activations, sized for max_batch. norm_out holds the
    // post-ReLU values after forward.
    conv_out: Vec<f32>,
    norm_out: Vec<f32>,
    pool_out: Vec<f32>,
}

struct StageGrads {
    d_norm_out: Vec<f32>,
    d_conv_out: Vec<f32>,
    d_input: Vec<f32>,
}

/// Convolutional network with a configurable stack of conv stages and a
/// dense classification head.
///
/// Activation buffers are preallocated for `max_batch` samples; `forward`
/// and `backward` accept any batch size up to that limit.
pub struct FruitCnn {
    stages: Vec<Stage>,
    stage_grads: Vec<StageGrads>,
    fc: DenseLayer,
    logits: Vec<f32>,
    d_features: Vec<f32>,
    feature_size: usize,
    num_classes: usize,
    max_batch: usize,
}

impl FruitCnn {
    /// Build the network for a given input resolution and class count.
    ///
    /// Validates that consecutive stages agree on channel counts and that
    /// the spatial dimensions survive every pooling step. The dense head's
    /// input width is the flattened size of the last pooled feature map.
    pub fn new(
        input_height: usize,
        input_width: usize,
        num_classes: usize,
        stage_configs: &[StageConfig],
        max_batch: usize,
        rng: &mut SimpleRng,
    ) -> Result<Self, Box<dyn Error>> {
        if stage_configs.is_empty() {
            return Err("model needs at least one conv stage".into());
        }
        if num_classes < 2 {
            return Err(format!("need at least 2 classes, got {}", num_classes).into());
        }
        if max_batch == 0 {
            return Err("max_batch must be positive".into());
        }

        let mut stages = Vec::with_capacity(stage_configs.len());
        let mut stage_grads = Vec::with_capacity(stage_configs.len());
        let mut height = input_height;
        let mut width = input_width;

        for (i, cfg) in stage_configs.iter().enumerate() {
            if i > 0 && cfg.in_channels != stage_configs[i - 1].out_channels {
                return Err(format!(
                    "stage {} expects {} input channels but stage {} produces {}",
                    i,
                    cfg.in_channels,
                    i - 1,
                    stage_configs[i - 1].out_channels
                )
                .into());
            }

            let conv = Conv2DLayer::new(
                cfg.in_channels,
                cfg.out_channels,
                cfg.kernel_size,
                cfg.padding,
                CONV_STRIDE,
                height,
                width,
                rng,
            );
            let conv_h = conv.output_height();
            let conv_w = conv.output_width();
            if conv_h == 0 || conv_w == 0 {
                return Err(format!(
                    "stage {} collapses the feature map to zero size ({}x{} input)",
                    i, height, width
                )
                .into());
            }

            let norm = BatchNorm2DLayer::new(cfg.out_channels, conv_h * conv_w, BN_EPSILON, BN_MOMENTUM);
            let pool = MaxPool2DLayer::new(cfg.out_channels, conv_h, conv_w, POOL_SIZE);
            let pool_h = pool.output_height();
            let pool_w = pool.output_width();
            if pool_h == 0 || pool_w == 0 {
                return Err(format!(
                    "stage {} pools the feature map to zero size ({}x{} input)",
                    i, conv_h, conv_w
                )
                .into());
            }

            let conv_size = max_batch * conv.output_size();
            let pool_size = max_batch * pool.output_size();
            let in_size = max_batch * conv.input_size();

            stages.push(Stage {
                conv,
                norm,
                pool,
                conv_out: vec![0.0; conv_size],
                norm_out: vec![0.0; conv_size],
                pool_out: vec![0.0; pool_size],
            });
            stage_grads.push(StageGrads {
                d_norm_out: vec![0.0; conv_size],
                d_conv_out: vec![0.0; conv_size],
                d_input: vec![0.0; in_size],
            });

            height = pool_h;
            width = pool_w;
        }

        let last = &stage_configs[stage_configs.len() - 1];
        let feature_size = last.out_channels * height * width;
        let fc = DenseLayer::new(feature_size, num_classes, rng);

        Ok(Self {
            stages,
            stage_grads,
            fc,
            logits: vec![0.0; max_batch * num_classes],
            d_features: vec![0.0; max_batch * feature_size],
            feature_size,
            num_classes,
            max_batch,
        })
    }

    /// Forward pass for a batch, returning the logits slice.
    pub fn forward(&mut self, input: &[f32], batch_size: usize) -> &[f32] {
        assert!(batch_size > 0 && batch_size <= self.max_batch);
        assert_eq!(input.len(), batch_size * self.stages[0].conv.input_size());

        for i in 0..self.stages.len() {
            let (prev, rest) = self.stages.split_at_mut(i);
            let stage = &mut rest[0];
            let n_in = batch_size * stage.conv.input_size();
            let stage_input: &[f32] = if i == 0 {
                input
            } else {
                &prev[i - 1].pool_out[..n_in]
            };

            let n_conv = batch_size * stage.conv.output_size();
            let n_pool = batch_size * stage.pool.output_size();

            stage
                .conv
                .forward(stage_input, &mut stage.conv_out[..n_conv], batch_size);
            stage.norm.forward(
                &stage.conv_out[..n_conv],
                &mut stage.norm_out[..n_conv],
                batch_size,
            );
            relu_inplace(&mut stage.norm_out[..n_conv]);
            stage.pool.forward(
                &stage.norm_out[..n_conv],
                &mut stage.pool_out[..n_pool],
                batch_size,
            );
        }

        let last = &self.stages[self.stages.len() - 1];
        let n_feat = batch_size * self.feature_size;
        let n_out = batch_size * self.num_classes;
        self.fc
            .forward(&last.pool_out[..n_feat], &mut self.logits[..n_out], batch_size);
        &self.logits[..n_out]
    }

    /// Backward pass from the loss gradient with respect to the logits.
    ///
    /// `grad_logits` carries any batch averaging; layers accumulate raw
    /// parameter gradients. Must follow a `forward` call with the same
    /// `input` and `batch_size`.
    pub fn backward(&mut self, input: &[f32], grad_logits: &[f32], batch_size: usize) {
        assert!(batch_size > 0 && batch_size <= self.max_batch);
        assert_eq!(grad_logits.len(), batch_size * self.num_classes);

        let n = self.stages.len();
        let n_feat = batch_size * self.feature_size;

        let last = &self.stages[n - 1];
        self.fc.backward(
            &last.pool_out[..n_feat],
            grad_logits,
            &mut self.d_features[..n_feat],
            batch_size,
        );

        for i in (0..n).rev() {
            let stage = &self.stages[i];
            let n_conv = batch_size * stage.conv.output_size();
            let n_pool = batch_size * stage.pool.output_size();
            let n_in = batch_size * stage.conv.input_size();

            let (left, right) = self.stage_grads.split_at_mut(i + 1);
            let grads = &mut left[i];
            let upstream: &[f32] = if i == n - 1 {
                &self.d_features[..n_pool]
            } else {
                &right[0].d_input[..n_pool]
            };

            stage.pool.backward(
                &stage.norm_out[..n_conv],
                upstream,
                &mut grads.d_norm_out[..n_conv],
                batch_size,
            );

            // ReLU mask: norm_out holds the post-activation values, so a
            // zero there means the unit was clipped.
            for (g, &a) in grads.d_norm_out[..n_conv]
                .iter_mut()
                .zip(stage.norm_out[..n_conv].iter())
            {
                if a <= 0.0 {
                    *g = 0.0;
                }
            }

            stage.norm.backward(
                &stage.conv_out[..n_conv],
                &grads.d_norm_out[..n_conv],
                &mut grads.d_conv_out[..n_conv],
                batch_size,
            );

            let stage_input: &[f32] = if i == 0 {
                input
            } else {
                let prev = &self.stages[i - 1];
                &prev.pool_out[..n_in]
            };
            stage.conv.backward(
                stage_input,
                &grads.d_conv_out[..n_conv],
                &mut grads.d_input[..n_in],
                batch_size,
            );
        }
    }

    /// Switch batch norm layers between batch statistics and running
    /// statistics.
    pub fn set_training(&mut self, training: bool) {
        for stage in &mut self.stages {
            stage.norm.set_training(training);
        }
    }

    /// Views over every trainable (parameters, gradients) tensor pair, in a
    /// stable order.
    pub fn param_grads(&mut self) -> Vec<ParamGrads<'_>> {
        let mut tensors = Vec::new();
        for stage in &mut self.stages {
            tensors.extend(stage.conv.param_grads());
            tensors.extend(stage.norm.param_grads());
        }
        tensors.extend(self.fc.param_grads());
        tensors
    }

    /// Total trainable parameter count.
    pub fn parameter_count(&self) -> usize {
        let mut count = self.fc.parameter_count();
        for stage in &self.stages {
            count += stage.conv.parameter_count() + stage.norm.parameter_count();
        }
        count
    }

    /// Flattened feature size feeding the dense head.
    pub fn feature_size(&self) -> usize {
        self.feature_size
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn max_batch(&self) -> usize {
        self.max_batch
    }

    /// One-line description per stage for startup logging.
    pub fn stage_summaries(&self) -> Vec<String> {
        self.stages
            .iter()
            .map(|s| {
                format!(
                    "conv {}ch {}x{} -> pool {}x{}",
                    s.conv.out_channels(),
                    s.conv.output_height(),
                    s.conv.output_width(),
                    s.pool.output_height(),
                    s.pool.output_width()
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::CHANNELS;

    #[test]
    fn test_feature_size_for_standard_input() {
        let mut rng = SimpleRng::new(10);
        let model = FruitCnn::new(100, 100, 5, &FRUIT_STAGES, 1, &mut rng).unwrap();
        // 100 -> 50 -> 25 -> 12 spatial, 128 channels.
        assert_eq!(model.feature_size(), 128 * 12 * 12);
        assert_eq!(model.feature_size(), 18432);
    }

    #[test]
    fn test_parameter_count() {
        let mut rng = SimpleRng::new(10);
        let model = FruitCnn::new(100, 100, 5, &FRUIT_STAGES, 1, &mut rng).unwrap();
        let conv_params = (32 * 3 * 25 + 32) + (64 * 32 * 25 + 64) + (128 * 64 * 25 + 128);
        let bn_params = 2 * (32 + 64 + 128);
        let fc_params = 18432 * 5 + 5;
        assert_eq!(model.parameter_count(), conv_params + bn_params + fc_params);
    }

    #[test]
    fn test_rejects_mismatched_channel_chain() {
        let mut rng = SimpleRng::new(10);
        let stages = [
            StageConfig {
                in_channels: 3,
                out_channels: 8,
                kernel_size: 3,
                padding: 1,
            },
            StageConfig {
                in_channels: 16,
                out_channels: 8,
                kernel_size: 3,
                padding: 1,
            },
        ];
        let result = FruitCnn::new(32, 32, 5, &stages, 1, &mut rng);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_collapsed_feature_map() {
        let mut rng = SimpleRng::new(10);
        // Each pool halves; 4x4 survives two stages but not three.
        let stage = StageConfig {
            in_channels: 3,
            out_channels: 3,
            kernel_size: 3,
            padding: 1,
        };
        let stages = [stage, stage, stage];
        let result = FruitCnn::new(4, 4, 5, &stages, 1, &mut rng);
        assert!(result.is_err());
    }

    #[test]
    fn test_forward_logits_shape() {
        let mut rng = SimpleRng::new(10);
        let stages = [StageConfig {
            in_channels: CHANNELS,
            out_channels: 4,
            kernel_size: 3,
            padding: 1,
        }];
        let mut model = FruitCnn::new(8, 8, 3, &stages, 2, &mut rng).unwrap();

        let input = vec![0.1f32; 2 * CHANNELS * 8 * 8];
        let logits = model.forward(&input, 2);
        assert_eq!(logits.len(), 2 * 3);
        assert!(logits.iter().all(|&v| v.is_finite()));
    }

    #[test]
    fn test_forward_backward_produces_gradients() {
        let mut rng = SimpleRng::new(10);
        let stages = [
            StageConfig {
                in_channels: CHANNELS,
                out_channels: 4,
                kernel_size: 3,
                padding: 1,
            },
            StageConfig {
                in_channels: 4,
                out_channels: 6,
                kernel_size: 3,
                padding: 1,
            },
        ];
        let mut model = FruitCnn::new(8, 8, 3, &stages, 2, &mut rng).unwrap();

        let input: Vec<f32> = (0..2 * CHANNELS * 8 * 8)
            .map(|i| ((i % 17) as f32 - 8.0) * 0.1)
            .collect();
        let logits = model.forward(&input, 2).to_vec();
        assert_eq!(logits.len(), 6);

        let grad_logits = vec![0.5f32, -0.5, 0.0, 0.1, -0.1, 0.0];
        model.backward(&input, &grad_logits, 2);

        let tensors = model.param_grads();
        // conv w/b + bn gamma/beta per stage, plus fc w/b.
        assert_eq!(tensors.len(), 2 * 4 + 2);
        let any_nonzero = tensors
            .iter()
            .any(|t| t.grads.iter().any(|&g| g.abs() > 0.0));
        assert!(any_nonzero);
    }

    #[test]
    fn test_same_seed_same_initialization() {
        let mut rng_a = SimpleRng::new(10);
        let mut rng_b = SimpleRng::new(10);
        let mut model_a = FruitCnn::new(8, 8, 3, &[FRUIT_STAGES[0]], 1, &mut rng_a).unwrap();
        let mut model_b = FruitCnn::new(8, 8, 3, &[FRUIT_STAGES[0]], 1, &mut rng_b).unwrap();

        let input = vec![0.3f32; CHANNELS * 8 * 8];
        let out_a = model_a.forward(&input, 1).to_vec();
        let out_b = model_b.forward(&input, 1).to_vec();
        assert_eq!(out_a, out_b);
    }
}
