//! Integration tests for the model at the standard fruit configuration.

use fruit_classifier::dataset::CHANNELS;
use fruit_classifier::model::{FruitCnn, StageConfig, FRUIT_STAGES};
use fruit_classifier::utils::SimpleRng;

#[test]
fn test_standard_architecture_shapes() {
    let mut rng = SimpleRng::new(10);
    let model = FruitCnn::new(100, 100, 5, &FRUIT_STAGES, 1, &mut rng).unwrap();

    // Pooling floors: 100 -> 50 -> 25 -> 12, times 128 channels.
    assert_eq!(model.feature_size(), 18432);
    assert_eq!(model.num_classes(), 5);

    let summaries = model.stage_summaries();
    assert_eq!(summaries.len(), 3);
    assert!(summaries[0].contains("32ch"));
    assert!(summaries[2].contains("pool 12x12"));
}

#[test]
fn test_forward_small_model() {
    let stages = [
        StageConfig {
            in_channels: CHANNELS,
            out_channels: 4,
            kernel_size: 5,
            padding: 2,
        },
        StageConfig {
            in_channels: 4,
            out_channels: 8,
            kernel_size: 5,
            padding: 2,
        },
    ];
    let mut rng = SimpleRng::new(10);
    let mut model = FruitCnn::new(12, 12, 5, &stages, 3, &mut rng).unwrap();

    // 12 -> 6 -> 3 spatial, 8 channels.
    assert_eq!(model.feature_size(), 8 * 3 * 3);

    let input: Vec<f32> = (0..3 * CHANNELS * 12 * 12)
        .map(|i| ((i % 13) as f32 - 6.0) * 0.1)
        .collect();
    let logits = model.forward(&input, 3);
    assert_eq!(logits.len(), 15);
    assert!(logits.iter().all(|&v| v.is_finite()));
}

#[test]
fn test_deterministic_given_seed() {
    let stages = [StageConfig {
        in_channels: CHANNELS,
        out_channels: 4,
        kernel_size: 3,
        padding: 1,
    }];
    let input: Vec<f32> = (0..CHANNELS * 10 * 10).map(|i| (i as f32).cos()).collect();

    let run = |seed: u64| {
        let mut rng = SimpleRng::new(seed);
        let mut model = FruitCnn::new(10, 10, 4, &stages, 1, &mut rng).unwrap();
        model.forward(&input, 1).to_vec()
    };

    assert_eq!(run(10), run(10));
    assert_ne!(run(10), run(11));
}

#[test]
fn test_batch_size_limit_enforced() {
    let stages = [StageConfig {
        in_channels: CHANNELS,
        out_channels: 2,
        kernel_size: 3,
        padding: 1,
    }];
    let mut rng = SimpleRng::new(10);
    let mut model = FruitCnn::new(4, 4, 2, &stages, 2, &mut rng).unwrap();

    let input = vec![0.0f32; 2 * CHANNELS * 16];
    let logits = model.forward(&input, 2);
    assert_eq!(logits.len(), 4);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let oversized = vec![0.0f32; 3 * CHANNELS * 16];
        model.forward(&oversized, 3);
    }));
    assert!(result.is_err());
}
