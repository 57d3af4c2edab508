//! Evaluation tests: confusion matrix invariants and error handling.

use fruit_classifier::dataset::{ClassFolderDataset, CHANNELS};
use fruit_classifier::evaluator;
use fruit_classifier::model::{FruitCnn, StageConfig};
use fruit_classifier::utils::SimpleRng;

const SIDE: usize = 4;

fn small_dataset(num_classes: usize, samples_per_class: usize) -> ClassFolderDataset {
    let sample_size = CHANNELS * SIDE * SIDE;
    let mut images = Vec::new();
    let mut labels = Vec::new();
    for class in 0..num_classes {
        for s in 0..samples_per_class {
            let value = class as f32 * 0.3 - 0.5 + s as f32 * 0.01;
            images.extend(std::iter::repeat(value).take(sample_size));
            labels.push(class as u8);
        }
    }
    let classes = (0..num_classes).map(|c| format!("c{}", c)).collect();
    ClassFolderDataset::from_parts(classes, images, labels, SIDE, SIDE)
}

fn build_model(num_classes: usize, max_batch: usize) -> FruitCnn {
    let stages = [StageConfig {
        in_channels: CHANNELS,
        out_channels: 4,
        kernel_size: 3,
        padding: 1,
    }];
    let mut rng = SimpleRng::new(10);
    FruitCnn::new(SIDE, SIDE, num_classes, &stages, max_batch, &mut rng).unwrap()
}

#[test]
fn test_confusion_sum_equals_total_and_trace_equals_correct() {
    let data = small_dataset(3, 7);
    let mut model = build_model(3, 8);

    let eval = evaluator::evaluate(&mut model, &data, 8).unwrap();

    assert_eq!(eval.total, 21);
    assert_eq!(eval.confusion.total(), 21);
    assert_eq!(eval.confusion.correct(), eval.correct);

    let mut trace = 0u64;
    for i in 0..3 {
        trace += eval.confusion.count(i, i);
    }
    assert_eq!(trace, eval.correct);
}

#[test]
fn test_accuracy_matches_counts() {
    let data = small_dataset(2, 10);
    let mut model = build_model(2, 5);

    let eval = evaluator::evaluate(&mut model, &data, 5).unwrap();
    let expected = eval.correct as f64 / eval.total as f64;
    assert!((eval.accuracy() - expected).abs() < 1e-12);
    assert!(eval.accuracy() >= 0.0 && eval.accuracy() <= 1.0);
}

#[test]
fn test_evaluate_batch_boundaries() {
    // 11 samples with batch size 4 exercises a short final batch.
    let data = small_dataset(1, 11);
    let mut model = build_model(2, 4);

    let eval = evaluator::evaluate(&mut model, &data, 4).unwrap();
    assert_eq!(eval.total, 11);
}

#[test]
fn test_evaluate_empty_dataset_fails() {
    let data = ClassFolderDataset::from_parts(vec!["a".into(), "b".into()], Vec::new(), Vec::new(), SIDE, SIDE);
    let mut model = build_model(2, 4);

    let result = evaluator::evaluate(&mut model, &data, 4);
    assert!(result.is_err());
}

#[test]
fn test_evaluate_is_deterministic() {
    let data = small_dataset(3, 5);
    let mut model = build_model(3, 4);

    let first = evaluator::evaluate(&mut model, &data, 4).unwrap();
    let second = evaluator::evaluate(&mut model, &data, 4).unwrap();
    assert_eq!(first.correct, second.correct);
    for i in 0..3 {
        for j in 0..3 {
            assert_eq!(first.confusion.count(i, j), second.confusion.count(i, j));
        }
    }
}
