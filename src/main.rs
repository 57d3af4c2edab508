//! Train and evaluate the fruit classifier end to end.
//!
//! Usage: `fruit-classifier [config.json]`. Without an argument the default
//! configuration is used: the fruit subset directories, seed 10, 6 epochs,
//! batch size 40, learning rate 1e-4, CPU device.

use std::env;
use std::path::Path;
use std::process;
use std::time::Instant;

use fruit_classifier::config::{load_config, Device, RunConfig};
use fruit_classifier::dataset::ClassFolderDataset;
use fruit_classifier::evaluator;
use fruit_classifier::model::{FruitCnn, FRUIT_STAGES};
use fruit_classifier::trainer;
use fruit_classifier::utils::SimpleRng;

fn main() {
    let start = Instant::now();

    let cfg = match env::args().nth(1) {
        Some(path) => load_config(&path).unwrap_or_else(|e| {
            eprintln!("Could not load config {}: {}", path, e);
            process::exit(1);
        }),
        None => RunConfig::default(),
    };

    if cfg.device == Device::Accelerator {
        eprintln!("Device 'accelerator' is not available in this build; use 'cpu'");
        process::exit(1);
    }
    println!("Using device: {}", cfg.device);

    let train_data = ClassFolderDataset::load(Path::new(&cfg.train_dir)).unwrap_or_else(|e| {
        eprintln!("Could not load training data: {}", e);
        process::exit(1);
    });
    let test_data = ClassFolderDataset::load(Path::new(&cfg.test_dir)).unwrap_or_else(|e| {
        eprintln!("Could not load test data: {}", e);
        process::exit(1);
    });

    if train_data.classes() != test_data.classes() {
        eprintln!(
            "Training and test sets disagree on classes: {:?} vs {:?}",
            train_data.classes(),
            test_data.classes()
        );
        process::exit(1);
    }
    if train_data.height() != test_data.height() || train_data.width() != test_data.width() {
        eprintln!(
            "Training images are {}x{} but test images are {}x{}",
            train_data.width(),
            train_data.height(),
            test_data.width(),
            test_data.height()
        );
        process::exit(1);
    }

    println!(
        "Loaded {} training and {} test images ({}x{}, {} classes)",
        train_data.len(),
        test_data.len(),
        train_data.width(),
        train_data.height(),
        train_data.num_classes()
    );
    println!("Classes: {}", train_data.classes().join(", "));

    // Quick label sanity check in place of plotting sample images.
    let preview: Vec<&str> = train_data
        .labels()
        .iter()
        .take(8)
        .map(|&l| train_data.classes()[l as usize].as_str())
        .collect();
    println!("First training labels: {}", preview.join(", "));

    let mut rng = SimpleRng::new(cfg.seed);
    let mut model = FruitCnn::new(
        train_data.height(),
        train_data.width(),
        train_data.num_classes(),
        &FRUIT_STAGES,
        cfg.batch_size,
        &mut rng,
    )
    .unwrap_or_else(|e| {
        eprintln!("Could not build model: {}", e);
        process::exit(1);
    });

    for (i, summary) in model.stage_summaries().iter().enumerate() {
        println!("Stage {}: {}", i + 1, summary);
    }
    println!(
        "Flattened features: {}, trainable parameters: {}",
        model.feature_size(),
        model.parameter_count()
    );

    let report = trainer::train(&mut model, &train_data, &cfg, &mut rng);
    println!(
        "Finished {} epochs ({} batches each), final epoch loss: {:.4}",
        report.epochs, report.batches_per_epoch, report.final_epoch_loss
    );

    let eval = evaluator::evaluate(&mut model, &test_data, cfg.batch_size).unwrap_or_else(|e| {
        eprintln!("Evaluation failed: {}", e);
        process::exit(1);
    });
    println!(
        "Test accuracy on the {} test images: {:.2}%",
        eval.total,
        eval.accuracy() * 100.0
    );

    let confusion_path = Path::new(&cfg.confusion_path);
    eval.confusion.write_csv(confusion_path).unwrap_or_else(|e| {
        eprintln!("Could not write confusion matrix: {}", e);
        process::exit(1);
    });
    println!("Confusion matrix written to {}", confusion_path.display());

    println!("Run time: {:.2} seconds", start.elapsed().as_secs_f64());
}
