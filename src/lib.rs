//! A CPU convolutional network for classifying images arranged in class
//! folders.
//!
//! The crate loads a dataset where each subdirectory of a root folder is one
//! class, trains a conv-batchnorm-ReLU-maxpool stack with a dense head using
//! Adam, and evaluates accuracy with a confusion matrix exported as CSV.
//! All numeric work happens on flat `f32` buffers with explicit loops; runs
//! are deterministic given a seed.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use fruit_classifier::config::RunConfig;
//! use fruit_classifier::dataset::ClassFolderDataset;
//! use fruit_classifier::model::{FruitCnn, FRUIT_STAGES};
//! use fruit_classifier::utils::SimpleRng;
//! use fruit_classifier::{evaluator, trainer};
//!
//! let cfg = RunConfig::default();
//! let train = ClassFolderDataset::load(Path::new(&cfg.train_dir)).unwrap();
//! let test = ClassFolderDataset::load(Path::new(&cfg.test_dir)).unwrap();
//!
//! let mut rng = SimpleRng::new(cfg.seed);
//! let mut model = FruitCnn::new(
//!     train.height(),
//!     train.width(),
//!     train.num_classes(),
//!     &FRUIT_STAGES,
//!     cfg.batch_size,
//!     &mut rng,
//! )
//! .unwrap();
//!
//! trainer::train(&mut model, &train, &cfg, &mut rng);
//! let eval = evaluator::evaluate(&mut model, &test, cfg.batch_size).unwrap();
//! println!("accuracy: {:.2}%", eval.accuracy() * 100.0);
//! ```

pub mod config;
pub mod dataset;
pub mod evaluator;
pub mod layers;
pub mod model;
pub mod optimizers;
pub mod trainer;
pub mod utils;
