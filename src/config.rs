//! Run configuration for training and evaluation.
//!
//! Configuration can be loaded from a JSON file; every field has a default
//! matching the standard fruit subset run, so a partial file only overrides
//! what it names.
//!
//! # Example
//!
//! ```json
//! {
//!   "train_dir": "./fruits_data_subset/Training",
//!   "test_dir": "./fruits_data_subset/Testing",
//!   "seed": 10,
//!   "epochs": 6,
//!   "batch_size": 40,
//!   "learning_rate": 0.0001,
//!   "device": "cpu"
//! }
//! ```

use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;

/// Compute device for a run.
///
/// Only `cpu` is implemented. Requesting `accelerator` is accepted by the
/// parser and rejected at run start, so a config written for a GPU-capable
/// build fails loudly instead of silently training on CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Accelerator,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Accelerator => write!(f, "accelerator"),
        }
    }
}

/// Parameters for a full train-and-evaluate run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Directory of training images, one subdirectory per class.
    #[serde(default = "default_train_dir")]
    pub train_dir: String,

    /// Directory of test images, one subdirectory per class.
    #[serde(default = "default_test_dir")]
    pub test_dir: String,

    /// Output path for the confusion matrix CSV.
    #[serde(default = "default_confusion_path")]
    pub confusion_path: String,

    /// Seed for weight initialization and batch shuffling.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of passes over the training set.
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Samples per training batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Adam learning rate.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,

    /// Compute device.
    #[serde(default = "default_device")]
    pub device: Device,
}

fn default_train_dir() -> String {
    "./fruits_data_subset/Training".to_string()
}

fn default_test_dir() -> String {
    "./fruits_data_subset/Testing".to_string()
}

fn default_confusion_path() -> String {
    "fruits_cnn_confusion_matrix.csv".to_string()
}

fn default_seed() -> u64 {
    10
}

fn default_epochs() -> usize {
    6
}

fn default_batch_size() -> usize {
    40
}

fn default_learning_rate() -> f32 {
    0.0001
}

fn default_device() -> Device {
    Device::Cpu
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            train_dir: default_train_dir(),
            test_dir: default_test_dir(),
            confusion_path: default_confusion_path(),
            seed: default_seed(),
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            device: default_device(),
        }
    }
}

/// Loads a run configuration from a JSON file.
///
/// Reads the file at `path` and deserializes its JSON contents into a
/// `RunConfig`, filling missing fields with defaults.
///
/// # Returns
///
/// `Ok(RunConfig)` on success, or an error if the file cannot be read, the
/// JSON is invalid, or a field fails validation.
pub fn load_config(path: &str) -> Result<RunConfig, Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    let config: RunConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &RunConfig) -> Result<(), Box<dyn Error>> {
    if config.epochs == 0 {
        return Err(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "epochs must be positive",
        )));
    }

    if config.batch_size == 0 {
        return Err(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "batch_size must be positive",
        )));
    }

    if config.learning_rate <= 0.0 {
        return Err(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "learning_rate must be positive",
        )));
    }

    Ok(())
}
