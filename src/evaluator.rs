//! Model evaluation: accuracy and confusion matrix.

use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::dataset::ClassFolderDataset;
use crate::model::FruitCnn;

/// Square matrix of prediction counts, rows indexed by true class and
/// columns by predicted class.
pub struct ConfusionMatrix {
    num_classes: usize,
    counts: Vec<u64>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            counts: vec![0; num_classes * num_classes],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn record(&mut self, actual: usize, predicted: usize) {
        assert!(actual < self.num_classes && predicted < self.num_classes);
        self.counts[actual * self.num_classes + predicted] += 1;
    }

    pub fn count(&self, actual: usize, predicted: usize) -> u64 {
        self.counts[actual * self.num_classes + predicted]
    }

    /// Sum of all cells. Equals the number of recorded samples.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Sum of the diagonal: samples where the prediction matched.
    pub fn correct(&self) -> u64 {
        (0..self.num_classes)
            .map(|i| self.counts[i * self.num_classes + i])
            .sum()
    }

    /// Fraction of correct predictions, or `None` when nothing has been
    /// recorded.
    pub fn accuracy(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            None
        } else {
            Some(self.correct() as f64 / total as f64)
        }
    }

    /// Write the matrix as CSV with numeric row and column labels: a header
    /// row `,0,1,...` and one row per true class.
    pub fn write_csv(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        let file = File::create(path)
            .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
        let mut writer = BufWriter::new(file);

        for j in 0..self.num_classes {
            write!(writer, ",{}", j)?;
        }
        writeln!(writer)?;

        for i in 0..self.num_classes {
            write!(writer, "{}", i)?;
            for j in 0..self.num_classes {
                write!(writer, ",{}", self.count(i, j))?;
            }
            writeln!(writer)?;
        }

        writer.flush()?;
        Ok(())
    }
}

/// Outcome of evaluating a model on a dataset.
pub struct Evaluation {
    pub confusion: ConfusionMatrix,
    pub correct: u64,
    pub total: u64,
}

impl Evaluation {
    pub fn accuracy(&self) -> f64 {
        self.correct as f64 / self.total as f64
    }
}

/// Run the model over every sample and tally predictions.
///
/// Switches the model to inference mode so batch norm uses its running
/// statistics, then walks the dataset in order in batches of up to
/// `batch_size`. The predicted class is the argmax of the logits; softmax is
/// monotonic so it is skipped here.
pub fn evaluate(
    model: &mut FruitCnn,
    data: &ClassFolderDataset,
    batch_size: usize,
) -> Result<Evaluation, Box<dyn Error>> {
    if data.is_empty() {
        return Err("cannot evaluate on an empty dataset".into());
    }
    assert!(batch_size > 0 && batch_size <= model.max_batch());

    model.set_training(false);

    let sample_size = data.sample_size();
    let num_classes = model.num_classes();
    let mut confusion = ConfusionMatrix::new(num_classes);

    let mut start = 0;
    while start < data.len() {
        let count = batch_size.min(data.len() - start);
        let inputs = &data.images()[start * sample_size..(start + count) * sample_size];
        let logits = model.forward(inputs, count);

        for b in 0..count {
            let row = &logits[b * num_classes..(b + 1) * num_classes];
            let mut best = 0usize;
            for j in 1..num_classes {
                if row[j] > row[best] {
                    best = j;
                }
            }
            confusion.record(data.labels()[start + b] as usize, best);
        }

        start += count;
    }

    let correct = confusion.correct();
    let total = confusion.total();
    Ok(Evaluation {
        confusion,
        correct,
        total,
    })
}
