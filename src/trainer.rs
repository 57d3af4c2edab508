//! Mini-batch training loop with softmax cross-entropy loss and Adam.

use crate::config::RunConfig;
use crate::dataset::ClassFolderDataset;
use crate::layers::ParamGrads;
use crate::model::FruitCnn;
use crate::optimizers::{Adam, Optimizer};
use crate::utils::{softmax_rows, SimpleRng};

const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPSILON: f32 = 1e-8;
// Progress is reported on every 100th batch of an epoch.
const PROGRESS_INTERVAL: usize = 100;

/// Summary of a completed training run.
pub struct TrainReport {
    pub epochs: usize,
    pub batches_per_epoch: usize,
    pub final_epoch_loss: f32,
}

/// Cross-entropy loss and its gradient with respect to the logits.
///
/// `probs` holds softmax outputs. Writes `(p - onehot) / count` into `delta`
/// so the batch averaging happens exactly once here; layers accumulate raw
/// gradients. Returns the mean loss over the batch.
fn compute_delta_and_loss(
    probs: &[f32],
    labels: &[u8],
    num_classes: usize,
    delta: &mut [f32],
) -> f32 {
    let count = labels.len();
    assert_eq!(probs.len(), count * num_classes);
    assert_eq!(delta.len(), count * num_classes);

    let scale = 1.0 / count as f32;
    let mut loss = 0.0f32;

    for (b, &label) in labels.iter().enumerate() {
        let row = &probs[b * num_classes..(b + 1) * num_classes];
        let p = row[label as usize].max(1e-12);
        loss -= p.ln();

        for j in 0..num_classes {
            let target = if j == label as usize { 1.0 } else { 0.0 };
            delta[b * num_classes + j] = (row[j] - target) * scale;
        }
    }

    loss * scale
}

/// Train the model on the dataset per the run configuration.
///
/// Each epoch shuffles the sample order with the shared RNG, then walks the
/// data in batches of `cfg.batch_size`; a shorter final batch is kept rather
/// than dropped. One Adam instance is held per parameter tensor so moment
/// estimates never mix across tensors.
pub fn train(
    model: &mut FruitCnn,
    data: &ClassFolderDataset,
    cfg: &RunConfig,
    rng: &mut SimpleRng,
) -> TrainReport {
    assert!(!data.is_empty(), "cannot train on an empty dataset");
    assert!(cfg.batch_size <= model.max_batch());

    model.set_training(true);

    let mut optimizers: Vec<Adam> = (0..model.param_grads().len())
        .map(|_| Adam::new(cfg.learning_rate, ADAM_BETA1, ADAM_BETA2, ADAM_EPSILON))
        .collect();

    let sample_size = data.sample_size();
    let num_classes = model.num_classes();
    let batch = cfg.batch_size;
    let batches_per_epoch = (data.len() + batch - 1) / batch;

    let mut indices: Vec<usize> = (0..data.len()).collect();
    let mut inputs = vec![0.0f32; batch * sample_size];
    let mut batch_labels = vec![0u8; batch];
    let mut probs = vec![0.0f32; batch * num_classes];
    let mut delta = vec![0.0f32; batch * num_classes];

    let mut final_epoch_loss = 0.0f32;

    for epoch in 0..cfg.epochs {
        rng.shuffle_usize(&mut indices);
        let mut epoch_loss = 0.0f32;

        for b in 0..batches_per_epoch {
            let start = b * batch;
            let count = batch.min(data.len() - start);

            data.gather_batch(&indices, start, count, &mut inputs, &mut batch_labels);

            let logits = model.forward(&inputs[..count * sample_size], count);
            probs[..count * num_classes].copy_from_slice(logits);
            softmax_rows(&mut probs[..count * num_classes], count, num_classes);

            let loss = compute_delta_and_loss(
                &probs[..count * num_classes],
                &batch_labels[..count],
                num_classes,
                &mut delta[..count * num_classes],
            );
            epoch_loss += loss;

            model.backward(&inputs[..count * sample_size], &delta[..count * num_classes], count);

            for (ParamGrads { params, grads }, opt) in
                model.param_grads().into_iter().zip(optimizers.iter_mut())
            {
                opt.update(params, grads);
                grads.fill(0.0);
            }

            if (b + 1) % PROGRESS_INTERVAL == 0 {
                println!(
                    "Epoch [{}/{}], Batch [{}/{}], Loss: {:.4}",
                    epoch + 1,
                    cfg.epochs,
                    b + 1,
                    batches_per_epoch,
                    loss
                );
            }
        }

        final_epoch_loss = epoch_loss / batches_per_epoch as f32;
    }

    TrainReport {
        epochs: cfg.epochs,
        batches_per_epoch,
        final_epoch_loss,
    }
}
