//! Optimizer abstractions for parameter updates.
//!
//! Optimizers define how accumulated gradients turn into parameter changes.
//! The trainer owns one optimizer instance per parameter tensor so that
//! stateful optimizers (Adam) keep coherent per-tensor moment estimates.

pub mod adam;
pub mod sgd;

pub use adam::Adam;
pub use sgd::Sgd;

/// Core trait for optimizers.
///
/// Implementations update parameters in-place from gradients. Stateful
/// optimizers keep internal moment buffers sized to the tensor they are bound
/// to, so a given instance must always be fed the same parameter tensor.
pub trait Optimizer {
    /// Update parameters using gradients.
    ///
    /// # Panics
    ///
    /// Implementations panic if `parameters` and `gradients` have different
    /// lengths.
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]);

    /// Clear any accumulated internal state (momentum, step counters).
    fn reset(&mut self);

    /// Base learning rate.
    fn learning_rate(&self) -> f32;

    /// Replace the base learning rate.
    fn set_learning_rate(&mut self, lr: f32);
}
