//! Core trait defining the interface for neural network layers.

/// Mutable view of one parameter tensor paired with its gradient accumulator.
///
/// The trainer walks these views to drive per-tensor optimizer instances and
/// to clear gradients between batches.
pub struct ParamGrads<'a> {
    pub params: &'a mut [f32],
    pub grads: &'a mut [f32],
}

/// Core trait for neural network layers.
///
/// Layers operate on flat `f32` buffers in row-major batch layout. `forward`
/// and `backward` take `&self` and use interior mutability for caches and
/// gradient accumulators so the model can hold layers behind shared borrows
/// during the pass.
///
/// Gradient convention: `backward` accumulates raw parameter gradients. Any
/// averaging over the batch is applied once by the loss gradient the trainer
/// feeds in, not by the layers.
pub trait Layer {
    /// Forward propagation for a batch.
    ///
    /// `input` is `batch_size * input_size()` values, `output` must hold
    /// `batch_size * output_size()`.
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize);

    /// Backward propagation for a batch.
    ///
    /// Accumulates parameter gradients internally and writes the gradient
    /// with respect to `input` into `grad_input`.
    fn backward(
        &self,
        input: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    );

    /// Views over each (parameters, gradients) tensor pair.
    ///
    /// Layers without trainable parameters return an empty vector.
    fn param_grads(&mut self) -> Vec<ParamGrads<'_>> {
        Vec::new()
    }

    /// Switch between training and inference behavior.
    ///
    /// Most layers behave identically in both modes and keep the default
    /// no-op.
    fn set_training(&mut self, _training: bool) {}

    /// Number of input features per sample.
    fn input_size(&self) -> usize;

    /// Number of output features per sample.
    fn output_size(&self) -> usize;

    /// Number of trainable parameters.
    fn parameter_count(&self) -> usize;
}
