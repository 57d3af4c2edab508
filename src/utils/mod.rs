//! Shared utilities: seedable RNG and activation functions.

pub mod activations;
pub mod rng;

pub use activations::{relu_inplace, softmax_rows};
pub use rng::SimpleRng;
