//! Layer abstractions for the convolutional classifier.
//!
//! This module provides the Layer trait and implementations for the layer
//! types the network is built from. All layers operate on flat `f32` buffers
//! in NCHW layout with each sample's channels stored contiguously.

mod r#trait;
pub mod batchnorm2d;
pub mod conv2d;
pub mod dense;
pub mod maxpool2d;

// Re-export the Layer trait for convenience
pub use r#trait::{Layer, ParamGrads};
pub use batchnorm2d::BatchNorm2DLayer;
pub use conv2d::Conv2DLayer;
pub use dense::DenseLayer;
pub use maxpool2d::MaxPool2DLayer;
