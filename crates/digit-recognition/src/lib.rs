#![warn(missing_docs)]

//! LeNet handwritten digit recognition.
//!
//! - [model]: the LeNet classifier and its parameter loading
//! - [transform]: preprocessing from any raster to the `[1, 1, 28, 28]` classifier input
//! - [inference]: softmax and decision rule, wired together by [infer]
//! - [state]: load-once holder for the classifier
//! - [cli]: the command line front end

/// Command line front end.
pub mod cli;
/// Application configuration.
pub mod config;
/// Error types.
pub mod error;
/// Prediction from an image.
pub mod inference;
/// LeNet classifier.
pub mod model;
/// Lazily loaded classifier.
pub mod state;
pub mod transform;

pub use error::{Error, InvalidImageError, LoadError};
pub use inference::{infer, infer_with, Prediction};
pub use model::{LeNetClassifier, LeNetClassifierConfig};
pub use transform::{ImageTransform, TransformConfig};

#[cfg(test)]
pub(crate) type TestBackend = burn::backend::NdArray<f32>;
