use std::path::PathBuf;

use burn::{config::ConfigError, record::RecorderError};
use thiserror::Error;

/// Error returned when the classifier parameters can't be loaded.
///
/// Loading happens once at startup, so every variant is fatal for the process.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The parameter file doesn't exist.
    #[error("parameter file not found: `{0}`")]
    NotFound(PathBuf),

    /// The file extension doesn't map to a known record format.
    #[error("unsupported parameter format `{extension}` for `{path}`, expected `.pt`, `.pth` or `.mpk`")]
    UnsupportedFormat {
        /// Path that was given.
        path: PathBuf,
        /// Extension found on the path, empty when missing.
        extension: String,
    },

    /// The record couldn't be decoded.
    #[error("failed to decode parameters: {0}")]
    Record(#[from] RecorderError),

    /// A parameter doesn't have the shape the topology requires.
    #[error("parameter `{parameter}` has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        /// State dict key of the parameter.
        parameter: String,
        /// Shape required by the topology.
        expected: Vec<usize>,
        /// Shape found in the record.
        actual: Vec<usize>,
    },

    /// A layer was saved without its bias.
    #[error("parameter `{0}` is missing")]
    MissingParameter(String),
}

/// Error returned when an input can't be turned into a classifier input.
///
/// Recoverable: the caller reports it and waits for another image.
#[derive(Error, Debug)]
pub enum InvalidImageError {
    /// The bytes aren't a raster image the decoder understands.
    #[error("image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),

    /// The image file couldn't be read.
    #[error("image could not be read: {0}")]
    Io(#[from] std::io::Error),

    /// One of the dimensions is zero.
    #[error("image has an empty dimension ({width}x{height})")]
    Empty {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },
}

/// Error surfaced by the command line front end.
#[derive(Error, Debug)]
pub enum Error {
    /// Classifier parameters failed to load.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The input image was rejected.
    #[error(transparent)]
    Image(#[from] InvalidImageError),

    /// The configuration file couldn't be read.
    #[error("invalid configuration `{path}`: {source}")]
    Config {
        /// Path of the configuration file.
        path: PathBuf,
        /// Reason reported by the configuration loader.
        #[source]
        source: ConfigError,
    },

    /// The normalization would divide by zero or produce non finite inputs.
    #[error("invalid normalization: mean {mean} must be finite and std {std} positive")]
    Normalization {
        /// Configured mean.
        mean: f64,
        /// Configured standard deviation.
        std: f64,
    },
}
