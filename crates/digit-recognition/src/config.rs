use std::path::{Path, PathBuf};

use burn::config::Config;

use crate::{
    error::Error,
    model::LeNetClassifierConfig,
    transform::{ImageTransform, TransformConfig},
};

/// Parameter file looked up in the working directory when none is given.
pub const DEFAULT_WEIGHTS: &str = "lenet_model.pt";

/// Application configuration, stored as JSON.
#[derive(Config, Debug)]
pub struct RecognitionConfig {
    /// Path of the persisted classifier parameters.
    pub weights: PathBuf,
    /// Classifier topology.
    #[config(default = "LeNetClassifierConfig::new()")]
    pub model: LeNetClassifierConfig,
    /// Input normalization.
    #[config(default = "TransformConfig::new()")]
    pub transform: TransformConfig,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_WEIGHTS))
    }
}

impl RecognitionConfig {
    /// Read the configuration from a JSON file.
    ///
    /// The normalization is validated here so a bad file is reported before any parameter is
    /// loaded.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();

        let config = Self::load(path).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })?;
        ImageTransform::new(&config.transform)?;

        Ok(config)
    }
}
