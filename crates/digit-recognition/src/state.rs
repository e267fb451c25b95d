use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use burn::tensor::backend::Backend as BackendTrait;

use crate::{
    config::RecognitionConfig,
    error::LoadError,
    model::{LeNetClassifier, LeNetClassifierConfig},
};

/// CPU backend used by the command line front end.
pub type Backend = burn::backend::ndarray::NdArray<f32>;

/// Classifier loaded from disk the first time it's needed, then kept for the lifetime of the
/// value.
///
/// The owner passes it (or the classifier it returns) to the inference functions explicitly;
/// nothing is stored in a global.
#[derive(Debug)]
pub struct LazyClassifier<B: BackendTrait> {
    config: LeNetClassifierConfig,
    weights: PathBuf,
    device: B::Device,
    classifier: OnceLock<LeNetClassifier<B>>,
}

impl<B: BackendTrait> LazyClassifier<B> {
    /// Prepare loading the parameters at `weights`; nothing is read yet.
    pub fn new(
        config: LeNetClassifierConfig,
        weights: impl Into<PathBuf>,
        device: B::Device,
    ) -> Self {
        Self {
            config,
            weights: weights.into(),
            device,
            classifier: OnceLock::new(),
        }
    }

    /// Prepare loading the classifier described by the application configuration.
    pub fn from_config(config: &RecognitionConfig, device: B::Device) -> Self {
        Self::new(config.model.clone(), config.weights.clone(), device)
    }

    /// Path of the parameter file.
    pub fn weights(&self) -> &Path {
        &self.weights
    }

    /// Whether the parameters were already loaded.
    pub fn is_loaded(&self) -> bool {
        self.classifier.get().is_some()
    }

    /// Return the classifier, loading it on the first call.
    ///
    /// A failed load isn't cached: the next call reads the file again.
    pub fn get(&self) -> Result<&LeNetClassifier<B>, LoadError> {
        if let Some(classifier) = self.classifier.get() {
            return Ok(classifier);
        }

        let classifier = self.config.load::<B>(&self.weights, &self.device)?;

        Ok(self.classifier.get_or_init(|| classifier))
    }
}
