use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, registry, Layer};

use crate::{
    config::RecognitionConfig,
    error::Error,
    inference::{infer_with, Prediction},
    state::{Backend, LazyClassifier},
    transform::{decode_image, open_image, ImageTransform},
};

/// Bundled picture of a handwritten 8, used by the `example` command.
pub static EXAMPLE_IMAGE: &[u8] = include_bytes!("../assets/demo_8.pgm");

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "digit-recognition",
    version,
    about = "Digit Recognition. Model: LeNet. Dataset: MNIST"
)]
pub struct Cli {
    /// Classifier parameters (`.pt`, `.pth` or `.mpk`). Overrides the configuration file.
    #[arg(long, global = true)]
    pub weights: Option<PathBuf>,

    /// JSON configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of classes of the saved classifier. Overrides the configuration file.
    #[arg(long, global = true)]
    pub num_classes: Option<usize>,

    /// Log debug messages.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// How the input is given.
    #[command(subcommand)]
    pub command: Command,
}

/// Input mode, one per interaction.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Classify an image file.
    Upload {
        /// Image of a digit (png, jpg, ...).
        image: PathBuf,
    },
    /// Classify the bundled example image.
    Example,
}

impl Cli {
    /// Build the configuration from the file given with `--config` and the command line overrides.
    pub fn recognition_config(&self) -> Result<RecognitionConfig, Error> {
        let mut config = match &self.config {
            Some(path) => RecognitionConfig::from_file(path)?,
            None => RecognitionConfig::default(),
        };

        if let Some(weights) = &self.weights {
            config.weights = weights.clone();
        }
        if let Some(num_classes) = self.num_classes {
            config.model.num_classes = num_classes;
        }

        Ok(config)
    }
}

/// Install the stderr logger. Does nothing if a global subscriber is already set.
pub fn install_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(level);

    let _ = registry().with(layer).try_init();
}

/// Run one interaction and return the message to display.
pub fn run(cli: &Cli) -> Result<String, Error> {
    let config = cli.recognition_config()?;
    let classifier = LazyClassifier::<Backend>::from_config(&config, Default::default());
    let transform = ImageTransform::new(&config.transform)?;

    // The parameters must be usable before any input is looked at.
    let classifier = classifier.get()?;

    let (subject, image) = match &cli.command {
        Command::Upload { image } => {
            log::info!("Classifying '{}'", image.display());
            ("The uploaded image", open_image(image)?)
        }
        Command::Example => {
            log::info!("Classifying the bundled example image");
            ("The image", decode_image(EXAMPLE_IMAGE)?)
        }
    };
    log::debug!("Source image is {}x{}", image.width(), image.height());

    let prediction = infer_with(&transform, &image, classifier)?;

    Ok(message(subject, &prediction))
}

/// Sentence shown to the user for a prediction.
pub fn message(subject: &str, prediction: &Prediction) -> String {
    format!(
        "{subject} is of the digit {} with {:.2} % probability.",
        prediction.label, prediction.confidence
    )
}
