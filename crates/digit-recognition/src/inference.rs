use burn::tensor::{activation::softmax, backend::Backend, Tensor};
use image::DynamicImage;

use crate::{error::InvalidImageError, model::LeNetClassifier, transform::ImageTransform};

/// Result of classifying one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Most probable class.
    pub label: usize,
    /// Probability of `label`, in percent.
    pub confidence: f32,
    /// Probability of every class, summing to one.
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// Pick the most probable class.
    ///
    /// Ties go to the lowest class index. An empty vector yields label 0 with no confidence.
    pub fn from_probabilities(probabilities: Vec<f32>) -> Self {
        let mut label = 0;
        let mut max = probabilities.first().copied().unwrap_or_default();

        for (index, &probability) in probabilities.iter().enumerate().skip(1) {
            if probability > max {
                label = index;
                max = probability;
            }
        }

        Self {
            label,
            confidence: max * 100.0,
            probabilities,
        }
    }
}

/// Convert a `[1, num_classes]` logits tensor into class probabilities.
pub fn softmax_probabilities<B: Backend>(logits: Tensor<B, 2>) -> Vec<f32> {
    softmax(logits, 1).into_data().iter::<f32>().collect()
}

/// Classify `image` with the default preprocessing.
pub fn infer<B: Backend>(
    image: &DynamicImage,
    classifier: &LeNetClassifier<B>,
) -> Result<Prediction, InvalidImageError> {
    infer_with(&ImageTransform::default(), image, classifier)
}

/// Classify `image`, preprocessing it with `transform`.
///
/// The classifier is only read, so concurrent calls can share it.
pub fn infer_with<B: Backend>(
    transform: &ImageTransform,
    image: &DynamicImage,
    classifier: &LeNetClassifier<B>,
) -> Result<Prediction, InvalidImageError> {
    let input = transform.apply::<B>(image, &classifier.device())?;
    let logits = classifier.forward(input);
    let prediction = Prediction::from_probabilities(softmax_probabilities(logits));

    log::info!(
        "Predicted digit {} with {:.2} % probability",
        prediction.label,
        prediction.confidence
    );

    Ok(prediction)
}
