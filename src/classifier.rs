//! NSFW classifier adapter.
//!
//! The classifier itself is an external black box scoring a decoded pixel
//! buffer. This module decodes images into that buffer and applies the
//! unsafe-content rule to the returned probabilities.

use std::sync::Arc;

use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ClassifierError, DecodeError};
use crate::phash;

/// Probability above which a designated category marks an image unsafe.
pub const UNSAFE_PROBABILITY_THRESHOLD: f32 = 0.60;

/// Categories whose probability is checked against the threshold.
pub const UNSAFE_CATEGORIES: [&str; 2] = ["Porn", "Hentai"];

/// Decoded RGB pixels, row-major, 3 bytes per pixel.
#[derive(Debug, Clone)]
pub struct PixelTensor {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelTensor {
    pub const CHANNELS: usize = 3;

    /// Decode encoded image bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        phash::decode(bytes).map(Self::from_rgb)
    }

    pub fn from_rgb(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }
}

/// One category score from the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub category: String,
    pub probability: f32,
}

impl Prediction {
    pub fn new(category: impl Into<String>, probability: f32) -> Self {
        Self {
            category: category.into(),
            probability,
        }
    }
}

/// External probability scorer.
#[async_trait]
pub trait NsfwClassifier: Send + Sync {
    /// Model name, for logs.
    fn name(&self) -> &str;

    async fn classify(&self, pixels: &PixelTensor) -> Result<Vec<Prediction>, ClassifierError>;
}

/// The category that tripped the rule.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsafeVerdict {
    pub category: String,
    pub probability: f32,
}

/// Apply the unsafe rule. Missing categories count as probability 0.
pub fn evaluate(predictions: &[Prediction]) -> Option<UnsafeVerdict> {
    UNSAFE_CATEGORIES.iter().find_map(|&category| {
        let probability = probability_of(predictions, category);
        (probability > UNSAFE_PROBABILITY_THRESHOLD).then(|| UnsafeVerdict {
            category: category.to_string(),
            probability,
        })
    })
}

fn probability_of(predictions: &[Prediction], category: &str) -> f32 {
    predictions
        .iter()
        .find(|p| p.category == category)
        .map(|p| p.probability)
        .unwrap_or(0.0)
}

/// Glue between raw attachment bytes and an [`NsfwClassifier`].
#[derive(Clone)]
pub struct ClassifierAdapter {
    inner: Arc<dyn NsfwClassifier>,
}

impl ClassifierAdapter {
    pub fn new(inner: Arc<dyn NsfwClassifier>) -> Self {
        Self { inner }
    }

    /// Decode `bytes`, classify them and apply the unsafe rule.
    pub async fn screen(&self, bytes: Vec<u8>) -> Result<Option<UnsafeVerdict>, ClassifierError> {
        let pixels = PixelTensor::from_rgb(phash::decode_blocking(bytes).await?);
        self.screen_pixels(&pixels).await
    }

    /// [`screen`](Self::screen) for pixels that are already decoded.
    pub async fn screen_pixels(
        &self,
        pixels: &PixelTensor,
    ) -> Result<Option<UnsafeVerdict>, ClassifierError> {
        let predictions = self.inner.classify(pixels).await?;
        debug!(
            model = self.inner.name(),
            porn = probability_of(&predictions, UNSAFE_CATEGORIES[0]),
            hentai = probability_of(&predictions, UNSAFE_CATEGORIES[1]),
            "Image classified"
        );

        let verdict = evaluate(&predictions);
        if let Some(v) = &verdict {
            info!(category = %v.category, probability = v.probability, "Unsafe image detected");
        }
        Ok(verdict)
    }
}

/// Classifier used when no model is loaded. Every call fails, which the
/// pipeline treats as "allow".
pub struct UnavailableClassifier;

#[async_trait]
impl NsfwClassifier for UnavailableClassifier {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn classify(&self, _pixels: &PixelTensor) -> Result<Vec<Prediction>, ClassifierError> {
        Err(ClassifierError::Unavailable("no model loaded".into()))
    }
}
