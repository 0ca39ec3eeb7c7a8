//! Face encoder: bytes or RGB image in, zero or more embeddings out.
//!
//! The encoder never fails past its boundary. Missing models put it in a
//! permanent degraded mode where every call yields no embeddings, and any
//! per-image failure is logged and reported as "no faces".

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Embedding;
use crate::validator;
use image::RgbImage;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Anything that turns an image into face embeddings, ordered by detection confidence.
///
/// Implementations must be infallible: failure is an empty vector.
pub trait FaceEmbedder: Send + Sync {
    fn encode_image(&self, image: &RgbImage) -> Vec<Embedding>;

    /// Decode raw bytes and encode them. Undecodable bytes yield no embeddings.
    fn encode(&self, image_bytes: &[u8]) -> Vec<Embedding> {
        match validator::decode_rgb(image_bytes) {
            Ok(image) => self.encode_image(&image),
            Err(e) => {
                tracing::debug!(error = %e, "face encoding skipped: undecodable image");
                Vec::new()
            }
        }
    }

    /// The canonical (first, most confident) face embedding, if any.
    fn first_face(&self, image: &RgbImage) -> Option<Embedding> {
        self.encode_image(image).into_iter().next()
    }

    /// `true` when the embedder can never produce embeddings.
    fn is_degraded(&self) -> bool {
        false
    }
}

struct Models {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl Models {
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<Embedding>, EncoderError> {
        let faces = self.detector.detect(image)?;
        let mut embeddings = Vec::with_capacity(faces.len());
        for face in faces.iter().filter(|f| f.landmarks.is_some()) {
            embeddings.push(self.recognizer.extract(image, face)?);
        }
        Ok(embeddings)
    }
}

/// SCRFD + ArcFace encoder, shared across concurrent searches.
///
/// ONNX sessions need exclusive access to run, so inference is serialized
/// behind a mutex; share the encoder itself through an `Arc`.
pub struct FaceEncoder {
    models: Option<Mutex<Models>>,
}

impl FaceEncoder {
    /// Load both models from `model_dir`. Never fails: on error the encoder
    /// starts in degraded mode.
    pub fn load(model_dir: &Path) -> Self {
        match Self::try_load(model_dir) {
            Ok(encoder) => encoder,
            Err(e) => {
                tracing::warn!(
                    model_dir = %model_dir.display(),
                    error = %e,
                    "face models unavailable; encoder degraded to perceptual-hash matching only"
                );
                Self::degraded()
            }
        }
    }

    /// Load both models, surfacing the error instead of degrading.
    pub fn try_load(model_dir: &Path) -> Result<Self, EncoderError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        tracing::info!(model_dir = %model_dir.display(), "face encoder ready");
        Ok(Self {
            models: Some(Mutex::new(Models { detector, recognizer })),
        })
    }

    /// An encoder that never finds faces.
    pub fn degraded() -> Self {
        Self { models: None }
    }
}

impl FaceEmbedder for FaceEncoder {
    fn encode_image(&self, image: &RgbImage) -> Vec<Embedding> {
        let Some(models) = &self.models else {
            return Vec::new();
        };

        // A panic mid-inference poisons the lock; the sessions themselves stay usable.
        let mut models = models.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match models.encode(image) {
            Ok(embeddings) => {
                tracing::trace!(faces = embeddings.len(), "encoded image");
                embeddings
            }
            Err(e) => {
                tracing::debug!(error = %e, "face encoding failed");
                Vec::new()
            }
        }
    }

    fn is_degraded(&self) -> bool {
        self.models.is_none()
    }
}
