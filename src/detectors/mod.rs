use crate::registry::ModelVersion;
use crate::schema::{DetectionOptions, DetectionPayload, DetectionResult, DetectorType, ImagePayload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub mod barcode;
pub mod catalog;
pub mod context;
pub mod document;
pub mod product;
pub mod rules;
pub mod test_utils;
pub mod utils;
pub mod vision;

pub use barcode::BarcodeDetector;
pub use context::ContextDetector;
pub use document::DocumentDetector;
pub use product::ProductDetector;
pub use vision::{ImageAnalysis, SimulatedVision, VisionBackend};

/// Confidence levels shared by the detectors.
pub mod confidence {
    /// Check digit validated.
    pub const VERIFIED: f32 = 0.95;
    pub const HIGH: f32 = 0.9;
    pub const MEDIUM: f32 = 0.75;
    pub const LOW: f32 = 0.6;
    /// Floor for a document classification.
    pub const MIN_DOCUMENT: f32 = 0.5;
    /// Ceiling for a document classification.
    pub const MAX_DOCUMENT: f32 = 0.98;
}

/// A failure inside one detector run. Never crosses the engine boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectError {
    #[error("vision backend failed: {0}")]
    Backend(String),
    #[error("{detector} detector timed out after {after:?}")]
    Timeout {
        detector: &'static str,
        after: Duration,
    },
    #[error("{detector} detector panicked")]
    Panicked { detector: &'static str },
}

/// Everything a detector may read besides the image.
#[derive(Debug, Clone)]
pub struct DetectContext {
    pub options: DetectionOptions,
    /// Active model for the detector's type at the time of the call.
    pub model: Option<ModelVersion>,
    /// Reference clock for timestamps and relative dates.
    pub now: DateTime<Utc>,
    pub respect_model_threshold: bool,
}

impl DetectContext {
    pub fn new(options: DetectionOptions) -> Self {
        Self {
            options,
            model: None,
            now: Utc::now(),
            respect_model_threshold: true,
        }
    }

    pub fn with_model(mut self, model: Option<ModelVersion>) -> Self {
        self.model = model;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn respecting_model_threshold(mut self, respect: bool) -> Self {
        self.respect_model_threshold = respect;
        self
    }

    /// Advisory floor a detector applies before returning. The caller's
    /// threshold wins; otherwise the active model's calibrated threshold.
    pub fn advisory_threshold(&self) -> Option<f32> {
        self.options.confidence_threshold.or_else(|| {
            self.respect_model_threshold
                .then(|| self.model.as_ref().map(|m| m.metrics.confidence_threshold))
                .flatten()
        })
    }

    /// Wraps a payload into a result stamped with this context, or drops it
    /// when it falls below the advisory floor.
    pub fn finish(
        &self,
        image: &ImagePayload,
        payload: DetectionPayload,
        confidence: f32,
    ) -> Option<DetectionResult> {
        let mut result = DetectionResult::new(payload, confidence, self.now);
        if let Some(floor) = self.advisory_threshold()
            && result.confidence < floor
        {
            tracing::debug!(
                detector = %result.detector_type(),
                confidence = result.confidence,
                floor,
                "dropping result below advisory threshold"
            );
            return None;
        }
        if self.options.include_raw_image {
            result.raw_image = Some(image.clone());
        }
        result.model_version = self.model.as_ref().map(|m| m.id.clone());
        Some(result)
    }
}

/// The detect-from-image contract every classifier implements.
#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detector_type(&self) -> DetectorType;

    async fn detect(
        &self,
        image: &ImagePayload,
        ctx: &DetectContext,
    ) -> Result<Option<DetectionResult>, DetectError>;
}

/// Simulated inference latency; zero skips the timer entirely.
pub(crate) async fn simulate_latency(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}
