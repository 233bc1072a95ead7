use crate::config::ScanConfig;
use crate::detectors::{
    BarcodeDetector, ContextDetector, DetectContext, DetectError, Detector, DocumentDetector,
    ProductDetector, VisionBackend,
};
use crate::registry::ModelRegistry;
use crate::schema::{DetectionOptions, DetectionResult, DetectorType, ImagePayload, ValidationError};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs detectors over an image and arbitrates among their results.
///
/// Detectors run concurrently in registration order; a detector that fails,
/// panics or times out contributes no result and never fails the call.
pub struct DetectionEngine {
    detectors: Vec<Arc<dyn Detector>>,
    registry: Option<Arc<ModelRegistry>>,
    timeout: Option<Duration>,
    respect_model_threshold: bool,
}

impl DetectionEngine {
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
            registry: None,
            timeout: None,
            respect_model_threshold: true,
        }
    }

    /// Barcode, product, document and context detectors sharing one vision
    /// backend, with latencies and timeout taken from `config`.
    pub fn standard(config: &ScanConfig, vision: Arc<dyn VisionBackend>) -> Self {
        let latency = |t| config.simulation.latency(t);
        Self::new()
            .register(BarcodeDetector::new(
                vision.clone(),
                latency(DetectorType::Barcode),
            ))
            .register(ProductDetector::new(
                vision.clone(),
                latency(DetectorType::Product),
            ))
            .register(DocumentDetector::new(
                vision.clone(),
                latency(DetectorType::Document),
            ))
            .register(ContextDetector::new(vision, latency(DetectorType::Context)))
            .with_timeout(config.detection.timeout())
            .respecting_model_threshold(config.detection.respect_model_threshold)
    }

    pub fn register<D: Detector + 'static>(self, detector: D) -> Self {
        self.register_shared(Arc::new(detector))
    }

    pub fn register_shared(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Detectors read their active model (and its threshold) from `registry`.
    pub fn with_registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn respecting_model_threshold(mut self, respect: bool) -> Self {
        self.respect_model_threshold = respect;
        self
    }

    pub fn detector_types(&self) -> Vec<DetectorType> {
        self.detectors.iter().map(|d| d.detector_type()).collect()
    }

    pub fn registry(&self) -> Option<&Arc<ModelRegistry>> {
        self.registry.as_ref()
    }

    /// Best single result from the detectors matching `preferred_type`, or
    /// from all of them when unset.
    pub async fn process(
        &self,
        image: &ImagePayload,
        options: &DetectionOptions,
    ) -> Result<Option<DetectionResult>, ValidationError> {
        options.validate(image)?;
        let selected: Vec<_> = match options.preferred_type {
            Some(preferred) => self
                .detectors
                .iter()
                .filter(|d| d.detector_type() == preferred)
                .cloned()
                .collect(),
            None => self.detectors.clone(),
        };
        let results = self.arbitrate(self.run(selected, image, options).await, options);
        Ok(results.into_iter().next())
    }

    /// All results from every detector, ignoring `preferred_type`, best first
    /// and capped at `max_results`.
    pub async fn process_multiple(
        &self,
        image: &ImagePayload,
        options: &DetectionOptions,
    ) -> Result<Vec<DetectionResult>, ValidationError> {
        options.validate(image)?;
        let results = self.run(self.detectors.clone(), image, options).await;
        let mut results = self.arbitrate(results, options);
        if let Some(max) = options.max_results {
            results.truncate(max);
        }
        Ok(results)
    }

    /// Sorts best-first (stable, so registration order breaks ties) and
    /// applies the caller's threshold as a hard cutoff.
    fn arbitrate(
        &self,
        mut results: Vec<DetectionResult>,
        options: &DetectionOptions,
    ) -> Vec<DetectionResult> {
        results.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        results.retain(|r| options.accepts(r.confidence));
        if !options.include_raw_image {
            for result in &mut results {
                result.raw_image = None;
            }
        }
        results
    }

    async fn run(
        &self,
        detectors: Vec<Arc<dyn Detector>>,
        image: &ImagePayload,
        options: &DetectionOptions,
    ) -> Vec<DetectionResult> {
        let now = Utc::now();
        let names: Vec<&'static str> = detectors.iter().map(|d| d.name()).collect();
        let tasks = detectors.into_iter().map(|detector| {
            let model = self
                .registry
                .as_ref()
                .and_then(|r| r.active_model(detector.detector_type()));
            let ctx = DetectContext::new(options.clone())
                .at(now)
                .with_model(model)
                .respecting_model_threshold(self.respect_model_threshold);
            let image = image.clone();
            let timeout = self.timeout;
            tokio::spawn(async move { run_detector(detector, image, ctx, timeout).await })
        });

        join_all(tasks)
            .await
            .into_iter()
            .zip(names)
            .filter_map(|(joined, name)| {
                let outcome = joined.unwrap_or_else(|e| {
                    if e.is_panic() {
                        Err(DetectError::Panicked { detector: name })
                    } else {
                        Err(DetectError::Backend(e.to_string()))
                    }
                });
                match outcome {
                    Ok(result) => {
                        debug!(
                            detector = name,
                            confidence = result.as_ref().map(|r| r.confidence),
                            "detector finished"
                        );
                        result
                    }
                    Err(e) => {
                        warn!(detector = name, error = %e, "detector failed");
                        None
                    }
                }
            })
            .collect()
    }
}

async fn run_detector(
    detector: Arc<dyn Detector>,
    image: ImagePayload,
    ctx: DetectContext,
    timeout: Option<Duration>,
) -> Result<Option<DetectionResult>, DetectError> {
    let detect = detector.detect(&image, &ctx);
    match timeout {
        Some(after) => tokio::time::timeout(after, detect)
            .await
            .map_err(|_| DetectError::Timeout {
                detector: detector.name(),
                after,
            })?,
        None => detect.await,
    }
}

impl Default for DetectionEngine {
    fn default() -> Self {
        Self::new()
    }
}
