use super::{DetectionStatus, Listener, SessionSnapshot};
use crate::engine::DetectionEngine;
use crate::schema::{DetectionOptions, DetectionResult, DetectorType, ImagePayload};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

pub const BARCODE_THRESHOLD: f32 = 0.6;
pub const PRODUCT_THRESHOLD: f32 = 0.65;

/// One detection request at a time, with the latest outcome cached.
pub struct DetectionSession {
    engine: Arc<DetectionEngine>,
    defaults: DetectionOptions,
    state: Mutex<SessionSnapshot>,
    listeners: Mutex<Vec<Listener>>,
}

impl DetectionSession {
    pub fn new(engine: Arc<DetectionEngine>) -> Self {
        Self::with_defaults(engine, DetectionOptions::default())
    }

    /// Options left unset on a request fall back to `defaults`.
    pub fn with_defaults(engine: Arc<DetectionEngine>, defaults: DetectionOptions) -> Self {
        Self {
            engine,
            defaults,
            state: Mutex::new(SessionSnapshot::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// A session scoped to one detector type. Barcode and product scans
    /// default to their usual thresholds.
    pub fn for_type(engine: Arc<DetectionEngine>, detector_type: DetectorType) -> Self {
        let mut defaults = DetectionOptions::new().preferred(detector_type);
        defaults.confidence_threshold = match detector_type {
            DetectorType::Barcode => Some(BARCODE_THRESHOLD),
            DetectorType::Product => Some(PRODUCT_THRESHOLD),
            _ => None,
        };
        Self::with_defaults(engine, defaults)
    }

    pub fn on_change(&self, listener: impl Fn(&SessionSnapshot) + Send + Sync + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().clone()
    }

    pub fn status(&self) -> DetectionStatus {
        self.state.lock().status
    }

    pub async fn detect(
        &self,
        image: &ImagePayload,
        options: Option<DetectionOptions>,
    ) -> Option<DetectionResult> {
        let options = self.effective(options);
        self.begin();
        match self.engine.process(image, &options).await {
            Ok(result) => {
                self.update(|s| {
                    s.status = status_for(result.is_some());
                    s.result = result.clone();
                });
                result
            }
            Err(e) => {
                warn!(error = %e, "detection request rejected");
                self.fail(e.to_string());
                None
            }
        }
    }

    /// Every result above threshold; the best one also becomes `result`.
    pub async fn detect_multiple(
        &self,
        image: &ImagePayload,
        options: Option<DetectionOptions>,
    ) -> Vec<DetectionResult> {
        let options = self.effective(options);
        self.begin();
        match self.engine.process_multiple(image, &options).await {
            Ok(results) => {
                self.update(|s| {
                    s.status = status_for(!results.is_empty());
                    s.result = results.first().cloned();
                    s.results = results.clone();
                });
                results
            }
            Err(e) => {
                warn!(error = %e, "detection request rejected");
                self.fail(e.to_string());
                Vec::new()
            }
        }
    }

    pub fn reset(&self) {
        self.update(|s| *s = SessionSnapshot::default());
    }

    fn effective(&self, options: Option<DetectionOptions>) -> DetectionOptions {
        let Some(mut options) = options else {
            return self.defaults.clone();
        };
        options.preferred_type = options.preferred_type.or(self.defaults.preferred_type);
        options.confidence_threshold = options
            .confidence_threshold
            .or(self.defaults.confidence_threshold);
        options.max_results = options.max_results.or(self.defaults.max_results);
        options
    }

    fn begin(&self) {
        self.update(|s| {
            s.status = DetectionStatus::Detecting;
            s.error = None;
        });
    }

    fn fail(&self, message: String) {
        self.update(|s| {
            s.status = DetectionStatus::Error;
            s.error = Some(message);
        });
    }

    fn update(&self, change: impl FnOnce(&mut SessionSnapshot)) {
        let snapshot = {
            let mut state = self.state.lock();
            change(&mut state);
            state.clone()
        };
        for listener in self.listeners.lock().iter() {
            listener(&snapshot);
        }
    }
}

pub(crate) fn status_for(found: bool) -> DetectionStatus {
    if found {
        DetectionStatus::Success
    } else {
        DetectionStatus::NothingDetected
    }
}
