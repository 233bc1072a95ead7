use crate::registry::{FeedbackSummary, ModelRegistry, ModelVersion, UpdateOptions, UpdateStatus};
use crate::schema::{DetectionResult, DetectorType};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Model lifecycle as a UI shows it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    pub updates_available: BTreeMap<DetectorType, bool>,
    pub updating: bool,
    /// 0 to 100.
    pub progress: u8,
    /// Active version string per type, e.g. `v1.2.0`.
    pub active_models: BTreeMap<DetectorType, String>,
    pub last_checked: Option<DateTime<Utc>>,
}

pub struct ModelUpdateSession {
    registry: Arc<ModelRegistry>,
    status: Arc<Mutex<ModelStatus>>,
}

impl ModelUpdateSession {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        let session = Self {
            registry,
            status: Arc::new(Mutex::new(ModelStatus::default())),
        };
        session.refresh();
        session
    }

    pub fn status(&self) -> ModelStatus {
        self.status.lock().clone()
    }

    /// Re-reads active versions and availability from the registry.
    pub fn refresh(&self) {
        let mut status = self.status.lock();
        for detector_type in DetectorType::ALL {
            status.updates_available.insert(
                detector_type,
                self.registry.update_status(detector_type) == UpdateStatus::UpdateAvailable,
            );
            if let Some(model) = self.registry.active_model(detector_type) {
                status.active_models.insert(detector_type, model.version);
            }
        }
    }

    pub async fn check_for_updates(&self) -> ModelStatus {
        match self.registry.check_for_updates().await {
            Ok(_) => {
                self.refresh();
                self.status.lock().last_checked = Some(Utc::now());
            }
            Err(e) => warn!(error = %e, "update check failed"),
        }
        self.status()
    }

    pub async fn update_model(&self, detector_type: DetectorType) -> bool {
        self.begin();
        let sink = Arc::clone(&self.status);
        let options = UpdateOptions::default().with_progress(move |p| sink.lock().progress = p);
        match self.registry.update_model(detector_type, options).await {
            Ok(Some(model)) => {
                let mut status = self.status.lock();
                status.updating = false;
                status.progress = 100;
                status.updates_available.insert(detector_type, false);
                status.active_models.insert(detector_type, model.version);
                true
            }
            Ok(None) => {
                self.abort();
                false
            }
            Err(e) => {
                warn!(%detector_type, error = %e, "model update failed");
                self.abort();
                false
            }
        }
    }

    /// Activates a previous model, named by id (`barcode-v1.0.0`) or
    /// version (`v1.0.0`).
    pub async fn rollback(&self, detector_type: DetectorType, target: &str) -> bool {
        let Some(model) = self
            .registry
            .versions(detector_type)
            .into_iter()
            .find(|m| m.id == target || m.version == target)
        else {
            return false;
        };
        self.begin();
        match self.registry.rollback(detector_type, &model.id).await {
            Ok(true) => {
                let mut status = self.status.lock();
                status.updating = false;
                status.progress = 100;
                status.active_models.insert(detector_type, model.version);
                true
            }
            Ok(false) => {
                self.abort();
                false
            }
            Err(e) => {
                warn!(%detector_type, error = %e, "rollback failed");
                self.abort();
                false
            }
        }
    }

    pub fn versions(&self, detector_type: DetectorType) -> Vec<ModelVersion> {
        self.registry.versions(detector_type)
    }

    pub async fn submit_feedback(
        &self,
        result: &DetectionResult,
        is_accurate: bool,
        correction: Option<Value>,
    ) -> bool {
        match self
            .registry
            .add_feedback(result.detector_type(), result, is_accurate, correction)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "failed to record feedback");
                false
            }
        }
    }

    pub fn feedback_summary(&self, detector_type: DetectorType) -> Option<FeedbackSummary> {
        self.registry.feedback_summary(detector_type).ok()
    }

    fn begin(&self) {
        let mut status = self.status.lock();
        status.updating = true;
        status.progress = 0;
    }

    fn abort(&self) {
        let mut status = self.status.lock();
        status.updating = false;
        status.progress = 0;
    }
}
