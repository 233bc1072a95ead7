//! Stateful request/response wrappers for UI callers.
//!
//! Adapters cache the latest outcome for display and hold no authoritative
//! state; models and feedback live in the registry.

use crate::schema::DetectionResult;
use serde::Serialize;

pub mod detection;
pub mod models;
pub mod unified;

pub use detection::DetectionSession;
pub use models::{ModelStatus, ModelUpdateSession};
pub use unified::UnifiedScanSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionStatus {
    #[default]
    Idle,
    Detecting,
    Success,
    /// The call completed but nothing cleared the threshold.
    NothingDetected,
    /// The request itself was rejected.
    Error,
}

/// What a session currently shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: DetectionStatus,
    pub result: Option<DetectionResult>,
    pub results: Vec<DetectionResult>,
    pub error: Option<String>,
}

impl SessionSnapshot {
    pub fn is_detecting(&self) -> bool {
        self.status == DetectionStatus::Detecting
    }

    pub fn is_success(&self) -> bool {
        self.status == DetectionStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == DetectionStatus::Error
    }
}

pub type Listener = Box<dyn Fn(&SessionSnapshot) + Send + Sync>;
