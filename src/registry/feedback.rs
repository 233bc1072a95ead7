use crate::schema::DetectorType;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A user's verdict on one returned detection. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub timestamp: DateTime<Utc>,
    pub detector_type: DetectorType,
    /// The detection as it was returned to the user.
    pub detection_result: Value,
    pub is_accurate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_correction: Option<Value>,
    /// Model version that produced the detection, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSummary {
    pub total: usize,
    pub accurate: usize,
    pub inaccurate: usize,
    /// `None` until at least one record exists.
    pub accuracy_rate: Option<f32>,
}

impl FeedbackSummary {
    pub fn from_records(records: &[FeedbackRecord]) -> Self {
        let total = records.len();
        let accurate = records.iter().filter(|r| r.is_accurate).count();
        Self {
            total,
            accurate,
            inaccurate: total - accurate,
            accuracy_rate: (total > 0).then(|| accurate as f32 / total as f32),
        }
    }
}

pub fn feedback_key(detector_type: DetectorType) -> String {
    format!("feedback/{detector_type}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(is_accurate: bool) -> FeedbackRecord {
        FeedbackRecord {
            timestamp: Utc::now(),
            detector_type: DetectorType::Barcode,
            detection_result: Value::Null,
            is_accurate,
            user_correction: None,
            model_version: None,
        }
    }

    #[test]
    fn summary_counts_verdicts() {
        let summary =
            FeedbackSummary::from_records(&[record(true), record(true), record(false), record(true)]);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.accurate, 3);
        assert_eq!(summary.inaccurate, 1);
        assert_eq!(summary.accuracy_rate, Some(0.75));
    }

    #[test]
    fn empty_summary_has_no_rate() {
        assert_eq!(FeedbackSummary::from_records(&[]).accuracy_rate, None);
    }

    #[test]
    fn keys_are_per_type() {
        assert_eq!(feedback_key(DetectorType::Document), "feedback/document");
    }
}
