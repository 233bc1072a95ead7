use crate::schema::DetectorType;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const INITIAL_VERSION: SemVer = SemVer::new(1, 0, 0);
pub const INITIAL_ACCURACY: f32 = 0.85;
pub const INITIAL_CONFIDENCE_THRESHOLD: f32 = 0.65;
pub const INITIAL_TEST_SAMPLES: u32 = 1000;
/// Accuracy never climbs past this through updates.
pub const MAX_ACCURACY: f32 = 0.99;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid model version '{input}': expected v<major>.<minor>.<patch>")]
pub struct VersionParseError {
    pub input: String,
}

/// `v<major>.<minor>.<patch>`; the `v` prefix is optional when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SemVer {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemVer {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Next minor release. The patch component is carried over. `None` once
    /// the minor component is exhausted.
    pub fn bump_minor(self) -> Option<Self> {
        Some(Self {
            minor: self.minor.checked_add(1)?,
            ..self
        })
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || VersionParseError {
            input: s.to_string(),
        };
        let trimmed = s.trim();
        let body = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
        let mut parts = body.split('.');
        let mut next = || -> Result<u32, VersionParseError> {
            parts.next().ok_or_else(err)?.parse().map_err(|_| err())
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(version)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetrics {
    pub accuracy: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f1_score: Option<f32>,
    pub confidence_threshold: f32,
    pub test_samples: u32,
}

/// One trained model for one detector type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelVersion {
    pub id: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub metrics: ModelMetrics,
    pub is_active: bool,
}

impl ModelVersion {
    /// The seed model every detector type starts with.
    pub fn initial(detector_type: DetectorType, now: DateTime<Utc>) -> Self {
        Self {
            id: Self::id_for(detector_type, INITIAL_VERSION),
            version: INITIAL_VERSION.to_string(),
            timestamp: now,
            metrics: ModelMetrics {
                accuracy: INITIAL_ACCURACY,
                precision: None,
                recall: None,
                f1_score: None,
                confidence_threshold: INITIAL_CONFIDENCE_THRESHOLD,
                test_samples: INITIAL_TEST_SAMPLES,
            },
            is_active: true,
        }
    }

    pub fn id_for(detector_type: DetectorType, version: SemVer) -> String {
        format!("{detector_type}-{version}")
    }

    pub fn semver(&self) -> Result<SemVer, VersionParseError> {
        self.version.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_with_and_without_prefix() {
        assert_eq!("v1.2.3".parse::<SemVer>(), Ok(SemVer::new(1, 2, 3)));
        assert_eq!("1.2.3".parse::<SemVer>(), Ok(SemVer::new(1, 2, 3)));
        assert!("v1.2".parse::<SemVer>().is_err());
        assert!("v1.2.3.4".parse::<SemVer>().is_err());
        assert!("one.two.three".parse::<SemVer>().is_err());
    }

    #[test]
    fn bump_keeps_patch() {
        assert_eq!(SemVer::new(1, 4, 2).bump_minor(), Some(SemVer::new(1, 5, 2)));
        assert_eq!(
            SemVer::new(1, 4, 2).bump_minor().map(|v| v.to_string()).as_deref(),
            Some("v1.5.2")
        );
        assert_eq!(SemVer::new(1, u32::MAX, 0).bump_minor(), None);
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(SemVer::new(1, 10, 0) > SemVer::new(1, 9, 9));
        assert!(SemVer::new(2, 0, 0) > SemVer::new(1, 99, 0));
    }

    #[test]
    fn initial_model_defaults() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let model = ModelVersion::initial(DetectorType::Document, now);
        assert_eq!(model.id, "document-v1.0.0");
        assert_eq!(model.version, "v1.0.0");
        assert_eq!(model.metrics.accuracy, INITIAL_ACCURACY);
        assert_eq!(model.metrics.confidence_threshold, 0.65);
        assert_eq!(model.metrics.test_samples, 1000);
        assert!(model.is_active);
    }

    #[test]
    fn serializes_camel_case() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let json = serde_json::to_value(ModelVersion::initial(DetectorType::Barcode, now)).unwrap();
        assert_eq!(json["isActive"], true);
        assert_eq!(json["metrics"]["testSamples"], 1000);
        assert!(json["metrics"].get("f1Score").is_none());
    }
}
