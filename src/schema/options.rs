use super::{DetectorType, ImagePayload};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Caller-facing input errors. Distinct from "nothing detected".
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("image payload is empty")]
    EmptyImage,
    #[error("confidence threshold must be within [0, 1], got {value}")]
    ThresholdOutOfRange { value: f32 },
    #[error("max results must be at least 1")]
    ZeroMaxResults,
    #[error("language hint must not be blank")]
    BlankLanguage,
}

/// Per-request detection options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionOptions {
    /// Restricts `process` to one detector. Ignored by `process_multiple`.
    pub preferred_type: Option<DetectorType>,
    pub include_raw_image: bool,
    pub confidence_threshold: Option<f32>,
    pub max_results: Option<usize>,
    pub language: Option<String>,
    #[serde(rename = "enableOCR")]
    pub enable_ocr: bool,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            preferred_type: None,
            include_raw_image: false,
            confidence_threshold: None,
            max_results: None,
            language: None,
            enable_ocr: true,
        }
    }
}

impl DetectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preferred(mut self, detector_type: DetectorType) -> Self {
        self.preferred_type = Some(detector_type);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_raw_image(mut self, include: bool) -> Self {
        self.include_raw_image = include;
        self
    }

    pub fn with_ocr(mut self, enable: bool) -> Self {
        self.enable_ocr = enable;
        self
    }

    /// Checks the request before any detector runs.
    pub fn validate(&self, image: &ImagePayload) -> Result<(), ValidationError> {
        if image.is_empty() {
            return Err(ValidationError::EmptyImage);
        }
        if let Some(value) = self.confidence_threshold
            && !(0.0..=1.0).contains(&value)
        {
            // NaN fails `contains` as well
            return Err(ValidationError::ThresholdOutOfRange { value });
        }
        if self.max_results == Some(0) {
            return Err(ValidationError::ZeroMaxResults);
        }
        if let Some(language) = &self.language
            && language.trim().is_empty()
        {
            return Err(ValidationError::BlankLanguage);
        }
        Ok(())
    }

    /// True when a result with `confidence` survives the threshold cutoff.
    pub fn accepts(&self, confidence: f32) -> bool {
        self.confidence_threshold.is_none_or(|t| confidence >= t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_ocr() {
        let options = DetectionOptions::default();
        assert!(options.enable_ocr);
        assert!(!options.include_raw_image);
        assert_eq!(options.preferred_type, None);
    }

    #[test]
    fn empty_image_is_rejected() {
        let err = DetectionOptions::new()
            .validate(&ImagePayload::default())
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyImage);
    }

    #[test]
    fn threshold_must_be_a_probability() {
        let image = ImagePayload::from("x");
        assert!(DetectionOptions::new().with_threshold(0.0).validate(&image).is_ok());
        assert!(DetectionOptions::new().with_threshold(1.0).validate(&image).is_ok());
        assert!(DetectionOptions::new().with_threshold(1.2).validate(&image).is_err());
        assert!(DetectionOptions::new().with_threshold(-0.1).validate(&image).is_err());
        assert!(
            DetectionOptions::new()
                .with_threshold(f32::NAN)
                .validate(&image)
                .is_err()
        );
    }

    #[test]
    fn zero_max_results_is_rejected() {
        let image = ImagePayload::from("x");
        let err = DetectionOptions::new()
            .with_max_results(0)
            .validate(&image)
            .unwrap_err();
        assert_eq!(err, ValidationError::ZeroMaxResults);
    }

    #[test]
    fn accepts_respects_threshold() {
        let options = DetectionOptions::new().with_threshold(0.5);
        assert!(options.accepts(0.5));
        assert!(options.accepts(0.9));
        assert!(!options.accepts(0.4));
        assert!(DetectionOptions::new().accepts(0.0));
    }

    #[test]
    fn deserializes_camel_case_with_defaults() {
        let options: DetectionOptions =
            serde_json::from_str(r#"{"preferredType":"document","enableOCR":false}"#).unwrap();
        assert_eq!(options.preferred_type, Some(DetectorType::Document));
        assert!(!options.enable_ocr);
        assert_eq!(options.max_results, None);
    }
}
