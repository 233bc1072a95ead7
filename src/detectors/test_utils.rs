//! Fixtures shared by unit and integration tests.

use crate::detectors::{DetectContext, DetectError, Detector, ImageAnalysis, VisionBackend};
use crate::registry::ModelVersion;
use crate::schema::{
    BarcodeFormat, BarcodePayload, ContextPayload, ContextType, DetectionOptions, DetectionPayload,
    DetectionResult, DetectorType, DocumentPayload, DocumentType, ImagePayload, ProductInfo,
    ProductPayload,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const RECEIPT_TEXT: &str = "GROCERY STORE\n123 Market St.\nCity, State 12345\n\nDATE: 04/03/2025\nTIME: 14:35\n\nApples      $4.99\nBread       $3.50\nMilk        $2.99\n\nSubtotal    $11.48\nTax (8%)     $0.92\n\nTOTAL       $12.40\n\nTHANK YOU FOR SHOPPING!";

pub const INVOICE_TEXT: &str = "INVOICE\nInvoice #: INV-2025-04-123\nDate: April 3, 2025\n\nFrom: ABC Services Inc.\nTo: XYZ Corporation\n\nServices Rendered:\nConsulting (10 hrs)    $1,500.00\nMaterials              $350.00\n\nTotal Due: $1,850.00\n\nPayment due within 30 days.";

pub const INVITATION_TEXT: &str = "You're Invited!\n\nJohn & Sarah's Wedding\nSaturday, June 15, 2025\n3:00 PM\n\nThe Grand Venue\n123 Celebration Dr.\nNew York, NY 10001\n\nRSVP by May 1st\ncontact@example.com";

pub const EVENT_TEXT: &str = "Hey everyone! Let's meet up this Saturday at 7pm at Café Milano. Can't wait to see you all there! Address is 456 Main St.";

pub const SHOPPING_TEXT: &str =
    "Don't forget to pick up:\n- Milk\n- Bread\n- Eggs (dozen)\n- Apples\n- Laundry detergent";

pub const CONTACT_TEXT: &str = "John Smith\nCEO, Acme Inc.\njohn.smith@acme.com\n(555) 123-4567\n123 Business Ave, Suite 100, San Francisco, CA 94107";

/// Thursday 2025-04-03, noon UTC.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 3, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

/// A detection context pinned to [`fixed_now`] with no active model.
pub fn context(options: DetectionOptions) -> DetectContext {
    DetectContext::new(options).at(fixed_now())
}

pub fn instant_vision() -> Arc<dyn VisionBackend> {
    Arc::new(crate::detectors::SimulatedVision::new())
}

pub fn model_with_threshold(detector_type: DetectorType, threshold: f32) -> ModelVersion {
    let mut model = ModelVersion::initial(detector_type, fixed_now());
    model.metrics.confidence_threshold = threshold;
    model
}

/// Minimal payload of the given type, for stubs.
pub fn sample_payload(detector_type: DetectorType) -> DetectionPayload {
    match detector_type {
        DetectorType::Barcode => DetectionPayload::Barcode(BarcodePayload {
            format: BarcodeFormat::Qr,
            value: "https://example.com".into(),
            product_info: None,
        }),
        DetectorType::Product => DetectionPayload::Product(ProductPayload {
            product_info: ProductInfo {
                name: "Sample".into(),
                ..Default::default()
            },
            detected_features: Vec::new(),
        }),
        DetectorType::Document => DetectionPayload::Document(DocumentPayload {
            document_type: DocumentType::Document,
            extracted_text: None,
            metadata: Default::default(),
        }),
        DetectorType::Context => DetectionPayload::Context(ContextPayload {
            context_type: ContextType::Unknown,
            extracted_text: None,
            entities: Vec::new(),
            suggested_action: None,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StubBehavior {
    Returns(f32),
    Nothing,
    Fails,
    Panics,
}

/// Scripted detector for exercising the engine. Ignores the image and the
/// advisory threshold; counts invocations.
pub struct StubDetector {
    detector_type: DetectorType,
    behavior: StubBehavior,
    delay: Duration,
    calls: AtomicUsize,
}

impl StubDetector {
    pub fn new(detector_type: DetectorType, behavior: StubBehavior) -> Self {
        Self {
            detector_type,
            behavior,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn returning(detector_type: DetectorType, confidence: f32) -> Self {
        Self::new(detector_type, StubBehavior::Returns(confidence))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detector_type(&self) -> DetectorType {
        self.detector_type
    }

    async fn detect(
        &self,
        _image: &ImagePayload,
        ctx: &DetectContext,
    ) -> Result<Option<DetectionResult>, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.behavior {
            StubBehavior::Returns(confidence) => {
                let mut result =
                    DetectionResult::new(sample_payload(self.detector_type), confidence, ctx.now);
                result.model_version = ctx.model.as_ref().map(|m| m.id.clone());
                Ok(Some(result))
            }
            StubBehavior::Nothing => Ok(None),
            StubBehavior::Fails => Err(DetectError::Backend("stub failure".into())),
            StubBehavior::Panics => panic!("stub detector panicked"),
        }
    }
}

/// Vision backend that always errors.
pub struct FailingVision;

#[async_trait]
impl VisionBackend for FailingVision {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn analyze(
        &self,
        _image: &ImagePayload,
        _language: Option<&str>,
    ) -> Result<ImageAnalysis, DetectError> {
        Err(DetectError::Backend("vision unavailable".into()))
    }
}
