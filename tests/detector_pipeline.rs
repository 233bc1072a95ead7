//! End-to-end runs of the standard detectors through the engine.

use insta::assert_json_snapshot;
use scansense::detectors::document::extract_metadata;
use scansense::detectors::test_utils::{EVENT_TEXT, INVITATION_TEXT, RECEIPT_TEXT, fixed_now};
use scansense::registry::{ModelRegistry, SimulatedUpdateSource};
use scansense::schema::{
    BarcodeFormat, ContextType, DetectionOptions, DetectorType, DocumentType, ImagePayload,
    SuggestedAction,
};
use scansense::{DetectionEngine, ScanConfig, SimulatedVision};
use std::sync::Arc;

fn engine() -> DetectionEngine {
    let mut config = ScanConfig::default();
    config.simulation.instant();
    let registry = ModelRegistry::in_memory(Arc::new(SimulatedUpdateSource::never())).unwrap();
    DetectionEngine::standard(&config, Arc::new(SimulatedVision::new())).with_registry(registry)
}

fn only(detector_type: DetectorType) -> DetectionOptions {
    DetectionOptions::new().preferred(detector_type)
}

#[tokio::test]
async fn invitation_is_classified() {
    let result = engine()
        .process(&ImagePayload::from(INVITATION_TEXT), &only(DetectorType::Document))
        .await
        .unwrap()
        .unwrap();
    let document = result.as_document().unwrap();
    assert_eq!(document.document_type, DocumentType::Invitation);
    assert_eq!(document.metadata["hosts"], serde_json::json!(["John", "Sarah"]));
    assert_eq!(result.model_version.as_deref(), Some("document-v1.0.0"));
}

#[test]
fn invitation_metadata() {
    let metadata = extract_metadata(DocumentType::Invitation, INVITATION_TEXT, &[], fixed_now());
    assert_json_snapshot!(metadata, @r###"
    {
      "contactEmail": "contact@example.com",
      "date": "2025-06-15",
      "eventType": "Wedding",
      "hosts": [
        "John",
        "Sarah"
      ],
      "location": "The Grand Venue, 123 Celebration Dr., New York, NY 10001",
      "rsvpDeadline": "2025-05-01",
      "time": "15:00"
    }
    "###);
}

#[tokio::test]
async fn package_barcode_resolves_catalog_product() {
    let image = ImagePayload::from("Morning Brew\nCoffee Beans\nDark Roast 340g\n$12.99\n5901234123457");
    let result = engine()
        .process(&image, &only(DetectorType::Barcode))
        .await
        .unwrap()
        .unwrap();
    let barcode = result.as_barcode().unwrap();
    assert_eq!(barcode.format, BarcodeFormat::Ean);
    assert_eq!(barcode.value, "5901234123457");
    let info = barcode.product_info.as_ref().unwrap();
    assert_eq!(info.name, "Coffee Beans");
    assert_eq!(info.brand.as_deref(), Some("Morning Brew"));
}

#[tokio::test]
async fn receipt_is_among_ranked_results() {
    let results = engine()
        .process_multiple(&ImagePayload::from(RECEIPT_TEXT), &DetectionOptions::new())
        .await
        .unwrap();
    assert!(results.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    assert!(results.iter().any(|r| {
        r.as_document()
            .is_some_and(|d| d.document_type == DocumentType::Receipt)
    }));
}

#[tokio::test]
async fn chat_screenshot_becomes_calendar_entry() {
    let result = engine()
        .process(&ImagePayload::from(EVENT_TEXT), &only(DetectorType::Context))
        .await
        .unwrap()
        .unwrap();
    let context = result.as_context().unwrap();
    assert_eq!(context.context_type, ContextType::Event);
    assert!(matches!(
        context.suggested_action,
        Some(SuggestedAction::AddToCalendar(_))
    ));
}

#[tokio::test]
async fn model_threshold_filters_weak_documents() {
    let image = ImagePayload::from("Meeting notes from the planning session");
    assert!(
        engine()
            .process(&image, &only(DetectorType::Document))
            .await
            .unwrap()
            .is_none()
    );

    let lenient = engine().respecting_model_threshold(false);
    let result = lenient
        .process(&image, &only(DetectorType::Document))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        result.as_document().unwrap().document_type,
        DocumentType::Document
    );

    let explicit = only(DetectorType::Document).with_threshold(0.5);
    assert!(engine().process(&image, &explicit).await.unwrap().is_some());
}

#[tokio::test]
async fn opaque_images_are_deterministic() {
    let image = ImagePayload::from_bytes(vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0x4a, 0x46]);
    let engine = engine();
    let first = engine
        .process_multiple(&image, &DetectionOptions::new())
        .await
        .unwrap();
    let second = engine
        .process_multiple(&image, &DetectionOptions::new())
        .await
        .unwrap();
    let summary = |results: &[scansense::DetectionResult]| {
        results
            .iter()
            .map(|r| (r.detector_type(), r.confidence))
            .collect::<Vec<_>>()
    };
    assert_eq!(summary(&first), summary(&second));
}

#[tokio::test]
async fn raw_image_echo_is_opt_in() {
    let image = ImagePayload::from(INVITATION_TEXT);
    let engine = engine();
    let plain = engine
        .process(&image, &only(DetectorType::Document))
        .await
        .unwrap()
        .unwrap();
    assert!(plain.raw_image.is_none());

    let echoed = engine
        .process(&image, &only(DetectorType::Document).with_raw_image(true))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echoed.raw_image, Some(image));
}
