use scansense::detectors::test_utils::{FailingVision, StubBehavior, StubDetector};
use scansense::schema::{DetectionOptions, DetectorType, ImagePayload, ValidationError};
use scansense::{DetectionEngine, ScanConfig};
use std::sync::Arc;
use std::time::Duration;

fn image() -> ImagePayload {
    ImagePayload::from("frame")
}

fn engine(confidences: &[(DetectorType, f32)]) -> DetectionEngine {
    confidences
        .iter()
        .fold(DetectionEngine::new(), |engine, (t, c)| {
            engine.register(StubDetector::returning(*t, *c))
        })
}

#[tokio::test]
async fn threshold_drops_low_confidence_results() {
    let engine = engine(&[
        (DetectorType::Barcode, 0.9),
        (DetectorType::Product, 0.4),
    ]);
    let results = engine
        .process_multiple(&image(), &DetectionOptions::new().with_threshold(0.5))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].detector_type(), DetectorType::Barcode);
    assert!((results[0].confidence - 0.9).abs() < f32::EPSILON);
}

#[tokio::test]
async fn results_are_sorted_and_capped() {
    let engine = engine(&[
        (DetectorType::Barcode, 0.3),
        (DetectorType::Product, 0.8),
        (DetectorType::Document, 0.6),
        (DetectorType::Context, 0.95),
    ]);
    let all = engine
        .process_multiple(&image(), &DetectionOptions::new())
        .await
        .unwrap();
    assert!(all.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    assert_eq!(all[0].detector_type(), DetectorType::Context);

    let capped = engine
        .process_multiple(&image(), &DetectionOptions::new().with_max_results(2))
        .await
        .unwrap();
    assert_eq!(capped.len(), 2);
    assert_eq!(&capped[..], &all[..2]);
}

#[tokio::test]
async fn ties_keep_registration_order() {
    let engine = engine(&[
        (DetectorType::Barcode, 0.7),
        (DetectorType::Product, 0.7),
        (DetectorType::Document, 0.7),
        (DetectorType::Context, 0.7),
    ]);
    let types: Vec<_> = engine
        .process_multiple(&image(), &DetectionOptions::new())
        .await
        .unwrap()
        .iter()
        .map(|r| r.detector_type())
        .collect();
    assert_eq!(types, DetectorType::ALL.to_vec());
}

#[tokio::test]
async fn process_multiple_ignores_preferred_type() {
    let engine = engine(&[
        (DetectorType::Barcode, 0.7),
        (DetectorType::Document, 0.8),
    ]);
    let options = DetectionOptions::new().preferred(DetectorType::Barcode);
    let results = engine.process_multiple(&image(), &options).await.unwrap();
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn process_only_runs_preferred_detectors() {
    let barcode = Arc::new(StubDetector::returning(DetectorType::Barcode, 0.5));
    let document = Arc::new(StubDetector::returning(DetectorType::Document, 0.9));
    let engine = DetectionEngine::new()
        .register_shared(barcode.clone())
        .register_shared(document.clone());

    let options = DetectionOptions::new().preferred(DetectorType::Barcode);
    let best = engine.process(&image(), &options).await.unwrap().unwrap();
    assert_eq!(best.detector_type(), DetectorType::Barcode);
    assert_eq!(barcode.calls(), 1);
    assert_eq!(document.calls(), 0);
}

#[tokio::test]
async fn nothing_detected_is_not_an_error() {
    let engine = DetectorType::ALL
        .into_iter()
        .fold(DetectionEngine::new(), |engine, t| {
            engine.register(StubDetector::new(t, StubBehavior::Nothing))
        });
    assert!(
        engine
            .process(&image(), &DetectionOptions::new())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn invalid_options_are_rejected() {
    let engine = engine(&[(DetectorType::Barcode, 0.9)]);
    let err = engine
        .process(&image(), &DetectionOptions::new().with_threshold(1.5))
        .await
        .unwrap_err();
    assert!(matches!(err, ValidationError::ThresholdOutOfRange { .. }));

    let err = engine
        .process_multiple(&image(), &DetectionOptions::new().with_max_results(0))
        .await
        .unwrap_err();
    assert_eq!(err, ValidationError::ZeroMaxResults);
}

#[tokio::test(start_paused = true)]
async fn detectors_run_concurrently() {
    let engine = DetectorType::ALL
        .into_iter()
        .fold(DetectionEngine::new(), |engine, t| {
            engine.register(
                StubDetector::returning(t, 0.7).with_delay(Duration::from_millis(500)),
            )
        });
    let started = tokio::time::Instant::now();
    let results = engine
        .process_multiple(&image(), &DetectionOptions::new())
        .await
        .unwrap();
    assert_eq!(results.len(), 4);
    assert!(started.elapsed() < Duration::from_millis(1000));
}

#[tokio::test]
async fn backend_failure_means_no_result() {
    let mut config = ScanConfig::default();
    config.simulation.instant();
    let engine = DetectionEngine::standard(&config, Arc::new(FailingVision));
    let image = ImagePayload::from("Coffee Beans\n5901234123457");

    assert!(
        engine
            .process(&image, &DetectionOptions::new())
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        engine
            .process_multiple(&image, &DetectionOptions::new())
            .await
            .unwrap()
            .is_empty()
    );
}
