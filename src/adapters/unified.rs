use super::detection::{BARCODE_THRESHOLD, PRODUCT_THRESHOLD, status_for};
use super::{DetectionStatus, SessionSnapshot};
use crate::engine::DetectionEngine;
use crate::schema::{DetectionOptions, DetectionResult, DetectorType, ImagePayload, ValidationError};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Smart scan: a barcode if one reads cleanly, else a recognised product,
/// else whatever general detection finds.
pub struct UnifiedScanSession {
    engine: Arc<DetectionEngine>,
    state: Mutex<SessionSnapshot>,
}

impl UnifiedScanSession {
    pub fn new(engine: Arc<DetectionEngine>) -> Self {
        Self {
            engine,
            state: Mutex::new(SessionSnapshot::default()),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().clone()
    }

    /// Type of the last successful detection.
    pub fn detected_type(&self) -> Option<DetectorType> {
        self.state.lock().result.as_ref().map(|r| r.detector_type())
    }

    pub async fn detect(
        &self,
        image: &ImagePayload,
        options: DetectionOptions,
    ) -> Option<DetectionResult> {
        {
            let mut state = self.state.lock();
            state.status = DetectionStatus::Detecting;
            state.error = None;
            state.result = None;
        }
        match self.cascade(image, &options).await {
            Ok(result) => {
                let mut state = self.state.lock();
                state.status = status_for(result.is_some());
                state.result = result.clone();
                result
            }
            Err(e) => {
                warn!(error = %e, "scan request rejected");
                let mut state = self.state.lock();
                state.status = DetectionStatus::Error;
                state.error = Some(e.to_string());
                None
            }
        }
    }

    async fn cascade(
        &self,
        image: &ImagePayload,
        options: &DetectionOptions,
    ) -> Result<Option<DetectionResult>, ValidationError> {
        let staged = |detector_type, fallback| {
            let mut staged = options.clone().preferred(detector_type);
            staged.confidence_threshold = options.confidence_threshold.or(Some(fallback));
            staged
        };

        let barcode = staged(DetectorType::Barcode, BARCODE_THRESHOLD);
        if let Some(result) = self.engine.process(image, &barcode).await? {
            return Ok(Some(result));
        }
        debug!("no barcode, trying product recognition");

        let product = staged(DetectorType::Product, PRODUCT_THRESHOLD);
        if let Some(result) = self.engine.process(image, &product).await? {
            return Ok(Some(result));
        }
        debug!("no product, falling back to general detection");

        let mut general = options.clone();
        general.preferred_type = None;
        self.engine.process(image, &general).await
    }

    /// Scans frames in order until one yields a detection. Returns `None`
    /// and goes idle when the stream ends first.
    pub async fn scan_frames<S>(&self, frames: S) -> Option<DetectionResult>
    where
        S: Stream<Item = ImagePayload>,
    {
        let mut frames = std::pin::pin!(frames);
        let options = DetectionOptions::new().with_threshold(BARCODE_THRESHOLD);
        while let Some(frame) = frames.next().await {
            if let Some(result) = self.detect(&frame, options.clone()).await {
                return Some(result);
            }
        }
        self.reset();
        None
    }

    pub fn reset(&self) {
        *self.state.lock() = SessionSnapshot::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_utils::{StubBehavior, StubDetector};

    #[tokio::test]
    async fn barcode_wins_when_present() {
        let engine = DetectionEngine::new()
            .register(StubDetector::returning(DetectorType::Barcode, 0.7))
            .register(StubDetector::returning(DetectorType::Product, 0.9));
        let session = UnifiedScanSession::new(Arc::new(engine));
        let result = session
            .detect(&ImagePayload::from("frame"), DetectionOptions::new())
            .await
            .unwrap();
        assert_eq!(result.detector_type(), DetectorType::Barcode);
        assert_eq!(session.detected_type(), Some(DetectorType::Barcode));
    }

    #[tokio::test]
    async fn weak_barcode_falls_back_to_product() {
        let engine = DetectionEngine::new()
            .register(StubDetector::returning(DetectorType::Barcode, 0.5))
            .register(StubDetector::returning(DetectorType::Product, 0.7));
        let session = UnifiedScanSession::new(Arc::new(engine));
        let result = session
            .detect(&ImagePayload::from("frame"), DetectionOptions::new())
            .await
            .unwrap();
        assert_eq!(result.detector_type(), DetectorType::Product);
    }

    #[tokio::test]
    async fn general_detection_is_last_resort() {
        let engine = DetectionEngine::new()
            .register(StubDetector::new(DetectorType::Barcode, StubBehavior::Nothing))
            .register(StubDetector::new(DetectorType::Product, StubBehavior::Nothing))
            .register(StubDetector::returning(DetectorType::Document, 0.4));
        let session = UnifiedScanSession::new(Arc::new(engine));
        let result = session
            .detect(&ImagePayload::from("frame"), DetectionOptions::new())
            .await
            .unwrap();
        assert_eq!(result.detector_type(), DetectorType::Document);
        assert!(session.snapshot().is_success());
    }

    #[tokio::test]
    async fn frame_scan_stops_at_first_hit() {
        let barcode = Arc::new(StubDetector::returning(DetectorType::Barcode, 0.8));
        let engine = DetectionEngine::new().register_shared(barcode.clone());
        let session = UnifiedScanSession::new(Arc::new(engine));
        let frames = futures::stream::iter(vec![
            ImagePayload::from("one"),
            ImagePayload::from("two"),
        ]);
        assert!(session.scan_frames(frames).await.is_some());
        assert_eq!(barcode.calls(), 1);
    }

    #[tokio::test]
    async fn exhausted_scan_goes_idle() {
        let engine = DetectionEngine::new()
            .register(StubDetector::new(DetectorType::Barcode, StubBehavior::Nothing));
        let session = UnifiedScanSession::new(Arc::new(engine));
        let frames = futures::stream::iter(vec![ImagePayload::from("one")]);
        assert!(session.scan_frames(frames).await.is_none());
        assert_eq!(session.snapshot().status, DetectionStatus::Idle);
    }
}
