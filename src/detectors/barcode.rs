use crate::detectors::vision::DecodedSymbol;
use crate::detectors::{
    DetectContext, DetectError, Detector, VisionBackend, catalog, confidence, simulate_latency,
};
use crate::schema::{
    BarcodeFormat, BarcodePayload, DetectionPayload, DetectionResult, DetectorType, ImagePayload,
    ProductInfo,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub struct BarcodeDetector {
    vision: Arc<dyn VisionBackend>,
    latency: Duration,
}

impl BarcodeDetector {
    pub fn new(vision: Arc<dyn VisionBackend>, latency: Duration) -> Self {
        Self { vision, latency }
    }

    fn format_confidence(symbol: &DecodedSymbol) -> f32 {
        match (symbol.format, symbol.verified) {
            (BarcodeFormat::Ean | BarcodeFormat::Upc, true) => confidence::VERIFIED,
            (BarcodeFormat::Qr, _) => confidence::HIGH,
            (BarcodeFormat::Code128, _) => 0.85,
            (BarcodeFormat::Code39, _) => 0.82,
            _ => 0.55,
        }
    }

    fn lookup(symbol: &DecodedSymbol) -> Option<ProductInfo> {
        match symbol.format {
            BarcodeFormat::Ean | BarcodeFormat::Upc | BarcodeFormat::Code128 => Some(
                catalog::by_barcode(&symbol.value)
                    .map(|entry| entry.to_info())
                    .unwrap_or_else(|| catalog::generated_info(&symbol.value)),
            ),
            _ => None,
        }
    }
}

#[async_trait]
impl Detector for BarcodeDetector {
    fn name(&self) -> &'static str {
        "barcode"
    }

    fn detector_type(&self) -> DetectorType {
        DetectorType::Barcode
    }

    async fn detect(
        &self,
        image: &ImagePayload,
        ctx: &DetectContext,
    ) -> Result<Option<DetectionResult>, DetectError> {
        simulate_latency(self.latency).await;
        let analysis = self
            .vision
            .analyze(image, ctx.options.language.as_deref())
            .await?;

        // The most trustworthy symbol wins; earlier symbols win ties.
        let Some((symbol, score)) = analysis
            .symbols
            .iter()
            .map(|s| (s, Self::format_confidence(s)))
            .rev()
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            return Ok(None);
        };

        tracing::debug!(format = symbol.format.as_str(), value = %symbol.value, "decoded barcode");
        let payload = DetectionPayload::Barcode(BarcodePayload {
            format: symbol.format,
            value: symbol.value.clone(),
            product_info: Self::lookup(symbol),
        });
        Ok(ctx.finish(image, payload, score))
    }
}
