use crate::detectors::utils::{contains_term, first_price};
use crate::detectors::{
    DetectContext, DetectError, Detector, ImageAnalysis, VisionBackend, catalog, confidence,
    simulate_latency,
};
use crate::schema::{
    DetectionPayload, DetectionResult, DetectorType, ImagePayload, ProductInfo, ProductPayload,
};
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Feature tags a product recogniser reports, in reporting order.
pub const FEATURE_VOCABULARY: &[&str] = &[
    "logo",
    "packaging",
    "brand_name",
    "product_name",
    "nutrition_label",
    "ingredients_list",
    "product_image",
    "price_tag",
    "color",
    "shape",
];

const COLOURS: &[&str] = &[
    "black", "white", "red", "blue", "green", "yellow", "orange", "purple", "pink", "brown",
    "silver", "gold",
];

static WEIGHT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s?(kg|g|oz|lb|lbs|ml|l|fl oz)\b").expect("static pattern is valid")
});

pub struct ProductDetector {
    vision: Arc<dyn VisionBackend>,
    latency: Duration,
}

impl ProductDetector {
    pub fn new(vision: Arc<dyn VisionBackend>, latency: Duration) -> Self {
        Self { vision, latency }
    }

    fn recognise(analysis: &ImageAnalysis) -> Option<(ProductInfo, Vec<String>, f32)> {
        let text = analysis.text.as_deref().unwrap_or_default();
        let lower = text.to_lowercase();
        let entry = catalog::best_match(&lower, &analysis.labels)?;

        let mut tags: Vec<&str> = analysis
            .visual_features
            .iter()
            .map(String::as_str)
            .collect();
        if entry.brand_mentioned(&lower) {
            tags.push("brand_name");
        }
        if entry.name_mentioned(&lower) {
            tags.push("product_name");
        }
        if COLOURS.iter().any(|c| contains_term(&lower, c)) {
            tags.push("color");
        }
        let features: Vec<String> = FEATURE_VOCABULARY
            .iter()
            .filter(|f| tags.contains(f))
            .map(|f| f.to_string())
            .collect();

        let mut info = entry.to_info();
        if let Some(price) = first_price(text) {
            info.price = Some(price);
        }
        if let Some(weight) = WEIGHT_RE.find(text) {
            info.attributes
                .insert("weight".into(), weight.as_str().to_string());
        }
        if let Some(colour) = COLOURS.iter().find(|c| contains_term(&lower, c)) {
            info.attributes.insert("color".into(), colour.to_string());
        }

        let barcode_confirms = entry.barcode.is_some_and(|code| {
            analysis.symbols.iter().any(|s| s.value == code)
        });
        let score = confidence::LOW
            + (features.len() as f32 * 0.05).min(0.3)
            + if barcode_confirms { 0.05 } else { 0.0 };

        Some((info, features, score.min(confidence::VERIFIED)))
    }
}

#[async_trait]
impl Detector for ProductDetector {
    fn name(&self) -> &'static str {
        "product"
    }

    fn detector_type(&self) -> DetectorType {
        DetectorType::Product
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

        let Some((product_info, detected_features, score)) = Self::recognise(&analysis) else {
            return Ok(None);
        };
        tracing::debug!(product = %product_info.name, score, "recognised product");
        let payload = DetectionPayload::Product(ProductPayload {
            product_info,
            detected_features,
        });
        Ok(ctx.finish(image, payload, score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_utils::{context, instant_vision};
    use crate::schema::DetectionOptions;

    fn detector() -> ProductDetector {
        ProductDetector::new(instant_vision(), Duration::ZERO)
    }

    #[tokio::test]
    async fn recognises_packaged_product() {
        let image = ImagePayload::from("Morning Brew\nCoffee Beans\nDark Roast 340g\n$12.99\n5901234123457");
        let result = detector()
            .detect(&image, &context(DetectionOptions::new()))
            .await
            .unwrap()
            .unwrap();

        let product = result.as_product().unwrap();
        assert_eq!(product.product_info.name, "Coffee Beans");
        assert_eq!(product.product_info.brand.as_deref(), Some("Morning Brew"));
        assert_eq!(product.product_info.price.as_deref(), Some("$12.99"));
        assert_eq!(
            product.product_info.attributes.get("weight").map(String::as_str),
            Some("340g")
        );
        assert_eq!(
            product.detected_features,
            vec!["brand_name", "product_name", "price_tag"]
        );
        // base + three features + barcode confirmation
        assert!((result.confidence - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn unrelated_text_is_not_a_product() {
        let image = ImagePayload::from("Dear John,\nSee you soon.\nSincerely, Ann");
        let result = detector()
            .detect(&image, &context(DetectionOptions::new()))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn captures_colour_attribute() {
        let image = ImagePayload::from("AudioTech wireless earbuds\nColour: black");
        let result = detector()
            .detect(&image, &context(DetectionOptions::new()))
            .await
            .unwrap()
            .unwrap();
        let product = result.as_product().unwrap();
        assert_eq!(product.product_info.category.as_deref(), Some("Electronics"));
        assert_eq!(
            product.product_info.attributes.get("color").map(String::as_str),
            Some("black")
        );
        assert!(product.detected_features.contains(&"color".to_string()));
    }
}
