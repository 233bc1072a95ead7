use crate::detectors::DetectError;
use crate::detectors::utils::{AMOUNT_RE, bullet_items, lines};
use crate::schema::{BarcodeFormat, ImagePayload};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::LazyLock;

/// A symbol decoded from the image by the vision stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSymbol {
    pub format: BarcodeFormat,
    pub value: String,
    /// Whether the check digit (where the format has one) validated.
    pub verified: bool,
}

/// Everything a detector may learn from an image before classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageAnalysis {
    pub text: Option<String>,
    pub visual_features: Vec<String>,
    pub symbols: Vec<DecodedSymbol>,
    /// Object labels from the vision stage (e.g. `"coffee"`).
    pub labels: Vec<String>,
}

impl ImageAnalysis {
    pub fn from_text(text: &str) -> Self {
        let mut analysis = Self {
            text: Some(text.to_string()),
            visual_features: text_features(text),
            symbols: decode_symbols(text),
            labels: Vec::new(),
        };
        if analysis
            .symbols
            .iter()
            .any(|s| s.format == BarcodeFormat::Qr)
        {
            analysis.push_feature("qr_code");
        }
        analysis
    }

    pub fn is_blank(&self) -> bool {
        self.text.as_deref().is_none_or(|t| t.trim().is_empty())
            && self.visual_features.is_empty()
            && self.symbols.is_empty()
            && self.labels.is_empty()
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.visual_features.iter().any(|f| f == feature)
    }

    fn push_feature(&mut self, feature: &str) {
        if !self.has_feature(feature) {
            self.visual_features.push(feature.to_string());
        }
    }
}

/// Pluggable OCR / vision stage shared by all detectors.
///
/// Real backends (an OCR engine, a barcode decoder, an image classifier) slot
/// in here without touching detectors, the engine or the registry.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn analyze(
        &self,
        image: &ImagePayload,
        language: Option<&str>,
    ) -> Result<ImageAnalysis, DetectError>;
}

/// Deterministic stand-in for a real vision service.
///
/// Payloads with a text layer are read as already-recognised text. Opaque
/// payloads are mapped onto a fixed set of synthetic scenes, seeded by the
/// payload fingerprint, so the same bytes always yield the same analysis.
#[derive(Debug, Clone, Default)]
pub struct SimulatedVision;

impl SimulatedVision {
    pub fn new() -> Self {
        Self
    }

    pub fn scene_for(image: &ImagePayload) -> &'static Scene {
        let mut rng = StdRng::seed_from_u64(image.fingerprint());
        &SCENES[rng.random_range(0..SCENES.len())]
    }
}

#[async_trait]
impl VisionBackend for SimulatedVision {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn analyze(
        &self,
        image: &ImagePayload,
        _language: Option<&str>,
    ) -> Result<ImageAnalysis, DetectError> {
        if let Some(text) = image.text_layer() {
            return Ok(ImageAnalysis::from_text(text));
        }

        let scene = Self::scene_for(image);
        tracing::debug!(scene = scene.name, "mapped opaque payload to synthetic scene");
        if scene.text.is_empty() {
            return Ok(ImageAnalysis::default());
        }
        let mut analysis = ImageAnalysis::from_text(scene.text);
        for feature in scene.features {
            analysis.push_feature(feature);
        }
        analysis.labels = scene.labels.iter().map(|l| l.to_string()).collect();
        Ok(analysis)
    }
}

/// A synthetic scene the simulated backend can "see".
#[derive(Debug)]
pub struct Scene {
    pub name: &'static str,
    pub text: &'static str,
    pub features: &'static [&'static str],
    pub labels: &'static [&'static str],
}

pub static SCENES: &[Scene] = &[
    Scene {
        name: "receipt",
        text: "GROCERY STORE\n123 Market St.\nCity, State 12345\n\nDATE: 04/03/2025\nTIME: 14:35\n\nApples      $4.99\nBread       $3.50\nMilk        $2.99\n\nSubtotal    $11.48\nTax (8%)     $0.92\n\nTOTAL       $12.40\n\nTHANK YOU FOR SHOPPING!",
        features: &["table_layout", "thermal_paper"],
        labels: &[],
    },
    Scene {
        name: "invoice",
        text: "INVOICE\nInvoice #: INV-2025-04-123\nDate: April 3, 2025\n\nFrom: ABC Services Inc.\nTo: XYZ Corporation\n\nServices Rendered:\nConsulting (10 hrs)    $1,500.00\nMaterials              $350.00\n\nTotal Due: $1,850.00\n\nPayment due within 30 days.",
        features: &["letterhead", "table_layout"],
        labels: &[],
    },
    Scene {
        name: "invitation",
        text: "You're Invited!\n\nJohn & Sarah's Wedding\nSaturday, June 15, 2025\n3:00 PM\n\nThe Grand Venue\n123 Celebration Dr.\nNew York, NY 10001\n\nRSVP by May 1st\ncontact@example.com",
        features: &["decorative_border", "script_font"],
        labels: &[],
    },
    Scene {
        name: "recipe",
        text: "Classic Pancakes\nPrep time: 10 minutes\nCook time: 15 minutes\nServes 4\n\nIngredients:\n- 1 1/2 cups flour\n- 3 1/2 tsp baking powder\n- 1 tbsp sugar\n- 1 1/4 cups milk\n- 1 egg\n\nInstructions:\n1. Mix the dry ingredients\n2. Whisk in the milk and egg\n3. Cook on a hot griddle until golden",
        features: &["food_image", "recipe_card"],
        labels: &["pancakes"],
    },
    Scene {
        name: "product_package",
        text: "Morning Brew\nCoffee Beans\nDark Roast 340g\n$12.99\n5901234123457",
        features: &["logo", "packaging", "product_image", "color"],
        labels: &["coffee", "bag"],
    },
    Scene {
        name: "qr_flyer",
        text: "Scan for details\nhttps://example.com/product/12345",
        features: &["flyer"],
        labels: &[],
    },
    Scene {
        name: "contact_card",
        text: "John Smith\nCEO, Acme Inc.\njohn.smith@acme.com\n(555) 123-4567\n123 Business Ave, Suite 100, San Francisco, CA 94107",
        features: &["logo"],
        labels: &["business_card"],
    },
    Scene {
        name: "shopping_note",
        text: "Don't forget to pick up:\n- Milk\n- Bread\n- Eggs (dozen)\n- Apples\n- Laundry detergent",
        features: &["handwriting"],
        labels: &["sticky_note"],
    },
    Scene {
        name: "blank",
        text: "",
        features: &[],
        labels: &[],
    },
];

/// Visual features that can be inferred from recognised text alone.
pub fn text_features(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut features = Vec::new();

    let priced_lines = lines(text).filter(|l| AMOUNT_RE.is_match(l)).count();
    if priced_lines > 0 {
        features.push("price_tag");
    }
    if priced_lines >= 3 {
        features.push("table_layout");
    }
    if lower.contains("nutrition facts") || lower.contains("calories per serving") {
        features.push("nutrition_label");
    }
    if lower.contains("ingredients:") {
        features.push("ingredients_list");
    }
    if bullet_items(text).len() >= 2 {
        features.push("bulleted_list");
    }

    features.into_iter().map(String::from).collect()
}

static CODE128_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Z]{2,}(?:-[0-9]+){2,}$").expect("valid regex"));
static CODE39_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^\*[A-Z0-9 .$/+%-]+\*$").expect("valid regex"));

/// Decodes symbols printed on their own line, the way a barcode's
/// human-readable line appears under the bars.
pub fn decode_symbols(text: &str) -> Vec<DecodedSymbol> {
    lines(text).filter_map(decode_line).collect()
}

fn decode_line(line: &str) -> Option<DecodedSymbol> {
    let symbol = |format, verified| {
        Some(DecodedSymbol {
            format,
            value: line.to_string(),
            verified,
        })
    };

    if line.bytes().all(|b| b.is_ascii_digit()) {
        return match line.len() {
            13 if ean13_is_valid(line) => symbol(BarcodeFormat::Ean, true),
            12 if upc_a_is_valid(line) => symbol(BarcodeFormat::Upc, true),
            12 | 13 => symbol(BarcodeFormat::Unknown, false),
            _ => None,
        };
    }
    if (line.starts_with("https://") || line.starts_with("http://"))
        && !line.contains(char::is_whitespace)
    {
        return symbol(BarcodeFormat::Qr, true);
    }
    if CODE39_RE.is_match(line) {
        return symbol(BarcodeFormat::Code39, true);
    }
    if CODE128_RE.is_match(line) {
        return symbol(BarcodeFormat::Code128, true);
    }
    None
}

fn digits(code: &str) -> Vec<u32> {
    code.chars().filter_map(|c| c.to_digit(10)).collect()
}

/// EAN-13: weights alternate 1,3 from the left over the first twelve digits.
pub fn ean13_is_valid(code: &str) -> bool {
    let d = digits(code);
    if d.len() != 13 {
        return false;
    }
    let sum: u32 = d[..12]
        .iter()
        .enumerate()
        .map(|(i, v)| if i % 2 == 0 { *v } else { v * 3 })
        .sum();
    (10 - sum % 10) % 10 == d[12]
}

/// UPC-A: weights alternate 3,1 from the left over the first eleven digits.
pub fn upc_a_is_valid(code: &str) -> bool {
    let d = digits(code);
    if d.len() != 12 {
        return false;
    }
    let sum: u32 = d[..11]
        .iter()
        .enumerate()
        .map(|(i, v)| if i % 2 == 0 { v * 3 } else { *v })
        .sum();
    (10 - sum % 10) % 10 == d[11]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_check_digits() {
        assert!(ean13_is_valid("5901234123457"));
        assert!(!ean13_is_valid("5901234123458"));
        assert!(upc_a_is_valid("042100005264"));
        assert!(!upc_a_is_valid("042100005265"));
    }

    #[test]
    fn decodes_symbols_on_their_own_line() {
        let symbols = decode_symbols(
            "Item\n5901234123457\nhttps://example.com/product/12345\n*PROD12345*\nPROD-1234-5678-90",
        );
        let formats: Vec<_> = symbols.iter().map(|s| s.format).collect();
        assert_eq!(
            formats,
            vec![
                BarcodeFormat::Ean,
                BarcodeFormat::Qr,
                BarcodeFormat::Code39,
                BarcodeFormat::Code128
            ]
        );
    }

    #[test]
    fn inline_codes_are_not_symbols() {
        assert!(decode_symbols("Invoice #: INV-2025-04-123").is_empty());
        assert!(decode_symbols("Visit https://example.com today").is_empty());
    }

    #[test]
    fn bad_checksum_decodes_as_unknown() {
        let symbols = decode_symbols("5901234123458");
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].format, BarcodeFormat::Unknown);
        assert!(!symbols[0].verified);
    }

    #[test]
    fn derives_features_from_text() {
        let features = text_features("Apples $4.99\nBread $3.50\nMilk $2.99\nIngredients: x");
        assert!(features.contains(&"price_tag".to_string()));
        assert!(features.contains(&"table_layout".to_string()));
        assert!(features.contains(&"ingredients_list".to_string()));
    }

    #[tokio::test]
    async fn opaque_payloads_are_deterministic() {
        let vision = SimulatedVision::new();
        let image = ImagePayload::from_bytes(vec![0x89, 0x50, 0x4e, 0x47, 0x00, 0x10, 0x20]);
        let a = vision.analyze(&image, None).await.unwrap();
        let b = vision.analyze(&image, None).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn text_layer_is_used_verbatim() {
        let vision = SimulatedVision::new();
        let analysis = vision
            .analyze(&ImagePayload::from("hello world"), None)
            .await
            .unwrap();
        assert_eq!(analysis.text.as_deref(), Some("hello world"));
        assert!(analysis.symbols.is_empty());
    }

    #[test]
    fn every_scene_but_blank_has_text() {
        for scene in SCENES {
            assert_eq!(scene.text.is_empty(), scene.name == "blank", "{}", scene.name);
        }
    }
}
