use super::ImagePayload;
use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The four classifier families. Declaration order is the invocation order
/// used for stable tie-breaking.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum DetectorType {
    Barcode,
    Product,
    Document,
    Context,
}

impl DetectorType {
    pub const ALL: [DetectorType; 4] = [
        DetectorType::Barcode,
        DetectorType::Product,
        DetectorType::Document,
        DetectorType::Context,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorType::Barcode => "barcode",
            DetectorType::Product => "product",
            DetectorType::Document => "document",
            DetectorType::Context => "context",
        }
    }
}

impl fmt::Display for DetectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown detector type: {0}")]
pub struct UnknownDetectorType(pub String);

impl FromStr for DetectorType {
    type Err = UnknownDetectorType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "barcode" => Ok(DetectorType::Barcode),
            "product" => Ok(DetectorType::Product),
            "document" => Ok(DetectorType::Document),
            "context" | "contextual" => Ok(DetectorType::Context),
            other => Err(UnknownDetectorType(other.to_string())),
        }
    }
}

/// A single classification produced by one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub raw_image: Option<ImagePayload>,
    /// Id of the model version that was active when this result was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(flatten)]
    pub payload: DetectionPayload,
}

impl DetectionResult {
    pub fn new(payload: DetectionPayload, confidence: f32, timestamp: DateTime<Utc>) -> Self {
        Self {
            confidence: confidence.clamp(0.0, 1.0),
            timestamp,
            raw_image: None,
            model_version: None,
            payload,
        }
    }

    pub fn detector_type(&self) -> DetectorType {
        self.payload.detector_type()
    }

    pub fn as_barcode(&self) -> Option<&BarcodePayload> {
        match &self.payload {
            DetectionPayload::Barcode(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_product(&self) -> Option<&ProductPayload> {
        match &self.payload {
            DetectionPayload::Product(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&DocumentPayload> {
        match &self.payload {
            DetectionPayload::Document(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_context(&self) -> Option<&ContextPayload> {
        match &self.payload {
            DetectionPayload::Context(p) => Some(p),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DetectionPayload {
    Barcode(BarcodePayload),
    Product(ProductPayload),
    Document(DocumentPayload),
    Context(ContextPayload),
}

impl DetectionPayload {
    pub fn detector_type(&self) -> DetectorType {
        match self {
            DetectionPayload::Barcode(_) => DetectorType::Barcode,
            DetectionPayload::Product(_) => DetectorType::Product,
            DetectionPayload::Document(_) => DetectorType::Document,
            DetectionPayload::Context(_) => DetectorType::Context,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum BarcodeFormat {
    #[serde(rename = "QR")]
    Qr,
    #[serde(rename = "EAN")]
    Ean,
    #[serde(rename = "UPC")]
    Upc,
    #[serde(rename = "CODE128")]
    Code128,
    #[serde(rename = "CODE39")]
    Code39,
    #[serde(rename = "unknown")]
    Unknown,
}

impl BarcodeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarcodeFormat::Qr => "QR",
            BarcodeFormat::Ean => "EAN",
            BarcodeFormat::Upc => "UPC",
            BarcodeFormat::Code128 => "CODE128",
            BarcodeFormat::Code39 => "CODE39",
            BarcodeFormat::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BarcodePayload {
    pub format: BarcodeFormat,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_info: Option<ProductInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductPayload {
    pub product_info: ProductInfo,
    pub detected_features: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Recipe,
    Clothing,
    Travel,
    Fitness,
    Event,
    Invitation,
    Invoice,
    Receipt,
    Resume,
    Letter,
    Document,
    Unknown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Recipe => "recipe",
            DocumentType::Clothing => "clothing",
            DocumentType::Travel => "travel",
            DocumentType::Fitness => "fitness",
            DocumentType::Event => "event",
            DocumentType::Invitation => "invitation",
            DocumentType::Invoice => "invoice",
            DocumentType::Receipt => "receipt",
            DocumentType::Resume => "resume",
            DocumentType::Letter => "letter",
            DocumentType::Document => "document",
            DocumentType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    pub document_type: DocumentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    /// Shape depends on `document_type`.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Event,
    Shopping,
    Reminder,
    Contact,
    Social,
    Unknown,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Event => "event",
            ContextType::Shopping => "shopping",
            ContextType::Reminder => "reminder",
            ContextType::Contact => "contact",
            ContextType::Social => "social",
            ContextType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Date,
    Location,
    Person,
    Organization,
    Product,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContextEntity {
    pub entity_type: EntityType,
    pub value: String,
    pub confidence: f32,
}

impl ContextEntity {
    pub fn new(entity_type: EntityType, value: impl Into<String>, confidence: f32) -> Self {
        Self {
            entity_type,
            value: value.into(),
            confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContextPayload {
    pub context_type: ContextType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    pub entities: Vec<ContextEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<SuggestedAction>,
}

/// Hand-off payload for a downstream workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum SuggestedAction {
    AddToCalendar(CalendarEntry),
    AddToShoppingList(ShoppingListDraft),
    SaveToDocuments(DocumentDraft),
    Contact(ContactCard),
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEntry {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingListDraft {
    pub items: Vec<ShoppingItemDraft>,
    pub list_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingItemDraft {
    pub name: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDraft {
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactCard {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 3, 12, 0, 0).unwrap()
    }

    #[test]
    fn detector_type_parses_aliases() {
        assert_eq!("Barcode".parse::<DetectorType>(), Ok(DetectorType::Barcode));
        assert_eq!("contextual".parse::<DetectorType>(), Ok(DetectorType::Context));
        assert!("unknown".parse::<DetectorType>().is_err());
    }

    #[test]
    fn result_serializes_with_type_tag() {
        let result = DetectionResult::new(
            DetectionPayload::Barcode(BarcodePayload {
                format: BarcodeFormat::Ean,
                value: "5901234123457".into(),
                product_info: None,
            }),
            0.9,
            at_noon(),
        );

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "barcode");
        assert_eq!(json["format"], "EAN");
        assert_eq!(json["value"], "5901234123457");
        assert!(json.get("rawImage").is_none());

        let back: DetectionResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn confidence_is_clamped_on_construction() {
        let payload = DetectionPayload::Product(ProductPayload {
            product_info: ProductInfo {
                name: "Coffee Beans".into(),
                ..Default::default()
            },
            detected_features: vec![],
        });
        assert_eq!(DetectionResult::new(payload.clone(), 1.4, at_noon()).confidence, 1.0);
        assert_eq!(DetectionResult::new(payload, -0.2, at_noon()).confidence, 0.0);
    }

    #[test]
    fn suggested_action_uses_adjacent_tagging() {
        let action = SuggestedAction::AddToShoppingList(ShoppingListDraft {
            items: vec![ShoppingItemDraft {
                name: "Milk".into(),
                quantity: 1,
                notes: None,
            }],
            list_name: "Grocery List".into(),
        });
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "addToShoppingList");
        assert_eq!(json["data"]["listName"], "Grocery List");
        assert_eq!(json["data"]["items"][0]["name"], "Milk");
    }
}
