pub mod image;
pub mod options;
pub mod result;

pub use image::ImagePayload;
pub use options::{DetectionOptions, ValidationError};
pub use result::{
    BarcodeFormat, BarcodePayload, CalendarEntry, ContactCard, ContextEntity, ContextPayload,
    ContextType, DetectionPayload, DetectionResult, DetectorType, DocumentDraft, DocumentPayload,
    DocumentType, EntityType, ProductInfo, ProductPayload, ShoppingItemDraft, ShoppingListDraft,
    SuggestedAction, UnknownDetectorType,
};

pub const SCHEMA_VERSION: &str = "1.0.0";

/// JSON schema of a single detection result, as printed by `scansense schema`.
pub fn result_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(DetectionResult)
}
