use super::store::StoreError;
use thiserror::Error;

/// Registry failures that callers must handle. Skipped updates and unknown
/// rollback targets are ordinary outcomes, not errors.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Registry document has schema version {found}; this build supports up to {supported}")]
    UnsupportedSchema { found: u64, supported: u32 },
}

pub type Result<T> = std::result::Result<T, RegistryError>;
