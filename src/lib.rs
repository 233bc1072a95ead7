pub mod adapters;
pub mod config;
pub mod detectors;
pub mod engine;
pub mod logging;
pub mod registry;
pub mod schema;

pub use config::ScanConfig;
pub use detectors::{Detector, SimulatedVision, VisionBackend};
pub use engine::DetectionEngine;
pub use registry::ModelRegistry;
pub use schema::{DetectionOptions, DetectionResult, DetectorType, ImagePayload};
