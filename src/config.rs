use crate::registry::{RegistrySettings, SimulationSettings};
use crate::schema::DetectorType;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SCANSENSE_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ScanConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    pub respect_model_threshold: bool,
    pub detector_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub barcode_latency_ms: u64,
    pub product_latency_ms: u64,
    pub document_latency_ms: u64,
    pub context_latency_ms: u64,
    pub update_download_ms: u64,
    pub update_probability: f64,
    pub max_accuracy_gain: f32,
    pub max_additional_samples: u32,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    pub data_dir: Option<PathBuf>,
    pub check_cooldown_hours: u32,
    pub check_interval_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            respect_model_threshold: true,
            detector_timeout_ms: None,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            barcode_latency_ms: 800,
            product_latency_ms: 1200,
            document_latency_ms: 1000,
            context_latency_ms: 1500,
            update_download_ms: 2000,
            update_probability: 0.3,
            max_accuracy_gain: 0.05,
            max_additional_samples: 500,
            seed: None,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            check_cooldown_hours: 6,
            check_interval_hours: 24,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl DetectionConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.detector_timeout_ms.map(Duration::from_millis)
    }
}

impl SimulationConfig {
    pub fn latency(&self, detector_type: DetectorType) -> Duration {
        Duration::from_millis(match detector_type {
            DetectorType::Barcode => self.barcode_latency_ms,
            DetectorType::Product => self.product_latency_ms,
            DetectorType::Document => self.document_latency_ms,
            DetectorType::Context => self.context_latency_ms,
        })
    }

    /// Zeroes every simulated delay.
    pub fn instant(&mut self) {
        self.barcode_latency_ms = 0;
        self.product_latency_ms = 0;
        self.document_latency_ms = 0;
        self.context_latency_ms = 0;
        self.update_download_ms = 0;
    }

    pub fn update_settings(&self) -> SimulationSettings {
        SimulationSettings {
            update_probability: self.update_probability,
            max_accuracy_gain: self.max_accuracy_gain,
            max_additional_samples: self.max_additional_samples,
            download: Duration::from_millis(self.update_download_ms),
        }
    }
}

impl RegistryConfig {
    pub fn settings(&self) -> RegistrySettings {
        RegistrySettings {
            check_cooldown: TimeDelta::hours(i64::from(self.check_cooldown_hours)),
            check_interval: Duration::from_secs(u64::from(self.check_interval_hours.max(1)) * 3600),
            ..RegistrySettings::default()
        }
    }

    /// Configured data directory, else the platform default.
    pub fn resolved_data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .clone()
            .or_else(crate::registry::FileStore::default_root)
    }
}

impl ScanConfig {
    /// Loads the config file, falling back to defaults when it is missing
    /// or unreadable.
    pub fn load() -> Self {
        if let Some(config_path) = Self::config_file_path() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(ConfigError::Read { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(error = %e, "ignoring config file"),
            }
        }
        Self::default()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `$SCANSENSE_CONFIG`, else `<config_dir>/scansense/config.toml`.
    pub fn config_file_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        Self::config_dir().map(|mut path| {
            path.push("config.toml");
            path
        })
    }

    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("scansense");
            path
        })
    }
}
