use crate::registry::ModelVersion;
use crate::schema::DetectorType;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UpdateError {
    #[error("update server unreachable: {0}")]
    Unreachable(String),
    #[error("no update published for {0}")]
    NotPublished(DetectorType),
}

/// What an update server hands back for a detector type.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCandidate {
    /// Accuracy improvement over the currently active model, never negative.
    pub accuracy_gain: f32,
    pub additional_samples: u32,
    pub precision: Option<f32>,
    pub recall: Option<f32>,
}

/// The remote side of the model lifecycle.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn is_update_available(
        &self,
        detector_type: DetectorType,
        current: Option<&ModelVersion>,
    ) -> Result<bool, UpdateError>;

    /// Downloads the next model for `detector_type`.
    async fn fetch_candidate(
        &self,
        detector_type: DetectorType,
        current: &ModelVersion,
    ) -> Result<ModelCandidate, UpdateError>;
}

#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub update_probability: f64,
    pub max_accuracy_gain: f32,
    pub max_additional_samples: u32,
    pub download: Duration,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            update_probability: 0.3,
            max_accuracy_gain: 0.05,
            max_additional_samples: 500,
            download: Duration::from_millis(2000),
        }
    }
}

/// In-process stand-in for an update server, driven by a seeded RNG.
pub struct SimulatedUpdateSource {
    settings: SimulationSettings,
    rng: Mutex<StdRng>,
}

impl SimulatedUpdateSource {
    pub fn new(settings: SimulationSettings, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let settings = SimulationSettings {
            update_probability: settings.update_probability.clamp(0.0, 1.0),
            max_accuracy_gain: settings.max_accuracy_gain.max(0.0),
            ..settings
        };
        Self {
            settings,
            rng: Mutex::new(rng),
        }
    }

    /// Always offers an update, instantly. Handy for tests and demos.
    pub fn always(seed: u64) -> Self {
        Self::new(
            SimulationSettings {
                update_probability: 1.0,
                download: Duration::ZERO,
                ..SimulationSettings::default()
            },
            Some(seed),
        )
    }

    /// Never offers an update.
    pub fn never() -> Self {
        Self::new(
            SimulationSettings {
                update_probability: 0.0,
                download: Duration::ZERO,
                ..SimulationSettings::default()
            },
            Some(0),
        )
    }
}

#[async_trait]
impl UpdateSource for SimulatedUpdateSource {
    async fn is_update_available(
        &self,
        _detector_type: DetectorType,
        _current: Option<&ModelVersion>,
    ) -> Result<bool, UpdateError> {
        Ok(self.rng.lock().random_bool(self.settings.update_probability))
    }

    async fn fetch_candidate(
        &self,
        detector_type: DetectorType,
        _current: &ModelVersion,
    ) -> Result<ModelCandidate, UpdateError> {
        if !self.settings.download.is_zero() {
            tokio::time::sleep(self.settings.download).await;
        }
        let mut rng = self.rng.lock();
        let candidate = ModelCandidate {
            accuracy_gain: rng.random_range(0.0..=self.settings.max_accuracy_gain),
            additional_samples: rng.random_range(0..=self.settings.max_additional_samples),
            precision: None,
            recall: None,
        };
        tracing::debug!(%detector_type, gain = candidate.accuracy_gain, "downloaded model candidate");
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn seeded_source_is_reproducible() {
        let current = ModelVersion::initial(DetectorType::Product, Utc::now());
        let a = SimulatedUpdateSource::always(7);
        let b = SimulatedUpdateSource::always(7);
        assert_eq!(
            a.fetch_candidate(DetectorType::Product, &current).await,
            b.fetch_candidate(DetectorType::Product, &current).await
        );
    }

    #[tokio::test]
    async fn gains_stay_within_bounds() {
        let current = ModelVersion::initial(DetectorType::Product, Utc::now());
        let source = SimulatedUpdateSource::always(1);
        for _ in 0..50 {
            let candidate = source
                .fetch_candidate(DetectorType::Product, &current)
                .await
                .unwrap();
            assert!((0.0..=0.05).contains(&candidate.accuracy_gain));
            assert!(candidate.additional_samples <= 500);
        }
    }

    #[tokio::test]
    async fn probability_extremes() {
        let always = SimulatedUpdateSource::always(3);
        let never = SimulatedUpdateSource::never();
        for _ in 0..10 {
            assert!(always.is_update_available(DetectorType::Barcode, None).await.unwrap());
            assert!(!never.is_update_available(DetectorType::Barcode, None).await.unwrap());
        }
    }

    #[test]
    fn out_of_range_probability_is_clamped() {
        let source = SimulatedUpdateSource::new(
            SimulationSettings {
                update_probability: 4.0,
                ..SimulationSettings::default()
            },
            Some(1),
        );
        assert_eq!(source.settings.update_probability, 1.0);
    }
}
