//! Versioned model registry.
//!
//! Holds, per detector type, the ordered history of model versions with
//! exactly one active entry. Every mutation is persisted through a
//! [`KeyValueStore`] before it becomes visible as committed; a failed write
//! rolls the in-memory state back.

use crate::schema::{DetectionResult, DetectorType};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub mod error;
pub mod feedback;
pub mod store;
pub mod updates;
pub mod version;

pub use error::{RegistryError, Result};
pub use feedback::{FeedbackRecord, FeedbackSummary, feedback_key};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use updates::{
    ModelCandidate, SimulatedUpdateSource, SimulationSettings, UpdateError, UpdateSource,
};
pub use version::{MAX_ACCURACY, ModelMetrics, ModelVersion, SemVer, VersionParseError};

/// Storage key of the registry document.
pub const REGISTRY_KEY: &str = "model-versions";
pub const REGISTRY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Minimum spacing between two availability checks for one type.
    pub check_cooldown: TimeDelta,
    /// Period of the background availability check.
    pub check_interval: Duration,
    /// Spacing of progress reports while a download runs.
    pub progress_tick: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            check_cooldown: TimeDelta::hours(6),
            check_interval: Duration::from_secs(24 * 60 * 60),
            progress_tick: Duration::from_millis(100),
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

#[derive(Clone, Default)]
pub struct UpdateOptions {
    /// Proceed even when another update is in flight.
    pub force: bool,
    /// Version to install when it is newer than the active one.
    pub preferred_version: Option<String>,
    /// Receives 0, then increasing values up to 95 while downloading, then 100.
    pub on_progress: Option<ProgressCallback>,
}

impl UpdateOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, callback: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn with_preferred_version(mut self, version: impl Into<String>) -> Self {
        self.preferred_version = Some(version.into());
        self
    }

    fn report(&self, progress: u8) {
        if let Some(callback) = &self.on_progress {
            callback(progress);
        }
    }
}

impl std::fmt::Debug for UpdateOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateOptions")
            .field("force", &self.force)
            .field("preferred_version", &self.preferred_version)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Per-type update lifecycle as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStatus {
    UpToDate,
    UpdateAvailable,
    Updating,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryDocument {
    schema_version: u32,
    models: BTreeMap<DetectorType, Vec<ModelVersion>>,
    #[serde(default)]
    last_update_check: BTreeMap<DetectorType, DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct RegistryState {
    models: BTreeMap<DetectorType, Vec<ModelVersion>>,
    last_update_check: BTreeMap<DetectorType, DateTime<Utc>>,
    available: BTreeMap<DetectorType, bool>,
    updating: Option<DetectorType>,
}

impl RegistryState {
    fn document(&self) -> RegistryDocument {
        RegistryDocument {
            schema_version: REGISTRY_SCHEMA_VERSION,
            models: self.models.clone(),
            last_update_check: self.last_update_check.clone(),
        }
    }

    fn active(&self, detector_type: DetectorType) -> Option<&ModelVersion> {
        self.models
            .get(&detector_type)?
            .iter()
            .find(|m| m.is_active)
    }
}

/// Clears the in-flight marker on every exit path.
struct InFlight<'a> {
    registry: &'a ModelRegistry,
    detector_type: DetectorType,
}

impl<'a> InFlight<'a> {
    fn acquire(registry: &'a ModelRegistry, detector_type: DetectorType, force: bool) -> Option<Self> {
        if force {
            registry.in_flight.fetch_add(1, Ordering::SeqCst);
        } else if registry
            .in_flight
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        Some(Self {
            registry,
            detector_type,
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.registry.state.write();
        if state.updating == Some(self.detector_type) {
            state.updating = None;
        }
        drop(state);
        self.registry.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ModelRegistry {
    state: RwLock<RegistryState>,
    store: Arc<dyn KeyValueStore>,
    source: Arc<dyn UpdateSource>,
    settings: RegistrySettings,
    /// Number of updates in flight; non-forced updates need it at zero.
    in_flight: AtomicUsize,
    /// Serialises mutate-and-persist sections.
    write_gate: tokio::sync::Mutex<()>,
    /// Serialises availability checks and update downloads.
    maintenance: tokio::sync::Mutex<()>,
}

impl ModelRegistry {
    /// Loads the registry from `store`, seeding defaults for any detector
    /// type without history.
    ///
    /// Unreadable documents fall back to defaults with a warning. A document
    /// written by a newer schema is refused rather than overwritten.
    pub fn open(
        store: Arc<dyn KeyValueStore>,
        source: Arc<dyn UpdateSource>,
        settings: RegistrySettings,
    ) -> Result<Arc<Self>> {
        let now = Utc::now();
        let (mut document, mut dirty) = match store.load(REGISTRY_KEY)? {
            Some(raw) => {
                let document = Self::parse_document(&raw)?;
                let stale = document.schema_version < REGISTRY_SCHEMA_VERSION;
                (document, stale)
            }
            None => (RegistryDocument::default(), true),
        };

        for detector_type in DetectorType::ALL {
            let versions = document.models.entry(detector_type).or_default();
            if versions.is_empty() {
                debug!(%detector_type, "seeding initial model");
                versions.push(ModelVersion::initial(detector_type, now));
                dirty = true;
            } else if repair_single_active(versions) {
                warn!(%detector_type, "repaired active model flags");
                dirty = true;
            }
        }

        let state = RegistryState {
            models: document.models,
            last_update_check: document.last_update_check,
            available: BTreeMap::new(),
            updating: None,
        };
        let registry = Self {
            state: RwLock::new(state),
            store,
            source,
            settings,
            in_flight: AtomicUsize::new(0),
            write_gate: tokio::sync::Mutex::new(()),
            maintenance: tokio::sync::Mutex::new(()),
        };
        if dirty {
            let document = registry.state.read().document();
            registry.persist(&document)?;
        }
        Ok(Arc::new(registry))
    }

    /// Opens a registry backed by memory, for tests and ephemeral runs.
    pub fn in_memory(source: Arc<dyn UpdateSource>) -> Result<Arc<Self>> {
        Self::open(
            Arc::new(MemoryStore::new()),
            source,
            RegistrySettings::default(),
        )
    }

    fn parse_document(raw: &str) -> Result<RegistryDocument> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "registry document is corrupt; starting from defaults");
                return Ok(RegistryDocument::default());
            }
        };

        match value.get("schemaVersion").and_then(Value::as_u64) {
            Some(found) if found > u64::from(REGISTRY_SCHEMA_VERSION) => {
                Err(RegistryError::UnsupportedSchema {
                    found,
                    supported: REGISTRY_SCHEMA_VERSION,
                })
            }
            Some(_) => serde_json::from_value(value).or_else(|e| {
                warn!(error = %e, "registry document is malformed; starting from defaults");
                Ok(RegistryDocument::default())
            }),
            // Documents written before versioning are a bare type -> versions map.
            None => match serde_json::from_value::<BTreeMap<DetectorType, Vec<ModelVersion>>>(value) {
                Ok(models) => {
                    info!("migrating unversioned registry document");
                    Ok(RegistryDocument {
                        schema_version: 0,
                        models,
                        last_update_check: BTreeMap::new(),
                    })
                }
                Err(e) => {
                    warn!(error = %e, "registry document is malformed; starting from defaults");
                    Ok(RegistryDocument::default())
                }
            },
        }
    }

    fn persist(&self, document: &RegistryDocument) -> Result<()> {
        let raw = serde_json::to_string_pretty(document)?;
        self.store.save(REGISTRY_KEY, &raw)?;
        Ok(())
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn active_model(&self, detector_type: DetectorType) -> Option<ModelVersion> {
        self.state.read().active(detector_type).cloned()
    }

    /// All versions for a type, in creation order.
    pub fn versions(&self, detector_type: DetectorType) -> Vec<ModelVersion> {
        self.state
            .read()
            .models
            .get(&detector_type)
            .cloned()
            .unwrap_or_default()
    }

    pub fn active_models(&self) -> BTreeMap<DetectorType, ModelVersion> {
        let state = self.state.read();
        DetectorType::ALL
            .into_iter()
            .filter_map(|t| state.active(t).cloned().map(|m| (t, m)))
            .collect()
    }

    pub fn last_update_check(&self, detector_type: DetectorType) -> Option<DateTime<Utc>> {
        self.state.read().last_update_check.get(&detector_type).copied()
    }

    pub fn is_update_in_progress(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn update_status(&self, detector_type: DetectorType) -> UpdateStatus {
        let state = self.state.read();
        if state.updating == Some(detector_type) {
            UpdateStatus::Updating
        } else if state.available.get(&detector_type).copied().unwrap_or(false) {
            UpdateStatus::UpdateAvailable
        } else {
            UpdateStatus::UpToDate
        }
    }

    pub async fn check_for_updates(&self) -> Result<BTreeMap<DetectorType, bool>> {
        self.check_for_updates_at(Utc::now()).await
    }

    /// Asks the update source about every type whose last check is older
    /// than the cooldown. Types still cooling down report `false`.
    pub async fn check_for_updates_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<DetectorType, bool>> {
        let _maintenance = self.maintenance.lock().await;
        let mut report = BTreeMap::new();
        let mut checked = Vec::new();

        for detector_type in DetectorType::ALL {
            let cooling = self
                .last_update_check(detector_type)
                .is_some_and(|last| now - last < self.settings.check_cooldown);
            if cooling {
                debug!(%detector_type, "update check skipped during cooldown");
                report.insert(detector_type, false);
                continue;
            }

            let current = self.active_model(detector_type);
            let available = match self
                .source
                .is_update_available(detector_type, current.as_ref())
                .await
            {
                Ok(available) => available,
                Err(e) => {
                    warn!(%detector_type, error = %e, "update check failed");
                    false
                }
            };
            checked.push((detector_type, available));
            report.insert(detector_type, available);
        }

        if !checked.is_empty() {
            let _gate = self.write_gate.lock().await;
            let (document, previous_checks, previous_available) = {
                let mut state = self.state.write();
                let previous_checks = state.last_update_check.clone();
                let previous_available = state.available.clone();
                for (detector_type, available) in &checked {
                    state.last_update_check.insert(*detector_type, now);
                    state.available.insert(*detector_type, *available);
                }
                (state.document(), previous_checks, previous_available)
            };
            if let Err(e) = self.persist(&document) {
                let mut state = self.state.write();
                state.last_update_check = previous_checks;
                state.available = previous_available;
                return Err(e);
            }
        }
        Ok(report)
    }

    /// Downloads and activates the next model for `detector_type`.
    ///
    /// Returns `Ok(None)` without touching the registry when another update
    /// is in flight (unless forced), when the type has no active model, or
    /// when the update source fails. Storage failures are errors and leave
    /// the previous state in place.
    pub async fn update_model(
        &self,
        detector_type: DetectorType,
        options: UpdateOptions,
    ) -> Result<Option<ModelVersion>> {
        let Some(_in_flight) = InFlight::acquire(self, detector_type, options.force) else {
            info!(%detector_type, "update skipped: another update is in progress");
            return Ok(None);
        };
        let _maintenance = self.maintenance.lock().await;

        let Some(current) = self.active_model(detector_type) else {
            warn!(%detector_type, "update aborted: no active model");
            return Ok(None);
        };
        self.state.write().updating = Some(detector_type);

        options.report(0);
        let candidate = match self.download(detector_type, &current, &options).await {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(%detector_type, error = %e, "update download failed");
                return Ok(None);
            }
        };

        let _gate = self.write_gate.lock().await;
        let (next, document, previous) = {
            let mut state = self.state.write();
            let versions = state.models.entry(detector_type).or_default();
            let Some(next) = next_version(detector_type, &current, versions, &candidate, &options)
            else {
                warn!(%detector_type, from = %current.id, "update aborted: no version number left");
                return Ok(None);
            };
            let previous = versions.clone();
            for version in versions.iter_mut() {
                version.is_active = false;
            }
            versions.push(next.clone());
            state.available.insert(detector_type, false);
            (next, state.document(), previous)
        };
        if let Err(e) = self.persist(&document) {
            self.state.write().models.insert(detector_type, previous);
            return Err(e);
        }

        info!(
            %detector_type,
            from = %current.id,
            to = %next.id,
            accuracy = next.metrics.accuracy,
            "model updated"
        );
        options.report(100);
        Ok(Some(next))
    }

    async fn download(
        &self,
        detector_type: DetectorType,
        current: &ModelVersion,
        options: &UpdateOptions,
    ) -> std::result::Result<ModelCandidate, UpdateError> {
        let fetch = self.source.fetch_candidate(detector_type, current);
        tokio::pin!(fetch);

        let tick = self.settings.progress_tick.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
        let mut progress = 0u8;
        loop {
            tokio::select! {
                result = &mut fetch => return result,
                _ = ticker.tick() => {
                    if progress < 95 {
                        progress = (progress + 5).min(95);
                        options.report(progress);
                    }
                }
            }
        }
    }

    /// Makes `version_id` the active model for its type.
    ///
    /// Returns `false` without mutating anything when the id is unknown or an
    /// update is in flight.
    pub async fn rollback(&self, detector_type: DetectorType, version_id: &str) -> Result<bool> {
        if self.is_update_in_progress() {
            info!(%detector_type, "rollback skipped: an update is in progress");
            return Ok(false);
        }
        let _gate = self.write_gate.lock().await;
        let (document, previous) = {
            let mut state = self.state.write();
            let Some(versions) = state.models.get_mut(&detector_type) else {
                return Ok(false);
            };
            if !versions.iter().any(|v| v.id == version_id) {
                debug!(%detector_type, version_id, "rollback target not found");
                return Ok(false);
            }
            let previous = versions.clone();
            for version in versions.iter_mut() {
                version.is_active = version.id == version_id;
            }
            (state.document(), previous)
        };
        if let Err(e) = self.persist(&document) {
            self.state.write().models.insert(detector_type, previous);
            return Err(e);
        }
        info!(%detector_type, version_id, "rolled back model");
        Ok(true)
    }

    /// Appends a verdict to the type's feedback log. Never touches models.
    pub async fn add_feedback(
        &self,
        detector_type: DetectorType,
        result: &DetectionResult,
        is_accurate: bool,
        correction: Option<Value>,
    ) -> Result<FeedbackRecord> {
        let record = FeedbackRecord {
            timestamp: Utc::now(),
            detector_type,
            detection_result: serde_json::to_value(result)?,
            is_accurate,
            user_correction: correction,
            model_version: result
                .model_version
                .clone()
                .or_else(|| self.active_model(detector_type).map(|m| m.id)),
        };

        let _gate = self.write_gate.lock().await;
        let key = feedback_key(detector_type);
        let mut log = self.feedback_for_append(detector_type, &key)?;
        log.push(record.clone());
        self.store.save(&key, &serde_json::to_string_pretty(&log)?)?;
        info!(%detector_type, is_accurate, "recorded feedback");
        Ok(record)
    }

    pub fn feedback(&self, detector_type: DetectorType) -> Result<Vec<FeedbackRecord>> {
        self.read_feedback(&feedback_key(detector_type))
    }

    pub fn feedback_summary(&self, detector_type: DetectorType) -> Result<FeedbackSummary> {
        Ok(FeedbackSummary::from_records(&self.feedback(detector_type)?))
    }

    fn read_feedback(&self, key: &str) -> Result<Vec<FeedbackRecord>> {
        match self.store.load(key)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// The existing log, or a fresh one when the stored log is unreadable.
    /// An unreadable log is kept under `<key>-corrupt` before it is replaced.
    fn feedback_for_append(
        &self,
        detector_type: DetectorType,
        key: &str,
    ) -> Result<Vec<FeedbackRecord>> {
        let Some(raw) = self.store.load(key)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(log) => Ok(log),
            Err(e) => {
                let aside = format!("{key}-corrupt");
                warn!(
                    %detector_type,
                    error = %e,
                    moved_to = %aside,
                    "feedback log is corrupt; starting a new one"
                );
                self.store.save(&aside, &raw)?;
                Ok(Vec::new())
            }
        }
    }

    /// Runs `check_for_updates` every `check_interval` until the handle is
    /// aborted. The first check happens one interval after spawning.
    pub fn spawn_update_scheduler(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = registry.settings.check_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match registry.check_for_updates().await {
                    Ok(report) => {
                        let available: Vec<_> = report
                            .iter()
                            .filter(|(_, available)| **available)
                            .map(|(t, _)| t.as_str())
                            .collect();
                        debug!(?available, "scheduled update check finished");
                    }
                    Err(e) => warn!(error = %e, "scheduled update check failed"),
                }
            }
        })
    }
}

/// Leaves exactly one active version, preferring the newest flagged one.
/// Returns whether anything changed.
fn repair_single_active(versions: &mut [ModelVersion]) -> bool {
    let active: Vec<usize> = versions
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_active)
        .map(|(i, _)| i)
        .collect();
    if active.len() == 1 {
        return false;
    }
    let keep = active.last().copied().unwrap_or(versions.len() - 1);
    for (i, version) in versions.iter_mut().enumerate() {
        version.is_active = i == keep;
    }
    true
}

fn next_version(
    detector_type: DetectorType,
    current: &ModelVersion,
    existing: &[ModelVersion],
    candidate: &ModelCandidate,
    options: &UpdateOptions,
) -> Option<ModelVersion> {
    let taken = |v: SemVer| {
        let id = ModelVersion::id_for(detector_type, v);
        existing.iter().any(|m| m.id == id)
    };
    let current_semver = current.semver().unwrap_or(version::INITIAL_VERSION);

    let preferred = options
        .preferred_version
        .as_deref()
        .and_then(|raw| match raw.parse::<SemVer>() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "ignoring preferred version");
                None
            }
        })
        // A version with no successor would strand every later update.
        .filter(|v| *v > current_semver && !taken(*v) && v.bump_minor().is_some());

    let semver = match preferred {
        Some(semver) => semver,
        None => {
            let mut next = current_semver.bump_minor()?;
            // Rolled-back histories may already contain the next minor.
            while taken(next) {
                next = next.bump_minor()?;
            }
            next
        }
    };

    let metrics = &current.metrics;
    Some(ModelVersion {
        id: ModelVersion::id_for(detector_type, semver),
        version: semver.to_string(),
        timestamp: Utc::now(),
        metrics: ModelMetrics {
            accuracy: (metrics.accuracy + candidate.accuracy_gain.max(0.0))
                .min(MAX_ACCURACY)
                .max(metrics.accuracy.min(MAX_ACCURACY)),
            precision: candidate.precision.or(metrics.precision),
            recall: candidate.recall.or(metrics.recall),
            f1_score: match (candidate.precision, candidate.recall) {
                (Some(p), Some(r)) if p + r > 0.0 => Some(2.0 * p * r / (p + r)),
                _ => metrics.f1_score,
            },
            confidence_threshold: metrics.confidence_threshold,
            test_samples: metrics.test_samples.saturating_add(candidate.additional_samples),
        },
        is_active: true,
    })
}
