//! Offset learning engine.
//!
//! Learns how far the device's internal sensor reads from the room sensor
//! and predicts the setpoint offset that compensates for it. The engine also
//! owns the device's [`RecordPersister`], since its learning state and the
//! thermal snapshot are saved together as one [`DeviceRecord`].

use std::collections::VecDeque;
use std::future::Future;

use chrono::Utc;

use crate::device::PhysicalId;
use crate::persistence::{DeviceRecord, PersistenceError, RecordPersister};
use crate::thermal::ThermalSnapshot;

use super::config::OffsetConfig;
use super::model::OffsetModel;
use super::types::{OffsetContext, OffsetError, OffsetLearningState, OffsetPrediction, OffsetSample};

/// Per-device offset learner.
#[derive(Debug)]
pub struct OffsetEngine {
    device: PhysicalId,
    config: OffsetConfig,
    history: VecDeque<OffsetSample>,
    model: OffsetModel,
    confidence: f64,
    learning_enabled: bool,
    persister: Option<RecordPersister>,
}

impl OffsetEngine {
    pub fn new(device: PhysicalId, config: OffsetConfig) -> Self {
        let learning_enabled = config.learning_enabled;
        Self {
            device,
            config,
            history: VecDeque::new(),
            model: OffsetModel::default(),
            confidence: 0.0,
            learning_enabled,
            persister: None,
        }
    }

    /// Attach the persister used by [`save_async`](Self::save_async) and
    /// [`save`](Self::save).
    pub fn with_persister(mut self, persister: RecordPersister) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Load a device's engine and thermal snapshot from storage.
    ///
    /// An absent record yields an empty engine. A record that cannot be
    /// decoded, or that was written for another device, is logged and also
    /// yields an empty engine; only storage I/O failures are returned.
    pub async fn load(
        device: PhysicalId,
        config: OffsetConfig,
        persister: RecordPersister,
    ) -> Result<(Self, Option<ThermalSnapshot>), PersistenceError> {
        let bytes = persister.read().await?;
        let mut engine = Self::new(device, config).with_persister(persister);

        let Some(bytes) = bytes else {
            tracing::debug!(device = %engine.device, "No saved record, starting fresh");
            return Ok((engine, None));
        };

        match DeviceRecord::from_bytes(&bytes) {
            Ok(record) if record.device != engine.device => {
                tracing::warn!(
                    device = %engine.device,
                    stored = %record.device,
                    "Record belongs to another device, starting fresh"
                );
                Ok((engine, None))
            }
            Ok(record) => {
                engine.restore(record.offset_learning_state);
                tracing::info!(
                    device = %engine.device,
                    samples = engine.history.len(),
                    confidence = format!("{:.2}", engine.confidence),
                    saved_at = %record.saved_at,
                    "Learning state restored"
                );
                Ok((engine, Some(record.thermal)))
            }
            Err(e) => {
                tracing::warn!(
                    device = %engine.device,
                    error = %e,
                    "Saved record is unreadable, starting fresh"
                );
                Ok((engine, None))
            }
        }
    }

    pub fn device(&self) -> &PhysicalId {
        &self.device
    }

    pub fn config(&self) -> &OffsetConfig {
        &self.config
    }

    pub fn model(&self) -> &OffsetModel {
        &self.model
    }

    /// Model confidence (0.0 - 1.0).
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn sample_count(&self) -> usize {
        self.history.len()
    }

    pub fn is_learning_enabled(&self) -> bool {
        self.learning_enabled
    }

    pub fn persister(&self) -> Option<&RecordPersister> {
        self.persister.as_ref()
    }

    /// Predict the setpoint offset for the given conditions.
    pub fn calculate_offset(&self, context: &OffsetContext) -> OffsetPrediction {
        if self.history.is_empty() {
            return OffsetPrediction::no_data();
        }

        let raw = self.model.predict(context, &self.config);
        let max = self.config.max_offset.abs();

        let mut sources = vec!["mean"];
        if raw.used_hour_bucket {
            sources.push("hour");
        }
        if raw.used_outdoor {
            sources.push("outdoor");
        }

        if raw.value.abs() > max {
            let offset = raw.value.clamp(-max, max);
            return OffsetPrediction {
                offset,
                clamped: true,
                reason: format!(
                    "learned offset {:+.2}° clamped to {:+.2}° (limit ±{:.1}°)",
                    raw.value, offset, max
                ),
                confidence: self.confidence,
                sample_count: self.history.len(),
            };
        }

        OffsetPrediction {
            offset: raw.value,
            clamped: false,
            reason: format!(
                "learned offset {:+.2}° from {} samples ({})",
                raw.value,
                self.history.len(),
                sources.join("+")
            ),
            confidence: self.confidence,
            sample_count: self.history.len(),
        }
    }

    /// Record an observed sensor discrepancy.
    ///
    /// Returns `Ok(false)` when learning is disabled and the sample was
    /// ignored.
    pub fn record_observation(&mut self, sample: OffsetSample) -> Result<bool, OffsetError> {
        if !sample.observed_delta.is_finite() {
            return Err(OffsetError::InvalidSample(format!(
                "observed delta {} is not finite",
                sample.observed_delta
            )));
        }
        if sample.features.hour > 23 {
            return Err(OffsetError::InvalidSample(format!(
                "hour {} out of range",
                sample.features.hour
            )));
        }
        if !self.learning_enabled {
            return Ok(false);
        }

        self.history.push_back(sample);
        while self.history.len() > self.config.history_size.max(1) {
            self.history.pop_front();
        }
        self.refit();

        tracing::trace!(
            device = %self.device,
            samples = self.history.len(),
            mean = format!("{:.3}", self.model.mean),
            confidence = format!("{:.2}", self.confidence),
            "Offset sample recorded"
        );
        Ok(true)
    }

    /// Forget everything learned.
    pub fn reset(&mut self) {
        self.history.clear();
        self.model = OffsetModel::default();
        self.confidence = 0.0;
        tracing::info!(device = %self.device, "Offset learning reset");
    }

    pub fn set_learning_enabled(&mut self, enabled: bool) {
        if self.learning_enabled != enabled {
            tracing::info!(device = %self.device, enabled, "Offset learning toggled");
        }
        self.learning_enabled = enabled;
    }

    /// Snapshot of the learning state for persistence.
    pub fn learning_state(&self) -> OffsetLearningState {
        OffsetLearningState {
            samples: self.history.iter().cloned().collect(),
            model: self.model.clone(),
            confidence: self.confidence,
            learning_enabled: self.learning_enabled,
        }
    }

    /// Replace the learning state with a persisted one.
    ///
    /// Non-finite samples are dropped. The model is refitted whenever the
    /// stored model does not match the retained samples.
    pub fn restore(&mut self, state: OffsetLearningState) {
        let stored = state.samples.len();
        let mut samples: VecDeque<_> = state
            .samples
            .into_iter()
            .filter(|s| s.observed_delta.is_finite())
            .collect();
        while samples.len() > self.config.history_size.max(1) {
            samples.pop_front();
        }

        self.history = samples;
        self.learning_enabled = state.learning_enabled;

        let consistent = self.history.len() == stored
            && state.model.sample_count == stored
            && state.confidence.is_finite();
        if consistent {
            self.model = state.model;
            self.confidence = state.confidence.clamp(0.0, 1.0);
        } else {
            self.refit();
        }
    }

    /// Request a save of the current state without waiting.
    ///
    /// Returns the persister sequence number, or `None` when no persister is
    /// attached or the request failed. Failures are logged and left for the
    /// next checkpoint.
    pub fn save_async(&self, thermal: ThermalSnapshot) -> Option<u64> {
        let persister = self.persister.as_ref()?;
        match self.request_save(persister, thermal) {
            Ok(seq) => Some(seq),
            Err(e) => {
                tracing::warn!(device = %self.device, error = %e, "Save request failed");
                None
            }
        }
    }

    /// Request a save and return a future resolving when it is on storage.
    ///
    /// The state is captured before this returns, so the future holds no
    /// borrow of the engine.
    pub fn save(
        &self,
        thermal: ThermalSnapshot,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send + 'static {
        let requested = self
            .persister
            .as_ref()
            .map(|persister| (persister.clone(), self.request_save(persister, thermal)));

        async move {
            match requested {
                None => Ok(()),
                Some((persister, seq)) => persister.wait_for(seq?).await,
            }
        }
    }

    fn request_save(
        &self,
        persister: &RecordPersister,
        thermal: ThermalSnapshot,
    ) -> Result<u64, PersistenceError> {
        let record = DeviceRecord::new(self.device.clone(), thermal, self.learning_state(), Utc::now());
        persister.request(record.to_bytes()?)
    }

    fn refit(&mut self) {
        self.model = OffsetModel::fit(&self.history, &self.config);
        self.confidence = if self.history.is_empty() {
            0.0
        } else {
            let sample_factor =
                (self.history.len() as f64 / self.config.target_samples.max(1) as f64).min(1.0);
            let consistency = 1.0 / (1.0 + self.model.std_dev());
            (sample_factor * consistency).clamp(0.0, 1.0)
        };
    }
}
