//! Per-device control loop.
//!
//! The [`Controller`] wires a registered device group to its collaborators
//! and runs one control tick at a time:
//!
//! ```text
//! SensorSource ─┐
//! ModeSource ───┼─► DeviceSnapshot ─► ThermalManager::evaluate
//!               │                  ─► OffsetEngine::record_observation
//!               │                  ─► PriorityResolver::resolve
//!               │                  ─► TemperatureSink::apply_offset_and_limits
//!               │                  ─► send_temperature_command (when changed)
//!               └─ checkpoint / save interval ─► OffsetEngine::save_async
//! ```
//!
//! Ticks are synchronous up to the command send. Persistence runs in the
//! background and never fails a tick; the shutdown path awaits it.
//!
//! # Example
//!
//! ```ignore
//! let controller = Controller::new(registry, &device, io, 22.0, ControllerConfig::default())?;
//! let shutdown = CancellationToken::new();
//! tokio::spawn(controller.run(shutdown.clone()));
//! // ...
//! shutdown.cancel();
//! ```

mod error;

pub use error::ControllerError;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::device::{
    DeviceSnapshot, ModeAdjustments, ModeSource, PhysicalId, SensorSource, SinkError, TemperatureSink,
};
use crate::offset::{OffsetContext, OffsetSample};
use crate::registry::{DeviceGroup, ThermalRegistry};
use crate::resolver::{PriorityResolver, ResolvedTarget};
use crate::thermal::{ThermalState, TickOutcome, UserPreferences};

/// Controller timing.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Control tick period unless the mode layer overrides it.
    pub tick_interval: Duration,
    /// Longest time between saves when no checkpoint occurs.
    pub save_interval: Duration,
    /// Smallest change (°) that triggers a new command.
    pub min_command_change: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            save_interval: Duration::from_secs(15 * 60),
            min_command_change: 0.1,
        }
    }
}

/// The external collaborators of one device.
#[derive(Clone)]
pub struct DeviceIo {
    pub sensors: Arc<dyn SensorSource>,
    pub modes: Option<Arc<dyn ModeSource>>,
    pub sink: Arc<dyn TemperatureSink>,
}

/// What one tick did.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub snapshot: DeviceSnapshot,
    pub outcome: TickOutcome,
    pub resolved: ResolvedTarget,
    /// Value after the sink's own offsets and limits.
    pub command: f64,
    /// Whether the command was sent this tick.
    pub sent: bool,
    pub sink_error: Option<SinkError>,
    /// Whether a save was requested this tick.
    pub save_requested: bool,
}

/// Runs control ticks for one registered device.
pub struct Controller {
    device: PhysicalId,
    group: Arc<DeviceGroup>,
    resolver: PriorityResolver,
    io: DeviceIo,
    config: ControllerConfig,
    base_target: f64,
    manual_override: Option<f64>,
    last_command: Option<f64>,
    last_save: Option<DateTime<Local>>,
}

impl Controller {
    /// Bind to a device already present in the registry.
    pub fn new(
        registry: Arc<ThermalRegistry>,
        device: &PhysicalId,
        io: DeviceIo,
        base_target: f64,
        config: ControllerConfig,
    ) -> Result<Self, ControllerError> {
        let group = registry
            .get(device)
            .ok_or_else(|| ControllerError::UnknownDevice(device.clone()))?;

        Ok(Self {
            device: device.clone(),
            group,
            resolver: PriorityResolver::new(registry),
            io,
            config,
            base_target,
            manual_override: None,
            last_command: None,
            last_save: None,
        })
    }

    pub fn device(&self) -> &PhysicalId {
        &self.device
    }

    pub fn group(&self) -> &Arc<DeviceGroup> {
        &self.group
    }

    pub fn base_target(&self) -> f64 {
        self.base_target
    }

    pub fn manual_override(&self) -> Option<f64> {
        self.manual_override
    }

    pub fn last_command(&self) -> Option<f64> {
        self.last_command
    }

    pub fn current_state(&self) -> ThermalState {
        self.group.manager().lock().current_state()
    }

    pub fn set_base_target(&mut self, target: f64) {
        self.base_target = target;
    }

    pub fn set_preferences(&self, preferences: UserPreferences) {
        self.group.manager().lock().set_preferences(preferences);
    }

    /// Set or clear the manual override.
    ///
    /// Setting one cancels any calibration in progress immediately.
    pub fn set_manual_override(&mut self, value: Option<f64>, now: DateTime<Local>) {
        if value.is_some() {
            let outcome = self.group.manager().lock().cancel_probe(now);
            if outcome.transition.is_some() {
                tracing::info!(device = %self.device, "Calibration cancelled by manual override");
            }
        }
        self.manual_override = value;
    }

    /// Run the synchronous part of a tick: evaluate, learn, resolve, save.
    pub fn plan(&mut self, now: DateTime<Local>) -> TickReport {
        let snapshot = DeviceSnapshot::capture(self.io.sensors.as_ref(), self.io.modes.as_deref(), now);
        let mode = self.io.modes.as_ref().map(|_| &snapshot.adjustments);

        let target = self
            .manual_override
            .or_else(|| mode.and_then(|m| m.temperature_override))
            .unwrap_or(self.base_target);
        let reading = snapshot
            .thermal_reading(target, self.manual_override.is_some())
            .with_next_evaluation(self.period_for(mode));
        let outcome = self.group.manager().lock().evaluate(&reading, now);

        if let Some(sample) = OffsetSample::from_snapshot(&snapshot) {
            if let Err(e) = self.group.offset().lock().record_observation(sample) {
                tracing::debug!(device = %self.device, error = %e, "Offset sample skipped");
            }
        }

        let limits = self.io.sink.limits();
        let context = OffsetContext::from_snapshot(&snapshot);
        let resolved = self.resolver.resolve(
            &self.device,
            self.base_target,
            mode,
            self.manual_override,
            &context,
            limits,
        );
        let command = self.io.sink.apply_offset_and_limits(resolved.target_temperature);

        let save_requested = self.save_if_due(&outcome, now);

        tracing::debug!(
            device = %self.device,
            state = %outcome.state,
            source = %resolved.source,
            target = format!("{:.2}", resolved.target_temperature),
            command = format!("{:.2}", command),
            degraded = resolved.degraded,
            "Tick planned"
        );

        TickReport {
            snapshot,
            outcome,
            resolved,
            command,
            sent: false,
            sink_error: None,
            save_requested,
        }
    }

    /// Run one full tick, sending the command when it changed.
    pub async fn tick(&mut self, now: DateTime<Local>) -> TickReport {
        let mut report = self.plan(now);

        let changed = self
            .last_command
            .map_or(true, |last| (last - report.command).abs() >= self.config.min_command_change);
        if !changed && !report.resolved.force_operation {
            return report;
        }

        match self.send(report.command).await {
            Ok(()) => {
                tracing::info!(
                    device = %self.device,
                    value = format!("{:.1}", report.command),
                    reason = %report.resolved.reason,
                    "Temperature command sent"
                );
                report.sent = true;
            }
            Err(ControllerError::Sink(e)) => {
                tracing::warn!(device = %self.device, error = %e, "Temperature command failed");
                report.sink_error = Some(e);
            }
            Err(e) => {
                tracing::warn!(device = %self.device, error = %e, "Temperature command failed");
            }
        }
        report
    }

    /// Send a setpoint to the sink directly.
    pub async fn send(&mut self, value: f64) -> Result<(), ControllerError> {
        self.io.sink.send_temperature_command(value).await?;
        self.last_command = Some(value);
        Ok(())
    }

    /// Save the current state and wait until it is on storage.
    pub async fn flush(&self) -> Result<(), ControllerError> {
        let thermal = self.group.manager().lock().snapshot();
        let save = self.group.offset().lock().save(thermal);
        save.await?;
        Ok(())
    }

    /// Tick on an interval until `shutdown` fires, then flush.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), ControllerError> {
        let mut period = self.tick_period();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            device = %self.device,
            label = %self.group.label(),
            period_secs = period.as_secs_f64(),
            "Controller started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::info!(device = %self.device, "Controller shutting down");
                    break;
                }

                _ = interval.tick() => {
                    self.tick(Local::now()).await;

                    let next = self.tick_period();
                    if next != period {
                        tracing::debug!(
                            device = %self.device,
                            from_secs = period.as_secs_f64(),
                            to_secs = next.as_secs_f64(),
                            "Tick period changed"
                        );
                        period = next;
                        interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    }
                }
            }
        }

        let result = self.flush().await;
        match &result {
            Ok(()) => tracing::info!(device = %self.device, "Controller stopped"),
            Err(e) => tracing::error!(device = %self.device, error = %e, "Final save failed"),
        }
        result
    }

    fn tick_period(&self) -> Duration {
        let adjustments = self.io.modes.as_ref().map(|m| m.adjustments());
        self.period_for(adjustments.as_ref())
    }

    /// Tick period under the given mode adjustments.
    fn period_for(&self, adjustments: Option<&ModeAdjustments>) -> Duration {
        adjustments
            .and_then(|a| a.update_interval_override)
            .unwrap_or(self.config.tick_interval)
            .max(Duration::from_millis(1))
    }

    /// Request a save on a checkpoint or once the save interval has passed.
    ///
    /// A failed write leaves the persister dirty; it is retried by the next
    /// save requested here, not on every tick.
    fn save_if_due(&mut self, outcome: &TickOutcome, now: DateTime<Local>) -> bool {
        let interval_due = self.last_save.map_or(true, |at| {
            (now - at).to_std().unwrap_or_default() >= self.config.save_interval
        });

        if !(outcome.checkpoint || interval_due) {
            return false;
        }

        let thermal = self.group.manager().lock().snapshot();
        let requested = self.group.offset().lock().save_async(thermal).is_some();
        if requested {
            self.last_save = Some(now);
        }
        requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BoxFuture, DisplayId, ModeAdjustments, OperatingMode, TemperatureLimits};
    use crate::offset::{OffsetConfig, OffsetEngine};
    use crate::persistence::{DeviceRecord, MemoryStorage, RecordPersister};
    use crate::resolver::DecisionSource;
    use crate::thermal::{ThermalConfig, ThermalManager, ThermalSnapshot};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Sensors {
        room: Mutex<Option<f64>>,
        internal: Mutex<Option<f64>>,
    }

    impl SensorSource for Sensors {
        fn room_temperature(&self) -> Option<f64> {
            *self.room.lock()
        }

        fn outdoor_temperature(&self) -> Option<f64> {
            Some(8.0)
        }

        fn device_internal_temperature(&self) -> Option<f64> {
            *self.internal.lock()
        }
    }

    struct Modes(Mutex<ModeAdjustments>);

    impl ModeSource for Modes {
        fn adjustments(&self) -> ModeAdjustments {
            *self.0.lock()
        }

        fn current_mode(&self) -> OperatingMode {
            OperatingMode::Boost
        }
    }

    #[derive(Default)]
    struct Sink {
        commands: Mutex<Vec<f64>>,
        fail: AtomicBool,
    }

    impl TemperatureSink for Sink {
        fn limits(&self) -> TemperatureLimits {
            TemperatureLimits::new(16.0, 30.0)
        }

        fn send_temperature_command(&self, value: f64) -> BoxFuture<'_, Result<(), SinkError>> {
            Box::pin(async move {
                if self.fail.load(Ordering::SeqCst) {
                    return Err(SinkError::Unavailable("offline".to_string()));
                }
                self.commands.lock().push(value);
                Ok(())
            })
        }
    }

    struct Fixture {
        controller: Controller,
        sensors: Arc<Sensors>,
        sink: Arc<Sink>,
        storage: Arc<MemoryStorage>,
    }

    fn fixture(modes: Option<Arc<Modes>>) -> Fixture {
        let device = PhysicalId::new("unit-1");
        let storage = Arc::new(MemoryStorage::new());
        let manager = ThermalManager::new(
            device.clone(),
            ThermalConfig::default(),
            UserPreferences::default(),
            Local::now(),
        )
        .unwrap();
        let offset = OffsetEngine::new(device.clone(), OffsetConfig::default())
            .with_persister(RecordPersister::new(device.clone(), storage.clone()));

        let registry = Arc::new(ThermalRegistry::new());
        registry.register(DeviceGroup::new(DisplayId::new("climate.test"), manager, offset));

        let sensors = Arc::new(Sensors {
            room: Mutex::new(Some(22.0)),
            internal: Mutex::new(Some(23.0)),
        });
        let sink = Arc::new(Sink::default());
        let io = DeviceIo {
            sensors: sensors.clone(),
            modes: modes.map(|m| m as Arc<dyn ModeSource>),
            sink: sink.clone(),
        };
        let controller = Controller::new(registry, &device, io, 22.0, ControllerConfig::default()).unwrap();

        Fixture {
            controller,
            sensors,
            sink,
            storage,
        }
    }

    #[test]
    fn test_unknown_device_is_rejected() {
        let registry = Arc::new(ThermalRegistry::new());
        let io = DeviceIo {
            sensors: Arc::new(Sensors {
                room: Mutex::new(None),
                internal: Mutex::new(None),
            }),
            modes: None,
            sink: Arc::new(Sink::default()),
        };
        let result = Controller::new(registry, &PhysicalId::new("ghost"), io, 22.0, ControllerConfig::default());
        assert!(matches!(result, Err(ControllerError::UnknownDevice(_))));
    }

    #[tokio::test]
    async fn test_first_tick_sends_offset_corrected_target() {
        let mut f = fixture(None);
        let report = f.controller.tick(Local::now()).await;

        // Internal sensor reads 1° high; the first sample already teaches that
        assert!(report.sent);
        assert_eq!(report.resolved.source, DecisionSource::Base);
        assert!((report.command - 23.0).abs() < 1e-9);
        assert_eq!(f.sink.commands.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_command_is_not_resent() {
        let mut f = fixture(None);
        let now = Local::now();
        f.controller.tick(now).await;
        let second = f.controller.tick(now + chrono::Duration::seconds(60)).await;

        assert!(!second.sent);
        assert_eq!(f.sink.commands.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_force_operation_resends() {
        let modes = Arc::new(Modes(Mutex::new(ModeAdjustments {
            force_operation: true,
            ..Default::default()
        })));
        let mut f = fixture(Some(modes));
        let now = Local::now();
        f.controller.tick(now).await;
        let second = f.controller.tick(now + chrono::Duration::seconds(60)).await;

        assert!(second.sent);
        assert_eq!(f.sink.commands.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_manual_override_is_sent_verbatim() {
        let mut f = fixture(None);
        let now = Local::now();
        f.controller.set_manual_override(Some(20.0), now);
        let report = f.controller.tick(now).await;

        assert_eq!(report.resolved.source, DecisionSource::ManualOverride);
        assert_eq!(report.command, 20.0);
        assert_eq!(*f.sink.commands.lock(), vec![20.0]);
    }

    #[tokio::test]
    async fn test_sink_failure_is_reported_and_retried() {
        let mut f = fixture(None);
        let now = Local::now();
        f.sink.fail.store(true, Ordering::SeqCst);
        let failed = f.controller.tick(now).await;
        assert!(!failed.sent);
        assert!(failed.sink_error.is_some());
        assert_eq!(f.controller.last_command(), None);

        f.sink.fail.store(false, Ordering::SeqCst);
        let retried = f.controller.tick(now + chrono::Duration::seconds(60)).await;
        assert!(retried.sent);
    }

    #[tokio::test]
    async fn test_missing_room_temperature_degrades() {
        let mut f = fixture(None);
        *f.sensors.room.lock() = None;
        let report = f.controller.tick(Local::now()).await;

        assert!(report.outcome.is_degraded());
        assert!(report.resolved.degraded);
        // Still commands something sensible
        assert!(report.sent);
    }

    #[tokio::test]
    async fn test_flush_writes_record() {
        let mut f = fixture(None);
        f.controller.tick(Local::now()).await;
        f.controller.flush().await.unwrap();

        let bytes = f.storage.get(f.controller.device()).expect("record written");
        let record = DeviceRecord::from_bytes(&bytes).unwrap();
        assert_eq!(record.offset_learning_state.samples.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_store_is_retried_only_when_save_due() {
        let mut f = fixture(None);
        f.storage.set_fail_writes(true);
        let start = Local::now();

        // Priming without checkpoints: only the first tick is due
        for minute in 0..10 {
            let report = f.controller.tick(start + chrono::Duration::minutes(minute)).await;
            assert!(!report.outcome.checkpoint);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(f.storage.write_count(), 1);
        let dirty = f.controller.group().offset().lock().persister().unwrap().is_dirty();
        assert!(dirty);

        f.storage.set_fail_writes(false);
        f.controller.tick(start + chrono::Duration::minutes(14)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(f.storage.write_count(), 1);

        let report = f.controller.tick(start + chrono::Duration::minutes(15)).await;
        assert!(report.save_requested);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(f.storage.write_count(), 2);
        assert!(f.storage.get(f.controller.device()).is_some());
    }

    fn midday() -> DateTime<Local> {
        Local::now()
            .date_naive()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_local_timezone(Local)
            .unwrap()
    }

    fn confident_snapshot(now: DateTime<Local>) -> ThermalSnapshot {
        ThermalSnapshot {
            tau_cooling: 36_000.0,
            tau_warming: 36_000.0,
            model_confidence: 1.0,
            last_calibrated: Some(now.with_timezone(&chrono::Utc)),
            probe_history: Vec::new(),
            last_calibration_date: None,
            primed: true,
            last_scheduled_attempt: None,
        }
    }

    #[tokio::test]
    async fn test_anticipation_horizon_follows_tick_interval() {
        let now = midday();

        // 22.5° in a room drifting slowly toward 8° outdoors
        let mut minute = fixture(None);
        minute.controller.group().manager().lock().restore(confident_snapshot(now), now).unwrap();
        *minute.sensors.room.lock() = Some(22.5);
        let report = minute.controller.tick(now).await;
        assert_ne!(report.outcome.state, ThermalState::Correcting);

        let mut hours = fixture(None);
        hours.controller.config.tick_interval = Duration::from_secs(2 * 3600);
        hours.controller.group().manager().lock().restore(confident_snapshot(now), now).unwrap();
        *hours.sensors.room.lock() = Some(22.5);
        let report = hours.controller.tick(now).await;
        assert_eq!(report.outcome.state, ThermalState::Correcting);
    }

    #[tokio::test]
    async fn test_mode_interval_override_sets_anticipation_horizon() {
        let modes = Arc::new(Modes(Mutex::new(ModeAdjustments {
            update_interval_override: Some(Duration::from_secs(2 * 3600)),
            ..Default::default()
        })));
        let mut f = fixture(Some(modes));
        let now = midday();
        f.controller.group().manager().lock().restore(confident_snapshot(now), now).unwrap();
        *f.sensors.room.lock() = Some(22.5);

        let report = f.controller.tick(now).await;
        assert_eq!(report.outcome.state, ThermalState::Correcting);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel_and_flushes() {
        let f = fixture(None);
        let mut controller = f.controller;
        controller.config.tick_interval = Duration::from_millis(10);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(controller.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown.cancel();

        handle.await.unwrap().unwrap();
        assert!(!f.sink.commands.lock().is_empty());
        assert!(f.storage.get(&PhysicalId::new("unit-1")).is_some());
    }
}
