//! Thermal state machine for one controlled device.
//!
//! The manager decides, tick by tick, whether the room may drift passively or
//! must be corrected, and when the building's time constants should be
//! re-measured.
//!
//! # Tick Evaluation
//!
//! ```text
//! reading ──► manual override? ──► cancel calibration
//!    │
//!    ├─ stale / missing room temperature ──► hold state, degraded
//!    │
//!    └─ fresh ──► error = room − target ──► per-state rules ──► TickOutcome
//! ```
//!
//! # Hysteresis
//!
//! Correction starts as soon as the error leaves the comfort band but only
//! stops once the error has stayed inside the inner band
//! (`comfort_band · inner_band_ratio`) for `min_dwell`. Leaving the inner band
//! restarts the dwell clock.
//!
//! # Calibration
//!
//! Calibration is entered from drifting or correcting at most once per
//! calendar day at `calibration_hour`, and additionally whenever model
//! confidence has decayed below the preference threshold (rate-limited by
//! `min_probe_interval`). Both the attempt and the completion are tracked
//! per day and persisted, so an aborted attempt is not retried within the
//! same hour, even across a restart.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::device::PhysicalId;

use super::config::ThermalConfig;
use super::error::{AbortReason, ProbeError, ThermalError, ThermalResult, UnavailableReason};
use super::model::PassiveThermalModel;
use super::preferences::UserPreferences;
use super::probe::{ProbeManager, ProbeRequest, ProbeResult};
use super::state::{AdjustmentMode, CalibrationPhase, ThermalAdjustment, ThermalState};

/// Sensor input for one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalReading {
    /// Controlled-room temperature, if the sensor is available.
    pub room_temperature: Option<f64>,
    /// Outdoor temperature, used as the ambient the room drifts toward.
    pub outdoor_temperature: Option<f64>,
    /// Setpoint the room should be held near.
    pub target_temperature: f64,
    /// Whether the user currently holds a manual override.
    pub manual_override: bool,
    /// When the sensor values were captured.
    pub captured_at: DateTime<Local>,
    /// Time until the next evaluation; the configured evaluation interval
    /// when `None`.
    pub next_evaluation: Option<Duration>,
}

impl ThermalReading {
    /// A reading with a known room temperature and no manual override.
    pub fn new(
        room_temperature: f64,
        outdoor_temperature: Option<f64>,
        target_temperature: f64,
        captured_at: DateTime<Local>,
    ) -> Self {
        Self {
            room_temperature: Some(room_temperature),
            outdoor_temperature,
            target_temperature,
            manual_override: false,
            captured_at,
            next_evaluation: None,
        }
    }

    /// Mark the reading as taken under a manual override.
    pub fn with_manual_override(mut self, manual_override: bool) -> Self {
        self.manual_override = manual_override;
        self
    }

    /// Set the time until the next evaluation.
    pub fn with_next_evaluation(mut self, next_evaluation: Duration) -> Self {
        self.next_evaluation = Some(next_evaluation);
        self
    }
}

/// Why calibration was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationTrigger {
    /// The daily calibration hour.
    Scheduled,
    /// Model confidence decayed below the preference threshold.
    LowConfidence,
}

impl std::fmt::Display for CalibrationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationTrigger::Scheduled => write!(f, "scheduled"),
            CalibrationTrigger::LowConfidence => write!(f, "low_confidence"),
        }
    }
}

/// A state change made during a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateTransition {
    /// State at the start of the tick.
    pub from: ThermalState,
    /// State at the end of the tick.
    pub to: ThermalState,
    pub at: DateTime<Local>,
}

/// Probe activity reported by a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeEvent {
    /// A probe window opened.
    Started,
    /// A probe finished and was recorded (possibly below threshold).
    Completed(ProbeResult),
    /// A probe was discarded.
    Aborted(AbortReason),
    /// Calibration gave up waiting for probe preconditions.
    Unavailable(UnavailableReason),
}

/// Result of one [`ThermalManager::evaluate`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    /// State after the tick.
    pub state: ThermalState,
    /// Set when the state changed.
    pub transition: Option<StateTransition>,
    /// Probe activity during the tick.
    pub probe: Option<ProbeEvent>,
    /// The tick reached a persistence checkpoint (entered calibration or
    /// drifting, or completed a probe).
    pub checkpoint: bool,
    /// Why the tick could not evaluate normally.
    pub degraded: Option<ThermalError>,
}

impl TickOutcome {
    fn held(state: ThermalState) -> Self {
        Self {
            state,
            transition: None,
            probe: None,
            checkpoint: false,
            degraded: None,
        }
    }

    /// Whether the tick ran on missing or stale data.
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Persisted portion of a thermal manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalSnapshot {
    pub tau_cooling: f64,
    pub tau_warming: f64,
    pub model_confidence: f64,
    #[serde(default)]
    pub last_calibrated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub probe_history: Vec<ProbeResult>,
    #[serde(default)]
    pub last_calibration_date: Option<NaiveDate>,
    /// Whether priming had completed; a primed manager resumes in drifting.
    #[serde(default)]
    pub primed: bool,
    /// Date of the last scheduled calibration attempt, completed or not.
    #[serde(default)]
    pub last_scheduled_attempt: Option<NaiveDate>,
}

/// Finite-state thermal controller for one device.
#[derive(Debug)]
pub struct ThermalManager {
    device: PhysicalId,
    config: ThermalConfig,
    preferences: UserPreferences,
    model: PassiveThermalModel,
    probes: ProbeManager,

    state: ThermalState,
    last_transition: DateTime<Local>,

    /// Start of the current priming period.
    priming_started: DateTime<Local>,

    /// When the error most recently entered the inner band while correcting.
    inner_band_since: Option<DateTime<Local>>,

    /// When the current calibration began.
    calibration_started: Option<DateTime<Local>>,

    /// Bias held while calibrating.
    pre_calibration_bias: f64,

    /// Bias requested while correcting.
    correction_bias: f64,

    /// Error from the most recent fresh reading.
    last_error: Option<f64>,

    /// Date of the last completed probe.
    last_calibration_date: Option<NaiveDate>,

    /// Date of the last scheduled calibration attempt.
    last_scheduled_attempt: Option<NaiveDate>,

    /// Last calibration attempt of any kind.
    last_probe_attempt: Option<DateTime<Local>>,

    /// Last reason a probe could not start (logged once per change).
    last_unavailable: Option<UnavailableReason>,

    /// Recent fresh room temperatures, oldest first.
    baseline: VecDeque<f64>,

    degraded: Option<ThermalError>,
}

impl ThermalManager {
    /// Create a manager in the priming state.
    ///
    /// Fails only if the configured default time constants are invalid.
    pub fn new(
        device: PhysicalId,
        config: ThermalConfig,
        preferences: UserPreferences,
        now: DateTime<Local>,
    ) -> ThermalResult<Self> {
        let model = PassiveThermalModel::new(config.default_tau_cooling, config.default_tau_warming)?
            .with_confidence_half_life(config.confidence_half_life);
        let probes = ProbeManager::new(config.probe.clone());
        let baseline = VecDeque::with_capacity(config.baseline_window);

        tracing::debug!(
            device = %device,
            preference = %preferences.level(),
            "Thermal manager created"
        );

        Ok(Self {
            device,
            config,
            preferences,
            model,
            probes,
            state: ThermalState::Priming,
            last_transition: now,
            priming_started: now,
            inner_band_since: None,
            calibration_started: None,
            pre_calibration_bias: 0.0,
            correction_bias: 0.0,
            last_error: None,
            last_calibration_date: None,
            last_scheduled_attempt: None,
            last_probe_attempt: None,
            last_unavailable: None,
            baseline,
            degraded: None,
        })
    }

    pub fn device(&self) -> &PhysicalId {
        &self.device
    }

    /// Current operating state.
    pub fn current_state(&self) -> ThermalState {
        self.state
    }

    /// When the state last changed.
    pub fn last_transition(&self) -> DateTime<Local> {
        self.last_transition
    }

    pub fn model(&self) -> &PassiveThermalModel {
        &self.model
    }

    pub fn preferences(&self) -> &UserPreferences {
        &self.preferences
    }

    pub fn probes(&self) -> &ProbeManager {
        &self.probes
    }

    pub fn config(&self) -> &ThermalConfig {
        &self.config
    }

    /// Date of the last completed probe.
    pub fn last_calibration_date(&self) -> Option<NaiveDate> {
        self.last_calibration_date
    }

    /// Error (room − target) from the most recent fresh reading.
    pub fn last_error(&self) -> Option<f64> {
        self.last_error
    }

    /// Whether the last tick ran on missing or stale data.
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// Replace the user preferences wholesale.
    pub fn set_preferences(&mut self, preferences: UserPreferences) {
        if preferences != self.preferences {
            tracing::info!(
                device = %self.device,
                from = %self.preferences.level(),
                to = %preferences.level(),
                comfort_band = preferences.comfort_band(),
                "Comfort preferences changed"
            );
        }
        self.preferences = preferences;
    }

    /// Explicitly replace model time constants (configuration path).
    pub fn update_model(&mut self, tau_cooling: Option<f64>, tau_warming: Option<f64>) -> ThermalResult<()> {
        self.model.update(tau_cooling, tau_warming)
    }

    /// Run the state machine for one tick.
    ///
    /// Never fails: missing or stale input holds the current state and is
    /// reported through [`TickOutcome::degraded`].
    pub fn evaluate(&mut self, reading: &ThermalReading, now: DateTime<Local>) -> TickOutcome {
        let mut outcome = TickOutcome::held(self.state);

        if reading.manual_override && self.state.is_calibrating() {
            self.cancel_calibration(AbortReason::ManualOverride, now, &mut outcome);
        }

        let room = match self.fresh_room_temperature(reading, now) {
            Ok(room) => room,
            Err(err) => {
                if self.degraded.is_none() {
                    tracing::warn!(
                        device = %self.device,
                        state = %self.state,
                        reason = %err,
                        "Holding thermal state on degraded input"
                    );
                }
                self.degraded = Some(err.clone());
                outcome.degraded = Some(err);
                outcome.state = self.state;
                return outcome;
            }
        };
        if self.degraded.take().is_some() {
            tracing::info!(device = %self.device, "Sensor data recovered");
        }

        self.push_baseline(room);
        let error = room - reading.target_temperature;
        self.last_error = Some(error);

        match self.state {
            ThermalState::Priming => self.evaluate_priming(error, now, &mut outcome),
            ThermalState::Drifting => self.evaluate_drifting(reading, room, error, now, &mut outcome),
            ThermalState::Correcting => self.evaluate_correcting(reading, room, error, now, &mut outcome),
            ThermalState::Calibrating(CalibrationPhase::Preparing) => {
                self.evaluate_preparing(reading, room, error, now, &mut outcome)
            }
            ThermalState::Calibrating(CalibrationPhase::Probing) => {
                self.evaluate_probing(room, error, now, &mut outcome)
            }
        }

        outcome.state = self.state;
        outcome
    }

    /// Cancel calibration in response to an external manual-override signal.
    ///
    /// Discards any in-progress probe without touching the model and returns
    /// to the state implied by the last known error.
    pub fn cancel_probe(&mut self, now: DateTime<Local>) -> TickOutcome {
        let mut outcome = TickOutcome::held(self.state);
        if self.state.is_calibrating() {
            self.cancel_calibration(AbortReason::ManualOverride, now, &mut outcome);
        }
        outcome.state = self.state;
        outcome
    }

    /// Adjustment the resolver should apply for the current state.
    pub fn thermal_adjustment(&self) -> ThermalAdjustment {
        let mut adjustment = match self.state {
            ThermalState::Priming => ThermalAdjustment::none("priming: learning building response"),
            ThermalState::Drifting => ThermalAdjustment {
                bias: 0.0,
                mode: AdjustmentMode::AllowDrift,
                degraded: false,
                reason: "within comfort band, allowing drift".to_string(),
            },
            ThermalState::Correcting => ThermalAdjustment {
                bias: self.correction_bias,
                mode: AdjustmentMode::Correct,
                degraded: false,
                reason: format!("correcting toward target ({:+.1}°)", self.correction_bias),
            },
            ThermalState::Calibrating(_) => ThermalAdjustment {
                bias: self.pre_calibration_bias,
                mode: AdjustmentMode::Hold,
                degraded: false,
                reason: format!(
                    "{}: holding pre-calibration bias ({:+.1}°)",
                    self.state, self.pre_calibration_bias
                ),
            },
        };

        if let Some(err) = &self.degraded {
            adjustment.degraded = true;
            adjustment.reason = format!("{} [degraded: {}]", adjustment.reason, err);
        }
        adjustment
    }

    /// Capture the persisted portion of this manager.
    pub fn snapshot(&self) -> ThermalSnapshot {
        ThermalSnapshot {
            tau_cooling: self.model.tau_cooling(),
            tau_warming: self.model.tau_warming(),
            model_confidence: self.model.base_confidence(),
            last_calibrated: self.model.last_calibrated(),
            probe_history: self.probes.history().cloned().collect(),
            last_calibration_date: self.last_calibration_date,
            primed: self.state != ThermalState::Priming,
            last_scheduled_attempt: self.last_scheduled_attempt,
        }
    }

    /// Restore persisted state.
    ///
    /// A snapshot taken after priming resumes in drifting. Invalid time
    /// constants are rejected and leave the manager unchanged.
    pub fn restore(&mut self, snapshot: ThermalSnapshot, now: DateTime<Local>) -> ThermalResult<()> {
        let model = PassiveThermalModel::restored(
            snapshot.tau_cooling,
            snapshot.tau_warming,
            snapshot.model_confidence,
            snapshot.last_calibrated,
        )?
        .with_confidence_half_life(self.config.confidence_half_life);

        self.model = model;
        self.probes.restore_history(snapshot.probe_history);
        self.last_calibration_date = snapshot.last_calibration_date;
        self.last_scheduled_attempt = snapshot.last_scheduled_attempt;

        if snapshot.primed && self.state == ThermalState::Priming {
            self.state = ThermalState::Drifting;
            self.last_transition = now;
        }

        tracing::info!(
            device = %self.device,
            state = %self.state,
            tau_cooling = format!("{:.0}", self.model.tau_cooling()),
            tau_warming = format!("{:.0}", self.model.tau_warming()),
            confidence = format!("{:.2}", self.model.base_confidence()),
            "Thermal state restored"
        );
        Ok(())
    }

    fn fresh_room_temperature(&self, reading: &ThermalReading, now: DateTime<Local>) -> Result<f64, ThermalError> {
        let age = elapsed(reading.captured_at, now);
        if age > self.config.stale_after {
            return Err(ThermalError::StaleSensorData(format!(
                "reading is {}s old",
                age.as_secs()
            )));
        }
        match reading.room_temperature {
            Some(temperature) if temperature.is_finite() => Ok(temperature),
            _ => Err(ThermalError::StaleSensorData(
                "room temperature unavailable".to_string(),
            )),
        }
    }

    fn push_baseline(&mut self, room: f64) {
        self.baseline.push_back(room);
        while self.baseline.len() > self.config.baseline_window.max(1) {
            self.baseline.pop_front();
        }
    }

    fn evaluate_priming(&mut self, error: f64, now: DateTime<Local>, outcome: &mut TickOutcome) {
        if error.abs() > self.config.critical_deviation {
            if now > self.priming_started {
                tracing::info!(
                    device = %self.device,
                    error = format!("{:+.1}", error),
                    "Critical deviation, restarting priming"
                );
            }
            self.priming_started = now;
            return;
        }

        if elapsed(self.priming_started, now) >= self.config.priming_duration {
            self.transition(ThermalState::Drifting, now, outcome);
        }
    }

    fn evaluate_drifting(
        &mut self,
        reading: &ThermalReading,
        room: f64,
        error: f64,
        now: DateTime<Local>,
        outcome: &mut TickOutcome,
    ) {
        if self.needs_correction(reading, room, error, now) {
            self.correction_bias = self.bias_for(error);
            self.transition(ThermalState::Correcting, now, outcome);
            return;
        }

        if let Some(trigger) = self.calibration_trigger(reading, now) {
            self.begin_calibration(trigger, now, outcome);
            self.evaluate_preparing(reading, room, error, now, outcome);
        }
    }

    fn evaluate_correcting(
        &mut self,
        reading: &ThermalReading,
        room: f64,
        error: f64,
        now: DateTime<Local>,
        outcome: &mut TickOutcome,
    ) {
        self.correction_bias = self.bias_for(error);

        if let Some(trigger) = self.calibration_trigger(reading, now) {
            self.begin_calibration(trigger, now, outcome);
            self.evaluate_preparing(reading, room, error, now, outcome);
            return;
        }

        let inner_band = self.preferences.comfort_band() * self.config.inner_band_ratio;
        if error.abs() > inner_band {
            self.inner_band_since = None;
            return;
        }

        let since = *self.inner_band_since.get_or_insert(now);
        if elapsed(since, now) >= self.config.min_dwell {
            self.correction_bias = 0.0;
            self.transition(ThermalState::Drifting, now, outcome);
        }
    }

    fn evaluate_preparing(
        &mut self,
        reading: &ThermalReading,
        room: f64,
        error: f64,
        now: DateTime<Local>,
        outcome: &mut TickOutcome,
    ) {
        let request = ProbeRequest {
            started_at: now.with_timezone(&Utc),
            start_temperature: room,
            ambient_temperature: reading.outdoor_temperature,
            manual_override: reading.manual_override,
            baseline: self.baseline.iter().copied().collect(),
            probe_drift: self.preferences.probe_drift(),
        };

        match self.probes.start_probe(request) {
            Ok(()) => {
                self.last_unavailable = None;
                outcome.probe = Some(ProbeEvent::Started);
                self.transition(ThermalState::Calibrating(CalibrationPhase::Probing), now, outcome);
            }
            Err(ProbeError::Unavailable(reason)) => {
                if self.last_unavailable != Some(reason) {
                    tracing::debug!(
                        device = %self.device,
                        reason = %reason,
                        "Waiting for probe preconditions"
                    );
                    self.last_unavailable = Some(reason);
                }

                let since = self.calibration_started.unwrap_or(now);
                if elapsed(since, now) >= self.config.prepare_timeout {
                    tracing::warn!(
                        device = %self.device,
                        reason = %reason,
                        "Calibration abandoned, probe preconditions not met"
                    );
                    outcome.probe = Some(ProbeEvent::Unavailable(reason));
                    self.finish_calibration(error, now, outcome);
                }
            }
            Err(ProbeError::Aborted(reason)) => {
                outcome.probe = Some(ProbeEvent::Aborted(reason));
                self.finish_calibration(error, now, outcome);
            }
        }
    }

    fn evaluate_probing(&mut self, room: f64, error: f64, now: DateTime<Local>, outcome: &mut TickOutcome) {
        let at = now.with_timezone(&Utc);

        if let Err(err) = self.probes.observe(room, at) {
            outcome.probe = Some(probe_event(err));
            self.finish_calibration(error, now, outcome);
            return;
        }

        if !self.probes.is_window_complete(at) {
            return;
        }

        match self.probes.complete_probe(&mut self.model, &self.preferences, at) {
            Ok(result) => {
                self.last_calibration_date = Some(now.date_naive());
                outcome.checkpoint = true;
                outcome.probe = Some(ProbeEvent::Completed(result));
            }
            Err(err) => outcome.probe = Some(probe_event(err)),
        }
        self.finish_calibration(error, now, outcome);
    }

    fn needs_correction(&self, reading: &ThermalReading, room: f64, error: f64, now: DateTime<Local>) -> bool {
        let band = self.preferences.comfort_band();
        if error.abs() > band {
            return true;
        }

        let Some(outdoor) = reading.outdoor_temperature else {
            return false;
        };
        if self.model.confidence_at(now.with_timezone(&Utc)) < self.preferences.confidence_threshold() {
            return false;
        }

        let horizon = reading
            .next_evaluation
            .unwrap_or(self.config.evaluation_interval)
            .as_secs_f64();
        let predicted = self.model.predict_temperature(horizon, room, outdoor);
        let predicted_error = predicted - reading.target_temperature;
        if predicted_error.abs() > band {
            tracing::debug!(
                device = %self.device,
                error = format!("{:+.2}", error),
                predicted_error = format!("{:+.2}", predicted_error),
                "Anticipating comfort band exit"
            );
            return true;
        }
        false
    }

    fn calibration_trigger(&self, reading: &ThermalReading, now: DateTime<Local>) -> Option<CalibrationTrigger> {
        if reading.manual_override {
            return None;
        }

        let today = now.date_naive();
        if now.hour() == self.config.calibration_hour
            && self.last_scheduled_attempt != Some(today)
            && self.last_calibration_date != Some(today)
        {
            return Some(CalibrationTrigger::Scheduled);
        }

        let confidence = self.model.confidence_at(now.with_timezone(&Utc));
        let due = self
            .last_probe_attempt
            .map_or(true, |at| elapsed(at, now) >= self.config.min_probe_interval);
        if due && confidence < self.preferences.confidence_threshold() {
            return Some(CalibrationTrigger::LowConfidence);
        }
        None
    }

    fn begin_calibration(&mut self, trigger: CalibrationTrigger, now: DateTime<Local>, outcome: &mut TickOutcome) {
        if trigger == CalibrationTrigger::Scheduled {
            self.last_scheduled_attempt = Some(now.date_naive());
        }
        self.last_probe_attempt = Some(now);
        self.calibration_started = Some(now);
        self.last_unavailable = None;
        self.pre_calibration_bias = match self.state {
            ThermalState::Correcting => self.correction_bias,
            _ => 0.0,
        };

        tracing::info!(
            device = %self.device,
            trigger = %trigger,
            confidence = format!("{:.2}", self.model.confidence_at(now.with_timezone(&Utc))),
            "Calibration started"
        );
        self.transition(ThermalState::Calibrating(CalibrationPhase::Preparing), now, outcome);
    }

    fn cancel_calibration(&mut self, reason: AbortReason, now: DateTime<Local>, outcome: &mut TickOutcome) {
        let was_probing = self.probes.cancel(reason);
        tracing::info!(
            device = %self.device,
            reason = %reason,
            was_probing,
            "Calibration cancelled"
        );
        outcome.probe = Some(ProbeEvent::Aborted(reason));
        let error = self.last_error.unwrap_or(0.0);
        self.finish_calibration(error, now, outcome);
    }

    /// Leave calibration for the state implied by the current error.
    fn finish_calibration(&mut self, error: f64, now: DateTime<Local>, outcome: &mut TickOutcome) {
        self.calibration_started = None;
        self.inner_band_since = None;

        let next = if error.abs() > self.preferences.comfort_band() {
            self.correction_bias = self.bias_for(error);
            ThermalState::Correcting
        } else {
            self.correction_bias = 0.0;
            ThermalState::Drifting
        };
        self.transition(next, now, outcome);
    }

    fn bias_for(&self, error: f64) -> f64 {
        let limit = self.config.max_correction_bias.abs();
        (-error * self.config.correction_gain).clamp(-limit, limit)
    }

    fn transition(&mut self, to: ThermalState, now: DateTime<Local>, outcome: &mut TickOutcome) {
        let from = self.state;
        if from == to {
            return;
        }

        self.state = to;
        self.last_transition = now;
        if to == ThermalState::Correcting {
            self.inner_band_since = None;
        }

        let entered_calibration = to.is_calibrating() && !from.is_calibrating();
        if entered_calibration || to == ThermalState::Drifting {
            outcome.checkpoint = true;
        }

        outcome.transition = Some(StateTransition {
            from: outcome.transition.map_or(from, |earlier| earlier.from),
            to,
            at: now,
        });

        tracing::info!(
            device = %self.device,
            from = %from,
            to = %to,
            "Thermal state transition"
        );
    }

    /// Force a specific state (for testing).
    #[cfg(test)]
    pub(crate) fn set_state(&mut self, state: ThermalState, now: DateTime<Local>) {
        self.state = state;
        self.last_transition = now;
        self.inner_band_since = None;
    }
}

fn probe_event(err: ProbeError) -> ProbeEvent {
    match err {
        ProbeError::Aborted(reason) => ProbeEvent::Aborted(reason),
        ProbeError::Unavailable(reason) => ProbeEvent::Unavailable(reason),
    }
}

/// Non-negative time between two instants.
fn elapsed(from: DateTime<Local>, to: DateTime<Local>) -> Duration {
    (to - from).to_std().unwrap_or_default()
}
