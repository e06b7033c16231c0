//! Passive-decay probes for measuring the building's time constants.
//!
//! A probe holds the device idle and watches the room relax toward the
//! ambient temperature. The samples are fitted to the exponential model to
//! estimate τ for the current drift direction.
//!
//! # Probe Flow
//!
//! ```text
//! start_probe ──► observe (per tick) ──► window complete ──► complete_probe
//!      │                │                                        │
//!      │                ├─ drift > probe_drift ──► Aborted       ├─ confidence ≥ threshold
//!      │                └─ elapsed > max ─────► Aborted          │      └─► blend into model
//!      └─ preconditions fail ──► Unavailable                     └─ always ─► history
//! ```
//!
//! # Fitting
//!
//! With `r(t) = (T(t) − T_amb) / (T_0 − T_amb)` the model gives
//! `ln r(t) = −t/τ`. A least-squares line through the origin on
//! `(t, ln r)` yields the slope `−1/τ`.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::ProbeConfig;
use super::error::{AbortReason, ProbeError, UnavailableReason};
use super::model::{DriftDirection, PassiveThermalModel};
use super::preferences::UserPreferences;

/// Longest time constant a fit may produce (7 days).
const MAX_PLAUSIBLE_TAU_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// Everything needed to decide whether a probe may start.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    /// Start of the observation window.
    pub started_at: DateTime<Utc>,
    /// Room temperature at the start.
    pub start_temperature: f64,
    /// Ambient (outdoor) temperature the room relaxes toward.
    pub ambient_temperature: Option<f64>,
    /// Whether the user currently holds a manual override.
    pub manual_override: bool,
    /// Recent room readings, oldest first.
    pub baseline: Vec<f64>,
    /// Allowed drift from the start temperature before aborting.
    pub probe_drift: f64,
}

/// A single probe measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ProbeSample {
    /// Seconds since the probe started.
    elapsed_secs: f64,
    temperature: f64,
}

/// An in-progress probe.
#[derive(Debug, Clone)]
struct ActiveProbe {
    started_at: DateTime<Utc>,
    start_temperature: f64,
    ambient: f64,
    direction: DriftDirection,
    probe_drift: f64,
    samples: Vec<ProbeSample>,
}

/// Outcome of a finished probe.
///
/// Results are immutable once created and kept in a bounded history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Fitted time constant (seconds).
    pub tau_estimate: f64,
    /// Confidence in the fit (0.0 - 1.0).
    pub confidence: f64,
    /// When the probe completed.
    pub timestamp: DateTime<Utc>,
    /// Ambient temperature during the probe.
    pub ambient_temperature: f64,
    /// Which time constant was measured.
    pub direction: DriftDirection,
    /// Number of samples used.
    pub sample_count: usize,
    /// RMS residual of the fit (°).
    pub fit_error: f64,
    /// Whether the estimate was blended into the model.
    pub accepted: bool,
}

/// Runs probes and maintains the probe history.
#[derive(Debug)]
pub struct ProbeManager {
    config: ProbeConfig,
    active: Option<ActiveProbe>,
    history: VecDeque<ProbeResult>,
}

impl ProbeManager {
    /// Create a new probe manager.
    pub fn new(config: ProbeConfig) -> Self {
        let capacity = config.history_size;
        Self {
            config,
            active: None,
            history: VecDeque::with_capacity(capacity),
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ProbeConfig::default())
    }

    /// Whether a probe window is open.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// When the active probe started.
    pub fn active_since(&self) -> Option<DateTime<Utc>> {
        self.active.as_ref().map(|probe| probe.started_at)
    }

    /// Number of samples in the active probe.
    pub fn active_sample_count(&self) -> usize {
        self.active.as_ref().map_or(0, |probe| probe.samples.len())
    }

    /// Whether the active probe has run for its full observation window.
    pub fn is_window_complete(&self, now: DateTime<Utc>) -> bool {
        self.active.as_ref().is_some_and(|probe| {
            elapsed_secs(probe.started_at, now) >= self.config.window.as_secs_f64()
        })
    }

    /// Completed probes, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &ProbeResult> {
        self.history.iter()
    }

    /// Most recent completed probe.
    pub fn last_result(&self) -> Option<&ProbeResult> {
        self.history.back()
    }

    /// Replace the history with persisted results (trimmed to capacity).
    pub fn restore_history(&mut self, results: Vec<ProbeResult>) {
        self.history = results.into_iter().collect();
        self.trim_history();
    }

    /// Begin an observation window.
    pub fn start_probe(&mut self, request: ProbeRequest) -> Result<(), ProbeError> {
        if self.active.is_some() {
            return Err(ProbeError::Unavailable(UnavailableReason::AlreadyActive));
        }
        if request.manual_override {
            return Err(ProbeError::Unavailable(UnavailableReason::ManualOverride));
        }
        let ambient = request
            .ambient_temperature
            .ok_or(ProbeError::Unavailable(UnavailableReason::AmbientUnknown))?;
        if request.baseline.len() < self.config.min_baseline_samples {
            return Err(ProbeError::Unavailable(UnavailableReason::InsufficientBaseline));
        }

        let (min, max) = request
            .baseline
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| {
                (lo.min(*t), hi.max(*t))
            });
        if max - min > self.config.baseline_tolerance {
            return Err(ProbeError::Unavailable(UnavailableReason::UnstableBaseline));
        }
        if (request.start_temperature - ambient).abs() < self.config.min_gradient {
            return Err(ProbeError::Unavailable(UnavailableReason::InsufficientGradient));
        }

        let direction = DriftDirection::between(request.start_temperature, ambient);
        tracing::info!(
            start = request.start_temperature,
            ambient,
            direction = %direction,
            window_secs = self.config.window.as_secs(),
            "Thermal probe started"
        );

        self.active = Some(ActiveProbe {
            started_at: request.started_at,
            start_temperature: request.start_temperature,
            ambient,
            direction,
            probe_drift: request.probe_drift,
            samples: vec![ProbeSample {
                elapsed_secs: 0.0,
                temperature: request.start_temperature,
            }],
        });
        Ok(())
    }

    /// Record a sample for the active probe.
    ///
    /// Aborts the probe when the room drifts further than allowed or the
    /// window has exceeded its maximum duration. Without an active probe
    /// this is a no-op.
    pub fn observe(&mut self, temperature: f64, timestamp: DateTime<Utc>) -> Result<(), ProbeError> {
        let Some(probe) = self.active.as_mut() else {
            return Ok(());
        };

        let elapsed = elapsed_secs(probe.started_at, timestamp);
        if elapsed > self.config.max_duration.as_secs_f64() {
            self.abort(AbortReason::Inconclusive);
            return Err(ProbeError::Aborted(AbortReason::Inconclusive));
        }

        let drift = (temperature - probe.start_temperature).abs();
        if drift > probe.probe_drift {
            tracing::info!(
                drift = format!("{:.2}", drift),
                allowed = probe.probe_drift,
                "Thermal probe drift exceeded"
            );
            self.abort(AbortReason::DriftExceeded);
            return Err(ProbeError::Aborted(AbortReason::DriftExceeded));
        }

        probe.samples.push(ProbeSample {
            elapsed_secs: elapsed,
            temperature,
        });
        Ok(())
    }

    /// Cancel the active probe, discarding its samples.
    ///
    /// Returns `true` if a probe was running. The model is never touched.
    pub fn cancel(&mut self, reason: AbortReason) -> bool {
        self.abort(reason)
    }

    /// Fit the collected samples and record the result.
    ///
    /// The estimate is blended into `model` only when its confidence reaches
    /// the preference threshold; the result is added to history either way.
    pub fn complete_probe(
        &mut self,
        model: &mut PassiveThermalModel,
        preferences: &UserPreferences,
        now: DateTime<Utc>,
    ) -> Result<ProbeResult, ProbeError> {
        let probe = self
            .active
            .take()
            .ok_or(ProbeError::Aborted(AbortReason::Inconclusive))?;

        if probe.samples.len() < self.config.min_samples {
            tracing::warn!(
                samples = probe.samples.len(),
                min_required = self.config.min_samples,
                "Thermal probe failed: insufficient samples"
            );
            return Err(ProbeError::Aborted(AbortReason::Inconclusive));
        }

        let Some(fit) = fit_time_constant(&probe) else {
            tracing::warn!(
                samples = probe.samples.len(),
                direction = %probe.direction,
                "Thermal probe failed: samples show no passive decay"
            );
            return Err(ProbeError::Aborted(AbortReason::Inconclusive));
        };

        let confidence = self.score(&probe, fit.rms_error);
        let accepted = confidence >= preferences.confidence_threshold();

        if accepted {
            let prior = model.tau(probe.direction);
            let alpha = (self.config.blend_rate * confidence).clamp(0.0, 1.0);
            let blended = prior * (1.0 - alpha) + fit.tau * alpha;
            if let Err(e) = model.apply_calibration(probe.direction, blended, confidence, now) {
                tracing::warn!(error = %e, "Rejected blended time constant");
                return Err(ProbeError::Aborted(AbortReason::Inconclusive));
            }
            tracing::info!(
                direction = %probe.direction,
                estimate = format!("{:.0}", fit.tau),
                prior = format!("{:.0}", prior),
                blended = format!("{:.0}", blended),
                confidence = format!("{:.2}", confidence),
                "Thermal probe accepted"
            );
        } else {
            tracing::info!(
                direction = %probe.direction,
                estimate = format!("{:.0}", fit.tau),
                confidence = format!("{:.2}", confidence),
                threshold = preferences.confidence_threshold(),
                "Thermal probe recorded below confidence threshold"
            );
        }

        let result = ProbeResult {
            tau_estimate: fit.tau,
            confidence,
            timestamp: now,
            ambient_temperature: probe.ambient,
            direction: probe.direction,
            sample_count: probe.samples.len(),
            fit_error: fit.rms_error,
            accepted,
        };
        self.history.push_back(result.clone());
        self.trim_history();
        Ok(result)
    }

    /// Confidence from sample count, temporal spread and fit quality.
    fn score(&self, probe: &ActiveProbe, rms_error: f64) -> f64 {
        let sample_factor =
            (probe.samples.len() as f64 / self.config.target_samples.max(1) as f64).min(1.0);

        let first = probe.samples.first().map_or(0.0, |s| s.elapsed_secs);
        let last = probe.samples.last().map_or(0.0, |s| s.elapsed_secs);
        let window = self.config.window.as_secs_f64().max(1.0);
        let spread_factor = ((last - first) / window).clamp(0.0, 1.0);

        let fit_factor = (1.0 - rms_error / self.config.max_fit_error.max(f64::EPSILON)).max(0.0);

        (sample_factor * 0.4 + spread_factor * 0.3 + fit_factor * 0.3).clamp(0.0, 1.0)
    }

    fn abort(&mut self, reason: AbortReason) -> bool {
        match self.active.take() {
            Some(probe) => {
                tracing::info!(
                    reason = %reason,
                    samples = probe.samples.len(),
                    "Thermal probe discarded"
                );
                true
            }
            None => false,
        }
    }

    fn trim_history(&mut self) {
        while self.history.len() > self.config.history_size {
            self.history.pop_front();
        }
    }
}

impl Default for ProbeManager {
    fn default() -> Self {
        Self::with_defaults()
    }
}

struct Fit {
    tau: f64,
    rms_error: f64,
}

fn fit_time_constant(probe: &ActiveProbe) -> Option<Fit> {
    let gradient = probe.start_temperature - probe.ambient;
    if gradient.abs() < f64::EPSILON {
        return None;
    }

    let (sum_ty, sum_tt) = probe
        .samples
        .iter()
        .filter(|s| s.elapsed_secs > 0.0)
        .filter_map(|s| {
            let ratio = (s.temperature - probe.ambient) / gradient;
            (ratio > 0.0).then(|| (s.elapsed_secs, ratio.ln()))
        })
        .fold((0.0, 0.0), |(ty, tt), (t, y)| (ty + t * y, tt + t * t));

    if sum_tt <= 0.0 {
        return None;
    }
    let decay_rate = -sum_ty / sum_tt;
    if decay_rate.is_nan() || decay_rate <= 0.0 {
        return None;
    }
    let tau = 1.0 / decay_rate;
    if !tau.is_finite() || tau > MAX_PLAUSIBLE_TAU_SECS {
        return None;
    }

    let squared: f64 = probe
        .samples
        .iter()
        .map(|s| {
            let predicted = probe.ambient + gradient * (-s.elapsed_secs / tau).exp();
            (s.temperature - predicted).powi(2)
        })
        .sum();
    let rms_error = (squared / probe.samples.len() as f64).sqrt();

    Some(Fit { tau, rms_error })
}

fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}
