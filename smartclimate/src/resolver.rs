//! Setpoint resolution.
//!
//! Merges every input into one target temperature, highest precedence first:
//!
//! ```text
//! 1. manual override            → used verbatim, nothing else consulted
//! 2. mode temperature override  → clamped to limits
//! 3. base + mode additive
//!         + thermal bias + offset → clamped to limits
//! 4. base + offset              → clamped to limits
//! ```
//!
//! Layer 3 decides whenever the mode layer is present or the thermal
//! manager requests a bias; otherwise layer 4 does. Every result names the
//! deciding layer in its reason.

use std::sync::Arc;

use crate::device::{ModeAdjustments, PhysicalId, TemperatureLimits};
use crate::offset::{OffsetContext, OffsetPrediction};
use crate::registry::ThermalRegistry;
use crate::thermal::ThermalAdjustment;

/// Layer that decided a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    ManualOverride,
    ModeOverride,
    /// Mode additive adjustment combined with thermal bias and offset.
    Combined,
    /// Base setpoint with learned offset.
    Base,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::ManualOverride => "manual_override",
            DecisionSource::ModeOverride => "mode_override",
            DecisionSource::Combined => "combined",
            DecisionSource::Base => "base",
        }
    }
}

impl std::fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final setpoint decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub target_temperature: f64,
    /// Which layer decided and why.
    pub reason: String,
    pub source: DecisionSource,
    /// Thermal inputs were stale or the offset model has data but no trust.
    pub degraded: bool,
    /// Mode layer asks the sink to act even if the value is unchanged.
    pub force_operation: bool,
}

/// Resolve the target temperature for one tick.
pub fn resolve_target_temperature(
    base: f64,
    mode: Option<&ModeAdjustments>,
    manual_override: Option<f64>,
    thermal: &ThermalAdjustment,
    offset: &OffsetPrediction,
    limits: TemperatureLimits,
) -> ResolvedTarget {
    let force_operation = mode.is_some_and(|m| m.force_operation);

    match manual_override {
        Some(manual) if manual.is_finite() => {
            return ResolvedTarget {
                target_temperature: manual,
                reason: format!("manual override {:.1}°", manual),
                source: DecisionSource::ManualOverride,
                degraded: false,
                force_operation,
            };
        }
        Some(manual) => {
            tracing::warn!(value = manual, "Ignoring non-finite manual override");
        }
        None => {}
    }

    if let Some(target) = mode.and_then(|m| m.temperature_override).filter(|t| t.is_finite()) {
        let (target_temperature, note) = clamp_noted(target, limits);
        return ResolvedTarget {
            target_temperature,
            reason: format!("mode override {:.1}°{}", target, note),
            source: DecisionSource::ModeOverride,
            degraded: false,
            force_operation,
        };
    }

    let degraded = thermal.degraded || offset.is_untrusted();
    let degraded_note = if degraded { " [degraded]" } else { "" };

    if mode.is_some() || thermal.is_active() {
        let additive = mode.map(ModeAdjustments::additive).unwrap_or_default();
        let raw = base + additive + thermal.bias + offset.offset;
        let (target_temperature, note) = clamp_noted(raw, limits);
        return ResolvedTarget {
            target_temperature,
            reason: format!(
                "base {:.1}° mode {:+.1}° thermal {:+.1}° ({}) offset {:+.2}°{}{}",
                base, additive, thermal.bias, thermal.mode, offset.offset, note, degraded_note
            ),
            source: DecisionSource::Combined,
            degraded,
            force_operation,
        };
    }

    let (target_temperature, note) = clamp_noted(base + offset.offset, limits);
    ResolvedTarget {
        target_temperature,
        reason: format!(
            "base {:.1}° offset {:+.2}° ({}){}{}",
            base, offset.offset, offset.reason, note, degraded_note
        ),
        source: DecisionSource::Base,
        degraded,
        force_operation,
    }
}

fn clamp_noted(value: f64, limits: TemperatureLimits) -> (f64, String) {
    let clamped = limits.clamp(value);
    if (clamped - value).abs() > f64::EPSILON {
        (clamped, format!(", clamped from {:.1}° to [{:.1}, {:.1}]", value, limits.min, limits.max))
    } else {
        (clamped, String::new())
    }
}

/// Resolver bound to a registry.
#[derive(Debug, Clone)]
pub struct PriorityResolver {
    registry: Arc<ThermalRegistry>,
}

impl PriorityResolver {
    pub fn new(registry: Arc<ThermalRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ThermalRegistry> {
        &self.registry
    }

    /// Resolve using the device's registered thermal manager and offset engine.
    ///
    /// An unregistered device resolves to the clamped base setpoint, marked
    /// degraded.
    pub fn resolve(
        &self,
        device: &PhysicalId,
        base: f64,
        mode: Option<&ModeAdjustments>,
        manual_override: Option<f64>,
        context: &OffsetContext,
        limits: TemperatureLimits,
    ) -> ResolvedTarget {
        let Some(group) = self.registry.get(device) else {
            tracing::warn!(device = %device, "Resolving for unregistered device");
            let thermal = ThermalAdjustment {
                degraded: true,
                ..ThermalAdjustment::none("device not registered")
            };
            let mut resolved = resolve_target_temperature(
                base,
                mode,
                manual_override,
                &thermal,
                &OffsetPrediction::no_data(),
                limits,
            );
            if resolved.source != DecisionSource::ManualOverride {
                resolved.degraded = true;
                resolved.reason = format!("{} [device not registered]", resolved.reason);
            }
            return resolved;
        };

        let thermal = group.manager().lock().thermal_adjustment();
        let offset = group.offset().lock().calculate_offset(context);
        resolve_target_temperature(base, mode, manual_override, &thermal, &offset, limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thermal::AdjustmentMode;
    use proptest::prelude::*;

    fn limits() -> TemperatureLimits {
        TemperatureLimits::new(16.0, 30.0)
    }

    fn offset(value: f64) -> OffsetPrediction {
        OffsetPrediction {
            offset: value,
            clamped: false,
            reason: "test".to_string(),
            confidence: 0.8,
            sample_count: 20,
        }
    }

    fn correcting(bias: f64) -> ThermalAdjustment {
        ThermalAdjustment {
            bias,
            mode: AdjustmentMode::Correct,
            degraded: false,
            reason: "correcting".to_string(),
        }
    }

    #[test]
    fn test_manual_override_is_verbatim() {
        let mode = ModeAdjustments {
            temperature_override: Some(25.0),
            boost_offset: 3.0,
            ..Default::default()
        };
        let resolved = resolve_target_temperature(22.0, Some(&mode), Some(20.0), &correcting(-2.0), &offset(1.0), limits());

        assert_eq!(resolved.target_temperature, 20.0);
        assert_eq!(resolved.source, DecisionSource::ManualOverride);
    }

    #[test]
    fn test_manual_override_ignores_limits() {
        let resolved = resolve_target_temperature(22.0, None, Some(12.0), &correcting(0.0), &offset(0.0), limits());
        assert_eq!(resolved.target_temperature, 12.0);
    }

    #[test]
    fn test_mode_override_beats_combination() {
        let mode = ModeAdjustments {
            temperature_override: Some(18.0),
            offset_adjustment: 2.0,
            ..Default::default()
        };
        let resolved = resolve_target_temperature(22.0, Some(&mode), None, &correcting(1.0), &offset(1.0), limits());

        assert_eq!(resolved.target_temperature, 18.0);
        assert_eq!(resolved.source, DecisionSource::ModeOverride);
        assert!(resolved.reason.starts_with("mode override"));
    }

    #[test]
    fn test_combined_layer_sums_inputs() {
        let mode = ModeAdjustments {
            offset_adjustment: -1.0,
            boost_offset: 0.5,
            force_operation: true,
            ..Default::default()
        };
        let resolved = resolve_target_temperature(22.0, Some(&mode), None, &correcting(-0.8), &offset(0.3), limits());

        assert!((resolved.target_temperature - 21.0).abs() < 1e-9);
        assert_eq!(resolved.source, DecisionSource::Combined);
        assert!(resolved.force_operation);
    }

    #[test]
    fn test_thermal_bias_without_mode_layer_is_combined() {
        let resolved = resolve_target_temperature(22.0, None, None, &correcting(-1.0), &offset(0.0), limits());
        assert_eq!(resolved.source, DecisionSource::Combined);
        assert_eq!(resolved.target_temperature, 21.0);
    }

    #[test]
    fn test_base_layer_applies_offset() {
        let drift = ThermalAdjustment::none("drifting");
        let resolved = resolve_target_temperature(22.0, None, None, &drift, &offset(1.5), limits());

        assert_eq!(resolved.target_temperature, 23.5);
        assert_eq!(resolved.source, DecisionSource::Base);
        assert!(!resolved.degraded);
    }

    #[test]
    fn test_clamping_is_noted() {
        let drift = ThermalAdjustment::none("drifting");
        let resolved = resolve_target_temperature(29.0, None, None, &drift, &offset(4.0), limits());

        assert_eq!(resolved.target_temperature, 30.0);
        assert!(resolved.reason.contains("clamped"));
    }

    #[test]
    fn test_degraded_thermal_marks_result() {
        let mut stale = correcting(-1.0);
        stale.degraded = true;
        let resolved = resolve_target_temperature(22.0, None, None, &stale, &offset(0.0), limits());
        assert!(resolved.degraded);
        assert!(resolved.reason.contains("degraded"));
    }

    #[test]
    fn test_untrusted_offset_marks_result() {
        let untrusted = OffsetPrediction {
            confidence: 0.0,
            ..offset(0.2)
        };
        let drift = ThermalAdjustment::none("drifting");
        assert!(resolve_target_temperature(22.0, None, None, &drift, &untrusted, limits()).degraded);

        // No data at all is not degraded, just unlearned
        let empty = OffsetPrediction::no_data();
        assert!(!resolve_target_temperature(22.0, None, None, &drift, &empty, limits()).degraded);
    }

    #[test]
    fn test_unregistered_device_falls_back_to_base() {
        let resolver = PriorityResolver::new(Arc::new(ThermalRegistry::new()));
        let resolved = resolver.resolve(
            &PhysicalId::new("missing"),
            22.0,
            None,
            None,
            &OffsetContext::default(),
            limits(),
        );
        assert_eq!(resolved.target_temperature, 22.0);
        assert!(resolved.degraded);
    }

    proptest! {
        #[test]
        fn prop_manual_override_always_wins(
            base in -10.0f64..40.0,
            bias in -5.0f64..5.0,
            learned in -5.0f64..5.0,
            mode_target in proptest::option::of(10.0f64..35.0),
            boost in -3.0f64..3.0,
        ) {
            let mode = ModeAdjustments {
                temperature_override: mode_target,
                boost_offset: boost,
                ..Default::default()
            };
            let resolved = resolve_target_temperature(base, Some(&mode), Some(20.0), &correcting(bias), &offset(learned), limits());
            prop_assert_eq!(resolved.target_temperature, 20.0);
        }

        #[test]
        fn prop_non_manual_targets_within_limits(
            base in -10.0f64..40.0,
            bias in -5.0f64..5.0,
            learned in -5.0f64..5.0,
        ) {
            let resolved = resolve_target_temperature(base, None, None, &correcting(bias), &offset(learned), limits());
            prop_assert!(limits().contains(resolved.target_temperature));
        }
    }
}
