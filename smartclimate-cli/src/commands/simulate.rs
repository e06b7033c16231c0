//! Simulate command - drive the controller against a simulated room.
//!
//! The room cools or warms toward a diurnal outdoor temperature with a
//! single time constant. The simulated device heats with fixed power,
//! switching on its own (biased) internal sensor. Time is accelerated: each
//! step advances the simulated clock without waiting.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Timelike};
use parking_lot::RwLock;
use smartclimate::controller::{Controller, ControllerConfig, DeviceIo};
use smartclimate::device::{
    BoxFuture, DisplayId, PhysicalId, SensorSource, SinkError, TemperatureLimits, TemperatureSink,
};
use smartclimate::offset::OffsetEngine;
use smartclimate::persistence::RecordPersister;
use smartclimate::registry::{DeviceGroup, ThermalRegistry};
use smartclimate::thermal::{ProbeEvent, ThermalManager, ThermalState};

use super::common::{resolve_preferences, resolve_storage, PreferenceArg, StorageArg};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Heating power of the simulated device (° per hour).
const HEAT_RATE: f64 = 3.0;

/// Switching hysteresis of the simulated device's own thermostat (°).
const DEVICE_HYSTERESIS: f64 = 0.3;

/// Arguments for the simulate command.
pub struct SimulateArgs {
    pub device: String,
    pub hours: f64,
    pub step_secs: u64,
    pub room: f64,
    pub outdoor: f64,
    pub target: f64,
    pub building_tau_hours: f64,
    pub sensor_bias: f64,
    pub preference: Option<PreferenceArg>,
    pub storage: Option<StorageArg>,
    pub dir: Option<PathBuf>,
    pub report_minutes: u64,
}

/// Simulated room and device.
#[derive(Debug, Clone)]
struct Plant {
    now: DateTime<Local>,
    room: f64,
    outdoor_mean: f64,
    tau_secs: f64,
    sensor_bias: f64,
    setpoint: f64,
    heating: bool,
}

impl Plant {
    /// Outdoor temperature with a ±4° daily swing peaking mid-afternoon.
    fn outdoor(&self) -> f64 {
        let hour = self.now.hour() as f64 + self.now.minute() as f64 / 60.0;
        self.outdoor_mean + 4.0 * ((hour - 9.0) / 24.0 * std::f64::consts::TAU).sin()
    }

    /// Reading of the device's own sensor, warmed by its coil while heating.
    fn internal(&self) -> f64 {
        self.room + self.sensor_bias + if self.heating { 0.5 } else { 0.0 }
    }

    fn step(&mut self, dt: Duration) {
        let internal = self.internal();
        if internal < self.setpoint - DEVICE_HYSTERESIS {
            self.heating = true;
        } else if internal > self.setpoint + DEVICE_HYSTERESIS {
            self.heating = false;
        }

        let secs = dt.as_secs_f64();
        let outdoor = self.outdoor();
        self.room = outdoor + (self.room - outdoor) * (-secs / self.tau_secs).exp();
        if self.heating {
            self.room += HEAT_RATE * secs / 3600.0;
        }
        self.now += chrono::Duration::from_std(dt).unwrap_or_else(|_| chrono::Duration::seconds(60));
    }
}

struct SimSensors(Arc<RwLock<Plant>>);

impl SensorSource for SimSensors {
    fn room_temperature(&self) -> Option<f64> {
        Some(self.0.read().room)
    }

    fn outdoor_temperature(&self) -> Option<f64> {
        Some(self.0.read().outdoor())
    }

    fn power_consumption(&self) -> Option<f64> {
        Some(if self.0.read().heating { 1200.0 } else { 5.0 })
    }

    fn device_internal_temperature(&self) -> Option<f64> {
        Some(self.0.read().internal())
    }
}

struct SimSink(Arc<RwLock<Plant>>);

impl TemperatureSink for SimSink {
    fn limits(&self) -> TemperatureLimits {
        TemperatureLimits::new(16.0, 30.0)
    }

    fn send_temperature_command(&self, value: f64) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            self.0.write().setpoint = value;
            Ok(())
        })
    }
}

/// Run the simulate command.
pub fn run(args: SimulateArgs, runner: &CliRunner) -> Result<(), CliError> {
    if args.step_secs == 0 || !(args.hours > 0.0) {
        return Err(CliError::Config("--hours and --step-secs must be positive".to_string()));
    }
    if !(args.building_tau_hours > 0.0) {
        return Err(CliError::Config("--building-tau-hours must be positive".to_string()));
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    runtime.block_on(simulate(args, runner))
}

async fn simulate(args: SimulateArgs, runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("simulate");
    let config = runner.config();

    let device = PhysicalId::new(args.device.as_str());
    let preferences = resolve_preferences(args.preference, config);
    let (storage, storage_description) = resolve_storage(args.storage, args.dir.clone(), config);
    let start = Local::now();
    let step = Duration::from_secs(args.step_secs);

    let persister = RecordPersister::new(device.clone(), storage);
    let (engine, snapshot) = OffsetEngine::load(device.clone(), config.offset_config(), persister).await?;
    let mut manager = ThermalManager::new(device.clone(), config.thermal_config(), preferences, start)?;
    let resumed = snapshot.is_some();
    if let Some(snapshot) = snapshot {
        manager.restore(snapshot, start)?;
    }

    let registry = Arc::new(ThermalRegistry::new());
    registry.register(DeviceGroup::new(
        DisplayId::new(format!("climate.{}", device)),
        manager,
        engine,
    ));

    let plant = Arc::new(RwLock::new(Plant {
        now: start,
        room: args.room,
        outdoor_mean: args.outdoor,
        tau_secs: args.building_tau_hours * 3600.0,
        sensor_bias: args.sensor_bias,
        setpoint: args.target,
        heating: false,
    }));
    let io = DeviceIo {
        sensors: Arc::new(SimSensors(plant.clone())),
        modes: None,
        sink: Arc::new(SimSink(plant.clone())),
    };
    let controller_config = ControllerConfig {
        tick_interval: step,
        ..Default::default()
    };
    let mut controller = Controller::new(registry, &device, io, args.target, controller_config)?;

    println!("SmartClimate Simulation v{}", smartclimate::VERSION);
    println!("=============================");
    println!();
    println!("Device:      {}", device);
    println!("Preference:  {}", preferences.level().description());
    println!("Storage:     {}", storage_description);
    println!("State:       {}", if resumed { "resumed from record" } else { "fresh" });
    println!(
        "Building:    tau {:.1} h, outdoor mean {:.1}°, internal sensor bias {:+.1}°",
        args.building_tau_hours, args.outdoor, args.sensor_bias
    );
    println!("Target:      {:.1}° for {:.1} h in {} s steps", args.target, args.hours, args.step_secs);
    println!();

    let steps = (args.hours * 3600.0 / args.step_secs as f64).ceil() as u64;
    let report_every = (args.report_minutes.max(1) * 60 / args.step_secs).max(1);
    let mut transitions = 0usize;
    let mut probes_completed = 0usize;
    let mut max_error: f64 = 0.0;

    for i in 0..steps {
        let now = plant.read().now;
        let report = controller.tick(now).await;

        if let Some(transition) = report.outcome.transition {
            transitions += 1;
            println!(
                "{}  state {} -> {}",
                now.format("%a %H:%M"),
                transition.from,
                transition.to
            );
        }
        match &report.outcome.probe {
            Some(ProbeEvent::Completed(result)) => {
                probes_completed += 1;
                println!(
                    "{}  probe done: tau {:.0} s ({}), confidence {:.2}, {}",
                    now.format("%a %H:%M"),
                    result.tau_estimate,
                    result.direction,
                    result.confidence,
                    if result.accepted { "accepted" } else { "rejected" }
                );
            }
            Some(ProbeEvent::Aborted(reason)) => {
                println!("{}  probe aborted: {}", now.format("%a %H:%M"), reason);
            }
            Some(ProbeEvent::Unavailable(reason)) => {
                println!("{}  probe unavailable: {}", now.format("%a %H:%M"), reason);
            }
            Some(ProbeEvent::Started) | None => {}
        }

        let state = plant.read().clone();
        if report.outcome.state != ThermalState::Priming {
            max_error = max_error.max((state.room - args.target).abs());
        }
        if i % report_every == 0 {
            println!(
                "{}  room {:5.2}°  outdoor {:5.1}°  setpoint {:5.1}°  {:<11}  {}",
                now.format("%a %H:%M"),
                state.room,
                state.outdoor(),
                report.command,
                report.outcome.state.to_string(),
                report.resolved.reason
            );
        }

        plant.write().step(step);
        if i % 64 == 0 {
            tokio::task::yield_now().await;
        }
    }

    controller.flush().await?;

    let group = controller.group();
    let (tau_cooling, tau_warming, confidence, state) = {
        let manager = group.manager().lock();
        let model = manager.model();
        (
            model.tau_cooling(),
            model.tau_warming(),
            model.confidence_at(plant.read().now.with_timezone(&chrono::Utc)),
            manager.current_state(),
        )
    };
    let (offset_mean, offset_confidence, samples) = {
        let engine = group.offset().lock();
        (engine.model().mean, engine.confidence(), engine.sample_count())
    };

    println!();
    println!("Simulation Summary");
    println!("──────────────────");
    println!("  Final state:        {}", state);
    println!("  Transitions:        {}", transitions);
    println!("  Probes completed:   {}", probes_completed);
    println!(
        "  Model tau:          cooling {:.0} s, warming {:.0} s (building {:.0} s)",
        tau_cooling,
        tau_warming,
        args.building_tau_hours * 3600.0
    );
    println!("  Model confidence:   {:.2}", confidence);
    println!(
        "  Learned offset:     {:+.2}° from {} samples (confidence {:.2})",
        offset_mean, samples, offset_confidence
    );
    println!("  Max room error:     {:.2}° after priming", max_error);
    Ok(())
}
