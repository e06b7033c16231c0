//! End-to-end tests: controller, registry, offset learning and record storage.

use std::sync::Arc;

use chrono::{Duration, Local};
use parking_lot::Mutex;
use smartclimate::controller::{Controller, ControllerConfig, DeviceIo};
use smartclimate::device::{
    BoxFuture, DisplayId, ModeAdjustments, ModeSource, OperatingMode, PhysicalId, SensorSource, SinkError,
    TemperatureLimits, TemperatureSink,
};
use smartclimate::offset::{OffsetConfig, OffsetEngine};
use smartclimate::persistence::{DeviceRecord, FileStorage, MemoryStorage, RecordPersister, Storage};
use smartclimate::registry::{DeviceGroup, ThermalRegistry};
use smartclimate::resolver::DecisionSource;
use smartclimate::thermal::{ThermalConfig, ThermalManager, ThermalState, UserPreferences};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Room {
    room: Mutex<f64>,
    internal: Mutex<f64>,
}

impl Room {
    fn new(room: f64, internal: f64) -> Arc<Self> {
        Arc::new(Self {
            room: Mutex::new(room),
            internal: Mutex::new(internal),
        })
    }
}

impl SensorSource for Room {
    fn room_temperature(&self) -> Option<f64> {
        Some(*self.room.lock())
    }

    fn outdoor_temperature(&self) -> Option<f64> {
        Some(4.0)
    }

    fn power_consumption(&self) -> Option<f64> {
        Some(800.0)
    }

    fn device_internal_temperature(&self) -> Option<f64> {
        Some(*self.internal.lock())
    }
}

struct Away;

impl ModeSource for Away {
    fn adjustments(&self) -> ModeAdjustments {
        ModeAdjustments {
            offset_adjustment: -3.0,
            ..Default::default()
        }
    }

    fn current_mode(&self) -> OperatingMode {
        OperatingMode::Away
    }
}

#[derive(Default)]
struct RecordingSink {
    commands: Mutex<Vec<f64>>,
}

impl TemperatureSink for RecordingSink {
    fn limits(&self) -> TemperatureLimits {
        TemperatureLimits::new(16.0, 30.0)
    }

    fn send_temperature_command(&self, value: f64) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            self.commands.lock().push(value);
            Ok(())
        })
    }
}

/// Load a device from storage, register it and bind a controller.
async fn start_device(
    registry: &Arc<ThermalRegistry>,
    device: &PhysicalId,
    storage: Arc<dyn Storage>,
    room: Arc<Room>,
    modes: Option<Arc<dyn ModeSource>>,
) -> (Controller, Arc<RecordingSink>, bool) {
    let now = Local::now();
    let persister = RecordPersister::new(device.clone(), storage);
    let (engine, snapshot) = OffsetEngine::load(device.clone(), OffsetConfig::default(), persister)
        .await
        .unwrap();

    let mut manager =
        ThermalManager::new(device.clone(), ThermalConfig::default(), UserPreferences::default(), now).unwrap();
    let resumed = snapshot.is_some();
    if let Some(snapshot) = snapshot {
        manager.restore(snapshot, now).unwrap();
    }
    registry.register(DeviceGroup::new(
        DisplayId::new(format!("climate.{}", device)),
        manager,
        engine,
    ));

    let sink = Arc::new(RecordingSink::default());
    let io = DeviceIo {
        sensors: room,
        modes,
        sink: sink.clone(),
    };
    let controller = Controller::new(registry.clone(), device, io, 21.0, ControllerConfig::default()).unwrap();
    (controller, sink, resumed)
}

#[tokio::test]
async fn test_learned_state_survives_restart_on_disk() {
    let temp = TempDir::new().unwrap();
    let device = PhysicalId::new("aa:bb:cc:dd");
    let start = Local::now();

    let sample_count = {
        let registry = Arc::new(ThermalRegistry::new());
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(temp.path()));
        let (mut controller, _sink, resumed) =
            start_device(&registry, &device, storage, Room::new(21.0, 22.5), None).await;
        assert!(!resumed);

        for minute in 0..30 {
            controller.tick(start + Duration::minutes(minute)).await;
        }
        controller.flush().await.unwrap();
        let count = controller.group().offset().lock().sample_count();
        count
    };
    assert_eq!(sample_count, 30);

    let storage = FileStorage::new(temp.path());
    assert!(storage.path_for(&device).exists());
    let bytes = storage.read(&device).await.unwrap().unwrap();
    let record = DeviceRecord::from_bytes(&bytes).unwrap();
    assert_eq!(record.device, device);
    assert_eq!(record.offset_learning_state.samples.len(), 30);
    assert!((record.offset_learning_state.model.mean - 1.5).abs() < 1e-6);

    let registry = Arc::new(ThermalRegistry::new());
    let (mut controller, sink, resumed) =
        start_device(&registry, &device, Arc::new(storage), Room::new(21.0, 22.5), None).await;
    assert!(resumed);
    assert_eq!(controller.group().offset().lock().sample_count(), 30);

    let report = controller.tick(Local::now()).await;
    assert!(report.sent);
    assert!((report.command - 22.5).abs() < 1e-6);
    assert_eq!(sink.commands.lock().as_slice(), &[report.command]);
}

#[tokio::test]
async fn test_manual_override_wins_over_learning_and_modes() {
    let registry = Arc::new(ThermalRegistry::new());
    let device = PhysicalId::new("hall");
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let (mut controller, sink, _) =
        start_device(&registry, &device, storage, Room::new(19.0, 23.0), Some(Arc::new(Away))).await;

    let now = Local::now();
    let report = controller.tick(now).await;
    assert_ne!(report.resolved.source, DecisionSource::ManualOverride);

    controller.set_manual_override(Some(20.0), now);
    let report = controller.tick(now + Duration::minutes(1)).await;
    assert_eq!(report.resolved.source, DecisionSource::ManualOverride);
    assert_eq!(report.resolved.target_temperature, 20.0);
    assert!(!report.resolved.degraded);
    assert_eq!(sink.commands.lock().last().copied(), Some(20.0));

    controller.set_manual_override(None, now);
    let report = controller.tick(now + Duration::minutes(2)).await;
    assert_eq!(report.resolved.source, DecisionSource::Combined);
}

#[tokio::test]
async fn test_devices_in_one_registry_learn_independently() {
    let registry = Arc::new(ThermalRegistry::new());
    let storage = Arc::new(MemoryStorage::new());
    let kitchen = PhysicalId::new("kitchen");
    let bedroom = PhysicalId::new("bedroom");

    let (mut a, _, _) = start_device(&registry, &kitchen, storage.clone(), Room::new(20.0, 22.0), None).await;
    let (mut b, _, _) = start_device(&registry, &bedroom, storage.clone(), Room::new(20.0, 19.0), None).await;
    assert_eq!(registry.len(), 2);

    let now = Local::now();
    for minute in 0..5 {
        a.tick(now + Duration::minutes(minute)).await;
        b.tick(now + Duration::minutes(minute)).await;
    }

    let kitchen_mean = registry.get(&kitchen).unwrap().offset().lock().model().mean;
    let bedroom_mean = registry.get(&bedroom).unwrap().offset().lock().model().mean;
    assert!((kitchen_mean - 2.0).abs() < 1e-6);
    assert!((bedroom_mean + 1.0).abs() < 1e-6);

    a.flush().await.unwrap();
    b.flush().await.unwrap();
    assert!(storage.get(&kitchen).is_some());
    assert!(storage.get(&bedroom).is_some());
}

#[tokio::test]
async fn test_run_loop_stops_and_saves_on_shutdown() {
    let registry = Arc::new(ThermalRegistry::new());
    let device = PhysicalId::new("office");
    let storage = Arc::new(MemoryStorage::new());
    let (controller, sink, _) =
        start_device(&registry, &device, storage.clone(), Room::new(21.0, 21.0), None).await;
    assert_eq!(controller.current_state(), ThermalState::Priming);

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(controller.run(shutdown.clone()));

    // The first interval tick fires immediately
    for _ in 0..100 {
        if !sink.commands.lock().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(sink.commands.lock().first().copied(), Some(21.0));
    assert!(storage.get(&device).is_some());
}
