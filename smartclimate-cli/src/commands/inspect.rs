//! Inspect command - print a persisted device record.

use std::path::PathBuf;

use smartclimate::device::PhysicalId;
use smartclimate::persistence::{DeviceRecord, FileStorage, Storage};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the inspect command.
pub struct InspectArgs {
    pub device: String,
    pub dir: Option<PathBuf>,
    pub json: bool,
}

/// Run the inspect command.
pub fn run(args: InspectArgs, runner: &CliRunner) -> Result<(), CliError> {
    let dir = args
        .dir
        .unwrap_or_else(|| runner.config().storage.resolved_directory());
    let storage = FileStorage::new(&dir);
    let device = PhysicalId::new(args.device.as_str());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(CliError::Runtime)?;
    let bytes = runtime
        .block_on(storage.read(&device))?
        .ok_or_else(|| CliError::RecordNotFound {
            device: args.device.clone(),
            dir: dir.clone(),
        })?;

    if args.json {
        println!("{}", String::from_utf8_lossy(&bytes));
        return Ok(());
    }

    let record = DeviceRecord::from_bytes(&bytes)?;
    print_record(&record, &storage.path_for(&device));
    Ok(())
}

fn print_record(record: &DeviceRecord, path: &std::path::Path) {
    let thermal = &record.thermal;
    let offset = &record.offset_learning_state;

    println!("Device {}", record.device);
    println!("================");
    println!("File:            {}", path.display());
    println!("Format version:  {}", record.version);
    println!("Saved at:        {}", record.saved_at);
    println!();

    println!("Thermal model");
    println!("─────────────");
    println!("  tau cooling:     {:.0} s ({:.2} h)", thermal.tau_cooling, thermal.tau_cooling / 3600.0);
    println!("  tau warming:     {:.0} s ({:.2} h)", thermal.tau_warming, thermal.tau_warming / 3600.0);
    println!("  confidence:      {:.2}", thermal.model_confidence);
    match thermal.last_calibrated {
        Some(at) => println!("  last calibrated: {}", at),
        None => println!("  last calibrated: never"),
    }
    println!("  primed:          {}", if thermal.primed { "yes" } else { "no" });
    println!();

    if !thermal.probe_history.is_empty() {
        println!("Probe history");
        println!("─────────────");
        for probe in &thermal.probe_history {
            println!(
                "  {}  {:?}  tau {:.0} s  confidence {:.2}  samples {}  {}",
                probe.timestamp.format("%Y-%m-%d %H:%M"),
                probe.direction,
                probe.tau_estimate,
                probe.confidence,
                probe.sample_count,
                if probe.accepted { "accepted" } else { "rejected" }
            );
        }
        println!();
    }

    println!("Offset learning");
    println!("───────────────");
    println!("  samples:         {}", offset.samples.len());
    println!("  smoothed offset: {:+.2}°", offset.model.mean);
    println!("  std deviation:   {:.2}°", offset.model.std_dev());
    println!("  confidence:      {:.2}", record.confidence);
    println!("  learning:        {}", if offset.learning_enabled { "enabled" } else { "disabled" });
    if let Some(regression) = offset.model.outdoor {
        println!(
            "  outdoor slope:   {:+.3}°/° around {:.1}° ({} samples)",
            regression.slope, regression.mean_outdoor, regression.samples
        );
    }
}
