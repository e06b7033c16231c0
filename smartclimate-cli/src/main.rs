//! SmartClimate CLI - Command-line interface
//!
//! Runs simulations against the thermal controller, inspects persisted
//! device records, and manages the configuration file.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::common::{PreferenceArg, StorageArg};
use commands::config::ConfigCommands;
use error::CliError;
use runner::CliRunner;

#[derive(Debug, Parser)]
#[command(name = "smartclimate", version, about = "Adaptive thermal control for heating and cooling devices")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the controller against a simulated room in accelerated time
    Simulate {
        /// Physical identifier of the simulated device
        #[arg(long, default_value = "sim-device")]
        device: String,

        /// Simulated duration in hours
        #[arg(long, default_value_t = 48.0)]
        hours: f64,

        /// Simulated seconds per control tick
        #[arg(long, default_value_t = 60)]
        step_secs: u64,

        /// Initial room temperature
        #[arg(long, default_value_t = 19.0)]
        room: f64,

        /// Mean outdoor temperature
        #[arg(long, default_value_t = 5.0)]
        outdoor: f64,

        /// Requested room temperature
        #[arg(long, default_value_t = 21.0)]
        target: f64,

        /// Building time constant in hours
        #[arg(long, default_value_t = 6.0)]
        building_tau_hours: f64,

        /// How far the device's own sensor reads above the room
        #[arg(long, default_value_t = 1.5, allow_negative_numbers = true)]
        sensor_bias: f64,

        /// Comfort preference (overrides config)
        #[arg(long, value_enum)]
        preference: Option<PreferenceArg>,

        /// Record storage backend (overrides config)
        #[arg(long, value_enum)]
        storage: Option<StorageArg>,

        /// Record directory for file storage (overrides config)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Minutes of simulated time between status lines
        #[arg(long, default_value_t = 60)]
        report_minutes: u64,
    },

    /// Print the persisted record of a device
    Inspect {
        /// Physical identifier of the device
        #[arg(long)]
        device: String,

        /// Record directory (overrides config)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Print the raw JSON record
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration settings
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Config(command) => {
            let path = cli.config.unwrap_or_else(smartclimate::config::config_file_path);
            commands::config::run(command, &path)
        }
        Commands::Inspect { device, dir, json } => {
            let runner = CliRunner::new(cli.config.as_deref(), cli.verbose)?;
            commands::inspect::run(commands::inspect::InspectArgs { device, dir, json }, &runner)
        }
        Commands::Simulate {
            device,
            hours,
            step_secs,
            room,
            outdoor,
            target,
            building_tau_hours,
            sensor_bias,
            preference,
            storage,
            dir,
            report_minutes,
        } => {
            let runner = CliRunner::new(cli.config.as_deref(), cli.verbose)?;
            commands::simulate::run(
                commands::simulate::SimulateArgs {
                    device,
                    hours,
                    step_secs,
                    room,
                    outdoor,
                    target,
                    building_tau_hours,
                    sensor_bias,
                    preference,
                    storage,
                    dir,
                    report_minutes,
                },
                &runner,
            )
        }
    }
}
