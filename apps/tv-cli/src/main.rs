mod error;
mod simulate;

use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tv_controls::compensate;

use crate::error::{CliError, CliResult};
use crate::simulate::SimOptions;

#[derive(Parser)]
#[command(name = "tv-cli")]
#[command(about = "thermovalve CLI - TRV compensation and valve control", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, migrate and validate a config file
    Validate {
        /// Path to the config file (.yaml, .yml or .json)
        config_path: PathBuf,
    },
    /// Compute the compensated TRV setpoint for one set of readings
    Compensate {
        /// Desired room temperature (°C)
        #[arg(long)]
        target: f64,
        /// Room temperature from the reference sensor (°C)
        #[arg(long)]
        reference: f64,
        /// Temperature reported by the TRV itself (°C)
        #[arg(long)]
        trv: f64,
    },
    /// Run one device against a simulated room
    Simulate {
        /// Path to the config file
        config_path: PathBuf,
        /// Device id; may be omitted when the config has a single device
        #[arg(long)]
        device: Option<String>,
        /// Simulated duration in minutes
        #[arg(long, default_value_t = 120.0)]
        minutes: f64,
        /// Simulation step in seconds
        #[arg(long, default_value_t = 30.0)]
        step_s: f64,
        /// Target room temperature (°C)
        #[arg(long, default_value_t = 21.0)]
        target: f64,
        /// Initial room temperature (°C)
        #[arg(long, default_value_t = 16.0)]
        start: f64,
        /// Outside temperature (°C)
        #[arg(long, default_value_t = 5.0)]
        outside: f64,
        /// Print the final diagnostics record as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Validate { config_path } => cmd_validate(&config_path),
        Commands::Compensate {
            target,
            reference,
            trv,
        } => cmd_compensate(target, reference, trv),
        Commands::Simulate {
            config_path,
            device,
            minutes,
            step_s,
            target,
            start,
            outside,
            json,
        } => {
            let options = SimOptions {
                minutes,
                step_s,
                target,
                start,
                outside,
            };
            cmd_simulate(&config_path, device.as_deref(), options, json).await
        }
    }
}

fn cmd_validate(config_path: &Path) -> CliResult<()> {
    println!("Validating config: {}", config_path.display());
    let project = tv_project::load(config_path)?;
    info!(
        path = %config_path.display(),
        version = project.version,
        devices = project.devices.len(),
        "config loaded"
    );
    println!("✓ Config is valid (version {})", project.version);
    println!(
        "  {} device(s), valve interval {} s",
        project.devices.len(),
        project.valve_interval_s
    );
    for device in &project.devices {
        println!(
            "  {} - {} (trv {}, valve {}, p {}, i {})",
            device.id,
            device.name,
            device.trv_entity,
            device.valve_position_entity.as_deref().unwrap_or("-"),
            device.p_gain,
            device.i_gain
        );
    }
    Ok(())
}

fn cmd_compensate(target: f64, reference: f64, trv: f64) -> CliResult<()> {
    for (name, value) in [("target", target), ("reference", reference), ("trv", trv)] {
        if !value.is_finite() {
            return Err(CliError::InvalidArg {
                what: format!("{name} must be finite, got {value}"),
            });
        }
    }
    let c = compensate(target, reference, trv);
    println!("TRV offset:      {:+.2} °C", c.offset);
    println!("Adjusted target: {:.2} °C", c.adjusted_target);
    if c.was_clamped() {
        println!("  (clamped from {:.2} °C)", c.unclamped);
    }
    Ok(())
}

async fn cmd_simulate(
    config_path: &Path,
    device: Option<&str>,
    options: SimOptions,
    json: bool,
) -> CliResult<()> {
    let project = tv_project::load(config_path)?;
    let def = match device {
        Some(id) => project
            .device(id)
            .ok_or_else(|| CliError::UnknownDevice { id: id.to_string() })?,
        None => match project.devices.as_slice() {
            [only] => only,
            _ => {
                return Err(CliError::InvalidArg {
                    what: "config has several devices, pick one with --device".into(),
                });
            }
        },
    };

    info!(
        path = %config_path.display(),
        device = %def.id,
        minutes = options.minutes,
        step_s = options.step_s,
        "starting simulation"
    );
    let diagnostics = simulate::run(def, project.valve_interval_s, options).await?;
    info!(
        device = %def.id,
        integrator = diagnostics.integrator,
        valve_output = ?diagnostics.valve_output,
        "simulation finished"
    );
    if json {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    }
    Ok(())
}
