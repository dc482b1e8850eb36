//! CLI entry point: spatial field maps and fixed-position time series.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use fieldmapper::config::Settings;
use fieldmapper::geometry::{Coordinate, ScanRegion, Shape};
use fieldmapper::instrument::printer::GcodePrinter;
use fieldmapper::instrument::teslameter::Teslameter;
use fieldmapper::instrument::Positioner;
use fieldmapper::scan::{calibrate, monitor, ScanOutcome, ScanRunner};
use log::info;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "fieldmapper",
    about = "Map the field of a magnet with a 3D printer and a teslameter probe."
)]
struct Cli {
    /// Optional TOML settings file layered over the built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Acquire a spatial field map over a volume shape.
    Map(MapArgs),
    /// Record the field over time at the current position.
    Monitor(MonitorArgs),
}

#[derive(Args)]
struct MapArgs {
    /// Serial port of the 3D printer (e.g. /dev/ttyUSB0, COM5).
    printer_port: String,

    /// Serial port of the teslameter probe (e.g. /dev/ttyUSB1, COM1).
    probe_port: String,

    /// Shape of the sampling volume.
    #[arg(value_enum)]
    shape: Shape,

    /// Diameter (or cube edge length) of the measurement volume in mm.
    #[arg(short, long, default_value_t = 100.0)]
    diameter: f64,

    /// Cylinder height in mm (defaults to the diameter).
    #[arg(long)]
    height: Option<f64>,

    /// Measurement point spacing in mm.
    #[arg(short = 'p', long, default_value_t = 5.0)]
    spacing: f64,

    /// Center of the measurement volume (logical frame, mm).
    #[arg(short, long, num_args = 3, value_names = ["X", "Y", "Z"])]
    center: Option<Vec<f64>>,

    /// Jog the stage interactively to locate the center before scanning.
    #[arg(short = 'x', long)]
    calibrate: bool,

    /// Use the stage's current position as the center.
    #[arg(long)]
    here: bool,

    /// Run the homing cycle before scanning.
    #[arg(long)]
    home: bool,

    /// Output CSV path.
    #[arg(short, long)]
    out: PathBuf,

    /// Sequence index to restart a halted scan at.
    #[arg(short, long, default_value_t = 0)]
    restart: usize,

    /// Re-measure the center every N points to track drift (0 disables).
    #[arg(short = 'm', long)]
    remeasure_interval: Option<usize>,
}

#[derive(Args)]
struct MonitorArgs {
    /// Serial port of the 3D printer (e.g. /dev/ttyUSB0, COM5).
    printer_port: String,

    /// Serial port of the teslameter probe (e.g. /dev/ttyUSB1, COM1).
    probe_port: String,

    /// Total duration in seconds (default 12 hours).
    #[arg(long)]
    duration: Option<f64>,

    /// Sample interval in seconds (default 1).
    #[arg(long)]
    interval: Option<f64>,

    /// Run the homing cycle first.
    #[arg(long)]
    home: bool,

    /// Output CSV path.
    #[arg(short, long)]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let settings = Settings::new(cli.config.as_deref()).context("failed to load settings")?;

    match cli.command {
        Command::Map(args) => run_map(args, settings).await,
        Command::Monitor(args) => run_monitor(args, settings).await,
    }
}

async fn run_map(args: MapArgs, settings: Settings) -> anyhow::Result<()> {
    // Bad geometry is rejected before any device is touched.
    ScanRegion::validate_dimensions(args.diameter, args.height, args.spacing)?;

    let mut scan_settings = settings.scan.clone();
    if let Some(interval) = args.remeasure_interval {
        scan_settings.remeasure_interval = interval;
    }

    let mut printer = GcodePrinter::connect(&args.printer_port, &settings.positioner)
        .await
        .context("failed to connect to the motion stage")?;
    let probe = Teslameter::connect(&args.probe_port, &settings.probe)
        .await
        .context("failed to connect to the teslameter")?;

    if args.home {
        printer.home().await.context("homing failed")?;
    }

    let center = if args.calibrate {
        calibrate::interactive_center(&mut printer).await?
    } else if args.here {
        printer.position().await?
    } else {
        match args.center.as_deref() {
            Some([x, y, z]) => Coordinate::new(*x, *y, *z),
            _ => Coordinate::new(110.0, 110.0, 250.0),
        }
    };

    let region = ScanRegion::new(args.shape, center, args.diameter, args.height, args.spacing)?;
    if args.restart > 0 {
        info!("Restarting at point {}", args.restart);
    }

    let mut runner = ScanRunner::new(printer, probe, scan_settings);
    match runner.run(&region, args.restart, &args.out).await? {
        ScanOutcome::Completed { points } => {
            let _ = runner.positioner_mut().beep().await;
            info!("Mapped {} points into '{}'", points, args.out.display());
            Ok(())
        }
        ScanOutcome::Halted { index, error } => {
            anyhow::bail!(
                "scan halted at point {index}: {error}\n\
                 samples before that point are safe; rerun with --restart {index} to resume"
            )
        }
    }
}

async fn run_monitor(args: MonitorArgs, settings: Settings) -> anyhow::Result<()> {
    let mut monitor_settings = settings.monitor.clone();
    if let Some(secs) = args.duration {
        monitor_settings.duration = Duration::from_secs_f64(secs);
    }
    if let Some(secs) = args.interval {
        monitor_settings.interval = Duration::from_secs_f64(secs);
    }

    let mut printer = GcodePrinter::connect(&args.printer_port, &settings.positioner)
        .await
        .context("failed to connect to the motion stage")?;
    let mut probe = Teslameter::connect(&args.probe_port, &settings.probe)
        .await
        .context("failed to connect to the teslameter")?;

    if args.home {
        printer.home().await.context("homing failed")?;
    }

    let rows = monitor::run(&mut probe, &monitor_settings, &args.out).await?;
    let _ = printer.beep().await;
    info!("Recorded {} samples into '{}'", rows, args.out.display());
    Ok(())
}
