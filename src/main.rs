//! CLI Entry Point for sweep_daq
//!
//! Runs swept acquisitions against the simulated instruments and exports the
//! resulting frequency × wavelength matrix.
//!
//! # Usage
//!
//! Run a scan and export it:
//! ```bash
//! sweep_daq scan --start 1550 --stop 1551 --step 0.1 --output data/scan.csv
//! ```
//!
//! Set the source power and APC mode before stepping:
//! ```bash
//! sweep_daq scan --power-dbm 3 --apc --output data/scan.json
//! ```
//!
//! Show the analyzer point count for a span:
//! ```bash
//! sweep_daq points --freq-start 1e9 --freq-stop 2e9 --rbw 1e6
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use sweep_daq::config::{Settings, DEFAULT_CONFIG_PATH};
use sweep_daq::data::export_matrix;
use sweep_daq::hardware::mock::{MockSpectrumAnalyzer, MockTunableLaser};
use sweep_daq::hardware::{recommended_sweep_points, PowerController};
use sweep_daq::logging;
use sweep_daq::scan::{ScanConfig, ScanEvent, ScanOrchestrator};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "sweep_daq")]
#[command(about = "Swept-wavelength spectrum acquisition", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log at debug level (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scan on the simulated source and analyzer
    Scan {
        /// Start wavelength (nm)
        #[arg(long, default_value_t = 1550.0)]
        start: f64,
        /// Stop wavelength (nm)
        #[arg(long, default_value_t = 1551.0)]
        stop: f64,
        /// Wavelength step (nm)
        #[arg(long, default_value_t = 0.1)]
        step: f64,
        /// Dwell per step (ms)
        #[arg(long, default_value_t = 100.0)]
        dwell_ms: f64,
        /// Analyzer start frequency (Hz)
        #[arg(long, default_value_t = 1e9)]
        freq_start: f64,
        /// Analyzer stop frequency (Hz)
        #[arg(long, default_value_t = 2e9)]
        freq_stop: f64,
        /// Resolution bandwidth (Hz)
        #[arg(long, default_value_t = 1e6)]
        rbw: f64,
        /// Manual analyzer point count
        #[arg(long)]
        points: Option<usize>,
        /// Export path; format follows the extension (csv, txt, json, h5)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Source output power (dBm); enables the output
        #[arg(long, allow_hyphen_values = true)]
        power_dbm: Option<f64>,
        /// Run the source in automatic power control mode
        #[arg(long)]
        apc: bool,
    },

    /// Print the recommended analyzer point count
    Points {
        /// Analyzer start frequency (Hz)
        #[arg(long)]
        freq_start: f64,
        /// Analyzer stop frequency (Hz)
        #[arg(long)]
        freq_stop: f64,
        /// Resolution bandwidth (Hz)
        #[arg(long)]
        rbw: f64,
        /// Instrument maximum
        #[arg(long, default_value_t = 40_001)]
        max_points: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_from(&cli.config)?;
    settings.validate()?;
    let level_override = cli.verbose.then_some(tracing::Level::DEBUG);
    logging::init_from_settings(&settings, level_override)?;

    match cli.command {
        Commands::Scan {
            start,
            stop,
            step,
            dwell_ms,
            freq_start,
            freq_stop,
            rbw,
            points,
            output,
            power_dbm,
            apc,
        } => {
            let config = ScanConfig {
                wavelength_start_nm: start,
                wavelength_stop_nm: stop,
                wavelength_step_nm: step,
                dwell_s: dwell_ms / 1000.0,
                frequency_start_hz: freq_start,
                frequency_stop_hz: freq_stop,
                resolution_bandwidth_hz: rbw,
                sweep_points: points,
            };
            let source = SourceSetup { power_dbm, apc };
            run_scan(settings, config, source, output).await
        }
        Commands::Points {
            freq_start,
            freq_stop,
            rbw,
            max_points,
        } => {
            let rec = recommended_sweep_points(freq_start, freq_stop, rbw, max_points);
            println!("{} ({})", rec.points, rec.message);
            Ok(())
        }
    }
}

/// Out-of-band source settings applied before the scan starts.
struct SourceSetup {
    power_dbm: Option<f64>,
    apc: bool,
}

async fn prepare_source(laser: Arc<MockTunableLaser>, setup: &SourceSetup) -> Result<()> {
    let power = PowerController::new(laser);
    power
        .set_apc_enabled(setup.apc)
        .await
        .context("Cannot set APC mode")?;
    if let Some(dbm) = setup.power_dbm {
        power.set_power_if_changed(dbm).await?;
        power.set_output_enabled(true).await?;
        println!("Source at {dbm} dBm{}", if setup.apc { " (APC)" } else { "" });
    }
    Ok(())
}

async fn run_scan(
    settings: Settings,
    config: ScanConfig,
    source: SourceSetup,
    output: Option<PathBuf>,
) -> Result<()> {
    let export_dir = settings.storage.export_dir.clone();
    let laser = Arc::new(MockTunableLaser::new());
    prepare_source(Arc::clone(&laser), &source).await?;

    let orchestrator = ScanOrchestrator::new(settings)
        .with_source(laser)
        .with_analyzer(Arc::new(MockSpectrumAnalyzer::new(1001)));

    let mut events = orchestrator.subscribe();
    let session_id = orchestrator.start(config).await?;
    println!("Scan {session_id} started");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ScanEvent::Progress { percent, wavelength_nm, eta, .. }) => {
                    println!("  {percent:>3}%  {wavelength_nm:.4} nm  eta {}", eta.format("%H:%M:%S"));
                }
                Ok(ScanEvent::Alarm { message, severity }) => println!("  [{severity}] {message}"),
                Ok(ScanEvent::MemoryWarning { estimated_mb, threshold_mb }) => {
                    println!("  dataset ~{estimated_mb:.1} MB exceeds {threshold_mb} MB, streaming to disk");
                }
                Ok(ScanEvent::SessionFailed { reason }) => eprintln!("Scan failed: {reason}"),
                Ok(ScanEvent::SessionComplete { .. }) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "Event listener lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping after the current step...");
                orchestrator.stop().await;
            }
        }
    }

    let report = orchestrator.wait().await?;
    let summary = &report.summary;
    println!(
        "Scan {}: {}/{} steps, {} columns x {} frequency points ({})",
        report.final_state,
        summary.completed_steps,
        summary.total_steps,
        summary.columns,
        summary.frequency_points,
        summary.storage_mode
    );

    let Some(result) = report.result else {
        anyhow::bail!(
            "No dataset produced: {}",
            report.failure.unwrap_or_else(|| "unknown".to_string())
        );
    };

    let path = output.unwrap_or_else(|| export_dir.join(format!("scan_{session_id}.csv")));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    let matrix = result.into_matrix()?;
    export_matrix(&matrix, &path)?;
    println!("Exported to {}", path.display());
    Ok(())
}
