use chrono::Utc;
use clap::Parser;
use env_logger::Env;
use log::{error, info, LevelFilter};
use rusty_osa::{
    load_config_or_default, AcquisitionSession, AppConfig, CsvTraceWriter, Logger,
    OsaClient, ScriptedResponse, ScriptedTransport, SessionReport, SpectrumAnalyzer,
    TerminalPlotter,
};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

/// Repeated sweep acquisition from an optical spectrum analyzer
#[derive(Parser, Debug)]
#[command(name = "osa-acquire")]
#[command(about = "Acquire consistent OSA traces and save them as CSV", long_about = None)]
struct Args {
    /// Path to configuration file (defaults to osa.toml or config.toml if present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Number of consistent traces to collect
    #[arg(short = 'n', long, value_name = "N")]
    iterations: Option<usize>,

    /// Folder for trace CSV files
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Draw every accepted trace in the terminal
    #[arg(long)]
    plot: bool,

    /// Use a scripted in-memory instrument instead of the network
    #[arg(long)]
    simulate: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut config = load_config_or_default(args.config.as_deref());
    apply_overrides(&mut config, &args);

    let log_level = args
        .log_level
        .clone()
        .unwrap_or(config.console.verbosity.clone());
    initialize_logging(&log_level)?;
    log_startup_info(&config, args.config.as_deref(), args.simulate);

    config.validate()?;

    let analyzer = setup_analyzer(&config, args.simulate)?;
    let mut session = build_session(analyzer, &config)?;

    let shutdown_flag = setup_shutdown_handler()?;
    session.set_shutdown_flag(shutdown_flag.clone());

    run_and_report(session, shutdown_flag)
}

// Helper Functions

fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(iterations) = args.iterations {
        config.acquisition.required_iterations = iterations;
    }
    if let Some(ref output) = args.output {
        config.output.folder = output.display().to_string();
    }
    if args.plot {
        config.output.plot = true;
    }
}

/// Log startup information
fn log_startup_info(config: &AppConfig, config_path: Option<&Path>, simulate: bool) {
    info!("=== Rusty OSA Acquisition ===");
    match config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: defaults and environment"),
    }
    if simulate {
        info!("Instrument: simulated");
    } else {
        info!(
            "Instrument: {}:{}",
            config.instrument.host, config.instrument.port
        );
    }
    info!(
        "Sweep: {:.2} to {:.2} nm, {:?}, {:?}",
        config.sweep.start_nm, config.sweep.stop_nm, config.sweep.sensitivity, config.sweep.mode
    );
    info!(
        "Required iterations: {}",
        config.acquisition.required_iterations
    );
    info!(
        "Max consecutive failures: {}",
        config
            .acquisition
            .max_consecutive_failures
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unlimited".to_string())
    );
    info!("Output folder: {}", config.output.folder);
}

/// Single peak on a noise floor, shaped like a laser line
fn synthetic_trace(config: &AppConfig) -> Vec<f64> {
    let points = 501;
    let (start, stop) = (config.sweep.start_nm, config.sweep.stop_nm);
    let center = (start + stop) / 2.0;
    let width = (stop - start) / 20.0;

    (0..points)
        .map(|i| {
            let wavelength = start + (stop - start) * i as f64 / (points - 1) as f64;
            let offset = (wavelength - center) / width;
            -70.0 + 60.0 * (-0.5 * offset * offset).exp()
        })
        .collect()
}

fn setup_analyzer(
    config: &AppConfig,
    simulate: bool,
) -> Result<Box<dyn SpectrumAnalyzer>, Box<dyn std::error::Error>> {
    if simulate {
        let transport =
            ScriptedTransport::repeating(ScriptedResponse::trace(&synthetic_trace(config)));
        let client = config
            .client_builder()
            .settle_delay(Duration::ZERO)
            .build_with_transport(transport)?;
        return Ok(Box::new(client));
    }

    let client: OsaClient = config.client_builder().build()?;
    info!("Instrument endpoint: {}", client.endpoint().label());
    Ok(Box::new(client))
}

fn build_session(
    analyzer: Box<dyn SpectrumAnalyzer>,
    config: &AppConfig,
) -> Result<AcquisitionSession<Box<dyn SpectrumAnalyzer>>, Box<dyn std::error::Error>> {
    let writer =
        CsvTraceWriter::new(config.output_folder())?.with_suffix(config.output.file_suffix.clone());

    let mut session =
        AcquisitionSession::new(analyzer, config.sweep_request(), config.session_config())
            .with_sink(writer);

    if config.output.plot {
        session = session.with_sink(TerminalPlotter::new());
    }
    if config.output.acquisition_log {
        let path = create_log_file_path(&config.output_folder());
        info!("Acquisition log: {}", path.display());
        session = session.with_history(Logger::new(path, 10, true));
    }

    Ok(session)
}

/// Setup Ctrl+C handler for graceful shutdown
fn setup_shutdown_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();

    ctrlc::set_handler(move || {
        info!("Ctrl+C received - stopping after the current sweep...");
        shutdown_flag_clone.store(true, Ordering::SeqCst);
    })?;

    Ok(shutdown_flag)
}

fn log_report(report: &SessionReport) {
    info!(
        "Accepted {}/{} traces ({} samples each)",
        report.accepted,
        report.required_iterations,
        report
            .target_sample_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    info!(
        "Attempts: {}, discarded: {}, connection failures: {}",
        report.attempts, report.discarded, report.connection_failures
    );
    info!(
        "Total execution time: {:.2} seconds",
        report.elapsed.as_secs_f64()
    );
}

/// Run the acquisition and report results
fn run_and_report(
    session: AcquisitionSession<Box<dyn SpectrumAnalyzer>>,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting acquisition...");

    match session.run() {
        Ok(report) => {
            if report.stopped_by_user || shutdown_flag.load(Ordering::SeqCst) {
                info!("✓ Acquisition stopped by user");
            } else {
                info!("✓ Acquisition completed successfully!");
            }
            log_report(&report);
            Ok(())
        }
        Err(e) => {
            error!("✗ Acquisition failed: {}", e);
            Err(e.into())
        }
    }
}

/// Initialize logging with configurable level
fn initialize_logging(log_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => {
            eprintln!("Warning: Invalid log level '{}', using 'info'", log_level);
            LevelFilter::Info
        }
    };

    env_logger::Builder::from_env(Env::default())
        .filter_level(level)
        .format_timestamp_millis()
        .init();

    Ok(())
}

fn create_log_file_path(folder: &Path) -> PathBuf {
    folder.join(format!(
        "acquisition_{}.json",
        Utc::now().format("%Y%m%d_%H%M%S")
    ))
}
