//! pulse CLI - command-line interface for pulse-relay
//!
//! Commands:
//! - transform: Turn recorded ticks into representative samples (batch mode)
//! - run: Stream ticks from stdin and emit samples as windows fill
//! - gesture: Replay accelerometer/gyroscope events through the shake detector
//! - doctor: Check configuration, baseline and environment

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pulse_relay::baseline::{store_from_json, BaselineProvider, BaselineStore};
use pulse_relay::gesture::GestureDetector;
use pulse_relay::sensors::{SensorEvent, SensorReading};
use pulse_relay::{
    PulseConfig, PulseError, RawTick, RepresentativeSample, TelemetryPipeline, PRODUCER_NAME,
    PULSE_VERSION,
};

/// pulse - on-wrist stress telemetry pipeline
#[derive(Parser)]
#[command(name = "pulse")]
#[command(version = PULSE_VERSION)]
#[command(about = "Score sensor ticks into stress telemetry samples", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn recorded ticks into representative samples (batch mode)
    Transform {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        #[command(flatten)]
        setup: PipelineArgs,
    },

    /// Stream ticks (NDJSON) from stdin and emit samples as windows fill
    Run {
        #[command(flatten)]
        setup: PipelineArgs,

        /// Buffer output instead of flushing after each sample
        #[arg(long)]
        no_flush: bool,
    },

    /// Replay sensor events (NDJSON) through the wrist-shake detector
    Gesture {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Config file (only the gesture section is used)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the acceleration threshold (m/s²)
        #[arg(long)]
        accel_threshold: Option<f64>,

        /// Count alternations without waiting for a gyroscope spike
        #[arg(long)]
        no_gyro_assist: bool,
    },

    /// Check configuration, baseline and environment
    Doctor {
        /// Baseline file to check
        #[arg(long)]
        baseline: Option<PathBuf>,

        /// Config file to check
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct PipelineArgs {
    /// Baseline file (single record or store dump)
    #[arg(long)]
    baseline: Option<PathBuf>,

    /// Use population defaults when no baseline file is given
    #[arg(long)]
    bootstrap_baseline: bool,

    /// Config file (JSON, partial allowed)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override ticks per window; the anomaly count scales to 60% of it
    #[arg(long)]
    window_size: Option<usize>,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one tick per line)
    Ndjson,
    /// JSON array of ticks
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one sample per line)
    Ndjson,
    /// JSON array of samples
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable
fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<(), PulseCliError> {
    match cli.command {
        Commands::Transform {
            input,
            output,
            input_format,
            output_format,
            setup,
        } => cmd_transform(&input, &output, input_format, output_format, &setup),
        Commands::Run { setup, no_flush } => cmd_run(&setup, !no_flush),
        Commands::Gesture {
            input,
            config,
            accel_threshold,
            no_gyro_assist,
        } => cmd_gesture(&input, config.as_deref(), accel_threshold, no_gyro_assist),
        Commands::Doctor {
            baseline,
            config,
            json,
        } => cmd_doctor(baseline.as_deref(), config.as_deref(), json),
    }
}

fn read_input(input: &Path) -> Result<String, PulseCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn load_config(
    path: Option<&Path>,
    window_size: Option<usize>,
) -> Result<PulseConfig, PulseCliError> {
    let mut config = match path {
        Some(path) => PulseConfig::from_file(path)?,
        None => PulseConfig::default(),
    };
    if let Some(size) = window_size {
        config.window.size = size;
        config.window.anomaly_count = ((size * 6).div_ceil(10)).max(1);
        config.validate()?;
    }
    Ok(config)
}

fn load_baseline(setup: &PipelineArgs) -> Result<Arc<dyn BaselineProvider>, PulseCliError> {
    let store = match &setup.baseline {
        Some(path) => store_from_json(&fs::read_to_string(path)?)?,
        None if setup.bootstrap_baseline => BaselineStore::with_bootstrap(),
        None => BaselineStore::new(),
    };
    if store.active().is_none() {
        info!("no active baseline, physiological sub-scores will be zero");
    }
    Ok(Arc::new(store))
}

fn build_pipeline(setup: &PipelineArgs) -> Result<TelemetryPipeline, PulseCliError> {
    let config = load_config(setup.config.as_deref(), setup.window_size)?;
    let baseline = load_baseline(setup)?;
    Ok(TelemetryPipeline::from_config(&config, baseline))
}

fn parse_ticks(data: &str, format: &InputFormat) -> Result<Vec<RawTick>, PulseCliError> {
    match format {
        InputFormat::Json => Ok(serde_json::from_str(data)?),
        InputFormat::Ndjson => data
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line.trim()).map_err(|e| {
                    PulseCliError::ParseError(format!("line {}: {}", n + 1, e))
                })
            })
            .collect(),
    }
}

fn cmd_transform(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    setup: &PipelineArgs,
) -> Result<(), PulseCliError> {
    let ticks = parse_ticks(&read_input(input)?, &input_format)?;
    if ticks.is_empty() {
        return Err(PulseCliError::NoTicks);
    }

    let pipeline = build_pipeline(setup)?;
    let tick_count = ticks.len();
    let samples: Vec<RepresentativeSample> = ticks
        .into_iter()
        .filter_map(|tick| pipeline.process_tick(tick))
        .collect();
    let leftover = pipeline.discard_partial();
    info!(ticks = tick_count, samples = samples.len(), leftover, "transform complete");

    let output_data = format_output(&samples, &output_format)?;
    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }
    Ok(())
}

fn cmd_run(setup: &PipelineArgs, flush: bool) -> Result<(), PulseCliError> {
    let pipeline = build_pipeline(setup)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let tick: RawTick = serde_json::from_str(trimmed)
            .map_err(|e| PulseCliError::ParseError(format!("Failed to parse tick: {}", e)))?;

        if let Some(sample) = pipeline.process_tick(tick) {
            writeln!(stdout, "{}", serde_json::to_string(&sample)?)?;
            if flush {
                stdout.flush()?;
            }
        }
    }

    let leftover = pipeline.discard_partial();
    debug!(leftover, "input closed");
    stdout.flush()?;
    Ok(())
}

fn cmd_gesture(
    input: &Path,
    config: Option<&Path>,
    accel_threshold: Option<f64>,
    no_gyro_assist: bool,
) -> Result<(), PulseCliError> {
    let mut config = load_config(config, None)?;
    if let Some(threshold) = accel_threshold {
        config.gesture.accel_threshold = threshold;
    }
    if no_gyro_assist {
        config.gesture.use_gyro_assist = false;
    }
    config.validate()?;

    let mut detector = GestureDetector::new(config.gesture);
    let mut stdout = io::stdout();
    let mut triggers = 0usize;

    for (n, line) in read_input(input)?.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event: SensorEvent = serde_json::from_str(trimmed)
            .map_err(|e| PulseCliError::ParseError(format!("line {}: {}", n + 1, e)))?;

        match event.reading {
            SensorReading::Accelerometer { x, y, z } => {
                if detector.on_accelerometer(event.timestamp_ms, x, y, z) {
                    triggers += 1;
                    let line = serde_json::json!({
                        "trigger": triggers,
                        "timestamp_ms": event.timestamp_ms,
                    });
                    writeln!(stdout, "{}", line)?;
                }
            }
            SensorReading::Gyroscope { x, y, z } => {
                detector.on_gyroscope(event.timestamp_ms, x, y, z);
            }
            _ => {}
        }
    }

    info!(triggers, "gesture replay complete");
    stdout.flush()?;
    Ok(())
}

fn cmd_doctor(
    baseline: Option<&Path>,
    config: Option<&Path>,
    json: bool,
) -> Result<(), PulseCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck::ok(
        "version",
        format!("{} version {}", PRODUCER_NAME, PULSE_VERSION),
    ));

    if let Some(path) = config {
        checks.push(match PulseConfig::from_file(path) {
            Ok(config) => DoctorCheck::ok(
                "config",
                format!(
                    "Config valid (window {} ticks, anomaly at {} ticks >= level {})",
                    config.window.size, config.window.anomaly_count, config.window.anomaly_level
                ),
            ),
            Err(e) => DoctorCheck::error("config", e.to_string()),
        });
    }

    if let Some(path) = baseline {
        let check = if !path.exists() {
            DoctorCheck::warning("baseline", "Baseline file does not exist".to_string())
        } else {
            match fs::read_to_string(path) {
                Ok(content) => match store_from_json(&content) {
                    Ok(store) => match store.active() {
                        Some(active) => DoctorCheck::ok(
                            "baseline",
                            format!(
                                "Active baseline v{} ({} measurements)",
                                active.version, active.measurement_count
                            ),
                        ),
                        None => DoctorCheck::warning(
                            "baseline",
                            "Baseline file has no active record".to_string(),
                        ),
                    },
                    Err(e) => DoctorCheck::error("baseline", e.to_string()),
                },
                Err(e) => {
                    DoctorCheck::error("baseline", format!("Cannot read baseline file: {}", e))
                }
            }
        };
        checks.push(check);
    }

    checks.push(if atty::is(atty::Stream::Stdin) {
        DoctorCheck::ok("stdin", "stdin is a TTY (interactive mode)".to_string())
    } else {
        DoctorCheck::ok("stdin", "stdin is a pipe (streaming mode ready)".to_string())
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: PULSE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Pulse Doctor Report");
        println!("===================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");
        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    if report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error))
    {
        Err(PulseCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn format_output(
    samples: &[RepresentativeSample],
    format: &OutputFormat,
) -> Result<String, PulseCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut out = String::new();
            for sample in samples {
                out.push_str(&serde_json::to_string(sample)?);
                out.push('\n');
            }
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string(samples)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(samples)?),
    }
}

// Error handling

#[derive(Debug)]
enum PulseCliError {
    Io(io::Error),
    Pulse(PulseError),
    Json(serde_json::Error),
    ParseError(String),
    NoTicks,
    DoctorFailed,
}

impl From<io::Error> for PulseCliError {
    fn from(e: io::Error) -> Self {
        PulseCliError::Io(e)
    }
}

impl From<PulseError> for PulseCliError {
    fn from(e: PulseError) -> Self {
        PulseCliError::Pulse(e)
    }
}

impl From<serde_json::Error> for PulseCliError {
    fn from(e: serde_json::Error) -> Self {
        PulseCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PulseCliError> for CliError {
    fn from(e: PulseCliError) -> Self {
        let (code, message, hint) = match e {
            PulseCliError::Io(e) => (
                "IO_ERROR",
                e.to_string(),
                Some("Check file paths and permissions"),
            ),
            PulseCliError::Pulse(e @ PulseError::InvalidConfig(_)) => (
                "CONFIG_ERROR",
                e.to_string(),
                Some("Run `pulse doctor --config <file>` to check the config"),
            ),
            PulseCliError::Pulse(e @ PulseError::BaselineParse(_)) => (
                "BASELINE_ERROR",
                e.to_string(),
                Some("Baseline must be a single record or a store dump"),
            ),
            PulseCliError::Pulse(e) => ("PIPELINE_ERROR", e.to_string(), None),
            PulseCliError::Json(e) => ("JSON_ERROR", e.to_string(), Some("Check JSON syntax")),
            PulseCliError::ParseError(msg) => (
                "PARSE_ERROR",
                msg,
                Some("Each line must be one JSON object"),
            ),
            PulseCliError::NoTicks => ("NO_TICKS", "No ticks found in input".to_string(), None),
            PulseCliError::DoctorFailed => (
                "DOCTOR_FAILED",
                "One or more checks failed".to_string(),
                None,
            ),
        };
        CliError {
            code: code.to_string(),
            message,
            hint: hint.map(str::to_string),
        }
    }
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

impl DoctorCheck {
    fn ok(name: &str, message: String) -> Self {
        Self::with_status(name, CheckStatus::Ok, message)
    }

    fn warning(name: &str, message: String) -> Self {
        Self::with_status(name, CheckStatus::Warning, message)
    }

    fn error(name: &str, message: String) -> Self {
        Self::with_status(name, CheckStatus::Error, message)
    }

    fn with_status(name: &str, status: CheckStatus, message: String) -> Self {
        Self {
            name: name.to_string(),
            status,
            message,
        }
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
