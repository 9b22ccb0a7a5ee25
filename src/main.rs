use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use tracing::{error, info, warn};

use posecam::app::{build_pipeline, spawn_signal_handlers, KeyboardInputHandler, SessionDriver};
use posecam::{ExportError, PosecamConfig, SessionReport, SourceDescriptor};

#[derive(Parser, Debug)]
#[command(name = "posecam")]
#[command(about = "Record an analyzed camera or video session to a video and a CSV report")]
#[command(version)]
#[command(long_about = "Reads frames from a camera, a video file or a synthetic source, \
optionally mirrors/rotates them, runs per-frame analysis, and on finish writes the \
annotated frames as a video plus one CSV row per frame, both named after the session id.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "posecam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Frame source
    #[arg(
        short,
        long,
        default_value = "camera",
        help = "Source: camera, camera:<index>, stub://<frames>, or a video file path"
    )]
    source: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting a session")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a file
    #[arg(long, value_name = "PATH", help = "Write logs to this file in addition to stderr")]
    log_file: Option<String>,

    /// Disable keyboard controls
    #[arg(long, help = "Do not read keyboard commands from the terminal")]
    no_keyboard: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let log_guard = init_logging(&args)?;

    info!("Starting posecam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = PosecamConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let descriptor: SourceDescriptor = args
        .source
        .parse()
        .with_context(|| format!("Invalid source '{}'", args.source))?;

    let pipeline = build_pipeline(&config).map_err(|e| {
        error!("Failed to build session pipeline: {}", e);
        e
    })?;
    let driver = SessionDriver::new(pipeline, config.session.cadence_fps);

    spawn_signal_handlers(driver.cancellation_token());

    let keyboard = if !args.no_keyboard && std::io::stdin().is_terminal() {
        let handler = KeyboardInputHandler::new(driver.command_sender());
        handler.start().await?;
        Some(handler)
    } else {
        None
    };

    let result = driver.run(descriptor).await;

    if let Some(handler) = keyboard {
        handler.stop().await?;
    }

    let report = result.map_err(|e| {
        error!("Session failed: {}", e);
        e
    })?;

    let exit_code = print_summary(&report);
    info!("posecam exited with code: {}", exit_code);

    // Flush the file writer before exiting
    drop(log_guard);
    std::process::exit(exit_code);
}

/// Print the session outcome and return the process exit code
fn print_summary(report: &SessionReport) -> i32 {
    println!(
        "Session {} ended ({}): {} frames, {} without measurements",
        report.session_id, report.reason, report.frames, report.missing_measurements
    );

    match &report.export {
        Ok(artifacts) => {
            println!("✓ Video:  {}", artifacts.video.display());
            println!("✓ Report: {}", artifacts.report.display());
            if let Some(metadata) = &artifacts.metadata {
                println!("✓ Metadata: {}", metadata.display());
            }
            0
        }
        Err(ExportError::EmptySession) => {
            warn!("No frames were captured; nothing exported");
            println!("No frames were captured; nothing exported");
            0
        }
        Err(e) => {
            eprintln!("✗ Export failed: {}", e);
            if let Some(usable) = e.usable_artifact() {
                eprintln!("  Usable artifact: {}", usable.display());
            }
            1
        }
    }
}

fn init_logging(args: &Args) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("posecam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .with_writer(std::io::stderr)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .with_writer(std::io::stderr)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_file {
        Some(path) => {
            let path = std::path::Path::new(path);
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path '{}'", path.display()))?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# posecam configuration file");
    println!("# Every option is shown with its default value.");
    println!("# Environment overrides: POSECAM_<SECTION>__<KEY>, e.g. POSECAM_EXPORT__VIDEO_FORMAT=mjpeg");
    println!("#");
    println!("# [camera]   index, resolution and per-read timeout of the live device");
    println!("# [session]  cadence_fps (tick rate and video frame rate), max_session_frames (0 = unlimited), timezone");
    println!("# [analyzer] motion analyzer thresholds");
    println!("# [export]   output directory, video_format (\"mp4\" or \"mjpeg\"), overlay and metadata options");
    println!();

    let default_config = toml::to_string_pretty(&PosecamConfig::default())
        .context("Failed to serialize default configuration")?;
    println!("{}", default_config);
    Ok(())
}
