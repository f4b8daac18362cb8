use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use wakecam::streaming::ServerState;
use wakecam::{
    ActivityCoordinator, DeviceHealth, DisplayController, FramePublisher, FrameSource,
    StreamServer, SysfsBacklight, WakecamConfig,
};

#[derive(Parser, Debug)]
#[command(name = "wakecam")]
#[command(about = "Motion-aware camera streaming daemon with automatic display power management")]
#[command(version)]
#[command(long_about = "A camera streaming daemon for single-board computers with an attached \
touchscreen. Samples low-resolution frames to detect motion, powers the display on when something \
moves and off after a period of inactivity, and serves a live MJPEG stream over HTTP while anyone \
is watching.")]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "wakecam.toml",
        help = "Path to TOML configuration file"
    )]
    config: String,

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
    #[arg(long, help = "Validate configuration file and exit without starting")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - initialize but don't start the control loop
    #[arg(long, help = "Initialize components but don't start them")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(
        long,
        value_name = "FORMAT",
        help = "Log output format: json, pretty, or compact"
    )]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        let defaults = toml::to_string_pretty(&WakecamConfig::default())?;
        println!("# Wakecam configuration defaults");
        println!("{}", defaults);
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting wakecam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match WakecamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    config.validate().map_err(|e| {
        error!("Configuration validation failed: {}", e);
        e
    })?;

    // The camera handle is owned by the coordinator for the process
    // lifetime and released when the loop exits.
    let source = FrameSource::open(config.camera.clone()).await?;

    let backlight = SysfsBacklight::new(&config.display.backlight_device);
    let display = DisplayController::new(&config.display, Box::new(backlight));

    let (tracker, registry) = wakecam::viewers::channel();
    let (health, health_rx) = DeviceHealth::new(config.system.device_failure_threshold);
    let (motion_tx, motion_rx) = watch::channel(false);
    let publisher = FramePublisher::new(config.system.publisher_capacity);

    let server = StreamServer::new(
        config.stream.clone(),
        config.auth.clone(),
        ServerState {
            publisher: publisher.clone(),
            viewers: tracker,
            motion_rx,
            health_rx,
            started_at: Utc::now(),
        },
    );

    let coordinator = ActivityCoordinator::new(
        &config, source, display, publisher, registry, health, motion_tx,
    );

    if args.dry_run {
        info!("Dry run - components initialized but not started");
        println!("✓ Dry run completed successfully");
        return Ok(());
    }

    let shutdown = CancellationToken::new();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        });
    }

    let coordinator_task = tokio::spawn(coordinator.run(shutdown.clone()));

    let serve_result = server.serve(shutdown.clone()).await;

    // Whether the server stopped cleanly or failed, wind the loop down so
    // the camera is released before the process exits.
    shutdown.cancel();
    if let Err(e) = coordinator_task.await {
        error!("Coordinator task failed: {}", e);
    }

    serve_result?;
    info!("Wakecam shut down cleanly");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to register SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received interrupt");
    }
}

fn init_logging(args: &Args) -> Result<tracing_appender::non_blocking::WorkerGuard> {
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
        .unwrap_or_else(|_| EnvFilter::new(format!("wakecam={}", log_level)));

    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_target(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_writer(writer).with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}
