use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use acproxycam::config::DaemonConfig;
use acproxycam::Daemon;

#[derive(Parser, Debug)]
#[command(name = "acproxycam")]
#[command(about = "Camera and telemetry proxy daemon for Anycubic-family 3D printers")]
#[command(version)]
#[command(
    long_about = "Bridges Anycubic-family 3D printers (stock firmware's camera/MQTT \
surface) to conventional print-host tooling: MJPEG/HLS/WebSocket-H.264 streaming, \
an IPC control surface, and an optional Obico bridge."
)]
struct Args {
    #[arg(short, long, default_value = "/etc/acproxycam/config.json", help = "Path to JSON configuration file")]
    config: String,

    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    #[arg(long, help = "Validate configuration file and exit without starting the daemon")]
    validate_config: bool,

    #[arg(long, help = "Print the resolved configuration in JSON format and exit")]
    print_config: bool,

    #[arg(long, help = "Initialize everything but don't start serving traffic")]
    dry_run: bool,

    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    #[arg(long, value_name = "PATH", help = "Write logs to a rotating file instead of stdout")]
    log_file: Option<String>,

    #[arg(long, help = "Notify systemd (NOTIFY_SOCKET) once the IPC listener is bound")]
    systemd: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("starting acproxycam v{}", env!("CARGO_PKG_VERSION"));
    info!(config = %args.config, "loading configuration");

    let config = match DaemonConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("configuration validation failed: {e}");
                std::process::exit(1);
            }
        }
    }

    let mut daemon = Daemon::new(config, args.config.clone(), args.systemd).await.map_err(|e| {
        error!(error = %e, "failed to construct daemon");
        e
    })?;

    daemon.initialize().await.map_err(|e| {
        error!(error = %e, "failed to initialize daemon");
        e
    })?;

    if args.dry_run {
        println!("dry run complete - daemon initialized but not started");
        return Ok(());
    }

    daemon.start().await.map_err(|e| {
        error!(error = %e, "failed to start daemon");
        e
    })?;

    let exit_code = daemon.run().await.map_err(|e| {
        error!(error = %e, "daemon error during execution");
        e
    })?;

    info!(exit_code, "acproxycam exited");
    std::process::exit(exit_code);
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

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("acproxycam={log_level}")));

    let (writer, guard) = match &args.log_file {
        Some(path) => {
            let dir = std::path::Path::new(path).parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = std::path::Path::new(path).file_name().unwrap_or_else(|| std::ffi::OsStr::new("acproxycam.log"));
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (non_blocking, Some(guard))
        }
        None => {
            let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
            (non_blocking, Some(guard))
        }
    };

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer().json().with_writer(writer).with_target(true).with_thread_ids(true).boxed(),
        Some("compact") => fmt::layer().compact().with_writer(writer).with_target(false).boxed(),
        Some("pretty") | None => fmt::layer().pretty().with_writer(writer).with_target(true).with_thread_ids(args.debug).with_line_number(args.debug).boxed(),
        Some(format) => {
            eprintln!("unknown log format '{format}', using default");
            fmt::layer().with_writer(writer).boxed()
        }
    };

    tracing_subscriber::registry().with(fmt_layer).with(env_filter).init();

    Ok(guard)
}

fn print_default_config() {
    let config = DaemonConfig::default();
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to render default config: {e}"),
    }
}
