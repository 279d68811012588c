use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use moodcam::{
    CameraSession, MediaGateway, MoodcamConfig, SessionCallbacks, SimulatedGateway,
};

#[derive(Parser, Debug)]
#[command(name = "moodcam")]
#[command(about = "Camera acquisition and frame capture engine diagnostics")]
#[command(version)]
#[command(long_about = "Runs the moodcam acquisition pipeline against the built-in \
simulated media gateway: strategy-chain acquisition, stream lifecycle, readiness \
detection and a test frame capture. Useful for validating configuration and \
exercising the engine without camera hardware.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "moodcam.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without running")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Seconds to wait for the sink to become renderable
    #[arg(long, default_value_t = 10, help = "Readiness wait budget in seconds")]
    wait: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting moodcam diagnostics v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match MoodcamConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let gateway = Arc::new(SimulatedGateway::new()) as Arc<dyn MediaGateway>;
    let callbacks = SessionCallbacks::new()
        .on_error(|message| eprintln!("✗ {}", message))
        .on_stream_ready(|stream| {
            info!(
                "Stream {} ready ({} track(s))",
                stream.id(),
                stream.tracks().len()
            );
        });

    let session = CameraSession::new(config, gateway, callbacks);
    session.start_camera().await?;

    // Wait for the readiness detector to confirm frames
    let budget = Duration::from_secs(args.wait);
    let became_ready = tokio::time::timeout(budget, async {
        while !session.is_ready() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .is_ok();

    if !became_ready {
        eprintln!("✗ Sink did not become renderable within {:?}", budget);
        session.shutdown();
        std::process::exit(1);
    }

    println!("✓ Readiness confirmed (state: {:?})", session.state());

    match session.capture_image() {
        Some(frame) => {
            println!(
                "✓ Test capture: {}x{}, {} base64 chars",
                frame.width(),
                frame.height(),
                frame.encoded_len()
            );
        }
        None => {
            eprintln!("✗ Test capture failed");
            session.shutdown();
            std::process::exit(1);
        }
    }

    session.shutdown();
    info!("Diagnostics complete");
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
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
        .unwrap_or_else(|_| EnvFilter::new(format!("moodcam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# Moodcam Configuration File");
    println!("# This is the default configuration with all available options");
    println!();

    let default_config = r#"[acquisition]
# Ideal resolution hint for the first acquisition strategy
ideal_resolution = [1280, 720]
# Preferred camera facing direction: "user" or "environment"
facing_mode = "user"
# Start acquisition as soon as the session is created
auto_start = true
# Delay between failed acquisition strategies in milliseconds
inter_attempt_delay_ms = 300
# Delay after releasing a stale stream before reacquiring, in milliseconds
settle_delay_ms = 100
# Streams younger than this window are protected from guarded stop calls
protect_window_ms = 2000

[readiness]
# Frames with width or height at or below this are rejected as degenerate
min_dimension = 2
# Re-check delays applied when dimensions are still invalid
recheck_schedule_ms = [500, 1000, 2000, 3000]
# Final deadline before declaring a render timeout
render_timeout_ms = 5000
# Resolution assumed when no dimension source is available
fallback_resolution = [640, 480]

[capture]
# JPEG quality (1-100) for captured frames
jpeg_quality = 92
"#;

    println!("{}", default_config);
}
