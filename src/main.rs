//! stemcast - main entry point
//!
//! Streams one audio file to two output devices simultaneously, split by
//! channel or by stem selection, with a configurable sync offset between
//! them. Maps engine errors to stable process exit codes:
//! 1 validation, 2 connection, 3 separation, 4 mid-stream failure.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stemcast::audio::CommandSeparator;
use stemcast::device::{CpalConnector, DeviceConnector};
use stemcast::engine::{MixMode, SessionRequest, StreamOrchestrator};
use stemcast::{EngineConfig, Error};

/// Command-line arguments for stemcast
#[derive(Parser, Debug)]
#[command(name = "stemcast")]
#[command(about = "Stream one track to two speakers, split by channel or by stems")]
#[command(version)]
struct Args {
    /// Path to the audio source file
    #[arg(required_unless_present = "list_devices")]
    source: Option<PathBuf>,

    /// Route stem combinations instead of splitting channels
    #[arg(long)]
    use_stems: bool,

    /// Comma-separated stems for the left speaker (vocals,drums,bass,other)
    #[arg(long, value_name = "STEMS", requires = "use_stems")]
    left_stems: Option<String>,

    /// Comma-separated stems for the right speaker
    #[arg(long, value_name = "STEMS", requires = "use_stems")]
    right_stems: Option<String>,

    /// Sync offset in milliseconds. Positive delays the left speaker,
    /// negative delays the right
    #[arg(long, value_name = "MILLISECONDS", default_value_t = 0, allow_negative_numbers = true)]
    sync_offset: i64,

    /// Output device for the left bus
    #[arg(long, value_name = "NAME", env = "STEMCAST_LEFT_DEVICE")]
    left_device: Option<String>,

    /// Output device for the right bus
    #[arg(long, value_name = "NAME", env = "STEMCAST_RIGHT_DEVICE")]
    right_device: Option<String>,

    /// List available output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Optional TOML file with transport tuning overrides
    #[arg(long, value_name = "PATH", env = "STEMCAST_CONFIG")]
    config: Option<PathBuf>,

    /// External stem-separation command (invoked as: CMD SOURCE -o OUTDIR)
    #[arg(long, value_name = "CMD", default_value = "spleeter", env = "STEMCAST_SEPARATOR")]
    separator_cmd: String,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stemcast=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // clap's own exit code for bad arguments is 2, which collides with our
    // connection-failure code; fold argument errors into exit code 1.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("stemcast: cannot start runtime: {}", e);
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("stemcast: {} failure: {}", e.stage(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let connector = Arc::new(CpalConnector::new());

    if args.list_devices {
        let devices = connector.list_devices().await?;
        if devices.is_empty() {
            println!("No output devices found");
        } else {
            println!("Output devices:");
            for device in devices {
                println!("  {}", device.id);
            }
        }
        return Ok(());
    }

    let request = build_request(&args)?;

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let mut orchestrator = StreamOrchestrator::new(config, connector);
    if args.use_stems {
        orchestrator =
            orchestrator.with_separator(Arc::new(CommandSeparator::new(&args.separator_cmd)));
    }

    let shutdown = spawn_interrupt_handler();

    let session = orchestrator.run(request, shutdown).await?;
    info!("Session {} finished with status {}", session.id, session.status);
    Ok(())
}

/// Validate argument combinations into a session request.
fn build_request(args: &Args) -> Result<SessionRequest, Error> {
    let source_path = args
        .source
        .clone()
        .ok_or_else(|| Error::Validation("missing audio source path".into()))?;

    let left_device = args
        .left_device
        .clone()
        .ok_or_else(|| Error::Validation("missing --left-device".into()))?;
    let right_device = args
        .right_device
        .clone()
        .ok_or_else(|| Error::Validation("missing --right-device".into()))?;

    let mode = if args.use_stems {
        let left = args
            .left_stems
            .clone()
            .ok_or_else(|| Error::Validation("--use-stems requires --left-stems".into()))?;
        let right = args
            .right_stems
            .clone()
            .ok_or_else(|| Error::Validation("--use-stems requires --right-stems".into()))?;
        MixMode::Stems { left, right }
    } else {
        MixMode::ChannelSplit
    };

    Ok(SessionRequest {
        source_path,
        mode,
        offset_ms: args.sync_offset,
        left_device,
        right_device,
    })
}

/// Raise a shutdown flag on ctrl-c (and SIGTERM on unix).
fn spawn_interrupt_handler() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received ctrl-c, shutting down"),
            _ = terminate => info!("Received terminate signal, shutting down"),
        }
        let _ = tx.send(true);
    });

    rx
}
