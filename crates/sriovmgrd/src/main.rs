//! sriovmgrd daemon entry point.
//!
//! Initializes logging, restores persisted networks, and waits for
//! shutdown. The libnetwork plugin socket handler drives the [`Driver`]
//! behind a single `Arc<Mutex<_>>`, serializing every lifecycle call.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use sriovmgrd::{Driver, DEFAULT_CONFIG_ROOT};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Docker networking for SR-IOV and passthrough netdevices.
#[derive(Debug, Parser)]
#[command(name = "sriovmgrd", version)]
struct Args {
    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,

    /// Root directory of the persisted network store.
    #[arg(long, default_value = DEFAULT_CONFIG_ROOT)]
    config_root: PathBuf,
}

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut driver = Driver::new(&args.config_root);
    driver.replay_persisted().await?;

    // The plugin socket handler shares the driver and takes this lock for
    // the full duration of every lifecycle call.
    let _driver = Arc::new(Mutex::new(driver));

    info!("sriov plugin started version={}", VERSION);
    info!("Ready to accept commands");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);

    info!("--- Starting sriovmgrd ---");
    info!("Persisted config root: {}", args.config_root.display());

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("sriovmgrd error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
