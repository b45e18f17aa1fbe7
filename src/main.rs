//! Mihomo Hub - CLI Entry Point
//!
//! Supports Go-style CLI arguments for compatibility with clash-verge-rev:
//! - `-ext-ctl-unix` (Go style) and `--ext-ctl-unix` (standard) both work
//! - `-ext-ctl` (Go style) and `--ext-ctl` (standard) both work

// Use mimalloc as global allocator for better p99 latency
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::Parser;
use mihomo_hub::log::{LogController, LogLevel};
use mihomo_hub::{Config, Gateway, VERSION};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

/// Go-style long options that use single dash (Go's flag package behavior)
const GO_STYLE_LONG_OPTIONS: &[&str] = &[
    "-ext-ctl-unix",
    "-ext-ctl",
    "-config",
    "-directory",
    "-test",
];

/// Convert Go-style single-dash long options to the double-dash form clap expects
fn normalize_args() -> Vec<String> {
    std::env::args()
        .map(|arg| {
            if GO_STYLE_LONG_OPTIONS.contains(&arg.as_str()) {
                format!("-{}", arg)
            } else {
                arg
            }
        })
        .collect()
}

#[derive(Parser, Debug)]
#[command(name = "mihomo-hub")]
#[command(author = "Tsang")]
#[command(version = VERSION)]
#[command(about = "Runtime control plane for a mihomo-compatible proxy engine")]
struct Args {
    /// Path to configuration file
    #[arg(short = 'c', short_alias = 'f', long = "config", default_value = "config.yaml")]
    config: PathBuf,

    /// Configuration directory
    #[arg(short = 'd', long = "directory")]
    directory: Option<PathBuf>,

    /// External controller address (overrides config)
    #[arg(long = "ext-ctl")]
    external_controller: Option<String>,

    /// External controller via Unix Socket
    #[cfg(unix)]
    #[arg(long = "ext-ctl-unix")]
    ext_ctl_unix: Option<String>,

    /// Test configuration and exit
    #[arg(short = 't', long = "test")]
    test: bool,
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get().max(2))
        .enable_all()
        .thread_name("mihomo-hub-worker")
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    // RUST_LOG covers startup; the configured log-level replaces it once applied
    let initial_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| LogLevel::default().filter());
    let (filter, filter_handle) = reload::Layer::new(initial_filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let normalized_args = normalize_args();
    let args = Args::parse_from(normalized_args);

    info!("Mihomo Hub v{}", VERSION);

    if let Some(ref dir) = args.directory {
        info!("Using configuration directory: {}", dir.display());
        if dir.is_dir() {
            std::env::set_current_dir(dir)?;
        }
    }

    info!("Loading configuration from: {}", args.config.display());
    let mut config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(ext_ctl) = args.external_controller {
        config.external_controller = Some(ext_ctl);
    }

    #[cfg(unix)]
    if let Some(unix_path) = args.ext_ctl_unix {
        info!("Unix Socket configured: {}", unix_path);
        config.external_controller_unix = Some(unix_path);
    }

    if args.test {
        info!("Configuration test passed");
        return Ok(());
    }

    let log = LogController::new(config.log_level, Some(filter_handle));
    let gateway = match Gateway::new(config, log).await {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to initialize gateway: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Gateway error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
