//! Veil privacy agent entry point.
//!
//! ```text
//! veil-agent                         Engage privacy mode until Ctrl-C
//! veil-agent --config <path>         Load a custom config TOML
//! veil-agent --gen-config            Write default config to stdout
//! veil-agent --manufacturer Xiaomi   Override the simulated device identity
//! veil-agent --duration 30           Release automatically after 30 s
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use veil_agent::config::AgentConfig;
use veil_agent::service::{AgentService, RunOutcome};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "veil-agent", about = "Privacy mode agent for remote-control sessions")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "veil-agent.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Override the device manufacturer.
    #[arg(long)]
    manufacturer: Option<String>,

    /// Override the device brand.
    #[arg(long)]
    brand: Option<String>,

    /// Override the build fingerprint.
    #[arg(long)]
    fingerprint: Option<String>,

    /// Release privacy mode after this many seconds.
    #[arg(long)]
    duration: Option<u64>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&AgentConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = AgentConfig::load(&cli.config);
    if let Some(manufacturer) = cli.manufacturer {
        config.device.manufacturer = manufacturer;
    }
    if let Some(brand) = cli.brand {
        config.device.brand = brand;
    }
    if let Some(fingerprint) = cli.fingerprint {
        config.device.fingerprint = fingerprint;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("veil-agent v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "device: manufacturer={:?} brand={:?}",
        config.device.manufacturer, config.device.brand
    );
    info!("target brightness: {}", config.privacy.target_level);
    info!("keep-alive: {} ms", config.privacy.keep_alive_ms);

    let service = AgentService::new(config);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    let stop_clone = stop.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, releasing privacy mode");
        stop_clone.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    if let Some(secs) = cli.duration {
        let stop_clone = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            info!("duration elapsed, releasing privacy mode");
            stop_clone.store(false, std::sync::atomic::Ordering::SeqCst);
        });
    }

    match service.run().await {
        RunOutcome::Completed => Ok(()),
        RunOutcome::NotStarted(e) => Err(e.into()),
    }
}
