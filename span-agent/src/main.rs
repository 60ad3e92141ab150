//! span agent entry point.
//!
//! ```text
//! span-agent                    Run in the foreground
//! span-agent --relay <url>      Override the relay URL from the config
//! span-agent --config <path>    Load a custom config TOML
//! span-agent --gen-config       Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use span_agent::config::AgentConfig;
use span_agent::service::AgentService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "span-agent", about = "span remote desktop agent")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "span-agent.toml")]
    config: PathBuf,

    /// Relay base URL, overriding `[relay] url`.
    #[arg(short, long)]
    relay: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&AgentConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = AgentConfig::load(&cli.config);
    if let Some(url) = cli.relay {
        config.relay.url = url;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("span-agent v{}", env!("CARGO_PKG_VERSION"));
    info!("target FPS: {}", config.screen.fps);
    info!(
        "frame size: {}x{} @ quality {}",
        config.screen.width, config.screen.height, config.screen.quality
    );
    info!("command poll: {} ms", config.commands.poll_interval_ms);

    let service = AgentService::new(config);
    let stop = service.stop_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, Ordering::SeqCst);
    });

    service.run().await
}
