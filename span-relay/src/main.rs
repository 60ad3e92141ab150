//! span relay server entry point.
//!
//! ```text
//! span-relay                    Serve on the configured address
//! span-relay --port 9000        Override the port (also $PORT)
//! span-relay --config <path>    Load a custom config TOML
//! span-relay --gen-config       Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use span_core::RelayService;
use span_relay::config::RelayConfig;
use span_relay::routes;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "span-relay", about = "span relay server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "span-relay.toml")]
    config: PathBuf,

    /// Listen on 0.0.0.0:<PORT>, overriding `[server] bind`.
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&RelayConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = RelayConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.server.bind = format!("0.0.0.0:{port}");
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store_config = config.to_store_config();
    info!("span-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("session ttl: {}s", store_config.session_ttl.as_secs());
    info!("max sessions: {}", store_config.max_sessions);
    info!("queue capacity: {}", store_config.queue_capacity);

    let service = Arc::new(RelayService::new(store_config));
    let app = routes::router(service, config.frames.max_frame_bytes);

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Ctrl-C received, shutting down");
        })
        .await?;

    Ok(())
}
