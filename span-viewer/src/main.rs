//! span viewer entry point.
//!
//! ```text
//! span-viewer sessions              List live sessions on the relay
//! span-viewer connect <ID>          Watch a session and drive it from stdin
//! span-viewer --config <path>       Use custom config TOML
//! span-viewer --gen-config          Dump default config and exit
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use span_core::{ControllerLoop, RelayApi, RelayClient, SessionId, SharedRelay};

use span_viewer::config::ViewerConfig;
use span_viewer::console;
use span_viewer::surface::FileSurface;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "span-viewer", about = "span remote desktop viewer")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "span-viewer.toml")]
    config: PathBuf,

    /// Relay base URL (overrides config).
    #[arg(short, long)]
    relay: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Action>,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// List live sessions.
    Sessions,
    /// Watch a session and send it input typed on stdin.
    Connect {
        /// Session id as shown by the agent (case-insensitive).
        id: String,
        /// Where to write frames (overrides config).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ViewerConfig::load(&cli.config);
    if let Some(url) = cli.relay {
        config.relay.url = url;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("span-viewer v{}", env!("CARGO_PKG_VERSION"));

    let client = RelayClient::new(
        &config.relay.url,
        config.connect_timeout(),
        config.request_timeout(),
    )?;
    let relay: SharedRelay = Arc::new(client);

    match cli.command {
        None | Some(Action::Sessions) => list_sessions(&relay).await,
        Some(Action::Connect { id, output }) => {
            if let Some(path) = output {
                config.display.output = path;
            }
            connect(relay, SessionId::new(id), &config).await
        }
    }
}

async fn list_sessions(relay: &SharedRelay) -> Result<(), Box<dyn std::error::Error>> {
    let sessions = relay.list_sessions().await?;
    if sessions.is_empty() {
        println!("no live sessions");
        return Ok(());
    }
    println!(
        "{:<8} {:<10} {:<8} {:<6} {:<6} {:<8} {}",
        "ID", "PLATFORM", "CAPTURE", "INPUT", "FRAME", "PENDING", "LAST SEEN"
    );
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    for s in sessions {
        println!(
            "{:<8} {:<10} {:<8} {:<6} {:<6} {:<8} {}",
            s.id.as_str(),
            s.platform,
            yes_no(s.capabilities.capture),
            yes_no(s.capabilities.input),
            yes_no(s.has_frame),
            s.pending_commands,
            s.last_seen_at.format("%H:%M:%S"),
        );
    }
    Ok(())
}

async fn connect(
    relay: SharedRelay,
    id: SessionId,
    config: &ViewerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let running = Arc::new(AtomicBool::new(true));
    let surface = FileSurface::new(config.display.output.clone());
    let viewport = surface.viewport();
    info!("session: {id}");
    info!("frames: {}", surface.path().display());

    let mut controller = ControllerLoop::new(
        relay,
        id,
        surface,
        config.to_controller_config(),
        Arc::clone(&running),
    );
    let sender = controller.sender();

    let stop = Arc::clone(&running);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, Ordering::SeqCst);
    });

    let mut watcher = tokio::spawn(async move { controller.run().await });
    let lines = console::spawn_stdin_reader();
    println!("{}", console::HELP);

    let typed = tokio::select! {
        joined = &mut watcher => {
            running.store(false, Ordering::SeqCst);
            joined??;
            return Ok(());
        }
        typed = console::run(lines, sender, viewport, Arc::clone(&running)) => typed,
    };

    running.store(false, Ordering::SeqCst);
    watcher.await??;
    let sent = typed?;
    info!(sent, "console closed");
    Ok(())
}
