//! mathqd - concurrent TCP math server
//!
//! Clients join with a name, submit arithmetic expressions and receive
//! results in the global order the requests were queued.
//!
//! ```bash
//! mathqd                       # listen on the configured port, type `quit` to stop
//! mathqd --port 4000
//! MATHQ_PORT=4000 mathqd
//! RUST_LOG=mathqd=debug mathqd
//! ```
//!
//! SIGTERM, SIGINT and a console `quit` all trigger the same graceful
//! shutdown.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mathqd::config::ServerConfig;
use mathqd::event_log::EventLog;
use mathqd::server::MathServer;

/// Concurrent arithmetic server with a globally ordered request queue
#[derive(Parser, Debug)]
#[command(name = "mathqd", version, about)]
struct Args {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind to
    #[arg(short, long)]
    bind: Option<String>,

    /// Config file (default: <config dir>/mathq/mathqd.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not read `quit` from stdin
    #[arg(long)]
    no_console: bool,
}

impl Args {
    /// File and environment first, then command-line flags.
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config =
            ServerConfig::load(self.config.as_deref()).context("Failed to load configuration")?;

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = &self.bind {
            config.bind_address = bind.clone();
        }
        config.validate().context("Invalid configuration")?;

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("mathqd=info".parse()?)
                .add_directive("mathq_core=info".parse()?)
                .add_directive("mathq_protocol=info".parse()?),
        )
        .init();

    let config = args.server_config()?;
    info!(version = env!("CARGO_PKG_VERSION"), "mathq server starting");

    let event_log = match config.log_path() {
        Some(path) => EventLog::open(path)?,
        None => EventLog::console_only(),
    };

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        shutdown_token.cancel();
    });

    if !args.no_console {
        spawn_console_watcher(cancel_token.clone());
    }

    let server = MathServer::bind(config, event_log, cancel_token).await?;
    info!(addr = %server.local_addr(), "Accepting connections (type `quit` to stop)");

    let processed = server.run().await?;
    info!(processed, "mathq server stopped");
    Ok(())
}

/// Cancels `token` when `quit` is typed on the console.
///
/// Reads on a plain thread: a blocking stdin read cannot be cancelled and
/// must not hold up runtime shutdown.
fn spawn_console_watcher(token: CancellationToken) {
    let spawned = thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) if line.trim().eq_ignore_ascii_case("quit") => {
                        info!("Quit requested from console");
                        token.cancel();
                        return;
                    }
                    Ok(_) => {}
                    Err(_) => return,
                }
            }
        });

    if let Err(e) = spawned {
        error!(error = %e, "Failed to start console watcher");
    }
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = terminate.recv() => info!("SIGTERM received, shutting down"),
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Interrupt received, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Interrupt received, shutting down");
    }

    Ok(())
}
