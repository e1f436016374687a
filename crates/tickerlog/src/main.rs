//! tickerlog: Coinbase ticker to CSV logger
//!
//! Subscribes to the ticker channel for the given products and appends one CSV
//! row per ticker event to the output file until interrupted.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tickerlog_connector_lib::{
    run_server, ConnectionState, Runner, RunnerConfig, ServerState, SessionStatus, WsTransport,
};
use tickerlog_metadata::FeedConfig;

#[derive(Parser, Debug)]
#[command(name = "tickerlog")]
#[command(about = "Log Coinbase ticker events to a CSV file")]
struct Args {
    /// Products to subscribe to (default BTC-USD)
    tickers: Vec<String>,

    /// CSV file rows are appended to (default data.csv)
    #[arg(short, long, env = "TICKERLOG_OUTPUT")]
    output_file: Option<PathBuf>,

    /// Path to feed configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Connect to the sandbox endpoint
    #[arg(long)]
    sandbox: bool,

    /// Websocket endpoint override
    #[arg(long, env = "TICKERLOG_ENDPOINT")]
    endpoint: Option<String>,

    /// Skip TLS certificate and hostname verification (test endpoints only)
    #[arg(long)]
    insecure_skip_verify: bool,

    /// Health server bind address; no server unless set
    #[arg(long, env = "TICKERLOG_HEALTH_ADDR")]
    health_addr: Option<SocketAddr>,
}

/// Built-in defaults, then the config file, then command line flags.
fn resolve_feed(args: &Args) -> Result<FeedConfig, Box<dyn std::error::Error>> {
    let mut feed = match args.config {
        Some(ref path) => {
            let feed = FeedConfig::load(path)?;
            info!(feed = %feed.name, path = %path.display(), "Loaded feed configuration");
            feed
        }
        None => FeedConfig::coinbase_default(),
    };

    if !args.tickers.is_empty() {
        feed.symbols = args.tickers.clone();
    }
    if let Some(ref output) = args.output_file {
        feed.output = output.clone();
    }
    if let Some(ref endpoint) = args.endpoint {
        feed.endpoint = endpoint.clone();
        if args.sandbox {
            warn!("--endpoint given, ignoring --sandbox");
        }
    }
    if args.insecure_skip_verify {
        feed.tls.verify_peer = false;
    }

    feed.validate()?;
    Ok(feed)
}

async fn wait_for_terminal(mut status: watch::Receiver<SessionStatus>) -> SessionStatus {
    if status.wait_for(|s| s.state.is_terminal()).await.is_err() {
        warn!("Session status channel closed");
    }
    let last = status.borrow().clone();
    last
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let feed = resolve_feed(&args)?;

    let uri = if args.endpoint.is_some() {
        feed.endpoint.clone()
    } else {
        feed.endpoint_for(args.sandbox)?.to_string()
    };
    let verify_peer = feed.tls.verify_peer;
    info!(
        feed = %feed.name,
        uri = %uri,
        symbols = ?feed.symbols,
        output = %feed.output.display(),
        verify_peer,
        "Starting ticker logger"
    );

    let config = RunnerConfig::new(&feed.name, uri, feed.symbols.clone(), &feed.output)
        .with_poll_interval(std::time::Duration::from_millis(feed.worker.poll_interval_ms));
    let mut runner = Runner::new(config);
    runner.start(WsTransport::new(verify_peer))?;

    // Setup shutdown signal
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    // Handle Ctrl+C
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx_clone.send(true).ok();
    });

    let server = args.health_addr.map(|addr| {
        let state = ServerState::new(&feed.name, runner.connected_handle());
        let server_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = run_server(addr, state, server_shutdown).await {
                error!(error = %e, "Health server error");
            }
        })
    });

    let status = runner
        .session_status()
        .ok_or("session not running after start")?;

    let final_status = tokio::select! {
        _ = shutdown_rx.changed() => None,
        status = wait_for_terminal(status) => Some(status),
    };

    // Stop the health server whichever way we got here
    shutdown_tx.send(true).ok();

    // Joins the network and worker threads
    let runner = tokio::task::spawn_blocking(move || {
        runner.stop();
        runner
    })
    .await?;
    info!(rows_written = runner.metrics().rows_written(), "Ticker logger stopped");

    if let Some(server) = server {
        server.await.ok();
    }

    match final_status {
        Some(status) if status.state == ConnectionState::Failed => {
            let reason = status.last_failure.unwrap_or_else(|| "unknown error".to_string());
            error!(error = %reason, "Connection failed");
            Err(format!("connection failed: {}", reason).into())
        }
        Some(status) => {
            match status.close_info {
                Some(close) => info!(code = close.code, reason = %close.reason, "Connection closed by server"),
                None => info!("Connection closed by server"),
            }
            Ok(())
        }
        None => Ok(()),
    }
}
