mod cluster;
mod scenario;

use clap::{Parser, Subcommand};
use cluster::InProcessCluster;
use std::sync::Arc;
use stratus_apiserver::{ApiServer, AppState, Config as ApiConfig, MemoryStore};
use stratus_scheduler::{Scheduler, SchedulerConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "stratus", about = "Stratus workload scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server only
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:6443")]
        bind: String,
    },
    /// Run the API server plus the scheduler and play the demo scenario
    Demo {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:6443")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => run_serve(&bind).await,
        Commands::Demo { bind } => run_demo(&bind).await,
    }
}

/// Wait for either SIGINT (ctrl-c) or SIGTERM, returning which one fired.
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

fn parse_bind(bind: &str) -> miette::Result<std::net::SocketAddr> {
    bind.parse()
        .map_err(|e| miette::miette!("Invalid bind address '{}': {}", bind, e))
}

/// Run only the API server
async fn run_serve(bind: &str) -> miette::Result<()> {
    info!("Starting stratus API server");

    let state = Arc::new(AppState::new(Arc::new(MemoryStore::new())));

    let config = ApiConfig {
        listen_addr: parse_bind(bind)?,
    };

    let token = CancellationToken::new();
    let server = ApiServer::new(config, state);
    let server_token = token.clone();

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(server_token).await {
            error!("API server error: {}", e);
        }
    });

    let sig = shutdown_signal().await;
    info!("Received {}, shutting down gracefully...", sig);
    token.cancel();

    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), server_handle).await;
    info!("Shutdown complete");

    Ok(())
}

/// Run the API server and the scheduler, then play the demo scenario.
async fn run_demo(bind: &str) -> miette::Result<()> {
    info!("Starting stratus demo");

    let state = Arc::new(AppState::new(Arc::new(MemoryStore::new())));

    let token = CancellationToken::new();

    // 1. API server
    let api_config = ApiConfig {
        listen_addr: parse_bind(bind)?,
    };
    let api_server = ApiServer::new(api_config, state.clone());
    let api_token = token.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_token).await {
            error!("API server error: {}", e);
        }
    });

    // 2. Scheduler, wired to the state in process. The watch subscription
    // must exist before the scenario creates any resources.
    let client = Arc::new(InProcessCluster::new(state.clone()));
    let sched = Arc::new(Scheduler::new(client, SchedulerConfig::default()));
    sched.queue().clone().run(&token);
    let handler_handle = sched.start_event_handlers(state.subscribe(), token.clone());
    let sched_token = token.clone();
    let sched_handle = tokio::spawn({
        let sched = sched.clone();
        async move { sched.run(sched_token).await }
    });

    // 3. Scenario
    scenario::run(&state).await?;

    info!("Demo finished, shutting down...");
    sched.queue().close();
    token.cancel();

    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = tokio::join!(api_handle, sched_handle, handler_handle);
    })
    .await;

    info!("Shutdown complete");
    Ok(())
}
