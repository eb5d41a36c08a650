use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chat_server::cache::Cache;
use chat_server::config::{Config, IngressMode, LoggingConfig};
use chat_server::constants::{CHANNEL_SIZE, SHUTDOWN_GRACE};
use chat_server::dispatch::Dispatcher;
use chat_server::ingress::{BrokerQueue, ChannelQueue, IngressQueue};
use chat_server::state::AppState;
use chat_server::store::SqlStore;
use chat_server::{build_router, db};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chat-server", about = "Real-time chat dispatch server")]
struct Args {
    #[arg(help = "Path to configuration file")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error loading config: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = init_logging(&config.logging) {
        eprintln!("error opening log file: {err}");
        return ExitCode::FAILURE;
    }

    info!("connecting to database...");
    let pool = match db::create_pool(&config.store.url()).await {
        Ok(pool) => pool,
        Err(err) => {
            error!(error = %err, "failed to connect to MySQL");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = db::run_migrations(&pool).await {
        error!(error = %err, "failed to run database migrations");
        return ExitCode::FAILURE;
    }
    info!("migrations applied");

    let cache = match Cache::connect(&config.cache.url()).await {
        Ok(cache) => cache,
        Err(err) => {
            error!(error = %err, "failed to connect to the cache");
            return ExitCode::FAILURE;
        }
    };

    let mode = match config.broker.mode() {
        Ok(mode) => mode,
        Err(err) => {
            error!(error = %err, "invalid ingress configuration");
            return ExitCode::FAILURE;
        }
    };
    let ingress: Arc<dyn IngressQueue> = match mode {
        IngressMode::Channel => Arc::new(ChannelQueue::new(CHANNEL_SIZE)),
        IngressMode::Broker => match BrokerQueue::connect(&config.broker) {
            Ok(queue) => {
                info!(host = %config.broker.host_port, topic = %config.broker.chat_topic, "broker ingress bound");
                Arc::new(queue)
            }
            Err(err) => {
                error!(error = %err, "failed to bind the broker");
                return ExitCode::FAILURE;
            }
        },
    };

    let store = Arc::new(SqlStore::new(pool.clone()));
    let (dispatcher, handle) = Dispatcher::new(ingress, store, Arc::new(cache.clone()));
    let dispatcher_task = tokio::spawn(dispatcher.run());

    let state = AppState {
        pool,
        cache: cache.clone(),
        dispatcher: handle,
    };
    let router = build_router(state);

    let bind_addr = config.main.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(addr = %bind_addr, error = %err, "failed to bind");
            return ExitCode::FAILURE;
        }
    };
    info!(addr = %bind_addr, app = %config.main.app_name, mode = ?mode, "server listening");

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    info!("shutting down");
    let _ = stop_tx.send(());

    // In-flight requests and open sockets get a bounded grace period, then
    // they are abandoned with the process.
    match tokio::time::timeout(SHUTDOWN_GRACE, server_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(err))) => error!(error = %err, "server error"),
        Ok(Err(err)) => error!(error = %err, "server task failed"),
        Err(_) => warn!("grace period expired, abandoning open connections"),
    }

    // Dropping the router dropped the dispatcher's ports; give the loop a
    // moment to observe the close, then stop waiting.
    if tokio::time::timeout(SHUTDOWN_GRACE, dispatcher_task)
        .await
        .is_err()
    {
        warn!("dispatcher did not stop within the grace period");
    }

    if let Err(err) = cache.delete_all().await {
        warn!(error = %err, "best-effort cache clear failed");
    }

    info!("server shut down");
    ExitCode::SUCCESS
}

fn init_logging(config: &LoggingConfig) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.path.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
    }
    Ok(())
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
