// hostpulse - live host telemetry streaming server with process control
mod broadcast;
mod cache;
mod cli;
mod commands;
mod config;
mod handlers;
mod processes;
mod provider;
mod snapshot;
mod state;
mod system;
mod terminate;

use axum::routing::{get, post};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast as broadcast_channel;
use tokio::time::{Duration, Instant};
use tracing::{error, info, Level};

use crate::broadcast::SessionBroadcaster;
use crate::cache::SampleCache;
use crate::cli::{Args, Commands, LogLevel};
use crate::config::{
    resolve_config, show_config, validate_effective_config, DEFAULT_BIND_ADDR, DEFAULT_PORT,
};
use crate::handlers::{health_handler, stream_handler, terminate_handler};
use crate::processes::ProcessSnapshotter;
use crate::provider::{MetricProvider, ProcessProbe};
use crate::state::AppState;
use crate::system::{OsProbe, SysinfoProvider};
use crate::terminate::TerminationController;

/// Initializes the tracing logging subsystem with the configured level.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => Level::ERROR, // Off not fully supported, use ERROR as minimal
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    info!("Logging initialized with level: {:?}", args.log_level);
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format, false);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        let config = resolve_config(&args)?;
        if let Err(e) = validate_effective_config(&config) {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }

        return match command {
            Commands::Check {
                provider,
                signals,
                all,
            } => commands::command_check(*provider, *signals, *all, &config).await,
            Commands::Config {
                output,
                format,
                commented,
            } => commands::command_config(output.clone(), *format, *commented),
            Commands::Test {
                iterations,
                verbose,
            } => commands::command_test(*iterations, *verbose, &config).await,
        };
    }

    // Load configuration for main server mode
    let config = resolve_config(&args)?;

    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    setup_logging(&args);

    info!("Starting hostpulse");

    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let port = config.port.unwrap_or(DEFAULT_PORT);

    // Build the engine: one provider and one cache shared by every session.
    let provider: Arc<dyn MetricProvider> = Arc::new(SysinfoProvider::new());
    let probe: Arc<dyn ProcessProbe> = Arc::new(OsProbe);
    let snapshotter = ProcessSnapshotter::new(
        config.top_n(),
        config.cpu_floor(),
        config.memory_floor(),
        config.view(),
    );
    let cache = Arc::new(SampleCache::new(
        Arc::clone(&provider),
        snapshotter,
        config.metrics_ttl(),
        config.processes_ttl(),
    ));

    let (events_tx, events_rx) = broadcast_channel::channel(32);
    let broadcaster =
        SessionBroadcaster::new(Arc::clone(&cache), Arc::clone(&provider), config.push_interval());
    let event_pump = broadcaster.start_event_pump(events_rx);
    let controller = Arc::new(TerminationController::new(
        probe,
        Arc::clone(&cache),
        events_tx,
        config.grace_period(),
    ));

    let state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        cache: Arc::clone(&cache),
        broadcaster,
        controller,
        started_at: Instant::now(),
    });

    // Warm the cache before accepting clients; this also primes the CPU
    // delta baseline in the provider.
    info!("Performing initial sampling pass");
    let _ = cache.metrics(true).await;

    // Configure HTTP server routes and start listening
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    let mut app = Router::new()
        .route("/ws", get(stream_handler))
        .route("/api/processes/{pid}/terminate", post(terminate_handler));

    if config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }

    let app = app.with_state(state);

    if let (Some(cert), Some(key)) = (&config.tls_cert, &config.tls_key) {
        let tls = RustlsConfig::from_pem_file(cert, key).await?;
        info!("hostpulse listening on https://{}:{}", bind_ip_str, port);

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app.into_make_service())
            .await?;
    } else {
        let listener = TcpListener::bind(addr).await?;
        info!("hostpulse listening on http://{}:{}", bind_ip_str, port);

        let server = axum::serve(listener, app);
        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received, exiting...");
            }
        }
    }

    // Cleanup: stop the event pump before exit
    event_pump.abort();
    let _ = event_pump.await;

    info!("hostpulse stopped gracefully");
    Ok(())
}
