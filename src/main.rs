//! # Live Scribe Backend - Main Application Entry Point
//!
//! WebSocket server for live audio capture sessions: browsers stream audio
//! chunks in, the server incrementally transcribes them, and on stop it
//! produces a persisted transcript and summary plus a downloadable export.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (TOML file + environment variables)
//! - **events**: wire types for the bidirectional event channel
//! - **dispatcher**: translates inbound events into session operations
//! - **session**: lifecycle state machine, registry, broadcast groups
//! - **audio** / **transcript**: bounded buffering and transcript assembly
//! - **ai**: transcription and summarization collaborators
//! - **storage**: session/transcript/summary record store
//! - **export**: the download surface `processing-complete` points at

mod ai;
mod audio;
mod config;
mod dispatcher;
mod error;
mod events;
mod export;
mod health;
mod session;
mod state;
mod storage;
mod transcript;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use dispatcher::EventDispatcher;
use session::SessionRegistry;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use storage::{MemoryStore, SessionStore};
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting live-scribe-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let registry = Arc::new(SessionRegistry::new(
        config.performance.max_concurrent_sessions,
        config.audio.buffer_ceiling_bytes,
        config.audio.broadcast_capacity,
    ));
    let (transcriber, summarizer) = ai::build_collaborators(&config.ai)?;
    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
    let dispatcher = Arc::new(EventDispatcher::new(
        registry,
        transcriber,
        summarizer,
        Arc::clone(&store),
    ));

    let app_state = AppState::new(config.clone(), dispatcher, store);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .route("/ws", web::get().to(websocket::session_websocket))
            .route("/health", web::get().to(health::health_check))
            .route(
                "/sessions/{session_id}/download",
                web::get().to(export::download_session),
            )
            .service(web::scope("/api/v1").route("/health", web::get().to(health::health_check)))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "live_scribe_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
