//! Gateway server setup
//!
//! Routes, dependency wiring, and the process lifecycle around them.

mod auth;
mod error;
mod handler;
mod state;

pub use auth::AuthUser;
pub use error::{ApiError, ErrorBody, ErrorDetail};
pub use handler::{gateway_handler, ConnectRequest};
pub use state::GatewayState;

use crate::broadcast::{EventBridge, EventDispatcher};
use crate::connection::SessionRegistry;
use crate::presence::PresenceTracker;
use crate::protocol::CloseCode;
use axum::{extract::State, routing::get, Router};
use chat_common::{AppConfig, AppError, JwtService, SessionConfig};
use chat_core::{PresenceRepository, UserSnapshotRepository};
use chat_db::{create_pool, MemoryUserStore, PgUserStore, PoolConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tower_http::trace::TraceLayer;

/// Create the gateway router
pub fn create_router() -> Router<GatewayState> {
    Router::new()
        .route("/gateway", get(gateway_handler))
        .route("/health", get(health_check))
}

/// Health check endpoint
async fn health_check(State(state): State<GatewayState>) -> &'static str {
    tracing::debug!(
        sessions = state.registry().len(),
        live = state.registry().live_count(),
        online_users = state.presence().online_users(),
        "Health check"
    );
    "OK"
}

/// Build the complete application
pub fn create_app(state: GatewayState) -> Router {
    create_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire registry, presence tracker and dispatcher over the given collaborators
pub fn create_state(
    users: Arc<dyn UserSnapshotRepository>,
    presence: Arc<dyn PresenceRepository>,
    jwt_service: Arc<JwtService>,
    config: SessionConfig,
) -> GatewayState {
    let registry = SessionRegistry::new_shared(config.resume_window);
    let tracker = PresenceTracker::new_shared(presence, config.presence_retry_attempts);
    let dispatcher = EventDispatcher::new_shared(registry, tracker, users);

    GatewayState::new(dispatcher, jwt_service, config)
}

/// Initialize all dependencies and create `GatewayState`
///
/// Without `DATABASE_URL` the gateway runs on an in-memory store that
/// registers users as they connect. Production requires a database.
pub async fn create_gateway_state(config: &AppConfig) -> Result<GatewayState, AppError> {
    let jwt_service = Arc::new(JwtService::new(
        &config.jwt.secret,
        config.jwt.access_token_expiry,
    ));

    let (users, presence): (Arc<dyn UserSnapshotRepository>, Arc<dyn PresenceRepository>) =
        match &config.database {
            Some(database) => {
                tracing::info!("Connecting to PostgreSQL...");
                let pool = create_pool(&PoolConfig::from_settings(database))
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                tracing::info!("PostgreSQL connection established");

                let store = Arc::new(PgUserStore::new(pool));
                (store.clone(), store)
            }
            None if config.app.env.is_production() => {
                return Err(AppError::Config(
                    "DATABASE_URL is required in production".to_string(),
                ));
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using the in-memory user store");
                let store = Arc::new(MemoryUserStore::auto_registering());
                (store.clone(), store)
            }
        };

    Ok(create_state(users, presence, jwt_service, config.session))
}

/// Serve the gateway on `listener` until `shutdown` resolves
///
/// Resets presence, starts the expired-session sweeper and the optional
/// Redis bridge, then serves. On shutdown every session is closed with
/// `ServerShutdown` and given the configured budget to flush before
/// presence is reset again.
pub async fn serve<F>(
    listener: TcpListener,
    state: GatewayState,
    bridge: Option<Arc<EventBridge>>,
    shutdown: F,
) -> Result<(), AppError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let config = state.session_config();

    state.presence().reset_all().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_sweeper(
        state.registry().clone(),
        config.sweep_interval,
        shutdown_rx.clone(),
    );

    if let Some(bridge) = &bridge {
        bridge.clone().start();
    }

    let app = create_app(state.clone());
    let mut server_rx = shutdown_rx;
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_rx.wait_for(|stop| *stop).await;
            })
            .await
    });

    let finished_early = tokio::select! {
        () = shutdown => None,
        result = &mut server => Some(result),
    };

    tracing::info!("Gateway shutting down");
    let _ = shutdown_tx.send(true);

    drain_sessions(state.registry(), config.shutdown_timeout).await;

    let served = match finished_early {
        Some(result) => result,
        None => server.await,
    };

    if let Some(bridge) = &bridge {
        bridge.stop().await;
    }
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Session sweeper ended abnormally");
    }
    if let Err(e) = state.presence().reset_all().await {
        tracing::warn!(error = %e, "Failed to reset presence on shutdown");
    }

    tracing::info!("Gateway stopped");

    served
        .map_err(|e| AppError::Config(format!("Server task failed: {e}")))?
        .map_err(|e| AppError::Config(format!("Server error: {e}")))
}

/// Run the complete gateway server with configuration
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let addr = config.gateway.address();

    let state = create_gateway_state(&config).await?;

    let bridge = match &config.redis {
        Some(redis) => {
            tracing::info!(channel = %redis.events_channel, "Subscribing to Redis events...");
            let bridge = EventBridge::new(redis, state.dispatcher().clone())
                .await
                .map_err(|e| AppError::Cache(format!("Failed to create event bridge: {e}")))?;
            Some(Arc::new(bridge))
        }
        None => None,
    };

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!("Gateway listening on ws://{}/gateway", addr);

    serve(listener, state, bridge, shutdown_signal()).await
}

fn spawn_sweeper(
    registry: Arc<SessionRegistry>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    registry.sweep_expired(Instant::now());
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

async fn drain_sessions(registry: &SessionRegistry, budget: Duration) {
    let stopped = registry.stop_all(CloseCode::ServerShutdown);
    tracing::info!(stopped = stopped, "Closing sessions");

    let drained = timeout(budget, async {
        while registry.live_count() > 0 {
            sleep(Duration::from_millis(25)).await;
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!(
            remaining = registry.live_count(),
            "Shutdown timeout elapsed with sessions still open"
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
