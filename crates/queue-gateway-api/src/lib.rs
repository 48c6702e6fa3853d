//! # Queue Gateway HTTP Service
//!
//! HTTP surface of the queue gateway.
//!
//! This service provides:
//! - `POST /queue/messages`: validate a `Person` and enqueue it
//! - `GET /queue/messages`: receive, decode and acknowledge queued messages
//! - `GET /health`: liveness probe that never touches the broker

pub mod config;
pub mod errors;
pub mod responses;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

use axum::{
    error_handling::HandleErrorLayer,
    extract::{rejection::JsonRejection, State},
    middleware,
    response::{Json, Response},
    routing::get,
    Router,
};
use queue_gateway_core::{
    Consumer, GatewayConfig, Person, Producer, DEFAULT_MAX_MESSAGES, DEFAULT_MAX_WAIT,
};
use queue_runtime::{QueueTransport, Timestamp};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower::timeout::TimeoutLayer;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, error, info, instrument, warn};

pub use config::{LoggingConfig, ServerConfig, ServiceConfig, CONFIG_FILE_VAR};
pub use errors::{ApiError, ConfigError, ServiceError};
pub use responses::{ErrorResponse, HealthResponse, ReceiveResponse, SendResponse};

/// Header carrying the request correlation ID
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state. Immutable; every request is independent.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub producer: Producer,
    pub consumer: Consumer,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        gateway: Arc<GatewayConfig>,
        transport: Arc<dyn QueueTransport>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            producer: Producer::new(Arc::clone(&transport), Arc::clone(&gateway)),
            consumer: Consumer::new(transport, gateway),
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let queue_routes =
        Router::new().route("/queue/messages", get(receive_messages).post(send_message));

    let health_routes = Router::new().route("/health", get(handle_health_check));

    let timeout = Duration::from_secs(state.config.server.timeout_seconds);
    let max_body_size = state.config.server.max_body_size;

    Router::new()
        .merge(queue_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_logging_middleware))
                .layer(HandleErrorLayer::new(move |error: axum::BoxError| async move {
                    ApiError::from_middleware(error, timeout)
                }))
                .layer(TimeoutLayer::new(timeout))
                .layer(RequestBodyLimitLayer::new(max_body_size))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server and run until SIGINT or SIGTERM
pub async fn start_server(
    config: ServiceConfig,
    gateway: Arc<GatewayConfig>,
    transport: Arc<dyn QueueTransport>,
) -> Result<(), ServiceError> {
    config.validate()?;

    let address = format!("{}:{}", config.server.host, config.server.port);
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!(
        address = %address,
        queue = %gateway.queue_name(),
        provider = %transport.provider_type(),
        "Starting HTTP server"
    );

    let app = create_router(AppState::new(config, gateway, transport));

    // In-flight requests may finish after the signal, but only for the
    // configured shutdown timeout
    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal(shutdown_timeout).await;
            let _ = signalled_tx.send(());
        })
        .into_future();
    let drain_deadline = async move {
        match signalled_rx.await {
            Ok(()) => tokio::time::sleep(shutdown_timeout).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = server => result.map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?,
        _ = drain_deadline => {
            warn!(
                timeout_seconds = shutdown_timeout.as_secs(),
                "Graceful shutdown timed out; abandoning in-flight requests"
            );
        }
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown_timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
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
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
        },
    }
}

// ============================================================================
// Queue Handlers
// ============================================================================

/// Validate a person and enqueue it
///
/// The body is checked before any broker call; a malformed or invalid body
/// never reaches the queue.
#[instrument(skip(state, payload))]
async fn send_message(
    State(state): State<AppState>,
    payload: Result<Json<Person>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    let Json(person) = payload?;
    state.producer.send(&person).await?;
    Ok(Json(SendResponse::accepted()))
}

/// Receive, decode and acknowledge messages from the queue
#[instrument(skip(state))]
async fn receive_messages(State(state): State<AppState>) -> Result<Json<ReceiveResponse>, ApiError> {
    let outcome = state
        .consumer
        .receive_batch(DEFAULT_MAX_WAIT, DEFAULT_MAX_MESSAGES)
        .await?;
    Ok(Json(ReceiveResponse::from(outcome)))
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Basic health check endpoint
async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Timestamp::now(),
    })
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware
///
/// Takes the caller's `x-correlation-id` or generates one, records it on the
/// request span and echoes it on the response.
#[instrument(name = "http_request", skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());
    debug!("Request started");

    let mut response = next.run(request).await;

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, header_value);
    }

    let status = response.status();
    let duration_ms = start.elapsed().as_millis() as u64;
    if status.is_server_error() {
        error!(%status, duration_ms, "Request failed");
    } else if status.is_client_error() {
        warn!(%status, duration_ms, "Request rejected");
    } else {
        info!(%status, duration_ms, "Request completed");
    }

    response
}
