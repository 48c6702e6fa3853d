//! # Queue Gateway Service
//!
//! Binary entry point for the queue gateway HTTP service.
//!
//! This executable:
//! - Loads service configuration from files and `QG__` environment variables
//! - Initializes structured logging
//! - Reads the broker credential and queue name from settings and the environment
//! - Starts the HTTP server from queue-gateway-api
//!
//! Exit codes: 1 bind failure, 2 server failure, 3 configuration error.

use anyhow::Context;
use queue_gateway_api::{start_server, ConfigError, LoggingConfig, ServiceConfig, ServiceError};
use queue_gateway_core::GatewayConfig;
use queue_runtime::{
    transport_for, ConfigurationError, ProviderType, QueueError, ServiceBusConnectionInfo,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;

#[tokio::main]
async fn main() {
    // -------------------------------------------------------------------------
    // Load configuration
    //
    // Sources (later sources override earlier ones):
    //  1. /etc/queue-gateway/service.*  system-wide defaults
    //  2. ./config/service.*            deployment-local override
    //  3. Path given by QG_CONFIG_FILE  operator-specified file (required)
    //  4. Environment variables prefixed QG__, e.g. QG__SERVER__PORT=9090
    //
    // Logging is configured from the loaded file, so a load failure is
    // reported through the default subscriber.
    // -------------------------------------------------------------------------
    let service_config = match ServiceConfig::load() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&LoggingConfig::default());
            error!(error = %e, "Failed to load service configuration; aborting");
            std::process::exit(3);
        }
    };

    init_tracing(&service_config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting queue gateway service");

    if let Err(e) = run(service_config).await {
        let code = exit_code(&e);
        error!(error = %format!("{:#}", e), exit_code = code, "Queue gateway service stopped");
        std::process::exit(code);
    }
}

async fn run(service_config: ServiceConfig) -> anyhow::Result<()> {
    service_config
        .validate()
        .context("Service configuration is invalid")?;

    let gateway = GatewayConfig::load().context("Broker configuration is incomplete")?;
    check_credential(&gateway).context("CONNECTION_STRING does not fit QUEUE_NAME")?;

    let transport =
        transport_for(gateway.connection_string()).context("Failed to create broker transport")?;

    info!(
        queue = %gateway.queue_name(),
        provider = %transport.provider_type(),
        "Broker configuration loaded"
    );

    start_server(service_config, Arc::new(gateway), transport)
        .await
        .context("HTTP server stopped with an error")?;

    info!("Queue gateway service stopped");
    Ok(())
}

/// Reject a Service Bus credential that is malformed or scoped to another
/// queue. Either would otherwise fail every request.
fn check_credential(gateway: &GatewayConfig) -> Result<(), ConfigurationError> {
    if ProviderType::for_connection_string(gateway.connection_string())
        == ProviderType::AzureServiceBus
    {
        ServiceBusConnectionInfo::parse(gateway.connection_string())?
            .check_entity(gateway.queue_name())?;
    }
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.default_directive()));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Map a startup or server failure to the process exit code
fn exit_code(error: &anyhow::Error) -> i32 {
    if let Some(service_error) = error.downcast_ref::<ServiceError>() {
        return match service_error {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };
    }

    let is_configuration = error.downcast_ref::<ConfigError>().is_some()
        || error.downcast_ref::<ConfigurationError>().is_some()
        || matches!(
            error.downcast_ref::<QueueError>(),
            Some(QueueError::ConfigurationError(_))
        );

    if is_configuration {
        3
    } else {
        1
    }
}
