//! prestop-injector - mutating admission webhook for linkerd-proxy drain hooks.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Loads configuration from the environment
//! - Starts the health server and the TLS webhook server
//! - Exits when either server fails or a shutdown signal arrives

use std::process::ExitCode;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info, warn};

use prestop_injector::{Config, HealthState, run_health_server, run_webhook_server};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("prestop_injector=info".parse()?),
        )
        .json()
        .init();

    info!("Starting prestop-injector");

    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        warn!("Rustls crypto provider already installed");
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Ok(ExitCode::FAILURE);
        }
    };

    info!(
        webhook_port = config.webhook_port,
        health_port = config.health_port,
        container = %config.hook.container_name,
        sleep_seconds = config.hook.sleep_seconds,
        "Loaded configuration"
    );

    let health_state = Arc::new(HealthState::new());

    // Probes answer even before TLS is loaded so readiness can report it
    let health_handle = {
        let health_state = health_state.clone();
        let port = config.health_port;
        tokio::spawn(async move { run_health_server(health_state, port).await })
    };

    let shutdown_grace = config.shutdown_grace;
    let webhook_handle = {
        let health_state = health_state.clone();
        tokio::spawn(async move { run_webhook_server(&config, health_state).await })
    };

    // The orchestrator restarts us; a failed server is not retried here
    let code = tokio::select! {
        result = webhook_handle => match result {
            Ok(Ok(())) => {
                error!("Webhook server exited unexpectedly");
                ExitCode::FAILURE
            }
            Ok(Err(e)) => {
                error!(error = %e, "Webhook server error");
                ExitCode::FAILURE
            }
            Err(e) => {
                error!("Webhook server task panicked: {}", e);
                ExitCode::FAILURE
            }
        },
        result = health_handle => match result {
            Ok(Ok(())) => {
                error!("Health server exited unexpectedly");
                ExitCode::FAILURE
            }
            Ok(Err(e)) => {
                error!(error = %e, "Health server error");
                ExitCode::FAILURE
            }
            Err(e) => {
                error!("Health server task panicked: {}", e);
                ExitCode::FAILURE
            }
        },
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Both servers keep running through the grace period
            health_state.set_ready(false).await;
            info!(
                "Waiting {}s before exiting",
                shutdown_grace.as_secs()
            );
            tokio::time::sleep(shutdown_grace).await;

            ExitCode::SUCCESS
        }
    };

    info!("Webhook stopped");
    Ok(code)
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
