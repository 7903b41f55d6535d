//! Admission webhook server.
//!
//! Serves the mutating webhook over TLS. Every path and method is routed to
//! the same handler; the API server only ever POSTs AdmissionReviews here.
//!
//! To enable the webhook:
//! 1. Provide a PEM certificate and key at the configured paths
//! 2. Create a MutatingWebhookConfiguration pointing at this service
//!
//! Both are handled outside this process.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tracing::{info, warn};

use crate::config::{Config, MAX_BODY_BYTES, PreStopHook};
use crate::error::{Error, Result};
use crate::health::HealthState;
use crate::webhooks::review::{self, Decision};

/// Shared state for webhook handlers
pub struct WebhookState {
    /// Hook injected into matching containers
    pub hook: PreStopHook,
    /// Upper bound on the request body
    pub max_body_bytes: usize,
    /// Readiness flag and metrics
    pub health: Arc<HealthState>,
}

impl WebhookState {
    pub fn new(hook: PreStopHook, health: Arc<HealthState>) -> Self {
        Self {
            hook,
            max_body_bytes: MAX_BODY_BYTES,
            health,
        }
    }

    pub fn from_config(config: &Config, health: Arc<HealthState>) -> Self {
        Self {
            hook: config.hook.clone(),
            max_body_bytes: config.max_body_bytes,
            health,
        }
    }
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new().fallback(admit).with_state(state)
}

/// Mutating admission handler
async fn admit(State(state): State<Arc<WebhookState>>, request: Request) -> Response {
    let metrics = &state.health.metrics;

    let body = match axum::body::to_bytes(request.into_body(), state.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            let err = Error::Io(e.to_string());
            warn!(error = %err, "Error reading request");
            metrics.record_failure("read_error");
            return err.into_response();
        }
    };

    if body.is_empty() {
        warn!("Received empty payload");
        metrics.record_failure("empty_body");
        return StatusCode::OK.into_response();
    }

    let started = Instant::now();
    let Decision {
        review: outbound,
        outcome,
    } = review::process(&body, &state.hook);
    metrics.record_admission(outcome, started.elapsed().as_secs_f64());

    match review::encode(&outbound) {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Error marshaling response");
            metrics.record_failure("encode_error");
            e.into_response()
        }
    }
}

/// Run the webhook server with TLS
///
/// Binds to 0.0.0.0 on the configured port. TLS material is read once at
/// startup; any failure here is fatal to the caller.
pub async fn run_webhook_server(config: &Config, health: Arc<HealthState>) -> Result<()> {
    let tls = RustlsConfig::from_pem_file(&config.cert_path, &config.key_path)
        .await
        .map_err(|e| {
            Error::TlsConfig(format!(
                "{} / {}: {}",
                config.cert_path.display(),
                config.key_path.display(),
                e
            ))
        })?;

    let state = Arc::new(WebhookState::from_config(config, health.clone()));
    let app = create_webhook_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.webhook_port));
    health.set_ready(true).await;
    info!(port = config.webhook_port, "Webhook server listening with TLS");

    axum_server::bind_rustls(addr, tls)
        .serve(app.into_make_service())
        .await
        .map_err(|e| Error::Server(e.to_string()))?;

    Ok(())
}
