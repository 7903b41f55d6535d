//! prestop-injector library crate
//!
//! A mutating admission webhook that adds a preStop `sleep` hook to
//! `linkerd-proxy` sidecars so in-flight traffic drains before the proxy exits.

pub mod config;
pub mod error;
pub mod health;
pub mod webhooks;

pub use config::{
    Config, HEALTH_PORT, PreStopHook, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT,
};
pub use error::{Error, Result};
pub use health::{HealthState, run_health_server};
pub use webhooks::{WebhookState, create_webhook_router, run_webhook_server};
