//! Mutating admission webhook.
//!
//! - `prestop`: decides which containers get the preStop hook and builds the patch
//! - `review`: AdmissionReview decoding and response construction
//! - `server`: TLS listener and HTTP handler

pub mod prestop;
pub mod review;
mod server;

pub use review::{Decision, Outcome, Review, process};
pub use server::{WebhookState, create_webhook_router, run_webhook_server};
