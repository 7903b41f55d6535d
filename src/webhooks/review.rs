//! AdmissionReview decoding and response construction.
//!
//! The inbound body may be JSON or YAML. The outbound review is always JSON and
//! echoes the original request next to the response.

use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use tracing::{debug, error, info};

use crate::config::PreStopHook;
use crate::error::{Error, Result};
use crate::webhooks::prestop::{build_patch, pod_from_object};

/// Review type accepted and produced by the webhook
pub type Review = AdmissionReview<DynamicObject>;

/// How an admission request was decided
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Allowed without mutation
    Allowed,
    /// Allowed with a patch of the given number of operations
    Patched(usize),
    /// Denied because of a decode or serialization error
    Denied,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Allowed => "allowed",
            Outcome::Patched(_) => "patched",
            Outcome::Denied => "denied",
        }
    }
}

/// A decided review ready to be encoded
#[derive(Debug)]
pub struct Decision {
    pub review: Review,
    pub outcome: Outcome,
}

/// Decode an AdmissionReview from JSON or YAML bytes
pub fn decode(body: &[u8]) -> Result<Review> {
    Ok(serde_yaml::from_slice(body)?)
}

/// Best-effort extraction of `request.uid` from a body that failed to decode
fn salvage_uid(body: &[u8]) -> String {
    serde_yaml::from_slice::<serde_yaml::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("request")
                .and_then(|request| request.get("uid"))
                .and_then(|uid| uid.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

/// Denial for a review that has no usable request
fn invalid(uid: String, err: &Error) -> Decision {
    let mut response = AdmissionResponse::invalid(err.to_string());
    response.uid = uid;
    Decision {
        review: response.into_review(),
        outcome: Outcome::Denied,
    }
}

/// Decode a body and decide it.
///
/// Never fails: every error becomes a denial carrying the request UID when one
/// can be recovered.
pub fn process(body: &[u8], hook: &PreStopHook) -> Decision {
    let review = match decode(body) {
        Ok(review) => review,
        Err(e) => {
            error!(error = %e, "Failed to decode admission review");
            return invalid(salvage_uid(body), &e);
        }
    };

    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            let err = Error::Decode(e.to_string());
            error!(error = %err, "Invalid admission review");
            return invalid(String::new(), &err);
        }
    };

    info!(
        uid = %request.uid,
        operation = ?request.operation,
        namespace = ?request.namespace,
        name = ?request.name,
        "Received admission review request"
    );

    let (response, outcome) = respond(&request, hook);
    let mut review = response.into_review();
    review.request = Some(request);

    Decision { review, outcome }
}

/// Build the response for a decoded request
pub fn respond(
    request: &AdmissionRequest<DynamicObject>,
    hook: &PreStopHook,
) -> (AdmissionResponse, Outcome) {
    let uid = &request.uid;

    let Some(object) = request.object.as_ref() else {
        debug!(uid = %uid, "No object in request, allowing unchanged");
        return (AdmissionResponse::from(request), Outcome::Allowed);
    };

    let patch = match pod_from_object(object).and_then(|pod| build_patch(&pod, hook)) {
        Ok(patch) => patch,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to inject preStop hook");
            return (AdmissionResponse::from(request).deny(e.to_string()), Outcome::Denied);
        }
    };

    let Some(patch) = patch else {
        debug!(uid = %uid, "No eligible containers, allowing unchanged");
        return (AdmissionResponse::from(request), Outcome::Allowed);
    };

    let operations = patch.0.len();
    info!(uid = %uid, operations, "Injecting preStop hook");

    match AdmissionResponse::from(request).with_patch(patch) {
        Ok(response) => (response, Outcome::Patched(operations)),
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to serialize patch");
            (
                AdmissionResponse::from(request).deny(format!("patch serialization error: {e}")),
                Outcome::Denied,
            )
        }
    }
}

/// Encode a review as JSON
pub fn encode(review: &Review) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(review)?)
}
