//! Test fixtures and builder patterns for Pods and AdmissionReviews.

use k8s_openapi::api::core::v1::{Container, ExecAction, Lifecycle, LifecycleHandler, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{Value, json};

/// Builder for creating Pod test fixtures.
///
/// # Example
/// ```
/// let pod = PodBuilder::new("web")
///     .namespace("emojivoto")
///     .container("app")
///     .container("linkerd-proxy")
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct PodBuilder {
    name: String,
    namespace: Option<String>,
    containers: Vec<Container>,
}

impl PodBuilder {
    /// Create a new builder with the given Pod name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            containers: Vec::new(),
        }
    }

    /// Set the namespace for the Pod.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Add a container without a lifecycle.
    pub fn container(mut self, name: impl Into<String>) -> Self {
        self.containers.push(Container {
            name: name.into(),
            image: Some("busybox".to_string()),
            ..Default::default()
        });
        self
    }

    /// Add a container that already carries a preStop hook.
    pub fn container_with_lifecycle(mut self, name: impl Into<String>) -> Self {
        self.containers.push(Container {
            name: name.into(),
            image: Some("busybox".to_string()),
            lifecycle: Some(existing_lifecycle()),
            ..Default::default()
        });
        self
    }

    /// Build the Pod.
    pub fn build(self) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: self.namespace,
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: self.containers,
                ..Default::default()
            }),
            status: None,
        }
    }
}

/// Lifecycle that differs from the injected one, to prove it is left alone.
pub fn existing_lifecycle() -> Lifecycle {
    Lifecycle {
        pre_stop: Some(LifecycleHandler {
            exec: Some(ExecAction {
                command: Some(vec!["/bin/sh".to_string(), "-c".to_string(), "sleep 30".to_string()]),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// AdmissionReview JSON for a Pod CREATE.
pub fn review_json(uid: &str, pod: &Pod) -> Value {
    review_json_with_object(uid, serde_json::to_value(pod).unwrap_or_default())
}

/// AdmissionReview JSON carrying an arbitrary object.
pub fn review_json_with_object(uid: &str, object: Value) -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1beta1",
        "kind": "AdmissionReview",
        "request": {
            "uid": uid,
            "kind": {"group": "", "version": "v1", "kind": "Pod"},
            "resource": {"group": "", "version": "v1", "resource": "pods"},
            "namespace": "default",
            "operation": "CREATE",
            "userInfo": {"username": "system:serviceaccount:kube-system:replicaset-controller"},
            "object": object
        }
    })
}

/// Serialized AdmissionReview body for a Pod CREATE.
pub fn review_body(uid: &str, pod: &Pod) -> Vec<u8> {
    serde_json::to_vec(&review_json(uid, pod)).unwrap_or_default()
}

/// Pod as a JSON document, for applying patches.
pub fn pod_document(pod: &Pod) -> Value {
    serde_json::to_value(pod).unwrap_or_default()
}
