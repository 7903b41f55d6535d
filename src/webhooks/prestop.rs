//! preStop hook injection.
//!
//! Adds a `sleep` preStop hook to every container matching the configured name
//! that does not already carry a lifecycle. Containers with an existing
//! lifecycle are left untouched, which makes the mutation idempotent.

use json_patch::{AddOperation, Patch, PatchOperation};
use jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::{ExecAction, Lifecycle, LifecycleHandler, Pod};
use kube::core::DynamicObject;
use tracing::debug;

use crate::config::PreStopHook;
use crate::error::{Error, Result};

/// Convert the admission object into a typed Pod
pub fn pod_from_object(object: &DynamicObject) -> Result<Pod> {
    let value = serde_json::to_value(object)?;
    serde_json::from_value(value).map_err(|e| Error::Decode(format!("invalid Pod: {e}")))
}

/// Indices of containers that should receive the hook, in container order
pub fn eligible_containers(pod: &Pod, hook: &PreStopHook) -> Vec<usize> {
    let Some(spec) = pod.spec.as_ref() else {
        return Vec::new();
    };

    spec.containers
        .iter()
        .enumerate()
        .filter(|(index, container)| {
            debug!(index, container = %container.name, "Inspecting container");
            container.lifecycle.is_none() && container.name == hook.container_name
        })
        .map(|(index, _)| index)
        .collect()
}

/// Lifecycle carrying the preStop exec hook
pub fn prestop_lifecycle(hook: &PreStopHook) -> Lifecycle {
    Lifecycle {
        pre_stop: Some(LifecycleHandler {
            exec: Some(ExecAction {
                command: Some(hook.command()),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the JSON patch for a Pod.
///
/// Returns `None` when no container is eligible, so callers can tell
/// "nothing to mutate" apart from an empty patch.
pub fn build_patch(pod: &Pod, hook: &PreStopHook) -> Result<Option<Patch>> {
    let indices = eligible_containers(pod, hook);
    if indices.is_empty() {
        return Ok(None);
    }

    let value = serde_json::to_value(prestop_lifecycle(hook))?;
    let operations = indices
        .into_iter()
        .map(|index| {
            PatchOperation::Add(AddOperation {
                path: PointerBuf::from_tokens([
                    "spec",
                    "containers",
                    index.to_string().as_str(),
                    "lifecycle",
                ]),
                value: value.clone(),
            })
        })
        .collect();

    Ok(Some(Patch(operations)))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod(containers: serde_json::Value) -> Pod {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web", "namespace": "default"},
            "spec": {"containers": containers}
        }))
        .unwrap()
    }

    #[test]
    fn test_patches_proxy_at_its_index() {
        let pod = pod(json!([{"name": "app"}, {"name": "linkerd-proxy"}]));
        let patch = build_patch(&pod, &PreStopHook::default()).unwrap().unwrap();

        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!([{
                "op": "add",
                "path": "/spec/containers/1/lifecycle",
                "value": {"preStop": {"exec": {"command": ["/bin/bash", "-c", "sleep 5"]}}}
            }])
        );
    }

    #[test]
    fn test_existing_lifecycle_is_left_alone() {
        let pod = pod(json!([{
            "name": "linkerd-proxy",
            "lifecycle": {"postStart": {"exec": {"command": ["true"]}}}
        }]));
        assert!(build_patch(&pod, &PreStopHook::default()).unwrap().is_none());
    }

    #[test]
    fn test_no_proxy_means_no_patch() {
        let pod = pod(json!([{"name": "app"}, {"name": "linkerd-init"}]));
        assert!(build_patch(&pod, &PreStopHook::default()).unwrap().is_none());
    }

    #[test]
    fn test_name_match_is_exact() {
        let pod = pod(json!([{"name": "Linkerd-Proxy"}, {"name": "linkerd-proxy-2"}]));
        assert!(eligible_containers(&pod, &PreStopHook::default()).is_empty());
    }

    #[test]
    fn test_one_entry_per_matching_container() {
        let pod = pod(json!([
            {"name": "linkerd-proxy"},
            {"name": "app"},
            {"name": "linkerd-proxy"}
        ]));
        let patch = build_patch(&pod, &PreStopHook::default()).unwrap().unwrap();
        let paths: Vec<String> = patch
            .0
            .iter()
            .map(|op| match op {
                PatchOperation::Add(add) => add.path.to_string(),
                other => panic!("unexpected operation {other:?}"),
            })
            .collect();
        assert_eq!(
            paths,
            vec!["/spec/containers/0/lifecycle", "/spec/containers/2/lifecycle"]
        );
    }

    #[test]
    fn test_pod_without_spec() {
        let pod: Pod = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "bare"}
        })).unwrap();
        assert!(build_patch(&pod, &PreStopHook::default()).unwrap().is_none());
    }

    #[test]
    fn test_applied_patch_is_idempotent() {
        let mut doc = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web"},
            "spec": {"containers": [{"name": "linkerd-proxy"}, {"name": "app"}]}
        });
        let hook = PreStopHook::default();
        let first = build_patch(&serde_json::from_value(doc.clone()).unwrap(), &hook)
            .unwrap()
            .unwrap();
        json_patch::patch(&mut doc, &first).unwrap();

        let patched: Pod = serde_json::from_value(doc).unwrap();
        assert!(patched.spec.as_ref().unwrap().containers[0].lifecycle.is_some());
        assert!(patched.spec.as_ref().unwrap().containers[1].lifecycle.is_none());
        assert!(build_patch(&patched, &hook).unwrap().is_none());
    }

    #[test]
    fn test_custom_hook() {
        let hook = PreStopHook {
            container_name: "envoy".to_string(),
            sleep_seconds: 20,
            shell: "/bin/sh".to_string(),
        };
        let lifecycle = prestop_lifecycle(&hook);
        assert_eq!(
            serde_json::to_value(lifecycle).unwrap(),
            json!({"preStop": {"exec": {"command": ["/bin/sh", "-c", "sleep 20"]}}})
        );

        let pod = pod(json!([{"name": "linkerd-proxy"}, {"name": "envoy"}]));
        assert_eq!(eligible_containers(&pod, &hook), vec![1]);
    }

    #[test]
    fn test_pod_from_object_rejects_bad_containers() {
        let object: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web"},
            "spec": {"containers": "not-a-list"}
        }))
        .unwrap();
        let err = pod_from_object(&object).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
