// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for prestop-injector.
//!
//! Uses proptest to generate random Pods and bodies and verify invariants.

#[path = "../common/mod.rs"]
mod common;

use proptest::prelude::*;

use prestop_injector::PreStopHook;
use prestop_injector::webhooks::prestop::{build_patch, eligible_containers};
use prestop_injector::webhooks::{Outcome, process};

use common::fixtures::{PodBuilder, pod_document, review_body};

const TARGET: &str = "linkerd-proxy";

/// A container slot: (name, already has lifecycle)
fn any_container() -> impl Strategy<Value = (String, bool)> {
    let name = prop_oneof![
        3 => Just(TARGET.to_string()),
        1 => Just("linkerd-init".to_string()),
        1 => Just("Linkerd-Proxy".to_string()),
        2 => "[a-z][a-z0-9-]{0,15}",
    ];
    (name, any::<bool>())
}

fn any_pod() -> impl Strategy<Value = Vec<(String, bool)>> {
    prop::collection::vec(any_container(), 0..8)
}

fn build_pod(containers: &[(String, bool)]) -> k8s_openapi::api::core::v1::Pod {
    containers
        .iter()
        .fold(PodBuilder::new("web"), |builder, (name, has_lifecycle)| {
            if *has_lifecycle {
                builder.container_with_lifecycle(name)
            } else {
                builder.container(name)
            }
        })
        .build()
}

fn expected_indices(containers: &[(String, bool)]) -> Vec<usize> {
    containers
        .iter()
        .enumerate()
        .filter(|(_, (name, has_lifecycle))| name == TARGET && !has_lifecycle)
        .map(|(index, _)| index)
        .collect()
}

proptest! {
    /// Exactly the unhooked target containers are selected, in order.
    #[test]
    fn selects_only_unhooked_targets(containers in any_pod()) {
        let pod = build_pod(&containers);
        prop_assert_eq!(
            eligible_containers(&pod, &PreStopHook::default()),
            expected_indices(&containers)
        );
    }

    /// Patch paths address each selected container by its own index.
    #[test]
    fn patch_paths_match_indices(containers in any_pod()) {
        let pod = build_pod(&containers);
        let expected = expected_indices(&containers);

        match build_patch(&pod, &PreStopHook::default()).unwrap() {
            None => prop_assert!(expected.is_empty()),
            Some(patch) => {
                let value = serde_json::to_value(&patch).unwrap();
                let paths: Vec<String> = value
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|op| op["path"].as_str().unwrap().to_string())
                    .collect();
                let wanted: Vec<String> = expected
                    .iter()
                    .map(|i| format!("/spec/containers/{i}/lifecycle"))
                    .collect();
                prop_assert_eq!(paths, wanted);
            }
        }
    }

    /// Applying the patch and running again yields no patch.
    #[test]
    fn second_run_is_a_no_op(containers in any_pod()) {
        let pod = build_pod(&containers);
        let hook = PreStopHook::default();

        let mut doc = pod_document(&pod);
        if let Some(patch) = build_patch(&pod, &hook).unwrap() {
            json_patch::patch(&mut doc, &patch).unwrap();
        }

        let patched = serde_json::from_value(doc).unwrap();
        prop_assert!(build_patch(&patched, &hook).unwrap().is_none());
    }

    /// The response UID always echoes the request UID.
    #[test]
    fn response_uid_echoes_request(uid in "[a-f0-9-]{1,36}", containers in any_pod()) {
        let pod = build_pod(&containers);
        let decision = process(&review_body(&uid, &pod), &PreStopHook::default());

        let response = decision.review.response.unwrap();
        prop_assert_eq!(response.uid, uid);
        prop_assert!(response.allowed);
        prop_assert_eq!(response.patch.is_some(), !expected_indices(&containers).is_empty());
    }

    /// Arbitrary bytes never panic and never produce an allowed decision.
    #[test]
    fn arbitrary_bytes_are_denied(body in prop::collection::vec(any::<u8>(), 1..256)) {
        let decision = process(&body, &PreStopHook::default());
        prop_assert_eq!(decision.outcome, Outcome::Denied);

        let response = decision.review.response.unwrap();
        prop_assert!(!response.allowed);
        prop_assert!(!response.result.message.is_empty());
    }
}
