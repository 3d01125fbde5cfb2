//! Demo scenario: a small cluster with half its nodes cordoned, two pods
//! whose name digits steer the NodeNumber plugin, and a final report of the
//! observed assignments.

use k8s_openapi::api::core::v1::{Container, Node, NodeSpec, Pod, PodSpec};
use std::sync::Arc;
use std::time::Duration;
use stratus_apiserver::handlers::common::{create_resource, get_resource};
use stratus_apiserver::AppState;
use stratus_core::{GroupVersionKind, ResourceKey};
use tracing::info;

fn make_node(name: &str, unschedulable: bool) -> Node {
    Node {
        metadata: stratus_core::ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            unschedulable: Some(unschedulable),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn make_pod(name: &str) -> Pod {
    Pod {
        metadata: stratus_core::ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "container1".to_string(),
                image: Some("registry.k8s.io/pause:3.9".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub async fn run(state: &Arc<AppState>) -> miette::Result<()> {
    // node0..node4 are cordoned, node5..node9 accept pods.
    for i in 0..5 {
        create_resource(state, make_node(&format!("node{}", i), true))
            .await
            .map_err(|e| miette::miette!("create node: {:?}", e))?;
    }
    for i in 5..10 {
        create_resource(state, make_node(&format!("node{}", i), false))
            .await
            .map_err(|e| miette::miette!("create node: {:?}", e))?;
    }
    info!("scenario: all nodes created");

    create_resource(state, make_pod("pod1"))
        .await
        .map_err(|e| miette::miette!("create pod: {:?}", e))?;
    info!("scenario: pod1 created");

    create_resource(state, make_pod("pod8"))
        .await
        .map_err(|e| miette::miette!("create pod: {:?}", e))?;
    info!("scenario: pod8 created");

    // Leave room for scheduling plus the permit delays.
    tokio::time::sleep(Duration::from_secs(12)).await;

    let gvk = GroupVersionKind::from_api_version_kind("v1", "Pod");
    for name in ["pod1", "pod8"] {
        let key = ResourceKey::new(gvk.clone(), "default", name);
        let pod: Pod = get_resource(state, &key)
            .await
            .map_err(|e| miette::miette!("get pod: {:?}", e))?;
        let assigned = pod
            .spec
            .as_ref()
            .and_then(|s| s.node_name.as_deref())
            .unwrap_or("<unassigned>");
        info!("scenario: {} is bound to {}", name, assigned);
    }

    Ok(())
}
