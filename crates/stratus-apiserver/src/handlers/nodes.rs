use crate::handlers::common::{
    create_resource, delete_resource, get_resource, list_resources, store_prefix, update_resource,
    ListResponse,
};
use crate::response::{json_created, json_ok, status_ok};
use crate::validation::validate_resource;
use crate::watch::{watch_resource_stream, WatchParams};
use crate::{AppState, Result};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use stratus_core::{GroupVersionKind, Node, ResourceKey};
use tracing::info;

/// GET /api/v1/nodes/{name}
pub async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response> {
    let gvk = GroupVersionKind::from_api_version_kind("v1", "Node");
    let key = ResourceKey::cluster_scoped(gvk, name);

    let node: Node = get_resource(&state, &key).await?;

    Ok(json_ok(node))
}

/// GET /api/v1/nodes
pub async fn list_nodes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WatchParams>,
) -> Result<Response> {
    if params.is_watch() {
        let gvk = GroupVersionKind::from_api_version_kind("v1", "Node");
        return Ok(watch_resource_stream(&state, gvk, None).into_response());
    }

    let nodes: Vec<Node> = list_resources(&state, &store_prefix("v1", "Node", None)).await?;

    let response = ListResponse::new(
        "v1".to_string(),
        "NodeList".to_string(),
        nodes,
        state.next_resource_version(),
    );

    Ok(json_ok(response))
}

/// POST /api/v1/nodes
pub async fn create_node(
    State(state): State<Arc<AppState>>,
    Json(node): Json<Node>,
) -> Result<Response> {
    info!(
        "Creating node: {}",
        node.metadata.name.as_deref().unwrap_or("")
    );

    validate_resource(&node)?;

    let created = create_resource(&state, node).await?;

    Ok(json_created(created))
}

/// PUT /api/v1/nodes/{name}
pub async fn replace_node(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(mut node): Json<Node>,
) -> Result<Response> {
    info!("Replacing node: {}", name);

    node.metadata.name = Some(name);

    validate_resource(&node)?;

    let updated = update_resource(&state, node).await?;

    Ok(json_ok(updated))
}

/// DELETE /api/v1/nodes/{name}
pub async fn delete_node(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response> {
    info!("Deleting node: {}", name);

    let gvk = GroupVersionKind::from_api_version_kind("v1", "Node");
    let key = ResourceKey::cluster_scoped(gvk, name.clone());

    delete_resource(&state, &key).await?;

    Ok(status_ok(format!("node {} deleted", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn make_state() -> AppState {
        AppState::new(Arc::new(MemoryStore::new()))
    }

    fn make_test_node(name: &str) -> Node {
        let mut node = Node::default();
        node.metadata.name = Some(name.to_string());
        node
    }

    #[tokio::test]
    async fn test_create_and_list_nodes() {
        let state = make_state();
        for i in 0..3 {
            create_resource(&state, make_test_node(&format!("node{}", i)))
                .await
                .unwrap();
        }

        let nodes: Vec<Node> = list_resources(&state, &store_prefix("v1", "Node", None))
            .await
            .unwrap();
        assert_eq!(nodes.len(), 3);
    }

    #[tokio::test]
    async fn test_node_update_round_trip() {
        let state = make_state();
        create_resource(&state, make_test_node("node1")).await.unwrap();

        let mut node = make_test_node("node1");
        node.spec = Some(Default::default());
        node.spec.as_mut().unwrap().unschedulable = Some(true);
        update_resource(&state, node).await.unwrap();

        let gvk = GroupVersionKind::from_api_version_kind("v1", "Node");
        let key = ResourceKey::cluster_scoped(gvk, "node1");
        let fetched: Node = get_resource(&state, &key).await.unwrap();
        assert_eq!(fetched.spec.unwrap().unschedulable, Some(true));
    }
}
