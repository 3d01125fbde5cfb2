use crate::handlers::common::{
    create_resource, delete_resource, get_resource, list_resources, store_prefix, update_resource,
    ListResponse,
};
use crate::response::{json_created, json_ok, status_ok};
use crate::validation::validate_resource;
use crate::watch::{watch_resource_stream, WatchParams};
use crate::{ApiError, AppState, Result};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use stratus_core::{Binding, GroupVersionKind, Pod, ResourceKey};
use tracing::info;

/// GET /api/v1/namespaces/{namespace}/pods/{name}
pub async fn get_pod(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Response> {
    let gvk = GroupVersionKind::from_api_version_kind("v1", "Pod");
    let key = ResourceKey::new(gvk, namespace, name);

    let pod: Pod = get_resource(&state, &key).await?;

    Ok(json_ok(pod))
}

/// GET /api/v1/namespaces/{namespace}/pods
pub async fn list_pods(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
    Query(params): Query<WatchParams>,
) -> Result<Response> {
    if params.is_watch() {
        let gvk = GroupVersionKind::from_api_version_kind("v1", "Pod");
        return Ok(watch_resource_stream(&state, gvk, Some(namespace)).into_response());
    }

    let pods: Vec<Pod> =
        list_resources(&state, &store_prefix("v1", "Pod", Some(&namespace))).await?;

    let response = ListResponse::new(
        "v1".to_string(),
        "PodList".to_string(),
        pods,
        state.next_resource_version(),
    );

    Ok(json_ok(response))
}

/// GET /api/v1/pods (all namespaces)
pub async fn list_all_pods(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WatchParams>,
) -> Result<Response> {
    if params.is_watch() {
        let gvk = GroupVersionKind::from_api_version_kind("v1", "Pod");
        return Ok(watch_resource_stream(&state, gvk, None).into_response());
    }

    let pods: Vec<Pod> = list_resources(&state, &store_prefix("v1", "Pod", None)).await?;

    let response = ListResponse::new(
        "v1".to_string(),
        "PodList".to_string(),
        pods,
        state.next_resource_version(),
    );

    Ok(json_ok(response))
}

/// POST /api/v1/namespaces/{namespace}/pods
pub async fn create_pod(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
    Json(mut pod): Json<Pod>,
) -> Result<Response> {
    info!("Creating pod in namespace: {}", namespace);

    pod.metadata.namespace = Some(namespace.clone());

    validate_resource(&pod)?;

    let created = create_resource(&state, pod).await?;

    Ok(json_created(created))
}

/// DELETE /api/v1/namespaces/{namespace}/pods/{name}
pub async fn delete_pod(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Response> {
    info!("Deleting pod: {}/{}", namespace, name);

    let gvk = GroupVersionKind::from_api_version_kind("v1", "Pod");
    let key = ResourceKey::new(gvk, namespace, name.clone());

    delete_resource(&state, &key).await?;

    Ok(status_ok(format!("pod {} deleted", name)))
}

/// POST /api/v1/namespaces/{namespace}/pods/{name}/binding
pub async fn create_pod_binding(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    Json(mut binding): Json<Binding>,
) -> Result<Response> {
    binding.metadata.namespace = Some(namespace);
    binding.metadata.name = Some(name);

    apply_binding(&state, &binding).await?;

    Ok(status_ok("binding applied"))
}

/// Apply a binding: record the target node on the pod's spec and publish the
/// modification. Shared by the HTTP handler and in-process clients.
pub async fn apply_binding(state: &AppState, binding: &Binding) -> Result<Pod> {
    let namespace = binding
        .metadata
        .namespace
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("binding has no namespace".to_string()))?;
    let name = binding
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("binding has no pod name".to_string()))?;
    let target = binding
        .target
        .name
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("binding has no target node".to_string()))?;

    let gvk = GroupVersionKind::from_api_version_kind("v1", "Pod");
    let key = ResourceKey::new(gvk, namespace, name);

    let mut pod: Pod = get_resource(state, &key).await?;

    let current = pod
        .spec
        .as_ref()
        .and_then(|s| s.node_name.as_deref())
        .unwrap_or("");
    if !current.is_empty() {
        return Err(ApiError::Conflict(format!(
            "pod {}/{} is already bound to {}",
            namespace, name, current
        )));
    }

    pod.spec
        .get_or_insert_with(Default::default)
        .node_name = Some(target.to_string());

    info!("Binding pod {}/{} to node {}", namespace, name, target);
    update_resource(state, pod).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use k8s_openapi::api::core::v1::ObjectReference;
    use stratus_core::{ObjectMeta, WatchEventType};

    fn make_state() -> AppState {
        AppState::new(Arc::new(MemoryStore::new()))
    }

    fn make_test_pod(name: &str, namespace: &str) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some(namespace.to_string());
        pod.spec = Some(Default::default());
        pod.spec.as_mut().unwrap().containers = vec![Default::default()];
        pod
    }

    fn make_binding(name: &str, namespace: &str, node: &str) -> Binding {
        Binding {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            target: ObjectReference {
                kind: Some("Node".to_string()),
                name: Some(node.to_string()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_apply_binding_sets_node_name() {
        let state = make_state();
        create_resource(&state, make_test_pod("pod1", "default"))
            .await
            .unwrap();

        let bound = apply_binding(&state, &make_binding("pod1", "default", "node1"))
            .await
            .unwrap();

        assert_eq!(
            bound.spec.as_ref().unwrap().node_name.as_deref(),
            Some("node1")
        );

        // The assignment is observable through a plain GET.
        let gvk = GroupVersionKind::from_api_version_kind("v1", "Pod");
        let key = ResourceKey::new(gvk, "default", "pod1");
        let fetched: Pod = get_resource(&state, &key).await.unwrap();
        assert_eq!(
            fetched.spec.as_ref().unwrap().node_name.as_deref(),
            Some("node1")
        );
    }

    #[tokio::test]
    async fn test_apply_binding_publishes_modified_event() {
        let state = make_state();
        create_resource(&state, make_test_pod("pod1", "default"))
            .await
            .unwrap();

        let mut rx = state.subscribe();
        apply_binding(&state, &make_binding("pod1", "default", "node1"))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event.event_type, WatchEventType::Modified));
        assert_eq!(event.resource_key.name, "pod1");
    }

    #[tokio::test]
    async fn test_apply_binding_twice_conflicts() {
        let state = make_state();
        create_resource(&state, make_test_pod("pod1", "default"))
            .await
            .unwrap();

        apply_binding(&state, &make_binding("pod1", "default", "node1"))
            .await
            .unwrap();
        let err = apply_binding(&state, &make_binding("pod1", "default", "node2"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_apply_binding_unknown_pod_not_found() {
        let state = make_state();
        let err = apply_binding(&state, &make_binding("ghost", "default", "node1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
