use crate::{ApiError, AppState, Result};
use serde::Serialize;
use stratus_core::{Resource, ResourceEvent, ResourceKey, ResourceVersion, WatchEventType};
use tracing::{debug, info};
use uuid::Uuid;

/// Prefix for scans: `{api_version}/{kind}/` or `{api_version}/{kind}/{ns}/`.
pub fn store_prefix(api_version: &str, kind: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) => format!("{}/{}/{}/", api_version, kind, ns),
        None => format!("{}/{}/", api_version, kind),
    }
}

/// Get a resource from the store
pub async fn get_resource<T: Resource>(state: &AppState, key: &ResourceKey) -> Result<T> {
    debug!("Getting resource: {}", key);

    let data = state
        .store
        .get(&key.storage_key())
        .ok_or_else(|| ApiError::NotFound(format!("Resource not found: {}", key)))?;

    let resource: T = serde_json::from_slice(&data)?;
    Ok(resource)
}

/// Create a resource: assign UID and resource version, store it, and publish
/// an ADDED event on the bus.
pub async fn create_resource<T: Resource>(state: &AppState, mut resource: T) -> Result<T> {
    let key = resource
        .resource_key()
        .map_err(ApiError::from)?;

    info!("Creating resource: {}", key);

    let storage_key = key.storage_key();
    if state.store.exists(&storage_key) {
        return Err(ApiError::AlreadyExists(format!(
            "Resource already exists: {}",
            key
        )));
    }

    let version = state.next_resource_version();
    resource.set_uid(Uuid::new_v4().to_string());
    resource.set_resource_version(ResourceVersion::new(version.clone()));

    let data = serde_json::to_vec(&resource)?;
    state.store.put(&storage_key, data);

    let object = serde_json::to_value(&resource)?;
    let _ = state.event_tx.send(ResourceEvent::new(
        WatchEventType::Added,
        key.clone(),
        object,
        version.clone(),
    ));

    info!("Created resource: {} with version {}", key, version);
    Ok(resource)
}

/// Update a resource: bump the resource version, store it, and publish a
/// MODIFIED event on the bus.
pub async fn update_resource<T: Resource>(state: &AppState, mut resource: T) -> Result<T> {
    let key = resource
        .resource_key()
        .map_err(ApiError::from)?;

    info!("Updating resource: {}", key);

    let storage_key = key.storage_key();
    if !state.store.exists(&storage_key) {
        return Err(ApiError::NotFound(format!("Resource not found: {}", key)));
    }

    let version = state.next_resource_version();
    resource.set_resource_version(ResourceVersion::new(version.clone()));

    let data = serde_json::to_vec(&resource)?;
    state.store.put(&storage_key, data);

    let object = serde_json::to_value(&resource)?;
    let _ = state.event_tx.send(ResourceEvent::new(
        WatchEventType::Modified,
        key.clone(),
        object,
        version.clone(),
    ));

    info!("Updated resource: {} with version {}", key, version);
    Ok(resource)
}

/// Delete a resource and publish a DELETED event on the bus.
pub async fn delete_resource(state: &AppState, key: &ResourceKey) -> Result<()> {
    info!("Deleting resource: {}", key);

    let storage_key = key.storage_key();
    let data = state
        .store
        .get(&storage_key)
        .ok_or_else(|| ApiError::NotFound(format!("Resource not found: {}", key)))?;

    state.store.delete(&storage_key);

    let object: serde_json::Value = serde_json::from_slice(&data)?;
    let version = state.next_resource_version();
    let _ = state.event_tx.send(ResourceEvent::new(
        WatchEventType::Deleted,
        key.clone(),
        object,
        version,
    ));

    Ok(())
}

/// List resources under a storage prefix
pub async fn list_resources<T: Resource>(state: &AppState, prefix: &str) -> Result<Vec<T>> {
    debug!("Listing resources with prefix: {}", prefix);

    let results = state.store.scan(prefix);

    let mut resources = Vec::new();
    for (_key, data) in results.iter() {
        let resource: T = serde_json::from_slice(data)?;
        resources.push(resource);
    }

    debug!("Found {} resources", resources.len());
    Ok(resources)
}

/// List response wrapper
#[derive(Serialize)]
pub struct ListResponse<T: Serialize> {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub items: Vec<T>,
    pub metadata: ListMetadata,
}

/// List metadata
#[derive(Serialize)]
pub struct ListMetadata {
    #[serde(rename = "resourceVersion")]
    pub resource_version: String,
}

impl<T: Serialize> ListResponse<T> {
    pub fn new(api_version: String, kind: String, items: Vec<T>, resource_version: String) -> Self {
        Self {
            api_version,
            kind,
            items,
            metadata: ListMetadata { resource_version },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use stratus_core::{GroupVersionKind, Pod, WatchEventType};

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

    #[tokio::test]
    async fn test_create_assigns_uid_and_version() {
        let state = make_state();

        let created = create_resource(&state, make_test_pod("nginx", "default"))
            .await
            .unwrap();

        assert!(created.metadata.uid.is_some());
        assert!(created.resource_version().is_some());
    }

    #[tokio::test]
    async fn test_create_duplicate_conflicts() {
        let state = make_state();

        create_resource(&state, make_test_pod("nginx", "default"))
            .await
            .unwrap();
        let err = create_resource(&state, make_test_pod("nginx", "default"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let state = make_state();
        create_resource(&state, make_test_pod("nginx", "default"))
            .await
            .unwrap();

        let gvk = GroupVersionKind::from_api_version_kind("v1", "Pod");
        let key = ResourceKey::new(gvk, "default", "nginx");
        let pod: Pod = get_resource(&state, &key).await.unwrap();

        assert_eq!(pod.metadata.name.as_deref(), Some("nginx"));
    }

    #[tokio::test]
    async fn test_list_scopes_by_namespace() {
        let state = make_state();
        create_resource(&state, make_test_pod("a", "ns1")).await.unwrap();
        create_resource(&state, make_test_pod("b", "ns1")).await.unwrap();
        create_resource(&state, make_test_pod("c", "ns2")).await.unwrap();

        let ns1: Vec<Pod> = list_resources(&state, &store_prefix("v1", "Pod", Some("ns1")))
            .await
            .unwrap();
        assert_eq!(ns1.len(), 2);

        let all: Vec<Pod> = list_resources(&state, &store_prefix("v1", "Pod", None))
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_update_publishes_modified_event() {
        let state = make_state();
        let created = create_resource(&state, make_test_pod("nginx", "default"))
            .await
            .unwrap();

        let mut rx = state.subscribe();
        update_resource(&state, created).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event.event_type, WatchEventType::Modified));
        assert_eq!(event.resource_key.name, "nginx");
    }

    #[tokio::test]
    async fn test_delete_publishes_deleted_event() {
        let state = make_state();
        create_resource(&state, make_test_pod("nginx", "default"))
            .await
            .unwrap();

        let mut rx = state.subscribe();
        let gvk = GroupVersionKind::from_api_version_kind("v1", "Pod");
        let key = ResourceKey::new(gvk, "default", "nginx");
        delete_resource(&state, &key).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event.event_type, WatchEventType::Deleted));
    }
}
