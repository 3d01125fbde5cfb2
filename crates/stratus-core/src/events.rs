use crate::types::{GroupVersionKind, ResourceKey};
use serde::{Deserialize, Serialize};

/// What happened to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
    Error,
}

/// A mutation observed on a stored resource. The API server publishes one of
/// these per write; watch streams and the scheduler's event handlers consume
/// them. The resource kind is carried by the key rather than duplicated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEvent {
    /// ADDED, MODIFIED or DELETED
    pub event_type: WatchEventType,
    /// Key of the mutated resource (gvk + namespace + name)
    pub resource_key: ResourceKey,
    /// The resource as stored, serialized
    pub object: serde_json::Value,
    /// Resource version after the mutation
    pub resource_version: String,
}

impl ResourceEvent {
    pub fn new(
        event_type: WatchEventType,
        resource_key: ResourceKey,
        object: serde_json::Value,
        resource_version: String,
    ) -> Self {
        Self {
            event_type,
            resource_key,
            object,
            resource_version,
        }
    }

    /// Kind of the mutated resource ("Pod", "Node").
    pub fn kind(&self) -> &str {
        &self.resource_key.gvk.kind
    }

    /// GroupVersionKind of the mutated resource.
    pub fn gvk(&self) -> &GroupVersionKind {
        &self.resource_key.gvk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_comes_from_the_key() {
        let gvk = GroupVersionKind::from_api_version_kind("v1", "Pod");
        let key = ResourceKey::new(gvk.clone(), "default", "nginx");
        let event = ResourceEvent::new(
            WatchEventType::Added,
            key,
            serde_json::json!({}),
            "1".to_string(),
        );

        assert_eq!(event.kind(), "Pod");
        assert_eq!(event.gvk(), &gvk);
    }

    #[test]
    fn test_event_type_wire_format_is_uppercase() {
        let serialized = serde_json::to_string(&WatchEventType::Modified).unwrap();
        assert_eq!(serialized, "\"MODIFIED\"");

        let parsed: WatchEventType = serde_json::from_str("\"DELETED\"").unwrap();
        assert_eq!(parsed, WatchEventType::Deleted);
    }
}
