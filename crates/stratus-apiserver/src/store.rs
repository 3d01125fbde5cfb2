use std::collections::BTreeMap;
use std::sync::RwLock;

/// In-memory key-value store backing the API server. Keys are the
/// `{api_version}/{kind}/{namespace}/{name}` encoding of a resource key;
/// ordered storage makes prefix scans cheap.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.read().unwrap().get(key).cloned()
    }

    pub fn put(&self, key: &str, value: Vec<u8>) {
        self.entries.write().unwrap().insert(key.to_string(), value);
    }

    /// Remove a key; returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.write().unwrap().remove(key).is_some()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.entries.read().unwrap().contains_key(key)
    }

    /// All entries whose key starts with `prefix`, in key order.
    pub fn scan(&self, prefix: &str) -> Vec<(String, Vec<u8>)> {
        self.entries
            .read()
            .unwrap()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
