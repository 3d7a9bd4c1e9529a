use super::KeyValueBackend;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Process-local backend. Nothing outlives the process.
#[derive(Default)]
pub struct MemoryBackend {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        let value = items.get(key).cloned();
        debug!(key, hit = value.is_some(), "Memory GET");
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        debug!(key, "Memory SET");
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_get_set() {
        let backend = MemoryBackend::new();

        assert!(backend.get_item("key1").unwrap().is_none());

        backend.set_item("key1", "123").unwrap();
        assert_eq!(backend.get_item("key1").unwrap().as_deref(), Some("123"));

        backend.set_item("key1", "456").unwrap();
        assert_eq!(backend.get_item("key1").unwrap().as_deref(), Some("456"));

        assert!(backend.get_item("key2").unwrap().is_none());
    }
}
