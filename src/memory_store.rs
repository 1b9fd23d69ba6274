use std::{sync::{Arc, RwLock}, collections::BTreeMap};

use crate::store::PreferenceStore;

use anyhow::anyhow;

/// A `PreferenceStore` implementation backed by a map. Nothing is persisted.
#[derive(Default, Clone)]
pub struct MemoryStore {
    store: Arc<RwLock<BTreeMap<String,String>>>
}
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let store = self.store.read().map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(store.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), anyhow::Error> {
        self.store.write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        self.store.write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?
            .remove(key);
        Ok(())
    }

    fn snapshot(&self) -> Result<BTreeMap<String, String>, anyhow::Error> {
        let store = self.store.read().map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(store.clone())
    }

    fn clear(&self) -> Result<(), anyhow::Error> {
        self.store.write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_entries() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.set("EZBetaFeatureKey", "1").unwrap();
        assert_eq!(other.get("EZBetaFeatureKey").unwrap().as_deref(), Some("1"));

        other.delete("EZBetaFeatureKey").unwrap();
        assert_eq!(store.get("EZBetaFeatureKey").unwrap(), None);
    }
}
