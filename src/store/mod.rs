use std::collections::BTreeMap;

/// Define an abstract preference store using `str` keys and string values,
/// the equivalent of a user defaults database.
///
/// The goal is to decouple the storage (memory, JSON file) from the places
/// where it's used (the URL scheme parser).
pub trait PreferenceStore: Send + Sync {
    /// Returns `Ok(None)` when no entry exists for `key`.
    fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error>;
    fn set(&self, key: &str, value: &str) -> Result<(), anyhow::Error>;
    fn delete(&self, key: &str) -> Result<(), anyhow::Error>;

    /// All entries, ordered by key.
    fn snapshot(&self) -> Result<BTreeMap<String, String>, anyhow::Error>;

    /// Removes every entry.
    fn clear(&self) -> Result<(), anyhow::Error>;
}

impl<S> PreferenceStore for std::sync::Arc<S>
where S: PreferenceStore + ?Sized
{
    fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), anyhow::Error> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        (**self).delete(key)
    }

    fn snapshot(&self) -> Result<BTreeMap<String, String>, anyhow::Error> {
        (**self).snapshot()
    }

    fn clear(&self) -> Result<(), anyhow::Error> {
        (**self).clear()
    }
}
