use std::{collections::BTreeMap, path::{Path, PathBuf}, sync::RwLock};

use anyhow::{anyhow, Context};
use log::{debug, error, trace};

use crate::store::PreferenceStore;

/// A `PreferenceStore` persisting all entries as one JSON object in a file.
///
/// The file is read once when the store is opened; every mutation rewrites
/// it through a temporary file next to it.
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, anyhow::Error> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(raw) => match serde_json::from_slice::<BTreeMap<String, String>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    let broken = Self::broken_path(&path);
                    error!("broken preferences file {} cannot be deserialized ({e}), moving it to {} and starting empty",
                        path.display(), broken.display());
                    std::fs::rename(&path, &broken)
                        .with_context(|| format!("moving {} aside", path.display()))?;
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no preferences file at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(e).with_context(|| format!("reading preferences from {}", path.display())),
        };
        Ok(Self { path, entries: RwLock::new(entries) })
    }

    /// `preferences.json` -> `preferences.json.broken`
    fn broken_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".broken");
        path.with_file_name(name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), anyhow::Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        trace!("persisted {} preferences to {}", entries.len(), self.path.display());
        Ok(())
    }

    fn update<F>(&self, f: F) -> Result<(), anyhow::Error>
    where F: FnOnce(&mut BTreeMap<String, String>)
    {
        let mut entries = self.entries.write().map_err(|_| anyhow!("file store lock poisoned"))?;
        let mut updated = entries.clone();
        f(&mut updated);
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }
}

impl PreferenceStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let entries = self.entries.read().map_err(|_| anyhow!("file store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), anyhow::Error> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        self.update(|entries| {
            entries.remove(key);
        })
    }

    fn snapshot(&self) -> Result<BTreeMap<String, String>, anyhow::Error> {
        let entries = self.entries.read().map_err(|_| anyhow!("file store lock poisoned"))?;
        Ok(entries.clone())
    }

    fn clear(&self) -> Result<(), anyhow::Error> {
        self.update(BTreeMap::clear)
    }
}
