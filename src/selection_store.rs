use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tracing::warn;

pub const CURRENT_PROPERTY_KEY: &str = "currentPropertyId";

trait SelectionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn save(&self) -> anyhow::Result<()>;
}

#[derive(Default)]
struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl SelectionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data
            .lock()
            .map(|guard| guard.get(key).cloned())
            .unwrap_or_default()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut guard) = self.data.lock() {
            guard.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut guard) = self.data.lock() {
            guard.remove(key);
        }
    }

    fn save(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Flat JSON object on disk. Loaded once; `save` rewrites the whole file
/// through a temp file in the same directory so readers never see a partial
/// write.
struct FileStore {
    path: PathBuf,
    data: Mutex<HashMap<String, String>>,
}

impl FileStore {
    fn open(path: PathBuf) -> anyhow::Result<Self> {
        let data = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => match serde_json::from_str::<HashMap<String, serde_json::Value>>(&raw) {
                Ok(map) => map
                    .into_iter()
                    .filter_map(|(key, value)| match value {
                        serde_json::Value::String(text) => Some((key, text)),
                        serde_json::Value::Number(number) => Some((key, number.to_string())),
                        _ => None,
                    })
                    .collect(),
                Err(err) => {
                    warn!(
                        target: "propertypal",
                        event = "session_store_corrupt",
                        path = %path.display(),
                        error = %err
                    );
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("read session file {}", path.display()))
            }
        };
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }
}

impl SelectionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    fn save(&self) -> anyhow::Result<()> {
        let snapshot = self
            .data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let dir = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)
            .with_context(|| format!("create session directory {}", dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("create temp file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, &snapshot).context("encode session file")?;
        tmp.write_all(b"\n").context("write session file")?;
        tmp.as_file().sync_all().context("sync session file")?;
        tmp.persist(&self.path)
            .map_err(|err| err.error)
            .with_context(|| format!("replace session file {}", self.path.display()))?;
        Ok(())
    }
}

/// Shared handle to the persisted current-property selection.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<dyn SelectionStore>,
}

impl StoreHandle {
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(MemoryStore::default()),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self {
            inner: Arc::new(FileStore::open(path.into())?),
        })
    }

    pub(crate) fn read_current(&self) -> Option<String> {
        self.inner.get(CURRENT_PROPERTY_KEY)
    }

    pub fn write_current(&self, id: &str) {
        self.inner.set(CURRENT_PROPERTY_KEY, id);
    }

    pub(crate) fn persist(&self) -> anyhow::Result<()> {
        self.inner.save()
    }

    /// Drops the persisted selection, ending its session lifetime.
    pub fn clear(&self) -> anyhow::Result<()> {
        self.inner.remove(CURRENT_PROPERTY_KEY);
        self.inner.save().context("persist cleared selection")
    }

    pub fn snapshot(&self) -> Option<String> {
        self.read_current()
    }
}
