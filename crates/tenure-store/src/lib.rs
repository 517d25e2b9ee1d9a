use std::fs;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode store: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One flat keyed registry kept in a single JSON file.
///
/// The whole value is rewritten on every save. Writes land in a sibling
/// `.tmp` file first and are renamed over the target, so readers only ever
/// see a complete document.
pub struct JsonFile<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the registry. A missing or unparsable file yields an empty one.
    pub fn load(&self) -> T {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No store at {}, starting fresh", self.path.display());
                return T::default();
            }
            Err(e) => {
                warn!("Could not read {}: {}; starting fresh", self.path.display(), e);
                return T::default();
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(value) => {
                info!("Loaded store from {}", self.path.display());
                value
            }
            Err(e) => {
                warn!("Store at {} is unparsable ({}); starting fresh", self.path.display(), e);
                T::default()
            }
        }
    }

    pub fn save(&self, value: &T) -> Result<(), PersistenceError> {
        let encoded = serde_json::to_vec_pretty(value)?;
        let tmp = self.tmp_path();

        let write = || -> io::Result<()> {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        };

        write().map_err(|source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        })?;

        debug!("Saved {} bytes to {}", encoded.len(), self.path.display());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    type Registry = BTreeMap<String, u32>;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonFile<Registry> = JsonFile::new(dir.path().join("absent.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, b"{ not json").unwrap();

        let store: JsonFile<Registry> = JsonFile::new(&path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn save_then_load_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonFile<Registry> = JsonFile::new(dir.path().join("nested/reg.json"));

        let mut reg = Registry::new();
        reg.insert("a".into(), 1);
        reg.insert("b".into(), 2);
        store.save(&reg).unwrap();

        assert_eq!(store.load(), reg);
        assert!(!dir.path().join("nested/reg.json.tmp").exists());
    }

    #[test]
    fn save_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonFile<Registry> = JsonFile::new(dir.path().join("reg.json"));

        store.save(&Registry::from([("old".to_string(), 1)])).unwrap();
        store.save(&Registry::from([("new".to_string(), 2)])).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("new"), Some(&2));
    }

    #[test]
    fn unwritable_target_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory in the way of the target file makes the rename fail.
        let path = dir.path().join("taken");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("child"), b"x").unwrap();

        let store: JsonFile<Registry> = JsonFile::new(&path);
        let err = store.save(&Registry::new()).unwrap_err();
        assert!(matches!(err, PersistenceError::Io { .. }));
    }
}
