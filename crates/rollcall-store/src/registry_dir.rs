//! Registry persistence: `<dir>/<name>_embedding.json`, one file per identity.

use crate::error::StoreError;
use chrono::{SecondsFormat, Utc};
use rollcall_core::{Embedding, Identity, Registry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENTRY_SUFFIX: &str = "_embedding.json";

/// On-disk form of one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    pub embedding: Vec<f32>,
    /// Absent in files written before scheme tagging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degenerate: bool,
}

impl RegistryEntry {
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            name: identity.name.clone(),
            embedding: identity.embedding.values.clone(),
            scheme: identity.embedding.scheme.clone(),
            saved_at: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            degenerate: identity.embedding.degenerate,
        }
    }

    /// Files written without the `degenerate` field are flagged when their
    /// vector has zero norm.
    pub fn into_identity(self) -> Result<Identity, StoreError> {
        let name = self.name.clone();
        let mut embedding = Embedding {
            values: self.embedding,
            scheme: self.scheme,
            degenerate: self.degenerate,
        };
        embedding.degenerate |= embedding.norm() == 0.0;
        Identity::new(&self.name, embedding).map_err(|_| StoreError::InvalidName(name))
    }
}

/// Directory of registry entries.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    dir: PathBuf,
}

impl RegistryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry file for `name`. Names that could escape the
    /// directory are rejected.
    pub fn entry_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        let name = name.trim();
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\', '\0'])
        {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{name}{ENTRY_SUFFIX}")))
    }

    /// Stored identity names, sorted. A missing directory is an empty registry.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir)(e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(StoreError::io(&self.dir))?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            if let Some(name) = file_name.strip_suffix(ENTRY_SUFFIX) {
                if !name.is_empty() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Write (or replace) an identity. The file is written beside its final
    /// name and renamed into place, so readers see the old or the new entry.
    pub fn save(&self, identity: &Identity) -> Result<PathBuf, StoreError> {
        let path = self.entry_path(&identity.name)?;
        std::fs::create_dir_all(&self.dir).map_err(StoreError::io(&self.dir))?;

        let entry = RegistryEntry::from_identity(identity);
        let json = serde_json::to_vec_pretty(&entry).map_err(StoreError::json(&path))?;

        let tmp = self.dir.join(format!(".{}{ENTRY_SUFFIX}.tmp", identity.name));
        std::fs::write(&tmp, json).map_err(StoreError::io(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(StoreError::io(&path))?;

        tracing::info!(name = %identity.name, path = %path.display(), dim = identity.embedding.dim(), "registry entry saved");
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<Identity, StoreError> {
        let path = self.entry_path(name)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => return Err(StoreError::io(&path)(e)),
        };
        let entry: RegistryEntry = serde_json::from_slice(&bytes).map_err(StoreError::json(&path))?;
        if entry.name.trim() != name.trim() {
            return Err(StoreError::NameMismatch {
                path,
                expected: name.trim().to_string(),
                stored: entry.name,
            });
        }
        entry.into_identity()
    }

    /// Load every entry. A corrupt or misnamed entry fails the whole load
    /// rather than silently dropping an identity.
    pub fn load_all(&self) -> Result<Registry, StoreError> {
        let mut registry = Registry::new();
        for name in self.list()? {
            registry.insert(self.load(&name)?);
        }
        tracing::info!(dir = %self.dir.display(), identities = registry.len(), "registry loaded");
        Ok(registry)
    }

    pub fn remove(&self, name: &str) -> Result<(), StoreError> {
        let path = self.entry_path(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(name, path = %path.display(), "registry entry removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(name.to_string())),
            Err(e) => Err(StoreError::io(&path)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str, values: &[f32]) -> Identity {
        Identity::new(name, Embedding::new(values.to_vec()).with_scheme("mesh-pairs/v1")).unwrap()
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("nope"));
        assert!(store.list().unwrap().is_empty());
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_save_list_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("embeddings"));
        store.save(&identity("Zoe", &[0.0, 1.0])).unwrap();
        let path = store.save(&identity("Aditya", &[0.6, 0.8])).unwrap();
        assert!(path.ends_with("Aditya_embedding.json"));

        assert_eq!(store.list().unwrap(), ["Aditya", "Zoe"]);

        let loaded = store.load("Aditya").unwrap();
        assert_eq!(loaded.embedding.values, vec![0.6, 0.8]);
        assert_eq!(loaded.embedding.scheme.as_deref(), Some("mesh-pairs/v1"));

        let registry = store.load_all().unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["Aditya", "Zoe"]);
    }

    #[test]
    fn test_save_replaces_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path());
        store.save(&identity("a", &[1.0])).unwrap();
        store.save(&identity("a", &[2.0])).unwrap();
        assert_eq!(store.load("a").unwrap().embedding.values, vec![2.0]);
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_legacy_entry_without_scheme() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("person2_embedding.json"),
            r#"{"name": "person2", "embedding": [0.1, 0.2, 0.3], "saved_at": "2024-05-01T10:00:00.123456"}"#,
        )
        .unwrap();
        let store = RegistryStore::new(dir.path());
        let loaded = store.load("person2").unwrap();
        assert_eq!(loaded.embedding.scheme, None);
        assert_eq!(loaded.embedding.dim(), 3);
    }

    #[test]
    fn test_corrupt_entry_fails_load_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path());
        store.save(&identity("good", &[1.0])).unwrap();
        std::fs::write(dir.path().join("bad_embedding.json"), "{not json").unwrap();
        assert!(matches!(store.load_all(), Err(StoreError::Json { .. })));
    }

    #[test]
    fn test_ignores_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path());
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        std::fs::write(dir.path().join(".x_embedding.json"), "{}").unwrap();
        store.save(&identity("a", &[1.0])).unwrap();
        assert_eq!(store.list().unwrap(), ["a"]);
    }

    #[test]
    fn test_degenerate_flag_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path());
        let zero = rollcall_core::aggregate(&[
            Embedding::new(vec![1.0, 0.0]),
            Embedding::new(vec![-1.0, 0.0]),
        ])
        .unwrap();
        assert!(zero.degenerate);
        store.save(&Identity::new("zero", zero).unwrap()).unwrap();
        store.save(&identity("fine", &[0.6, 0.8])).unwrap();

        let registry = store.load_all().unwrap();
        assert!(registry.get("zero").unwrap().embedding.degenerate);
        assert!(!registry.get("fine").unwrap().embedding.degenerate);
    }

    #[test]
    fn test_zero_vector_without_flag_is_degenerate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("blank_embedding.json"),
            r#"{"name": "blank", "embedding": [0.0, 0.0, 0.0]}"#,
        )
        .unwrap();
        let loaded = RegistryStore::new(dir.path()).load("blank").unwrap();
        assert!(loaded.embedding.degenerate);
    }

    #[test]
    fn test_stored_name_must_match_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path());
        store.save(&identity("alice", &[1.0, 0.0])).unwrap();
        std::fs::write(
            dir.path().join("alice2_embedding.json"),
            r#"{"name": "alice", "embedding": [0.0, 1.0]}"#,
        )
        .unwrap();

        assert!(matches!(
            store.load("alice2"),
            Err(StoreError::NameMismatch { ref stored, .. }) if stored == "alice"
        ));
        assert!(matches!(store.load_all(), Err(StoreError::NameMismatch { .. })));
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path());
        store.save(&identity("a", &[1.0])).unwrap();
        store.remove("a").unwrap();
        assert!(store.list().unwrap().is_empty());
        assert!(matches!(store.remove("a"), Err(StoreError::NotFound(_))));
        assert!(matches!(store.load("a"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_rejects_path_names() {
        let store = RegistryStore::new("/tmp/registry");
        for name in ["", "  ", "../etc", "a/b", ".hidden"] {
            assert!(matches!(store.entry_path(name), Err(StoreError::InvalidName(_))), "{name:?}");
        }
    }
}
