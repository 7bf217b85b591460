//! Known identities and their canonical embeddings.

use crate::embedding::Embedding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("identity name cannot be empty")]
    EmptyName,
}

/// A named person with one canonical embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub embedding: Embedding,
}

impl Identity {
    /// Surrounding whitespace is trimmed; an empty name is rejected.
    pub fn new(name: &str, embedding: Embedding) -> Result<Self, RegistryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        Ok(Self {
            name: name.to_string(),
            embedding,
        })
    }
}

/// Name → identity mapping, iterated in name order.
///
/// Entries are reference counted so that snapshots are cheap and a replaced
/// entry is swapped whole.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: BTreeMap<String, Arc<Identity>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an identity, returning the previous one.
    pub fn insert(&mut self, identity: Identity) -> Option<Arc<Identity>> {
        self.entries.insert(identity.name.clone(), Arc::new(identity))
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<Identity>> {
        self.entries.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Identity> {
        self.entries.get(name).map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.entries.values().map(Arc::as_ref)
    }
}

impl FromIterator<Identity> for Registry {
    fn from_iter<I: IntoIterator<Item = Identity>>(iter: I) -> Self {
        let mut registry = Registry::new();
        for identity in iter {
            registry.insert(identity);
        }
        registry
    }
}

/// Registry shared between matching readers and enrollment writers.
///
/// Writers replace a whole entry under the write lock; readers match against
/// a [`snapshot`](Self::snapshot) and never observe a half-written entry.
#[derive(Debug, Default)]
pub struct SharedRegistry {
    inner: RwLock<Registry>,
}

impl SharedRegistry {
    pub fn new(registry: Registry) -> Self {
        Self {
            inner: RwLock::new(registry),
        }
    }

    pub fn snapshot(&self) -> Registry {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn insert(&self, identity: Identity) -> Option<Arc<Identity>> {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(identity)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Identity>> {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
    }

    /// Swap in a freshly loaded registry.
    pub fn replace(&self, registry: Registry) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = registry;
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
