// src/store/mod.rs

//! Metadata store consumed by confd on every node.
//!
//! Keys are `/`-separated paths; values are strings. Production deployments
//! sit on etcd behind [`MetadataStore`]; [`MemoryStore`] is the in-process
//! implementation used for dry runs and tests.

pub mod sync;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::trace;

use crate::BoxFuture;
use crate::errors::{Error, PitrixError};

pub use sync::{SyncHandle, spawn_sync};

/// Key/value store holding the metadata tree.
pub trait MetadataStore: Send + Sync {
    fn put<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a>;

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>>;

    /// Every key under `prefix`, in key order.
    fn get_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, BTreeMap<String, String>>;

    /// Delete `key` and every key below it; returns how many were removed.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, usize>;
}

impl<S: MetadataStore + ?Sized> MetadataStore for Arc<S> {
    fn put<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a> {
        (**self).put(key, value)
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>> {
        (**self).get(key)
    }

    fn get_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, BTreeMap<String, String>> {
        (**self).get_prefix(prefix)
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, usize> {
        (**self).delete(key)
    }
}

/// True when `key` is `prefix` itself or lies below it.
pub fn is_under(key: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    key == prefix
        || key
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the whole store.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner
            .read()
            .map(|map| map.clone())
            .unwrap_or_default()
    }

    fn poisoned() -> PitrixError {
        PitrixError::Other(Error::msg("memory store lock poisoned"))
    }
}

impl MetadataStore for MemoryStore {
    fn put<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFuture<'a> {
        Box::pin(async move {
            trace!(key, value, "store put");
            let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
            map.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            let map = self.inner.read().map_err(|_| Self::poisoned())?;
            Ok(map.get(key).cloned())
        })
    }

    fn get_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, BTreeMap<String, String>> {
        Box::pin(async move {
            let map = self.inner.read().map_err(|_| Self::poisoned())?;
            Ok(map
                .iter()
                .filter(|(k, _)| is_under(k, prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, usize> {
        Box::pin(async move {
            let mut map = self.inner.write().map_err(|_| Self::poisoned())?;
            let before = map.len();
            map.retain(|k, _| !is_under(k, key));
            let removed = before - map.len();
            trace!(key, removed, "store delete");
            Ok(removed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_match_respects_path_segments() {
        assert!(is_under("/clusters/cl-1/hosts", "/clusters/cl-1"));
        assert!(is_under("/clusters/cl-1", "/clusters/cl-1/"));
        assert!(!is_under("/clusters/cl-10/hosts", "/clusters/cl-1"));
    }

    #[tokio::test]
    async fn delete_removes_the_subtree_only() {
        let store = MemoryStore::new();
        store.put("/clusters/cl-1/cluster/app_id", "app-1").await.unwrap();
        store.put("/clusters/cl-1/env/port", "80").await.unwrap();
        store.put("/clusters/cl-10/env/port", "81").await.unwrap();

        let removed = store.delete("/clusters/cl-1").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            store.get("/clusters/cl-10/env/port").await.unwrap().as_deref(),
            Some("81")
        );
        assert!(store.get_prefix("/clusters/cl-1").await.unwrap().is_empty());
    }
}
