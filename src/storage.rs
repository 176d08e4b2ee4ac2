//! Object storage access for dataset snapshots and image objects.

mod s3;

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use log::debug;
use tokio::sync::RwLock;

pub use s3::S3ObjectStore;

/// Read access to a bucket of named objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the object stored under `key`.
    ///
    /// Every failure (missing object, network error, unreadable body) yields
    /// `None`; callers treat it as "unavailable" without distinguishing cause.
    async fn fetch(&self, key: &str) -> Option<Vec<u8>>;
}

/// Shared store handle used by the dataset and image layers.
pub type SharedObjectStore = Arc<dyn ObjectStore>;

/// Object store held entirely in memory. Used by tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.objects.write().await.insert(key.into(), bytes.into());
    }

    pub async fn remove(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.write().await.remove(key)
    }

    /// Number of `fetch` calls served so far, hits and misses alike.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch(&self, key: &str) -> Option<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let found = self.objects.read().await.get(key).cloned();
        if found.is_none() {
            debug!("Object {key} not found in memory store");
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_returns_stored_bytes() {
        let store = MemoryObjectStore::new();
        store.insert("jp.db", b"snapshot".to_vec()).await;

        assert_eq!(store.fetch("jp.db").await.as_deref(), Some(&b"snapshot"[..]));
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn missing_and_removed_objects_are_unavailable() {
        let store = MemoryObjectStore::new();
        store.insert("jp-1-image1.png", vec![1, 2, 3]).await;
        assert!(store.remove("jp-1-image1.png").await.is_some());

        assert!(store.fetch("jp-1-image1.png").await.is_none());
        assert!(store.fetch("fr.db").await.is_none());
        assert_eq!(store.fetch_count(), 2);
    }
}
