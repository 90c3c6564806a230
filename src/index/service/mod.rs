//! Shared in-memory handle to the persisted vector index.

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::Result;
use crate::embeddings::EmbeddingProfile;
use crate::index::VectorIndex;

/// Lazily loads the persisted index and shares it between requests.
///
/// Loaded indexes are immutable; installing a fresh build swaps the whole
/// `Arc`, so searches already in flight keep the snapshot they started with.
#[derive(Debug)]
pub struct IndexService {
    state: RwLock<Option<Arc<VectorIndex>>>,
    init_lock: Mutex<()>,
    index_path: PathBuf,
    profile: EmbeddingProfile,
}

impl IndexService {
    #[inline]
    pub fn new(index_path: PathBuf, profile: EmbeddingProfile) -> Self {
        Self {
            state: RwLock::new(None),
            init_lock: Mutex::new(()),
            index_path,
            profile,
        }
    }

    /// Path of the persisted index file backing this service.
    #[inline]
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Returns the active index without touching the disk.
    #[inline]
    pub async fn snapshot(&self) -> Option<Arc<VectorIndex>> {
        let state = self.state.read().await;
        state.clone()
    }

    #[inline]
    pub async fn is_loaded(&self) -> bool {
        let state = self.state.read().await;
        state.is_some()
    }

    /// Returns the active index, reading it from disk on first use.
    ///
    /// An index installed while the disk read is in flight stays live; the
    /// loaded file contents are discarded as superseded.
    #[inline]
    pub async fn ensure_loaded(&self) -> Result<Arc<VectorIndex>> {
        if let Some(index) = self.snapshot().await {
            return Ok(index);
        }

        let _guard = self.init_lock.lock().await;
        // Another caller may have finished loading while we waited.
        if let Some(index) = self.snapshot().await {
            return Ok(index);
        }

        let path = self.index_path.clone();
        let profile = self.profile.clone();
        let index = tokio::task::spawn_blocking(move || VectorIndex::load(&path, &profile))
            .await
            .context("Index load task failed")??;
        let index = Arc::new(index);

        let mut state = self.state.write().await;
        // An install that finished during the read wins.
        if let Some(installed) = state.as_ref() {
            return Ok(Arc::clone(installed));
        }
        *state = Some(Arc::clone(&index));
        info!("Loaded persisted index with {} chunks", index.len());

        Ok(index)
    }

    /// Makes a freshly built index the active one.
    #[inline]
    pub async fn install(&self, index: VectorIndex) -> Arc<VectorIndex> {
        let index = Arc::new(index);
        let mut state = self.state.write().await;
        *state = Some(Arc::clone(&index));
        debug!("Installed in-memory index with {} chunks", index.len());
        index
    }
}
