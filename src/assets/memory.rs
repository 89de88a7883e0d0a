//! In-memory asset store for tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::AssetStore;
use crate::database::Upload;
use crate::error::AssetError;

#[derive(Debug, Default)]
struct State {
    files: Mutex<HashMap<String, Vec<u8>>>,
    deleted: Mutex<Vec<String>>,
    counter: AtomicU64,
    fail_deletes: AtomicBool,
}

/// Asset store keeping files in a map and recording every deletion.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetStore {
    state: Arc<State>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.state.files.lock().contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.state.files.lock().len()
    }

    /// Every reference a delete succeeded on, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.state.deleted.lock().clone()
    }

    /// Make deletions fail with an I/O error.
    pub fn fail_deletes(&self, fail: bool) {
        self.state.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn upload(
        &self,
        upload: &Upload,
        folder: &str,
        previous: Option<&str>,
    ) -> Result<String, AssetError> {
        let n = self.state.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let reference = match upload.extension() {
            Some(ext) => format!("/memory/{folder}/{n}.{ext}"),
            None => format!("/memory/{folder}/{n}"),
        };
        self.state.files.lock().insert(reference.clone(), upload.bytes.clone());

        if let Some(previous) = previous {
            self.delete_by_reference(previous).await?;
        }
        Ok(reference)
    }

    async fn delete_by_reference(&self, reference: &str) -> Result<bool, AssetError> {
        if self.state.fail_deletes.load(Ordering::SeqCst) {
            return Err(AssetError::Io(std::io::Error::other("delete refused")));
        }

        let removed = self.state.files.lock().remove(reference).is_some();
        if removed {
            self.state.deleted.lock().push(reference.to_string());
        }
        Ok(removed)
    }
}
