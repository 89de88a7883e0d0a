//! Filesystem asset store.
//!
//! Files live under `root/<folder>/<uuid>.<ext>` and are referenced by
//! `base_url/<folder>/<uuid>.<ext>`.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use super::AssetStore;
use crate::database::Upload;
use crate::error::AssetError;

/// Asset store writing to a local directory.
#[derive(Debug, Clone)]
pub struct LocalAssetStore {
    root: PathBuf,
    base_url: String,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Map a reference back to a path under `root`.
    fn resolve(&self, reference: &str) -> Result<PathBuf, AssetError> {
        let relative = reference
            .strip_prefix(&self.base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| AssetError::ForeignReference(reference.to_string()))?;

        let relative = Path::new(relative);
        let is_plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(AssetError::ForeignReference(reference.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn upload(
        &self,
        upload: &Upload,
        folder: &str,
        previous: Option<&str>,
    ) -> Result<String, AssetError> {
        let folder = folder.trim_matches('/');
        let file_name = match upload.extension() {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };

        let dir = self.root.join(folder);
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(&file_name), &upload.bytes).await?;

        let reference = format!("{}/{}/{}", self.base_url, folder, file_name);
        debug!("Stored asset {} ({} bytes)", reference, upload.bytes.len());

        if let Some(previous) = previous
            && !self.delete_by_reference(previous).await?
        {
            warn!("Superseded asset {} was already missing", previous);
        }

        Ok(reference)
    }

    async fn delete_by_reference(&self, reference: &str) -> Result<bool, AssetError> {
        let path = self.resolve(reference)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted asset {}", reference);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
