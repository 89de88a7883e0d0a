//! File asset storage for post images.

mod local;
#[cfg(test)]
mod memory;

use async_trait::async_trait;

use crate::database::Upload;
use crate::error::AssetError;

pub use local::LocalAssetStore;
#[cfg(test)]
pub use memory::MemoryAssetStore;

/// Folder post images are uploaded into.
pub const POST_IMAGE_FOLDER: &str = "images/posts";

/// Storage for uploaded files, addressed by the reference returned on upload.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store `upload` under `folder` and return its reference.
    ///
    /// When `previous` is given, that asset is superseded and removed once the
    /// new one is stored. The post write path passes `None` and deletes the
    /// old image itself after commit, so a rolled-back update keeps it and a
    /// committed one removes it exactly once.
    async fn upload(
        &self,
        upload: &Upload,
        folder: &str,
        previous: Option<&str>,
    ) -> Result<String, AssetError>;

    /// Delete an asset. Returns `false` when nothing existed at `reference`.
    async fn delete_by_reference(&self, reference: &str) -> Result<bool, AssetError>;
}
