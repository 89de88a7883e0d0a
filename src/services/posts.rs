//! Transactional write path for posts.
//!
//! Every create/update/delete runs as: asset change, row change inside one
//! transaction, commit, then cache patch. A failure before commit rolls the
//! row back and undoes the asset change where that is possible. Cache
//! failures after commit are logged and never fail the operation; the store
//! stays authoritative and the next cold read rebuilds the entry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::coherence::CacheCoherence;
use super::locks::KeyedLocks;
use super::resource::PostResource;
use crate::assets::{AssetStore, POST_IMAGE_FOLDER};
use crate::cache::CacheStore;
use crate::database::{NewPost, Post, PostChanges, PostFields, PostStore, PostTransaction, Upload};
use crate::error::ServiceError;

/// What a delete does when the post's image file is already gone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingAssetPolicy {
    /// Keep the row and fail with `AssetDeletion`.
    #[default]
    Fail,
    /// Treat the missing file as deleted and remove the row.
    Ignore,
}

/// Tunables for [`PostService`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub cache_ttl: Duration,
    pub missing_asset: MissingAssetPolicy,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
            missing_asset: MissingAssetPolicy::default(),
        }
    }
}

/// Post CRUD over a store, an asset store and a cache.
pub struct PostService {
    store: Arc<dyn PostStore>,
    assets: Arc<dyn AssetStore>,
    coherence: CacheCoherence,
    locks: KeyedLocks,
    missing_asset: MissingAssetPolicy,
}

impl PostService {
    pub fn new(
        store: Arc<dyn PostStore>,
        assets: Arc<dyn AssetStore>,
        cache: Arc<dyn CacheStore>,
        settings: ServiceSettings,
    ) -> Self {
        let coherence = CacheCoherence::new(cache, Arc::clone(&store), settings.cache_ttl);
        Self {
            store,
            assets,
            coherence,
            locks: KeyedLocks::new(),
            missing_asset: settings.missing_asset,
        }
    }

    /// Create a post, uploading its image first when one is given.
    pub async fn create(
        &self,
        fields: PostFields,
        upload: Option<Upload>,
    ) -> Result<PostResource, ServiceError> {
        fields.validate()?;

        let image = match &upload {
            Some(upload) => Some(self.assets.upload(upload, POST_IMAGE_FOLDER, None).await?),
            None => None,
        };

        let post = match self.insert_row(NewPost::new(fields, image.clone())).await {
            Ok(post) => post,
            Err(e) => {
                self.discard_upload(image).await;
                return Err(e);
            }
        };

        info!("Created post {}", post.id);
        self.sync_upsert(&post).await;
        Ok(post.into())
    }

    /// Read one post straight from the store.
    pub async fn get(&self, id: i64) -> Result<PostResource, ServiceError> {
        self.store
            .find(id)
            .await?
            .map(PostResource::from)
            .ok_or(ServiceError::NotFound(id))
    }

    /// Read every post straight from the store.
    pub async fn list(&self) -> Result<Vec<PostResource>, ServiceError> {
        Ok(PostResource::collection(self.store.find_all().await?))
    }

    /// Read one post, preferring `post:<id>`.
    pub async fn show(&self, id: i64) -> Result<PostResource, ServiceError> {
        match self.coherence.cached_post(id).await {
            Ok(Some(post)) => return Ok(post.into()),
            Ok(None) => {}
            Err(e) => warn!(id, error = %e, "Cache read failed, using store"),
        }

        // Writers hold the key until their cache patch is done.
        let _guard = self.locks.lock(id).await;
        if let Ok(Some(post)) = self.coherence.cached_post(id).await {
            return Ok(post.into());
        }

        let post = self.store.find(id).await?.ok_or(ServiceError::NotFound(id))?;
        if let Err(e) = self.coherence.remember(&post).await {
            warn!(id, error = %e, "Failed to cache post");
        }
        Ok(post.into())
    }

    /// Read every post, preferring `all_posts`.
    pub async fn index(&self) -> Result<Vec<PostResource>, ServiceError> {
        match self.coherence.cached_all().await {
            Ok(Some(posts)) => return Ok(PostResource::collection(posts)),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Cache read failed, using store"),
        }

        match self.coherence.load_all().await {
            Ok(posts) => Ok(PostResource::collection(posts)),
            Err(e) => {
                warn!(error = %e, "Failed to rebuild post collection cache");
                self.list().await
            }
        }
    }

    /// Update a post's fields and, when a file is given, replace its image.
    ///
    /// The previous image is deleted only after the new state is committed.
    pub async fn update(
        &self,
        id: i64,
        fields: PostFields,
        upload: Option<Upload>,
    ) -> Result<PostResource, ServiceError> {
        fields.validate()?;
        let _guard = self.locks.lock(id).await;

        let mut tx = self.store.begin().await?;
        let mut uploaded = None;

        let (previous, updated) = match self
            .apply_update(&mut *tx, id, fields, upload, &mut uploaded)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                Self::rollback(tx).await;
                self.discard_upload(uploaded).await;
                return Err(e);
            }
        };

        if let Err(e) = tx.commit().await {
            self.discard_upload(uploaded).await;
            return Err(e.into());
        }

        if uploaded.is_some()
            && let Some(previous) = previous
        {
            self.release_superseded(&previous).await;
        }

        info!("Updated post {}", id);
        self.sync_upsert(&updated).await;
        Ok(updated.into())
    }

    /// Delete a post and its image.
    ///
    /// The row is kept when the image cannot be deleted.
    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        let _guard = self.locks.lock(id).await;

        let mut tx = self.store.begin().await?;
        let image = match self.apply_delete(&mut *tx, id).await {
            Ok(image) => image,
            Err(e) => {
                Self::rollback(tx).await;
                return Err(e);
            }
        };

        if let Err(e) = tx.commit().await {
            if let Some(reference) = &image {
                error!(id, reference = %reference, "Asset deleted but row delete did not commit");
            }
            return Err(e.into());
        }

        info!("Deleted post {}", id);
        if let Err(e) = self.coherence.remove(id).await {
            warn!(id, error = %e, "Failed to patch cache after delete");
        }
        Ok(())
    }

    async fn insert_row(&self, new_post: NewPost) -> Result<Post, ServiceError> {
        let mut tx = self.store.begin().await?;

        let post = match tx.insert(new_post).await {
            Ok(post) => post,
            Err(e) => {
                Self::rollback(tx).await;
                return Err(e.into());
            }
        };

        tx.commit().await?;
        Ok(post)
    }

    /// Returns the image reference the row had before and the updated row.
    async fn apply_update(
        &self,
        tx: &mut dyn PostTransaction,
        id: i64,
        fields: PostFields,
        upload: Option<Upload>,
        uploaded: &mut Option<String>,
    ) -> Result<(Option<String>, Post), ServiceError> {
        let existing = tx.find_for_update(id).await?.ok_or(ServiceError::NotFound(id))?;

        if let Some(upload) = &upload {
            *uploaded = Some(self.assets.upload(upload, POST_IMAGE_FOLDER, None).await?);
        }

        let changes = PostChanges::new(fields, uploaded.clone());
        let updated = tx.update(id, &changes).await?;
        Ok((existing.image, updated))
    }

    /// Returns the image reference that was deleted, if any.
    async fn apply_delete(
        &self,
        tx: &mut dyn PostTransaction,
        id: i64,
    ) -> Result<Option<String>, ServiceError> {
        let post = tx.find_for_update(id).await?.ok_or(ServiceError::NotFound(id))?;

        if let Some(reference) = &post.image {
            self.delete_asset(reference).await?;
        }

        match tx.delete(id).await {
            Ok(true) => Ok(post.image),
            Ok(false) => Err(ServiceError::NotFound(id)),
            Err(e) => {
                if let Some(reference) = &post.image {
                    error!(id, reference = %reference, error = %e, "Asset deleted but row delete failed");
                }
                Err(e.into())
            }
        }
    }

    async fn delete_asset(&self, reference: &str) -> Result<(), ServiceError> {
        match self.assets.delete_by_reference(reference).await {
            Ok(true) => Ok(()),
            Ok(false) if self.missing_asset == MissingAssetPolicy::Ignore => {
                warn!(reference = %reference, "Asset already missing, deleting row anyway");
                Ok(())
            }
            Ok(false) => Err(ServiceError::AssetDeletion {
                reference: reference.to_string(),
            }),
            Err(e) => {
                warn!(reference = %reference, error = %e, "Asset deletion failed");
                Err(ServiceError::AssetDeletion {
                    reference: reference.to_string(),
                })
            }
        }
    }

    /// Remove a freshly uploaded file whose row never committed.
    async fn discard_upload(&self, uploaded: Option<String>) {
        let Some(reference) = uploaded else {
            return;
        };

        match self.assets.delete_by_reference(&reference).await {
            Ok(_) => debug!("Discarded upload {}", reference),
            Err(e) => error!(reference = %reference, error = %e, "Orphaned upload could not be removed"),
        }
    }

    async fn release_superseded(&self, reference: &str) {
        match self.assets.delete_by_reference(reference).await {
            Ok(true) => debug!("Released superseded asset {}", reference),
            Ok(false) => warn!(reference = %reference, "Superseded asset was already missing"),
            Err(e) => error!(reference = %reference, error = %e, "Superseded asset could not be removed"),
        }
    }

    async fn sync_upsert(&self, post: &Post) {
        if let Err(e) = self.coherence.upsert(post).await {
            warn!(id = post.id, error = %e, "Failed to patch cache after write");
        }
    }

    async fn rollback(tx: Box<dyn PostTransaction>) {
        if let Err(e) = tx.rollback().await {
            error!(error = %e, "Rollback failed");
        }
    }
}
