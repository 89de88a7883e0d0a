//! Cache coherence for post data.
//!
//! Owns both cache shapes:
//! - `post:<id>` - one serialized [`Post`]
//! - `all_posts` - the serialized, id-ordered list of every post
//!
//! Writes patch `all_posts` in place (replace-by-id, append, or remove-by-id)
//! instead of reloading it. When `all_posts` is absent the list is rebuilt
//! from the store first and the patch is applied on top of the rebuilt list.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::database::{Post, PostStore};
use crate::error::{CacheError, StoreError};

/// Key of the aggregated collection entry.
pub const ALL_POSTS_KEY: &str = "all_posts";

/// Key of a single post entry.
pub fn post_key(id: i64) -> String {
    format!("post:{id}")
}

/// Failure while patching the cache.
#[derive(Debug, thiserror::Error)]
pub enum CoherenceError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The cold-cache reload could not read the store.
    #[error("reload from store failed: {0}")]
    Reload(#[from] StoreError),
}

/// A pending change to the collection entry.
enum Patch<'a> {
    Upsert(&'a Post),
    Remove(i64),
}

impl Patch<'_> {
    fn apply(&self, posts: &mut Vec<Post>) {
        match self {
            Patch::Upsert(post) => match posts.iter_mut().find(|p| p.id == post.id) {
                Some(existing) => *existing = (*post).clone(),
                None => posts.push((*post).clone()),
            },
            Patch::Remove(id) => posts.retain(|p| p.id != *id),
        }
    }
}

/// Keeps `post:<id>` and `all_posts` consistent with store mutations.
pub struct CacheCoherence {
    cache: Arc<dyn CacheStore>,
    store: Arc<dyn PostStore>,
    ttl: Duration,
    /// Serializes the load-modify-store of `all_posts` within this process.
    collection_lock: Mutex<()>,
}

impl CacheCoherence {
    pub fn new(cache: Arc<dyn CacheStore>, store: Arc<dyn PostStore>, ttl: Duration) -> Self {
        Self {
            cache,
            store,
            ttl,
            collection_lock: Mutex::new(()),
        }
    }

    /// Write `post:<id>` and add-or-replace the post in `all_posts`.
    pub async fn upsert(&self, post: &Post) -> Result<(), CoherenceError> {
        self.remember(post).await?;
        self.patch_collection(Patch::Upsert(post)).await
    }

    /// Drop `post:<id>` and remove the post from `all_posts`.
    pub async fn remove(&self, id: i64) -> Result<(), CoherenceError> {
        self.cache.delete(&post_key(id)).await?;
        self.patch_collection(Patch::Remove(id)).await
    }

    /// Write `post:<id>` only.
    pub async fn remember(&self, post: &Post) -> Result<(), CoherenceError> {
        self.write(&post_key(post.id), post).await
    }

    /// Read the whole collection from the store and cache it as `all_posts`.
    pub async fn fetch_and_cache_all(&self) -> Result<Vec<Post>, CoherenceError> {
        let _guard = self.collection_lock.lock().await;
        self.reload_all().await
    }

    /// Cached collection, rebuilt from the store when absent.
    ///
    /// A patch that commits while the rebuild reads the store waits for it
    /// and lands on top of the rebuilt list.
    pub async fn load_all(&self) -> Result<Vec<Post>, CoherenceError> {
        let _guard = self.collection_lock.lock().await;
        self.load_or_reload_all().await
    }

    /// Cached single post, if present and readable.
    pub async fn cached_post(&self, id: i64) -> Result<Option<Post>, CoherenceError> {
        self.read(&post_key(id)).await
    }

    /// Cached collection, if present and readable.
    pub async fn cached_all(&self) -> Result<Option<Vec<Post>>, CoherenceError> {
        self.read(ALL_POSTS_KEY).await
    }

    async fn patch_collection(&self, patch: Patch<'_>) -> Result<(), CoherenceError> {
        let _guard = self.collection_lock.lock().await;

        let mut posts = self.load_or_reload_all().await?;
        patch.apply(&mut posts);

        self.write(ALL_POSTS_KEY, &posts).await?;
        debug!("Patched {} ({} posts)", ALL_POSTS_KEY, posts.len());
        Ok(())
    }

    /// Callers hold `collection_lock`.
    async fn load_or_reload_all(&self) -> Result<Vec<Post>, CoherenceError> {
        match self.cached_all().await? {
            Some(posts) => Ok(posts),
            None => self.reload_all().await,
        }
    }

    async fn reload_all(&self) -> Result<Vec<Post>, CoherenceError> {
        let posts = self.store.find_all().await?;
        self.write(ALL_POSTS_KEY, &posts).await?;
        debug!("Reloaded {} posts into {}", posts.len(), ALL_POSTS_KEY);
        Ok(posts)
    }

    /// Undecodable entries are treated as absent.
    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CoherenceError> {
        let Some(raw) = self.cache.get(key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), CoherenceError> {
        let raw = serde_json::to_string(value).map_err(CacheError::from)?;
        self.cache.set(key, raw, self.ttl).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, MokaCacheStore};
    use crate::database::{MemoryPostStore, NewPost, PostFields};

    struct Harness {
        cache: Arc<MokaCacheStore>,
        store: MemoryPostStore,
        coherence: CacheCoherence,
    }

    fn harness() -> Harness {
        let cache = Arc::new(MokaCacheStore::new(CacheConfig::default()));
        let store = MemoryPostStore::new();
        let coherence = CacheCoherence::new(
            cache.clone(),
            Arc::new(store.clone()),
            Duration::from_secs(60),
        );
        Harness { cache, store, coherence }
    }

    async fn insert(store: &MemoryPostStore, title: &str) -> Post {
        let mut tx = store.begin().await.unwrap();
        let post = tx
            .insert(NewPost::new(PostFields::new(title, "body"), None))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        post
    }

    fn ids(posts: &[Post]) -> Vec<i64> {
        posts.iter().map(|p| p.id).collect()
    }

    #[test]
    fn test_patch_replaces_in_place_and_appends() {
        let now = chrono::Utc::now();
        let post = |id: i64, title: &str| Post {
            id,
            title: title.into(),
            content: String::new(),
            image: None,
            created_at: now,
            updated_at: now,
        };
        let mut posts = vec![post(1, "a"), post(2, "b"), post(3, "c")];

        Patch::Upsert(&post(2, "b2")).apply(&mut posts);
        Patch::Upsert(&post(4, "d")).apply(&mut posts);
        Patch::Remove(1).apply(&mut posts);
        Patch::Remove(99).apply(&mut posts);

        assert_eq!(ids(&posts), vec![2, 3, 4]);
        assert_eq!(posts[0].title, "b2");
    }

    #[tokio::test]
    async fn test_upsert_writes_both_shapes() {
        let h = harness();
        let post = insert(&h.store, "T1").await;

        h.coherence.upsert(&post).await.unwrap();

        assert_eq!(h.coherence.cached_post(post.id).await.unwrap(), Some(post.clone()));
        assert_eq!(h.coherence.cached_all().await.unwrap(), Some(vec![post]));
    }

    #[tokio::test]
    async fn test_upsert_keeps_position_of_existing_entry() {
        let h = harness();
        let first = insert(&h.store, "T1").await;
        let second = insert(&h.store, "T2").await;
        h.coherence.fetch_and_cache_all().await.unwrap();

        let mut edited = first.clone();
        edited.title = "T1-edited".into();
        h.coherence.upsert(&edited).await.unwrap();

        let all = h.coherence.cached_all().await.unwrap().unwrap();
        assert_eq!(ids(&all), vec![first.id, second.id]);
        assert_eq!(all[0].title, "T1-edited");
        assert_eq!(all[1], second);
    }

    #[tokio::test]
    async fn test_cold_upsert_applies_patch_on_top_of_reload() {
        let h = harness();
        let committed = insert(&h.store, "committed").await;

        // Not in the store: the result must still contain it.
        let mut pending = committed.clone();
        pending.id = 42;
        pending.title = "pending".into();
        h.coherence.upsert(&pending).await.unwrap();

        let all = h.coherence.cached_all().await.unwrap().unwrap();
        assert_eq!(ids(&all), vec![committed.id, 42]);
    }

    #[tokio::test]
    async fn test_cold_upsert_does_not_duplicate_committed_row() {
        let h = harness();
        let post = insert(&h.store, "T1").await;

        h.coherence.upsert(&post).await.unwrap();

        let all = h.coherence.cached_all().await.unwrap().unwrap();
        assert_eq!(ids(&all), vec![post.id]);
    }

    #[tokio::test]
    async fn test_cold_remove_filters_reloaded_collection() {
        let h = harness();
        let first = insert(&h.store, "T1").await;
        let second = insert(&h.store, "T2").await;

        // Row still committed in the store, removal must win.
        h.coherence.remove(first.id).await.unwrap();

        let all = h.coherence.cached_all().await.unwrap().unwrap();
        assert_eq!(ids(&all), vec![second.id]);
    }

    #[tokio::test]
    async fn test_remove_drops_single_entry_even_if_absent() {
        let h = harness();
        let post = insert(&h.store, "T1").await;
        h.coherence.upsert(&post).await.unwrap();

        h.coherence.remove(post.id).await.unwrap();
        h.coherence.remove(post.id).await.unwrap();

        assert_eq!(h.coherence.cached_post(post.id).await.unwrap(), None);
        assert_eq!(h.coherence.cached_all().await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn test_warm_patch_does_not_consult_store() {
        let h = harness();
        let post = insert(&h.store, "T1").await;
        h.coherence.fetch_and_cache_all().await.unwrap();
        let late = insert(&h.store, "written behind the cache's back").await;

        h.coherence.upsert(&post).await.unwrap();

        let all = h.coherence.cached_all().await.unwrap().unwrap();
        assert!(!ids(&all).contains(&late.id));
    }

    #[tokio::test]
    async fn test_load_all_rebuilds_only_when_absent() {
        let h = harness();
        let first = insert(&h.store, "T1").await;

        assert_eq!(ids(&h.coherence.load_all().await.unwrap()), vec![first.id]);
        insert(&h.store, "T2").await;

        assert_eq!(ids(&h.coherence.load_all().await.unwrap()), vec![first.id]);
    }

    #[tokio::test]
    async fn test_corrupt_collection_is_rebuilt() {
        let h = harness();
        let post = insert(&h.store, "T1").await;
        h.cache
            .set(ALL_POSTS_KEY, "not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(h.coherence.cached_all().await.unwrap(), None);
        h.coherence.remove(999).await.unwrap();

        let all = h.coherence.cached_all().await.unwrap().unwrap();
        assert_eq!(ids(&all), vec![post.id]);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_lose_nothing() {
        let h = Arc::new(harness());
        h.coherence.fetch_and_cache_all().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let h = Arc::clone(&h);
            handles.push(tokio::spawn(async move {
                let post = insert(&h.store, &format!("T{i}")).await;
                h.coherence.upsert(&post).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let all = h.coherence.cached_all().await.unwrap().unwrap();
        assert_eq!(all.len(), 16);
    }
}
