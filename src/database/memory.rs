//! In-process post store.
//!
//! Used when no `DATABASE_URL` is configured and as the store in tests.
//! A transaction reads from a snapshot taken at `begin`, buffers its writes
//! and applies them to the shared table only on commit.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use super::models::{NewPost, Post, PostChanges};
use super::store::{PostStore, PostTransaction};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Shared {
    rows: RwLock<BTreeMap<i64, Post>>,
    next_id: AtomicI64,
    reject_writes: AtomicBool,
}

/// Post store holding rows in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryPostStore {
    shared: Arc<Shared>,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every transactional write fail until switched off again.
    #[cfg(test)]
    pub fn reject_writes(&self, reject: bool) {
        self.shared.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Number of committed rows.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.shared.rows.read().len()
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn begin(&self) -> Result<Box<dyn PostTransaction>, StoreError> {
        let snapshot = self.shared.rows.read().clone();
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            view: snapshot,
            pending: Vec::new(),
        }))
    }

    async fn find(&self, id: i64) -> Result<Option<Post>, StoreError> {
        Ok(self.shared.rows.read().get(&id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Post>, StoreError> {
        Ok(self.shared.rows.read().values().cloned().collect())
    }
}

enum PendingWrite {
    Put(Post),
    Delete(i64),
}

struct MemoryTransaction {
    shared: Arc<Shared>,
    view: BTreeMap<i64, Post>,
    pending: Vec<PendingWrite>,
}

impl MemoryTransaction {
    fn check_writable(&self) -> Result<(), StoreError> {
        if self.shared.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("store is rejecting writes".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PostTransaction for MemoryTransaction {
    async fn insert(&mut self, post: NewPost) -> Result<Post, StoreError> {
        self.check_writable()?;

        // Ids are consumed even if the transaction rolls back, like a sequence.
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let created = Post {
            id,
            title: post.title,
            content: post.content,
            image: post.image,
            created_at: now,
            updated_at: now,
        };

        self.view.insert(id, created.clone());
        self.pending.push(PendingWrite::Put(created.clone()));
        Ok(created)
    }

    async fn find_for_update(&mut self, id: i64) -> Result<Option<Post>, StoreError> {
        Ok(self.view.get(&id).cloned())
    }

    async fn update(&mut self, id: i64, changes: &PostChanges) -> Result<Post, StoreError> {
        self.check_writable()?;

        let post = self
            .view
            .get_mut(&id)
            .ok_or_else(|| StoreError::Rejected(format!("post {id} does not exist")))?;
        changes.apply_to(post, Utc::now());

        let updated = post.clone();
        self.pending.push(PendingWrite::Put(updated.clone()));
        Ok(updated)
    }

    async fn delete(&mut self, id: i64) -> Result<bool, StoreError> {
        self.check_writable()?;

        let removed = self.view.remove(&id).is_some();
        if removed {
            self.pending.push(PendingWrite::Delete(id));
        }
        Ok(removed)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { shared, pending, .. } = *self;
        let mut rows = shared.rows.write();
        let writes = pending.len();
        for write in pending {
            match write {
                PendingWrite::Put(post) => {
                    rows.insert(post.id, post);
                }
                PendingWrite::Delete(id) => {
                    rows.remove(&id);
                }
            }
        }
        debug!("Committed {} buffered writes", writes);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        debug!("Discarded {} buffered writes", self.pending.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::PostFields;

    fn new_post(title: &str) -> NewPost {
        NewPost::new(PostFields::new(title, "body"), None)
    }

    #[tokio::test]
    async fn test_commit_makes_writes_visible() {
        let store = MemoryPostStore::new();

        let mut tx = store.begin().await.unwrap();
        let first = tx.insert(new_post("a")).await.unwrap();
        let second = tx.insert(new_post("b")).await.unwrap();
        assert!(store.find(first.id).await.unwrap().is_none());
        tx.commit().await.unwrap();

        let all = store.find_all().await.unwrap();
        assert_eq!(all.iter().map(|p| p.id).collect::<Vec<_>>(), vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryPostStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert(new_post("a")).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_delete_and_update_inside_transaction() {
        let store = MemoryPostStore::new();
        let mut tx = store.begin().await.unwrap();
        let post = tx.insert(new_post("a")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let changes = PostChanges::new(PostFields::new("a2", "body2"), None);
        let updated = tx.update(post.id, &changes).await.unwrap();
        assert_eq!(updated.title, "a2");
        assert!(tx.delete(post.id).await.unwrap());
        assert!(tx.find_for_update(post.id).await.unwrap().is_none());
        assert!(!tx.delete(post.id).await.unwrap());
        tx.commit().await.unwrap();

        assert!(store.find(post.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_writes() {
        let store = MemoryPostStore::new();
        store.reject_writes(true);

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(tx.insert(new_post("a")).await, Err(StoreError::Rejected(_))));
    }
}
