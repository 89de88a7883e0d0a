//! Backing store contract.
//!
//! The store is the single source of truth for posts. Writes go through a
//! [`PostTransaction`] that is either committed or rolled back by the caller;
//! dropping one without committing discards its writes.

use async_trait::async_trait;

use super::models::{NewPost, Post, PostChanges};
use crate::error::StoreError;

/// Relational post storage.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Open a transaction scope for one write operation.
    async fn begin(&self) -> Result<Box<dyn PostTransaction>, StoreError>;

    /// Read a committed post.
    async fn find(&self, id: i64) -> Result<Option<Post>, StoreError>;

    /// Read every committed post, ordered by id.
    async fn find_all(&self) -> Result<Vec<Post>, StoreError>;
}

/// Writes scoped to a single transaction.
#[async_trait]
pub trait PostTransaction: Send {
    async fn insert(&mut self, post: NewPost) -> Result<Post, StoreError>;

    /// Read a post, locking it for the rest of the transaction.
    async fn find_for_update(&mut self, id: i64) -> Result<Option<Post>, StoreError>;

    /// Apply changes to an existing row and return the new state.
    async fn update(&mut self, id: i64, changes: &PostChanges) -> Result<Post, StoreError>;

    /// Delete a row. Returns whether a row was removed.
    async fn delete(&mut self, id: i64) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
