//! Error types.
//!
//! Collaborator failures (`StoreError`, `AssetError`, `CacheError`) stay
//! separate from the caller-facing `ServiceError`, which is what the write
//! path and the HTTP layer speak.

use thiserror::Error;

/// Failure inside the relational backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Raised by the in-memory store when a write is rejected.
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Failure inside the file asset store.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reference {0} does not belong to this asset store")]
    ForeignReference(String),
}

/// Failure inside the cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("cache (de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[cfg(test)]
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Error returned by the post write path and reads.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("post {0} not found")]
    NotFound(i64),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    /// The asset could not be removed, so the post row was kept.
    #[error("asset not removed, entity retained: {reference}")]
    AssetDeletion { reference: String },

    #[error("asset failure: {0}")]
    Asset(#[from] AssetError),
}

impl ServiceError {
    /// True for errors caused by the caller rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_deletion_message_is_actionable() {
        let err = ServiceError::AssetDeletion {
            reference: "/storage/images/posts/a.png".to_string(),
        };

        assert_eq!(
            err.to_string(),
            "asset not removed, entity retained: /storage/images/posts/a.png"
        );
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_client_errors() {
        assert!(ServiceError::NotFound(7).is_client_error());
        assert!(ServiceError::Validation("title".into()).is_client_error());
        assert!(!ServiceError::Storage(StoreError::Rejected("x".into())).is_client_error());
    }
}
