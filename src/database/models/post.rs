//! Post models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// A stored post.
///
/// This is also the cached representation: `post:<id>` holds one of these
/// and `all_posts` holds an ordered list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    /// Assigned by the store, never changes
    pub id: i64,

    pub title: String,

    pub content: String,

    /// Reference to the attached image asset
    #[serde(default)]
    pub image: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PostFields {
    pub title: String,
    pub content: String,
}

impl PostFields {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    /// Reject blank required fields.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.title.trim().is_empty() {
            return Err(ServiceError::Validation("title is required".to_string()));
        }
        if self.content.trim().is_empty() {
            return Err(ServiceError::Validation("content is required".to_string()));
        }
        Ok(())
    }
}

/// Row values for an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub image: Option<String>,
}

impl NewPost {
    pub fn new(fields: PostFields, image: Option<String>) -> Self {
        Self {
            title: fields.title,
            content: fields.content,
            image,
        }
    }
}

/// Row changes for an update.
///
/// `image: None` leaves the stored reference untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostChanges {
    pub title: String,
    pub content: String,
    pub image: Option<String>,
}

impl PostChanges {
    pub fn new(fields: PostFields, image: Option<String>) -> Self {
        Self {
            title: fields.title,
            content: fields.content,
            image,
        }
    }

    /// Apply the changes to a post in place.
    pub fn apply_to(&self, post: &mut Post, now: DateTime<Utc>) {
        post.title.clone_from(&self.title);
        post.content.clone_from(&self.content);
        if let Some(image) = &self.image {
            post.image = Some(image.clone());
        }
        post.updated_at = now;
    }
}

/// A file handed in with a create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Original client file name, used for the extension only
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Lowercase extension of the client file name, if it has a usable one.
    pub fn extension(&self) -> Option<String> {
        let (_, ext) = self.file_name.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        (!ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric())).then_some(ext)
    }
}
