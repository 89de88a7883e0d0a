//! Caller-facing representation of posts.

use serde::Serialize;

use crate::database::Post;

/// A post as returned to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostResource {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl PostResource {
    /// Present a whole collection, keeping its order.
    pub fn collection(posts: Vec<Post>) -> Vec<Self> {
        posts.into_iter().map(Self::from).collect()
    }
}

impl From<Post> for PostResource {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            title: post.title,
            content: post.content,
            image: post.image,
            created_at: post.created_at.to_rfc3339(),
            updated_at: post.updated_at.to_rfc3339(),
        }
    }
}
