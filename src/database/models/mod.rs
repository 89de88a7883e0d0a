//! Database models.

pub mod post;

pub use post::{NewPost, Post, PostChanges, PostFields, Upload};
