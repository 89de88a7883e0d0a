//! Post services.
//!
//! - `PostService` - transactional create/update/delete plus reads
//! - `CacheCoherence` - owner of the `post:<id>` and `all_posts` entries
//! - `PostResource` - what callers get back

mod coherence;
mod locks;
mod posts;
mod resource;

pub use posts::{MissingAssetPolicy, PostService, ServiceSettings};
pub use resource::PostResource;
