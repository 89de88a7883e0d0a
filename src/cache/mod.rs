//! Cache module - key-value cache backends for post data.
//!
//! ## Architecture
//!
//! - `CacheConfig` - capacity and default TTL
//! - `TypedCache` - typed Moka wrapper with a TTL per entry
//! - `CacheStore` - the string key-value contract the coherence layer talks to,
//!   implemented in-process (`MokaCacheStore`) and on Redis (`RedisCacheStore`)
//!
//! ## Usage
//!
//! ```rust
//! let store = MokaCacheStore::new(CacheConfig::default());
//! store.set("post:1", json, Duration::from_secs(3600)).await?;
//! let cached = store.get("post:1").await?;
//! ```

mod config;
mod store;
mod typed;

pub use config::CacheConfig;
pub use store::{CacheStore, MokaCacheStore, RedisCacheStore};
pub use typed::TypedCache;
