//! Quillpost - post service with a write-through cache
//!
//! CRUD for posts with attached images, backed by a relational store and a
//! cache that keeps both single posts and the full post list coherent.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `database` - Post models and stores (Postgres, in-memory)
//! - `assets` - Image file storage
//! - `cache` - Cache backends (Moka, Redis)
//! - `services` - Transactional write path and cache coherence
//! - `http` - axum routes
//! - `error` - Error types

mod assets;
mod cache;
mod config;
mod database;
mod error;
mod http;
mod services;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use assets::LocalAssetStore;
use cache::{CacheConfig, CacheStore, MokaCacheStore, RedisCacheStore};
use config::{CacheBackend, Config};
use database::{MemoryPostStore, PgPostStore, PostStore};
use services::{PostService, ServiceSettings};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("quillpost=info,tower_http=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    info!("Starting Quillpost...");

    let config = Config::from_env();
    info!("Configuration loaded successfully");

    let store: Arc<dyn PostStore> = match &config.database_url {
        Some(url) => {
            info!("Connecting to Postgres...");
            let store = PgPostStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, posts are kept in memory only");
            Arc::new(MemoryPostStore::new())
        }
    };

    let cache: Arc<dyn CacheStore> = match config.cache_backend {
        CacheBackend::Memory => Arc::new(MokaCacheStore::new(
            CacheConfig::default().max_capacity(config.cache_max_capacity),
        )),
        CacheBackend::Redis => {
            let url = config.redis_url.as_deref().unwrap_or_default();
            info!("Connecting to Redis...");
            Arc::new(RedisCacheStore::connect(url).await?)
        }
    };
    info!("Cache backend: {:?}", config.cache_backend);

    let assets = Arc::new(LocalAssetStore::new(&config.asset_root, &config.asset_base_url));
    info!("Assets stored under {}", config.asset_root);

    let service = PostService::new(
        store,
        assets,
        cache,
        ServiceSettings {
            cache_ttl: config.cache_ttl,
            missing_asset: config.missing_asset,
        },
    );

    http::serve(&config.bind_addr, Arc::new(service)).await
}
