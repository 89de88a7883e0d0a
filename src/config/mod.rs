//! Configuration module for Quillpost.
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::services::MissingAssetPolicy;

/// Which cache backend to use
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CacheBackend {
    /// In-process Moka cache
    #[default]
    Memory,
    /// Shared Redis instance
    Redis,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    /// Postgres URL. The in-memory store is used when unset.
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Cache
    pub cache_backend: CacheBackend,
    pub redis_url: Option<String>,
    pub cache_ttl: Duration,
    pub cache_max_capacity: u64,

    // Assets
    pub asset_root: String,
    pub asset_base_url: String,
    pub missing_asset: MissingAssetPolicy,

    // HTTP
    pub bind_addr: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Panics
    /// Panics if `REDIS_URL` is missing while `CACHE_BACKEND` is `redis`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let cache_backend = parse_cache_backend(&env::var("CACHE_BACKEND").unwrap_or_default());
        let redis_url = env::var("REDIS_URL").ok().filter(|s| !s.is_empty());

        // Validate Redis URL is set if backend is redis
        if cache_backend == CacheBackend::Redis && redis_url.is_none() {
            panic!("REDIS_URL must be set when CACHE_BACKEND is redis");
        }

        let missing_asset = if parse_bool(env::var("ASSET_MISSING_IS_ERROR").ok(), true) {
            MissingAssetPolicy::Fail
        } else {
            MissingAssetPolicy::Ignore
        };

        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            database_max_connections: parse_or(env::var("DATABASE_MAX_CONNECTIONS").ok(), 10),
            cache_backend,
            redis_url,
            cache_ttl: Duration::from_secs(parse_or(env::var("CACHE_TTL_SECS").ok(), 3600)),
            cache_max_capacity: parse_or(env::var("CACHE_MAX_CAPACITY").ok(), 10_000),
            asset_root: env::var("ASSET_ROOT").unwrap_or_else(|_| "./storage".to_string()),
            asset_base_url: env::var("ASSET_BASE_URL").unwrap_or_else(|_| "/storage".to_string()),
            missing_asset,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        }
    }
}

fn parse_cache_backend(value: &str) -> CacheBackend {
    match value.trim().to_lowercase().as_str() {
        "redis" => CacheBackend::Redis,
        _ => CacheBackend::Memory,
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(|s| s.trim().to_lowercase()) {
        Some(s) if matches!(s.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(s) if matches!(s.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cache_backend() {
        assert_eq!(parse_cache_backend("Redis"), CacheBackend::Redis);
        assert_eq!(parse_cache_backend("memory"), CacheBackend::Memory);
        assert_eq!(parse_cache_backend(""), CacheBackend::Memory);
    }

    #[test]
    fn test_parse_or_falls_back() {
        assert_eq!(parse_or::<u64>(Some(" 42 ".into()), 1), 42);
        assert_eq!(parse_or::<u64>(Some("x".into()), 1), 1);
        assert_eq!(parse_or::<u32>(None, 10), 10);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool(Some("TRUE".into()), false));
        assert!(!parse_bool(Some("off".into()), true));
        assert!(parse_bool(Some("maybe".into()), true));
        assert!(!parse_bool(None, false));
    }
}
