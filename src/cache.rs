//! Persistent TTL cache for forecasts, geocoding results and METAR reports
//!
//! Entries live in a `fjall` keyspace as `postcard`-encoded values with an
//! expiry timestamp. The global cache is optional: when [`init`] has not
//! been called (cache disabled, tests) every lookup misses and every write
//! is dropped.

use anyhow::{Result, anyhow};
use fjall::Keyspace;
use rand::RngExt;
use serde::Deserialize;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::OnceCell;
use tokio::task;

static GLOBAL_CACHE: OnceCell<PersistentCache> = OnceCell::const_new();

#[derive(Serialize, Deserialize)]
struct StoredEntry<T> {
    value: T,
    expires_at: u64, // Unix timestamp (seconds)
}

pub struct PersistentCache {
    store: Keyspace,
}

fn get_from_store(store: Keyspace, key: Vec<u8>) -> anyhow::Result<Option<Vec<u8>>> {
    Ok(store.get(key)?.map(|v| v.to_vec()))
}

impl PersistentCache {
    pub(crate) fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = fjall::Database::builder(&path).open()?;
        let items = db.keyspace("cache", fjall::KeyspaceCreateOptions::default)?;
        Ok(PersistentCache { store: items })
    }

    /// Stores a serializable value with a time-to-live (TTL).
    #[tracing::instrument(name = "put_cache", level = "debug", skip(self, value))]
    pub async fn put<T: Serialize + Send + Debug + 'static>(
        &self,
        key: &str,
        value: T,
        ttl: Duration,
    ) -> Result<()> {
        let store = self.store.clone();
        let key = key.as_bytes().to_vec();
        let expires_at = SystemTime::now()
            .checked_add(ttl)
            .ok_or(anyhow!("TTL overflow"))?
            .duration_since(UNIX_EPOCH)?
            .as_secs();
        let entry = StoredEntry { value, expires_at };
        let bytes = postcard::to_stdvec(&entry)?;

        task::spawn_blocking(move || store.insert(key, bytes)).await??;
        Ok(())
    }

    /// Retrieves a value if it exists and has not expired.
    /// Returns `None` for cache misses, expired entries and entries written
    /// in an older format.
    #[tracing::instrument(name = "query_cache", level = "debug", skip(self))]
    pub async fn get<T: DeserializeOwned + Send + 'static>(&self, key: &str) -> Result<Option<T>> {
        let store = self.store.clone();
        let key_bytes = key.as_bytes().to_vec();

        let maybe_bytes: Option<Vec<u8>> =
            task::spawn_blocking(move || get_from_store(store, key_bytes)).await??;

        let Some(bytes) = maybe_bytes else {
            tracing::debug!("Key not found");
            return Ok(None);
        };

        let entry: StoredEntry<T> = match postcard::from_bytes(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Dropping undecodable entry: {}", e);
                self.remove(key).await?;
                return Ok(None);
            }
        };

        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        if now < entry.expires_at {
            tracing::debug!("Key found and still fresh");
            Ok(Some(entry.value))
        } else {
            tracing::debug!("Key found but expired");
            self.remove(key).await?;
            Ok(None)
        }
    }

    /// Manually removes a key from the cache.
    pub async fn remove(&self, key: &str) -> Result<()> {
        let key = key.as_bytes().to_vec();
        let store = self.store.clone();
        task::spawn_blocking(move || store.remove(key)).await??;
        Ok(())
    }
}

/// Initializes the global persistent cache. Call once at startup.
pub fn init(path: impl AsRef<Path>) -> Result<()> {
    let cache = PersistentCache::open(path)?;
    GLOBAL_CACHE
        .set(cache)
        .map_err(|_| anyhow!("Cache already initialized"))?;
    Ok(())
}

#[must_use]
pub fn is_enabled() -> bool {
    GLOBAL_CACHE.initialized()
}

fn get_cache() -> Option<&'static PersistentCache> {
    GLOBAL_CACHE.get()
}

/// `base` scaled by a random factor in 0.9..1.1 so entries written together
/// do not expire together.
#[must_use]
pub fn jittered(base: Duration) -> Duration {
    let jitter: f64 = rand::rng().random_range(0.9..1.1);
    base.mul_f64(jitter)
}

// Public, ergonomic API endpoints that use the global cache.
pub async fn put<T: Serialize + Send + Debug + 'static>(
    key: &str,
    value: T,
    ttl: Duration,
) -> Result<()> {
    match get_cache() {
        Some(cache) => cache.put(key, value, ttl).await,
        None => Ok(()),
    }
}

pub async fn get<T: DeserializeOwned + Send + 'static>(key: &str) -> Result<Option<T>> {
    match get_cache() {
        Some(cache) => cache.get(key).await,
        None => Ok(None),
    }
}

pub async fn remove(key: &str) -> Result<()> {
    match get_cache() {
        Some(cache) => cache.remove(key).await,
        None => Ok(()),
    }
}
