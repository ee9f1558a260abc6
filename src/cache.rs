//! Structure cache: deduplicated, time-boxed loads of door descriptions.
//!
//! One cache is built per process and shared by reference between every
//! door. Entries are keyed by URL and hold the *load* (pending or settled),
//! never the raw document, so every request for a URL inside the entry's
//! lifetime observes the same outcome and at most one fetch is in flight.
//! Failed loads stay cached until they expire, which throttles retries
//! against a broken source.

use crate::clock::Clock;
use crate::document::{DoorSource, RawDoorStructure};
use crate::error::LoadError;
use crate::structure::DoorStructure;
use crate::types::DoorConfig;
use futures::future::{BoxFuture, FutureExt, Shared};
use log::debug;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub type LoadResult = Result<Arc<DoorStructure>, LoadError>;
pub type FetchFuture = BoxFuture<'static, Result<serde_json::Value, LoadError>>;

type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Retrieves a JSON document by URL.
pub trait Fetcher: Send + Sync {
    fn fetch_json(&self, url: &str) -> FetchFuture;
}

/// Blocking HTTP(S) fetcher run on tokio's blocking pool.
#[cfg(feature = "server")]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

#[cfg(feature = "server")]
impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

#[cfg(feature = "server")]
impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[cfg(feature = "server")]
impl Fetcher for HttpFetcher {
    fn fetch_json(&self, url: &str) -> FetchFuture {
        let agent = self.agent.clone();
        let url = url.to_string();
        async move {
            let target = url.clone();
            let fetched = tokio::task::spawn_blocking(move || -> Result<serde_json::Value, String> {
                let response = agent.get(&target).call().map_err(|e| e.to_string())?;
                response
                    .into_json::<serde_json::Value>()
                    .map_err(|e| e.to_string())
            })
            .await
            .map_err(|e| LoadError::Fetch {
                url: url.clone(),
                message: e.to_string(),
            })?;
            fetched.map_err(|message| LoadError::Fetch { url, message })
        }
        .boxed()
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

struct CacheEntry {
    expires_at: Duration,
    load: SharedLoad,
}

pub struct StructureCache {
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl StructureCache {
    pub fn new(fetcher: Arc<dyn Fetcher>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            fetcher,
            clock,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(fetcher: Arc<dyn Fetcher>, clock: Arc<dyn Clock>, config: &DoorConfig) -> Self {
        Self::new(fetcher, clock, Duration::from_secs_f64(config.cache_ttl_secs))
    }

    /// Resolve a source into a normalized structure.
    ///
    /// Inline structures are normalized and returned directly; URLs go
    /// through the shared cache.
    pub async fn load(&self, source: &DoorSource) -> LoadResult {
        match source {
            DoorSource::Inline(raw) => Ok(Arc::new(DoorStructure::normalize(raw))),
            DoorSource::Url(url) => self.load_url(url).await,
        }
    }

    pub async fn load_url(&self, url: &str) -> LoadResult {
        let load = self.lookup_or_start(url);
        load.await
    }

    fn lookup_or_start(&self, url: &str) -> SharedLoad {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let before = entries.len();
        entries.retain(|_, e| e.expires_at >= now);
        if entries.len() < before {
            debug!("Evicted {} expired structure cache entries", before - entries.len());
        }

        match entries.entry(url.to_string()) {
            Entry::Occupied(entry) => entry.get().load.clone(),
            Entry::Vacant(slot) => {
                debug!("Fetching door structure from {}", url);
                let fetch = self.fetcher.fetch_json(url);
                let url = url.to_string();
                let load = async move {
                    let value = fetch.await?;
                    let raw = RawDoorStructure::from_json(value).map_err(|e| LoadError::Parse {
                        url: url.clone(),
                        message: e.to_string(),
                    })?;
                    Ok::<_, LoadError>(Arc::new(DoorStructure::normalize(&raw)))
                }
                .boxed()
                .shared();

                slot.insert(CacheEntry {
                    expires_at: now + self.ttl,
                    load: load.clone(),
                });
                load
            }
        }
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        self.entries.lock().retain(|_, e| e.expires_at >= now);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
