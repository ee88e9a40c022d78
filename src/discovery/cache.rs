//! Compartment Name Cache
//!
//! Maps compartment ids to display names. Lookups never fail: a resolver
//! error yields a deterministic fallback name.
//! Entries are written once and never overwritten.

use crate::api::compartments::{list_all, CompartmentSource};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Per-call timeout for a name fetch on cache miss
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Inputs at or below this size are inserted under a single lock section
pub const DEFAULT_BULK_THRESHOLD: usize = 200;

/// Entries per batch on the pooled path
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Worker tasks on the pooled path
pub const DEFAULT_WORKERS: usize = 4;

/// Number of trailing id characters kept in a fallback name
const FALLBACK_SUFFIX_LEN: usize = 8;

/// Authority for compartment display names
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve_name(&self, compartment_id: &str) -> Result<String>;
}

/// Tuning knobs for the cache
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub fetch_timeout: Duration,
    pub bulk_threshold: usize,
    pub batch_size: usize,
    pub workers: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            bulk_threshold: DEFAULT_BULK_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Concurrency-safe id -> name cache with get-or-fetch
pub struct CompartmentNameCache {
    names: RwLock<HashMap<String, String>>,
    resolver: Arc<dyn NameResolver>,
    settings: CacheSettings,
}

impl CompartmentNameCache {
    pub fn new(resolver: Arc<dyn NameResolver>) -> Self {
        Self::with_settings(resolver, CacheSettings::default())
    }

    pub fn with_settings(resolver: Arc<dyn NameResolver>, settings: CacheSettings) -> Self {
        Self {
            names: RwLock::new(HashMap::new()),
            resolver,
            settings,
        }
    }

    /// Get the display name for a compartment id.
    ///
    /// A miss takes the write lock and checks again before fetching, so
    /// concurrent misses on one id trigger a single fetch.
    pub async fn get(&self, compartment_id: &str) -> String {
        {
            let names = self.names.read().await;
            if let Some(name) = names.get(compartment_id) {
                return name.clone();
            }
        }

        let mut names = self.names.write().await;
        if let Some(name) = names.get(compartment_id) {
            return name.clone();
        }

        let name = match tokio::time::timeout(
            self.settings.fetch_timeout,
            self.resolver.resolve_name(compartment_id),
        )
        .await
        {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                tracing::warn!("Failed to resolve compartment name for {}: {:#}", compartment_id, e);
                fallback_name(compartment_id)
            }
            Err(_) => {
                tracing::warn!(
                    "Timed out after {:?} resolving compartment name for {}",
                    self.settings.fetch_timeout,
                    compartment_id
                );
                fallback_name(compartment_id)
            }
        };

        names.insert(compartment_id.to_string(), name.clone());
        name
    }

    /// List every compartment of the tenancy once and cache all names
    pub async fn preload(&self, source: &dyn CompartmentSource, tenancy_id: &str) -> Result<usize> {
        let compartments = list_all(source, tenancy_id).await?;
        let count = compartments.len();
        self.insert_many(compartments.into_iter().map(|c| (c.id, c.name)).collect())
            .await;
        tracing::debug!("Preloaded {} compartment names", count);
        Ok(count)
    }

    /// Insert many id/name pairs; the first name seen for an id wins and
    /// existing entries are kept.
    ///
    /// Large inputs are split into batches that a small pool of tasks folds
    /// into partial maps, merged in input order afterwards. Both paths leave
    /// the same map behind.
    pub async fn insert_many(&self, pairs: Vec<(String, String)>) {
        if pairs.len() <= self.settings.bulk_threshold {
            let mut names = self.names.write().await;
            for (id, name) in pairs {
                names.entry(id).or_insert(name);
            }
            return;
        }

        let batch_size = self.settings.batch_size.max(1);
        let workers = self.settings.workers.max(1);
        let batches: Vec<Vec<(String, String)>> =
            pairs.chunks(batch_size).map(|chunk| chunk.to_vec()).collect();
        let per_worker = batches.len().div_ceil(workers);

        let mut lanes: Vec<Vec<Vec<(String, String)>>> = Vec::with_capacity(workers);
        let mut remaining = batches.into_iter();
        loop {
            let lane: Vec<_> = remaining.by_ref().take(per_worker).collect();
            if lane.is_empty() {
                break;
            }
            lanes.push(lane);
        }

        let handles = lanes.into_iter().map(|lane| {
            tokio::spawn(async move {
                let mut partial: Vec<(String, String)> = Vec::new();
                let mut seen = HashSet::new();
                for batch in lane {
                    for (id, name) in batch {
                        if seen.insert(id.clone()) {
                            partial.push((id, name));
                        }
                    }
                }
                partial
            })
        });
        let partials = futures::future::join_all(handles).await;

        let mut names = self.names.write().await;
        for partial in partials {
            match partial {
                Ok(partial) => {
                    for (id, name) in partial {
                        names.entry(id).or_insert(name);
                    }
                }
                Err(e) => tracing::warn!("Name preload worker failed: {}", e),
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.names.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.names.read().await.is_empty()
    }

    /// Copy of the current map
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.names.read().await.clone()
    }
}

/// Display form for an id whose name could not be resolved
pub fn fallback_name(compartment_id: &str) -> String {
    let chars: Vec<char> = compartment_id.chars().collect();
    let start = chars.len().saturating_sub(FALLBACK_SUFFIX_LEN);
    let suffix: String = chars[start..].iter().collect();
    format!("compartment-{}", suffix)
}
