//! Read cache shared by every entity repository.
//!
//! Entries are addressed by [`QueryKey`]. A fresh entry is served directly.
//! An entry older than the stale time is served and refreshed in the
//! background. An invalidated entry is refetched before the read returns, so
//! a read that follows a write never sees pre-write data.

pub mod keys;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::AppConfig;
use crate::error::{CrmError, Result};
use keys::QueryKey;

type AnyValue = Arc<dyn Any + Send + Sync>;
type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// How long fetched data counts as fresh.
    pub stale_time: Duration,
    /// Extra attempts after a retryable read failure.
    pub retry: u32,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(5 * 60),
            retry: 3,
            retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

impl From<&AppConfig> for QueryConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            stale_time: Duration::from_secs(config.stale_time_secs),
            retry: config.query_retry,
            ..Self::default()
        }
    }
}

/// Snapshot of one cache entry as seen by a view.
#[derive(Debug, Clone)]
pub enum QueryState<T> {
    /// Never requested.
    Idle,
    /// First fetch in flight.
    Loading,
    /// Last fetch failed and there is no data to fall back on.
    Error(CrmError),
    Data { value: Arc<T>, is_stale: bool },
}

impl<T> QueryState<T> {
    pub fn data(&self) -> Option<&Arc<T>> {
        match self {
            Self::Data { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

#[derive(Default)]
struct CacheEntry {
    data: Option<AnyValue>,
    updated_at: Option<Instant>,
    error: Option<CrmError>,
    invalidated: bool,
    fetching: bool,
    /// Replaced on every invalidate or direct write so in-flight fetches can
    /// tell they raced one. Unique across the client, so an entry recreated
    /// after eviction never matches an older fetch.
    generation: u64,
}

enum Lookup<T> {
    Fresh(Arc<T>),
    Stale(Arc<T>),
    Missing,
}

/// Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct QueryClient {
    entries: Arc<Mutex<HashMap<QueryKey, CacheEntry>>>,
    generations: Arc<AtomicU64>,
    config: QueryConfig,
}

impl QueryClient {
    pub fn new(config: QueryConfig) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            generations: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Returns cached data for `key`, fetching with `fetch` when missing or
    /// invalidated.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, fetch: F) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let fetcher: Fetcher<T> = Arc::new(move || fetch().boxed());

        match self.lookup::<T>(&key) {
            Lookup::Fresh(value) => {
                log::trace!("cache hit {}", key);
                Ok(value)
            }
            Lookup::Stale(value) => {
                log::debug!("serving stale {} and refreshing", key);
                self.spawn_refresh(key, fetcher);
                Ok(value)
            }
            Lookup::Missing => self.run(key, fetcher).await,
        }
    }

    fn lookup<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Lookup<T> {
        let entries = self.entries.lock();
        let Some(entry) = entries.get(key) else {
            return Lookup::Missing;
        };
        if entry.invalidated {
            return Lookup::Missing;
        }
        let (Some(data), Some(updated_at)) = (&entry.data, entry.updated_at) else {
            return Lookup::Missing;
        };
        let Ok(value) = data.clone().downcast::<T>() else {
            log::warn!("cache entry {} holds a different type; refetching", key);
            return Lookup::Missing;
        };
        if updated_at.elapsed() >= self.config.stale_time {
            Lookup::Stale(value)
        } else {
            Lookup::Fresh(value)
        }
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn spawn_refresh<T: Send + Sync + 'static>(&self, key: QueryKey, fetcher: Fetcher<T>) {
        {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(&key) else {
                return;
            };
            if entry.fetching {
                return;
            }
            entry.fetching = true;
        }
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(e) = client.run(key.clone(), fetcher).await {
                log::warn!("background refresh of {} failed: {}", key, e);
            }
        });
    }

    async fn run<T: Send + Sync + 'static>(
        &self,
        key: QueryKey,
        fetcher: Fetcher<T>,
    ) -> Result<Arc<T>> {
        let generation = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(key.clone()).or_insert_with(|| CacheEntry {
                generation: self.next_generation(),
                ..CacheEntry::default()
            });
            entry.fetching = true;
            entry.generation
        };

        let mut attempt = 0;
        let result = loop {
            match fetcher().await {
                Ok(value) => break Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.retry => {
                    let delay = self.retry_delay(attempt);
                    attempt += 1;
                    log::debug!(
                        "fetch {} failed ({}); retry {}/{} in {:?}",
                        key,
                        e,
                        attempt,
                        self.config.retry,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break Err(e),
            }
        };

        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&key) else {
            log::debug!("{} was evicted while fetching; result not cached", key);
            return result.map(Arc::new);
        };
        entry.fetching = false;
        match result {
            Ok(value) => {
                let value = Arc::new(value);
                entry.data = Some(value.clone() as AnyValue);
                entry.updated_at = Some(Instant::now());
                entry.error = None;
                // A write landed while we were fetching; keep the entry dirty.
                entry.invalidated = entry.generation != generation;
                Ok(value)
            }
            Err(e) => {
                log::error!("fetch {} failed: {}", key, e);
                entry.error = Some(e.clone());
                Err(e)
            }
        }
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.config
            .retry_delay
            .saturating_mul(factor)
            .min(self.config.max_retry_delay)
    }

    /// Writes data for `key` directly, marking it fresh.
    pub fn set_data<T: Send + Sync + 'static>(&self, key: QueryKey, value: T) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key).or_default();
        entry.data = Some(Arc::new(value) as AnyValue);
        entry.updated_at = Some(Instant::now());
        entry.error = None;
        entry.invalidated = false;
        entry.generation = self.next_generation();
    }

    /// Cached data for `key` without fetching, fresh or not.
    pub fn get_data<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .and_then(|e| e.data.clone())
            .and_then(|d| d.downcast::<T>().ok())
    }

    pub fn state<T: Send + Sync + 'static>(&self, key: &QueryKey) -> QueryState<T> {
        let entries = self.entries.lock();
        let Some(entry) = entries.get(key) else {
            return QueryState::Idle;
        };
        if let Some(value) = entry.data.clone().and_then(|d| d.downcast::<T>().ok()) {
            let is_stale = entry.invalidated
                || entry
                    .updated_at
                    .map_or(true, |at| at.elapsed() >= self.config.stale_time);
            return QueryState::Data { value, is_stale };
        }
        match (&entry.error, entry.fetching) {
            (_, true) => QueryState::Loading,
            (Some(e), false) => QueryState::Error(e.clone()),
            (None, false) => QueryState::Idle,
        }
    }

    /// Marks every entry under `prefix` as needing a refetch. Returns how
    /// many entries were affected.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.entries.lock();
        let mut count = 0;
        for (key, entry) in entries.iter_mut() {
            if key.starts_with(prefix) {
                entry.invalidated = true;
                entry.generation = self.next_generation();
                count += 1;
            }
        }
        if count > 0 {
            log::debug!("invalidated {} entries under {}", count, prefix);
        }
        count
    }

    /// Drops the entry for exactly `key`.
    pub fn remove(&self, key: &QueryKey) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn client(retry: u32) -> QueryClient {
        QueryClient::new(QueryConfig {
            retry,
            ..QueryConfig::default()
        })
    }

    fn counting_fetcher(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn() -> BoxFuture<'static, Result<Vec<u32>>> + Send + Sync + 'static {
        move || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) as u32;
                Ok(vec![n])
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn fresh_entries_are_not_refetched() {
        let queries = client(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new(["contacts", "list"]);

        let first = queries
            .fetch(key.clone(), counting_fetcher(calls.clone()))
            .await
            .unwrap();
        let second = queries
            .fetch(key.clone(), counting_fetcher(calls.clone()))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidated_entries_refetch_before_returning() {
        let queries = client(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new(["contacts", "list", "{}"]);

        queries
            .fetch(key.clone(), counting_fetcher(calls.clone()))
            .await
            .unwrap();
        assert_eq!(queries.invalidate(&QueryKey::new(["contacts"])), 1);

        let after = queries
            .fetch(key.clone(), counting_fetcher(calls.clone()))
            .await
            .unwrap();
        assert_eq!(*after, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entries_are_served_then_refreshed() {
        let queries = client(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new(["organizations", "list"]);

        queries
            .fetch(key.clone(), counting_fetcher(calls.clone()))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;

        let served = queries
            .fetch(key.clone(), counting_fetcher(calls.clone()))
            .await
            .unwrap();
        assert_eq!(*served, vec![0]);

        // let the background refresh run
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*queries.get_data::<Vec<u32>>(&key).unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failures_are_retried() {
        let queries = client(2);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new(["interactions", "list"]);

        let c = calls.clone();
        let value = queries
            .fetch(key, move || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(CrmError::Network("reset".into()))
                    } else {
                        Ok(7u32)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(*value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn errors_surface_in_state() {
        let queries = client(3);
        let key = QueryKey::new(["contacts", "detail", "x"]);

        let err = queries
            .fetch::<u32, _, _>(key.clone(), || async {
                Err(CrmError::Remote {
                    status: 400,
                    message: "bad filter".into(),
                })
            })
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "bad filter");
        assert!(matches!(queries.state::<u32>(&key), QueryState::Error(_)));
        assert!(matches!(
            queries.state::<u32>(&QueryKey::new(["nope"])),
            QueryState::Idle
        ));
    }

    #[tokio::test]
    async fn set_and_remove() {
        let queries = client(0);
        let key = QueryKey::new(["contacts", "detail", "1"]);
        queries.set_data(key.clone(), "seeded".to_string());

        match queries.state::<String>(&key) {
            QueryState::Data { value, is_stale } => {
                assert_eq!(*value, "seeded");
                assert!(!is_stale);
            }
            other => panic!("unexpected state {:?}", other),
        }

        assert!(queries.remove(&key));
        assert!(!queries.contains(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_wins_over_a_fetch_already_in_flight() {
        let queries = client(0);
        let key = QueryKey::new(["contacts", "detail", "2"]);

        let background = queries.clone();
        let fetch_key = key.clone();
        let fetch = tokio::spawn(async move {
            background
                .fetch(fetch_key, || async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok("before delete".to_string())
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        queries.remove(&key);

        let returned = fetch.await.unwrap().unwrap();
        assert_eq!(*returned, "before delete");
        assert!(queries.get_data::<String>(&key).is_none());
        assert!(!queries.contains(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_reads_share_one_background_refresh() {
        let queries = client(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new(["contacts", "list"]);

        queries
            .fetch(key.clone(), counting_fetcher(calls.clone()))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;

        for _ in 0..3 {
            queries
                .fetch(key.clone(), counting_fetcher(calls.clone()))
                .await
                .unwrap();
        }
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
