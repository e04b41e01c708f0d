//! Single-owner cache store with background refresh.

use chrono::{DateTime, Duration, Utc};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiError, Remote};

use super::key::QueryKey;
use super::traits::{CacheValue, Cacheable};

struct Entry<T> {
  value: CacheValue<T>,
  updated_at: DateTime<Utc>,
  /// Last time a reader looked at the entry; writes do not count
  last_read: Cell<DateTime<Utc>>,
  stale: bool,
}

/// Error left behind by the latest failed refresh of a key
struct RefreshError {
  error: ApiError,
  failed_at: DateTime<Utc>,
}

/// A background refresh owned by the cache.
struct Refresh<T> {
  rx: oneshot::Receiver<Result<CacheValue<T>, ApiError>>,
  handle: JoinHandle<()>,
}

/// Result of a background refresh, reported by [`QueryCache::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
  /// Fresh data was written to the entry
  Applied(QueryKey),
  /// The refresh failed; any previous value is still served
  Failed(QueryKey, ApiError),
}

/// What a view needs to know about one entry besides its value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryStatus {
  pub is_fetching: bool,
  pub is_stale: bool,
  pub updated_at: Option<DateTime<Utc>>,
  pub error: Option<ApiError>,
}

/// In-memory query cache.
///
/// The cache is owned by exactly one task and every operation borrows it
/// directly, so no two cache operations can ever run at the same time.
/// Refreshes run as spawned tasks and are folded back in by [`poll`](Self::poll).
pub struct QueryCache<T: Cacheable> {
  remote: Arc<dyn Remote<T>>,
  entries: HashMap<QueryKey, Entry<T>>,
  refreshes: HashMap<QueryKey, Refresh<T>>,
  errors: HashMap<QueryKey, RefreshError>,
  /// How long before cached data is considered stale
  stale_time: Duration,
  /// How long an unread entry is kept before it is evicted
  gc_time: Duration,
}

impl<T: Cacheable> QueryCache<T> {
  pub fn new(remote: Arc<dyn Remote<T>>) -> Self {
    Self {
      remote,
      entries: HashMap::new(),
      refreshes: HashMap::new(),
      errors: HashMap::new(),
      stale_time: Duration::minutes(5),
      gc_time: Duration::minutes(10),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Set how long unread entries survive garbage collection.
  pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
    self.gc_time = gc_time;
    self
  }

  /// Current value at `key`. Never touches the network.
  pub fn read(&self, key: &QueryKey) -> Option<&CacheValue<T>> {
    self.entries.get(key).map(|entry| {
      entry.last_read.set(Utc::now());
      &entry.value
    })
  }

  /// Replace (or create) the entry at `key`. Never touches the network.
  pub fn write(&mut self, key: QueryKey, value: CacheValue<T>) {
    self.errors.remove(&key);
    let now = Utc::now();
    // A refresh must not keep an entry nobody reads alive
    let last_read = self
      .entries
      .get(&key)
      .map(|entry| entry.last_read.get())
      .unwrap_or(now);
    self.entries.insert(
      key,
      Entry {
        value,
        updated_at: now,
        last_read: Cell::new(last_read),
        stale: false,
      },
    );
  }

  /// Drop the entry at `key`, returning its value.
  pub fn remove(&mut self, key: &QueryKey) -> Option<CacheValue<T>> {
    self.entries.remove(key).map(|entry| entry.value)
  }

  /// Start loading `key` unless a refresh for it is already outstanding.
  ///
  /// Returns whether a new refresh was scheduled.
  pub fn fetch(&mut self, key: &QueryKey) -> bool {
    if self.refreshes.contains_key(key) {
      debug!(%key, "Refresh already in flight, coalescing");
      return false;
    }

    let (tx, rx) = oneshot::channel();
    let future = self.remote.fetch(key);
    let handle = tokio::spawn(async move {
      // Ignore send errors - the refresh may have been cancelled
      let _ = tx.send(future.await);
    });

    debug!(%key, entity = T::entity_type(), "Refresh scheduled");
    self.refreshes.insert(key.clone(), Refresh { rx, handle });
    true
  }

  /// Flag every entry under `key` as stale and schedule its refresh.
  ///
  /// Does not wait for the refresh. Keys with a refresh already outstanding
  /// are not scheduled twice. Returns the number of refreshes scheduled.
  pub fn mark_stale(&mut self, key: &QueryKey) -> usize {
    let mut targets: Vec<QueryKey> = self
      .entries
      .iter_mut()
      .filter(|(k, _)| k.starts_with(key))
      .map(|(k, entry)| {
        entry.stale = true;
        k.clone()
      })
      .collect();

    if targets.is_empty() {
      targets.push(key.clone());
    }

    targets.iter().filter(|k| self.fetch(k)).count()
  }

  /// Abort outstanding refreshes under `key`.
  ///
  /// Best effort: the receiver is dropped, so a result that has not been
  /// polled yet is discarded, but a request already answered by the server
  /// is not undone. Returns the number of refreshes cancelled.
  pub fn cancel_in_flight(&mut self, key: &QueryKey) -> usize {
    let cancelled: Vec<QueryKey> = self
      .refreshes
      .keys()
      .filter(|k| k.starts_with(key))
      .cloned()
      .collect();

    for k in &cancelled {
      if let Some(refresh) = self.refreshes.remove(k) {
        refresh.handle.abort();
        debug!(key = %k, "Refresh cancelled");
      }
    }

    cancelled.len()
  }

  /// Fold finished refreshes into the cache.
  ///
  /// Returns one outcome per refresh that finished since the last poll.
  /// Call this from the owning task's event loop tick.
  pub fn poll(&mut self) -> Vec<RefreshOutcome> {
    let mut finished = Vec::new();

    for (key, refresh) in self.refreshes.iter_mut() {
      match refresh.rx.try_recv() {
        Ok(result) => finished.push((key.clone(), Some(result))),
        Err(oneshot::error::TryRecvError::Empty) => {}
        // Cancelled refreshes are no longer in the map, so the task panicked
        Err(oneshot::error::TryRecvError::Closed) => finished.push((key.clone(), None)),
      }
    }

    let mut outcomes = Vec::with_capacity(finished.len());
    for (key, result) in finished {
      self.refreshes.remove(&key);

      match result {
        Some(Ok(value)) => {
          info!(%key, items = value.len(), "Refresh applied");
          self.write(key.clone(), value);
          outcomes.push(RefreshOutcome::Applied(key));
        }
        Some(Err(error)) => {
          // Keep serving the previous value
          warn!(%key, %error, "Refresh failed");
          self.record_error(&key, error.clone());
          outcomes.push(RefreshOutcome::Failed(key, error));
        }
        None => {
          let error = ApiError::Request("refresh task ended without a result".to_string());
          warn!(%key, %error, "Refresh failed");
          self.record_error(&key, error.clone());
          outcomes.push(RefreshOutcome::Failed(key, error));
        }
      }
    }

    outcomes
  }

  fn record_error(&mut self, key: &QueryKey, error: ApiError) {
    self.errors.insert(
      key.clone(),
      RefreshError {
        error,
        failed_at: Utc::now(),
      },
    );
  }

  pub fn is_fetching(&self, key: &QueryKey) -> bool {
    self.refreshes.contains_key(key)
  }

  /// Whether the entry was flagged stale or has outlived the stale time.
  pub fn is_stale(&self, key: &QueryKey) -> bool {
    self
      .entries
      .get(key)
      .map(|entry| entry.stale || self.is_expired(entry.updated_at))
      .unwrap_or(false)
  }

  /// Check if cached data is stale based on its updated_at timestamp.
  fn is_expired(&self, updated_at: DateTime<Utc>) -> bool {
    Utc::now() - updated_at > self.stale_time
  }

  /// Mark every entry that has outlived the stale time, scheduling refreshes.
  pub fn refresh_expired(&mut self) -> usize {
    let expired: Vec<QueryKey> = self
      .entries
      .iter()
      .filter(|(k, entry)| {
        !entry.stale && !self.refreshes.contains_key(*k) && self.is_expired(entry.updated_at)
      })
      .map(|(k, _)| k.clone())
      .collect();

    expired.iter().map(|k| self.mark_stale(k)).sum()
  }

  /// Evict entries nobody has read for longer than the gc time.
  ///
  /// Keys with a refresh outstanding are kept. Errors of keys without an
  /// entry expire the same way. Returns the number of entries evicted.
  pub fn collect_garbage(&mut self) -> usize {
    let now = Utc::now();
    let gc_time = self.gc_time;
    let refreshes = &self.refreshes;

    let before = self.entries.len();
    self.entries.retain(|key, entry| {
      let keep = refreshes.contains_key(key) || now - entry.last_read.get() <= gc_time;
      if !keep {
        debug!(%key, "Evicting unused entry");
      }
      keep
    });
    let evicted = before - self.entries.len();

    let entries = &self.entries;
    self.errors.retain(|key, failed| {
      entries.contains_key(key) || refreshes.contains_key(key) || now - failed.failed_at <= gc_time
    });

    if evicted > 0 {
      info!(evicted, remaining = self.entries.len(), "Garbage collected cache entries");
    }
    evicted
  }

  pub fn status(&self, key: &QueryKey) -> EntryStatus {
    EntryStatus {
      is_fetching: self.is_fetching(key),
      is_stale: self.is_stale(key),
      updated_at: self.entries.get(key).map(|entry| entry.updated_at),
      error: self.errors.get(key).map(|failed| failed.error.clone()),
    }
  }
}
