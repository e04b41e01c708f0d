//! Optimistic mutations against the remote store.
//!
//! One mutation attempt runs through a fixed sequence of phases:
//!
//! ```text
//! Idle -> Patched -> Confirmed | RolledBack -> Stale -> Idle
//! ```
//!
//! Beginning an attempt is synchronous: in-flight refreshes of the target key
//! are cancelled, the current entry is captured in a [`MutationContext`], the
//! provisional patch is written, and the network call is spawned. Network
//! results come back over one channel, so attempts settle in the order their
//! responses arrive. Settling consumes the context exactly once (discard on
//! success, restore on failure) and then always marks the key stale.
//!
//! Attempts on the same key are not serialized against each other: a
//! rollback from one attempt can overwrite the provisional patch of another
//! that is still pending. The last attempt to settle wins, and the
//! refresh scheduled by every settle reconciles with the server.

use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{ApiError, Remote};
use crate::cache::{CacheValue, Cacheable, QueryCache, QueryKey};

/// Logical write operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
  Create,
  Update,
  Delete,
}

impl fmt::Display for MutationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      MutationKind::Create => "create",
      MutationKind::Update => "update",
      MutationKind::Delete => "delete",
    };
    f.write_str(name)
  }
}

/// Identifier of one mutation attempt, unique per coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(u64);

impl fmt::Display for MutationId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// Phase of one mutation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Idle,
  Patched,
  Confirmed,
  RolledBack,
  Stale,
}

/// Provisional change applied to a cache entry
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T: Cacheable> {
  /// Replace the element with the same id
  Replace(T),
  /// Remove the element with this id
  Remove(T::Id),
  /// Leave the entry as-is
  Keep,
}

/// Apply a patch to a cached value.
///
/// Returns `None` when the patch does not change anything, e.g. when no
/// element carries the patched id. Elements other than the patched one keep
/// their positions.
pub fn apply_patch<T: Cacheable>(value: &CacheValue<T>, patch: &Patch<T>) -> Option<CacheValue<T>> {
  match (value, patch) {
    (CacheValue::Collection(items), Patch::Replace(updated)) => {
      let position = items.iter().position(|item| item.id() == updated.id())?;
      let mut items = items.clone();
      items[position] = updated.clone();
      Some(CacheValue::Collection(items))
    }
    (CacheValue::Collection(items), Patch::Remove(id)) => {
      let position = items.iter().position(|item| item.id() == id)?;
      let mut items = items.clone();
      items.remove(position);
      Some(CacheValue::Collection(items))
    }
    (CacheValue::Detail(item), Patch::Replace(updated)) if item.id() == updated.id() => {
      Some(CacheValue::Detail(updated.clone()))
    }
    // A detail entry is dropped by the refresh that follows a delete
    _ => None,
  }
}

/// Pre-mutation snapshot of the entry an attempt touches.
///
/// Consumed exactly once: [`discard`](Self::discard) on success or
/// [`restore`](Self::restore) on failure.
#[derive(Debug)]
pub struct MutationContext<T> {
  key: QueryKey,
  snapshot: Option<CacheValue<T>>,
}

impl<T: Cacheable> MutationContext<T> {
  fn capture(cache: &QueryCache<T>, key: &QueryKey) -> Self {
    Self {
      key: key.clone(),
      snapshot: cache.read(key).cloned(),
    }
  }

  fn discard(self) {}

  /// Put the entry back exactly as it was, including absence.
  fn restore(self, cache: &mut QueryCache<T>) {
    match self.snapshot {
      Some(value) => cache.write(self.key, value),
      None => {
        cache.remove(&self.key);
      }
    }
  }
}

/// Final result of one attempt
#[derive(Debug)]
pub enum Settled<T> {
  /// The server accepted the write; carries its response body, if any
  Confirmed(Option<T>),
  /// The write failed and the cache was restored before reporting
  RolledBack(ApiError),
}

/// A settled attempt as reported to the caller.
#[derive(Debug)]
pub struct MutationOutcome<T> {
  pub id: MutationId,
  pub kind: MutationKind,
  pub key: QueryKey,
  pub settled: Settled<T>,
  /// Every phase the attempt went through, in order
  pub phases: Vec<Phase>,
}

impl<T> MutationOutcome<T> {
  pub fn is_confirmed(&self) -> bool {
    matches!(self.settled, Settled::Confirmed(_))
  }

  pub fn error(&self) -> Option<&ApiError> {
    match &self.settled {
      Settled::RolledBack(error) => Some(error),
      Settled::Confirmed(_) => None,
    }
  }

  pub fn into_result(self) -> Result<Option<T>, ApiError> {
    match self.settled {
      Settled::Confirmed(response) => Ok(response),
      Settled::RolledBack(error) => Err(error),
    }
  }
}

/// Count of unresolved attempts per operation kind.
///
/// Only used to keep a view from submitting duplicates; the cache protocol
/// does not depend on it.
#[derive(Debug, Default)]
pub struct InFlight {
  counts: HashMap<MutationKind, usize>,
}

impl InFlight {
  fn begin(&mut self, kind: MutationKind) {
    *self.counts.entry(kind).or_default() += 1;
  }

  fn finish(&mut self, kind: MutationKind) {
    if let Some(count) = self.counts.get_mut(&kind) {
      *count = count.saturating_sub(1);
    }
  }

  pub fn count(&self, kind: MutationKind) -> usize {
    self.counts.get(&kind).copied().unwrap_or(0)
  }

  pub fn is_pending(&self, kind: MutationKind) -> bool {
    self.count(kind) > 0
  }

  pub fn total(&self) -> usize {
    self.counts.values().sum()
  }
}

struct Attempt<T> {
  kind: MutationKind,
  context: MutationContext<T>,
  phases: Vec<Phase>,
}

type Response<T> = Result<Option<T>, ApiError>;

/// Runs optimistic writes against a remote store and reconciles the cache.
pub struct MutationCoordinator<T: Cacheable> {
  remote: Arc<dyn Remote<T>>,
  next_id: u64,
  attempts: HashMap<MutationId, Attempt<T>>,
  in_flight: InFlight,
  tx: mpsc::UnboundedSender<(MutationId, Response<T>)>,
  rx: mpsc::UnboundedReceiver<(MutationId, Response<T>)>,
}

impl<T: Cacheable> MutationCoordinator<T> {
  pub fn new(remote: Arc<dyn Remote<T>>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      remote,
      next_id: 0,
      attempts: HashMap::new(),
      in_flight: InFlight::default(),
      tx,
      rx,
    }
  }

  /// Optimistically replace `item` in the entry at `key`, then `PUT` it.
  ///
  /// If no cached element has the item's id the entry is left unchanged,
  /// but the request is still sent.
  pub fn update(&mut self, cache: &mut QueryCache<T>, item: T, key: QueryKey) -> MutationId {
    let request = self.remote.update(item.clone()).map(|r| r.map(Some)).boxed();
    self.begin(cache, MutationKind::Update, key, Patch::Replace(item), request)
  }

  /// Optimistically remove `id` from the entry at `key`, then `DELETE` it.
  pub fn delete(&mut self, cache: &mut QueryCache<T>, id: T::Id, key: QueryKey) -> MutationId {
    let request = self.remote.delete(id.clone()).map(|r| r.map(|()| None)).boxed();
    self.begin(cache, MutationKind::Delete, key, Patch::Remove(id), request)
  }

  /// `POST` a draft. There is nothing to patch until the server assigns an
  /// id, so the entry at `key` only changes through the follow-up refresh.
  pub fn create(&mut self, cache: &mut QueryCache<T>, draft: T::Draft, key: QueryKey) -> MutationId {
    let request = self.remote.create(draft).map(|r| r.map(Some)).boxed();
    self.begin(cache, MutationKind::Create, key, Patch::Keep, request)
  }

  fn begin(
    &mut self,
    cache: &mut QueryCache<T>,
    kind: MutationKind,
    key: QueryKey,
    patch: Patch<T>,
    request: BoxFuture<'static, Response<T>>,
  ) -> MutationId {
    let id = MutationId(self.next_id);
    self.next_id += 1;

    // A late refresh must not overwrite the provisional patch
    let cancelled = cache.cancel_in_flight(&key);

    let context = MutationContext::capture(cache, &key);

    match cache.read(&key).and_then(|current| apply_patch(current, &patch)) {
      Some(patched) => {
        cache.write(key.clone(), patched);
        debug!(mutation_id = %id, %kind, %key, cancelled, "Optimistic patch applied");
      }
      None => debug!(mutation_id = %id, %kind, %key, cancelled, "Optimistic patch is a no-op"),
    }

    self.attempts.insert(
      id,
      Attempt {
        kind,
        context,
        phases: vec![Phase::Idle, Phase::Patched],
      },
    );
    self.in_flight.begin(kind);

    let tx = self.tx.clone();
    tokio::spawn(async move {
      // A panicking request still has to settle, or its snapshot is never restored
      let response = match AssertUnwindSafe(request).catch_unwind().await {
        Ok(response) => response,
        Err(_) => Err(ApiError::Request("write task panicked".to_string())),
      };
      // The coordinator may have been dropped; nothing left to reconcile
      let _ = tx.send((id, response));
    });

    info!(mutation_id = %id, %kind, %key, entity = T::entity_type(), "Mutation started");
    id
  }

  /// Settle every attempt whose response has arrived, in arrival order.
  ///
  /// Call this from the cache owner's event loop tick.
  pub fn poll(&mut self, cache: &mut QueryCache<T>) -> Vec<MutationOutcome<T>> {
    let mut outcomes = Vec::new();
    while let Ok((id, response)) = self.rx.try_recv() {
      outcomes.extend(self.settle(cache, id, response));
    }
    outcomes
  }

  /// Wait for the next attempt to settle.
  ///
  /// Returns `None` when no attempt is pending.
  pub async fn next_settled(&mut self, cache: &mut QueryCache<T>) -> Option<MutationOutcome<T>> {
    loop {
      if self.attempts.is_empty() {
        return None;
      }
      let (id, response) = self.rx.recv().await?;
      if let Some(outcome) = self.settle(cache, id, response) {
        return Some(outcome);
      }
    }
  }

  fn settle(
    &mut self,
    cache: &mut QueryCache<T>,
    id: MutationId,
    response: Response<T>,
  ) -> Option<MutationOutcome<T>> {
    let Attempt {
      kind,
      context,
      mut phases,
    } = self.attempts.remove(&id)?;
    self.in_flight.finish(kind);
    let key = context.key.clone();

    let settled = match response {
      Ok(body) => {
        context.discard();
        phases.push(Phase::Confirmed);
        info!(mutation_id = %id, %kind, %key, "Mutation confirmed");
        Settled::Confirmed(body)
      }
      Err(error) => {
        context.restore(cache);
        phases.push(Phase::RolledBack);
        warn!(mutation_id = %id, %kind, %key, %error, "Mutation failed, rolled back");
        Settled::RolledBack(error)
      }
    };

    // Reconcile with the server whatever the outcome. A refresh issued before
    // the write landed may carry pre-write data, so it is restarted.
    let restarted = cache.cancel_in_flight(&key);
    cache.mark_stale(&key);
    if restarted > 0 {
      debug!(mutation_id = %id, %key, restarted, "Restarted refresh after settle");
    }
    phases.push(Phase::Stale);
    phases.push(Phase::Idle);

    Some(MutationOutcome {
      id,
      kind,
      key,
      settled,
      phases,
    })
  }

  pub fn in_flight(&self) -> &InFlight {
    &self.in_flight
  }

  pub fn is_pending(&self, kind: MutationKind) -> bool {
    self.in_flight.is_pending(kind)
  }
}
