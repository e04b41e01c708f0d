use futures::future::BoxFuture;

use crate::cache::{CacheValue, Cacheable, QueryKey};

use super::ApiError;

/// The authoritative store behind the cache.
///
/// Futures are `'static` so callers can spawn them without holding a borrow
/// of the store or of the cache.
pub trait Remote<T: Cacheable>: Send + Sync + 'static {
  /// Load the value addressed by a query key (collection or detail).
  fn fetch(&self, key: &QueryKey) -> BoxFuture<'static, Result<CacheValue<T>, ApiError>>;

  /// Create an entity; the response carries the server-assigned id.
  fn create(&self, draft: T::Draft) -> BoxFuture<'static, Result<T, ApiError>>;

  /// Replace an entity with the full payload.
  fn update(&self, item: T) -> BoxFuture<'static, Result<T, ApiError>>;

  fn delete(&self, id: T::Id) -> BoxFuture<'static, Result<(), ApiError>>;
}
