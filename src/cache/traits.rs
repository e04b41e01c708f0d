//! Core traits and types for the caching system.

use serde::{de::DeserializeOwned, Serialize};
use std::fmt::{Debug, Display};

/// Trait for entities that can live in the query cache.
///
/// Identity equality is by `id`. Entities that have not been created on the
/// remote side yet are represented by the separate `Draft` type, which has no id.
pub trait Cacheable:
  Clone + Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
  /// Stable identifier assigned by the remote store
  type Id: Clone + Debug + Display + PartialEq + Send + Sync + 'static;

  /// Not-yet-created form of the entity (no id)
  type Draft: Clone + Debug + Send + Sync + Serialize + 'static;

  fn id(&self) -> &Self::Id;

  /// Entity type name used in log fields (e.g., "todo")
  fn entity_type() -> &'static str;
}

/// Value stored under one query key.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue<T> {
  /// Ordered result of a collection query (e.g., `todos`)
  Collection(Vec<T>),
  /// Single entity (e.g., `todos/2`)
  Detail(T),
}

impl<T: Cacheable> CacheValue<T> {
  pub fn as_collection(&self) -> Option<&[T]> {
    match self {
      CacheValue::Collection(items) => Some(items),
      CacheValue::Detail(_) => None,
    }
  }

  pub fn len(&self) -> usize {
    match self {
      CacheValue::Collection(items) => items.len(),
      CacheValue::Detail(_) => 1,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
