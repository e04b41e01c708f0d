//! Structured query keys.

use std::fmt;

/// One scalar segment of a query key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeySegment {
  Name(String),
  Id(u64),
}

impl From<&str> for KeySegment {
  fn from(name: &str) -> Self {
    KeySegment::Name(name.to_string())
  }
}

impl From<String> for KeySegment {
  fn from(name: String) -> Self {
    KeySegment::Name(name)
  }
}

impl From<u64> for KeySegment {
  fn from(id: u64) -> Self {
    KeySegment::Id(id)
  }
}

impl fmt::Display for KeySegment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      KeySegment::Name(name) => f.write_str(name),
      KeySegment::Id(id) => write!(f, "{}", id),
    }
  }
}

/// Ordered tuple of segments addressing one cache entry.
///
/// The first segment is always the resource name; further segments are
/// identifiers, e.g. `["todos"]` for the list and `["todos", 2]` for one item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
  pub fn new(resource: impl Into<String>) -> Self {
    Self(vec![KeySegment::Name(resource.into())])
  }

  /// Append a segment.
  pub fn with(mut self, segment: impl Into<KeySegment>) -> Self {
    self.0.push(segment.into());
    self
  }

  pub fn segments(&self) -> &[KeySegment] {
    &self.0
  }

  /// The resource name (first segment).
  pub fn resource(&self) -> &str {
    match self.0.first() {
      Some(KeySegment::Name(name)) => name,
      _ => "",
    }
  }

  /// The identifier segment directly after the resource name, if any.
  pub fn id(&self) -> Option<u64> {
    match self.0.get(1) {
      Some(KeySegment::Id(id)) => Some(*id),
      _ => None,
    }
  }

  /// Whether `prefix` addresses this key or one of its ancestors.
  pub fn starts_with(&self, prefix: &QueryKey) -> bool {
    self.0.starts_with(&prefix.0)
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, segment) in self.0.iter().enumerate() {
      if i > 0 {
        f.write_str("/")?;
      }
      write!(f, "{}", segment)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display_joins_segments() {
    assert_eq!(QueryKey::new("todos").to_string(), "todos");
    assert_eq!(QueryKey::new("todos").with(2u64).to_string(), "todos/2");
  }

  #[test]
  fn test_resource_and_id() {
    let key = QueryKey::new("todos").with(7u64);
    assert_eq!(key.resource(), "todos");
    assert_eq!(key.id(), Some(7));
    assert_eq!(QueryKey::new("todos").id(), None);
  }

  #[test]
  fn test_prefix_matching() {
    let list = QueryKey::new("todos");
    let detail = QueryKey::new("todos").with(1u64);
    let other = QueryKey::new("users").with(1u64);

    assert!(detail.starts_with(&list));
    assert!(list.starts_with(&list));
    assert!(!list.starts_with(&detail));
    assert!(!other.starts_with(&list));
  }

  #[test]
  fn test_segment_kinds_are_distinct() {
    let by_name = QueryKey::new("todos").with("1");
    let by_id = QueryKey::new("todos").with(1u64);
    assert_ne!(by_name, by_id);
  }
}
