use serde::{Deserialize, Serialize};

use crate::cache::Cacheable;

/// A todo item as served by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
  pub id: u64,
  pub title: String,
  pub completed: bool,
  pub user_id: u64,
}

/// Payload for creating a todo; the server assigns the id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTodo {
  pub title: String,
  pub completed: bool,
  pub user_id: u64,
}

impl NewTodo {
  pub fn new(title: impl Into<String>, user_id: u64) -> Self {
    Self {
      title: title.into(),
      completed: false,
      user_id,
    }
  }
}

impl Todo {
  /// Copy of this todo with the completion flag flipped.
  pub fn toggled(&self) -> Self {
    Self {
      completed: !self.completed,
      ..self.clone()
    }
  }
}

impl Cacheable for Todo {
  type Id = u64;
  type Draft = NewTodo;

  fn id(&self) -> &u64 {
    &self.id
  }

  fn entity_type() -> &'static str {
    "todo"
  }
}
