//! In-memory remote store for unit tests.

use futures::future::{BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::api::{ApiError, NewTodo, Remote, Todo, TODOS};
use crate::cache::{CacheValue, QueryKey};

pub fn todo(id: u64, completed: bool) -> Todo {
  Todo {
    id,
    title: format!("todo {}", id),
    completed,
    user_id: 1,
  }
}

/// Scripted behavior for the next write call.
struct Script {
  result: Result<(), ApiError>,
  gate: Option<Arc<Notify>>,
  panics: bool,
}

#[derive(Default)]
struct State {
  todos: Vec<Todo>,
  scripts: VecDeque<Script>,
  fetch_gate: Option<Arc<Notify>>,
  fetch_error: Option<ApiError>,
  fetch_panics: bool,
  fetches: usize,
  writes: Vec<String>,
}

/// Fake store: fetches serve `todos`, successful writes mutate it.
///
/// A fetch answers with the server state as of the moment it was issued.
/// Writes succeed immediately unless scripted. Gated calls wait for the
/// returned `Notify` before answering, which lets a test observe the cache
/// while a request is still in flight.
#[derive(Clone, Default)]
pub struct FakeRemote {
  state: Arc<Mutex<State>>,
}

impl FakeRemote {
  pub fn new(todos: Vec<Todo>) -> Self {
    let remote = Self::default();
    remote.state.lock().unwrap().todos = todos;
    remote
  }

  /// Hold the next write open until the returned gate is notified.
  pub fn gate_next_write(&self, result: Result<(), ApiError>) -> Arc<Notify> {
    let gate = Arc::new(Notify::new());
    self.state.lock().unwrap().scripts.push_back(Script {
      result,
      gate: Some(gate.clone()),
      panics: false,
    });
    gate
  }

  /// Fail the next write immediately.
  pub fn fail_next_write(&self, error: ApiError) {
    self.state.lock().unwrap().scripts.push_back(Script {
      result: Err(error),
      gate: None,
      panics: false,
    });
  }

  /// Make the next write panic inside its task.
  pub fn panic_next_write(&self) {
    self.state.lock().unwrap().scripts.push_back(Script {
      result: Ok(()),
      gate: None,
      panics: true,
    });
  }

  /// Hold every fetch until the returned gate is notified (once per fetch).
  pub fn gate_fetches(&self) -> Arc<Notify> {
    let gate = Arc::new(Notify::new());
    self.state.lock().unwrap().fetch_gate = Some(gate.clone());
    gate
  }

  pub fn fail_fetches(&self, error: ApiError) {
    self.state.lock().unwrap().fetch_error = Some(error);
  }

  pub fn panic_fetches(&self) {
    self.state.lock().unwrap().fetch_panics = true;
  }

  pub fn fetch_count(&self) -> usize {
    self.state.lock().unwrap().fetches
  }

  /// Write calls in issue order, e.g. `PUT todos/2`.
  pub fn writes(&self) -> Vec<String> {
    self.state.lock().unwrap().writes.clone()
  }

  pub fn server_todos(&self) -> Vec<Todo> {
    self.state.lock().unwrap().todos.clone()
  }

  /// Change server-side data behind the cache's back.
  pub fn set_server_todos(&self, todos: Vec<Todo>) {
    self.state.lock().unwrap().todos = todos;
  }

  fn begin_write(&self, call: String) -> Script {
    let mut state = self.state.lock().unwrap();
    state.writes.push(call);
    state.scripts.pop_front().unwrap_or(Script {
      result: Ok(()),
      gate: None,
      panics: false,
    })
  }
}

async fn wait(gate: Option<Arc<Notify>>) {
  if let Some(gate) = gate {
    gate.notified().await;
  }
}

impl Remote<Todo> for FakeRemote {
  fn fetch(&self, key: &QueryKey) -> BoxFuture<'static, Result<CacheValue<Todo>, ApiError>> {
    let (gate, error, panics, todos) = {
      let mut state = self.state.lock().unwrap();
      state.fetches += 1;
      (
        state.fetch_gate.clone(),
        state.fetch_error.clone(),
        state.fetch_panics,
        state.todos.clone(),
      )
    };
    let key = key.clone();

    async move {
      wait(gate).await;
      if panics {
        panic!("fetch of {} failed hard", key);
      }
      if let Some(error) = error {
        return Err(error);
      }

      match (key.resource(), key.id()) {
        (TODOS, None) => Ok(CacheValue::Collection(todos)),
        (TODOS, Some(id)) => todos
          .into_iter()
          .find(|t| t.id == id)
          .map(CacheValue::Detail)
          .ok_or(ApiError::Status {
            status: 404,
            body: String::new(),
          }),
        _ => Err(ApiError::Request(format!("no endpoint for {}", key))),
      }
    }
    .boxed()
  }

  fn create(&self, draft: NewTodo) -> BoxFuture<'static, Result<Todo, ApiError>> {
    let script = self.begin_write(format!("POST {}", TODOS));
    let state = self.state.clone();

    async move {
      wait(script.gate).await;
      if script.panics {
        panic!("write failed hard");
      }
      script.result?;

      let mut state = state.lock().unwrap();
      let id = state.todos.iter().map(|t| t.id).max().unwrap_or(0) + 1;
      let created = Todo {
        id,
        title: draft.title,
        completed: draft.completed,
        user_id: draft.user_id,
      };
      state.todos.push(created.clone());
      Ok(created)
    }
    .boxed()
  }

  fn update(&self, item: Todo) -> BoxFuture<'static, Result<Todo, ApiError>> {
    let script = self.begin_write(format!("PUT {}/{}", TODOS, item.id));
    let state = self.state.clone();

    async move {
      wait(script.gate).await;
      if script.panics {
        panic!("write failed hard");
      }
      script.result?;

      let mut state = state.lock().unwrap();
      if let Some(existing) = state.todos.iter_mut().find(|t| t.id == item.id) {
        *existing = item.clone();
      }
      Ok(item)
    }
    .boxed()
  }

  fn delete(&self, id: u64) -> BoxFuture<'static, Result<(), ApiError>> {
    let script = self.begin_write(format!("DELETE {}/{}", TODOS, id));
    let state = self.state.clone();

    async move {
      wait(script.gate).await;
      if script.panics {
        panic!("write failed hard");
      }
      script.result?;

      state.lock().unwrap().todos.retain(|t| t.id != id);
      Ok(())
    }
    .boxed()
  }
}
