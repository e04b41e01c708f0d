use crate::api::{NewTodo, Remote, Todo, TODOS};
use crate::cache::{QueryCache, QueryKey, RefreshOutcome};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::mutation::{MutationCoordinator, MutationKind, MutationOutcome, Settled};
use crate::ui::{self, InputResult, Mode, Screen, TitleInput};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use ratatui::widgets::ListState;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Owner assigned to todos created from this client
const DEFAULT_USER_ID: u64 = 1;

/// Main application state.
///
/// The app task owns the cache and the mutation coordinator; background
/// refreshes and write requests report back to it on every event.
pub struct App {
  api_url: String,
  list_key: QueryKey,
  cache: QueryCache<Todo>,
  mutations: MutationCoordinator<Todo>,
  list_state: ListState,
  mode: Mode,
  input: TitleInput,
  /// Last surfaced failure; the cache is already rolled back when it is set
  last_error: Option<String>,
  should_quit: bool,
}

impl App {
  pub fn new(config: &Config, remote: Arc<dyn Remote<Todo>>) -> Self {
    let cache = QueryCache::new(remote.clone())
      .with_stale_time(config.cache.stale_time())
      .with_gc_time(config.cache.gc_time());

    Self {
      api_url: config.api.base_url.clone(),
      list_key: QueryKey::new(TODOS),
      cache,
      mutations: MutationCoordinator::new(remote),
      list_state: ListState::default(),
      mode: Mode::Normal,
      input: TitleInput::new(),
      last_error: None,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(Duration::from_millis(250));

    self.load();

    let result = self.event_loop(&mut terminal, &mut events).await;

    // Cleanup terminal, even when the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop<B: Backend>(
    &mut self,
    terminal: &mut Terminal<B>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| self.render(frame))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }
    Ok(())
  }

  /// Initial load of the todo list
  fn load(&mut self) {
    self.cache.fetch(&self.list_key);
  }

  fn render(&mut self, frame: &mut Frame) {
    let todos = self
      .cache
      .read(&self.list_key)
      .and_then(|value| value.as_collection())
      .unwrap_or(&[]);

    let screen = Screen {
      api_url: &self.api_url,
      todos,
      status: self.cache.status(&self.list_key),
      in_flight: self.mutations.in_flight(),
      mode: self.mode,
      input: &self.input,
      error: self.last_error.as_deref(),
    };

    ui::draw(frame, &screen, &mut self.list_state);
  }

  fn todos(&self) -> &[Todo] {
    self
      .cache
      .read(&self.list_key)
      .and_then(|value| value.as_collection())
      .unwrap_or(&[])
  }

  fn selected(&self) -> Option<&Todo> {
    self.list_state.selected().and_then(|i| self.todos().get(i))
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Resize | Event::Tick => {}
    }
    // Settle whatever arrived, whichever event woke us
    self.tick();
  }

  fn handle_key(&mut self, key: KeyEvent) {
    match self.mode {
      Mode::Normal => self.handle_normal_key(key),
      Mode::Insert => self.handle_insert_key(key),
    }
  }

  fn handle_normal_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Char('q') => self.should_quit = true,
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char(' ') | KeyCode::Enter => self.toggle_selected(),
      KeyCode::Char('d') => self.delete_selected(),
      KeyCode::Char('a') => self.mode = Mode::Insert,
      KeyCode::Char('r') => {
        self.cache.mark_stale(&self.list_key);
      }
      _ => {}
    }
  }

  fn handle_insert_key(&mut self, key: KeyEvent) {
    match self.input.handle_key(key) {
      InputResult::Submitted(title) => {
        if self.mutations.is_pending(MutationKind::Create) {
          return;
        }
        self.last_error = None;
        self.mutations.create(
          &mut self.cache,
          NewTodo::new(title, DEFAULT_USER_ID),
          self.list_key.clone(),
        );
        self.mode = Mode::Normal;
      }
      InputResult::Cancelled => self.mode = Mode::Normal,
      InputResult::Consumed => {}
    }
  }

  fn toggle_selected(&mut self) {
    let Some(updated) = self.selected().map(Todo::toggled) else {
      return;
    };
    self.last_error = None;
    self
      .mutations
      .update(&mut self.cache, updated, self.list_key.clone());
  }

  fn delete_selected(&mut self) {
    if self.mutations.is_pending(MutationKind::Delete) {
      return;
    }
    let Some(id) = self.selected().map(|todo| todo.id) else {
      return;
    };
    self.last_error = None;
    self
      .mutations
      .delete(&mut self.cache, id, self.list_key.clone());
  }

  /// Fold finished refreshes and settled mutations into the app state
  fn tick(&mut self) {
    self.cache.collect_garbage();
    self.cache.refresh_expired();

    for outcome in self.cache.poll() {
      if let RefreshOutcome::Failed(key, error) = outcome {
        self.last_error = Some(format!("Refreshing {} failed: {}", key, error));
      }
    }

    for outcome in self.mutations.poll(&mut self.cache) {
      self.apply_outcome(outcome);
    }
  }

  fn apply_outcome(&mut self, outcome: MutationOutcome<Todo>) {
    match outcome.settled {
      Settled::Confirmed(_) => {
        if outcome.kind == MutationKind::Create {
          self.input.clear();
        }
      }
      Settled::RolledBack(error) => {
        info!(mutation_id = %outcome.id, kind = %outcome.kind, "Showing mutation failure");
        self.last_error = Some(format!("Could not {} todo: {}", outcome.kind, error));
      }
    }
  }
}
