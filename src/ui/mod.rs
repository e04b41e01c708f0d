mod footer;
mod header;
mod input;
mod todo_list;

pub use input::{InputResult, TitleInput};

use crate::api::Todo;
use crate::cache::EntryStatus;
use crate::mutation::InFlight;
use ratatui::prelude::*;
use ratatui::widgets::ListState;

/// Input mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  Normal,
  /// Typing the title of a new todo
  Insert,
}

/// Everything the renderer reads; built fresh for each frame.
pub struct Screen<'a> {
  pub api_url: &'a str,
  pub todos: &'a [Todo],
  pub status: EntryStatus,
  pub in_flight: &'a InFlight,
  pub mode: Mode,
  pub input: &'a TitleInput,
  pub error: Option<&'a str>,
}

/// Main draw function
pub fn draw(frame: &mut Frame, screen: &Screen<'_>, list_state: &mut ListState) {
  let input_height = if screen.mode == Mode::Insert { 3 } else { 0 };

  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1),            // Header
      Constraint::Min(1),               // Todo list
      Constraint::Length(input_height), // New todo input
      Constraint::Length(1),            // Footer
    ])
    .split(frame.area());

  header::draw_header(frame, chunks[0], screen.api_url, screen.mode);
  todo_list::draw_todo_list(frame, chunks[1], screen, list_state);
  if screen.mode == Mode::Insert {
    screen.input.render(frame, chunks[2], screen.in_flight);
  }
  footer::draw_footer(frame, chunks[3], screen);
}

/// Keep the list selection within bounds after the data changed
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  if len == 0 {
    state.select(None);
  } else {
    match state.selected() {
      Some(i) if i >= len => state.select(Some(len - 1)),
      None => state.select(Some(0)),
      _ => {}
    }
  }
}

/// Truncate a string to at most `max_len` characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}
