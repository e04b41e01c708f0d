use crate::mutation::{InFlight, MutationKind};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

/// Result of handling a key event in the title input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputResult {
  /// Key was handled, continue input mode
  Consumed,
  /// Enter pressed with a non-blank title
  Submitted(String),
  /// Escape pressed, input cancelled
  Cancelled,
}

/// Single-line input for the title of a new todo.
///
/// The text survives submission so a failed create can be retried; the owner
/// clears it once the create is confirmed.
#[derive(Debug, Clone, Default)]
pub struct TitleInput {
  buffer: String,
}

impl TitleInput {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn value(&self) -> &str {
    &self.buffer
  }

  pub fn clear(&mut self) {
    self.buffer.clear();
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> InputResult {
    match key.code {
      KeyCode::Esc => InputResult::Cancelled,
      KeyCode::Enter => {
        let title = self.buffer.trim();
        if title.is_empty() {
          InputResult::Consumed
        } else {
          InputResult::Submitted(title.to_string())
        }
      }
      KeyCode::Backspace => {
        self.buffer.pop();
        InputResult::Consumed
      }
      KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.buffer.clear();
        InputResult::Consumed
      }
      KeyCode::Char(c) => {
        self.buffer.push(c);
        InputResult::Consumed
      }
      _ => InputResult::Consumed,
    }
  }

  pub fn render(&self, frame: &mut Frame, area: Rect, in_flight: &InFlight) {
    let title = if in_flight.is_pending(MutationKind::Create) {
      " New todo (creating...) "
    } else {
      " New todo "
    };

    let block = Block::default()
      .title(title)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow));

    let paragraph = Paragraph::new(format!("{}▏", self.buffer)).block(block);
    frame.render_widget(paragraph, area);
  }
}
