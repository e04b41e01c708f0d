use super::{ensure_valid_selection, truncate, Screen};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// Render the todo collection from the current cache snapshot
pub fn draw_todo_list(frame: &mut Frame, area: Rect, screen: &Screen<'_>, list_state: &mut ListState) {
  ensure_valid_selection(list_state, screen.todos.len());

  let status = &screen.status;
  let never_loaded = status.updated_at.is_none();

  let title = if never_loaded && status.is_fetching {
    " Todos (loading...) ".to_string()
  } else if status.is_fetching {
    format!(" Todos ({}) refreshing... ", screen.todos.len())
  } else {
    format!(" Todos ({}) ", screen.todos.len())
  };

  let block = Block::default()
    .title(title)
    .title_alignment(Alignment::Center)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue));

  if screen.todos.is_empty() {
    let content = match (&status.error, never_loaded) {
      (Some(error), true) => format!("Failed to load todos: {}. Press 'r' to retry.", error),
      (_, true) if status.is_fetching => String::new(),
      _ => "No todos. Press 'a' to add one.".to_string(),
    };
    let paragraph = Paragraph::new(content)
      .block(block)
      .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(paragraph, area);
    return;
  }

  let width = area.width.saturating_sub(12) as usize;
  let items: Vec<ListItem> = screen
    .todos
    .iter()
    .map(|todo| {
      let (check, style) = if todo.completed {
        (
          "[x]",
          Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::CROSSED_OUT),
        )
      } else {
        ("[ ]", Style::default().fg(Color::White))
      };

      ListItem::new(Line::from(vec![
        Span::styled(check, Style::default().fg(Color::Green)),
        Span::raw(" "),
        Span::styled(truncate(&todo.title, width), style),
      ]))
    })
    .collect();

  let list = List::new(items)
    .block(block)
    .highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

  frame.render_stateful_widget(list, area, list_state);
}
