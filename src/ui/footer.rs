use super::Screen;
use crate::mutation::MutationKind;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the footer with pending writes, freshness, and the last error
pub fn draw_footer(frame: &mut Frame, area: Rect, screen: &Screen<'_>) {
  let mut spans = vec![Span::raw(" ")];

  for kind in [MutationKind::Create, MutationKind::Update, MutationKind::Delete] {
    let count = screen.in_flight.count(kind);
    if count > 0 {
      spans.push(Span::styled(
        format!("{} {}… ", count, kind),
        Style::default().fg(Color::Yellow),
      ));
    }
  }

  if let Some(updated_at) = screen.status.updated_at {
    let local = updated_at.with_timezone(&chrono::Local);
    spans.push(Span::styled(
      format!("updated {} ", local.format("%H:%M:%S")),
      Style::default().fg(Color::DarkGray),
    ));
  }

  if let Some(error) = screen.error {
    spans.push(Span::styled("│ ", Style::default().fg(Color::DarkGray)));
    spans.push(Span::styled(
      error.to_string(),
      Style::default().fg(Color::Red).bold(),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}
