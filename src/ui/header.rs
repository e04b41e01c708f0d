use super::Mode;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the header bar with logo, API host, and shortcuts
pub fn draw_header(frame: &mut Frame, area: Rect, api_url: &str, mode: Mode) {
  let mut spans = vec![
    Span::styled(" todoq ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", extract_domain(api_url)),
      Style::default().fg(Color::White),
    ),
    Span::raw("  "),
  ];

  let shortcuts: &[(&str, &str)] = match mode {
    Mode::Normal => &[
      ("<space>", "toggle"),
      ("<a>", "add"),
      ("<d>", "delete"),
      ("<r>", "refresh"),
      ("<q>", "quit"),
    ],
    Mode::Insert => &[("<enter>", "create"), ("<esc>", "cancel")],
  };

  // Keys highlighted, descriptions dimmed
  for (key, label) in shortcuts {
    spans.push(Span::styled(*key, Style::default().fg(Color::Cyan)));
    spans.push(Span::styled(
      format!(" {}   ", label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

/// Extract domain from the API base URL
fn extract_domain(url: &str) -> &str {
  url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url)
    .split('/')
    .next()
    .unwrap_or(url)
}
