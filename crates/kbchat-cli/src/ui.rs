//! UI rendering with ratatui.
//!
//! Layout, top to bottom: header with the connection indicator, optional
//! error banner, message list, input box, key help.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
};
use ratatui::Frame;

use kbchat_core::{ConnectionStatus, MessageNode, Role, WELCOME_MESSAGE};

use crate::app::App;
use crate::markdown::reply_lines;

/// Horizontal padding inside the message area.
const CHAT_PADDING: u16 = 1;

/// Render the whole screen.
pub fn render(frame: &mut Frame, app: &App) {
    let transcript = app.transcript();
    let input_rows = transcript
        .input()
        .visible_rows(usize::from(app.input_max_rows()));
    let banner_rows = u16::from(transcript.error().is_some());

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),                           // Header
            Constraint::Length(banner_rows),                 // Error banner
            Constraint::Min(3),                              // Messages
            Constraint::Length(to_u16(input_rows) + 2),      // Input box
            Constraint::Length(1),                           // Help bar
        ])
        .split(frame.area());

    render_header(frame, app, layout[0]);
    if let Some(error) = transcript.error() {
        render_banner(frame, error, layout[1]);
    }
    render_messages(frame, app, layout[2]);
    render_input(frame, app, layout[3], input_rows);
    render_help(frame, layout[4]);
}

fn to_u16(n: usize) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}

fn status_color(status: ConnectionStatus) -> Color {
    match status {
        ConnectionStatus::Connected => Color::Green,
        ConnectionStatus::Disconnected => Color::Red,
        ConnectionStatus::Reconnecting => Color::Yellow,
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let status = app.transcript().status();
    let title = "KBCHAT";
    let right = format!("{}  ● {}", app.endpoint(), status.label());
    let gap = usize::from(area.width).saturating_sub(title.len() + right.chars().count());

    let line = Line::from(vec![
        Span::styled(title, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" ".repeat(gap)),
        Span::raw(app.endpoint().to_string()),
        Span::styled(
            format!("  ● {}", status.label()),
            Style::default().fg(status_color(status)),
        ),
    ]);

    frame.render_widget(
        Paragraph::new(line).style(Style::default().bg(Color::DarkGray)),
        area,
    );
}

fn render_banner(frame: &mut Frame, error: &str, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" ERROR: ", Style::default().fg(Color::White).bg(Color::Red).bold()),
        Span::styled(format!(" {error}"), Style::default().fg(Color::Red)),
        Span::styled("  (Esc to dismiss)", Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn message_header(msg: &MessageNode) -> Line<'static> {
    let (name, color) = match msg.role {
        Role::User => ("You", Color::Cyan),
        Role::Assistant => ("Assistant", Color::Green),
    };
    Line::from(vec![
        Span::styled(
            format!(" {} ", msg.role.avatar()),
            Style::default().fg(Color::Black).bg(color).bold(),
        ),
        Span::styled(format!(" {name}"), Style::default().fg(color).bold()),
        Span::styled(
            format!("  {}", msg.created_at.format("%H:%M")),
            Style::default().fg(Color::DarkGray),
        ),
    ])
}

fn plain_lines(text: &str) -> impl Iterator<Item = Line<'static>> + '_ {
    text.split('\n').map(|l| Line::raw(l.to_string()))
}

/// Lines for the message list, oldest first.
fn message_lines(app: &App, width: usize) -> Vec<Line<'static>> {
    let transcript = app.transcript();
    let mut lines = Vec::new();

    if transcript.has_placeholder() {
        lines.push(Line::styled(
            WELCOME_MESSAGE,
            Style::default().fg(Color::DarkGray).italic(),
        ));
    }

    for msg in transcript.messages() {
        lines.push(message_header(msg));
        match (msg.role, &msg.source) {
            (Role::Assistant, Some(source)) if !msg.streaming => {
                lines.extend(reply_lines(source, width));
            }
            _ => lines.extend(plain_lines(&msg.text)),
        }
        if msg.streaming {
            lines.push(Line::from(Span::styled(
                app.spinner_char(),
                Style::default().fg(Color::Yellow),
            )));
        }
        lines.push(Line::default());
    }

    // Reply requested but no chunk yet
    let awaiting_first_chunk = transcript
        .messages()
        .last()
        .is_some_and(|m| m.role == Role::User);
    if app.is_streaming() && awaiting_first_chunk {
        lines.push(Line::from(vec![
            Span::styled(app.spinner_char(), Style::default().fg(Color::Yellow)),
            Span::styled(" thinking...", Style::default().fg(Color::DarkGray)),
        ]));
    }

    lines
}

fn render_messages(frame: &mut Frame, app: &App, area: Rect) {
    let chat_area = Rect::new(
        area.x + CHAT_PADDING,
        area.y,
        area.width.saturating_sub(CHAT_PADDING * 2 + 1), // +1 for scrollbar
        area.height,
    );

    let paragraph = Paragraph::new(Text::from(message_lines(
        app,
        usize::from(chat_area.width),
    )))
    .wrap(Wrap { trim: false });

    // Height as the widget itself wraps it
    let total = paragraph.line_count(chat_area.width);
    let visible = usize::from(chat_area.height);

    // scroll_offset counts lines up from the bottom
    let max_scroll = total.saturating_sub(visible);
    let from_bottom = app.transcript().scroll_offset().min(max_scroll);
    let from_top = max_scroll - from_bottom;

    frame.render_widget(paragraph.scroll((to_u16(from_top), 0)), chat_area);

    if total > visible {
        let mut state = ScrollbarState::new(max_scroll + 1)
            .position(from_top)
            .viewport_content_length(visible);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area,
            &mut state,
        );
    }
}

fn render_input(frame: &mut Frame, app: &App, area: Rect, rows: usize) {
    let input = app.transcript().input();
    let enabled = input.is_enabled();

    let (title, border) = if enabled {
        (" Message ", Style::default().fg(Color::Cyan))
    } else {
        (" Waiting for reply... ", Style::default().fg(Color::DarkGray))
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border);
    let inner = block.inner(area);

    // Cursor column in display cells, so wide glyphs count double
    let (line, _) = input.cursor_line_col();
    let before = &input.text()[..input.cursor()];
    let col = Line::raw(before.rsplit('\n').next().unwrap_or_default()).width();

    let v_scroll = line.saturating_sub(rows.saturating_sub(1));
    let h_scroll = col.saturating_sub(usize::from(inner.width.saturating_sub(1)));
    let text_style = if enabled {
        Style::default().fg(Color::White)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    frame.render_widget(
        Paragraph::new(input.text().to_string())
            .style(text_style)
            .block(block)
            .scroll((to_u16(v_scroll), to_u16(h_scroll))),
        area,
    );

    if enabled && input.is_focused() {
        frame.set_cursor_position((
            inner.x + to_u16(col - h_scroll),
            inner.y + to_u16(line - v_scroll),
        ));
    }
}

fn render_help(frame: &mut Frame, area: Rect) {
    let key = Style::default().fg(Color::Yellow);
    let line = Line::from(vec![
        Span::raw(" "),
        Span::styled("Enter", key),
        Span::raw(":send "),
        Span::styled("Shift+Enter", key),
        Span::raw(":newline "),
        Span::styled("PgUp/PgDn", key),
        Span::raw(":scroll "),
        Span::styled("Esc", key),
        Span::raw(":quit"),
    ]);
    frame.render_widget(
        Paragraph::new(line).style(Style::default().bg(Color::DarkGray)),
        area,
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use kbchat_core::{
        ChatController, ChatView, ReconnectPolicy, Session, Transcript, WebSocketConnector,
    };
    use ratatui::backend::TestBackend;
    use ratatui::layout::Position;
    use ratatui::Terminal;

    use super::*;

    fn app() -> App {
        let controller = ChatController::new(
            Transcript::new(),
            ReconnectPolicy::fixed(Duration::from_millis(3000)),
        );
        let (session, _events) = Session::new(
            controller,
            "ws://localhost:8000/ws/chat",
            Arc::new(WebSocketConnector::default()),
        );
        App::new(session, 6)
    }

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal.draw(|f| render(f, app)).unwrap();

        let buffer = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn first_screen_shows_welcome_and_status() {
        let screen = screen(&app());

        assert!(screen.contains("KBCHAT"));
        assert!(screen.contains("● Disconnected"));
        assert!(screen.contains("Ask a question"));
        assert!(screen.contains("Message"));
    }

    #[test]
    fn long_reply_keeps_newest_text_in_view() {
        let mut app = app();
        let words = vec!["a".repeat(60); 30].join(" ");
        let transcript = app.transcript_mut();
        transcript.remove_placeholder();
        let node = transcript.begin_assistant_message();
        transcript.append_assistant_text(node, &format!("{words} ENDMARK"));
        transcript.scroll_to_bottom();

        assert!(screen(&app).contains("ENDMARK"));

        app.transcript_mut().scroll_up(1000);
        let top = screen(&app);
        assert!(top.contains("Assistant"));
        assert!(!top.contains("ENDMARK"));
    }

    #[test]
    fn long_input_line_scrolls_to_cursor() {
        let mut app = app();
        let input = app.transcript_mut().input_mut();
        for _ in 0..150 {
            input.insert_char('x');
        }
        for c in "TAIL".chars() {
            input.insert_char(c);
        }

        assert!(screen(&app).contains("TAIL"));
    }

    #[test]
    fn cursor_tracks_wide_glyphs() {
        let mut app = app();
        let input = app.transcript_mut().input_mut();
        for _ in 0..60 {
            input.insert_char('中');
        }

        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal.draw(|f| render(f, &app)).unwrap();

        // Input box inner area spans x 1..99 on row 17
        assert_eq!(terminal.get_cursor_position().unwrap(), Position::new(98, 17));
    }
}
