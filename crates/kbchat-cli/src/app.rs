//! Application state and key handling.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind};
use kbchat_core::{ChatError, ChatView, Session, SessionEvent, Transcript};

/// Lines moved per PageUp/PageDown.
const PAGE_SCROLL: usize = 10;

/// Lines moved per mouse wheel notch.
const WHEEL_SCROLL: usize = 3;

/// Terminal front end for one chat session.
pub struct App {
    session: Session<Transcript>,
    input_max_rows: u16,
    animation_frame: usize,
    /// Set when the user asks to leave.
    pub should_quit: bool,
}

impl App {
    /// Wrap a started or not-yet-started session.
    pub fn new(session: Session<Transcript>, input_max_rows: u16) -> Self {
        Self {
            session,
            input_max_rows,
            animation_frame: 0,
            should_quit: false,
        }
    }

    /// The transcript to draw.
    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        self.session.view()
    }

    #[cfg(test)]
    pub fn transcript_mut(&mut self) -> &mut Transcript {
        self.session.view_mut()
    }

    /// Chat endpoint shown in the header.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.session.endpoint()
    }

    /// Maximum height of the input box, in text rows.
    #[must_use]
    pub const fn input_max_rows(&self) -> u16 {
        self.input_max_rows
    }

    /// Whether a reply is in flight.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.session.controller().is_streaming()
    }

    /// Redraw faster while a reply streams so the spinner moves.
    #[must_use]
    pub fn needs_immediate_redraw(&self) -> bool {
        self.is_streaming()
    }

    /// Advance the spinner.
    pub fn tick_animation(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);
    }

    /// Current spinner frame.
    #[must_use]
    pub fn spinner_char(&self) -> &'static str {
        const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        SPINNER[self.animation_frame % SPINNER.len()]
    }

    /// Open the connection.
    pub fn start(&mut self) {
        self.session.start();
    }

    /// Apply an event from the session's tasks.
    pub fn handle_session_event(&mut self, event: SessionEvent) {
        self.session.handle(event);
    }

    /// Stop the session. Idempotent.
    pub fn shutdown(&mut self) {
        self.session.dispose();
    }

    /// Handle a key press.
    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let newline = key.modifiers.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT);

        match key.code {
            KeyCode::Char('c') if ctrl => self.should_quit = true,
            KeyCode::Esc => {
                if self.transcript().error().is_some() {
                    self.session.view_mut().clear_error();
                } else {
                    self.should_quit = true;
                }
            }
            KeyCode::Enter if newline => self.session.view_mut().input_mut().insert_newline(),
            KeyCode::Enter => self.submit(),
            KeyCode::PageUp => self.session.view_mut().scroll_up(PAGE_SCROLL),
            KeyCode::PageDown => self.session.view_mut().scroll_down(PAGE_SCROLL),
            KeyCode::Char('a') if ctrl => self.session.view_mut().input_mut().move_home(),
            KeyCode::Char('e') if ctrl => self.session.view_mut().input_mut().move_end(),
            KeyCode::Char(c) if !ctrl => self.session.view_mut().input_mut().insert_char(c),
            KeyCode::Backspace => self.session.view_mut().input_mut().backspace(),
            KeyCode::Delete => self.session.view_mut().input_mut().delete(),
            KeyCode::Left => self.session.view_mut().input_mut().move_left(),
            KeyCode::Right => self.session.view_mut().input_mut().move_right(),
            KeyCode::Home => self.session.view_mut().input_mut().move_home(),
            KeyCode::End => self.session.view_mut().input_mut().move_end(),
            _ => {}
        }
    }

    /// Handle mouse wheel scrolling.
    pub fn handle_mouse(&mut self, mouse: MouseEvent) {
        match mouse.kind {
            MouseEventKind::ScrollUp => self.session.view_mut().scroll_up(WHEEL_SCROLL),
            MouseEventKind::ScrollDown => self.session.view_mut().scroll_down(WHEEL_SCROLL),
            _ => {}
        }
    }

    fn submit(&mut self) {
        let text = self.transcript().input().text().to_string();
        match self.session.send_message(&text) {
            Ok(()) => {}
            Err(ChatError::Input(reason)) => {
                tracing::trace!(reason = %reason, "Input not sent");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send message");
                if e.is_user_visible() {
                    self.session.view_mut().show_error(&e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use kbchat_core::{ChatController, ConnectionStatus, ReconnectPolicy, WebSocketConnector};

    use super::*;

    fn app() -> App {
        let controller = ChatController::new(
            Transcript::new(),
            ReconnectPolicy::fixed(Duration::from_millis(3000)),
        );
        let (session, _events) = Session::new(
            controller,
            "ws://127.0.0.1:9/ws/chat",
            Arc::new(WebSocketConnector::default()),
        );
        App::new(session, 6)
    }

    fn press(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
        app.handle_key(KeyEvent::new(code, modifiers));
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c), KeyModifiers::NONE);
        }
    }

    #[test]
    fn typing_edits_input() {
        let mut app = app();
        type_text(&mut app, "helo");
        press(&mut app, KeyCode::Left, KeyModifiers::NONE);
        type_text(&mut app, "l");

        assert_eq!(app.transcript().input().text(), "hello");
    }

    #[test]
    fn shift_enter_inserts_newline() {
        let mut app = app();
        type_text(&mut app, "a");
        press(&mut app, KeyCode::Enter, KeyModifiers::SHIFT);
        type_text(&mut app, "b");
        press(&mut app, KeyCode::Enter, KeyModifiers::ALT);

        assert_eq!(app.transcript().input().text(), "a\nb\n");
        assert_eq!(app.transcript().input().line_count(), 3);
    }

    #[test]
    fn enter_while_disconnected_keeps_input() {
        let mut app = app();
        type_text(&mut app, "question");
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);

        assert_eq!(app.transcript().input().text(), "question");
        assert!(app.transcript().messages().is_empty());
        assert!(app.transcript().error().is_none());
        assert_eq!(app.transcript().status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn esc_dismisses_banner_before_quitting() {
        let mut app = app();
        app.session
            .view_mut()
            .show_error(&kbchat_core::TransportError::ClosedByPeer.into());

        press(&mut app, KeyCode::Esc, KeyModifiers::NONE);
        assert!(app.transcript().error().is_none());
        assert!(!app.should_quit);

        press(&mut app, KeyCode::Esc, KeyModifiers::NONE);
        assert!(app.should_quit);
    }

    #[test]
    fn ctrl_c_quits_without_typing() {
        let mut app = app();
        press(&mut app, KeyCode::Char('c'), KeyModifiers::CONTROL);

        assert!(app.should_quit);
        assert_eq!(app.transcript().input().text(), "");
    }

    #[test]
    fn page_keys_scroll() {
        let mut app = app();
        press(&mut app, KeyCode::PageUp, KeyModifiers::NONE);
        assert_eq!(app.transcript().scroll_offset(), 10);
        press(&mut app, KeyCode::PageDown, KeyModifiers::NONE);
        assert_eq!(app.transcript().scroll_offset(), 0);
    }

    #[test]
    fn spinner_cycles() {
        let mut app = app();
        let first = app.spinner_char();
        app.tick_animation();
        assert_ne!(first, app.spinner_char());
    }
}
