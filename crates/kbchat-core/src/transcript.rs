//! In-memory chat document implementing [`ChatView`].
//!
//! The transcript holds everything a front end draws: the welcome
//! placeholder, the message list, the input field, the connection indicator
//! and the error banner. The terminal UI renders it directly and tests
//! inspect it.

use std::fmt::Write as _;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::ChatError;
use crate::format::{escape_html, RenderedReply};
use crate::status::ConnectionStatus;
use crate::view::{ChatView, NodeId};

/// Text shown before the first message is sent.
pub const WELCOME_MESSAGE: &str =
    "Ask a question about the knowledge base. Replies stream in as they are generated.";

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The person at the keyboard.
    User,
    /// The chat backend.
    Assistant,
}

impl Role {
    /// Single-letter avatar.
    #[must_use]
    pub const fn avatar(self) -> &'static str {
        match self {
            Self::User => "H",
            Self::Assistant => "B",
        }
    }

    /// Style class for the message bubble.
    #[must_use]
    pub const fn class(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message bubble.
#[derive(Debug, Clone)]
pub struct MessageNode {
    /// Author.
    pub role: Role,
    /// Plain text content: the user's text, or the reply text received so far.
    pub text: String,
    /// Display markup: escaped text, or sanitized HTML once finalized.
    pub html: String,
    /// Markdown source of a finalized reply.
    pub source: Option<String>,
    /// Whether the reply is still streaming.
    pub streaming: bool,
    /// When the bubble was created.
    pub created_at: DateTime<Utc>,
}

/// Multi-line text input with a cursor.
#[derive(Debug, Clone, Default)]
pub struct InputField {
    text: String,
    /// Byte offset, always on a char boundary.
    cursor: usize,
    enabled: bool,
    focused: bool,
}

impl InputField {
    /// Current text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Cursor byte offset.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether the field accepts edits.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the field has keyboard focus.
    #[must_use]
    pub const fn is_focused(&self) -> bool {
        self.focused
    }

    /// Number of text lines (at least one).
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.text.split('\n').count()
    }

    /// Rows to display: grows with content up to `max_rows`.
    #[must_use]
    pub fn visible_rows(&self, max_rows: usize) -> usize {
        self.line_count().clamp(1, max_rows.max(1))
    }

    /// Cursor position as (line, column in chars).
    #[must_use]
    pub fn cursor_line_col(&self) -> (usize, usize) {
        let before = &self.text[..self.cursor];
        let line = before.matches('\n').count();
        let col = before
            .rsplit('\n')
            .next()
            .map_or(0, |tail| tail.chars().count());
        (line, col)
    }

    /// Insert a character at the cursor.
    pub fn insert_char(&mut self, c: char) {
        if !self.enabled {
            return;
        }
        self.text.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    /// Insert a line break at the cursor.
    pub fn insert_newline(&mut self) {
        self.insert_char('\n');
    }

    /// Delete the character before the cursor.
    pub fn backspace(&mut self) {
        if !self.enabled {
            return;
        }
        if let Some((idx, _)) = self.text[..self.cursor].char_indices().next_back() {
            self.text.remove(idx);
            self.cursor = idx;
        }
    }

    /// Delete the character at the cursor.
    pub fn delete(&mut self) {
        if self.enabled && self.cursor < self.text.len() {
            self.text.remove(self.cursor);
        }
    }

    /// Move the cursor one character left.
    pub fn move_left(&mut self) {
        if let Some((idx, _)) = self.text[..self.cursor].char_indices().next_back() {
            self.cursor = idx;
        }
    }

    /// Move the cursor one character right.
    pub fn move_right(&mut self) {
        if let Some(c) = self.text[self.cursor..].chars().next() {
            self.cursor += c.len_utf8();
        }
    }

    /// Move the cursor to the start of its line.
    pub fn move_home(&mut self) {
        self.cursor = self.text[..self.cursor].rfind('\n').map_or(0, |i| i + 1);
    }

    /// Move the cursor to the end of its line.
    pub fn move_end(&mut self) {
        self.cursor = self.text[self.cursor..]
            .find('\n')
            .map_or(self.text.len(), |i| self.cursor + i);
    }

    fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }
}

/// The chat document.
#[derive(Debug, Clone)]
pub struct Transcript {
    placeholder: bool,
    messages: Vec<MessageNode>,
    input: InputField,
    status: ConnectionStatus,
    error: Option<String>,
    /// Lines scrolled up from the newest entry.
    scroll_offset: usize,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    /// An empty transcript showing the welcome placeholder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            placeholder: true,
            messages: Vec::new(),
            input: InputField {
                enabled: true,
                focused: true,
                ..InputField::default()
            },
            status: ConnectionStatus::default(),
            error: None,
            scroll_offset: 0,
        }
    }

    /// Whether the welcome placeholder is shown.
    #[must_use]
    pub const fn has_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Message bubbles in display order.
    #[must_use]
    pub fn messages(&self) -> &[MessageNode] {
        &self.messages
    }

    /// The input field.
    #[must_use]
    pub const fn input(&self) -> &InputField {
        &self.input
    }

    /// The input field, for editing.
    pub fn input_mut(&mut self) -> &mut InputField {
        &mut self.input
    }

    /// Current connection indicator.
    #[must_use]
    pub const fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Current error banner text.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Lines scrolled up from the newest entry.
    #[must_use]
    pub const fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    /// Scroll towards older messages.
    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(lines);
    }

    /// Scroll towards newer messages.
    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    /// Render the transcript as a standalone HTML document.
    ///
    /// Content is already escaped or sanitized, so bubbles are embedded as-is.
    #[must_use]
    pub fn to_html(&self, title: &str) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n<div class=\"chat-messages\">\n",
            escape_html(title)
        );

        for msg in &self.messages {
            let streaming = if msg.streaming { " streaming" } else { "" };
            let _ = write!(
                out,
                "<div class=\"message {class}\">\n<div class=\"message-avatar\">{avatar}</div>\n<div class=\"message-content{streaming}\">{html}</div>\n<time datetime=\"{ts}\">{ts}</time>\n</div>\n",
                class = msg.role.class(),
                avatar = msg.role.avatar(),
                html = msg.html,
                ts = msg.created_at.to_rfc3339(),
            );
        }

        out.push_str("</div>\n</body>\n</html>\n");
        out
    }

    /// Write [`Transcript::to_html`] to `path`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from writing the file.
    pub fn write_html(&self, path: &Path, title: &str) -> io::Result<()> {
        std::fs::write(path, self.to_html(title))
    }

    fn node_mut(&mut self, node: NodeId) -> Option<&mut MessageNode> {
        self.messages.get_mut(node.0)
    }
}

impl ChatView for Transcript {
    fn remove_placeholder(&mut self) {
        self.placeholder = false;
    }

    fn append_user_message(&mut self, text: &str, html: &str) {
        self.messages.push(MessageNode {
            role: Role::User,
            text: text.to_string(),
            html: html.to_string(),
            source: None,
            streaming: false,
            created_at: Utc::now(),
        });
        self.scroll_offset = 0;
    }

    fn begin_assistant_message(&mut self) -> NodeId {
        self.messages.push(MessageNode {
            role: Role::Assistant,
            text: String::new(),
            html: String::new(),
            source: None,
            streaming: true,
            created_at: Utc::now(),
        });
        self.scroll_offset = 0;
        NodeId(self.messages.len() - 1)
    }

    fn append_assistant_text(&mut self, node: NodeId, chunk: &str) {
        if let Some(msg) = self.node_mut(node) {
            msg.text.push_str(chunk);
            msg.html.push_str(&escape_html(chunk));
        }
    }

    fn finalize_assistant_message(&mut self, node: NodeId, reply: &RenderedReply) {
        if let Some(msg) = self.node_mut(node) {
            msg.streaming = false;
            msg.html.clone_from(&reply.html);
            msg.source = Some(reply.source.clone());
        }
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        self.input.enabled = enabled;
    }

    fn clear_input(&mut self) {
        self.input.clear();
    }

    fn focus_input(&mut self) {
        self.input.focused = true;
    }

    fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    fn show_error(&mut self, error: &ChatError) {
        self.error = Some(error.to_string());
    }

    fn clear_error(&mut self) {
        self.error = None;
    }
}
