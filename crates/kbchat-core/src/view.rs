//! The display surface driven by the controller.

use crate::error::ChatError;
use crate::format::RenderedReply;
use crate::status::ConnectionStatus;

/// Handle to a message node created by [`ChatView::begin_assistant_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// Everything the controller needs from a chat display.
///
/// Implementations only render; they never decide protocol or streaming
/// state. All content passed in is already escaped or sanitized.
pub trait ChatView {
    /// Remove the welcome placeholder if it is still shown.
    fn remove_placeholder(&mut self);

    /// Append a user bubble. `html` is `text` escaped for literal display.
    fn append_user_message(&mut self, text: &str, html: &str);

    /// Create an empty, streaming assistant bubble.
    fn begin_assistant_message(&mut self) -> NodeId;

    /// Append plain text to a streaming assistant bubble.
    fn append_assistant_text(&mut self, node: NodeId, chunk: &str);

    /// Replace a streaming bubble's content with the finalized reply.
    fn finalize_assistant_message(&mut self, node: NodeId, reply: &RenderedReply);

    /// Enable or disable the input field and send button.
    fn set_input_enabled(&mut self, enabled: bool);

    /// Empty the input field.
    fn clear_input(&mut self);

    /// Move keyboard focus to the input field.
    fn focus_input(&mut self);

    /// Scroll the message list to its newest entry.
    fn scroll_to_bottom(&mut self);

    /// Update the connection indicator.
    fn set_status(&mut self, status: ConnectionStatus);

    /// Show an error banner.
    fn show_error(&mut self, error: &ChatError);

    /// Hide the error banner.
    fn clear_error(&mut self);
}
