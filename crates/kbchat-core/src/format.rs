//! Reply formatting: raw-text fixup, markdown rendering and sanitization.
//!
//! Streamed text is shown verbatim while it arrives. Once the backend signals
//! the end of a reply, the accumulated text goes through [`format_reply`]:
//!
//! 1. [`fixup_raw_text`] applies the backend-format contract.
//! 2. [`render_markdown_html`] renders CommonMark (plus tables and
//!    strikethrough) to HTML.
//! 3. [`sanitize_html`] strips anything that could execute or inject markup.

use std::sync::LazyLock;

use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};
use regex::Regex;

/// Ordered-list markers at the start of a line, e.g. `12. `. ASCII digits only.
static ORDERED_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([0-9]+\.\s)").unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// A finalized assistant reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReply {
    /// Markdown source after [`fixup_raw_text`].
    pub source: String,
    /// Sanitized HTML rendered from `source`.
    pub html: String,
}

/// Escape text for literal display inside HTML.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Normalize backend output before markdown rendering.
///
/// The backend sometimes emits the two characters `\` `n` instead of a line
/// break, and its numbered lists only parse as lists once indented. Both
/// rewrites are specific to that backend's output format:
///
/// - every literal `\n` becomes a real newline;
/// - every line starting with `<digits>.<whitespace>` gets two leading spaces.
#[must_use]
pub fn fixup_raw_text(raw: &str) -> String {
    let unescaped = raw.replace("\\n", "\n");
    ORDERED_MARKER
        .replace_all(&unescaped, "  ${1}")
        .into_owned()
}

/// Render markdown to (unsanitized) HTML.
///
/// Raw HTML in the source is not markup: it is escaped and shown as text,
/// and an HTML block becomes a paragraph.
#[must_use]
pub fn render_markdown_html(source: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(source, options).map(literal_html);

    let mut out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn literal_html(event: Event<'_>) -> Event<'_> {
    match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::HtmlBlock) => Event::Start(Tag::Paragraph),
        Event::End(TagEnd::HtmlBlock) => Event::End(TagEnd::Paragraph),
        other => other,
    }
}

/// Remove scripts, event handlers and unsafe URLs from rendered HTML.
#[must_use]
pub fn sanitize_html(html: &str) -> String {
    ammonia::clean(html)
}

/// Run the full finalization pipeline on accumulated reply text.
#[must_use]
pub fn format_reply(raw: &str) -> RenderedReply {
    let source = fixup_raw_text(raw);
    let html = sanitize_html(&render_markdown_html(&source));
    RenderedReply { source, html }
}
