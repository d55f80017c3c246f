//! Terminal rendering of finalized replies.
//!
//! Replies are drawn from their fixed-up Markdown source rather than the
//! sanitized HTML. Raw HTML in a reply is shown as literal text.

use std::sync::LazyLock;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

static SYNTAXES: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEMES: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

const CODE_THEME: &str = "base16-ocean.dark";

/// Widest rule or code frame drawn, in columns.
const MAX_RULE_WIDTH: usize = 60;

/// Render Markdown `source` into styled lines for a column `width` wide.
pub fn reply_lines(source: &str, width: usize) -> Vec<Line<'static>> {
    let mut builder = LineBuilder::new(width);
    let parser = Parser::new_ext(source, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    for event in parser {
        builder.event(event);
    }
    builder.finish()
}

/// Highlight `code` as `lang`, one span list per source line.
fn highlight_code(code: &str, lang: &str) -> Vec<Vec<Span<'static>>> {
    let plain = || -> Vec<Vec<Span<'static>>> {
        code.lines()
            .map(|l| vec![Span::styled(l.to_string(), Style::default().fg(Color::Yellow))])
            .collect()
    };

    let Some(theme) = THEMES.themes.get(CODE_THEME) else {
        return plain();
    };
    let syntax = SYNTAXES
        .find_syntax_by_token(lang)
        .unwrap_or_else(|| SYNTAXES.find_syntax_plain_text());
    let mut highlighter = HighlightLines::new(syntax, theme);

    let mut out = Vec::new();
    for line in LinesWithEndings::from(code) {
        let Ok(ranges) = highlighter.highlight_line(line, &SYNTAXES) else {
            return plain();
        };
        let spans = ranges
            .into_iter()
            .filter_map(|(style, text)| {
                let text = text.trim_end_matches(['\n', '\r']);
                if text.is_empty() {
                    return None;
                }
                let fg = style.foreground;
                let mut s = Style::default().fg(Color::Rgb(fg.r, fg.g, fg.b));
                if style.font_style.contains(FontStyle::BOLD) {
                    s = s.add_modifier(Modifier::BOLD);
                }
                if style.font_style.contains(FontStyle::ITALIC) {
                    s = s.add_modifier(Modifier::ITALIC);
                }
                Some(Span::styled(text.to_string(), s))
            })
            .collect();
        out.push(spans);
    }
    out
}

#[derive(Debug, Default)]
struct CodeBlock {
    lang: String,
    body: String,
}

/// Accumulates styled lines from parser events.
struct LineBuilder {
    width: usize,
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    styles: Vec<Style>,
    code: Option<CodeBlock>,
    /// One entry per open list: next ordinal for ordered lists.
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    link: Option<String>,
}

impl LineBuilder {
    fn new(width: usize) -> Self {
        Self {
            width,
            lines: Vec::new(),
            spans: Vec::new(),
            styles: Vec::new(),
            code: None,
            lists: Vec::new(),
            quote_depth: 0,
            link: None,
        }
    }

    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, f: impl FnOnce(Style) -> Style) {
        self.styles.push(f(self.style()));
    }

    fn break_line(&mut self) {
        if self.spans.is_empty() {
            return;
        }
        let mut spans = std::mem::take(&mut self.spans);
        if self.quote_depth > 0 {
            spans.insert(
                0,
                Span::styled("│ ".repeat(self.quote_depth), Style::default().fg(Color::Blue)),
            );
        }
        self.lines.push(Line::from(spans));
    }

    fn blank_line(&mut self) {
        self.break_line();
        if self.lines.last().is_some_and(|l| l.width() > 0) {
            self.lines.push(Line::default());
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(code) = self.code.as_mut() {
            code.body.push_str(text);
            return;
        }

        let style = self.style();
        for (i, part) in text.split('\n').enumerate() {
            if i > 0 {
                self.break_line();
            }
            if !part.is_empty() {
                self.spans.push(Span::styled(part.to_string(), style));
            }
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) | Event::Html(text) | Event::InlineHtml(text) => self.text(&text),
            Event::Code(code) => self.spans.push(Span::styled(
                code.to_string(),
                Style::default().fg(Color::Yellow).bg(Color::Rgb(40, 40, 40)),
            )),
            Event::SoftBreak | Event::HardBreak => self.break_line(),
            Event::Rule => {
                self.blank_line();
                self.lines.push(Line::styled(
                    "─".repeat(self.width.min(MAX_RULE_WIDTH)),
                    Style::default().fg(Color::DarkGray),
                ));
                self.lines.push(Line::default());
            }
            // Footnotes, task markers and math are not shown.
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.blank_line();
                let color = if level == HeadingLevel::H1 {
                    Color::Magenta
                } else {
                    Color::LightMagenta
                };
                self.push_style(|s| s.fg(color).add_modifier(Modifier::BOLD));
            }
            Tag::HtmlBlock => self.break_line(),
            Tag::BlockQuote(_) => {
                self.break_line();
                self.quote_depth += 1;
                self.push_style(|s| s.fg(Color::Blue));
            }
            Tag::CodeBlock(kind) => {
                self.break_line();
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or_default().to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                self.code = Some(CodeBlock {
                    lang,
                    body: String::new(),
                });
            }
            Tag::List(start) => {
                self.break_line();
                self.lists.push(start);
            }
            Tag::Item => {
                let depth = self.lists.len().saturating_sub(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.spans.push(Span::styled(
                    format!("{}{marker}", "  ".repeat(depth)),
                    Style::default().fg(Color::Cyan),
                ));
            }
            Tag::Emphasis => self.push_style(|s| s.add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(|s| s.add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => self.push_style(|s| s.add_modifier(Modifier::CROSSED_OUT)),
            Tag::Link { dest_url, .. } => {
                self.link = Some(dest_url.to_string());
                self.push_style(|s| s.fg(Color::Blue).add_modifier(Modifier::UNDERLINED));
            }
            Tag::TableHead => self.push_style(|s| s.add_modifier(Modifier::BOLD)),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::HtmlBlock => self.blank_line(),
            TagEnd::Heading(_) => {
                self.styles.pop();
                self.blank_line();
            }
            TagEnd::BlockQuote(_) => {
                self.break_line();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.styles.pop();
                if self.quote_depth == 0 {
                    self.blank_line();
                }
            }
            TagEnd::CodeBlock => {
                if let Some(code) = self.code.take() {
                    self.code_block(&code);
                }
            }
            TagEnd::List(_) => {
                self.break_line();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            TagEnd::Item => self.break_line(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                self.styles.pop();
            }
            TagEnd::Link => {
                self.styles.pop();
                if let Some(url) = self.link.take() {
                    self.spans.push(Span::styled(
                        format!(" <{url}>"),
                        Style::default().fg(Color::DarkGray),
                    ));
                }
            }
            TagEnd::TableCell => self
                .spans
                .push(Span::styled(" │ ", Style::default().fg(Color::DarkGray))),
            TagEnd::TableHead => {
                self.styles.pop();
                self.break_line();
            }
            TagEnd::TableRow => self.break_line(),
            TagEnd::Table => self.blank_line(),
            _ => {}
        }
    }

    fn code_block(&mut self, code: &CodeBlock) {
        let frame = Style::default().fg(Color::DarkGray);
        let rule_width = self.width.saturating_sub(2).min(MAX_RULE_WIDTH);

        let header = if code.lang.is_empty() {
            "─".repeat(rule_width)
        } else {
            format!(
                "─ {} {}",
                code.lang,
                "─".repeat(rule_width.saturating_sub(code.lang.chars().count() + 3))
            )
        };
        self.lines.push(Line::from(vec![
            Span::styled("┌", frame),
            Span::styled(header, frame),
        ]));

        // Long lines are cut rather than wrapped so the gutter stays aligned.
        let max_cols = self.width.saturating_sub(3);
        for spans in highlight_code(&code.body, &code.lang) {
            let mut row = vec![Span::styled("│ ", frame)];
            let mut used = 0;
            for span in spans {
                let len = span.content.chars().count();
                if used + len <= max_cols {
                    used += len;
                    row.push(span);
                } else {
                    let keep = max_cols.saturating_sub(used + 1);
                    let cut: String = span.content.chars().take(keep).collect();
                    row.push(Span::styled(cut, span.style));
                    row.push(Span::styled("…", frame));
                    break;
                }
            }
            self.lines.push(Line::from(row));
        }

        self.lines.push(Line::from(vec![
            Span::styled("└", frame),
            Span::styled("─".repeat(rule_width), frame),
        ]));
        self.lines.push(Line::default());
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.break_line();
        while self.lines.last().is_some_and(|l| l.width() == 0) {
            self.lines.pop();
        }
        self.lines
    }
}
