//! Inline markup -> text model
//!
//! Content fragments carry a small HTML-like markup (`<p>`, `<br>`, `<b>`,
//! `<i>`, `<u>`, lists). The text model holds the plain text plus styled runs
//! and list markers, with ranges in UTF-16 code units as the slide-editing
//! API counts them.

use serde::{Deserialize, Serialize};

/// A styled range of the plain text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    pub start: usize,
    pub end: usize,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Unordered,
    Ordered,
}

/// A range of the plain text that belongs to a list item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMarker {
    pub start: usize,
    pub end: usize,
    pub kind: ListKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextModel {
    pub raw_text: String,
    pub runs: Vec<TextRun>,
    pub lists: Vec<ListMarker>,
}

impl TextModel {
    pub fn is_empty(&self) -> bool {
        self.raw_text.is_empty()
    }

    /// Length of the text in UTF-16 code units
    pub fn utf16_len(&self) -> usize {
        utf16_len(&self.raw_text)
    }
}

fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

#[derive(Default)]
struct Builder {
    buf: String,
    len16: usize,
    open: Vec<String>,
    list_kinds: Vec<ListKind>,
    runs: Vec<TextRun>,
    lists: Vec<ListMarker>,
}

impl Builder {
    fn is_open(&self, names: &[&str]) -> bool {
        self.open.iter().any(|t| names.contains(&t.as_str()))
    }

    fn newline(&mut self) {
        self.buf.push('\n');
        self.len16 += 1;
    }

    fn break_line(&mut self) {
        if !self.buf.is_empty() && !self.buf.ends_with('\n') {
            self.newline();
        }
    }

    fn text(&mut self, data: &str) {
        if data.is_empty() {
            return;
        }
        // Indentation between tags
        if data.trim().is_empty() && data.contains('\n') {
            return;
        }

        let data = decode_entities(data);
        let start = self.len16;
        self.len16 += utf16_len(&data);
        self.buf.push_str(&data);
        let end = self.len16;

        let bold = self.is_open(&["b", "strong"]);
        let italic = self.is_open(&["i", "em"]);
        let underline = self.is_open(&["u"]);
        if bold || italic || underline {
            self.runs.push(TextRun {
                start,
                end,
                bold,
                italic,
                underline,
            });
        }
        if self.is_open(&["li"]) {
            let kind = self.list_kinds.last().copied().unwrap_or(ListKind::Unordered);
            match self.lists.last_mut() {
                Some(last) if last.kind == kind && last.end == start => last.end = end,
                _ => self.lists.push(ListMarker { start, end, kind }),
            }
        }
    }

    fn tag(&mut self, inner: &str) {
        let closing = inner.starts_with('/');
        let body = inner.trim_start_matches('/');
        let self_closing = body.trim_end().ends_with('/');
        let name: String = body
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        if closing {
            match name.as_str() {
                "p" | "li" => self.break_line(),
                "ul" | "ol" => {
                    self.list_kinds.pop();
                }
                _ => {}
            }
            if let Some(pos) = self.open.iter().rposition(|t| *t == name) {
                self.open.remove(pos);
            }
            return;
        }

        match name.as_str() {
            "br" => {
                self.newline();
                return;
            }
            "p" | "li" => self.break_line(),
            "ul" => self.list_kinds.push(ListKind::Unordered),
            "ol" => self.list_kinds.push(ListKind::Ordered),
            _ => {}
        }
        if !self_closing {
            self.open.push(name);
        }
    }

    fn finish(self) -> TextModel {
        let trimmed_end = self.buf.trim_end();
        let raw_text = trimmed_end.trim_start();
        let lead = utf16_len(&trimmed_end[..trimmed_end.len() - raw_text.len()]);
        let len = utf16_len(raw_text);

        let clamp = |start: usize, end: usize| {
            let start = start.saturating_sub(lead).min(len);
            let end = end.saturating_sub(lead).min(len);
            (start < end).then_some((start, end))
        };

        TextModel {
            raw_text: raw_text.to_string(),
            runs: self
                .runs
                .into_iter()
                .filter_map(|run| {
                    clamp(run.start, run.end).map(|(start, end)| TextRun { start, end, ..run })
                })
                .collect(),
            lists: self
                .lists
                .into_iter()
                .filter_map(|marker| {
                    clamp(marker.start, marker.end)
                        .map(|(start, end)| ListMarker { start, end, ..marker })
                })
                .collect(),
        }
    }
}

fn looks_like_tag(inner: &str) -> bool {
    let body = inner.strip_prefix('/').unwrap_or(inner);
    body.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) && !inner.contains('<')
}

/// Parse a content fragment into its text model. Unknown tags are ignored;
/// a `<` that does not open a tag is kept as text.
pub fn parse_inline_markup(source: &str) -> TextModel {
    let mut builder = Builder::default();
    let mut rest = source;

    while let Some(pos) = rest.find('<') {
        builder.text(&rest[..pos]);
        let candidate = &rest[pos + 1..];
        match candidate.find('>') {
            Some(end) if looks_like_tag(&candidate[..end]) => {
                builder.tag(&candidate[..end]);
                rest = &candidate[end + 1..];
            }
            _ => {
                builder.text("<");
                rest = candidate;
            }
        }
    }
    builder.text(rest);

    builder.finish()
}

/// Decode the entities content fragments use. Unknown entities are left as-is.
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let decoded = tail
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" | "#39" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}
