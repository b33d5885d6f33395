//! Formatting utilities (LLM Markdown → Telegram markup dialects).
//!
//! Three dialects are supported:
//! - [`Dialect::PlainEmphasis`]: Telegram legacy `Markdown`. Body text is trusted markup.
//! - [`Dialect::StrictEscaped`]: Telegram `MarkdownV2`. Every reserved character is escaped,
//!   code spans are protected.
//! - [`Dialect::MarkupEntities`]: Telegram `HTML`. Entities escaped, Markdown converted to tags.
//!
//! All dialects share the same structural pass: tables become bullet lists and
//! `#` headers collapse to a single emphasis style.

use std::sync::OnceLock;

use regex::{Captures, Regex};

pub use crate::chunking::{balance_html_chunks, split_html, split_markdown, split_message as split};

/// Characters MarkdownV2 requires to be escaped outside of code entities.
///
/// Backslash comes first so escapes added for the others are not doubled.
const MARKDOWN_V2_RESERVED: [char; 19] = [
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.',
    '!',
];

const MARKDOWN_RESERVED: [char; 4] = ['_', '*', '[', '`'];

/// A markup flavor accepted by the messaging platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dialect {
    PlainEmphasis,
    StrictEscaped,
    MarkupEntities,
}

impl Dialect {
    /// Escape an arbitrary value so it renders literally in this dialect.
    pub fn escape(self, text: &str) -> String {
        match self {
            Dialect::PlainEmphasis => escape_with(text, &MARKDOWN_RESERVED),
            Dialect::StrictEscaped => escape_markdown_v2(text),
            Dialect::MarkupEntities => escape_html(text),
        }
    }

    /// Wrap already-escaped text in this dialect's (single) emphasis style.
    pub fn emphasis(self, text: &str) -> String {
        match self {
            Dialect::PlainEmphasis | Dialect::StrictEscaped => format!("*{text}*"),
            Dialect::MarkupEntities => format!("<b>{text}</b>"),
        }
    }

    /// Delimiter placed between table cells once a row becomes a bullet line.
    pub fn cell_joiner(self) -> &'static str {
        match self {
            Dialect::PlainEmphasis => " | ",
            Dialect::StrictEscaped | Dialect::MarkupEntities => " — ",
        }
    }

    // Legacy Markdown bodies are authored markup; only interpolated values get escaped.
    fn escape_body(self, text: &str) -> String {
        match self {
            Dialect::PlainEmphasis => text.to_string(),
            other => other.escape(text),
        }
    }
}

/// Format raw model output (or bot-authored Markdown) for the given dialect.
///
/// Total over all inputs: never fails, never panics.
pub fn format(text: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::PlainEmphasis => {
            let (stripped, spans) = extract_code(text);
            restore_code(convert_structure(&stripped, dialect), &spans, |span| match span {
                CodeSpan::Block { lang, body } => format!("```{lang}\n{body}```"),
                CodeSpan::Inline(code) => format!("`{code}`"),
            })
        }
        Dialect::StrictEscaped => convert_markdown_to_v2(text),
        Dialect::MarkupEntities => convert_markdown_to_html(text),
    }
}

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Escape every MarkdownV2 reserved character (and backslash) with a backslash.
pub fn escape_markdown_v2(text: &str) -> String {
    escape_with(text, &MARKDOWN_V2_RESERVED)
}

fn escape_with(text: &str, reserved: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if reserved.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// System message sent with every completion request.
///
/// The model writes standard Markdown; [`format`] turns it into the platform dialect.
pub fn system_prompt() -> &'static str {
    "You are a helpful assistant chatting through Telegram. Format your answers in standard Markdown:\n\
- **bold** for emphasis, _italic_ for subtle emphasis\n\
- `inline code` for commands, variables and file names\n\
- fenced ``` code blocks for multi-line code\n\
- # headers for sections (they are shown as bold text)\n\
- > quotes for notes or citations\n\
- simple pipe tables are fine; they are shown as bullet lists\n\n\
Keep answers clear, well structured and easy to read on a phone."
}

// ============== Structural pass (tables + headers) ==============

fn convert_structure(text: &str, dialect: Dialect) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut in_table = false;

    let mut i = 0usize;
    while i < lines.len() {
        let trimmed = lines[i].trim();

        if is_table_row(trimmed) {
            let has_header = lines
                .get(i + 1)
                .map(|next| is_header_separator(next.trim()))
                .unwrap_or(false);

            if !in_table {
                in_table = true;
                if out.last().map(|l| !l.trim().is_empty()).unwrap_or(false) {
                    out.push(String::new());
                }
            }

            out.push(table_row_to_bullet(trimmed, has_header, dialect));
            // The separator under a header row is dropped.
            i += if has_header { 2 } else { 1 };
            continue;
        }

        if in_table {
            in_table = false;
            if !trimmed.is_empty() {
                out.push(String::new());
            }
        }

        match header_text(trimmed) {
            Some(title) => out.push(dialect.emphasis(&dialect.escape_body(title))),
            None => out.push(dialect.escape_body(lines[i])),
        }
        i += 1;
    }

    out.join("\n")
}

fn is_table_row(trimmed: &str) -> bool {
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.chars().count() > 2
}

fn is_header_separator(trimmed: &str) -> bool {
    trimmed.contains('-') && trimmed.contains('|')
}

fn table_row_to_bullet(trimmed: &str, header: bool, dialect: Dialect) -> String {
    let cells: Vec<String> = trimmed
        .trim_matches('|')
        .split('|')
        .map(|cell| {
            let cell = cell.trim();
            let escaped = dialect.escape_body(cell);
            if header && !cell.is_empty() {
                dialect.emphasis(&escaped)
            } else {
                escaped
            }
        })
        .collect();

    format!("• {}", cells.join(dialect.cell_joiner()))
}

/// `### Title` → `Some("Title")`. Heading level is intentionally discarded.
fn header_text(trimmed: &str) -> Option<&str> {
    if !trimmed.starts_with('#') {
        return None;
    }
    let rest = trimmed.trim_start_matches('#').trim();
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

// ============== Code span protection ==============

#[derive(Clone, Debug, PartialEq, Eq)]
enum CodeSpan {
    Block { lang: String, body: String },
    Inline(String),
}

fn placeholder(idx: usize) -> String {
    format!("\0CODE{idx}\0")
}

fn link_placeholder(idx: usize) -> String {
    format!("\0LINK{idx}\0")
}

/// Replace fenced blocks, then inline spans, with opaque placeholders.
///
/// NUL is reserved for placeholders, so it is dropped from the input first.
fn extract_code(input: &str) -> (String, Vec<CodeSpan>) {
    let input = input.replace('\0', "");
    let mut spans = Vec::new();
    let text = extract_code_blocks(&input, &mut spans);
    let text = extract_inline_codes(&text, &mut spans);
    (text, spans)
}

fn extract_code_blocks(input: &str, spans: &mut Vec<CodeSpan>) -> String {
    let mut out = String::new();

    let mut i = 0usize;
    while let Some(rel) = input[i..].find("```") {
        let start = i + rel;
        out.push_str(&input[i..start]);

        // Optional language identifier, only when the fence line ends right after it.
        let mut p = start + 3;
        while p < input.len() {
            let b = input.as_bytes()[p];
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'+' || b == b'-' {
                p += 1;
            } else {
                break;
            }
        }
        let (lang, body_start) = if p < input.len() && input.as_bytes()[p] == b'\n' {
            (input[start + 3..p].to_string(), p + 1)
        } else {
            (String::new(), start + 3)
        };

        if let Some(end_rel) = input[body_start..].find("```") {
            let end = body_start + end_rel;
            out.push_str(&placeholder(spans.len()));
            spans.push(CodeSpan::Block {
                lang,
                body: input[body_start..end].to_string(),
            });
            i = end + 3;
            continue;
        }

        // Unclosed fence: append the rest and stop.
        out.push_str(&input[start..]);
        return out;
    }

    out.push_str(&input[i..]);
    out
}

fn extract_inline_codes(input: &str, spans: &mut Vec<CodeSpan>) -> String {
    let mut out = String::new();

    let mut i = 0usize;
    while let Some(rel) = input[i..].find('`') {
        let start = i + rel;
        out.push_str(&input[i..start]);

        let content_start = start + 1;
        match input[content_start..].find(['`', '\n']) {
            Some(end_rel) if input.as_bytes()[content_start + end_rel] == b'`' && end_rel > 0 => {
                let end = content_start + end_rel;
                out.push_str(&placeholder(spans.len()));
                spans.push(CodeSpan::Inline(input[content_start..end].to_string()));
                i = end + 1;
            }
            _ => {
                // Empty, unclosed or spanning a newline: keep the backtick as text.
                out.push('`');
                i = content_start;
            }
        }
    }

    out.push_str(&input[i..]);
    out
}

fn restore_code(mut text: String, spans: &[CodeSpan], render: impl Fn(&CodeSpan) -> String) -> String {
    // Reverse order so `CODE1` is never matched inside `CODE12`.
    for (idx, span) in spans.iter().enumerate().rev() {
        text = text.replace(&placeholder(idx), &render(span));
    }
    text
}

// ============== MarkdownV2 ==============

fn escape_code_v2(code: &str) -> String {
    code.replace('\\', "\\\\").replace('`', "\\`")
}

fn convert_markdown_to_v2(input: &str) -> String {
    let (text, spans) = extract_code(input);
    let text = convert_structure(&text, Dialect::StrictEscaped);

    restore_code(text, &spans, |span| match span {
        CodeSpan::Block { lang, body } => {
            let body = escape_code_v2(body);
            let sep = if body.ends_with('\n') { "" } else { "\n" };
            format!("```{lang}\n{body}{sep}```")
        }
        CodeSpan::Inline(code) => format!("`{}`", escape_code_v2(code)),
    })
}

// ============== HTML ==============

/// Convert a Markdown subset to Telegram-compatible HTML.
///
/// Telegram HTML supports only a small subset: `<b>`, `<i>`, `<code>`, `<pre>`,
/// `<blockquote>`, `<a href="...">`.
pub fn convert_markdown_to_html(input: &str) -> String {
    let (text, spans) = extract_code(input);

    // Tables + headers, with entity escaping of everything else.
    let mut text = convert_structure(&text, Dialect::MarkupEntities);

    // Links: [text](url) -> <a href="url">text</a> (no nested brackets).
    // Rendered before emphasis so markers inside URLs stay literal.
    let mut links = Vec::new();
    text = link_regex()
        .replace_all(&text, |caps: &Captures<'_>| {
            links.push(format!(r#"<a href="{}">{}</a>"#, &caps[2], emphasize(&caps[1])));
            link_placeholder(links.len() - 1)
        })
        .into_owned();

    // Line-oriented transforms (avoid cross-line emphasis bugs).
    text = text.split('\n').map(emphasize).collect::<Vec<_>>().join("\n");

    // Blockquotes (after escaping, `>` becomes `&gt;`).
    text = convert_blockquotes(&text);

    // Bullet lists
    text = text
        .split('\n')
        .map(|line| {
            if let Some(rest) = line.strip_prefix("- ") {
                return format!("• {rest}");
            }
            if let Some(rest) = line.strip_prefix("* ") {
                return format!("• {rest}");
            }
            line.to_string()
        })
        .collect::<Vec<_>>()
        .join("\n");

    // Horizontal rules
    text = text
        .split('\n')
        .filter(|line| {
            let t = line.trim();
            !(t.len() >= 3 && t.chars().all(|c| c == '-' || c == '*'))
        })
        .collect::<Vec<_>>()
        .join("\n");

    for (idx, link) in links.iter().enumerate().rev() {
        text = text.replace(&link_placeholder(idx), link);
    }

    text = restore_code(text, &spans, |span| match span {
        CodeSpan::Block { body, .. } => format!("<pre>{}</pre>", escape_html(body)),
        CodeSpan::Inline(code) => format!("<code>{}</code>", escape_html(code)),
    });

    // Collapse multiple newlines
    while text.contains("\n\n\n") {
        text = text.replace("\n\n\n", "\n\n");
    }

    text
}

fn emphasize(line: &str) -> String {
    let l = replace_delimited(line, "**", "<b>", "</b>");
    let l = replace_delimited(&l, "__", "<b>", "</b>");
    let l = replace_single_delim(&l, '_', "<i>", "</i>");
    replace_single_delim(&l, '*', "<b>", "</b>")
}

fn link_regex() -> &'static Regex {
    static LINK: OnceLock<Regex> = OnceLock::new();
    LINK.get_or_init(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid regex"))
}

fn replace_delimited(text: &str, delim: &str, open: &str, close: &str) -> String {
    let mut out = String::new();
    let mut i = 0usize;
    while let Some(rel) = text[i..].find(delim) {
        let start = i + rel;
        out.push_str(&text[i..start]);
        let content_start = start + delim.len();
        if let Some(end_rel) = text[content_start..].find(delim) {
            let end = content_start + end_rel;
            out.push_str(open);
            out.push_str(&text[content_start..end]);
            out.push_str(close);
            i = end + delim.len();
            continue;
        }
        out.push_str(&text[start..]);
        return out;
    }
    out.push_str(&text[i..]);
    out
}

fn replace_single_delim(text: &str, delim: char, open: &str, close: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let is_lone = |j: usize| {
        chars[j] == delim
            && !(j > 0 && chars[j - 1] == delim)
            && !(j + 1 < chars.len() && chars[j + 1] == delim)
    };

    let mut out = String::new();
    let mut i = 0usize;
    while i < chars.len() {
        if !is_lone(i) {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        // `* item` is a bullet, not emphasis.
        if i == 0 && chars.get(1) == Some(&' ') {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        match (i + 1..chars.len()).find(|&j| is_lone(j)) {
            Some(j) if j > i + 1 => {
                out.push_str(open);
                out.extend(&chars[i + 1..j]);
                out.push_str(close);
                i = j + 1;
            }
            _ => {
                out.push(chars[i]);
                i += 1;
            }
        }
    }

    out
}

fn convert_blockquotes(text: &str) -> String {
    let mut result: Vec<String> = Vec::new();
    let mut block_lines: Vec<String> = Vec::new();

    let flush = |result: &mut Vec<String>, block_lines: &mut Vec<String>| {
        if !block_lines.is_empty() {
            result.push(format!("<blockquote>{}</blockquote>", block_lines.join("\n")));
            block_lines.clear();
        }
    };

    for line in text.split('\n') {
        if line == "&gt;" {
            block_lines.push(String::new());
            continue;
        }
        if let Some(content) = line.strip_prefix("&gt; ") {
            block_lines.push(content.to_string());
            continue;
        }
        flush(&mut result, &mut block_lines);
        result.push(line.to_string());
    }
    flush(&mut result, &mut block_lines);

    result.join("\n")
}
