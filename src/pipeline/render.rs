//! Markup conversion: serialise cleaned blocks to Markdown.
//!
//! ## Output conventions
//!
//! | Block | Markdown |
//! |-------|----------|
//! | heading      | `## Text` (ATX, level 1–6) |
//! | bullet item  | `- text`, two spaces of indent per nesting level |
//! | ordered item | `3. text` |
//! | code block   | fenced with backticks |
//! | blockquote   | `> text` |
//! | table        | GFM pipe table, first row is the header |
//!
//! Inline marks use `**strong**`, `*em*`, `` `code` `` and `~~strike~~`.
//! Images with an empty `src` (upload failed) render as nothing so the
//! output never carries a dangling `![](…)`.
//!
//! The renderer is a pure function of the block list: no clock, no
//! randomness, no I/O. Determinism of the whole conversion rests on it.

use crate::document::{Block, Document, ImageRef, Inline, Marks};
use once_cell::sync::Lazy;
use regex::Regex;

static ORDERED_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)([.)])(\s|$)").expect("valid regex"));

/// Render a whole document.
pub fn render(document: &Document) -> String {
    let mut out = String::new();
    let mut prev: Option<&Block> = None;
    for block in &document.blocks {
        let rendered = render_block(block);
        if rendered.is_empty() {
            continue;
        }
        if let Some(p) = prev {
            let tight = matches!(p, Block::ListItem { .. }) && matches!(block, Block::ListItem { .. });
            out.push_str(if tight { "\n" } else { "\n\n" });
        }
        out.push_str(&rendered);
        prev = Some(block);
    }
    out
}

/// Render one block without surrounding blank lines.
pub fn render_block(block: &Block) -> String {
    match block {
        Block::Heading { level, content } => {
            let text = render_inlines(content).replace('\n', " ");
            let text = text.trim();
            if text.is_empty() {
                return String::new();
            }
            format!("{} {}", "#".repeat((*level).clamp(1, 6) as usize), text)
        }
        Block::Paragraph { content } => escape_lines(render_inlines(content).trim()),
        Block::ListItem {
            ordered,
            ordinal,
            depth,
            content,
        } => {
            let indent = "  ".repeat(*depth as usize);
            let marker = if *ordered {
                format!("{ordinal}. ")
            } else {
                "- ".to_string()
            };
            let body = escape_lines(render_inlines(content).trim());
            let continuation = format!("\n{indent}{}", " ".repeat(marker.len()));
            format!("{indent}{marker}{}", body.replace('\n', &continuation))
        }
        Block::CodeBlock { text } => {
            let text = text.trim_end_matches('\n');
            let fence = fence_for(text);
            format!("{fence}\n{text}\n{fence}")
        }
        Block::Blockquote { content } => {
            let body = escape_lines(render_inlines(content).trim());
            if body.is_empty() {
                return String::new();
            }
            body.lines()
                .map(|l| if l.is_empty() { ">".to_string() } else { format!("> {l}") })
                .collect::<Vec<_>>()
                .join("\n")
        }
        Block::Table { rows } => render_table(rows),
    }
}

/// A fence longer than any backtick run inside the code.
fn fence_for(text: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in text.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}

// ── Tables ────────────────────────────────────────────────────────────────

fn render_table(rows: &[Vec<Vec<Inline>>]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|c| render_cell(c)).collect())
        .collect();
    let columns = cells.iter().map(Vec::len).max().unwrap_or(0);
    let all_empty = cells.iter().flatten().all(|c| c.is_empty());

    if columns < 2 || all_empty {
        // Layout tables (one column) read better as plain paragraphs.
        return cells
            .into_iter()
            .flatten()
            .filter(|c| !c.is_empty())
            .map(|c| escape_lines(&c.replace("\\|", "|")))
            .collect::<Vec<_>>()
            .join("\n\n");
    }

    let line = |row: &[String]| {
        let mut s = String::from("|");
        for i in 0..columns {
            let cell = row.get(i).map(String::as_str).unwrap_or("");
            s.push(' ');
            s.push_str(cell);
            s.push_str(" |");
        }
        s
    };

    let mut out = Vec::with_capacity(cells.len() + 1);
    out.push(line(&cells[0]));
    out.push(format!("|{}", " --- |".repeat(columns)));
    for row in &cells[1..] {
        out.push(line(row));
    }
    out.join("\n")
}

fn render_cell(content: &[Inline]) -> String {
    render_inlines(content)
        .split('\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "\\|")
}

// ── Inline content ──────────────────────────────────────────────────────────

/// Render inline content; line breaks come out as `\n`.
pub fn render_inlines(inlines: &[Inline]) -> String {
    let mut out = String::new();
    for inline in inlines {
        match inline {
            Inline::Text { text, marks } => push_marked(&mut out, text, marks),
            Inline::Link { href, children } => {
                let inner = render_inlines(children).replace('\n', " ");
                out.push('[');
                out.push_str(inner.trim());
                out.push_str("](");
                out.push_str(&escape_url(href));
                out.push(')');
            }
            Inline::Bookmark { .. } => {}
            Inline::LineBreak => {
                let trimmed = out.trim_end_matches(' ').len();
                out.truncate(trimmed);
                out.push('\n');
            }
            Inline::Image(img) => push_image(&mut out, img),
        }
    }
    out
}

fn push_image(out: &mut String, img: &ImageRef) {
    if img.src.is_empty() {
        return;
    }
    out.push_str("![");
    out.push_str(&img.alt.replace(['\n', '\r'], " ").replace('[', "\\[").replace(']', "\\]"));
    out.push_str("](");
    out.push_str(&escape_url(&img.src));
    if let Some(title) = img.title.as_deref().filter(|t| !t.trim().is_empty()) {
        out.push_str(" \"");
        out.push_str(&title.replace('"', "\\\""));
        out.push('"');
    }
    out.push(')');
}

/// Append a text run wrapped in its mark delimiters.
///
/// Surrounding whitespace stays outside the delimiters (`** bold**` is not
/// emphasis in CommonMark) and whitespace runs collapse to a single space,
/// also across run boundaries.
fn push_marked(out: &mut String, text: &str, marks: &Marks) {
    if marks.code {
        let core = text.trim();
        if core.is_empty() {
            push_collapsed(out, text);
            return;
        }
        if text.starts_with(char::is_whitespace) {
            push_collapsed(out, " ");
        }
        let ticks = if core.contains('`') { "``" } else { "`" };
        let pad = if core.contains('`') { " " } else { "" };
        let mut span = format!("{ticks}{pad}{core}{pad}{ticks}");
        wrap(&mut span, marks);
        out.push_str(&span);
        if text.ends_with(char::is_whitespace) {
            out.push(' ');
        }
        return;
    }

    if marks.is_plain() {
        push_collapsed(out, &escape_inline(text));
        return;
    }

    let core = text.trim();
    if core.is_empty() {
        push_collapsed(out, text);
        return;
    }
    if text.starts_with(char::is_whitespace) {
        push_collapsed(out, " ");
    }
    let mut span = String::new();
    push_collapsed(&mut span, &escape_inline(core));
    wrap(&mut span, marks);
    out.push_str(&span);
    if text.ends_with(char::is_whitespace) {
        out.push(' ');
    }
}

fn wrap(span: &mut String, marks: &Marks) {
    if marks.strikethrough {
        *span = format!("~~{span}~~");
    }
    if marks.emphasis {
        *span = format!("*{span}*");
    }
    if marks.strong {
        *span = format!("**{span}**");
    }
}

/// Append `text` with tabs and whitespace runs folded into single spaces.
fn push_collapsed(out: &mut String, text: &str) {
    for c in text.chars() {
        if c.is_whitespace() {
            if !(out.is_empty() || out.ends_with(' ') || out.ends_with('\n')) {
                out.push(' ');
            }
        } else {
            out.push(c);
        }
    }
}

/// Backslash-escape characters that would otherwise start inline markup.
///
/// Underscores inside words (`snake_case`) are left alone since CommonMark
/// never treats them as emphasis.
fn escape_inline(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        let escape = match c {
            '\\' | '*' | '`' | '[' | ']' => true,
            '~' => chars.get(i + 1) == Some(&'~') || (i > 0 && chars[i - 1] == '~'),
            '_' => {
                let before = i > 0 && chars[i - 1].is_alphanumeric();
                let after = chars.get(i + 1).is_some_and(|n| n.is_alphanumeric());
                !(before && after)
            }
            _ => false,
        };
        if escape {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape characters at the start of each line that Markdown would read as
/// block syntax (a paragraph that begins with "1. " or "# ").
fn escape_lines(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with('#')
                || trimmed.starts_with('>')
                || trimmed.starts_with("- ")
                || trimmed.starts_with("+ ")
                || trimmed.starts_with("* ")
                || trimmed.starts_with('|')
                || trimmed.starts_with("```")
                || trimmed == "-"
            {
                format!("\\{trimmed}")
            } else if let Some(caps) = ORDERED_MARKER.captures(trimmed) {
                let digits = &caps[1];
                format!("{digits}\\{}", &trimmed[digits.len()..])
            } else {
                trimmed.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_url(url: &str) -> String {
    url.trim()
        .replace(' ', "%20")
        .replace('(', "%28")
        .replace(')', "%29")
}
