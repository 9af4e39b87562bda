//! Markdown normalization: consistent block spacing over rendered text.
//!
//! The renderer already separates blocks, but user style maps, soft line
//! breaks and pasted content can still produce lists glued to paragraphs or
//! headings without breathing room. This stage is a line-oriented state
//! machine that fixes spacing without touching content:
//!
//! ```text
//!            list item                 blank / heading / plain
//!   ┌──────┐ ─────────▶ ┌─────────┐ ───────────────────────▶ ┌──────┐
//!   │ text │            │ in list │                          │ text │
//!   └──────┘ ◀───────── └─────────┘ ◀──── indented plain ────┘──────┘
//!                        (continuation keeps the list open)
//! ```
//!
//! Fenced code is copied verbatim and suspends all list/heading handling.
//! Final passes then drop empty links, strip trailing whitespace, collapse
//! blank-line runs and trim the document.

use once_cell::sync::Lazy;
use regex::Regex;

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+").expect("valid regex"));

static NUMBERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+\.\s+").expect("valid regex"));

static BULLETED_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-*•·●○]\s+").expect("valid regex"));

static FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s{0,3}```").expect("valid regex"));

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

static EMPTY_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^!\\])\[\]\([^)]*\)").expect("valid regex"));

/// Classification of a single input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Heading,
    NumberedItem,
    BulletedItem,
    Fence,
    Plain,
}

/// Tracks fenced code across lines.
///
/// A block opened by N backticks closes only on a line holding nothing but
/// at least N backticks, so a four-backtick fence can carry three-backtick
/// lines as content.
#[derive(Debug, Clone, Copy, Default)]
pub struct FenceTracker {
    open: Option<usize>,
}

impl FenceTracker {
    pub fn in_code(&self) -> bool {
        self.open.is_some()
    }

    /// Advance over `line`; true when the line belongs to a code block,
    /// opening and closing fences included.
    pub fn step(&mut self, line: &str) -> bool {
        match self.open {
            Some(len) => {
                if fence_run(line).is_some_and(|(n, info)| n >= len && info.trim().is_empty()) {
                    self.open = None;
                }
                true
            }
            None => match fence_run(line) {
                Some((n, info)) if !info.contains('`') => {
                    self.open = Some(n);
                    true
                }
                _ => false,
            },
        }
    }
}

/// Backtick count and trailing info string of a fence line.
fn fence_run(line: &str) -> Option<(usize, &str)> {
    let rest = line.trim_start_matches(' ');
    if line.len() - rest.len() > 3 {
        return None;
    }
    let ticks = rest.bytes().take_while(|b| *b == b'`').count();
    (ticks >= 3).then_some((ticks, &rest[ticks..]))
}

/// Kind of the list currently open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    None,
    Numbered,
    Bulleted,
}

pub fn classify(line: &str) -> LineKind {
    if line.trim().is_empty() {
        LineKind::Blank
    } else if FENCE.is_match(line) {
        LineKind::Fence
    } else if HEADING.is_match(line) {
        LineKind::Heading
    } else if NUMBERED_ITEM.is_match(line) {
        LineKind::NumberedItem
    } else if BULLETED_ITEM.is_match(line) {
        LineKind::BulletedItem
    } else {
        LineKind::Plain
    }
}

/// Normalize rendered Markdown.
pub fn normalize(markdown: &str) -> String {
    let text = normalise_line_endings(markdown);
    let text = remove_invisible_chars(&text);
    let text = apply_state_machine(&text);
    let text = remove_empty_links(&text);
    let text = trim_trailing_whitespace(&text);
    let text = collapse_blank_lines(&text);
    text.trim().to_string()
}

struct Normalizer {
    out: Vec<String>,
    fence: FenceTracker,
    in_list: bool,
    list_kind: ListKind,
    prev_was_heading: bool,
}

impl Normalizer {
    fn new() -> Self {
        Self {
            out: Vec::new(),
            fence: FenceTracker::default(),
            in_list: false,
            list_kind: ListKind::None,
            prev_was_heading: false,
        }
    }

    /// Push a blank separator unless the output already ends with one.
    fn ensure_blank(&mut self) {
        if self.out.last().is_some_and(|l| !l.trim().is_empty()) {
            self.out.push(String::new());
        }
    }

    fn leave_list(&mut self) {
        if self.in_list {
            self.ensure_blank();
            self.in_list = false;
            self.list_kind = ListKind::None;
        }
    }

    fn push(&mut self, line: &str) {
        self.out.push(line.to_string());
    }

    fn feed(&mut self, line: &str) {
        let opening = !self.fence.in_code();
        if self.fence.step(line) {
            if opening {
                if self.prev_was_heading {
                    self.ensure_blank();
                }
                self.prev_was_heading = false;
            }
            self.push(line);
            return;
        }

        match classify(line) {
            LineKind::Blank => {
                self.leave_list();
                self.ensure_blank();
                self.prev_was_heading = false;
            }
            LineKind::Heading => {
                self.leave_list();
                if !self.prev_was_heading {
                    self.ensure_blank();
                }
                self.push(line);
                self.prev_was_heading = true;
            }
            kind @ (LineKind::NumberedItem | LineKind::BulletedItem) => {
                let kind = if kind == LineKind::NumberedItem {
                    ListKind::Numbered
                } else {
                    ListKind::Bulleted
                };
                let top_level = !line.starts_with(char::is_whitespace);
                if !self.in_list || self.prev_was_heading {
                    self.ensure_blank();
                } else if top_level && self.list_kind != ListKind::None && self.list_kind != kind {
                    // Switching between "-" and "1." at the top level starts a new list.
                    self.ensure_blank();
                }
                self.in_list = true;
                if top_level || self.list_kind == ListKind::None {
                    self.list_kind = kind;
                }
                self.prev_was_heading = false;
                self.push(line);
            }
            LineKind::Plain | LineKind::Fence => {
                let indented = line.starts_with(char::is_whitespace);
                if self.in_list && indented {
                    self.push(line);
                    return;
                }
                self.leave_list();
                if self.prev_was_heading {
                    self.ensure_blank();
                }
                self.prev_was_heading = false;
                self.push(line);
            }
        }
    }
}

fn apply_state_machine(input: &str) -> String {
    let mut n = Normalizer::new();
    for line in input.split('\n') {
        n.feed(line);
    }
    n.out.join("\n")
}

// ── Final passes ───────────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

/// Remove `[](…)` left behind by links whose text was cleaned away.
/// Image syntax `![](…)` is left alone.
fn remove_empty_links(input: &str) -> String {
    let mut current = input.to_string();
    // Adjacent empty links share a boundary character, so repeat to a fixpoint.
    loop {
        let next = EMPTY_LINK.replace_all(&current, "$1").into_owned();
        if next == current {
            return next;
        }
        current = next;
    }
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// At most one blank line between blocks.
pub fn collapse_blank_lines(input: &str) -> String {
    BLANK_RUNS.replace_all(input, "\n\n").into_owned()
}
