//! Title extraction from normalized Markdown.
//!
//! Blog posts written in Word usually start with the title, either as a
//! `Heading 1`/`Title` paragraph or as a short bold line. The title is lifted
//! out of the body so the CMS can store it separately.
//!
//! Heuristic, over the first `scan_lines` non-blank lines:
//!
//! 1. an ATX level-1 heading wins immediately;
//! 2. other headings and lines mentioning "content" (TOC residue) are skipped;
//! 3. otherwise the first line of 2–10 words, under 100 characters and not
//!    ending in `.` is taken as a bare title line.
//!
//! Fenced code, table rows, image lines, list items and blockquotes are never
//! candidates. A miss is silent: the title is empty and the body unchanged.

use super::normalize::{classify, collapse_blank_lines, FenceTracker, LineKind};
use once_cell::sync::Lazy;
use regex::Regex;

/// Default number of non-blank lines scanned.
pub const DEFAULT_SCAN_LINES: usize = 15;

const MIN_WORDS: usize = 2;
const MAX_WORDS: usize = 10;
const MAX_CHARS: usize = 100;

static H1: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#\s+(.+?)(?:\s+#+)?\s*$").expect("valid regex"));

static UNDERSCORE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|\s)_+|_+(\s|$)").expect("valid regex"));

static ESCAPED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\([\\`\[\]#>.|~+-])").expect("valid regex"));

/// Title plus the body with the title line removed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TitleSplit {
    pub title: String,
    pub body: String,
}

/// Extract a title from `markdown`, scanning at most `scan_lines` non-blank lines.
pub fn extract_title(markdown: &str, scan_lines: usize) -> TitleSplit {
    let lines: Vec<&str> = markdown.split('\n').collect();
    match find_title_line(&lines, scan_lines) {
        Some((idx, raw)) => {
            let body: Vec<&str> = lines
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != idx)
                .map(|(_, l)| *l)
                .collect();
            TitleSplit {
                title: clean_title(&raw),
                body: collapse_blank_lines(&body.join("\n")).trim().to_string(),
            }
        }
        None => TitleSplit {
            title: String::new(),
            body: markdown.to_string(),
        },
    }
}

fn find_title_line(lines: &[&str], scan_lines: usize) -> Option<(usize, String)> {
    let mut scanned = 0;
    let mut fence = FenceTracker::default();

    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if scanned >= scan_lines {
            break;
        }
        scanned += 1;

        if fence.step(line) {
            continue;
        }
        let kind = classify(line);
        if let Some(caps) = H1.captures(line) {
            return Some((idx, caps[1].to_string()));
        }
        if kind == LineKind::Heading || line.to_lowercase().contains("content") {
            continue;
        }
        if matches!(kind, LineKind::NumberedItem | LineKind::BulletedItem) {
            continue;
        }
        let trimmed = line.trim();
        if trimmed.starts_with('|') || trimmed.starts_with("![") || trimmed.starts_with('>') {
            continue;
        }
        if is_bare_title(trimmed) {
            return Some((idx, trimmed.to_string()));
        }
    }
    None
}

fn is_bare_title(line: &str) -> bool {
    let words = line.split_whitespace().count();
    (MIN_WORDS..=MAX_WORDS).contains(&words) && line.chars().count() < MAX_CHARS && !line.ends_with('.')
}

/// Strip emphasis markers and Markdown escapes from the title text.
fn clean_title(raw: &str) -> String {
    let s = raw.replace("**", "").replace("__", "").replace('*', "");
    let s = UNDERSCORE_MARKER.replace_all(&s, "$1$2");
    let s = ESCAPED.replace_all(&s, "$1");
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
