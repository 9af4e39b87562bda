//! Structural cleanup: remove Word artifacts before rendering.
//!
//! Articles are written in Word and pasted into the blog, so the document
//! carries furniture that makes no sense on a web page: a generated table of
//! contents, `_Toc`/`_Hlk` bookmarks, page numbers, "5 min read" badges.
//! Each concern is one [`CleanupRule`]; [`clean`] applies them in a fixed
//! order because later rules rely on earlier ones (removing TOC links in
//! rule 2 leaves empty paragraphs for rule 3 to drop).
//!
//! | # | Rule | Removes |
//! |---|------|---------|
//! | 1 | [`TocHeadingRule`]      | "Contents" / "Table of Contents" headings |
//! | 2 | [`TocAnchorRule`]       | `_Toc…`/`_Hlk…` bookmarks and links |
//! | 3 | [`EmptyParagraphRule`]  | empty, page-number and leader-line paragraphs |
//! | 4 | [`ReadingTimeRule`]     | "N min read" annotations |
//! | 5 | [`HeadingEmphasisRule`] | bold/italic covering a whole heading |
//!
//! Rules only ever delete; the output never has more blocks than the input.

use crate::document::{Block, Document, Inline};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static TOC_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(table\s+of\s+)?contents$").expect("valid regex"));

static TOC_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^_(Toc|Hlk)\d+$").expect("valid regex"));

static TOC_HREF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#_(Toc|Hlk)\d+$").expect("valid regex"));

static BARE_INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid regex"));

static PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^page\s+\d+").expect("valid regex"));

static LEADER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s._…]*[._…][\s._…]*$").expect("valid regex"));

static READING_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d+\s*min(ute)?s?\s*read").expect("valid regex"));

/// One independently testable cleanup step.
pub trait CleanupRule: Send + Sync {
    /// Stable identifier for logs and the [`CleanupReport`].
    fn name(&self) -> &'static str;

    /// Remove what the rule targets; returns the number of removals.
    fn apply(&self, blocks: &mut Vec<Block>) -> usize;
}

/// Removals per rule, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub blocks_before: usize,
    pub blocks_after: usize,
    pub removed: Vec<(&'static str, usize)>,
}

/// The built-in rules in their required order.
pub fn default_rules() -> Vec<Box<dyn CleanupRule>> {
    vec![
        Box::new(TocHeadingRule),
        Box::new(TocAnchorRule),
        Box::new(EmptyParagraphRule),
        Box::new(ReadingTimeRule),
        Box::new(HeadingEmphasisRule),
    ]
}

/// Apply [`default_rules`].
pub fn clean(document: Document) -> (Document, CleanupReport) {
    clean_with(document, &default_rules())
}

/// Apply `rules` in order.
pub fn clean_with(mut document: Document, rules: &[Box<dyn CleanupRule>]) -> (Document, CleanupReport) {
    let mut report = CleanupReport {
        blocks_before: document.blocks.len(),
        ..CleanupReport::default()
    };
    for rule in rules {
        let n = rule.apply(&mut document.blocks);
        debug!("cleanup rule '{}' removed {} item(s)", rule.name(), n);
        report.removed.push((rule.name(), n));
    }
    report.blocks_after = document.blocks.len();
    (document, report)
}

/// True for blocks whose only purpose is to carry inline text.
fn is_text_block(block: &Block) -> bool {
    matches!(
        block,
        Block::Heading { .. } | Block::Paragraph { .. } | Block::ListItem { .. } | Block::Blockquote { .. }
    )
}

fn is_blank(block: &Block) -> bool {
    !block.has_image() && block.plain_text().trim().is_empty()
}

// ── Rule 1 ───────────────────────────────────────────────────────────────

/// Drops the heading (or paragraph) that titles a table of contents.
pub struct TocHeadingRule;

impl CleanupRule for TocHeadingRule {
    fn name(&self) -> &'static str {
        "toc-heading"
    }

    fn apply(&self, blocks: &mut Vec<Block>) -> usize {
        let before = blocks.len();
        blocks.retain(|b| {
            !(matches!(b, Block::Heading { .. } | Block::Paragraph { .. })
                && TOC_TITLE.is_match(b.plain_text().trim()))
        });
        before - blocks.len()
    }
}

// ── Rule 2 ───────────────────────────────────────────────────────────────

/// Strips `_Toc<digits>` / `_Hlk<digits>` bookmarks and the links that
/// point at them (text included).
pub struct TocAnchorRule;

impl TocAnchorRule {
    fn strip(inlines: &mut Vec<Inline>) -> usize {
        let mut removed = 0;
        inlines.retain_mut(|inline| match inline {
            Inline::Bookmark { name } if TOC_ID.is_match(name) => {
                removed += 1;
                false
            }
            Inline::Link { href, children } => {
                let text = crate::document::plain_text(children);
                if TOC_HREF.is_match(href) || TOC_ID.is_match(text.trim()) {
                    removed += 1;
                    false
                } else {
                    removed += Self::strip(children);
                    true
                }
            }
            _ => true,
        });
        removed
    }
}

impl CleanupRule for TocAnchorRule {
    fn name(&self) -> &'static str {
        "toc-anchors"
    }

    fn apply(&self, blocks: &mut Vec<Block>) -> usize {
        let mut removed = 0;
        for block in blocks.iter_mut() {
            block.for_each_inlines_mut(&mut |content| removed += Self::strip(content));
        }
        removed
    }
}

// ── Rule 3 ───────────────────────────────────────────────────────────────

/// Drops empty text blocks and paragraphs that are only a page number,
/// a `Page N` footer or a dotted leader line.
pub struct EmptyParagraphRule;

impl EmptyParagraphRule {
    fn should_remove(block: &Block) -> bool {
        match block {
            Block::CodeBlock { text } => text.trim().is_empty(),
            b if is_text_block(b) && is_blank(b) => true,
            Block::Paragraph { .. } if !block.has_image() => {
                let text = block.plain_text();
                let text = text.trim();
                BARE_INTEGER.is_match(text) || PAGE_NUMBER.is_match(text) || LEADER_LINE.is_match(text)
            }
            _ => false,
        }
    }
}

impl CleanupRule for EmptyParagraphRule {
    fn name(&self) -> &'static str {
        "empty-paragraphs"
    }

    fn apply(&self, blocks: &mut Vec<Block>) -> usize {
        let before = blocks.len();
        blocks.retain(|b| !Self::should_remove(b));
        before - blocks.len()
    }
}

// ── Rule 4 ───────────────────────────────────────────────────────────────

/// Removes "5 min read" style annotations; a block left empty is dropped.
pub struct ReadingTimeRule;

impl ReadingTimeRule {
    fn strip(inlines: &mut [Inline]) -> usize {
        let mut removed = 0;
        for inline in inlines {
            match inline {
                Inline::Text { text, .. } if READING_TIME.is_match(text) => {
                    removed += READING_TIME.find_iter(text).count();
                    *text = READING_TIME.replace_all(text, "").into_owned();
                }
                Inline::Link { children, .. } => removed += Self::strip(children),
                _ => {}
            }
        }
        removed
    }
}

impl CleanupRule for ReadingTimeRule {
    fn name(&self) -> &'static str {
        "reading-time"
    }

    fn apply(&self, blocks: &mut Vec<Block>) -> usize {
        let mut removed = 0;
        blocks.retain_mut(|block| {
            if !is_text_block(block) {
                return true;
            }
            // The annotation may be split across differently formatted runs.
            let whole = block.plain_text();
            if !block.has_image()
                && READING_TIME.is_match(&whole)
                && READING_TIME.replace_all(&whole, "").trim().is_empty()
            {
                removed += 1;
                return false;
            }
            let mut n = 0;
            block.for_each_inlines_mut(&mut |content| n += Self::strip(content));
            removed += n;
            !(n > 0 && is_blank(block))
        });
        removed
    }
}

// ── Rule 5 ───────────────────────────────────────────────────────────────

/// Word users often bold a whole heading; `## **Setup**` adds nothing over
/// `## Setup`. Strong and emphasis are removed only when they cover every
/// visible run, so a partly bold heading keeps its marks.
pub struct HeadingEmphasisRule;

impl HeadingEmphasisRule {
    fn fully_emphasised(inlines: &[Inline], seen_text: &mut bool) -> bool {
        inlines.iter().all(|inline| match inline {
            Inline::Text { text, .. } if text.trim().is_empty() => true,
            Inline::Text { marks, .. } => {
                *seen_text = true;
                marks.strong || marks.emphasis
            }
            Inline::Link { children, .. } => Self::fully_emphasised(children, seen_text),
            _ => true,
        })
    }

    fn unmark(inlines: &mut [Inline]) {
        for inline in inlines {
            match inline {
                Inline::Text { marks, .. } => {
                    marks.strong = false;
                    marks.emphasis = false;
                }
                Inline::Link { children, .. } => Self::unmark(children),
                _ => {}
            }
        }
    }
}

impl CleanupRule for HeadingEmphasisRule {
    fn name(&self) -> &'static str {
        "heading-emphasis"
    }

    fn apply(&self, blocks: &mut Vec<Block>) -> usize {
        let mut unmarked = 0;
        for block in blocks.iter_mut() {
            if let Block::Heading { content, .. } = block {
                let mut seen_text = false;
                if Self::fully_emphasised(content, &mut seen_text) && seen_text {
                    Self::unmark(content);
                    unmarked += 1;
                }
            }
        }
        unmarked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ImageRef, Marks};

    fn para(text: &str) -> Block {
        Block::Paragraph {
            content: vec![Inline::text(text)],
        }
    }

    fn heading(level: u8, text: &str) -> Block {
        Block::Heading {
            level,
            content: vec![Inline::text(text)],
        }
    }

    fn image_para() -> Block {
        Block::Paragraph {
            content: vec![Inline::Image(ImageRef {
                alt: String::new(),
                title: None,
                slot: Some(0),
                src: "https://x/y.png".into(),
            })],
        }
    }

    #[test]
    fn rule1_removes_toc_titles_case_insensitively() {
        let mut blocks = vec![
            heading(1, "Table of Contents"),
            para("  contents "),
            heading(2, "Contents of the box"),
            para("Intro"),
        ];
        assert_eq!(TocHeadingRule.apply(&mut blocks), 2);
        assert_eq!(blocks, vec![heading(2, "Contents of the box"), para("Intro")]);
    }

    #[test]
    fn rule2_removes_toc_links_and_bookmarks() {
        let mut blocks = vec![
            Block::Paragraph {
                content: vec![
                    Inline::Bookmark { name: "_Toc123".into() },
                    Inline::text("Setup"),
                    Inline::Bookmark { name: "intro".into() },
                ],
            },
            Block::Paragraph {
                content: vec![Inline::Link {
                    href: "#_Toc456".into(),
                    children: vec![Inline::text("Setup ........ 3")],
                }],
            },
            Block::Paragraph {
                content: vec![Inline::Link {
                    href: "#somewhere".into(),
                    children: vec![Inline::text("_Hlk99")],
                }],
            },
            Block::Paragraph {
                content: vec![Inline::Link {
                    href: "https://kloudvin.com".into(),
                    children: vec![Inline::text("blog")],
                }],
            },
        ];
        assert_eq!(TocAnchorRule.apply(&mut blocks), 3);
        assert_eq!(
            blocks[0],
            Block::Paragraph {
                content: vec![Inline::text("Setup"), Inline::Bookmark { name: "intro".into() }],
            }
        );
        assert_eq!(blocks[1], Block::Paragraph { content: vec![] });
        assert_eq!(blocks[3].plain_text(), "blog");
    }

    #[test]
    fn rule3_removes_empty_and_page_numbers() {
        let mut blocks = vec![
            para("   "),
            para("12"),
            para("Page 3 of 10"),
            para("........"),
            para("__ __"),
            image_para(),
            para("Version 12 is out"),
            heading(2, " "),
            Block::CodeBlock { text: "\n".into() },
        ];
        assert_eq!(EmptyParagraphRule.apply(&mut blocks), 7);
        assert_eq!(blocks, vec![image_para(), para("Version 12 is out")]);
    }

    #[test]
    fn rule3_keeps_numeric_headings() {
        let mut blocks = vec![heading(2, "2024")];
        assert_eq!(EmptyParagraphRule.apply(&mut blocks), 0);
    }

    #[test]
    fn rule4_strips_reading_time() {
        let mut blocks = vec![
            para("5 min read"),
            para("Posted in Azure · 12 minutes read"),
            Block::Paragraph {
                content: vec![
                    Inline::Text {
                        text: "3".into(),
                        marks: Marks {
                            strong: true,
                            ..Marks::default()
                        },
                    },
                    Inline::text(" min read"),
                ],
            },
            para("Keep me"),
        ];
        assert_eq!(ReadingTimeRule.apply(&mut blocks), 3);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].plain_text(), "Posted in Azure · ");
        assert_eq!(blocks[1], para("Keep me"));
    }

    #[test]
    fn clean_never_adds_blocks_and_reports_per_rule() {
        let doc = Document::new(vec![
            heading(1, "Contents"),
            Block::Paragraph {
                content: vec![Inline::Link {
                    href: "#_Toc1".into(),
                    children: vec![Inline::text("Intro")],
                }],
            },
            heading(1, "Intro"),
            para("1"),
            para("2 min read"),
            para("Body"),
        ]);
        let (out, report) = clean(doc);
        assert_eq!(out.blocks, vec![heading(1, "Intro"), para("Body")]);
        assert_eq!(report.blocks_before, 6);
        assert_eq!(report.blocks_after, 2);
        let names: Vec<_> = report.removed.iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec![
                "toc-heading",
                "toc-anchors",
                "empty-paragraphs",
                "reading-time",
                "heading-emphasis"
            ]
        );
    }

    fn marked(text: &str, strong: bool, emphasis: bool) -> Inline {
        Inline::Text {
            text: text.into(),
            marks: Marks {
                strong,
                emphasis,
                ..Marks::default()
            },
        }
    }

    #[test]
    fn rule5_unbolds_fully_bold_headings() {
        let mut blocks = vec![
            Block::Heading {
                level: 2,
                content: vec![
                    marked("Setup", true, false),
                    marked(" ", false, false),
                    marked("Steps", true, true),
                ],
            },
            Block::Heading {
                level: 3,
                content: vec![marked("Partly", true, false), marked(" plain", false, false)],
            },
            Block::Paragraph {
                content: vec![marked("Bold body", true, false)],
            },
        ];
        assert_eq!(HeadingEmphasisRule.apply(&mut blocks), 1);
        assert!(blocks[0]
            .inlines()
            .unwrap()
            .iter()
            .all(|i| matches!(i, Inline::Text { marks, .. } if marks.is_plain())));
        assert_eq!(blocks[1].inlines().unwrap()[0], marked("Partly", true, false));
        assert_eq!(blocks[2].inlines().unwrap()[0], marked("Bold body", true, false));
    }

    #[test]
    fn rule5_keeps_code_and_skips_empty_headings() {
        let code = Inline::Text {
            text: "main".into(),
            marks: Marks {
                strong: true,
                code: true,
                ..Marks::default()
            },
        };
        let mut blocks = vec![
            Block::Heading {
                level: 2,
                content: vec![code],
            },
            Block::Heading {
                level: 2,
                content: vec![marked("  ", true, false)],
            },
        ];
        assert_eq!(HeadingEmphasisRule.apply(&mut blocks), 1);
        assert!(matches!(
            &blocks[0].inlines().unwrap()[0],
            Inline::Text { marks, .. } if marks.code && !marks.strong
        ));
        assert_eq!(blocks[1].inlines().unwrap()[0], marked("  ", true, false));
    }
}
