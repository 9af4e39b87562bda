//! Intermediate representation shared by every pipeline stage.
//!
//! Extraction produces a [`Document`], cleanup filters it, rendering turns it
//! into Markdown. Keeping a typed tree between stages (instead of HTML text)
//! means cleanup rules match on structure (`Inline::Bookmark`,
//! `Inline::Link { href }`) rather than on regexes over markup.

use serde::{Deserialize, Serialize};

/// Character-level formatting carried by a text run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marks {
    pub strong: bool,
    pub emphasis: bool,
    pub code: bool,
    pub strikethrough: bool,
}

impl Marks {
    pub fn is_plain(&self) -> bool {
        *self == Marks::default()
    }
}

/// A reference to an image inside the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Alternative text from the drawing's description.
    pub alt: String,
    /// Optional title (tooltip) from the drawing properties.
    pub title: Option<String>,
    /// Index into the extracted `ImageAsset` list for embedded images.
    /// `None` for linked (external) images whose `src` is already known.
    pub slot: Option<usize>,
    /// Public URL, or empty when the image could not be stored.
    pub src: String,
}

/// Inline content of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Inline {
    Text { text: String, marks: Marks },
    Link { href: String, children: Vec<Inline> },
    /// A named anchor; renders as nothing.
    Bookmark { name: String },
    LineBreak,
    Image(ImageRef),
}

impl Inline {
    pub fn text(text: impl Into<String>) -> Self {
        Inline::Text {
            text: text.into(),
            marks: Marks::default(),
        }
    }
}

/// One table cell: its paragraphs joined by line breaks.
pub type Cell = Vec<Inline>;

/// A block-level node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    Heading {
        level: u8,
        content: Vec<Inline>,
    },
    Paragraph {
        content: Vec<Inline>,
    },
    ListItem {
        ordered: bool,
        /// 1-based position among siblings at the same depth.
        ordinal: u32,
        /// 0 for top-level items.
        depth: u8,
        content: Vec<Inline>,
    },
    CodeBlock {
        text: String,
    },
    Blockquote {
        content: Vec<Inline>,
    },
    Table {
        rows: Vec<Vec<Cell>>,
    },
}

impl Block {
    /// Inline content for blocks that have it (everything but code and tables).
    pub fn inlines(&self) -> Option<&[Inline]> {
        match self {
            Block::Heading { content, .. }
            | Block::Paragraph { content }
            | Block::ListItem { content, .. }
            | Block::Blockquote { content } => Some(content),
            Block::CodeBlock { .. } | Block::Table { .. } => None,
        }
    }

    pub fn inlines_mut(&mut self) -> Option<&mut Vec<Inline>> {
        match self {
            Block::Heading { content, .. }
            | Block::Paragraph { content }
            | Block::ListItem { content, .. }
            | Block::Blockquote { content } => Some(content),
            Block::CodeBlock { .. } | Block::Table { .. } => None,
        }
    }

    /// Concatenated visible text.
    pub fn plain_text(&self) -> String {
        match self {
            Block::CodeBlock { text } => text.clone(),
            Block::Table { rows } => rows
                .iter()
                .map(|r| r.iter().map(|c| plain_text(c)).collect::<Vec<_>>().join(" "))
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.inlines().map(plain_text).unwrap_or_default(),
        }
    }

    /// Whether any image (resolved or not) appears in the block.
    pub fn has_image(&self) -> bool {
        match self {
            Block::Table { rows } => rows.iter().flatten().any(|c| contains_image(c)),
            other => other.inlines().is_some_and(contains_image),
        }
    }

    /// Mutable access to every inline sequence in the block, table cells included.
    pub fn for_each_inlines_mut(&mut self, f: &mut impl FnMut(&mut Vec<Inline>)) {
        match self {
            Block::Table { rows } => rows.iter_mut().flatten().for_each(|c| f(c)),
            other => {
                if let Some(content) = other.inlines_mut() {
                    f(content)
                }
            }
        }
    }
}

/// Concatenated visible text of an inline sequence.
pub fn plain_text(inlines: &[Inline]) -> String {
    let mut out = String::new();
    for inline in inlines {
        match inline {
            Inline::Text { text, .. } => out.push_str(text),
            Inline::Link { children, .. } => out.push_str(&plain_text(children)),
            Inline::LineBreak => out.push('\n'),
            Inline::Bookmark { .. } | Inline::Image(_) => {}
        }
    }
    out
}

fn contains_image(inlines: &[Inline]) -> bool {
    inlines.iter().any(|i| match i {
        Inline::Image(_) => true,
        Inline::Link { children, .. } => contains_image(children),
        _ => false,
    })
}

fn count_images(inlines: &[Inline]) -> usize {
    inlines
        .iter()
        .map(|i| match i {
            Inline::Image(_) => 1,
            Inline::Link { children, .. } => count_images(children),
            _ => 0,
        })
        .sum()
}

fn visit_images_mut(inlines: &mut [Inline], f: &mut impl FnMut(&mut ImageRef)) {
    for inline in inlines {
        match inline {
            Inline::Image(img) => f(img),
            Inline::Link { children, .. } => visit_images_mut(children, f),
            _ => {}
        }
    }
}

/// Merge adjacent text runs with identical marks and drop empty ones.
pub fn coalesce(inlines: Vec<Inline>) -> Vec<Inline> {
    let mut out: Vec<Inline> = Vec::with_capacity(inlines.len());
    for inline in inlines {
        match inline {
            Inline::Text { text, .. } if text.is_empty() => {}
            Inline::Text { text, marks } => match out.last_mut() {
                Some(Inline::Text {
                    text: prev,
                    marks: prev_marks,
                }) if *prev_marks == marks => prev.push_str(&text),
                _ => out.push(Inline::Text { text, marks }),
            },
            Inline::Link { href, children } => out.push(Inline::Link {
                href,
                children: coalesce(children),
            }),
            other => out.push(other),
        }
    }
    out
}

/// The whole document as an ordered block sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// Write upload results back into image nodes by slot.
    ///
    /// `urls[slot]` is the URL (or empty string) for the embedded image with
    /// that slot; images whose slot is out of range get an empty `src`.
    pub fn resolve_images(&mut self, urls: &[String]) {
        self.for_each_image_mut(|img| {
            if let Some(slot) = img.slot {
                img.src = urls.get(slot).cloned().unwrap_or_default();
            }
        });
    }

    /// Visit every image reference in document order.
    pub fn for_each_image_mut(&mut self, mut f: impl FnMut(&mut ImageRef)) {
        for block in &mut self.blocks {
            block.for_each_inlines_mut(&mut |content| visit_images_mut(content, &mut f));
        }
    }

    /// Number of image references, resolved or not.
    pub fn image_count(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| match b {
                Block::Table { rows } => rows.iter().flatten().map(|c| count_images(c)).sum(),
                other => other.inlines().map(count_images).unwrap_or(0),
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bold(s: &str) -> Inline {
        Inline::Text {
            text: s.into(),
            marks: Marks {
                strong: true,
                ..Marks::default()
            },
        }
    }

    fn image(slot: Option<usize>) -> Inline {
        Inline::Image(ImageRef {
            alt: "chart".into(),
            title: None,
            slot,
            src: String::new(),
        })
    }

    #[test]
    fn coalesce_merges_same_marks_only() {
        let merged = coalesce(vec![
            Inline::text("Hello "),
            Inline::text("world"),
            Inline::text(""),
            bold("!"),
            bold("!"),
        ]);
        assert_eq!(merged, vec![Inline::text("Hello world"), bold("!!")]);
    }

    #[test]
    fn plain_text_walks_links_and_breaks() {
        let content = vec![
            Inline::text("See "),
            Inline::Link {
                href: "https://kloudvin.com".into(),
                children: vec![Inline::text("the blog")],
            },
            Inline::LineBreak,
            Inline::Bookmark { name: "_Toc1".into() },
            Inline::text("next"),
        ];
        assert_eq!(plain_text(&content), "See the blog\nnext");
    }

    #[test]
    fn resolve_images_writes_by_slot() {
        let mut doc = Document::new(vec![
            Block::Paragraph {
                content: vec![image(Some(1))],
            },
            Block::Table {
                rows: vec![vec![vec![image(Some(0))], vec![image(None)]]],
            },
            Block::Paragraph {
                content: vec![image(Some(7))],
            },
        ]);
        doc.resolve_images(&["a.png".to_string(), "b.png".to_string()]);

        let mut srcs = Vec::new();
        doc.for_each_image_mut(|i| srcs.push(i.src.clone()));
        assert_eq!(srcs, vec!["b.png", "a.png", "", ""]);
        assert_eq!(doc.image_count(), 4);
    }

    #[test]
    fn has_image_detects_nested() {
        let b = Block::Paragraph {
            content: vec![Inline::Link {
                href: "x".into(),
                children: vec![image(Some(0))],
            }],
        };
        assert!(b.has_image());
        assert!(!Block::CodeBlock { text: "x".into() }.has_image());
    }
}
