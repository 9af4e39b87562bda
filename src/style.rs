//! Style mapping: Word paragraph/run styles → Markdown constructs.
//!
//! A [`StyleMap`] is an ordered list of [`StyleRule`]s. The extractor asks it
//! what a paragraph with style name `"Heading 2"` should become, or which
//! mark a bold run carries. The first rule whose selector matches wins.
//!
//! ## Why exact, case-sensitive names?
//!
//! Word documents produced by different tools disagree on casing: Word writes
//! `Heading 1`, LibreOffice and Google Docs exports sometimes write
//! `heading 1`. Matching exactly keeps the table auditable; the defaults list
//! both spellings explicitly.
//!
//! ## Rule syntax
//!
//! One rule per line, `selector => target`; blank lines and lines starting
//! with `#` are ignored.
//!
//! ```text
//! p[style-name='Heading 1'] => h1:fresh
//! p[style-name^='toc ']     => !
//! r[style-name='Code Char'] => code
//! b                         => strong
//! u                         => **
//! ```
//!
//! Two target dialects are accepted: HTML element names (`h2`, `ul > li`,
//! `strong`, `pre`) and their Markdown spelling (`## `, `- `, `**`, `` ``` ``).
//! `!` drops a paragraph, or renders a run's text without a mark.

use crate::error::Docx2MdError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Targets ──────────────────────────────────────────────────────────────

/// What a mapped paragraph becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockTarget {
    /// `#`…`######`; level is 1–6.
    Heading(u8),
    Paragraph,
    ListItem { ordered: bool },
    CodeBlock,
    Blockquote,
    /// Remove the paragraph and its content.
    Drop,
}

/// Which mark a mapped run carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunTarget {
    Strong,
    Emphasis,
    Code,
    Strikethrough,
    /// Keep the text, add no mark.
    Plain,
}

/// The direct-formatting toggles a run may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Toggle {
    Bold,
    Italic,
    Underline,
    Strike,
}

// ── Selectors ────────────────────────────────────────────────────────────

/// How a selector compares style names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameMatch {
    /// `[style-name='X']`
    Exact(String),
    /// `[style-name^='X']`
    Prefix(String),
}

impl NameMatch {
    fn matches(&self, name: &str) -> bool {
        match self {
            NameMatch::Exact(s) => name == s,
            NameMatch::Prefix(p) => name.starts_with(p.as_str()),
        }
    }
}

/// Left-hand side of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    /// `p` (any paragraph) or `p[style-name…]`.
    Paragraph(Option<NameMatch>),
    /// `r` (any styled run) or `r[style-name…]`.
    Run(Option<NameMatch>),
    /// `b`, `i`, `u`, `strike`.
    Toggle(Toggle),
}

/// Right-hand side of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// `fresh = false` lets consecutive paragraphs with the same target be
    /// merged (only code blocks use this).
    Block { target: BlockTarget, fresh: bool },
    Run(RunTarget),
}

/// One `selector => target` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleRule {
    pub selector: Selector,
    pub target: Target,
}

/// Result of looking up a paragraph style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParagraphMapping {
    pub target: BlockTarget,
    pub fresh: bool,
}

// ── StyleMap ─────────────────────────────────────────────────────────────

/// Ordered style rules; first match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleMap {
    rules: Vec<StyleRule>,
}

const DEFAULT_RULES: &str = "\
p[style-name='Heading 1'] => h1:fresh
p[style-name='Heading 2'] => h2:fresh
p[style-name='Heading 3'] => h3:fresh
p[style-name='Heading 4'] => h4:fresh
p[style-name='Heading 5'] => h5:fresh
p[style-name='Heading 6'] => h6:fresh
p[style-name='heading 1'] => h1:fresh
p[style-name='heading 2'] => h2:fresh
p[style-name='heading 3'] => h3:fresh
p[style-name='heading 4'] => h4:fresh
p[style-name='heading 5'] => h5:fresh
p[style-name='heading 6'] => h6:fresh
p[style-name='Title'] => h1:fresh
p[style-name='Subtitle'] => h2:fresh
p[style-name='List Paragraph'] => p:fresh
p[style-name='Normal'] => p:fresh
p[style-name='Body Text'] => p:fresh
p[style-name='No Spacing'] => p:fresh
p[style-name='List Bullet'] => ul > li:fresh
p[style-name='List Bullet 2'] => ul > li:fresh
p[style-name='List Number'] => ol > li:fresh
p[style-name='List Number 2'] => ol > li:fresh
p[style-name='Quote'] => blockquote:fresh
p[style-name='Intense Quote'] => blockquote:fresh
p[style-name='Code'] => pre
p[style-name='HTML Preformatted'] => pre
p[style-name='TOC Heading'] => !
p[style-name='toc 1'] => !
p[style-name='toc 2'] => !
p[style-name='toc 3'] => !
p[style-name='toc 4'] => !
p[style-name='toc 5'] => !
p[style-name='toc 6'] => !
p[style-name='toc 7'] => !
p[style-name='toc 8'] => !
p[style-name='toc 9'] => !
r[style-name='Code Char'] => code
r[style-name='HTML Code'] => code
r[style-name='Code'] => code
b => strong
i => em
u => strong
strike => s
";

impl Default for StyleMap {
    /// The built-in table used for blog articles.
    fn default() -> Self {
        // The built-in table is a compile-time constant covered by tests.
        Self::parse(DEFAULT_RULES).unwrap_or_else(|_| Self::empty())
    }
}

impl StyleMap {
    /// A map with no rules: every paragraph is unmapped, runs keep only
    /// their built-in marks.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Build from already-constructed rules.
    pub fn from_rules(rules: Vec<StyleRule>) -> Self {
        Self { rules }
    }

    /// Parse rules in `selector => target` syntax.
    pub fn parse(text: &str) -> Result<Self, Docx2MdError> {
        let mut rules = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            rules.push(parse_rule(line).map_err(|detail| Docx2MdError::InvalidStyleMap {
                line: idx + 1,
                detail,
            })?);
        }
        Ok(Self { rules })
    }

    /// `user` rules first, then the defaults, so user rules win.
    pub fn with_overrides(user: StyleMap) -> Self {
        let mut rules = user.rules;
        rules.extend(Self::default().rules);
        Self { rules }
    }

    /// Rules in match order.
    pub fn rules(&self) -> &[StyleRule] {
        &self.rules
    }

    /// Mapping for a paragraph with display name `style_name`, or `None`
    /// when no rule matches.
    pub fn paragraph(&self, style_name: &str) -> Option<ParagraphMapping> {
        self.rules.iter().find_map(|r| match (&r.selector, r.target) {
            (Selector::Paragraph(m), Target::Block { target, fresh })
                if m.as_ref().is_none_or(|m| m.matches(style_name)) =>
            {
                Some(ParagraphMapping { target, fresh })
            }
            _ => None,
        })
    }

    /// Mark for a run whose character style is `style_name`.
    pub fn run_style(&self, style_name: &str) -> Option<RunTarget> {
        self.rules.iter().find_map(|r| match (&r.selector, r.target) {
            (Selector::Run(m), Target::Run(t)) if m.as_ref().is_none_or(|m| m.matches(style_name)) => {
                Some(t)
            }
            _ => None,
        })
    }

    /// Mark for a direct-formatting toggle, falling back to the conventional
    /// mark (underline has none).
    pub fn toggle(&self, toggle: Toggle) -> Option<RunTarget> {
        let mapped = self.rules.iter().find_map(|r| match (&r.selector, r.target) {
            (Selector::Toggle(t), Target::Run(target)) if *t == toggle => Some(target),
            _ => None,
        });
        match mapped {
            Some(RunTarget::Plain) => None,
            Some(t) => Some(t),
            None => match toggle {
                Toggle::Bold => Some(RunTarget::Strong),
                Toggle::Italic => Some(RunTarget::Emphasis),
                Toggle::Strike => Some(RunTarget::Strikethrough),
                Toggle::Underline => None,
            },
        }
    }
}

impl fmt::Display for StyleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |m: &Option<NameMatch>| match m {
            None => String::new(),
            Some(NameMatch::Exact(s)) => format!("[style-name='{s}']"),
            Some(NameMatch::Prefix(s)) => format!("[style-name^='{s}']"),
        };
        match &self.selector {
            Selector::Paragraph(m) => write!(f, "p{}", name(m))?,
            Selector::Run(m) => write!(f, "r{}", name(m))?,
            Selector::Toggle(Toggle::Bold) => f.write_str("b")?,
            Selector::Toggle(Toggle::Italic) => f.write_str("i")?,
            Selector::Toggle(Toggle::Underline) => f.write_str("u")?,
            Selector::Toggle(Toggle::Strike) => f.write_str("strike")?,
        }
        f.write_str(" => ")?;
        match self.target {
            Target::Block { target, fresh } => {
                let base = match target {
                    BlockTarget::Heading(n) => format!("h{n}"),
                    BlockTarget::Paragraph => "p".into(),
                    BlockTarget::ListItem { ordered: false } => "ul > li".into(),
                    BlockTarget::ListItem { ordered: true } => "ol > li".into(),
                    BlockTarget::CodeBlock => "pre".into(),
                    BlockTarget::Blockquote => "blockquote".into(),
                    BlockTarget::Drop => return f.write_str("!"),
                };
                f.write_str(&base)?;
                if fresh {
                    f.write_str(":fresh")?;
                }
                Ok(())
            }
            Target::Run(t) => f.write_str(match t {
                RunTarget::Strong => "strong",
                RunTarget::Emphasis => "em",
                RunTarget::Code => "code",
                RunTarget::Strikethrough => "s",
                RunTarget::Plain => "!",
            }),
        }
    }
}

// ── Parser ───────────────────────────────────────────────────────────────

fn parse_rule(line: &str) -> Result<StyleRule, String> {
    let (lhs, rhs) = line
        .split_once("=>")
        .ok_or_else(|| format!("expected 'selector => target', got '{line}'"))?;
    let selector = parse_selector(lhs.trim())?;
    let target = match selector {
        Selector::Paragraph(_) => parse_block_target(rhs)?,
        Selector::Run(_) | Selector::Toggle(_) => Target::Run(parse_run_target(rhs)?),
    };
    Ok(StyleRule { selector, target })
}

fn parse_selector(s: &str) -> Result<Selector, String> {
    match s {
        "b" => return Ok(Selector::Toggle(Toggle::Bold)),
        "i" => return Ok(Selector::Toggle(Toggle::Italic)),
        "u" => return Ok(Selector::Toggle(Toggle::Underline)),
        "strike" => return Ok(Selector::Toggle(Toggle::Strike)),
        _ => {}
    }
    let (element, rest) = match s.find('[') {
        Some(i) => (&s[..i], Some(&s[i..])),
        None => (s, None),
    };
    let name = rest.map(parse_style_name).transpose()?;
    match element.trim() {
        "p" => Ok(Selector::Paragraph(name)),
        "r" => Ok(Selector::Run(name)),
        other => Err(format!("unknown selector element '{other}'")),
    }
}

/// `[style-name='X']` or `[style-name^='X']`, single or double quotes.
fn parse_style_name(s: &str) -> Result<NameMatch, String> {
    let inner = s
        .strip_prefix('[')
        .and_then(|x| x.strip_suffix(']'))
        .ok_or_else(|| format!("malformed attribute selector '{s}'"))?
        .trim();
    let inner = inner
        .strip_prefix("style-name")
        .ok_or_else(|| format!("only style-name selectors are supported, got '{inner}'"))?
        .trim_start();
    let (prefix, value) = if let Some(v) = inner.strip_prefix("^=") {
        (true, v)
    } else if let Some(v) = inner.strip_prefix('=') {
        (false, v)
    } else {
        return Err(format!("expected '=' or '^=' in '{s}'"));
    };
    let value = value.trim();
    let unquoted = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
        .ok_or_else(|| format!("style name must be quoted in '{s}'"))?;
    Ok(if prefix {
        NameMatch::Prefix(unquoted.to_string())
    } else {
        NameMatch::Exact(unquoted.to_string())
    })
}

fn parse_block_target(raw: &str) -> Result<Target, String> {
    let t = raw.trim();
    let (t, fresh) = match t.strip_suffix(":fresh") {
        Some(base) => (base.trim(), true),
        None => (t, false),
    };
    let block = |target| Target::Block { target, fresh };

    if t.is_empty() || t == "!" {
        return Ok(block(BlockTarget::Drop));
    }
    if let Some(level) = t.strip_prefix('h').and_then(|n| n.parse::<u8>().ok()) {
        return heading(level).map(block);
    }
    if !t.is_empty() && t.chars().all(|c| c == '#') {
        return heading(t.len() as u8).map(block);
    }
    let target = match t {
        "p" => BlockTarget::Paragraph,
        "ul > li" | "ul>li" | "li" | "-" | "*" => BlockTarget::ListItem { ordered: false },
        "ol > li" | "ol>li" | "1." => BlockTarget::ListItem { ordered: true },
        "pre" | "pre > code" | "```" => BlockTarget::CodeBlock,
        "blockquote" | "blockquote > p" | ">" => BlockTarget::Blockquote,
        other => return Err(format!("unknown paragraph target '{other}'")),
    };
    Ok(block(target))
}

fn heading(level: u8) -> Result<BlockTarget, String> {
    if (1..=6).contains(&level) {
        Ok(BlockTarget::Heading(level))
    } else {
        Err(format!("heading level must be 1–6, got {level}"))
    }
}

fn parse_run_target(raw: &str) -> Result<RunTarget, String> {
    match raw.trim() {
        "" | "!" => Ok(RunTarget::Plain),
        "strong" | "b" | "**" | "__" => Ok(RunTarget::Strong),
        "em" | "i" | "*" | "_" => Ok(RunTarget::Emphasis),
        "code" | "`" => Ok(RunTarget::Code),
        "s" | "del" | "strike" | "~~" => Ok(RunTarget::Strikethrough),
        other => Err(format!("unknown run target '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_parses() {
        let map = StyleMap::default();
        assert!(map.rules().len() > 30, "defaults must not silently fall back to empty");
        assert_eq!(
            map.paragraph("Heading 2").map(|m| m.target),
            Some(BlockTarget::Heading(2))
        );
        assert_eq!(
            map.paragraph("heading 3").map(|m| m.target),
            Some(BlockTarget::Heading(3))
        );
        assert_eq!(map.paragraph("Title").map(|m| m.target), Some(BlockTarget::Heading(1)));
        assert_eq!(map.paragraph("Subtitle").map(|m| m.target), Some(BlockTarget::Heading(2)));
        assert_eq!(
            map.paragraph("List Paragraph").map(|m| m.target),
            Some(BlockTarget::Paragraph)
        );
        assert_eq!(map.paragraph("toc 2").map(|m| m.target), Some(BlockTarget::Drop));
    }

    #[test]
    fn names_are_case_sensitive() {
        let map = StyleMap::default();
        assert!(map.paragraph("HEADING 1").is_none());
        assert!(map.paragraph("Fancy Body").is_none());
    }

    #[test]
    fn code_paragraphs_are_not_fresh() {
        let map = StyleMap::default();
        let m = map.paragraph("Code").unwrap();
        assert_eq!(m.target, BlockTarget::CodeBlock);
        assert!(!m.fresh);
    }

    #[test]
    fn toggles_use_defaults() {
        let map = StyleMap::default();
        assert_eq!(map.toggle(Toggle::Bold), Some(RunTarget::Strong));
        assert_eq!(map.toggle(Toggle::Italic), Some(RunTarget::Emphasis));
        assert_eq!(map.toggle(Toggle::Underline), Some(RunTarget::Strong));
        assert_eq!(map.toggle(Toggle::Strike), Some(RunTarget::Strikethrough));

        let empty = StyleMap::empty();
        assert_eq!(empty.toggle(Toggle::Underline), None);
        assert_eq!(empty.toggle(Toggle::Bold), Some(RunTarget::Strong));
    }

    #[test]
    fn markdown_dialect_is_accepted() {
        let map = StyleMap::parse(
            "p[style-name='Heading 1'] => # \n\
             p[style-name='Heading 3'] => ###\n\
             p[style-name='Source'] => ```\n\
             b => **\n\
             code => `",
        );
        // `code` is not a selector
        assert!(matches!(map, Err(Docx2MdError::InvalidStyleMap { line: 5, .. })));

        let map = StyleMap::parse(
            "p[style-name='Heading 1'] => # \n\
             p[style-name='Heading 3'] => ###\n\
             r[style-name='Mono'] => `\n\
             strike => ~~",
        )
        .unwrap();
        assert_eq!(map.paragraph("Heading 1").unwrap().target, BlockTarget::Heading(1));
        assert_eq!(map.paragraph("Heading 3").unwrap().target, BlockTarget::Heading(3));
        assert_eq!(map.run_style("Mono"), Some(RunTarget::Code));
        assert_eq!(map.toggle(Toggle::Strike), Some(RunTarget::Strikethrough));
    }

    #[test]
    fn prefix_selector_and_comments() {
        let map = StyleMap::parse(
            "# drop every toc level\n\
             \n\
             p[style-name^=\"toc \"] => !",
        )
        .unwrap();
        assert_eq!(map.rules().len(), 1);
        assert_eq!(map.paragraph("toc 7").unwrap().target, BlockTarget::Drop);
        assert!(map.paragraph("Table").is_none());
    }

    #[test]
    fn user_rules_take_precedence() {
        let user = StyleMap::parse("p[style-name='Title'] => h2:fresh").unwrap();
        let map = StyleMap::with_overrides(user);
        assert_eq!(map.paragraph("Title").unwrap().target, BlockTarget::Heading(2));
        assert_eq!(map.paragraph("Heading 1").unwrap().target, BlockTarget::Heading(1));
    }

    #[test]
    fn parse_errors_report_line() {
        let err = StyleMap::parse("b => strong\np[style-name='X'] => h9").unwrap_err();
        match err {
            Docx2MdError::InvalidStyleMap { line, detail } => {
                assert_eq!(line, 2);
                assert!(detail.contains("1–6"), "got: {detail}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(StyleMap::parse("p[style-name=Heading] => h1").is_err());
        assert!(StyleMap::parse("p => strong").is_err());
        assert!(StyleMap::parse("no arrow here").is_err());
    }

    #[test]
    fn display_round_trips_through_parser() {
        for rule in StyleMap::default().rules() {
            let text = rule.to_string();
            let reparsed = StyleMap::parse(&text).unwrap();
            assert_eq!(&reparsed.rules()[0], rule, "rule: {text}");
        }
    }
}
