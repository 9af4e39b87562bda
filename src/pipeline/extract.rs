//! Structural extraction: `.docx` bytes → [`Document`] + image assets.
//!
//! A `.docx` file is a zip container of XML parts. The ones that matter here:
//!
//! ```text
//! [Content_Types].xml            extension / part → MIME type
//! _rels/.rels                    locates the main document part
//! word/document.xml              paragraphs, runs, tables, drawings
//! word/_rels/document.xml.rels   r:id → media / hyperlink target
//! word/styles.xml                styleId → display name ("Heading 1")
//! word/numbering.xml             numId + ilvl → bullet or numbered
//! word/media/*                   embedded image bytes
//! ```
//!
//! The body is walked once with a streaming `quick-xml` reader. Paragraph
//! styles are resolved to display names and looked up in the
//! [`StyleMap`]; anything the map does not know becomes a plain paragraph
//! and one [`ConversionWarning::UnmappedStyle`] per style name.
//!
//! Only a broken container is fatal. Missing media, OLE objects, nested
//! tables and unknown styles degrade to warnings so one odd element never
//! costs the author the whole article.

use crate::document::{coalesce, plain_text, Block, Cell, Document, ImageRef, Inline, Marks};
use crate::error::{ConversionWarning, Docx2MdError};
use crate::style::{BlockTarget, ParagraphMapping, RunTarget, StyleMap, Toggle};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::ZipArchive;

/// Local file header signature every zip container starts with.
pub const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

const DEFAULT_DOCUMENT_PART: &str = "word/document.xml";

/// Widest grid Word can lay out; larger `w:gridSpan` values are clamped.
pub const MAX_GRID_COLUMNS: usize = 63;

// ── Output types ─────────────────────────────────────────────────────────

/// An embedded image waiting to be offloaded to the sink.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    /// Position in [`Extraction::images`]; image nodes refer to it.
    pub slot: usize,
    /// 1-based position among all images of the document, for messages.
    pub index: usize,
    /// Archive path, e.g. `word/media/image3.png`.
    pub part_name: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Everything Stage 1 produces.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub document: Document,
    pub images: Vec<ImageAsset>,
    pub warnings: Vec<ConversionWarning>,
}

/// Validate the container and extract its body.
pub fn extract(bytes: &[u8], style_map: &StyleMap) -> Result<Extraction, Docx2MdError> {
    if bytes.len() < ZIP_MAGIC.len() || &bytes[..ZIP_MAGIC.len()] != ZIP_MAGIC {
        return Err(invalid("missing ZIP signature; the file is not an OOXML container"));
    }

    let mut package = Package::open(bytes)?;

    let root_rels = package
        .read_string("_rels/.rels")?
        .map(|xml| parse_relationships(&xml))
        .transpose()
        .map_err(|e| invalid(format!("malformed _rels/.rels: {e}")))?
        .unwrap_or_default();
    let document_part = root_rels
        .values()
        .find(|r| r.rel_type.ends_with("/officeDocument"))
        .map(|r| resolve_part("", &r.target))
        .unwrap_or_else(|| DEFAULT_DOCUMENT_PART.to_string());

    let document_xml = package
        .read_string(&document_part)?
        .ok_or_else(|| invalid(format!("missing main document part '{document_part}'")))?;

    let (dir, file) = match document_part.rsplit_once('/') {
        Some((d, f)) => (d.to_string(), f.to_string()),
        None => (String::new(), document_part.clone()),
    };
    let rels_part = if dir.is_empty() {
        format!("_rels/{file}.rels")
    } else {
        format!("{dir}/_rels/{file}.rels")
    };

    let rels = match package.read_string(&rels_part)? {
        Some(xml) => parse_relationships(&xml)
            .map_err(|e| invalid(format!("malformed {rels_part}: {e}")))?,
        None => HashMap::new(),
    };

    let part_for = |suffix: &str, fallback: &str| {
        rels.values()
            .find(|r| r.rel_type.ends_with(suffix) && !r.external)
            .map(|r| resolve_part(&dir, &r.target))
            .unwrap_or_else(|| fallback.to_string())
    };
    let styles_part = part_for("/styles", "word/styles.xml");
    let numbering_part = part_for("/numbering", "word/numbering.xml");

    // Auxiliary parts are optional; a malformed one only loses its information.
    let styles = package
        .read_string(&styles_part)?
        .and_then(|xml| parse_styles(&xml).map_err(|e| warn!("Ignoring malformed styles part: {e}")).ok())
        .unwrap_or_default();
    let numbering = package
        .read_string(&numbering_part)?
        .and_then(|xml| {
            parse_numbering(&xml)
                .map_err(|e| warn!("Ignoring malformed numbering part: {e}"))
                .ok()
        })
        .unwrap_or_default();
    let content_types = package
        .read_string("[Content_Types].xml")?
        .and_then(|xml| {
            parse_content_types(&xml)
                .map_err(|e| warn!("Ignoring malformed [Content_Types].xml: {e}"))
                .ok()
        })
        .unwrap_or_default();

    let info = PartInfo {
        base_dir: dir,
        rels,
        styles,
        numbering,
        content_types,
    };

    let mut walker = BodyWalker::new(style_map, info, package);
    walk(&document_xml, |tag| walker.handle(tag))
        .map_err(|e| invalid(format!("malformed {document_part}: {e}")))?;

    let extraction = walker.finish();
    debug!(
        "Extracted {} blocks, {} embedded images, {} warnings",
        extraction.document.blocks.len(),
        extraction.images.len(),
        extraction.warnings.len()
    );
    Ok(extraction)
}

fn invalid(detail: impl Into<String>) -> Docx2MdError {
    Docx2MdError::InvalidDocumentFormat {
        detail: detail.into(),
    }
}

// ── Zip package ──────────────────────────────────────────────────────────

struct Package<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> Package<'a> {
    fn open(bytes: &'a [u8]) -> Result<Self, Docx2MdError> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| invalid(format!("unreadable ZIP archive: {e}")))?;
        Ok(Self { archive })
    }

    /// `Ok(None)` when the part does not exist.
    fn read(&mut self, name: &str) -> Result<Option<Vec<u8>>, Docx2MdError> {
        match self.archive.by_name(name) {
            Ok(mut file) => {
                let mut buf = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut buf)
                    .map_err(|e| invalid(format!("cannot read part '{name}': {e}")))?;
                Ok(Some(buf))
            }
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(invalid(format!("cannot read part '{name}': {e}"))),
        }
    }

    fn read_string(&mut self, name: &str) -> Result<Option<String>, Docx2MdError> {
        match self.read(name)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(|s| Some(s.trim_start_matches('\u{feff}').to_string()))
                .map_err(|_| invalid(format!("part '{name}' is not UTF-8"))),
            None => Ok(None),
        }
    }
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_part(base_dir: &str, target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut parts: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

// ── XML plumbing ─────────────────────────────────────────────────────────

/// A flattened reader event; `Empty` elements arrive as `Open` + `Close`.
enum Tag<'x> {
    Open(&'x BytesStart<'x>, bool),
    Close(&'x [u8]),
    Text(&'x str),
}

fn walk(xml: &str, mut f: impl FnMut(Tag<'_>)) -> Result<(), String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => f(Tag::Open(&e, false)),
            Ok(Event::Empty(e)) => {
                f(Tag::Open(&e, true));
                f(Tag::Close(e.local_name().as_ref()));
            }
            Ok(Event::End(e)) => f(Tag::Close(e.local_name().as_ref())),
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| format!("at byte {}: {e}", reader.buffer_position()))?;
                f(Tag::Text(&text));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(format!("at byte {}: {e}", reader.buffer_position())),
        }
    }
    Ok(())
}

/// Attribute value by local name (`w:val` and `val` both match `b"val"`).
fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .with_checks(false)
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// OOXML on/off property: absent `w:val` means on.
fn toggle_on(e: &BytesStart<'_>) -> bool {
    !matches!(
        attr(e, b"val").as_deref(),
        Some("0") | Some("false") | Some("off") | Some("none")
    )
}

// ── Auxiliary parts ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Relationship {
    target: String,
    external: bool,
    rel_type: String,
}

fn parse_relationships(xml: &str) -> Result<HashMap<String, Relationship>, String> {
    let mut rels = HashMap::new();
    walk(xml, |tag| {
        if let Tag::Open(e, _) = tag {
            if e.local_name().as_ref() == b"Relationship" {
                if let (Some(id), Some(target)) = (attr(e, b"Id"), attr(e, b"Target")) {
                    rels.insert(
                        id,
                        Relationship {
                            target,
                            external: attr(e, b"TargetMode").as_deref() == Some("External"),
                            rel_type: attr(e, b"Type").unwrap_or_default(),
                        },
                    );
                }
            }
        }
    })?;
    Ok(rels)
}

#[derive(Debug, Default)]
struct Styles {
    names: HashMap<String, String>,
    default_paragraph: Option<String>,
}

impl Styles {
    /// Display name for a style id; unknown ids are returned as-is.
    fn name_of<'s>(&'s self, id: &'s str) -> &'s str {
        self.names.get(id).map(String::as_str).unwrap_or(id)
    }

    fn default_paragraph(&self) -> &str {
        self.default_paragraph.as_deref().unwrap_or("Normal")
    }
}

fn parse_styles(xml: &str) -> Result<Styles, String> {
    let mut styles = Styles::default();
    let mut current: Option<(String, bool)> = None;
    walk(xml, |tag| match tag {
        Tag::Open(e, _) => match e.local_name().as_ref() {
            b"style" => {
                let is_default_paragraph = attr(e, b"type").as_deref() == Some("paragraph")
                    && matches!(attr(e, b"default").as_deref(), Some("1") | Some("true"));
                current = attr(e, b"styleId").map(|id| (id, is_default_paragraph));
            }
            b"name" => {
                if let (Some((id, is_default)), Some(name)) = (&current, attr(e, b"val")) {
                    if *is_default {
                        styles.default_paragraph = Some(name.clone());
                    }
                    styles.names.insert(id.clone(), name);
                }
            }
            _ => {}
        },
        Tag::Close(b"style") => current = None,
        _ => {}
    })?;
    Ok(styles)
}

#[derive(Debug, Clone, Copy)]
struct LevelFormat {
    ordered: bool,
    start: u32,
}

impl Default for LevelFormat {
    fn default() -> Self {
        Self {
            ordered: true,
            start: 1,
        }
    }
}

#[derive(Debug, Default)]
struct Numbering {
    abstract_levels: HashMap<String, HashMap<u8, LevelFormat>>,
    num_to_abstract: HashMap<String, String>,
}

impl Numbering {
    fn level(&self, num_id: &str, ilvl: u8) -> Option<LevelFormat> {
        let abs = self.num_to_abstract.get(num_id)?;
        self.abstract_levels.get(abs)?.get(&ilvl).copied()
    }
}

fn parse_numbering(xml: &str) -> Result<Numbering, String> {
    let mut numbering = Numbering::default();
    let mut abstract_id: Option<String> = None;
    let mut level: Option<u8> = None;
    let mut num_id: Option<String> = None;
    walk(xml, |tag| match tag {
        Tag::Open(e, _) => match e.local_name().as_ref() {
            b"abstractNum" => abstract_id = attr(e, b"abstractNumId"),
            b"lvl" => {
                level = attr(e, b"ilvl").and_then(|v| v.parse().ok());
                if let (Some(a), Some(l)) = (&abstract_id, level) {
                    numbering
                        .abstract_levels
                        .entry(a.clone())
                        .or_default()
                        .insert(l, LevelFormat::default());
                }
            }
            b"numFmt" | b"start" => {
                let (Some(a), Some(l)) = (&abstract_id, level) else {
                    return;
                };
                let Some(fmt) = numbering
                    .abstract_levels
                    .get_mut(a)
                    .and_then(|levels| levels.get_mut(&l))
                else {
                    return;
                };
                let val = attr(e, b"val").unwrap_or_default();
                if e.local_name().as_ref() == b"numFmt" {
                    fmt.ordered = !matches!(val.as_str(), "bullet" | "none");
                } else if let Ok(start) = val.parse() {
                    fmt.start = start;
                }
            }
            b"num" => num_id = attr(e, b"numId"),
            b"abstractNumId" => {
                if let (Some(n), Some(a)) = (&num_id, attr(e, b"val")) {
                    numbering.num_to_abstract.insert(n.clone(), a);
                }
            }
            _ => {}
        },
        Tag::Close(b"abstractNum") => abstract_id = None,
        Tag::Close(b"lvl") => level = None,
        Tag::Close(b"num") => num_id = None,
        _ => {}
    })?;
    Ok(numbering)
}

#[derive(Debug, Default)]
struct ContentTypes {
    defaults: HashMap<String, String>,
    overrides: HashMap<String, String>,
}

impl ContentTypes {
    fn for_part(&self, part: &str) -> Option<&str> {
        if let Some(ct) = self.overrides.get(&format!("/{part}")) {
            return Some(ct);
        }
        let ext = part.rsplit_once('.')?.1.to_ascii_lowercase();
        self.defaults.get(&ext).map(String::as_str)
    }
}

fn parse_content_types(xml: &str) -> Result<ContentTypes, String> {
    let mut types = ContentTypes::default();
    walk(xml, |tag| {
        if let Tag::Open(e, _) = tag {
            match e.local_name().as_ref() {
                b"Default" => {
                    if let (Some(ext), Some(ct)) = (attr(e, b"Extension"), attr(e, b"ContentType")) {
                        types.defaults.insert(ext.to_ascii_lowercase(), ct);
                    }
                }
                b"Override" => {
                    if let (Some(part), Some(ct)) = (attr(e, b"PartName"), attr(e, b"ContentType")) {
                        types.overrides.insert(part, ct);
                    }
                }
                _ => {}
            }
        }
    })?;
    Ok(types)
}

struct PartInfo {
    base_dir: String,
    rels: HashMap<String, Relationship>,
    styles: Styles,
    numbering: Numbering,
    content_types: ContentTypes,
}

// ── Body walker ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Para {
    style_id: Option<String>,
    num_id: Option<String>,
    ilvl: Option<u8>,
    inlines: Vec<Inline>,
}

#[derive(Default)]
struct RunProps {
    bold: bool,
    italic: bool,
    underline: bool,
    strike: bool,
    style_id: Option<String>,
}

#[derive(Default)]
struct TableBuild {
    rows: Vec<Vec<Cell>>,
    row: Option<Vec<Cell>>,
    cell: Option<Cell>,
    span: usize,
}

struct LinkFrame {
    href: String,
    children: Vec<Inline>,
}

struct Field {
    instr: String,
    link_open: bool,
}

#[derive(Default)]
struct Drawing {
    alt: Option<String>,
    title: Option<String>,
    embed: Option<String>,
    link: Option<String>,
}

struct BodyWalker<'a> {
    style_map: &'a StyleMap,
    info: PartInfo,
    package: Package<'a>,

    blocks: Vec<Block>,
    images: Vec<ImageAsset>,
    warnings: Vec<ConversionWarning>,
    warned_styles: HashSet<String>,
    image_index: usize,

    para: Option<Para>,
    run: RunProps,
    in_ppr: bool,
    in_rpr: bool,
    in_text: bool,
    in_instr: bool,
    links: Vec<LinkFrame>,
    fields: Vec<Field>,
    simple_fields: Vec<bool>,
    drawing: Option<Drawing>,
    table_depth: usize,
    table: Option<TableBuild>,
    list_counters: HashMap<(String, u8), u32>,

    depth: usize,
    skip_until: Option<usize>,
}

impl<'a> BodyWalker<'a> {
    fn new(style_map: &'a StyleMap, info: PartInfo, package: Package<'a>) -> Self {
        Self {
            style_map,
            info,
            package,
            blocks: Vec::new(),
            images: Vec::new(),
            warnings: Vec::new(),
            warned_styles: HashSet::new(),
            image_index: 0,
            para: None,
            run: RunProps::default(),
            in_ppr: false,
            in_rpr: false,
            in_text: false,
            in_instr: false,
            links: Vec::new(),
            fields: Vec::new(),
            simple_fields: Vec::new(),
            drawing: None,
            table_depth: 0,
            table: None,
            list_counters: HashMap::new(),
            depth: 0,
            skip_until: None,
        }
    }

    fn finish(self) -> Extraction {
        Extraction {
            document: Document::new(self.blocks),
            images: self.images,
            warnings: self.warnings,
        }
    }

    fn handle(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Open(e, empty) => {
                self.depth += 1;
                if self.skip_until.is_none() {
                    self.open(e, empty);
                }
            }
            Tag::Close(name) => {
                match self.skip_until {
                    Some(d) if d == self.depth => self.skip_until = None,
                    Some(_) => {}
                    None => self.close(name),
                }
                self.depth = self.depth.saturating_sub(1);
            }
            Tag::Text(text) => {
                if self.skip_until.is_none() {
                    self.text(text);
                }
            }
        }
    }

    fn skip_element(&mut self, empty: bool) {
        if !empty {
            self.skip_until = Some(self.depth);
        }
    }

    fn open(&mut self, e: &BytesStart<'_>, empty: bool) {
        match e.local_name().as_ref() {
            b"p" => {
                if self.para.is_none() {
                    self.para = Some(Para::default());
                }
            }
            b"pPr" => self.in_ppr = true,
            b"pStyle" if self.in_ppr => {
                if let Some(p) = self.para.as_mut() {
                    p.style_id = attr(e, b"val");
                }
            }
            b"numId" if self.in_ppr => {
                if let Some(p) = self.para.as_mut() {
                    p.num_id = attr(e, b"val");
                }
            }
            b"ilvl" if self.in_ppr => {
                if let Some(p) = self.para.as_mut() {
                    p.ilvl = attr(e, b"val").and_then(|v| v.parse().ok());
                }
            }
            b"r" => self.run = RunProps::default(),
            b"rPr" if !self.in_ppr => self.in_rpr = true,
            b"b" if self.in_rpr => self.run.bold = toggle_on(e),
            b"i" if self.in_rpr => self.run.italic = toggle_on(e),
            b"u" if self.in_rpr => self.run.underline = toggle_on(e),
            b"strike" | b"dstrike" if self.in_rpr => self.run.strike = toggle_on(e),
            b"rStyle" if self.in_rpr => self.run.style_id = attr(e, b"val"),
            b"t" if self.drawing.is_none() && !empty => self.in_text = true,
            b"instrText" if !empty => self.in_instr = true,
            b"tab" if !self.in_ppr => self.push_text("\t"),
            b"noBreakHyphen" => self.push_text("-"),
            b"br" => {
                if !matches!(attr(e, b"type").as_deref(), Some("page") | Some("column")) {
                    self.push_inline(Inline::LineBreak);
                }
            }
            b"cr" => self.push_inline(Inline::LineBreak),
            b"hyperlink" => {
                let external = attr(e, b"id").and_then(|id| self.info.rels.get(&id).map(|r| r.target.clone()));
                let anchor = attr(e, b"anchor");
                let href = match (external, anchor) {
                    (Some(url), Some(a)) => format!("{url}#{a}"),
                    (Some(url), None) => url,
                    (None, Some(a)) => format!("#{a}"),
                    (None, None) => String::new(),
                };
                self.links.push(LinkFrame {
                    href,
                    children: Vec::new(),
                });
            }
            b"bookmarkStart" => {
                if let Some(name) = attr(e, b"name").filter(|n| n != "_GoBack") {
                    self.push_inline(Inline::Bookmark { name });
                }
            }
            b"fldChar" => match attr(e, b"fldCharType").as_deref() {
                Some("begin") => self.fields.push(Field {
                    instr: String::new(),
                    link_open: false,
                }),
                Some("separate") => {
                    let href = self.fields.last().and_then(|f| hyperlink_field_target(&f.instr));
                    if let (Some(href), Some(field)) = (href, self.fields.last_mut()) {
                        field.link_open = true;
                        self.links.push(LinkFrame {
                            href,
                            children: Vec::new(),
                        });
                    }
                }
                Some("end") => {
                    if let Some(field) = self.fields.pop() {
                        if field.link_open {
                            self.close_link();
                        }
                    }
                }
                _ => {}
            },
            b"fldSimple" => {
                let href = attr(e, b"instr").and_then(|i| hyperlink_field_target(&i));
                self.simple_fields.push(href.is_some());
                if let Some(href) = href {
                    self.links.push(LinkFrame {
                        href,
                        children: Vec::new(),
                    });
                }
            }
            b"drawing" => self.drawing = Some(Drawing::default()),
            b"docPr" => {
                if let Some(d) = self.drawing.as_mut() {
                    d.alt = attr(e, b"descr").filter(|s| !s.trim().is_empty());
                    d.title = attr(e, b"title").filter(|s| !s.trim().is_empty());
                }
            }
            b"blip" => {
                if let Some(d) = self.drawing.as_mut() {
                    d.embed = attr(e, b"embed");
                    d.link = attr(e, b"link");
                }
            }
            b"imagedata" if self.drawing.is_none() => {
                let alt = attr(e, b"title").unwrap_or_default();
                self.emit_image(attr(e, b"id"), None, alt, None);
            }
            b"object" => {
                self.warn(ConversionWarning::UnsupportedObject {
                    detail: "embedded OLE object".into(),
                });
                self.skip_element(empty);
            }
            b"txbxContent" => {
                self.warn(ConversionWarning::UnsupportedObject {
                    detail: "text box".into(),
                });
                self.skip_element(empty);
            }
            b"Fallback" => self.skip_element(empty),
            b"tbl" => {
                self.table_depth += 1;
                if self.table_depth == 1 {
                    self.table = Some(TableBuild::default());
                } else {
                    self.warn(ConversionWarning::NestedTableFlattened);
                }
            }
            b"tr" if self.table_depth == 1 => {
                if let Some(t) = self.table.as_mut() {
                    t.row = Some(Vec::new());
                }
            }
            b"tc" if self.table_depth == 1 => {
                if let Some(t) = self.table.as_mut() {
                    t.cell = Some(Vec::new());
                    t.span = 1;
                }
            }
            b"gridSpan" if self.table_depth == 1 => {
                if let Some(t) = self.table.as_mut() {
                    t.span = attr(e, b"val")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(1)
                        .clamp(1, MAX_GRID_COLUMNS);
                }
            }
            _ => {}
        }
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"p" => self.finish_paragraph(),
            b"pPr" => self.in_ppr = false,
            b"rPr" => self.in_rpr = false,
            b"t" => self.in_text = false,
            b"instrText" => self.in_instr = false,
            b"r" => self.run = RunProps::default(),
            b"hyperlink" => self.close_link(),
            b"fldSimple" => {
                if self.simple_fields.pop() == Some(true) {
                    self.close_link();
                }
            }
            b"drawing" => {
                if let Some(d) = self.drawing.take() {
                    if d.embed.is_some() || d.link.is_some() {
                        self.emit_image(d.embed, d.link, d.alt.unwrap_or_default(), d.title);
                    }
                }
            }
            b"tc" if self.table_depth == 1 => {
                if let Some(t) = self.table.as_mut() {
                    let cell = t.cell.take().unwrap_or_default();
                    let span = t.span;
                    if let Some(row) = t.row.as_mut() {
                        row.push(cell);
                        row.extend(std::iter::repeat_with(Vec::new).take(span.saturating_sub(1)));
                    }
                }
            }
            b"tr" if self.table_depth == 1 => {
                if let Some(t) = self.table.as_mut() {
                    if let Some(row) = t.row.take() {
                        t.rows.push(row);
                    }
                }
            }
            b"tbl" => {
                if self.table_depth == 1 {
                    if let Some(t) = self.table.take() {
                        self.reset_style_lists();
                        self.blocks.push(Block::Table { rows: t.rows });
                    }
                }
                self.table_depth = self.table_depth.saturating_sub(1);
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_instr {
            if let Some(field) = self.fields.last_mut() {
                field.instr.push_str(text);
            }
        } else if self.in_text {
            self.push_text(text);
        }
    }

    fn push_text(&mut self, text: &str) {
        let marks = self.current_marks();
        self.push_inline(Inline::Text {
            text: text.to_string(),
            marks,
        });
    }

    fn push_inline(&mut self, inline: Inline) {
        if let Some(frame) = self.links.last_mut() {
            frame.children.push(inline);
        } else if let Some(p) = self.para.as_mut() {
            p.inlines.push(inline);
        }
    }

    fn close_link(&mut self) {
        let Some(frame) = self.links.pop() else {
            return;
        };
        if frame.href.is_empty() {
            for child in frame.children {
                self.push_inline(child);
            }
        } else {
            self.push_inline(Inline::Link {
                href: frame.href,
                children: frame.children,
            });
        }
    }

    fn current_marks(&self) -> Marks {
        let mut marks = Marks::default();
        let mut apply = |target: Option<RunTarget>| match target {
            Some(RunTarget::Strong) => marks.strong = true,
            Some(RunTarget::Emphasis) => marks.emphasis = true,
            Some(RunTarget::Code) => marks.code = true,
            Some(RunTarget::Strikethrough) => marks.strikethrough = true,
            Some(RunTarget::Plain) | None => {}
        };
        if let Some(id) = &self.run.style_id {
            apply(self.style_map.run_style(self.info.styles.name_of(id)));
        }
        if self.run.bold {
            apply(self.style_map.toggle(Toggle::Bold));
        }
        if self.run.italic {
            apply(self.style_map.toggle(Toggle::Italic));
        }
        if self.run.underline {
            apply(self.style_map.toggle(Toggle::Underline));
        }
        if self.run.strike {
            apply(self.style_map.toggle(Toggle::Strike));
        }
        marks
    }

    fn warn(&mut self, warning: ConversionWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    // ── Images ───────────────────────────────────────────────────────────

    fn emit_image(
        &mut self,
        embed: Option<String>,
        link: Option<String>,
        alt: String,
        title: Option<String>,
    ) {
        self.image_index += 1;
        let index = self.image_index;
        let mut image = ImageRef {
            alt,
            title,
            slot: None,
            src: String::new(),
        };

        let rel_id = embed.or(link);
        let rel = rel_id.as_ref().and_then(|id| self.info.rels.get(id)).cloned();
        match rel {
            None => self.warn(ConversionWarning::ImageReadFailed {
                index,
                target: rel_id.unwrap_or_else(|| "<none>".into()),
                detail: "no relationship for image".into(),
            }),
            Some(rel) if rel.external => image.src = rel.target,
            Some(rel) => {
                let part_name = resolve_part(&self.info.base_dir, &rel.target);
                match self.package.read(&part_name) {
                    Ok(Some(bytes)) => {
                        let content_type = self.image_content_type(&part_name, &bytes);
                        let slot = self.images.len();
                        image.slot = Some(slot);
                        self.images.push(ImageAsset {
                            slot,
                            index,
                            part_name,
                            bytes,
                            content_type,
                        });
                    }
                    Ok(None) => self.warn(ConversionWarning::ImageReadFailed {
                        index,
                        target: part_name,
                        detail: "part missing from archive".into(),
                    }),
                    Err(e) => self.warn(ConversionWarning::ImageReadFailed {
                        index,
                        target: part_name,
                        detail: e.to_string(),
                    }),
                }
            }
        }
        self.push_inline(Inline::Image(image));
    }

    /// Declared type, else sniffed from the bytes, else `image/png`.
    fn image_content_type(&self, part_name: &str, bytes: &[u8]) -> String {
        if let Some(ct) = self
            .info
            .content_types
            .for_part(part_name)
            .filter(|ct| ct.starts_with("image/"))
        {
            return ct.to_string();
        }
        image::guess_format(bytes)
            .map(|f| f.to_mime_type().to_string())
            .unwrap_or_else(|_| "image/png".to_string())
    }

    // ── Paragraphs ───────────────────────────────────────────────────────

    fn finish_paragraph(&mut self) {
        // Links and hyperlink fields never span paragraphs in the output.
        while !self.links.is_empty() {
            self.close_link();
        }
        for field in &mut self.fields {
            field.link_open = false;
        }
        let Some(para) = self.para.take() else {
            return;
        };

        let style_name = match &para.style_id {
            Some(id) => self.info.styles.name_of(id).to_string(),
            None => self.info.styles.default_paragraph().to_string(),
        };
        let mapping = match self.style_map.paragraph(&style_name) {
            Some(m) => m,
            None => {
                if self.warned_styles.insert(style_name.clone()) {
                    self.warn(ConversionWarning::UnmappedStyle {
                        style: style_name.clone(),
                    });
                }
                ParagraphMapping {
                    target: BlockTarget::Paragraph,
                    fresh: true,
                }
            }
        };
        let content = coalesce(para.inlines);

        if self.table_depth > 0 {
            if mapping.target == BlockTarget::Drop || content.is_empty() {
                return;
            }
            if let Some(cell) = self.table.as_mut().and_then(|t| t.cell.as_mut()) {
                if !cell.is_empty() {
                    cell.push(Inline::LineBreak);
                }
                cell.extend(content);
            }
            return;
        }

        let numbering = para
            .num_id
            .filter(|id| id != "0")
            .map(|id| (id, para.ilvl.unwrap_or(0).min(8)));

        let block = match mapping.target {
            BlockTarget::Drop => return,
            BlockTarget::Heading(level) => Block::Heading { level, content },
            BlockTarget::Paragraph => match numbering {
                Some((id, lvl)) => {
                    let ordered = self.info.numbering.level(&id, lvl).is_some_and(|f| f.ordered);
                    self.list_item(id, lvl, ordered, content)
                }
                None => Block::Paragraph { content },
            },
            BlockTarget::ListItem { ordered } => match numbering {
                Some((id, lvl)) => {
                    let ordered = self.info.numbering.level(&id, lvl).map_or(ordered, |f| f.ordered);
                    self.list_item(id, lvl, ordered, content)
                }
                None => self.list_item(String::new(), 0, ordered, content),
            },
            BlockTarget::CodeBlock => {
                let text = plain_text(&content);
                if !mapping.fresh {
                    if let Some(Block::CodeBlock { text: prev }) = self.blocks.last_mut() {
                        prev.push('\n');
                        prev.push_str(&text);
                        return;
                    }
                }
                Block::CodeBlock { text }
            }
            BlockTarget::Blockquote => Block::Blockquote { content },
        };

        if !matches!(block, Block::ListItem { .. }) {
            self.reset_style_lists();
        }
        self.blocks.push(block);
    }

    fn list_item(&mut self, num_id: String, depth: u8, ordered: bool, content: Vec<Inline>) -> Block {
        let start = self
            .info
            .numbering
            .level(&num_id, depth)
            .map_or(1, |f| f.start);
        let count = {
            let c = self.list_counters.entry((num_id.clone(), depth)).or_insert(0);
            *c = c.saturating_add(1);
            *c
        };
        self.list_counters
            .retain(|(id, d), _| !(id == &num_id && *d > depth));
        Block::ListItem {
            ordered,
            ordinal: start.saturating_add(count - 1),
            depth,
            content,
        }
    }

    /// Style-mapped lists (no numbering id) restart after any other block.
    fn reset_style_lists(&mut self) {
        self.list_counters.retain(|(id, _), _| !id.is_empty());
    }
}

/// Target of a `HYPERLINK "url"` or `HYPERLINK \l "anchor"` field.
fn hyperlink_field_target(instr: &str) -> Option<String> {
    let rest = instr.trim().strip_prefix("HYPERLINK")?.trim();
    let mut url: Option<String> = None;
    let mut anchor: Option<String> = None;
    let mut expect_anchor = false;
    // Alternates between switches (outside quotes) and quoted values.
    let mut inside = false;
    for tok in rest.split('"') {
        if inside {
            if expect_anchor {
                anchor = Some(tok.to_string());
                expect_anchor = false;
            } else if url.is_none() {
                url = Some(tok.to_string());
            }
        } else if tok.split_whitespace().last() == Some("\\l") {
            expect_anchor = true;
        }
        inside = !inside;
    }
    match (url, anchor) {
        (Some(u), Some(a)) => Some(format!("{u}#{a}")),
        (Some(u), None) => Some(u),
        (None, Some(a)) => Some(format!("#{a}")),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_zip() {
        let err = extract(b"\xD0\xCF\x11\xE0legacy doc", &StyleMap::default()).unwrap_err();
        assert!(matches!(err, Docx2MdError::InvalidDocumentFormat { .. }));
        assert!(extract(b"", &StyleMap::default()).is_err());
    }

    #[test]
    fn rejects_truncated_zip() {
        let err = extract(b"PK\x03\x04garbage", &StyleMap::default()).unwrap_err();
        assert!(matches!(err, Docx2MdError::InvalidDocumentFormat { .. }));
    }

    #[test]
    fn resolves_relative_targets() {
        assert_eq!(resolve_part("word", "media/image1.png"), "word/media/image1.png");
        assert_eq!(resolve_part("word", "../customXml/item1.xml"), "customXml/item1.xml");
        assert_eq!(resolve_part("word", "/word/media/a.jpeg"), "word/media/a.jpeg");
        assert_eq!(resolve_part("", "word/document.xml"), "word/document.xml");
    }

    #[test]
    fn parses_styles_with_default_paragraph() {
        let xml = r#"<w:styles xmlns:w="x">
            <w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style>
            <w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/></w:style>
        </w:styles>"#;
        let styles = parse_styles(xml).unwrap();
        assert_eq!(styles.name_of("Heading1"), "heading 1");
        assert_eq!(styles.name_of("Unknown"), "Unknown");
        assert_eq!(styles.default_paragraph(), "Normal");
    }

    #[test]
    fn parses_numbering_formats() {
        let xml = r#"<w:numbering xmlns:w="x">
            <w:abstractNum w:abstractNumId="0">
              <w:lvl w:ilvl="0"><w:start w:val="3"/><w:numFmt w:val="decimal"/></w:lvl>
              <w:lvl w:ilvl="1"><w:numFmt w:val="bullet"/></w:lvl>
            </w:abstractNum>
            <w:num w:numId="5"><w:abstractNumId w:val="0"/></w:num>
        </w:numbering>"#;
        let n = parse_numbering(xml).unwrap();
        let l0 = n.level("5", 0).unwrap();
        assert!(l0.ordered);
        assert_eq!(l0.start, 3);
        assert!(!n.level("5", 1).unwrap().ordered);
        assert!(n.level("9", 0).is_none());
    }

    #[test]
    fn content_types_prefer_overrides() {
        let xml = r#"<Types xmlns="x">
            <Default Extension="PNG" ContentType="image/png"/>
            <Override PartName="/word/media/pic.bin" ContentType="image/gif"/>
        </Types>"#;
        let t = parse_content_types(xml).unwrap();
        assert_eq!(t.for_part("word/media/a.png"), Some("image/png"));
        assert_eq!(t.for_part("word/media/pic.bin"), Some("image/gif"));
        assert_eq!(t.for_part("word/media/a.emf"), None);
    }

    #[test]
    fn hyperlink_field_targets() {
        assert_eq!(
            hyperlink_field_target(r#" HYPERLINK "https://kloudvin.com" "#).as_deref(),
            Some("https://kloudvin.com")
        );
        assert_eq!(
            hyperlink_field_target(r#"HYPERLINK \l "_Toc12345""#).as_deref(),
            Some("#_Toc12345")
        );
        assert_eq!(hyperlink_field_target(r#"TOC \o "1-3" \h"#), None);
    }

    #[test]
    fn malformed_xml_is_reported() {
        assert!(walk("<a><b></a>", |_| {}).is_err());
    }
}
