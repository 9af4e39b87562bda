//! Shared fixtures: an in-memory `.docx` builder and test sinks.

#![allow(dead_code)]

use async_trait::async_trait;
use kloudvin_docx2md::{ImageSink, SinkError};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use zip::write::SimpleFileOptions;

/// Smallest byte sequence `image::guess_format` recognises as PNG.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x06\0\0\0";

const NAMESPACES: &str = concat!(
    r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" "#,
    r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" "#,
    r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
    r#"xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture""#,
);

const REL_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const REL_LINK: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
const REL_STYLES: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
const REL_NUMBERING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering";

/// Paragraph styles every fixture declares: (style id, display name).
const STYLES: &[(&str, &str)] = &[
    ("Normal", "Normal"),
    ("Heading1", "heading 1"),
    ("Heading2", "heading 2"),
    ("Heading3", "heading 3"),
    ("Title", "Title"),
    ("ListParagraph", "List Paragraph"),
    ("Code", "Code"),
    ("Quote", "Quote"),
    ("TOC1", "toc 1"),
];

pub fn esc(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// One run of plain text.
pub fn run(text: &str) -> String {
    format!(r#"<w:r><w:t xml:space="preserve">{}</w:t></w:r>"#, esc(text))
}

/// One run with `<w:b/>` / `<w:i/>` properties.
pub fn run_with(text: &str, bold: bool, italic: bool) -> String {
    let mut props = String::new();
    if bold {
        props.push_str("<w:b/>");
    }
    if italic {
        props.push_str("<w:i/>");
    }
    format!(
        r#"<w:r><w:rPr>{props}</w:rPr><w:t xml:space="preserve">{}</w:t></w:r>"#,
        esc(text)
    )
}

/// Builds a minimal but well-formed WordprocessingML package in memory.
#[derive(Default)]
pub struct DocxBuilder {
    body: String,
    rels: Vec<(String, String, String, bool)>,
    media: Vec<(String, Vec<u8>)>,
    numbering: Option<String>,
    without_document: bool,
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_rel_id(&self) -> String {
        format!("rId{}", self.rels.len() + 10)
    }

    /// Append raw body XML.
    pub fn raw(mut self, xml: &str) -> Self {
        self.body.push_str(xml);
        self
    }

    /// A paragraph in the given style (by style id) made of raw run XML.
    pub fn styled_runs(self, style_id: Option<&str>, runs: &str) -> Self {
        let ppr = style_id
            .map(|s| format!(r#"<w:pPr><w:pStyle w:val="{s}"/></w:pPr>"#))
            .unwrap_or_default();
        self.raw(&format!("<w:p>{ppr}{runs}</w:p>"))
    }

    pub fn styled(self, style_id: &str, text: &str) -> Self {
        self.styled_runs(Some(style_id), &run(text))
    }

    pub fn heading(self, level: u8, text: &str) -> Self {
        self.styled(&format!("Heading{level}"), text)
    }

    pub fn paragraph(self, text: &str) -> Self {
        self.styled_runs(None, &run(text))
    }

    pub fn empty_paragraph(self) -> Self {
        self.raw("<w:p/>")
    }

    /// A numbered paragraph (`w:numPr`) in the `List Paragraph` style.
    pub fn list_item(self, num_id: u32, ilvl: u8, text: &str) -> Self {
        self.raw(&format!(
            r#"<w:p><w:pPr><w:pStyle w:val="ListParagraph"/><w:numPr><w:ilvl w:val="{ilvl}"/><w:numId w:val="{num_id}"/></w:numPr></w:pPr>{}</w:p>"#,
            run(text)
        ))
    }

    /// Declare numbering: `num_id` 1 is a bullet list, 2 a decimal list.
    pub fn with_standard_numbering(self) -> Self {
        self.with_decimal_start(1)
    }

    /// Like [`Self::with_standard_numbering`], the decimal list counting from `start`.
    pub fn with_decimal_start(mut self, start: u32) -> Self {
        self.numbering = Some(format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:numbering {NAMESPACES}>
  <w:abstractNum w:abstractNumId="0">
    <w:lvl w:ilvl="0"><w:start w:val="1"/><w:numFmt w:val="bullet"/></w:lvl>
    <w:lvl w:ilvl="1"><w:start w:val="1"/><w:numFmt w:val="bullet"/></w:lvl>
  </w:abstractNum>
  <w:abstractNum w:abstractNumId="1">
    <w:lvl w:ilvl="0"><w:start w:val="{start}"/><w:numFmt w:val="decimal"/></w:lvl>
    <w:lvl w:ilvl="1"><w:start w:val="1"/><w:numFmt w:val="lowerLetter"/></w:lvl>
  </w:abstractNum>
  <w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num>
  <w:num w:numId="2"><w:abstractNumId w:val="1"/></w:num>
</w:numbering>"#
        ));
        self
    }

    /// A paragraph holding one external hyperlink.
    pub fn hyperlink(mut self, url: &str, text: &str) -> Self {
        let id = self.next_rel_id();
        self.rels
            .push((id.clone(), REL_LINK.to_string(), url.to_string(), true));
        self.raw(&format!(
            r#"<w:p>{}<w:hyperlink r:id="{id}">{}</w:hyperlink></w:p>"#,
            run("Read the "),
            run(text)
        ))
    }

    /// A paragraph holding one embedded image stored at `word/media/{name}`.
    pub fn image(mut self, name: &str, bytes: &[u8], alt: &str) -> Self {
        let id = self.next_rel_id();
        self.rels.push((
            id.clone(),
            REL_IMAGE.to_string(),
            format!("media/{name}"),
            false,
        ));
        self.media.push((name.to_string(), bytes.to_vec()));
        self.raw(&drawing_paragraph(&id, alt))
    }

    /// An image whose relationship points at a part that does not exist.
    pub fn dangling_image(mut self, alt: &str) -> Self {
        let id = self.next_rel_id();
        self.rels.push((
            id.clone(),
            REL_IMAGE.to_string(),
            "media/missing.png".to_string(),
            false,
        ));
        self.raw(&drawing_paragraph(&id, alt))
    }

    /// A table; each inner `Vec` is a row of plain-text cells.
    pub fn table(self, rows: &[Vec<&str>]) -> Self {
        let mut xml = String::from("<w:tbl>");
        for row in rows {
            xml.push_str("<w:tr>");
            for cell in row {
                xml.push_str(&format!("<w:tc><w:p>{}</w:p></w:tc>", run(cell)));
            }
            xml.push_str("</w:tr>");
        }
        xml.push_str("</w:tbl>");
        self.raw(&xml)
    }

    /// Omit `word/document.xml` from the package.
    pub fn without_document(mut self) -> Self {
        self.without_document = true;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default();

        let mut put = |name: &str, data: &[u8]| {
            zip.start_file(name, opts).unwrap();
            zip.write_all(data).unwrap();
        };

        let mut overrides = String::from(
            r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
        );
        if self.numbering.is_some() {
            overrides.push_str(r#"<Override PartName="/word/numbering.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml"/>"#);
        }
        put(
            "[Content_Types].xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Default Extension="png" ContentType="image/png"/>
  <Default Extension="jpeg" ContentType="image/jpeg"/>
  {overrides}
</Types>"#
            )
            .as_bytes(),
        );

        put(
            "_rels/.rels",
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#,
        );

        let mut rels = format!(
            r#"<Relationship Id="rId1" Type="{REL_STYLES}" Target="styles.xml"/>"#
        );
        if self.numbering.is_some() {
            rels.push_str(&format!(
                r#"<Relationship Id="rId2" Type="{REL_NUMBERING}" Target="numbering.xml"/>"#
            ));
        }
        for (id, ty, target, external) in &self.rels {
            let mode = if *external { r#" TargetMode="External""# } else { "" };
            rels.push_str(&format!(
                r#"<Relationship Id="{id}" Type="{ty}" Target="{}"{mode}/>"#,
                esc(target)
            ));
        }
        put(
            "word/_rels/document.xml.rels",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
            )
            .as_bytes(),
        );

        let mut styles = String::new();
        for (id, name) in STYLES {
            let default = if *id == "Normal" { r#" w:default="1""# } else { "" };
            styles.push_str(&format!(
                r#"<w:style w:type="paragraph"{default} w:styleId="{id}"><w:name w:val="{name}"/></w:style>"#
            ));
        }
        put(
            "word/styles.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles {NAMESPACES}>{styles}</w:styles>"#
            )
            .as_bytes(),
        );

        if let Some(ref numbering) = self.numbering {
            put("word/numbering.xml", numbering.as_bytes());
        }

        for (name, bytes) in &self.media {
            put(&format!("word/media/{name}"), bytes);
        }

        if !self.without_document {
            put(
                "word/document.xml",
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document {NAMESPACES}><w:body>{}<w:sectPr/></w:body></w:document>"#,
                    self.body
                )
                .as_bytes(),
            );
        }

        zip.finish().unwrap().into_inner()
    }
}

fn drawing_paragraph(rel_id: &str, alt: &str) -> String {
    format!(
        r#"<w:p><w:r><w:drawing><wp:inline><wp:extent cx="100" cy="100"/><wp:docPr id="1" name="Picture 1" descr="{}"/><a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:pic><pic:blipFill><a:blip r:embed="{rel_id}"/></pic:blipFill></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#,
        esc(alt)
    )
}

// ── Sinks ────────────────────────────────────────────────────────────────

/// Always returns the same URL; makes output independent of generated names.
pub struct FixedUrlSink {
    pub url: String,
    pub calls: AtomicUsize,
}

impl FixedUrlSink {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ImageSink for FixedUrlSink {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn put(&self, _filename: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<String, SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.url.clone())
    }
}

/// Rejects every upload.
pub struct FailingSink;

#[async_trait]
impl ImageSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn put(&self, _filename: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<String, SinkError> {
        Err(SinkError::Rejected("HTTP 500".into()))
    }
}

/// Fails its readiness check.
pub struct OfflineSink;

#[async_trait]
impl ImageSink for OfflineSink {
    fn name(&self) -> &str {
        "offline"
    }

    async fn ensure_ready(&self) -> Result<(), SinkError> {
        Err(SinkError::Unavailable("connection refused".into()))
    }

    async fn put(&self, _filename: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<String, SinkError> {
        unreachable!("put must not be called when the sink is not ready")
    }
}

/// Records filenames and content types, returns a URL per filename.
#[derive(Default)]
pub struct RecordingSink {
    pub puts: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ImageSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn put(&self, filename: &str, _bytes: Vec<u8>, content_type: &str) -> Result<String, SinkError> {
        self.puts
            .lock()
            .unwrap()
            .push((filename.to_string(), content_type.to_string()));
        Ok(format!("https://blobs.example/{filename}"))
    }
}
