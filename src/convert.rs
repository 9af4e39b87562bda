//! Conversion entry points.
//!
//! ## Why one pass, in order?
//!
//! Each stage assumes the previous one is finished: cleanup needs every
//! image node to carry its final URL-or-empty `src`, and title extraction
//! works on normalized text. So uploads are concurrent among themselves, but
//! the stages never overlap. Nothing here holds state between calls; two
//! documents can convert at the same time on the same [`ConversionConfig`].
//!
//! All entry points funnel into [`convert`], which takes the raw bytes.
//! [`convert_input`] and [`convert_base64`] only differ in how they obtain
//! them.

use crate::config::ConversionConfig;
use crate::error::Docx2MdError;
use crate::output::{ConversionOutput, ConversionStats};
use crate::pipeline::input::{self, DOC_CONTENT_TYPE};
use crate::pipeline::{cleanup, extract, images, normalize, render, title};
use crate::progress::Stage;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

static IMAGE_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\(").expect("valid regex"));

/// Convert an in-memory `.docx` to Markdown.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `bytes`: The document as read from disk or a request body
/// * `content_type_hint`: Declared MIME type, if the caller has one
/// * `config`: Conversion configuration; must carry an image sink
///
/// # Returns
/// `Ok(ConversionOutput)` on success, even if some images failed
/// (check `output.warnings`).
///
/// # Errors
/// Returns `Err(Docx2MdError)` only for fatal errors:
/// - No image sink, or the sink is not ready
/// - A legacy `.doc` hint, or bytes that are not a readable OOXML package
///
/// # Example
/// ```rust,no_run
/// use kloudvin_docx2md::{convert, ConversionConfig, MemoryImageSink};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("post.docx")?;
/// let config = ConversionConfig::builder()
///     .sink(Arc::new(MemoryImageSink::default()))
///     .build()?;
/// let output = convert(&bytes, None, &config).await?;
/// println!("# {}\n\n{}", output.title, output.markdown);
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    bytes: &[u8],
    content_type_hint: Option<&str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Docx2MdError> {
    let total_start = Instant::now();
    info!("Starting conversion of {} bytes", bytes.len());

    // ── Step 1: Reject what we cannot read ───────────────────────────────
    if let Some(hint) = content_type_hint {
        if is_legacy_doc(hint) {
            return Err(Docx2MdError::InvalidDocumentFormat {
                detail: format!("content type '{hint}' is a legacy binary Word document"),
            });
        }
    }

    // ── Step 2: Fail fast on a missing or unready sink ───────────────────
    let sink = images::ensure_sink(config).await?;

    // ── Step 3: Extract blocks and images ────────────────────────────────
    notify_stage(config, Stage::Extract);
    let extract_start = Instant::now();
    let owned = bytes.to_vec();
    let style_map = config.style_map.clone();
    let extraction = tokio::task::spawn_blocking(move || extract::extract(&owned, &style_map))
        .await
        .map_err(|e| Docx2MdError::Internal(format!("Extraction task panicked: {}", e)))??;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;

    let extract::Extraction {
        mut document,
        images: assets,
        mut warnings,
    } = extraction;
    let images_found = assets.len();
    let blocks_extracted = document.blocks.len();
    info!(
        "Extracted {} blocks and {} images in {}ms",
        blocks_extracted, images_found, extract_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(images_found);
    }

    // ── Step 4: Offload images, then write URLs back by slot ─────────────
    notify_stage(config, Stage::UploadImages);
    let upload_start = Instant::now();
    let report = images::upload_all(assets, sink, config).await;
    let upload_duration_ms = upload_start.elapsed().as_millis() as u64;
    document.resolve_images(&report.urls);
    if report.failed > 0 {
        warn!("{} of {} images could not be stored", report.failed, images_found);
    }
    warnings.extend(report.warnings);

    // ── Step 5: Cleanup → render → normalize → title ─────────────────────
    let markdown_start = Instant::now();
    notify_stage(config, Stage::Cleanup);
    let (document, cleanup_report) = cleanup::clean(document);
    debug!("Cleanup removals: {:?}", cleanup_report.removed);

    notify_stage(config, Stage::Render);
    let raw = render::render(&document);

    notify_stage(config, Stage::Normalize);
    let normalized = normalize::normalize(&raw);

    let split = if config.extract_title {
        title::extract_title(&normalized, config.title_scan_lines)
    } else {
        title::TitleSplit {
            title: String::new(),
            body: normalized,
        }
    };
    let markdown_duration_ms = markdown_start.elapsed().as_millis() as u64;

    let image_count = count_image_refs(&split.body);
    let stats = ConversionStats {
        blocks_extracted,
        blocks_after_cleanup: cleanup_report.blocks_after,
        images_found,
        images_uploaded: report.uploaded,
        images_failed: report.failed,
        extract_duration_ms,
        upload_duration_ms,
        markdown_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Conversion complete: {} chars, {} images, {} warnings, {}ms total",
        split.body.len(),
        image_count,
        warnings.len(),
        stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(report.uploaded, split.body.len());
    }

    Ok(ConversionOutput {
        markdown: split.body,
        title: split.title,
        warnings,
        image_count,
        stats,
    })
}

/// Convert a base64-encoded document, as received in an HTTP request body.
///
/// A `data:` URL prefix and embedded whitespace are accepted.
pub async fn convert_base64(
    payload: &str,
    content_type_hint: Option<&str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Docx2MdError> {
    let bytes = decode_payload(payload)?;
    convert(&bytes, content_type_hint, config).await
}

/// Convert a local `.docx` file or an HTTP/HTTPS URL.
pub async fn convert_input(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Docx2MdError> {
    let input_str = input_str.as_ref();
    info!("Resolving input: {}", input_str);
    let source = input::resolve_input(input_str, config.download_timeout_secs).await?;
    if let Some(ref name) = source.name {
        debug!("Converting '{}'", name);
    }
    convert(&source.bytes, source.content_type.as_deref(), config).await
}

/// Convert a file or URL and write the Markdown directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Docx2MdError> {
    let output = convert_input(input_str, config).await?;
    let path = output_path.as_ref();

    // Atomic write: write to temp, then rename
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Docx2MdError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, with_final_newline(&output.markdown))
        .await
        .map_err(|e| Docx2MdError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Docx2MdError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(output)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    bytes: &[u8],
    content_type_hint: Option<&str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Docx2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Docx2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(bytes, content_type_hint, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn notify_stage(config: &ConversionConfig, stage: Stage) {
    debug!("Stage: {:?}", stage);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage(stage);
    }
}

fn is_legacy_doc(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|t| t.trim().eq_ignore_ascii_case(DOC_CONTENT_TYPE))
}

/// Count `![alt](` constructs in the final Markdown.
pub fn count_image_refs(markdown: &str) -> usize {
    IMAGE_REF.find_iter(markdown).count()
}

fn decode_payload(payload: &str) -> Result<Vec<u8>, Docx2MdError> {
    let data = match payload.find(";base64,") {
        Some(pos) if payload.starts_with("data:") => &payload[pos + ";base64,".len()..],
        _ => payload,
    };
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(Docx2MdError::InvalidBase64 {
            detail: "payload is empty".into(),
        });
    }
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| Docx2MdError::InvalidBase64 {
            detail: e.to_string(),
        })
}

fn with_final_newline(markdown: &str) -> String {
    let trimmed = markdown.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemoryImageSink;
    use std::sync::Arc;

    fn config() -> ConversionConfig {
        ConversionConfig::builder()
            .sink(Arc::new(MemoryImageSink::default()))
            .build()
            .unwrap()
    }

    #[test]
    fn counts_image_refs() {
        assert_eq!(count_image_refs("![a](x) text ![](y) [link](z)"), 2);
        assert_eq!(count_image_refs("no images"), 0);
    }

    #[test]
    fn legacy_doc_detection() {
        assert!(is_legacy_doc("application/msword"));
        assert!(is_legacy_doc("Application/MSWord; charset=binary"));
        assert!(!is_legacy_doc(input::DOCX_CONTENT_TYPE));
    }

    #[test]
    fn decodes_plain_and_data_url_payloads() {
        assert_eq!(decode_payload("UEsDBA==").unwrap(), b"PK\x03\x04");
        assert_eq!(
            decode_payload("data:application/octet-stream;base64,UEsD\nBA==").unwrap(),
            b"PK\x03\x04"
        );
        assert!(matches!(
            decode_payload("   "),
            Err(Docx2MdError::InvalidBase64 { .. })
        ));
        assert!(matches!(
            decode_payload("not base64!"),
            Err(Docx2MdError::InvalidBase64 { .. })
        ));
    }

    #[tokio::test]
    async fn msword_hint_is_rejected_before_parsing() {
        let err = convert(b"PK\x03\x04", Some("application/msword"), &config())
            .await
            .unwrap_err();
        assert!(matches!(err, Docx2MdError::InvalidDocumentFormat { .. }));
    }

    #[tokio::test]
    async fn missing_sink_fails_fast() {
        let err = convert(b"not even a zip", None, &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Docx2MdError::SinkUnavailable { .. }));
    }

    #[tokio::test]
    async fn garbage_bytes_are_invalid_format() {
        let err = convert(b"hello world", None, &config()).await.unwrap_err();
        assert!(matches!(err, Docx2MdError::InvalidDocumentFormat { .. }));
    }

    #[test]
    fn final_newline() {
        assert_eq!(with_final_newline("a\n\n"), "a\n");
        assert_eq!(with_final_newline(""), "\n");
    }
}
