//! Error types for the kloudvin-docx2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Docx2MdError`]: **Fatal**: the conversion cannot proceed at all
//!   (not a DOCX, no image sink configured, unreadable input). Returned as
//!   `Err(Docx2MdError)` from the top-level `convert*` functions and never
//!   accompanied by partial output.
//!
//! * [`ConversionWarning`]: **Non-fatal**: one image failed to upload, one
//!   embedded object could not be represented, a paragraph style had no
//!   mapping. Collected in [`crate::ConversionOutput::warnings`] in the order
//!   they occurred; the rest of the document is unaffected.
//!
//! The split mirrors how the HTTP service reports outcomes: fatal errors
//! become `{ success: false, error }`, warnings travel with a successful
//! response as `messages`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the kloudvin-docx2md library.
#[derive(Debug, Error)]
pub enum Docx2MdError {
    // ── Document errors ───────────────────────────────────────────────────
    /// The bytes are not a readable OOXML word-processing container.
    #[error("Not a valid .docx document: {detail}\nOnly Word 2007+ (.docx) files are supported; re-save legacy .doc files as .docx.")]
    InvalidDocumentFormat { detail: String },

    // ── Sink errors ───────────────────────────────────────────────────────
    /// No image sink is configured, or its readiness check failed.
    #[error("Image sink '{sink}' is unavailable.\n{hint}")]
    SinkUnavailable { sink: String, hint: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// The input string is not a valid file path or URL, or the request
    /// carried no document.
    #[error("Invalid input '{input}': not a file path, a valid HTTP/HTTPS URL, or a document payload")]
    InvalidInput { input: String },

    /// The document payload is not valid base64.
    #[error("Document payload is not valid base64: {detail}")]
    InvalidBase64 { detail: String },

    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// A style-map rule could not be parsed.
    #[error("Invalid style map rule on line {line}: {detail}")]
    InvalidStyleMap { line: usize, detail: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`Docx2MdError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The caller supplied something unusable; retrying with the same input
    /// will fail again.
    Input,
    /// The deployment is misconfigured (missing sink, bad style map).
    Configuration,
    /// Anything else.
    Internal,
}

impl Docx2MdError {
    /// Classify the error for logs and HTTP status mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Docx2MdError::InvalidDocumentFormat { .. }
            | Docx2MdError::InvalidInput { .. }
            | Docx2MdError::InvalidBase64 { .. }
            | Docx2MdError::FileNotFound { .. }
            | Docx2MdError::PermissionDenied { .. }
            | Docx2MdError::DownloadFailed { .. }
            | Docx2MdError::DownloadTimeout { .. } => ErrorKind::Input,
            Docx2MdError::SinkUnavailable { .. }
            | Docx2MdError::InvalidStyleMap { .. }
            | Docx2MdError::InvalidConfig(_) => ErrorKind::Configuration,
            Docx2MdError::OutputWriteFailed { .. } | Docx2MdError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Short machine-readable code, e.g. `"invalid_document_format"`.
    pub fn code(&self) -> &'static str {
        match self {
            Docx2MdError::InvalidDocumentFormat { .. } => "invalid_document_format",
            Docx2MdError::SinkUnavailable { .. } => "sink_unavailable",
            Docx2MdError::InvalidInput { .. } => "invalid_input",
            Docx2MdError::InvalidBase64 { .. } => "invalid_base64",
            Docx2MdError::FileNotFound { .. } => "file_not_found",
            Docx2MdError::PermissionDenied { .. } => "permission_denied",
            Docx2MdError::DownloadFailed { .. } => "download_failed",
            Docx2MdError::DownloadTimeout { .. } => "download_timeout",
            Docx2MdError::InvalidStyleMap { .. } => "invalid_style_map",
            Docx2MdError::InvalidConfig(_) => "invalid_config",
            Docx2MdError::OutputWriteFailed { .. } => "output_write_failed",
            Docx2MdError::Internal(_) => "internal",
        }
    }
}

/// A non-fatal problem encountered while converting one document.
///
/// `index` fields on image variants are 1-based positions in document order.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversionWarning {
    /// The sink rejected or failed an upload; the image renders as nothing.
    #[error("Image {index} ({target}) could not be uploaded: {detail}")]
    ImageUploadFailed {
        index: usize,
        target: String,
        detail: String,
    },

    /// The upload did not finish within the configured timeout.
    #[error("Image {index} ({target}) upload timed out after {secs}s")]
    ImageUploadTimeout {
        index: usize,
        target: String,
        secs: u64,
    },

    /// The image part is missing from the archive or unreadable.
    #[error("Image {index} ({target}) could not be read: {detail}")]
    ImageReadFailed {
        index: usize,
        target: String,
        detail: String,
    },

    /// An embedded object (OLE, chart, equation) was skipped.
    #[error("Unsupported embedded object skipped: {detail}")]
    UnsupportedObject { detail: String },

    /// A paragraph style had no rule in the style map; treated as a paragraph.
    #[error("Unrecognised paragraph style '{style}' was treated as a normal paragraph")]
    UnmappedStyle { style: String },

    /// A table inside a table cell was flattened into the enclosing cell.
    #[error("Nested table flattened into its enclosing cell")]
    NestedTableFlattened,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_format_display_mentions_docx() {
        let e = Docx2MdError::InvalidDocumentFormat {
            detail: "missing word/document.xml".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("word/document.xml"), "got: {msg}");
        assert!(msg.contains(".docx"));
    }

    #[test]
    fn sink_unavailable_carries_hint() {
        let e = Docx2MdError::SinkUnavailable {
            sink: "azure-blob".into(),
            hint: "Set AZURE_STORAGE_CONNECTION_STRING".into(),
        };
        assert!(e.to_string().contains("azure-blob"));
        assert!(e.to_string().contains("AZURE_STORAGE_CONNECTION_STRING"));
        assert_eq!(e.kind(), ErrorKind::Configuration);
        assert_eq!(e.code(), "sink_unavailable");
    }

    #[test]
    fn input_errors_are_classified_as_input() {
        let e = Docx2MdError::InvalidBase64 {
            detail: "bad byte".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Input);
        let e = Docx2MdError::InvalidDocumentFormat {
            detail: "x".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Input);
        assert_eq!(
            Docx2MdError::Internal("boom".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn upload_warning_names_position_and_target() {
        let w = ConversionWarning::ImageUploadFailed {
            index: 2,
            target: "word/media/image2.png".into(),
            detail: "HTTP 403".into(),
        };
        let msg = w.to_string();
        assert!(msg.contains("Image 2"));
        assert!(msg.contains("word/media/image2.png"));
    }

    #[test]
    fn warnings_serialise_with_kind_tag() {
        let w = ConversionWarning::UnmappedStyle {
            style: "Fancy".into(),
        };
        let json = serde_json::to_string(&w).unwrap();
        assert!(json.contains("\"kind\":\"unmapped_style\""), "got: {json}");
        let back: ConversionWarning = serde_json::from_str(&json).unwrap();
        assert_eq!(back, w);
    }
}
