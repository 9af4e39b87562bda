//! Input resolution: turn a user-supplied path or URL into document bytes.
//!
//! Unlike a renderer that needs a file-system path, the extractor reads the
//! zip container straight from memory, so both branches end in a
//! [`SourceDocument`] holding the bytes. The content type (from the HTTP
//! `Content-Type` header or the file extension) travels along as a hint: a
//! legacy `.doc` is rejected by name before anyone tries to unzip it.

use crate::error::Docx2MdError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// MIME type of an OOXML word-processing document.
pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
/// MIME type of a legacy binary Word document.
pub const DOC_CONTENT_TYPE: &str = "application/msword";

/// Raw document bytes plus what we know about where they came from.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub bytes: Vec<u8>,
    /// Declared content type, if any.
    pub content_type: Option<String>,
    /// File name for logs (`report.docx`).
    pub name: Option<String>,
}

impl SourceDocument {
    pub fn from_bytes(bytes: Vec<u8>, content_type: Option<&str>) -> Self {
        Self {
            bytes,
            content_type: content_type.map(str::to_string),
            name: None,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to document bytes.
///
/// If the input is a URL, download it. If the input is a local file,
/// validate it exists and is readable.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<SourceDocument, Docx2MdError> {
    if input.trim().is_empty() {
        return Err(Docx2MdError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input).await
    }
}

/// Content type implied by a file extension.
pub fn content_type_for_path(path: &Path) -> Option<&'static str> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("docx") | Some("docm") | Some("dotx") => Some(DOCX_CONTENT_TYPE),
        Some("doc") | Some("dot") => Some(DOC_CONTENT_TYPE),
        _ => None,
    }
}

async fn resolve_local(path_str: &str) -> Result<SourceDocument, Docx2MdError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(Docx2MdError::FileNotFound { path });
    }

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Docx2MdError::PermissionDenied { path });
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Docx2MdError::FileNotFound { path });
        }
        Err(e) => {
            return Err(Docx2MdError::Internal(format!(
                "Failed to read '{}': {e}",
                path.display()
            )))
        }
    };

    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(SourceDocument {
        bytes,
        content_type: content_type_for_path(&path).map(str::to_string),
        name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceDocument, Docx2MdError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Docx2MdError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Docx2MdError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Docx2MdError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(Docx2MdError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let name = extract_filename(url);
    let header_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| v != "application/octet-stream");

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Docx2MdError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());

    let content_type = header_type.or_else(|| {
        name.as_deref()
            .and_then(|n| content_type_for_path(Path::new(n)))
            .map(str::to_string)
    });

    Ok(SourceDocument {
        bytes: bytes.to_vec(),
        content_type,
        name,
    })
}

/// Last path segment of the URL when it looks like a file name.
fn extract_filename(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty() && last.contains('.')).then(|| last.to_string())
}
