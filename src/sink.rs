//! Image sinks: where embedded images go once they leave the document.
//!
//! Markdown cannot carry binary images, so every embedded picture is stored
//! somewhere addressable and replaced by its URL. The pipeline only knows the
//! [`ImageSink`] trait; which store backs it is a deployment decision.
//!
//! | Sink | Backing store | Typical use |
//! |------|---------------|-------------|
//! | [`AzureBlobImageSink`] | Azure Blob Storage container (feature `azure`) | Production blog |
//! | [`DirectoryImageSink`] | Local directory + public base URL | Static-site builds, CLI |
//! | [`MemoryImageSink`]    | In-process `Vec` | Tests, embedding |
//!
//! ## Why a trait object?
//!
//! [`crate::ConversionConfig`] must stay `Clone + Send + Sync` and free of
//! generic parameters so it can be shared across request handlers; an
//! `Arc<dyn ImageSink>` gives that while still letting tests inject a sink
//! that fails on purpose.

use crate::error::Docx2MdError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

/// Env var holding the Azure Storage connection string.
pub const AZURE_CONNECTION_ENV: &str = "AZURE_STORAGE_CONNECTION_STRING";
/// Env var overriding the blob container name.
pub const CONTAINER_ENV: &str = "DOCX2MD_IMAGE_CONTAINER";
/// Container used when [`CONTAINER_ENV`] is not set.
pub const DEFAULT_CONTAINER: &str = "images";
/// Env vars configuring a [`DirectoryImageSink`].
pub const IMAGE_DIR_ENV: &str = "DOCX2MD_IMAGE_DIR";
pub const IMAGE_BASE_URL_ENV: &str = "DOCX2MD_IMAGE_BASE_URL";

/// Why a single store operation failed.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The backing store is not reachable or not configured.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// The store refused this object.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Local I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network failure talking to a remote store.
    #[error("transport error: {0}")]
    Transport(String),
}

/// A store that accepts image bytes and returns a public URL for them.
///
/// Implementations must be safe to call concurrently: the pipeline issues up
/// to `upload_concurrency` `put` calls at once.
#[async_trait]
pub trait ImageSink: Send + Sync {
    /// Short identifier used in logs and errors (`"azure-blob"`).
    fn name(&self) -> &str;

    /// Checked once per conversion before any image is read. An error here
    /// aborts the conversion with [`Docx2MdError::SinkUnavailable`].
    async fn ensure_ready(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Store `bytes` under `filename` and return the URL to embed.
    async fn put(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, SinkError>;
}

// ── Memory ───────────────────────────────────────────────────────────────

/// An image stored by [`MemoryImageSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Keeps images in memory; URLs are `{base_url}/{filename}`.
#[derive(Debug)]
pub struct MemoryImageSink {
    base_url: String,
    stored: Mutex<Vec<StoredImage>>,
}

impl Default for MemoryImageSink {
    fn default() -> Self {
        Self::new("memory://images")
    }
}

impl MemoryImageSink {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            stored: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of everything stored so far, in completion order.
    pub fn stored(&self) -> Vec<StoredImage> {
        self.stored.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ImageSink for MemoryImageSink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, SinkError> {
        let mut stored = self
            .stored
            .lock()
            .map_err(|_| SinkError::Unavailable("memory sink lock poisoned".into()))?;
        stored.push(StoredImage {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            bytes,
        });
        Ok(format!("{}/{}", self.base_url, filename))
    }
}

// ── Directory ────────────────────────────────────────────────────────────

/// Writes images into a directory served at `public_base_url`.
#[derive(Debug, Clone)]
pub struct DirectoryImageSink {
    dir: PathBuf,
    public_base_url: String,
}

impl DirectoryImageSink {
    pub fn new(dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ImageSink for DirectoryImageSink {
    fn name(&self) -> &str {
        "directory"
    }

    async fn ensure_ready(&self) -> Result<(), SinkError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            SinkError::Unavailable(format!("cannot create '{}': {e}", self.dir.display()))
        })
    }

    async fn put(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, SinkError> {
        if filename.contains('/') || filename.contains('\\') || filename.starts_with('.') {
            return Err(SinkError::Rejected(format!("unsafe filename '{filename}'")));
        }
        let path = self.dir.join(filename);
        tokio::fs::write(&path, &bytes).await?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(format!("{}/{}", self.public_base_url, filename))
    }
}

// ── Azure Blob Storage ───────────────────────────────────────────────────

/// Uploads images as block blobs into one container.
#[cfg(feature = "azure")]
#[derive(Debug, Clone)]
pub struct AzureBlobImageSink {
    client: azure_blob_lite::BlobContainerClient,
}

#[cfg(feature = "azure")]
impl AzureBlobImageSink {
    /// Parse `connection_string` and target `container`.
    pub fn from_connection_string(
        connection_string: &str,
        container: &str,
    ) -> Result<Self, SinkError> {
        let client =
            azure_blob_lite::BlobContainerClient::from_connection_string(connection_string, container)
                .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "azure")]
#[async_trait]
impl ImageSink for AzureBlobImageSink {
    fn name(&self) -> &str {
        "azure-blob"
    }

    async fn put(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, SinkError> {
        use azure_blob_lite::BlobError;
        self.client
            .upload_block_blob(filename, bytes, content_type)
            .await
            .map_err(|e| match e {
                BlobError::Rejected { .. } => SinkError::Rejected(e.to_string()),
                BlobError::Transport(_) | BlobError::Timeout => SinkError::Transport(e.to_string()),
                other => SinkError::Unavailable(other.to_string()),
            })
    }
}

// ── Factory ──────────────────────────────────────────────────────────────

/// Build a sink from the process environment.
///
/// Checked in order:
/// 1. `AZURE_STORAGE_CONNECTION_STRING` (container from
///    `DOCX2MD_IMAGE_CONTAINER`, default `images`)
/// 2. `DOCX2MD_IMAGE_DIR` (+ optional `DOCX2MD_IMAGE_BASE_URL`, default the
///    directory path itself)
///
/// Returns `Ok(None)` when neither is set; the conversion then fails with
/// [`Docx2MdError::SinkUnavailable`] unless the caller supplies a sink.
pub fn from_env() -> Result<Option<Arc<dyn ImageSink>>, Docx2MdError> {
    let var = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());

    if let Some(conn) = var(AZURE_CONNECTION_ENV) {
        let container = var(CONTAINER_ENV).unwrap_or_else(|| DEFAULT_CONTAINER.to_string());
        return azure_from_connection_string(&conn, &container).map(Some);
    }

    if let Some(dir) = var(IMAGE_DIR_ENV) {
        let base = var(IMAGE_BASE_URL_ENV).unwrap_or_else(|| dir.clone());
        return Ok(Some(Arc::new(DirectoryImageSink::new(dir, base))));
    }

    Ok(None)
}

/// Build an Azure sink, mapping failures to [`Docx2MdError::SinkUnavailable`].
#[cfg(feature = "azure")]
pub fn azure_from_connection_string(
    connection_string: &str,
    container: &str,
) -> Result<Arc<dyn ImageSink>, Docx2MdError> {
    AzureBlobImageSink::from_connection_string(connection_string, container)
        .map(|s| Arc::new(s) as Arc<dyn ImageSink>)
        .map_err(|e| Docx2MdError::SinkUnavailable {
            sink: "azure-blob".into(),
            hint: format!("{e}\nCheck {AZURE_CONNECTION_ENV}."),
        })
}

#[cfg(not(feature = "azure"))]
pub fn azure_from_connection_string(
    _connection_string: &str,
    _container: &str,
) -> Result<Arc<dyn ImageSink>, Docx2MdError> {
    Err(Docx2MdError::SinkUnavailable {
        sink: "azure-blob".into(),
        hint: format!(
            "{AZURE_CONNECTION_ENV} is set but this build lacks the `azure` feature.\n\
             Rebuild with --features azure or use {IMAGE_DIR_ENV}."
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_sink_records_puts() {
        let sink = MemoryImageSink::new("https://cdn.example/images/");
        let url = sink.put("a.png", vec![1, 2, 3], "image/png").await.unwrap();
        assert_eq!(url, "https://cdn.example/images/a.png");
        let stored = sink.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content_type, "image/png");
        assert_eq!(stored[0].bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn directory_sink_writes_files() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectoryImageSink::new(tmp.path().join("media"), "/media");
        sink.ensure_ready().await.unwrap();
        let url = sink.put("x.jpeg", b"jpeg".to_vec(), "image/jpeg").await.unwrap();
        assert_eq!(url, "/media/x.jpeg");
        let written = std::fs::read(tmp.path().join("media/x.jpeg")).unwrap();
        assert_eq!(written, b"jpeg");
    }

    #[test]
    fn memory_sink_is_always_ready() {
        let sink = MemoryImageSink::default();
        tokio_test::assert_ok!(tokio_test::block_on(sink.ensure_ready()));
        assert_eq!(sink.name(), "memory");
    }

    #[tokio::test]
    async fn directory_sink_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectoryImageSink::new(tmp.path(), "/m");
        let err = sink.put("../evil.png", vec![], "image/png").await.unwrap_err();
        assert!(matches!(err, SinkError::Rejected(_)));
    }

    #[cfg(feature = "azure")]
    #[test]
    fn bad_connection_string_is_sink_unavailable() {
        let err = azure_from_connection_string("AccountName=x", "images").err().unwrap();
        assert!(matches!(err, Docx2MdError::SinkUnavailable { .. }));
    }
}
