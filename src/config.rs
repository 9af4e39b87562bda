//! Configuration types for DOCX-to-Markdown conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share one config across request handlers and to diff two
//! runs to understand why their outputs differ.
//!
//! The pipeline never reads the environment. Binaries (and
//! [`crate::sink::from_env`]) translate env vars into a config; library
//! callers construct one directly.

use crate::error::Docx2MdError;
use crate::progress::ProgressCallback;
use crate::sink::ImageSink;
use crate::style::StyleMap;
use std::fmt;
use std::sync::Arc;

/// Configuration for a DOCX-to-Markdown conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use kloudvin_docx2md::{ConversionConfig, MemoryImageSink};
/// use std::sync::Arc;
///
/// let config = ConversionConfig::builder()
///     .sink(Arc::new(MemoryImageSink::default()))
///     .upload_concurrency(8)
///     .upload_timeout_secs(20)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Paragraph/run style rules. Default: [`StyleMap::default()`].
    pub style_map: StyleMap,

    /// Where embedded images are stored. Default: `None`.
    ///
    /// A conversion without a sink fails with
    /// [`Docx2MdError::SinkUnavailable`] before reading any image, even for
    /// documents that contain none: a deployment that forgot to configure
    /// storage should find out on its first request, not on the first
    /// article with a screenshot.
    pub sink: Option<Arc<dyn ImageSink>>,

    /// Maximum concurrent image uploads. Default: 4.
    pub upload_concurrency: usize,

    /// Per-upload timeout in seconds. Default: 30.
    pub upload_timeout_secs: u64,

    /// Retries after a failed or timed-out upload. Default: 0.
    ///
    /// Zero keeps the single-attempt behaviour: a failed image renders as
    /// nothing and a warning is recorded.
    pub max_upload_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Extract a title from the Markdown and remove it from the body. Default: true.
    pub extract_title: bool,

    /// How many non-blank lines the title heuristic inspects. Default: 15.
    pub title_scan_lines: usize,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-image progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            style_map: StyleMap::default(),
            sink: None,
            upload_concurrency: 4,
            upload_timeout_secs: 30,
            max_upload_retries: 0,
            retry_backoff_ms: 500,
            extract_title: true,
            title_scan_lines: 15,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("style_rules", &self.style_map.rules().len())
            .field("sink", &self.sink.as_ref().map(|s| s.name().to_string()))
            .field("upload_concurrency", &self.upload_concurrency)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("max_upload_retries", &self.max_upload_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("extract_title", &self.extract_title)
            .field("title_scan_lines", &self.title_scan_lines)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    /// Replace the style map entirely.
    pub fn style_map(mut self, map: StyleMap) -> Self {
        self.config.style_map = map;
        self
    }

    /// Put `rules` in front of the default table.
    pub fn style_overrides(mut self, rules: StyleMap) -> Self {
        self.config.style_map = StyleMap::with_overrides(rules);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ImageSink>) -> Self {
        self.config.sink = Some(sink);
        self
    }

    pub fn upload_concurrency(mut self, n: usize) -> Self {
        self.config.upload_concurrency = n.max(1);
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs;
        self
    }

    pub fn max_upload_retries(mut self, n: u32) -> Self {
        self.config.max_upload_retries = n.min(10);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn extract_title(mut self, v: bool) -> Self {
        self.config.extract_title = v;
        self
    }

    pub fn title_scan_lines(mut self, n: usize) -> Self {
        self.config.title_scan_lines = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Docx2MdError> {
        let c = &self.config;
        if c.upload_concurrency == 0 {
            return Err(Docx2MdError::InvalidConfig(
                "Upload concurrency must be ≥ 1".into(),
            ));
        }
        if c.upload_timeout_secs == 0 {
            return Err(Docx2MdError::InvalidConfig(
                "Upload timeout must be ≥ 1 second".into(),
            ));
        }
        if c.title_scan_lines == 0 && c.extract_title {
            return Err(Docx2MdError::InvalidConfig(
                "title_scan_lines must be ≥ 1 when title extraction is enabled".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemoryImageSink;

    #[test]
    fn defaults_match_reference_behaviour() {
        let c = ConversionConfig::default();
        assert_eq!(c.upload_concurrency, 4);
        assert_eq!(c.max_upload_retries, 0);
        assert_eq!(c.title_scan_lines, 15);
        assert!(c.extract_title);
        assert!(c.sink.is_none());
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = ConversionConfig::builder()
            .upload_concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.upload_concurrency, 1);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = ConversionConfig::builder()
            .upload_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, Docx2MdError::InvalidConfig(_)));
    }

    #[test]
    fn zero_scan_lines_ok_when_title_disabled() {
        assert!(ConversionConfig::builder()
            .title_scan_lines(0)
            .build()
            .is_err());
        assert!(ConversionConfig::builder()
            .title_scan_lines(0)
            .extract_title(false)
            .build()
            .is_ok());
    }

    #[test]
    fn debug_hides_trait_objects() {
        let c = ConversionConfig::builder()
            .sink(Arc::new(MemoryImageSink::default()))
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("\"memory\""), "got: {dbg}");
    }
}
