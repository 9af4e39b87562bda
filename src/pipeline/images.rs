//! Image offloading: push every embedded image to the [`ImageSink`] and
//! collect one URL (or empty string) per slot.
//!
//! ## Failure isolation
//!
//! Each upload is its own future with its own timeout. A sink error or a
//! timeout produces an empty URL and a [`ConversionWarning`] for that image
//! only; the other uploads keep running and the document still converts.
//! An image that could not be stored renders as nothing rather than as a
//! broken `![](…)` reference.
//!
//! ## Retry Strategy
//!
//! Off by default (`max_upload_retries = 0`). When enabled, the wait before
//! attempt *n* is `retry_backoff_ms * 2^(n-1)`: 500 ms → 1 s → 2 s.
//!
//! ## Naming
//!
//! Stored objects are named `{unix_millis}-{8 base36 chars}.{ext}` where
//! `ext` comes from the MIME subtype (`image/jpeg` → `jpeg`, default `png`).
//! Names are never reused within a conversion.

use crate::config::ConversionConfig;
use crate::error::{ConversionWarning, Docx2MdError};
use crate::pipeline::extract::ImageAsset;
use crate::sink::ImageSink;
use futures::stream::{self, StreamExt};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 8;

/// Result of offloading all images of one document.
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    /// URL per slot; empty string when the upload failed.
    pub urls: Vec<String>,
    /// Per-image failures, in document order.
    pub warnings: Vec<ConversionWarning>,
    pub uploaded: usize,
    pub failed: usize,
}

/// Return the configured sink after its readiness check.
///
/// Runs before any image is read so a misconfigured deployment fails the
/// whole conversion up front.
pub async fn ensure_sink(config: &ConversionConfig) -> Result<Arc<dyn ImageSink>, Docx2MdError> {
    let sink = config
        .sink
        .as_ref()
        .map(Arc::clone)
        .ok_or_else(|| Docx2MdError::SinkUnavailable {
            sink: "none".into(),
            hint: format!(
                "No image sink configured.\nSet {} (Azure Blob Storage) or {} (local directory), \
                 or pass a sink to ConversionConfig::builder().sink(...).",
                crate::sink::AZURE_CONNECTION_ENV,
                crate::sink::IMAGE_DIR_ENV
            ),
        })?;
    sink.ensure_ready()
        .await
        .map_err(|e| Docx2MdError::SinkUnavailable {
            sink: sink.name().to_string(),
            hint: e.to_string(),
        })?;
    Ok(sink)
}

/// Upload every asset concurrently and collect URLs by slot.
pub async fn upload_all(
    images: Vec<ImageAsset>,
    sink: Arc<dyn ImageSink>,
    config: &ConversionConfig,
) -> UploadReport {
    let total = images.len();
    let mut report = UploadReport {
        urls: vec![String::new(); total],
        ..UploadReport::default()
    };
    if total == 0 {
        return report;
    }
    info!("Uploading {} images to '{}' sink", total, sink.name());

    let mut used = HashSet::with_capacity(total);
    let jobs: Vec<(ImageAsset, String)> = images
        .into_iter()
        .map(|asset| {
            let mut name = generate_filename(&asset.content_type);
            while !used.insert(name.clone()) {
                name = generate_filename(&asset.content_type);
            }
            (asset, name)
        })
        .collect();

    let mut outcomes: Vec<(usize, usize, String, UploadOutcome)> = stream::iter(
        jobs.into_iter().map(|(asset, filename)| {
            let sink = Arc::clone(&sink);
            let cb = config.progress_callback.clone();
            let timeout_secs = config.upload_timeout_secs;
            let retries = config.max_upload_retries;
            let backoff_ms = config.retry_backoff_ms;
            async move {
                if let Some(ref cb) = cb {
                    cb.on_image_start(asset.index, total);
                }
                let outcome = upload_one(
                    sink.as_ref(),
                    &filename,
                    asset.bytes,
                    &asset.content_type,
                    asset.index,
                    timeout_secs,
                    retries,
                    backoff_ms,
                )
                .await;
                if let Some(ref cb) = cb {
                    match &outcome {
                        UploadOutcome::Stored(url) => cb.on_image_complete(asset.index, total, url),
                        UploadOutcome::Failed(e) => cb.on_image_error(asset.index, total, e),
                        UploadOutcome::TimedOut => {
                            cb.on_image_error(asset.index, total, "upload timed out")
                        }
                    }
                }
                (asset.slot, asset.index, asset.part_name, outcome)
            }
        }),
    )
    .buffer_unordered(config.upload_concurrency.max(1))
    .collect()
    .await;

    // Completion order is arbitrary; warnings follow document order.
    outcomes.sort_by_key(|(_, index, _, _)| *index);

    for (slot, index, target, outcome) in outcomes {
        match outcome {
            UploadOutcome::Stored(url) => {
                report.uploaded += 1;
                if let Some(s) = report.urls.get_mut(slot) {
                    *s = url;
                }
            }
            UploadOutcome::Failed(detail) => {
                report.failed += 1;
                report.warnings.push(ConversionWarning::ImageUploadFailed {
                    index,
                    target,
                    detail,
                });
            }
            UploadOutcome::TimedOut => {
                report.failed += 1;
                report.warnings.push(ConversionWarning::ImageUploadTimeout {
                    index,
                    target,
                    secs: config.upload_timeout_secs,
                });
            }
        }
    }

    info!(
        "Images: {} uploaded, {} failed",
        report.uploaded, report.failed
    );
    report
}

#[derive(Debug)]
enum UploadOutcome {
    Stored(String),
    Failed(String),
    TimedOut,
}

#[allow(clippy::too_many_arguments)]
async fn upload_one(
    sink: &dyn ImageSink,
    filename: &str,
    bytes: Vec<u8>,
    content_type: &str,
    index: usize,
    timeout_secs: u64,
    max_retries: u32,
    backoff_ms: u64,
) -> UploadOutcome {
    let mut bytes = Some(bytes);
    let mut last = UploadOutcome::Failed("not attempted".into());

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let backoff = backoff_delay_ms(backoff_ms, attempt);
            warn!(
                "Image {}: retry {}/{} after {}ms",
                index, attempt, max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        // The final attempt hands over the buffer instead of cloning it.
        let payload = if attempt == max_retries {
            bytes.take().unwrap_or_default()
        } else {
            bytes.clone().unwrap_or_default()
        };

        match timeout(
            Duration::from_secs(timeout_secs),
            sink.put(filename, payload, content_type),
        )
        .await
        {
            Ok(Ok(url)) => {
                debug!("Image {} stored as {}", index, url);
                return UploadOutcome::Stored(url);
            }
            Ok(Err(e)) => {
                warn!("Image {}: attempt {} failed: {}", index, attempt + 1, e);
                last = UploadOutcome::Failed(e.to_string());
            }
            Err(_) => {
                warn!(
                    "Image {}: attempt {} timed out after {}s",
                    index,
                    attempt + 1,
                    timeout_secs
                );
                last = UploadOutcome::TimedOut;
            }
        }
    }

    last
}

// ── Naming ───────────────────────────────────────────────────────────────

/// `{unix_millis}-{random base36}.{ext}` for a new object.
pub fn generate_filename(content_type: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{millis}-{suffix}.{}", extension_for(content_type))
}

/// File extension from a MIME type's subtype; `png` when there is none.
///
/// Structured-syntax suffixes and parameters are dropped
/// (`image/svg+xml; charset=utf-8` → `svg`).
pub fn extension_for(content_type: &str) -> String {
    let subtype = content_type
        .split(';')
        .next()
        .and_then(|t| t.split_once('/'))
        .map(|(_, sub)| sub.split('+').next().unwrap_or(sub).trim().to_ascii_lowercase())
        .unwrap_or_default();
    if subtype.is_empty() || !subtype.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.') {
        "png".to_string()
    } else {
        subtype
    }
}

/// Longest wait between two attempts.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Exponential backoff before retry `attempt` (1-based), capped at
/// [`MAX_BACKOFF_MS`].
fn backoff_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 2u64
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}
