//! Result types returned by the conversion entry points.

use crate::error::ConversionWarning;
use serde::{Deserialize, Serialize};

/// The final product of one conversion.
///
/// Produced once at the end of the pipeline and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Normalized Markdown body, title line removed.
    pub markdown: String,
    /// Extracted title; empty when the heuristic found none.
    pub title: String,
    /// Recoverable problems in the order they were encountered.
    pub warnings: Vec<ConversionWarning>,
    /// Image references (`![…](…)`) present in `markdown`.
    pub image_count: usize,
    pub stats: ConversionStats,
}

impl ConversionOutput {
    /// Warnings rendered as human-readable strings (the HTTP `messages` field).
    pub fn messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }
}

/// Per-conversion counters and timings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Blocks produced by extraction.
    pub blocks_extracted: usize,
    /// Blocks left after structural cleanup.
    pub blocks_after_cleanup: usize,
    /// Embedded images found in the package.
    pub images_found: usize,
    pub images_uploaded: usize,
    pub images_failed: usize,
    pub extract_duration_ms: u64,
    pub upload_duration_ms: u64,
    /// Cleanup, render, normalization and title extraction together.
    pub markdown_duration_ms: u64,
    pub total_duration_ms: u64,
}
