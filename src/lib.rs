//! # kloudvin-docx2md
//!
//! Convert Word (`.docx`) articles to clean Markdown for the KloudVin blog.
//!
//! ## Why this crate?
//!
//! Authors write posts in Word; the blog stores Markdown. A naive
//! text dump loses headings, lists and images, and keeps everything Word
//! adds for print: a generated table of contents, hidden `_Toc` bookmarks,
//! page numbers. This crate reads the OOXML package structurally, offloads
//! the embedded images to blob storage, strips the print furniture and
//! produces Markdown plus a separately extracted title.
//!
//! ## Pipeline Overview
//!
//! ```text
//! .docx
//!  │
//!  ├─ 1. Extract    zip + WordprocessingML → typed blocks (spawn_blocking)
//!  ├─ 2. Images     concurrent uploads to the ImageSink, URLs written back
//!  ├─ 3. Cleanup    ordered rules: TOC, bookmarks, page numbers, read time
//!  ├─ 4. Render     blocks → Markdown (ATX, `-` bullets, fenced code, GFM)
//!  ├─ 5. Normalize  spacing state machine + final passes
//!  └─ 6. Title      lift the H1 or first short line out of the body
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kloudvin_docx2md::{convert_input, ConversionConfig, DirectoryImageSink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sink = DirectoryImageSink::new("public/images", "https://cdn.example/images");
//!     let config = ConversionConfig::builder().sink(Arc::new(sink)).build()?;
//!     let output = convert_input("post.docx", &config).await?;
//!     println!("title: {}", output.title);
//!     println!("{}", output.markdown);
//!     for w in &output.warnings {
//!         eprintln!("warning: {w}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `docx2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `azure`  | on      | [`AzureBlobImageSink`] backed by the `azure-blob-lite` workspace crate |
//! | `server` | off     | HTTP service (`docx2md-server`, axum) exposing `POST /api/convertDocx` |
//!
//! Disable default features when using only the library:
//! ```toml
//! kloudvin-docx2md = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;
pub mod sink;
pub mod style;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{convert, convert_base64, convert_input, convert_sync, convert_to_file};
pub use document::{Block, Document, ImageRef, Inline, Marks};
pub use error::{ConversionWarning, Docx2MdError, ErrorKind};
pub use output::{ConversionOutput, ConversionStats};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
#[cfg(feature = "azure")]
pub use sink::AzureBlobImageSink;
pub use sink::{DirectoryImageSink, ImageSink, MemoryImageSink, SinkError};
pub use style::StyleMap;
