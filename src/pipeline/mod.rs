//! Pipeline stages for DOCX-to-Markdown conversion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets a
//! stage change (say, a new cleanup rule) without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ images ──▶ cleanup ──▶ render ──▶ normalize ──▶ title
//! (bytes)   (blocks)    (sink)     (rules)     (md)       (spacing)     (split)
//! ```
//!
//! 1. [`input`]    : resolve a path or URL to document bytes
//! 2. [`extract`]  : parse the OOXML package into a typed block list;
//!    runs in `spawn_blocking` because zip inflation and XML parsing are CPU-bound
//! 3. [`images`]   : offload embedded images to the sink; the only stage with
//!    network I/O. All uploads settle before cleanup starts
//! 4. [`cleanup`]  : ordered rule objects strip Word artifacts
//! 5. [`render`]   : pure block → Markdown serialisation
//! 6. [`normalize`]: line state machine for consistent spacing
//! 7. [`title`]    : lift the title line out of the body

pub mod cleanup;
pub mod extract;
pub mod images;
pub mod input;
pub mod normalize;
pub mod render;
pub mod title;
