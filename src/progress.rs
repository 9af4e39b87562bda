//! Progress-callback trait for per-image conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages and uploads each image.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a broadcast channel, a WebSocket or a terminal progress
//! bar without the library knowing how the host application communicates.
//! The trait is `Send + Sync` because uploads run concurrently.
//!
//! # Example
//!
//! ```rust
//! use kloudvin_docx2md::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     uploaded: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, index: usize, total: usize, url: &str) {
//!         self.uploaded.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Image {}/{} → {}", index, total, url);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     uploaded: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Pipeline stage reported through [`ConversionProgressCallback::on_stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    UploadImages,
    Cleanup,
    Render,
    Normalize,
}

/// Called by the conversion pipeline as it processes a document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// `on_image_start`, `on_image_complete` and `on_image_error` may be called
/// concurrently from different tasks. Implementations must protect shared
/// mutable state (e.g. `Mutex`, `AtomicUsize`).
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once extraction has counted the embedded images.
    fn on_conversion_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called when a pipeline stage begins.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called just before an image is handed to the sink.
    ///
    /// # Arguments
    /// * `index`: 1-based position of the image in the document
    /// * `total`: embedded images in the document
    fn on_image_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when the sink returned a URL for the image.
    fn on_image_complete(&self, index: usize, total: usize, url: &str) {
        let _ = (index, total, url);
    }

    /// Called when the image was given up on (after any retries).
    fn on_image_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once the Markdown is final.
    ///
    /// # Arguments
    /// * `uploaded`    : images that received a URL
    /// * `markdown_len`: byte length of the produced Markdown
    fn on_conversion_complete(&self, uploaded: usize, markdown_len: usize) {
        let _ = (uploaded, markdown_len);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        total: AtomicUsize,
        stages: Mutex<Vec<Stage>>,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_conversion_start(&self, total_images: usize) {
            self.total.store(total_images, Ordering::SeqCst);
        }

        fn on_stage(&self, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_image_start(&self, _index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_image_complete(&self, _index: usize, _total: usize, _url: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_image_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversion_start(5);
        cb.on_stage(Stage::Extract);
        cb.on_image_start(1, 5);
        cb.on_image_complete(1, 5, "https://x/y.png");
        cb.on_image_error(2, 5, "timeout");
        cb.on_conversion_complete(4, 1024);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_conversion_start(3);
        tracker.on_stage(Stage::UploadImages);
        tracker.on_image_start(1, 3);
        tracker.on_image_complete(1, 3, "a");
        tracker.on_image_start(2, 3);
        tracker.on_image_complete(2, 3, "b");
        tracker.on_image_start(3, 3);
        tracker.on_image_error(3, 3, "HTTP 500");

        assert_eq!(tracker.total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.stages.lock().unwrap(), vec![Stage::UploadImages]);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_conversion_start(10);
        cb.on_image_start(1, 10);
    }
}
