//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline extracts, downloads, uploads and publishes.
//!
//! The pipeline is strictly sequential, so events arrive in order on the
//! calling task. The trait is still `Send + Sync` so a callback can be shared
//! with other tasks (a UI loop, a log forwarder).

use crate::publish::PublishStage;
use std::sync::Arc;

/// Called by the pipeline as it works through an article.
///
/// Every method has a no-op default so callers only override what they need.
pub trait PipelineProgressCallback: Send + Sync {
    /// The extractor produced a Markdown file.
    fn on_extracted(&self, markdown_path: &str) {
        let _ = markdown_path;
    }

    /// Image downloads are about to start.
    fn on_downloads_start(&self, total: usize) {
        let _ = total;
    }

    /// One image download finished (`error` is `None` on success).
    ///
    /// # Arguments
    /// * `index`    — 1-indexed position in document order
    /// * `total`    — number of scanned images
    /// * `filename` — local file name, e.g. `03.jpg`
    fn on_image_downloaded(&self, index: usize, total: usize, filename: &str, error: Option<&str>) {
        let _ = (index, total, filename, error);
    }

    /// The publish orchestrator entered a new stage.
    fn on_stage(&self, stage: PublishStage) {
        let _ = stage;
    }

    /// One image upload finished (`error` is `None` on success).
    fn on_image_uploaded(&self, index: usize, total: usize, filename: &str, error: Option<&str>) {
        let _ = (index, total, filename, error);
    }

    /// A block chunk was accepted by the page API.
    ///
    /// # Arguments
    /// * `chunk`  — 1-indexed chunk number
    /// * `total`  — number of chunks
    /// * `blocks` — blocks in this chunk
    fn on_chunk_submitted(&self, chunk: usize, total: usize, blocks: usize) {
        let _ = (chunk, total, blocks);
    }

    /// A placeholder block was patched into an image.
    fn on_placeholder_replaced(&self, filename: &str, url: &str) {
        let _ = (filename, url);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        downloads_ok: AtomicUsize,
        downloads_failed: AtomicUsize,
        chunks: AtomicUsize,
    }

    impl PipelineProgressCallback for Counting {
        fn on_image_downloaded(&self, _i: usize, _t: usize, _f: &str, error: Option<&str>) {
            match error {
                None => self.downloads_ok.fetch_add(1, Ordering::SeqCst),
                Some(_) => self.downloads_failed.fetch_add(1, Ordering::SeqCst),
            };
        }

        fn on_chunk_submitted(&self, _chunk: usize, _total: usize, _blocks: usize) {
            self.chunks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extracted("/tmp/a.md");
        cb.on_downloads_start(2);
        cb.on_image_downloaded(1, 2, "01.jpg", None);
        cb.on_stage(PublishStage::PageCreated);
        cb.on_image_uploaded(1, 1, "01.jpg", Some("403"));
        cb.on_chunk_submitted(1, 1, 7);
        cb.on_placeholder_replaced("01.jpg", "https://x");
    }

    #[test]
    fn overridden_methods_receive_events() {
        let cb = Counting::default();
        cb.on_image_downloaded(1, 3, "01.jpg", None);
        cb.on_image_downloaded(2, 3, "02.jpg", Some("HTTP 404"));
        cb.on_image_downloaded(3, 3, "03.jpg", None);
        cb.on_chunk_submitted(1, 2, 100);
        cb.on_chunk_submitted(2, 2, 5);

        assert_eq!(cb.downloads_ok.load(Ordering::SeqCst), 2);
        assert_eq!(cb.downloads_failed.load(Ordering::SeqCst), 1);
        assert_eq!(cb.chunks.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_downloads_start(10);
    }
}
