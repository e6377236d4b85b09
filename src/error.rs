//! Error types for the x2notion library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`X2NotionError`] — **Fatal**: the current stage cannot proceed at all
//!   (extractor failed, credentials missing, Notion rejected a request).
//!   Returned as `Err(X2NotionError)` from the top-level entry points.
//!
//! * [`ImageError`] — **Non-fatal**: a single image failed to download or
//!   upload, but the rest of the article is fine. Stored inside
//!   [`crate::output::UploadResult`] and [`crate::output::DownloadStats`]
//!   so callers can report partial success instead of losing the article.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the x2notion library.
///
/// Per-image failures use [`ImageError`] and are collected rather than
/// propagated here.
#[derive(Debug, Error)]
pub enum X2NotionError {
    // ── Extraction errors ─────────────────────────────────────────────────
    /// The extractor subprocess could not be started, exited non-zero, or
    /// printed no Markdown path.
    #[error("Content extraction failed for '{url}': {reason}\nCheck the extractor command (--extractor) and that the URL is reachable.")]
    ExtractionFailed { url: String, reason: String },

    /// The Markdown file named by the extractor (or a local article) could not be read.
    #[error("Failed to read article '{path}': {source}")]
    ArticleReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the output directory or write `article.md`.
    #[error("Failed to write output '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Remote service errors ─────────────────────────────────────────────
    /// A credential or identifier required by a remote stage is not set.
    #[error("Missing configuration '{variable}'.\n{hint}")]
    AuthConfigurationMissing { variable: String, hint: String },

    /// The remote API answered with a non-success status.
    #[error("{operation} failed: HTTP {status} - {body}")]
    RemoteApi {
        operation: String,
        status: u16,
        body: String,
    },

    /// The request never produced a response (DNS, TLS, connection reset, timeout).
    #[error("{operation} failed: {reason}")]
    Http { operation: String, reason: String },

    /// A block chunk could not be submitted; earlier chunks remain on the page.
    #[error("Block chunk {chunk}/{total} failed: {source}")]
    ChunkFailed {
        chunk: usize,
        total: usize,
        #[source]
        source: Box<X2NotionError>,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl X2NotionError {
    /// Build an [`X2NotionError::Http`] from a transport error.
    pub(crate) fn http(operation: impl Into<String>, err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            format!("timed out ({err})")
        } else {
            err.to_string()
        };
        X2NotionError::Http {
            operation: operation.into(),
            reason,
        }
    }
}

/// A non-fatal error for a single image.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ImageError {
    /// The CDN request failed or returned a non-success status.
    #[error("{filename}: download from {url} failed: {detail}")]
    DownloadFailed {
        filename: String,
        url: String,
        detail: String,
    },

    /// The CDN answered, but the body is not a recognisable image.
    #[error("{filename}: {url} did not return an image")]
    NotAnImage { filename: String, url: String },

    /// The object-storage PUT failed.
    #[error("{filename}: upload failed: {detail}")]
    UploadFailed { filename: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_failed_display_names_position() {
        let e = X2NotionError::ChunkFailed {
            chunk: 2,
            total: 3,
            source: Box::new(X2NotionError::RemoteApi {
                operation: "Append blocks".into(),
                status: 400,
                body: "validation_error".into(),
            }),
        };
        let msg = e.to_string();
        assert!(msg.contains("2/3"), "got: {msg}");
        assert!(msg.contains("HTTP 400"), "got: {msg}");
    }

    #[test]
    fn auth_missing_display_includes_hint() {
        let e = X2NotionError::AuthConfigurationMissing {
            variable: "NOTION_TOKEN".into(),
            hint: "export NOTION_TOKEN=secret_...".into(),
        };
        assert!(e.to_string().contains("NOTION_TOKEN"));
        assert!(e.to_string().contains("export"));
    }

    #[test]
    fn image_error_display() {
        let e = ImageError::NotAnImage {
            filename: "03.jpg".into(),
            url: "https://pbs.twimg.com/media/x?format=jpg&name=orig".into(),
        };
        assert!(e.to_string().starts_with("03.jpg"));
    }
}
