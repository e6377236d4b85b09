//! Result types produced by the download and publish stages.

use crate::error::ImageError;
use crate::pipeline::frontmatter::Metadata;
use crate::publish::PublishStage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An image saved next to the article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalImage {
    /// `01.jpg`, `02.jpg`, … numbered by position in the source document.
    pub filename: String,
    /// Path relative to the article directory, e.g. `images/01.jpg`.
    pub local_path: String,
    pub caption: String,
    /// CDN URL the file was downloaded from.
    pub source_url: String,
}

/// Download counters for one article.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadStats {
    /// Media references found in the Markdown.
    pub images_found: usize,
    /// Images written to disk.
    pub images_downloaded: usize,
    /// One entry per image that could not be saved.
    pub failures: Vec<ImageError>,
    pub duration_ms: u64,
}

/// Everything stages 1-3 left on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalArticle {
    pub metadata: Metadata,
    pub output_dir: PathBuf,
    /// `{output_dir}/article.md`
    pub markdown_path: PathBuf,
    /// `{output_dir}/images`
    pub images_dir: PathBuf,
    /// Successfully downloaded images, in document order.
    pub images: Vec<LocalImage>,
    pub stats: DownloadStats,
}

/// Outcome of one object-storage upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub filename: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    pub fn uploaded(filename: impl Into<String>, url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            success: true,
            url: Some(url.into()),
            key: Some(key.into()),
            error: None,
        }
    }

    pub fn failed(filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            success: false,
            url: None,
            key: None,
            error: Some(error.into()),
        }
    }

    /// The public URL, only when the upload succeeded.
    pub fn public_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|_| self.success)
    }
}

/// A page created in the target database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePage {
    pub id: String,
    pub url: String,
}

/// Summary of a publish run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub page: RemotePage,
    /// Blocks submitted across all chunks.
    pub blocks: usize,
    /// Write calls issued (1 create + appends).
    pub chunks: usize,
    pub uploads: Vec<UploadResult>,
    pub placeholders_replaced: usize,
    /// Stages visited, in order.
    pub stages: Vec<PublishStage>,
}

impl PublishOutcome {
    pub fn uploads_succeeded(&self) -> usize {
        self.uploads.iter().filter(|r| r.success).count()
    }

    pub fn uploads_failed(&self) -> usize {
        self.uploads.len() - self.uploads_succeeded()
    }
}

/// Summary of attaching images to an existing page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachOutcome {
    pub page_id: String,
    pub uploads: Vec<UploadResult>,
    pub placeholders_replaced: usize,
}
