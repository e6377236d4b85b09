//! Sequential image downloads from the media CDN.
//!
//! Images are fetched one at a time, in document order. A failed image is
//! logged and reported but never aborts the article.

use crate::config::{PipelineConfig, XAuth};
use crate::error::{ImageError, X2NotionError};
use crate::output::LocalImage;
use crate::pipeline::images::{local_filename, ImageReference};
use crate::progress::PipelineProgressCallback;
use reqwest::header::{AUTHORIZATION, COOKIE, USER_AGENT};
use std::path::Path;
use tracing::{debug, warn};

/// HTTP client preconfigured for media downloads.
pub struct ImageFetcher {
    client: reqwest::Client,
    user_agent: String,
    auth: Option<XAuth>,
}

impl ImageFetcher {
    pub fn new(config: &PipelineConfig) -> Result<Self, X2NotionError> {
        Ok(Self {
            client: config.http_client()?,
            user_agent: config.user_agent.clone(),
            auth: config.x_auth.clone().filter(|a| !a.is_empty()),
        })
    }

    /// Download `url` into `dest`, verifying the body is an image.
    pub async fn fetch(&self, url: &str, filename: &str, dest: &Path) -> Result<u64, ImageError> {
        let failed = |detail: String| ImageError::DownloadFailed {
            filename: filename.to_string(),
            url: url.to_string(),
            detail,
        };

        debug!("Downloading: {}", url.split('?').next().unwrap_or(url));
        let mut req = self.client.get(url).header(USER_AGENT, &self.user_agent);
        if let Some(auth) = &self.auth {
            if let Some(token) = &auth.auth_token {
                req = req.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            if let Some(ct0) = &auth.ct0 {
                req = req.header(COOKIE, format!("ct0={ct0}"));
            }
        }

        let response = req.send().await.map_err(|e| failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }
        let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

        if image::guess_format(&bytes).is_err() {
            return Err(ImageError::NotAnImage {
                filename: filename.to_string(),
                url: url.to_string(),
            });
        }

        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| failed(format!("cannot write {}: {e}", dest.display())))?;
        Ok(bytes.len() as u64)
    }
}

/// Download every reference into `images_dir` as `NN.jpg`.
///
/// Numbering follows scan position, so a failed image leaves a gap rather
/// than shifting later filenames.
pub async fn download_images(
    fetcher: &ImageFetcher,
    refs: &[ImageReference],
    images_dir: &Path,
    progress: Option<&dyn PipelineProgressCallback>,
) -> (Vec<LocalImage>, Vec<ImageError>) {
    let total = refs.len();
    let mut saved = Vec::with_capacity(total);
    let mut failures = Vec::new();

    if let Some(cb) = progress {
        cb.on_downloads_start(total);
    }

    for (i, r) in refs.iter().enumerate() {
        let filename = local_filename(i);
        let dest = images_dir.join(&filename);
        match fetcher.fetch(&r.download_url, &filename, &dest).await {
            Ok(bytes) => {
                debug!("Saved {} ({} bytes)", filename, bytes);
                if let Some(cb) = progress {
                    cb.on_image_downloaded(i + 1, total, &filename, None);
                }
                saved.push(LocalImage {
                    local_path: format!("images/{filename}"),
                    filename,
                    caption: r.caption.clone(),
                    source_url: r.original_url.clone(),
                });
            }
            Err(e) => {
                warn!("Image download failed: {}", e);
                if let Some(cb) = progress {
                    cb.on_image_downloaded(i + 1, total, &filename, Some(&e.to_string()));
                }
                failures.push(e);
            }
        }
    }

    (saved, failures)
}
