//! Placeholder reconciliation: patch placeholder callouts into image blocks.
//!
//! A page published without uploaded images carries one callout per image,
//! each containing [`PLACEHOLDER_MARKER`] followed by the image filename.
//! Matching is by that filename only, so filenames must be unique within an
//! article. Placeholders without a successful upload are left as they are.

use crate::error::X2NotionError;
use crate::output::UploadResult;
use crate::pipeline::blocks::{ContentBlock, PLACEHOLDER_MARKER};
use crate::pipeline::notion::PageApi;
use crate::progress::PipelineProgressCallback;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Filename following the placeholder marker, up to the next whitespace.
pub fn placeholder_token(text: &str) -> Option<&str> {
    let (_, rest) = text.split_once(PLACEHOLDER_MARKER)?;
    rest.split_whitespace().next()
}

/// Replace placeholder callouts on `page_id` with images from `uploads`.
///
/// Lists the page's children once, then patches each matching callout. A
/// failed patch is logged and skipped; only successful patches are counted.
/// Returns without calling the API when no upload succeeded.
pub async fn reconcile_placeholders(
    api: &dyn PageApi,
    page_id: &str,
    uploads: &[UploadResult],
    progress: Option<&dyn PipelineProgressCallback>,
) -> Result<usize, X2NotionError> {
    let urls: HashMap<&str, &str> = uploads
        .iter()
        .filter_map(|r| r.public_url().map(|url| (r.filename.as_str(), url)))
        .collect();
    if urls.is_empty() {
        debug!("No successful uploads; nothing to reconcile");
        return Ok(0);
    }

    let children = api.list_children(page_id).await?;
    let mut replaced = 0;

    for block in children.iter().filter(|b| b.kind == "callout") {
        let Some(filename) = placeholder_token(&block.text) else {
            continue;
        };
        let Some(url) = urls.get(filename) else {
            debug!("No upload for placeholder {}", filename);
            continue;
        };
        match api.patch_block(&block.id, &ContentBlock::external_image(*url)).await {
            Ok(()) => {
                debug!("Replaced placeholder {} with {}", filename, url);
                if let Some(cb) = progress {
                    cb.on_placeholder_replaced(filename, url);
                }
                replaced += 1;
            }
            Err(e) => warn!("Failed to replace placeholder {}: {}", filename, e),
        }
    }

    info!("Replaced {} image placeholder(s)", replaced);
    Ok(replaced)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_follows_marker() {
        assert_eq!(
            placeholder_token("⏳ Image placeholder: 01.jpg (replaced once the image is uploaded)"),
            Some("01.jpg")
        );
        assert_eq!(placeholder_token("Image placeholder:02.jpg"), Some("02.jpg"));
    }

    #[test]
    fn token_absent_without_marker() {
        assert_eq!(placeholder_token("📎 Source: https://x.com/a"), None);
        assert_eq!(placeholder_token("Image placeholder:   "), None);
    }
}
