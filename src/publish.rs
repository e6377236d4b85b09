//! Upload orchestrator: publish a saved article as a Notion page.
//!
//! ## Stages
//!
//! ```text
//! MetadataLoaded ─▶ ImagesUploaded? ─▶ BlocksConverted ─▶ PageCreated ─▶ PlaceholdersReconciled? ─▶ Done
//! ```
//!
//! The two optional stages run only when image upload was requested and the
//! article has images. Without them the converter gets an empty URL map and
//! every image becomes a placeholder callout, which [`attach_images`] can
//! later replace. Stages only move forward; nothing is retried or rolled
//! back, so a failed chunk leaves a partially populated page behind.

use crate::config::{CosConfig, NotionConfig, PipelineConfig};
use crate::error::X2NotionError;
use crate::output::{AttachOutcome, LocalArticle, PublishOutcome, RemotePage, UploadResult};
use crate::pipeline::blocks::{convert_document, ContentBlock, ImageUrlMap};
use crate::pipeline::cos::{upload_images, CosClient, ObjectStore, TaskId};
use crate::pipeline::frontmatter::{extract_metadata, Metadata};
use crate::pipeline::notion::{create_page_chunked, NewPage, NotionClient, PageApi};
use crate::pipeline::reconcile::reconcile_placeholders;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// One step of a publish run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStage {
    MetadataLoaded,
    ImagesUploaded,
    BlocksConverted,
    PageCreated,
    PlaceholdersReconciled,
    Done,
}

/// Which optional stages a run visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan {
    pub upload_images: bool,
}

impl StagePlan {
    /// Upload runs only when it was requested and there is something to upload.
    pub fn new(upload_requested: bool, image_count: usize) -> Self {
        Self {
            upload_images: upload_requested && image_count > 0,
        }
    }

    pub fn for_article(config: &PipelineConfig, article: &LocalArticle) -> Self {
        Self::new(config.upload_images, article.images.len())
    }
}

impl PublishStage {
    /// The stage after `self`, or `None` once [`PublishStage::Done`] is reached.
    pub fn next(self, plan: StagePlan) -> Option<Self> {
        use PublishStage::*;
        match self {
            MetadataLoaded if plan.upload_images => Some(ImagesUploaded),
            MetadataLoaded | ImagesUploaded => Some(BlocksConverted),
            BlocksConverted => Some(PageCreated),
            PageCreated if plan.upload_images => Some(PlaceholdersReconciled),
            PageCreated | PlaceholdersReconciled => Some(Done),
            Done => None,
        }
    }

    /// Every stage a run under `plan` visits, in order.
    pub fn path(plan: StagePlan) -> Vec<Self> {
        std::iter::successors(Some(PublishStage::MetadataLoaded), |s| s.next(plan)).collect()
    }

    pub fn label(self) -> &'static str {
        match self {
            PublishStage::MetadataLoaded => "Loading metadata",
            PublishStage::ImagesUploaded => "Uploading images",
            PublishStage::BlocksConverted => "Converting to Notion blocks",
            PublishStage::PageCreated => "Creating Notion page",
            PublishStage::PlaceholdersReconciled => "Replacing image placeholders",
            PublishStage::Done => "Done",
        }
    }
}

/// Publish `article` through the given collaborators.
///
/// `store` is required only when the plan uploads images.
///
/// # Errors
/// Missing object storage for a requested upload, an unreadable
/// `article.md`, a failed page creation or chunk append, or a failed
/// placeholder listing. Per-image upload failures are reported in
/// [`PublishOutcome::uploads`] instead.
pub async fn publish(
    article: &LocalArticle,
    config: &PipelineConfig,
    api: &dyn PageApi,
    store: Option<&dyn ObjectStore>,
) -> Result<PublishOutcome, X2NotionError> {
    let plan = StagePlan::for_article(config, article);
    let progress = config.progress_callback.as_deref();
    let store = match (plan.upload_images, store) {
        (true, None) => return Err(missing_store()),
        (_, s) => s,
    };

    let mut markdown = String::new();
    let mut metadata = Metadata::default();
    let mut uploads: Vec<UploadResult> = Vec::new();
    let mut blocks: Vec<ContentBlock> = Vec::new();
    let mut created: Option<(RemotePage, usize)> = None;
    let mut placeholders_replaced = 0;
    let mut visited = Vec::new();

    let mut stage = Some(PublishStage::MetadataLoaded);
    while let Some(current) = stage {
        debug!("Publish stage: {:?}", current);
        if let Some(cb) = progress {
            cb.on_stage(current);
        }
        match current {
            PublishStage::MetadataLoaded => {
                markdown = read_article(article).await?;
                metadata = merged_metadata(&markdown, article, &config.fallback_title);
                info!("Publishing '{}'", metadata.title);
            }
            PublishStage::ImagesUploaded => {
                if let Some(store) = store {
                    let task_id = TaskId::derive(&metadata);
                    uploads = upload_images(store, &image_paths(article), &task_id, progress).await;
                }
            }
            PublishStage::BlocksConverted => {
                blocks = convert_document(&markdown, &url_map(&uploads), &metadata);
                info!("Converted to {} blocks", blocks.len());
            }
            PublishStage::PageCreated => {
                let page = NewPage::for_article(&metadata.title, &metadata);
                created = Some(create_page_chunked(api, &page, &blocks, progress).await?);
            }
            PublishStage::PlaceholdersReconciled => {
                if let Some((page, _)) = &created {
                    placeholders_replaced = reconcile_placeholders(api, &page.id, &uploads, progress).await?;
                }
            }
            PublishStage::Done => {}
        }
        visited.push(current);
        stage = current.next(plan);
    }

    let (page, chunks) = created.ok_or_else(|| X2NotionError::Internal("publish finished without a page".into()))?;
    info!("Published: {}", page.url);
    Ok(PublishOutcome {
        page,
        blocks: blocks.len(),
        chunks,
        uploads,
        placeholders_replaced,
        stages: visited,
    })
}

/// Publish `article` with clients built from `config`, falling back to the
/// environment for credentials not set on it.
///
/// # Errors
/// [`X2NotionError::AuthConfigurationMissing`] when Notion credentials (or
/// object-storage credentials, if images are to be uploaded) are absent.
pub async fn publish_to_notion(article: &LocalArticle, config: &PipelineConfig) -> Result<PublishOutcome, X2NotionError> {
    let http = config.http_client()?;
    let api = NotionClient::new(notion_config(config)?, http.clone());
    if StagePlan::for_article(config, article).upload_images {
        let store = CosClient::new(cos_config(config)?, http);
        publish(article, config, &api, Some(&store as &dyn ObjectStore)).await
    } else {
        publish(article, config, &api, None).await
    }
}

/// Upload the article's images and patch the placeholders on an existing page.
///
/// This is the second half of a text-only publish. Placeholders without a
/// successful upload stay on the page.
pub async fn attach_images(
    page_id: &str,
    article: &LocalArticle,
    config: &PipelineConfig,
    api: &dyn PageApi,
    store: &dyn ObjectStore,
) -> Result<AttachOutcome, X2NotionError> {
    let progress = config.progress_callback.as_deref();
    let markdown = read_article(article).await?;
    let metadata = merged_metadata(&markdown, article, &config.fallback_title);

    let task_id = TaskId::derive(&metadata);
    let uploads = upload_images(store, &image_paths(article), &task_id, progress).await;
    let placeholders_replaced = reconcile_placeholders(api, page_id, &uploads, progress).await?;

    Ok(AttachOutcome {
        page_id: page_id.to_string(),
        uploads,
        placeholders_replaced,
    })
}

/// [`attach_images`] with clients built from `config` or the environment.
pub async fn attach_images_to_notion(
    page_id: &str,
    article: &LocalArticle,
    config: &PipelineConfig,
) -> Result<AttachOutcome, X2NotionError> {
    let http = config.http_client()?;
    let api = NotionClient::new(notion_config(config)?, http.clone());
    let store = CosClient::new(cos_config(config)?, http);
    attach_images(page_id, article, config, &api, &store).await
}

fn notion_config(config: &PipelineConfig) -> Result<NotionConfig, X2NotionError> {
    match &config.notion {
        Some(n) => Ok(n.clone()),
        None => NotionConfig::from_env(),
    }
}

fn cos_config(config: &PipelineConfig) -> Result<CosConfig, X2NotionError> {
    match &config.cos {
        Some(c) => Ok(c.clone()),
        None => CosConfig::from_env(),
    }
}

fn missing_store() -> X2NotionError {
    X2NotionError::AuthConfigurationMissing {
        variable: "TENCENT_COS_SECRET_ID".into(),
        hint: "Image upload was requested but no object storage is configured.".into(),
    }
}

async fn read_article(article: &LocalArticle) -> Result<String, X2NotionError> {
    tokio::fs::read_to_string(&article.markdown_path)
        .await
        .map_err(|e| X2NotionError::ArticleReadFailed {
            path: article.markdown_path.clone(),
            source: e,
        })
}

/// Metadata from the saved file, with gaps filled from the download run.
/// The title always comes from the download run.
fn merged_metadata(markdown: &str, article: &LocalArticle, fallback_title: &str) -> Metadata {
    let mut meta = extract_metadata(markdown, fallback_title);
    let saved = &article.metadata;
    meta.title = saved.title.clone();
    meta.author = meta.author.or_else(|| saved.author.clone());
    meta.author_name = meta.author_name.or_else(|| saved.author_name.clone());
    meta.author_username = meta.author_username.or_else(|| saved.author_username.clone());
    meta.url = meta.url.or_else(|| saved.url.clone());
    meta.date = meta.date.or_else(|| saved.date.clone());
    meta.tweet_id = meta.tweet_id.or_else(|| saved.tweet_id.clone());
    meta
}

fn image_paths(article: &LocalArticle) -> Vec<PathBuf> {
    article
        .images
        .iter()
        .map(|img| article.images_dir.join(&img.filename))
        .collect()
}

fn url_map(uploads: &[UploadResult]) -> ImageUrlMap {
    uploads
        .iter()
        .filter_map(|r| r.public_url().map(|url| (r.filename.clone(), url.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use PublishStage::*;

    #[test]
    fn full_path_with_upload() {
        let plan = StagePlan::new(true, 3);
        assert_eq!(
            PublishStage::path(plan),
            vec![MetadataLoaded, ImagesUploaded, BlocksConverted, PageCreated, PlaceholdersReconciled, Done]
        );
    }

    #[test]
    fn upload_stages_skipped_when_not_requested_or_no_images() {
        let expected = vec![MetadataLoaded, BlocksConverted, PageCreated, Done];
        assert_eq!(PublishStage::path(StagePlan::new(false, 3)), expected);
        assert_eq!(PublishStage::path(StagePlan::new(true, 0)), expected);
    }

    #[test]
    fn done_is_terminal() {
        assert_eq!(Done.next(StagePlan::new(true, 1)), None);
    }

    #[test]
    fn url_map_keeps_only_successes() {
        let map = url_map(&[
            UploadResult::uploaded("01.jpg", "https://cdn/01.jpg", "k/01.jpg"),
            UploadResult::failed("02.jpg", "boom"),
        ]);
        assert_eq!(map.len(), 1);
        assert_eq!(map["01.jpg"], "https://cdn/01.jpg");
    }
}
