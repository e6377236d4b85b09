//! # x2notion
//!
//! Save an X (Twitter) article as local Markdown with its images, and
//! optionally publish it as a Notion page with images relayed through a
//! Tencent COS bucket.
//!
//! ## Pipeline Overview
//!
//! ```text
//! article URL
//!  │
//!  ├─ 1. Extract   external extractor subprocess prints a Markdown path
//!  ├─ 2. Scan      front-matter + title, media references at original size
//!  ├─ 3. Save      images/NN.jpg downloaded one by one, article.md rewritten
//!  │               ── local output is complete here ──
//!  ├─ 4. Upload    (optional) images → COS, one public URL per file
//!  ├─ 5. Convert   Markdown body → Notion blocks (+ source / author trailer)
//!  ├─ 6. Create    page + blocks in chunks of 100, strictly in order
//!  └─ 7. Reconcile (optional) placeholder callouts patched into images
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use x2notion::{download_article, publish_to_notion, NotionConfig, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .notion(NotionConfig::from_env()?)
//!         .build()?;
//!     let article = download_article("https://x.com/someone/status/1234567890", &config).await?;
//!     eprintln!("saved {} images to {}", article.images.len(), article.output_dir.display());
//!
//!     let outcome = publish_to_notion(&article, &config).await?;
//!     println!("{}", outcome.page.url);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `x2notion` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! x2notion = { version = "0.1", default-features = false }
//! ```
//!
//! ## Testing without the network
//!
//! The two remote collaborators are traits, [`PageApi`] and [`ObjectStore`].
//! [`publish`] and [`attach_images`] take them as trait objects, so tests
//! can pass in-memory fakes.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod download;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod publish;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CosConfig, ExtractorCommand, NotionConfig, PipelineConfig, PipelineConfigBuilder, XAuth};
pub use download::{download_article, open_article, save_markdown, slugify};
pub use error::{ImageError, X2NotionError};
pub use output::{AttachOutcome, DownloadStats, LocalArticle, LocalImage, PublishOutcome, RemotePage, UploadResult};
pub use pipeline::blocks::{convert_body, convert_document, ContentBlock, ImageSource, ImageUrlMap, TextSegment};
pub use pipeline::cos::{CosClient, ObjectStore, StoredObject, TaskId};
pub use pipeline::frontmatter::{extract_metadata, Metadata};
pub use pipeline::images::{scan_image_references, ImageReference};
pub use pipeline::notion::{NewPage, NotionClient, PageApi, RemoteBlock, MAX_BLOCKS_PER_REQUEST};
pub use pipeline::reconcile::reconcile_placeholders;
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use publish::{
    attach_images, attach_images_to_notion, publish, publish_to_notion, PublishStage, StagePlan,
};
