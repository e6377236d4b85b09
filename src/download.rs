//! Local download: extract the article, save its images, write `article.md`.
//!
//! This half of the pipeline never talks to Notion or object storage, so a
//! later publish failure cannot undo it.

use crate::config::PipelineConfig;
use crate::error::X2NotionError;
use crate::output::{DownloadStats, LocalArticle, LocalImage};
use crate::pipeline::extract::run_extractor;
use crate::pipeline::fetch::{download_images, ImageFetcher};
use crate::pipeline::frontmatter::{extract_metadata, Metadata};
use crate::pipeline::images::{local_filename, rewrite_image_links, scan_image_references, LocalReplacement};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

static RE_SLUG_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s-]").unwrap());
static RE_SLUG_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_SLUG_DASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").unwrap());

const MAX_SLUG_CHARS: usize = 50;

/// Directory-safe form of a title: lowercase ASCII letters, digits and dashes.
///
/// Titles made only of other characters become `article`.
pub fn slugify(title: &str) -> String {
    let lower = title.to_lowercase();
    let stripped = RE_SLUG_STRIP.replace_all(&lower, "");
    let dashed = RE_SLUG_SPACE.replace_all(&stripped, "-");
    let collapsed = RE_SLUG_DASHES.replace_all(&dashed, "-");
    let slug: String = collapsed.chars().take(MAX_SLUG_CHARS).collect();
    if slug.trim_matches('-').is_empty() {
        "article".to_string()
    } else {
        slug
    }
}

/// Extract `url` and save it locally.
///
/// # Errors
/// Fatal only when extraction fails, the Markdown cannot be read, or the
/// output cannot be written. Individual image failures are recorded in
/// [`DownloadStats::failures`].
pub async fn download_article(url: &str, config: &PipelineConfig) -> Result<LocalArticle, X2NotionError> {
    let start = Instant::now();
    info!("Starting download: {}", url);

    let source_path = run_extractor(&config.extractor, url).await?;
    if let Some(cb) = &config.progress_callback {
        cb.on_extracted(&source_path.display().to_string());
    }
    let markdown = tokio::fs::read_to_string(&source_path)
        .await
        .map_err(|e| X2NotionError::ArticleReadFailed {
            path: source_path.clone(),
            source: e,
        })?;

    save_article(&markdown, url, config, start).await
}

/// Save an already extracted Markdown document.
///
/// Same as [`download_article`] minus the extractor run.
pub async fn save_markdown(markdown: &str, url: &str, config: &PipelineConfig) -> Result<LocalArticle, X2NotionError> {
    save_article(markdown, url, config, Instant::now()).await
}

/// Load an article directory written by an earlier run.
///
/// Images are every file under `{dir}/images`, sorted by name. Captions and
/// source URLs are not recoverable and are left empty.
pub async fn open_article(dir: &Path, config: &PipelineConfig) -> Result<LocalArticle, X2NotionError> {
    let markdown_path = dir.join("article.md");
    let markdown = tokio::fs::read_to_string(&markdown_path)
        .await
        .map_err(|e| X2NotionError::ArticleReadFailed {
            path: markdown_path.clone(),
            source: e,
        })?;
    let metadata = extract_metadata(&markdown, &config.fallback_title);

    let images_dir = dir.join("images");
    let mut names = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(&images_dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
    }
    names.sort();

    let images: Vec<LocalImage> = names
        .into_iter()
        .map(|filename| LocalImage {
            local_path: format!("images/{filename}"),
            filename,
            caption: String::new(),
            source_url: String::new(),
        })
        .collect();
    info!("Opened {} ({} images)", markdown_path.display(), images.len());

    Ok(LocalArticle {
        metadata,
        output_dir: dir.to_path_buf(),
        markdown_path,
        images_dir,
        stats: DownloadStats {
            images_found: images.len(),
            images_downloaded: images.len(),
            ..DownloadStats::default()
        },
        images,
    })
}

async fn save_article(
    markdown: &str,
    url: &str,
    config: &PipelineConfig,
    start: Instant,
) -> Result<LocalArticle, X2NotionError> {
    let metadata = with_defaults(extract_metadata(markdown, &config.fallback_title), url);
    let refs = scan_image_references(markdown);
    info!("Found {} images", refs.len());

    let output_dir = config
        .output_dir
        .clone()
        .unwrap_or_else(|| config.download_root.join(slugify(&metadata.title)));
    let images_dir = output_dir.join("images");
    tokio::fs::create_dir_all(&images_dir)
        .await
        .map_err(|e| X2NotionError::OutputWriteFailed {
            path: images_dir.clone(),
            source: e,
        })?;

    let fetcher = ImageFetcher::new(config)?;
    let (images, failures) =
        download_images(&fetcher, &refs, &images_dir, config.progress_callback.as_deref()).await;
    info!("Successfully downloaded: {}/{} images", images.len(), refs.len());
    if !failures.is_empty() {
        warn!("{} image(s) could not be downloaded", failures.len());
    }

    let replacements: HashMap<usize, LocalReplacement> = (0..refs.len())
        .filter_map(|i| {
            let filename = local_filename(i);
            images.iter().find(|img| img.filename == filename).map(|img| {
                (
                    i,
                    LocalReplacement {
                        local_path: img.local_path.clone(),
                        caption: img.caption.clone(),
                    },
                )
            })
        })
        .collect();
    let rewritten = rewrite_image_links(markdown, &replacements);

    let markdown_path = output_dir.join("article.md");
    write_atomic(&markdown_path, &rewritten).await?;
    info!("Saved: {}", markdown_path.display());

    Ok(LocalArticle {
        metadata,
        output_dir,
        markdown_path,
        images_dir,
        stats: DownloadStats {
            images_found: refs.len(),
            images_downloaded: images.len(),
            failures,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        images,
    })
}

fn with_defaults(mut meta: Metadata, url: &str) -> Metadata {
    if meta.url.as_deref().map_or(true, str::is_empty) {
        meta.url = Some(url.to_string());
    }
    if meta.date.as_deref().map_or(true, str::is_empty) {
        meta.date = Some(chrono::Utc::now().to_rfc3339());
    }
    meta
}

/// Write `contents` to a temp file beside `path`, then rename over it.
async fn write_atomic(path: &Path, contents: &str) -> Result<(), X2NotionError> {
    let write_failed = |e| X2NotionError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    let tmp_path: PathBuf = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_rules() {
        assert_eq!(slugify("Hello, World!  Again"), "hello-world-again");
        assert_eq!(slugify("a -- b"), "a-b");
        assert_eq!(slugify("你好"), "article");
        assert_eq!(slugify(&"x".repeat(80)).len(), 50);
    }

    #[test]
    fn defaults_fill_only_missing_fields() {
        let meta = with_defaults(
            Metadata {
                url: Some("https://x.com/a/status/9".into()),
                ..Metadata::default()
            },
            "https://x.com/requested",
        );
        assert_eq!(meta.url.as_deref(), Some("https://x.com/a/status/9"));
        assert!(meta.date.is_some());

        let meta = with_defaults(Metadata::default(), "https://x.com/requested");
        assert_eq!(meta.url.as_deref(), Some("https://x.com/requested"));
    }

    #[tokio::test]
    async fn article_without_images_is_written_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .output_dir(dir.path().join("out"))
            .build()
            .unwrap();
        let md = "---\nauthor_name: Ann\n---\n# Title\n\nBody\n";
        let article = save_markdown(md, "https://x.com/ann/status/5", &config).await.unwrap();

        assert_eq!(article.metadata.title, "Title");
        assert_eq!(article.metadata.author_name.as_deref(), Some("Ann"));
        assert!(article.images_dir.is_dir());
        assert_eq!(std::fs::read_to_string(&article.markdown_path).unwrap(), md);
        assert!(!article.output_dir.join("article.md.tmp").exists());
        assert_eq!(article.stats.images_found, 0);
    }

    #[tokio::test]
    async fn reopened_article_lists_images_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("article.md"), "# Saved\n\n![Image 1](images/01.jpg)\n").unwrap();
        std::fs::write(dir.path().join("images/02.jpg"), b"b").unwrap();
        std::fs::write(dir.path().join("images/01.jpg"), b"a").unwrap();

        let config = PipelineConfig::default();
        let article = open_article(dir.path(), &config).await.unwrap();
        assert_eq!(article.metadata.title, "Saved");
        let names: Vec<_> = article.images.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(names, ["01.jpg", "02.jpg"]);
    }

    #[tokio::test]
    async fn missing_article_is_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_article(dir.path(), &PipelineConfig::default()).await.unwrap_err();
        assert!(matches!(err, X2NotionError::ArticleReadFailed { .. }));
    }

    #[tokio::test]
    async fn default_directory_uses_slug() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder().download_root(dir.path()).build().unwrap();
        let article = save_markdown("# My First Post\n", "u", &config).await.unwrap();
        assert_eq!(article.output_dir, dir.path().join("my-first-post"));
    }
}
