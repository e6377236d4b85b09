//! CLI binary for x2notion.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs the local download, then optionally publishes.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use x2notion::{
    attach_images_to_notion, download_article, open_article, publish_to_notion, LocalArticle,
    PipelineConfig, PipelineProgressCallback, ProgressCallback, PublishStage, XAuth,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a bar for the image download and upload
/// loops, status lines for everything else.
struct CliProgressCallback {
    /// Bar for the loop currently running, if any.
    bar: Mutex<Option<ProgressBar>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self { bar: Mutex::new(None) })
    }

    fn start_bar(&self, prefix: &str, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} images  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix(prefix.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        if let Some(old) = self.bar.lock().unwrap().replace(bar) {
            old.finish_and_clear();
        }
    }

    fn finish_bar(&self) {
        if let Some(bar) = self.bar.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }

    /// Print above the bar when one is active.
    fn line(&self, msg: String) {
        match self.bar.lock().unwrap().as_ref() {
            Some(bar) => bar.println(msg),
            None => eprintln!("{msg}"),
        }
    }

    fn item(&self, index: usize, total: usize, filename: &str, error: Option<&str>) {
        let msg = match error {
            None => format!("  {} {:<8} {}", green("✓"), filename, dim(&format!("{index}/{total}"))),
            Some(e) => format!("  {} {:<8} {}", red("✗"), filename, red(&truncate(e, 80))),
        };
        self.line(msg);
        if let Some(bar) = self.bar.lock().unwrap().as_ref() {
            bar.inc(1);
        }
        if index == total {
            self.finish_bar();
        }
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_extracted(&self, markdown_path: &str) {
        self.line(format!("  {} Extracted: {}", green("✓"), dim(markdown_path)));
    }

    fn on_downloads_start(&self, total: usize) {
        self.line(format!("{} {}", cyan("◆"), bold(&format!("Found {total} images"))));
        if total > 0 {
            self.start_bar("Downloading", total);
        }
    }

    fn on_image_downloaded(&self, index: usize, total: usize, filename: &str, error: Option<&str>) {
        self.item(index, total, filename, error);
    }

    fn on_stage(&self, stage: PublishStage) {
        if stage != PublishStage::Done {
            self.line(format!("{} {}", cyan("◆"), bold(stage.label())));
        }
    }

    fn on_image_uploaded(&self, index: usize, total: usize, filename: &str, error: Option<&str>) {
        if index == 1 {
            self.start_bar("Uploading", total);
        }
        self.item(index, total, filename, error);
    }

    fn on_chunk_submitted(&self, chunk: usize, total: usize, blocks: usize) {
        self.line(format!(
            "  {} Blocks part {}/{}  {}",
            green("✓"),
            chunk,
            total,
            dim(&format!("{blocks} blocks"))
        ));
    }

    fn on_placeholder_replaced(&self, filename: &str, _url: &str) {
        self.line(format!("  {} Placeholder {} → image", green("✓"), filename));
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Download to x-download/{article-title}/ only
  x2notion https://x.com/username/status/1234567890

  # Download and publish the text to Notion (images become placeholders)
  x2notion https://x.com/username/status/1234567890 --notion

  # Download and publish text + images (images relayed through Tencent COS)
  x2notion https://x.com/username/status/1234567890 --notion --upload-images

  # Custom output directory
  x2notion https://x.com/username/status/1234567890 -o ./my-article

  # Publish an article saved by an earlier run
  x2notion ./x-download/my-article --notion

  # Replace the placeholders on a page published without images
  x2notion ./x-download/my-article --page 0123456789abcdef0123456789abcdef

  # Show what would happen
  x2notion https://x.com/username/status/1234567890 --notion --dry-run

OUTPUT STRUCTURE:
  x-download/{article-title}/
    ├── article.md
    └── images/
        ├── 01.jpg
        ├── 02.jpg
        └── ...

ENVIRONMENT VARIABLES:
  NOTION_TOKEN              Notion integration token
  NOTION_DATABASE_ID        Target Notion database ID
  TENCENT_COS_SECRET_ID     COS API secret ID (--upload-images, --page)
  TENCENT_COS_SECRET_KEY    COS API secret key
  TENCENT_COS_BUCKET        Bucket name, e.g. media-1250000000
  TENCENT_COS_REGION        Bucket region (default: ap-guangzhou)
  TENCENT_COS_BASE_FOLDER   Key prefix (default: p/notion)
  TENCENT_COS_CDN_URL       Public CDN base URL in front of the bucket
  X2NOTION_EXTRACTOR        Extractor command line (default: x-to-markdown)
  X2NOTION_COOKIES          X cookies JSON file ({"cookieMap": {...}})
  RUST_LOG                  Override the log filter
"#;

/// Download X articles as Markdown with images, and publish them to Notion.
#[derive(Parser, Debug)]
#[command(
    name = "x2notion",
    version,
    about = "Download X articles as Markdown with images, and publish them to Notion",
    long_about = "Download an X article to a local Markdown file with its images, and optionally \
publish it as a Notion page. Images can be relayed through a Tencent COS bucket so they appear \
on the page; without it they are left as placeholders that --page can fill in later.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Article URL, or a directory saved by an earlier run.
    input: String,

    /// Custom output directory (default: x-download/{article-title}).
    #[arg(short, long, env = "X2NOTION_OUTPUT")]
    output: Option<PathBuf>,

    /// Publish to Notion after the local download.
    #[arg(long)]
    notion: bool,

    /// Upload images to Tencent COS and insert them into the Notion page.
    #[arg(long)]
    upload_images: bool,

    /// Download locally only (skip Notion, even if requested).
    #[arg(long)]
    local_only: bool,

    /// Print what would happen and exit without downloading.
    #[arg(long)]
    dry_run: bool,

    /// Upload images and replace the placeholders on this existing page.
    #[arg(long, value_name = "PAGE_ID")]
    page: Option<String>,

    /// Extractor command; the article URL is appended as its last argument.
    #[arg(long, env = "X2NOTION_EXTRACTOR", default_value = x2notion::config::DEFAULT_EXTRACTOR)]
    extractor: String,

    /// X cookies file used to authorise image downloads.
    #[arg(long, env = "X2NOTION_COOKIES")]
    cookies: Option<PathBuf>,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "X2NOTION_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Print the results as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress display.
    #[arg(long, env = "X2NOTION_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "X2NOTION_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "X2NOTION_QUIET")]
    quiet: bool,
}

impl Cli {
    fn publish_requested(&self) -> bool {
        self.notion && !self.local_only && self.page.is_none()
    }

    /// Target page for `--page`, unless `--local-only` overrides it.
    fn attach_page(&self) -> Option<&str> {
        self.page.as_deref().filter(|_| !self.local_only)
    }
}

/// Follow-up line for a publish whose image uploads did not all succeed.
fn upload_note(succeeded: usize, failed: usize) -> Option<String> {
    match (succeeded, failed) {
        (_, 0) => None,
        (0, n) => Some(format!(
            "all {n} image upload(s) failed; placeholders were left on the page (retry with --page)"
        )),
        (_, n) => Some(format!("{n} image(s) failed to upload and were left out")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs are redundant while the progress display runs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Dry run ──────────────────────────────────────────────────────────
    if cli.dry_run {
        let yes_no = |b: bool| if b { "YES" } else { "NO" };
        println!("[DRY RUN] Would download: {}", cli.input);
        println!(
            "[DRY RUN] Output directory: {}",
            cli.output
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "x-download/{article-title}".to_string())
        );
        println!("[DRY RUN] Notion upload: {}", yes_no(cli.publish_requested()));
        println!(
            "[DRY RUN] Image upload: {}",
            yes_no(!cli.local_only && (cli.upload_images || cli.page.is_some()))
        );
        if let Some(page) = cli.attach_page() {
            println!("[DRY RUN] Attach images to page: {page}");
        }
        println!("[DRY RUN] Exiting without downloading...");
        return Ok(());
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Stages 1-3: local article ────────────────────────────────────────
    let input_dir = Path::new(&cli.input);
    let article = if input_dir.join("article.md").is_file() {
        open_article(input_dir, &config)
            .await
            .context("Failed to open saved article")?
    } else {
        download_article(&cli.input, &config).await.context("Download failed")?
    };
    if !cli.quiet && !cli.json {
        print_local_summary(&article);
    }

    // ── Remote stages ────────────────────────────────────────────────────
    // A remote failure never discards the local result, so it warns and
    // exits zero.
    let mut remote = serde_json::Value::Null;
    if let Some(page_id) = cli.attach_page() {
        match attach_images_to_notion(page_id, &article, &config).await {
            Ok(outcome) => {
                if !cli.quiet && !cli.json {
                    let failed = outcome.uploads.iter().filter(|r| !r.success).count();
                    eprintln!(
                        "{} {} placeholder(s) replaced  ({} uploads, {} failed)",
                        if failed == 0 { green("✔") } else { yellow("⚠") },
                        bold(&outcome.placeholders_replaced.to_string()),
                        outcome.uploads.len(),
                        failed,
                    );
                }
                remote = serde_json::to_value(&outcome).context("Failed to serialise outcome")?;
            }
            Err(e) => report_remote_failure("Attaching images", &e),
        }
    } else if cli.publish_requested() {
        match publish_to_notion(&article, &config).await {
            Ok(outcome) => {
                if !cli.quiet && !cli.json {
                    let failed = outcome.uploads_failed();
                    eprintln!(
                        "{} Notion page: {}  {}",
                        if failed == 0 { green("✔") } else { yellow("⚠") },
                        bold(&outcome.page.url),
                        dim(&format!("{} blocks in {} requests", outcome.blocks, outcome.chunks)),
                    );
                    if let Some(note) = upload_note(outcome.uploads_succeeded(), failed) {
                        eprintln!("  {} {}", yellow("⚠"), note);
                    }
                }
                remote = serde_json::to_value(&outcome).context("Failed to serialise outcome")?;
            }
            Err(e) => report_remote_failure("Notion upload", &e),
        }
    } else if !cli.quiet && !cli.json {
        eprintln!("{}", dim("Notion upload skipped (use --notion to enable)"));
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&json!({ "article": article, "notion": remote }))
            .context("Failed to serialise output")?;
        println!("{json}");
    }

    Ok(())
}

fn report_remote_failure(what: &str, err: &x2notion::X2NotionError) {
    eprintln!("{} {} failed: {}", red("✘"), what, err);
    eprintln!("  Note: local files were saved successfully.");
}

fn print_local_summary(article: &LocalArticle) {
    let stats = &article.stats;
    eprintln!(
        "{} {}/{} images  {}ms  →  {}",
        if stats.failures.is_empty() { green("✔") } else { yellow("⚠") },
        stats.images_downloaded,
        stats.images_found,
        stats.duration_ms,
        bold(&article.output_dir.display().to_string()),
    );
    eprintln!("   {}", dim(&article.markdown_path.display().to_string()));
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .extractor(&cli.extractor)
        .http_timeout_secs(cli.timeout)
        .upload_images(cli.upload_images);

    if let Some(dir) = &cli.output {
        builder = builder.output_dir(dir);
    }
    if let Some(path) = &cli.cookies {
        match XAuth::load(path) {
            Ok(auth) => builder = builder.x_auth(auth),
            Err(e) => eprintln!("{} {}; image downloads may fail", yellow("⚠"), e),
        }
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_only_suppresses_page_attach() {
        let cli = Cli::parse_from(["x2notion", "saved/", "--page", "abc", "--local-only"]);
        assert_eq!(cli.attach_page(), None);
        assert!(!cli.publish_requested());

        let cli = Cli::parse_from(["x2notion", "saved/", "--page", "abc"]);
        assert_eq!(cli.attach_page(), Some("abc"));
    }

    #[test]
    fn local_only_suppresses_publish() {
        let cli = Cli::parse_from(["x2notion", "https://x.com/a/status/1", "--notion", "--local-only"]);
        assert!(!cli.publish_requested());
        let cli = Cli::parse_from(["x2notion", "https://x.com/a/status/1", "--notion"]);
        assert!(cli.publish_requested());
    }

    #[test]
    fn upload_note_distinguishes_total_failure() {
        assert_eq!(upload_note(3, 0), None);
        assert_eq!(upload_note(0, 0), None);
        assert!(upload_note(2, 1).unwrap().contains("left out"));
        let all_failed = upload_note(0, 2).unwrap();
        assert!(all_failed.contains("placeholders"));
        assert!(!all_failed.contains("left out"));
    }
}
