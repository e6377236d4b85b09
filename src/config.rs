//! Configuration types for the download and publish pipeline.
//!
//! All run behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Remote-service credentials live in their own
//! immutable values ([`NotionConfig`], [`CosConfig`]) that are constructed
//! once and handed to the collaborators that need them. Nothing here reads
//! process-wide state after construction.

use crate::error::X2NotionError;
use crate::progress::ProgressCallback;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default extractor program. The article URL is appended as its last argument.
pub const DEFAULT_EXTRACTOR: &str = "x-to-markdown";

/// Title used when the article has no top-level heading.
pub const DEFAULT_FALLBACK_TITLE: &str = "X Article";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Configuration for one download (and optional publish) run.
///
/// # Example
/// ```rust
/// use x2notion::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .output_dir("./my-article")
///     .extractor("npx -y bun ./x-to-markdown/main.ts")
///     .http_timeout_secs(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.extractor.program, "npx");
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Final article directory. When `None`, `{download_root}/{slug}` is used.
    pub output_dir: Option<PathBuf>,

    /// Parent of the per-article directories. Default: `x-download`.
    pub download_root: PathBuf,

    /// External content extractor invoked with the article URL.
    pub extractor: ExtractorCommand,

    /// Title used when the Markdown has no `# ` heading. Default: `X Article`.
    pub fallback_title: String,

    /// User-Agent sent with image downloads.
    pub user_agent: String,

    /// Optional X session credentials forwarded on image downloads.
    pub x_auth: Option<XAuth>,

    /// Per-request HTTP timeout in seconds, applied to every client. Default: 120.
    pub http_timeout_secs: u64,

    /// Relay images through object storage when publishing. Default: false.
    pub upload_images: bool,

    /// Notion credentials; required only by the publish stage.
    pub notion: Option<NotionConfig>,

    /// Object-storage credentials; required only when `upload_images` is set.
    pub cos: Option<CosConfig>,

    /// Receives per-stage and per-image events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            download_root: PathBuf::from("x-download"),
            extractor: ExtractorCommand::new(DEFAULT_EXTRACTOR),
            fallback_title: DEFAULT_FALLBACK_TITLE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            x_auth: None,
            http_timeout_secs: 120,
            upload_images: false,
            notion: None,
            cos: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("output_dir", &self.output_dir)
            .field("download_root", &self.download_root)
            .field("extractor", &self.extractor)
            .field("fallback_title", &self.fallback_title)
            .field("x_auth", &self.x_auth)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("upload_images", &self.upload_images)
            .field("notion", &self.notion)
            .field("cos", &self.cos)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build a `reqwest::Client` honouring the configured timeout.
    pub(crate) fn http_client(&self) -> Result<reqwest::Client, X2NotionError> {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.http_timeout_secs))
            .build()
            .map_err(|e| X2NotionError::Internal(format!("Failed to build HTTP client: {e}")))
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn download_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.download_root = dir.into();
        self
    }

    /// Set the extractor from a whitespace-separated command line.
    pub fn extractor(mut self, command_line: &str) -> Self {
        if let Some(cmd) = ExtractorCommand::parse(command_line) {
            self.config.extractor = cmd;
        }
        self
    }

    pub fn extractor_command(mut self, cmd: ExtractorCommand) -> Self {
        self.config.extractor = cmd;
        self
    }

    pub fn fallback_title(mut self, title: impl Into<String>) -> Self {
        self.config.fallback_title = title.into();
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn x_auth(mut self, auth: XAuth) -> Self {
        self.config.x_auth = Some(auth);
        self
    }

    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.config.http_timeout_secs = secs;
        self
    }

    pub fn upload_images(mut self, v: bool) -> Self {
        self.config.upload_images = v;
        self
    }

    pub fn notion(mut self, notion: NotionConfig) -> Self {
        self.config.notion = Some(notion);
        self
    }

    pub fn cos(mut self, cos: CosConfig) -> Self {
        self.config.cos = Some(cos);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, X2NotionError> {
        let c = &self.config;
        if c.extractor.program.trim().is_empty() {
            return Err(X2NotionError::InvalidConfig(
                "Extractor program must not be empty".into(),
            ));
        }
        if c.http_timeout_secs == 0 {
            return Err(X2NotionError::InvalidConfig(
                "HTTP timeout must be ≥ 1 second".into(),
            ));
        }
        if c.fallback_title.trim().is_empty() {
            return Err(X2NotionError::InvalidConfig(
                "Fallback title must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Extractor ────────────────────────────────────────────────────────────

/// Program and leading arguments of the content extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ExtractorCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Split a command line on whitespace. Returns `None` for a blank line.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

// ── X session ────────────────────────────────────────────────────────────

/// X session cookies used to authorise media downloads.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct XAuth {
    pub auth_token: Option<String>,
    pub ct0: Option<String>,
}

impl fmt::Debug for XAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XAuth")
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("ct0", &self.ct0.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Deserialize)]
struct CookieFile {
    #[serde(rename = "cookieMap", default)]
    cookie_map: std::collections::HashMap<String, String>,
}

impl XAuth {
    /// Parse a cookies file of the form `{ "cookieMap": { "auth_token": …, "ct0": … } }`.
    pub fn from_cookie_json(json: &str) -> Result<Self, X2NotionError> {
        let file: CookieFile = serde_json::from_str(json)
            .map_err(|e| X2NotionError::InvalidConfig(format!("Invalid cookies file: {e}")))?;
        Ok(Self {
            auth_token: file.cookie_map.get("auth_token").cloned(),
            ct0: file.cookie_map.get("ct0").cloned(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, X2NotionError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            X2NotionError::InvalidConfig(format!("Cannot read cookies file {}: {e}", path.display()))
        })?;
        Self::from_cookie_json(&json)
    }

    pub fn is_empty(&self) -> bool {
        self.auth_token.is_none() && self.ct0.is_none()
    }
}

// ── Notion ───────────────────────────────────────────────────────────────

/// Credentials and endpoint for the Notion API.
#[derive(Clone)]
pub struct NotionConfig {
    pub token: String,
    pub database_id: String,
    /// Default: `https://api.notion.com/v1`.
    pub api_base: String,
    /// Value of the `Notion-Version` header. Default: `2022-06-28`.
    pub notion_version: String,
}

impl fmt::Debug for NotionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionConfig")
            .field("token", &"<redacted>")
            .field("database_id", &self.database_id)
            .field("api_base", &self.api_base)
            .field("notion_version", &self.notion_version)
            .finish()
    }
}

impl NotionConfig {
    pub fn new(token: impl Into<String>, database_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            database_id: database_id.into(),
            api_base: "https://api.notion.com/v1".to_string(),
            notion_version: "2022-06-28".to_string(),
        }
    }

    /// Read `NOTION_TOKEN` and `NOTION_DATABASE_ID`.
    pub fn from_env() -> Result<Self, X2NotionError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, X2NotionError> {
        let token = required(&get, "NOTION_TOKEN", "Create an integration at https://www.notion.so/my-integrations and export NOTION_TOKEN=secret_...")?;
        let database_id = required(
            &get,
            "NOTION_DATABASE_ID",
            "Open the target database, copy its URL and export the 32-character ID as NOTION_DATABASE_ID.",
        )?;
        Ok(Self::new(token, database_id))
    }
}

// ── Object storage ───────────────────────────────────────────────────────

/// Tencent COS bucket used to relay images to a public URL.
#[derive(Clone)]
pub struct CosConfig {
    pub secret_id: String,
    pub secret_key: String,
    pub bucket: String,
    /// Default: `ap-guangzhou`.
    pub region: String,
    /// Key prefix. Default: `p/notion`.
    pub base_folder: String,
    /// Public base URL of a CDN in front of the bucket.
    pub cdn_url: Option<String>,
}

impl fmt::Debug for CosConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CosConfig")
            .field("secret_id", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("base_folder", &self.base_folder)
            .field("cdn_url", &self.cdn_url)
            .finish()
    }
}

impl CosConfig {
    pub fn new(
        secret_id: impl Into<String>,
        secret_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
            bucket: bucket.into(),
            region: "ap-guangzhou".to_string(),
            base_folder: "p/notion".to_string(),
            cdn_url: None,
        }
    }

    /// Read the `TENCENT_COS_*` variables.
    pub fn from_env() -> Result<Self, X2NotionError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, X2NotionError> {
        let hint = "Set TENCENT_COS_SECRET_ID, TENCENT_COS_SECRET_KEY and TENCENT_COS_BUCKET.";
        let mut cfg = Self::new(
            required(&get, "TENCENT_COS_SECRET_ID", hint)?,
            required(&get, "TENCENT_COS_SECRET_KEY", hint)?,
            required(&get, "TENCENT_COS_BUCKET", hint)?,
        );
        if let Some(region) = non_empty(&get, "TENCENT_COS_REGION") {
            cfg.region = region;
        }
        if let Some(folder) = non_empty(&get, "TENCENT_COS_BASE_FOLDER") {
            cfg.base_folder = folder.trim_matches('/').to_string();
        }
        cfg.cdn_url = non_empty(&get, "TENCENT_COS_CDN_URL").map(|u| u.trim_end_matches('/').to_string());
        Ok(cfg)
    }

    /// Object key for `filename` under this run's task folder.
    pub fn object_key(&self, task_id: &str, filename: &str) -> String {
        if self.base_folder.is_empty() {
            format!("{task_id}/{filename}")
        } else {
            format!("{}/{task_id}/{filename}", self.base_folder)
        }
    }

    pub fn host(&self) -> String {
        format!("{}.cos.{}.myqcloud.com", self.bucket, self.region)
    }

    /// Public URL for `key`: the CDN when configured, else the bucket endpoint.
    pub fn public_url(&self, key: &str) -> String {
        match &self.cdn_url {
            Some(cdn) => format!("{cdn}/{key}"),
            None => format!("https://{}/{key}", self.host()),
        }
    }
}

fn non_empty(get: &impl Fn(&str) -> Option<String>, var: &str) -> Option<String> {
    get(var).filter(|v| !v.trim().is_empty())
}

fn required(
    get: &impl Fn(&str) -> Option<String>,
    var: &str,
    hint: &str,
) -> Result<String, X2NotionError> {
    non_empty(get, var).ok_or_else(|| X2NotionError::AuthConfigurationMissing {
        variable: var.to_string(),
        hint: hint.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn builder_defaults() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.download_root, PathBuf::from("x-download"));
        assert_eq!(config.extractor.program, DEFAULT_EXTRACTOR);
        assert_eq!(config.fallback_title, "X Article");
        assert!(!config.upload_images);
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = PipelineConfig::builder().http_timeout_secs(0).build().unwrap_err();
        assert!(matches!(err, X2NotionError::InvalidConfig(_)));
    }

    #[test]
    fn extractor_parse_splits_args() {
        let cmd = ExtractorCommand::parse("npx -y bun main.ts").unwrap();
        assert_eq!(cmd.program, "npx");
        assert_eq!(cmd.args, vec!["-y", "bun", "main.ts"]);
        assert!(ExtractorCommand::parse("   ").is_none());
    }

    #[test]
    fn cookie_file_parsing() {
        let auth = XAuth::from_cookie_json(r#"{"cookieMap":{"auth_token":"abc","ct0":"xyz","other":"1"}}"#)
            .unwrap();
        assert_eq!(auth.auth_token.as_deref(), Some("abc"));
        assert_eq!(auth.ct0.as_deref(), Some("xyz"));
        assert!(!format!("{auth:?}").contains("abc"));
        assert!(XAuth::from_cookie_json("{}").unwrap().is_empty());
    }

    #[test]
    fn notion_from_env_requires_token() {
        let err = NotionConfig::from_lookup(env(&[("NOTION_DATABASE_ID", "db")])).unwrap_err();
        match err {
            X2NotionError::AuthConfigurationMissing { variable, .. } => {
                assert_eq!(variable, "NOTION_TOKEN")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn cos_from_env_applies_defaults() {
        let cos = CosConfig::from_lookup(env(&[
            ("TENCENT_COS_SECRET_ID", "id"),
            ("TENCENT_COS_SECRET_KEY", "s3cr3t"),
            ("TENCENT_COS_BUCKET", "media-1250000000"),
        ]))
        .unwrap();
        assert_eq!(cos.region, "ap-guangzhou");
        assert_eq!(cos.object_key("1234", "01.jpg"), "p/notion/1234/01.jpg");
        assert_eq!(
            cos.public_url("p/notion/1234/01.jpg"),
            "https://media-1250000000.cos.ap-guangzhou.myqcloud.com/p/notion/1234/01.jpg"
        );
        assert!(!format!("{cos:?}").contains("s3cr3t"));
    }

    #[test]
    fn cos_public_url_prefers_cdn() {
        let cos = CosConfig::from_lookup(env(&[
            ("TENCENT_COS_SECRET_ID", "id"),
            ("TENCENT_COS_SECRET_KEY", "key"),
            ("TENCENT_COS_BUCKET", "b"),
            ("TENCENT_COS_CDN_URL", "https://img.example.com/"),
        ]))
        .unwrap();
        assert_eq!(cos.public_url("p/notion/t/01.jpg"), "https://img.example.com/p/notion/t/01.jpg");
    }
}
