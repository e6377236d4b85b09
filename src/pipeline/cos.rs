//! Image relay through Tencent Cloud Object Storage.
//!
//! Notion only accepts images by public URL, so local files are first PUT
//! into a bucket under `{base_folder}/{task_id}/{filename}`. The task ID
//! keeps unrelated runs from overwriting each other's `01.jpg`.
//!
//! Requests are signed with the COS v5 scheme: HMAC-SHA1 over a canonical
//! request string, with only the `host` header signed.

use crate::config::CosConfig;
use crate::error::ImageError;
use crate::output::UploadResult;
use crate::pipeline::frontmatter::Metadata;
use crate::progress::PipelineProgressCallback;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

type HmacSha1 = Hmac<Sha1>;

/// Characters left unescaped in COS canonical strings.
const COS_UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// How long a request signature stays valid.
const SIGNATURE_TTL_SECS: i64 = 3600;

/// Per-run namespace for uploaded objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive a task ID from article metadata.
    ///
    /// Priority: `tweet_id`, the last path segment of the source URL, the
    /// article date as `YYYYMMDDHHMMSS`, then the current time plus a random
    /// suffix.
    pub fn derive(meta: &Metadata) -> Self {
        Self::derive_at(meta, Utc::now())
    }

    fn derive_at(meta: &Metadata, now: DateTime<Utc>) -> Self {
        if let Some(id) = meta.tweet_id.as_deref().map(sanitize).filter(|s| !s.is_empty()) {
            return Self(id);
        }
        if let Some(seg) = meta.url.as_deref().and_then(last_url_segment) {
            return Self(seg);
        }
        if let Some(date) = meta.date.as_deref().and_then(parse_article_date) {
            return Self(date.format("%Y%m%d%H%M%S").to_string());
        }
        let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
        Self(format!("{}-{suffix}", now.format("%Y%m%d%H%M%S")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// RFC 3339 timestamps, naive `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS`
/// (taken as UTC), or a bare `YYYY-MM-DD` at midnight UTC.
fn parse_article_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

fn last_url_segment(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let seg = parsed.path_segments()?.filter(|s| !s.is_empty()).next_back()?;
    let seg = sanitize(seg);
    (!seg.is_empty()).then_some(seg)
}

/// Where an uploaded object ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub public_url: String,
    pub key: String,
}

/// Upload collaborator: makes a local file publicly reachable.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, local_path: &Path, filename: &str, task_id: &TaskId) -> Result<StoredObject, ImageError>;
}

/// [`ObjectStore`] backed by a COS bucket.
pub struct CosClient {
    config: CosConfig,
    client: reqwest::Client,
}

impl CosClient {
    pub fn new(config: CosConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// `Authorization` header value for a request signed at `now`.
    fn authorization(&self, method: &str, key: &str, now: i64) -> Result<String, String> {
        sign_request(&self.config, method, key, now)
    }
}

#[async_trait]
impl ObjectStore for CosClient {
    async fn put(&self, local_path: &Path, filename: &str, task_id: &TaskId) -> Result<StoredObject, ImageError> {
        let failed = |detail: String| ImageError::UploadFailed {
            filename: filename.to_string(),
            detail,
        };

        let key = self.config.object_key(task_id.as_str(), filename);
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|e| failed(format!("cannot read {}: {e}", local_path.display())))?;

        let auth = self
            .authorization("put", &key, Utc::now().timestamp())
            .map_err(failed)?;
        let encoded_key: Vec<String> = key
            .split('/')
            .map(|s| utf8_percent_encode(s, COS_UNRESERVED).to_string())
            .collect();
        let url = format!("https://{}/{}", self.config.host(), encoded_key.join("/"));

        debug!("PUT {}", url);
        let response = self
            .client
            .put(&url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .header(reqwest::header::CONTENT_TYPE, content_type(filename))
            .body(body)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(failed(format!("HTTP {status}: {}", text.trim())));
        }

        Ok(StoredObject {
            public_url: self.config.public_url(&key),
            key,
        })
    }
}

/// COS v5 signature with `host` as the only signed header.
pub(crate) fn sign_request(cfg: &CosConfig, method: &str, key: &str, now: i64) -> Result<String, String> {
    let key_time = format!("{};{}", now, now + SIGNATURE_TTL_SECS);
    let sign_key = hmac_sha1_hex(cfg.secret_key.as_bytes(), &key_time)?;

    let host = utf8_percent_encode(&cfg.host(), COS_UNRESERVED).to_string();
    let http_string = format!("{}\n/{}\n\nhost={}\n", method.to_ascii_lowercase(), key, host);
    let string_to_sign = format!("sha1\n{key_time}\n{}\n", hex::encode(Sha1::digest(http_string.as_bytes())));
    let signature = hmac_sha1_hex(sign_key.as_bytes(), &string_to_sign)?;

    Ok(format!(
        "q-sign-algorithm=sha1&q-ak={}&q-sign-time={key_time}&q-key-time={key_time}\
         &q-header-list=host&q-url-param-list=&q-signature={signature}",
        cfg.secret_id
    ))
}

fn hmac_sha1_hex(key: &[u8], msg: &str) -> Result<String, String> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|e| format!("HMAC key rejected: {e}"))?;
    mac.update(msg.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn content_type(filename: &str) -> &'static str {
    match filename.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Upload files one at a time, in order. Every file yields exactly one result.
pub async fn upload_images(
    store: &dyn ObjectStore,
    files: &[PathBuf],
    task_id: &TaskId,
    progress: Option<&dyn PipelineProgressCallback>,
) -> Vec<UploadResult> {
    info!("Uploading {} images (task {})", files.len(), task_id);
    let total = files.len();
    let mut results = Vec::with_capacity(total);

    for (i, path) in files.iter().enumerate() {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let result = match store.put(path, &filename, task_id).await {
            Ok(obj) => {
                info!("Uploaded {} → {}", filename, obj.public_url);
                UploadResult::uploaded(&filename, obj.public_url, obj.key)
            }
            Err(e) => {
                warn!("Upload failed: {}", e);
                UploadResult::failed(&filename, e.to_string())
            }
        };

        if let Some(cb) = progress {
            cb.on_image_uploaded(i + 1, total, &filename, result.error.as_deref());
        }
        results.push(result);
    }

    let ok = results.iter().filter(|r| r.success).count();
    info!("Upload complete: {}/{} images", ok, total);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cos() -> CosConfig {
        CosConfig::new("AKIDexample", "secret", "media-1250000000")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 8, 30, 0).unwrap()
    }

    #[test]
    fn task_id_prefers_tweet_id() {
        let meta = Metadata {
            tweet_id: Some("1879\"".into()),
            url: Some("https://x.com/a/status/42".into()),
            ..Metadata::default()
        };
        assert_eq!(TaskId::derive_at(&meta, now()).as_str(), "1879");
    }

    #[test]
    fn task_id_falls_back_to_url_segment() {
        let meta = Metadata {
            url: Some("https://x.com/a/status/42?s=20".into()),
            ..Metadata::default()
        };
        assert_eq!(TaskId::derive_at(&meta, now()).as_str(), "42");
    }

    #[test]
    fn task_id_uses_date_then_clock() {
        let dated = Metadata {
            date: Some("2025-01-02T03:04:05.678Z".into()),
            ..Metadata::default()
        };
        assert_eq!(TaskId::derive_at(&dated, now()).as_str(), "20250102030405");

        let id = TaskId::derive_at(&Metadata::default(), now());
        let (stamp, suffix) = id.as_str().split_once('-').unwrap();
        assert_eq!(stamp, "20261014083000");
        assert_eq!(suffix.len(), 8);
    }

    #[test]
    fn task_id_accepts_bare_and_naive_dates() {
        let bare = Metadata {
            date: Some("2025-01-02".into()),
            ..Metadata::default()
        };
        assert_eq!(TaskId::derive_at(&bare, now()).as_str(), "20250102000000");

        let naive = Metadata {
            date: Some("2025-01-02 03:04:05".into()),
            ..Metadata::default()
        };
        assert_eq!(TaskId::derive_at(&naive, now()).as_str(), "20250102030405");

        let junk = Metadata {
            date: Some("last tuesday".into()),
            ..Metadata::default()
        };
        assert!(TaskId::derive_at(&junk, now()).as_str().starts_with("20261014083000-"));
    }

    #[test]
    fn signature_shape_and_determinism() {
        let a = sign_request(&cos(), "PUT", "p/notion/42/01.jpg", 1_700_000_000).unwrap();
        let b = sign_request(&cos(), "put", "p/notion/42/01.jpg", 1_700_000_000).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("q-sign-algorithm=sha1&q-ak=AKIDexample&q-sign-time=1700000000;1700003600"));
        let sig = a.rsplit("q-signature=").next().unwrap();
        assert_eq!(sig.len(), 40);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));

        let other = sign_request(&cos(), "put", "p/notion/42/02.jpg", 1_700_000_000).unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn hmac_matches_rfc2202_vector() {
        // RFC 2202 test case 2.
        let mac = hmac_sha1_hex(b"Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(mac, "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79");
    }

    #[test]
    fn content_type_from_extension() {
        assert_eq!(content_type("01.jpg"), "image/jpeg");
        assert_eq!(content_type("a.PNG"), "image/png");
        assert_eq!(content_type("noext"), "image/jpeg");
    }

    struct FlakyStore;

    #[async_trait]
    impl ObjectStore for FlakyStore {
        async fn put(&self, _p: &Path, filename: &str, task_id: &TaskId) -> Result<StoredObject, ImageError> {
            if filename == "02.jpg" {
                return Err(ImageError::UploadFailed {
                    filename: filename.into(),
                    detail: "HTTP 403".into(),
                });
            }
            Ok(StoredObject {
                public_url: format!("https://cdn.test/{task_id}/{filename}"),
                key: format!("{task_id}/{filename}"),
            })
        }
    }

    #[tokio::test]
    async fn upload_images_reports_every_file_in_order() {
        let files: Vec<PathBuf> = ["01.jpg", "02.jpg", "03.jpg"]
            .iter()
            .map(|f| PathBuf::from("images").join(f))
            .collect();
        let results = upload_images(&FlakyStore, &files, &TaskId::new("t1"), None).await;

        let names: Vec<_> = results.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["01.jpg", "02.jpg", "03.jpg"]);
        assert!(results[0].success);
        assert_eq!(results[0].url.as_deref(), Some("https://cdn.test/t1/01.jpg"));
        assert!(!results[1].success);
        assert!(results[1].url.is_none());
        assert!(results[1].error.as_deref().unwrap().contains("403"));
        assert!(results[2].success);
    }
}
