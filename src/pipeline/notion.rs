//! Notion page API: page creation, chunked block submission, listing and patching.
//!
//! Notion accepts at most [`MAX_BLOCKS_PER_REQUEST`] children per request.
//! The first chunk travels with the page-creation call, later chunks are
//! appended one after another. Blocks are positional, so chunks are never
//! sent concurrently, and a failed chunk stops the run: chunks already
//! accepted stay on the page.

use crate::config::NotionConfig;
use crate::error::X2NotionError;
use crate::output::RemotePage;
use crate::pipeline::blocks::ContentBlock;
use crate::pipeline::frontmatter::Metadata;
use crate::progress::PipelineProgressCallback;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Remote limit on children per create/append request.
pub const MAX_BLOCKS_PER_REQUEST: usize = 100;

/// Title and database properties of a page to create.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPage {
    pub title: String,
    pub properties: Value,
}

impl NewPage {
    /// Properties for an article: `title`, plus `Author` and `Source URL`
    /// when the metadata has them.
    pub fn for_article(title: &str, meta: &Metadata) -> Self {
        let mut properties = json!({
            "title": { "title": [ { "text": { "content": title } } ] }
        });
        if let Some(name) = meta.author_name.as_deref().filter(|s| !s.is_empty()) {
            properties["Author"] = json!({
                "type": "rich_text",
                "rich_text": [ { "type": "text", "text": { "content": name } } ]
            });
        }
        if let Some(url) = meta.url.as_deref().filter(|s| !s.is_empty()) {
            properties["Source URL"] = json!({ "type": "url", "url": url });
        }
        Self {
            title: title.to_string(),
            properties,
        }
    }
}

/// A direct child block as returned by a listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBlock {
    pub id: String,
    /// Notion block type, e.g. `callout`.
    pub kind: String,
    /// Concatenated rich-text content; empty for blocks without text.
    pub text: String,
}

/// Page-creation collaborator.
#[async_trait]
pub trait PageApi: Send + Sync {
    /// Create the page with its first chunk of children.
    async fn create_page(&self, page: &NewPage, children: &[ContentBlock]) -> Result<RemotePage, X2NotionError>;

    /// Append children after the page's current last block.
    async fn append_children(&self, page_id: &str, children: &[ContentBlock]) -> Result<(), X2NotionError>;

    /// Direct children of the page, first result page only.
    async fn list_children(&self, page_id: &str) -> Result<Vec<RemoteBlock>, X2NotionError>;

    /// Replace a block's content in place.
    async fn patch_block(&self, block_id: &str, content: &ContentBlock) -> Result<(), X2NotionError>;
}

/// Create a page holding `blocks`, split into request-sized chunks.
///
/// Issues one create call plus one append per further chunk. An empty block
/// list still creates the page. Returns the page and the number of write calls.
pub async fn create_page_chunked(
    api: &dyn PageApi,
    page: &NewPage,
    blocks: &[ContentBlock],
    progress: Option<&dyn PipelineProgressCallback>,
) -> Result<(RemotePage, usize), X2NotionError> {
    let chunks: Vec<&[ContentBlock]> = if blocks.is_empty() {
        vec![&[]]
    } else {
        blocks.chunks(MAX_BLOCKS_PER_REQUEST).collect()
    };
    let total = chunks.len();
    info!("Creating page '{}': {} blocks in {} requests", page.title, blocks.len(), total);

    let created = api
        .create_page(page, chunks[0])
        .await
        .map_err(|e| chunk_failed(1, total, e))?;
    info!("Created page: {}", created.url);
    if let Some(cb) = progress {
        cb.on_chunk_submitted(1, total, chunks[0].len());
    }

    for (i, chunk) in chunks.iter().enumerate().skip(1) {
        api.append_children(&created.id, chunk)
            .await
            .map_err(|e| chunk_failed(i + 1, total, e))?;
        debug!("Added {} blocks (part {}/{})", chunk.len(), i + 1, total);
        if let Some(cb) = progress {
            cb.on_chunk_submitted(i + 1, total, chunk.len());
        }
    }

    Ok((created, total))
}

fn chunk_failed(chunk: usize, total: usize, source: X2NotionError) -> X2NotionError {
    X2NotionError::ChunkFailed {
        chunk,
        total,
        source: Box::new(source),
    }
}

/// Parse a `GET /blocks/{id}/children` response body.
///
/// Returns the blocks and the `has_more` flag.
pub fn parse_block_listing(body: &Value) -> (Vec<RemoteBlock>, bool) {
    let blocks = body["results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .filter_map(|b| {
                    let id = b["id"].as_str()?.to_string();
                    let kind = b["type"].as_str()?.to_string();
                    let text = b[kind.as_str()]["rich_text"]
                        .as_array()
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(|t| t["text"]["content"].as_str().or_else(|| t["plain_text"].as_str()))
                                .collect::<String>()
                        })
                        .unwrap_or_default();
                    Some(RemoteBlock { id, kind, text })
                })
                .collect()
        })
        .unwrap_or_default();
    (blocks, body["has_more"].as_bool().unwrap_or(false))
}

/// [`PageApi`] over the public Notion REST API.
pub struct NotionClient {
    config: NotionConfig,
    client: reqwest::Client,
}

impl NotionClient {
    pub fn new(config: NotionConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.config.api_base, path))
            .bearer_auth(&self.config.token)
            .header("Notion-Version", &self.config.notion_version)
    }

    async fn send(&self, operation: &str, req: reqwest::RequestBuilder) -> Result<Value, X2NotionError> {
        let response = req.send().await.map_err(|e| X2NotionError::http(operation, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(X2NotionError::RemoteApi {
                operation: operation.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| X2NotionError::http(operation, e))
    }
}

fn render(blocks: &[ContentBlock]) -> Vec<Value> {
    blocks.iter().map(ContentBlock::to_notion).collect()
}

#[async_trait]
impl PageApi for NotionClient {
    async fn create_page(&self, page: &NewPage, children: &[ContentBlock]) -> Result<RemotePage, X2NotionError> {
        let body = json!({
            "parent": { "type": "database_id", "database_id": self.config.database_id },
            "properties": page.properties,
            "children": render(children),
        });
        let value = self
            .send("Create page", self.request(reqwest::Method::POST, "/pages").json(&body))
            .await?;
        let id = value["id"]
            .as_str()
            .ok_or_else(|| X2NotionError::Internal("Create page response has no id".into()))?;
        Ok(RemotePage {
            id: id.to_string(),
            url: value["url"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn append_children(&self, page_id: &str, children: &[ContentBlock]) -> Result<(), X2NotionError> {
        let body = json!({ "children": render(children) });
        self.send(
            "Append blocks",
            self.request(reqwest::Method::PATCH, &format!("/blocks/{page_id}/children"))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn list_children(&self, page_id: &str) -> Result<Vec<RemoteBlock>, X2NotionError> {
        let value = self
            .send(
                "List blocks",
                self.request(reqwest::Method::GET, &format!("/blocks/{page_id}/children"))
                    .query(&[("page_size", "100")]),
            )
            .await?;
        let (blocks, has_more) = parse_block_listing(&value);
        if has_more {
            warn!(
                "Page {} has more than {} blocks; only the first {} are checked",
                page_id,
                blocks.len(),
                blocks.len()
            );
        }
        Ok(blocks)
    }

    async fn patch_block(&self, block_id: &str, content: &ContentBlock) -> Result<(), X2NotionError> {
        self.send(
            "Patch block",
            self.request(reqwest::Method::PATCH, &format!("/blocks/{block_id}"))
                .json(&content.to_patch()),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_properties_include_optional_fields() {
        let meta = Metadata {
            author_name: Some("Ann".into()),
            url: Some("https://x.com/ann/status/1".into()),
            ..Metadata::default()
        };
        let page = NewPage::for_article("Hello", &meta);
        assert_eq!(page.properties["title"]["title"][0]["text"]["content"], "Hello");
        assert_eq!(page.properties["Author"]["rich_text"][0]["text"]["content"], "Ann");
        assert_eq!(page.properties["Source URL"]["url"], "https://x.com/ann/status/1");

        let bare = NewPage::for_article("Hello", &Metadata::default());
        assert!(bare.properties.get("Author").is_none());
        assert!(bare.properties.get("Source URL").is_none());
    }

    #[test]
    fn listing_concatenates_rich_text() {
        let body = json!({
            "results": [
                {
                    "id": "b1",
                    "type": "callout",
                    "callout": { "rich_text": [
                        { "type": "text", "text": { "content": "⏳ Image placeholder: " } },
                        { "type": "text", "text": { "content": "01.jpg" } }
                    ] }
                },
                { "id": "b2", "type": "divider", "divider": {} },
                { "type": "paragraph" }
            ],
            "has_more": true
        });
        let (blocks, more) = parse_block_listing(&body);
        assert!(more);
        assert_eq!(blocks.len(), 2, "entries without an id are skipped");
        assert_eq!(blocks[0].text, "⏳ Image placeholder: 01.jpg");
        assert_eq!(blocks[1].kind, "divider");
        assert_eq!(blocks[1].text, "");
    }

    #[test]
    fn listing_tolerates_empty_body() {
        let (blocks, more) = parse_block_listing(&json!({}));
        assert!(blocks.is_empty());
        assert!(!more);
    }
}
