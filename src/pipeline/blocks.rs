//! Markdown → Notion block conversion.
//!
//! A single left-to-right pass over the body lines. Each non-blank line
//! becomes at most one block, dispatched on its prefix (first match wins):
//!
//! | Prefix            | Block                          |
//! |-------------------|--------------------------------|
//! | `### `            | heading 3                      |
//! | `## `             | heading 2                      |
//! | `# `              | heading 1                      |
//! | `![cap](path)`    | image, placeholder, or nothing |
//! | `- `              | bulleted list item             |
//! | `N. `             | numbered list item             |
//! | ```` ``` ````     | code block up to closing fence |
//! | anything else     | paragraph (the raw line)       |
//!
//! Blocks are emitted in document order and never reordered: page creation
//! is positional.

use crate::pipeline::frontmatter::{strip_front_matter, Metadata};
use crate::pipeline::images::image_name;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::warn;

/// Local image filename → public URL, for successful uploads only.
///
/// An empty map means no upload was attempted; a missing key in a non-empty
/// map means that particular image failed.
pub type ImageUrlMap = HashMap<String, String>;

/// Text every placeholder callout carries ahead of the image filename.
pub const PLACEHOLDER_MARKER: &str = "Image placeholder:";

/// Notion rejects rich-text items longer than this many characters.
pub const MAX_RICH_TEXT_CHARS: usize = 2000;

static RE_IMAGE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").unwrap());
static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*-\s+(.*)$").unwrap());
static RE_NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+\.\s+(.*)$").unwrap());

/// A run of text, optionally hyperlinked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSegment {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl TextSegment {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            link: None,
        }
    }

    pub fn linked(content: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            link: Some(url.into()),
        }
    }
}

/// Where an image block's pixels come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    /// A publicly reachable URL.
    External { url: String },
    /// Not uploaded yet; rendered as a callout naming the file so it can be
    /// found and patched later.
    Placeholder { filename: String },
}

/// One typed block of page content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Heading { level: u8, text: String },
    Paragraph { text: String },
    BulletedListItem { text: String },
    NumberedListItem { text: String },
    Code { text: String, language: String },
    Image { source: ImageSource },
    Callout { icon: String, segments: Vec<TextSegment> },
    Divider,
}

impl ContentBlock {
    /// Heading with the level clamped to 1–3.
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        ContentBlock::Heading {
            level: level.clamp(1, 3),
            text: text.into(),
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        ContentBlock::Paragraph { text: text.into() }
    }

    pub fn external_image(url: impl Into<String>) -> Self {
        ContentBlock::Image {
            source: ImageSource::External { url: url.into() },
        }
    }

    pub fn placeholder(filename: impl Into<String>) -> Self {
        ContentBlock::Image {
            source: ImageSource::Placeholder {
                filename: filename.into(),
            },
        }
    }

    /// Filename carried by a placeholder block.
    pub fn placeholder_filename(&self) -> Option<&str> {
        match self {
            ContentBlock::Image {
                source: ImageSource::Placeholder { filename },
            } => Some(filename),
            _ => None,
        }
    }

    /// Block type as named by the Notion API.
    pub fn notion_type(&self) -> &'static str {
        match self {
            ContentBlock::Heading { level: 1, .. } => "heading_1",
            ContentBlock::Heading { level: 2, .. } => "heading_2",
            ContentBlock::Heading { .. } => "heading_3",
            ContentBlock::Paragraph { .. } => "paragraph",
            ContentBlock::BulletedListItem { .. } => "bulleted_list_item",
            ContentBlock::NumberedListItem { .. } => "numbered_list_item",
            ContentBlock::Code { .. } => "code",
            ContentBlock::Image {
                source: ImageSource::External { .. },
            } => "image",
            ContentBlock::Image {
                source: ImageSource::Placeholder { .. },
            }
            | ContentBlock::Callout { .. } => "callout",
            ContentBlock::Divider => "divider",
        }
    }

    /// Full block object for page creation or `append children`.
    pub fn to_notion(&self) -> Value {
        let kind = self.notion_type();
        let mut obj = Map::new();
        obj.insert("object".into(), json!("block"));
        obj.insert("type".into(), json!(kind));
        obj.insert(kind.into(), self.notion_body());
        Value::Object(obj)
    }

    /// Body for `PATCH /blocks/{id}`: only the type-keyed content.
    pub fn to_patch(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(self.notion_type().into(), self.notion_body());
        Value::Object(obj)
    }

    fn notion_body(&self) -> Value {
        match self {
            ContentBlock::Heading { text, .. }
            | ContentBlock::Paragraph { text }
            | ContentBlock::BulletedListItem { text }
            | ContentBlock::NumberedListItem { text } => {
                json!({ "rich_text": rich_text(&[TextSegment::plain(text.as_str())]) })
            }
            ContentBlock::Code { text, language } => json!({
                "rich_text": rich_text(&[TextSegment::plain(text.as_str())]),
                "language": language,
            }),
            ContentBlock::Image {
                source: ImageSource::External { url },
            } => json!({ "type": "external", "external": { "url": url } }),
            ContentBlock::Image {
                source: ImageSource::Placeholder { filename },
            } => json!({
                "rich_text": rich_text(&placeholder_segments(filename)),
                "icon": { "emoji": "🖼️" },
            }),
            ContentBlock::Callout { icon, segments } => json!({
                "rich_text": rich_text(segments),
                "icon": { "emoji": icon },
            }),
            ContentBlock::Divider => json!({}),
        }
    }
}

fn placeholder_segments(filename: &str) -> [TextSegment; 3] {
    [
        TextSegment::plain(format!("⏳ {PLACEHOLDER_MARKER} ")),
        TextSegment::plain(filename),
        TextSegment::plain(" (replaced once the image is uploaded)"),
    ]
}

/// Render segments as Notion rich text, splitting over-long content.
fn rich_text(segments: &[TextSegment]) -> Value {
    let items: Vec<Value> = segments
        .iter()
        .flat_map(|seg| {
            split_chars(&seg.content, MAX_RICH_TEXT_CHARS)
                .into_iter()
                .map(move |part| {
                    let mut text = json!({ "content": part });
                    if let Some(url) = &seg.link {
                        text["link"] = json!({ "url": url });
                    }
                    json!({ "type": "text", "text": text })
                })
        })
        .collect();
    Value::Array(items)
}

/// Split at character boundaries into pieces of at most `max` chars.
/// Always yields at least one (possibly empty) piece.
fn split_chars(s: &str, max: usize) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in s.char_indices() {
        if count == max {
            parts.push(&s[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    parts.push(&s[start..]);
    parts
}

// ── Conversion ───────────────────────────────────────────────────────────

/// Convert a front-matter-free Markdown body into blocks.
///
/// Image lines resolve against `image_urls`:
/// * name present → image block with the uploaded URL;
/// * map non-empty but name absent → dropped, so a failed upload never
///   leaves a broken image on the page;
/// * map empty → placeholder carrying the filename.
pub fn convert_body(body: &str, image_urls: &ImageUrlMap) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    let mut lines = body.lines();

    while let Some(line) = lines.next() {
        if line.trim().is_empty() {
            continue;
        }

        if let Some(text) = line.strip_prefix("### ") {
            blocks.push(ContentBlock::heading(3, text));
        } else if let Some(text) = line.strip_prefix("## ") {
            blocks.push(ContentBlock::heading(2, text));
        } else if let Some(text) = line.strip_prefix("# ") {
            blocks.push(ContentBlock::heading(1, text));
        } else if let Some((_caption, path)) = image_line(line) {
            let name = image_name(path);
            if let Some(url) = image_urls.get(name) {
                blocks.push(ContentBlock::external_image(url.as_str()));
            } else if !image_urls.is_empty() {
                warn!("Skipping {} (upload failed or not in image map)", name);
            } else {
                blocks.push(ContentBlock::placeholder(name));
            }
        } else if let Some(caps) = RE_BULLET.captures(line) {
            blocks.push(ContentBlock::BulletedListItem {
                text: caps[1].to_string(),
            });
        } else if let Some(caps) = RE_NUMBERED.captures(line) {
            blocks.push(ContentBlock::NumberedListItem {
                text: caps[1].to_string(),
            });
        } else if let Some(info) = line.strip_prefix("```") {
            let mut code = String::new();
            for inner in lines.by_ref() {
                if inner.starts_with("```") {
                    break;
                }
                code.push_str(inner);
                code.push('\n');
            }
            blocks.push(ContentBlock::Code {
                text: code.trim().to_string(),
                language: notion_language(info).to_string(),
            });
        } else {
            blocks.push(ContentBlock::paragraph(line));
        }
    }

    blocks
}

/// Closing blocks derived from metadata: a divider plus source link when the
/// article URL is known, then the author when `author_name` is known.
pub fn trailing_blocks(metadata: &Metadata) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    if let Some(url) = metadata.url.as_deref().filter(|u| !u.is_empty()) {
        blocks.push(ContentBlock::Divider);
        blocks.push(ContentBlock::Callout {
            icon: "🔗".into(),
            segments: vec![TextSegment::plain("📎 Source: "), TextSegment::linked(url, url)],
        });
    }
    if let Some(name) = metadata.author_name.as_deref().filter(|n| !n.is_empty()) {
        blocks.push(ContentBlock::Callout {
            icon: "👤".into(),
            segments: vec![TextSegment::plain("Author: "), TextSegment::plain(name)],
        });
    }
    blocks
}

/// Convert a whole article (front-matter included) and append the trailer.
pub fn convert_document(markdown: &str, image_urls: &ImageUrlMap, metadata: &Metadata) -> Vec<ContentBlock> {
    let mut blocks = convert_body(strip_front_matter(markdown), image_urls);
    blocks.extend(trailing_blocks(metadata));
    blocks
}

fn image_line(line: &str) -> Option<(&str, &str)> {
    if !line.starts_with("![") {
        return None;
    }
    let caps = RE_IMAGE_LINE.captures(line)?;
    let caption = caps.get(1)?.as_str();
    let path = caps.get(2)?.as_str();
    Some((caption, path))
}

/// Map a fence info string onto a language Notion accepts.
fn notion_language(info: &str) -> &'static str {
    let tag = info.split_whitespace().next().unwrap_or("").to_ascii_lowercase();
    match tag.as_str() {
        "js" | "javascript" | "jsx" | "mjs" => "javascript",
        "ts" | "typescript" | "tsx" => "typescript",
        "py" | "python" => "python",
        "rs" | "rust" => "rust",
        "sh" | "shell" | "zsh" => "shell",
        "bash" => "bash",
        "go" | "golang" => "go",
        "java" => "java",
        "kotlin" | "kt" => "kotlin",
        "swift" => "swift",
        "c" => "c",
        "cpp" | "c++" | "cc" => "c++",
        "cs" | "csharp" | "c#" => "c#",
        "rb" | "ruby" => "ruby",
        "php" => "php",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "xml" => "xml",
        "sql" => "sql",
        "md" | "markdown" => "markdown",
        "diff" | "patch" => "diff",
        "dockerfile" | "docker" => "docker",
        "graphql" | "gql" => "graphql",
        "lua" => "lua",
        "haskell" | "hs" => "haskell",
        "scala" => "scala",
        "elixir" | "ex" => "elixir",
        "dart" => "dart",
        "mermaid" => "mermaid",
        "powershell" | "ps1" => "powershell",
        _ => "plain text",
    }
}
