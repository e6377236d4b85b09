//! Metadata extraction from the article's front-matter and first heading.
//!
//! The extractor writes a `---` delimited block of `key: value` lines at the
//! top of the Markdown. Values are plain strings, optionally wrapped in
//! double quotes. Only the first line may open the block; a block that is
//! never closed runs to the end of the document.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DELIMITER: &str = "---";

static RE_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w+):\s*(.*)$").unwrap());

/// Ordered `key: value` pairs from a front-matter block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    pub fields: Vec<(String, String)>,
}

impl FrontMatter {
    /// First value recorded for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Flat metadata record for one article.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    pub author: Option<String>,
    pub author_name: Option<String>,
    pub author_username: Option<String>,
    pub url: Option<String>,
    pub date: Option<String>,
    pub tweet_id: Option<String>,
    /// Front-matter keys without a dedicated field, passed through unmodified.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Split `text` into its front-matter (if the first line is `---`) and body.
///
/// The returned body starts on the line after the closing delimiter. With no
/// closing delimiter the whole remainder is front-matter and the body is empty.
pub fn split_front_matter(text: &str) -> (Option<FrontMatter>, &str) {
    let mut lines = text.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return (None, text);
    };
    if trim_eol(first) != DELIMITER {
        return (None, text);
    }

    let mut fields = Vec::new();
    let mut offset = first.len();
    for line in lines {
        offset += line.len();
        let line = trim_eol(line);
        if line == DELIMITER {
            return (Some(FrontMatter { fields }), &text[offset..]);
        }
        if let Some(field) = parse_field(line) {
            fields.push(field);
        }
    }

    (Some(FrontMatter { fields }), "")
}

/// Body of `text` with any front-matter removed.
pub fn strip_front_matter(text: &str) -> &str {
    split_front_matter(text).1
}

/// Build the metadata record for `text`.
///
/// Title resolution: the first `# ` heading of the body, else a `title`
/// front-matter key, else `fallback_title`.
pub fn extract_metadata(text: &str, fallback_title: &str) -> Metadata {
    let (front, body) = split_front_matter(text);
    let mut meta = Metadata::default();
    let mut fm_title = None;

    for (key, value) in front.map(|f| f.fields).unwrap_or_default() {
        match key.as_str() {
            "title" => fm_title = Some(value),
            "author" => meta.author = Some(value),
            "author_name" => meta.author_name = Some(value),
            "author_username" => meta.author_username = Some(value),
            "url" => meta.url = Some(value),
            "date" => meta.date = Some(value),
            "tweet_id" => meta.tweet_id = Some(value),
            _ => {
                meta.extra.entry(key).or_insert(value);
            }
        }
    }

    meta.title = first_heading(body)
        .map(str::to_string)
        .or(fm_title)
        .unwrap_or_else(|| fallback_title.to_string());
    meta
}

/// Text of the first top-level (`# `) heading.
pub fn first_heading(body: &str) -> Option<&str> {
    body.lines()
        .find_map(|l| l.strip_prefix("# "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn parse_field(line: &str) -> Option<(String, String)> {
    let caps = RE_FIELD.captures(line)?;
    let value = caps[2].trim_end();
    let value = value.strip_prefix('"').unwrap_or(value);
    let value = value.strip_suffix('"').unwrap_or(value);
    Some((caps[1].to_string(), value.to_string()))
}

fn trim_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = "---\n\
url: https://x.com/jack/status/20\n\
author: \"jack (@jack)\"\n\
author_name: jack\n\
author_username: jack\n\
tweet_id: \"20\"\n\
lang: en\n\
---\n\
\n\
# just setting up my twttr\n\
\n\
body: not metadata\n";

    #[test]
    fn parses_known_and_pass_through_keys() {
        let meta = extract_metadata(ARTICLE, "X Article");
        assert_eq!(meta.title, "just setting up my twttr");
        assert_eq!(meta.url.as_deref(), Some("https://x.com/jack/status/20"));
        assert_eq!(meta.author.as_deref(), Some("jack (@jack)"));
        assert_eq!(meta.author_name.as_deref(), Some("jack"));
        assert_eq!(meta.tweet_id.as_deref(), Some("20"));
        assert_eq!(meta.extra.get("lang").map(String::as_str), Some("en"));
        assert!(!meta.extra.contains_key("body"), "body lines must not leak into metadata");
    }

    #[test]
    fn body_starts_after_closing_delimiter() {
        let (front, body) = split_front_matter(ARTICLE);
        assert_eq!(front.unwrap().fields.len(), 6);
        assert!(body.starts_with("\n# just setting up"));
    }

    #[test]
    fn no_front_matter_uses_fallback_title() {
        let meta = extract_metadata("Some text\nmore\n", "X Article");
        assert_eq!(meta.title, "X Article");
        assert!(meta.url.is_none());
        assert_eq!(strip_front_matter("Some text\n"), "Some text\n");
    }

    #[test]
    fn title_key_used_when_no_heading() {
        let meta = extract_metadata("---\ntitle: \"From YAML\"\n---\nplain\n", "fallback");
        assert_eq!(meta.title, "From YAML");
    }

    #[test]
    fn delimiter_must_open_the_document() {
        let text = "intro\n---\nurl: https://nope\n---\n";
        let (front, body) = split_front_matter(text);
        assert!(front.is_none());
        assert_eq!(body, text);
    }

    #[test]
    fn unterminated_block_runs_to_end() {
        let (front, body) = split_front_matter("---\nurl: https://a\n# Not a heading\n");
        assert_eq!(front.unwrap().get("url"), Some("https://a"));
        assert_eq!(body, "");
    }

    #[test]
    fn crlf_delimiters_are_recognised() {
        let (front, body) = split_front_matter("---\r\nauthor_name: Ann\r\n---\r\nHi\r\n");
        assert_eq!(front.unwrap().get("author_name"), Some("Ann"));
        assert_eq!(body, "Hi\r\n");
    }
}
