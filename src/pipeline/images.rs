//! Image reference scanning and CDN URL normalisation.
//!
//! Only images served from the X media CDN (`https://pbs.twimg.com/media/…`)
//! are collected. Each one gets a download URL that asks the CDN for the
//! original-resolution JPEG instead of the resized preview embedded in the
//! article. Nothing here touches the network.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

static RE_MEDIA_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"!\[([^\]]*)\]\((https://pbs\.twimg\.com/media/[^)]+)\)").unwrap()
});

/// One image found in the article body, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub caption: String,
    pub original_url: String,
    pub download_url: String,
}

/// Collect every media-CDN image reference in `body`.
pub fn scan_image_references(body: &str) -> Vec<ImageReference> {
    RE_MEDIA_IMAGE
        .captures_iter(body)
        .map(|caps| {
            let original_url = caps[2].to_string();
            ImageReference {
                caption: caps[1].to_string(),
                download_url: normalize_download_url(&original_url),
                original_url,
            }
        })
        .collect()
}

/// Rewrite a CDN URL so it requests the original-size JPEG.
///
/// Rules, first match wins:
/// 1. `name=large` is replaced by `format=jpg&name=orig`;
/// 2. an existing query gets `format=jpg` and `name=orig` set (overriding any
///    previous values); an unparseable URL is returned unchanged;
/// 3. otherwise `?format=jpg&name=orig` is appended.
pub fn normalize_download_url(url: &str) -> String {
    if url.contains("name=large") {
        return url.replace("name=large", "format=jpg&name=orig");
    }
    if url.contains('?') {
        return match reqwest::Url::parse(url) {
            Ok(mut parsed) => {
                set_query_params(&mut parsed, &[("format", "jpg"), ("name", "orig")]);
                parsed.to_string()
            }
            Err(_) => url.to_string(),
        };
    }
    format!("{url}?format=jpg&name=orig")
}

/// Set each `(key, value)` in place of the key's first occurrence, dropping
/// later duplicates and appending keys that were absent.
fn set_query_params(url: &mut reqwest::Url, params: &[(&str, &str)]) {
    let mut seen = vec![false; params.len()];
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (k, v) in url.query_pairs() {
        match params.iter().position(|(p, _)| *p == k) {
            Some(i) if seen[i] => {}
            Some(i) => {
                seen[i] = true;
                pairs.push((k.into_owned(), params[i].1.to_string()));
            }
            None => pairs.push((k.into_owned(), v.into_owned())),
        }
    }
    for (i, (k, v)) in params.iter().enumerate() {
        if !seen[i] {
            pairs.push((k.to_string(), v.to_string()));
        }
    }
    url.query_pairs_mut().clear().extend_pairs(pairs);
}

/// Last `/`-separated segment of an image path without any query or
/// fragment, e.g. `images/01.jpg` → `01.jpg`, `media/abc.jpg?name=large` → `abc.jpg`.
pub fn image_name(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.rsplit('/').next().unwrap_or(path)
}

/// Local file name for the `index`-th (0-based) scanned image: `01.jpg`, `02.jpg`, …
pub fn local_filename(index: usize) -> String {
    format!("{:02}.jpg", index + 1)
}

/// Where a downloaded image now lives.
#[derive(Debug, Clone)]
pub struct LocalReplacement {
    pub local_path: String,
    pub caption: String,
}

/// Point downloaded images at their local copies.
///
/// `replacements` is keyed by 0-based position among the references
/// [`scan_image_references`] returns for the same text, so a CDN URL that
/// appears twice is rewritten per occurrence. The image at position `i`
/// becomes `![Image {i+1}](images/NN.jpg)`, followed by an italic caption
/// paragraph when the caption is non-empty. Positions not in the map are
/// left untouched.
pub fn rewrite_image_links(markdown: &str, replacements: &HashMap<usize, LocalReplacement>) -> String {
    if replacements.is_empty() {
        return markdown.to_string();
    }
    let mut index = 0;
    RE_MEDIA_IMAGE
        .replace_all(markdown, |caps: &regex::Captures<'_>| {
            let i = index;
            index += 1;
            match replacements.get(&i) {
                Some(r) if r.caption.is_empty() => format!("![Image {}]({})", i + 1, r.local_path),
                Some(r) => format!("![Image {}]({})\n\n*{}*", i + 1, r.local_path, r.caption),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
