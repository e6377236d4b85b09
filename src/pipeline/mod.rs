//! Pipeline stages for X-article-to-Notion publishing.
//!
//! Each submodule implements exactly one transformation step or wraps one
//! external system, so each can be tested on its own and the remote ones can
//! be replaced by fakes.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ frontmatter ──▶ images ──▶ fetch ──▶ article.md
//! (subprocess)  (metadata)    (scan)     (CDN)
//!
//! article.md ──▶ cos ──▶ blocks ──▶ notion ──▶ reconcile
//!              (upload)  (convert)  (create)   (patch)
//! ```
//!
//! 1. [`extract`]     — run the extractor subprocess, get a Markdown path
//! 2. [`frontmatter`] — split front-matter, derive the title
//! 3. [`images`]      — find media references, normalise to original size
//! 4. [`fetch`]       — download images sequentially as `NN.jpg`
//! 5. [`cos`]         — relay local images through object storage
//! 6. [`blocks`]      — Markdown body to typed Notion blocks
//! 7. [`notion`]      — create the page in request-sized chunks
//! 8. [`reconcile`]   — patch placeholder callouts into image blocks

pub mod blocks;
pub mod cos;
pub mod extract;
pub mod fetch;
pub mod frontmatter;
pub mod images;
pub mod notion;
pub mod reconcile;
