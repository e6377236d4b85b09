//! Content extraction via an external subprocess.
//!
//! The extractor is a black box: it is invoked with the article URL as its
//! last argument, must print the path of the Markdown file it generated on
//! stdout, and must exit non-zero on failure. Its stderr is passed through so
//! the user sees its own diagnostics.

use crate::config::ExtractorCommand;
use crate::error::X2NotionError;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Run the extractor for `url` and return the Markdown path it printed.
pub async fn run_extractor(cmd: &ExtractorCommand, url: &str) -> Result<PathBuf, X2NotionError> {
    info!("Extracting content with '{}'", cmd.program);
    debug!("Extractor argv: {} {:?} {}", cmd.program, cmd.args, url);

    let output = Command::new(&cmd.program)
        .args(&cmd.args)
        .arg(url)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .await
        .map_err(|e| X2NotionError::ExtractionFailed {
            url: url.to_string(),
            reason: format!("cannot start '{}': {e}", cmd.program),
        })?;

    if !output.status.success() {
        let reason = match output.status.code() {
            Some(code) => format!("extractor exited with code {code}"),
            None => "extractor was terminated by a signal".to_string(),
        };
        return Err(X2NotionError::ExtractionFailed {
            url: url.to_string(),
            reason,
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let path = stdout.trim();
    if path.is_empty() {
        return Err(X2NotionError::ExtractionFailed {
            url: url.to_string(),
            reason: "no output received from extractor".to_string(),
        });
    }

    info!("Extracted: {}", path);
    Ok(PathBuf::from(path))
}
