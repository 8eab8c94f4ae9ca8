//! Source resolution: turn a CLI argument into markup text.
//!
//! The build pipeline itself only ever sees a string of markup; this
//! module is the CLI-side convenience that accepts a local file path, `-`
//! for stdin, or an HTTP/HTTPS URL and produces that string. The HTTP
//! service front-end does not use it (its requests carry the source
//! inline).

use crate::error::BuildError;
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a CLI source argument to markup text.
///
/// `-` reads stdin to EOF; a URL is downloaded with the given timeout;
/// anything else is treated as a local file path.
pub async fn resolve_source(input: &str, timeout_secs: u64) -> Result<String, BuildError> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| BuildError::Internal(format!("failed to read stdin: {e}")))?;
        return Ok(text);
    }
    if is_url(input) {
        return download_source(input, timeout_secs).await;
    }

    let path = PathBuf::from(input);
    if !path.exists() {
        return Err(BuildError::SourceNotFound { path });
    }
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| BuildError::Internal(format!("failed to read '{}': {e}", path.display())))?;
    debug!(path = %path.display(), bytes = text.len(), "source read from file");
    Ok(text)
}

async fn download_source(url: &str, timeout_secs: u64) -> Result<String, BuildError> {
    info!(url = %url, "downloading source");

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BuildError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            BuildError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            BuildError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(BuildError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    response.text().await.map_err(|e| BuildError::DownloadFailed {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.tex"));
        assert!(is_url("http://example.com/doc.tex"));
        assert!(!is_url("/tmp/doc.tex"));
        assert!(!is_url("doc.tex"));
        assert!(!is_url("-"));
    }

    #[tokio::test]
    async fn missing_file_is_source_not_found() {
        let err = resolve_source("/definitely/not/a/file.tex", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn local_file_is_read() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("doc.tex");
        std::fs::write(&path, "\\bye").unwrap();
        let text = resolve_source(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(text, "\\bye");
    }
}
