//! Error types for the texforge library.
//!
//! One enum, [`BuildError`], covers every fatal failure mode. Two classes of
//! failure deliberately do NOT appear here:
//!
//! * A failed external tool invocation is a [`crate::runner::StageResult`]
//!   with `succeeded = false`, not an error. Stages inspect it and decide
//!   whether it is fatal (conversion) or tolerated (compilation).
//!
//! * Workspace cleanup failures are logged and swallowed; they happen after
//!   the artifact has already been consumed and must not affect the caller.
//!
//! The HTTP layer that sits in front of this crate reports every
//! [`BuildError`] uniformly as a `{"error": "..."}` body, which
//! [`BuildError::to_error_body`] produces.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the texforge library.
#[derive(Debug, Error)]
pub enum BuildError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The request JSON could not be parsed (malformed JSON, unknown engine
    /// or format value).
    #[error("invalid build request: {0}")]
    InvalidRequest(String),

    // ── Workspace errors ──────────────────────────────────────────────────
    /// The job workspace directory could not be created. Fatal: nothing can
    /// be built without a workspace.
    #[error("failed to create workspace '{path}': {source}")]
    WorkspaceCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A workspace-relative path tried to escape the workspace boundary.
    ///
    /// `format` and `name` come from the request; a `..` smuggled into them
    /// must never resolve to a file outside the job directory.
    #[error("path '{relative}' escapes the workspace")]
    PathEscape { relative: PathBuf },

    /// A file could not be written into the workspace (source markup,
    /// hypertext intermediate).
    #[error("failed to write '{path}': {source}")]
    WorkspaceWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// A conversion tool exited non-zero (or never started). Fatal: there is
    /// no fallback artifact once a conversion was requested.
    #[error("{tool} conversion failed: {detail}")]
    ConversionFailed { tool: String, detail: String },

    /// Text extraction from the base PDF failed. This is also how a compile
    /// that never produced a PDF surfaces on the markup path.
    #[error("text extraction failed for '{path}': {detail}")]
    ExtractionFailed { path: PathBuf, detail: String },

    /// Assembling the multi-file zip archive failed.
    #[error("failed to bundle archive: {detail}")]
    BundleFailed { detail: String },

    // ── Terminal check ────────────────────────────────────────────────────
    /// The expected artifact does not exist after all stages ran.
    ///
    /// This is the single checkpoint that turns a silently-failed upstream
    /// tool into a typed error instead of a missing or corrupt download.
    /// When the compiler had failed (tolerated by policy), its captured
    /// output tail rides along for diagnosis.
    #[error("artifact '{}' was never produced{}", .path.display(), fmt_compile_log(.compile_log))]
    ArtifactNotFound {
        path: PathBuf,
        compile_log: Option<String>,
    },

    // ── Source resolution errors (CLI) ────────────────────────────────────
    /// Source file was not found at the given path.
    #[error("source file not found: '{path}'")]
    SourceNotFound { path: PathBuf },

    /// Source URL was syntactically valid but the download failed.
    #[error("failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Source download exceeded the configured timeout.
    #[error("download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

fn fmt_compile_log(log: &Option<String>) -> String {
    match log {
        Some(tail) if !tail.trim().is_empty() => format!("; compiler reported: {}", tail.trim()),
        _ => String::new(),
    }
}

impl BuildError {
    /// Serialize this error as the `{"error": "..."}` JSON body the HTTP
    /// layer returns for every failed build.
    pub fn to_error_body(&self) -> String {
        serde_json::json!({ "error": self.to_string() }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_not_found_without_log() {
        let e = BuildError::ArtifactNotFound {
            path: PathBuf::from("/tmp/abc/abc.pdf"),
            compile_log: None,
        };
        let msg = e.to_string();
        assert!(msg.contains("abc.pdf"), "got: {msg}");
        assert!(!msg.contains("compiler reported"), "got: {msg}");
    }

    #[test]
    fn artifact_not_found_with_log() {
        let e = BuildError::ArtifactNotFound {
            path: PathBuf::from("/tmp/abc/abc.pdf"),
            compile_log: Some("! Undefined control sequence.".into()),
        };
        assert!(e.to_string().contains("Undefined control sequence"));
    }

    #[test]
    fn error_body_is_json() {
        let e = BuildError::ConversionFailed {
            tool: "pandoc".into(),
            detail: "exit code 1".into(),
        };
        let body: serde_json::Value = serde_json::from_str(&e.to_error_body()).unwrap();
        assert!(body["error"].as_str().unwrap().contains("pandoc"));
    }

    #[test]
    fn path_escape_display() {
        let e = BuildError::PathEscape {
            relative: PathBuf::from("../../etc/passwd"),
        };
        assert!(e.to_string().contains("escapes the workspace"));
    }
}
