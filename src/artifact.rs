//! Artifact resolution: the last checkpoint before anything leaves the
//! workspace.
//!
//! Upstream failure can be silent by design (the lenient compile policy),
//! so the resolver re-checks reality: the file named by the key and the
//! final format either exists, or the build fails with a typed error. A
//! stale or missing file is never served.

use crate::error::BuildError;
use crate::request::RasterFormat;
use crate::runner::StageResult;
use crate::workspace::Workspace;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

/// The format of the final deliverable.
///
/// Unlike [`crate::request::OutputFormat`] this includes `Zip`, which only
/// the bundle stage can introduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Pdf,
    Raster(RasterFormat),
    Txt,
    Md,
    Html,
    Zip,
}

impl ArtifactFormat {
    /// File extension, used both for the workspace path and the download
    /// name.
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Pdf => "pdf",
            ArtifactFormat::Raster(f) => f.extension(),
            ArtifactFormat::Txt => "txt",
            ArtifactFormat::Md => "md",
            ArtifactFormat::Html => "html",
            ArtifactFormat::Zip => "zip",
        }
    }

    /// MIME type from the fixed table; anything unknown falls back to
    /// `application/octet-stream`.
    pub fn mime_type(&self) -> &'static str {
        match self.extension() {
            "pdf" => "application/pdf",
            "zip" => "application/zip",
            "txt" => "text/plain",
            "html" => "text/html",
            "md" => "text/markdown",
            "png" => "image/png",
            "jpg" => "image/jpeg",
            "webp" => "image/webp",
            "gif" => "image/gif",
            "tiff" => "image/tiff",
            "avif" => "image/avif",
            "bmp" => "image/bmp",
            _ => "application/octet-stream",
        }
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// The resolved deliverable: where it is, what it is, what to call it.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Absolute path inside the workspace. Valid until the workspace is
    /// torn down.
    pub path: PathBuf,
    /// Final format after conversion and bundling.
    pub format: ArtifactFormat,
    /// User-facing download filename, `<name>.<ext>`.
    pub download_name: String,
}

impl Artifact {
    /// MIME type for the response `Content-Type`.
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// Resolve the final artifact for a finished build.
///
/// `compile` is the (possibly failed) compile outcome; when the expected
/// file is missing after a failed compile, the compiler's output excerpt is
/// attached so the terminal error explains itself.
pub fn resolve(
    workspace: &Workspace,
    format: ArtifactFormat,
    download_stem: &str,
    compile: &StageResult,
) -> Result<Artifact, BuildError> {
    let file_name = format!("{}.{}", workspace.key().as_str(), format.extension());
    let path = workspace.path(&file_name)?;

    if !path.exists() {
        let compile_log = if compile.succeeded {
            None
        } else {
            Some(compile.output_excerpt())
        };
        return Err(BuildError::ArtifactNotFound { path, compile_log });
    }

    let download_name = format!("{download_stem}.{}", format.extension());
    debug!(path = %path.display(), download_name = %download_name, "artifact resolved");
    Ok(Artifact {
        path,
        format,
        download_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobkey::JobKey;
    use crate::request::BuildRequest;
    use tempfile::TempDir;

    fn ok_compile() -> StageResult {
        StageResult {
            succeeded: true,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    #[test]
    fn mime_table_matches_the_contract() {
        assert_eq!(ArtifactFormat::Pdf.mime_type(), "application/pdf");
        assert_eq!(ArtifactFormat::Zip.mime_type(), "application/zip");
        assert_eq!(ArtifactFormat::Md.mime_type(), "text/markdown");
        assert_eq!(
            ArtifactFormat::Raster(RasterFormat::Avif).mime_type(),
            "image/avif"
        );
        assert_eq!(
            ArtifactFormat::Raster(RasterFormat::Jpg).mime_type(),
            "image/jpeg"
        );
    }

    #[test]
    fn resolve_returns_existing_artifact() {
        let root = TempDir::new().unwrap();
        let key = JobKey::compute(&BuildRequest::default()).unwrap();
        let ws = Workspace::open(&key, root.path()).unwrap();
        let pdf = ws.path(format!("{}.pdf", key.as_str())).unwrap();
        std::fs::write(&pdf, b"%PDF-1.4").unwrap();

        let artifact = resolve(&ws, ArtifactFormat::Pdf, "report", &ok_compile()).unwrap();
        assert_eq!(artifact.path, pdf);
        assert_eq!(artifact.download_name, "report.pdf");
        assert_eq!(artifact.mime_type(), "application/pdf");
    }

    #[test]
    fn resolve_missing_is_artifact_not_found() {
        let root = TempDir::new().unwrap();
        let key = JobKey::compute(&BuildRequest::default()).unwrap();
        let ws = Workspace::open(&key, root.path()).unwrap();

        let err = resolve(&ws, ArtifactFormat::Pdf, "report", &ok_compile()).unwrap_err();
        assert!(matches!(err, BuildError::ArtifactNotFound { .. }));
    }

    #[test]
    fn resolve_missing_after_failed_compile_carries_the_log() {
        let root = TempDir::new().unwrap();
        let key = JobKey::compute(&BuildRequest::default()).unwrap();
        let ws = Workspace::open(&key, root.path()).unwrap();
        let failed = StageResult {
            succeeded: false,
            stdout: "! Emergency stop.".into(),
            stderr: String::new(),
        };

        let err = resolve(&ws, ArtifactFormat::Pdf, "report", &failed).unwrap_err();
        assert!(err.to_string().contains("Emergency stop"));
    }
}
