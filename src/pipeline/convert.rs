//! ConvertStage: the format-keyed state machine.
//!
//! Dispatch is a typed plan, not a chain of string comparisons: the request
//! format is mapped once into a [`ConvertPlan`] variant, and each variant
//! has exactly one handler. Adding a format means adding a variant, and the
//! compiler points at every match that needs updating.
//!
//! ## The three working strategies
//!
//! * **Rasterize** — drive the rasterizer against the base PDF at the
//!   requested density, flattening transparency onto white and dropping
//!   the alpha channel (transparent PDF backgrounds otherwise come out
//!   black in formats without alpha).
//! * **Markup via hypertext** — the base PDF's text is extracted in one
//!   layout-aware pass over the whole document and written as an
//!   intermediate HTML file, which the conversion tool then reads. Going
//!   through the *compiled* PDF rather than the source means the output
//!   reflects what the engine actually typeset (macro expansion included).
//! * **Markup direct** — formats that do not need the PDF reinterpreted
//!   are converted straight from the LaTeX source, selecting the
//!   conversion tool's native LaTeX reader.
//!
//! ## Failure policy
//!
//! Unlike compilation, any failure here is fatal: there is no fallback
//! artifact for a conversion the user asked for. Tool output is captured
//! into the error.
//!
//! ## Why is extraction in `spawn_blocking`?
//!
//! `pdf_extract` walks the whole document synchronously; on a long PDF
//! that is hundreds of milliseconds of CPU that must not stall the async
//! worker threads serving other requests.

use crate::artifact::ArtifactFormat;
use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::request::{BuildRequest, OutputFormat, RasterFormat};
use crate::runner::{self, StageResult};
use crate::workspace::Workspace;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One fully-decided conversion strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertPlan {
    /// The base PDF is the artifact; no tool runs.
    Passthrough,
    /// PDF to pixel image via the rasterizer.
    Rasterize { dpi: u32, format: RasterFormat },
    /// PDF to text-flavored markup via the extracted hypertext
    /// intermediate.
    MarkupViaHtml { flavor: MarkupFlavor },
    /// LaTeX source straight to HTML via the conversion tool.
    MarkupDirect,
}

/// Output flavors of the hypertext route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupFlavor {
    /// Plain text (`-t plain`).
    Plain,
    /// Markdown.
    Markdown,
}

impl MarkupFlavor {
    fn pandoc_target(&self) -> &'static str {
        match self {
            MarkupFlavor::Plain => "plain",
            MarkupFlavor::Markdown => "markdown",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            MarkupFlavor::Plain => "txt",
            MarkupFlavor::Markdown => "md",
        }
    }
}

impl ConvertPlan {
    /// Decide the strategy for a request.
    pub fn from_request(request: &BuildRequest) -> Self {
        match request.format {
            OutputFormat::Pdf => ConvertPlan::Passthrough,
            OutputFormat::Raster => ConvertPlan::Rasterize {
                dpi: request.dpi.max(1),
                format: request.raster_format,
            },
            OutputFormat::Txt => ConvertPlan::MarkupViaHtml {
                flavor: MarkupFlavor::Plain,
            },
            OutputFormat::Md => ConvertPlan::MarkupViaHtml {
                flavor: MarkupFlavor::Markdown,
            },
            OutputFormat::Html => ConvertPlan::MarkupDirect,
        }
    }

    /// The artifact format this plan produces (before any bundling).
    pub fn artifact_format(&self) -> ArtifactFormat {
        match self {
            ConvertPlan::Passthrough => ArtifactFormat::Pdf,
            ConvertPlan::Rasterize { format, .. } => ArtifactFormat::Raster(*format),
            ConvertPlan::MarkupViaHtml { flavor } => match flavor {
                MarkupFlavor::Plain => ArtifactFormat::Txt,
                MarkupFlavor::Markdown => ArtifactFormat::Md,
            },
            ConvertPlan::MarkupDirect => ArtifactFormat::Html,
        }
    }
}

/// Run the conversion for `plan`. Returns the tool's [`StageResult`] when
/// one was invoked, `None` for the pass-through case.
pub async fn convert(
    workspace: &Workspace,
    plan: &ConvertPlan,
    config: &BuildConfig,
) -> Result<Option<StageResult>, BuildError> {
    let key = workspace.key().as_str().to_string();

    match *plan {
        ConvertPlan::Passthrough => {
            debug!(key = %key, "pdf requested, no conversion");
            Ok(None)
        }

        ConvertPlan::Rasterize { dpi, format } => {
            let pdf = workspace.path(format!("{key}.pdf"))?;
            let out = workspace.path(format!("{key}.{}", format.extension()))?;
            let argv: Vec<OsString> = vec![
                config.magick_bin.clone().into_os_string(),
                OsString::from("-density"),
                OsString::from(dpi.to_string()),
                pdf.into_os_string(),
                OsString::from("-background"),
                OsString::from("white"),
                OsString::from("-alpha"),
                OsString::from("remove"),
                OsString::from("-alpha"),
                OsString::from("off"),
                out.into_os_string(),
            ];
            let result = runner::run(&argv, workspace.dir(), config.tool_timeout).await;
            if !result.succeeded {
                return Err(BuildError::ConversionFailed {
                    tool: "magick".into(),
                    detail: result.output_excerpt(),
                });
            }
            info!(key = %key, dpi, format = format.extension(), "rasterization finished");
            Ok(Some(result))
        }

        ConvertPlan::MarkupViaHtml { flavor } => {
            let pdf = workspace.path(format!("{key}.pdf"))?;
            let text = extract_text(&pdf).await?;

            let intermediate = workspace.path(format!("{key}.html"))?;
            std::fs::write(&intermediate, hypertext_document(&text)).map_err(|source| {
                BuildError::WorkspaceWrite {
                    path: intermediate.clone(),
                    source,
                }
            })?;

            let out = workspace.path(format!("{key}.{}", flavor.extension()))?;
            let argv: Vec<OsString> = vec![
                config.pandoc_bin.clone().into_os_string(),
                intermediate.into_os_string(),
                OsString::from("-f"),
                OsString::from("html"),
                OsString::from("-t"),
                OsString::from(flavor.pandoc_target()),
                OsString::from("-o"),
                out.into_os_string(),
            ];
            let result = runner::run(&argv, workspace.dir(), config.tool_timeout).await;
            if !result.succeeded {
                return Err(BuildError::ConversionFailed {
                    tool: "pandoc".into(),
                    detail: result.output_excerpt(),
                });
            }
            info!(key = %key, target = flavor.pandoc_target(), "markup conversion finished");
            Ok(Some(result))
        }

        ConvertPlan::MarkupDirect => {
            let tex = workspace.path(format!("{key}.tex"))?;
            let out = workspace.path(format!("{key}.html"))?;
            let argv: Vec<OsString> = vec![
                config.pandoc_bin.clone().into_os_string(),
                tex.into_os_string(),
                OsString::from("-f"),
                OsString::from("latex"),
                OsString::from("-o"),
                out.into_os_string(),
            ];
            let result = runner::run(&argv, workspace.dir(), config.tool_timeout).await;
            if !result.succeeded {
                return Err(BuildError::ConversionFailed {
                    tool: "pandoc".into(),
                    detail: result.output_excerpt(),
                });
            }
            info!(key = %key, "direct markup conversion finished");
            Ok(Some(result))
        }
    }
}

/// Extract the PDF's text in one layout-aware pass over the whole document.
///
/// A missing or unreadable PDF (the tolerated-compile-failure case) surfaces
/// here as [`BuildError::ExtractionFailed`].
async fn extract_text(pdf_path: &Path) -> Result<String, BuildError> {
    let path: PathBuf = pdf_path.to_path_buf();
    let task_path = path.clone();
    let result = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text(&task_path).map_err(|e| BuildError::ExtractionFailed {
            path: task_path.clone(),
            detail: e.to_string(),
        })
    })
    .await;
    match result {
        Ok(extracted) => extracted,
        // The extraction library is known to panic on some malformed
        // inputs; a panicked task is the same failure as a returned error.
        Err(join_err) => Err(BuildError::ExtractionFailed {
            path,
            detail: format!("extraction aborted: {join_err}"),
        }),
    }
}

/// Wrap extracted text into the minimal hypertext document the conversion
/// tool reads. Blank-line-separated runs become paragraphs.
fn hypertext_document(text: &str) -> String {
    let mut html = String::with_capacity(text.len() + 128);
    html.push_str("<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"></head>\n<body>\n");
    for paragraph in text.split("\n\n").filter(|p| !p.trim().is_empty()) {
        html.push_str("<p>");
        html.push_str(&escape_html(paragraph.trim()));
        html.push_str("</p>\n");
    }
    html.push_str("</body>\n</html>\n");
    html
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobkey::JobKey;
    use tempfile::TempDir;

    #[test]
    fn plans_cover_every_request_format() {
        let mut req = BuildRequest::default();
        assert_eq!(ConvertPlan::from_request(&req), ConvertPlan::Passthrough);

        req.format = OutputFormat::Raster;
        req.dpi = 72;
        req.raster_format = RasterFormat::Webp;
        assert_eq!(
            ConvertPlan::from_request(&req),
            ConvertPlan::Rasterize {
                dpi: 72,
                format: RasterFormat::Webp
            }
        );

        req.format = OutputFormat::Txt;
        assert_eq!(
            ConvertPlan::from_request(&req),
            ConvertPlan::MarkupViaHtml {
                flavor: MarkupFlavor::Plain
            }
        );

        req.format = OutputFormat::Md;
        assert_eq!(
            ConvertPlan::from_request(&req),
            ConvertPlan::MarkupViaHtml {
                flavor: MarkupFlavor::Markdown
            }
        );

        req.format = OutputFormat::Html;
        assert_eq!(ConvertPlan::from_request(&req), ConvertPlan::MarkupDirect);
    }

    #[test]
    fn plan_formats_match_extensions() {
        assert_eq!(ConvertPlan::Passthrough.artifact_format().extension(), "pdf");
        assert_eq!(
            ConvertPlan::MarkupViaHtml {
                flavor: MarkupFlavor::Plain
            }
            .artifact_format()
            .extension(),
            "txt"
        );
        assert_eq!(ConvertPlan::MarkupDirect.artifact_format().extension(), "html");
    }

    #[test]
    fn zero_dpi_is_clamped() {
        let mut req = BuildRequest::default();
        req.format = OutputFormat::Raster;
        req.dpi = 0;
        match ConvertPlan::from_request(&req) {
            ConvertPlan::Rasterize { dpi, .. } => assert_eq!(dpi, 1),
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn hypertext_escapes_and_wraps() {
        let html = hypertext_document("a < b\n\nc & d");
        assert!(html.contains("<p>a &lt; b</p>"));
        assert!(html.contains("<p>c &amp; d</p>"));
        assert!(html.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn hypertext_skips_blank_paragraphs() {
        let html = hypertext_document("x\n\n   \n\ny");
        assert_eq!(html.matches("<p>").count(), 2);
    }

    #[tokio::test]
    async fn extraction_fails_on_garbage_pdf() {
        let root = TempDir::new().unwrap();
        let key = JobKey::compute(&BuildRequest::default()).unwrap();
        let ws = Workspace::open(&key, root.path()).unwrap();
        let pdf = ws.path(format!("{}.pdf", key.as_str())).unwrap();
        std::fs::write(&pdf, b"this is not a pdf").unwrap();

        let plan = ConvertPlan::MarkupViaHtml {
            flavor: MarkupFlavor::Markdown,
        };
        let err = convert(&ws, &plan, &BuildConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::ExtractionFailed { .. }));
    }

    #[tokio::test]
    async fn extraction_fails_on_missing_pdf() {
        let root = TempDir::new().unwrap();
        let key = JobKey::compute(&BuildRequest::default()).unwrap();
        let ws = Workspace::open(&key, root.path()).unwrap();

        let plan = ConvertPlan::MarkupViaHtml {
            flavor: MarkupFlavor::Plain,
        };
        let err = convert(&ws, &plan, &BuildConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::ExtractionFailed { .. }));
    }
}
