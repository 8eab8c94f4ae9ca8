//! The build request: the wire format consumed from the HTTP layer.
//!
//! Every field has a documented default, so any JSON object (including `{}`)
//! deserializes into a well-formed request. Engine and format are fixed
//! enums rather than free strings: the engine name ends up in an argv
//! vector and the format in a filename, and a typo (or an injection
//! attempt) must fail at parse time, not inside a tool invocation.

use crate::error::BuildError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Substituted for `source` when the request omits it. Compilation still
/// runs; the compiler's own error reporting handles the rest.
pub const PLACEHOLDER_SOURCE: &str = "user did not send TeX";

/// A complete build request.
///
/// Field names follow the wire format: `tex` (alias `source`), `engine`,
/// `format`, `name`, `dpi`, `imgFormat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    /// LaTeX source text. Default: a fixed placeholder string.
    #[serde(rename = "tex", alias = "source", default = "default_source")]
    pub source: String,

    /// Compiler backend. Default: pdflatex.
    #[serde(default)]
    pub engine: Engine,

    /// Requested output format. Default: pdf.
    #[serde(default)]
    pub format: OutputFormat,

    /// User-facing download filename; any extension is stripped before use.
    /// Default: "file".
    #[serde(default = "default_name")]
    pub name: String,

    /// Rasterization resolution in dots per inch. Default: 200.
    #[serde(default = "default_dpi")]
    pub dpi: u32,

    /// Pixel format when `format` is raster. Default: png.
    #[serde(rename = "imgFormat", default)]
    pub raster_format: RasterFormat,
}

fn default_source() -> String {
    PLACEHOLDER_SOURCE.to_string()
}

fn default_name() -> String {
    "file".to_string()
}

fn default_dpi() -> u32 {
    200
}

impl Default for BuildRequest {
    fn default() -> Self {
        Self {
            source: default_source(),
            engine: Engine::default(),
            format: OutputFormat::default(),
            name: default_name(),
            dpi: default_dpi(),
            raster_format: RasterFormat::default(),
        }
    }
}

impl BuildRequest {
    /// Parse a request from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        serde_json::from_str(json).map_err(|e| BuildError::InvalidRequest(e.to_string()))
    }

    /// The download filename stem: `name` with any extension stripped.
    ///
    /// "report.tex" becomes "report"; an empty or extension-only name falls
    /// back to the default.
    pub fn download_stem(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("file")
            .to_string()
    }
}

// ── Engine ───────────────────────────────────────────────────────────────

/// The fixed set of supported compiler backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// pdfTeX producing PDF directly. (default)
    #[default]
    Pdflatex,
    /// XeTeX with system-font support.
    Xelatex,
    /// LuaTeX.
    Lualatex,
    /// ConTeXt batch compiler; invoked with its own flag dialect.
    Context,
}

impl Engine {
    /// The binary name invoked for this engine.
    pub fn binary_name(&self) -> &'static str {
        match self {
            Engine::Pdflatex => "pdflatex",
            Engine::Xelatex => "xelatex",
            Engine::Lualatex => "lualatex",
            Engine::Context => "context",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary_name())
    }
}

// ── Output format ────────────────────────────────────────────────────────

/// The requested output format.
///
/// `zip` is not requestable: it is inferred by the bundle stage when a
/// conversion produced multiple files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// The base PDF itself. (default)
    #[default]
    Pdf,
    /// A pixel image rendered from the PDF; `imgFormat` picks the encoding.
    /// `bmp` is accepted as a legacy alias for this selector.
    #[serde(alias = "bmp")]
    Raster,
    /// Plain text, derived from the PDF via the hypertext intermediate.
    Txt,
    /// Markdown, derived from the PDF via the hypertext intermediate.
    Md,
    /// HTML, converted directly from the LaTeX source.
    Html,
}

// ── Raster sub-format ────────────────────────────────────────────────────

/// Pixel encodings the rasterizer can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    #[default]
    Png,
    #[serde(alias = "jpeg")]
    Jpg,
    Webp,
    Gif,
    Tiff,
    Avif,
    Bmp,
}

impl RasterFormat {
    /// File extension (also the format label in the MIME table).
    pub fn extension(&self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpg => "jpg",
            RasterFormat::Webp => "webp",
            RasterFormat::Gif => "gif",
            RasterFormat::Tiff => "tiff",
            RasterFormat::Avif => "avif",
            RasterFormat::Bmp => "bmp",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_well_formed() {
        let req = BuildRequest::from_json("{}").unwrap();
        assert_eq!(req.source, PLACEHOLDER_SOURCE);
        assert_eq!(req.engine, Engine::Pdflatex);
        assert_eq!(req.format, OutputFormat::Pdf);
        assert_eq!(req.name, "file");
        assert_eq!(req.dpi, 200);
        assert_eq!(req.raster_format, RasterFormat::Png);
    }

    #[test]
    fn tex_and_source_are_aliases() {
        let a = BuildRequest::from_json(r#"{"tex": "\\bye"}"#).unwrap();
        let b = BuildRequest::from_json(r#"{"source": "\\bye"}"#).unwrap();
        assert_eq!(a.source, b.source);
    }

    #[test]
    fn unknown_engine_is_rejected() {
        let err = BuildRequest::from_json(r#"{"engine": "pdflatex; rm -rf /"}"#).unwrap_err();
        assert!(matches!(err, BuildError::InvalidRequest(_)));
    }

    #[test]
    fn bmp_is_a_raster_alias() {
        let req = BuildRequest::from_json(r#"{"format": "bmp", "imgFormat": "webp"}"#).unwrap();
        assert_eq!(req.format, OutputFormat::Raster);
        assert_eq!(req.raster_format, RasterFormat::Webp);
    }

    #[test]
    fn jpeg_is_a_jpg_alias() {
        let req = BuildRequest::from_json(r#"{"imgFormat": "jpeg"}"#).unwrap();
        assert_eq!(req.raster_format, RasterFormat::Jpg);
    }

    #[test]
    fn download_stem_strips_extension() {
        let mut req = BuildRequest::default();
        req.name = "thesis.tex".into();
        assert_eq!(req.download_stem(), "thesis");
        req.name = "thesis".into();
        assert_eq!(req.download_stem(), "thesis");
        req.name = String::new();
        assert_eq!(req.download_stem(), "file");
    }

    #[test]
    fn serialization_is_stable() {
        let req = BuildRequest::default();
        let a = serde_json::to_string(&req).unwrap();
        let b = serde_json::to_string(&req).unwrap();
        assert_eq!(a, b);
    }
}
