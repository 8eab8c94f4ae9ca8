//! # texforge
//!
//! Turn a LaTeX source (plus a target output format) into a downloadable
//! artifact by driving a chain of external document tools.
//!
//! ## Why this crate?
//!
//! Serving "LaTeX in, file out" sounds like three subprocess calls, but the
//! failure modes live in the seams: compilers that exit non-zero while
//! still producing output, rasterizers that silently split one request into
//! many files, temp directories that leak when a tool hangs, and
//! user-controlled strings that end up in filenames and argument vectors.
//! This crate packages those seams: content-addressed job identity, a
//! per-job workspace with guaranteed teardown, a timeout-enforcing process
//! runner, and a typed conversion state machine.
//!
//! ## Pipeline Overview
//!
//! ```text
//! request
//!  │
//!  ├─ 1. JobKey     SHA-256 over the whole serialized request
//!  ├─ 2. Workspace  temp/<key>/ created, owned by this request
//!  ├─ 3. Compile    pdflatex / xelatex / lualatex / context → <key>.pdf
//!  ├─ 4. Convert    pass-through │ magick raster │ pandoc markup
//!  ├─ 5. Bundle     <key>-<n>.<ext> siblings → <key>.zip (detected, not requested)
//!  └─ 6. Resolve    path + MIME + download name, or a typed error
//! ```
//!
//! The workspace is torn down when the [`BuildOutput`] is dropped, success
//! or failure.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use texforge::{build, BuildConfig, BuildRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let request = BuildRequest::from_json(
//!         r#"{"tex": "\\documentclass{article}\\begin{document}hi\\end{document}"}"#,
//!     )?;
//!     let config = BuildConfig::default();
//!     let output = build(&request, &config).await?;
//!     println!(
//!         "{} ({})",
//!         output.artifact.download_name,
//!         output.artifact.mime_type()
//!     );
//!     let bytes = output.into_bytes()?; // workspace removed here
//!     std::fs::write("out.pdf", bytes)?;
//!     Ok(())
//! }
//! ```
//!
//! ## External tools
//!
//! | Tool | Used for | Contract |
//! |------|----------|----------|
//! | `pdflatex`/`xelatex`/`lualatex` | compile | `-jobname`, `-interaction=nonstopmode`, `-no-shell-escape`, `-output-directory` |
//! | `context` | compile | `--batchmode`, `--result`, `--path` |
//! | `magick`  | rasterize | `-density`, `-background white`, `-alpha remove/off` |
//! | `pandoc`  | markup conversion | `-f`, `-t`, `-o` |
//!
//! All tools are invoked with argument vectors (never a shell) and a hard
//! wall-clock timeout.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod build;
pub mod config;
pub mod error;
pub mod jobkey;
pub mod pipeline;
pub mod request;
pub mod runner;
pub mod source;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::{Artifact, ArtifactFormat};
pub use build::{build, build_from_json, BuildDiagnostics, BuildOutput};
pub use config::{BuildConfig, BuildConfigBuilder};
pub use error::BuildError;
pub use jobkey::JobKey;
pub use request::{BuildRequest, Engine, OutputFormat, RasterFormat, PLACEHOLDER_SOURCE};
pub use runner::StageResult;
pub use source::resolve_source;
pub use workspace::Workspace;
