//! The build orchestrator: one request in, one artifact out.
//!
//! ## Ownership of the workspace
//!
//! The workspace handle is created here and threaded explicitly through
//! every stage; no stage (and nothing else in the process) holds a global
//! "current directory". On any error path the handle drops inside this
//! function and the directory is gone before the error reaches the caller.
//! On success the handle moves into [`BuildOutput`], which keeps the
//! artifact's file alive until the caller has streamed it out; dropping the
//! output (or calling [`BuildOutput::into_bytes`]) tears the workspace
//! down. Either way, no workspace survives its request.
//!
//! ## The lenient compile policy
//!
//! A failed compile does not abort the build. LaTeX toolchains exit
//! non-zero for recoverable problems while still writing a usable PDF, so
//! the pipeline keeps going and lets reality decide: if the PDF truly never
//! appeared, conversion or resolution fails with a typed error that carries
//! the compiler's captured output. The full [`StageResult`]s are kept in
//! [`BuildDiagnostics`] so callers (and tests) can inspect what each tool
//! said even when the build succeeded.

use crate::artifact::{self, Artifact};
use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::jobkey::JobKey;
use crate::pipeline::convert::ConvertPlan;
use crate::pipeline::{bundle, compile, convert};
use crate::request::BuildRequest;
use crate::runner::StageResult;
use crate::workspace::Workspace;
use std::time::Instant;
use tracing::{debug, info};

/// Captured tool output from a finished (or attempted) build.
#[derive(Debug, Clone)]
pub struct BuildDiagnostics {
    /// The compile invocation, failed or not (lenient policy).
    pub compile: StageResult,
    /// The conversion invocation; `None` when the format was `pdf` and no
    /// conversion ran.
    pub convert: Option<StageResult>,
    /// Whether a multi-file output set was rewrapped into a zip.
    pub bundled: bool,
}

/// A successful build: the artifact plus the workspace that contains it.
#[derive(Debug)]
pub struct BuildOutput {
    pub artifact: Artifact,
    pub diagnostics: BuildDiagnostics,
    workspace: Workspace,
}

impl BuildOutput {
    /// The job key this build ran under.
    pub fn key(&self) -> &JobKey {
        self.workspace.key()
    }

    /// Read the artifact into memory and tear the workspace down.
    ///
    /// Convenience for callers that buffer rather than stream; the
    /// workspace is removed even if the read fails.
    pub fn into_bytes(self) -> Result<Vec<u8>, BuildError> {
        let bytes = std::fs::read(&self.artifact.path).map_err(|_| BuildError::ArtifactNotFound {
            path: self.artifact.path.clone(),
            compile_log: None,
        });
        self.workspace.close();
        bytes
    }
}

/// Run the full pipeline for one request.
///
/// # Errors
///
/// Any [`BuildError`]; by the time the error is returned the job's
/// workspace has already been removed.
pub async fn build(request: &BuildRequest, config: &BuildConfig) -> Result<BuildOutput, BuildError> {
    let started = Instant::now();

    // ── Step 1: Identify the job ─────────────────────────────────────────
    let key = JobKey::compute(request)?;
    info!(key = %key, format = ?request.format, engine = %request.engine, "build started");

    // ── Step 2: Open the workspace ───────────────────────────────────────
    let workspace = Workspace::open(&key, &config.temp_root)?;

    // ── Step 3: Compile to the base PDF (failure tolerated) ──────────────
    let compile_result = compile::compile(&workspace, request, config).await?;

    // ── Step 4: Convert to the requested format ──────────────────────────
    let plan = ConvertPlan::from_request(request);
    let convert_result = convert::convert(&workspace, &plan, config).await?;
    let mut format = plan.artifact_format();

    // ── Step 5: Bundle a split output set, if any ────────────────────────
    let stem = request.download_stem();
    let bundled = match bundle::bundle(&workspace, &format, &stem).await? {
        Some(zip_format) => {
            format = zip_format;
            true
        }
        None => false,
    };

    // ── Step 6: Resolve the artifact (the terminal check) ────────────────
    let resolved = artifact::resolve(&workspace, format, &stem, &compile_result)?;

    debug!(
        key = %key,
        artifact = %resolved.path.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "build finished"
    );

    Ok(BuildOutput {
        artifact: resolved,
        diagnostics: BuildDiagnostics {
            compile: compile_result,
            convert: convert_result,
            bundled,
        },
        workspace,
    })
}

/// Parse a JSON request and run [`build`].
///
/// This is the entry point an HTTP handler calls with the raw request
/// body.
pub async fn build_from_json(json: &str, config: &BuildConfig) -> Result<BuildOutput, BuildError> {
    let request = BuildRequest::from_json(json)?;
    build(&request, config).await
}
