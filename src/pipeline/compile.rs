//! CompileStage: LaTeX source to base PDF.
//!
//! The stage always writes the source to `<key>.tex` first, then invokes
//! the engine so that every product lands at a deterministic,
//! key-derived path inside the workspace. Both dialects pin their output
//! to the workspace:
//!
//! * ConTeXt runs *inside* the workspace (`--path` plus a relative input
//!   name) because it scatters auxiliary files next to its cwd.
//! * The LaTeX-family engines take `-output-directory` and an absolute
//!   input path, with `-interaction=nonstopmode` so a syntax error cannot
//!   park the process at an interactive prompt until the timeout.
//!
//! `-no-shell-escape` stays on even though the runner never uses a shell:
//! the *engine* can spawn subprocesses from within the document unless
//! told otherwise.
//!
//! A non-zero exit does not abort the pipeline. LaTeX tooling routinely
//! exits non-zero for warning-level problems while still emitting a usable
//! PDF, so the stage hands its [`StageResult`] back and lets downstream
//! stages discover a truly missing PDF themselves.

use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::request::{BuildRequest, Engine};
use crate::runner::{self, StageResult};
use crate::workspace::Workspace;
use std::ffi::OsString;
use tracing::{info, warn};

/// Write the request source into the workspace and compile it to
/// `<key>.pdf`.
pub async fn compile(
    workspace: &Workspace,
    request: &BuildRequest,
    config: &BuildConfig,
) -> Result<StageResult, BuildError> {
    let key = workspace.key().as_str().to_string();
    let tex_name = format!("{key}.tex");
    let tex_path = workspace.path(&tex_name)?;

    std::fs::write(&tex_path, &request.source).map_err(|source| BuildError::WorkspaceWrite {
        path: tex_path.clone(),
        source,
    })?;

    let engine_bin: OsString = match &config.engine_bin {
        Some(bin) => bin.clone().into_os_string(),
        None => OsString::from(request.engine.binary_name()),
    };

    let argv: Vec<OsString> = match request.engine {
        Engine::Context => vec![
            engine_bin,
            OsString::from("--batchmode"),
            OsString::from(format!("--result={key}.pdf")),
            {
                let mut flag = OsString::from("--path=");
                flag.push(workspace.dir());
                flag
            },
            OsString::from(tex_name),
        ],
        _ => vec![
            engine_bin,
            OsString::from(format!("-jobname={key}")),
            OsString::from("-interaction=nonstopmode"),
            OsString::from("-no-shell-escape"),
            {
                let mut flag = OsString::from("-output-directory=");
                flag.push(workspace.dir());
                flag
            },
            tex_path.into_os_string(),
        ],
    };

    let result = runner::run(&argv, workspace.dir(), config.tool_timeout).await;
    if result.succeeded {
        info!(engine = %request.engine, key = %key, "compile finished");
    } else {
        // Tolerated by policy; the resolver reports it if no PDF appeared.
        warn!(
            engine = %request.engine,
            key = %key,
            excerpt = %result.output_excerpt(),
            "compile reported failure, continuing"
        );
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobkey::JobKey;
    use tempfile::TempDir;

    fn setup(request: &BuildRequest) -> (TempDir, Workspace) {
        let root = TempDir::new().unwrap();
        let key = JobKey::compute(request).unwrap();
        let ws = Workspace::open(&key, root.path()).unwrap();
        (root, ws)
    }

    #[tokio::test]
    async fn writes_source_before_invoking_engine() {
        let mut request = BuildRequest::default();
        request.source = "\\documentclass{article}".into();
        let (_root, ws) = setup(&request);
        // A nonexistent engine binary: the write must still have happened
        // and the failure must come back as a StageResult, not an error.
        let config = BuildConfig::builder()
            .engine_bin("/definitely/not/pdflatex")
            .build();

        let result = compile(&ws, &request, &config).await.unwrap();
        assert!(!result.succeeded);

        let tex = ws
            .path(format!("{}.tex", ws.key().as_str()))
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(tex).unwrap(),
            "\\documentclass{article}"
        );
    }

    #[tokio::test]
    async fn missing_source_uses_placeholder() {
        let request = BuildRequest::from_json("{}").unwrap();
        let (_root, ws) = setup(&request);
        let config = BuildConfig::builder()
            .engine_bin("/definitely/not/pdflatex")
            .build();

        compile(&ws, &request, &config).await.unwrap();

        let tex = ws
            .path(format!("{}.tex", ws.key().as_str()))
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(tex).unwrap(),
            crate::request::PLACEHOLDER_SOURCE
        );
    }
}
