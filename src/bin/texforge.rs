//! CLI binary for texforge.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! [`BuildRequest`], runs one build, and copies the artifact out of the
//! workspace before it is torn down.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use texforge::{build, resolve_source, BuildConfig, BuildRequest};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI definition ───────────────────────────────────────────────────────────

/// Compile LaTeX into a downloadable artifact (PDF, image, or markup).
#[derive(Parser, Debug)]
#[command(name = "texforge", version, about, long_about = None)]
struct Cli {
    /// LaTeX source: a file path, an HTTP/HTTPS URL, or '-' for stdin.
    source: String,

    /// Compiler backend: pdflatex, xelatex, lualatex, or context.
    #[arg(long, default_value = "pdflatex")]
    engine: String,

    /// Output format: pdf, raster, txt, md, or html.
    #[arg(long, default_value = "pdf")]
    format: String,

    /// Download filename (extension is stripped).
    #[arg(long, default_value = "file")]
    name: String,

    /// Rasterization resolution in DPI.
    #[arg(long, default_value_t = 200)]
    dpi: u32,

    /// Pixel format for raster output: png, jpg, webp, gif, tiff, avif, bmp.
    #[arg(long = "img-format", default_value = "png")]
    img_format: String,

    /// Where to write the artifact. Defaults to the download name in the
    /// current directory.
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Per-tool timeout in seconds.
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Root directory for per-job workspaces.
    #[arg(long, env = "TEXFORGE_TEMP_ROOT")]
    temp_root: Option<PathBuf>,

    /// Override the compiler binary (mostly for testing).
    #[arg(long, env = "TEXFORGE_ENGINE_BIN")]
    engine_bin: Option<PathBuf>,

    /// Path to the pandoc binary.
    #[arg(long, env = "TEXFORGE_PANDOC_BIN")]
    pandoc_bin: Option<PathBuf>,

    /// Path to the ImageMagick binary.
    #[arg(long, env = "TEXFORGE_MAGICK_BIN")]
    magick_bin: Option<PathBuf>,

    /// Verbose logging (-v: debug, -vv: trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn build_config(&self) -> BuildConfig {
        let mut builder =
            BuildConfig::builder().tool_timeout(std::time::Duration::from_secs(self.timeout));
        if let Some(root) = &self.temp_root {
            builder = builder.temp_root(root.clone());
        }
        if let Some(bin) = &self.engine_bin {
            builder = builder.engine_bin(bin.clone());
        }
        if let Some(bin) = &self.pandoc_bin {
            builder = builder.pandoc_bin(bin.clone());
        }
        if let Some(bin) = &self.magick_bin {
            builder = builder.magick_bin(bin.clone());
        }
        builder.build()
    }

    /// Assemble the wire-format request so flag values get exactly the
    /// same validation a JSON request would.
    fn build_request(&self, source_text: String) -> Result<BuildRequest> {
        let json = serde_json::json!({
            "tex": source_text,
            "engine": self.engine,
            "format": self.format,
            "name": self.name,
            "dpi": self.dpi,
            "imgFormat": self.img_format,
        });
        BuildRequest::from_json(&json.to_string()).map_err(Into::into)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("texforge={default_level}"))),
        )
        .with_writer(std::io::stderr)
        .init();

    let source_text = resolve_source(&cli.source, cli.timeout).await?;
    let request = cli.build_request(source_text)?;
    let config = cli.build_config();

    let output = match build(&request, &config).await {
        Ok(output) => output,
        Err(e) => {
            eprintln!("{} {}", red("✗"), e);
            std::process::exit(1);
        }
    };

    if !output.diagnostics.compile.succeeded {
        eprintln!(
            "{}",
            dim(&format!(
                "warning: compiler exited non-zero but produced output:\n{}",
                output.diagnostics.compile.output_excerpt()
            ))
        );
    }

    let out_path = cli
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(&output.artifact.download_name));
    let mime = output.artifact.mime_type();
    let download_name = output.artifact.download_name.clone();

    let bytes = output.into_bytes()?;
    std::fs::write(&out_path, &bytes)
        .with_context(|| format!("failed to write {}", out_path.display()))?;

    println!(
        "{} {} {}",
        green("✓"),
        bold(&download_name),
        dim(&format!("→ {} ({mime}, {} bytes)", out_path.display(), bytes.len()))
    );
    Ok(())
}
