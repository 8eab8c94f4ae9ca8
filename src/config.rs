//! Service-level configuration for the build pipeline.
//!
//! Everything an operator can tune lives in [`BuildConfig`], built via its
//! builder. Request-level knobs (engine, format, DPI) belong on
//! [`crate::request::BuildRequest`] instead; the split keeps one config
//! shareable across every request the process handles.
//!
//! Tool binaries are paths, not hardcoded names, for the same reason the
//! timeout is a field: tests point them at fake executables, and deployments
//! point them at non-PATH installs.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration shared by all builds handled by this process.
///
/// # Example
/// ```rust
/// use texforge::BuildConfig;
/// use std::time::Duration;
///
/// let config = BuildConfig::builder()
///     .temp_root("/var/tmp/texforge")
///     .tool_timeout(Duration::from_secs(120))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Root directory under which per-job workspaces are created.
    /// Default: `<system temp dir>/texforge`.
    pub temp_root: PathBuf,

    /// Hard wall-clock limit for each external tool invocation. Default: 60 s.
    ///
    /// One limit for every tool: a compiler stuck in an error loop and a
    /// rasterizer chewing on a pathological PDF are equally unwelcome, and
    /// the request is held open while either runs.
    pub tool_timeout: Duration,

    /// Override for the compiler binary. When set, it replaces whatever
    /// binary the requested engine would normally resolve to.
    pub engine_bin: Option<PathBuf>,

    /// The markup conversion tool. Default: `pandoc` from PATH.
    pub pandoc_bin: PathBuf,

    /// The rasterizer. Default: `magick` from PATH.
    pub magick_bin: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            temp_root: std::env::temp_dir().join("texforge"),
            tool_timeout: Duration::from_secs(60),
            engine_bin: None,
            pandoc_bin: PathBuf::from("pandoc"),
            magick_bin: PathBuf::from("magick"),
        }
    }
}

impl BuildConfig {
    /// Create a new builder seeded with the defaults.
    pub fn builder() -> BuildConfigBuilder {
        BuildConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BuildConfig`].
#[derive(Debug)]
pub struct BuildConfigBuilder {
    config: BuildConfig,
}

impl BuildConfigBuilder {
    pub fn temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.temp_root = root.into();
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        // Zero would fail every tool before it starts.
        self.config.tool_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    pub fn engine_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.config.engine_bin = Some(bin.into());
        self
    }

    pub fn pandoc_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.config.pandoc_bin = bin.into();
        self
    }

    pub fn magick_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.config.magick_bin = bin.into();
        self
    }

    pub fn build(self) -> BuildConfig {
        self.config
    }
}
