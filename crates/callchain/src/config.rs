//! Configuration file support for callchain.
//!
//! Settings live in `.callchain/config.toml`; watch-mode logs go to
//! `.callchain/logs/`. Config discovery searches for `.callchain/config.toml`
//! starting from the current directory and walking up to parent directories.
//! Command-line flags take precedence over file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use callchain_graph::{
    AnalyzerConfig, DEFAULT_MAX_DEPTH, DEFAULT_SIZE_THRESHOLD, ResolutionMode, WatcherConfig,
};
use serde::{Deserialize, Serialize};

/// The callchain data directory name.
pub const CALLCHAIN_DIR: &str = ".callchain";
/// The config file name within the callchain directory.
pub const CONFIG_FILE: &str = "config.toml";
/// Suffix of the artifact file written into an output directory.
pub const ARTIFACT_SUFFIX: &str = "_java_call_chain.json";

/// Written by `callchain init`.
pub const DEFAULT_CONFIG: &str = r#"# callchain configuration

[analysis]
resolution = "single_pass"  # Options: "single_pass", "two_pass"
jobs = 0                    # Worker threads, 0 = one per CPU
extensions = ["java"]
respect_gitignore = true

[output]
path = "output"  # Directory, or a file path ending in .json

[query]
max_depth = 10

[fallback]
size_threshold_bytes = 512000  # Larger artifacts go to similarity search

[watch]
debounce_ms = 300
"#;

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub analysis: AnalysisConfig,
    pub output: OutputConfig,
    pub query: QueryConfig,
    pub fallback: FallbackConfig,
    pub watch: WatchConfig,
}

/// How source files are found and resolved.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub resolution: ResolutionMode,
    /// Extraction worker threads; 0 means one per CPU.
    pub jobs: usize,
    /// File extensions to analyze.
    pub extensions: Vec<String>,
    pub respect_gitignore: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            resolution: ResolutionMode::SinglePass,
            jobs: 0,
            extensions: vec!["java".to_string()],
            respect_gitignore: true,
        }
    }
}

/// Where the artifact is written.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output directory, or artifact file if it ends in `.json`.
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("output"),
        }
    }
}

/// Query defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Maximum chain length in edges.
    pub max_depth: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Artifact size above which consumers hand the file to similarity search.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub size_threshold_bytes: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            size_threshold_bytes: DEFAULT_SIZE_THRESHOLD,
        }
    }
}

/// Watch-mode settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Find and load configuration from current or parent directories.
    pub fn find_and_load() -> Result<Option<(Self, PathBuf)>> {
        let current = std::env::current_dir()?;
        Self::find_and_load_from(&current)
    }

    /// Find and load configuration starting from a specific directory.
    ///
    /// Returns the config and the `.callchain` directory it was found in.
    pub fn find_and_load_from(start: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start.to_path_buf();

        loop {
            let callchain_dir = dir.join(CALLCHAIN_DIR);
            let config_path = callchain_dir.join(CONFIG_FILE);
            if config_path.exists() {
                let config = Self::from_file(&config_path)?;
                return Ok(Some((config, callchain_dir)));
            }

            if !dir.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Analyzer settings from the `[analysis]` section.
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            mode: self.analysis.resolution,
            jobs: self.analysis.jobs,
            extensions: self.analysis.extensions.clone(),
            respect_gitignore: self.analysis.respect_gitignore,
        }
    }

    /// Watcher settings matching what the analyzer discovers.
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            debounce_duration: Duration::from_millis(self.watch.debounce_ms),
            extensions: self.analysis.extensions.clone(),
            use_gitignore: self.analysis.respect_gitignore,
            ..WatcherConfig::default()
        }
    }

    /// Validate the configuration.
    ///
    /// Returns a list of validation errors if any are found.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.analysis.extensions.is_empty() {
            errors.push(ConfigValidationError {
                field: "analysis.extensions".to_string(),
                message: "At least one file extension is required.".to_string(),
            });
        }

        if let Some(ext) = self
            .analysis
            .extensions
            .iter()
            .find(|e| e.is_empty() || e.starts_with('.'))
        {
            errors.push(ConfigValidationError {
                field: "analysis.extensions".to_string(),
                message: format!("Invalid extension '{ext}'. Use names like \"java\"."),
            });
        }

        if self.output.path.as_os_str().is_empty() {
            errors.push(ConfigValidationError {
                field: "output.path".to_string(),
                message: "Output path cannot be empty.".to_string(),
            });
        }

        if self.fallback.size_threshold_bytes == 0 {
            errors.push(ConfigValidationError {
                field: "fallback.size_threshold_bytes".to_string(),
                message: "Size threshold must be greater than zero.".to_string(),
            });
        }

        errors
    }
}

/// Configuration validation error.
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigValidationError {}

/// Artifact location for `project_root`.
///
/// An `output` ending in `.json` is the artifact itself; anything else is a
/// directory that receives `<project>_java_call_chain.json`.
pub fn artifact_path(output: &Path, project_root: &Path) -> PathBuf {
    let is_file = output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_file {
        return output.to_path_buf();
    }

    let project = project_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    output.join(format!("{project}{ARTIFACT_SUFFIX}"))
}
