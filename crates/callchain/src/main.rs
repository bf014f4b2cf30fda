//! callchain: Java method call-chain extractor
//!
//! Analyzes a Java project into a method call graph, persists it as a JSON
//! artifact and answers call-chain queries against saved artifacts.

mod config;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use callchain_graph::{
    Analyzer, CancelFlag, FileWatcher, GraphStore, LoadedArtifact, PersistOutcome, QueryEngine,
    ResolutionMode, load_artifact, persist, read_artifact, watch_until_cancelled,
};
use config::{CALLCHAIN_DIR, CONFIG_FILE, Config, DEFAULT_CONFIG, artifact_path};

/// Depth and count of the sample chains reported after an analysis.
const SAMPLE_DEPTH: usize = 3;
const SAMPLE_LIMIT: usize = 3;

/// How often watch mode checks for cancellation while idle.
const WATCH_POLL: Duration = Duration::from_millis(250);

/// Extract and query method call chains of Java projects
///
/// Usage: `callchain [OPTIONS] <PROJECT_PATH>` analyzes a project and writes
/// `<OUTPUT>/<project>_java_call_chain.json`.
#[derive(Parser)]
#[command(name = "callchain")]
#[command(version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to .callchain directory (default: search for .callchain/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    analyze: AnalyzeArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Root directory of the Java project
    project_path: Option<PathBuf>,

    /// Output directory, or artifact file if it ends in .json [default: output]
    #[arg(short, long, env = "CALLCHAIN_OUTPUT")]
    output: Option<PathBuf>,

    /// Register all declarations of a file before resolving its calls
    #[arg(long)]
    two_pass: bool,

    /// Extraction worker threads (0 = one per CPU)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Keep running and re-analyze when sources change
    #[arg(long)]
    watch: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Find call chains between two methods in a saved artifact
    Chains {
        /// Artifact written by a previous analysis
        artifact: PathBuf,
        /// Start method key, e.g. "OrderService.placeOrder(String, int)"
        start: String,
        /// End method key
        end: String,
        /// Maximum chain length in edges [default: from config, 10]
        #[arg(long)]
        max_depth: Option<usize>,
        /// Print JSON instead of one chain per line
        #[arg(long)]
        json: bool,
    },

    /// List the methods calling a method
    Callers {
        /// Artifact written by a previous analysis
        artifact: PathBuf,
        /// Method key
        key: String,
        /// Print JSON instead of one key per line
        #[arg(long)]
        json: bool,
    },

    /// List the methods called by a method
    Callees {
        /// Artifact written by a previous analysis
        artifact: PathBuf,
        /// Method key
        key: String,
        /// Print JSON instead of one key per line
        #[arg(long)]
        json: bool,
    },

    /// Initialize a new .callchain directory with config file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

fn log_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize logging for one-shot commands.
/// Logs to stderr so query output on stdout stays clean.
fn init_logging(verbose: bool) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(log_filter(verbose))
        .init();
}

/// Initialize logging for watch mode.
/// Logs to rotating files in .callchain/logs/ with daily rotation.
fn init_file_logging(callchain_dir: &Path, verbose: bool) {
    let logs_dir = callchain_dir.join("logs");

    if let Err(e) = std::fs::create_dir_all(&logs_dir) {
        eprintln!("Warning: Failed to create logs directory: {}", e);
        // Fall back to stderr logging
        init_logging(verbose);
        return;
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "callchain.log");

    // Use non-blocking writer to avoid blocking on log writes
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard would stop logging
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(log_filter(verbose))
        .init();
}

/// Load config from an explicit .callchain directory or by discovery.
fn load_config(override_path: Option<&PathBuf>) -> Result<(Config, Option<PathBuf>)> {
    let (config, callchain_dir) = match override_path {
        Some(path) => {
            // Explicit path override - treat as path to .callchain directory
            let config_file = if path.is_dir() {
                path.join(CONFIG_FILE)
            } else {
                path.clone()
            };
            let callchain_dir = config_file.parent().unwrap_or(path).to_path_buf();
            (Config::from_file(&config_file)?, Some(callchain_dir))
        }
        None => match Config::find_and_load()? {
            Some((config, dir)) => (config, Some(dir)),
            None => (Config::default(), None),
        },
    };

    let errors = config.validate();
    if !errors.is_empty() {
        let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::bail!("Invalid configuration:\n  {}", details.join("\n  "));
    }

    Ok((config, callchain_dir))
}

/// Set `cancel` on SIGINT or SIGTERM. A second signal exits immediately.
fn install_signal_handlers(cancel: &CancelFlag) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::flag;

    for signal in [SIGTERM, SIGINT] {
        // Registered first so it sees the flag before this signal sets it
        flag::register_conditional_shutdown(signal, 1, cancel.as_atomic())?;
        flag::register(signal, cancel.as_atomic())?;
    }
    Ok(())
}

/// Analyze `root`, write the artifact and log a few sample chains.
fn analyze_once(analyzer: &Analyzer, root: &Path, destination: &Path) -> Result<()> {
    let report = analyzer.analyze(root)?;
    let stats = report.store.stats();
    info!(
        "Analyzed {} files ({} skipped, {} rejected): {} methods declared, {} external and {} unknown targets, {} calls",
        report.stats.files_processed,
        report.stats.files_skipped,
        report.stats.files_failed,
        stats.declared,
        stats.external,
        stats.unknown,
        stats.edge_count
    );

    match persist(&report.store, destination) {
        Ok(PersistOutcome::Written { path, bytes }) => {
            info!("Saved call chain to {} ({} bytes)", path.display(), bytes);
        }
        Ok(PersistOutcome::Skipped) => {
            info!("No Java methods found, nothing saved");
        }
        Err(e) => {
            error!("Failed to save call chain: {}", e);
            return Err(e.into());
        }
    }

    if let Some(sample) = QueryEngine::new(&report.store).sample_chains(SAMPLE_DEPTH, SAMPLE_LIMIT)
    {
        info!(
            "Call chains from {} to {}: {} found",
            sample.start, sample.end, sample.total
        );
        for chain in &sample.chains {
            info!("  {}", chain.join(" -> "));
        }
    }

    Ok(())
}

fn run_analyze(args: AnalyzeArgs, config: &Config) -> Result<()> {
    let project_path = args
        .project_path
        .context("PROJECT_PATH is required unless a subcommand is given")?;
    if !project_path.exists() {
        anyhow::bail!("Project path does not exist: {}", project_path.display());
    }
    // Canonicalize to resolve relative paths like "." or ".."
    let root = project_path.canonicalize().unwrap_or(project_path);

    let mut analyzer_config = config.analyzer_config();
    if args.two_pass {
        analyzer_config.mode = ResolutionMode::TwoPass;
    }
    if let Some(jobs) = args.jobs {
        analyzer_config.jobs = jobs;
    }

    let output = args.output.unwrap_or_else(|| config.output.path.clone());
    let destination = artifact_path(&output, &root);

    info!(
        "Analyzing {} -> {} ({})",
        root.display(),
        destination.display(),
        analyzer_config.mode.as_str()
    );

    let cancel = CancelFlag::new();
    install_signal_handlers(&cancel)?;
    let analyzer = Analyzer::new(analyzer_config).with_cancel_flag(cancel.clone());

    analyze_once(&analyzer, &root, &destination)?;

    if args.watch {
        let watcher = FileWatcher::with_config(&root, config.watcher_config())?;
        info!("Watching {} for changes", root.display());

        watch_until_cancelled(&watcher, &cancel, WATCH_POLL, |changes| {
            info!(
                "{} source change(s), {} removed; re-analyzing",
                changes.len(),
                changes.deleted().count()
            );
            if let Err(e) = analyze_once(&analyzer, &root, &destination) {
                warn!("Re-analysis failed: {}", e);
            }
        });

        info!("Watch stopped");
    }

    Ok(())
}

/// Load a saved artifact into a store for querying.
fn load_store(artifact: &Path, config: &Config) -> Result<GraphStore> {
    let artifact = match load_artifact(artifact, config.fallback.size_threshold_bytes)? {
        LoadedArtifact::Missing => {
            anyhow::bail!("Artifact not found: {}", artifact.display())
        }
        LoadedArtifact::Oversized { path, bytes } => {
            warn!(
                "{} is {} bytes, above the {} byte similarity-search threshold; loading anyway",
                path.display(),
                bytes,
                config.fallback.size_threshold_bytes
            );
            read_artifact(&path)?
        }
        LoadedArtifact::Parsed(artifact) => artifact,
    };
    Ok(GraphStore::from_artifact(&artifact))
}

fn print_keys(keys: &[&str], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(keys)?);
    } else {
        for key in keys {
            println!("{key}");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_dir) = load_config(cli.config.as_ref())?;

    let watching = cli.command.is_none() && cli.analyze.watch;
    if watching {
        let callchain_dir = config_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(CALLCHAIN_DIR));
        init_file_logging(&callchain_dir, cli.verbose);
    } else {
        init_logging(cli.verbose);
    }

    if let Some(dir) = &config_dir {
        info!("Loaded config from {}", dir.join(CONFIG_FILE).display());
    }

    match cli.command {
        None => run_analyze(cli.analyze, &config)?,

        Some(Commands::Chains {
            artifact,
            start,
            end,
            max_depth,
            json,
        }) => {
            let store = load_store(&artifact, &config)?;
            let max_depth = max_depth.unwrap_or(config.query.max_depth);
            let chains = QueryEngine::new(&store).find_chains(&start, &end, max_depth);

            if json {
                println!("{}", serde_json::to_string_pretty(&chains)?);
            } else {
                for chain in &chains {
                    println!("{}", chain.join(" -> "));
                }
                info!("{} chain(s) within depth {}", chains.len(), max_depth);
            }
        }

        Some(Commands::Callers {
            artifact,
            key,
            json,
        }) => {
            let store = load_store(&artifact, &config)?;
            print_keys(&QueryEngine::new(&store).callers(&key), json)?;
        }

        Some(Commands::Callees {
            artifact,
            key,
            json,
        }) => {
            let store = load_store(&artifact, &config)?;
            print_keys(&QueryEngine::new(&store).callees(&key), json)?;
        }

        Some(Commands::Init { force }) => {
            let callchain_dir = cli.config.unwrap_or_else(|| PathBuf::from(CALLCHAIN_DIR));
            let config_path = callchain_dir.join(CONFIG_FILE);

            if config_path.exists() && !force {
                anyhow::bail!(
                    "{} already exists. Use --force to overwrite.",
                    config_path.display()
                );
            }

            if !callchain_dir.exists() {
                std::fs::create_dir_all(&callchain_dir)?;
                info!("Created {}/", callchain_dir.display());
            }

            std::fs::write(&config_path, DEFAULT_CONFIG)?;
            info!("Created {}", config_path.display());
            info!("Next steps:");
            info!("  1. Edit {} to configure the analysis", config_path.display());
            info!("  2. Run 'callchain <PROJECT_PATH>' to extract the call graph");
            info!("  3. Run 'callchain chains <ARTIFACT> <START> <END>' to query it");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_analyze_args() {
        let cli = Cli::try_parse_from([
            "callchain",
            "shop",
            "-o",
            "out/graph.json",
            "--two-pass",
            "-j",
            "4",
        ])
        .unwrap();

        assert!(cli.command.is_none());
        assert_eq!(cli.analyze.project_path, Some(PathBuf::from("shop")));
        assert_eq!(cli.analyze.output, Some(PathBuf::from("out/graph.json")));
        assert!(cli.analyze.two_pass);
        assert_eq!(cli.analyze.jobs, Some(4));
        assert!(!cli.analyze.watch);
    }

    #[test]
    fn test_parse_chains_subcommand() {
        let cli = Cli::try_parse_from([
            "callchain",
            "chains",
            "graph.json",
            "A.foo()",
            "A.bar()",
            "--max-depth",
            "3",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Chains {
                start,
                end,
                max_depth,
                json,
                ..
            }) => {
                assert_eq!(start, "A.foo()");
                assert_eq!(end, "A.bar()");
                assert_eq!(max_depth, Some(3));
                assert!(!json);
            }
            _ => panic!("expected chains subcommand"),
        }
    }

    #[test]
    fn test_project_path_conflicts_with_subcommand() {
        assert!(Cli::try_parse_from(["callchain", "shop", "init"]).is_err());
    }
}
