mod walker;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use miette::{IntoDiagnostic, Result};
use sift_core::{IndexRunSummary, OutputFormat, ProgressEvent, SearchSummary, SiftConfig};
use sift_embed::provider_from_config;
use sift_index::{Engine, IndexOptions, SearchOptions, VectorIndex};
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = ".sift.toml";

#[derive(Parser)]
#[command(
    name = "sift",
    version,
    about = "Semantic code search over your repository",
    long_about = "Sift splits source files into syntax-aware chunks, embeds them with a local\n\
                  or hosted model, and answers natural-language queries with hybrid\n\
                  vector + keyword retrieval.\n\n\
                  Examples:\n  \
                    sift init                          Create a .sift.toml config file\n  \
                    sift index                         Index the current directory\n  \
                    sift search 'parse config file'    Find code by meaning\n  \
                    sift stats                         Show index size\n  \
                    sift doctor                        Check provider and index health"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .sift.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format: text or json
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Enable debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create a default .sift.toml configuration file
    Init,
    /// Index (or incrementally re-index) a directory
    #[command(long_about = "Index (or incrementally re-index) a directory.\n\n\
        Unchanged files are skipped and files that disappeared are removed from\n\
        the index. Ctrl-C stops cleanly after the current batch.\n\n\
        Examples:\n  sift index\n  sift index --path ../other-repo --full")]
    Index {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
        /// Drop the existing index and embed everything again
        #[arg(long)]
        full: bool,
    },
    /// Search the index with a natural-language query
    Search {
        /// What to look for
        query: String,
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
        /// Maximum results (default: from config)
        #[arg(long)]
        limit: Option<usize>,
        /// Similarity floor in [0, 1] (default: from config)
        #[arg(long)]
        min_similarity: Option<f64>,
        /// Vector search only, without keyword fusion
        #[arg(long)]
        no_hybrid: bool,
        /// Keep raw retrieval order
        #[arg(long)]
        no_rerank: bool,
    },
    /// Show index statistics
    Stats {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
    /// Delete everything in the index
    Clear {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
    /// Check configuration, provider and index
    Doctor {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
}

const DEFAULT_CONFIG: &str = r#"# Sift configuration

[chunker]
# token_budget = 1500
# max_workers = 4
# fallback_window_lines = 60

[embedding]
# provider = "ollama"            # "ollama", "voyage" or "openai"
# model = "nomic-embed-text"
# base_url = "http://localhost:11434"
# api_key = "..."                # or VOYAGE_API_KEY / OPENAI_API_KEY
# batch_size = 16
# max_retries = 3
# inter_batch_delay_ms = 100
# item_delay_ms = 50
# segment_identifiers = true
# requests_per_minute = 300
# tokens_per_minute = 1000000

[search]
# limit = 10
# min_similarity = 0.3
# hybrid = true
# rerank = true
# rrf_k = 60

[index]
# path = ".sift/index.db"
# lexical = true
"#;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("SIFT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(explicit: Option<&Path>) -> Result<SiftConfig> {
    match explicit {
        Some(path) => Ok(SiftConfig::from_file(path)?),
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                Ok(SiftConfig::from_file(default_path)?)
            } else {
                Ok(SiftConfig::default())
            }
        }
    }
}

fn index_path(root: &Path, config: &SiftConfig) -> PathBuf {
    root.join(&config.index.path)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn progress_bar(format: OutputFormat) -> ProgressBar {
    if format == OutputFormat::Json || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg} ({elapsed})")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

/// Flag raised on Ctrl-C; the indexing run checks it between batches.
fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nstopping after the current batch...");
            flag.store(true, Ordering::SeqCst);
        }
    });
    cancel
}

async fn run_index(config: SiftConfig, root: &Path, full: bool, format: OutputFormat) -> Result<()> {
    let files = walker::discover(root)?;
    let provider = provider_from_config(&config.embedding)?;
    let index = VectorIndex::open(&index_path(root, &config), config.index.lexical)?;
    let engine = Engine::new(config, provider, index);

    let bar = progress_bar(format);
    let cancel = cancel_on_ctrl_c();
    let report = |event: ProgressEvent| {
        bar.set_length(event.total as u64);
        bar.set_position(event.current as u64);
        bar.set_message(format!("{}: {}", event.phase, event.message));
    };
    let summary = engine
        .index_files(files, IndexOptions { full }, &report, Some(cancel.as_ref()))
        .await;
    bar.finish_and_clear();
    let summary = summary?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Text => print_index_summary(&summary),
    }
    if !summary.success && !summary.cancelled {
        std::process::exit(1);
    }
    Ok(())
}

fn print_index_summary(summary: &IndexRunSummary) {
    if summary.total_chunks == 0 && summary.errors.is_empty() {
        println!("Index is up to date ({} files checked)", summary.total_files);
        return;
    }
    println!(
        "Indexed {}/{} chunks from {} files in {:.1}s",
        summary.successful_chunks,
        summary.total_chunks,
        summary.total_files,
        summary.duration_ms as f64 / 1000.0,
    );
    if summary.cancelled {
        println!("Stopped early; run `sift index` again to finish.");
    }
    if !summary.errors.is_empty() {
        println!("\n{} problems:", summary.errors.len());
        for error in &summary.errors {
            println!("  {error}");
        }
    }
}

async fn run_search(
    config: SiftConfig,
    root: &Path,
    query: &str,
    options: SearchOptions,
    format: OutputFormat,
) -> Result<()> {
    let db = index_path(root, &config);
    // Searching a repository that was never indexed must not create a database.
    let index = if db.exists() {
        VectorIndex::open(&db, config.index.lexical)?
    } else {
        VectorIndex::in_memory(config.index.lexical)?
    };
    let provider = provider_from_config(&config.embedding)?;
    let engine = Engine::new(config, provider, index);
    let summary = engine.search(query, &options).await?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Text => print_search_summary(&summary),
    }
    Ok(())
}

fn print_search_summary(summary: &SearchSummary) {
    if !summary.index_ready {
        println!("Nothing indexed yet. Run `sift index` first.");
        return;
    }
    if let Some(error) = &summary.error {
        eprintln!("search failed: {error}");
    }
    if summary.results.is_empty() {
        println!("No results found.");
        return;
    }
    for (i, result) in summary.results.iter().enumerate() {
        let chunk = &result.chunk;
        println!(
            "{}. {}:{}-{} [{}] ({:.0})",
            i + 1,
            chunk.file_path,
            chunk.start_line,
            chunk.end_line,
            chunk.chunk_type,
            result.normalized_score.unwrap_or(result.similarity * 100.0),
        );
        for line in chunk.text.lines().take(3) {
            println!("   {line}");
        }
        println!();
    }
    println!(
        "{} results in {}ms",
        summary.total_results, summary.search_time_ms
    );
}

fn run_stats(config: &SiftConfig, root: &Path, format: OutputFormat) -> Result<()> {
    let db = index_path(root, config);
    if !db.exists() {
        match format {
            OutputFormat::Json => print_json(&serde_json::json!({ "indexed": false }))?,
            OutputFormat::Text => println!("No index at {}", db.display()),
        }
        return Ok(());
    }
    let index = VectorIndex::open(&db, config.index.lexical)?;
    let stats = index.stats()?;
    let dimensions = index.dimensions()?;
    let lexical = index.lexical_available()?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "indexed": true,
            "path": db,
            "stats": stats,
            "dimensions": dimensions,
            "lexical": lexical,
        }))?,
        OutputFormat::Text => {
            println!("Index:      {}", db.display());
            println!("Files:      {}", stats.file_count);
            println!("Chunks:     {}", stats.chunk_count);
            println!(
                "Dimensions: {}",
                dimensions.map_or_else(|| "-".to_string(), |d| d.to_string())
            );
            println!("Keyword:    {}", if lexical { "on" } else { "off" });
            println!("Size:       {} bytes", stats.storage_bytes);
        }
    }
    Ok(())
}

fn run_clear(config: &SiftConfig, root: &Path) -> Result<()> {
    let db = index_path(root, config);
    if !db.exists() {
        println!("No index at {}", db.display());
        return Ok(());
    }
    VectorIndex::open(&db, config.index.lexical)?.clear()?;
    println!("Cleared {}", db.display());
    Ok(())
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self, color: bool) -> &'static str {
        match (self.status, color) {
            ("pass", true) => "\x1b[32m\u{2713}\x1b[0m",
            ("pass", false) => "\u{2713}",
            ("fail", true) => "\x1b[31m\u{2717}\x1b[0m",
            ("fail", false) => "\u{2717}",
            (_, true) => "\x1b[33m~\x1b[0m",
            (_, false) => "~",
        }
    }
}

async fn run_doctor(config: &SiftConfig, root: &Path, format: OutputFormat) -> Result<()> {
    let mut checks = Vec::new();

    if Path::new(CONFIG_FILE).exists() {
        checks.push(CheckResult::pass("config_file", format!("{CONFIG_FILE} found")));
    } else {
        checks.push(CheckResult::info(
            "config_file",
            format!("{CONFIG_FILE} not found, using defaults (run 'sift init' to create one)"),
        ));
    }

    let embedding = &config.embedding;
    match provider_from_config(embedding) {
        Ok(provider) => {
            checks.push(CheckResult::pass(
                "embedding_provider",
                format!("{} (model: {})", provider.name(), provider.model()),
            ));
            if !provider.check_connection().await {
                checks.push(CheckResult::fail(
                    "provider_connection",
                    format!("cannot reach {}", provider.name()),
                    if embedding.provider.eq_ignore_ascii_case("ollama") {
                        "start it with 'ollama serve' or set embedding.base_url"
                    } else {
                        "check network access and embedding.base_url"
                    },
                ));
            } else if !provider.is_model_available().await {
                checks.push(CheckResult::fail(
                    "embedding_model",
                    format!("model `{}` not available", provider.model()),
                    if embedding.provider.eq_ignore_ascii_case("ollama") {
                        format!("run 'ollama pull {}'", provider.model())
                    } else {
                        "check embedding.model and your API key".to_string()
                    },
                ));
            } else {
                checks.push(CheckResult::pass(
                    "embedding_model",
                    format!("`{}` ready", provider.model()),
                ));
            }
        }
        Err(e) => checks.push(CheckResult::fail(
            "embedding_provider",
            e.to_string(),
            "fix the [embedding] section of .sift.toml",
        )),
    }

    let db = index_path(root, config);
    if db.exists() {
        match VectorIndex::open(&db, config.index.lexical).and_then(|index| {
            Ok((index.stats()?, index.dimensions()?, index.lexical_available()?))
        }) {
            Ok((stats, dimensions, lexical)) => {
                let dims = dimensions.map_or_else(|| "-".to_string(), |d| d.to_string());
                checks.push(CheckResult::pass(
                    "search_index",
                    format!(
                        "{} chunks from {} files, {dims} dimensions",
                        stats.chunk_count, stats.file_count
                    ),
                ));
                if !lexical && stats.chunk_count > 0 {
                    checks.push(CheckResult::info(
                        "keyword_index",
                        "unavailable, searches use vectors only",
                    ));
                }
            }
            Err(e) => checks.push(CheckResult::fail(
                "search_index",
                e.to_string(),
                "run 'sift clear' or delete the index file",
            )),
        }
    } else {
        checks.push(CheckResult::info(
            "search_index",
            "not found (run 'sift index' to create)",
        ));
    }

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "checks": checks,
        }))?,
        OutputFormat::Text => {
            let color = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
            println!("sift v{} environment check\n", env!("CARGO_PKG_VERSION"));
            for check in &checks {
                let label = check.name.replace('_', " ");
                println!("  {} {label:<20} {}", check.symbol(color), check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            println!("\n{} checks, {failed} failed", checks.len());
        }
    }
    Ok(())
}

fn print_welcome() {
    println!("sift v{} - semantic code search\n", env!("CARGO_PKG_VERSION"));
    println!("Quick start:");
    println!("  sift init                 Create a .sift.toml config file");
    println!("  sift index                Index the current directory");
    println!("  sift search '<query>'     Search by meaning\n");
    println!("Run 'sift <command> --help' for details.");
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(miette::MietteHandlerOpts::new().terminal_links(true).build())
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        None => print_welcome(),
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Index { ref path, full }) => {
            run_index(config, path, full, cli.format).await?;
        }
        Some(Command::Search {
            ref query,
            ref path,
            limit,
            min_similarity,
            no_hybrid,
            no_rerank,
        }) => {
            let mut options = SearchOptions::from(&config.search);
            if let Some(limit) = limit {
                options.limit = limit;
            }
            if let Some(min) = min_similarity {
                options.min_similarity = min.clamp(0.0, 1.0);
            }
            options.hybrid &= !no_hybrid;
            options.rerank &= !no_rerank;
            run_search(config, path, query, options, cli.format).await?;
        }
        Some(Command::Stats { ref path }) => run_stats(&config, path, cli.format)?,
        Some(Command::Clear { ref path }) => run_clear(&config, path)?,
        Some(Command::Doctor { ref path }) => run_doctor(&config, path, cli.format).await?,
    }

    Ok(())
}
