//! CLI binary for filecache.
//!
//! A thin shim over the library crate: `process` maps flags onto
//! `ProcessorConfig` and prints results, the other subcommands inspect and
//! maintain the cache database.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use filecache::{
    attachment_context, hash_content, resolve_input, CacheStore, CacheTtl, FileFingerprint,
    FileInput, FileProcessor, ProcessedFile, ProcessingCallback, ProcessingResult,
    ProcessorConfig, ProgressCallback, SqliteCacheStore, UploadPolicy,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per
/// file. Files finish out of order when `--concurrency` > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    cache_hits: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            cache_hits: AtomicUsize::new(0),
        })
    }
}

impl ProcessingCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
    }

    fn on_cache_hit(&self, _file_name: &str, _fingerprint: &FileFingerprint) {
        self.cache_hits.fetch_add(1, Ordering::SeqCst);
    }

    fn on_backend_start(&self, file_name: &str, kind: filecache::FileKind) {
        self.bar.set_message(format!("{kind}: {file_name}"));
    }

    fn on_file_complete(
        &self,
        file_name: &str,
        result: &ProcessingResult,
        from_cache: bool,
        elapsed: Duration,
    ) {
        let origin = if from_cache { "cached" } else { "extracted" };
        let line = if result.succeeded {
            let chars = result.extracted_content.as_deref().map_or(0, str::len);
            format!(
                "  {} {:<32}  {:<9}  {}  {}",
                green("✓"),
                file_name,
                origin,
                dim(&format!("{chars:>6} chars")),
                dim(&format!("{:.1}s", elapsed.as_secs_f64())),
            )
        } else {
            let reason = result.failure_reason.as_deref().unwrap_or("unknown error");
            format!(
                "  {} {:<32}  {:<9}  {}",
                red("✗"),
                file_name,
                origin,
                red(&truncate(reason, 80)),
            )
        };
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_file_rejected(&self, file_name: &str, content_type: &str) {
        self.bar.println(format!(
            "  {} {:<32}  {}",
            red("✗"),
            file_name,
            red(&format!("unsupported type {content_type}")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, succeeded: usize) {
        self.bar.finish_and_clear();
        let failed = total_files.saturating_sub(succeeded);
        let hits = self.cache_hits.load(Ordering::SeqCst);
        eprintln!(
            "{} {}/{} files processed  ({} from cache{})",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&succeeded.to_string()),
            total_files,
            hits,
            if failed > 0 {
                format!(", {} failed", red(&failed.to_string()))
            } else {
                String::new()
            },
        );
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let head: String = s.chars().take(max_chars - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract text from a PDF (cached on the second run)
  filecache process report.pdf

  # Describe a screenshot and a PDF in one batch, as chat-context blocks
  filecache process --context screenshot.png report.pdf

  # Download an attachment from blob storage
  filecache process https://blob.example.com/u/42/scan.png

  # Inspect and maintain the cache
  filecache hash report.pdf
  filecache lookup report.pdf
  filecache invalidate 9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08
  filecache sweep
  filecache stats --json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY            OpenAI API key
  ANTHROPIC_API_KEY         Anthropic API key
  GEMINI_API_KEY            Google Gemini API key
  FILECACHE_LLM_PROVIDER    Override provider (openai, anthropic, gemini, ollama)
  FILECACHE_VISION_MODEL    Override vision model ID
  FILECACHE_DB              Cache database path
  FILECACHE_PDFIUM_DIR      Directory containing the pdfium shared library
  RUST_LOG                  Log filter (overrides --verbose / --quiet)
"#;

/// Content-addressed extraction cache for PDF and image attachments.
#[derive(Parser, Debug)]
#[command(
    name = "filecache",
    version,
    about = "Extract text from PDFs and describe images, cached by content hash",
    long_about = "Extract text from PDF attachments and describe image attachments with a \
vision LLM. Results are cached in SQLite keyed by the SHA-256 of the file's bytes, so \
identical content is processed once regardless of its name.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Cache database file.
    #[arg(long, global = true, env = "FILECACHE_DB", default_value = "filecache.db")]
    db: PathBuf,

    /// Output structured JSON instead of text.
    #[arg(long, global = true, env = "FILECACHE_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FILECACHE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FILECACHE_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process files or URLs, answering from the cache when possible.
    Process(ProcessArgs),
    /// Show the cached entry for a file or fingerprint.
    Lookup {
        /// File path, URL or 64-character hex fingerprint.
        target: String,
    },
    /// Delete the cached entry for a file or fingerprint.
    Invalidate {
        /// File path, URL or 64-character hex fingerprint.
        target: String,
    },
    /// Delete every expired entry.
    Sweep,
    /// Delete every entry.
    Clear,
    /// Show live, expired and negative entry counts.
    Stats,
    /// Print the content fingerprint of files or URLs.
    Hash {
        #[arg(required = true)]
        inputs: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Local file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Declared content type; detected from the bytes when omitted.
    #[arg(long, env = "FILECACHE_CONTENT_TYPE")]
    content_type: Option<String>,

    /// Reject inputs that fail the upload allow-list and size limits.
    #[arg(long, env = "FILECACHE_ENFORCE_UPLOAD_POLICY")]
    enforce_upload_policy: bool,

    /// Print each result as the block handed to the chat model.
    #[arg(long)]
    context: bool,

    /// Vision LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "FILECACHE_VISION_MODEL")]
    model: Option<String>,

    /// Vision provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "FILECACHE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file containing a custom image-analysis prompt.
    #[arg(long, env = "FILECACHE_IMAGE_PROMPT")]
    image_prompt: Option<PathBuf>,

    /// Lifetime of a cached result in seconds.
    #[arg(long, env = "FILECACHE_TTL", default_value_t = filecache::config::DEFAULT_CACHE_TTL_SECS)]
    ttl: u64,

    /// Lifetime of a cached failure in seconds (defaults to --ttl).
    #[arg(long, env = "FILECACHE_NEGATIVE_TTL")]
    negative_ttl: Option<u64>,

    /// Per-file backend timeout in seconds.
    #[arg(long, env = "FILECACHE_BACKEND_TIMEOUT", default_value_t = 120)]
    backend_timeout: u64,

    /// Files processed concurrently.
    #[arg(short, long, env = "FILECACHE_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Max vision output tokens per image.
    #[arg(long, env = "FILECACHE_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Vision temperature (0.0–2.0).
    #[arg(long, env = "FILECACHE_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per image on vision failure (at most 10).
    #[arg(long, env = "FILECACHE_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "FILECACHE_PDFIUM_DIR")]
    pdfium_dir: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "FILECACHE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "FILECACHE_NO_PROGRESS")]
    no_progress: bool,
}

/// Download timeout for `lookup`/`invalidate`/`hash` targets given as URLs.
const TARGET_DOWNLOAD_TIMEOUT_SECS: u64 = 120;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs are suppressed while the progress bar is
    // active; the bar already reports every file.
    let show_progress = match &cli.command {
        Command::Process(args) => !cli.quiet && !args.no_progress && !cli.json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Process(args) => run_process(&cli, args, show_progress).await,
        Command::Lookup { target } => run_lookup(&cli, target).await,
        Command::Invalidate { target } => run_invalidate(&cli, target).await,
        Command::Sweep => {
            let removed = open_store(&cli, CacheTtl::default())?
                .sweep_expired()
                .await
                .context("Sweep failed")?;
            print_count(&cli, "removed", removed)
        }
        Command::Clear => {
            let removed = open_store(&cli, CacheTtl::default())?
                .clear()
                .await
                .context("Clear failed")?;
            print_count(&cli, "removed", removed)
        }
        Command::Stats => run_stats(&cli).await,
        Command::Hash { inputs } => {
            for input in inputs {
                let file = resolve_input(input, None, TARGET_DOWNLOAD_TIMEOUT_SECS)
                    .await
                    .with_context(|| format!("Failed to read {input}"))?;
                println!("{}  {}", hash_content(&file.bytes), input);
            }
            Ok(())
        }
    }
}

fn open_store(cli: &Cli, ttl: CacheTtl) -> Result<SqliteCacheStore> {
    SqliteCacheStore::open(&cli.db, ttl)
        .with_context(|| format!("Failed to open cache database {}", cli.db.display()))
}

fn print_count(cli: &Cli, label: &str, count: u64) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::json!({ label: count }));
    } else if !cli.quiet {
        println!("{label} {count} entries");
    }
    Ok(())
}

/// A target is a fingerprint when it parses as one, otherwise a path or URL
/// whose bytes are hashed.
async fn target_fingerprint(target: &str) -> Result<FileFingerprint> {
    if let Ok(fingerprint) = target.parse::<FileFingerprint>() {
        return Ok(fingerprint);
    }
    let file = resolve_input(target, None, TARGET_DOWNLOAD_TIMEOUT_SECS)
        .await
        .with_context(|| format!("'{target}' is neither a fingerprint nor a readable file"))?;
    Ok(hash_content(&file.bytes))
}

async fn run_process(cli: &Cli, args: &ProcessArgs, show_progress: bool) -> Result<()> {
    let mut files: Vec<FileInput> = Vec::with_capacity(args.inputs.len());
    for input in &args.inputs {
        let file = resolve_input(input, args.content_type.as_deref(), args.download_timeout)
            .await
            .with_context(|| format!("Failed to load {input}"))?;
        if args.enforce_upload_policy {
            UploadPolicy::default()
                .check(&file.file_name, &file.content_type, file.bytes.len())
                .with_context(|| format!("Upload rejected: {input}"))?;
        }
        files.push(file);
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ProcessingCallback>)
    } else {
        None
    };

    let config = build_config(args, progress_cb).await?;
    let store = Arc::new(open_store(cli, config.cache_ttl())?);
    let processor =
        FileProcessor::from_config(config, store).context("Failed to set up processor")?;

    let fingerprints: Vec<FileFingerprint> = files.iter().map(|f| hash_content(&f.bytes)).collect();
    let names: Vec<(String, String)> = files
        .iter()
        .map(|f| (f.file_name.clone(), f.content_type.clone()))
        .collect();
    let results = processor.process_batch(files).await;

    let processed: Vec<ProcessedFile> = names
        .into_iter()
        .zip(fingerprints)
        .zip(results)
        .map(|(((file_name, content_type), fingerprint), result)| ProcessedFile {
            file_name,
            content_type,
            fingerprint,
            result,
        })
        .collect();

    if cli.json {
        let json = serde_json::to_string_pretty(&processed).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    for file in &processed {
        if args.context {
            println!("{}\n", attachment_context(&file.file_name, &file.result));
            continue;
        }
        if processed.len() > 1 {
            println!("{}", bold(&format!("==> {} <==", file.file_name)));
        }
        match (&file.result.extracted_content, &file.result.failure_reason) {
            (Some(content), _) if file.result.succeeded => println!("{content}"),
            (_, reason) => eprintln!(
                "{} {}: {}",
                red("✗"),
                file.file_name,
                reason.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    Ok(())
}

async fn run_lookup(cli: &Cli, target: &str) -> Result<()> {
    let fingerprint = target_fingerprint(target).await?;
    let store = open_store(cli, CacheTtl::default())?;
    let entry = store.lookup(&fingerprint).await.context("Lookup failed")?;

    match entry {
        Some(entry) if cli.json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&entry).context("Failed to serialise entry")?
            );
        }
        Some(entry) => {
            println!("Fingerprint:  {}", entry.fingerprint);
            println!("File:         {}", entry.file_name);
            println!("Kind:         {}", entry.file_kind);
            println!("Content type: {}", entry.content_type);
            println!("Created:      {}", entry.created_at.to_rfc3339());
            println!("Expires:      {}", entry.expires_at.to_rfc3339());
            if entry.result.succeeded {
                println!("Status:       {}", green("succeeded"));
            } else {
                println!(
                    "Status:       {} ({})",
                    red("failed"),
                    entry.result.failure_reason.as_deref().unwrap_or("unknown error")
                );
            }
            if let Some(ref metadata) = entry.result.metadata {
                println!(
                    "Metadata:     {}",
                    serde_json::to_string(metadata).context("Failed to serialise metadata")?
                );
            }
            if let Some(ref content) = entry.result.extracted_content {
                println!("{}", dim("───"));
                println!("{content}");
            }
        }
        None if cli.json => println!("null"),
        None => {
            if !cli.quiet {
                eprintln!("{} no live entry for {}", cyan("○"), fingerprint);
            }
            std::process::exit(1);
        }
    }
    Ok(())
}

async fn run_invalidate(cli: &Cli, target: &str) -> Result<()> {
    let fingerprint = target_fingerprint(target).await?;
    let store = open_store(cli, CacheTtl::default())?;
    let removed = store
        .invalidate(&fingerprint)
        .await
        .context("Invalidate failed")?;
    print_count(cli, "removed", u64::from(removed))
}

async fn run_stats(cli: &Cli) -> Result<()> {
    let stats = open_store(cli, CacheTtl::default())?
        .stats()
        .await
        .context("Stats failed")?;
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
        );
    } else {
        println!("Database:  {}", cli.db.display());
        println!("Live:      {}", stats.live);
        println!("Expired:   {}", stats.expired);
        println!("Negative:  {}", stats.negative);
    }
    Ok(())
}

/// Map CLI args to `ProcessorConfig`.
async fn build_config(args: &ProcessArgs, progress: Option<ProgressCallback>) -> Result<ProcessorConfig> {
    let mut builder = ProcessorConfig::builder()
        .cache_ttl_secs(args.ttl)
        .backend_timeout_secs(args.backend_timeout)
        .concurrency(args.concurrency)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .max_retries(args.max_retries);

    if let Some(secs) = args.negative_ttl {
        builder = builder.negative_ttl_secs(secs);
    }
    if let Some(ref model) = args.model {
        builder = builder.vision_model(model.clone());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref path) = args.image_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read image prompt from {:?}", path))?;
        builder = builder.image_prompt(prompt);
    }
    if let Some(ref dir) = args.pdfium_dir {
        builder = builder.pdfium_library_dir(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
