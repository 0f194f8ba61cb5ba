//! CLI binary for edgequake-pdfchunk.
//!
//! A thin shim over the library crate: maps CLI flags onto
//! `PipelineConfig`, picks an artifact store, and prints a summary.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pdfchunk::{
    ArtifactStore, AzureBlobConfig, AzureBlobStore, BatchReport, DocumentReport, DocumentSource,
    DocumentStatus, FsArtifactStore, ImageDecodeError, PipelineConfig, PipelineDriver,
    PipelineObserver, DEFAULT_CHUNK_SIZE,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Terminal observer using indicatif ────────────────────────────────────────

/// Renders one progress bar over all chunks of the run, growing as each
/// document's chunks are planned, plus one log line per chunk.
struct CliObserver {
    bar: ProgressBar,
    chunk_errors: AtomicUsize,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            chunk_errors: AtomicUsize::new(0),
        })
    }
}

impl PipelineObserver for CliObserver {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.println(format!(
            "{} {}",
            bold("◆"),
            bold(&format!("Processing {total_documents} document(s)…"))
        ));
    }

    fn on_document_start(&self, document: &str) {
        self.bar.set_prefix(document.to_string());
        self.bar.set_message("reading…");
    }

    fn on_chunks_planned(&self, document: &str, total_pages: usize, total_chunks: usize) {
        self.bar.inc_length(total_chunks as u64);
        self.bar.println(format!(
            "  {} {}  {}",
            bold("▸"),
            document,
            dim(&format!("{total_pages} pages → {total_chunks} chunks"))
        ));
    }

    fn on_image_skipped(&self, document: &str, error: &ImageDecodeError) {
        self.bar
            .println(format!("    {} {}: {}", yellow("!"), document, dim(&error.to_string())));
    }

    fn on_chunk_start(&self, _document: &str, chunk_index: usize, total_chunks: usize) {
        self.bar
            .set_message(format!("chunk {}/{}", chunk_index + 1, total_chunks));
    }

    fn on_rate_limited(&self, _document: &str, chunk_index: usize, retry: u32, wait: Duration) {
        self.bar.println(format!(
            "    {} chunk {:>3}  rate limited, retry {} in {}s",
            yellow("⏸"),
            chunk_index + 1,
            retry,
            wait.as_secs()
        ));
    }

    fn on_chunk_complete(&self, _document: &str, chunk_index: usize, total_chunks: usize, output_len: usize) {
        let detail = if output_len == 0 {
            "skipped (no text)".to_string()
        } else {
            format!("{output_len:>6} chars")
        };
        self.bar.println(format!(
            "    {} chunk {:>3}/{:<3}  {}",
            green("✓"),
            chunk_index + 1,
            total_chunks,
            dim(&detail)
        ));
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, _document: &str, chunk_index: usize, total_chunks: usize, error: &str) {
        self.chunk_errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "    {} chunk {:>3}/{:<3}  {}",
            red("✗"),
            chunk_index + 1,
            total_chunks,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, report: &DocumentReport) {
        self.bar.println(document_line(report));
    }

    fn on_batch_complete(&self, _report: &BatchReport) {
        self.bar.finish_and_clear();
        let errors = self.chunk_errors.load(Ordering::SeqCst);
        if errors > 0 {
            eprintln!("{} {} chunk(s) failed; see the manifests for details", yellow("⚠"), errors);
        }
    }
}

fn document_line(report: &DocumentReport) -> String {
    match report.status {
        DocumentStatus::Failed => format!(
            "  {} {}  {}",
            red("✘"),
            report.document,
            red(report.error.as_deref().unwrap_or("failed"))
        ),
        DocumentStatus::Empty => format!("  {} {}  {}", yellow("∅"), report.document, dim("no pages")),
        DocumentStatus::Completed => format!(
            "  {} {}  {}/{} chunks, {} images  {}",
            green("✔"),
            report.document,
            report.chunks_succeeded,
            report.total_chunks,
            report.images_stored,
            dim(&format!("{:.1}s", report.duration_ms as f64 / 1000.0)),
        ),
    }
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process every PDF in a directory into ./output
  pdfchunk run specs/ -o output

  # One file, 20 pages per chunk
  pdfchunk run specs/orders_api.pdf --chunk-size 20

  # Interactive: prompts for the path and chunk size
  pdfchunk run

  # Every PDF in an Azure Blob container (outputs written back to it)
  pdfchunk blob-run

  # One document from the container (".pdf" is optional)
  pdfchunk blob-run orders_api

  # List PDFs in the container, or in a local directory
  pdfchunk list
  pdfchunk list specs/

ARTIFACTS (per document):
  {doc}_part{i}_pages{start}-{end}.md   one Markdown file per chunk
  images/{doc}_page{N}_img{K}_{hash}.png  embedded images
  {doc}_metadata.json                    manifest

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY               OpenAI API key
  ANTHROPIC_API_KEY            Anthropic API key
  EDGEQUAKE_LLM_PROVIDER       Provider (openai, anthropic, gemini, azure, ollama)
  EDGEQUAKE_MODEL              Model ID
  AZURE_STORAGE_CONTAINER_URL  https://<account>.blob.core.windows.net/<container>
  AZURE_STORAGE_SAS_TOKEN      SAS token with read/write/list rights
  PDFIUM_LIB_PATH              Path to libpdfium (file or directory)
  RUST_LOG                     Log filter override, e.g. edgequake_pdfchunk=debug
"#;

/// Convert large technical PDFs into chunked Markdown, images and a manifest.
#[derive(Parser, Debug)]
#[command(
    name = "pdfchunk",
    version,
    about = "Convert large technical PDFs into chunked Markdown with an LLM",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFCHUNK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFCHUNK_QUIET")]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "PDFCHUNK_NO_PROGRESS")]
    no_progress: bool,

    /// Print the batch report as JSON on stdout.
    #[arg(long, global = true, env = "PDFCHUNK_JSON")]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a local PDF file or every PDF in a directory.
    Run {
        /// PDF file or directory. Prompted for when omitted.
        path: Option<PathBuf>,

        /// Directory artifacts are written to.
        #[arg(short, long, env = "PDFCHUNK_OUTPUT", default_value = "output")]
        output: PathBuf,
    },
    /// Process PDFs stored in an Azure Blob container.
    BlobRun {
        /// One document to process; every PDF under --prefix when omitted.
        name: Option<String>,

        #[command(flatten)]
        azure: AzureArgs,
    },
    /// List the PDFs that would be processed.
    List {
        /// Local directory; the Azure container when omitted.
        dir: Option<PathBuf>,

        #[command(flatten)]
        azure: AzureArgs,
    },
}

#[derive(Args, Debug)]
struct AzureArgs {
    /// Container URL.
    #[arg(long, env = "AZURE_STORAGE_CONTAINER_URL")]
    container_url: Option<String>,

    /// SAS token.
    #[arg(long, env = "AZURE_STORAGE_SAS_TOKEN", hide_env_values = true)]
    sas_token: Option<String>,

    /// Only consider blobs whose name starts with this prefix.
    #[arg(long, env = "PDFCHUNK_PREFIX", default_value = "")]
    prefix: String,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Pages per chunk. Prompted for in interactive mode.
    #[arg(long, global = true, env = "PDFCHUNK_CHUNK_SIZE",
          value_parser = clap::value_parser!(u64).range(1..))]
    chunk_size: Option<u64>,

    /// LLM model ID.
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, azure, ollama.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Max LLM output tokens per chunk.
    #[arg(long, global = true, env = "PDFCHUNK_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "PDFCHUNK_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Seconds to wait after a rate-limit response.
    #[arg(long, global = true, env = "PDFCHUNK_BACKOFF", default_value_t = 60)]
    backoff: u64,

    /// Rate-limit retries per chunk; 0 retries forever.
    #[arg(long, global = true, env = "PDFCHUNK_MAX_RETRIES", default_value_t = 10)]
    max_retries: u32,

    /// Pause between chunks in milliseconds.
    #[arg(long, global = true, env = "PDFCHUNK_PACING_MS", default_value_t = 2000)]
    pacing_ms: u64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, global = true, env = "PDFCHUNK_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "PDFCHUNK_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Documents processed at the same time.
    #[arg(long, global = true, env = "PDFCHUNK_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, global = true, env = "PDFCHUNK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Text file with a system message sent before each chunk.
    #[arg(long, global = true, env = "PDFCHUNK_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Text file replacing the built-in conversion instructions.
    #[arg(long, global = true, env = "PDFCHUNK_INSTRUCTIONS")]
    instructions: Option<PathBuf>,

    /// Send chunks without extracted text to the LLM anyway.
    #[arg(long, global = true, env = "PDFCHUNK_KEEP_BLANK")]
    keep_blank: bool,

    /// Keep model output exactly as returned.
    #[arg(long, global = true, env = "PDFCHUNK_RAW_OUTPUT")]
    raw_output: bool,
}

// ── Interactive prompts ──────────────────────────────────────────────────────

fn prompt_line(label: &str) -> Result<String> {
    eprint!("{label}");
    io::stderr().flush().ok();
    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    if read == 0 {
        bail!("No input (stdin closed)");
    }
    Ok(line.trim().to_string())
}

fn prompt_path() -> Result<PathBuf> {
    loop {
        let answer = prompt_line("PDF file or directory: ")?;
        if answer.is_empty() {
            continue;
        }
        let path = PathBuf::from(answer);
        if path.exists() {
            return Ok(path);
        }
        eprintln!("{} '{}' does not exist, try again.", red("✗"), path.display());
    }
}

fn prompt_chunk_size() -> Result<usize> {
    loop {
        let answer = prompt_line(&format!("Pages per chunk [{DEFAULT_CHUNK_SIZE}]: "))?;
        if answer.is_empty() {
            return Ok(DEFAULT_CHUNK_SIZE);
        }
        match answer.parse::<usize>() {
            Ok(n) if n >= 1 => return Ok(n),
            _ => eprintln!("{} Enter a whole number ≥ 1.", red("✗")),
        }
    }
}

// ── main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs are suppressed while the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::List { dir, azure } => list(dir.as_deref(), azure).await,
        Command::Run { path, output } => {
            let (path, interactive) = match path {
                Some(p) => (p.clone(), false),
                None => (prompt_path()?, true),
            };
            let chunk_size = match cli.pipeline.chunk_size {
                Some(n) => n as usize,
                None if interactive => prompt_chunk_size()?,
                None => DEFAULT_CHUNK_SIZE,
            };
            let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(output));
            let driver = build_driver(&cli, chunk_size, show_progress, store).await?;

            let batch = if path.is_dir() {
                driver
                    .process_directory(&path)
                    .await
                    .with_context(|| format!("Failed to list {}", path.display()))?
            } else {
                driver
                    .process_batch(vec![DocumentSource::Path(path.clone())])
                    .await
            };
            finish(&cli, &batch, show_progress)
        }
        Command::BlobRun { name, azure } => {
            let store: Arc<dyn ArtifactStore> = Arc::new(azure_store(azure, cli.pipeline.api_timeout)?);
            let chunk_size = cli
                .pipeline
                .chunk_size
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_CHUNK_SIZE);
            let driver = build_driver(&cli, chunk_size, show_progress, store).await?;

            let batch = match name {
                Some(name) => {
                    let report = driver.process_named(name).await.context("Cannot process document")?;
                    let elapsed = report.duration_ms;
                    BatchReport::from_reports(vec![report], elapsed)
                }
                None => driver
                    .process_store_documents(&azure.prefix)
                    .await
                    .context("Failed to list container")?,
            };
            finish(&cli, &batch, show_progress)
        }
    }
}

async fn list(dir: Option<&Path>, azure: &AzureArgs) -> Result<()> {
    let names: Vec<String> = match dir {
        Some(dir) => edgequake_pdfchunk::pipeline::input::list_directory(dir)?
            .into_iter()
            .map(|p| p.display().to_string())
            .collect(),
        None => {
            let store = azure_store(azure, 60)?;
            edgequake_pdfchunk::pipeline::input::list_store(&store, &azure.prefix).await?
        }
    };
    for name in &names {
        println!("{name}");
    }
    eprintln!("{}", dim(&format!("{} PDF(s)", names.len())));
    Ok(())
}

fn azure_store(args: &AzureArgs, timeout_secs: u64) -> Result<AzureBlobStore> {
    let url = args
        .container_url
        .clone()
        .context("Set --container-url or AZURE_STORAGE_CONTAINER_URL")?;
    let sas = args
        .sas_token
        .clone()
        .context("Set --sas-token or AZURE_STORAGE_SAS_TOKEN")?;
    let mut config = AzureBlobConfig::new(url, sas);
    config.timeout_secs = timeout_secs;
    AzureBlobStore::new(config).context("Invalid Azure Blob configuration")
}

/// Map CLI args to `PipelineConfig` and assemble the driver.
async fn build_driver(
    cli: &Cli,
    chunk_size: usize,
    show_progress: bool,
    store: Arc<dyn ArtifactStore>,
) -> Result<PipelineDriver> {
    let args = &cli.pipeline;

    let mut builder = PipelineConfig::builder()
        .chunk_size(chunk_size)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .rate_limit_backoff_ms(args.backoff.saturating_mul(1000))
        .max_rate_limit_retries((args.max_retries > 0).then_some(args.max_retries))
        .pacing_delay_ms(args.pacing_ms)
        .api_timeout_secs(args.api_timeout)
        .download_timeout_secs(args.download_timeout)
        .document_concurrency(args.concurrency)
        .skip_blank_chunks(!args.keep_blank)
        .clean_output(!args.raw_output);

    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = args.password {
        builder = builder.password(password);
    }
    if let Some(ref path) = args.system_prompt {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(text);
    }
    if let Some(ref path) = args.instructions {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instructions from {:?}", path))?;
        builder = builder.instructions(text);
    }
    if show_progress {
        builder = builder.observer(CliObserver::new());
    }

    // Ctrl-C stops waiting on back-offs instead of killing mid-write.
    let cancel = CancellationToken::new();
    builder = builder.cancel_token(cancel.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", yellow("Cancelling after the current call…"));
            cancel.cancel();
        }
    });

    let config = builder.build().context("Invalid configuration")?;
    PipelineDriver::builder()
        .config(config)
        .store(store)
        .build()
        .context("Failed to set up the pipeline")
}

fn finish(cli: &Cli, batch: &BatchReport, show_progress: bool) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(batch).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        if !show_progress {
            for report in &batch.documents {
                eprintln!("{}", document_line(report));
            }
        }
        let tokens_in: u64 = batch.documents.iter().map(|d| d.input_tokens).sum();
        let tokens_out: u64 = batch.documents.iter().map(|d| d.output_tokens).sum();
        eprintln!(
            "{}  {}/{} documents succeeded  {}ms",
            if batch.failed == 0 { green("✔") } else { yellow("⚠") },
            bold(&batch.succeeded.to_string()),
            batch.total(),
            batch.duration_ms
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&tokens_in.to_string()),
            dim(&tokens_out.to_string())
        );
    }

    if batch.total() > 0 && batch.succeeded == 0 {
        bail!("All {} document(s) failed", batch.total());
    }
    Ok(())
}
