//! CLI binary for dvac-donations.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs batches, and prints or saves the records.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dvac_donations::{
    extract_and_parse_donations, save_results_to_csv, BatchProgressCallback, BatchRequest,
    DonationRecord, ExtractionConfig, McpServer, ProgressCallback, DEFAULT_MAX_BATCH_SIZE,
    DEFAULT_MODEL, DEFAULT_PROVIDER,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar across every chunk of the run, one log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new(total_files: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:32.green/238}] {pos:>2}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");

        let bar = ProgressBar::new(total_files as u64);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    /// Clear the bar without a summary, for runs that stop early.
    fn abandon(&self) {
        self.bar.finish_and_clear();
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
        let total = self.bar.length().unwrap_or(0) as usize;
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!("{} {} files extracted", green("✔"), bold(&total.to_string()));
        } else {
            eprintln!(
                "{} {}/{} files extracted  ({} failed)",
                red("✘"),
                bold(&(total - failed).to_string()),
                total,
                red(&failed.to_string())
            );
        }
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_file_start(&self, _index: usize, _total: usize, source_file: &str) {
        self.bar.set_message(source_file.to_string());
    }

    fn on_file_complete(&self, _index: usize, _total: usize, source_file: &str) {
        self.bar.println(format!("  {} {}", green("✓"), source_file));
        self.bar.inc(1);
    }

    fn on_file_error(&self, _index: usize, _total: usize, source_file: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), source_file, red(&msg)));
        self.bar.inc(1);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract two receipts and print the records
  dvac extract scans/receipt_01.pdf scans/receipt_02.pdf

  # Extract a folder of receipts straight to CSV
  dvac extract scans/*.pdf -o donations.csv

  # Machine-readable output
  dvac extract --json scans/receipt_01.pdf > records.json

  # Export previously saved records
  dvac to-csv records.json -o donations.csv

  # Run as an MCP tool server on stdio
  dvac serve

ENVIRONMENT VARIABLES:
  OPENROUTER_API_KEY   OpenRouter API key (default provider)
  DVAC_PROVIDER        Override provider (openrouter, openai, anthropic, gemini, ollama)
  DVAC_MODEL           Override model ID
  PDFIUM_LIB_PATH      Directory or file of the pdfium shared library
  RUST_LOG             Log filter, e.g. dvac_donations=debug

A .env file in the working directory is loaded at start-up.
"#;

/// Extract donor details from scanned donation receipts using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "dvac",
    version,
    about = "Extract donor details from scanned donation receipt PDFs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DVAC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DVAC_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract records from PDF receipts.
    Extract(ExtractArgs),
    /// Export records saved as JSON to CSV.
    ToCsv(ToCsvArgs),
    /// Serve the extraction tools over MCP on stdio.
    Serve(ModelArgs),
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Inference provider.
    #[arg(long, env = "DVAC_PROVIDER", default_value = DEFAULT_PROVIDER)]
    provider: String,

    /// Vision model ID.
    #[arg(long, env = "DVAC_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Rendering DPI (72–400).
    #[arg(long, env = "DVAC_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Files per batch.
    #[arg(long, env = "DVAC_BATCH_SIZE", default_value_t = DEFAULT_MAX_BATCH_SIZE)]
    batch_size: usize,

    /// Per-file model call timeout in seconds.
    #[arg(long, env = "DVAC_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Path to a text file with a custom extraction prompt.
    #[arg(long, env = "DVAC_PROMPT")]
    prompt: Option<PathBuf>,

    /// Directory or file of the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// PDF files to read, processed in order.
    #[arg(required = true)]
    files: Vec<String>,

    /// Pages to read per file.
    #[arg(long, default_value_t = 1)]
    max_pages: usize,

    /// Also write the records to this CSV file.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print records as JSON instead of a summary table.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DVAC_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Debug)]
struct ToCsvArgs {
    /// JSON file holding an array of records.
    input: PathBuf,

    /// CSV file to write.
    #[arg(short, long)]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs during extraction; stdout is
    // reserved for records and MCP traffic either way.
    let show_progress = match cli.command {
        Command::Extract(ref args) => !cli.quiet && !args.no_progress && !args.json,
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

    match cli.command {
        Command::Extract(args) => {
            let progress = show_progress.then(|| CliProgressCallback::new(args.files.len()));
            run_extract(args, progress, cli.quiet).await
        }
        Command::ToCsv(args) => run_to_csv(args, cli.quiet).await,
        Command::Serve(args) => {
            let config = build_config(&args, None).await?;
            McpServer::stdio(config)
                .run()
                .await
                .context("MCP server stopped")
        }
    }
}

async fn run_extract(
    args: ExtractArgs,
    progress: Option<Arc<CliProgressCallback>>,
    quiet: bool,
) -> Result<()> {
    let outcome = match build_config(
        &args.model,
        progress.clone().map(|cb| cb as ProgressCallback),
    )
    .await
    {
        Ok(config) => extract_in_chunks(&args, &config).await,
        Err(e) => Err(e),
    };
    if let Some(cb) = progress {
        match &outcome {
            Ok(_) => cb.finish(),
            Err(_) => cb.abandon(),
        }
    }
    let (records, tokens) = outcome?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&records).context("Failed to serialise records")?
        );
    } else {
        print_table(&records);
    }

    if let Some(ref output) = args.output {
        let summary = save_results_to_csv(&records, output)
            .await
            .context("Failed to save CSV")?;
        if !quiet {
            eprintln!("{} {}", green("✔"), summary);
        }
    }

    if !quiet {
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&tokens.0.to_string()),
            dim(&tokens.1.to_string())
        );
    }
    Ok(())
}

/// The library rejects oversized batches, so chunk here.
async fn extract_in_chunks(
    args: &ExtractArgs,
    config: &ExtractionConfig,
) -> Result<(Vec<DonationRecord>, (u64, u64))> {
    let mut records: Vec<DonationRecord> = Vec::with_capacity(args.files.len());
    let mut tokens = (0u64, 0u64);
    for chunk in args.files.chunks(config.max_batch_size) {
        let request = BatchRequest::new(chunk.iter().cloned()).with_max_pages(args.max_pages);
        let result = extract_and_parse_donations(&request, config)
            .await
            .context("Extraction failed")?;
        tokens.0 += result.stats.total_input_tokens;
        tokens.1 += result.stats.total_output_tokens;
        records.extend(result.into_records());
    }
    Ok((records, tokens))
}

async fn run_to_csv(args: ToCsvArgs, quiet: bool) -> Result<()> {
    let text = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let records: Vec<DonationRecord> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of records", args.input.display()))?;

    let summary = save_results_to_csv(&records, &args.output)
        .await
        .context("Failed to save CSV")?;
    if !quiet {
        eprintln!("{} {}", green("✔"), summary);
    }
    Ok(())
}

fn print_table(records: &[DonationRecord]) {
    for r in records {
        match r.error {
            Some(ref e) => println!("{}  {}", r.source_file, red(e)),
            None => println!(
                "{}  {}  {}  {}  {}",
                r.source_file,
                bold(&r.donor_name),
                r.amount,
                r.date,
                dim(&r.address)
            ),
        }
    }
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(args: &ModelArgs, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .provider_name(args.provider.clone())
        .model(args.model.clone())
        .dpi(args.dpi)
        .max_batch_size(args.batch_size)
        .api_timeout_secs(args.api_timeout);

    if let Some(ref path) = args.prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.instruction_prompt(prompt);
    }
    if let Some(ref lib) = args.pdfium_lib {
        builder = builder.pdfium_library_path(lib.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
