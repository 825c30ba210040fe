//! # dvac-donations
//!
//! Extract donor details from scanned donation-receipt PDFs using Vision
//! Language Models (VLMs), and export them to CSV.
//!
//! ## Why this crate?
//!
//! Donation receipts arrive as scans: handwriting, stamps, skewed photocopies.
//! There is no text layer to parse, so each receipt is rasterised and a VLM
//! reads the donor name, address, amount and date the way a volunteer would.
//! Every input file yields exactly one record, successful or error-tagged,
//! so a batch never silently drops a receipt.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF paths (≤ 5 per batch)
//!  │
//!  ├─ 1. Input      check path exists and is a PDF
//!  ├─ 2. Render     rasterise the first page(s) via pdfium (spawn_blocking)
//!  ├─ 3. Optimise   downscale to 1000 px, greyscale, JPEG q50
//!  ├─ 4. VLM        one request per file, all pages attached
//!  ├─ 5. Normalise  recover JSON, single-line fields, merge multi-donor pages
//!  └─ 6. Output     ordered records + batch stats, optional CSV export
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dvac_donations::{extract_and_parse_donations, save_results_to_csv, BatchRequest, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // OpenRouter by default; reads OPENROUTER_API_KEY
//!     let config = ExtractionConfig::from_env();
//!     let request = BatchRequest::new(["scans/receipt_01.pdf", "scans/receipt_02.pdf"]);
//!
//!     let result = extract_and_parse_donations(&request, &config).await?;
//!     for failed in result.failures() {
//!         eprintln!("{}: {}", failed.source_file, failed.error.as_deref().unwrap_or(""));
//!     }
//!
//!     let summary = save_results_to_csv(&result.records, "donations.csv").await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `dvac` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! dvac-donations = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod server;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MODEL, DEFAULT_PROVIDER};
pub use error::{DonationError, FileError};
pub use export::{records_to_csv, save_results_to_csv, ExportSummary, CSV_COLUMNS};
pub use extract::{extract_and_parse_donations, extract_and_parse_donations_sync};
pub use output::{BatchRequest, BatchResult, BatchStats, DonationRecord};
pub use pipeline::client::{LlmVisionClient, VisionClient, VisionResponse};
pub use pipeline::optimize::OptimizedImage;
pub use pipeline::render::{PageRenderer, PdfiumRenderer};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use server::McpServer;
pub use stream::{extract_stream, RecordStream};
