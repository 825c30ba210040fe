//! Batch orchestration: one record per input path, in input order.
//!
//! Files are processed strictly one after another. Every per-file failure is
//! caught here and turned into an error-tagged [`DonationRecord`], so a bad
//! scan never aborts or corrupts the rest of its batch. Only request-level
//! problems (batch over the cap, no provider) fail the whole call, and they do
//! so before any file is touched.

use crate::config::ExtractionConfig;
use crate::error::{DonationError, FileError};
use crate::output::{BatchRequest, BatchResult, BatchStats, DonationRecord};
use crate::pipeline::client::{self, LlmVisionClient, VisionClient};
use crate::pipeline::render::{self, PageRenderer, PdfiumRenderer};
use crate::pipeline::{input, normalize, optimize};
use crate::prompts::DEFAULT_EXTRACTION_PROMPT;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extract donation records from a batch of PDF receipts.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(BatchResult)` with exactly one record per `request.file_paths` entry,
/// in the same order, even when some or all files failed (check
/// `record.error`).
///
/// # Errors
/// Returns `Err(DonationError)` only for request-level problems:
/// - more paths than [`ExtractionConfig::max_batch_size`] (the batch is
///   rejected, never truncated; callers pre-chunk)
/// - a page limit of zero
/// - no usable inference provider
pub async fn extract_and_parse_donations(
    request: &BatchRequest,
    config: &ExtractionConfig,
) -> Result<BatchResult, DonationError> {
    let start = Instant::now();
    let max_pages = validate_request(request, config)?;
    let total = request.file_paths.len();

    if total == 0 {
        return Ok(BatchResult::default());
    }

    let client = resolve_client(config)?;
    let renderer = resolve_renderer(config);
    info!(
        "Starting batch: {} files, max {} page(s) each",
        total, max_pages
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let mut records = Vec::with_capacity(total);
    let mut stats = BatchStats {
        total_files: total,
        ..Default::default()
    };

    for (i, path) in request.file_paths.iter().enumerate() {
        let index = i + 1;
        let outcome = extract_file(
            path,
            max_pages,
            &renderer,
            client.as_ref(),
            config,
            index,
            total,
        )
        .await;

        stats.pages_rendered += outcome.pages;
        stats.total_input_tokens += outcome.input_tokens as u64;
        stats.total_output_tokens += outcome.output_tokens as u64;
        if outcome.record.is_error() {
            stats.failed += 1;
        } else {
            stats.succeeded += 1;
        }
        records.push(outcome.record);
    }

    stats.total_duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Batch complete: {}/{} files succeeded, {}ms",
        stats.succeeded, total, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, stats.succeeded);
    }

    Ok(BatchResult { records, stats })
}

/// Synchronous wrapper around [`extract_and_parse_donations`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_and_parse_donations_sync(
    request: &BatchRequest,
    config: &ExtractionConfig,
) -> Result<BatchResult, DonationError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DonationError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_and_parse_donations(request, config))
}

/// Check the batch against the configured limits and return the page limit.
pub fn validate_request(
    request: &BatchRequest,
    config: &ExtractionConfig,
) -> Result<usize, DonationError> {
    let count = request.file_paths.len();
    if count > config.max_batch_size {
        return Err(DonationError::BatchTooLarge {
            count,
            max: config.max_batch_size,
        });
    }

    let max_pages = request.max_pages.unwrap_or(config.max_pages);
    if max_pages == 0 {
        return Err(DonationError::InvalidRequest(
            "max_pages must be at least 1".into(),
        ));
    }
    Ok(max_pages)
}

// ── Per-file pipeline ────────────────────────────────────────────────────

/// One file's record plus what it cost.
pub(crate) struct FileOutcome {
    pub record: DonationRecord,
    pub pages: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Run the whole pipeline for one path. Never fails; errors become the record.
pub(crate) async fn extract_file(
    path: &str,
    max_pages: usize,
    renderer: &Arc<dyn PageRenderer>,
    client: &dyn VisionClient,
    config: &ExtractionConfig,
    index: usize,
    total: usize,
) -> FileOutcome {
    let source_file = input::source_name(path);
    info!("Processing {} ({}/{})", source_file, index, total);

    if let Some(ref cb) = config.progress_callback {
        cb.on_file_start(index, total, &source_file);
    }

    let mut outcome = FileOutcome {
        record: DonationRecord::default(),
        pages: 0,
        input_tokens: 0,
        output_tokens: 0,
    };

    match run_file(path, &source_file, max_pages, renderer, client, config, &mut outcome).await {
        Ok(record) => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_file_complete(index, total, &source_file);
            }
            outcome.record = record;
        }
        Err(e) => {
            let message = e.to_string();
            warn!("Error processing {}: {}", source_file, message);
            if let Some(ref cb) = config.progress_callback {
                cb.on_file_error(index, total, &source_file, &message);
            }
            let mut record = DonationRecord::failed(&source_file, message);
            record.raw_response = e.raw_response().map(str::to_string);
            outcome.record = record;
        }
    }

    outcome
}

async fn run_file(
    path: &str,
    source_file: &str,
    max_pages: usize,
    renderer: &Arc<dyn PageRenderer>,
    client: &dyn VisionClient,
    config: &ExtractionConfig,
    outcome: &mut FileOutcome,
) -> Result<DonationRecord, FileError> {
    let pdf_path = input::resolve_local(path)?;

    let pages = render::render_pages(Arc::clone(renderer), &pdf_path, max_pages).await?;
    outcome.pages = pages.len();

    let images = pages
        .iter()
        .map(|page| optimize::optimize_page(page, config.max_image_width, config.jpeg_quality))
        .collect::<Result<Vec<_>, _>>()?;
    drop(pages);

    let payload: usize = images.iter().map(|img| img.bytes.len()).sum();
    debug!(
        "{}: sending {} image(s), {:.2} KB",
        source_file,
        images.len(),
        payload as f64 / 1024.0
    );

    let instruction = config
        .instruction_prompt
        .as_deref()
        .unwrap_or(DEFAULT_EXTRACTION_PROMPT);
    let response =
        client::call_with_timeout(client, instruction, &images, config.api_timeout_secs).await?;
    outcome.input_tokens = response.input_tokens;
    outcome.output_tokens = response.output_tokens;
    debug!("{}: response text: {}", source_file, response.text);

    let value = client::parse_response(&response.text)?;
    let mut records = normalize::normalize_response(&value, source_file);

    if records.len() == 1 {
        Ok(records.remove(0))
    } else {
        info!(
            "{}: model returned {} donations, merging into one record",
            source_file,
            records.len()
        );
        Ok(normalize::merge_records(records, source_file))
    }
}

// ── Resolution helpers ───────────────────────────────────────────────────

/// API-key variable a named provider reads, when we know it.
pub(crate) fn required_key(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "openrouter" => Some("OPENROUTER_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "gemini" => Some("GEMINI_API_KEY"),
        "mistral" => Some("MISTRAL_API_KEY"),
        _ => None,
    }
}

/// Resolve the vision client, from most-specific to least-specific.
///
/// 1. **Pre-built client** (`config.client`): used as-is.
/// 2. **Pre-built provider** (`config.provider`): wrapped in
///    [`LlmVisionClient`].
/// 3. **Named provider + model**: built with
///    [`ProviderFactory::create_llm_provider`], which reads the provider's
///    API key from the environment. A known key that is missing is reported
///    up front rather than as a per-file call error.
pub(crate) fn resolve_client(
    config: &ExtractionConfig,
) -> Result<Arc<dyn VisionClient>, DonationError> {
    if let Some(ref client) = config.client {
        return Ok(Arc::clone(client));
    }

    let provider: Arc<dyn LLMProvider> = match config.provider {
        Some(ref provider) => Arc::clone(provider),
        None => create_vision_provider(&config.provider_name, &config.model)?,
    };

    Ok(Arc::new(LlmVisionClient::new(
        provider,
        config.temperature,
        config.max_tokens,
    )))
}

/// Fail when a provider with a known key variable has no usable key.
pub(crate) fn check_api_key<F>(provider_name: &str, lookup: F) -> Result<(), DonationError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(key) = required_key(provider_name) else {
        return Ok(());
    };
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(()),
        _ => Err(DonationError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{key} environment variable not set"),
        }),
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, DonationError> {
    check_api_key(provider_name, |key| std::env::var(key).ok())?;

    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DonationError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

pub(crate) fn resolve_renderer(config: &ExtractionConfig) -> Arc<dyn PageRenderer> {
    match config.renderer {
        Some(ref renderer) => Arc::clone(renderer),
        None => Arc::new(PdfiumRenderer::new(
            config.dpi,
            config.max_rendered_pixels,
            config.pdfium_library_path.clone(),
        )),
    }
}
