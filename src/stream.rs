//! Streaming extraction API: emit records as each file finishes.
//!
//! Unlike the eager [`crate::extract::extract_and_parse_donations`], which
//! returns only after the whole batch is done, [`extract_stream`] yields one
//! [`DonationRecord`] per input path as soon as that file completes. Files
//! are still processed one at a time, so records arrive in input order.
//!
//! Request-level validation (batch cap, page limit, provider) happens before
//! the stream is returned; once streaming starts every item is a record,
//! error-tagged or not. Progress events match the eager call: batch start
//! when the stream is returned, batch complete with the last record.

use crate::config::ExtractionConfig;
use crate::error::DonationError;
use crate::extract::{extract_file, resolve_client, resolve_renderer, validate_request};
use crate::output::{BatchRequest, DonationRecord};
use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// A boxed stream of records, one per input path.
pub type RecordStream = Pin<Box<dyn Stream<Item = DonationRecord> + Send>>;

/// Extract donation records, streaming them as files complete.
///
/// # Returns
/// - `Ok(RecordStream)`: yields exactly `request.file_paths.len()` records
/// - `Err(DonationError)`: the batch was rejected before any file was opened
pub async fn extract_stream(
    request: &BatchRequest,
    config: &ExtractionConfig,
) -> Result<RecordStream, DonationError> {
    let max_pages = validate_request(request, config)?;
    let total = request.file_paths.len();
    if total == 0 {
        return Ok(Box::pin(stream::empty()));
    }

    let client = resolve_client(config)?;
    let renderer = resolve_renderer(config);
    info!("Starting streaming batch: {} files", total);

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let config = config.clone();
    let paths = request.file_paths.clone();
    let succeeded = Arc::new(AtomicUsize::new(0));

    let s = stream::iter(paths.into_iter().enumerate()).then(move |(i, path)| {
        let client = Arc::clone(&client);
        let renderer = Arc::clone(&renderer);
        let succeeded = Arc::clone(&succeeded);
        let cfg = config.clone();
        async move {
            let index = i + 1;
            let record = extract_file(&path, max_pages, &renderer, client.as_ref(), &cfg, index, total)
                .await
                .record;
            if !record.is_error() {
                succeeded.fetch_add(1, Ordering::SeqCst);
            }
            if index == total {
                let ok = succeeded.load(Ordering::SeqCst);
                info!("Streaming batch complete: {}/{} files succeeded", ok, total);
                if let Some(ref cb) = cfg.progress_callback {
                    cb.on_batch_complete(total, ok);
                }
            }
            record
        }
    });

    Ok(Box::pin(s))
}
