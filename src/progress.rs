//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through a batch. The CLI uses it to drive
//! its progress bar; library users can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use dvac_donations::{BatchProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     failed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_error(&self, index: usize, total: usize, source_file: &str, error: &str) {
//!         self.failed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{index}/{total}] {source_file}: {error}");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { failed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each file of a batch.
///
/// Files are processed one at a time, so events arrive in order. All methods
/// have default no-op implementations. `index` is 1-based.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before the first file is opened.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before a file is rendered.
    fn on_file_start(&self, index: usize, total_files: usize, source_file: &str) {
        let _ = (index, total_files, source_file);
    }

    /// Called when a file produced a record without error.
    fn on_file_complete(&self, index: usize, total_files: usize, source_file: &str) {
        let _ = (index, total_files, source_file);
    }

    /// Called when a file produced an error-tagged record.
    fn on_file_error(&self, index: usize, total_files: usize, source_file: &str, error: &str) {
        let _ = (index, total_files, source_file, error);
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
