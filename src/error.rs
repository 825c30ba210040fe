//! Error types for the dvac-donations library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DonationError`]: **Fatal**: the call cannot proceed at all (batch over
//!   the size cap, provider not configured, CSV destination unwritable).
//!   Returned as `Err(DonationError)` from the top-level functions.
//!
//! * [`FileError`]: **Non-fatal**: a single input file failed (unreadable
//!   PDF, API error, unparseable answer) but its siblings in the batch are
//!   fine. The orchestrator turns it into an error-tagged
//!   [`crate::output::DonationRecord`] so the batch result always has one
//!   entry per input path.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the dvac-donations library.
///
/// Per-file failures use [`FileError`] and are stored in
/// [`crate::output::DonationRecord::error`] rather than propagated here.
#[derive(Debug, Error)]
pub enum DonationError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The batch holds more files than the configured cap.
    #[error(
        "Too many files ({count}). Please process a maximum of {max} files at a time to avoid timeouts."
    )]
    BatchTooLarge { count: usize, max: usize },

    /// The request is malformed (zero page limit, malformed tool arguments).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output CSV file.
    #[error("Failed to write output file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single input file.
///
/// The `Display` output is what lands in the record's `error` field, so the
/// messages are written for the agent or person reading the batch result.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum FileError {
    /// The PDF is missing, unreadable, encrypted, corrupt or empty.
    #[error("{detail}")]
    Render { detail: String },

    /// A rendered page could not be re-encoded for upload.
    #[error("Image optimisation failed: {detail}")]
    Optimize { detail: String },

    /// The inference endpoint rejected or failed the request.
    #[error("API call failed: {detail}")]
    Call { detail: String },

    /// The inference call exceeded the configured timeout.
    #[error("API call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The model answered, but not with JSON of the expected shape.
    #[error("Could not parse JSON from API response: {detail}")]
    Parse { detail: String, raw_response: String },
}

impl FileError {
    /// Shorthand for the render-stage variant.
    pub fn render(detail: impl Into<String>) -> Self {
        FileError::Render {
            detail: detail.into(),
        }
    }

    /// The model text that failed to parse, when there was one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            FileError::Parse { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}
