//! Request and result types shared by the library, the CLI and the MCP tools.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One extracted donation, tied to the file it came from.
///
/// Successful records have `error == None`. A file that could not be
/// processed still yields a record: the data fields are empty and `error`
/// carries a human-readable message, so callers can branch on the field
/// rather than on an exception.
///
/// Deserialisation is lenient so that records produced by other tools (or
/// hand-edited JSON) round-trip: `name` and `filename` are accepted as
/// aliases, and `null` or numeric values become strings. When both a key and
/// its alias are present the canonical key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RecordFields")]
pub struct DonationRecord {
    pub donor_name: String,
    /// Always a single line.
    pub address: String,
    /// Decimal-ish string such as `"25.00"`.
    pub amount: String,
    pub date: String,
    pub source_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Model text that could not be parsed; diagnostic only, never exported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl DonationRecord {
    /// Build an error-tagged record for `source_file`.
    pub fn failed(source_file: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source_file: source_file.into(),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Every key a record may arrive under, canonical and alias side by side.
#[derive(Deserialize)]
struct RecordFields {
    #[serde(default)]
    donor_name: Value,
    #[serde(default)]
    name: Value,
    #[serde(default)]
    address: Value,
    #[serde(default)]
    amount: Value,
    #[serde(default)]
    date: Value,
    #[serde(default)]
    source_file: Value,
    #[serde(default)]
    filename: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    raw_response: Option<String>,
}

impl From<RecordFields> for DonationRecord {
    fn from(f: RecordFields) -> Self {
        Self {
            donor_name: lenient_string(prefer(f.donor_name, f.name)),
            address: lenient_string(f.address),
            amount: lenient_string(f.amount),
            date: lenient_string(f.date),
            source_file: lenient_string(prefer(f.source_file, f.filename)),
            error: f.error,
            raw_response: f.raw_response,
        }
    }
}

/// The canonical value unless it is missing or `null`.
fn prefer(canonical: Value, alias: Value) -> Value {
    if canonical.is_null() {
        alias
    } else {
        canonical
    }
}

/// Render strings, numbers, booleans and `null` as a string.
fn lenient_string(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Input to one batch call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRequest {
    /// PDF paths, processed in this order.
    pub file_paths: Vec<String>,
    /// Pages to render per file. `None` uses
    /// [`crate::config::ExtractionConfig::max_pages`].
    #[serde(default)]
    pub max_pages: Option<usize>,
}

impl BatchRequest {
    pub fn new<I, S>(file_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            file_paths: file_paths.into_iter().map(Into::into).collect(),
            max_pages: None,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }
}

/// Counters for one batch call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub pages_rendered: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

/// Ordered records for one batch, exactly one per input path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub records: Vec<DonationRecord>,
    pub stats: BatchStats,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records that carry an error marker.
    pub fn failures(&self) -> impl Iterator<Item = &DonationRecord> {
        self.records.iter().filter(|r| r.is_error())
    }

    pub fn into_records(self) -> Vec<DonationRecord> {
        self.records
    }
}
