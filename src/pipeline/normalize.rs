//! Normalisation: turn parsed model JSON into [`DonationRecord`]s.
//!
//! Nothing in here can fail. Missing keys, `null`s, numbers where strings were
//! asked for and multi-line values all degrade to a best-effort string, so a
//! sloppy but readable answer still produces a usable row.
//!
//! ## Rules
//!
//! 1. Look each field up under its canonical key, then its aliases
//! 2. Render scalars to strings; `null` and objects become empty
//! 3. Collapse line breaks: `", "` inside addresses, `" "` elsewhere
//! 4. Collapse runs of whitespace and trim
//! 5. Strip a leading `$` from amounts

use crate::output::DonationRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

const DONOR_KEYS: &[&str] = &["donor_name", "name", "donor"];
const ADDRESS_KEYS: &[&str] = &["address", "donor_address"];
const AMOUNT_KEYS: &[&str] = &["amount", "donation_amount"];
const DATE_KEYS: &[&str] = &["date", "donation_date"];

/// Normalise one file's parsed answer.
///
/// Returns one record per object (an array yields several); anything else,
/// including an empty array, yields a single empty record so the file is
/// still represented.
pub fn normalize_response(value: &Value, source_file: &str) -> Vec<DonationRecord> {
    let records: Vec<DonationRecord> = match value {
        Value::Object(obj) => vec![normalize_object(obj, source_file)],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_object)
            .map(|obj| normalize_object(obj, source_file))
            .collect(),
        _ => Vec::new(),
    };

    if records.is_empty() {
        vec![DonationRecord {
            source_file: source_file.to_string(),
            ..Default::default()
        }]
    } else {
        records
    }
}

fn normalize_object(obj: &Map<String, Value>, source_file: &str) -> DonationRecord {
    DonationRecord {
        donor_name: single_line(&lookup(obj, DONOR_KEYS)),
        address: single_line_address(&lookup(obj, ADDRESS_KEYS)),
        amount: normalize_amount(&lookup(obj, AMOUNT_KEYS)),
        date: single_line(&lookup(obj, DATE_KEYS)),
        source_file: source_file.to_string(),
        error: None,
        raw_response: None,
    }
}

/// First non-null value under any of `keys`, rendered as a string.
fn lookup(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
        .map(value_to_string)
        .unwrap_or_default()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null | Value::Object(_) => String::new(),
    }
}

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Split on any line ending, dropping blank lines and indentation.
fn line_pieces(input: &str) -> impl Iterator<Item = &str> {
    input
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
}

/// Collapse every line break and whitespace run to a single space.
pub fn single_line(input: &str) -> String {
    RE_WHITESPACE.replace_all(input.trim(), " ").into_owned()
}

/// Join address lines with `", "`, without doubling commas the model already
/// put at line ends.
pub fn single_line_address(input: &str) -> String {
    let joined = line_pieces(input)
        .map(|l| l.trim_end_matches(',').trim_end())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    single_line(&joined)
}

fn normalize_amount(input: &str) -> String {
    let s = single_line(input);
    match s.strip_prefix('$') {
        Some(rest) => rest.trim_start().to_string(),
        None => s,
    }
}

/// Fold several records for the same file into one.
///
/// Fields are joined per donor, in order, with `"; "`. A donor without a
/// value keeps an empty slot so the n-th entry of every column belongs to the
/// n-th donor. A field empty for every donor stays empty, and a date shared
/// by every donor is written once.
pub fn merge_records(records: Vec<DonationRecord>, source_file: &str) -> DonationRecord {
    fn join(records: &[DonationRecord], field: fn(&DonationRecord) -> &str) -> String {
        let values: Vec<&str> = records.iter().map(field).collect();
        if values.iter().all(|v| v.is_empty()) {
            return String::new();
        }
        values.join("; ")
    }

    let dates: Vec<&str> = records.iter().map(|r| r.date.as_str()).collect();
    let date = match dates.split_first() {
        Some((first, rest)) if rest.iter().all(|d| d == first) => first.to_string(),
        _ => join(&records, |r| r.date.as_str()),
    };

    DonationRecord {
        donor_name: join(&records, |r| r.donor_name.as_str()),
        address: join(&records, |r| r.address.as_str()),
        amount: join(&records, |r| r.amount.as_str()),
        date,
        source_file: source_file.to_string(),
        error: None,
        raw_response: None,
    }
}
