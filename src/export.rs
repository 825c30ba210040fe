//! CSV export of extracted records.
//!
//! The file always has the header row, then one row per record in the order
//! given. Every field is flattened to a single line before it is written so
//! the output opens cleanly in spreadsheet tools; `csv` handles quoting of
//! commas and quotes. `raw_response` is diagnostic and never exported.

use crate::error::DonationError;
use crate::output::DonationRecord;
use crate::pipeline::normalize::{single_line, single_line_address};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// Column order of the exported file.
pub const CSV_COLUMNS: [&str; 6] = [
    "donor_name",
    "address",
    "amount",
    "date",
    "source_file",
    "error",
];

/// What [`save_results_to_csv`] wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub rows: usize,
    pub path: PathBuf,
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Successfully saved {} records to {}",
            self.rows,
            self.path.display()
        )
    }
}

/// Serialise records to CSV bytes, header first.
pub fn records_to_csv(records: &[DonationRecord]) -> Result<Vec<u8>, csv::Error> {
    let mut wtr = csv::WriterBuilder::new().from_writer(Vec::new());
    wtr.write_record(CSV_COLUMNS)?;

    for record in records {
        let error = record.error.as_deref().map(single_line).unwrap_or_default();
        wtr.write_record([
            single_line(&record.donor_name),
            single_line_address(&record.address),
            single_line(&record.amount),
            single_line(&record.date),
            single_line(&record.source_file),
            error,
        ])?;
    }

    wtr.flush()?;
    wtr.into_inner().map_err(|e| csv::Error::from(e.into_error()))
}

/// Write `records` to `path`, replacing any existing file.
///
/// Parent directories are created as needed. The file is written to a
/// sibling `.csv.tmp` and renamed into place, so a failed write never leaves
/// a truncated CSV behind.
pub async fn save_results_to_csv(
    records: &[DonationRecord],
    path: impl AsRef<Path>,
) -> Result<ExportSummary, DonationError> {
    let path = path.as_ref();
    let write_error = |source: std::io::Error| DonationError::WriteError {
        path: path.to_path_buf(),
        source,
    };

    let bytes = records_to_csv(records).map_err(|e| write_error(e.into()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
    }

    let tmp_path = path.with_extension("csv.tmp");
    tokio::fs::write(&tmp_path, &bytes).await.map_err(write_error)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_error(e));
    }

    let summary = ExportSummary {
        rows: records.len(),
        path: path.to_path_buf(),
    };
    info!("{}", summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn jane() -> DonationRecord {
        DonationRecord {
            donor_name: "Jane Doe".into(),
            address: "123 Main St\nAnytown, NY 12345".into(),
            amount: "25.00".into(),
            date: "11/06/2025".into(),
            source_file: "jane.pdf".into(),
            error: None,
            raw_response: Some("not exported".into()),
        }
    }

    fn text(records: &[DonationRecord]) -> String {
        String::from_utf8(records_to_csv(records).unwrap()).unwrap()
    }

    #[test]
    fn header_only_for_no_records() {
        assert_eq!(text(&[]), "donor_name,address,amount,date,source_file,error\n");
    }

    #[test]
    fn one_line_per_record_plus_header() {
        let records = vec![jane(), DonationRecord::failed("bad.pdf", "PDF file not found: 'bad.pdf'")];
        let out = text(&records);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "Jane Doe,\"123 Main St, Anytown, NY 12345\",25.00,11/06/2025,jane.pdf,"
        );
        assert_eq!(lines[2], ",,,,bad.pdf,PDF file not found: 'bad.pdf'");
        assert!(!out.contains("not exported"));
    }

    #[test]
    fn quotes_are_escaped() {
        let record = DonationRecord {
            donor_name: "The \"Smith\" Family".into(),
            source_file: "s.pdf".into(),
            ..Default::default()
        };
        let out = text(&[record]);
        assert!(out.contains("\"The \"\"Smith\"\" Family\""));
    }

    #[tokio::test]
    async fn writes_creates_parents_and_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/out/donations.csv");

        let summary = save_results_to_csv(&[jane(), jane()], &path).await.unwrap();
        assert_eq!(summary.rows, 2);
        assert_eq!(
            summary.to_string(),
            format!("Successfully saved 2 records to {}", path.display())
        );

        save_results_to_csv(&[jane()], &path).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[tokio::test]
    async fn unwritable_destination_is_write_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let err = save_results_to_csv(&[jane()], blocker.join("out.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, DonationError::WriteError { .. }));
    }
}
