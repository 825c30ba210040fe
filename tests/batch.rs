//! Batch orchestration tests.
//!
//! Drive the full pipeline with a fake renderer and a scripted vision client:
//! no pdfium, no network. Input files are real temp files so the path and
//! magic-byte checks run for real.

use async_trait::async_trait;
use dvac_donations::{
    extract_and_parse_donations, extract_and_parse_donations_sync, extract_stream,
    BatchProgressCallback, BatchRequest, DonationError, DonationRecord, ExtractionConfig,
    FileError, OptimizedImage, PageRenderer, VisionClient, VisionResponse,
};
use futures::StreamExt;
use image::{DynamicImage, Rgba, RgbaImage};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Renders `pages` white pages, or fails for files with "corrupt" in the name.
struct FakeRenderer {
    pages: usize,
}

impl PageRenderer for FakeRenderer {
    fn render(&self, pdf_path: &Path, max_pages: usize) -> Result<Vec<DynamicImage>, FileError> {
        if pdf_path.to_string_lossy().contains("corrupt") {
            return Err(FileError::render("Failed to open PDF: file is corrupt"));
        }
        Ok((0..self.pages.min(max_pages))
            .map(|_| DynamicImage::ImageRgba8(RgbaImage::from_pixel(300, 400, Rgba([255; 4]))))
            .collect())
    }
}

/// Answers calls from a queue, in order, and records what it was sent.
#[derive(Default)]
struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, FileError>>>,
    calls: AtomicUsize,
    images_seen: Mutex<Vec<usize>>,
}

impl ScriptedClient {
    fn new<I>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Result<String, FileError>>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Default::default()
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionClient for ScriptedClient {
    async fn complete(
        &self,
        _instruction: &str,
        images: &[OptimizedImage],
    ) -> Result<VisionResponse, FileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.images_seen.lock().unwrap().push(images.len());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("more calls than scripted replies")?;
        Ok(VisionResponse {
            text: reply,
            input_tokens: 100,
            output_tokens: 20,
        })
    }
}

fn ok(json: &str) -> Result<String, FileError> {
    Ok(json.to_string())
}

fn donor(name: &str, amount: &str) -> Result<String, FileError> {
    Ok(format!(
        r#"{{"donor_name": "{name}", "address": "1 Elm St\nSpringfield, IL 62701", "amount": "{amount}", "date": "11/06/2025"}}"#
    ))
}

// ── Helpers ──────────────────────────────────────────────────────────────────

struct Scans {
    dir: TempDir,
}

impl Scans {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn pdf(&self, name: &str) -> String {
        self.file(name, b"%PDF-1.4\n%fake receipt\n")
    }

    fn file(&self, name: &str, content: &[u8]) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn missing(&self, name: &str) -> String {
        let path: PathBuf = self.dir.path().join(name);
        path.to_string_lossy().into_owned()
    }
}

fn config_with(client: Arc<ScriptedClient>, pages: usize) -> ExtractionConfig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    ExtractionConfig::builder()
        .client(client)
        .renderer(Arc::new(FakeRenderer { pages }))
        .build()
        .unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_record_per_path_in_input_order() {
    let scans = Scans::new();
    let paths = vec![scans.pdf("a.pdf"), scans.pdf("b.pdf"), scans.pdf("c.pdf")];
    let client = ScriptedClient::new([donor("Ann", "10.00"), donor("Bob", "20.00"), donor("Cy", "30.00")]);
    let config = config_with(client.clone(), 1);

    let result = extract_and_parse_donations(&BatchRequest::new(paths), &config)
        .await
        .unwrap();

    assert_eq!(result.len(), 3);
    let names: Vec<&str> = result.records.iter().map(|r| r.source_file.as_str()).collect();
    assert_eq!(names, vec!["a.pdf", "b.pdf", "c.pdf"]);
    let donors: Vec<&str> = result.records.iter().map(|r| r.donor_name.as_str()).collect();
    assert_eq!(donors, vec!["Ann", "Bob", "Cy"]);
    assert!(result.failures().next().is_none());
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn addresses_come_back_on_one_line() {
    let scans = Scans::new();
    let client = ScriptedClient::new([donor("Ann", "$10.00")]);
    let result = extract_and_parse_donations(
        &BatchRequest::new([scans.pdf("a.pdf")]),
        &config_with(client, 1),
    )
    .await
    .unwrap();

    let record = &result.records[0];
    assert_eq!(record.address, "1 Elm St, Springfield, IL 62701");
    assert_eq!(record.amount, "10.00");
    assert_eq!(record.date, "11/06/2025");
}

#[tokio::test]
async fn missing_file_fails_alone() {
    let scans = Scans::new();
    let paths = vec![scans.pdf("a.pdf"), scans.missing("gone.pdf"), scans.pdf("c.pdf")];
    let client = ScriptedClient::new([donor("Ann", "10.00"), donor("Cy", "30.00")]);
    let config = config_with(client.clone(), 1);

    let result = extract_and_parse_donations(&BatchRequest::new(paths), &config)
        .await
        .unwrap();

    assert_eq!(result.len(), 3);
    assert!(!result.records[0].is_error());
    assert!(!result.records[2].is_error());

    let failed = &result.records[1];
    assert_eq!(failed.source_file, "gone.pdf");
    assert!(failed.error.as_deref().unwrap().contains("PDF file not found"));
    assert!(failed.donor_name.is_empty());
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn non_pdf_and_corrupt_files_are_tagged() {
    let scans = Scans::new();
    let paths = vec![
        scans.file("photo.pdf", b"\xFF\xD8\xFF\xE0 jpeg bytes"),
        scans.pdf("corrupt.pdf"),
    ];
    let client = ScriptedClient::new([]);
    let config = config_with(client.clone(), 1);

    let result = extract_and_parse_donations(&BatchRequest::new(paths), &config)
        .await
        .unwrap();

    assert!(result.records[0].error.as_deref().unwrap().contains("not a valid PDF"));
    assert!(result.records[1].error.as_deref().unwrap().contains("corrupt"));
    assert_eq!(result.stats.failed, 2);
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn unparseable_answer_keeps_raw_text() {
    let scans = Scans::new();
    let client = ScriptedClient::new([ok("Sorry, the scan is too blurry to read.")]);
    let result = extract_and_parse_donations(
        &BatchRequest::new([scans.pdf("blurry.pdf")]),
        &config_with(client, 1),
    )
    .await
    .unwrap();

    let record = &result.records[0];
    assert!(record
        .error
        .as_deref()
        .unwrap()
        .starts_with("Could not parse JSON from API response"));
    assert_eq!(
        record.raw_response.as_deref(),
        Some("Sorry, the scan is too blurry to read.")
    );
}

#[tokio::test]
async fn call_failure_is_tagged_and_batch_continues() {
    let scans = Scans::new();
    let client = ScriptedClient::new([
        Err(FileError::Call {
            detail: "HTTP 429 Too Many Requests".into(),
        }),
        donor("Bob", "20.00"),
    ]);
    let paths = vec![scans.pdf("a.pdf"), scans.pdf("b.pdf")];
    let result = extract_and_parse_donations(&BatchRequest::new(paths), &config_with(client, 1))
        .await
        .unwrap();

    assert_eq!(
        result.records[0].error.as_deref(),
        Some("API call failed: HTTP 429 Too Many Requests")
    );
    assert_eq!(result.records[1].donor_name, "Bob");
    assert_eq!(result.stats.succeeded, 1);
    assert_eq!(result.stats.failed, 1);
}

#[tokio::test]
async fn fenced_multi_donor_answer_is_merged() {
    let scans = Scans::new();
    let client = ScriptedClient::new([ok(
        "```json\n[{\"donor_name\": \"Ann\", \"amount\": \"10.00\", \"date\": \"01/02/2025\"},\n {\"name\": \"Bob\", \"amount\": \"15.00\", \"date\": \"01/02/2025\"}]\n```",
    )]);
    let result = extract_and_parse_donations(
        &BatchRequest::new([scans.pdf("pair.pdf")]),
        &config_with(client, 1),
    )
    .await
    .unwrap();

    assert_eq!(result.len(), 1);
    let record = &result.records[0];
    assert_eq!(record.donor_name, "Ann; Bob");
    assert_eq!(record.amount, "10.00; 15.00");
    assert_eq!(record.date, "01/02/2025");
}

#[tokio::test]
async fn merged_donors_keep_equal_amounts_and_their_own_addresses() {
    let scans = Scans::new();
    let client = ScriptedClient::new([ok(
        r#"[{"donor_name": "Ann", "amount": "25.00"}, {"donor_name": "Bob", "address": "2 Oak St", "amount": "25.00"}]"#,
    )]);
    let result = extract_and_parse_donations(
        &BatchRequest::new([scans.pdf("twins.pdf")]),
        &config_with(client, 1),
    )
    .await
    .unwrap();

    let record = &result.records[0];
    assert_eq!(record.donor_name, "Ann; Bob");
    assert_eq!(record.address, "; 2 Oak St");
    assert_eq!(record.amount, "25.00; 25.00");
    assert_eq!(record.date, "");
}

#[tokio::test]
async fn oversized_batch_is_rejected_before_any_work() {
    let scans = Scans::new();
    let paths: Vec<String> = (0..6).map(|i| scans.pdf(&format!("r{i}.pdf"))).collect();
    let client = ScriptedClient::new([]);
    let config = config_with(client.clone(), 1);

    let err = extract_and_parse_donations(&BatchRequest::new(paths), &config)
        .await
        .unwrap_err();

    match err {
        DonationError::BatchTooLarge { count, max } => assert_eq!((count, max), (6, 5)),
        other => panic!("expected BatchTooLarge, got {other:?}"),
    }
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn all_rendered_pages_go_in_one_request() {
    let scans = Scans::new();
    let client = ScriptedClient::new([donor("Ann", "10.00")]);
    let config = config_with(client.clone(), 5);

    let request = BatchRequest::new([scans.pdf("three.pdf")]).with_max_pages(3);
    let result = extract_and_parse_donations(&request, &config).await.unwrap();

    assert_eq!(*client.images_seen.lock().unwrap(), vec![3]);
    assert_eq!(result.stats.pages_rendered, 3);
}

#[tokio::test]
async fn stats_add_up() {
    let scans = Scans::new();
    let paths = vec![scans.pdf("a.pdf"), scans.missing("b.pdf"), scans.pdf("c.pdf")];
    let client = ScriptedClient::new([donor("Ann", "1"), donor("Cy", "3")]);
    let result = extract_and_parse_donations(&BatchRequest::new(paths), &config_with(client, 1))
        .await
        .unwrap();

    let stats = &result.stats;
    assert_eq!(stats.total_files, 3);
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.pages_rendered, 2);
    assert_eq!(stats.total_input_tokens, 200);
    assert_eq!(stats.total_output_tokens, 40);
}

#[tokio::test]
async fn repeated_runs_agree_on_names_and_fields() {
    let scans = Scans::new();
    let paths = vec![scans.pdf("a.pdf"), scans.missing("b.pdf")];

    let mut runs = Vec::new();
    for _ in 0..2 {
        let client = ScriptedClient::new([donor("Ann", "1")]);
        let result =
            extract_and_parse_donations(&BatchRequest::new(paths.clone()), &config_with(client, 1))
                .await
                .unwrap();
        runs.push(
            result
                .records
                .iter()
                .map(|r| (r.source_file.clone(), r.is_error(), r.donor_name.is_empty()))
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(runs[0], runs[1]);
}

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl BatchProgressCallback for EventLog {
    fn on_batch_start(&self, total: usize) {
        self.0.lock().unwrap().push(format!("batch {total}"));
    }
    fn on_file_start(&self, index: usize, _: usize, file: &str) {
        self.0.lock().unwrap().push(format!("start {index} {file}"));
    }
    fn on_file_complete(&self, index: usize, _: usize, file: &str) {
        self.0.lock().unwrap().push(format!("ok {index} {file}"));
    }
    fn on_file_error(&self, index: usize, _: usize, file: &str, _: &str) {
        self.0.lock().unwrap().push(format!("err {index} {file}"));
    }
    fn on_batch_complete(&self, total: usize, ok: usize) {
        self.0.lock().unwrap().push(format!("done {ok}/{total}"));
    }
}

#[tokio::test]
async fn progress_events_follow_the_batch() {
    let scans = Scans::new();
    let log = Arc::new(EventLog::default());
    let config = ExtractionConfig::builder()
        .client(ScriptedClient::new([donor("Ann", "1")]))
        .renderer(Arc::new(FakeRenderer { pages: 1 }))
        .progress_callback(log.clone())
        .build()
        .unwrap();

    let paths = vec![scans.pdf("a.pdf"), scans.missing("b.pdf")];
    extract_and_parse_donations(&BatchRequest::new(paths), &config)
        .await
        .unwrap();

    assert_eq!(
        *log.0.lock().unwrap(),
        vec![
            "batch 2",
            "start 1 a.pdf",
            "ok 1 a.pdf",
            "start 2 b.pdf",
            "err 2 b.pdf",
            "done 1/2"
        ]
    );
}

#[tokio::test]
async fn stream_yields_the_same_records_in_order() {
    let scans = Scans::new();
    let paths = vec![scans.pdf("a.pdf"), scans.missing("b.pdf"), scans.pdf("c.pdf")];
    let client = ScriptedClient::new([donor("Ann", "1"), donor("Cy", "3")]);

    let stream = extract_stream(&BatchRequest::new(paths), &config_with(client, 1))
        .await
        .unwrap();
    let records: Vec<DonationRecord> = stream.collect().await;

    let names: Vec<&str> = records.iter().map(|r| r.source_file.as_str()).collect();
    assert_eq!(names, vec!["a.pdf", "b.pdf", "c.pdf"]);
    assert!(records[1].is_error());
    assert_eq!(records[2].donor_name, "Cy");
}

#[tokio::test]
async fn stream_reports_batch_start_and_completion() {
    let scans = Scans::new();
    let log = Arc::new(EventLog::default());
    let config = ExtractionConfig::builder()
        .client(ScriptedClient::new([donor("Ann", "1")]))
        .renderer(Arc::new(FakeRenderer { pages: 1 }))
        .progress_callback(log.clone())
        .build()
        .unwrap();

    let paths = vec![scans.pdf("a.pdf"), scans.missing("b.pdf")];
    let stream = extract_stream(&BatchRequest::new(paths), &config)
        .await
        .unwrap();
    assert_eq!(*log.0.lock().unwrap(), vec!["batch 2"]);

    let records: Vec<DonationRecord> = stream.collect().await;
    assert_eq!(records.len(), 2);
    assert_eq!(
        *log.0.lock().unwrap(),
        vec![
            "batch 2",
            "start 1 a.pdf",
            "ok 1 a.pdf",
            "start 2 b.pdf",
            "err 2 b.pdf",
            "done 1/2"
        ]
    );
}

#[tokio::test]
async fn stream_rejects_oversized_batch_up_front() {
    let paths: Vec<String> = (0..6).map(|i| format!("/tmp/r{i}.pdf")).collect();
    let result = extract_stream(
        &BatchRequest::new(paths),
        &config_with(ScriptedClient::new([]), 1),
    )
    .await;
    assert!(matches!(result, Err(DonationError::BatchTooLarge { .. })));
}

#[test]
fn sync_wrapper_runs_the_batch() {
    let scans = Scans::new();
    let client = ScriptedClient::new([donor("Ann", "10.00")]);
    let result = extract_and_parse_donations_sync(
        &BatchRequest::new([scans.pdf("a.pdf")]),
        &config_with(client, 1),
    )
    .unwrap();
    assert_eq!(result.records[0].donor_name, "Ann");
}
