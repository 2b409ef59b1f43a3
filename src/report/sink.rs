//! Run report accumulation and rendering
//!
//! The sink collects one [`TestOutcomeRecord`] per test, in the order
//! tests complete. Appends are serialized behind a lock so parallel
//! workers cannot interleave rows. Rendering is a pure function from the
//! record list to an HTML document; `finalize` consumes the sink, which
//! makes a second finalize unrepresentable.

use std::path::Path;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use htmlescape::encode_minimal;
use parking_lot::Mutex;
use tracing::{info, instrument};

use crate::debug::DebugBundle;
use crate::error::Result;
use crate::report::status::JobReference;

/// The result kind of one test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Test passed
    Passed,
    /// Test assertion failed
    Failed,
    /// Test raised an unexpected error outside its assertions
    Errored,
    /// Test was skipped
    Skipped,
    /// Test failed and was expected to fail
    ExpectedFailure,
    /// Test passed but was expected to fail
    UnexpectedPass,
}

impl OutcomeKind {
    /// Whether this outcome counts as a failing one for capture and
    /// cloud status purposes
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            OutcomeKind::Failed | OutcomeKind::Errored | OutcomeKind::UnexpectedPass
        )
    }

    /// Stable label used in the report
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeKind::Passed => "passed",
            OutcomeKind::Failed => "failed",
            OutcomeKind::Errored => "errored",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::ExpectedFailure => "expected failure",
            OutcomeKind::UnexpectedPass => "unexpected pass",
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything the report needs to know about one finished test
#[derive(Debug)]
pub struct TestOutcomeRecord {
    /// Test name as reported by the host runner
    pub test_name: String,
    /// Result kind
    pub outcome: OutcomeKind,
    /// Wall-clock test duration
    pub duration: Duration,
    /// Session the test ran on, if one was acquired
    pub session_id: Option<String>,
    /// Debug artifacts, if collection was triggered
    pub bundle: Option<DebugBundle>,
    /// Cloud job reference, if the provider is cloud-hosted
    pub job: Option<JobReference>,
    /// Supplementary diagnostics (reporting warnings and the like);
    /// never replaces the primary failure reason
    pub warnings: Vec<String>,
}

/// Accumulates test outcome records for one run
#[derive(Default)]
pub struct ReportSink {
    records: Mutex<Vec<TestOutcomeRecord>>,
}

impl ReportSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record; called exactly once per test, in completion
    /// order
    pub fn append(&self, record: TestOutcomeRecord) {
        self.records.lock().push(record);
    }

    /// Number of records appended so far
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True when no record has been appended
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Render the accumulated records and, when `path` is given, write
    /// the document there. Consuming `self` makes this a one-shot call.
    #[instrument(skip_all, fields(records = self.len()))]
    pub fn finalize(self, path: Option<&Path>) -> Result<String> {
        let records = self.records.into_inner();
        let document = render_report(&records);
        if let Some(path) = path {
            std::fs::write(path, &document)?;
            info!(path = %path.display(), records = records.len(), "report written");
        }
        Ok(document)
    }
}

/// Render the report document from an ordered record list
pub fn render_report(records: &[TestOutcomeRecord]) -> String {
    let total = records.len();
    let passed = records
        .iter()
        .filter(|r| r.outcome == OutcomeKind::Passed)
        .count();
    let failed = records.iter().filter(|r| r.outcome.is_failure()).count();

    let mut html = String::with_capacity(4096);
    html.push_str(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Test Report</title>\n",
    );
    html.push_str(
        "<style>\n\
         body { font-family: sans-serif; margin: 2em; }\n\
         table { border-collapse: collapse; width: 100%; }\n\
         th, td { border: 1px solid #ccc; padding: 0.4em 0.6em; text-align: left; }\n\
         .passed { color: #2a7f2a; }\n\
         .failed, .errored, .unexpected-pass { color: #b22222; }\n\
         .skipped, .expected-failure { color: #888; }\n\
         .diagnostics { font-size: 0.85em; color: #555; }\n\
         pre { background: #f6f6f6; padding: 0.5em; overflow-x: auto; }\n\
         </style>\n</head>\n<body>\n",
    );
    html.push_str(&format!(
        "<h1>Test Report</h1>\n<p>{total} tests: {passed} passed, {failed} failed.</p>\n"
    ));
    html.push_str("<table>\n<tr><th>Test</th><th>Result</th><th>Duration</th><th>Links</th></tr>\n");

    for record in records {
        let class = record.outcome.label().replace(' ', "-");
        html.push_str(&format!(
            "<tr class=\"{class}\"><td>{}</td><td class=\"{class}\">{}</td><td>{:.2}s</td><td>{}</td></tr>\n",
            encode_minimal(&record.test_name),
            record.outcome,
            record.duration.as_secs_f64(),
            render_links(record),
        ));
        if let Some(detail) = render_details(record) {
            html.push_str(&format!(
                "<tr><td colspan=\"4\" class=\"diagnostics\">{detail}</td></tr>\n"
            ));
        }
    }

    html.push_str("</table>\n</body>\n</html>\n");
    html
}

fn render_links(record: &TestOutcomeRecord) -> String {
    let mut links = Vec::new();
    if let Some(job) = &record.job {
        links.push(format!(
            "<a href=\"{}\">Job</a>",
            encode_minimal(&job.url)
        ));
        if let Some(video) = &job.video_url {
            links.push(format!("<a href=\"{}\">Video</a>", encode_minimal(video)));
        }
    }
    if let Some(bundle) = &record.bundle {
        if let Some(url) = &bundle.url {
            links.push(format!("<a href=\"{}\">URL</a>", encode_minimal(url)));
        }
        if let Some(markup) = &bundle.markup {
            links.push(format!(
                "<a href=\"data:text/html;base64,{markup}\">HTML</a>"
            ));
        }
    }
    links.join(" ")
}

fn render_details(record: &TestOutcomeRecord) -> Option<String> {
    let bundle = record.bundle.as_ref();
    let bundle_warnings = bundle.map(|b| b.warnings.as_slice()).unwrap_or_default();
    let has_screenshot = bundle.and_then(|b| b.screenshot.as_ref()).is_some();
    let has_log = bundle.and_then(|b| b.log_text.as_ref()).is_some();

    if bundle_warnings.is_empty() && record.warnings.is_empty() && !has_screenshot && !has_log {
        return None;
    }

    let mut detail = String::new();
    if let Some(screenshot) = bundle.and_then(|b| b.screenshot.as_ref()) {
        detail.push_str(&format!(
            "<div><img src=\"data:image/png;base64,{}\" alt=\"screenshot\" width=\"320\"></div>\n",
            BASE64.encode(screenshot)
        ));
    }
    if let Some(log_text) = bundle.and_then(|b| b.log_text.as_ref()) {
        detail.push_str(&format!("<pre>{}</pre>\n", encode_minimal(log_text)));
    }
    for warning in bundle_warnings.iter().chain(record.warnings.iter()) {
        detail.push_str(&format!("<div>{}</div>\n", encode_minimal(warning)));
    }
    Some(detail)
}
