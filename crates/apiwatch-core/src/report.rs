use crate::Result;
use crate::aggregate::ErrorSummary;
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::Path;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const BORDER: &str = "==================================================";

pub struct ReportWriter;

impl ReportWriter {
    /// Render the current aggregate as a plain-text report.
    pub fn render(summary: &ErrorSummary) -> String {
        Self::render_at(summary, Local::now())
    }

    /// Write the report to a file.
    pub fn to_file(summary: &ErrorSummary, path: &Path) -> Result<()> {
        tracing::debug!("Writing error summary report to: {}", path.display());

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(Self::render(summary).as_bytes())?;
        writer.flush()?;

        tracing::info!(
            "Wrote report covering {} endpoints to {}",
            summary.distinct_endpoints(),
            path.display()
        );

        Ok(())
    }

    fn render_at(summary: &ErrorSummary, now: DateTime<Local>) -> String {
        let started = summary.started_at();
        let runtime = now.signed_duration_since(started);

        let mut out = String::new();
        out.push_str("API Error Summary Report\n");
        let _ = writeln!(out, "Started: {}", started.format(TIME_FORMAT));
        let _ = writeln!(out, "Current: {}", now.format(TIME_FORMAT));
        let _ = writeln!(out, "Runtime: {}", format_runtime(runtime));
        out.push('\n');

        if summary.is_empty() {
            out.push_str("No errors found.\n");
            return out;
        }

        let _ = writeln!(
            out,
            "Found {} distinct failing API endpoints:\n",
            summary.distinct_endpoints()
        );

        for record in summary.sorted_records() {
            out.push_str(BORDER);
            out.push('\n');
            let _ = writeln!(out, "URI: {}", record.path);
            let _ = writeln!(out, "Error type: {}", record.kind);
            let _ = writeln!(out, "Message: {}", record.summary_message);
            if let Some(status) = record.status_code {
                let _ = writeln!(out, "Status code: {}", status);
            }
            if record.count > 1 {
                let _ = writeln!(out, "Occurrences: {}", record.count);
            }
            out.push_str(BORDER);
            out.push_str("\n\n");
        }

        out
    }
}

/// Format an elapsed duration as `XhYmZs`, dropping leading zero units.
pub fn format_runtime(runtime: chrono::Duration) -> String {
    let total_seconds = runtime.num_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{Failure, Headers};
    use crate::validate::ErrorKind;

    #[test]
    fn test_empty_report_states_no_errors() {
        let summary = ErrorSummary::new();
        let report = ReportWriter::render(&summary);

        assert!(report.contains("API Error Summary Report"));
        assert!(report.contains("Started: "));
        assert!(report.contains("Current: "));
        assert!(report.contains("Runtime: "));
        assert!(report.contains("No errors found."));
    }

    #[test]
    fn test_report_lists_endpoints_sorted_by_path() {
        let mut summary = ErrorSummary::new();
        for (url, message) in [
            ("https://host/api/zebra", "code=9999"),
            ("https://host/api/alpha", "HTTP 404 - Not Found"),
        ] {
            summary.record(Failure {
                url: url.to_string(),
                kind: ErrorKind::StatusCode,
                message: message.to_string(),
                status_code: Some(404),
                request_method: None,
                request_headers: Headers::new(),
                request_body: None,
                response_headers: Headers::new(),
                response_body: None,
            });
        }

        let report = ReportWriter::render(&summary);
        let alpha = report.find("/api/alpha").unwrap();
        let zebra = report.find("/api/zebra").unwrap();
        assert!(alpha < zebra, "endpoints should be sorted by path");
        assert!(report.contains("Error type: Status Code Error"));
        assert!(report.contains("Status code: 404"));
        // Single occurrences get no count line.
        assert!(!report.contains("Occurrences:"));
    }

    #[test]
    fn test_report_shows_occurrence_count_above_one() {
        let mut summary = ErrorSummary::new();
        for _ in 0..3 {
            summary.record(Failure {
                url: "https://host/api/x".to_string(),
                kind: ErrorKind::Format,
                message: "empty response body".to_string(),
                status_code: None,
                request_method: None,
                request_headers: Headers::new(),
                request_body: None,
                response_headers: Headers::new(),
                response_body: None,
            });
        }

        let report = ReportWriter::render(&summary);
        assert!(report.contains("Occurrences: 3"));
        // No status code on a format error without one.
        assert!(!report.contains("Status code:"));
    }

    #[test]
    fn test_report_writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");

        let summary = ErrorSummary::new();
        ReportWriter::to_file(&summary, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("No errors found."));
    }

    #[test]
    fn test_runtime_formatting_drops_leading_zero_units() {
        assert_eq!(format_runtime(chrono::Duration::seconds(5)), "5s");
        assert_eq!(format_runtime(chrono::Duration::seconds(65)), "1m 5s");
        assert_eq!(format_runtime(chrono::Duration::seconds(3600 + 125)), "1h 2m 5s");
        assert_eq!(format_runtime(chrono::Duration::seconds(0)), "0s");
    }
}
