use crate::validate::ErrorKind;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use url::Url;

pub type Headers = HashMap<String, String>;

/// Separator between distinct messages accumulated on one endpoint.
const MESSAGE_SEPARATOR: &str = " | ";

/// One validation failure with full forensic detail. Immutable once
/// recorded.
#[derive(Debug, Clone)]
pub struct ErrorOccurrence {
    pub message: String,
    pub status_code: Option<u16>,
    pub request_method: Option<String>,
    pub request_headers: Headers,
    pub request_body: Option<String>,
    pub response_headers: Headers,
    pub response_body: Option<String>,
    pub timestamp: DateTime<Local>,
}

/// All failures observed for one normalized endpoint path.
///
/// The kind and status code are those of the first occurrence; later
/// occurrences only grow the history and the message summary.
#[derive(Debug, Clone)]
pub struct EndpointRecord {
    pub path: String,
    pub kind: ErrorKind,
    pub summary_message: String,
    pub status_code: Option<u16>,
    pub count: usize,
    pub occurrences: Vec<ErrorOccurrence>,
}

/// Input to [`ErrorSummary::record`]: one failing exchange plus its
/// validation verdict, before endpoint normalization.
#[derive(Debug, Clone)]
pub struct Failure {
    pub url: String,
    pub kind: ErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
    pub request_method: Option<String>,
    pub request_headers: Headers,
    pub request_body: Option<String>,
    pub response_headers: Headers,
    pub response_body: Option<String>,
}

/// The shared failure aggregate: one record per distinct endpoint path,
/// deduplicated across unboundedly many failures while keeping every
/// occurrence.
#[derive(Debug)]
pub struct ErrorSummary {
    records: HashMap<String, EndpointRecord>,
    started_at: DateTime<Local>,
}

impl ErrorSummary {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            started_at: Local::now(),
        }
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Record one failure, creating or extending the endpoint's record.
    pub fn record(&mut self, failure: Failure) {
        let path = normalize_path(&failure.url);
        let occurrence = ErrorOccurrence {
            message: failure.message.clone(),
            status_code: failure.status_code,
            request_method: failure.request_method,
            request_headers: failure.request_headers,
            request_body: failure.request_body,
            response_headers: failure.response_headers,
            response_body: failure.response_body,
            timestamp: Local::now(),
        };

        match self.records.get_mut(&path) {
            Some(record) => {
                record.count += 1;
                let seen = record
                    .summary_message
                    .split(MESSAGE_SEPARATOR)
                    .any(|m| m == failure.message);
                if !seen {
                    record.summary_message.push_str(MESSAGE_SEPARATOR);
                    record.summary_message.push_str(&failure.message);
                }
                record.occurrences.push(occurrence);
            }
            None => {
                tracing::debug!("new failing endpoint: {}", path);
                self.records.insert(
                    path.clone(),
                    EndpointRecord {
                        path,
                        kind: failure.kind,
                        summary_message: failure.message,
                        status_code: failure.status_code,
                        count: 1,
                        occurrences: vec![occurrence],
                    },
                );
            }
        }
    }

    /// All records, in unspecified order. Callers wanting determinism
    /// sort by path (see [`ErrorSummary::sorted_records`]).
    pub fn records(&self) -> impl Iterator<Item = &EndpointRecord> {
        self.records.values()
    }

    /// Records sorted by endpoint path.
    pub fn sorted_records(&self) -> Vec<&EndpointRecord> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }

    /// Look up one endpoint by path or full URL.
    ///
    /// Tries exact path, the normalized form of the query, then a suffix
    /// match in either direction so partial-path queries resolve. The
    /// suffix fallback can match more than one record when paths share a
    /// suffix; the first one examined wins.
    pub fn find(&self, query: &str) -> Option<&EndpointRecord> {
        let normalized = normalize_path(query);
        self.records.values().find(|record| {
            record.path == query
                || record.path == normalized
                || (!normalized.is_empty() && record.path.ends_with(&normalized))
                || (!record.path.is_empty() && normalized.ends_with(&record.path))
        })
    }

    pub fn distinct_endpoints(&self) -> usize {
        self.records.len()
    }

    pub fn total_occurrences(&self) -> usize {
        self.records.values().map(|r| r.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record. The start time is unchanged.
    pub fn reset(&mut self) {
        self.records.clear();
    }
}

impl Default for ErrorSummary {
    fn default() -> Self {
        Self::new()
    }
}

/// Reduce a URL to its path component, the aggregation key. Anything the
/// URL parser rejects is used verbatim rather than dropped.
pub fn normalize_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    }
}
