use crate::Result;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::collections::{HashMap, HashSet};
use std::future::Future;

/// Response metadata accumulated for one in-flight request, waiting for
/// its `loadingFinished` event.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingExchange {
    pub url: String,
    pub status: u16,
    pub mime_type: String,
    pub response_headers: HashMap<String, String>,
    pub request_method: String,
    pub request_headers: HashMap<String, String>,
    pub request_body: String,
}

/// Immutable snapshot of one fully observed request/response pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedExchange {
    pub url: String,
    pub status: u16,
    pub mime_type: String,
    pub request_method: String,
    pub request_headers: HashMap<String, String>,
    pub request_body: String,
    pub response_headers: HashMap<String, String>,
    pub response_body: String,
}

/// Raw result of the body-fetch capability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedBody {
    pub body: String,
    pub base64_encoded: bool,
}

/// Correlates the two asynchronous per-request events by request id.
///
/// `loadingFinished` can fire more than once for the same id, so ids go
/// into a separate finalized set the moment they complete; a duplicate
/// finish is a guaranteed no-op even after the pending entry is gone.
/// Entries whose finish never arrives are leaked for the run, a
/// deliberate trade-off over strict bounding.
#[derive(Debug, Default)]
pub struct ExchangeTable {
    pending: HashMap<String, PendingExchange>,
    finalized: HashSet<String>,
}

impl ExchangeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or overwrite) the response metadata for a request id.
    /// Events without an id or URL are discarded.
    pub fn insert_response(&mut self, request_id: &str, response: PendingExchange) {
        if request_id.is_empty() || response.url.is_empty() {
            return;
        }
        self.pending.insert(request_id.to_string(), response);
    }

    /// Finalize a request: join its pending metadata with the fetched
    /// body and retire the id.
    ///
    /// Returns `None` when the id is unknown or already finalized. The
    /// body fetch runs at most once per finish; a fetch or decode
    /// failure degrades to an empty body (some bodies are legitimately
    /// unavailable, e.g. cross-origin or already-closed connections).
    pub async fn complete<F, Fut>(
        &mut self,
        request_id: &str,
        fetch_body: F,
    ) -> Option<CompletedExchange>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FetchedBody>>,
    {
        if request_id.is_empty()
            || self.finalized.contains(request_id)
            || !self.pending.contains_key(request_id)
        {
            return None;
        }

        let response_body = match fetch_body().await {
            Ok(fetched) => decode_body(request_id, fetched),
            Err(err) => {
                tracing::debug!("response body unavailable for {request_id}: {err}");
                String::new()
            }
        };

        self.finalized.insert(request_id.to_string());
        let pending = self.pending.remove(request_id)?;

        Some(CompletedExchange {
            url: pending.url,
            status: pending.status,
            mime_type: pending.mime_type,
            request_method: pending.request_method,
            request_headers: pending.request_headers,
            request_body: pending.request_body,
            response_headers: pending.response_headers,
            response_body,
        })
    }

    /// Number of requests still waiting for their finish event.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

fn decode_body(request_id: &str, fetched: FetchedBody) -> String {
    if !fetched.base64_encoded {
        return fetched.body;
    }
    match BASE64.decode(fetched.body.as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            tracing::debug!("base64 body for {request_id} did not decode: {err}");
            String::new()
        }
    }
}
