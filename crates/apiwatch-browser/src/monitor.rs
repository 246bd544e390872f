use crate::events::{self, NetworkEvent};
use crate::exchange::{CompletedExchange, ExchangeTable, PendingExchange};
use crate::session::{BrowserSession, LogStream};
use apiwatch_core::aggregate::{ErrorSummary, Failure};
use apiwatch_core::validate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};

/// Matches the cadence browsers buffer network events at; sub-second so
/// the dashboard stays close to live.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The correlation loop: polls the session's log stream, correlates the
/// two per-request events, and feeds failing API exchanges into the
/// shared aggregate.
///
/// The whole pipeline runs sequentially inside each poll; the aggregate
/// lock is the only thing shared with the query surface.
pub struct TrafficMonitor {
    session: BrowserSession,
    log: LogStream,
    exchanges: ExchangeTable,
    summary: Arc<Mutex<ErrorSummary>>,
}

impl TrafficMonitor {
    pub fn new(
        session: BrowserSession,
        log: LogStream,
        summary: Arc<Mutex<ErrorSummary>>,
    ) -> Self {
        Self {
            session,
            log,
            exchanges: ExchangeTable::new(),
            summary,
        }
    }

    /// Run until the stop signal fires or the browser goes away.
    ///
    /// Returns the session so the caller can flush the aggregate to a
    /// report before the browser is released. In-flight exchanges die
    /// with the table; they never completed and are not reported.
    pub async fn run(mut self, mut stop: oneshot::Receiver<()>) -> BrowserSession {
        tracing::info!("Monitoring network traffic...");
        let mut ticker = tokio::time::interval(POLL_INTERVAL);

        loop {
            tokio::select! {
                _ = &mut stop => {
                    tracing::info!("Monitor: stop signal received");
                    break;
                }
                _ = ticker.tick() => {
                    if !self.session.is_alive().await {
                        tracing::info!("Browser is gone, stopping monitor");
                        break;
                    }
                    self.poll_once().await;
                }
            }
        }

        if self.exchanges.pending_count() > 0 {
            tracing::debug!(
                "{} exchanges never finished loading",
                self.exchanges.pending_count()
            );
        }
        self.session
    }

    async fn poll_once(&mut self) {
        for raw in self.log.drain() {
            match events::parse_log_entry(&raw) {
                Some(event) => self.handle_event(event).await,
                None => tracing::debug!("skipping unrecognized log entry"),
            }
        }
    }

    async fn handle_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::ResponseReceived {
                request_id,
                url,
                status,
                mime_type,
                response_headers,
                request_method,
                request_headers,
                request_body,
            } => {
                self.exchanges.insert_response(
                    &request_id,
                    PendingExchange {
                        url,
                        status,
                        mime_type,
                        response_headers,
                        request_method,
                        request_headers,
                        request_body,
                    },
                );
            }
            NetworkEvent::LoadingFinished { request_id } => {
                let session = &self.session;
                let completed = self
                    .exchanges
                    .complete(&request_id, || session.fetch_response_body(&request_id))
                    .await;
                if let Some(exchange) = completed {
                    self.record_verdict(exchange).await;
                }
            }
        }
    }

    async fn record_verdict(&self, exchange: CompletedExchange) {
        if let Some(failure) = evaluate(exchange) {
            tracing::warn!(
                "API error: {} - {} - {}",
                failure.url,
                failure.kind,
                failure.message
            );
            self.summary.lock().await.record(failure);
        }
    }
}

/// Validate one completed exchange and turn a failing verdict into a
/// recordable failure. Non-API traffic and passing responses yield
/// nothing and never touch the aggregate.
pub fn evaluate(exchange: CompletedExchange) -> Option<Failure> {
    let mime_type = match exchange.mime_type.as_str() {
        "" => None,
        mime => Some(mime),
    };
    let verdict = validate::validate(
        exchange.status,
        &exchange.response_body,
        &exchange.url,
        mime_type,
    );
    if !verdict.is_api_traffic || verdict.ok {
        return None;
    }
    let kind = verdict.kind?;

    Some(Failure {
        status_code: (exchange.status != 0).then_some(exchange.status),
        request_method: non_empty(exchange.request_method),
        request_body: non_empty(exchange.request_body),
        response_body: non_empty(exchange.response_body),
        url: exchange.url,
        kind,
        message: verdict.message,
        request_headers: exchange.request_headers,
        response_headers: exchange.response_headers,
    })
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiwatch_core::validate::ErrorKind;
    use std::collections::HashMap;

    fn exchange(url: &str, status: u16, mime_type: &str, body: &str) -> CompletedExchange {
        CompletedExchange {
            url: url.to_string(),
            status,
            mime_type: mime_type.to_string(),
            request_method: "GET".to_string(),
            request_headers: HashMap::new(),
            request_body: String::new(),
            response_headers: HashMap::new(),
            response_body: body.to_string(),
        }
    }

    #[test]
    fn test_non_api_traffic_yields_no_failure() {
        assert!(evaluate(exchange("https://cdn.host/app.js", 404, "text/javascript", "")).is_none());
        assert!(evaluate(exchange("https://host/page/", 200, "", "not json")).is_none());
        assert!(
            evaluate(exchange(
                "https://host/weird",
                200,
                "text/plain",
                "<html></html>"
            ))
            .is_none()
        );
    }

    #[test]
    fn test_passing_response_yields_no_failure() {
        let completed = exchange(
            "https://host/api/users",
            200,
            "application/json",
            r#"{"code":"SUCCESS"}"#,
        );
        assert!(evaluate(completed).is_none());
    }

    #[test]
    fn test_failing_response_becomes_a_recordable_failure() {
        let completed = exchange(
            "https://host/api/users?page=2",
            200,
            "application/json",
            r#"{"code":"9999","message":"bad"}"#,
        );

        let failure = evaluate(completed).expect("failure");
        assert_eq!(failure.url, "https://host/api/users?page=2");
        assert_eq!(failure.kind, ErrorKind::ResponseCode);
        assert!(failure.message.contains("code=9999"));
        assert_eq!(failure.status_code, Some(200));
        assert_eq!(failure.request_method.as_deref(), Some("GET"));
        assert_eq!(
            failure.response_body.as_deref(),
            Some(r#"{"code":"9999","message":"bad"}"#)
        );
        // Empty request body degrades to absent, not empty string.
        assert!(failure.request_body.is_none());
    }

    #[test]
    fn test_transport_failure_keeps_empty_body_absent() {
        let failure =
            evaluate(exchange("https://host/api/users", 404, "", "")).expect("failure");
        assert_eq!(failure.kind, ErrorKind::StatusCode);
        assert_eq!(failure.message, "HTTP 404 - Not Found");
        assert!(failure.response_body.is_none());
    }
}
