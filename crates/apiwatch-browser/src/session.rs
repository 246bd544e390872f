use crate::events::{self, LOADING_FINISHED, RESPONSE_RECEIVED};
use crate::exchange::FetchedBody;
use crate::{Error, Result};
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    GetResponseBodyParams, Headers, RequestId, SetBypassServiceWorkerParams,
    SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Upper bound on log entries handed out per drain, so one noisy page
/// cannot starve a polling pass.
const MAX_DRAIN_BATCH: usize = 1024;

/// Pages detect automation through `navigator.webdriver`; hide it the
/// way interactive sessions look.
const CONCEAL_WEBDRIVER_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";

/// Chrome switches the monitor depends on: relaxed cross-origin rules so
/// the session sees the same traffic an unrestricted operator would, and
/// no automation banner.
const CHROME_ARGS: &[&str] = &[
    "--disable-web-security",
    "--disable-features=VizDisplayCompositor,BlockInsecurePrivateNetworkRequests",
    "--allow-running-insecure-content",
    "--disable-blink-features=AutomationControlled",
    "--disable-site-isolation-trials",
    "--no-first-run",
    "--no-default-browser-check",
];

/// How to launch and prepare the observed browser.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Page to open once monitoring is wired up.
    pub initial_url: Option<String>,
    /// Chrome profile directory; a reusable temp profile when absent.
    pub user_data_dir: Option<PathBuf>,
    pub headless: bool,
    /// Header names/values injected into every outbound request.
    pub extra_headers: HashMap<String, String>,
}

/// Request metadata remembered between `requestWillBeSent` and the
/// response, so forwarded response entries carry request forensics.
struct RequestInfo {
    method: String,
    headers: Value,
    post_data: Option<String>,
}

/// Non-blocking reader over the session's forwarded log entries.
pub struct LogStream {
    entries: mpsc::UnboundedReceiver<String>,
}

impl LogStream {
    pub(crate) fn new(entries: mpsc::UnboundedReceiver<String>) -> Self {
        Self { entries }
    }

    /// Drain whatever entries have arrived, without blocking. May return
    /// an empty batch.
    pub fn drain(&mut self) -> Vec<String> {
        let mut batch = Vec::new();
        while batch.len() < MAX_DRAIN_BATCH {
            match self.entries.try_recv() {
                Ok(entry) => batch.push(entry),
                Err(_) => break,
            }
        }
        batch
    }
}

/// A live Chrome instance with the Network domain enabled and its
/// network events forwarded onto a log channel.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    forwarder_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch Chrome, enable network logging, inject configured headers,
    /// and start forwarding network events.
    pub async fn launch(config: SessionConfig) -> Result<(Self, LogStream)> {
        let browser_config = build_browser_config(&config)?;

        tracing::info!("Launching Chrome...");
        let (browser, mut handler) = Browser::launch(browser_config).await?;

        // The handler stream must be pumped for any CDP command to make
        // progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("CDP handler event error (continuing): {}", e);
                }
            }
        });

        // Chrome needs a moment to create its initial target.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let pages = browser.pages().await?;
        let page = match pages.first() {
            Some(page) => page.clone(),
            None => browser.new_page("about:blank").await?,
        };

        page.execute(EnableParams::default()).await?;
        tracing::info!("Network domain enabled");

        if !config.extra_headers.is_empty() {
            let headers = Headers::new(serde_json::json!(config.extra_headers));
            page.execute(SetExtraHttpHeadersParams::new(headers)).await?;
            tracing::info!("Injected {} extra request headers", config.extra_headers.len());
        }

        // Both of these are best-effort; older Chrome builds reject them.
        if let Err(e) = page.execute(SetBypassServiceWorkerParams::new(true)).await {
            tracing::debug!("service worker bypass unavailable: {e}");
        }
        if let Err(e) = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(
                CONCEAL_WEBDRIVER_SCRIPT,
            ))
            .await
        {
            tracing::warn!("could not install automation-concealment script: {e}");
        }

        let mut request_events = page.event_listener::<EventRequestWillBeSent>().await?;
        let mut response_events = page.event_listener::<EventResponseReceived>().await?;
        let mut finished_events = page.event_listener::<EventLoadingFinished>().await?;

        let (entry_tx, entry_rx) = mpsc::unbounded_channel();
        let forwarder_task = tokio::spawn(async move {
            let mut requests: HashMap<String, RequestInfo> = HashMap::new();
            loop {
                tokio::select! {
                    Some(event) = request_events.next() => {
                        requests.insert(
                            event.request_id.inner().to_string(),
                            RequestInfo {
                                method: event.request.method.clone(),
                                headers: event.request.headers.inner().clone(),
                                post_data: event.request.post_data.clone(),
                            },
                        );
                    }
                    Some(event) = response_events.next() => {
                        tracing::debug!("Response: {} - {}", event.response.status, event.response.url);
                        if let Some(entry) = response_entry(&event, &requests) {
                            let _ = entry_tx.send(entry);
                        }
                    }
                    Some(event) = finished_events.next() => {
                        if let Some(entry) = forwarded_entry(LOADING_FINISHED, &*event) {
                            let _ = entry_tx.send(entry);
                        }
                        requests.remove(event.request_id.inner().as_str());
                    }
                    else => {
                        tracing::debug!("CDP event streams closed, stopping forwarder");
                        break;
                    }
                }
            }
        });

        if let Some(url) = &config.initial_url {
            tracing::info!("Opening {}", url);
            page.goto(url.as_str()).await?;
        }

        Ok((
            Self {
                browser,
                page,
                handler_task,
                forwarder_task,
            },
            LogStream::new(entry_rx),
        ))
    }

    /// Fetch the response body for a finished request. At most one call
    /// per request id; failures are expected for some resources.
    pub async fn fetch_response_body(&self, request_id: &str) -> Result<FetchedBody> {
        let response = self
            .page
            .execute(GetResponseBodyParams::new(RequestId::new(request_id)))
            .await?;
        Ok(FetchedBody {
            body: response.body.clone(),
            base64_encoded: response.base64_encoded,
        })
    }

    /// Whether the browser still answers; false once the operator closes
    /// the window.
    pub async fn is_alive(&self) -> bool {
        self.page.url().await.is_ok()
    }

    /// Tear the session down. Report flushing must happen before this.
    pub async fn close(mut self) {
        self.forwarder_task.abort();
        if let Err(e) = self.browser.close().await {
            tracing::debug!("browser close: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            tracing::debug!("browser wait: {e}");
        }
        self.handler_task.abort();
        tracing::info!("Browser session closed");
    }
}

/// Serialize a response event, splicing in the request metadata captured
/// from `requestWillBeSent` (CDP response events carry none themselves).
fn response_entry(
    event: &EventResponseReceived,
    requests: &HashMap<String, RequestInfo>,
) -> Option<String> {
    let mut params = serde_json::to_value(event).ok()?;
    if let Some(info) = requests.get(event.request_id.inner().as_str()) {
        params["request"] = serde_json::json!({
            "method": info.method,
            "headers": info.headers,
            "postData": info.post_data,
        });
    }
    Some(events::envelope(RESPONSE_RECEIVED, params))
}

fn forwarded_entry<E: serde::Serialize>(method: &str, event: &E) -> Option<String> {
    let params = serde_json::to_value(event).ok()?;
    Some(events::envelope(method, params))
}

fn build_browser_config(config: &SessionConfig) -> Result<BrowserConfig> {
    let user_data_dir = match &config.user_data_dir {
        Some(dir) => dir.clone(),
        // A stable scratch profile keeps the relaxed-security switches
        // effective across runs.
        None => std::env::temp_dir().join("apiwatch-profile"),
    };
    std::fs::create_dir_all(&user_data_dir)?;

    let mut builder = BrowserConfig::builder()
        .launch_timeout(Duration::from_secs(30))
        .args(CHROME_ARGS.to_vec())
        .user_data_dir(&user_data_dir);
    if !config.headless {
        builder = builder.with_head();
    }

    builder.build().map_err(Error::Launch)
}
