use serde_json::Value;
use std::collections::HashMap;

/// CDP method names this monitor cares about. Everything else in the log
/// stream is ignored by design.
pub const RESPONSE_RECEIVED: &str = "Network.responseReceived";
pub const LOADING_FINISHED: &str = "Network.loadingFinished";

/// Typed network event extracted from one raw log entry.
///
/// A browser emits `responseReceived` (headers are in) and
/// `loadingFinished` (body is complete) as two independent asynchronous
/// events per request, correlated only by the request id.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    ResponseReceived {
        request_id: String,
        url: String,
        status: u16,
        mime_type: String,
        response_headers: HashMap<String, String>,
        request_method: String,
        request_headers: HashMap<String, String>,
        request_body: String,
    },
    LoadingFinished {
        request_id: String,
    },
}

/// Wrap CDP event params in the performance-log envelope carried on the
/// session's log channel.
pub fn envelope(method: &str, params: Value) -> String {
    serde_json::json!({ "message": { "method": method, "params": params } }).to_string()
}

/// Parse one raw log entry into a typed event.
///
/// Returns `None` for malformed payloads, unrecognized methods, and
/// entries missing required fields; a bad entry never aborts the batch.
pub fn parse_log_entry(raw: &str) -> Option<NetworkEvent> {
    let entry: Value = serde_json::from_str(raw).ok()?;
    let message = entry.get("message")?;
    let method = message.get("method")?.as_str()?;
    let params = message.get("params")?;

    match method {
        RESPONSE_RECEIVED => {
            let request_id = params.get("requestId")?.as_str()?.to_string();
            let response = params.get("response")?;
            let request = params.get("request");

            Some(NetworkEvent::ResponseReceived {
                request_id,
                url: string_field(Some(response), "url"),
                status: response.get("status").and_then(Value::as_u64).unwrap_or(0) as u16,
                mime_type: string_field(Some(response), "mimeType"),
                response_headers: header_map(response.get("headers")),
                request_method: string_field(request, "method"),
                request_headers: header_map(request.and_then(|r| r.get("headers"))),
                request_body: string_field(request, "postData"),
            })
        }
        LOADING_FINISHED => Some(NetworkEvent::LoadingFinished {
            request_id: params.get("requestId")?.as_str()?.to_string(),
        }),
        _ => None,
    }
}

fn string_field(object: Option<&Value>, key: &str) -> String {
    object
        .and_then(|o| o.get(key))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// CDP header values are strings in practice; anything else is kept via
/// its JSON rendering rather than dropped.
fn header_map(headers: Option<&Value>) -> HashMap<String, String> {
    let Some(Value::Object(map)) = headers else {
        return HashMap::new();
    };
    map.iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (name.clone(), value)
        })
        .collect()
}
