use crate::classify;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Business-level success values accepted in a payload's `code` field.
/// Compared by exact string equality: numeric codes and other spellings
/// (`0`, `"success"`) are failures.
const SUCCESS_CODES: &[&str] = &["SUCCESS", "00000"];

/// Classification of a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// HTTP transport status outside 2xx.
    StatusCode,
    /// Transport succeeded but the business `code` field is missing or
    /// not a success value.
    ResponseCode,
    /// Body absent, unparseable, or an unexpected JSON shape.
    Format,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::StatusCode => "Status Code Error",
            ErrorKind::ResponseCode => "Response Code Error",
            ErrorKind::Format => "Format Error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating one completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub ok: bool,
    pub kind: Option<ErrorKind>,
    pub message: String,
    /// False when the exchange turned out not to be API traffic at all;
    /// such exchanges are never recorded as errors.
    pub is_api_traffic: bool,
}

impl Verdict {
    /// A valid API response.
    fn pass() -> Self {
        Self {
            ok: true,
            kind: None,
            message: String::new(),
            is_api_traffic: true,
        }
    }

    /// Not API traffic; validation does not apply.
    fn skip() -> Self {
        Self {
            ok: true,
            kind: None,
            message: String::new(),
            is_api_traffic: false,
        }
    }

    fn fail(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            kind: Some(kind),
            message: message.into(),
            is_api_traffic: true,
        }
    }
}

/// Validate one completed exchange.
///
/// The pipeline short-circuits on the first determination: classifier
/// veto, transport status, body emptiness, body shape (the deferred
/// not-API veto), JSON parse, JSON shape, business `code` check.
pub fn validate(
    status_code: u16,
    response_body: &str,
    url: &str,
    mime_type: Option<&str>,
) -> Verdict {
    if !classify::is_api_traffic(url, mime_type) {
        return Verdict::skip();
    }

    if !(200..300).contains(&status_code) {
        return Verdict::fail(ErrorKind::StatusCode, status_message(status_code));
    }

    if response_body.is_empty() {
        return Verdict::fail(ErrorKind::Format, "empty response body");
    }

    // Deferred veto for URLs the classifier only tentatively accepted:
    // a body that is not JSON-shaped, served under a non-JSON MIME type,
    // is page traffic after all.
    if !looks_like_json(response_body)
        && let Some(mime) = mime_type
        && !mime.to_ascii_lowercase().contains("json")
    {
        return Verdict::skip();
    }

    let payload = match parse_payload(response_body) {
        Ok(value) => value,
        Err(err) => {
            let trimmed = response_body.trim();
            if trimmed.is_empty() {
                return Verdict::fail(ErrorKind::Format, "response body is whitespace only");
            }
            // An HTML error or login page behind a JSON-less URL: treat
            // as page traffic rather than a broken API response.
            if trimmed.starts_with('<') {
                return Verdict::skip();
            }
            return Verdict::fail(ErrorKind::Format, format!("invalid JSON in response: {err}"));
        }
    };

    let object = match payload {
        // Array payloads are valid API responses with no code field to check.
        Value::Array(_) => return Verdict::pass(),
        Value::Object(map) => map,
        other => {
            return Verdict::fail(
                ErrorKind::Format,
                format!("response is not a JSON object: {}", json_type_name(&other)),
            );
        }
    };

    match object.get("code") {
        None => {
            let mut message = String::from("missing code field in response");
            append_payload_detail(&mut message, &object);
            Verdict::fail(ErrorKind::ResponseCode, message)
        }
        Some(code) if !is_success_code(code) => {
            let mut message = format!("code={}", render_scalar(code));
            append_payload_detail(&mut message, &object);
            Verdict::fail(ErrorKind::ResponseCode, message)
        }
        Some(_) => Verdict::pass(),
    }
}

fn status_message(status: u16) -> String {
    let suffix = match status {
        404 => " - Not Found",
        500 => " - Internal Server Error",
        401 => " - Unauthorized",
        403 => " - Forbidden",
        _ => " - Error",
    };
    format!("HTTP {status}{suffix}")
}

/// JSON payloads lead with `{` or `[`; anything else is suspect.
fn looks_like_json(body: &str) -> bool {
    let trimmed = body.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

/// Strict parse with one retry after shedding surrounding whitespace and
/// a leading byte-order mark (some gateways prepend one).
fn parse_payload(body: &str) -> serde_json::Result<Value> {
    serde_json::from_str(body).or_else(|err| {
        let cleaned = body.trim();
        let cleaned = cleaned.strip_prefix('\u{feff}').unwrap_or(cleaned);
        if cleaned == body {
            return Err(err);
        }
        serde_json::from_str(cleaned)
    })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_success_code(code: &Value) -> bool {
    matches!(code, Value::String(s) if SUCCESS_CODES.contains(&s.as_str()))
}

/// Pull a human-readable detail out of the payload, checking the usual
/// field names in order.
fn append_payload_detail(message: &mut String, object: &serde_json::Map<String, Value>) {
    for key in ["message", "msg", "error"] {
        if let Some(value) = object.get(key) {
            message.push_str(&format!(", {key}={}", render_scalar(value)));
            return;
        }
    }
}

/// Strings render bare; everything else as its JSON form.
fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_payload_passes() {
        let verdict = validate(
            200,
            r#"{"code":"SUCCESS"}"#,
            "https://host/api/v1/users",
            Some("application/json"),
        );
        assert!(verdict.ok);
        assert!(verdict.is_api_traffic);
        assert_eq!(verdict.kind, None);
    }

    #[test]
    fn test_zero_string_code_accepted() {
        let verdict = validate(
            200,
            r#"{"code":"00000","data":[]}"#,
            "https://host/api/orders",
            Some("application/json"),
        );
        assert!(verdict.ok);
    }

    #[test]
    fn test_business_code_failure_carries_detail() {
        let verdict = validate(
            200,
            r#"{"code":"9999","message":"bad"}"#,
            "https://host/api/v1/users",
            Some("application/json"),
        );
        assert!(!verdict.ok);
        assert_eq!(verdict.kind, Some(ErrorKind::ResponseCode));
        assert!(verdict.message.contains("code=9999"));
        assert!(verdict.message.contains("message=bad"));
    }

    #[test]
    fn test_numeric_zero_code_is_a_failure() {
        // Only the exact strings SUCCESS and 00000 pass.
        let verdict = validate(
            200,
            r#"{"code":0,"msg":"fine"}"#,
            "https://host/api/x",
            Some("application/json"),
        );
        assert!(!verdict.ok);
        assert_eq!(verdict.kind, Some(ErrorKind::ResponseCode));
        assert!(verdict.message.contains("code=0"));
        assert!(verdict.message.contains("msg=fine"));
    }

    #[test]
    fn test_lowercase_success_is_a_failure() {
        let verdict = validate(
            200,
            r#"{"code":"success"}"#,
            "https://host/api/x",
            Some("application/json"),
        );
        assert!(!verdict.ok);
        assert!(verdict.message.contains("code=success"));
    }

    #[test]
    fn test_missing_code_field() {
        let verdict = validate(
            200,
            r#"{"error":"boom"}"#,
            "https://host/api/x",
            Some("application/json"),
        );
        assert!(!verdict.ok);
        assert_eq!(verdict.kind, Some(ErrorKind::ResponseCode));
        assert!(verdict.message.contains("missing code field"));
        assert!(verdict.message.contains("error=boom"));
    }

    #[test]
    fn test_transport_error_messages() {
        let verdict = validate(404, "", "https://host/api/x", None);
        assert!(!verdict.ok);
        assert_eq!(verdict.kind, Some(ErrorKind::StatusCode));
        assert_eq!(verdict.message, "HTTP 404 - Not Found");
        assert!(verdict.is_api_traffic);

        assert_eq!(
            validate(500, "", "https://host/api/x", None).message,
            "HTTP 500 - Internal Server Error"
        );
        assert_eq!(
            validate(401, "", "https://host/api/x", None).message,
            "HTTP 401 - Unauthorized"
        );
        assert_eq!(
            validate(403, "", "https://host/api/x", None).message,
            "HTTP 403 - Forbidden"
        );
        assert_eq!(
            validate(418, "", "https://host/api/x", None).message,
            "HTTP 418 - Error"
        );
    }

    #[test]
    fn test_empty_body_is_format_error() {
        let verdict = validate(200, "", "https://host/api/x", Some("application/json"));
        assert!(!verdict.ok);
        assert_eq!(verdict.kind, Some(ErrorKind::Format));
        assert_eq!(verdict.message, "empty response body");
    }

    #[test]
    fn test_non_api_page_is_skipped_entirely() {
        // Trailing slash: the classifier rejects it before validation.
        let verdict = validate(200, "not json", "https://host/page/", None);
        assert!(verdict.ok);
        assert!(!verdict.is_api_traffic);
    }

    #[test]
    fn test_body_shape_veto_reclassifies_as_page() {
        let verdict = validate(200, "<html><body>hi</body></html>", "https://host/weird", Some("text/plain"));
        assert!(verdict.ok);
        assert!(!verdict.is_api_traffic);
    }

    #[test]
    fn test_html_body_without_mime_is_skipped_after_parse_failure() {
        // No MIME type, so the shape veto defers to the parser.
        let verdict = validate(200, "<!DOCTYPE html><html></html>", "https://host/weird", None);
        assert!(verdict.ok);
        assert!(!verdict.is_api_traffic);
    }

    #[test]
    fn test_garbage_body_without_mime_is_format_error() {
        let verdict = validate(200, "not json at all", "https://host/weird", None);
        assert!(!verdict.ok);
        assert_eq!(verdict.kind, Some(ErrorKind::Format));
        assert!(verdict.message.contains("invalid JSON"));
    }

    #[test]
    fn test_bom_prefixed_json_parses_on_retry() {
        let body = "\u{feff}{\"code\":\"SUCCESS\"}";
        let verdict = validate(200, body, "https://host/api/x", Some("application/json"));
        assert!(verdict.ok, "BOM-prefixed JSON should pass: {}", verdict.message);
    }

    #[test]
    fn test_array_payload_is_valid_without_code_check() {
        let verdict = validate(
            200,
            r#"[{"id":1},{"id":2}]"#,
            "https://host/api/items",
            Some("application/json"),
        );
        assert!(verdict.ok);
        assert!(verdict.is_api_traffic);
    }

    #[test]
    fn test_scalar_payload_is_format_error() {
        let verdict = validate(200, "42", "https://host/api/count", Some("application/json"));
        assert!(!verdict.ok);
        assert_eq!(verdict.kind, Some(ErrorKind::Format));
        assert!(verdict.message.contains("number"));
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::StatusCode.to_string(), "Status Code Error");
        assert_eq!(ErrorKind::ResponseCode.to_string(), "Response Code Error");
        assert_eq!(ErrorKind::Format.to_string(), "Format Error");
    }
}
