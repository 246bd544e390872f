use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// URL shapes that are never API traffic: static assets, inline data
    /// URIs, and browser-extension-internal schemes.
    static ref NON_API_URL_PATTERNS: Vec<Regex> = vec![
        Regex::new(
            r"(?i)\.(js|css|png|jpg|jpeg|gif|ico|svg|woff|woff2|ttf|eot|pdf|zip|mp4|mp3|webp|avif)(\?|$|#)"
        )
        .unwrap(),
        Regex::new(r"data:image/").unwrap(),
        Regex::new(r"data:text/").unwrap(),
        Regex::new(r"chrome-extension://").unwrap(),
        Regex::new(r"moz-extension://").unwrap(),
    ];
}

/// Path segments that strongly indicate an API endpoint.
const API_PATH_INDICATORS: &[&str] = &[
    "/api/", "/rest/", "/graphql", "/rpc/", "/service/", "/v1/", "/v2/", "/v3/",
];

/// Decide whether an observed exchange is API traffic worth validating.
///
/// Layered heuristic, first matching rule wins:
/// 1. known non-API URL shape (static asset, data URI, extension scheme)
/// 2. JSON MIME type
/// 3. static MIME category (stylesheet, script, image, font, media, PDF)
/// 4. API-indicator path segment
/// 5. trailing `/`, `.html`, or `.htm`
/// 6. default: tentatively API; the validator's body-shape check gets the
///    final veto for this case.
///
/// No single signal is reliable across arbitrary web applications, so the
/// default errs toward API and lets the validator re-classify.
pub fn is_api_traffic(url: &str, mime_type: Option<&str>) -> bool {
    if NON_API_URL_PATTERNS.iter().any(|p| p.is_match(url)) {
        return false;
    }

    if let Some(mime) = mime_type {
        let mime = mime.to_ascii_lowercase();
        if mime.contains("json") {
            return true;
        }
        if is_static_mime(&mime) {
            return false;
        }
    }

    let url = url.to_ascii_lowercase();
    if API_PATH_INDICATORS.iter().any(|seg| url.contains(seg)) {
        return true;
    }

    if url.ends_with('/') || url.ends_with(".html") || url.ends_with(".htm") {
        return false;
    }

    true
}

/// MIME types served for pages and assets rather than API payloads.
fn is_static_mime(mime_type: &str) -> bool {
    if let Ok(parsed) = mime_type.parse::<mime::Mime>() {
        let top = parsed.type_();
        if top == mime::IMAGE || top == mime::FONT || top == mime::VIDEO || top == mime::AUDIO {
            return true;
        }
        let sub = parsed.subtype();
        // text/javascript and application/javascript are both in the wild
        return sub == mime::JAVASCRIPT
            || (top == mime::TEXT && sub == mime::CSS)
            || (top == mime::APPLICATION && sub == mime::PDF);
    }

    // Unparseable content types still get the substring treatment.
    [
        "text/css",
        "text/javascript",
        "application/javascript",
        "image/",
        "font/",
        "video/",
        "audio/",
        "application/pdf",
    ]
    .iter()
    .any(|marker| mime_type.contains(marker))
}
