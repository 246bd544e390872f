use apiwatch_core::aggregate::{ErrorOccurrence, ErrorSummary};
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to bind query server: {0}")]
    Bind(std::io::Error),

    #[error("Query server failed: {0}")]
    Serve(std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Shared state behind every handler: the live aggregate plus the name
/// of the report the run will produce.
#[derive(Clone)]
pub struct ApiState {
    pub summary: Arc<Mutex<ErrorSummary>>,
    pub output_file: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    success: bool,
    data: SummaryData,
}

#[derive(Debug, Serialize)]
struct SummaryData {
    total_errors: usize,
    total_requests: usize,
    errors: Vec<EndpointSummary>,
    start_time: String,
    output_file: Option<String>,
}

#[derive(Debug, Serialize)]
struct EndpointSummary {
    uri: String,
    error_type: String,
    error_message: String,
    status_code: Option<u16>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct DetailsResponse {
    success: bool,
    data: DetailsData,
}

#[derive(Debug, Serialize)]
struct DetailsData {
    uri: String,
    error_type: String,
    count: usize,
    details: Vec<OccurrenceDetail>,
}

#[derive(Debug, Serialize)]
struct OccurrenceDetail {
    error_message: String,
    status_code: Option<u16>,
    request_method: Option<String>,
    request_headers: std::collections::HashMap<String, String>,
    request_body: Option<String>,
    response_headers: std::collections::HashMap<String, String>,
    response_body: Option<String>,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct FailureResponse {
    success: bool,
    error: String,
}

/// Build the router with all query endpoints.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/summary", get(get_summary))
        .route("/api/error-details/{*uri}", get(get_error_details))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process ends.
pub async fn serve(state: ApiState, addr: SocketAddr) -> Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(Error::Bind)?;
    tracing::info!("Query server listening on http://{}", addr);

    axum::serve(listener, app).await.map_err(Error::Serve)
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Local::now().format(TIME_FORMAT).to_string(),
    })
}

/// Current failure counts per endpoint, computed fresh on every call.
async fn get_summary(State(state): State<ApiState>) -> Json<SummaryResponse> {
    let summary = state.summary.lock().await;

    let mut errors: Vec<EndpointSummary> = summary
        .records()
        .map(|record| EndpointSummary {
            uri: record.path.clone(),
            error_type: record.kind.as_str().to_string(),
            error_message: record.summary_message.clone(),
            status_code: record.status_code,
            count: record.count,
        })
        .collect();
    errors.sort_by(|a, b| a.uri.cmp(&b.uri));

    tracing::debug!(
        "summary query: {} endpoints, {} total failures",
        summary.distinct_endpoints(),
        summary.total_occurrences()
    );

    Json(SummaryResponse {
        success: true,
        data: SummaryData {
            total_errors: summary.distinct_endpoints(),
            total_requests: summary.total_occurrences(),
            errors,
            start_time: summary.started_at().format(TIME_FORMAT).to_string(),
            output_file: state.output_file.clone(),
        },
    })
}

/// Full occurrence history for one endpoint. Unknown URIs get a 404
/// listing what is known.
async fn get_error_details(
    State(state): State<ApiState>,
    Path(uri): Path<String>,
) -> axum::response::Response {
    let summary = state.summary.lock().await;

    match summary.find(&uri) {
        Some(record) => Json(DetailsResponse {
            success: true,
            data: DetailsData {
                uri: record.path.clone(),
                error_type: record.kind.as_str().to_string(),
                count: record.count,
                details: record.occurrences.iter().map(occurrence_detail).collect(),
            },
        })
        .into_response(),
        None => {
            let known: Vec<&str> = summary.records().map(|r| r.path.as_str()).collect();
            tracing::debug!("no error record matches {uri}; known: {known:?}");
            (
                StatusCode::NOT_FOUND,
                Json(FailureResponse {
                    success: false,
                    error: format!(
                        "no recorded errors match '{}'; known endpoints: {:?}",
                        uri, known
                    ),
                }),
            )
                .into_response()
        }
    }
}

fn occurrence_detail(occurrence: &ErrorOccurrence) -> OccurrenceDetail {
    OccurrenceDetail {
        error_message: occurrence.message.clone(),
        status_code: occurrence.status_code,
        request_method: occurrence.request_method.clone(),
        request_headers: occurrence.request_headers.clone(),
        request_body: occurrence.request_body.clone(),
        response_headers: occurrence.response_headers.clone(),
        response_body: occurrence.response_body.clone(),
        timestamp: occurrence.timestamp.format(TIME_FORMAT).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiwatch_core::aggregate::{Failure, Headers};
    use apiwatch_core::validate::ErrorKind;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn state_with(failures: Vec<Failure>) -> ApiState {
        let mut summary = ErrorSummary::new();
        for failure in failures {
            summary.record(failure);
        }
        ApiState {
            summary: Arc::new(Mutex::new(summary)),
            output_file: Some("20260806120000.txt".to_string()),
        }
    }

    fn failure(url: &str, message: &str) -> Failure {
        Failure {
            url: url.to_string(),
            kind: ErrorKind::ResponseCode,
            message: message.to_string(),
            status_code: Some(200),
            request_method: Some("GET".to_string()),
            request_headers: Headers::new(),
            request_body: None,
            response_headers: Headers::new(),
            response_body: Some(r#"{"code":"9999"}"#.to_string()),
        }
    }

    async fn get_json(router: Router, path: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let router = create_router(state_with(vec![]));
        let (status, body) = get_json(router, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_summary_totals_match_aggregate() {
        let router = create_router(state_with(vec![
            failure("https://host/api/users", "code=9999"),
            failure("https://host/api/users", "code=9999"),
            failure("https://host/api/orders", "code=1111"),
        ]));

        let (status, body) = get_json(router, "/api/summary").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["total_errors"], 2);
        assert_eq!(body["data"]["total_requests"], 3);
        assert_eq!(body["data"]["output_file"], "20260806120000.txt");

        let errors = body["data"]["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 2);
        // Sorted by path for stable consumption.
        assert_eq!(errors[0]["uri"], "/api/orders");
        assert_eq!(errors[1]["uri"], "/api/users");
        assert_eq!(errors[1]["count"], 2);
        assert_eq!(errors[1]["error_type"], "Response Code Error");
    }

    #[tokio::test]
    async fn test_summary_is_empty_before_any_failure() {
        let router = create_router(state_with(vec![]));
        let (status, body) = get_json(router, "/api/summary").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_errors"], 0);
        assert_eq!(body["data"]["total_requests"], 0);
        assert!(body["data"]["errors"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_details_for_known_endpoint() {
        let router = create_router(state_with(vec![
            failure("https://host/api/users?page=1", "code=9999"),
            failure("https://host/api/users?page=2", "code=8888"),
        ]));

        // The wildcard segment arrives without its leading slash; the
        // suffix match resolves it.
        let (status, body) = get_json(router, "/api/error-details/api/users").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["uri"], "/api/users");
        assert_eq!(body["data"]["count"], 2);

        let details = body["data"]["details"].as_array().unwrap();
        assert_eq!(details.len(), 2);
        assert_eq!(details[0]["error_message"], "code=9999");
        assert_eq!(details[1]["error_message"], "code=8888");
        assert_eq!(details[0]["request_method"], "GET");
        assert!(details[0]["timestamp"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_error_details_unknown_endpoint_is_404() {
        let router = create_router(state_with(vec![failure(
            "https://host/api/users",
            "code=9999",
        )]));

        let (status, body) = get_json(router, "/api/error-details/api/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("api/nope"));
        assert!(message.contains("/api/users"));
    }
}
