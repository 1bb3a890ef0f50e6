//! HTTP request handlers for the REST API.

use std::time::Duration;

use analysis_pipeline::NullSink;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cache_store::{CacheNamespace, CacheStats};
use serde::{Deserialize, Serialize};
use snooze_core::{AnalysisError, AnalyzeRequest, DiscussionSummary, ErrorExt};
use tracing::{error, info};

use crate::hub::HubSink;
use crate::server::AppState;

/// Response body for POST /api/analyze.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub request_id: String,
    pub discussion: DiscussionSummary,
    /// Posts fetched for the request.
    pub post_count: usize,
    /// Relevant summaries that went into the discussion.
    pub summary_count: usize,
    pub cached_summary_count: usize,
    pub new_summary_count: usize,
}

/// Response body for POST /api/analyze-async.
#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub success: bool,
    pub request_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            code: code.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub success: bool,
    pub total_entries: u64,
    pub stats: CacheStats,
}

/// Request body for POST /api/cache/clear. An empty body clears everything.
#[derive(Debug, Default, Deserialize)]
pub struct ClearCacheRequest {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub max_age_days: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearCacheResponse {
    pub success: bool,
    pub deleted_count: u64,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

fn status_for(error: &AnalysisError) -> StatusCode {
    match error {
        AnalysisError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
        AnalysisError::NoPosts => StatusCode::NOT_FOUND,
        AnalysisError::Fetch { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn analysis_error_response(error: &AnalysisError) -> Response {
    (
        status_for(error),
        Json(ErrorResponse::new(
            error.user_friendly_message(),
            error.error_code(),
        )),
    )
        .into_response()
}

/// POST /api/analyze
///
/// Runs the whole analysis and answers with the discussion summary.
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();

    match state.coordinator.run(&request_id, &request, &NullSink).await {
        Ok(outcome) => {
            let response = AnalyzeResponse {
                success: true,
                request_id,
                summary_count: outcome.discussion.total_posts_analyzed,
                post_count: outcome.fetched_count,
                cached_summary_count: outcome.cached_count,
                new_summary_count: outcome.fresh_count,
                discussion: outcome.discussion,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => analysis_error_response(&e),
    }
}

/// POST /api/analyze-async
///
/// Starts a run in the background and returns immediately. Progress is
/// published on GET /api/events, tagged with the returned `request_id`;
/// subscribing with that id replays anything already sent.
pub async fn analyze_async(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Response {
    if let Err(e) = request.validate() {
        return analysis_error_response(&e);
    }

    let request_id = uuid::Uuid::new_v4().to_string();
    let sink = HubSink::new(request_id.clone(), state.hub.clone());
    let coordinator = state.coordinator.clone();
    let run_id = request_id.clone();

    tokio::spawn(async move {
        match coordinator.run(&run_id, &request, &sink).await {
            Ok(outcome) => info!(
                request_id = %run_id,
                summaries = outcome.discussion.total_posts_analyzed,
                "Async analysis finished"
            ),
            Err(e) => error!(request_id = %run_id, "Async analysis failed: {}", e),
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            success: true,
            request_id,
            message: "Analysis started".to_string(),
        }),
    )
        .into_response()
}

/// GET /api/cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> Response {
    match state.cache().stats().await {
        Ok(stats) => Json(CacheStatsResponse {
            success: true,
            total_entries: stats.total_entries(),
            stats,
        })
        .into_response(),
        Err(e) => {
            e.log_error();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.user_friendly_message(), e.error_code())),
            )
                .into_response()
        }
    }
}

/// POST /api/cache/clear
///
/// Body `{category?, max_age_days?}`; both optional.
pub async fn cache_clear(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ClearCacheRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ClearCacheRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new(
                        format!("Invalid request body: {e}"),
                        "INVALID_INPUT",
                    )),
                )
                    .into_response()
            }
        }
    };

    let namespace = match request.category.as_deref().map(CacheNamespace::parse) {
        None => None,
        Some(Ok(namespace)) => Some(namespace),
        Some(Err(e)) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(e.user_friendly_message(), e.error_code())),
            )
                .into_response()
        }
    };
    let older_than = request
        .max_age_days
        .map(|days| Duration::from_secs(days.saturating_mul(24 * 3600)));

    match state.cache().clear(namespace, older_than).await {
        Ok(deleted_count) => Json(ClearCacheResponse {
            success: true,
            deleted_count,
            message: format!("Deleted {} cached entries", deleted_count),
        })
        .into_response(),
        Err(e) => {
            e.log_error();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.user_friendly_message(), e.error_code())),
            )
                .into_response()
        }
    }
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&AnalysisError::NoPosts), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&AnalysisError::Fetch {
                reason: "down".to_string()
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&AnalysisError::InvalidRequest {
                reason: "limit".to_string()
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&AnalysisError::Aggregation {
                reason: "timeout".to_string()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
