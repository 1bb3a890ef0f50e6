use analysis_pipeline::{AnalysisCoordinator, CachedSummarizer, PipelineConfig};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use cache_store::CacheStore;
use chrono::Utc;
use llm_interface::Summarizer;
use reddit_client::{FetchQuery, PostFetcher};
use serde_json::{json, Value};
use snooze_core::{
    CoreError, DiscussionSummary, PostSummary, RedditApiError, RedditPost, Sentiment,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use web_server::{build_router, AppState};

enum FetchBehavior {
    Posts(usize),
    Fail,
}

struct StubFetcher(FetchBehavior);

#[async_trait]
impl PostFetcher for StubFetcher {
    async fn fetch_posts(&self, query: &FetchQuery) -> Result<Vec<RedditPost>, CoreError> {
        match self.0 {
            FetchBehavior::Posts(count) => Ok((0..count.min(query.limit))
                .map(|i| RedditPost {
                    id: format!("post{}", i),
                    title: format!("Post {}", i),
                    content: None,
                    author: "dev".to_string(),
                    subreddit: "codex".to_string(),
                    url: format!("https://example.com/{}", i),
                    permalink: format!("https://reddit.com/r/codex/comments/post{}", i),
                    created_utc: 1_700_000_000,
                    score: 10,
                    num_comments: 0,
                    comments: Vec::new(),
                })
                .collect()),
            FetchBehavior::Fail => Err(RedditApiError::ServerError { status_code: 503 }.into()),
        }
    }
}

#[derive(Default)]
struct StubSummarizer {
    calls: AtomicUsize,
}

#[async_trait]
impl Summarizer for StubSummarizer {
    async fn summarize_post(&self, post: &RedditPost) -> Result<PostSummary, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PostSummary {
            post_id: post.id.clone(),
            subreddit: post.subreddit.clone(),
            title: post.title.clone(),
            url: post.permalink.clone(),
            sentiment: Sentiment::Neutral,
            summary: "A post about coding agents".to_string(),
            key_points: Vec::new(),
            topics: vec!["agents".to_string()],
            engagement_score: 3,
            score: post.score,
            num_comments: post.num_comments,
            created_utc: Some(post.created_utc),
            is_relevant: true,
            relevance_reason: String::new(),
        })
    }

    async fn summarize_discussion(
        &self,
        summaries: &[PostSummary],
    ) -> Result<DiscussionSummary, CoreError> {
        Ok(DiscussionSummary {
            topic: "Coding agents".to_string(),
            sentiment_overview: "Mixed".to_string(),
            key_insights: Vec::new(),
            common_themes: Vec::new(),
            total_engagement: DiscussionSummary::engagement_of(summaries),
            total_posts_analyzed: summaries.len(),
            post_summaries: summaries.to_vec(),
            analyzed_at: Utc::now(),
        })
    }
}

async fn test_state(fetch: FetchBehavior) -> (AppState, Arc<StubSummarizer>) {
    let cache = CacheStore::in_memory()
        .await
        .expect("Failed to open in-memory cache");
    let summarizer = Arc::new(StubSummarizer::default());
    let coordinator = AnalysisCoordinator::new(
        Arc::new(StubFetcher(fetch)),
        Arc::new(CachedSummarizer::new(summarizer.clone(), cache)),
        PipelineConfig::default(),
    );
    (AppState::new(Arc::new(coordinator), 64), summarizer)
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let (state, _) = test_state(FetchBehavior::Posts(0)).await;
    let (status, body) = send(build_router(state), "GET", "/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_analyze_reports_cache_reuse() {
    let (state, summarizer) = test_state(FetchBehavior::Posts(3)).await;
    let request = json!({"subreddits": ["codex"], "limit": 3});

    let (status, first) = send(build_router(state.clone()), "POST", "/api/analyze", Some(request.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    assert_eq!(first["post_count"], 3);
    assert_eq!(first["summary_count"], 3);
    assert_eq!(first["new_summary_count"], 3);
    assert_eq!(first["cached_summary_count"], 0);
    assert_eq!(first["discussion"]["topic"], "Coding agents");

    let (_, second) = send(build_router(state), "POST", "/api/analyze", Some(request)).await;
    assert_eq!(second["cached_summary_count"], 3);
    assert_eq!(second["new_summary_count"], 0);
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_analyze_uses_defaults_for_missing_fields() {
    let (state, _) = test_state(FetchBehavior::Posts(30)).await;
    let (status, body) = send(build_router(state), "POST", "/api/analyze", Some(json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["post_count"], 20);
}

#[tokio::test]
async fn test_analyze_without_posts_is_not_found() {
    let (state, _) = test_state(FetchBehavior::Posts(0)).await;
    let (status, body) = send(
        build_router(state),
        "POST",
        "/api/analyze",
        Some(json!({"subreddits": ["codex"]})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "ANALYSIS_NO_POSTS");
}

#[tokio::test]
async fn test_analyze_fetch_failure_is_bad_gateway() {
    let (state, _) = test_state(FetchBehavior::Fail).await;
    let (status, body) = send(
        build_router(state),
        "POST",
        "/api/analyze",
        Some(json!({"subreddits": ["codex"]})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "ANALYSIS_FETCH_FAILED");
}

#[tokio::test]
async fn test_analyze_rejects_zero_limit() {
    let (state, _) = test_state(FetchBehavior::Posts(3)).await;
    let (status, body) = send(
        build_router(state),
        "POST",
        "/api/analyze",
        Some(json!({"limit": 0})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ANALYSIS_INVALID_REQUEST");
}

#[tokio::test]
async fn test_analyze_async_publishes_events() {
    let (state, _) = test_state(FetchBehavior::Posts(2)).await;
    let (_, mut rx) = state.hub.subscribe(None);

    let (status, body) = send(
        build_router(state),
        "POST",
        "/api/analyze-async",
        Some(json!({"subreddits": ["codex"], "limit": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
    let request_id = body["request_id"].as_str().unwrap().to_string();

    let mut names = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for events")
            .unwrap();
        assert_eq!(event.request_id, request_id);
        names.push(event.event.name());
        if event.event.is_terminal() {
            break;
        }
    }

    assert_eq!(names.first(), Some(&"progress"));
    assert_eq!(names.iter().filter(|n| **n == "post_summary_ready").count(), 2);
    assert_eq!(names.last(), Some(&"analysis_complete"));
}

async fn start_async_run(state: &AppState, limit: usize) -> String {
    let (status, body) = send(
        build_router(state.clone()),
        "POST",
        "/api/analyze-async",
        Some(json!({"subreddits": ["codex"], "limit": limit})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    body["request_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_subscriber_after_accepted_replays_the_whole_run() {
    let (state, _) = test_state(FetchBehavior::Posts(2)).await;
    let request_id = start_async_run(&state, 2).await;
    // let the run get ahead of the subscriber
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (backlog, mut rx) = state.hub.subscribe(Some(&request_id));
    let mut names: Vec<&str> = backlog.iter().map(|e| e.event.name()).collect();
    assert!(!names.is_empty());
    while !names.last().map_or(false, |name| *name == "analysis_complete") {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for events")
            .unwrap();
        if event.request_id == request_id {
            names.push(event.event.name());
        }
    }

    assert_eq!(names.first(), Some(&"progress"));
    assert_eq!(names.iter().filter(|n| **n == "post_summary_ready").count(), 2);
    assert_eq!(names.iter().filter(|n| **n == "analysis_complete").count(), 1);
}

#[tokio::test]
async fn test_events_endpoint_replays_and_closes_for_a_finished_run() {
    let (state, _) = test_state(FetchBehavior::Posts(3)).await;
    let request_id = start_async_run(&state, 3).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let request = Request::builder()
        .uri(format!("/api/events?request_id={}", request_id))
        .body(Body::empty())
        .unwrap();
    let response = build_router(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = tokio::time::timeout(
        Duration::from_secs(5),
        to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("event stream did not end after the run finished")
    .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(text.starts_with("event: connected"));
    assert_eq!(text.matches("event: post_summary_ready").count(), 3);
    assert_eq!(text.matches("event: analysis_complete").count(), 1);
    assert!(text.contains(&request_id));
}

#[tokio::test]
async fn test_events_endpoint_is_an_event_stream() {
    let (state, _) = test_state(FetchBehavior::Posts(0)).await;
    let request = Request::builder()
        .uri("/api/events")
        .body(Body::empty())
        .unwrap();

    let response = build_router(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}

#[tokio::test]
async fn test_cache_stats_and_clear() {
    let (state, _) = test_state(FetchBehavior::Posts(3)).await;
    send(
        build_router(state.clone()),
        "POST",
        "/api/analyze",
        Some(json!({"subreddits": ["codex"], "limit": 3})),
    )
    .await;

    let (status, stats) = send(build_router(state.clone()), "GET", "/api/cache/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    // three summaries, one post list, one discussion
    assert_eq!(stats["total_entries"], 5);

    let (status, cleared) = send(
        build_router(state.clone()),
        "POST",
        "/api/cache/clear",
        Some(json!({"category": "summaries"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["deleted_count"], 3);

    let (_, cleared) = send(build_router(state), "POST", "/api/cache/clear", None).await;
    assert_eq!(cleared["deleted_count"], 2);
}

#[tokio::test]
async fn test_cache_clear_rejects_unknown_category() {
    let (state, _) = test_state(FetchBehavior::Posts(0)).await;
    let (status, body) = send(
        build_router(state),
        "POST",
        "/api/cache/clear",
        Some(json!({"category": "thumbnails"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}
