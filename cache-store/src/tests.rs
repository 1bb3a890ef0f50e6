use crate::{CacheNamespace, CacheStore, SCHEMA_VERSION};
use chrono::Utc;
use snooze_core::{
    AnalyzeRequest, DiscussionSummary, PostSummary, RedditPost, Sentiment,
};
use std::env;
use std::time::Duration;

fn temp_db_url() -> String {
    let db_path = env::temp_dir().join(format!("test_snooze_cache_{}.db", uuid::Uuid::new_v4()));
    format!("sqlite://{}", db_path.display())
}

async fn setup_test_store() -> CacheStore {
    CacheStore::open(&temp_db_url())
        .await
        .expect("Failed to open test cache")
}

fn summary(post_id: &str) -> PostSummary {
    PostSummary {
        post_id: post_id.to_string(),
        subreddit: "ClaudeCode".to_string(),
        title: format!("Post {}", post_id),
        url: format!("https://reddit.com/r/ClaudeCode/comments/{}", post_id),
        sentiment: Sentiment::Positive,
        summary: "Users like the new agent mode.".to_string(),
        key_points: vec!["faster refactors".to_string()],
        topics: vec!["agents".to_string()],
        engagement_score: 6,
        score: 120,
        num_comments: 34,
        created_utc: Some(1_700_000_000),
        is_relevant: true,
        relevance_reason: "discusses a coding assistant".to_string(),
    }
}

fn post(id: &str) -> RedditPost {
    RedditPost {
        id: id.to_string(),
        title: "Copilot vs Claude".to_string(),
        content: Some("Which is better for Rust?".to_string()),
        author: "someone".to_string(),
        subreddit: "GithubCopilot".to_string(),
        url: format!("https://reddit.com/{}", id),
        permalink: format!("https://reddit.com/r/GithubCopilot/comments/{}", id),
        created_utc: 1_700_000_000,
        score: 42,
        num_comments: 7,
        comments: vec!["Claude, easily".to_string()],
    }
}

async fn backdate(store: &CacheStore, namespace: CacheNamespace, key: &str, by: Duration) {
    let updated_at = Utc::now().timestamp_millis() - by.as_millis() as i64;
    sqlx::query("UPDATE cache_entries SET updated_at = ? WHERE namespace = ? AND cache_key = ?")
        .bind(updated_at)
        .bind(namespace.as_str())
        .bind(key)
        .execute(&store.pool)
        .await
        .expect("Failed to backdate entry");
}

#[tokio::test]
async fn test_post_summary_round_trip() {
    let store = setup_test_store().await;
    let original = summary("p1");

    store.put_post_summary(&original).await.unwrap();
    let loaded = store.get_post_summary("p1", None).await;

    assert_eq!(loaded, Some(original));
    assert_eq!(store.get_post_summary("missing", None).await, None);
}

#[tokio::test]
async fn test_overwrite_keeps_latest_value() {
    let store = setup_test_store().await;
    let mut first = summary("p1");
    store.put_post_summary(&first).await.unwrap();

    first.summary = "Opinion shifted after the outage.".to_string();
    first.sentiment = Sentiment::Negative;
    store.put_post_summary(&first).await.unwrap();

    let loaded = store.get_post_summary("p1", None).await.unwrap();
    assert_eq!(loaded.sentiment, Sentiment::Negative);
    assert_eq!(store.stats().await.unwrap().total_entries(), 1);
}

#[tokio::test]
async fn test_corrupt_entry_is_a_miss() {
    let store = setup_test_store().await;
    store.put_post_summary(&summary("p1")).await.unwrap();

    sqlx::query("UPDATE cache_entries SET payload = '{not json' WHERE cache_key = 'p1'")
        .execute(&store.pool)
        .await
        .unwrap();

    assert_eq!(store.get_post_summary("p1", None).await, None);
    assert!(store
        .try_get::<PostSummary>(CacheNamespace::PostSummary, "p1", None)
        .await
        .is_err());
}

#[tokio::test]
async fn test_schema_version_mismatch_is_a_miss() {
    let store = setup_test_store().await;
    store.put_post_summary(&summary("p1")).await.unwrap();

    sqlx::query("UPDATE cache_entries SET schema_version = ? WHERE cache_key = 'p1'")
        .bind(SCHEMA_VERSION + 1)
        .execute(&store.pool)
        .await
        .unwrap();

    assert_eq!(store.get_post_summary("p1", None).await, None);
}

#[tokio::test]
async fn test_max_age_expires_entries() {
    let store = setup_test_store().await;
    store.put_post_summary(&summary("p1")).await.unwrap();
    backdate(
        &store,
        CacheNamespace::PostSummary,
        "p1",
        Duration::from_secs(7200),
    )
    .await;

    assert!(store
        .get_post_summary("p1", Some(Duration::from_secs(3600)))
        .await
        .is_none());
    assert!(store
        .get_post_summary("p1", Some(Duration::from_secs(3 * 3600)))
        .await
        .is_some());
    // without a max age, presence alone is a hit
    assert!(store.get_post_summary("p1", None).await.is_some());
}

#[tokio::test]
async fn test_namespaces_do_not_collide() {
    let store = setup_test_store().await;
    let fingerprint = AnalyzeRequest::default().fingerprint();

    store.put_posts(&fingerprint, &[post("a"), post("b")]).await.unwrap();
    let discussion = DiscussionSummary {
        topic: "AI coding assistants".to_string(),
        sentiment_overview: "Mostly positive".to_string(),
        key_insights: vec!["agents help".to_string()],
        common_themes: vec!["pricing".to_string()],
        total_engagement: 6,
        total_posts_analyzed: 1,
        post_summaries: vec![summary("a")],
        analyzed_at: Utc::now(),
    };
    store.put_discussion(&fingerprint, &discussion).await.unwrap();

    let posts = store.get_posts(&fingerprint, None).await.unwrap();
    assert_eq!(posts.len(), 2);
    let loaded = store.get_discussion(&fingerprint, None).await.unwrap();
    assert_eq!(loaded.topic, discussion.topic);
}

#[tokio::test]
async fn test_stats_and_clear_by_namespace() {
    let store = setup_test_store().await;
    let fingerprint = AnalyzeRequest::default().fingerprint();
    store.put_post_summary(&summary("p1")).await.unwrap();
    store.put_post_summary(&summary("p2")).await.unwrap();
    store.put_posts(&fingerprint, &[post("p1")]).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.get(CacheNamespace::PostSummary).unwrap().entry_count, 2);
    assert_eq!(stats.get(CacheNamespace::Posts).unwrap().entry_count, 1);
    assert_eq!(stats.get(CacheNamespace::Discussion).unwrap().entry_count, 0);
    assert!(stats.get(CacheNamespace::PostSummary).unwrap().newest.is_some());

    let removed = store
        .clear(Some(CacheNamespace::PostSummary), None)
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.stats().await.unwrap().total_entries(), 1);
}

#[tokio::test]
async fn test_clear_older_than_keeps_fresh_entries() {
    let store = setup_test_store().await;
    store.put_post_summary(&summary("old")).await.unwrap();
    store.put_post_summary(&summary("new")).await.unwrap();
    backdate(
        &store,
        CacheNamespace::PostSummary,
        "old",
        Duration::from_secs(48 * 3600),
    )
    .await;

    let removed = store
        .clear(None, Some(Duration::from_secs(24 * 3600)))
        .await
        .unwrap();

    assert_eq!(removed, 1);
    assert!(store.get_post_summary("old", None).await.is_none());
    assert!(store.get_post_summary("new", None).await.is_some());
}

#[tokio::test]
async fn test_remove_single_entry() {
    let store = setup_test_store().await;
    store.put_post_summary(&summary("p1")).await.unwrap();

    assert!(store.remove(CacheNamespace::PostSummary, "p1").await.unwrap());
    assert!(!store.remove(CacheNamespace::PostSummary, "p1").await.unwrap());
}

#[tokio::test]
async fn test_concurrent_writes_to_distinct_keys() {
    let store = setup_test_store().await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.put_post_summary(&summary(&format!("p{}", i))).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.get(CacheNamespace::PostSummary).unwrap().entry_count, 20);
}

#[tokio::test]
async fn test_entries_survive_reopen() {
    let url = temp_db_url();
    {
        let store = CacheStore::open(&url).await.unwrap();
        store.put_post_summary(&summary("p1")).await.unwrap();
        store.close().await;
    }

    let reopened = CacheStore::open(&url).await.unwrap();
    assert!(reopened.get_post_summary("p1", None).await.is_some());
}

#[tokio::test]
async fn test_open_creates_missing_parent_directory() {
    let dir = env::temp_dir().join(format!("test_snooze_cache_dir_{}", uuid::Uuid::new_v4()));
    let db_path = dir.join("nested").join("cache.db");
    let url = format!("sqlite://{}", db_path.display());

    let store = CacheStore::open(&url).await.unwrap();
    store.put_post_summary(&summary("p1")).await.unwrap();
    store.close().await;

    assert!(db_path.exists());
    let reopened = CacheStore::open(&url).await.unwrap();
    assert!(reopened.get_post_summary("p1", None).await.is_some());
    reopened.close().await;
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_in_memory_store_works() {
    let store = CacheStore::in_memory().await.unwrap();
    store.put_post_summary(&summary("p1")).await.unwrap();
    assert!(store.get_post_summary("p1", None).await.is_some());
}

#[test]
fn test_namespace_parse_accepts_plurals() {
    assert_eq!(
        CacheNamespace::parse("post_summaries").unwrap(),
        CacheNamespace::PostSummary
    );
    assert_eq!(
        CacheNamespace::parse("Discussions").unwrap(),
        CacheNamespace::Discussion
    );
    assert_eq!(CacheNamespace::parse("posts").unwrap(), CacheNamespace::Posts);
    assert!(CacheNamespace::parse("embeddings").is_err());
}
