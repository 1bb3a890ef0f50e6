use async_trait::async_trait;
use cache_store::CacheStore;
use llm_interface::Summarizer;
use snooze_core::{CoreError, DiscussionSummary, ErrorExt, PostSummary, RedditPost};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Wraps a `Summarizer` with the per-post cache.
///
/// A summary is looked up by post id alone, so it is reused by any request
/// that fetches the same post.
pub struct CachedSummarizer {
    inner: Arc<dyn Summarizer>,
    cache: CacheStore,
    max_age: Option<Duration>,
    post_calls: AtomicUsize,
    discussion_calls: AtomicUsize,
}

impl CachedSummarizer {
    pub fn new(inner: Arc<dyn Summarizer>, cache: CacheStore) -> Self {
        Self {
            inner,
            cache,
            max_age: None,
            post_calls: AtomicUsize::new(0),
            discussion_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Cached summary for `post_id`, if present and fresh.
    pub async fn lookup(&self, post_id: &str) -> Option<PostSummary> {
        self.cache.get_post_summary(post_id, self.max_age).await
    }

    /// Call the inner summarizer and store the result, bypassing the read.
    pub async fn summarize_fresh(&self, post: &RedditPost) -> Result<PostSummary, CoreError> {
        self.post_calls.fetch_add(1, Ordering::Relaxed);
        let summary = self.inner.summarize_post(post).await?;

        if let Err(e) = self.cache.put_post_summary(&summary).await {
            // The summary is still good for this request.
            e.log_warn();
            warn!(post_id = %post.id, "Failed to cache post summary");
        }
        Ok(summary)
    }

    /// External post summarization calls made through this wrapper.
    pub fn post_calls(&self) -> usize {
        self.post_calls.load(Ordering::Relaxed)
    }

    pub fn discussion_calls(&self) -> usize {
        self.discussion_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Summarizer for CachedSummarizer {
    async fn summarize_post(&self, post: &RedditPost) -> Result<PostSummary, CoreError> {
        if let Some(summary) = self.lookup(&post.id).await {
            debug!(post_id = %post.id, "Post summary cache hit");
            return Ok(summary);
        }
        self.summarize_fresh(post).await
    }

    async fn summarize_discussion(
        &self,
        summaries: &[PostSummary],
    ) -> Result<DiscussionSummary, CoreError> {
        self.discussion_calls.fetch_add(1, Ordering::Relaxed);
        self.inner.summarize_discussion(summaries).await
    }
}
