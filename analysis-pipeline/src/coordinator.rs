//! Progressive delivery of one analysis request.
//!
//! Posts with a cached summary are emitted first, in fetch order, without any
//! external call. The rest are summarized by one spawned task each, at most
//! `max_concurrent` at a time, and emitted in completion order. Each task
//! writes its result to the cache itself, so work started for a client that
//! goes away is not lost. The discussion aggregate comes last.

use crate::events::{AnalysisEvent, EventSink, ProgressStage};
use crate::state::{RequestState, RequestTracker};
use crate::summarizer::CachedSummarizer;
use cache_store::CacheStore;
use llm_interface::Summarizer;
use reddit_client::{FetchQuery, PostFetcher};
use serde::Serialize;
use snooze_core::{
    AnalysisError, AnalyzeRequest, AppConfig, CoreError, DiscussionSummary, ErrorExt,
    PostSummary, RedditPost, RequestFingerprint,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on simultaneous post summarization calls.
    pub max_concurrent: usize,
    pub posts_max_age: Option<Duration>,
    pub discussion_max_age: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            posts_max_age: Some(Duration::from_secs(6 * 3600)),
            discussion_max_age: Some(Duration::from_secs(144 * 3600)),
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_concurrent: config.llm.max_concurrent.max(1),
            posts_max_age: config.cache.posts_max_age(),
            discussion_max_age: config.cache.discussion_max_age(),
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub request_id: String,
    pub fingerprint: RequestFingerprint,
    pub discussion: DiscussionSummary,
    pub fetched_count: usize,
    pub cached_count: usize,
    pub fresh_count: usize,
    pub failed_count: usize,
    pub irrelevant_count: usize,
    /// External post summarization calls made by this run.
    pub summarize_calls: usize,
    pub discussion_cached: bool,
}

#[derive(Debug, Default)]
struct StreamTally {
    fresh: usize,
    failed: usize,
    irrelevant: usize,
}

fn deliver(sink: &dyn EventSink, event: AnalysisEvent) -> Result<(), AnalysisError> {
    if sink.emit(event) {
        Ok(())
    } else {
        Err(AnalysisError::Cancelled)
    }
}

fn step(tracker: &mut RequestTracker, next: RequestState) {
    if let Err(e) = tracker.advance(next) {
        e.log_error();
    }
}

/// Keep the first occurrence of every post id.
fn dedupe_posts(posts: Vec<RedditPost>) -> Vec<RedditPost> {
    let mut seen = HashSet::new();
    posts
        .into_iter()
        .filter(|post| seen.insert(post.id.clone()))
        .collect()
}

pub struct AnalysisCoordinator {
    fetcher: Arc<dyn PostFetcher>,
    summarizer: Arc<CachedSummarizer>,
    cache: CacheStore,
    config: PipelineConfig,
}

impl AnalysisCoordinator {
    pub fn new(
        fetcher: Arc<dyn PostFetcher>,
        summarizer: Arc<CachedSummarizer>,
        config: PipelineConfig,
    ) -> Self {
        let cache = summarizer.cache().clone();
        Self {
            fetcher,
            summarizer,
            cache,
            config,
        }
    }

    /// Wire a coordinator from its collaborators and the application config.
    pub fn from_config(
        fetcher: Arc<dyn PostFetcher>,
        summarizer: Arc<dyn Summarizer>,
        cache: CacheStore,
        config: &AppConfig,
    ) -> Self {
        let cached = CachedSummarizer::new(summarizer, cache)
            .with_max_age(config.cache.post_summary_max_age());
        Self::new(fetcher, Arc::new(cached), PipelineConfig::from_config(config))
    }

    pub fn summarizer(&self) -> &CachedSummarizer {
        &self.summarizer
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Run one request to completion, delivering events to `sink`.
    ///
    /// On failure an `error` event is emitted (unless the sink is gone) and
    /// the request-level error is returned.
    pub async fn run(
        &self,
        request_id: &str,
        request: &AnalyzeRequest,
        sink: &dyn EventSink,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let mut tracker = RequestTracker::new(request_id);

        match self.execute(request_id, request, sink, &mut tracker).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                tracker.fail(&error.to_string());
                if !matches!(error, AnalysisError::Cancelled) {
                    sink.emit(AnalysisEvent::Error {
                        message: error.user_friendly_message(),
                        code: error.error_code(),
                    });
                }
                Err(error)
            }
        }
    }

    async fn execute(
        &self,
        request_id: &str,
        request: &AnalyzeRequest,
        sink: &dyn EventSink,
        tracker: &mut RequestTracker,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        request.validate()?;
        let fingerprint = request.fingerprint();
        info!(
            request_id,
            fingerprint = %fingerprint,
            limit = request.limit,
            force_refresh = request.force_refresh,
            "Starting analysis"
        );

        step(tracker, RequestState::Fetching);
        deliver(
            sink,
            AnalysisEvent::progress(ProgressStage::Crawling, "Crawling Reddit for posts...", None),
        )?;
        let posts = self.fetch(request, &fingerprint).await?;
        if posts.is_empty() {
            return Err(AnalysisError::NoPosts);
        }
        let fetched_count = posts.len();
        deliver(
            sink,
            AnalysisEvent::progress(
                ProgressStage::PostsReady,
                format!("Found {} posts. Checking cache...", fetched_count),
                Some(fetched_count),
            ),
        )?;

        step(tracker, RequestState::Partitioning);
        let mut slots: Vec<Option<PostSummary>> = vec![None; fetched_count];
        let mut cached = Vec::new();
        let mut pending = Vec::new();
        for (index, post) in posts.into_iter().enumerate() {
            let hit = if request.force_refresh {
                None
            } else {
                self.summarizer.lookup(&post.id).await
            };
            match hit {
                Some(summary) => {
                    slots[index] = Some(summary);
                    cached.push(index);
                }
                None => pending.push((index, post)),
            }
        }
        info!(
            request_id,
            cached = cached.len(),
            pending = pending.len(),
            "Partitioned posts"
        );
        deliver(
            sink,
            AnalysisEvent::progress(
                ProgressStage::CacheCheck,
                format!(
                    "Found {} cached summaries, analyzing {} new posts...",
                    cached.len(),
                    pending.len()
                ),
                Some(fetched_count),
            ),
        )?;

        step(tracker, RequestState::Streaming);
        let mut tally = StreamTally::default();
        for &index in &cached {
            match &slots[index] {
                Some(summary) if summary.is_relevant => deliver(
                    sink,
                    AnalysisEvent::PostSummaryReady {
                        summary: summary.clone(),
                    },
                )?,
                Some(_) => tally.irrelevant += 1,
                None => {}
            }
        }

        let summarize_calls = self
            .stream_pending(request_id, pending, &mut slots, &mut tally, sink)
            .await?;

        step(tracker, RequestState::Aggregating);
        let succeeded = slots.iter().filter(|slot| slot.is_some()).count();
        let kept: Vec<PostSummary> = slots
            .into_iter()
            .flatten()
            .filter(|summary| summary.is_relevant)
            .collect();

        if kept.is_empty() {
            return Err(if succeeded == 0 {
                AnalysisError::NoSummaries {
                    attempted: fetched_count,
                }
            } else {
                AnalysisError::NoPosts
            });
        }

        deliver(
            sink,
            AnalysisEvent::progress(
                ProgressStage::AnalysisComplete,
                format!(
                    "Analysis complete. {} relevant posts out of {}.",
                    kept.len(),
                    fetched_count
                ),
                Some(kept.len()),
            ),
        )?;
        deliver(
            sink,
            AnalysisEvent::progress(
                ProgressStage::CreatingDiscussion,
                "Creating discussion summary...",
                None,
            ),
        )?;

        let discussion_key = fingerprint.with_posts(kept.iter().map(|s| s.post_id.as_str()));
        let (discussion, discussion_cached) = self
            .discussion(&discussion_key, &kept, request.force_refresh)
            .await?;

        step(tracker, RequestState::Complete);
        // The run is complete whether or not anyone still listens.
        sink.emit(AnalysisEvent::AnalysisComplete {
            post_count: fetched_count,
            total_posts_analyzed: discussion.total_posts_analyzed,
            discussion: discussion.clone(),
        });

        info!(
            request_id,
            fetched = fetched_count,
            cached = cached.len(),
            fresh = tally.fresh,
            failed = tally.failed,
            irrelevant = tally.irrelevant,
            "Analysis complete"
        );

        Ok(AnalysisOutcome {
            request_id: request_id.to_string(),
            fingerprint,
            discussion,
            fetched_count,
            cached_count: cached.len(),
            fresh_count: tally.fresh,
            failed_count: tally.failed,
            irrelevant_count: tally.irrelevant,
            summarize_calls,
            discussion_cached,
        })
    }

    async fn fetch(
        &self,
        request: &AnalyzeRequest,
        fingerprint: &RequestFingerprint,
    ) -> Result<Vec<RedditPost>, AnalysisError> {
        if !request.force_refresh {
            if let Some(posts) = self
                .cache
                .get_posts(fingerprint, self.config.posts_max_age)
                .await
                .filter(|posts| !posts.is_empty())
            {
                info!("Using {} cached posts", posts.len());
                return Ok(dedupe_posts(posts));
            }
        }

        let query = FetchQuery::from(request);
        let posts = self.fetcher.fetch_posts(&query).await.map_err(|e| {
            e.log_error();
            AnalysisError::Fetch {
                reason: e.user_friendly_message(),
            }
        })?;
        let posts = dedupe_posts(posts);

        if !posts.is_empty() {
            if let Err(e) = self.cache.put_posts(fingerprint, &posts).await {
                e.log_warn();
            }
        }
        Ok(posts)
    }

    /// Summarize `pending` and deliver results as they complete. Returns the
    /// number of summarizer calls that were actually made.
    async fn stream_pending(
        &self,
        request_id: &str,
        pending: Vec<(usize, RedditPost)>,
        slots: &mut [Option<PostSummary>],
        tally: &mut StreamTally,
        sink: &dyn EventSink,
    ) -> Result<usize, AnalysisError> {
        if pending.is_empty() {
            return Ok(0);
        }

        let total = pending.len();
        let calls = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, String, Result<PostSummary, CoreError>)>();

        for (index, post) in pending {
            let semaphore = semaphore.clone();
            let summarizer = self.summarizer.clone();
            let calls = calls.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        calls.fetch_add(1, Ordering::Relaxed);
                        summarizer.summarize_fresh(&post).await
                    }
                    Err(_) => Err(CoreError::Internal {
                        message: "summarization pool closed".to_string(),
                    }),
                };
                // The receiver is gone when the run was cancelled; the cache
                // write above has already happened.
                let _ = tx.send((index, post.id, result));
            });
        }
        drop(tx);

        let mut received = 0;
        while let Some((index, post_id, result)) = rx.recv().await {
            received += 1;
            match result {
                Ok(summary) => {
                    if summary.is_relevant {
                        tally.fresh += 1;
                        deliver(
                            sink,
                            AnalysisEvent::PostSummaryReady {
                                summary: summary.clone(),
                            },
                        )
                        .map_err(|e| {
                            info!(request_id, "Event sink closed, abandoning delivery");
                            e
                        })?;
                    } else {
                        tally.irrelevant += 1;
                        debug!(post_id = %post_id, "Dropping irrelevant post");
                    }
                    slots[index] = Some(summary);
                }
                Err(e) => {
                    tally.failed += 1;
                    warn!(post_id = %post_id, "Failed to summarize post: {}", e);
                }
            }
        }

        // A task that panicked never reports back.
        tally.failed += total - received;
        Ok(calls.load(Ordering::Relaxed))
    }

    async fn discussion(
        &self,
        key: &RequestFingerprint,
        kept: &[PostSummary],
        force_refresh: bool,
    ) -> Result<(DiscussionSummary, bool), AnalysisError> {
        if !force_refresh {
            if let Some(discussion) = self
                .cache
                .get_discussion(key, self.config.discussion_max_age)
                .await
            {
                info!("Using cached discussion summary");
                return Ok((discussion, true));
            }
        }

        let discussion = self
            .summarizer
            .summarize_discussion(kept)
            .await
            .map_err(|e| {
                e.log_error();
                AnalysisError::Aggregation {
                    reason: e.to_string(),
                }
            })?;

        if let Err(e) = self.cache.put_discussion(key, &discussion).await {
            e.log_warn();
        }
        Ok((discussion, false))
    }
}
