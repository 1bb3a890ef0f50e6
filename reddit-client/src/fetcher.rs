//! Post fetching policy on top of the raw API client.
//!
//! Each community contributes up to `limit / communities + 5` relevant posts,
//! drawn from twice as many candidates. The merged list is deduplicated by
//! id, ranked by score then recency, and truncated to the request limit.

use crate::api::{RedditApiClient, RedditPostData};
use async_trait::async_trait;
use snooze_core::{
    AnalyzeRequest, CoreError, ErrorExt, RedditApiError, RedditConfig, RedditPost,
};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// What to fetch: communities in caller order, a result limit and an
/// optional search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchQuery {
    pub subreddits: Vec<String>,
    pub limit: usize,
    pub search: Option<String>,
}

impl FetchQuery {
    pub fn new(subreddits: Vec<String>, limit: usize) -> Self {
        Self {
            subreddits,
            limit,
            search: None,
        }
    }

    pub fn with_search(mut self, search: Option<String>) -> Self {
        self.search = search.filter(|term| !term.trim().is_empty());
        self
    }

    /// Relevant posts to keep per community before the global cut.
    pub fn per_subreddit(&self) -> usize {
        self.limit / self.subreddits.len().max(1) + 5
    }
}

impl From<&AnalyzeRequest> for FetchQuery {
    fn from(request: &AnalyzeRequest) -> Self {
        let mut seen = HashSet::new();
        let subreddits = request
            .subreddits
            .iter()
            .map(|name| name.trim().trim_start_matches("r/").to_string())
            .filter(|name| !name.is_empty() && seen.insert(name.to_ascii_lowercase()))
            .collect();

        Self {
            subreddits,
            limit: request.limit,
            search: request.search_term().map(str::to_string),
        }
    }
}

/// Source of post records for an analysis run.
#[async_trait]
pub trait PostFetcher: Send + Sync {
    /// Relevance-filtered, deduplicated, ranked posts; possibly fewer than
    /// `query.limit`, possibly none.
    async fn fetch_posts(&self, query: &FetchQuery) -> Result<Vec<RedditPost>, CoreError>;
}

/// Keyword-based topical filter.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    always_relevant: HashSet<String>,
    keywords: Vec<String>,
}

impl RelevanceFilter {
    pub fn new<I, J>(always_relevant: I, keywords: J) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        J: IntoIterator,
        J::Item: AsRef<str>,
    {
        Self {
            always_relevant: always_relevant
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .collect(),
            keywords: keywords
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &RedditConfig) -> Self {
        Self::new(&config.always_relevant_subreddits, &config.relevance_keywords)
    }

    /// Community allow-list or a keyword hit in title and body. When a search
    /// term is given, every one of its words must appear as well.
    pub fn is_relevant(&self, post: &RedditPost, search: Option<&str>) -> bool {
        let text = post.searchable_text().to_lowercase();

        if let Some(search) = search {
            let matches_search = search
                .split_whitespace()
                .all(|word| text.contains(&word.to_lowercase()));
            if !matches_search {
                return false;
            }
        }

        self.always_relevant.contains(&post.subreddit.to_lowercase())
            || self.keywords.iter().any(|keyword| text.contains(keyword))
    }
}

/// Deduplicate by id (first occurrence wins), rank by score then creation
/// time, both descending, and keep at most `limit`.
pub fn rank_posts(posts: Vec<RedditPost>, limit: usize) -> Vec<RedditPost> {
    let mut seen = HashSet::new();
    let mut unique: Vec<RedditPost> = posts
        .into_iter()
        .filter(|post| seen.insert(post.id.clone()))
        .collect();

    unique.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.created_utc.cmp(&a.created_utc))
    });
    unique.truncate(limit);
    unique
}

/// `PostFetcher` backed by the Reddit API.
pub struct RedditFetcher {
    client: RedditApiClient,
    filter: RelevanceFilter,
    comments_per_post: usize,
}

impl RedditFetcher {
    pub fn new(client: RedditApiClient, filter: RelevanceFilter, comments_per_post: usize) -> Self {
        Self {
            client,
            filter,
            comments_per_post,
        }
    }

    pub fn from_config(config: &RedditConfig) -> Result<Self, CoreError> {
        let (client_id, client_secret) = match (&config.client_id, &config.client_secret) {
            (Some(id), Some(secret)) => (id.clone(), secret.clone()),
            _ => {
                return Err(RedditApiError::AuthenticationFailed {
                    reason: "REDDIT_CLIENT_ID and REDDIT_CLIENT_SECRET must be set".to_string(),
                }
                .into())
            }
        };

        let client = RedditApiClient::new(
            client_id,
            client_secret,
            config.user_agent.clone(),
            crate::RateLimitConfig::per_minute(
                config.requests_per_minute,
                config.burst_allowance,
            ),
        )?
        .with_retry_policy(snooze_core::RetryPolicy::default().with_max_retries(config.max_retries));

        Ok(Self::new(
            client,
            RelevanceFilter::from_config(config),
            config.comments_per_post,
        ))
    }

    async fn fetch_subreddit(
        &self,
        subreddit: &str,
        query: &FetchQuery,
    ) -> Result<Vec<RedditPost>, CoreError> {
        let wanted = query.per_subreddit();
        let candidates: Vec<RedditPostData> = match query.search.as_deref() {
            Some(term) => self.client.search_posts(subreddit, term, wanted * 2).await?,
            None => self.client.hot_posts(subreddit, wanted * 2).await?,
        };

        let kept: Vec<RedditPost> = candidates
            .into_iter()
            .filter(|data| !data.stickied)
            .map(RedditPost::from)
            .filter(|post| self.filter.is_relevant(post, query.search.as_deref()))
            .take(wanted)
            .collect();

        debug!("Kept {} relevant posts from r/{}", kept.len(), subreddit);
        Ok(kept)
    }

    async fn attach_comments(&self, posts: &mut [RedditPost]) {
        for post in posts.iter_mut() {
            match self
                .client
                .top_comments(&post.subreddit, &post.id, self.comments_per_post)
                .await
            {
                Ok(comments) => post.comments = comments,
                Err(e) => {
                    e.log_warn();
                    warn!("Skipping comments for post {}", post.id);
                }
            }
        }
    }
}

#[async_trait]
impl PostFetcher for RedditFetcher {
    async fn fetch_posts(&self, query: &FetchQuery) -> Result<Vec<RedditPost>, CoreError> {
        let mut collected = Vec::new();
        let mut failures = Vec::new();

        for subreddit in &query.subreddits {
            match self.fetch_subreddit(subreddit, query).await {
                Ok(posts) => collected.extend(posts),
                Err(e) => {
                    warn!("Error accessing r/{}: {}", subreddit, e);
                    failures.push(format!("r/{}: {}", subreddit, e.user_friendly_message()));
                }
            }
        }

        if !query.subreddits.is_empty() && failures.len() == query.subreddits.len() {
            return Err(RedditApiError::AllSubredditsFailed {
                details: failures.join("; "),
            }
            .into());
        }

        let mut posts = rank_posts(collected, query.limit);
        if self.comments_per_post > 0 {
            self.attach_comments(&mut posts).await;
        }

        info!(
            "Fetched {} posts from {} subreddits ({} failed)",
            posts.len(),
            query.subreddits.len(),
            failures.len()
        );
        Ok(posts)
    }
}
