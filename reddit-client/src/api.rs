use crate::rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthUrl, ClientId, ClientSecret, HttpRequest, TokenResponse, TokenUrl};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snooze_core::{CoreError, RedditApiError, RedditPost, RetryPolicy};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const REDDIT_WEB_BASE: &str = "https://reddit.com";

/// Refresh the app token this long before Reddit would expire it.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: Option<String>,
    pub subreddit: String,
    #[serde(default)]
    pub url: String,
    pub permalink: String,
    pub created_utc: f64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u32,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub over_18: bool,
}

/// A comment-tree child. `more` placeholders carry no body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditCommentData {
    pub id: String,
    pub body: Option<String>,
    pub stickied: bool,
}

impl RedditCommentData {
    fn usable_body(self) -> Option<String> {
        self.body
            .filter(|body| !body.trim().is_empty() && body != "[deleted]" && body != "[removed]")
    }
}

impl From<RedditPostData> for RedditPost {
    fn from(post_data: RedditPostData) -> Self {
        Self {
            id: post_data.id,
            title: post_data.title,
            content: if post_data.selftext.trim().is_empty() {
                None
            } else {
                Some(post_data.selftext)
            },
            author: post_data.author.unwrap_or_else(|| "[deleted]".to_string()),
            subreddit: post_data.subreddit,
            url: post_data.url,
            permalink: format!("{}{}", REDDIT_WEB_BASE, post_data.permalink),
            created_utc: post_data.created_utc as i64,
            score: post_data.score,
            num_comments: post_data.num_comments,
            comments: Vec::new(),
        }
    }
}

/// Map a non-success status to the error the retry policy understands.
pub(crate) fn error_for_status(
    status: StatusCode,
    resource: &str,
    retry_after: Option<u64>,
) -> RedditApiError {
    match status.as_u16() {
        401 => RedditApiError::InvalidToken,
        403 => RedditApiError::Forbidden {
            resource: resource.to_string(),
        },
        404 => RedditApiError::SubredditNotFound {
            subreddit: resource.to_string(),
        },
        429 => RedditApiError::RateLimitExceeded {
            retry_after: retry_after.unwrap_or(60),
        },
        code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
        code => RedditApiError::InvalidResponse {
            details: format!("unexpected status {} for {}", code, resource),
        },
    }
}

#[derive(Debug, Clone)]
struct AccessToken {
    secret: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_EXPIRY_MARGIN < self.expires_at
    }
}

/// App-only Reddit API client: client-credentials token, rate limiting and
/// bounded retry around every GET.
#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    oauth_client: BasicClient,
    rate_limiter: RateLimiter,
    retry_policy: RetryPolicy,
    user_agent: String,
    api_base: Url,
    token: RwLock<Option<AccessToken>>,
}

impl RedditApiClient {
    pub fn new(
        client_id: String,
        client_secret: String,
        user_agent: String,
        rate_config: RateLimitConfig,
    ) -> Result<Self, CoreError> {
        let invalid_url = |e: url::ParseError| CoreError::Internal {
            message: format!("invalid Reddit endpoint: {}", e),
        };

        let oauth_client = BasicClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            AuthUrl::new(REDDIT_AUTH_URL.to_string()).map_err(invalid_url)?,
            Some(TokenUrl::new(REDDIT_TOKEN_URL.to_string()).map_err(invalid_url)?),
        );

        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            oauth_client,
            rate_limiter: RateLimiter::new(rate_config),
            retry_policy: RetryPolicy::default().with_max_retries(2),
            user_agent,
            api_base: Url::parse(REDDIT_API_BASE).map_err(invalid_url)?,
            token: RwLock::new(None),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_api_base(mut self, api_base: &str) -> Result<Self, CoreError> {
        self.api_base = Url::parse(api_base).map_err(|e| CoreError::InvalidInput {
            message: format!("invalid API base '{}': {}", api_base, e),
        })?;
        Ok(self)
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub async fn rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limiter.status().await
    }

    /// Current app token, requesting a new one when missing or near expiry.
    pub async fn access_token(&self) -> Result<String, CoreError> {
        if let Some(token) = self.token.read().await.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.secret.clone());
        }

        let mut slot = self.token.write().await;
        if let Some(token) = slot.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.secret.clone());
        }

        let user_agent = oauth2::http::HeaderValue::from_str(&self.user_agent).map_err(|e| {
            RedditApiError::AuthenticationFailed {
                reason: format!("invalid user agent: {}", e),
            }
        })?;

        let response = self
            .oauth_client
            .exchange_client_credentials()
            .request_async(|mut request: HttpRequest| {
                request
                    .headers
                    .insert(oauth2::http::header::USER_AGENT, user_agent.clone());
                async_http_client(request)
            })
            .await
            .map_err(|e| {
                error!("Reddit token request failed: {}", e);
                RedditApiError::AuthenticationFailed {
                    reason: e.to_string(),
                }
            })?;

        let lifetime = response
            .expires_in()
            .unwrap_or_else(|| Duration::from_secs(3600));
        let token = AccessToken {
            secret: response.access_token().secret().clone(),
            expires_at: Instant::now() + lifetime,
        };
        info!("Obtained Reddit app token valid for {:?}", lifetime);

        let secret = token.secret.clone();
        *slot = Some(token);
        Ok(secret)
    }

    async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    pub(crate) fn endpoint_url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, CoreError> {
        let mut url = self.api_base.join(path).map_err(|e| CoreError::InvalidInput {
            message: format!("invalid Reddit path '{}': {}", path, e),
        })?;
        url.query_pairs_mut()
            .append_pair("raw_json", "1")
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        Ok(url)
    }

    async fn get_json_once<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        resource: &str,
    ) -> Result<T, CoreError> {
        let url = self.endpoint_url(path, params)?;
        let access_token = self.access_token().await?;
        let permit = self.rate_limiter.acquire_permit().await?;
        debug!(
            "GET {} (waited {:?} for rate limit)",
            url.path(),
            permit.queue_wait_time
        );

        let response = self
            .http_client
            .get(url.clone())
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::RedditApi(RedditApiError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                }
            })?;
        drop(permit);

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok());
            let api_error = error_for_status(status, resource, retry_after);
            warn!("Reddit request for {} failed: {}", resource, api_error);

            if matches!(api_error, RedditApiError::InvalidToken) {
                self.invalidate_token().await;
            }
            return Err(api_error.into());
        }

        response.json::<T>().await.map_err(|e| {
            error!("Failed to parse Reddit response for {}: {}", resource, e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("malformed response for {}", resource),
            })
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        resource: &str,
    ) -> Result<T, CoreError> {
        self.retry_policy
            .run(resource, || self.get_json_once(path, params, resource))
            .await
    }

    /// Hot listing of one community.
    pub async fn hot_posts(
        &self,
        subreddit: &str,
        limit: usize,
    ) -> Result<Vec<RedditPostData>, CoreError> {
        let path = format!("/r/{}/hot", subreddit);
        let params = [("limit", limit.min(100).to_string())];
        let listing: RedditListing<RedditPostData> =
            self.get_json(&path, &params, subreddit).await?;

        info!(
            "Retrieved {} hot posts from r/{}",
            listing.data.children.len(),
            subreddit
        );
        Ok(listing.data.children.into_iter().map(|c| c.data).collect())
    }

    /// Search restricted to one community, most relevant posts of the last month.
    pub async fn search_posts(
        &self,
        subreddit: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RedditPostData>, CoreError> {
        let path = format!("/r/{}/search", subreddit);
        let params = [
            ("q", query.to_string()),
            ("restrict_sr", "1".to_string()),
            ("sort", "relevance".to_string()),
            ("t", "month".to_string()),
            ("limit", limit.min(100).to_string()),
        ];
        let listing: RedditListing<RedditPostData> =
            self.get_json(&path, &params, subreddit).await?;

        info!(
            "Search '{}' in r/{} returned {} posts",
            query,
            subreddit,
            listing.data.children.len()
        );
        Ok(listing.data.children.into_iter().map(|c| c.data).collect())
    }

    /// Up to `limit` top-level comment bodies of a post, deleted ones skipped.
    pub async fn top_comments(
        &self,
        subreddit: &str,
        post_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, CoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let path = format!("/r/{}/comments/{}", subreddit, post_id);
        let params = [
            ("limit", limit.to_string()),
            ("depth", "1".to_string()),
            ("sort", "top".to_string()),
        ];
        let (_post, comments): (
            RedditListing<serde_json::Value>,
            RedditListing<RedditCommentData>,
        ) = self.get_json(&path, &params, post_id).await?;

        Ok(collect_comment_bodies(comments, limit))
    }
}

pub(crate) fn collect_comment_bodies(
    listing: RedditListing<RedditCommentData>,
    limit: usize,
) -> Vec<String> {
    listing
        .data
        .children
        .into_iter()
        .filter(|child| child.kind == "t1" && !child.data.stickied)
        .filter_map(|child| child.data.usable_body())
        .take(limit)
        .collect()
}
