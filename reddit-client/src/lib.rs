pub mod api;
pub mod fetcher;
pub mod rate_limiter;


pub use api::{RedditApiClient, RedditCommentData, RedditListing, RedditPostData};
pub use fetcher::{rank_posts, FetchQuery, PostFetcher, RedditFetcher, RelevanceFilter};
pub use rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
