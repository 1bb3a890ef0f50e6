use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest engagement score a summary can carry.
pub const MAX_ENGAGEMENT_SCORE: u8 = 10;

/// Topics kept per post summary.
pub const MAX_TOPICS_PER_POST: usize = 3;

/// A post as fetched from a community. Immutable for the lifetime of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    pub author: String,
    pub subreddit: String,
    pub url: String,
    pub permalink: String,
    pub created_utc: i64,
    pub score: i64,
    pub num_comments: u32,
    #[serde(default)]
    pub comments: Vec<String>,
}

impl RedditPost {
    /// Title and body joined, for keyword matching.
    pub fn searchable_text(&self) -> String {
        match &self.content {
            Some(body) => format!("{} {}", self.title, body),
            None => self.title.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Mixed,
    #[default]
    Neutral,
}

impl Sentiment {
    /// Lenient parse of a model-provided label; anything unknown is neutral.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            "mixed" => Sentiment::Mixed,
            _ => Sentiment::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Mixed => "mixed",
            Sentiment::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// LLM-derived analysis of one post, addressable by `post_id` alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostSummary {
    pub post_id: String,
    pub subreddit: String,
    pub title: String,
    pub url: String,
    pub sentiment: Sentiment,
    pub summary: String,
    pub key_points: Vec<String>,
    pub topics: Vec<String>,
    pub engagement_score: u8,
    pub score: i64,
    pub num_comments: u32,
    pub created_utc: Option<i64>,
    #[serde(default = "default_relevant")]
    pub is_relevant: bool,
    #[serde(default)]
    pub relevance_reason: String,
}

fn default_relevant() -> bool {
    true
}

impl PostSummary {
    /// Placeholder summary for a post the model judged off-topic.
    ///
    /// Cached like any other summary so the post is not sent to the model again.
    pub fn irrelevant(post: &RedditPost, reason: impl Into<String>) -> Self {
        Self {
            post_id: post.id.clone(),
            subreddit: post.subreddit.clone(),
            title: post.title.clone(),
            url: post.permalink.clone(),
            sentiment: Sentiment::Neutral,
            summary: String::new(),
            key_points: Vec::new(),
            topics: Vec::new(),
            engagement_score: 0,
            score: post.score,
            num_comments: post.num_comments,
            created_utc: Some(post.created_utc),
            is_relevant: false,
            relevance_reason: reason.into(),
        }
    }
}

/// Aggregate over the kept post summaries of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionSummary {
    pub topic: String,
    pub sentiment_overview: String,
    pub key_insights: Vec<String>,
    pub common_themes: Vec<String>,
    pub total_engagement: u32,
    pub total_posts_analyzed: usize,
    pub post_summaries: Vec<PostSummary>,
    pub analyzed_at: DateTime<Utc>,
}

impl DiscussionSummary {
    pub fn engagement_of(summaries: &[PostSummary]) -> u32 {
        summaries
            .iter()
            .map(|summary| u32::from(summary.engagement_score))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_from_label_is_lenient() {
        assert_eq!(Sentiment::from_label("Positive"), Sentiment::Positive);
        assert_eq!(Sentiment::from_label(" NEGATIVE "), Sentiment::Negative);
        assert_eq!(Sentiment::from_label("mixed"), Sentiment::Mixed);
        assert_eq!(Sentiment::from_label("ecstatic"), Sentiment::Neutral);
    }

    #[test]
    fn test_sentiment_serializes_lowercase() {
        let json = serde_json::to_string(&Sentiment::Mixed).unwrap();
        assert_eq!(json, "\"mixed\"");
    }

    #[test]
    fn test_irrelevant_summary_keeps_post_identity() {
        let post = RedditPost {
            id: "abc".to_string(),
            title: "Weekly rules thread".to_string(),
            content: None,
            author: "mod".to_string(),
            subreddit: "ClaudeCode".to_string(),
            url: "https://reddit.com/r/ClaudeCode/comments/abc".to_string(),
            permalink: "https://reddit.com/r/ClaudeCode/comments/abc/rules".to_string(),
            created_utc: 1_700_000_000,
            score: 3,
            num_comments: 1,
            comments: Vec::new(),
        };

        let summary = PostSummary::irrelevant(&post, "meta announcement");
        assert_eq!(summary.post_id, "abc");
        assert!(!summary.is_relevant);
        assert_eq!(summary.relevance_reason, "meta announcement");
        assert_eq!(summary.engagement_score, 0);
    }

    #[test]
    fn test_summary_without_relevance_fields_defaults_to_relevant() {
        let json = r#"{
            "post_id": "p1", "subreddit": "codex", "title": "t", "url": "u",
            "sentiment": "positive", "summary": "s", "key_points": [], "topics": [],
            "engagement_score": 4, "score": 10, "num_comments": 2, "created_utc": null
        }"#;
        let summary: PostSummary = serde_json::from_str(json).unwrap();
        assert!(summary.is_relevant);
        assert!(summary.relevance_reason.is_empty());
    }
}
