//! Lenient parsing of model output into summaries.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use snooze_core::{
    DiscussionSummary, LlmError, PostSummary, RedditPost, Sentiment, MAX_ENGAGEMENT_SCORE,
    MAX_TOPICS_PER_POST,
};

pub const DEFAULT_DISCUSSION_TOPIC: &str = "AI Agent Discussions";

/// The outermost `{ ... }` span of `text`, if any.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse `text` as JSON, falling back to the embedded object when the model
/// wrapped it in prose or a code fence.
pub fn parse_model_json<T: DeserializeOwned>(text: &str, provider: &str) -> Result<T, LlmError> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Ok(value);
    }

    let invalid = |details: String| LlmError::InvalidResponseFormat {
        provider: provider.to_string(),
        details,
    };
    let object = extract_json_object(text).ok_or_else(|| invalid("no JSON object found".to_string()))?;
    serde_json::from_str(object).map_err(|e| invalid(e.to_string()))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostAnalysis {
    pub is_relevant: Option<bool>,
    pub relevance_reason: Option<String>,
    pub key_points: Vec<String>,
    pub sentiment: Option<String>,
    pub topics: Vec<String>,
    pub summary: Option<String>,
    pub engagement_score: Option<f64>,
}

impl PostAnalysis {
    pub fn into_summary(self, post: &RedditPost) -> PostSummary {
        if self.is_relevant == Some(false) {
            let reason = self
                .relevance_reason
                .filter(|reason| !reason.trim().is_empty())
                .unwrap_or_else(|| "Not relevant".to_string());
            return PostSummary::irrelevant(post, reason);
        }

        let engagement = match self.engagement_score {
            Some(score) if score.is_finite() => score.round(),
            _ => (post.score / 10) as f64,
        };

        let mut topics = self.topics;
        topics.truncate(MAX_TOPICS_PER_POST);

        PostSummary {
            post_id: post.id.clone(),
            subreddit: post.subreddit.clone(),
            title: post.title.clone(),
            url: post.permalink.clone(),
            sentiment: self
                .sentiment
                .as_deref()
                .map(Sentiment::from_label)
                .unwrap_or_default(),
            summary: self.summary.unwrap_or_default(),
            key_points: self.key_points,
            topics,
            engagement_score: engagement.clamp(0.0, f64::from(MAX_ENGAGEMENT_SCORE)) as u8,
            score: post.score,
            num_comments: post.num_comments,
            created_utc: Some(post.created_utc),
            is_relevant: true,
            relevance_reason: self.relevance_reason.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiscussionAnalysis {
    pub topic: Option<String>,
    pub key_insights: Vec<String>,
    pub common_themes: Vec<String>,
    pub sentiment_overview: Option<String>,
}

impl DiscussionAnalysis {
    pub fn into_discussion(self, summaries: Vec<PostSummary>) -> DiscussionSummary {
        DiscussionSummary {
            topic: self
                .topic
                .filter(|topic| !topic.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DISCUSSION_TOPIC.to_string()),
            sentiment_overview: self.sentiment_overview.unwrap_or_default(),
            key_insights: self.key_insights,
            common_themes: self.common_themes,
            total_engagement: DiscussionSummary::engagement_of(&summaries),
            total_posts_analyzed: summaries.len(),
            post_summaries: summaries,
            analyzed_at: Utc::now(),
        }
    }
}
