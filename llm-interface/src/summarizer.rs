use crate::parse::{parse_model_json, DiscussionAnalysis, PostAnalysis};
use crate::prompts::{discussion_prompt, post_prompt, SYSTEM_PROMPT};
use crate::provider::LlmProvider;
use async_trait::async_trait;
use snooze_core::{
    AnalysisError, CoreError, DiscussionSummary, PostSummary, RedditPost, RetryPolicy,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Produces post summaries and discussion aggregates.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize_post(&self, post: &RedditPost) -> Result<PostSummary, CoreError>;

    /// Never called with an empty slice.
    async fn summarize_discussion(
        &self,
        summaries: &[PostSummary],
    ) -> Result<DiscussionSummary, CoreError>;
}

/// `Summarizer` over a chat-completion provider with bounded retry.
pub struct LlmSummarizer {
    provider: Arc<dyn LlmProvider>,
    retry_policy: RetryPolicy,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    async fn complete_json<T>(&self, label: &str, prompt: &str) -> Result<T, CoreError>
    where
        T: serde::de::DeserializeOwned,
    {
        let provider = self.provider.as_ref();
        // A malformed reply is not retried; the model is unlikely to fix itself.
        let raw = self
            .retry_policy
            .run(label, || provider.complete(SYSTEM_PROMPT, prompt))
            .await?;
        Ok(parse_model_json(&raw, provider.name())?)
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize_post(&self, post: &RedditPost) -> Result<PostSummary, CoreError> {
        let label = format!("summarize post {}", post.id);
        let analysis: PostAnalysis = self.complete_json(&label, &post_prompt(post)).await?;
        let summary = analysis.into_summary(post);

        if summary.is_relevant {
            debug!(post_id = %post.id, "Summarized relevant post");
        } else {
            info!(
                post_id = %post.id,
                reason = %summary.relevance_reason,
                "Model judged post irrelevant"
            );
        }
        Ok(summary)
    }

    async fn summarize_discussion(
        &self,
        summaries: &[PostSummary],
    ) -> Result<DiscussionSummary, CoreError> {
        if summaries.is_empty() {
            return Err(AnalysisError::NoSummaries { attempted: 0 }.into());
        }

        let analysis: DiscussionAnalysis = self
            .complete_json("summarize discussion", &discussion_prompt(summaries))
            .await?;
        info!("Created discussion summary over {} posts", summaries.len());
        Ok(analysis.into_discussion(summaries.to_vec()))
    }
}
