pub mod parse;
pub mod prompts;
pub mod provider;
pub mod summarizer;

pub use parse::{extract_json_object, DiscussionAnalysis, PostAnalysis};
pub use provider::{build_provider, AzureOpenAiProvider, LlmProvider, OpenAiProvider};
pub use summarizer::{LlmSummarizer, Summarizer};
