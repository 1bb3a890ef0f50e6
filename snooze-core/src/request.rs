//! Analysis requests and their cache fingerprints.
//!
//! A fingerprint is a SHA-256 over a versioned, normalized rendering of the
//! request: community names are trimmed, lower-cased, de-duplicated and
//! sorted, the search term is lower-cased with whitespace collapsed. Two
//! requests that differ only in community order or letter case therefore share
//! cached artifacts. `force_refresh` is not part of the fingerprint.

use crate::AnalysisError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Bumped whenever the normalization below changes.
pub const FINGERPRINT_VERSION: u32 = 1;

pub const DEFAULT_SUBREDDITS: [&str; 4] = ["ClaudeCode", "codex", "GithubCopilot", "ChatGPTCoding"];

pub const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default = "default_subreddits")]
    pub subreddits: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub force_refresh: bool,
}

fn default_subreddits() -> Vec<String> {
    DEFAULT_SUBREDDITS.iter().map(|s| s.to_string()).collect()
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl Default for AnalyzeRequest {
    fn default() -> Self {
        Self {
            subreddits: default_subreddits(),
            limit: DEFAULT_LIMIT,
            search: None,
            force_refresh: false,
        }
    }
}

impl AnalyzeRequest {
    pub fn new(subreddits: Vec<String>, limit: usize) -> Self {
        Self {
            subreddits,
            limit,
            ..Self::default()
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    /// Reject requests the fetcher cannot serve.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.limit == 0 {
            return Err(AnalysisError::InvalidRequest {
                reason: "limit must be at least 1".to_string(),
            });
        }
        if self.normalized_subreddits().is_empty() {
            return Err(AnalysisError::InvalidRequest {
                reason: "at least one subreddit is required".to_string(),
            });
        }
        Ok(())
    }

    /// Non-empty search term, trimmed.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }

    pub fn normalized_subreddits(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .subreddits
            .iter()
            .map(|name| name.trim().trim_start_matches("r/").to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn fingerprint(&self) -> RequestFingerprint {
        let search = self
            .search_term()
            .map(|term| {
                term.split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase()
            })
            .unwrap_or_default();

        let canonical = format!(
            "v{}|subreddits={}|limit={}|search={}",
            FINGERPRINT_VERSION,
            self.normalized_subreddits().join(","),
            self.limit,
            search
        );
        RequestFingerprint::of(&canonical)
    }
}

/// Deterministic cache key for request-scoped artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    fn of(canonical: &str) -> Self {
        Self(hex::encode(Sha256::digest(canonical.as_bytes())))
    }

    /// Fingerprint of this request narrowed to a specific set of kept posts.
    ///
    /// Used for the discussion aggregate so a changed post set never reuses a
    /// stale aggregate.
    pub fn with_posts<'a>(&self, post_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let mut ids: Vec<&str> = post_ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self::of(&format!("{}|posts={}", self.0, ids.join(",")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(subreddits: &[&str], limit: usize) -> AnalyzeRequest {
        AnalyzeRequest::new(subreddits.iter().map(|s| s.to_string()).collect(), limit)
    }

    #[test]
    fn test_fingerprint_ignores_subreddit_order_and_case() {
        let a = request(&["ClaudeCode", "codex"], 20);
        let b = request(&["codex", "claudecode"], 20);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_limit_and_search() {
        let base = request(&["ClaudeCode"], 20);
        assert_ne!(base.fingerprint(), request(&["ClaudeCode"], 21).fingerprint());
        assert_ne!(
            base.fingerprint(),
            base.clone().with_search("cursor").fingerprint()
        );
    }

    #[test]
    fn test_fingerprint_normalizes_search_whitespace() {
        let a = request(&["codex"], 5).with_search("  AI   agent ");
        let b = request(&["codex"], 5).with_search("ai agent");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_force_refresh_does_not_change_fingerprint() {
        let a = request(&["codex"], 5);
        let b = a.clone().with_force_refresh(true);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fingerprint = request(&["codex"], 5).fingerprint();
        assert_eq!(fingerprint.as_str().len(), 64);
        assert!(fingerprint.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_with_posts_is_order_independent() {
        let base = request(&["codex"], 5).fingerprint();
        assert_eq!(base.with_posts(["b", "a"]), base.with_posts(["a", "b"]));
        assert_ne!(base.with_posts(["a"]), base.with_posts(["a", "b"]));
    }

    #[test]
    fn test_validate_rejects_zero_limit_and_empty_subreddits() {
        assert!(request(&["codex"], 0).validate().is_err());
        assert!(request(&["  "], 3).validate().is_err());
        assert!(request(&["codex"], 1).validate().is_ok());
    }

    #[test]
    fn test_request_defaults_from_json() {
        let parsed: AnalyzeRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.limit, DEFAULT_LIMIT);
        assert_eq!(parsed.subreddits.len(), DEFAULT_SUBREDDITS.len());
        assert!(!parsed.force_refresh);
    }
}
