use snooze_core::{PostSummary, RedditPost};

pub const SYSTEM_PROMPT: &str = "You are an AI expert analyzing Reddit discussions about AI agents. Always respond with valid JSON.";

/// Comments quoted in a post prompt.
pub const MAX_PROMPT_COMMENTS: usize = 10;

/// Summaries quoted in a discussion prompt.
pub const MAX_PROMPT_SUMMARIES: usize = 20;

/// Post bodies longer than this are cut at a character boundary.
pub const MAX_BODY_BYTES: usize = 8_000;

fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

pub fn post_prompt(post: &RedditPost) -> String {
    let comments = if post.comments.is_empty() {
        "No comments".to_string()
    } else {
        post.comments
            .iter()
            .take(MAX_PROMPT_COMMENTS)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    };
    let body = post
        .content
        .as_deref()
        .map(|body| truncate_to_char_boundary(body, MAX_BODY_BYTES))
        .unwrap_or("");

    format!(
        r#"Analyze this Reddit post and determine if it's a substantive discussion about AI coding agents/tools.

POST DETAILS:
Title: {title}
Subreddit: r/{subreddit}
Score: {score}
Comments: {num_comments}

CONTENT:
{body}

TOP COMMENTS:
{comments}

Please provide a JSON response with the following structure:
{{
    "is_relevant": true|false,
    "relevance_reason": "Brief explanation if not relevant",
    "key_points": ["point1", "point2", "point3"],
    "sentiment": "positive|negative|neutral|mixed",
    "topics": ["topic1", "topic2", "topic3"],
    "summary": "2-3 sentence summary of the main discussion",
    "engagement_score": 1-10
}}

STRICT RELEVANCE CRITERIA - Set "is_relevant" to FALSE if the post is:
- Subreddit rules, guidelines, or meta announcements
- Moderator posts about community features or policies
- Off-topic discussions not about AI coding tools
- Empty posts, memes, or low-effort content
- General AI discussions without coding/development focus
- Posts about non-coding AI applications (art, writing, etc.)
- Technical support for non-AI tools
- Job postings or recruitment

Set "is_relevant" to TRUE only if the post contains:
- Discussions about AI coding assistants (Claude Code, Copilot, Cursor, etc.)
- User experiences with AI development tools
- Technical comparisons of AI coding platforms
- Workflows, tips, or best practices for AI-assisted coding
- Problems, limitations, or improvements for coding AI
- Code generation, debugging, or refactoring with AI
- AI agent behavior in software development contexts

Focus on CODING and DEVELOPMENT discussions only. Exclude all meta/administrative content.
"#,
        title = post.title,
        subreddit = post.subreddit,
        score = post.score,
        num_comments = post.num_comments,
        body = body,
        comments = comments,
    )
}

pub fn discussion_prompt(summaries: &[PostSummary]) -> String {
    let quoted = summaries
        .iter()
        .take(MAX_PROMPT_SUMMARIES)
        .map(|summary| {
            format!(
                "POST: {}\nTopics: {}\nSummary: {}\nKey Points: {}\nSentiment: {}",
                summary.title,
                summary.topics.join(", "),
                summary.summary,
                summary.key_points.join(", "),
                summary.sentiment
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"Analyze these Reddit post summaries about AI agents and create an overall discussion summary.

POST SUMMARIES:
{quoted}

Please provide a JSON response with the following structure:
{{
    "topic": "Main overarching topic",
    "key_insights": ["insight1", "insight2", "insight3"],
    "common_themes": ["theme1", "theme2", "theme3"],
    "sentiment_overview": "Description of overall sentiment trends"
}}

Focus on:
1. Identifying the main topic or trend being discussed
2. Key insights about AI agents from across all posts
3. Common themes, concerns, or interests
4. Overall sentiment patterns
5. Notable trends or emerging topics
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use snooze_core::Sentiment;

    fn post_with_comments(count: usize) -> RedditPost {
        RedditPost {
            id: "p1".to_string(),
            title: "Claude Code vs Cursor".to_string(),
            content: Some("Which one handles large refactors better?".to_string()),
            author: "dev".to_string(),
            subreddit: "ClaudeCode".to_string(),
            url: "https://reddit.com/p1".to_string(),
            permalink: "https://reddit.com/r/ClaudeCode/comments/p1".to_string(),
            created_utc: 0,
            score: 87,
            num_comments: 31,
            comments: (0..count).map(|i| format!("comment-{}", i)).collect(),
        }
    }

    #[test]
    fn test_post_prompt_includes_details_and_caps_comments() {
        let prompt = post_prompt(&post_with_comments(15));
        assert!(prompt.contains("Title: Claude Code vs Cursor"));
        assert!(prompt.contains("Subreddit: r/ClaudeCode"));
        assert!(prompt.contains("Score: 87"));
        assert!(prompt.contains("comment-9"));
        assert!(!prompt.contains("comment-10"));
        assert!(prompt.contains("\"is_relevant\""));
    }

    #[test]
    fn test_post_prompt_without_comments() {
        let prompt = post_prompt(&post_with_comments(0));
        assert!(prompt.contains("TOP COMMENTS:\nNo comments"));
    }

    #[test]
    fn test_discussion_prompt_caps_summaries() {
        let summaries: Vec<PostSummary> = (0..25)
            .map(|i| PostSummary {
                post_id: format!("p{}", i),
                subreddit: "codex".to_string(),
                title: format!("title-{}", i),
                url: String::new(),
                sentiment: Sentiment::Mixed,
                summary: "s".to_string(),
                key_points: vec!["k".to_string()],
                topics: vec!["t1".to_string(), "t2".to_string()],
                engagement_score: 5,
                score: 1,
                num_comments: 1,
                created_utc: None,
                is_relevant: true,
                relevance_reason: String::new(),
            })
            .collect();

        let prompt = discussion_prompt(&summaries);
        assert!(prompt.contains("POST: title-19\n"));
        assert!(!prompt.contains("POST: title-20\n"));
        assert!(prompt.contains("Topics: t1, t2"));
        assert!(prompt.contains("Sentiment: mixed"));
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let text = "Hello 世界";
        let truncated = truncate_to_char_boundary(text, 8);
        assert!(truncated.len() <= 8);
        assert!(text.starts_with(truncated));
    }
}
