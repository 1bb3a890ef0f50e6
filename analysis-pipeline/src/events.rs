//! Events pushed to clients while an analysis runs, and the sinks that
//! carry them.

use serde::{Deserialize, Serialize};
use snooze_core::{DiscussionSummary, PostSummary};
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Crawling,
    PostsReady,
    CacheCheck,
    AnalysisComplete,
    CreatingDiscussion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisEvent {
    Progress {
        stage: ProgressStage,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        post_count: Option<usize>,
    },
    PostSummaryReady {
        summary: PostSummary,
    },
    AnalysisComplete {
        discussion: DiscussionSummary,
        post_count: usize,
        total_posts_analyzed: usize,
    },
    Error {
        message: String,
        code: String,
    },
}

impl AnalysisEvent {
    pub fn progress(stage: ProgressStage, message: impl Into<String>, post_count: Option<usize>) -> Self {
        AnalysisEvent::Progress {
            stage,
            message: message.into(),
            post_count,
        }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisEvent::Progress { .. } => "progress",
            AnalysisEvent::PostSummaryReady { .. } => "post_summary_ready",
            AnalysisEvent::AnalysisComplete { .. } => "analysis_complete",
            AnalysisEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisEvent::AnalysisComplete { .. } | AnalysisEvent::Error { .. }
        )
    }
}

/// An event tagged with the run that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub request_id: String,
    #[serde(flatten)]
    pub event: AnalysisEvent,
}

/// Destination for a run's events.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Returns `false` once nobody is listening any more.
    fn emit(&self, event: AnalysisEvent) -> bool;
}

impl EventSink for mpsc::UnboundedSender<AnalysisEvent> {
    fn emit(&self, event: AnalysisEvent) -> bool {
        self.send(event).is_ok()
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<AnalysisEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AnalysisEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: AnalysisEvent) -> bool {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
        true
    }
}

/// Discards events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: AnalysisEvent) -> bool {
        true
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(AnalysisEvent) -> bool + Send + Sync,
{
    fn emit(&self, event: AnalysisEvent) -> bool {
        (self.0)(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let progress = AnalysisEvent::progress(ProgressStage::Crawling, "Crawling", None);
        assert_eq!(progress.name(), "progress");
        assert!(!progress.is_terminal());

        let error = AnalysisEvent::Error {
            message: "boom".to_string(),
            code: "INTERNAL".to_string(),
        };
        assert_eq!(error.name(), "error");
        assert!(error.is_terminal());
    }

    #[test]
    fn test_request_event_serializes_flat() {
        let event = RequestEvent {
            request_id: "r1".to_string(),
            event: AnalysisEvent::progress(ProgressStage::CacheCheck, "checking", Some(4)),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["request_id"], "r1");
        assert_eq!(json["type"], "progress");
        assert_eq!(json["stage"], "cache_check");
        assert_eq!(json["post_count"], 4);
    }

    #[test]
    fn test_mpsc_sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        assert!(tx.emit(AnalysisEvent::progress(ProgressStage::Crawling, "a", None)));
        drop(rx);
        assert!(!tx.emit(AnalysisEvent::progress(ProgressStage::Crawling, "b", None)));
    }

    #[test]
    fn test_fn_sink() {
        let sink = FnSink(|event: AnalysisEvent| event.name() != "error");
        assert!(sink.emit(AnalysisEvent::progress(ProgressStage::Crawling, "a", None)));
        assert!(!sink.emit(AnalysisEvent::Error {
            message: String::new(),
            code: String::new(),
        }));
    }
}
