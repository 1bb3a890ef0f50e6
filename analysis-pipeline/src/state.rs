use serde::{Deserialize, Serialize};
use snooze_core::CoreError;
use std::fmt;
use tracing::{debug, warn};

/// Lifecycle of one analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Initiated,
    Fetching,
    Partitioning,
    Streaming,
    Aggregating,
    Complete,
    Failed,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Complete | RequestState::Failed)
    }

    pub fn can_transition_to(&self, next: RequestState) -> bool {
        use RequestState::*;
        match (self, next) {
            (Complete, _) | (Failed, _) => false,
            (_, Failed) => true,
            (Initiated, Fetching)
            | (Fetching, Partitioning)
            | (Partitioning, Streaming)
            | (Streaming, Aggregating)
            | (Aggregating, Complete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Initiated => "initiated",
            RequestState::Fetching => "fetching",
            RequestState::Partitioning => "partitioning",
            RequestState::Streaming => "streaming",
            RequestState::Aggregating => "aggregating",
            RequestState::Complete => "complete",
            RequestState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks and validates the state of one run.
#[derive(Debug)]
pub struct RequestTracker {
    request_id: String,
    state: RequestState,
}

impl RequestTracker {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            state: RequestState::Initiated,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn advance(&mut self, next: RequestState) -> Result<(), CoreError> {
        if !self.state.can_transition_to(next) {
            return Err(CoreError::Internal {
                message: format!(
                    "invalid request state transition {} -> {} for {}",
                    self.state, next, self.request_id
                ),
            });
        }
        debug!(request_id = %self.request_id, "Request {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Move to `Failed` unless already terminal.
    pub fn fail(&mut self, reason: &str) {
        if self.state.is_terminal() {
            return;
        }
        warn!(request_id = %self.request_id, "Request failed while {}: {}", self.state, reason);
        self.state = RequestState::Failed;
    }
}
