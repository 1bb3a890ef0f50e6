//! Fan-out of async run events with a per-run replay buffer.
//!
//! A client learns its `request_id` from the 202 response, after the run has
//! already started. Recording each run's events lets a late subscriber replay
//! what it missed before switching to live delivery.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use analysis_pipeline::{AnalysisEvent, EventSink, RequestEvent};
use tokio::sync::broadcast;

/// Runs whose history is kept; the oldest run is forgotten first.
pub const MAX_RETAINED_RUNS: usize = 64;

#[derive(Debug, Default)]
struct RunHistory {
    order: VecDeque<String>,
    runs: HashMap<String, VecDeque<RequestEvent>>,
}

#[derive(Debug)]
pub struct EventHub {
    sender: broadcast::Sender<RequestEvent>,
    history: Mutex<RunHistory>,
    max_runs: usize,
    max_events_per_run: usize,
}

impl EventHub {
    pub fn new(event_buffer: usize) -> Self {
        Self::with_limits(event_buffer, MAX_RETAINED_RUNS)
    }

    pub fn with_limits(event_buffer: usize, max_runs: usize) -> Self {
        let (sender, _) = broadcast::channel(event_buffer.max(1));
        Self {
            sender,
            history: Mutex::new(RunHistory::default()),
            max_runs: max_runs.max(1),
            max_events_per_run: event_buffer.max(1),
        }
    }

    /// Record `event` in its run's history and send it to live subscribers.
    pub fn publish(&self, event: RequestEvent) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);

        if !history.runs.contains_key(&event.request_id) {
            if history.order.len() >= self.max_runs {
                if let Some(evicted) = history.order.pop_front() {
                    history.runs.remove(&evicted);
                }
            }
            history.order.push_back(event.request_id.clone());
        }
        let events = history.runs.entry(event.request_id.clone()).or_default();
        if events.len() >= self.max_events_per_run {
            events.pop_front();
        }
        events.push_back(event.clone());

        // Sent under the lock so `subscribe` never sees an event twice or
        // misses one between its snapshot and its receiver.
        if self.sender.send(event).is_err() {
            tracing::trace!("No live event subscribers");
        }
    }

    /// Events already published for `request_id` plus a receiver for
    /// everything published afterwards. Without a run id nothing is replayed.
    pub fn subscribe(
        &self,
        request_id: Option<&str>,
    ) -> (Vec<RequestEvent>, broadcast::Receiver<RequestEvent>) {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let receiver = self.sender.subscribe();
        let backlog = request_id
            .and_then(|id| history.runs.get(id))
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default();
        (backlog, receiver)
    }

    pub fn retained_runs(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }
}

/// Sink for a run started through the async API.
///
/// The run belongs to the server, so it keeps going with zero subscribers.
#[derive(Debug, Clone)]
pub struct HubSink {
    request_id: String,
    hub: Arc<EventHub>,
}

impl HubSink {
    pub fn new(request_id: impl Into<String>, hub: Arc<EventHub>) -> Self {
        Self {
            request_id: request_id.into(),
            hub,
        }
    }
}

impl EventSink for HubSink {
    fn emit(&self, event: AnalysisEvent) -> bool {
        self.hub.publish(RequestEvent {
            request_id: self.request_id.clone(),
            event,
        });
        true
    }
}
