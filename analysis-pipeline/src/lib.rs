pub mod coordinator;
pub mod events;
pub mod state;
pub mod summarizer;

pub use coordinator::{AnalysisCoordinator, AnalysisOutcome, PipelineConfig};
pub use events::{
    AnalysisEvent, CollectingSink, EventSink, FnSink, NullSink, ProgressStage, RequestEvent,
};
pub use state::{RequestState, RequestTracker};
pub use summarizer::CachedSummarizer;
