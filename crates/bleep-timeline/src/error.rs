use crate::event::EventError;
use crate::milestone::Milestone;
use crate::resolver::ResolveError;
use thiserror::Error;

/// Per-event failures. None of them is fatal: the engine skips the event
/// and keeps consuming the stream.
#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("Cannot place {milestone} from `{message}`: {source}")]
    Unresolved {
        milestone: Milestone,
        message: String,
        #[source]
        source: ResolveError,
    },

    #[error("Dropping {milestone}: {source}")]
    Timestamp {
        milestone: Milestone,
        #[source]
        source: EventError,
    },
}

impl TimelineError {
    pub fn milestone(&self) -> Milestone {
        match self {
            TimelineError::Unresolved { milestone, .. } | TimelineError::Timestamp { milestone, .. } => *milestone,
        }
    }
}
