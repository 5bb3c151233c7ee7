use crate::types::BlockPosition;
use thiserror::Error;

/// Errors surfaced by the reconciliation pipeline.
///
/// Cloneable so the same error can be reported by every snapshot computed
/// while the failing stream stays in its failed state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventsError {
    #[error("Failed to fetch {label} logs: {message}")]
    Fetch { label: String, message: String },

    #[error("Failed to parse log at {position}: {message}")]
    Parse {
        position: BlockPosition,
        message: String,
    },

    #[error("Proxy address resolution failed: {0}")]
    Resolution(String),

    #[error("Unknown event '{event}' in {interface} interface")]
    UnknownEvent { interface: String, event: String },
}

impl EventsError {
    pub fn fetch(label: impl Into<String>, message: impl ToString) -> Self {
        EventsError::Fetch {
            label: label.into(),
            message: message.to_string(),
        }
    }

    pub fn parse(position: BlockPosition, message: impl Into<String>) -> Self {
        EventsError::Parse {
            position,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EventsError>;
