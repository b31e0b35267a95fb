use ulid::Ulid;

use crate::model::{Ms, Reservation, Status};

#[derive(Debug)]
pub enum EngineError {
    /// `start >= end`. Rejected before any lock is taken.
    InvalidInterval { start: Ms, end: Ms },
    /// The requested interval collides with live reservations. `request` is
    /// the id of the parked request when the submission was kept for review.
    Conflict {
        colliding: Vec<Reservation>,
        request: Option<Ulid>,
    },
    InvalidTransition { id: Ulid, from: Status, to: Status },
    NotFound(Ulid),
    MissingReason,
    LimitExceeded(&'static str),
    /// Journal failure. Never a statement about slot availability.
    Storage(String),
}

impl EngineError {
    /// Only infrastructure faults are worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Storage(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict { .. })
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidInterval { .. } => "invalid_interval",
            EngineError::Conflict { .. } => "conflict",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::NotFound(_) => "not_found",
            EngineError::MissingReason => "missing_reason",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Storage(_) => "storage",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInterval { start, end } => {
                write!(f, "invalid interval [{start}, {end}): start must be before end")
            }
            EngineError::Conflict { colliding, .. } => {
                write!(f, "conflict with {} reservation(s):", colliding.len())?;
                for r in colliding {
                    write!(f, " {} {} ({});", r.id, r.interval, r.status)?;
                }
                Ok(())
            }
            EngineError::InvalidTransition { id, from, to } => {
                write!(f, "reservation {id} already {from}: cannot move to {to}")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::MissingReason => write!(f, "a non-empty reason is required"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
