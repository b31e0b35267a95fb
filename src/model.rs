use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Resources are catalogued outside the engine; we only see their ids.
pub type ResourceId = String;

pub type OwnerId = String;

/// Half-open interval `[start, end)`.
///
/// Always satisfies `start < end`: construction and deserialization both go
/// through [`Interval::new`], so a replayed journal can never smuggle in an
/// empty or inverted interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct Interval {
    start: Ms,
    end: Ms,
}

#[derive(Deserialize)]
struct RawInterval {
    start: Ms,
    end: Ms,
}

impl TryFrom<RawInterval> for Interval {
    type Error = EngineError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        Interval::new(raw.start, raw.end)
    }
}

impl Interval {
    pub fn new(start: Ms, end: Ms) -> Result<Self, EngineError> {
        if start >= end {
            return Err(EngineError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Ms {
        self.start
    }

    pub fn end(&self) -> Ms {
        self.end
    }

    /// Width in ms. Unsigned so it stays exact for any pair of `i64` bounds.
    pub fn duration_ms(&self) -> u64 {
        self.end.abs_diff(self.start)
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True when one interval ends exactly where the other begins.
    pub fn adjacent(&self, other: &Interval) -> bool {
        self.end == other.start || other.end == self.start
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Lifecycle status of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Approved,
    Declined,
    Cancelled,
    Completed,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Pending,
        Status::Approved,
        Status::Declined,
        Status::Cancelled,
        Status::Completed,
    ];

    /// Live reservations count toward conflict checks.
    pub fn is_live(self) -> bool {
        matches!(self, Status::Pending | Status::Approved)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_live()
    }

    /// The lifecycle graph. Terminal states have no outgoing edges.
    pub fn can_transition_to(self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Pending, Status::Approved)
                | (Status::Pending, Status::Declined)
                | (Status::Pending, Status::Cancelled)
                | (Status::Approved, Status::Cancelled)
                | (Status::Approved, Status::Completed)
        )
    }

    /// Declines and cancellations must say why.
    pub fn requires_reason(self) -> bool {
        matches!(self, Status::Declined | Status::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Approved => "approved",
            Status::Declined => "declined",
            Status::Cancelled => "cancelled",
            Status::Completed => "completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason recorded on reservations cancelled by an override approval.
pub const OVERRIDDEN_REASON: &str = "overridden";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub resource_id: ResourceId,
    pub owner_id: OwnerId,
    pub interval: Interval,
    pub status: Status,
    pub created_at: Ms,
    pub status_changed_at: Ms,
    /// Reservations displaced when this one was approved by override.
    pub override_of: Vec<Ulid>,
    pub decline_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    /// A request parked after colliding at submission. It holds no claim on
    /// its interval until an approval admits it into the conflict index.
    pub contested: bool,
}

impl Reservation {
    /// Holds a claim on its interval (sits in the conflict index).
    pub fn is_live(&self) -> bool {
        self.status.is_live() && !self.contested
    }
}

/// Per-resource behaviour supplied by whoever owns the resource catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePolicy {
    /// When false, conflict-free submissions are approved immediately.
    pub requires_approval: bool,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self {
            requires_approval: true,
        }
    }
}

/// Metadata accompanying a status transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionMeta {
    pub reason: Option<String>,
}

impl TransitionMeta {
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }
}

/// Journal events, flat. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    PolicySet {
        resource_id: ResourceId,
        policy: ResourcePolicy,
    },
    /// A reservation enters the ledger. Its status and `contested` flag decide
    /// where it lands: the conflict index, the parked set, or history.
    Recorded { reservation: Reservation },
    Transitioned {
        id: Ulid,
        resource_id: ResourceId,
        status: Status,
        at: Ms,
        reason: Option<String>,
    },
    /// Override approval: every displaced reservation is cancelled and the
    /// winner approved, as one record.
    Overridden {
        id: Ulid,
        resource_id: ResourceId,
        displaced: Vec<Ulid>,
        at: Ms,
    },
}

impl Event {
    pub fn resource_id(&self) -> &str {
        match self {
            Event::PolicySet { resource_id, .. }
            | Event::Transitioned { resource_id, .. }
            | Event::Overridden { resource_id, .. } => resource_id,
            Event::Recorded { reservation } => &reservation.resource_id,
        }
    }
}
