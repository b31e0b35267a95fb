use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::store::ResourceState;
use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

pub(crate) fn validate_interval(interval: &Interval) -> Result<(), EngineError> {
    if interval.start() < MIN_VALID_TIMESTAMP_MS || interval.end() > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if interval.duration_ms() > MAX_INTERVAL_DURATION_MS {
        return Err(EngineError::LimitExceeded("interval too wide"));
    }
    Ok(())
}

pub(crate) fn validate_id(id: &str, what: &'static str) -> Result<(), EngineError> {
    if id.is_empty() {
        return Err(EngineError::LimitExceeded(what));
    }
    if id.len() > MAX_ID_LEN {
        return Err(EngineError::LimitExceeded("id too long"));
    }
    Ok(())
}

/// Normalise a transition reason: trimmed, non-empty when `required`.
pub(crate) fn validate_reason(
    reason: Option<&str>,
    required: bool,
) -> Result<Option<String>, EngineError> {
    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    match reason {
        None if required => Err(EngineError::MissingReason),
        Some(r) if r.len() > MAX_REASON_LEN => Err(EngineError::LimitExceeded("reason too long")),
        other => Ok(other.map(str::to_string)),
    }
}

/// Live reservations standing in the way of `interval`.
pub(crate) fn colliders(rs: &ResourceState, interval: &Interval, exclude: Option<Ulid>) -> Vec<Reservation> {
    rs.index.find_overlapping(interval, exclude)
}

/// Fails with `Conflict` unless `interval` is free on `rs`.
pub(crate) fn check_no_conflict(
    rs: &ResourceState,
    interval: &Interval,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    let colliding = colliders(rs, interval, exclude);
    if colliding.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Conflict {
            colliding,
            request: None,
        })
    }
}

/// Look a reservation up and check the lifecycle allows `to`.
pub(crate) fn check_transition(
    rs: &ResourceState,
    id: Ulid,
    to: Status,
) -> Result<Reservation, EngineError> {
    let current = rs.get(id).ok_or(EngineError::NotFound(id))?;
    if !current.status.can_transition_to(to) {
        return Err(EngineError::InvalidTransition {
            id,
            from: current.status,
            to,
        });
    }
    Ok(current.clone())
}
