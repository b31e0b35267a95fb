//! Approval workflow layered on the store primitives.
//!
//! `pending → approved | declined | cancelled`, `approved → cancelled |
//! completed`. An approver may override a conflict: every colliding live
//! reservation is cancelled as `"overridden"` and the request approved, in a
//! single journal record.

use ulid::Ulid;

use crate::limits::MAX_OVERRIDE_TARGETS;
use crate::model::*;
use crate::notify::Notice;
use crate::observability::*;

use super::conflict::{check_transition, colliders, now_ms};
use super::mutations::{notice_for, rejected};
use super::store::ResourceState;
use super::{Engine, EngineError};

impl Engine {
    /// Submit a reservation request.
    ///
    /// Succeeds with a pending reservation (approved outright when the
    /// resource needs no approval). On collision returns `Conflict`; if the
    /// engine parks contested requests, `request` names the parked
    /// reservation so an approver can still act on it.
    pub async fn submit_reservation(
        &self,
        resource_id: &str,
        owner_id: &str,
        interval: Interval,
    ) -> Result<Reservation, EngineError> {
        self.reserve(resource_id, owner_id, interval, self.settings.park_contested)
            .await
    }

    /// Approve a pending reservation. Without `override_conflicts` this fails
    /// with `Conflict` if anything live overlaps it; with it, the colliders
    /// are displaced.
    pub async fn approve(&self, id: Ulid, override_conflicts: bool) -> Result<Reservation, EngineError> {
        if override_conflicts {
            self.approve_with_override(id, None).await
        } else {
            self.transition(id, Status::Approved, TransitionMeta::default())
                .await
        }
    }

    /// Override approval against the exact set of reservations the approver
    /// reviewed. Fails without touching anything if a target has meanwhile
    /// left the live set, or if a collider exists that is not in `targets`.
    pub async fn approve_displacing(&self, id: Ulid, targets: &[Ulid]) -> Result<Reservation, EngineError> {
        if targets.len() > MAX_OVERRIDE_TARGETS {
            return Err(EngineError::LimitExceeded("too many override targets"));
        }
        self.approve_with_override(id, Some(targets)).await
    }

    pub async fn decline(&self, id: Ulid, reason: &str) -> Result<Reservation, EngineError> {
        self.transition(id, Status::Declined, TransitionMeta::with_reason(reason))
            .await
    }

    /// Mark an approved reservation as used.
    pub async fn complete(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.transition(id, Status::Completed, TransitionMeta::default())
            .await
    }

    async fn approve_with_override(
        &self,
        id: Ulid,
        targets: Option<&[Ulid]>,
    ) -> Result<Reservation, EngineError> {
        let lock = self.resolve_reservation_write(&id).await?;
        let winner = check_transition(&lock, id, Status::Approved).map_err(rejected)?;
        let colliding = colliders(&lock, &winner.interval, Some(id));
        if let Some(targets) = targets {
            check_targets(&lock, id, &colliding, targets).map_err(rejected)?;
        }
        // Validate every displacement before writing anything.
        for victim in &colliding {
            check_transition(&lock, victim.id, Status::Cancelled).map_err(rejected)?;
        }

        let displaced: Vec<Ulid> = colliding.iter().map(|r| r.id).collect();
        let at = now_ms();
        let event = if displaced.is_empty() {
            Event::Transitioned {
                id,
                resource_id: winner.resource_id.clone(),
                status: Status::Approved,
                at,
                reason: None,
            }
        } else {
            Event::Overridden {
                id,
                resource_id: winner.resource_id.clone(),
                displaced: displaced.clone(),
                at,
            }
        };

        let from = winner.status;
        self.commit(lock, event, move |rs| {
            let approved = rs.get(id).cloned().ok_or(EngineError::NotFound(id))?;
            let victims: Vec<Reservation> = displaced
                .iter()
                .filter_map(|d| rs.get(*d).cloned())
                .collect();

            metrics::counter!(TRANSITIONS_TOTAL, "from" => from.as_str(), "to" => "approved")
                .increment(1);
            if !victims.is_empty() {
                metrics::counter!(OVERRIDES_TOTAL).increment(1);
                metrics::counter!(DISPLACED_TOTAL).increment(victims.len() as u64);
                tracing::info!(
                    "override: {id} approved on {}, displacing {:?}",
                    approved.resource_id,
                    displaced
                );
            }

            let mut notices: Vec<Notice> = victims
                .into_iter()
                .map(|reservation| Notice::Displaced {
                    reservation,
                    winner: id,
                })
                .collect();
            notices.push(notice_for(&approved));
            Ok((approved, notices))
        })
        .await
    }
}

/// The approver's reviewed set must match the current colliders exactly.
fn check_targets(
    rs: &ResourceState,
    winner: Ulid,
    colliding: &[Reservation],
    targets: &[Ulid],
) -> Result<(), EngineError> {
    for target in targets {
        if colliding.iter().any(|c| c.id == *target) {
            continue;
        }
        return match rs.get(*target) {
            Some(r) if r.status.is_terminal() => Err(EngineError::InvalidTransition {
                id: *target,
                from: r.status,
                to: Status::Cancelled,
            }),
            _ => Err(EngineError::NotFound(*target)),
        };
    }
    let unreviewed: Vec<Reservation> = colliding
        .iter()
        .filter(|c| !targets.contains(&c.id))
        .cloned()
        .collect();
    if !unreviewed.is_empty() {
        return Err(EngineError::Conflict {
            colliding: unreviewed,
            request: Some(winner),
        });
    }
    Ok(())
}
