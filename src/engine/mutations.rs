use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::Notice;
use crate::observability::*;

use super::conflict::{
    check_no_conflict, check_transition, colliders, now_ms, validate_id, validate_interval, validate_reason,
};
use super::{Engine, EngineError, WalCommand};

/// Outcome of a journal compaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub resources: usize,
    pub records: usize,
    pub pruned: usize,
}

/// The notice a committed status change produces.
pub(super) fn notice_for(reservation: &Reservation) -> Notice {
    let reservation = reservation.clone();
    match reservation.status {
        Status::Pending => Notice::Submitted { reservation },
        Status::Approved => Notice::Approved { reservation },
        Status::Declined => Notice::Declined { reservation },
        Status::Cancelled => Notice::Cancelled { reservation },
        Status::Completed => Notice::Completed { reservation },
    }
}

/// Count a refused lifecycle operation and pass the error through.
pub(super) fn rejected(err: EngineError) -> EngineError {
    metrics::counter!(REJECTIONS_TOTAL, "kind" => err.kind()).increment(1);
    err
}

impl Engine {
    /// Check-and-insert under the resource lock: the interval is either free
    /// and the reservation committed, or `Conflict` comes back listing the
    /// collisions and nothing was written.
    pub async fn try_reserve(
        &self,
        resource_id: &str,
        owner_id: &str,
        interval: Interval,
    ) -> Result<Reservation, EngineError> {
        self.reserve(resource_id, owner_id, interval, false).await
    }

    /// With `park`, a colliding request is journaled as contested instead
    /// of dropped; the caller still gets `Conflict`, carrying the parked id.
    pub(super) async fn reserve(
        &self,
        resource_id: &str,
        owner_id: &str,
        interval: Interval,
        park: bool,
    ) -> Result<Reservation, EngineError> {
        validate_id(resource_id, "missing resource id")?;
        validate_id(owner_id, "missing owner id")?;
        validate_interval(&interval)?;

        let lock = self.lock_resource(resource_id).await;
        if lock.open_count() >= MAX_RESERVATIONS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many reservations on resource"));
        }

        let colliding = colliders(&lock, &interval, None);
        if !colliding.is_empty() && !park {
            drop(lock);
            metrics::counter!(RESERVATIONS_TOTAL, "outcome" => "conflict").increment(1);
            tracing::debug!(
                "reservation on {resource_id} {interval} collides with {} live reservation(s)",
                colliding.len()
            );
            return Err(EngineError::Conflict {
                colliding,
                request: None,
            });
        }

        let now = now_ms();
        let status = if colliding.is_empty() && !lock.policy.requires_approval {
            Status::Approved
        } else {
            Status::Pending
        };
        let reservation = Reservation {
            id: Ulid::new(),
            resource_id: resource_id.to_string(),
            owner_id: owner_id.to_string(),
            interval,
            status,
            created_at: now,
            status_changed_at: now,
            override_of: Vec::new(),
            decline_reason: None,
            cancellation_reason: None,
            contested: !colliding.is_empty(),
        };

        let contested = !colliding.is_empty();
        let notice = if contested {
            Notice::Contested {
                reservation: reservation.clone(),
                colliding: colliding.iter().map(|r| r.id).collect(),
            }
        } else {
            notice_for(&reservation)
        };
        let event = Event::Recorded {
            reservation: reservation.clone(),
        };
        let reservation = self
            .commit(lock, event, move |_| {
                if contested {
                    metrics::counter!(RESERVATIONS_TOTAL, "outcome" => "contested").increment(1);
                    tracing::debug!(
                        "parked contested request {} on {} {}",
                        reservation.id,
                        reservation.resource_id,
                        reservation.interval
                    );
                } else {
                    metrics::counter!(RESERVATIONS_TOTAL, "outcome" => reservation.status.as_str())
                        .increment(1);
                }
                Ok((reservation, vec![notice]))
            })
            .await?;

        if !contested {
            return Ok(reservation);
        }
        Err(EngineError::Conflict {
            colliding,
            request: Some(reservation.id),
        })
    }

    /// Move a reservation along the lifecycle graph. Approval re-validates
    /// the interval against every other live reservation.
    pub async fn transition(
        &self,
        id: Ulid,
        to: Status,
        meta: TransitionMeta,
    ) -> Result<Reservation, EngineError> {
        let reason = validate_reason(meta.reason.as_deref(), to.requires_reason())?;
        let lock = self.resolve_reservation_write(&id).await?;
        let current = check_transition(&lock, id, to).map_err(rejected)?;
        if to == Status::Approved {
            check_no_conflict(&lock, &current.interval, Some(id)).map_err(rejected)?;
        }

        let event = Event::Transitioned {
            id,
            resource_id: current.resource_id.clone(),
            status: to,
            at: now_ms(),
            reason,
        };
        let from = current.status;
        self.commit(lock, event, move |rs| {
            let updated = rs.get(id).cloned().ok_or(EngineError::NotFound(id))?;
            metrics::counter!(TRANSITIONS_TOTAL, "from" => from.as_str(), "to" => to.as_str())
                .increment(1);
            tracing::debug!("reservation {id} {from} -> {to}");
            let notice = notice_for(&updated);
            Ok((updated, vec![notice]))
        })
        .await
    }

    /// Cancel a pending or approved reservation, releasing its interval.
    pub async fn cancel(&self, id: Ulid, reason: &str) -> Result<Reservation, EngineError> {
        self.transition(id, Status::Cancelled, TransitionMeta::with_reason(reason))
            .await
    }

    /// Record the catalog's policy for a resource. Affects later submissions only.
    pub async fn configure_resource(
        &self,
        resource_id: &str,
        policy: ResourcePolicy,
    ) -> Result<(), EngineError> {
        validate_id(resource_id, "missing resource id")?;
        let lock = self.lock_resource(resource_id).await;
        let event = Event::PolicySet {
            resource_id: resource_id.to_string(),
            policy,
        };
        self.commit(lock, event, |_| Ok(((), Vec::new()))).await
    }

    /// Approved reservations whose interval ended at or before `now`.
    /// Best effort: resources locked at the moment are skipped.
    pub fn collect_elapsed(&self, now: Ms) -> Vec<Ulid> {
        let mut elapsed = Vec::new();
        for entry in self.state.iter() {
            let rs = entry.value().clone();
            if let Ok(guard) = rs.try_read() {
                elapsed.extend(
                    guard
                        .index
                        .iter()
                        .filter(|r| r.status == Status::Approved && r.interval.end() <= now)
                        .map(|r| r.id),
                );
            }
        }
        elapsed
    }

    /// Rewrite the journal with just the records needed to rebuild current
    /// state, dropping terminal reservations settled more than
    /// `retention_ms` ago. Resources left with nothing to remember are
    /// forgotten entirely. Blocks every commit for its duration.
    pub async fn compact_wal(&self, retention_ms: Ms) -> Result<CompactionStats, EngineError> {
        let _gate = self.journal_gate.write().await;
        let cutoff = now_ms().saturating_sub(retention_ms);

        let mut resource_ids: Vec<ResourceId> = self.state.iter().map(|e| e.key().clone()).collect();
        resource_ids.sort();

        let mut stats = CompactionStats::default();
        let mut events = Vec::new();
        let mut emptied = Vec::new();
        for rid in &resource_ids {
            let Some(handle) = self.get_resource(rid) else {
                continue;
            };
            let mut guard = handle.write().await;
            for pruned in guard.prune_settled(cutoff) {
                self.locator.remove(&pruned);
                stats.pruned += 1;
            }
            if guard.is_empty() && !guard.configured {
                emptied.push(rid.clone());
                continue;
            }
            events.extend(guard.snapshot_events());
            stats.resources += 1;
        }
        stats.records = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        // Safe while the gate is held: lock_resource looks handles up only
        // after taking it.
        for rid in &emptied {
            self.state.remove(rid);
        }
        metrics::gauge!(crate::observability::RESOURCES_TRACKED).set(self.state.len() as f64);
        metrics::counter!(COMPACTIONS_TOTAL).increment(1);
        tracing::info!(
            "compacted journal: {} resource(s), {} record(s), {} pruned, {} resource(s) dropped",
            stats.resources,
            stats.records,
            stats.pruned,
            emptied.len()
        );
        Ok(stats)
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
