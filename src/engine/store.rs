use std::collections::BTreeMap;

use ulid::Ulid;

use crate::model::*;

use super::index::ConflictIndex;

/// Everything the engine knows about one resource. One of these sits behind
/// each resource lock.
#[derive(Debug, Clone)]
pub struct ResourceState {
    pub id: ResourceId,
    /// Effective policy: the engine default until a `PolicySet` arrives.
    pub policy: ResourcePolicy,
    /// Whether `policy` was set explicitly. Only explicit policies survive
    /// compaction; the rest follow whatever default the engine runs with.
    pub configured: bool,
    /// Live reservations: uncontested pending plus approved.
    pub index: ConflictIndex,
    /// Pending requests parked after colliding at submission.
    pub contested: BTreeMap<Ulid, Reservation>,
    /// Terminal reservations kept for lookups until compaction prunes them.
    pub settled: BTreeMap<Ulid, Reservation>,
}

impl ResourceState {
    pub fn new(id: ResourceId, policy: ResourcePolicy) -> Self {
        Self {
            id,
            policy,
            configured: false,
            index: ConflictIndex::new(),
            contested: BTreeMap::new(),
            settled: BTreeMap::new(),
        }
    }

    pub fn get(&self, id: Ulid) -> Option<&Reservation> {
        self.index
            .get(id)
            .or_else(|| self.contested.get(&id))
            .or_else(|| self.settled.get(&id))
    }

    /// No reservations of any kind remain.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty() && self.contested.is_empty() && self.settled.is_empty()
    }

    /// Reservations that still count against the per-resource limit.
    pub fn open_count(&self) -> usize {
        self.index.len() + self.contested.len()
    }

    pub fn all(&self) -> impl Iterator<Item = &Reservation> {
        self.index
            .iter()
            .chain(self.contested.values())
            .chain(self.settled.values())
    }

    /// Apply a journal event. Caller holds the write guard.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::PolicySet { policy, .. } => {
                self.policy = *policy;
                self.configured = true;
            }
            Event::Recorded { reservation } => self.place(reservation.clone()),
            Event::Transitioned {
                id,
                status,
                at,
                reason,
                ..
            } => self.apply_transition(*id, *status, *at, reason.clone()),
            Event::Overridden {
                id, displaced, at, ..
            } => {
                for victim in displaced {
                    self.apply_transition(
                        *victim,
                        Status::Cancelled,
                        *at,
                        Some(OVERRIDDEN_REASON.to_string()),
                    );
                }
                if let Some(mut winner) = self.take(*id) {
                    winner.status = Status::Approved;
                    winner.status_changed_at = *at;
                    winner.contested = false;
                    winner.override_of.extend(displaced.iter().copied());
                    self.place(winner);
                } else {
                    tracing::warn!("override winner {id} missing on resource {}", self.id);
                }
            }
        }
    }

    fn apply_transition(&mut self, id: Ulid, status: Status, at: Ms, reason: Option<String>) {
        let update = |r: &mut Reservation| {
            r.status = status;
            r.status_changed_at = at;
            match status {
                Status::Declined => r.decline_reason = reason.clone(),
                Status::Cancelled => r.cancellation_reason = reason.clone(),
                Status::Approved => r.contested = false,
                Status::Pending | Status::Completed => {}
            }
        };

        // Pending → approved on an indexed entry stays in the index.
        if status.is_live()
            && let Some(current) = self.index.get(id)
        {
            let mut next = current.clone();
            update(&mut next);
            self.index.replace(id, next);
            return;
        }

        match self.take(id) {
            Some(mut r) => {
                update(&mut r);
                self.place(r);
            }
            None => tracing::warn!("transition for unknown reservation {id} on resource {}", self.id),
        }
    }

    fn take(&mut self, id: Ulid) -> Option<Reservation> {
        self.index
            .remove(id)
            .or_else(|| self.contested.remove(&id))
            .or_else(|| self.settled.remove(&id))
    }

    fn place(&mut self, reservation: Reservation) {
        if reservation.status.is_terminal() {
            self.settled.insert(reservation.id, reservation);
        } else if reservation.contested {
            self.contested.insert(reservation.id, reservation);
        } else {
            self.index.insert(reservation);
        }
    }

    /// Drop terminal reservations settled before `cutoff`. Returns their ids.
    pub fn prune_settled(&mut self, cutoff: Ms) -> Vec<Ulid> {
        let expired: Vec<Ulid> = self
            .settled
            .values()
            .filter(|r| r.status_changed_at < cutoff)
            .map(|r| r.id)
            .collect();
        for id in &expired {
            self.settled.remove(id);
        }
        expired
    }

    /// Minimal event list that recreates this state on replay.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::with_capacity(1 + self.open_count() + self.settled.len());
        if self.configured {
            events.push(Event::PolicySet {
                resource_id: self.id.clone(),
                policy: self.policy,
            });
        }
        for r in self.all() {
            events.push(Event::Recorded {
                reservation: r.clone(),
            });
        }
        events
    }
}
