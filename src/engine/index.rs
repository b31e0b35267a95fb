use ulid::Ulid;

use crate::model::{Interval, Reservation};

/// Live reservations of one resource, sorted by `interval.start`.
///
/// Entries are pairwise non-overlapping, which is what lets an override or an
/// approval reason about "the" colliders of an interval. The mutating
/// primitives are only reachable from journal event application, which runs
/// with the resource's write guard held.
#[derive(Debug, Clone, Default)]
pub struct ConflictIndex {
    entries: Vec<Reservation>,
}

impl ConflictIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reservation> {
        self.entries.iter()
    }

    pub fn get(&self, id: Ulid) -> Option<&Reservation> {
        self.entries.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: Ulid) -> bool {
        self.get(id).is_some()
    }

    /// Entries whose interval overlaps `query`.
    /// Uses binary search to skip entries starting at or after `query.end`.
    pub fn overlapping<'a>(&'a self, query: &'a Interval) -> impl Iterator<Item = &'a Reservation> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .entries
            .partition_point(|r| r.interval.start() < query.end());
        self.entries[..right_bound]
            .iter()
            .filter(move |r| r.interval.end() > query.start())
    }

    /// Snapshot of the live reservations colliding with `query`, optionally
    /// ignoring one id (the reservation being re-validated). Empty means no
    /// conflict.
    pub fn find_overlapping(&self, query: &Interval, exclude: Option<Ulid>) -> Vec<Reservation> {
        self.overlapping(query)
            .filter(|r| Some(r.id) != exclude)
            .cloned()
            .collect()
    }

    /// Insert maintaining sort order by start.
    pub(super) fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .entries
            .partition_point(|r| r.interval.start() <= reservation.interval.start());
        self.entries.insert(pos, reservation);
    }

    pub(super) fn remove(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.entries.iter().position(|r| r.id == id)?;
        Some(self.entries.remove(pos))
    }

    /// Swap the entry `id` for `new`, keeping order. Returns the old entry.
    pub(super) fn replace(&mut self, id: Ulid, new: Reservation) -> Option<Reservation> {
        let old = self.remove(id)?;
        self.insert(new);
        Some(old)
    }
}
