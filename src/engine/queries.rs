//! Read-only views. Everything here is an advisory snapshot taken under a
//! shared read guard: good for showing a calendar, never a substitute for
//! the guarded check a mutation performs before committing.

use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let resource_id = self
            .get_resource_for_reservation(&id)
            .ok_or(EngineError::NotFound(id))?;
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        guard.get(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Live reservations on a resource, ordered by start.
    pub async fn list_active(&self, resource_id: &str) -> Vec<Reservation> {
        let Some(rs) = self.get_resource(resource_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        guard.index.iter().cloned().collect()
    }

    /// Requests parked after colliding at submission, oldest first.
    pub async fn list_contested(&self, resource_id: &str) -> Vec<Reservation> {
        let Some(rs) = self.get_resource(resource_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        guard.contested.values().cloned().collect()
    }

    /// Every reservation the engine still remembers for a resource.
    pub async fn list_reservations(&self, resource_id: &str) -> Vec<Reservation> {
        let Some(rs) = self.get_resource(resource_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        let mut all: Vec<Reservation> = guard.all().cloned().collect();
        all.sort_by_key(|r| (r.interval, r.id));
        all
    }

    /// Live reservations overlapping `interval`, optionally ignoring one.
    pub async fn find_overlapping(
        &self,
        resource_id: &str,
        interval: Interval,
        exclude: Option<Ulid>,
    ) -> Vec<Reservation> {
        let Some(rs) = self.get_resource(resource_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        guard.index.find_overlapping(&interval, exclude)
    }

    pub async fn resource_policy(&self, resource_id: &str) -> ResourcePolicy {
        match self.get_resource(resource_id) {
            Some(rs) => rs.read().await.policy,
            None => self.settings.default_policy,
        }
    }

    pub fn list_resources(&self) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self.state.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}
