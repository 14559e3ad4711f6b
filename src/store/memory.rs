use async_trait::async_trait;
use dashmap::DashMap;

use crate::limits::MAX_RESERVATIONS;
use crate::model::*;

use super::{IdGenerator, ReservationStore, StoreError};

/// Process-local store. Nothing survives a restart.
pub struct InMemoryStore {
    reservations: DashMap<ReservationId, Reservation>,
    ids: IdGenerator,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            reservations: DashMap::new(),
            ids: IdGenerator::new(),
        }
    }

    /// Seed with already-stored documents, ids included.
    pub fn with_reservations(reservations: impl IntoIterator<Item = Reservation>) -> Self {
        let store = Self::new();
        for r in reservations {
            store.reservations.insert(r.id, r);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    async fn list(&self) -> Result<Vec<Reservation>, StoreError> {
        let mut all: Vec<Reservation> = self.reservations.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|r| r.id);
        Ok(all)
    }

    async fn insert(&self, fields: ReservationFields) -> Result<ReservationId, StoreError> {
        if self.reservations.len() >= MAX_RESERVATIONS {
            return Err(StoreError::Unavailable("limit exceeded: too many reservations".into()));
        }
        let id = self.ids.next()?;
        self.reservations.insert(id, Reservation::from_fields(id, fields));
        Ok(id)
    }

    async fn delete_by_id(&self, id: ReservationId) -> Result<(), StoreError> {
        self.reservations
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}
