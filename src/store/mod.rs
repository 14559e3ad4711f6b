//! The persistence collaborator: an opaque-id collection of reservations.
//!
//! The trait is the seam the service talks to. It offers no conditional
//! write, so two processes validating against stale snapshots can both
//! insert; the service documents that gap rather than hiding it.

mod compactor;
mod memory;
mod wal_store;

pub use compactor::compact_if_needed;
pub use memory::InMemoryStore;
pub use wal_store::WalStore;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ulid::Generator;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No document with this id.
    NotFound(ReservationId),
    /// Transport or storage failure. Retryable.
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "not found: {id}"),
            StoreError::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Full scan in the store's natural (insertion) order.
    async fn list(&self) -> Result<Vec<Reservation>, StoreError>;

    /// Persist a new document and return the id the store assigned to it.
    async fn insert(&self, fields: ReservationFields) -> Result<ReservationId, StoreError>;

    /// Remove a document. `StoreError::NotFound` if it is already gone.
    async fn delete_by_id(&self, id: ReservationId) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: ReservationStore + ?Sized> ReservationStore for Arc<T> {
    async fn list(&self) -> Result<Vec<Reservation>, StoreError> {
        (**self).list().await
    }

    async fn insert(&self, fields: ReservationFields) -> Result<ReservationId, StoreError> {
        (**self).insert(fields).await
    }

    async fn delete_by_id(&self, id: ReservationId) -> Result<(), StoreError> {
        (**self).delete_by_id(id).await
    }
}

/// Monotonic ids, so sorting by id gives insertion order.
pub(crate) struct IdGenerator(Mutex<Generator>);

impl IdGenerator {
    pub(crate) fn new() -> Self {
        Self(Mutex::new(Generator::new()))
    }

    pub(crate) fn next(&self) -> Result<ReservationId, StoreError> {
        let mut generator = self
            .0
            .lock()
            .map_err(|_| StoreError::Unavailable("id generator poisoned".into()))?;
        generator
            .generate()
            .map_err(|e| StoreError::Unavailable(format!("id generation failed: {e}")))
    }
}
