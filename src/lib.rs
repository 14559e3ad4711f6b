//! Booking rules and storage for a single shared room, reserved one calendar
//! day at a time.
//!
//! Two invariants hold over every stored reservation: at most one per date,
//! and at most [`limits::WEEKLY_QUOTA`] per apartment per Monday-start week.

pub mod calendar;
pub mod config;
pub mod limits;
pub mod model;
pub mod observability;
pub mod rules;
pub mod service;
pub mod store;
pub mod wal;

pub use model::*;
pub use rules::{ConflictKind, WeekWindow};
pub use service::{ReservationService, ServiceError};
pub use store::{InMemoryStore, ReservationStore, StoreError, WalStore};
