//! Reservation rules: pure functions over an already-fetched snapshot.
//!
//! Nothing in here performs I/O, suspends, or keeps state between calls.

mod conflict;
mod error;
mod week;

pub use conflict::{is_date_taken, validate_create, weekly_apartment_count};
pub use error::ConflictKind;
pub use week::{week_window_of, WeekWindow};
