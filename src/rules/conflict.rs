use chrono::NaiveDate;

use crate::limits::WEEKLY_QUOTA;
use crate::model::*;

use super::{week_window_of, ConflictKind};

/// True iff some reservation sits on exactly `date`.
pub fn is_date_taken(reservations: &[Reservation], date: NaiveDate) -> bool {
    reservations.iter().any(|r| r.date == date)
}

/// Reservations held by `apartment` inside the Monday-start week of
/// `reference_date`. Door comparison is case-insensitive by construction:
/// `Door` only exists in its uppercase form.
pub fn weekly_apartment_count(
    reservations: &[Reservation],
    apartment: &Apartment,
    reference_date: NaiveDate,
) -> usize {
    let week = week_window_of(reference_date);
    reservations
        .iter()
        .filter(|r| r.apartment() == *apartment && week.contains(r.date))
        .count()
}

/// Date exclusivity first, then the weekly quota.
pub fn validate_create(
    reservations: &[Reservation],
    candidate: &NewReservation,
) -> Result<(), ConflictKind> {
    if is_date_taken(reservations, candidate.date) {
        return Err(ConflictKind::DateAlreadyReserved(candidate.date));
    }
    if weekly_apartment_count(reservations, &candidate.apartment, candidate.date) >= WEEKLY_QUOTA {
        return Err(ConflictKind::WeeklyQuotaExceeded {
            apartment: candidate.apartment,
            week: week_window_of(candidate.date),
        });
    }
    Ok(())
}
