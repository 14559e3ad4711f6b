//! Which days the booking form may be opened for.
//!
//! This is a presentation policy, not a reservation rule: the service never
//! consults it. The display week start is independent of the quota week, which
//! always starts on Monday (see `rules::week_window_of`).

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate};

use crate::model::Reservation;
use crate::rules::is_date_taken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayWeekStart {
    #[default]
    Monday,
    Sunday,
}

impl FromStr for DisplayWeekStart {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monday" | "mon" => Ok(DisplayWeekStart::Monday),
            "sunday" | "sun" => Ok(DisplayWeekStart::Sunday),
            other => Err(format!("unknown week start: {other}")),
        }
    }
}

/// First and last day of the display week containing `today`.
pub fn display_week(today: NaiveDate, week_start: DisplayWeekStart) -> (NaiveDate, NaiveDate) {
    let offset = match week_start {
        DisplayWeekStart::Monday => today.weekday().num_days_from_monday(),
        DisplayWeekStart::Sunday => today.weekday().num_days_from_sunday(),
    };
    let start = today
        .checked_sub_days(Days::new(u64::from(offset)))
        .unwrap_or(NaiveDate::MIN);
    let end = start.checked_add_days(Days::new(6)).unwrap_or(NaiveDate::MAX);
    (start, end)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionError {
    PastDate(NaiveDate),
    OutsideCurrentWeek {
        date: NaiveDate,
        week_start: NaiveDate,
        week_end: NaiveDate,
    },
    AlreadyReserved(NaiveDate),
}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionError::PastDate(d) => write!(f, "{d} is in the past"),
            SelectionError::OutsideCurrentWeek {
                date,
                week_start,
                week_end,
            } => write!(
                f,
                "{date} is outside the current week ({week_start} .. {week_end})"
            ),
            SelectionError::AlreadyReserved(d) => write!(f, "{d} is already reserved"),
        }
    }
}

impl std::error::Error for SelectionError {}

/// Past days first, then the current display week, then an existing booking.
pub fn check_selectable(
    reservations: &[Reservation],
    date: NaiveDate,
    today: NaiveDate,
    week_start: DisplayWeekStart,
) -> Result<(), SelectionError> {
    if date < today {
        return Err(SelectionError::PastDate(date));
    }
    let (start, end) = display_week(today, week_start);
    if date < start || date > end {
        return Err(SelectionError::OutsideCurrentWeek {
            date,
            week_start: start,
            week_end: end,
        });
    }
    if is_date_taken(reservations, date) {
        return Err(SelectionError::AlreadyReserved(date));
    }
    Ok(())
}
