use chrono::NaiveDate;

use crate::model::Apartment;

use super::WeekWindow;

/// Why a candidate reservation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Someone already holds the room on this day.
    DateAlreadyReserved(NaiveDate),
    /// The apartment already used its quota in this Monday-start week.
    WeeklyQuotaExceeded {
        apartment: Apartment,
        week: WeekWindow,
    },
}

impl ConflictKind {
    /// Short stable label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ConflictKind::DateAlreadyReserved(_) => "date_already_reserved",
            ConflictKind::WeeklyQuotaExceeded { .. } => "weekly_quota_exceeded",
        }
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::DateAlreadyReserved(date) => {
                write!(f, "date already reserved: {date}")
            }
            ConflictKind::WeeklyQuotaExceeded { apartment, week } => write!(
                f,
                "weekly quota exceeded for {apartment} in week {} .. {}",
                week.start, week.end
            ),
        }
    }
}

impl std::error::Error for ConflictKind {}
