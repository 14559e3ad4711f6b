use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime};

/// One Monday-start week, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekWindow {
    /// Monday.
    pub start: NaiveDate,
    /// The Sunday after `start`.
    pub end: NaiveDate,
}

impl WeekWindow {
    /// Monday 00:00:00.000.
    pub fn starts_at(&self) -> NaiveDateTime {
        self.start.and_time(NaiveTime::MIN)
    }

    /// Sunday 23:59:59.999.
    pub fn ends_at(&self) -> NaiveDateTime {
        self.end
            .and_hms_milli_opt(23, 59, 59, 999)
            .expect("23:59:59.999 is a valid time of day")
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// The window seven days later.
    pub fn next(&self) -> WeekWindow {
        week_window_of(self.end.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX))
    }
}

/// The quota week containing `date`. Always starts on Monday, whatever week
/// start the calendar display uses. Clamped at the ends of the calendar.
pub fn week_window_of(date: NaiveDate) -> WeekWindow {
    let from_monday = u64::from(date.weekday().num_days_from_monday());
    let start = date
        .checked_sub_days(Days::new(from_monday))
        .unwrap_or(NaiveDate::MIN);
    let end = date
        .checked_add_days(Days::new(6 - from_monday))
        .unwrap_or(NaiveDate::MAX);
    WeekWindow { start, end }
}
