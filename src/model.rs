use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::*;

/// Unix milliseconds. Only used for `created_at`, never by the rules.
pub type Ms = i64;

/// Opaque identifier, always assigned by the store.
pub type ReservationId = Ulid;

/// Rejected form input. Each variant carries the raw text that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Portal(String),
    Floor(String),
    Door(String),
    Date(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Portal(s) => write!(f, "portal must be 1, 2 or 3 (got {s:?})"),
            ParseError::Floor(s) => {
                write!(f, "floor must be between {MIN_FLOOR} and {MAX_FLOOR} (got {s:?})")
            }
            ParseError::Door(s) => write!(f, "door must be A or B (got {s:?})"),
            ParseError::Date(s) => write!(
                f,
                "date must be YYYY-MM-DD between {MIN_VALID_YEAR} and {MAX_VALID_YEAR} (got {s:?})"
            ),
        }
    }
}

impl std::error::Error for ParseError {}

// ── Apartment identity ───────────────────────────────────────────

/// Building entrance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Portal {
    One,
    Two,
    Three,
}

impl Portal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Portal::One => "1",
            Portal::Two => "2",
            Portal::Three => "3",
        }
    }
}

impl FromStr for Portal {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(Portal::One),
            "2" => Ok(Portal::Two),
            "3" => Ok(Portal::Three),
            _ => Err(ParseError::Portal(s.to_string())),
        }
    }
}

impl TryFrom<String> for Portal {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Portal> for String {
    fn from(p: Portal) -> Self {
        p.as_str().to_string()
    }
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Floor number in `[MIN_FLOOR, MAX_FLOOR]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Floor(u8);

impl Floor {
    pub fn new(n: u8) -> Result<Self, ParseError> {
        if (MIN_FLOOR..=MAX_FLOOR).contains(&n) {
            Ok(Floor(n))
        } else {
            Err(ParseError::Floor(n.to_string()))
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl FromStr for Floor {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u8 = s
            .trim()
            .parse()
            .map_err(|_| ParseError::Floor(s.to_string()))?;
        Floor::new(n)
    }
}

impl TryFrom<u8> for Floor {
    type Error = ParseError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Floor::new(n)
    }
}

impl From<Floor> for u8 {
    fn from(f: Floor) -> Self {
        f.0
    }
}

impl fmt::Display for Floor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Door on a landing. Parsed case-insensitively; always held uppercase, so
/// `"a"` and `"A"` are the same door everywhere downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Door {
    A,
    B,
}

impl Door {
    pub fn as_str(&self) -> &'static str {
        match self {
            Door::A => "A",
            Door::B => "B",
        }
    }
}

impl FromStr for Door {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Door::A),
            "B" => Ok(Door::B),
            _ => Err(ParseError::Door(s.to_string())),
        }
    }
}

impl TryFrom<String> for Door {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Door> for String {
    fn from(d: Door) -> Self {
        d.as_str().to_string()
    }
}

impl fmt::Display for Door {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `(portal, floor, door)` triple the weekly quota is counted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Apartment {
    pub portal: Portal,
    pub floor: Floor,
    pub door: Door,
}

impl Apartment {
    pub fn new(portal: Portal, floor: Floor, door: Door) -> Self {
        Self { portal, floor, door }
    }

    /// Parse the three raw form fields.
    pub fn parse(portal: &str, floor: &str, door: &str) -> Result<Self, ParseError> {
        Ok(Self {
            portal: portal.parse()?,
            floor: floor.parse()?,
            door: door.parse()?,
        })
    }
}

impl fmt::Display for Apartment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Portal {}, {}{}", self.portal, self.floor, self.door)
    }
}

/// Parse a `YYYY-MM-DD` calendar day inside the accepted year range.
pub fn parse_date(s: &str) -> Result<NaiveDate, ParseError> {
    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| ParseError::Date(s.to_string()))?;
    if !(MIN_VALID_YEAR..=MAX_VALID_YEAR).contains(&date.year()) {
        return Err(ParseError::Date(s.to_string()));
    }
    Ok(date)
}

// ── Reservation ──────────────────────────────────────────────────

/// Only one state exists; cancellation deletes the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    #[default]
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: ReservationId,
    pub portal: Portal,
    pub floor: Floor,
    pub door: Door,
    pub date: NaiveDate,
    pub status: ReservationStatus,
    pub created_at: Ms,
}

impl Reservation {
    pub fn from_fields(id: ReservationId, fields: ReservationFields) -> Self {
        Self {
            id,
            portal: fields.portal,
            floor: fields.floor,
            door: fields.door,
            date: fields.date,
            status: fields.status,
            created_at: fields.created_at,
        }
    }

    pub fn apartment(&self) -> Apartment {
        Apartment::new(self.portal, self.floor, self.door)
    }
}

/// Insert payload handed to a store: every attribute except the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationFields {
    pub portal: Portal,
    pub floor: Floor,
    pub door: Door,
    pub date: NaiveDate,
    pub status: ReservationStatus,
    pub created_at: Ms,
}

/// What the booking form submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewReservation {
    pub apartment: Apartment,
    pub date: NaiveDate,
}

impl NewReservation {
    pub fn new(apartment: Apartment, date: NaiveDate) -> Self {
        Self { apartment, date }
    }

    /// Stamp status and creation time.
    pub fn into_fields(self, created_at: Ms) -> ReservationFields {
        ReservationFields {
            portal: self.apartment.portal,
            floor: self.apartment.floor,
            door: self.apartment.door,
            date: self.date,
            status: ReservationStatus::Confirmed,
            created_at,
        }
    }
}

/// WAL record format. Flat, one variant per mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationInserted { reservation: Reservation },
    ReservationDeleted { id: ReservationId },
}
