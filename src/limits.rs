/// Lowest floor number an apartment can be on.
pub const MIN_FLOOR: u8 = 1;

/// Highest floor number an apartment can be on.
pub const MAX_FLOOR: u8 = 10;

/// Max reservations one apartment may hold inside a single Monday-start week.
pub const WEEKLY_QUOTA: usize = 2;

/// Max live reservations a store accepts.
pub const MAX_RESERVATIONS: usize = 100_000;

/// Accepted year range for reservation dates.
pub const MIN_VALID_YEAR: i32 = 2000;
pub const MAX_VALID_YEAR: i32 = 2199;

/// Largest WAL frame payload accepted on write or replay.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;
