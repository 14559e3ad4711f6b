use std::path::PathBuf;

use tracing::warn;

use crate::calendar::DisplayWeekStart;

/// Settings read from `SALA_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub week_start: DisplayWeekStart,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            metrics_port: None,
            week_start: DisplayWeekStart::Monday,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let week_start = match lookup("SALA_WEEK_START") {
            Some(s) => s.parse().unwrap_or_else(|e| {
                warn!("SALA_WEEK_START: {e}, using monday");
                defaults.week_start
            }),
            None => defaults.week_start,
        };
        Self {
            data_dir: lookup("SALA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            compact_threshold: lookup("SALA_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            metrics_port: lookup("SALA_METRICS_PORT").and_then(|s| s.parse().ok()),
            week_start,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }
}
