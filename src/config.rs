use std::path::PathBuf;
use std::time::Duration;

use crate::grid::{Granularity, GridWindow};
use crate::limits::*;
use crate::model::Pk;

/// Runtime settings for the allocation binary, read from `SEASONAL_*`
/// environment variables. Unparsable values fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Round snapshot (JSON) served by the in-memory backend.
    pub data: PathBuf,
    /// Persisted selection query string to restore.
    pub selection: String,
    /// Reservation unit to allocate; the first unit in the snapshot if unset.
    pub reservation_unit: Option<Pk>,
    pub metrics_port: Option<u16>,
    /// Background refresh period; polling is off when unset and falls back
    /// to the default period when set to garbage.
    pub poll_interval: Option<Duration>,
    pub grid: GridWindow,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let first_hour = parse("SEASONAL_GRID_FIRST_HOUR")
            .and_then(|s| s.parse().ok())
            .unwrap_or(GRID_FIRST_HOUR);
        let last_hour = parse("SEASONAL_GRID_LAST_HOUR")
            .and_then(|s| s.parse().ok())
            .unwrap_or(GRID_LAST_HOUR);
        let granularity = match parse("SEASONAL_GRID_STEP").as_deref() {
            Some("30") => Granularity::HalfHour,
            _ => Granularity::Hour,
        };
        let grid = GridWindow::new(first_hour, last_hour, granularity).unwrap_or_default();

        let poll_interval = parse("SEASONAL_POLL_SECS").map(|s| {
            let secs = s
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
            Duration::from_secs(secs)
        });

        Self {
            data: parse("SEASONAL_DATA")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./round.json")),
            selection: parse("SEASONAL_SELECTION").unwrap_or_default(),
            reservation_unit: parse("SEASONAL_UNIT").and_then(|s| s.parse().ok()),
            metrics_port: parse("SEASONAL_METRICS_PORT").and_then(|s| s.parse().ok()),
            poll_interval,
            grid,
        }
    }
}
