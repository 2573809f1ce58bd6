use crate::model::Minutes;

/// First hour shown in the weekly grid.
pub const GRID_FIRST_HOUR: u8 = 7;
/// Start hour of the last grid cell; the 23:00-00:00 cell closes the day.
pub const GRID_LAST_HOUR: u8 = 23;

/// Selection keys always step by half an hour.
pub const SELECTION_STEP: Minutes = 30;

/// Longest `day-hour-minute` key accepted from untrusted input.
pub const MAX_CELL_KEY_LEN: usize = 16;
/// Longest persisted query string decoded.
pub const MAX_QUERY_STRING_LEN: usize = 2048;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
