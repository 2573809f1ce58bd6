use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grid::Grid;
use crate::limits::{MAX_CELL_KEY_LEN, SELECTION_STEP};
use crate::model::*;

// ── Cell keys ─────────────────────────────────────────────────────

/// A half-hour cell on one weekday, written `day-hour-minute` with the
/// Monday-first day index (`"1-14-30"` is Tuesday 14:30).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub day: Weekday,
    pub hour: u8,
    pub minute: u8,
}

impl CellKey {
    pub fn new(day: Weekday, hour: u8, minute: u8) -> Option<Self> {
        if hour > 23 || (minute != 0 && minute != 30) {
            return None;
        }
        Some(Self { day, hour, minute })
    }

    /// `None` unless `minutes` is a half-hour boundary inside the day.
    pub fn from_minutes(day: Weekday, minutes: Minutes) -> Option<Self> {
        if minutes >= MINUTES_PER_DAY || minutes % SELECTION_STEP != 0 {
            return None;
        }
        Self::new(day, (minutes / 60) as u8, (minutes % 60) as u8)
    }

    /// Parse a persisted key. Keys may come from a hand-edited query string,
    /// so anything malformed is `None`.
    pub fn parse(key: &str) -> Option<Self> {
        if key.len() > MAX_CELL_KEY_LEN {
            return None;
        }
        let mut parts = key.split('-');
        let day: usize = parts.next()?.parse().ok()?;
        let hour: u8 = parts.next()?.parse().ok()?;
        let minute: u8 = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Self::new(Weekday::from_index(day)?, hour, minute)
    }

    pub fn start(&self) -> Minutes {
        Minutes::from(self.hour) * 60 + Minutes::from(self.minute)
    }

    pub fn end(&self) -> Minutes {
        self.start() + SELECTION_STEP
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.day.index(), self.hour, self.minute)
    }
}

/// Every half-hour key from `begin` to `end` inclusive, in either order.
/// Keys on different days yield nothing.
pub fn expand_keys(begin: CellKey, end: CellKey) -> Vec<CellKey> {
    if begin.day != end.day {
        return Vec::new();
    }
    let (lo, hi) = if begin <= end { (begin, end) } else { (end, begin) };
    (lo.start()..=hi.start())
        .step_by(SELECTION_STEP as usize)
        .filter_map(|m| CellKey::from_minutes(lo.day, m))
        .collect()
}

/// String form of [`expand_keys`]; an unparsable endpoint yields nothing.
pub fn expand_selection(begin: &str, end: &str) -> Vec<CellKey> {
    match (CellKey::parse(begin), CellKey::parse(end)) {
        (Some(b), Some(e)) => expand_keys(b, e),
        _ => Vec::new(),
    }
}

// ── Selection ─────────────────────────────────────────────────────

/// Non-empty, contiguous, ascending run of half-hour cells on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    keys: Vec<CellKey>,
}

impl Selection {
    /// Sorts and de-duplicates. `None` when empty, spread across days, or
    /// not contiguous.
    pub fn new(keys: impl IntoIterator<Item = CellKey>) -> Option<Self> {
        let mut keys: Vec<CellKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();
        let first = *keys.first()?;
        if keys.iter().any(|k| k.day != first.day) {
            return None;
        }
        if keys.windows(2).any(|w| w[0].end() != w[1].start()) {
            return None;
        }
        Some(Self { keys })
    }

    /// Expand a stored window back into cells.
    pub fn from_window(day: Weekday, begin: TimeOfDay, end: TimeOfDay) -> Option<Self> {
        let start = begin.begin_minutes();
        let stop = end.end_minutes();
        if start >= stop {
            return None;
        }
        Self::new(
            (start..stop)
                .step_by(SELECTION_STEP as usize)
                .filter_map(|m| CellKey::from_minutes(day, m)),
        )
    }

    pub fn day(&self) -> Weekday {
        self.keys[0].day
    }

    pub fn keys(&self) -> &[CellKey] {
        &self.keys
    }

    pub fn first(&self) -> CellKey {
        self.keys[0]
    }

    pub fn last(&self) -> CellKey {
        self.keys[self.keys.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &CellKey) -> bool {
        self.keys.binary_search(key).is_ok()
    }

    /// `(day, begin, end)` where end is the last cell plus half an hour.
    pub fn window(&self) -> SelectionWindow {
        SelectionWindow {
            day: self.day(),
            begin: TimeOfDay::from_minutes(self.first().start()),
            end: TimeOfDay::from_minutes(self.last().end()),
        }
    }
}

/// The canonical time range of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionWindow {
    pub day: Weekday,
    pub begin: TimeOfDay,
    pub end: TimeOfDay,
}

impl SelectionWindow {
    pub fn duration_minutes(&self) -> Minutes {
        self.span().duration()
    }
}

impl DayTime for SelectionWindow {
    fn weekday(&self) -> Weekday {
        self.day
    }
    fn begin(&self) -> TimeOfDay {
        self.begin
    }
    fn end(&self) -> TimeOfDay {
        self.end
    }
}

impl fmt::Display for SelectionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}-{}", self.day, self.begin, self.end)
    }
}

// ── Grid → ranges ─────────────────────────────────────────────────

/// Turn painted cells back into time ranges.
///
/// Single greedy left-to-right fold per day: a cell extends the previous
/// range only when it starts exactly where that range ends and has the same
/// priority. Nothing is re-sorted.
pub fn selection_to_time_ranges(grid: &Grid) -> Vec<SuitableTimeRange> {
    let step = grid.window().step();
    let mut ranges = Vec::new();

    for day in Weekday::ALL {
        let mut merged: Vec<(Span, Priority)> = Vec::new();
        for cell in grid.day(day) {
            let Some(priority) = cell.state.priority() else { continue };
            let unit = Span::new(cell.start(), cell.start() + step);
            if let Some((last, last_priority)) = merged.last_mut()
                && last.end == unit.start
                && *last_priority == priority
            {
                last.end = unit.end;
                continue;
            }
            merged.push((unit, priority));
        }

        ranges.extend(merged.into_iter().map(|(span, priority)| SuitableTimeRange {
            pk: 0,
            day_of_the_week: day,
            begin_time: TimeOfDay::from_minutes(span.start),
            end_time: TimeOfDay::from_minutes(span.end),
            priority,
        }));
    }

    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{build_grid, CellState};

    fn key(day: usize, hour: u8, minute: u8) -> CellKey {
        CellKey::new(Weekday::from_index(day).unwrap(), hour, minute).unwrap()
    }

    fn paint(grid: &mut Grid, day: Weekday, from: u8, to: u8, state: CellState) {
        let sel = Selection::from_window(
            day,
            TimeOfDay::new(from, 0).unwrap(),
            TimeOfDay::new(to, 0).unwrap(),
        )
        .unwrap();
        grid.paint_selection(&sel, state);
    }

    // ── keys ─────────────────────────────────────────────

    #[test]
    fn key_parse_and_display() {
        let k = CellKey::parse("1-14-30").unwrap();
        assert_eq!(k, key(1, 14, 30));
        assert_eq!(k.to_string(), "1-14-30");
        assert_eq!(k.start(), 14 * 60 + 30);
    }

    #[test]
    fn key_parse_rejects_malformed() {
        for bad in [
            "", "1", "1-2", "1-2-3-4", "a-9-0", "7-9-0", "1-24-0", "1-9-15", "1-9-60", "-1-9-0",
            "1--9-0", "1-9-0000000000000", " 1-9-0",
        ] {
            assert_eq!(CellKey::parse(bad), None, "{bad:?} should be rejected");
        }
    }

    #[test]
    fn expand_same_day() {
        let keys = expand_selection("1-9-0", "1-10-30");
        assert_eq!(keys, vec![key(1, 9, 0), key(1, 9, 30), key(1, 10, 0), key(1, 10, 30)]);
    }

    #[test]
    fn expand_reversed_endpoints() {
        assert_eq!(expand_selection("1-10-0", "1-9-0"), expand_selection("1-9-0", "1-10-0"));
    }

    #[test]
    fn expand_single_key() {
        assert_eq!(expand_selection("3-23-30", "3-23-30"), vec![key(3, 23, 30)]);
    }

    #[test]
    fn expand_across_days_is_empty() {
        assert!(expand_selection("1-9-0", "2-10-0").is_empty());
    }

    #[test]
    fn expand_invalid_endpoint_is_empty() {
        assert!(expand_selection("1-9-15", "1-10-0").is_empty());
        assert!(expand_selection("1-9-0", "garbage").is_empty());
    }

    // ── selection ────────────────────────────────────────

    #[test]
    fn selection_sorts_and_dedups() {
        let sel = Selection::new([key(2, 10, 0), key(2, 9, 30), key(2, 10, 0)]).unwrap();
        assert_eq!(sel.keys(), &[key(2, 9, 30), key(2, 10, 0)]);
        assert_eq!(sel.day(), Weekday::Wednesday);
        assert!(sel.contains(&key(2, 10, 0)));
        assert!(!sel.contains(&key(2, 10, 30)));
    }

    #[test]
    fn selection_rejects_mixed_days_gaps_and_empty() {
        assert!(Selection::new([key(1, 9, 0), key(2, 9, 30)]).is_none());
        assert!(Selection::new([key(1, 9, 0), key(1, 10, 0)]).is_none());
        assert!(Selection::new(Vec::new()).is_none());
    }

    #[test]
    fn window_ends_half_hour_after_last_key() {
        let sel = Selection::new(expand_selection("1-9-0", "1-9-30")).unwrap();
        let w = sel.window();
        assert_eq!(w.day, Weekday::Tuesday);
        assert_eq!(w.begin.to_string(), "09:00");
        assert_eq!(w.end.to_string(), "10:00");
        assert_eq!(w.duration_minutes(), 60);
        assert_eq!(w.to_string(), "TUESDAY 09:00-10:00");
    }

    #[test]
    fn window_at_end_of_day() {
        let sel = Selection::new(expand_selection("4-23-0", "4-23-30")).unwrap();
        let w = sel.window();
        assert_eq!(w.end, TimeOfDay::END_OF_DAY);
        assert_eq!(w.end.to_string(), "00:00");
        assert_eq!(w.span().end, MINUTES_PER_DAY);
    }

    #[test]
    fn from_window_round_trips() {
        let sel = Selection::from_window(
            Weekday::Sunday,
            TimeOfDay::new(22, 0).unwrap(),
            TimeOfDay::MIDNIGHT,
        )
        .unwrap();
        assert_eq!(sel.len(), 4);
        assert_eq!(sel.window().begin, TimeOfDay::new(22, 0).unwrap());
        assert_eq!(sel.window().end.end_minutes(), MINUTES_PER_DAY);
        assert!(Selection::from_window(Weekday::Sunday, TimeOfDay::new(10, 0).unwrap(), TimeOfDay::new(10, 0).unwrap()).is_none());
    }

    // ── grid → ranges ────────────────────────────────────

    #[test]
    fn contiguous_selection_yields_one_range() {
        let mut grid = build_grid(&Default::default(), &[]);
        paint(&mut grid, Weekday::Tuesday, 14, 15, CellState::Primary);
        let ranges = selection_to_time_ranges(&grid);
        assert_eq!(ranges.len(), 1);
        let r = &ranges[0];
        assert_eq!(r.day_of_the_week, Weekday::Tuesday);
        assert_eq!(r.begin_time.to_string(), "14:00");
        assert_eq!(r.end_time.to_string(), "15:00");
        assert_eq!(r.priority, Priority::Primary);
    }

    #[test]
    fn gaps_are_not_merged() {
        let mut grid = build_grid(&Default::default(), &[]);
        paint(&mut grid, Weekday::Monday, 8, 9, CellState::Primary);
        paint(&mut grid, Weekday::Monday, 11, 12, CellState::Primary);
        let ranges = selection_to_time_ranges(&grid);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].end_time.to_string(), "09:00");
        assert_eq!(ranges[1].begin_time.to_string(), "11:00");
    }

    #[test]
    fn mixed_priorities_split_at_boundary() {
        let mut grid = build_grid(&Default::default(), &[]);
        paint(&mut grid, Weekday::Monday, 8, 10, CellState::Primary);
        paint(&mut grid, Weekday::Monday, 10, 12, CellState::Secondary);
        let ranges = selection_to_time_ranges(&grid);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].priority, Priority::Primary);
        assert_eq!(ranges[0].end_time.to_string(), "10:00");
        assert_eq!(ranges[1].priority, Priority::Secondary);
        assert_eq!(ranges[1].begin_time.to_string(), "10:00");
        assert_eq!(ranges[1].end_time.to_string(), "12:00");
    }

    #[test]
    fn selection_through_last_cell_serializes_midnight() {
        let mut grid = build_grid(&Default::default(), &[]);
        let sel = Selection::new(expand_selection("5-22-0", "5-23-30")).unwrap();
        grid.paint_selection(&sel, CellState::Secondary);
        let ranges = selection_to_time_ranges(&grid);
        assert_eq!(ranges.len(), 1);
        let json = serde_json::to_value(&ranges[0]).unwrap();
        assert_eq!(json["endTime"], "00:00");
        assert_eq!(json["beginTime"], "22:00");
    }

    #[test]
    fn ranges_follow_day_order() {
        let mut grid = build_grid(&Default::default(), &[]);
        paint(&mut grid, Weekday::Sunday, 9, 10, CellState::Primary);
        paint(&mut grid, Weekday::Monday, 9, 10, CellState::Primary);
        let days: Vec<Weekday> = selection_to_time_ranges(&grid)
            .iter()
            .map(|r| r.day_of_the_week)
            .collect();
        assert_eq!(days, vec![Weekday::Monday, Weekday::Sunday]);
    }

    #[test]
    fn empty_grid_yields_nothing() {
        let grid = build_grid(&Default::default(), &[]);
        assert!(selection_to_time_ranges(&grid).is_empty());
    }
}
