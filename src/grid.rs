use std::fmt;

use serde::{Deserialize, Serialize};

use crate::limits::{GRID_FIRST_HOUR, GRID_LAST_HOUR};
use crate::model::*;
use crate::selection::{CellKey, Selection};

// ── Cells ─────────────────────────────────────────────────────────

/// Preference painted onto a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellState {
    None,
    Primary,
    Secondary,
}

impl CellState {
    pub fn priority(self) -> Option<Priority> {
        match self {
            CellState::None => None,
            CellState::Primary => Some(Priority::Primary),
            CellState::Secondary => Some(Priority::Secondary),
        }
    }
}

impl From<Priority> for CellState {
    fn from(p: Priority) -> Self {
        match p {
            Priority::Primary => CellState::Primary,
            Priority::Secondary => CellState::Secondary,
        }
    }
}

/// Opening-hours availability. Advisory only; selection is never blocked by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenState {
    Open,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub day: Weekday,
    pub hour: u8,
    pub minute: u8,
    pub state: CellState,
    pub open_state: OpenState,
}

impl Cell {
    pub fn start(&self) -> Minutes {
        Minutes::from(self.hour) * 60 + Minutes::from(self.minute)
    }

    pub fn key(&self) -> CellKey {
        CellKey {
            day: self.day,
            hour: self.hour,
            minute: self.minute,
        }
    }
}

// ── Window ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    Hour,
    HalfHour,
}

impl Granularity {
    pub fn minutes(self) -> Minutes {
        match self {
            Granularity::Hour => 60,
            Granularity::HalfHour => 30,
        }
    }
}

/// Display window of the weekly calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridWindow {
    first_hour: u8,
    last_hour: u8,
    granularity: Granularity,
}

impl Default for GridWindow {
    fn default() -> Self {
        Self {
            first_hour: GRID_FIRST_HOUR,
            last_hour: GRID_LAST_HOUR,
            granularity: Granularity::Hour,
        }
    }
}

impl GridWindow {
    /// `last_hour` is the start hour of the last cell. Rejects empty or
    /// out-of-day windows.
    pub fn new(first_hour: u8, last_hour: u8, granularity: Granularity) -> Option<Self> {
        if first_hour > last_hour || last_hour > 23 {
            return None;
        }
        Some(Self {
            first_hour,
            last_hour,
            granularity,
        })
    }

    pub fn first_hour(&self) -> u8 {
        self.first_hour
    }

    pub fn last_hour(&self) -> u8 {
        self.last_hour
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn step(&self) -> Minutes {
        self.granularity.minutes()
    }

    pub fn cells_per_day(&self) -> usize {
        let minutes = (Minutes::from(self.last_hour) + 1 - Minutes::from(self.first_hour)) * 60;
        (minutes / self.step()) as usize
    }

    fn cell_starts(&self) -> impl Iterator<Item = Minutes> + '_ {
        let first = Minutes::from(self.first_hour) * 60;
        (0..self.cells_per_day()).map(move |i| first + i as Minutes * self.step())
    }

    /// Build the 7×N matrix of cells for this window.
    ///
    /// Preferences paint in iteration order; when two overlap, the later one
    /// wins.
    pub fn build(&self, opening_hours: &[OpeningHoursForDay; 7], preferences: &[SuitableTimeRange]) -> Grid {
        let mut days: [Vec<Cell>; 7] = std::array::from_fn(|i| {
            let day = Weekday::ALL[i];
            let hours = &opening_hours[i];
            self.cell_starts()
                .map(|start| Cell {
                    day,
                    hour: (start / 60) as u8,
                    minute: (start % 60) as u8,
                    state: CellState::None,
                    open_state: if hours.is_open_at(start) {
                        OpenState::Open
                    } else {
                        OpenState::Unavailable
                    },
                })
                .collect()
        });

        for pref in preferences {
            let span = pref.span();
            for cell in days[pref.day_of_the_week.index()].iter_mut() {
                if span.contains_instant(cell.start()) {
                    cell.state = pref.priority.into();
                }
            }
        }

        Grid { window: *self, days }
    }
}

/// Build the grid for the default display window.
pub fn build_grid(opening_hours: &[OpeningHoursForDay; 7], preferences: &[SuitableTimeRange]) -> Grid {
    GridWindow::default().build(opening_hours, preferences)
}

// ── Grid ──────────────────────────────────────────────────────────

/// Seven day slices of equal length, indexed Monday-first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    window: GridWindow,
    days: [Vec<Cell>; 7],
}

impl Grid {
    pub fn window(&self) -> &GridWindow {
        &self.window
    }

    pub fn days(&self) -> &[Vec<Cell>; 7] {
        &self.days
    }

    pub fn day(&self, day: Weekday) -> &[Cell] {
        &self.days[day.index()]
    }

    /// The cell covering the start of `key`, if inside the window.
    pub fn cell(&self, key: &CellKey) -> Option<&Cell> {
        let step = self.window.step();
        let t = key.start();
        self.day(key.day)
            .iter()
            .find(|c| c.start() <= t && t < c.start() + step)
    }

    /// Paint every cell whose start lies inside the selection window.
    pub fn paint_selection(&mut self, selection: &Selection, state: CellState) {
        let span = selection.window().span();
        for cell in self.days[selection.day().index()].iter_mut() {
            if span.contains_instant(cell.start()) {
                cell.state = state;
            }
        }
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "     ")?;
        for day in Weekday::ALL {
            write!(f, " {}", day.short_label())?;
        }
        writeln!(f)?;
        for row in 0..self.window.cells_per_day() {
            let first = &self.days[0][row];
            write!(f, "{:02}:{:02}", first.hour, first.minute)?;
            for day in &self.days {
                let cell = &day[row];
                let mark = match (cell.state, cell.open_state) {
                    (CellState::None, OpenState::Open) => 'o',
                    (CellState::None, OpenState::Unavailable) => '-',
                    (CellState::Primary, OpenState::Open) => 'P',
                    (CellState::Primary, OpenState::Unavailable) => 'p',
                    (CellState::Secondary, OpenState::Open) => 'S',
                    (CellState::Secondary, OpenState::Unavailable) => 's',
                };
                write!(f, "  {mark}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Minutes = 60;

    fn weekdays_open(start: Minutes, end: Minutes) -> [OpeningHoursForDay; 7] {
        std::array::from_fn(|i| {
            if i < 5 {
                OpeningHoursForDay::open(vec![Span::new(start, end)])
            } else {
                OpeningHoursForDay::closed()
            }
        })
    }

    fn range(day: Weekday, begin: &str, end: &str, priority: Priority) -> SuitableTimeRange {
        SuitableTimeRange {
            pk: 0,
            day_of_the_week: day,
            begin_time: TimeOfDay::parse(begin).unwrap(),
            end_time: TimeOfDay::parse(end).unwrap(),
            priority,
        }
    }

    #[test]
    fn grid_always_has_seven_equal_days() {
        let empty: [OpeningHoursForDay; 7] = Default::default();
        let grid = build_grid(&empty, &[]);
        assert_eq!(grid.days().len(), 7);
        let n = grid.day(Weekday::Monday).len();
        assert!(n > 0);
        for day in grid.days() {
            assert_eq!(day.len(), n);
            assert!(day.iter().all(|c| c.state == CellState::None));
            assert!(day.iter().all(|c| c.open_state == OpenState::Unavailable));
        }
    }

    #[test]
    fn default_window_runs_from_seven_to_last_cell_at_23() {
        let grid = build_grid(&Default::default(), &[]);
        let monday = grid.day(Weekday::Monday);
        assert_eq!(monday.len(), 17);
        assert_eq!(monday.first().unwrap().hour, 7);
        assert_eq!(monday.last().unwrap().hour, 23);
    }

    #[test]
    fn half_hour_window_doubles_cells() {
        let window = GridWindow::new(7, 23, Granularity::HalfHour).unwrap();
        let grid = window.build(&Default::default(), &[]);
        assert_eq!(grid.day(Weekday::Sunday).len(), 34);
        assert_eq!(grid.day(Weekday::Sunday)[1].minute, 30);
    }

    #[test]
    fn invalid_window_rejected() {
        assert!(GridWindow::new(10, 9, Granularity::Hour).is_none());
        assert!(GridWindow::new(0, 24, Granularity::Hour).is_none());
        assert!(GridWindow::new(0, 23, Granularity::Hour).is_some());
    }

    #[test]
    fn open_state_follows_reservable_times() {
        let grid = build_grid(&weekdays_open(8 * H, 17 * H), &[]);
        let tuesday = grid.day(Weekday::Tuesday);
        let at = |hour: u8| tuesday.iter().find(|c| c.hour == hour).unwrap().open_state;
        assert_eq!(at(7), OpenState::Unavailable);
        assert_eq!(at(8), OpenState::Open);
        assert_eq!(at(16), OpenState::Open);
        assert_eq!(at(17), OpenState::Unavailable);
        assert!(grid.day(Weekday::Saturday).iter().all(|c| c.open_state == OpenState::Unavailable));
    }

    #[test]
    fn open_until_end_of_day() {
        let mut week: [OpeningHoursForDay; 7] = Default::default();
        week[0] = OpeningHoursForDay::open(vec![Span::new(20 * H, MINUTES_PER_DAY)]);
        let grid = build_grid(&week, &[]);
        let last = grid.day(Weekday::Monday).last().unwrap();
        assert_eq!(last.hour, 23);
        assert_eq!(last.open_state, OpenState::Open);
    }

    #[test]
    fn preferences_paint_half_open_range() {
        let prefs = [range(Weekday::Tuesday, "08:00", "11:00", Priority::Primary)];
        let grid = build_grid(&weekdays_open(8 * H, 17 * H), &prefs);
        let painted: Vec<u8> = grid
            .day(Weekday::Tuesday)
            .iter()
            .filter(|c| c.state == CellState::Primary)
            .map(|c| c.hour)
            .collect();
        assert_eq!(painted, vec![8, 9, 10]);
        assert!(grid.day(Weekday::Monday).iter().all(|c| c.state == CellState::None));
    }

    #[test]
    fn range_ending_at_midnight_paints_last_cell() {
        let prefs = [range(Weekday::Friday, "22:00", "00:00", Priority::Secondary)];
        let grid = build_grid(&Default::default(), &prefs);
        let friday = grid.day(Weekday::Friday);
        assert_eq!(friday.last().unwrap().state, CellState::Secondary);
        assert_eq!(friday.iter().filter(|c| c.state == CellState::Secondary).count(), 2);
    }

    #[test]
    fn later_preference_wins_on_overlap() {
        let prefs = [
            range(Weekday::Monday, "09:00", "12:00", Priority::Primary),
            range(Weekday::Monday, "11:00", "13:00", Priority::Secondary),
        ];
        let grid = build_grid(&Default::default(), &prefs);
        let cell = grid.cell(&CellKey::new(Weekday::Monday, 11, 0).unwrap()).unwrap();
        assert_eq!(cell.state, CellState::Secondary);
        let cell = grid.cell(&CellKey::new(Weekday::Monday, 10, 0).unwrap()).unwrap();
        assert_eq!(cell.state, CellState::Primary);
    }

    #[test]
    fn cell_lookup_covers_half_hour_keys() {
        let grid = build_grid(&Default::default(), &[]);
        let key = CellKey::new(Weekday::Monday, 9, 30).unwrap();
        assert_eq!(grid.cell(&key).unwrap().hour, 9);
        let early = CellKey::new(Weekday::Monday, 6, 0).unwrap();
        assert!(grid.cell(&early).is_none());
    }

    #[test]
    fn paint_selection_marks_cells() {
        let mut grid = build_grid(&Default::default(), &[]);
        let sel = Selection::from_window(
            Weekday::Wednesday,
            TimeOfDay::new(14, 0).unwrap(),
            TimeOfDay::new(16, 0).unwrap(),
        )
        .unwrap();
        grid.paint_selection(&sel, CellState::Primary);
        let painted = grid
            .day(Weekday::Wednesday)
            .iter()
            .filter(|c| c.state == CellState::Primary)
            .count();
        assert_eq!(painted, 2);
    }

    #[test]
    fn renders_as_text() {
        let prefs = [range(Weekday::Monday, "07:00", "08:00", Priority::Primary)];
        let text = build_grid(&weekdays_open(7 * H, 8 * H), &prefs).to_string();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().contains("MO"));
        assert!(lines.next().unwrap().starts_with("07:00  P  o"));
    }
}
