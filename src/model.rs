use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

/// Minutes since midnight. The only time-of-day unit.
pub type Minutes = u32;

/// Server primary key. `0` is the "absent" sentinel.
pub type Pk = u64;

pub const MINUTES_PER_DAY: Minutes = 24 * 60;

/// Half-open interval `[start, end)` in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Minutes,
    pub end: Minutes,
}

impl Span {
    pub fn new(start: Minutes, end: Minutes) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> Minutes {
        self.end.saturating_sub(self.start)
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Minutes) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

// ── Weekday ──────────────────────────────────────────────────────

/// Day of the week in grid order (Monday = 0).
///
/// The surrounding system uses ISO numbering (Monday = 1) and Sunday-first
/// numbering in places; convert through the named constructors, never by
/// comparing raw integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    /// Grid index, Monday = 0.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// ISO weekday number, Monday = 1 … Sunday = 7.
    pub fn iso(self) -> u8 {
        self as u8 + 1
    }

    pub fn from_iso(n: u8) -> Option<Self> {
        match n {
            1..=7 => Some(Self::ALL[usize::from(n) - 1]),
            _ => None,
        }
    }

    /// Sunday-first numbering, Sunday = 0 … Saturday = 6.
    pub fn from_sunday_first(n: u8) -> Option<Self> {
        match n {
            0 => Some(Weekday::Sunday),
            1..=6 => Some(Self::ALL[usize::from(n) - 1]),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Weekday::Monday => "MONDAY",
            Weekday::Tuesday => "TUESDAY",
            Weekday::Wednesday => "WEDNESDAY",
            Weekday::Thursday => "THURSDAY",
            Weekday::Friday => "FRIDAY",
            Weekday::Saturday => "SATURDAY",
            Weekday::Sunday => "SUNDAY",
        }
    }

    pub fn short_label(self) -> &'static str {
        &self.name()[..2]
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── TimeOfDay ────────────────────────────────────────────────────

/// Wall-clock time on a half-open day. `24:00` is the end-of-day sentinel
/// and serializes as `"00:00"`; as an end time `00:00` also means end of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay { hour: 0, minute: 0 };
    pub const END_OF_DAY: TimeOfDay = TimeOfDay { hour: 24, minute: 0 };

    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if minute > 59 || hour > 24 || (hour == 24 && minute != 0) {
            return None;
        }
        Some(Self { hour, minute })
    }

    /// Clamps to `[00:00, 24:00]`.
    pub fn from_minutes(minutes: Minutes) -> Self {
        let m = minutes.min(MINUTES_PER_DAY);
        Self {
            hour: (m / 60) as u8,
            minute: (m % 60) as u8,
        }
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    /// Minutes since midnight when used as a start time.
    pub fn begin_minutes(self) -> Minutes {
        Minutes::from(self.hour) * 60 + Minutes::from(self.minute)
    }

    /// Minutes since midnight when used as an end time: midnight is 1440.
    pub fn end_minutes(self) -> Minutes {
        match self.begin_minutes() {
            0 => MINUTES_PER_DAY,
            m => m,
        }
    }

    /// Parses `"HH:MM"` or `"HH:MM:SS"`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split(':');
        let hour: u8 = parts.next()?.parse().ok()?;
        let minute: u8 = parts.next()?.parse().ok()?;
        if let Some(seconds) = parts.next() {
            let seconds: u8 = seconds.parse().ok()?;
            if seconds > 59 {
                return None;
            }
        }
        if parts.next().is_some() {
            return None;
        }
        Self::new(hour, minute)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour % 24, self.minute)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TimeOfDay::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid time of day: {s:?}")))
    }
}

/// Anything that occupies a window on one weekday.
pub trait DayTime {
    fn weekday(&self) -> Weekday;
    fn begin(&self) -> TimeOfDay;
    fn end(&self) -> TimeOfDay;

    /// Minute span with the end-of-day sentinel normalized to 1440.
    fn span(&self) -> Span {
        Span {
            start: self.begin().begin_minutes(),
            end: self.end().end_minutes(),
        }
    }
}

// ── Preferences and allocations ──────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Primary,
    Secondary,
}

/// An applicant's declared weekly preference window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuitableTimeRange {
    #[serde(default)]
    pub pk: Pk,
    pub day_of_the_week: Weekday,
    pub begin_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub priority: Priority,
}

impl DayTime for SuitableTimeRange {
    fn weekday(&self) -> Weekday {
        self.day_of_the_week
    }
    fn begin(&self) -> TimeOfDay {
        self.begin_time
    }
    fn end(&self) -> TimeOfDay {
        self.end_time
    }
}

/// A committed weekly allocation. The server owns these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocatedTimeSlot {
    #[serde(default)]
    pub pk: Pk,
    pub day_of_the_week: Weekday,
    pub begin_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub reservation_unit_option_pk: Pk,
    #[serde(default)]
    pub application_section_pk: Pk,
    #[serde(default)]
    pub reservation_unit_pk: Pk,
}

impl DayTime for AllocatedTimeSlot {
    fn weekday(&self) -> Weekday {
        self.day_of_the_week
    }
    fn begin(&self) -> TimeOfDay {
        self.begin_time
    }
    fn end(&self) -> TimeOfDay {
        self.end_time
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationUnitOption {
    pub pk: Pk,
    pub reservation_unit_pk: Pk,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub rejected: bool,
    #[serde(default)]
    pub allocated_time_slots: Vec<AllocatedTimeSlot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationSectionStatus {
    Unallocated,
    InAllocation,
    Handled,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationRoundStatus {
    Upcoming,
    Open,
    InAllocation,
    Handled,
    ResultsSent,
}

/// One applicant's request for recurring weekly time within a season.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSection {
    pub pk: Pk,
    #[serde(default)]
    pub name: String,
    pub status: ApplicationSectionStatus,
    /// Seconds.
    pub reservation_min_duration: u32,
    /// Seconds.
    pub reservation_max_duration: u32,
    pub applied_reservations_per_week: u32,
    #[serde(default)]
    pub suitable_time_ranges: Vec<SuitableTimeRange>,
    #[serde(default)]
    pub reservation_unit_options: Vec<ReservationUnitOption>,
}

impl ApplicationSection {
    pub fn option(&self, option_pk: Pk) -> Option<&ReservationUnitOption> {
        self.reservation_unit_options.iter().find(|o| o.pk == option_pk)
    }

    pub fn option_for_unit(&self, reservation_unit_pk: Pk) -> Option<&ReservationUnitOption> {
        self.reservation_unit_options
            .iter()
            .find(|o| o.reservation_unit_pk == reservation_unit_pk)
    }

    /// Every allocation of this section, across all options.
    pub fn allocations(&self) -> impl Iterator<Item = &AllocatedTimeSlot> {
        self.reservation_unit_options
            .iter()
            .flat_map(|o| o.allocated_time_slots.iter())
    }

    pub fn allocation_count(&self) -> usize {
        self.allocations().count()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ApplicationSectionStatus::Handled | ApplicationSectionStatus::Rejected
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningHoursForDay {
    #[serde(default)]
    pub closed: bool,
    /// Sorted, non-overlapping. Ignored when `closed`.
    #[serde(default)]
    pub reservable_times: Vec<Span>,
}

impl OpeningHoursForDay {
    pub fn closed() -> Self {
        Self {
            closed: true,
            reservable_times: Vec::new(),
        }
    }

    pub fn open(reservable_times: Vec<Span>) -> Self {
        Self {
            closed: false,
            reservable_times,
        }
    }

    pub fn is_open_at(&self, t: Minutes) -> bool {
        !self.closed && self.reservable_times.iter().any(|s| s.contains_instant(t))
    }

    pub fn covers(&self, span: &Span) -> bool {
        !self.closed && self.reservable_times.iter().any(|s| s.contains_span(span))
    }
}

/// Pad or truncate to exactly one entry per weekday; missing days are closed.
pub fn week_opening_hours(days: &[OpeningHoursForDay]) -> [OpeningHoursForDay; 7] {
    std::array::from_fn(|i| days.get(i).cloned().unwrap_or_else(OpeningHoursForDay::closed))
}

/// Everything the allocation view needs for one round and reservation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundData {
    pub application_round_pk: Pk,
    pub round_status: ApplicationRoundStatus,
    pub reservation_unit_pk: Pk,
    #[serde(default)]
    pub reservation_period_begin: Option<NaiveDate>,
    #[serde(default)]
    pub reservation_period_end: Option<NaiveDate>,
    #[serde(default)]
    pub opening_hours: Vec<OpeningHoursForDay>,
    #[serde(default)]
    pub application_sections: Vec<ApplicationSection>,
    /// Allocations on related (capacity-sharing) units.
    #[serde(default)]
    pub affecting_allocations: Vec<AllocatedTimeSlot>,
}

impl RoundData {
    pub fn section(&self, pk: Pk) -> Option<&ApplicationSection> {
        self.application_sections.iter().find(|s| s.pk == pk)
    }

    pub fn week(&self) -> [OpeningHoursForDay; 7] {
        week_opening_hours(&self.opening_hours)
    }

    /// Allocations made on this round's reservation unit, any section.
    pub fn unit_allocations(&self) -> impl Iterator<Item = (&ApplicationSection, &AllocatedTimeSlot)> {
        let unit = self.reservation_unit_pk;
        self.application_sections.iter().flat_map(move |section| {
            section
                .reservation_unit_options
                .iter()
                .filter(move |o| o.reservation_unit_pk == unit)
                .flat_map(move |o| o.allocated_time_slots.iter().map(move |slot| (section, slot)))
        })
    }
}

/// Broadcast after a committed mutation so every view of the round re-queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationEvent {
    Created {
        origin: Ulid,
        slot: AllocatedTimeSlot,
    },
    Removed {
        origin: Ulid,
        pk: Pk,
    },
}

impl AllocationEvent {
    pub fn origin(&self) -> Ulid {
        match self {
            AllocationEvent::Created { origin, .. } | AllocationEvent::Removed { origin, .. } => *origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(60, 120);
        assert_eq!(s.duration(), 60);
        assert!(s.contains_instant(60));
        assert!(s.contains_instant(119));
        assert!(!s.contains_instant(120)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(540, 600);
        let b = Span::new(570, 630);
        let c = Span::new(600, 660);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn weekday_conventions() {
        assert_eq!(Weekday::from_index(1), Some(Weekday::Tuesday));
        assert_eq!(Weekday::from_index(7), None);
        assert_eq!(Weekday::from_iso(1), Some(Weekday::Monday));
        assert_eq!(Weekday::from_iso(7), Some(Weekday::Sunday));
        assert_eq!(Weekday::from_iso(0), None);
        assert_eq!(Weekday::from_sunday_first(0), Some(Weekday::Sunday));
        assert_eq!(Weekday::from_sunday_first(2), Some(Weekday::Tuesday));
        assert_eq!(Weekday::Tuesday.iso(), 2);
        assert_eq!(Weekday::Tuesday.index(), 1);
    }

    #[test]
    fn time_of_day_parse() {
        assert_eq!(TimeOfDay::parse("09:30"), TimeOfDay::new(9, 30));
        assert_eq!(TimeOfDay::parse("09:30:00"), TimeOfDay::new(9, 30));
        assert_eq!(TimeOfDay::parse("24:00"), Some(TimeOfDay::END_OF_DAY));
        assert_eq!(TimeOfDay::parse("24:30"), None);
        assert_eq!(TimeOfDay::parse("9"), None);
        assert_eq!(TimeOfDay::parse("aa:bb"), None);
        assert_eq!(TimeOfDay::parse("10:00:00:00"), None);
    }

    #[test]
    fn end_of_day_sentinel() {
        let midnight = TimeOfDay::MIDNIGHT;
        assert_eq!(midnight.begin_minutes(), 0);
        assert_eq!(midnight.end_minutes(), MINUTES_PER_DAY);
        assert_eq!(TimeOfDay::END_OF_DAY.end_minutes(), MINUTES_PER_DAY);
        assert_eq!(TimeOfDay::END_OF_DAY.to_string(), "00:00");
        assert_eq!(TimeOfDay::from_minutes(MINUTES_PER_DAY), TimeOfDay::END_OF_DAY);
    }

    #[test]
    fn suitable_range_wire_format() {
        let json = r#"{"dayOfTheWeek":"TUESDAY","beginTime":"14:00","endTime":"00:00","priority":"PRIMARY"}"#;
        let range: SuitableTimeRange = serde_json::from_str(json).unwrap();
        assert_eq!(range.day_of_the_week, Weekday::Tuesday);
        assert_eq!(range.pk, 0);
        assert_eq!(range.span(), Span::new(14 * 60, MINUTES_PER_DAY));

        let out = serde_json::to_value(&range).unwrap();
        assert_eq!(out["endTime"], "00:00");
        assert_eq!(out["priority"], "PRIMARY");
    }

    #[test]
    fn week_padding_closes_missing_days() {
        let week = week_opening_hours(&[OpeningHoursForDay::open(vec![Span::new(480, 1020)])]);
        assert!(week[0].is_open_at(480));
        assert!(!week[0].is_open_at(1020));
        for day in &week[1..] {
            assert!(day.closed);
        }
    }

    #[test]
    fn closed_day_ignores_times() {
        let day = OpeningHoursForDay {
            closed: true,
            reservable_times: vec![Span::new(0, MINUTES_PER_DAY)],
        };
        assert!(!day.is_open_at(600));
        assert!(!day.covers(&Span::new(600, 660)));
    }
}
