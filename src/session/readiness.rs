use serde::Serialize;

use crate::api::CreateAllocationInput;
use crate::collision::{find_collision, matching_time_range};
use crate::model::*;
use crate::selection::{Selection, SelectionWindow};

/// Everything needed to submit an allocation for the current selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadyAllocation {
    pub option_pk: Pk,
    pub section_pk: Pk,
    pub window: SelectionWindow,
    pub time_range: SuitableTimeRange,
}

impl ReadyAllocation {
    pub fn input(&self, force: bool) -> CreateAllocationInput {
        CreateAllocationInput {
            reservation_unit_option: self.option_pk,
            day_of_the_week: self.window.day,
            begin_time: self.window.begin,
            end_time: self.window.end,
            force,
        }
    }
}

/// Why the current selection cannot be accepted as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Blocker {
    NoData,
    NoSelection,
    NoSection,
    RoundNotInAllocation,
    SectionHandled,
    UnknownOption,
    OptionUnavailable,
    NoMatchingTimeRange,
    OutsideOpeningHours,
    DurationTooShort { minutes: Minutes, min_minutes: Minutes },
    DurationTooLong { minutes: Minutes, max_minutes: Minutes },
    DayAlreadyAllocated,
    CapReached,
    Collision { allocation_pk: Pk },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Readiness {
    Ready(ReadyAllocation),
    Blocked(Blocker),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready(_))
    }
}

/// Pure readiness check for allocating `selection` to `section` through the
/// option `option_pk` on the round's reservation unit.
pub fn evaluate(
    data: Option<&RoundData>,
    selection: Option<&Selection>,
    section: Option<Pk>,
    option_pk: Pk,
) -> Readiness {
    match check(data, selection, section, option_pk) {
        Ok(ready) => Readiness::Ready(ready),
        Err(blocker) => Readiness::Blocked(blocker),
    }
}

fn check(
    data: Option<&RoundData>,
    selection: Option<&Selection>,
    section: Option<Pk>,
    option_pk: Pk,
) -> Result<ReadyAllocation, Blocker> {
    let data = data.ok_or(Blocker::NoData)?;
    let selection = selection.ok_or(Blocker::NoSelection)?;
    let section = section
        .and_then(|pk| data.section(pk))
        .ok_or(Blocker::NoSection)?;

    if data.round_status != ApplicationRoundStatus::InAllocation {
        return Err(Blocker::RoundNotInAllocation);
    }
    if section.is_terminal() {
        return Err(Blocker::SectionHandled);
    }

    let option = section
        .option(option_pk)
        .filter(|o| o.reservation_unit_pk == data.reservation_unit_pk)
        .ok_or(Blocker::UnknownOption)?;
    if option.locked || option.rejected {
        return Err(Blocker::OptionUnavailable);
    }

    let window = selection.window();
    let time_range = matching_time_range(section, &window).ok_or(Blocker::NoMatchingTimeRange)?;
    let open = data
        .opening_hours
        .get(window.day.index())
        .is_some_and(|day| day.covers(&window.span()));
    if !open {
        return Err(Blocker::OutsideOpeningHours);
    }

    let minutes = window.duration_minutes();
    let min_minutes = section.reservation_min_duration / 60;
    let max_minutes = section.reservation_max_duration / 60;
    if minutes < min_minutes {
        return Err(Blocker::DurationTooShort { minutes, min_minutes });
    }
    if minutes > max_minutes {
        return Err(Blocker::DurationTooLong { minutes, max_minutes });
    }

    if section.allocations().any(|slot| slot.day_of_the_week == window.day) {
        return Err(Blocker::DayAlreadyAllocated);
    }
    if section.allocation_count() >= section.applied_reservations_per_week as usize {
        return Err(Blocker::CapReached);
    }
    if let Some(slot) = find_collision(data, section.pk, &window) {
        return Err(Blocker::Collision { allocation_pk: slot.pk });
    }

    Ok(ReadyAllocation {
        option_pk: option.pk,
        section_pk: section.pk,
        window,
        time_range: time_range.clone(),
    })
}
