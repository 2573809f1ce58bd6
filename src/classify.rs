use serde::{Deserialize, Serialize};

use crate::model::*;

/// Where a section sits in the left-hand application list for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionAllocationState {
    Unallocated,
    PartiallyAllocated,
    Allocated,
    Declined,
}

impl SectionAllocationState {
    pub fn as_str(self) -> &'static str {
        match self {
            SectionAllocationState::Unallocated => "unallocated",
            SectionAllocationState::PartiallyAllocated => "partially-allocated",
            SectionAllocationState::Allocated => "allocated",
            SectionAllocationState::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unallocated" => Some(SectionAllocationState::Unallocated),
            "partially-allocated" => Some(SectionAllocationState::PartiallyAllocated),
            "allocated" => Some(SectionAllocationState::Allocated),
            "declined" => Some(SectionAllocationState::Declined),
            _ => None,
        }
    }
}

/// Classify a section as seen from `reservation_unit_pk`. First match wins:
/// handled, allocated-here-and-locked, allocated-and-open, locked-or-rejected.
pub fn classify(section: &ApplicationSection, reservation_unit_pk: Pk) -> SectionAllocationState {
    if section.status == ApplicationSectionStatus::Handled {
        return SectionAllocationState::Allocated;
    }
    let option = section.option_for_unit(reservation_unit_pk);
    let locked = option.is_some_and(|o| o.locked);
    let rejected = option.is_some_and(|o| o.rejected);
    let allocated_here = option.is_some_and(|o| !o.allocated_time_slots.is_empty());

    if allocated_here && locked {
        SectionAllocationState::Allocated
    } else if section.allocation_count() > 0 && !locked && !rejected {
        SectionAllocationState::PartiallyAllocated
    } else if locked || rejected {
        SectionAllocationState::Declined
    } else {
        SectionAllocationState::Unallocated
    }
}

#[derive(Debug, Default)]
pub struct ClassifiedSections<'a> {
    pub unallocated: Vec<&'a ApplicationSection>,
    pub partially_allocated: Vec<&'a ApplicationSection>,
    pub allocated: Vec<&'a ApplicationSection>,
    pub declined: Vec<&'a ApplicationSection>,
}

impl<'a> ClassifiedSections<'a> {
    pub fn get(&self, state: SectionAllocationState) -> &[&'a ApplicationSection] {
        match state {
            SectionAllocationState::Unallocated => &self.unallocated,
            SectionAllocationState::PartiallyAllocated => &self.partially_allocated,
            SectionAllocationState::Allocated => &self.allocated,
            SectionAllocationState::Declined => &self.declined,
        }
    }

    pub fn len(&self) -> usize {
        self.unallocated.len() + self.partially_allocated.len() + self.allocated.len() + self.declined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split a section list into the four buckets, preserving order.
pub fn classify_all<'a>(
    sections: impl IntoIterator<Item = &'a ApplicationSection>,
    reservation_unit_pk: Pk,
) -> ClassifiedSections<'a> {
    let mut out = ClassifiedSections::default();
    for section in sections {
        match classify(section, reservation_unit_pk) {
            SectionAllocationState::Unallocated => out.unallocated.push(section),
            SectionAllocationState::PartiallyAllocated => out.partially_allocated.push(section),
            SectionAllocationState::Allocated => out.allocated.push(section),
            SectionAllocationState::Declined => out.declined.push(section),
        }
    }
    out
}
