use crate::model::*;
use crate::selection::{CellKey, SelectionWindow};

/// True iff `candidate` falls on the same weekday as `selection` and their
/// minute ranges overlap. Adjacent ranges do not overlap.
pub fn is_inside_selection(selection: &SelectionWindow, candidate: &impl DayTime) -> bool {
    selection.day == candidate.weekday() && candidate.span().overlaps(&selection.span())
}

/// Merge sorted overlapping/adjacent spans into disjoint spans.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// Committed allocations bucketed per weekday as disjoint, sorted spans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelatedTimeSlots {
    days: [Vec<Span>; 7],
}

impl RelatedTimeSlots {
    pub fn day(&self, day: Weekday) -> &[Span] {
        &self.days[day.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.days.iter().all(Vec::is_empty)
    }

    /// Whether `window` overlaps any bucketed allocation on its day.
    pub fn collides(&self, window: &impl DayTime) -> bool {
        let span = window.span();
        let day = self.day(window.weekday());
        // Everything at index >= right_bound starts at or after span.end.
        let right_bound = day.partition_point(|s| s.start < span.end);
        day[..right_bound].iter().any(|s| s.end > span.start)
    }
}

pub fn related_time_slots<'a>(allocations: impl IntoIterator<Item = &'a AllocatedTimeSlot>) -> RelatedTimeSlots {
    let mut days: [Vec<Span>; 7] = Default::default();
    for slot in allocations {
        let span = slot.span();
        if span.start < span.end {
            days[slot.day_of_the_week.index()].push(span);
        }
    }
    for day in days.iter_mut() {
        day.sort_by_key(|s| s.start);
        *day = merge_overlapping(day);
    }
    RelatedTimeSlots { days }
}

/// Allocations a new allocation for `section_pk` must not overlap: those of
/// other sections on this unit, plus those on related units.
pub fn collision_candidates(data: &RoundData, section_pk: Pk) -> Vec<&AllocatedTimeSlot> {
    let own_unit = data
        .unit_allocations()
        .filter(|(section, _)| section.pk != section_pk)
        .map(|(_, slot)| slot);
    let related = data
        .affecting_allocations
        .iter()
        .filter(|slot| slot.application_section_pk != section_pk);
    own_unit.chain(related).collect()
}

/// The first allocation of another section that `window` would overlap.
/// Merged spans decide the collision; the scan only names the allocation.
pub fn find_collision<'a>(data: &'a RoundData, section_pk: Pk, window: &SelectionWindow) -> Option<&'a AllocatedTimeSlot> {
    let candidates = collision_candidates(data, section_pk);
    if !related_time_slots(candidates.iter().copied()).collides(window) {
        return None;
    }
    candidates.into_iter().find(|slot| is_inside_selection(window, *slot))
}

// ── Relevance filters ─────────────────────────────────────────────

fn covers_cell(candidate: &impl DayTime, key: &CellKey) -> bool {
    candidate.weekday() == key.day && candidate.span().contains_instant(key.start())
}

/// Sections with a suitable time range covering the cell.
pub fn sections_for_cell<'a>(sections: &'a [ApplicationSection], key: &CellKey) -> Vec<&'a ApplicationSection> {
    sections
        .iter()
        .filter(|s| s.suitable_time_ranges.iter().any(|r| covers_cell(r, key)))
        .collect()
}

/// Allocations on `reservation_unit_pk` covering the cell.
pub fn allocations_for_cell<'a>(
    sections: &'a [ApplicationSection],
    reservation_unit_pk: Pk,
    key: &CellKey,
) -> Vec<&'a AllocatedTimeSlot> {
    unit_slots(sections, reservation_unit_pk)
        .filter(|slot| covers_cell(*slot, key))
        .collect()
}

/// Allocations on `reservation_unit_pk` overlapping a selected window.
pub fn allocations_in_window<'a>(
    sections: &'a [ApplicationSection],
    reservation_unit_pk: Pk,
    window: &SelectionWindow,
) -> Vec<&'a AllocatedTimeSlot> {
    unit_slots(sections, reservation_unit_pk)
        .filter(|slot| is_inside_selection(window, *slot))
        .collect()
}

/// The section's suitable time range on the window's day that wholly
/// contains the window. Partial overlap does not match.
pub fn matching_time_range<'a>(section: &'a ApplicationSection, window: &SelectionWindow) -> Option<&'a SuitableTimeRange> {
    let span = window.span();
    section
        .suitable_time_ranges
        .iter()
        .find(|r| r.weekday() == window.day && r.span().contains_span(&span))
}

fn unit_slots(sections: &[ApplicationSection], reservation_unit_pk: Pk) -> impl Iterator<Item = &AllocatedTimeSlot> {
    sections
        .iter()
        .flat_map(|s| s.reservation_unit_options.iter())
        .filter(move |o| o.reservation_unit_pk == reservation_unit_pk)
        .flat_map(|o| o.allocated_time_slots.iter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::{expand_selection, Selection};

    fn window(day: Weekday, begin: &str, end: &str) -> SelectionWindow {
        SelectionWindow {
            day,
            begin: TimeOfDay::parse(begin).unwrap(),
            end: TimeOfDay::parse(end).unwrap(),
        }
    }

    fn slot(pk: Pk, section: Pk, unit: Pk, day: Weekday, begin: &str, end: &str) -> AllocatedTimeSlot {
        AllocatedTimeSlot {
            pk,
            day_of_the_week: day,
            begin_time: TimeOfDay::parse(begin).unwrap(),
            end_time: TimeOfDay::parse(end).unwrap(),
            reservation_unit_option_pk: section * 100 + unit,
            application_section_pk: section,
            reservation_unit_pk: unit,
        }
    }

    fn section(pk: Pk, unit: Pk, slots: Vec<AllocatedTimeSlot>, ranges: Vec<SuitableTimeRange>) -> ApplicationSection {
        ApplicationSection {
            pk,
            name: format!("section {pk}"),
            status: ApplicationSectionStatus::InAllocation,
            reservation_min_duration: 3600,
            reservation_max_duration: 7200,
            applied_reservations_per_week: 2,
            suitable_time_ranges: ranges,
            reservation_unit_options: vec![ReservationUnitOption {
                pk: pk * 100 + unit,
                reservation_unit_pk: unit,
                locked: false,
                rejected: false,
                allocated_time_slots: slots,
            }],
        }
    }

    fn round(sections: Vec<ApplicationSection>, affecting: Vec<AllocatedTimeSlot>) -> RoundData {
        RoundData {
            application_round_pk: 1,
            round_status: ApplicationRoundStatus::InAllocation,
            reservation_unit_pk: 10,
            reservation_period_begin: None,
            reservation_period_end: None,
            opening_hours: Vec::new(),
            application_sections: sections,
            affecting_allocations: affecting,
        }
    }

    #[test]
    fn overlap_on_same_day() {
        let sel = window(Weekday::Monday, "09:00", "10:00");
        assert!(is_inside_selection(&sel, &window(Weekday::Monday, "09:30", "11:00")));
        assert!(is_inside_selection(&sel, &window(Weekday::Monday, "08:00", "12:00")));
    }

    #[test]
    fn adjacent_ranges_do_not_collide() {
        let sel = window(Weekday::Monday, "09:00", "10:00");
        assert!(!is_inside_selection(&sel, &window(Weekday::Monday, "10:00", "11:00")));
        assert!(!is_inside_selection(&sel, &window(Weekday::Monday, "08:00", "09:00")));
    }

    #[test]
    fn different_weekday_never_collides() {
        let sel = window(Weekday::Monday, "09:00", "10:00");
        assert!(!is_inside_selection(&sel, &window(Weekday::Tuesday, "09:00", "10:00")));
    }

    #[test]
    fn collision_is_symmetric() {
        let a = window(Weekday::Friday, "17:00", "19:00");
        let b = window(Weekday::Friday, "18:30", "20:00");
        assert_eq!(is_inside_selection(&a, &b), is_inside_selection(&b, &a));
    }

    #[test]
    fn midnight_end_counts_as_end_of_day() {
        let sel = window(Weekday::Sunday, "23:00", "00:00");
        assert!(is_inside_selection(&sel, &window(Weekday::Sunday, "23:30", "00:00")));
        assert!(!is_inside_selection(&sel, &window(Weekday::Sunday, "00:00", "01:00")));
    }

    #[test]
    fn related_slots_bucket_and_merge() {
        let slots = [
            slot(1, 1, 10, Weekday::Monday, "10:00", "11:00"),
            slot(2, 2, 10, Weekday::Monday, "09:00", "10:00"),
            slot(3, 3, 11, Weekday::Wednesday, "12:00", "13:00"),
        ];
        let related = related_time_slots(&slots);
        assert_eq!(related.day(Weekday::Monday), &[Span::new(540, 660)]);
        assert_eq!(related.day(Weekday::Wednesday), &[Span::new(720, 780)]);
        assert!(related.day(Weekday::Tuesday).is_empty());
        assert!(!related.is_empty());

        assert!(related.collides(&window(Weekday::Monday, "10:30", "12:00")));
        assert!(!related.collides(&window(Weekday::Monday, "11:00", "12:00")));
        assert!(!related.collides(&window(Weekday::Tuesday, "10:00", "11:00")));
    }

    #[test]
    fn empty_related_slots() {
        let related = related_time_slots(&[]);
        assert!(related.is_empty());
        assert!(!related.collides(&window(Weekday::Monday, "00:00", "00:00")));
    }

    #[test]
    fn candidates_exclude_own_section() {
        let data = round(
            vec![
                section(1, 10, vec![slot(11, 1, 10, Weekday::Monday, "09:00", "10:00")], vec![]),
                section(2, 10, vec![slot(21, 2, 10, Weekday::Monday, "12:00", "13:00")], vec![]),
            ],
            vec![
                slot(31, 3, 11, Weekday::Monday, "15:00", "16:00"),
                slot(12, 1, 11, Weekday::Tuesday, "15:00", "16:00"),
            ],
        );
        let pks: Vec<Pk> = collision_candidates(&data, 1).iter().map(|s| s.pk).collect();
        assert_eq!(pks, vec![21, 31]);

        assert!(find_collision(&data, 1, &window(Weekday::Monday, "12:30", "13:30")).is_some());
        assert!(find_collision(&data, 1, &window(Weekday::Monday, "15:30", "16:30")).is_some());
        assert!(find_collision(&data, 1, &window(Weekday::Monday, "09:00", "10:00")).is_none());
        assert!(find_collision(&data, 2, &window(Weekday::Monday, "09:00", "10:00")).is_some());
    }

    #[test]
    fn collision_names_the_overlapped_allocation() {
        let data = round(
            vec![
                section(1, 10, vec![], vec![]),
                section(2, 10, vec![slot(21, 2, 10, Weekday::Friday, "10:00", "11:00")], vec![]),
                section(3, 10, vec![slot(31, 3, 10, Weekday::Friday, "11:00", "12:00")], vec![]),
            ],
            vec![slot(41, 4, 11, Weekday::Friday, "12:00", "12:00")],
        );
        let found = find_collision(&data, 1, &window(Weekday::Friday, "11:30", "13:00"));
        assert_eq!(found.map(|s| s.pk), Some(31));
        // Zero-length allocations never block.
        assert!(find_collision(&data, 1, &window(Weekday::Friday, "12:00", "13:00")).is_none());
    }

    #[test]
    fn time_range_must_contain_window() {
        let ranges = vec![SuitableTimeRange {
            pk: 7,
            day_of_the_week: Weekday::Tuesday,
            begin_time: TimeOfDay::new(8, 0).unwrap(),
            end_time: TimeOfDay::new(11, 0).unwrap(),
            priority: Priority::Primary,
        }];
        let s = section(1, 10, vec![], ranges);
        let inside = matching_time_range(&s, &window(Weekday::Tuesday, "08:00", "11:00"));
        assert_eq!(inside.map(|r| r.pk), Some(7));
        assert!(matching_time_range(&s, &window(Weekday::Tuesday, "10:00", "12:00")).is_none());
        assert!(matching_time_range(&s, &window(Weekday::Tuesday, "07:30", "09:00")).is_none());
        assert!(matching_time_range(&s, &window(Weekday::Wednesday, "09:00", "10:00")).is_none());
    }

    #[test]
    fn cell_relevance() {
        let ranges = vec![SuitableTimeRange {
            pk: 5,
            day_of_the_week: Weekday::Tuesday,
            begin_time: TimeOfDay::new(8, 0).unwrap(),
            end_time: TimeOfDay::new(11, 0).unwrap(),
            priority: Priority::Primary,
        }];
        let sections = vec![
            section(1, 10, vec![slot(11, 1, 10, Weekday::Tuesday, "09:00", "10:00")], ranges),
            section(2, 11, vec![slot(21, 2, 11, Weekday::Tuesday, "09:00", "10:00")], vec![]),
        ];
        let key = CellKey::parse("1-9-30").unwrap();
        assert_eq!(sections_for_cell(&sections, &key).len(), 1);
        assert_eq!(allocations_for_cell(&sections, 10, &key).len(), 1);
        assert_eq!(allocations_for_cell(&sections, 10, &key)[0].pk, 11);

        let outside = CellKey::parse("1-11-0").unwrap();
        assert!(sections_for_cell(&sections, &outside).is_empty());
        assert!(allocations_for_cell(&sections, 10, &outside).is_empty());

        let sel = Selection::new(expand_selection("1-9-0", "1-9-30")).unwrap();
        assert_eq!(allocations_in_window(&sections, 11, &sel.window()).len(), 1);
        assert_eq!(matching_time_range(&sections[0], &sel.window()).map(|r| r.pk), Some(5));
        assert!(matching_time_range(&sections[1], &sel.window()).is_none());
    }
}
