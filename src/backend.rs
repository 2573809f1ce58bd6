use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::api::*;
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationUnitInfo {
    pub pk: Pk,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub opening_hours: Vec<OpeningHoursForDay>,
    /// Units sharing physical capacity with this one.
    #[serde(default)]
    pub related_units: Vec<Pk>,
}

/// Full state of one application round, as the server sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSnapshot {
    pub application_round_pk: Pk,
    pub round_status: ApplicationRoundStatus,
    pub reservation_period_begin: NaiveDate,
    pub reservation_period_end: NaiveDate,
    #[serde(default)]
    pub reservation_units: Vec<ReservationUnitInfo>,
    #[serde(default)]
    pub application_sections: Vec<ApplicationSection>,
}

impl RoundSnapshot {
    pub fn unit(&self, pk: Pk) -> Option<&ReservationUnitInfo> {
        self.reservation_units.iter().find(|u| u.pk == pk)
    }

    /// Units related to `pk` in either direction, excluding `pk` itself.
    pub fn related_units(&self, pk: Pk) -> HashSet<Pk> {
        let mut related = HashSet::new();
        for unit in &self.reservation_units {
            if unit.pk == pk {
                related.extend(unit.related_units.iter().copied());
            } else if unit.related_units.contains(&pk) {
                related.insert(unit.pk);
            }
        }
        related.remove(&pk);
        related
    }

    /// Fill the owner fields of every slot from its position in the tree.
    fn normalize(&mut self) {
        for section in &mut self.application_sections {
            for option in &mut section.reservation_unit_options {
                for slot in &mut option.allocated_time_slots {
                    slot.reservation_unit_option_pk = option.pk;
                    slot.application_section_pk = section.pk;
                    slot.reservation_unit_pk = option.reservation_unit_pk;
                }
            }
        }
    }

    fn max_slot_pk(&self) -> Pk {
        self.application_sections
            .iter()
            .flat_map(|s| s.allocations())
            .map(|slot| slot.pk)
            .max()
            .unwrap_or(0)
    }

    fn locate_option(&self, option_pk: Pk) -> Option<(usize, usize)> {
        self.application_sections.iter().enumerate().find_map(|(si, section)| {
            section
                .reservation_unit_options
                .iter()
                .position(|o| o.pk == option_pk)
                .map(|oi| (si, oi))
        })
    }

    fn locate_slot(&self, slot_pk: Pk) -> Option<(usize, usize, usize)> {
        for (si, section) in self.application_sections.iter().enumerate() {
            for (oi, option) in section.reservation_unit_options.iter().enumerate() {
                if let Some(ti) = option.allocated_time_slots.iter().position(|t| t.pk == slot_pk) {
                    return Some((si, oi, ti));
                }
            }
        }
        None
    }

    fn slots_on_units<'a>(&'a self, units: &'a HashSet<Pk>) -> impl Iterator<Item = &'a AllocatedTimeSlot> {
        self.application_sections
            .iter()
            .flat_map(|s| s.reservation_unit_options.iter())
            .filter(move |o| units.contains(&o.reservation_unit_pk))
            .flat_map(|o| o.allocated_time_slots.iter())
    }
}

/// Authoritative allocation rules over an in-memory round.
pub(crate) fn check_allocation(snapshot: &RoundSnapshot, input: &CreateAllocationInput) -> Result<(usize, usize), ApiError> {
    let (si, oi) = snapshot
        .locate_option(input.reservation_unit_option)
        .ok_or_else(|| ApiError::not_found(format!("reservation unit option {}", input.reservation_unit_option)))?;
    let section = &snapshot.application_sections[si];
    let option = &section.reservation_unit_options[oi];

    if snapshot.round_status != ApplicationRoundStatus::InAllocation {
        return Err(ApiError::server(
            codes::ROUND_STATUS_NOT_ALLOCATING,
            "Application round is not in allocation.",
        ));
    }
    if section.is_terminal() {
        return Err(ApiError::server(
            codes::SECTION_STATUS_TERMINAL,
            format!("Cannot allocate to application section in status: '{:?}'", section.status),
        ));
    }
    if option.locked || option.rejected {
        return Err(ApiError::server(codes::OPTION_LOCKED, "Reservation unit option is locked or rejected."));
    }

    let span = input.span();
    let seconds = span.duration() * 60;
    if span.start >= span.end
        || seconds < section.reservation_min_duration
        || seconds > section.reservation_max_duration
    {
        return Err(ApiError::server(
            codes::DURATION_INVALID,
            "Allocation duration does not fit the application section's limits.",
        ));
    }

    let existing = section.allocation_count();
    if existing >= section.applied_reservations_per_week as usize {
        return Err(ApiError::server(
            codes::MAX_ALLOCATIONS_REACHED,
            "Application section has already been allocated the maximum number of allocations.",
        ));
    }
    if section.allocations().any(|slot| slot.day_of_the_week == input.day_of_the_week) {
        return Err(ApiError::server(
            codes::DAY_ALREADY_ALLOCATED,
            "Application section has already been allocated on this day of the week.",
        ));
    }

    let mut units = snapshot.related_units(option.reservation_unit_pk);
    units.insert(option.reservation_unit_pk);
    if let Some(other) = snapshot
        .slots_on_units(&units)
        .filter(|slot| slot.application_section_pk != section.pk)
        .find(|slot| slot.day_of_the_week == input.day_of_the_week && slot.span().overlaps(&span))
    {
        return Err(ApiError::server(
            codes::ALLOCATION_OVERLAPPING,
            format!("Given time slot overlaps with allocation {} on a related reservation unit.", other.pk),
        ));
    }

    if !input.force {
        let inside_range = section
            .suitable_time_ranges
            .iter()
            .any(|r| r.day_of_the_week == input.day_of_the_week && r.span().contains_span(&span));
        if !inside_range {
            return Err(ApiError::server(
                codes::OUTSIDE_SUITABLE_RANGE,
                "Given time slot is not within the applicant's suitable time ranges.",
            ));
        }
        let open = snapshot
            .unit(option.reservation_unit_pk)
            .map(|u| week_opening_hours(&u.opening_hours)[input.day_of_the_week.index()].covers(&span))
            .unwrap_or(false);
        if !open {
            return Err(ApiError::server(
                codes::OUTSIDE_OPENING_HOURS,
                "Given time slot is not within the reservation unit's opening hours.",
            ));
        }
    }

    Ok((si, oi))
}

/// In-memory stand-in for the allocation server.
pub struct InMemoryBackend {
    snapshot: RwLock<RoundSnapshot>,
    next_pk: AtomicU64,
}

impl InMemoryBackend {
    pub fn new(mut snapshot: RoundSnapshot) -> Self {
        snapshot.normalize();
        let next_pk = snapshot.max_slot_pk() + 1;
        Self {
            snapshot: RwLock::new(snapshot),
            next_pk: AtomicU64::new(next_pk),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub async fn snapshot(&self) -> RoundSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Apply an out-of-band change, as another staff user would.
    pub async fn update(&self, f: impl FnOnce(&mut RoundSnapshot)) {
        let mut guard = self.snapshot.write().await;
        f(&mut guard);
        guard.normalize();
    }
}

#[async_trait]
impl AllocationApi for InMemoryBackend {
    async fn fetch_round(&self, query: &RoundQuery) -> Result<RoundData, ApiError> {
        let guard = self.snapshot.read().await;
        if guard.application_round_pk != query.application_round_pk {
            return Err(ApiError::not_found(format!("application round {}", query.application_round_pk)));
        }
        let unit = guard
            .unit(query.reservation_unit_pk)
            .ok_or_else(|| ApiError::not_found(format!("reservation unit {}", query.reservation_unit_pk)))?;

        let sections = guard
            .application_sections
            .iter()
            .filter(|s| s.option_for_unit(unit.pk).is_some())
            .cloned()
            .collect();

        Ok(RoundData {
            application_round_pk: guard.application_round_pk,
            round_status: guard.round_status,
            reservation_unit_pk: unit.pk,
            reservation_period_begin: Some(guard.reservation_period_begin),
            reservation_period_end: Some(guard.reservation_period_end),
            opening_hours: week_opening_hours(&unit.opening_hours).to_vec(),
            application_sections: sections,
            affecting_allocations: Vec::new(),
        })
    }

    async fn fetch_affecting_allocations(&self, query: &AffectingQuery) -> Result<Vec<AllocatedTimeSlot>, ApiError> {
        let guard = self.snapshot.read().await;
        if query.end_date < guard.reservation_period_begin || query.begin_date > guard.reservation_period_end {
            return Ok(Vec::new());
        }
        let related = guard.related_units(query.reservation_unit_pk);
        Ok(guard.slots_on_units(&related).cloned().collect())
    }

    async fn create_allocation(&self, input: &CreateAllocationInput) -> Result<AllocatedTimeSlot, ApiError> {
        let mut guard = self.snapshot.write().await;
        let (si, oi) = check_allocation(&guard, input)?;

        let section = &mut guard.application_sections[si];
        let section_pk = section.pk;
        if section.status == ApplicationSectionStatus::Unallocated {
            section.status = ApplicationSectionStatus::InAllocation;
        }
        let option = &mut section.reservation_unit_options[oi];
        let slot = AllocatedTimeSlot {
            pk: self.next_pk.fetch_add(1, Ordering::Relaxed),
            day_of_the_week: input.day_of_the_week,
            begin_time: input.begin_time,
            end_time: input.end_time,
            reservation_unit_option_pk: option.pk,
            application_section_pk: section_pk,
            reservation_unit_pk: option.reservation_unit_pk,
        };
        option.allocated_time_slots.push(slot.clone());
        debug!("allocated slot {} for section {section_pk}", slot.pk);
        Ok(slot)
    }

    async fn delete_allocation(&self, input: &DeleteAllocationInput) -> Result<DeletedAllocation, ApiError> {
        let mut guard = self.snapshot.write().await;
        let (si, oi, ti) = guard
            .locate_slot(input.pk)
            .ok_or_else(|| ApiError::not_found(format!("allocated time slot {}", input.pk)))?;
        let section = &mut guard.application_sections[si];
        section.reservation_unit_options[oi].allocated_time_slots.remove(ti);
        if section.status == ApplicationSectionStatus::InAllocation && section.allocation_count() == 0 {
            section.status = ApplicationSectionStatus::Unallocated;
        }
        debug!("deleted slot {} of section {}", input.pk, section.pk);
        Ok(DeletedAllocation { deleted: true })
    }
}
