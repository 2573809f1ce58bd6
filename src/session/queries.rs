use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::api::{AffectingQuery, RoundQuery};
use crate::model::*;
use crate::observability::{REFRESHES_TOTAL, REFRESH_DURATION_SECONDS};

use super::error::{classify_api_error, AllocationError};
use super::{AllocationSession, Phase};

impl AllocationSession {
    /// Re-query the round and the allocations on related units. Local data is
    /// only ever replaced, never patched. A result that lands after a later
    /// refresh already applied is dropped.
    pub async fn refresh(&self) -> Result<(), AllocationError> {
        let seq = self.refresh_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();
        let result = self.fetch().await;
        metrics::histogram!(REFRESH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        let data = match result {
            Ok(data) => {
                metrics::counter!(REFRESHES_TOTAL, "status" => "ok").increment(1);
                data
            }
            Err(err) => {
                metrics::counter!(REFRESHES_TOTAL, "status" => "error").increment(1);
                warn!("session {} refresh failed: {err}", self.id());
                return Err(err);
            }
        };

        let unit = self.context().reservation_unit_pk;
        let mut guard = self.state.write().await;
        if seq < guard.applied_refresh {
            debug!(
                "session {}: dropped refresh {seq}, refresh {} already applied",
                self.id(),
                guard.applied_refresh
            );
            return Ok(());
        }
        guard.applied_refresh = seq;

        let section_gone = guard.focused_section.is_some_and(|pk| {
            !guard
                .filter
                .apply(&data.application_sections, unit)
                .iter()
                .any(|s| s.pk == pk)
        });
        if section_gone {
            info!(
                "session {}: focused section {:?} left the dataset, clearing selection",
                self.id(),
                guard.focused_section
            );
            guard.selection = None;
            guard.focused_section = None;
            guard.focused_allocation = None;
        } else if let Some(pk) = guard.focused_allocation
            && !allocation_exists(&data, pk)
        {
            guard.focused_allocation = None;
        }

        debug!(
            "session {} refreshed: {} sections, {} affecting allocations",
            self.id(),
            data.application_sections.len(),
            data.affecting_allocations.len()
        );
        guard.data = Some(data);
        if section_gone || matches!(guard.phase, Phase::Ready(_)) {
            guard.settle_phase();
        }
        self.persist(&guard);
        Ok(())
    }

    async fn fetch(&self) -> Result<RoundData, AllocationError> {
        let context = self.context();
        let mut data = self
            .api
            .fetch_round(&RoundQuery {
                application_round_pk: context.application_round_pk,
                reservation_unit_pk: context.reservation_unit_pk,
            })
            .await
            .map_err(|e| classify_api_error(&e))?;

        if let (Some(begin_date), Some(end_date)) = (data.reservation_period_begin, data.reservation_period_end) {
            data.affecting_allocations = self
                .api
                .fetch_affecting_allocations(&AffectingQuery {
                    reservation_unit_pk: context.reservation_unit_pk,
                    begin_date,
                    end_date,
                })
                .await
                .map_err(|e| classify_api_error(&e))?;
        }
        Ok(data)
    }
}

fn allocation_exists(data: &RoundData, pk: Pk) -> bool {
    data.application_sections
        .iter()
        .flat_map(|s| s.allocations())
        .chain(data.affecting_allocations.iter())
        .any(|slot| slot.pk == pk)
}
