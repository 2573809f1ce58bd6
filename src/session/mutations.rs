use std::time::Instant;

use tracing::{info, warn};
use ulid::Ulid;

use crate::api::DeleteAllocationInput;
use crate::collision::matching_time_range;
use crate::model::*;
use crate::observability::{
    error_label, IN_FLIGHT_REQUESTS, LOCAL_REJECTIONS_TOTAL, MUTATIONS_TOTAL, MUTATION_DURATION_SECONDS,
};
use crate::selection::SelectionWindow;

use super::error::{classify_api_error, AllocationError, LocalFault};
use super::readiness::ReadyAllocation;
use super::{AllocationSession, InFlight, Phase, SessionState, SubmissionKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptRequest {
    pub option_pk: Pk,
    /// The applicant's range the selection falls into. Looked up from the
    /// focused section when absent.
    pub time_range: Option<SuitableTimeRange>,
    /// Skip the server's soft checks (suitable range, opening hours).
    pub force: bool,
}

impl AcceptRequest {
    pub fn new(option_pk: Pk) -> Self {
        Self {
            option_pk,
            time_range: None,
            force: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// Someone else deleted it first. Not an error.
    AlreadyRemoved,
}

impl AllocationSession {
    fn local_fault(&self, kind: &'static str, fault: LocalFault) -> AllocationError {
        warn!("session {} refused {kind}: {fault}", self.id());
        metrics::counter!(LOCAL_REJECTIONS_TOTAL, "kind" => kind).increment(1);
        AllocationError::InvalidLocalState(fault)
    }

    /// Register a request under `key` and hand it the phase. Caller holds the
    /// state write lock, so the check and the insert cannot interleave.
    fn begin_request(&self, state: &mut SessionState, key: SubmissionKey) -> Result<Ulid, AllocationError> {
        if self.in_flight.iter().any(|entry| entry.value().key == key) {
            return Err(AllocationError::AlreadySubmitting);
        }
        let request_id = Ulid::new();
        self.in_flight.insert(
            request_id,
            InFlight {
                key,
                started: Instant::now(),
            },
        );
        metrics::gauge!(IN_FLIGHT_REQUESTS).increment(1.0);
        state.phase = Phase::Submitting(request_id);
        Ok(request_id)
    }

    /// Clears only this request's entry; returns its duration in seconds.
    fn finish_request(&self, request_id: Ulid) -> f64 {
        let Some((_, in_flight)) = self.in_flight.remove(&request_id) else {
            return 0.0;
        };
        metrics::gauge!(IN_FLIGHT_REQUESTS).decrement(1.0);
        in_flight.started.elapsed().as_secs_f64()
    }

    /// Commit the current selection as an allocation through `option_pk`.
    pub async fn accept(&self, request: AcceptRequest) -> Result<AllocatedTimeSlot, AllocationError> {
        let (request_id, window, input) = {
            let mut guard = self.state.write().await;
            let Some(selection) = guard.selection.as_ref() else {
                return Err(self.local_fault("accept", LocalFault::NoSelection));
            };
            let window = selection.window();
            if request.option_pk == 0 {
                return Err(self.local_fault("accept", LocalFault::NoOption));
            }
            let Some(data) = guard.data.as_ref() else {
                return Err(self.local_fault("accept", LocalFault::NoData));
            };
            let Some(section) = guard
                .focused_section
                .and_then(|pk| data.section(pk))
                .filter(|s| s.option(request.option_pk).is_some())
            else {
                return Err(self.local_fault("accept", LocalFault::UnknownOption));
            };
            let Some(time_range) = request
                .time_range
                .clone()
                .or_else(|| matching_time_range(section, &window).cloned())
            else {
                return Err(self.local_fault("accept", LocalFault::NoTimeRange));
            };

            let input = ReadyAllocation {
                option_pk: request.option_pk,
                section_pk: section.pk,
                window,
                time_range,
            }
            .input(request.force);
            let key = SubmissionKey::Accept {
                option_pk: request.option_pk,
                window,
            };
            let request_id = self.begin_request(&mut guard, key)?;
            (request_id, window, input)
        };

        info!(
            "session {} request {request_id}: allocate {window} via option {}",
            self.id(),
            request.option_pk
        );
        let result = self.api.create_allocation(&input).await;
        let elapsed = self.finish_request(request_id);
        metrics::histogram!(MUTATION_DURATION_SECONDS, "kind" => "accept").record(elapsed);

        match result {
            Ok(slot) => {
                metrics::counter!(MUTATIONS_TOTAL, "kind" => "accept", "status" => "ok").increment(1);
                info!("session {} request {request_id}: allocated slot {}", self.id(), slot.pk);
                self.after_commit(request_id, Some(window), None).await;
                self.hub.send(
                    self.context().application_round_pk,
                    &AllocationEvent::Created {
                        origin: self.id(),
                        slot: slot.clone(),
                    },
                );
                Ok(slot)
            }
            Err(e) => {
                let err = classify_api_error(&e);
                metrics::counter!(MUTATIONS_TOTAL, "kind" => "accept", "status" => error_label(&err)).increment(1);
                warn!("session {} request {request_id}: allocation failed: {e}", self.id());
                let gone = err == AllocationError::NotFound;
                self.after_failure(request_id, &err, gone).await;
                Err(err)
            }
        }
    }

    /// Delete a committed allocation. A slot without an id never reaches the
    /// server.
    pub async fn remove(&self, slot: &AllocatedTimeSlot) -> Result<RemoveOutcome, AllocationError> {
        if slot.pk == 0 {
            return Err(self.local_fault("remove", LocalFault::NoAllocation));
        }
        let request_id = {
            let mut guard = self.state.write().await;
            self.begin_request(&mut guard, SubmissionKey::Remove { pk: slot.pk })?
        };

        info!("session {} request {request_id}: remove slot {}", self.id(), slot.pk);
        let result = self.api.delete_allocation(&DeleteAllocationInput { pk: slot.pk }).await;
        let elapsed = self.finish_request(request_id);
        metrics::histogram!(MUTATION_DURATION_SECONDS, "kind" => "remove").record(elapsed);

        let outcome = match result {
            Ok(deleted) if deleted.deleted => RemoveOutcome::Removed,
            Ok(_) => RemoveOutcome::AlreadyRemoved,
            Err(e) => match classify_api_error(&e) {
                AllocationError::NotFound => RemoveOutcome::AlreadyRemoved,
                err => {
                    metrics::counter!(MUTATIONS_TOTAL, "kind" => "remove", "status" => error_label(&err)).increment(1);
                    warn!("session {} request {request_id}: remove failed: {e}", self.id());
                    self.after_failure(request_id, &err, false).await;
                    return Err(err);
                }
            },
        };

        let status = match outcome {
            RemoveOutcome::Removed => "ok",
            RemoveOutcome::AlreadyRemoved => "already_removed",
        };
        metrics::counter!(MUTATIONS_TOTAL, "kind" => "remove", "status" => status).increment(1);
        info!("session {} request {request_id}: slot {} {status}", self.id(), slot.pk);

        self.after_commit(request_id, None, Some(slot.pk)).await;
        if outcome == RemoveOutcome::Removed {
            self.hub.send(
                self.context().application_round_pk,
                &AllocationEvent::Removed {
                    origin: self.id(),
                    pk: slot.pk,
                },
            );
        }
        Ok(outcome)
    }

    /// Re-query, then clear what the commit consumed. `submitted` limits the
    /// clearing to a selection that still covers the committed window.
    async fn after_commit(&self, request_id: Ulid, submitted: Option<SelectionWindow>, removed: Option<Pk>) {
        if let Err(err) = self.refresh().await {
            warn!("session {} refresh after commit failed: {err}", self.id());
        }
        let mut guard = self.state.write().await;
        let consumed = match submitted {
            Some(window) => guard.selection.as_ref().is_some_and(|s| s.window() == window),
            None => true,
        };
        if consumed {
            guard.selection = None;
        }
        if removed.is_some() && guard.focused_allocation == removed {
            guard.focused_allocation = None;
        }
        if matches!(guard.phase, Phase::Submitting(id) if id == request_id) {
            guard.phase = Phase::Committed;
        }
        self.persist(&guard);
    }

    async fn after_failure(&self, request_id: Ulid, err: &AllocationError, clear_selection: bool) {
        if err.wants_refresh()
            && let Err(refresh_err) = self.refresh().await
        {
            warn!("session {} refresh after failure failed: {refresh_err}", self.id());
        }
        let mut guard = self.state.write().await;
        if clear_selection {
            guard.selection = None;
            self.persist(&guard);
        }
        if matches!(guard.phase, Phase::Submitting(id) if id == request_id) {
            guard.phase = Phase::Failed(err.clone());
        }
    }
}
