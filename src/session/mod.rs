mod error;
mod mutations;
mod queries;
mod readiness;

pub use error::{classify_api_error, AllocationError, LocalFault, Rejection};
pub use mutations::{AcceptRequest, RemoveOutcome};
pub use readiness::{evaluate, Blocker, Readiness, ReadyAllocation};

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::debug;
use ulid::Ulid;

use crate::api::AllocationApi;
use crate::classify::{classify, SectionAllocationState};
use crate::filter::{reduce, FilterCommand, FilterState};
use crate::grid::{Grid, GridWindow};
use crate::model::*;
use crate::notify::RefreshHub;
use crate::selection::{expand_selection, CellKey, Selection, SelectionWindow};
use crate::state::{SelectionState, SelectionStore};

/// The round and reservation unit one allocation view works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionContext {
    pub application_round_pk: Pk,
    pub reservation_unit_pk: Pk,
}

/// ```text
/// Idle -> Selecting -> Ready -> Submitting -> { Committed | Failed }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Selecting,
    Ready(ReadyAllocation),
    /// Names the request that currently owns the phase.
    Submitting(Ulid),
    Committed,
    Failed(AllocationError),
}

/// What a request is submitting; two in-flight requests never share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubmissionKey {
    Accept { option_pk: Pk, window: SelectionWindow },
    Remove { pk: Pk },
}

#[derive(Debug)]
pub(super) struct InFlight {
    pub(super) key: SubmissionKey,
    pub(super) started: Instant,
}

#[derive(Debug)]
pub(super) struct SessionState {
    pub(super) data: Option<RoundData>,
    pub(super) selection: Option<Selection>,
    pub(super) focused_section: Option<Pk>,
    pub(super) focused_allocation: Option<Pk>,
    pub(super) filter: FilterState,
    pub(super) phase: Phase,
    /// Sequence number of the refresh whose data is in `data`.
    pub(super) applied_refresh: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            data: None,
            selection: None,
            focused_section: None,
            focused_allocation: None,
            filter: FilterState::default(),
            phase: Phase::Idle,
            applied_refresh: 0,
        }
    }

    /// Phase after the selection or focus changed, unless a request owns it.
    fn settle_phase(&mut self) {
        if matches!(self.phase, Phase::Submitting(_)) {
            return;
        }
        self.phase = if self.selection.is_some() {
            Phase::Selecting
        } else {
            Phase::Idle
        };
    }
}

/// One staff user's allocation view of a round and reservation unit.
pub struct AllocationSession {
    id: Ulid,
    context: SessionContext,
    pub(super) api: Arc<dyn AllocationApi>,
    store: Arc<dyn SelectionStore>,
    pub(super) hub: Arc<RefreshHub>,
    window: GridWindow,
    pub(super) state: RwLock<SessionState>,
    pub(super) in_flight: DashMap<Ulid, InFlight>,
    /// Issued to each refresh before it fetches.
    pub(super) refresh_seq: AtomicU64,
}

impl AllocationSession {
    pub fn new(
        context: SessionContext,
        api: Arc<dyn AllocationApi>,
        store: Arc<dyn SelectionStore>,
        hub: Arc<RefreshHub>,
    ) -> Self {
        Self {
            id: Ulid::new(),
            context,
            api,
            store,
            hub,
            window: GridWindow::default(),
            state: RwLock::new(SessionState::new()),
            in_flight: DashMap::new(),
            refresh_seq: AtomicU64::new(0),
        }
    }

    pub fn with_window(mut self, window: GridWindow) -> Self {
        self.window = window;
        self
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn context(&self) -> SessionContext {
        self.context
    }

    pub fn hub(&self) -> &Arc<RefreshHub> {
        &self.hub
    }

    fn persist(&self, state: &SessionState) {
        let encoded = SelectionState::new(
            state.focused_section,
            state.selection.as_ref(),
            state.focused_allocation,
        )
        .encode();
        self.store.write(encoded);
    }

    /// Load focus and selection from the store. Malformed entries are dropped.
    pub async fn restore(&self) {
        let stored = SelectionState::decode(&self.store.read());
        let mut guard = self.state.write().await;
        guard.focused_section = stored.section;
        guard.selection = stored.selection();
        guard.focused_allocation = stored.allocated;
        guard.settle_phase();
        debug!(
            "session {} restored section={:?} selection={}",
            self.id,
            guard.focused_section,
            guard.selection.as_ref().map(|s| s.window().to_string()).unwrap_or_default()
        );
        self.persist(&guard);
    }

    /// Replace the selection and focus `section`. Returns false, clearing the
    /// selection, when `keys` are empty, span days, or have gaps.
    pub async fn select(&self, keys: impl IntoIterator<Item = CellKey>, section: Option<Pk>) -> bool {
        let selection = Selection::new(keys);
        let valid = selection.is_some();
        let mut guard = self.state.write().await;
        guard.selection = selection;
        if section.is_some() {
            guard.focused_section = section;
        }
        guard.settle_phase();
        self.persist(&guard);
        valid
    }

    /// Select every cell between two `day-hour-minute` keys, inclusive.
    pub async fn select_range(&self, begin: &str, end: &str, section: Option<Pk>) -> bool {
        self.select(expand_selection(begin, end), section).await
    }

    pub async fn clear_selection(&self) {
        let mut guard = self.state.write().await;
        guard.selection = None;
        guard.settle_phase();
        self.persist(&guard);
    }

    pub async fn focus_section(&self, section: Option<Pk>) {
        let mut guard = self.state.write().await;
        guard.focused_section = section;
        guard.settle_phase();
        self.persist(&guard);
    }

    pub async fn focus_allocation(&self, allocation: Option<Pk>) {
        let mut guard = self.state.write().await;
        guard.focused_allocation = allocation;
        self.persist(&guard);
    }

    pub async fn dispatch_filter(&self, command: FilterCommand) {
        let mut guard = self.state.write().await;
        let filter = std::mem::take(&mut guard.filter);
        guard.filter = reduce(filter, command);
    }

    /// Check the current selection against `option_pk` and move to `Ready`
    /// when it passes.
    pub async fn evaluate(&self, option_pk: Pk) -> Readiness {
        let mut guard = self.state.write().await;
        let readiness = readiness::evaluate(
            guard.data.as_ref(),
            guard.selection.as_ref(),
            guard.focused_section,
            option_pk,
        );
        let has_selection = guard.selection.is_some();
        if !matches!(guard.phase, Phase::Submitting(_)) {
            guard.phase = match &readiness {
                Readiness::Ready(ready) => Phase::Ready(ready.clone()),
                Readiness::Blocked(_) if has_selection => Phase::Selecting,
                Readiness::Blocked(_) => Phase::Idle,
            };
        }
        readiness
    }

    pub async fn phase(&self) -> Phase {
        self.state.read().await.phase.clone()
    }

    pub async fn selection(&self) -> Option<Selection> {
        self.state.read().await.selection.clone()
    }

    pub async fn focused_section(&self) -> Option<Pk> {
        self.state.read().await.focused_section
    }

    pub async fn focused_allocation(&self) -> Option<Pk> {
        self.state.read().await.focused_allocation
    }

    pub async fn filter(&self) -> FilterState {
        self.state.read().await.filter.clone()
    }

    pub async fn data(&self) -> Option<RoundData> {
        self.state.read().await.data.clone()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// The weekly grid painted with the focused section's preferences.
    pub async fn grid(&self) -> Grid {
        let guard = self.state.read().await;
        let Some(data) = guard.data.as_ref() else {
            return self.window.build(&week_opening_hours(&[]), &[]);
        };
        let preferences = guard
            .focused_section
            .and_then(|pk| data.section(pk))
            .map(|s| s.suitable_time_ranges.as_slice())
            .unwrap_or_default();
        self.window.build(&data.week(), preferences)
    }

    pub async fn section_state(&self, section_pk: Pk) -> Option<SectionAllocationState> {
        let guard = self.state.read().await;
        let section = guard.data.as_ref()?.section(section_pk)?;
        Some(classify(section, self.context.reservation_unit_pk))
    }

    /// Sections passing the current filter, with their classification.
    pub async fn visible_sections(&self) -> Vec<(ApplicationSection, SectionAllocationState)> {
        let guard = self.state.read().await;
        let Some(data) = guard.data.as_ref() else {
            return Vec::new();
        };
        let unit = self.context.reservation_unit_pk;
        guard
            .filter
            .apply(&data.application_sections, unit)
            .into_iter()
            .map(|s| (s.clone(), classify(s, unit)))
            .collect()
    }

    /// The focused section's option on this session's unit.
    pub async fn focused_option(&self) -> Option<ReservationUnitOption> {
        let guard = self.state.read().await;
        let data = guard.data.as_ref()?;
        data.section(guard.focused_section?)?
            .option_for_unit(self.context.reservation_unit_pk)
            .cloned()
    }
}
