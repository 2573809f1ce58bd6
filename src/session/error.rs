use thiserror::Error;

use crate::api::{codes, ApiError, ServerError};

/// Invalid local state caught before any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalFault {
    NoSelection,
    NoTimeRange,
    NoOption,
    NoAllocation,
    UnknownOption,
    NoData,
}

impl std::fmt::Display for LocalFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocalFault::NoSelection => write!(f, "no cells selected"),
            LocalFault::NoTimeRange => write!(f, "selection matches no suitable time range"),
            LocalFault::NoOption => write!(f, "no reservation unit option"),
            LocalFault::NoAllocation => write!(f, "allocation has no id"),
            LocalFault::UnknownOption => write!(f, "option does not belong to the focused section"),
            LocalFault::NoData => write!(f, "round data not loaded"),
        }
    }
}

/// Server-side refusals of an allocation mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    OverlappingAllocation,
    SectionStatusTerminal,
    AllocationCapReached,
    DuplicateWeekday,
    DurationOutOfBounds,
    OptionLocked,
    RoundNotInAllocation,
    OutsideSuitableRange,
    OutsideOpeningHours,
    Unrecognized(String),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::OverlappingAllocation => write!(f, "overlaps an existing allocation"),
            Rejection::SectionStatusTerminal => write!(f, "application section is already handled"),
            Rejection::AllocationCapReached => write!(f, "weekly allocation cap reached"),
            Rejection::DuplicateWeekday => write!(f, "already allocated on this weekday"),
            Rejection::DurationOutOfBounds => write!(f, "duration out of bounds"),
            Rejection::OptionLocked => write!(f, "reservation unit option is locked"),
            Rejection::RoundNotInAllocation => write!(f, "application round is not in allocation"),
            Rejection::OutsideSuitableRange => write!(f, "outside the suitable time ranges"),
            Rejection::OutsideOpeningHours => write!(f, "outside opening hours"),
            Rejection::Unrecognized(message) => write!(f, "{message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("invalid local state: {0}")]
    InvalidLocalState(LocalFault),
    #[error("a request for this selection is already in flight")]
    AlreadySubmitting,
    #[error("rejected: {0}")]
    Rejected(Rejection),
    #[error("not found")]
    NotFound,
    #[error("transport error: {0}")]
    Transport(String),
}

impl AllocationError {
    /// Stable key for the user-facing translation.
    pub fn message_key(&self) -> &'static str {
        match self {
            AllocationError::InvalidLocalState(_) => "allocation.error.invalidLocalState",
            AllocationError::AlreadySubmitting => "allocation.error.alreadySubmitting",
            AllocationError::NotFound => "allocation.error.notFound",
            AllocationError::Transport(_) => "allocation.error.transport",
            AllocationError::Rejected(r) => match r {
                Rejection::OverlappingAllocation => "allocation.error.overlapping",
                Rejection::SectionStatusTerminal => "allocation.error.sectionHandled",
                Rejection::AllocationCapReached => "allocation.error.maxAllocations",
                Rejection::DuplicateWeekday => "allocation.error.dayAlreadyAllocated",
                Rejection::DurationOutOfBounds => "allocation.error.duration",
                Rejection::OptionLocked => "allocation.error.optionLocked",
                Rejection::RoundNotInAllocation => "allocation.error.roundNotInAllocation",
                Rejection::OutsideSuitableRange => "allocation.error.outsideSuitableRange",
                Rejection::OutsideOpeningHours => "allocation.error.outsideOpeningHours",
                Rejection::Unrecognized(_) => "allocation.error.unknown",
            },
        }
    }

    /// Whether the shared data may have moved under us and should be re-queried.
    pub fn wants_refresh(&self) -> bool {
        matches!(self, AllocationError::Rejected(_) | AllocationError::NotFound)
    }
}

fn rejection_for_code(code: &str) -> Option<Rejection> {
    let rejection = match code {
        codes::ALLOCATION_OVERLAPPING => Rejection::OverlappingAllocation,
        codes::SECTION_STATUS_TERMINAL => Rejection::SectionStatusTerminal,
        codes::MAX_ALLOCATIONS_REACHED => Rejection::AllocationCapReached,
        codes::DAY_ALREADY_ALLOCATED => Rejection::DuplicateWeekday,
        codes::DURATION_INVALID => Rejection::DurationOutOfBounds,
        codes::OPTION_LOCKED => Rejection::OptionLocked,
        codes::ROUND_STATUS_NOT_ALLOCATING => Rejection::RoundNotInAllocation,
        codes::OUTSIDE_SUITABLE_RANGE => Rejection::OutsideSuitableRange,
        codes::OUTSIDE_OPENING_HOURS => Rejection::OutsideOpeningHours,
        _ => return None,
    };
    Some(rejection)
}

/// Fallback for servers that answer with prose only. Lowercase fragments.
const MESSAGE_FRAGMENTS: &[(&str, fn() -> Rejection)] = &[
    ("overlaps with", || Rejection::OverlappingAllocation),
    ("cannot allocate to application section in status", || Rejection::SectionStatusTerminal),
    ("maximum number of allocations", || Rejection::AllocationCapReached),
    ("already been allocated on this day", || Rejection::DuplicateWeekday),
    ("allocation duration does not fit", || Rejection::DurationOutOfBounds),
    ("option is locked or rejected", || Rejection::OptionLocked),
    ("round is not in allocation", || Rejection::RoundNotInAllocation),
    ("suitable time range", || Rejection::OutsideSuitableRange),
    ("opening hours", || Rejection::OutsideOpeningHours),
];

fn classify_server_error(error: &ServerError) -> Option<AllocationError> {
    if let Some(code) = error.code.as_deref() {
        if code == codes::NOT_FOUND {
            return Some(AllocationError::NotFound);
        }
        if let Some(rejection) = rejection_for_code(code) {
            return Some(AllocationError::Rejected(rejection));
        }
    }
    let message = error.message.to_lowercase();
    if message.contains("not found") || message.contains("does not exist") {
        return Some(AllocationError::NotFound);
    }
    MESSAGE_FRAGMENTS
        .iter()
        .find(|(fragment, _)| message.contains(fragment))
        .map(|(_, rejection)| AllocationError::Rejected(rejection()))
}

/// Map a raw transport/server failure onto the closed taxonomy.
/// Codes win over message fragments; the first recognizable entry wins.
pub fn classify_api_error(error: &ApiError) -> AllocationError {
    match error {
        ApiError::Transport(message) => AllocationError::Transport(message.clone()),
        ApiError::Server(errors) => errors
            .iter()
            .filter(|e| e.code.is_some())
            .chain(errors.iter().filter(|e| e.code.is_none()))
            .find_map(classify_server_error)
            .unwrap_or_else(|| {
                let message = errors
                    .first()
                    .map(|e| e.message.clone())
                    .unwrap_or_default();
                AllocationError::Rejected(Rejection::Unrecognized(message))
            }),
    }
}
