use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::*;

/// Error codes the allocation mutations return.
pub mod codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const ALLOCATION_OVERLAPPING: &str = "ALLOCATION_OVERLAPPING";
    pub const ROUND_STATUS_NOT_ALLOCATING: &str = "ALLOCATION_ROUND_STATUS_NOT_IN_ALLOCATION";
    pub const SECTION_STATUS_TERMINAL: &str = "ALLOCATION_SECTION_STATUS_INVALID";
    pub const OPTION_LOCKED: &str = "ALLOCATION_OPTION_LOCKED";
    pub const MAX_ALLOCATIONS_REACHED: &str = "ALLOCATION_MAX_REACHED";
    pub const DAY_ALREADY_ALLOCATED: &str = "ALLOCATION_DAY_ALREADY_ALLOCATED";
    pub const DURATION_INVALID: &str = "ALLOCATION_DURATION_INVALID";
    pub const OUTSIDE_SUITABLE_RANGE: &str = "ALLOCATION_OUTSIDE_SUITABLE_RANGE";
    pub const OUTSIDE_OPENING_HOURS: &str = "ALLOCATION_OUTSIDE_OPENING_HOURS";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundQuery {
    pub application_round_pk: Pk,
    pub reservation_unit_pk: Pk,
}

/// Allocations on units sharing capacity with `reservation_unit_pk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectingQuery {
    pub reservation_unit_pk: Pk,
    pub begin_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAllocationInput {
    pub reservation_unit_option: Pk,
    pub day_of_the_week: Weekday,
    pub begin_time: TimeOfDay,
    pub end_time: TimeOfDay,
    /// Skip soft server checks the client has already performed.
    pub force: bool,
}

impl DayTime for CreateAllocationInput {
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAllocationInput {
    pub pk: Pk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedAllocation {
    pub deleted: bool,
}

/// One entry of a GraphQL `errors` array, flattened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// What the transport hands back on failure, unclassified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server error: {}", summary(.0))]
    Server(Vec<ServerError>),
}

fn summary(errors: &[ServerError]) -> String {
    errors
        .iter()
        .map(|e| match &e.code {
            Some(code) => format!("[{code}] {}", e.message),
            None => e.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl ApiError {
    pub fn server(code: &str, message: impl Into<String>) -> Self {
        ApiError::Server(vec![ServerError {
            message: message.into(),
            code: Some(code.to_string()),
        }])
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::server(codes::NOT_FOUND, format!("{what} not found"))
    }
}

/// Queries and mutations the allocation view runs against the server.
#[async_trait]
pub trait AllocationApi: Send + Sync {
    async fn fetch_round(&self, query: &RoundQuery) -> Result<RoundData, ApiError>;

    async fn fetch_affecting_allocations(&self, query: &AffectingQuery) -> Result<Vec<AllocatedTimeSlot>, ApiError>;

    async fn create_allocation(&self, input: &CreateAllocationInput) -> Result<AllocatedTimeSlot, ApiError>;

    async fn delete_allocation(&self, input: &DeleteAllocationInput) -> Result<DeletedAllocation, ApiError>;
}
