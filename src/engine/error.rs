use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::model::TIME_FORMAT;
use crate::store::StoreError;

/// Why a schedule could not be created.
#[derive(Debug)]
pub enum ScheduleError {
    /// `start` is not strictly before `end`.
    InvalidInterval { start: NaiveTime, end: NaiveTime },
    /// Resource missing or inactive.
    ResourceUnavailable(Ulid),
    /// A live entry for the same owner and date overlaps the request.
    SchedulingConflict {
        owner: String,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        conflicting_id: Ulid,
    },
    /// The store refused the entry on a hard cap (entries per owner-day).
    LimitExceeded(&'static str),
    StoreFailure(StoreError),
}

impl ScheduleError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ScheduleError::InvalidInterval { .. } => "invalid_interval",
            ScheduleError::ResourceUnavailable(_) => "resource_unavailable",
            ScheduleError::SchedulingConflict { .. } => "scheduling_conflict",
            ScheduleError::LimitExceeded(_) => "limit_exceeded",
            ScheduleError::StoreFailure(_) => "store_failure",
        }
    }
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleError::InvalidInterval { start, end } => write!(
                f,
                "invalid interval: start {} must be before end {}",
                start.format(TIME_FORMAT),
                end.format(TIME_FORMAT)
            ),
            ScheduleError::ResourceUnavailable(id) => {
                write!(f, "resource unavailable: {id} does not exist or is inactive")
            }
            ScheduleError::SchedulingConflict {
                owner,
                date,
                start,
                end,
                ..
            } => write!(
                f,
                "scheduling conflict: {owner} is already booked on {date} from {} to {}",
                start.format(TIME_FORMAT),
                end.format(TIME_FORMAT)
            ),
            ScheduleError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            ScheduleError::StoreFailure(e) => write!(f, "store failure: {e}"),
        }
    }
}

impl std::error::Error for ScheduleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScheduleError::StoreFailure(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for ScheduleError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::LimitExceeded(msg) => ScheduleError::LimitExceeded(msg),
            other => ScheduleError::StoreFailure(other),
        }
    }
}

/// Errors from cancellation, reads and catalog administration.
#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    AlreadyCancelled(Ulid),
    InvalidInput(&'static str),
    LimitExceeded(&'static str),
    StoreFailure(StoreError),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::AlreadyCancelled(_) => "already_cancelled",
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::StoreFailure(_) => "store_failure",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::AlreadyCancelled(id) => write!(f, "already cancelled: {id}"),
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::StoreFailure(e) => write!(f, "store failure: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            StoreError::AlreadyExists(id) => EngineError::AlreadyExists(id),
            StoreError::AlreadyCancelled(id) => EngineError::AlreadyCancelled(id),
            StoreError::LimitExceeded(msg) => EngineError::LimitExceeded(msg),
            other @ (StoreError::Wal(_) | StoreError::Aborted(_)) => EngineError::StoreFailure(other),
        }
    }
}
