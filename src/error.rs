//! Centralized error type for the planning kernel.
//!
//! Library code never panics; every fallible operation returns `Result<T>`.

use thiserror::Error;

/// Domain-invariant error codes the spec requires callers to pattern-match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainCode {
    /// `set_status(in_progress)` on a blocked item without `override`.
    Blocked,
    /// `start_timer` while a running timer already exists.
    TimerAlreadyRunning,
    /// `stop_timer` with no running timer.
    NoRunningTimer,
}

impl std::fmt::Display for DomainCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DomainCode::Blocked => "BLOCKED",
            DomainCode::TimerAlreadyRunning => "TIMER_ALREADY_RUNNING",
            DomainCode::NoRunningTimer => "NO_RUNNING_TIMER",
        };
        f.write_str(s)
    }
}

/// Primary error type for the planning kernel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Input missing/mis-typed/out-of-range; `field` names the offender.
    #[error("{field} {reason}")]
    Validation { field: String, reason: String },

    /// One of the three named domain-invariant codes.
    #[error("{message}")]
    Domain { code: DomainCode, message: String },

    /// Referenced entity does not exist (item, block, dependency, ...).
    #[error("{0}")]
    NotFound(String),

    /// Would-create-cycle, duplicate edge, self-dependency, etc.
    #[error("{0}")]
    Conflict(String),

    /// Uncaught failure, always surfaced after a transaction rollback.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation { field: field.into(), reason: reason.into() }
    }

    pub fn blocked() -> Self {
        Error::Domain { code: DomainCode::Blocked, message: "item is blocked".into() }
    }

    pub fn timer_already_running() -> Self {
        Error::Domain {
            code: DomainCode::TimerAlreadyRunning,
            message: "a timer is already running".into(),
        }
    }

    pub fn no_running_timer() -> Self {
        Error::Domain { code: DomainCode::NoRunningTimer, message: "no running timer".into() }
    }

    /// The structured `{code, message}` codes the wire format exposes, if any.
    pub fn code(&self) -> Option<DomainCode> {
        match self {
            Error::Domain { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Internal(format!("store error: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("serialization error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_code_display_matches_wire_codes() {
        assert_eq!(DomainCode::Blocked.to_string(), "BLOCKED");
        assert_eq!(DomainCode::TimerAlreadyRunning.to_string(), "TIMER_ALREADY_RUNNING");
        assert_eq!(DomainCode::NoRunningTimer.to_string(), "NO_RUNNING_TIMER");
    }

    #[test]
    fn validation_error_includes_field_name() {
        let err = Error::validation("due_at", "must be a finite integer");
        assert_eq!(err.to_string(), "due_at must be a finite integer");
    }

    #[test]
    fn rusqlite_errors_convert_to_internal() {
        let sqlite_err = rusqlite::Error::QueryReturnedNoRows;
        let err: Error = sqlite_err.into();
        matches!(err, Error::Internal(_));
    }
}
