use std::time::Duration;

use thiserror::Error;

/// Why a single network fetch failed. The sync machine never branches on
/// the reason, it only surfaces it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    pub fn transport(reason: impl ToString) -> Self {
        FetchError::Transport(reason.to_string())
    }
}

pub type FetchResult<T> = Result<T, FetchError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("field {field} is not a number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("field {field} is out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },
    #[error("unknown weekday: {0:?}")]
    UnknownWeekday(String),
}

/// Errors surfaced by the sync machine while it sits in one of its error
/// phases.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("no network credentials configured")]
    Configuration,
    #[error("{0}")]
    Transport(#[from] FetchError),
    #[error("malformed time payload: {0}")]
    Parse(#[from] PayloadError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_display_is_verbatim() {
        let err = SyncError::from(FetchError::transport("connection refused"));
        assert_eq!(err.to_string(), "transport error: connection refused");

        let err = SyncError::from(PayloadError::UnknownWeekday("Caturday".to_string()));
        assert_eq!(
            err.to_string(),
            "malformed time payload: unknown weekday: \"Caturday\""
        );
        assert_eq!(
            SyncError::Configuration.to_string(),
            "no network credentials configured"
        );
    }
}
