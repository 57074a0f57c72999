//! Errors - エラー型と分類

use thiserror::Error;

use super::timestamp::TimestampError;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（リトライ推奨）。lock timeout, busy database.
/// - Permanent: 恒久的なエラー（リトライ無意味）。malformed input.
/// - Infrastructure: インフラエラー（I/O, corrupt storage）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// Storage layer failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer holds the row (lock timeout, busy, serialization failure).
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("sqlite: {0}")]
    Sql(rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt {column} in stored row: {message}")]
    Corrupt {
        column: &'static str,
        message: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        match value.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) => {
                StoreError::Conflict(value.to_string())
            }
            _ => StoreError::Sql(value),
        }
    }
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Conflict(_) => ErrorKind::Transient,
            StoreError::InvalidInput(_) => ErrorKind::Permanent,
            StoreError::Sql(_) | StoreError::Io(_) | StoreError::Corrupt { .. } => {
                ErrorKind::Infrastructure
            }
        }
    }
}

/// Top-level error for reconcile, heartbeat and retention calls.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Timestamp(#[from] TimestampError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
}

impl MonitorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MonitorError::Store(err) => err.kind(),
            MonitorError::Timestamp(_) | MonitorError::InvalidField { .. } => ErrorKind::Permanent,
        }
    }

    /// Transient conflicts should be retried by the caller.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_transient() {
        let err = MonitorError::from(StoreError::Conflict("database is locked".into()));
        assert!(err.is_transient());
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn bad_input_is_permanent() {
        let err = MonitorError::from(TimestampError::InvalidIso("yesterday".into()));
        assert!(!err.is_transient());
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(err.to_string().contains("yesterday"));
    }

    #[test]
    fn storage_faults_are_infrastructure() {
        let err = StoreError::Corrupt {
            column: "state",
            message: "NULL".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
    }
}
