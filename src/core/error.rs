/// tabledash Error Module
///
/// This module defines the error type shared by the database handler, the
/// payload and upload code, and the dashboard. Database failures are further
/// classified by [`DbErrorKind`] so callers can word log messages the same
/// way regardless of which operation failed.
use rusqlite::ErrorCode;
use thiserror::Error;

/// Error type for every fallible tabledash operation.
#[derive(Error, Debug)]
pub enum DashError {
    /// Database-related errors from SQLite operations
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The handler's connection was closed before the call
    #[error("Database error: not connected")]
    NotConnected,

    /// A table or column name rejected by strict identifier checking
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Malformed CSV upload
    #[error("CSV error: {0}")]
    Csv(String),

    /// User input that failed a presence check in the dashboard
    #[error("{0}")]
    Validation(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Type alias for Result to use DashError as the error type.
pub type Result<T> = std::result::Result<T, DashError>;

/// Classification of database failures.
///
/// Only the log wording differs between kinds; none of them is considered
/// recoverable by the data-access layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// The database could not be reached or opened
    Interface,
    /// Bad SQL: syntax errors, missing tables or columns
    Programming,
    /// Constraint violations
    Integrity,
    /// Values that do not fit or convert
    Data,
    /// Runtime conditions of the database itself (locks, I/O, disk)
    Operational,
    /// Invalid connection or statement parameters
    Parameter,
    /// Anything not covered above
    Unclassified,
}

impl DbErrorKind {
    /// Classifies a rusqlite error.
    pub fn of(err: &rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::NotFound => {
                    DbErrorKind::Interface
                }
                ErrorCode::Unknown
                | ErrorCode::AuthorizationForStatementDenied
                | ErrorCode::SchemaChanged => DbErrorKind::Programming,
                ErrorCode::ConstraintViolation => DbErrorKind::Integrity,
                ErrorCode::TypeMismatch | ErrorCode::TooBig | ErrorCode::ParameterOutOfRange => {
                    DbErrorKind::Data
                }
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::ReadOnly
                | ErrorCode::PermissionDenied
                | ErrorCode::OperationInterrupted
                | ErrorCode::OperationAborted
                | ErrorCode::OutOfMemory
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::FileLockingProtocolFailed
                | ErrorCode::NoLargeFileSupport => DbErrorKind::Operational,
                _ => DbErrorKind::Unclassified,
            },
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::Utf8Error(_)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::ToSqlConversionFailure(_) => DbErrorKind::Data,
            rusqlite::Error::InvalidPath(_)
            | rusqlite::Error::NulError(_)
            | rusqlite::Error::InvalidParameterName(_)
            | rusqlite::Error::InvalidParameterCount(..) => DbErrorKind::Parameter,
            rusqlite::Error::InvalidColumnIndex(_)
            | rusqlite::Error::InvalidColumnName(_)
            | rusqlite::Error::InvalidQuery
            | rusqlite::Error::MultipleStatement
            | rusqlite::Error::ExecuteReturnedResults => DbErrorKind::Programming,
            _ => DbErrorKind::Unclassified,
        }
    }

    /// Human-readable wording used in log lines.
    pub fn describe(self) -> &'static str {
        match self {
            DbErrorKind::Interface => "connection unreachable",
            DbErrorKind::Programming => "SQL programming error",
            DbErrorKind::Integrity => "integrity violation",
            DbErrorKind::Data => "data error",
            DbErrorKind::Operational => "operational error",
            DbErrorKind::Parameter => "bad connection parameters",
            DbErrorKind::Unclassified => "unclassified database error",
        }
    }
}

impl DashError {
    /// The database failure kind, if this error came from the database layer.
    ///
    /// Other internal errors report as [`DbErrorKind::Unclassified`]. Bad
    /// user input (validation and CSV errors) reports `None` because it is
    /// never fatal.
    pub fn kind(&self) -> Option<DbErrorKind> {
        match self {
            DashError::Database(e) => Some(DbErrorKind::of(e)),
            DashError::NotConnected => Some(DbErrorKind::Interface),
            DashError::InvalidIdentifier(_) => Some(DbErrorKind::Programming),
            DashError::Validation(_) | DashError::Csv(_) => None,
            _ => Some(DbErrorKind::Unclassified),
        }
    }

    /// Whether the error comes from bad user input rather than the database.
    pub fn is_user_error(&self) -> bool {
        self.kind().is_none()
    }
}
