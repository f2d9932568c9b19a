/// Core Module for tabledash
///
/// Shared infrastructure: the database handler and the error type every
/// other module reports through.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DashError, DbErrorKind, Result};
