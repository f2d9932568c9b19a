/// Database Module
///
/// The database handler, split into three concerns:
/// - **Connection Management** (`connection.rs`): opening, closing, and reconnecting the single connection
/// - **Schema Introspection** (`schema.rs`): table and column discovery, SQL type mapping, `CREATE TABLE`
/// - **Query Execution** (`query.rs`): reading tables into payloads and writing payloads into tables
///
/// `realtime.rs` adds the last-row reader on top of a handler.
///
/// ## Error Handling
///
/// Every operation returns `Result<_, DashError>`; deciding whether a failure
/// ends the process is left to the caller.
pub mod connection;
pub mod query;
pub mod realtime;
pub mod schema;

pub use connection::*;
pub use query::*;
pub use realtime::*;
pub use schema::*;
