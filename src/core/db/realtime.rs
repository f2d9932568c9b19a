/// Last-row reader for tables that are appended to while the dashboard is open.
///
/// Every call scans the full table and keeps the final row; nothing is
/// remembered between calls.

use super::connection::DatabaseHandler;
use crate::core::Result;
use crate::payload::Record;
use tracing::debug;

/// Borrows a handler and adds [`RealtimeReader::read_last_row`].
pub struct RealtimeReader<'a> {
    handler: &'a DatabaseHandler,
}

impl<'a> RealtimeReader<'a> {
    pub fn new(handler: &'a DatabaseHandler) -> Self {
        RealtimeReader { handler }
    }

    pub fn handler(&self) -> &'a DatabaseHandler {
        self.handler
    }

    /// Returns the most recently inserted row, or `None` for an empty table.
    pub fn read_last_row(&self, table: &str) -> Result<Option<Record>> {
        let payload = self.handler.read_table(table, None)?;
        debug!("Scanned {} rows of {} for the last row", payload.row_count(), table);
        Ok(payload.last_record())
    }
}
