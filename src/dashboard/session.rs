//! Per-browser session state.
//!
//! Each session owns its own [`DatabaseHandler`]; nothing is shared between
//! sessions except the store that maps cookies to contexts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::ErrorPolicy;
use crate::core::db::{ConnectionParams, DatabaseHandler};
use crate::core::{DashError, DbErrorKind, Result};
use crate::upload::Upload;

/// Severity of a message shown at the top of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashLevel {
    Info,
    Error,
}

/// One-shot message for the next page render.
#[derive(Debug, Clone, PartialEq)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn info(message: impl Into<String>) -> Self {
        Flash {
            level: FlashLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Flash {
            level: FlashLevel::Error,
            message: message.into(),
        }
    }
}

/// How an uploaded payload is saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// `write_table`: create the table, then insert
    Create,
    /// `update_table`: insert into an existing table
    Append,
}

impl SaveMode {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("append") => SaveMode::Append,
            _ => SaveMode::Create,
        }
    }
}

/// Everything one browser session keeps between requests.
#[derive(Debug)]
pub struct SessionContext {
    pub id: Uuid,
    handler: Option<DatabaseHandler>,
    pub tables: Vec<String>,
    /// Set once the handler has connected; never cleared
    pub handler_ready: bool,
    /// The table list is re-read on the next request
    pub refresh_pending: bool,
    pub uploaded: Option<Upload>,
    pub flash: Option<Flash>,
}

impl SessionContext {
    pub fn new(id: Uuid) -> Self {
        SessionContext {
            id,
            handler: None,
            tables: Vec::new(),
            handler_ready: false,
            refresh_pending: false,
            uploaded: None,
            flash: None,
        }
    }

    /// Connects the handler on first use and runs any pending table refresh.
    pub fn ensure_ready(&mut self, params: &ConnectionParams) -> Result<()> {
        if !self.handler_ready {
            self.handler = Some(DatabaseHandler::connect(params.clone())?);
            self.handler_ready = true;
            self.refresh_pending = true;
            info!("Session {} connected", self.id);
        }
        if self.refresh_pending {
            self.refresh()?;
        }
        Ok(())
    }

    /// Re-reads the table list.
    pub fn refresh(&mut self) -> Result<()> {
        self.tables = self.handler()?.list_tables()?;
        self.refresh_pending = false;
        Ok(())
    }

    pub fn handler(&self) -> Result<&DatabaseHandler> {
        self.handler.as_ref().ok_or(DashError::NotConnected)
    }

    /// Keeps an uploaded file until it is saved or replaced.
    pub fn store_upload(&mut self, upload: Upload) -> String {
        let message = format!(
            "Uploaded {} ({} rows, {} columns)",
            upload.file_name,
            upload.payload.row_count(),
            upload.payload.columns().len()
        );
        self.uploaded = Some(upload);
        message
    }

    /// Saves the pending upload under `table_name`.
    pub fn save_upload(&mut self, table_name: &str, mode: SaveMode) -> Result<String> {
        let name = table_name.trim();
        if name.is_empty() {
            return Err(DashError::Validation(
                "Enter a name for the table".to_string(),
            ));
        }
        let upload = self
            .uploaded
            .as_ref()
            .ok_or_else(|| DashError::Validation("Upload a CSV file first".to_string()))?;
        let handler = self.handler.as_mut().ok_or(DashError::NotConnected)?;

        match mode {
            SaveMode::Create => handler.write_table(name, &upload.payload)?,
            SaveMode::Append => handler.update_table(name, &upload.payload)?,
        }
        let message = format!("Saved {} rows to {}", upload.payload.row_count(), name);
        self.uploaded = None;
        self.refresh_pending = true;
        Ok(message)
    }

    /// Drops `table`.
    pub fn delete_table(&mut self, table: &str) -> Result<String> {
        let table = table.trim();
        if table.is_empty() {
            return Err(DashError::Validation(
                "Choose a table to delete".to_string(),
            ));
        }
        self.handler()?.delete_table(table)?;
        self.refresh_pending = true;
        Ok(format!("Deleted table {}", table))
    }

    /// Applies the error policy to a failed operation.
    ///
    /// User errors always come back as an inline message. Database errors
    /// are logged, then either end the process or come back as a message,
    /// depending on `policy`.
    pub fn fail(&mut self, err: DashError, policy: ErrorPolicy) -> Flash {
        let Some(kind) = err.kind() else {
            return Flash::error(err.to_string());
        };
        match policy {
            ErrorPolicy::Terminate => terminate(&err, self.handler.as_mut()),
            ErrorPolicy::Report => {
                error!("{}: {}", kind.describe(), err);
                Flash::error(format!("{}: {}", kind.describe(), err))
            }
        }
    }
}

/// Logs the error, closes the connection, and exits the process.
pub fn terminate(err: &DashError, handler: Option<&mut DatabaseHandler>) -> ! {
    let kind = err.kind().unwrap_or(DbErrorKind::Unclassified);
    error!("{}: {}", kind.describe(), err);
    eprintln!("{}: {}", kind.describe(), err);
    if let Some(handler) = handler {
        handler.close();
    }
    std::process::exit(1)
}

/// Idle time after which a session is dropped when no TTL is configured.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug)]
struct StoredSession {
    context: Arc<Mutex<SessionContext>>,
    last_seen: Instant,
}

/// Maps session cookies to contexts.
///
/// Sessions idle for longer than the TTL are evicted on the next lookup;
/// dropping the last reference closes the session's connection.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, StoredSession>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        SessionStore {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the session for `id`, creating a new one when the id is
    /// missing, unknown, or expired.
    pub fn get_or_create(&self, id: Option<Uuid>) -> Arc<Mutex<SessionContext>> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        evict(&mut sessions, self.ttl, now);

        if let Some(stored) = id.and_then(|id| sessions.get_mut(&id)) {
            stored.last_seen = now;
            return Arc::clone(&stored.context);
        }
        let id = Uuid::new_v4();
        info!("New session {}", id);
        let context = Arc::new(Mutex::new(SessionContext::new(id)));
        sessions.insert(
            id,
            StoredSession {
                context: Arc::clone(&context),
                last_seen: now,
            },
        );
        context
    }

    /// Returns an existing, unexpired session without creating one.
    pub fn get(&self, id: Uuid) -> Option<Arc<Mutex<SessionContext>>> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        evict(&mut sessions, self.ttl, now);
        sessions.get_mut(&id).map(|stored| {
            stored.last_seen = now;
            Arc::clone(&stored.context)
        })
    }

    /// Drops every session idle at `now` for at least the TTL. Returns how
    /// many were dropped.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        evict(&mut sessions, self.ttl, now)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn evict(sessions: &mut HashMap<Uuid, StoredSession>, ttl: Duration, now: Instant) -> usize {
    let before = sessions.len();
    sessions.retain(|id, stored| {
        let keep = now.saturating_duration_since(stored.last_seen) < ttl;
        if !keep {
            debug!("Session {} expired", id);
        }
        keep
    });
    before - sessions.len()
}
