//! # Dashboard
//!
//! The browser UI: one [`session::SessionContext`] per visitor, HTML pages
//! rendered on the server, and form actions that call into the database
//! handler.

pub mod plot;
pub mod render;
pub mod routes;
pub mod server;
pub mod session;

pub use routes::AppState;
pub use server::Dashboard;
pub use session::{SessionContext, SessionStore};
