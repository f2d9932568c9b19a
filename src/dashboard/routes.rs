//! Dashboard HTTP Routes
//!
//! The HTML page and its form actions, plus a small JSON API over the same
//! handler operations.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::config::{Config, ErrorPolicy};
use crate::core::db::{ConnectionParams, RealtimeReader};
use crate::core::{DashError, DbErrorKind, Result};
use crate::dashboard::plot::line_chart;
use crate::dashboard::render::{self, PageView};
use crate::dashboard::session::{Flash, SaveMode, SessionContext, SessionStore};
use crate::payload::{Payload, Record};
use crate::results_grid::{ResultsGrid, Viewport};
use crate::upload::parse_upload;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "tabledash_session";

// ==================
// Shared State
// ==================

/// State shared by every request.
#[derive(Debug)]
pub struct AppState {
    pub params: ConnectionParams,
    pub policy: ErrorPolicy,
    pub page_size: usize,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        AppState {
            params: config.database.clone(),
            policy: config.dashboard.on_error,
            page_size: config.dashboard.page_size,
            sessions: SessionStore::with_ttl(Duration::from_secs(
                config.dashboard.session_ttl_secs,
            )),
        }
    }
}

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    pub table: Option<String>,
    pub plot: Option<String>,
    pub offset: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveForm {
    #[serde(default)]
    pub table_name: String,
    pub mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteForm {
    #[serde(default)]
    pub table: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ColumnsQuery {
    /// Comma-separated column subset
    pub columns: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TablesResponse {
    pub tables: Vec<String>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ColumnsResponse {
    pub table: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LastRowResponse {
    pub table: String,
    pub row: Option<Record>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ==================
// Routes
// ==================

/// Creates the page, action, and API routes.
pub fn dashboard_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(index_handler))
        .route("/refresh", post(refresh_handler))
        .route("/upload", post(upload_handler))
        .route("/save", post(save_handler))
        .route("/delete", post(delete_handler))
        .route("/health", get(health_handler))
        .nest("/api", api_routes())
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tables", get(list_tables_handler))
        .route("/tables/:name", get(read_table_handler))
        .route("/tables/:name/columns", get(list_columns_handler))
        .route("/tables/:name/last", get(last_row_handler))
}

// ==================
// Helper Functions
// ==================

fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

fn session_cookie(id: Uuid) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id)
}

/// Runs `f` against the caller's session after making sure its handler is
/// connected. Returns the cookie to send back with `f`'s result.
fn with_session<T>(
    state: &AppState,
    headers: &HeaderMap,
    f: impl FnOnce(&mut SessionContext, &AppState) -> T,
) -> (String, T) {
    let session = state.sessions.get_or_create(session_id(headers));
    let mut ctx = session.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(e) = ctx.ensure_ready(&state.params) {
        let flash = ctx.fail(e, state.policy);
        ctx.flash = Some(flash);
    }
    let cookie = session_cookie(ctx.id);
    (cookie, f(&mut *ctx, state))
}

/// Like [`with_session`], for API calls: uses the caller's session when the
/// cookie names one, otherwise a throwaway context that is never stored.
fn with_api_session<T>(
    state: &AppState,
    headers: &HeaderMap,
    f: impl FnOnce(&mut SessionContext) -> Result<T>,
) -> std::result::Result<T, (StatusCode, Json<ErrorResponse>)> {
    let existing = session_id(headers).and_then(|id| state.sessions.get(id));
    let session =
        existing.unwrap_or_else(|| Arc::new(Mutex::new(SessionContext::new(Uuid::new_v4()))));
    let mut ctx = session.lock().unwrap_or_else(PoisonError::into_inner);

    match ctx.ensure_ready(&state.params).and_then(|_| f(&mut *ctx)) {
        Ok(value) => Ok(value),
        Err(e) => {
            let kind = e.kind();
            let status = match kind {
                None => StatusCode::BAD_REQUEST,
                Some(DbErrorKind::Programming) => StatusCode::NOT_FOUND,
                Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let flash = ctx.fail(e, state.policy);
            Err((
                status,
                Json(ErrorResponse {
                    error: flash.message,
                    kind: kind.map(DbErrorKind::describe),
                }),
            ))
        }
    }
}

fn flash_result(ctx: &mut SessionContext, policy: ErrorPolicy, result: Result<String>) {
    let flash = match result {
        Ok(message) => Flash::info(message),
        Err(e) => ctx.fail(e, policy),
    };
    ctx.flash = Some(flash);
}

fn redirect_home(cookie: String) -> Response {
    ([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response()
}

fn build_page(ctx: &mut SessionContext, state: &AppState, query: &ViewQuery) -> String {
    let mut flash = ctx.flash.take();

    let selected = query
        .table
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| ctx.tables.first().map(String::as_str))
        .map(str::to_string);

    let mut payload: Option<Payload> = None;
    let mut last_row = None;
    if let Some(table) = &selected {
        // One scan serves both the grid and the latest-row panel.
        match ctx.handler().and_then(|handler| handler.read_table(table, None)) {
            Ok(p) => {
                last_row = p.last_record();
                payload = Some(p);
            }
            Err(e) => flash = Some(ctx.fail(e, state.policy)),
        }
    }

    let plot = query.plot.as_deref().filter(|p| !p.is_empty());
    let plot_svg = payload
        .as_ref()
        .zip(plot)
        .and_then(|(p, column)| line_chart(p, column));
    let plot_columns = payload
        .as_ref()
        .map(|p| p.numeric_columns().into_iter().map(String::from).collect())
        .unwrap_or_default();
    let grid = payload.as_ref().map(|p| {
        ResultsGrid::from_payload(p, state.page_size)
            .with_viewport(Viewport::page(query.offset.unwrap_or(0), state.page_size))
    });
    let upload_grid = ctx
        .uploaded
        .as_ref()
        .map(|u| ResultsGrid::from_payload(&u.payload, state.page_size));

    let view = PageView {
        tables: &ctx.tables,
        selected: selected.as_deref(),
        grid,
        plot_columns,
        plot,
        plot_svg,
        last_row,
        upload_name: ctx.uploaded.as_ref().map(|u| u.file_name.as_str()),
        upload_grid,
        flash,
    };
    render::page(&view)
}

// ==================
// Page Handlers
// ==================

async fn index_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ViewQuery>,
) -> Response {
    let (cookie, html) = with_session(&state, &headers, |ctx, state| {
        build_page(ctx, state, &query)
    });
    ([(header::SET_COOKIE, cookie)], Html(html)).into_response()
}

async fn refresh_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let (cookie, ()) = with_session(&state, &headers, |ctx, state| {
        let result = ctx
            .refresh()
            .map(|_| format!("Found {} tables", ctx.tables.len()));
        flash_result(ctx, state.policy, result);
    });
    redirect_home(cookie)
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut upload = Err(DashError::Validation("Choose a CSV file to upload".to_string()));
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("file") {
                    continue;
                }
                let file_name = field.file_name().unwrap_or("upload.csv").to_string();
                upload = match field.bytes().await {
                    Ok(bytes) if bytes.is_empty() => upload,
                    Ok(bytes) => parse_upload(&file_name, &bytes),
                    Err(e) => Err(DashError::Validation(format!("Upload failed: {}", e))),
                };
                break;
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed upload: {}", e);
                upload = Err(DashError::Validation(format!("Upload failed: {}", e)));
                break;
            }
        }
    }

    let (cookie, ()) = with_session(&state, &headers, |ctx, state| {
        let result = upload.map(|u| ctx.store_upload(u));
        flash_result(ctx, state.policy, result);
    });
    redirect_home(cookie)
}

async fn save_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<SaveForm>,
) -> Response {
    let (cookie, ()) = with_session(&state, &headers, |ctx, state| {
        let mode = SaveMode::parse(form.mode.as_deref());
        let result = ctx.save_upload(&form.table_name, mode);
        flash_result(ctx, state.policy, result);
    });
    redirect_home(cookie)
}

async fn delete_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<DeleteForm>,
) -> Response {
    let (cookie, ()) = with_session(&state, &headers, |ctx, state| {
        let result = ctx.delete_table(&form.table);
        flash_result(ctx, state.policy, result);
    });
    redirect_home(cookie)
}

async fn health_handler() -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    (StatusCode::OK, Json(response))
}

// ==================
// API Handlers
// ==================

type ApiResult<T> = std::result::Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

async fn list_tables_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<TablesResponse> {
    let tables = with_api_session(&state, &headers, |ctx| ctx.handler()?.list_tables())?;
    Ok(Json(TablesResponse {
        total: tables.len(),
        tables,
    }))
}

async fn read_table_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(query): Query<ColumnsQuery>,
) -> ApiResult<Payload> {
    let columns: Option<Vec<String>> = query.columns.map(|c| {
        c.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    });
    let payload = with_api_session(&state, &headers, |ctx| {
        let subset: Option<Vec<&str>> =
            columns.as_ref().map(|c| c.iter().map(String::as_str).collect());
        ctx.handler()?.read_table(&name, subset.as_deref())
    })?;
    Ok(Json(payload))
}

async fn list_columns_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<ColumnsResponse> {
    let columns = with_api_session(&state, &headers, |ctx| ctx.handler()?.list_columns(&name))?;
    Ok(Json(ColumnsResponse {
        table: name,
        columns,
    }))
}

async fn last_row_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<LastRowResponse> {
    let row = with_api_session(&state, &headers, |ctx| {
        RealtimeReader::new(ctx.handler()?).read_last_row(&name)
    })?;
    Ok(Json(LastRowResponse { table: name, row }))
}
