//!
//! pgpeek HTTP server
//! ------------------
//! Axum routes for the login form, the table list and the table preview.
//!
//! Responsibilities:
//! - Cookie-keyed sessions holding the connection parameters of the logged-in user.
//! - Login handshake through [`Authenticator`], with classified error messages.
//! - Connection acquisition per request through [`ConnectionProvider`].
//! - Optional shared pool brought up at startup, falling back to direct connections.
//! - Background sweep of expired sessions.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Path, State};
use axum::middleware;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Extension, Form, Router};
use tracing::{error, info, warn};

use crate::auth::Authenticator;
use crate::config::Settings;
use crate::db::{self, ConnectionPool, Connector, RowSet, TableDescriptor};
use crate::error::{DbError, DbErrorKind, ErrorCategory};
use crate::guard::{attach_session, login_required, CurrentSession, LOGIN_NOTICE};
use crate::params::{ConnectionParameters, FormDefaults, LoginForm};
use crate::postgres::{init_pool, PgConnector};
use crate::provider::ConnectionProvider;
use crate::session::{FlashCategory, SessionStore};
use crate::views::{self, LoginPrefill};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    pub provider: ConnectionProvider,
    pub authenticator: Arc<Authenticator>,
    pub form_defaults: FormDefaults,
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(
        settings: &Settings,
        pool: Option<Arc<dyn ConnectionPool>>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            sessions: SessionStore::new(settings.session_ttl()),
            provider: ConnectionProvider::new(pool, connector.clone()),
            authenticator: Arc::new(Authenticator::new(connector)),
            form_defaults: settings.form_defaults(),
            secure_cookies: settings.secure_cookies,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/tables", get(show_tables))
        .route("/table/{name}", get(show_table))
        .route_layer(middleware::from_fn_with_state(state.clone(), login_required));

    Router::new()
        .route("/", get(login_form).post(login_submit))
        .route("/logout", get(logout))
        .merge(protected)
        .layer(middleware::from_fn_with_state(state.clone(), attach_session))
        .route("/health", get(|| async { "pgpeek ok" }))
        .with_state(state)
}

/// Bring up the pool (if configured), mount the routes and serve until shutdown.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let pool: Option<Arc<dyn ConnectionPool>> = match settings.pool_options() {
        Some(opts) => init_pool(&opts).await.map(|p| Arc::new(p) as Arc<dyn ConnectionPool>),
        None => {
            info!(target: "startup", "no shared pool configured; connections follow each session's login");
            None
        }
    };

    let state = AppState::new(&settings, pool, Arc::new(PgConnector));

    {
        let sessions = state.sessions.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(SWEEP_INTERVAL).await;
                let removed = sessions.sweep().await;
                if removed > 0 { tracing::debug!(target: "session", removed = removed, "session_sweep"); }
            }
        });
    }

    let addr = settings.addr().with_context(|| format!("invalid bind address {}:{}", settings.bind, settings.http_port))?;
    info!(target: "startup", "pgpeek listening on {} (pool={})", addr, state.provider.has_pool());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn prefill_from_defaults(defaults: &FormDefaults) -> LoginPrefill {
    LoginPrefill {
        host: defaults.host.clone(),
        port: defaults.port.to_string(),
        ..Default::default()
    }
}

fn prefill_from_form(form: &LoginForm, defaults: &FormDefaults) -> LoginPrefill {
    let or = |v: &Option<String>, d: String| v.as_deref().map(|s| s.trim().to_string()).unwrap_or(d);
    LoginPrefill {
        host: or(&form.host, defaults.host.clone()),
        port: or(&form.port, defaults.port.to_string()),
        dbname: or(&form.dbname, String::new()),
        user: or(&form.user, String::new()),
    }
}

/// `GET /`: start over. Pending notices survive so redirects to the login page can
/// explain themselves.
async fn login_form(State(state): State<AppState>, Extension(session): Extension<CurrentSession>) -> Response {
    let flashes = state.sessions.take_flashes(&session.id).await;
    state.sessions.clear(&session.id).await;
    Html(views::login_page(&flashes, &prefill_from_defaults(&state.form_defaults))).into_response()
}

async fn login_submit(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
    Form(form): Form<LoginForm>,
) -> Response {
    match state.authenticator.login(&form, &state.form_defaults).await {
        Ok(params) => {
            let dbname = params.dbname.clone();
            state.sessions.set_db_config(&session.id, params).await;
            state
                .sessions
                .flash(&session.id, FlashCategory::Success, format!("Connected to '{}'.", dbname))
                .await;
            Redirect::to("/tables").into_response()
        }
        Err(e) => {
            if e.category() == ErrorCategory::Validation {
                info!(target: "auth", "login form rejected: {}", e.code_str());
            }
            state.sessions.flash(&session.id, FlashCategory::Error, e.to_string()).await;
            let flashes = state.sessions.take_flashes(&session.id).await;
            Html(views::login_page(&flashes, &prefill_from_form(&form, &state.form_defaults))).into_response()
        }
    }
}

async fn fetch_tables(
    provider: &ConnectionProvider,
    cfg: Option<&ConnectionParameters>,
) -> Result<Option<Vec<TableDescriptor>>, DbError> {
    let Some(mut conn) = provider.acquire(cfg).await? else { return Ok(None) };
    db::list_tables(&mut *conn).await.map(Some)
}

async fn fetch_preview(
    provider: &ConnectionProvider,
    cfg: Option<&ConnectionParameters>,
    table: &str,
) -> Result<Option<RowSet>, DbError> {
    let Some(mut conn) = provider.acquire(cfg).await? else { return Ok(None) };
    db::preview_table(&mut *conn, table).await.map(Some)
}

/// `GET /tables`
async fn show_tables(State(state): State<AppState>, Extension(session): Extension<CurrentSession>) -> Response {
    let cfg = state.sessions.db_config(&session.id).await;
    match fetch_tables(&state.provider, cfg.as_ref()).await {
        Ok(Some(tables)) => {
            let flashes = state.sessions.take_flashes(&session.id).await;
            Html(views::tables_page(&flashes, &tables)).into_response()
        }
        Ok(None) => {
            state.sessions.flash(&session.id, FlashCategory::Message, LOGIN_NOTICE).await;
            Redirect::to("/").into_response()
        }
        Err(e) => {
            warn!(target: "http", "listing tables failed: {}", e);
            state
                .sessions
                .flash(&session.id, FlashCategory::Error, format!("Error listing tables: {}", e))
                .await;
            Redirect::to("/").into_response()
        }
    }
}

/// Notice shown on the table list after a failed preview. `None` means the guard
/// let the request through but no connection could be had.
fn preview_notice(err: Option<&DbError>) -> (ErrorCategory, String) {
    match err {
        None => (ErrorCategory::Unexpected, "Unexpected error.".to_string()),
        Some(e) if e.is_programming() => (
            ErrorCategory::UnclassifiedDatabase,
            format!("SQL error (possible injection attempt): {}", e),
        ),
        Some(e) => {
            let category = match e.kind {
                DbErrorKind::Connect | DbErrorKind::Pool => ErrorCategory::Connectivity,
                _ => ErrorCategory::UnclassifiedDatabase,
            };
            (category, format!("Error reading table: {}", e))
        }
    }
}

/// `GET /table/{name}`
async fn show_table(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
    Path(name): Path<String>,
) -> Response {
    let cfg = state.sessions.db_config(&session.id).await;
    let failure = match fetch_preview(&state.provider, cfg.as_ref(), &name).await {
        Ok(Some(rows)) => {
            let flashes = state.sessions.take_flashes(&session.id).await;
            return Html(views::table_page(&flashes, &name, &rows)).into_response();
        }
        Ok(None) => None,
        Err(e) => Some(e),
    };
    let (category, notice) = preview_notice(failure.as_ref());
    if category == ErrorCategory::Unexpected {
        error!(target: "http", category = ?category, "no connection available for table preview");
    } else {
        warn!(target: "http", category = ?category, "table preview failed: {}", notice);
    }
    state.sessions.flash(&session.id, FlashCategory::Error, notice).await;
    Redirect::to("/tables").into_response()
}

/// `GET /logout`
async fn logout(State(state): State<AppState>, Extension(session): Extension<CurrentSession>) -> Response {
    state.sessions.clear(&session.id).await;
    state.sessions.flash(&session.id, FlashCategory::Success, "Session closed.").await;
    Redirect::to("/").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_connection_is_unexpected() {
        assert_eq!(preview_notice(None), (ErrorCategory::Unexpected, "Unexpected error.".to_string()));
    }

    #[test]
    fn rejected_statement_mentions_injection() {
        let e = DbError::programming("db error: ERROR: syntax error at or near \"DROP\"");
        let (category, notice) = preview_notice(Some(&e));
        assert_eq!(category, ErrorCategory::UnclassifiedDatabase);
        assert_eq!(notice, "SQL error (possible injection attempt): db error: ERROR: syntax error at or near \"DROP\"");
    }

    #[test]
    fn other_failures_carry_raw_text() {
        let (category, notice) = preview_notice(Some(&DbError::query("db error: ERROR: canceling statement due to statement timeout")));
        assert_eq!(category, ErrorCategory::UnclassifiedDatabase);
        assert_eq!(notice, "Error reading table: db error: ERROR: canceling statement due to statement timeout");

        let (category, notice) = preview_notice(Some(&DbError::connect("error connecting to server: Connection refused (os error 111)")));
        assert_eq!(category, ErrorCategory::Connectivity);
        assert!(notice.starts_with("Error reading table: error connecting to server"));
    }
}
