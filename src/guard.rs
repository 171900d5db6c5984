//! Request middleware: session attachment and the login gate for protected pages.

use axum::extract::{Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Extension;
use tracing::{debug, error};

use crate::server::AppState;
use crate::session::{session_cookie, session_id_from_headers, FlashCategory, SessionStore};

pub const LOGIN_NOTICE: &str = "Please log in to access this page.";

/// Session id resolved for the current request.
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub id: String,
}

/// Resolve (or mint) the session for every request and refresh its cookie on the way out.
pub async fn attach_session(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let presented = session_id_from_headers(req.headers());
    let (sid, fresh) = match state.sessions.resolve(presented.as_deref()).await {
        Ok(resolved) => resolved,
        Err(e) => {
            error!(target: "session", "cannot issue session: {}", e);
            return (StatusCode::SERVICE_UNAVAILABLE, "session unavailable").into_response();
        }
    };
    if fresh {
        debug!(target: "session", "new session issued");
    }
    req.extensions_mut().insert(CurrentSession { id: sid.clone() });

    let mut res = next.run(req).await;

    // handlers clear sessions in place, so the id is still live after logout
    let permanent = state.sessions.get(&sid).await.map(|s| s.permanent).unwrap_or(false);
    res.headers_mut()
        .append(SET_COOKIE, session_cookie(&sid, permanent, state.secure_cookies));
    res
}

pub async fn has_valid_session(store: &SessionStore, sid: &str) -> bool {
    store.has_db_config(sid).await
}

/// Gate for protected routes: without stored connection parameters the handler is
/// never invoked and the browser is sent back to the login page.
pub async fn login_required(
    State(state): State<AppState>,
    Extension(session): Extension<CurrentSession>,
    req: Request,
    next: Next,
) -> Response {
    if !has_valid_session(&state.sessions, &session.id).await {
        debug!(target: "http", "unauthenticated request to {}", req.uri().path());
        state.sessions.flash(&session.id, FlashCategory::Message, LOGIN_NOTICE).await;
        return Redirect::to("/").into_response();
    }
    next.run(req).await
}
