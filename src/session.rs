//! In-process session store keyed by a random cookie id.
//!
//! A session holds at most one set of connection parameters plus the flash messages
//! queued for the next rendered page. Only the id travels in the cookie; parameters
//! (password included) stay in server memory.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, HeaderValue};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::SessionError;
use crate::params::ConnectionParameters;

pub const SESSION_COOKIE: &str = "pgpeek_session";

/// Lifetime of a permanent session (one marked long-lived after login).
pub const PERMANENT_LIFETIME: Duration = Duration::from_secs(31 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashCategory {
    Message,
    Success,
    Error,
}

impl FlashCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashCategory::Message => "message",
            FlashCategory::Success => "success",
            FlashCategory::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub category: FlashCategory,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub db_config: Option<ConnectionParameters>,
    pub flashes: Vec<Flash>,
    pub permanent: bool,
    expires_at: Instant,
}

impl SessionState {
    fn new(ttl: Duration) -> Self {
        Self { db_config: None, flashes: Vec::new(), permanent: false, expires_at: Instant::now() + ttl }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionState>>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60)) }
}

/// 128-bit hex id. Fails rather than minting from an unfilled buffer.
fn gen_id_with(fill: impl FnOnce(&mut [u8]) -> Result<(), getrandom::Error>) -> Result<String, SessionError> {
    let mut bytes = [0u8; 16];
    fill(&mut bytes).map_err(SessionError::Entropy)?;
    let mut sid = String::with_capacity(32);
    for b in &bytes { let _ = write!(&mut sid, "{:02x}", b); }
    Ok(sid)
}

fn gen_id() -> Result<String, SessionError> {
    gen_id_with(getrandom::getrandom)
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { sessions: Arc::new(RwLock::new(HashMap::new())), ttl }
    }

    fn lifetime(&self, permanent: bool) -> Duration {
        if permanent { PERMANENT_LIFETIME } else { self.ttl }
    }

    /// Resolve the cookie id to a live session, creating a fresh one when the id is
    /// missing, unknown or expired. Returns the id and whether it is new.
    pub async fn resolve(&self, sid: Option<&str>) -> Result<(String, bool), SessionError> {
        let now = Instant::now();
        let mut map = self.sessions.write().await;
        if let Some(sid) = sid {
            let lifetime = map.get(sid).map(|s| self.lifetime(s.permanent));
            if let Some(state) = map.get_mut(sid) {
                if state.expires_at > now {
                    state.expires_at = now + lifetime.unwrap_or(self.ttl);
                    return Ok((sid.to_string(), false));
                }
                debug!(target: "session", "session expired");
                map.remove(sid);
            }
        }
        let sid = gen_id()?;
        map.insert(sid.clone(), SessionState::new(self.ttl));
        Ok((sid, true))
    }

    pub async fn get(&self, sid: &str) -> Option<SessionState> {
        self.sessions.read().await.get(sid).cloned()
    }

    pub async fn db_config(&self, sid: &str) -> Option<ConnectionParameters> {
        self.sessions.read().await.get(sid).and_then(|s| s.db_config.clone())
    }

    pub async fn has_db_config(&self, sid: &str) -> bool {
        self.sessions.read().await.get(sid).map(|s| s.db_config.is_some()).unwrap_or(false)
    }

    /// Store the parameters and mark the session long-lived. Any previous value is
    /// replaced outright.
    pub async fn set_db_config(&self, sid: &str, params: ConnectionParameters) {
        let mut map = self.sessions.write().await;
        let state = map.entry(sid.to_string()).or_insert_with(|| SessionState::new(self.ttl));
        state.db_config = Some(params);
        state.permanent = true;
        state.expires_at = Instant::now() + PERMANENT_LIFETIME;
    }

    /// Drop everything held for the session, keeping the id usable.
    pub async fn clear(&self, sid: &str) {
        let mut map = self.sessions.write().await;
        map.insert(sid.to_string(), SessionState::new(self.ttl));
    }

    pub async fn flash(&self, sid: &str, category: FlashCategory, message: impl Into<String>) {
        let mut map = self.sessions.write().await;
        let state = map.entry(sid.to_string()).or_insert_with(|| SessionState::new(self.ttl));
        state.flashes.push(Flash { category, message: message.into() });
    }

    pub async fn take_flashes(&self, sid: &str) -> Vec<Flash> {
        let mut map = self.sessions.write().await;
        map.get_mut(sid).map(|s| std::mem::take(&mut s.flashes)).unwrap_or_default()
    }

    /// Remove expired sessions; returns how many were dropped.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut map = self.sessions.write().await;
        let before = map.len();
        map.retain(|_, s| s.expires_at > now);
        before - map.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all("cookie").iter() {
        let Ok(s) = cookie.to_str() else { continue };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name { return Some(v.to_string()); }
            }
        }
    }
    None
}

pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    parse_cookie(headers, SESSION_COOKIE)
}

/// `Set-Cookie` value for the session id. Permanent sessions get a `Max-Age`;
/// others last until the browser closes.
pub fn session_cookie(sid: &str, permanent: bool, secure: bool) -> HeaderValue {
    let mut v = format!("{}={}; HttpOnly; SameSite=Lax; Path=/", SESSION_COOKIE, sid);
    if permanent { let _ = write!(&mut v, "; Max-Age={}", PERMANENT_LIFETIME.as_secs()); }
    if secure { v.push_str("; Secure"); }
    // sid is hex, so the value is always valid header text
    HeaderValue::from_str(&v).unwrap_or_else(|_| HeaderValue::from_static("pgpeek_session=; Path=/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectionParameters {
        ConnectionParameters {
            host: "db.local".into(),
            port: 5432,
            dbname: "appdb".into(),
            user: "alice".into(),
            password: "secret".into(),
        }
    }

    #[tokio::test]
    async fn resolve_reuses_known_ids_and_mints_new_ones() {
        let store = SessionStore::default();
        let (sid, fresh) = store.resolve(None).await.unwrap();
        assert!(fresh);
        assert_eq!(sid.len(), 32);
        let (again, fresh) = store.resolve(Some(&sid)).await.unwrap();
        assert!(!fresh);
        assert_eq!(again, sid);
        let (other, fresh) = store.resolve(Some("unknown")).await.unwrap();
        assert!(fresh);
        assert_ne!(other, "unknown");
    }

    #[tokio::test]
    async fn login_state_round_trip() {
        let store = SessionStore::default();
        let (sid, _) = store.resolve(None).await.unwrap();
        assert!(!store.has_db_config(&sid).await);
        store.set_db_config(&sid, params()).await;
        assert_eq!(store.db_config(&sid).await, Some(params()));
        assert!(store.get(&sid).await.unwrap().permanent);
        store.clear(&sid).await;
        assert!(!store.has_db_config(&sid).await);
        assert!(!store.get(&sid).await.unwrap().permanent);
    }

    #[tokio::test]
    async fn flashes_are_consumed_once() {
        let store = SessionStore::default();
        let (sid, _) = store.resolve(None).await.unwrap();
        store.flash(&sid, FlashCategory::Error, "boom").await;
        store.flash(&sid, FlashCategory::Success, "yay").await;
        let got = store.take_flashes(&sid).await;
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].message, "boom");
        assert!(store.take_flashes(&sid).await.is_empty());
    }

    #[tokio::test]
    async fn expired_sessions_are_swept_and_not_resolved() {
        let store = SessionStore::new(Duration::from_millis(0));
        let (sid, _) = store.resolve(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let (next, fresh) = store.resolve(Some(&sid)).await.unwrap();
        assert!(fresh);
        assert_ne!(next, sid);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.sweep().await, 1);
        assert_eq!(store.len().await, 0);
    }

    #[test]
    fn cookie_parsing_and_building() {
        let mut h = HeaderMap::new();
        h.insert("cookie", HeaderValue::from_static("a=1; pgpeek_session=abc123; b=2"));
        assert_eq!(session_id_from_headers(&h).as_deref(), Some("abc123"));

        let c = session_cookie("abc123", true, false);
        let s = c.to_str().unwrap();
        assert!(s.starts_with("pgpeek_session=abc123; HttpOnly"));
        assert!(s.contains("Max-Age=2678400"));
        assert!(!s.contains("Secure"));
        assert!(session_cookie("abc123", false, true).to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn ids_are_hex_of_the_random_bytes() {
        let sid = gen_id_with(|buf| {
            for (i, b) in buf.iter_mut().enumerate() { *b = i as u8 * 17; }
            Ok(())
        })
        .unwrap();
        assert_eq!(sid, "00112233445566778899aabbccddeeff");
    }

    #[test]
    fn no_id_without_entropy() {
        let err = gen_id_with(|_| Err(getrandom::Error::UNSUPPORTED)).unwrap_err();
        assert!(matches!(err, SessionError::Entropy(_)));
    }
}
