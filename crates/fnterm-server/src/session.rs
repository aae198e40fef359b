//! Session table and the authentication gate.
//!
//! Sessions live in memory only; a restart logs everybody out. The token is a
//! v4 UUID carried in the [`SESSION_COOKIE`] cookie. A session expires a
//! fixed time after login; expired entries are dropped when next presented
//! and swept on every login.

use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;

use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "fnterm_session";

/// Per-request authentication facts, attached as a request extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub auth_enabled: bool,
    pub authenticated: bool,
}

impl RequestContext {
    /// Whether the gate lets the request through.
    pub fn allowed(&self) -> bool {
        !self.auth_enabled || self.authenticated
    }
}

#[derive(Debug, Clone)]
struct Session {
    username: String,
    created_at: Instant,
}

#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            sessions: DashMap::new(),
            ttl,
        }
    }

    fn expired(&self, session: &Session) -> bool {
        session.created_at.elapsed() >= self.ttl
    }

    /// Starts an authenticated session and returns its token.
    pub fn create(&self, username: &str) -> String {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !self.expired(session));
        let swept = before.saturating_sub(self.sessions.len());
        if swept > 0 {
            tracing::debug!(swept, "expired sessions removed");
        }

        let token = uuid::Uuid::new_v4().to_string();
        self.sessions.insert(
            token.clone(),
            Session {
                username: username.to_string(),
                created_at: Instant::now(),
            },
        );
        tracing::info!(user = username, "session started");
        token
    }

    pub fn is_authenticated(&self, token: &str) -> bool {
        if let Some((_, session)) = self.sessions.remove_if(token, |_, s| self.expired(s)) {
            tracing::info!(user = %session.username, "session expired");
            return false;
        }
        self.sessions.contains_key(token)
    }

    pub fn remove(&self, token: &str) {
        if let Some((_, session)) = self.sessions.remove(token) {
            tracing::info!(
                user = %session.username,
                age_secs = session.created_at.elapsed().as_secs(),
                "session ended"
            );
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Extracts the session token from the `Cookie` headers.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token.trim().to_string())
}

/// `Set-Cookie` value that installs `token`.
pub fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

/// `Set-Cookie` value that clears the session cookie.
pub fn expired_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Middleware computing the [`RequestContext`] for every request.
pub async fn attach_context(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_enabled = state.auth_enabled();
    let authenticated = auth_enabled
        && session_token(request.headers()).is_some_and(|t| state.sessions.is_authenticated(&t));
    request.extensions_mut().insert(RequestContext {
        auth_enabled,
        authenticated,
    });
    next.run(request).await
}

/// Middleware rejecting requests the [`RequestContext`] does not allow.
pub async fn require_session(request: Request, next: Next) -> Response {
    let allowed = request
        .extensions()
        .get::<RequestContext>()
        .is_some_and(RequestContext::allowed);
    if !allowed {
        return ApiError::Unauthenticated.into_response();
    }
    next.run(request).await
}
