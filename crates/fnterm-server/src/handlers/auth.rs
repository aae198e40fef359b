//! Login, logout and auth status handlers.
//!
//! These routes sit outside the session gate. Their responses carry a
//! `success` flag instead of the `{data}` envelope.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::credentials::NotConfigured;
use crate::schema::auth::{AuthOutcome, AuthStatus, LoginRequest};
use crate::session::{expired_cookie, session_cookie, session_token};
use crate::state::AppState;

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(AuthOutcome::failed(message))).into_response()
}

/// `GET /auth/status`
pub async fn status(State(state): State<AppState>) -> Json<AuthStatus> {
    Json(AuthStatus {
        auth_enabled: state.auth_enabled(),
    })
}

/// `POST /auth/login`
pub async fn login(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(credentials) = state.credentials.clone() else {
        return failure(
            StatusCode::NOT_FOUND,
            "Authorization is not enabled on this server.",
        );
    };

    let request: LoginRequest = serde_json::from_slice(&body).unwrap_or_default();
    let (Some(username), Some(password)) = (request.username, request.password) else {
        return failure(StatusCode::BAD_REQUEST, "Username and password are required.");
    };

    // argon2 verification is CPU-bound
    let checked = {
        let username = username.clone();
        tokio::task::spawn_blocking(move || credentials.verify(&username, &password)).await
    };

    match checked {
        Ok(Ok(true)) => {
            let token = state.sessions.create(&username);
            (
                [(SET_COOKIE, session_cookie(&token))],
                Json(AuthOutcome::ok()),
            )
                .into_response()
        }
        Ok(Ok(false)) => {
            tracing::warn!(user = %username, "rejected login");
            failure(StatusCode::UNAUTHORIZED, "Invalid credentials.")
        }
        Ok(Err(err @ NotConfigured)) => {
            tracing::error!("{}", err);
            failure(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        Err(err) => failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("An internal server error occurred: {}", err),
        ),
    }
}

/// `POST /auth/logout`
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        state.sessions.remove(&token);
    }
    ([(SET_COOKIE, expired_cookie())], Json(AuthOutcome::ok())).into_response()
}
