//! Success envelope shared by the function and database APIs.

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;

/// `{"data": ...}` wrapper of every successful response.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(data: T) -> Self {
        Envelope { data }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Shorthand for a `{"data": ...}` response.
pub fn data<T: Serialize>(value: T) -> Response {
    Envelope::new(value).into_response()
}

/// Decodes a JSON request body. An empty body decodes as `{}`.
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body)
        .map_err(|err| ApiError::BadRequest(format!("Bad Request. Invalid JSON body: {}", err)))
}
