//! Function API handlers (`/api/{command}`).
//!
//! The command is resolved by [`Target::resolve`]; verbs run against the
//! file store, anything else is a registry function call.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::Method;
use axum::response::Response;

use crate::dispatch::{check_method, no_command, positional_args, Target, Verb};
use crate::error::ApiError;
use crate::schema::common::{data, decode_body};
use crate::schema::files::{ConfigUpdateRequest, FileRequest};
use crate::state::AppState;

/// Form field carrying the file of an `upload`.
pub const UPLOAD_FIELD: &str = "uploadedFile";

/// `/api` without a command.
pub async fn api_root() -> ApiError {
    no_command()
}

/// `GET|POST /api/{command}`
pub async fn api_command(
    State(state): State<AppState>,
    Path(command): Path<String>,
    method: Method,
    Query(query): Query<BTreeMap<String, String>>,
    request: Request,
) -> Result<Response, ApiError> {
    let target = Target::resolve(&command)?;
    tracing::debug!(command = %command, method = %method, "dispatching api command");

    match target {
        Target::Verb(verb) => {
            check_method(verb, &method)?;
            let response = run_verb(&state, verb, query, request).await?;
            if verb.mutates_functions() {
                state.functions.invalidate();
            }
            Ok(response)
        }
        Target::Function(name) => {
            if method != Method::GET && method != Method::POST {
                return Err(ApiError::MethodNotAllowed);
            }
            let body = read_body(&state, request).await?;
            let args = positional_args(query, &body)?;
            let registry = state.functions.current()?;
            let result = registry.invoke(&name, args)?;
            Ok(data(result.into_json()))
        }
    }
}

async fn run_verb(
    state: &AppState,
    verb: Verb,
    query: BTreeMap<String, String>,
    request: Request,
) -> Result<Response, ApiError> {
    match verb {
        Verb::ReadConfig => {
            let content = state.files.read_config()?;
            Ok(data(String::from_utf8_lossy(&content)))
        }
        Verb::UpdateConfig => {
            let body: ConfigUpdateRequest = decode_body(&read_body(state, request).await?)?;
            let content = body.content.ok_or_else(|| {
                ApiError::BadRequest("Bad Request. \"content\" is required.".to_string())
            })?;
            state.files.update_config(content.as_bytes())?;
            Ok(data(format!(
                "Successfully updated {}.",
                state.files.config_name()
            )))
        }
        Verb::List => {
            let registry = state.functions.current()?;
            Ok(data(registry.descriptors()))
        }
        Verb::ListDir => Ok(data(state.files.list()?)),
        Verb::Read => {
            let filename = query.get("p0").map(String::as_str).unwrap_or_default();
            let content = state.files.read(filename)?;
            Ok(data(String::from_utf8_lossy(&content)))
        }
        Verb::Upload => upload(state, request).await,
        Verb::Write => {
            let (file, content) = file_and_content(state, request).await?;
            let registry = state.functions.current()?;
            let filename = state
                .files
                .write(&file, content.as_bytes(), |name| registry.contains(name))?;
            Ok(data(format!("Wrote {} bytes to {}.", content.len(), filename)))
        }
        Verb::Update => {
            let (file, content) = file_and_content(state, request).await?;
            let filename = state.files.update(&file, content.as_bytes())?;
            Ok(data(format!("Successfully updated {}.", filename)))
        }
        Verb::Append => {
            let (file, content) = file_and_content(state, request).await?;
            let (filename, appended) = state.files.append(&file, content.as_bytes())?;
            Ok(data(format!("Appended {} bytes to {}.", appended, filename)))
        }
        Verb::Delete => {
            let body: FileRequest = decode_body(&read_body(state, request).await?)?;
            let file = body.file.ok_or_else(|| {
                ApiError::BadRequest("Bad Request. \"file\" is required.".to_string())
            })?;
            let filename = state.files.delete(&file)?;
            Ok(data(format!("Successfully deleted {}.", filename)))
        }
    }
}

async fn upload(state: &AppState, request: Request) -> Result<Response, ApiError> {
    let upload_error = || ApiError::BadRequest("File upload error.".to_string());
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|_| upload_error())?;

    while let Some(field) = multipart.next_field().await.map_err(|_| upload_error())? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content = field.bytes().await.map_err(|_| upload_error())?;

        let registry = state.functions.current()?;
        let filename = state
            .files
            .write(&file_name, &content, |name| registry.contains(name))?;
        return Ok(data(format!("Successfully uploaded {}.", filename)));
    }
    Err(upload_error())
}

async fn file_and_content(state: &AppState, request: Request) -> Result<(String, String), ApiError> {
    let body: FileRequest = decode_body(&read_body(state, request).await?)?;
    match (body.file, body.content) {
        (Some(file), Some(content)) => Ok((file, content)),
        _ => Err(ApiError::BadRequest(
            "Bad Request. \"file\" and \"content\" are required.".to_string(),
        )),
    }
}

pub(crate) async fn read_body(state: &AppState, request: Request) -> Result<Bytes, ApiError> {
    axum::body::to_bytes(request.into_body(), state.config.max_upload_bytes)
        .await
        .map_err(|err| ApiError::BadRequest(format!("Bad Request. Unreadable body: {}", err)))
}
