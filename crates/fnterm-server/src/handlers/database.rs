//! Database API handler (`POST /database`).
//!
//! The body is JSON, or multipart form data when an SQL file is uploaded.
//! `command` selects the operation; anything unrecognized executes `query`.

use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::Method;
use axum::response::Response;

use fnterm_storage::meta::has_extension;
use fnterm_storage::{DatabaseEngine, QueryResult};

use crate::error::ApiError;
use crate::handlers::api::read_body;
use crate::schema::common::{data, decode_body};
use crate::schema::database::{DatabaseRequest, SqlUpload, TableRow, ViewRow};
use crate::state::AppState;

/// Form field carrying the script of an `upload-sql`.
pub const SQL_FILE_FIELD: &str = "sqlFile";

const SQL_EXTENSION: &str = "sql";

/// `POST /database`
pub async fn database_command(
    State(state): State<AppState>,
    method: Method,
    request: Request,
) -> Result<Response, ApiError> {
    if method != Method::POST {
        return Err(ApiError::MethodNotAllowed);
    }
    let (req, upload) = parse_request(&state, request).await?;
    let command = req.command.as_deref().unwrap_or_default();
    tracing::debug!(command, "dispatching database command");

    match command {
        "list-db" => return Ok(data(state.databases.list_databases()?)),
        "backup-db" => {
            let (Some(source), Some(dest)) = (&req.source_db, &req.dest_db) else {
                return Err(ApiError::BadRequest(
                    "Bad Request. \"source_db\" and \"dest_db\" are required.".to_string(),
                ));
            };
            let (source, dest) = state.databases.backup(source, dest)?;
            return Ok(data(format!(
                "Successfully backed up '{}' to '{}'.",
                source, dest
            )));
        }
        _ => {}
    }

    let raw = req.database.as_deref().ok_or_else(|| {
        ApiError::BadRequest("Bad Request. A \"database\" filename is required.".to_string())
    })?;
    let database = DatabaseEngine::validate_name(raw)?;

    match command {
        "delete-db" => {
            let name = state.databases.delete_database(&database)?;
            Ok(data(format!("Successfully deleted database '{}'.", name)))
        }
        "start" => {
            let name = state.databases.start(&database)?;
            Ok(data(format!(
                "Database session started with '{}'. File created if it did not exist.",
                name
            )))
        }
        "list-tbl" => {
            let rows: Vec<TableRow> = state
                .databases
                .list_tables(&database)?
                .into_iter()
                .map(|table_name| TableRow { table_name })
                .collect();
            Ok(data(rows))
        }
        "list-views" => {
            let rows: Vec<ViewRow> = state
                .databases
                .list_views(&database)?
                .into_iter()
                .map(|view_name| ViewRow { view_name })
                .collect();
            Ok(data(rows))
        }
        "upload-sql" => {
            let upload = upload.ok_or_else(|| {
                ApiError::BadRequest(
                    "File upload error. No .sql file received or upload failed.".to_string(),
                )
            })?;
            if !has_extension(&upload.file_name, SQL_EXTENSION) {
                return Err(ApiError::InvalidType(
                    "Invalid file type. Only .sql files are allowed.".to_string(),
                ));
            }
            let script = String::from_utf8(upload.content).map_err(|_| {
                ApiError::BadRequest("Could not read the uploaded SQL file.".to_string())
            })?;
            Ok(data(state.databases.execute_script(&database, &script)?))
        }
        _ => {
            let query = req.query.as_deref().ok_or_else(|| {
                ApiError::BadRequest("Bad Request. A \"query\" is required.".to_string())
            })?;
            match state.databases.execute(&database, query)? {
                QueryResult::Rows(rows) => Ok(data(rows)),
                QueryResult::Changed { rows_affected } => Ok(data(format!(
                    "Success. {} row(s) affected.",
                    rows_affected
                ))),
            }
        }
    }
}

async fn parse_request(
    state: &AppState,
    request: Request,
) -> Result<(DatabaseRequest, Option<SqlUpload>), ApiError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));
    if !is_multipart {
        let body = read_body(state, request).await?;
        return Ok((decode_body(&body)?, None));
    }

    let upload_error = |err: axum::extract::multipart::MultipartError| {
        ApiError::BadRequest(format!(
            "File upload error. No .sql file received or upload failed. {}",
            err
        ))
    };
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|err| ApiError::BadRequest(format!("File upload error. {}", err)))?;

    let mut req = DatabaseRequest::default();
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == SQL_FILE_FIELD {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content = field.bytes().await.map_err(upload_error)?.to_vec();
            upload = Some(SqlUpload { file_name, content });
        } else {
            req.set_field(&name, field.text().await.map_err(upload_error)?);
        }
    }
    Ok((req, upload))
}
