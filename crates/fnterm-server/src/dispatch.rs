//! Command resolution for `/api/{command}`.
//!
//! A command name resolves to one of the built-in [`Verb`]s, checked in a
//! fixed priority order, or else to a registry function. Function arguments
//! are positional: query parameters (or the keys of a JSON object body) are
//! sorted by key and their values passed in that order, so `add?p1=2&p0=3`
//! calls `add(3, 2)`.

use std::collections::BTreeMap;

use axum::http::Method;
use fnterm_script::Value;

use crate::error::ApiError;

/// Built-in file verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    ReadConfig,
    UpdateConfig,
    List,
    ListDir,
    Read,
    Upload,
    Write,
    Update,
    Append,
    Delete,
}

impl Verb {
    /// All verbs in resolution priority order.
    pub const ALL: [Verb; 10] = [
        Verb::ReadConfig,
        Verb::UpdateConfig,
        Verb::List,
        Verb::ListDir,
        Verb::Read,
        Verb::Upload,
        Verb::Write,
        Verb::Update,
        Verb::Append,
        Verb::Delete,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Verb::ReadConfig => "read-config",
            Verb::UpdateConfig => "update-config",
            Verb::List => "list",
            Verb::ListDir => "listdir",
            Verb::Read => "read",
            Verb::Upload => "upload",
            Verb::Write => "write",
            Verb::Update => "update",
            Verb::Append => "append",
            Verb::Delete => "delete",
        }
    }

    pub fn from_name(name: &str) -> Option<Verb> {
        Verb::ALL.into_iter().find(|verb| verb.name() == name)
    }

    /// The only method the verb accepts.
    pub fn method(&self) -> Method {
        match self {
            Verb::ReadConfig | Verb::List | Verb::ListDir | Verb::Read => Method::GET,
            _ => Method::POST,
        }
    }

    /// Whether the verb changes the function directory.
    pub fn mutates_functions(&self) -> bool {
        matches!(
            self,
            Verb::Upload | Verb::Write | Verb::Update | Verb::Append | Verb::Delete
        )
    }
}

/// What a command name resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Verb(Verb),
    Function(String),
}

impl Target {
    /// Resolves a command name; an empty name is a client error.
    pub fn resolve(command: &str) -> Result<Target, ApiError> {
        let command = command.trim_matches('/');
        let command = command.split('/').next().unwrap_or_default();
        if command.is_empty() {
            return Err(no_command());
        }
        Ok(match Verb::from_name(command) {
            Some(verb) => Target::Verb(verb),
            None => Target::Function(command.to_string()),
        })
    }
}

pub fn no_command() -> ApiError {
    ApiError::BadRequest("No command specified. Try /list to see available functions.".to_string())
}

/// Fails with 405 unless `method` is the verb's method.
pub fn check_method(verb: Verb, method: &Method) -> Result<(), ApiError> {
    if *method == verb.method() {
        Ok(())
    } else {
        Err(ApiError::MethodNotAllowed)
    }
}

/// Positional arguments of a function call.
///
/// A non-empty POST body wins over the query string: a JSON object is
/// ordered by key like the query, a JSON array is taken as-is, any other
/// JSON value is a single argument.
pub fn positional_args(
    query: BTreeMap<String, String>,
    body: &[u8],
) -> Result<Vec<Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(query.into_values().map(Value::Str).collect());
    }

    let json: serde_json::Value = serde_json::from_slice(body)
        .map_err(|err| ApiError::BadRequest(format!("Bad Request. Invalid JSON body: {}", err)))?;
    Ok(match json {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<String, serde_json::Value> = map.into_iter().collect();
            sorted.into_values().map(Value::from_json).collect()
        }
        serde_json::Value::Array(items) => items.into_iter().map(Value::from_json).collect(),
        other => vec![Value::from_json(other)],
    })
}
