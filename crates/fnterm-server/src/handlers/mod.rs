//! HTTP handler modules for the fnterm API.
//!
//! Handlers parse the request, delegate to the file store, the function
//! registry, or the database engine held in [`crate::state::AppState`], and
//! wrap the outcome in the `{data}` envelope.

pub mod api;
pub mod auth;
pub mod database;
