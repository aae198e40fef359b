//! HTTP/JSON server for the fnterm browser terminal.
//!
//! Exposes the function API (`/api/{command}`), the database API
//! (`/database`) and the login routes (`/auth/*`). This crate holds the
//! configuration, session gate, command dispatcher, handlers and router;
//! function evaluation lives in `fnterm-script` and file and SQLite access
//! in `fnterm-storage`.

pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod router;
pub mod schema;
pub mod session;
pub mod state;
