//! API schema types for request and response bodies.
//!
//! Every successful response is a [`common::Envelope`]; every failure is an
//! [`crate::error::ErrorBody`].

pub mod auth;
pub mod common;
pub mod database;
pub mod files;
