//! HTTP request handlers.
//!
//! # Handler Modules
//!
//! - [`images`]: Data URL upload
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`], which converts to a plain-text response with the
//! matching status code. Storage details are logged, never returned to the client.

pub mod images;
