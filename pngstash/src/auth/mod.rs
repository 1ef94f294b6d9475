//! Access control for the ingest endpoint.
//!
//! Uploads are gated by HTTP basic authentication against a single username/password pair from
//! [`crate::config::AuthConfig`]. The check is a request-filtering layer wrapped around the ingest
//! route; the ingestion pipeline itself knows nothing about credentials.
//!
//! # Modules
//!
//! - [`middleware`]: Basic-auth middleware and credential parsing

pub mod middleware;
