//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! - **Upload** (`POST /stringtopng`): Store a PNG data URL, behind basic auth
//! - **Images** (`GET /images/*`): Stored files, served as static content
//! - **Health** (`GET /healthz`): Liveness check
//!
//! # OpenAPI Documentation
//!
//! The upload endpoint is documented with `utoipa`. Interactive docs are served at `/docs`.

pub mod handlers;
pub mod models;
