//! API request and response data models.
//!
//! These define the public wire contract and are annotated with `utoipa` for the generated
//! OpenAPI document.
//!
//! - [`images`]: Image upload request and result

pub mod images;
