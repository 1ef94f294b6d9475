//! OpenAPI documentation for the upload API.
//!
//! The document is served as JSON at `/api-docs/openapi.json` and rendered with Scalar at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

/// Security scheme for the upload endpoint (HTTP basic auth only).
struct BasicSecurityAddon;

impl Modify for BasicSecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BasicAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Basic)
                        .description(Some(
                            "Basic authentication with the configured uploader credentials:\n\n\
                            ```\nAuthorization: Basic base64(username:password)\n```",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "pngstash API",
        description = "Store PNG data URLs as files and serve them back as static content."
    ),
    modifiers(&BasicSecurityAddon),
    paths(api::handlers::images::create_image),
    components(schemas(api::models::images::ImageCreate, api::models::images::ImageResponse)),
    tags(
        (name = "images", description = "Upload images as base64 `data:image/png` URLs. Stored files are served under `/images/`."),
    )
)]
pub struct ApiDoc;
