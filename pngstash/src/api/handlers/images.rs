use axum::{Json, body::Bytes, extract::State, http::Method};
use tracing::debug;

use crate::{
    AppState,
    api::models::images::{ImageCreate, ImageResponse},
    errors::{Error, Result},
    index::{self, IndexEntry},
    ingest::IngestRequest,
};

/// Store a PNG data URL as a file in the image directory.
///
/// The body is parsed as JSON whatever the request's `Content-Type` says, so older uploaders that
/// post JSON as form data keep working.
#[utoipa::path(
    post,
    path = "/stringtopng",
    tag = "images",
    summary = "Upload image",
    description = "Decode a base64 PNG data URL and store it as `<Sitename>-<YYYYMMDDhhmmss>.png`",
    request_body = ImageCreate,
    responses(
        (status = 200, description = "Image stored", body = ImageResponse),
        (status = 400, description = "Malformed body, malformed data URL, bad site name or non-PNG image"),
        (status = 401, description = "Missing or wrong credentials"),
        (status = 405, description = "Method other than POST"),
        (status = 500, description = "Image could not be written"),
    ),
    security(
        ("BasicAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_image(State(state): State<AppState>, body: Bytes) -> Result<Json<ImageResponse>> {
    let upload: ImageCreate = serde_json::from_slice(&body).map_err(|e| {
        debug!("Rejecting upload body: {}", e);
        Error::BadRequest {
            message: "Malformed JSON body".to_string(),
        }
    })?;

    let request = IngestRequest::from(upload);
    let label = request.label.clone();
    let stored = state.ingestor.ingest(request).await?;

    if let Some(image_index) = &state.index {
        index::spawn_record(image_index.clone(), IndexEntry::new(&stored, &label), state.config.index.timeout);
    }

    Ok(Json(ImageResponse {
        success: true,
        filepath: stored.filename,
    }))
}

/// Fallback for any method other than POST on the upload route.
pub async fn reject_method(method: Method) -> Error {
    Error::MethodNotAllowed { method }
}
