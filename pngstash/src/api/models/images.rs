use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ingest::IngestRequest;

/// Image upload request.
///
/// Field names are capitalised to stay wire-compatible with existing uploader clients.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ImageCreate {
    /// Site or source name, used as the filename prefix
    #[serde(rename = "Sitename", alias = "sitename")]
    #[schema(example = "acme")]
    pub sitename: String,
    /// The image as a base64 `data:image/png` URL
    #[serde(rename = "Dataurl", alias = "dataurl")]
    #[schema(example = "data:image/png;base64,iVBORw0KGgo=")]
    pub dataurl: String,
}

impl From<ImageCreate> for IngestRequest {
    fn from(req: ImageCreate) -> Self {
        IngestRequest {
            label: req.sitename,
            payload: req.dataurl,
        }
    }
}

/// Image upload result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct ImageResponse {
    #[serde(rename = "Success")]
    pub success: bool,
    /// Stored filename, retrievable under `/images/`
    #[serde(rename = "Filepath")]
    #[schema(example = "acme-20240102030405.png")]
    pub filepath: String,
}
