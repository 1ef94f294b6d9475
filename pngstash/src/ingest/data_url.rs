//! Parsing of `data:` URLs into a declared media type and raw bytes.
//!
//! The accepted grammar is the one from RFC 2397:
//!
//! ```text
//! data:[<mediatype>][;base64],<data>
//! mediatype := [ type "/" subtype ] *( ";" attribute "=" value )
//! ```
//!
//! Only the base64 form is decoded. A data URL without the `;base64` marker
//! carries percent-encoded text, which is rejected with
//! [`DataUrlError::UnsupportedEncoding`] rather than guessed at.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use thiserror::Error as ThisError;

const SCHEME: &str = "data:";
const BASE64_MARKER: &str = "base64";

/// Media type implied by RFC 2397 when the header declares none.
pub const DEFAULT_MEDIA_TYPE: &str = "text/plain";

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum DataUrlError {
    #[error("missing 'data:' scheme")]
    MissingScheme,

    #[error("missing ',' between header and payload")]
    MissingComma,

    #[error("invalid media type {0:?}")]
    InvalidMediaType(String),

    #[error("invalid media type parameter {0:?}")]
    InvalidParameter(String),

    #[error("payload is not valid base64: {0}")]
    InvalidBase64(String),

    /// The payload is percent-encoded text; only base64 payloads are decoded.
    #[error("percent-encoded data URLs are not supported")]
    UnsupportedEncoding,
}

/// The decoded contents of a data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    /// Media type exactly as declared, e.g. `image/png`. No case folding.
    pub mime_type: String,
    /// `attribute=value` parameters following the media type, in order.
    pub params: Vec<(String, String)>,
    pub bytes: Vec<u8>,
}

/// Decode a base64 data URL.
pub fn decode(raw: &str) -> Result<DecodedPayload, DataUrlError> {
    let raw = raw.trim();

    let rest = match raw.get(..SCHEME.len()) {
        Some(scheme) if scheme.eq_ignore_ascii_case(SCHEME) => &raw[SCHEME.len()..],
        _ => return Err(DataUrlError::MissingScheme),
    };

    let (header, data) = rest.split_once(',').ok_or(DataUrlError::MissingComma)?;

    let mut segments: Vec<&str> = header.split(';').collect();
    let is_base64 = segments.len() > 1 && segments.last().is_some_and(|s| s.eq_ignore_ascii_case(BASE64_MARKER));
    if is_base64 {
        segments.pop();
    }

    // split always yields at least one segment
    let declared = segments.remove(0);
    let mime_type = if declared.is_empty() {
        DEFAULT_MEDIA_TYPE.to_string()
    } else {
        validate_media_type(declared)?;
        declared.to_string()
    };

    let params = segments.into_iter().map(parse_parameter).collect::<Result<Vec<_>, _>>()?;

    if !is_base64 {
        return Err(DataUrlError::UnsupportedEncoding);
    }

    let bytes = STANDARD.decode(data).map_err(|e| DataUrlError::InvalidBase64(e.to_string()))?;

    Ok(DecodedPayload { mime_type, params, bytes })
}

/// Encode bytes as a base64 data URL with the given media type.
pub fn encode(mime_type: &str, bytes: &[u8]) -> String {
    format!("{SCHEME}{mime_type};{BASE64_MARKER},{}", STANDARD.encode(bytes))
}

fn validate_media_type(declared: &str) -> Result<(), DataUrlError> {
    let valid = declared
        .split_once('/')
        .is_some_and(|(kind, subtype)| is_token(kind) && is_token(subtype));
    if valid {
        Ok(())
    } else {
        Err(DataUrlError::InvalidMediaType(declared.to_string()))
    }
}

fn parse_parameter(segment: &str) -> Result<(String, String), DataUrlError> {
    match segment.split_once('=') {
        Some((attribute, value)) if is_token(attribute) => Ok((attribute.to_string(), value.to_string())),
        _ => Err(DataUrlError::InvalidParameter(segment.to_string())),
    }
}

/// RFC 2045 token: printable ASCII minus whitespace and tspecials.
fn is_token(s: &str) -> bool {
    const TSPECIALS: &[u8] = b"()<>@,;:\\\"/[]?=";
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_graphic() && !TSPECIALS.contains(&b))
}
