use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::{AppState, config::AuthConfig, errors::Error};

/// Credentials carried by an `Authorization: Basic ...` header.
#[derive(Debug, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

/// Parse basic-auth credentials from request headers.
///
/// Returns `None` when the header is missing, uses another scheme, or is not valid
/// `base64(username:password)`.
pub fn parse_basic_credentials(headers: &HeaderMap) -> Option<BasicCredentials> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;

    Some(BasicCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Check credentials against the configured pair.
///
/// Both sides are hashed first so the comparison time depends on neither length nor content.
pub fn credentials_match(credentials: &BasicCredentials, config: &AuthConfig) -> bool {
    let username_ok = constant_time_eq(&Sha256::digest(&credentials.username), &Sha256::digest(&config.username));
    let password_ok = constant_time_eq(&Sha256::digest(&credentials.password), &Sha256::digest(&config.password));
    username_ok & password_ok
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Middleware rejecting requests without the configured basic-auth credentials.
pub async fn basic_auth_middleware(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, Error> {
    let auth = &state.config.auth;

    match parse_basic_credentials(request.headers()) {
        Some(credentials) if credentials_match(&credentials, auth) => {
            trace!("Basic auth accepted for {}", credentials.username);
            Ok(next.run(request).await)
        }
        Some(credentials) => {
            debug!("Basic auth rejected for {}", credentials.username);
            Err(Error::Unauthenticated { realm: auth.realm.clone() })
        }
        None => {
            debug!("Request to {} without basic auth credentials", request.uri().path());
            Err(Error::Unauthenticated { realm: auth.realm.clone() })
        }
    }
}
