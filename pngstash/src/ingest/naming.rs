//! Filename derivation for stored images.
//!
//! Names take the form `<label>-<YYYYMMDDhhmmss>.png` with the timestamp in UTC.
//! Resolution is one second, so the same label within the same second maps to
//! the same name; what happens then is decided by [`CollisionPolicy`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Sortable, separator-free timestamp layout (e.g. `20240102030405`).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

pub const EXTENSION: &str = "png";

pub const MAX_LABEL_LEN: usize = 200;

/// What to do when a generated name already exists in the image directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Replace the existing file. Last writer wins.
    #[default]
    Overwrite,
    /// Keep the existing file and append `-1`, `-2`, ... to the new name.
    Disambiguate,
}

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("label is empty")]
    Empty,

    #[error("label exceeds {MAX_LABEL_LEN} bytes")]
    TooLong,

    #[error("label contains a path separator")]
    PathSeparator,

    #[error("label contains a '..' segment")]
    ParentSegment,

    #[error("label starts with '.'")]
    Hidden,

    #[error("label contains control characters")]
    ControlCharacter,
}

/// Reject labels that could escape the image directory or produce awkward names.
pub fn validate_label(label: &str) -> Result<(), LabelError> {
    if label.is_empty() {
        return Err(LabelError::Empty);
    }
    if label.len() > MAX_LABEL_LEN {
        return Err(LabelError::TooLong);
    }
    if label.chars().any(|c| c == '/' || c == '\\') {
        return Err(LabelError::PathSeparator);
    }
    if label.contains("..") {
        return Err(LabelError::ParentSegment);
    }
    if label.starts_with('.') {
        return Err(LabelError::Hidden);
    }
    if label.chars().any(char::is_control) {
        return Err(LabelError::ControlCharacter);
    }
    Ok(())
}

/// Build the canonical name for `label` at `timestamp`.
///
/// Deterministic: the same `(label, timestamp)` at second resolution always
/// yields the same name. The label is not validated here; see [`validate_label`].
pub fn make_name(label: &str, timestamp: DateTime<Utc>) -> String {
    format!("{label}-{}.{EXTENSION}", timestamp.format(TIMESTAMP_FORMAT))
}

/// Name used for the `n`th same-second collision under [`CollisionPolicy::Disambiguate`].
pub fn disambiguated_name(label: &str, timestamp: DateTime<Utc>, n: u32) -> String {
    format!("{label}-{}-{n}.{EXTENSION}", timestamp.format(TIMESTAMP_FORMAT))
}
