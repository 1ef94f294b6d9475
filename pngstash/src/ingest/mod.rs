//! The image ingestion pipeline.
//!
//! [`ImageIngestor::ingest`] takes an [`IngestRequest`] through four steps:
//!
//! 1. decode the data URL ([`data_url`])
//! 2. enforce the `image/png` allow-list, optionally checking the PNG signature
//! 3. derive a filename from the label and the current time ([`naming`])
//! 4. write the bytes into the image directory
//!
//! Failures are classified by [`IngestError`] so the HTTP layer can map them to
//! client or server errors without inspecting messages.
//!
//! # Writes
//!
//! Under [`CollisionPolicy::Overwrite`] bytes go to a hidden staging file in the
//! image directory which is then renamed over the target, so concurrent writers
//! of the same name never leave a torn file behind: the last rename wins. Under
//! [`CollisionPolicy::Disambiguate`] the target is created exclusively, moving on
//! to `-1`, `-2`, ... suffixes while names are taken.

pub mod data_url;
pub mod naming;

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bon::Builder;
use chrono::{DateTime, Utc};
use thiserror::Error as ThisError;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub use data_url::{DataUrlError, DecodedPayload};
pub use naming::{CollisionPolicy, LabelError};

/// The only media type accepted for storage.
pub const PNG_MIME: &str = "image/png";

/// First eight bytes of every PNG file.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

const MAX_DISAMBIGUATION: u32 = 1000;

/// Source of the timestamp used in filenames.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// An image upload as handed over by the HTTP layer.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Caller-supplied site/source name. Only used to build the filename.
    pub label: String,
    /// The image as a data URL.
    pub payload: String,
}

/// A successfully written image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Clock reading the filename timestamp was taken from
    pub stored_at: DateTime<Utc>,
}

#[derive(ThisError, Debug)]
pub enum InputError {
    #[error("malformed data URL: {0}")]
    DataUrl(#[from] DataUrlError),

    #[error("invalid label: {0}")]
    Label(#[from] LabelError),
}

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("declared content type {0:?} is not {PNG_MIME}")]
    Declared(String),

    #[error("payload does not start with the PNG signature")]
    SignatureMismatch,
}

#[derive(ThisError, Debug)]
pub enum IngestError {
    /// The request could not be understood. Client error.
    #[error(transparent)]
    BadInput(#[from] InputError),

    /// The payload is not a PNG. Client error.
    #[error(transparent)]
    UnsupportedType(#[from] TypeError),

    /// The write failed. Server error.
    #[error("failed to store {}: {source}", path.display())]
    StorageFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestErrorKind {
    BadInput,
    UnsupportedType,
    StorageFailure,
}

impl IngestError {
    pub fn kind(&self) -> IngestErrorKind {
        match self {
            IngestError::BadInput(_) => IngestErrorKind::BadInput,
            IngestError::UnsupportedType(_) => IngestErrorKind::UnsupportedType,
            IngestError::StorageFailure { .. } => IngestErrorKind::StorageFailure,
        }
    }
}

impl From<DataUrlError> for IngestError {
    fn from(err: DataUrlError) -> Self {
        IngestError::BadInput(err.into())
    }
}

impl From<LabelError> for IngestError {
    fn from(err: LabelError) -> Self {
        IngestError::BadInput(err.into())
    }
}

/// Validates, names and writes uploaded images into a single directory.
///
/// ```ignore
/// let ingestor = ImageIngestor::builder()
///     .image_dir("images")
///     .collision(CollisionPolicy::Disambiguate)
///     .build();
/// ```
#[derive(Debug, Builder)]
pub struct ImageIngestor {
    #[builder(into)]
    image_dir: PathBuf,
    #[builder(default)]
    collision: CollisionPolicy,
    /// Also require the PNG signature, not just the declared type.
    #[builder(default = true)]
    verify_signature: bool,
    #[builder(default = Arc::new(SystemClock) as Arc<dyn Clock>)]
    clock: Arc<dyn Clock>,
}

impl ImageIngestor {
    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Decode, check and store one image. A single write attempt is made; nothing is retried.
    #[instrument(skip_all, fields(label = %request.label))]
    pub async fn ingest(&self, request: IngestRequest) -> Result<StoredImage, IngestError> {
        let decoded = data_url::decode(&request.payload)?;

        if decoded.mime_type != PNG_MIME {
            return Err(TypeError::Declared(decoded.mime_type).into());
        }

        if self.verify_signature && !decoded.bytes.starts_with(&PNG_SIGNATURE) {
            return Err(TypeError::SignatureMismatch.into());
        }

        naming::validate_label(&request.label)?;

        let timestamp = self.clock.now();
        let (filename, path) = match self.collision {
            CollisionPolicy::Overwrite => {
                let filename = naming::make_name(&request.label, timestamp);
                let path = self.write_replacing(&filename, &decoded.bytes).await?;
                (filename, path)
            }
            CollisionPolicy::Disambiguate => self.write_exclusive(&request.label, timestamp, &decoded.bytes).await?,
        };

        let size_bytes = decoded.bytes.len() as u64;
        info!(filename = %filename, size_bytes, "Stored image");

        Ok(StoredImage {
            filename,
            path,
            size_bytes,
            stored_at: timestamp,
        })
    }

    async fn write_replacing(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, IngestError> {
        let target = self.image_dir.join(filename);
        // Labels never start with '.', so staging names cannot shadow stored images. The staging
        // name has a fixed length so any accepted label also fits the filesystem's name limit.
        let staging = self.image_dir.join(format!(".{}.tmp", Uuid::new_v4().simple()));

        let written = async {
            let file = create_exclusive(&staging).await?;
            fill(file, bytes).await?;
            fs::rename(&staging, &target).await
        }
        .await;

        if let Err(source) = written {
            let _ = fs::remove_file(&staging).await;
            return Err(IngestError::StorageFailure { path: target, source });
        }

        debug!(path = %target.display(), "Replaced image via staging file");
        Ok(target)
    }

    async fn write_exclusive(&self, label: &str, timestamp: DateTime<Utc>, bytes: &[u8]) -> Result<(String, PathBuf), IngestError> {
        for n in 0..=MAX_DISAMBIGUATION {
            let filename = if n == 0 {
                naming::make_name(label, timestamp)
            } else {
                naming::disambiguated_name(label, timestamp, n)
            };
            let path = self.image_dir.join(&filename);

            let file = match create_exclusive(&path).await {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(filename = %filename, "Name taken, trying next suffix");
                    continue;
                }
                Err(source) => return Err(IngestError::StorageFailure { path, source }),
            };

            if let Err(source) = fill(file, bytes).await {
                let _ = fs::remove_file(&path).await;
                return Err(IngestError::StorageFailure { path, source });
            }

            return Ok((filename, path));
        }

        Err(IngestError::StorageFailure {
            path: self.image_dir.join(naming::make_name(label, timestamp)),
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("all {MAX_DISAMBIGUATION} suffixes are taken"),
            ),
        })
    }
}

async fn create_exclusive(path: &Path) -> io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(FILE_MODE);
    options.open(path).await
}

async fn fill(mut file: fs::File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes).await?;
    file.sync_all().await
}
