/// Photo upload
///
/// A picked file is checked (size, image signature), its camera direction is
/// read from EXIF, and the bytes are handed to a `PhotoStorage`. The returned
/// URI is what ends up in a Location's `photos` list.

use async_trait::async_trait;
use image::ImageFormat;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::exif;
use crate::state::edit::AttachedPhoto;
use crate::state::remote::with_trailing_slash;

/// Largest photo accepted for upload
pub const MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("photo is {size} bytes; the limit is {max}")]
    TooLarge { size: usize, max: usize },
    #[error("the file is not an image")]
    NotAnImage,
    #[error("could not read photo: {0}")]
    Read(#[from] std::io::Error),
    #[error("upload failed: {0}")]
    Failed(String),
}

/// A photo read into memory and checked
#[derive(Debug, Clone)]
pub struct PhotoFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl PhotoFile {
    pub async fn load(path: &Path) -> Result<Self, UploadError> {
        let metadata = tokio::fs::metadata(path).await?;
        let size = metadata.len() as usize;
        if size > MAX_PHOTO_BYTES {
            return Err(UploadError::TooLarge {
                size,
                max: MAX_PHOTO_BYTES,
            });
        }
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("photo")
            .to_string();
        Self::from_bytes(name, bytes)
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, UploadError> {
        if bytes.len() > MAX_PHOTO_BYTES {
            return Err(UploadError::TooLarge {
                size: bytes.len(),
                max: MAX_PHOTO_BYTES,
            });
        }
        let format = image::guess_format(&bytes).map_err(|_| UploadError::NotAnImage)?;
        Ok(Self {
            name: name.into(),
            bytes,
            format,
        })
    }

    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("img")
    }

    pub fn exif_heading(&self) -> Option<f64> {
        match self.format {
            ImageFormat::Jpeg => exif::image_direction(&self.bytes),
            _ => None,
        }
    }
}

/// Where photo bytes end up
#[async_trait]
pub trait PhotoStorage: Send + Sync {
    /// Store the photo and return the URI to record on the Location
    async fn store(&self, photo: &PhotoFile) -> Result<String, UploadError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest<'a> {
    file_name: &'a str,
    content_type: &'a str,
}

#[derive(Deserialize)]
struct UploadTicket {
    #[serde(rename = "uploadURL")]
    upload_url: String,
}

/// Object storage reached through a pre-signed PUT URL from the backend
#[derive(Debug, Clone)]
pub struct SignedUrlStorage {
    client: Client,
    endpoint: Url,
}

impl SignedUrlStorage {
    pub fn new(api_base: &str) -> Result<Self, UploadError> {
        let endpoint = Url::parse(&with_trailing_slash(api_base))
            .and_then(|base| base.join("api/objects/upload"))
            .map_err(|e| UploadError::Failed(format!("invalid backend url {api_base}: {e}")))?;
        Ok(Self {
            client: Client::new(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// The stored URI is the signed URL without its credentials
pub fn public_url(signed: &str) -> Result<String, UploadError> {
    let mut url = Url::parse(signed)
        .map_err(|e| UploadError::Failed(format!("backend returned a bad upload url: {e}")))?;
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

fn failed(err: reqwest::Error) -> UploadError {
    UploadError::Failed(err.to_string())
}

#[async_trait]
impl PhotoStorage for SignedUrlStorage {
    async fn store(&self, photo: &PhotoFile) -> Result<String, UploadError> {
        let ticket: UploadTicket = self
            .client
            .post(self.endpoint.clone())
            .json(&UploadRequest {
                file_name: &photo.name,
                content_type: photo.content_type(),
            })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(failed)?
            .json()
            .await
            .map_err(failed)?;

        self.client
            .put(&ticket.upload_url)
            .header(reqwest::header::CONTENT_TYPE, photo.content_type())
            .body(photo.bytes.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(failed)?;

        let uri = public_url(&ticket.upload_url)?;
        debug!(%uri, "photo uploaded");
        Ok(uri)
    }
}

/// Copies photos into the app's data directory (local mode)
#[derive(Debug, Clone)]
pub struct LocalPhotoStorage {
    dir: PathBuf,
}

impl LocalPhotoStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// `<data dir>/spotmap/photos`
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("spotmap").join("photos"))
    }
}

#[async_trait]
impl PhotoStorage for LocalPhotoStorage {
    async fn store(&self, photo: &PhotoFile) -> Result<String, UploadError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self
            .dir
            .join(format!("{}.{}", uuid::Uuid::new_v4(), photo.extension()));
        tokio::fs::write(&path, &photo.bytes).await?;

        let uri = Url::from_file_path(&path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| path.display().to_string());
        debug!(%uri, "photo copied");
        Ok(uri)
    }
}

/// Load, store and tag one picked photo.
///
/// The heading comes from EXIF when present, else the caller's fallback
/// (current device bearing), else 0.
pub async fn attach(
    storage: Arc<dyn PhotoStorage>,
    path: PathBuf,
    fallback_heading: Option<f64>,
) -> Result<AttachedPhoto, UploadError> {
    let photo = PhotoFile::load(&path).await.inspect_err(|e| {
        warn!(path = %path.display(), error = %e, "photo rejected");
    })?;

    let heading = photo
        .exif_heading()
        .or(fallback_heading)
        .unwrap_or(0.0);
    let uri = storage.store(&photo).await?;
    info!(name = %photo.name, heading, "photo attached");

    Ok(AttachedPhoto { uri, heading })
}
