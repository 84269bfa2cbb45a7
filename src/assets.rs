use crate::http::{HttpClient, HttpError, HttpRequest};
use crate::openai::GeneratedImage;
use crate::store::{MediaId, MediaUpload, ProductId, ProductStore, StoreError};
use std::{path::PathBuf, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to download image: {0}")]
    Download(#[from] HttpError),
    #[error("image download returned HTTP {0}")]
    Status(u16),
    #[error("image download was empty")]
    EmptyBody,
    #[error("temporary file error: {0}")]
    TempFile(#[from] std::io::Error),
    #[error("failed to add image to library: {0}")]
    Register(StoreError),
    #[error("failed to set product image: {0}")]
    SetPrimary(StoreError),
}

/// Downloads generated images and makes them the primary image of a product.
pub struct AssetIngestor {
    http: Arc<dyn HttpClient>,
    store: Arc<dyn ProductStore>,
    download_timeout: Duration,
    temp_dir: Option<PathBuf>,
}

impl AssetIngestor {
    pub fn new(http: Arc<dyn HttpClient>, store: Arc<dyn ProductStore>) -> Self {
        Self {
            http,
            store,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            temp_dir: None,
        }
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    #[cfg(test)]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub async fn attach(
        &self,
        image: GeneratedImage,
        product: ProductId,
        product_name: &str,
    ) -> Result<MediaId, AssetError> {
        let (bytes, content_type) = match image {
            GeneratedImage::Inline(bytes) => (bytes, None),
            GeneratedImage::Url(url) => {
                let response = self
                    .http
                    .send(HttpRequest::get(url).timeout(self.download_timeout))
                    .await?;
                if !response.is_success() {
                    return Err(AssetError::Status(response.status));
                }
                (response.body, response.content_type)
            }
        };
        if bytes.is_empty() {
            return Err(AssetError::EmptyBody);
        }

        let content_type = content_type
            .as_deref()
            .and_then(normalize_content_type)
            .unwrap_or("image/png");
        let extension = extension_for(content_type);

        // removed on drop, so every early return below releases it
        let suffix = format!(".{extension}");
        let mut builder = tempfile::Builder::new();
        builder.prefix("demo-product-").suffix(&suffix);
        let temp = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        tokio::fs::write(temp.path(), &bytes).await?;

        let filename = unique_filename(product_name, extension);
        let media = self
            .store
            .register_media(
                product,
                MediaUpload {
                    path: temp.path(),
                    filename: &filename,
                    content_type,
                },
            )
            .await
            .map_err(AssetError::Register)?;
        self.store
            .set_primary_image(product, media)
            .await
            .map_err(AssetError::SetPrimary)?;

        temp.close()?;
        debug!(target: "importer.assets", product_id = %product, media_id = %media, filename = %filename, "image attached");
        Ok(media)
    }
}

fn normalize_content_type(raw: &str) -> Option<&'static str> {
    let essence = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => Some("image/png"),
        "image/jpeg" | "image/jpg" => Some("image/jpeg"),
        "image/webp" => Some("image/webp"),
        "image/gif" => Some("image/gif"),
        _ => None,
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

/// `{stem}-{uuid}.{ext}`; falls back to `product` when the name has no
/// usable characters.
pub fn unique_filename(product_name: &str, extension: &str) -> String {
    let stem = filename_stem(product_name);
    let stem = if stem.is_empty() { "product".to_string() } else { stem };
    format!("{stem}-{}.{extension}", Uuid::new_v4().simple())
}

/// Lowercased letters and digits in any script, with every other run of
/// characters collapsed into a single `-`.
fn filename_stem(name: &str) -> String {
    let mut stem = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_dash && !stem.is_empty() {
                stem.push('-');
            }
            pending_dash = false;
            stem.push(ch);
        } else {
            pending_dash = true;
        }
    }
    stem
}
