//! Asset download into the content-addressed store.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::Result;
use crate::cache::store::extension_from_url;
use crate::cache::{AssetStore, StoredAsset};

/// Downloads a located asset to local storage.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<StoredAsset>;
}

/// Streams HTTP responses into an [`AssetStore`].
pub struct HttpAssetFetcher {
    client: reqwest::Client,
    store: AssetStore,
}

impl HttpAssetFetcher {
    pub fn new(client: reqwest::Client, store: AssetStore) -> Self {
        Self { client, store }
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<StoredAsset> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        let mut ext = extension_from_url(url);
        if ext == "bin" {
            if let Some(guessed) = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .and_then(extension_from_content_type)
            {
                ext = guessed.to_string();
            }
        }

        let stored = self.store.write_stream(response.bytes_stream(), &ext).await?;
        debug!(
            url = %url,
            path = %stored.path.display(),
            size = stored.size,
            "Downloaded asset"
        );
        Ok(stored)
    }
}

fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    Some(match mime.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        _ => return None,
    })
}
