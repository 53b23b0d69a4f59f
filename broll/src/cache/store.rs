//! On-disk asset store addressed by content hash.
//!
//! Files land at `<dir>/<sha256>.<ext>`. Writes go to a temp file in the
//! same directory first, so a crashed download never leaves a file under a
//! content-hash name.

use std::path::{Path, PathBuf};

use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::Result;
use crate::database::models::MediaKind;

/// A file persisted in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub path: PathBuf,
    pub content_hash: String,
    pub size: u64,
    pub kind: MediaKind,
}

#[derive(Debug, Clone)]
pub struct AssetStore {
    dir: PathBuf,
}

impl AssetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, content_hash: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{content_hash}.{ext}"))
    }

    /// Stream `chunks` into the store, hashing as they arrive.
    pub async fn write_stream<S, B, E>(&self, chunks: S, ext: &str) -> Result<StoredAsset>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: Into<crate::Error>,
    {
        tokio::fs::create_dir_all(&self.dir).await?;

        let dir = self.dir.clone();
        let tmp = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(".partial-")
                .tempfile_in(dir)
        })
        .await
        .map_err(|e| crate::Error::Other(format!("temp file task failed: {e}")))??;
        let (file, temp_path) = tmp.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut hasher = Sha256::new();
        let mut size = 0u64;

        let mut chunks = std::pin::pin!(chunks);
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(Into::into)?;
            let bytes = chunk.as_ref();
            hasher.update(bytes);
            file.write_all(bytes).await?;
            size += bytes.len() as u64;
        }
        file.flush().await?;
        drop(file);

        let content_hash = hex::encode(hasher.finalize());
        let path = self.path_for(&content_hash, ext);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(path = %path.display(), "Asset already stored, discarding duplicate download");
        } else {
            let target = path.clone();
            tokio::task::spawn_blocking(move || temp_path.persist(target).map_err(|e| e.error))
                .await
                .map_err(|e| crate::Error::Other(format!("persist task failed: {e}")))??;
        }

        Ok(StoredAsset {
            kind: MediaKind::from_extension(ext),
            path,
            content_hash,
            size,
        })
    }

    pub async fn write_bytes(&self, bytes: &[u8], ext: &str) -> Result<StoredAsset> {
        let chunk: std::result::Result<&[u8], crate::Error> = Ok(bytes);
        self.write_stream(futures::stream::iter([chunk]), ext).await
    }
}

/// File extension for a remote asset, lower-cased; `bin` when absent or odd.
pub fn extension_from_url(url: &str) -> String {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or(url).to_string());

    Path::new(&path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string())
}
