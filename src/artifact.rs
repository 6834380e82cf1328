//! Startup artifacts (the classifier, the public suffix list): use the local
//! copy when present, otherwise download it once into the configured path.

use crate::{
    config::ModelConfig,
    model::{ForestModel, ModelError},
};
use sha2::{Digest, Sha256};
use std::{path::Path, time::Duration};
use tracing::info;

pub async fn fetch_and_load(config: &ModelConfig) -> Result<ForestModel, ModelError> {
    let path = Path::new(&config.path);

    if !tokio::fs::try_exists(path).await? {
        let url = config.url.as_deref().ok_or_else(|| {
            ModelError::Invalid(format!("no model at {} and no download URL configured", path.display()))
        })?;
        download(url, path, config.sha256.as_deref(), config.download_timeout()).await?;
    }

    ForestModel::load(path)
}

async fn download(url: &str, path: &Path, sha256: Option<&str>, timeout: Duration) -> Result<(), ModelError> {
    info!("Downloading model from {}", url);

    let bytes = fetch_bytes(url, timeout)
        .await
        .map_err(|e| ModelError::Download(e.to_string()))?;

    if let Some(expected) = sha256 {
        verify_checksum(&bytes, expected)?;
    }

    // Refuse to cache something that will not load.
    ForestModel::from_slice(&bytes)?;

    store(path, &bytes).await?;
    info!("Stored model at {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// GETs `url`, treating any non-success status as an error.
pub(crate) async fn fetch_bytes(url: &str, timeout: Duration) -> Result<Vec<u8>, reqwest::Error> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let body = client.get(url).send().await?.error_for_status()?.bytes().await?;
    Ok(body.to_vec())
}

/// Writes next to `path` first so readers never see a partial file.
pub(crate) async fn store(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = path.with_extension("part");
    tokio::fs::write(&partial, bytes).await?;
    tokio::fs::rename(&partial, path).await
}

pub fn verify_checksum(data: &[u8], expected: &str) -> Result<(), ModelError> {
    let actual = hex::encode(Sha256::digest(data));
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(ModelError::Checksum {
            expected: expected.to_string(),
            actual,
        })
    }
}
