use crate::{config::StorageConfig, models::ProviderKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// First-party object storage for generated media.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Stores `bytes` under `key` and returns the public URL.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;
}

/// Storage speaking the Supabase-style `/storage/v1/object` API.
pub struct HttpObjectStore {
    client: reqwest::Client,
    config: StorageConfig,
}

impl HttpObjectStore {
    pub fn new(config: StorageConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            config: StorageConfig {
                url: config.url.trim_end_matches('/').to_string(),
                ..config
            },
        })
    }
}

#[async_trait]
impl MediaStore for HttpObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let response = self
            .client
            .post(format!(
                "{}/storage/v1/object/{}/{}",
                self.config.url, self.config.bucket, key
            ))
            .bearer_auth(&self.config.api_key)
            .header("content-type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .context("storage upload failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("storage rejected upload ({}): {}", status, body);
        }

        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.config.url, self.config.bucket, key
        ))
    }
}

/// Copies provider media into first-party storage, byte for byte.
pub struct MediaRehoster {
    http: reqwest::Client,
    store: Option<Arc<dyn MediaStore>>,
}

impl MediaRehoster {
    pub fn new(store: Option<Arc<dyn MediaStore>>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, store })
    }

    pub fn disabled() -> Self {
        Self { http: reqwest::Client::new(), store: None }
    }

    /// Returns one URL per input. Any URL that cannot be re-hosted is returned unchanged.
    pub async fn rehost_all(
        &self,
        provider: ProviderKind,
        external_task_id: &str,
        urls: Vec<String>,
    ) -> Vec<String> {
        let Some(store) = &self.store else {
            return urls;
        };

        let uploads = urls.into_iter().enumerate().map(|(index, url)| async move {
            match self.rehost_one(store.as_ref(), provider, external_task_id, index, &url).await {
                Ok(hosted) => hosted,
                Err(e) => {
                    tracing::warn!("Keeping provider URL {} after rehost failure: {:#}", url, e);
                    url
                }
            }
        });

        join_all(uploads).await
    }

    async fn rehost_one(
        &self,
        store: &dyn MediaStore,
        provider: ProviderKind,
        external_task_id: &str,
        index: usize,
        url: &str,
    ) -> Result<String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .context("download failed")?
            .error_for_status()
            .context("download rejected")?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await.context("download interrupted")?;

        let key = format!(
            "generations/{}/{}/{}.{}",
            provider,
            sanitize(external_task_id),
            index,
            extension(&content_type, url)
        );

        let hosted = store.put(&key, bytes.to_vec(), &content_type).await?;
        tracing::debug!("Rehosted {} -> {}", url, hosted);
        Ok(hosted)
    }
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn extension(content_type: &str, url: &str) -> String {
    let from_mime = match content_type.split(';').next().unwrap_or("").trim() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    };
    if let Some(ext) = from_mime {
        return ext.to_string();
    }

    url.split(&['?', '#'][..])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .and_then(|file| file.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_prefers_mime_then_url() {
        assert_eq!(extension("image/png", "https://x/y"), "png");
        assert_eq!(extension("application/octet-stream", "https://x/a/b.JPEG?sig=1"), "jpeg");
        assert_eq!(extension("application/octet-stream", "https://x/a/b"), "bin");
    }

    #[test]
    fn task_ids_are_made_path_safe() {
        assert_eq!(sanitize("ab/../c d"), "ab____c_d");
    }
}
