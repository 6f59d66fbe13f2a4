//! Content-addressed response cache.
//!
//! Entries are keyed by the URL digest: the body lives at
//! `<dir>/<digest>`, the structured extraction at `<dir>/<digest>.json`,
//! and the response headers at `<dir>/<digest>.headers`. All writes go
//! through a temp-then-rename step so readers never observe a partial
//! file. An entry is fresh while its mtime age stays within the
//! configured limit.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;

use crate::response::HttpResponse;
use crate::url::Url;

pub struct CacheManager {
    dir: PathBuf,
    max_age: Duration,
}

impl CacheManager {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            max_age,
        }
    }

    fn body_path(&self, url: &Url) -> PathBuf {
        self.dir.join(url.digest())
    }

    /// Unreadable timestamps count as expired.
    async fn is_expired(&self, path: &Path) -> bool {
        let Ok(meta) = tokio::fs::metadata(path).await else {
            return true;
        };
        match meta.modified().ok().and_then(|m| m.elapsed().ok()) {
            Some(age) => age > self.max_age,
            None => true,
        }
    }

    /// True when a fresh body exists for `url`.
    pub async fn is_cached(&self, url: &Url) -> bool {
        let path = self.body_path(url);
        tokio::fs::try_exists(&path).await.unwrap_or(false) && !self.is_expired(&path).await
    }

    /// Returns the cached body when present and fresh.
    pub async fn fetch(&self, url: &Url) -> Option<Vec<u8>> {
        let path = self.body_path(url);
        if self.is_expired(&path).await {
            return None;
        }
        match tokio::fs::read(&path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                log::warn!("cache read failed for {url}: {e}");
                None
            }
        }
    }

    /// Stores the raw body atomically.
    pub async fn store_body(&self, url: &Url, body: &[u8]) -> Result<()> {
        self.atomic_write(&self.body_path(url), body)
            .await
            .with_context(|| format!("caching body for {url}"))
    }

    /// Stores the body plus a `.headers` document mapping each header name
    /// to its first value.
    pub async fn store_response(&self, url: &Url, response: &HttpResponse) -> Result<()> {
        self.store_body(url, response.body()).await?;
        let mut headers = serde_json::Map::new();
        for (name, value) in response.headers() {
            headers
                .entry(name.clone())
                .or_insert_with(|| serde_json::Value::String(value.clone()));
        }
        self.store_json(url, &serde_json::Value::Object(headers), "headers")
            .await
    }

    /// Stores a structured document at `<digest>.<ext>`, pretty-printed
    /// with 2-space indent and a trailing newline.
    pub async fn store_json(&self, url: &Url, data: &serde_json::Value, ext: &str) -> Result<()> {
        let mut path = self.body_path(url);
        path.set_extension(ext);
        let mut rendered = serde_json::to_string_pretty(data)?;
        rendered.push('\n');
        self.atomic_write(&path, rendered.as_bytes())
            .await
            .with_context(|| format!("caching .{ext} for {url}"))
    }

    /// Write to `<target>.tmp`, flush, rename over `<target>`.
    async fn atomic_write(&self, target: &Path, data: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.ok();
        let mut tmp_name = target.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);
        {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp, target).await?;
        Ok(())
    }
}
