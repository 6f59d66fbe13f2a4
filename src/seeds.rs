//! Seed-URL store: newline-delimited list files, one per registrable
//! domain, named by the domain's digest.
//!
//! Loading scans every regular file in the data directory; lines that do
//! not parse to a valid URL (missing scheme or host) are skipped with a
//! warning. Appends are deduplicated, sorted, stripped of embedded
//! newlines, and written as one contiguous blob, prefixed with a newline
//! when the existing file does not end in one.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::url::{sha256_hex, Url};

pub struct UrlSeedStore {
    dir: PathBuf,
    urls: Vec<Url>,
}

impl UrlSeedStore {
    /// Scans `dir` and loads every regular file as a URL list.
    pub async fn load(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let meta = tokio::fs::metadata(&dir)
            .await
            .with_context(|| format!("seed directory {} does not exist", dir.display()))?;
        if !meta.is_dir() {
            bail!("seed path {} is not a directory", dir.display());
        }

        let mut store = Self {
            dir: dir.clone(),
            urls: Vec::new(),
        };
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("reading seed directory {}", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if let Err(e) = store.load_file(&path).await {
                log::warn!("failed to load seed file {}: {e}", path.display());
            }
        }
        log::debug!("loaded {} seed URLs from {}", store.urls.len(), dir.display());
        Ok(store)
    }

    async fn load_file(&mut self, path: &Path) -> Result<()> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        for line in text.lines() {
            let line = line.trim_end_matches('\r').trim();
            if line.is_empty() {
                continue;
            }
            let url = Url::parse(line);
            if url.is_valid() {
                self.urls.push(url);
            } else {
                log::warn!("skipping invalid seed URL in {}: {line}", path.display());
            }
        }
        Ok(())
    }

    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    /// Groups seeds by registrable domain (falling back to the host when
    /// the registrable part is empty), each batch ordered by canonical
    /// string.
    pub fn batches_by_domain(&self) -> BTreeMap<String, BTreeSet<Url>> {
        let mut batches: BTreeMap<String, BTreeSet<Url>> = BTreeMap::new();
        for url in &self.urls {
            let domain = match url.registrable_domain() {
                d if d.is_empty() => url.host().to_string(),
                d => d,
            };
            batches.entry(domain).or_default().insert(url.clone());
        }
        batches
    }

    /// Appends newly discovered URLs to the domain's list file.
    pub async fn store(&self, domain: &str, urls: &BTreeSet<Url>) -> Result<()> {
        if urls.is_empty() {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.dir).await.ok();

        let path = self
            .dir
            .join(format!("{}.list", sha256_hex(domain.as_bytes())));

        let mut lines: Vec<String> = urls
            .iter()
            .map(|u| {
                u.to_string()
                    .chars()
                    .filter(|c| *c != '\r' && *c != '\n')
                    .collect::<String>()
            })
            .filter(|s| !s.is_empty())
            .collect();
        if lines.is_empty() {
            return Ok(());
        }
        lines.sort();
        lines.dedup();

        // The existing file may have been hand-edited without a trailing
        // newline; guard against welding onto its last line.
        let need_leading_newline = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.len() > 0 => {
                let mut file = tokio::fs::File::open(&path).await?;
                file.seek(std::io::SeekFrom::End(-1)).await?;
                let mut last = [0u8; 1];
                file.read_exact(&mut last).await?;
                last[0] != b'\n'
            }
            _ => false,
        };

        let mut blob = String::with_capacity(lines.len() * 64);
        if need_leading_newline {
            blob.push('\n');
        }
        for line in &lines {
            blob.push_str(line);
            blob.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("opening seed file {}", path.display()))?;
        file.write_all(blob.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
