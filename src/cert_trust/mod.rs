//! TLS trust augmentation.
//!
//! When a fetch fails local-issuer verification, the issuer is hunted
//! down through the leaf certificate's Authority Information Access
//! extension: probe the peer for its leaf, collect the CA-Issuers URLs,
//! download and normalize each candidate, persist the new intermediates,
//! and assemble a per-host bundle (system base + persisted issuers) that
//! the caller applies to a fresh strictly-verifying client.
//!
//! All caches are per-instance: each domain worker owns its own
//! `CertTrust`, so no locking is needed. The pem directory may be shared
//! across workers since file names stay distinct per `<host>__<issuer>` and
//! bundle assembly is idempotent.

mod pem;
mod pkcs7;
mod probe;

pub use pem::{aia_ca_issuer_urls, ensure_pem, issuer_common_name, pem_encode_certificate};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::config::{
    AIA_CACHE_CAP, AIA_NEGATIVE_TTL, AIA_POSITIVE_TTL, ISSUER_FETCH_ACCEPT,
    ISSUER_FETCH_CONNECT_TIMEOUT, ISSUER_FETCH_TOTAL_TIMEOUT,
};
use crate::error_handling::{ErrorKind, ProcessingStats};
use crate::url::{sha256_hex, Url};

#[derive(Debug, Clone)]
struct AiaCacheEntry {
    urls: Vec<String>,
    negative: bool,
    expires: Instant,
}

pub struct CertTrust {
    pem_dir: PathBuf,
    base_ca_path: Option<PathBuf>,
    http: reqwest::Client,
    aia_by_host: HashMap<String, AiaCacheEntry>,
    aia_by_fingerprint: HashMap<String, AiaCacheEntry>,
    /// issuer CN → PEM, deduplicating downloads within this instance.
    issuer_pem_cache: HashMap<String, String>,
    bundle_path_by_host: HashMap<String, PathBuf>,
    stats: Arc<ProcessingStats>,
}

/// Host (scheme- and port-stripped) of a URL string.
pub fn host_from_url(url: &str) -> String {
    let rest = match url.find("://") {
        Some(pos) => &url[pos + 3..],
        None => url,
    };
    let hostport = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    if hostport.starts_with('[') {
        // keep bracketed IPv6 literals intact
        match hostport.find(']') {
            Some(end) => hostport[..=end].to_string(),
            None => hostport.to_string(),
        }
    } else {
        hostport
            .split(':')
            .next()
            .unwrap_or(hostport)
            .to_string()
    }
}

/// Keeps `[A-Za-z0-9._-]`, replacing everything else with `_`.
pub fn sanitize_for_filename(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl CertTrust {
    pub fn new(
        pem_dir: impl Into<PathBuf>,
        base_ca_path: Option<PathBuf>,
        stats: Arc<ProcessingStats>,
    ) -> Result<Self> {
        let http = reqwest::ClientBuilder::new()
            .connect_timeout(ISSUER_FETCH_CONNECT_TIMEOUT)
            .timeout(ISSUER_FETCH_TOTAL_TIMEOUT)
            .use_rustls_tls()
            .build()
            .context("building issuer-fetch client")?;
        Ok(Self {
            pem_dir: pem_dir.into(),
            base_ca_path,
            http,
            aia_by_host: HashMap::new(),
            aia_by_fingerprint: HashMap::new(),
            issuer_pem_cache: HashMap::new(),
            bundle_path_by_host: HashMap::new(),
            stats,
        })
    }

    /// CA-Issuers URLs for the peer's leaf certificate, served from cache
    /// while the entry's TTL holds. An empty result may itself be cached
    /// (negative entry).
    pub async fn extract_aia_urls(&mut self, url: &Url) -> Vec<String> {
        let host = host_from_url(&url.to_string());
        let now = Instant::now();

        if let Some(entry) = self.aia_by_host.get(&host) {
            if entry.expires > now {
                return entry.urls.clone();
            }
        }

        let leaf = match probe::fetch_leaf_certificate(url).await {
            Ok(der) => der,
            Err(e) => {
                log::debug!("leaf probe failed for {host}: {e}");
                return Vec::new();
            }
        };

        let fingerprint = sha256_hex(&leaf);
        if let Some(entry) = self.aia_by_fingerprint.get(&fingerprint) {
            if entry.expires > now {
                let entry = entry.clone();
                self.aia_by_host.insert(host, entry.clone());
                return entry.urls;
            }
        }

        let urls = pem::aia_ca_issuer_urls(&leaf);
        self.insert_aia_cache(&host, &fingerprint, urls.clone());
        urls
    }

    fn insert_aia_cache(&mut self, host: &str, fingerprint: &str, urls: Vec<String>) {
        let negative = urls.is_empty();
        let entry = AiaCacheEntry {
            urls,
            negative,
            expires: Instant::now()
                + if negative {
                    AIA_NEGATIVE_TTL
                } else {
                    AIA_POSITIVE_TTL
                },
        };
        if !fingerprint.is_empty() {
            self.aia_by_fingerprint
                .insert(fingerprint.to_string(), entry.clone());
        }
        self.aia_by_host.insert(host.to_string(), entry);

        // crude size caps
        if self.aia_by_fingerprint.len() > AIA_CACHE_CAP {
            self.aia_by_fingerprint.clear();
        }
        if self.aia_by_host.len() > AIA_CACHE_CAP {
            self.aia_by_host.clear();
        }
    }

    /// Whether the freshest cache entry for `host` is negative.
    pub fn has_negative_entry(&self, host: &str) -> bool {
        self.aia_by_host
            .get(host)
            .map(|e| e.negative && e.expires > Instant::now())
            .unwrap_or(false)
    }

    /// Full augmentation: discover issuer URLs for `url`, fetch and apply
    /// them. Returns the per-host bundle bytes on success.
    pub async fn augment(&mut self, url: &Url) -> Option<Vec<u8>> {
        let aia = self.extract_aia_urls(url).await;
        if aia.is_empty() {
            self.stats.increment(ErrorKind::AiaDiscoveryEmpty);
            return None;
        }
        let host = host_from_url(&url.to_string());
        self.augment_with_issuers(&host, &aia).await
    }

    /// Fetches the given issuer URLs, persists what normalizes, and
    /// rebuilds the host bundle. Partial success is success.
    pub async fn augment_with_issuers(&mut self, host: &str, issuer_urls: &[String]) -> Option<Vec<u8>> {
        let mut fetched_new = false;

        for issuer_url in issuer_urls {
            if issuer_url.starts_with("ldap://") {
                log::debug!("skipping LDAP issuer URL {issuer_url}");
                continue;
            }
            if !issuer_url.starts_with("http://") && !issuer_url.starts_with("https://") {
                continue;
            }

            let raw = match self.fetch_issuer(issuer_url).await {
                Some(bytes) => bytes,
                None => {
                    self.stats.increment(ErrorKind::AiaFetchFailed);
                    continue;
                }
            };

            let Some(pem_text) = pem::ensure_pem(&raw) else {
                self.stats.increment(ErrorKind::AiaPemUnparseable);
                log::debug!("issuer payload from {issuer_url} did not normalize to PEM");
                continue;
            };

            let Some(issuer_cn) = pem::issuer_common_name(&pem_text) else {
                self.stats.increment(ErrorKind::AiaPemUnparseable);
                continue;
            };

            if self.issuer_pem_cache.contains_key(&issuer_cn) {
                continue;
            }
            self.issuer_pem_cache
                .insert(issuer_cn.clone(), pem_text.clone());
            self.persist_pem(host, &issuer_cn, &pem_text).await;
            fetched_new = true;
        }

        if !fetched_new {
            return None;
        }

        let bundle_path = self.rebuild_host_bundle(host).await?;
        match tokio::fs::read(&bundle_path).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::warn!("reading bundle {}: {e}", bundle_path.display());
                None
            }
        }
    }

    async fn fetch_issuer(&self, issuer_url: &str) -> Option<Vec<u8>> {
        let response = self
            .http
            .get(issuer_url)
            .header(reqwest::header::ACCEPT, ISSUER_FETCH_ACCEPT)
            .send()
            .await
            .map_err(|e| log::debug!("issuer fetch {issuer_url} failed: {e}"))
            .ok()?;
        if !response.status().is_success() {
            log::debug!("issuer fetch {issuer_url}: HTTP {}", response.status());
            return None;
        }
        response.bytes().await.ok().map(|b| b.to_vec())
    }

    async fn persist_pem(&self, host: &str, issuer_cn: &str, pem_text: &str) {
        if tokio::fs::create_dir_all(&self.pem_dir).await.is_err() {
            return;
        }
        let name = format!(
            "{}__{}.pem",
            sanitize_for_filename(host),
            sanitize_for_filename(issuer_cn)
        );
        let path = self.pem_dir.join(name);
        if let Err(e) = tokio::fs::write(&path, pem_text).await {
            log::warn!("persisting issuer PEM {}: {e}", path.display());
        }
    }

    /// Concatenates the system base bundle with every persisted
    /// `<host>__*.pem` into `<pem_dir>/bundles/<host>.bundle.pem`. Each
    /// block ends in a newline. Returns the bundle path.
    pub async fn rebuild_host_bundle(&mut self, host: &str) -> Option<PathBuf> {
        let base = self.base_ca_path.as_ref()?;
        let mut combined = match tokio::fs::read_to_string(base).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("reading base CA bundle {}: {e}", base.display());
                return None;
            }
        };
        if !combined.ends_with('\n') {
            combined.push('\n');
        }

        let prefix = format!("{}__", sanitize_for_filename(host));
        let mut names = Vec::new();
        if let Ok(mut entries) = tokio::fs::read_dir(&self.pem_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with(&prefix) && name.ends_with(".pem") {
                    names.push(entry.path());
                }
            }
        }
        names.sort();
        for path in names {
            // tolerate files mid-write by a sibling worker
            match tokio::fs::read_to_string(&path).await {
                Ok(pem_text) => {
                    combined.push_str(&pem_text);
                    if !combined.ends_with('\n') {
                        combined.push('\n');
                    }
                }
                Err(e) => log::debug!("skipping issuer PEM {}: {e}", path.display()),
            }
        }

        let bundle_dir = self.pem_dir.join("bundles");
        if let Err(e) = tokio::fs::create_dir_all(&bundle_dir).await {
            log::warn!("creating bundle directory {}: {e}", bundle_dir.display());
            return None;
        }
        let bundle_path = bundle_dir.join(format!("{host}.bundle.pem"));
        if let Err(e) = tokio::fs::write(&bundle_path, &combined).await {
            log::warn!("writing bundle {}: {e}", bundle_path.display());
            return None;
        }
        self.bundle_path_by_host
            .insert(host.to_string(), bundle_path.clone());
        Some(bundle_path)
    }

    /// The last bundle assembled for `host`, when one exists.
    pub fn bundle_path(&self, host: &str) -> Option<&PathBuf> {
        self.bundle_path_by_host.get(host)
    }
}
