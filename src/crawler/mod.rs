//! The per-domain crawl pipeline.
//!
//! A worker owns one registrable domain and walks its URL batch strictly
//! in order: cache check, politeness dwell, fetch (with the recovery
//! ladder), cache write, script dispatch, seed expansion, and
//! client-redirect following. Server retries and client-redirect hops are
//! budgeted separately.

mod fetch;

pub use fetch::{classify_error, fetch_once, FetchFailure};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cache::CacheManager;
use crate::cert_trust::{host_from_url, CertTrust};
use crate::config::{
    CLIENT_REDIRECT_DELAY_CAP, MAX_CLIENT_REDIRECT_HOPS, SERVER_RETRY_ATTEMPTS,
};
use crate::error_handling::{ErrorKind, ProcessingStats};
use crate::initialization::{init_augmented_client, init_fetch_client, init_http1_client};
use crate::response::HttpResponse;
use crate::script::{ClientRedirect, ScriptHost};
use crate::seeds::UrlSeedStore;
use crate::url::Url;
use crate::user_agent::UserAgentPool;

/// Monotonic politeness gate: each slot reservation pushes `next_allowed`
/// forward by the interval, so two network fetches in the same worker are
/// always at least one interval apart.
pub struct RateGate {
    interval: Duration,
    next_allowed: tokio::time::Instant,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_allowed: tokio::time::Instant::now(),
        }
    }

    /// Sleeps until the next slot and reserves the one after it. The
    /// `max` keeps slots from bunching when the worker fell behind.
    pub async fn wait(&mut self) {
        if self.interval.is_zero() {
            return;
        }
        let now = tokio::time::Instant::now();
        if now < self.next_allowed {
            tokio::time::sleep_until(self.next_allowed).await;
        }
        let now = tokio::time::Instant::now();
        self.next_allowed = now.max(self.next_allowed) + self.interval;
    }
}

pub struct DomainCrawler {
    domain: String,
    urls: BTreeSet<Url>,
    gate: RateGate,
    agents: Arc<UserAgentPool>,
    cache: Arc<CacheManager>,
    seeds: Arc<UrlSeedStore>,
    script: ScriptHost,
    cert: CertTrust,
    client: reqwest::Client,
    client_h1: reqwest::Client,
    /// Hosts whose trust store has been augmented get their own client.
    augmented: HashMap<String, reqwest::Client>,
    stats: Arc<ProcessingStats>,
}

impl DomainCrawler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        domain: String,
        urls: BTreeSet<Url>,
        rate_limit: Duration,
        agents: Arc<UserAgentPool>,
        cache: Arc<CacheManager>,
        seeds: Arc<UrlSeedStore>,
        script: ScriptHost,
        cert: CertTrust,
        stats: Arc<ProcessingStats>,
    ) -> Result<Self> {
        Ok(Self {
            domain,
            urls,
            gate: RateGate::new(rate_limit),
            agents,
            cache,
            seeds,
            script,
            cert,
            client: init_fetch_client().context("building fetch client")?,
            client_h1: init_http1_client().context("building HTTP/1.1 client")?,
            augmented: HashMap::new(),
            stats,
        })
    }

    /// Crawls the whole batch. Failures are logged and never escape.
    pub async fn crawl(&mut self) {
        let batch: Vec<Url> = self.urls.iter().cloned().collect();
        for url in batch {
            log::debug!("[{}] visiting {url} ({})", self.domain, url.digest());
            self.process_url(url).await;
        }
    }

    /// Runs one starting URL through the pipeline, following client
    /// redirects up to the hop budget.
    async fn process_url(&mut self, start: Url) {
        let mut current = start;
        let mut hops = 0usize;

        loop {
            let content = match self.cache.fetch(&current).await {
                Some(body) => {
                    log::debug!("[{}] cache hit for {current}", self.domain);
                    body
                }
                None => {
                    let Some(response) = self.fetch_with_recovery(&current).await else {
                        break;
                    };
                    if !response.is_okay() {
                        log::debug!(
                            "[{}] {current}: HTTP {} after {} redirect(s)",
                            self.domain,
                            response.status_code(),
                            response.redirect_count()
                        );
                        break;
                    }
                    if let Err(e) = self.cache.store_response(&current, &response).await {
                        self.stats.increment(ErrorKind::CacheIoError);
                        log::warn!("[{}] cache write failed for {current}: {e}", self.domain);
                    }
                    response.into_body()
                }
            };

            let Some(result) = self.script.process(&current, &content).await else {
                break;
            };
            if let Err(e) = self.cache.store_json(&current, &result, "json").await {
                self.stats.increment(ErrorKind::CacheIoError);
                log::warn!("[{}] result write failed for {current}: {e}", self.domain);
            }

            self.expand_seeds(&current, &result).await;

            match ClientRedirect::from_result(&result) {
                Some(redirect) if hops < MAX_CLIENT_REDIRECT_HOPS => {
                    let next = match &redirect.base_href {
                        Some(base) => Url::parse(base).resolve(&redirect.url),
                        None => current.resolve(&redirect.url),
                    };
                    if !next.is_valid() {
                        self.stats.increment(ErrorKind::UrlInvalid);
                        log::warn!(
                            "[{}] unresolvable client redirect from {current}: {}",
                            self.domain,
                            redirect.url
                        );
                        break;
                    }
                    let delay =
                        Duration::from_secs(redirect.delay_seconds).min(CLIENT_REDIRECT_DELAY_CAP);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    log::debug!("[{}] client redirect {current} -> {next}", self.domain);
                    current = next;
                    hops += 1;
                }
                Some(_) => {
                    log::warn!(
                        "[{}] client redirect chain from {current} exceeds {} hops",
                        self.domain,
                        MAX_CLIENT_REDIRECT_HOPS
                    );
                    break;
                }
                None => break,
            }
        }
    }

    /// Fetches with the retry and recovery ladder: up to
    /// `SERVER_RETRY_ATTEMPTS` polite attempts; HTTP/2 trouble earns one
    /// HTTP/1.1 retry inside the attempt, a verification failure earns
    /// one strict retry after trust augmentation.
    async fn fetch_with_recovery(&mut self, url: &Url) -> Option<HttpResponse> {
        let host = host_from_url(&url.to_string());

        for attempt in 1..=SERVER_RETRY_ATTEMPTS {
            self.gate.wait().await;
            let client = self
                .augmented
                .get(&host)
                .unwrap_or(&self.client)
                .clone();

            let error = match fetch_once(&client, url, self.agents.pick()).await {
                Ok(response) => return Some(response),
                Err(e) => e,
            };

            match classify_error(&error) {
                FetchFailure::Http2OrTruncation => {
                    self.stats.increment(ErrorKind::FetchHttp2Truncation);
                    log::debug!("[{}] {url}: {error}; retrying on HTTP/1.1", self.domain);
                    self.gate.wait().await;
                    match fetch_once(&self.client_h1, url, self.agents.pick()).await {
                        Ok(response) => return Some(response),
                        Err(e) => {
                            log::warn!(
                                "[{}] {url}: HTTP/1.1 retry failed (attempt {attempt}): {e}",
                                self.domain
                            );
                        }
                    }
                }
                FetchFailure::TlsVerification => {
                    self.stats.increment(ErrorKind::FetchTlsVerification);
                    log::debug!("[{}] {url}: {error}; augmenting trust", self.domain);
                    let Some(bundle) = self.cert.augment(url).await else {
                        log::warn!("[{}] {url}: no trust augmentation available", self.domain);
                        return None;
                    };
                    match init_augmented_client(&bundle) {
                        Ok(augmented) => {
                            self.augmented.insert(host.clone(), augmented.clone());
                            self.gate.wait().await;
                            match fetch_once(&augmented, url, self.agents.pick()).await {
                                Ok(response) => return Some(response),
                                Err(e) => {
                                    log::warn!(
                                        "[{}] {url}: retry with augmented trust failed: {e}",
                                        self.domain
                                    );
                                    return None;
                                }
                            }
                        }
                        Err(e) => {
                            log::warn!("[{}] building augmented client: {e}", self.domain);
                            return None;
                        }
                    }
                }
                FetchFailure::Transport => {
                    self.stats.increment(ErrorKind::FetchTransportError);
                    log::warn!(
                        "[{}] {url}: attempt {attempt}/{SERVER_RETRY_ATTEMPTS} failed: {error}",
                        self.domain
                    );
                }
            }
        }
        None
    }

    /// Resolves every `urls` entry against the current page, keeps the
    /// same-domain ones, and appends them to the seed store.
    async fn expand_seeds(&self, current: &Url, result: &serde_json::Value) {
        let Some(found) = result.get("urls").and_then(|v| v.as_array()) else {
            return;
        };
        let mut fresh: BTreeSet<Url> = BTreeSet::new();
        for value in found {
            let Some(raw) = value.as_str() else { continue };
            let resolved = current.resolve(raw);
            if !resolved.is_valid() {
                continue;
            }
            let domain = match resolved.registrable_domain() {
                d if d.is_empty() => resolved.host().to_string(),
                d => d,
            };
            if domain == self.domain {
                fresh.insert(resolved);
            }
        }
        if fresh.is_empty() {
            return;
        }
        let count = fresh.len();
        match self.seeds.store(&self.domain, &fresh).await {
            Ok(()) => log::debug!("[{}] stored {count} discovered URL(s)", self.domain),
            Err(e) => {
                self.stats.increment(ErrorKind::SeedIoError);
                log::warn!("[{}] seed append failed: {e}", self.domain);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_gate_enforces_interval() {
        let interval = Duration::from_millis(60);
        let mut gate = RateGate::new(interval);

        gate.wait().await; // first slot is immediate
        let before = tokio::time::Instant::now();
        gate.wait().await;
        let gap = before.elapsed();
        assert!(
            gap >= interval - Duration::from_millis(5),
            "second slot came {gap:?} after the first, expected >= {interval:?}"
        );
    }

    #[tokio::test]
    async fn zero_interval_disables_the_gate() {
        let mut gate = RateGate::new(Duration::ZERO);
        let before = tokio::time::Instant::now();
        for _ in 0..100 {
            gate.wait().await;
        }
        assert!(before.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn rate_gate_does_not_bunch_after_idle() {
        let interval = Duration::from_millis(40);
        let mut gate = RateGate::new(interval);
        gate.wait().await;
        // fall far behind schedule
        tokio::time::sleep(Duration::from_millis(120)).await;
        gate.wait().await; // immediate (slot long since free)
        let before = tokio::time::Instant::now();
        gate.wait().await; // must still honor a full interval
        assert!(before.elapsed() >= interval - Duration::from_millis(5));
    }
}
