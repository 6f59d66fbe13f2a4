//! Batch supervision: one worker task per registrable domain under a
//! global permit gate, with a diagnostic wait loop.
//!
//! Workers never propagate errors: a failing domain is logged and its
//! permit released; the run continues until every batch has finished.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use crate::cache::CacheManager;
use crate::cert_trust::CertTrust;
use crate::config::{Config, SUPERVISOR_TICK};
use crate::crawler::DomainCrawler;
use crate::error_handling::{ErrorKind, ProcessingStats};
use crate::initialization::{init_semaphore, worker_permits};
use crate::script::ScriptHost;
use crate::seeds::UrlSeedStore;
use crate::user_agent::UserAgentPool;

/// Runs every configured batch (optionally restricted to `allowlist`
/// registrable domains) and returns the number of batches crawled.
/// Zero means nothing matched; the caller turns that into exit code 1.
pub async fn run(config: Config, allowlist: Vec<String>) -> Result<usize> {
    let stats = Arc::new(ProcessingStats::new());
    let agents = Arc::new(UserAgentPool::load(&config.user_agent_list)?);
    let cache = Arc::new(CacheManager::new(
        config.cache_dir.clone(),
        config.cache_age_limit(),
    ));
    let seeds = Arc::new(
        UrlSeedStore::load(&config.data_dir)
            .await
            .context("loading seed store")?,
    );

    let batches = plan_batches(&seeds, &allowlist);
    let batch_count = batches.len();
    if batch_count == 0 {
        return Ok(0);
    }

    let permits = worker_permits();
    log::info!("crawling {batch_count} domain batch(es), {permits} at a time");
    let semaphore = init_semaphore(permits);

    let mut handles: Vec<(String, JoinHandle<()>)> = Vec::with_capacity(batch_count);
    for (domain, batch) in batches {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break, // semaphore closed; cannot happen in practice
        };

        let config = config.clone();
        let agents = Arc::clone(&agents);
        let cache = Arc::clone(&cache);
        let seeds = Arc::clone(&seeds);
        let stats = Arc::clone(&stats);

        let worker_domain = domain.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            log::info!("crawler starting: {worker_domain}");

            let script_dir = config.script_dir.clone();
            let script_domain = worker_domain.clone();
            let script_stats = Arc::clone(&stats);
            let script = match tokio::task::spawn_blocking(move || {
                ScriptHost::load(&script_dir, &script_domain, script_stats)
            })
            .await
            {
                Ok(host) => host,
                Err(e) => {
                    log::error!("script load for {worker_domain} panicked: {e}");
                    return;
                }
            };
            if !script.has_script() {
                stats.increment(ErrorKind::ScriptMissing);
                log::warn!("no extraction script for {worker_domain}");
                return;
            }

            let cert = match CertTrust::new(
                config.pem_dir.clone(),
                config.system_ca_bundle(),
                Arc::clone(&stats),
            ) {
                Ok(cert) => cert,
                Err(e) => {
                    log::error!("trust engine for {worker_domain} failed to start: {e}");
                    return;
                }
            };

            let rate_limit = config.rate_limit_for(&worker_domain);
            let mut crawler = match DomainCrawler::new(
                worker_domain.clone(),
                batch,
                rate_limit,
                agents,
                cache,
                seeds,
                script,
                cert,
                stats,
            ) {
                Ok(crawler) => crawler,
                Err(e) => {
                    log::error!("crawler for {worker_domain} failed to start: {e}");
                    return;
                }
            };

            crawler.crawl().await;
            log::info!("crawler finished: {worker_domain}");
        });
        handles.push((domain, handle));
    }

    wait_for_workers(handles).await;
    stats.log_summary();
    Ok(batch_count)
}

/// Polls worker handles on a fixed tick, surfacing panics and logging
/// the still-running set when a while passes with no progress.
async fn wait_for_workers(mut handles: Vec<(String, JoinHandle<()>)>) {
    let mut quiet_ticks = 0u32;
    while !handles.is_empty() {
        tokio::time::sleep(SUPERVISOR_TICK).await;

        let mut progressed = false;
        let mut still_running = Vec::with_capacity(handles.len());
        for (domain, handle) in handles {
            if handle.is_finished() {
                progressed = true;
                if let Err(e) = handle.await {
                    log::error!("crawler for {domain} panicked: {e}");
                }
            } else {
                still_running.push((domain, handle));
            }
        }
        handles = still_running;

        if progressed {
            quiet_ticks = 0;
        } else {
            quiet_ticks += 1;
            // every ~5s of silence, say what we're waiting on
            if quiet_ticks % 20 == 0 {
                log::info!("waiting on {} domain(s):", handles.len());
                for (domain, _) in &handles {
                    log::info!("  - {domain}");
                }
            }
        }
    }
}

/// Partitions and filters without running anything; used to answer "what
/// would this invocation crawl".
pub fn plan_batches(
    seeds: &UrlSeedStore,
    allowlist: &[String],
) -> BTreeMap<String, std::collections::BTreeSet<crate::url::Url>> {
    let allow: Vec<String> = allowlist.iter().map(|d| d.to_lowercase()).collect();
    let mut batches = seeds.batches_by_domain();
    if !allow.is_empty() {
        batches.retain(|domain, _| allow.iter().any(|a| a == domain));
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plan_respects_allowlist_case_insensitively() {
        let tmp = tempfile::tempdir().unwrap();
        tokio::fs::write(
            tmp.path().join("seeds.list"),
            "https://a.example.com/x\nhttps://example.org/y\n",
        )
        .await
        .unwrap();
        let seeds = UrlSeedStore::load(tmp.path()).await.unwrap();

        let all = plan_batches(&seeds, &[]);
        assert_eq!(all.len(), 2);

        let filtered = plan_batches(&seeds, &["EXAMPLE.COM".to_string()]);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("example.com"));

        let none = plan_batches(&seeds, &["unrelated.net".to_string()]);
        assert!(none.is_empty());
    }
}
