//! Configuration loading.
//!
//! `conf.json` is discovered at `$HOME/.cache/crawler/`, `./crawler/`,
//! `/etc/crawler/`; the first existing file wins. A missing or malformed
//! file is fatal at startup; everything downstream receives a validated
//! [`Config`].

mod constants;

pub use constants::*;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error_handling::StartupError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Body/headers/JSON cache root.
    pub cache_dir: PathBuf,

    /// Seed-URL list files root.
    pub data_dir: PathBuf,

    /// Reserved for future use.
    #[serde(default)]
    pub plugins_dir: Option<PathBuf>,

    /// Per-domain extraction scripts.
    pub script_dir: PathBuf,

    /// Persisted intermediates and per-host bundles.
    pub pem_dir: PathBuf,

    /// User-agent strings, one per line.
    pub user_agent_list: PathBuf,

    /// Cache entry maximum age in seconds.
    #[serde(default = "default_cache_age_limit")]
    pub cache_age_limit_s: u64,

    /// Per-registrable-domain politeness interval in milliseconds.
    #[serde(default)]
    pub rate_limit_ms: HashMap<String, u64>,

    /// System CA bundle; well-known locations are probed when absent.
    #[serde(default)]
    pub ca_bundle: Option<PathBuf>,
}

fn default_cache_age_limit() -> u64 {
    DEFAULT_CACHE_AGE_LIMIT_S
}

impl Config {
    /// Searches the discovery directories for `conf.json` and loads the
    /// first one found.
    pub fn discover() -> Result<Self, StartupError> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Ok(home) = std::env::var("HOME") {
            candidates.push(Path::new(&home).join(".cache").join("crawler"));
        }
        candidates.push(PathBuf::from("crawler"));
        candidates.push(PathBuf::from("/etc/crawler"));

        for dir in &candidates {
            let file = dir.join("conf.json");
            if file.is_file() {
                return Self::load(&file);
            }
        }
        Err(StartupError::ConfigMissing(format!(
            "no conf.json under {}",
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    /// Loads and validates a specific configuration file.
    pub fn load(path: &Path) -> Result<Self, StartupError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StartupError::ConfigMissing(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| StartupError::ConfigMalformed(format!("{}: {e}", path.display())))
    }

    pub fn cache_age_limit(&self) -> Duration {
        Duration::from_secs(self.cache_age_limit_s)
    }

    /// Politeness interval for `domain`, falling back to the default.
    pub fn rate_limit_for(&self, domain: &str) -> Duration {
        let ms = self
            .rate_limit_ms
            .get(domain)
            .copied()
            .unwrap_or(DEFAULT_RATE_LIMIT_MS);
        Duration::from_millis(ms)
    }

    /// The base CA bundle used for strict verification and as the first
    /// section of every per-host bundle.
    pub fn system_ca_bundle(&self) -> Option<PathBuf> {
        if let Some(path) = &self.ca_bundle {
            return Some(path.clone());
        }
        SYSTEM_CA_BUNDLE_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
    }
}
