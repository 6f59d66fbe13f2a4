//! Error taxonomy and per-run statistics.
//!
//! Startup problems (configuration, user-agent list) are fatal and carry
//! typed errors. Everything that happens inside a worker is counted here
//! and logged, never propagated: a failing URL ends that URL, a failing
//! domain ends that worker, and the run keeps going.

use std::sync::atomic::{AtomicUsize, Ordering};

use strum::IntoEnumIterator;
use strum_macros::EnumIter;
use thiserror::Error;

/// Fatal startup errors.
#[derive(Error, Debug)]
pub enum StartupError {
    /// No conf.json found in any of the discovery directories.
    #[error("configuration not found: {0}")]
    ConfigMissing(String),

    /// conf.json exists but does not parse or misses required keys.
    #[error("configuration malformed: {0}")]
    ConfigMalformed(String),

    /// The user-agent list file is missing or contains no usable entries.
    #[error("user-agent list unusable: {0}")]
    UserAgentList(String),
}

/// Non-fatal conditions counted during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum ErrorKind {
    UrlInvalid,
    ScriptMissing,
    ScriptError,
    ScriptReturnedNonTable,
    ScriptNoResults,
    FetchTransportError,
    FetchTlsVerification,
    FetchHttp2Truncation,
    AiaDiscoveryEmpty,
    AiaFetchFailed,
    AiaPemUnparseable,
    CacheIoError,
    SeedIoError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::UrlInvalid => "invalid URL",
            ErrorKind::ScriptMissing => "no extraction script",
            ErrorKind::ScriptError => "script raised an error",
            ErrorKind::ScriptReturnedNonTable => "script returned a non-object",
            ErrorKind::ScriptNoResults => "script returned nothing",
            ErrorKind::FetchTransportError => "transport error",
            ErrorKind::FetchTlsVerification => "TLS verification failure",
            ErrorKind::FetchHttp2Truncation => "HTTP/2 stream error or truncation",
            ErrorKind::AiaDiscoveryEmpty => "AIA discovery empty",
            ErrorKind::AiaFetchFailed => "AIA issuer fetch failed",
            ErrorKind::AiaPemUnparseable => "AIA issuer not normalizable",
            ErrorKind::CacheIoError => "cache IO error",
            ErrorKind::SeedIoError => "seed store IO error",
        }
    }
}

/// Lock-free error counters shared across workers.
#[derive(Default)]
pub struct ProcessingStats {
    counters: [AtomicUsize; 13],
}

impl ProcessingStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(kind: ErrorKind) -> usize {
        ErrorKind::iter()
            .position(|k| k == kind)
            .unwrap_or_default()
    }

    pub fn increment(&self, kind: ErrorKind) {
        self.counters[Self::index(kind)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.counters[Self::index(kind)].load(Ordering::Relaxed)
    }

    /// Logs every nonzero counter; silent when the run was clean.
    pub fn log_summary(&self) {
        let mut any = false;
        for kind in ErrorKind::iter() {
            let n = self.count(kind);
            if n > 0 {
                if !any {
                    log::info!("error counts:");
                    any = true;
                }
                log::info!("  {}: {n}", kind.as_str());
            }
        }
        if !any {
            log::debug!("no errors recorded");
        }
    }
}
