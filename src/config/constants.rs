//! Operational constants: timeouts, retry bounds, cache TTLs.

use std::time::Duration;

/// Politeness interval applied when a domain has no entry in the
/// `rate_limit_ms` configuration map.
pub const DEFAULT_RATE_LIMIT_MS: u64 = 500;

/// Cache entries older than this are refetched.
pub const DEFAULT_CACHE_AGE_LIMIT_S: u64 = 86_400;

/// Network attempts per URL (initial try included).
pub const SERVER_RETRY_ATTEMPTS: usize = 3;

/// Script-driven redirect hops followed per starting URL. Kept separate
/// from the retry budget so a redirect chain never eats into retries.
pub const MAX_CLIENT_REDIRECT_HOPS: usize = 5;

/// Server-side (3xx) redirect hops followed within a single fetch.
pub const MAX_SERVER_REDIRECT_HOPS: usize = 10;

/// TCP connect timeout for page fetches.
pub const FETCH_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Whole-request deadline for page fetches.
pub const FETCH_TOTAL_TIMEOUT: Duration = Duration::from_secs(45);

/// Stall watchdog: a read making no progress for this long fails the
/// transfer (stands in for a 1 B/s low-speed limit).
pub const FETCH_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound honored for a client redirect's declared delay.
pub const CLIENT_REDIRECT_DELAY_CAP: Duration = Duration::from_secs(60);

/// Positive AIA cache lifetime.
pub const AIA_POSITIVE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Negative (empty-result) AIA cache lifetime.
pub const AIA_NEGATIVE_TTL: Duration = Duration::from_secs(10 * 60);

/// Both AIA indices are cleared when they grow past this many entries.
pub const AIA_CACHE_CAP: usize = 4096;

/// Connect timeout for the leaf-capture probe.
pub const AIA_PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(4);

/// Handshake-plus-exchange deadline for the leaf-capture probe.
pub const AIA_PROBE_TOTAL_TIMEOUT: Duration = Duration::from_secs(8);

/// Connect timeout for issuer-certificate downloads.
pub const ISSUER_FETCH_CONNECT_TIMEOUT: Duration = Duration::from_secs(4);

/// Whole-request deadline for issuer-certificate downloads.
pub const ISSUER_FETCH_TOTAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept header offered when downloading issuer certificates.
pub const ISSUER_FETCH_ACCEPT: &str = "application/pkix-cert, application/pkcs7-mime, \
     application/x-pkcs7-certificates, application/x-x509-ca-cert;q=0.9, */*;q=0.5";

/// Supervisor completion-poll interval.
pub const SUPERVISOR_TICK: Duration = Duration::from_millis(250);

/// Memory ceiling for a script-host runtime.
pub const SCRIPT_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// Well-known system CA bundle locations, probed in order when the
/// configuration does not name one.
pub const SYSTEM_CA_BUNDLE_PATHS: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt",
    "/etc/pki/tls/certs/ca-bundle.crt",
    "/etc/ssl/ca-bundle.pem",
];
