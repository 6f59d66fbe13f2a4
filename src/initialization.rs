//! Process-wide initialization: logger, TLS crypto provider, permit gate,
//! and HTTP client construction.

use std::io::Write;
use std::sync::Arc;

use colored::Colorize;
use log::LevelFilter;
use rustls::crypto::{ring::default_provider, CryptoProvider};
use tokio::sync::Semaphore;

use crate::config::{FETCH_CONNECT_TIMEOUT, FETCH_READ_TIMEOUT, FETCH_TOTAL_TIMEOUT};

/// Maps the `DEBUG` environment variable (1..4) onto a level filter:
/// 1=debug, 2=info, 3=warn, 4=error. Unset or unrecognized means info.
pub fn verbosity_from_env() -> LevelFilter {
    match std::env::var("DEBUG").ok().as_deref() {
        Some("1") => LevelFilter::Debug,
        Some("2") => LevelFilter::Info,
        Some("3") => LevelFilter::Warn,
        Some("4") => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// True when debug-level logging is active; mirrored into the script
/// sandbox as the `DEBUG` global.
pub fn debug_enabled() -> bool {
    log::max_level() >= LevelFilter::Debug
}

/// Initializes the logger. `RUST_LOG` is honored as a baseline and the
/// `DEBUG`-derived level takes precedence; chatty dependency modules are
/// pinned at info.
pub fn init_logger(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    builder.filter_module("reqwest", LevelFilter::Info);
    builder.filter_module("hyper", LevelFilter::Info);
    builder.filter_module("rustls", LevelFilter::Info);

    builder.format(|buf, record| {
        let level = record.level();
        let colored_level = match level {
            log::Level::Error => level.to_string().red(),
            log::Level::Warn => level.to_string().yellow(),
            log::Level::Info => level.to_string().green(),
            log::Level::Debug => level.to_string().blue(),
            log::Level::Trace => level.to_string().purple(),
        };
        writeln!(
            buf,
            "{} [{}] {}",
            record.target().cyan(),
            colored_level,
            record.args()
        )
    });

    builder.try_init()
}

/// Installs the ring crypto provider for rustls. Safe to call more than
/// once; reinstalling is a no-op.
pub fn init_crypto_provider() {
    let _ = CryptoProvider::install_default(default_provider());
}

/// The global permit gate limiting concurrent domain workers.
pub fn init_semaphore(count: usize) -> Arc<Semaphore> {
    Arc::new(Semaphore::new(count.max(1)))
}

fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::ClientBuilder::new()
        // redirects are followed manually so the hop count and effective
        // URL are known exactly
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(FETCH_CONNECT_TIMEOUT)
        .timeout(FETCH_TOTAL_TIMEOUT)
        .read_timeout(FETCH_READ_TIMEOUT)
        .gzip(true)
        .brotli(true)
        .tcp_keepalive(std::time::Duration::from_secs(30))
        .use_rustls_tls()
}

/// The default fetch client: HTTP/2 when offered, strict verification
/// against the system trust store.
pub fn init_fetch_client() -> Result<reqwest::Client, reqwest::Error> {
    base_client_builder().build()
}

/// Fallback client used after HTTP/2 stream errors or truncated bodies.
pub fn init_http1_client() -> Result<reqwest::Client, reqwest::Error> {
    base_client_builder().http1_only().build()
}

/// A client whose trust store is extended with every certificate in
/// `bundle_pem` (the per-host bundle assembled by trust augmentation).
/// Verification stays strict.
pub fn init_augmented_client(bundle_pem: &[u8]) -> anyhow::Result<reqwest::Client> {
    let mut builder = base_client_builder();
    for block in split_pem_blocks(bundle_pem) {
        match reqwest::Certificate::from_pem(block.as_bytes()) {
            Ok(cert) => builder = builder.add_root_certificate(cert),
            Err(e) => log::debug!("skipping unparseable bundle block: {e}"),
        }
    }
    Ok(builder.build()?)
}

/// Splits a concatenated PEM bundle into individual certificate blocks.
pub fn split_pem_blocks(bundle: &[u8]) -> Vec<String> {
    const BEGIN: &str = "-----BEGIN CERTIFICATE-----";
    const END: &str = "-----END CERTIFICATE-----";
    let text = String::from_utf8_lossy(bundle);
    let mut blocks = Vec::new();
    let mut rest = text.as_ref();
    while let Some(start) = rest.find(BEGIN) {
        let Some(end) = rest[start..].find(END) else {
            break;
        };
        let block = &rest[start..start + end + END.len()];
        blocks.push(format!("{block}\n"));
        rest = &rest[start + end + END.len()..];
    }
    blocks
}

/// `max(1, hardware thread count)`, the worker permit capacity.
pub fn worker_permits() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
