//! domain_crawler: a polite, multi-domain web crawler.
//!
//! Seed URLs are partitioned by registrable domain; each batch is crawled
//! sequentially by a worker task running under a global permit gate and a
//! per-domain rate limiter. Responses land in a content-addressed cache
//! keyed by the URL digest, per-domain sandboxed scripts extract titles,
//! links, telephone numbers, and client-side redirects, and newly
//! discovered same-domain URLs feed the next run's seed lists. When a
//! peer fails certificate verification, the trust engine chases the
//! leaf's AIA issuer URLs and retries with a per-host CA bundle.
//!
//! # Example
//!
//! ```no_run
//! use domain_crawler::{config::Config, supervisor};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::discover()?;
//! let batches = supervisor::run(config, vec!["example.com".into()]).await?;
//! println!("crawled {batches} batch(es)");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cert_trust;
pub mod config;
pub mod crawler;
pub mod error_handling;
pub mod initialization;
pub mod response;
pub mod script;
pub mod seeds;
pub mod supervisor;
pub mod url;
pub mod user_agent;

pub use cache::CacheManager;
pub use cert_trust::CertTrust;
pub use config::Config;
pub use crawler::DomainCrawler;
pub use error_handling::{ErrorKind, ProcessingStats, StartupError};
pub use response::HttpResponse;
pub use script::{ClientRedirect, RedirectKind, ScriptHost};
pub use seeds::UrlSeedStore;
pub use url::Url;
pub use user_agent::UserAgentPool;
