use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use domain_crawler::config::Config;
use domain_crawler::initialization::{init_crypto_provider, init_logger, verbosity_from_env};
use domain_crawler::supervisor;

/// Polite multi-domain web crawler.
#[derive(Parser, Debug)]
#[command(name = "domain_crawler", version, about)]
struct Cli {
    /// Registrable domains to restrict this run to (lowercase). With no
    /// arguments every configured batch is crawled.
    domains: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = init_logger(verbosity_from_env());
    init_crypto_provider();

    let cli = Cli::parse();
    if cli.domains.is_empty() {
        info!("crawler starting for all configured domains");
    } else {
        info!("crawling only these domains:");
        for domain in &cli.domains {
            info!("  - {domain}");
        }
    }

    let config = match Config::discover() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!("cache dir: {}", config.cache_dir.display());
    info!(" data dir: {}", config.data_dir.display());
    info!("script dir: {}", config.script_dir.display());
    info!("  pem dir: {}", config.pem_dir.display());

    match supervisor::run(config, cli.domains).await {
        Ok(0) => {
            warn!("no URL batches configured");
            ExitCode::FAILURE
        }
        Ok(batches) => {
            info!("completed {batches} batch(es)");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("startup failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
