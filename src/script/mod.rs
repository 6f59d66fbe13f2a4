//! Sandboxed per-domain extraction scripts.
//!
//! Each registrable domain may ship `<script_dir>/<domain>/init.js`
//! defining a global `process(body, url)` that returns a structured
//! object. A shared `<script_dir>/common/init.js` is evaluated into the
//! same context first, so domain scripts can lean on common helpers.
//!
//! Execution happens in a fresh, memory-limited QuickJS runtime per
//! invocation with nothing but the ECMAScript intrinsics and a `DEBUG`
//! global; scripts cannot touch the filesystem or the network. QuickJS
//! is blocking, so invocations run under `spawn_blocking`.

mod convert;

pub use convert::value_to_json;

use std::path::Path;
use std::sync::Arc;

use rquickjs::{Context, Function, Runtime, Value};

use crate::config::SCRIPT_MEMORY_LIMIT;
use crate::error_handling::{ErrorKind, ProcessingStats};
use crate::url::Url;

/// How a client-side redirect was expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    Meta,
    Js,
}

/// A client-side redirect surfaced by the extraction script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRedirect {
    pub kind: RedirectKind,
    pub delay_seconds: u64,
    pub url: String,
    pub base_href: Option<String>,
}

impl ClientRedirect {
    /// Reads the `client_redirect` object out of an extraction result.
    /// Absent, null, or malformed entries all mean "no redirect".
    pub fn from_result(doc: &serde_json::Value) -> Option<Self> {
        let cr = doc.get("client_redirect")?;
        if cr.is_null() {
            return None;
        }
        let target = cr.get("url")?.as_str()?.to_string();
        let kind = match cr.get("type").and_then(|t| t.as_str()) {
            Some("meta") => RedirectKind::Meta,
            _ => RedirectKind::Js,
        };
        let delay_seconds = cr
            .get("delay")
            .and_then(|d| d.as_f64())
            .map(|d| if d.is_sign_negative() { 0.0 } else { d })
            .unwrap_or(0.0) as u64;
        let base_href = cr
            .get("base")
            .and_then(|b| b.as_str())
            .filter(|b| !b.is_empty())
            .map(str::to_string);
        Some(Self {
            kind,
            delay_seconds,
            url: target,
            base_href,
        })
    }
}

pub struct ScriptHost {
    domain: String,
    common_src: Option<String>,
    script_src: Option<String>,
    has_script: bool,
    debug: bool,
    stats: Arc<ProcessingStats>,
}

impl ScriptHost {
    /// Binds the host to `<scripts_dir>/<domain>/init.js`. A missing file
    /// leaves the host scriptless; a present file must evaluate cleanly
    /// and define a global `process` function to count.
    pub fn load(scripts_dir: &Path, domain: &str, stats: Arc<ProcessingStats>) -> Self {
        let debug = crate::initialization::debug_enabled();
        let common_path = scripts_dir.join("common").join("init.js");
        let common_src = std::fs::read_to_string(&common_path).ok();

        let script_path = scripts_dir.join(domain).join("init.js");
        let script_src = match std::fs::read_to_string(&script_path) {
            Ok(src) => Some(src),
            Err(_) => {
                log::debug!("no script at {}", script_path.display());
                None
            }
        };

        let has_script = match &script_src {
            Some(src) => match validate_script(common_src.as_deref(), src, debug) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("script for {domain} is unusable: {e}");
                    false
                }
            },
            None => false,
        };

        Self {
            domain: domain.to_string(),
            common_src,
            script_src,
            has_script,
            debug,
            stats,
        }
    }

    pub fn has_script(&self) -> bool {
        self.has_script
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Runs `process(body, url)` and marshals the returned object.
    /// Returns `None` for scriptless hosts, out-of-domain URLs, script
    /// errors, and non-object returns.
    pub async fn process(&self, url: &Url, body: &[u8]) -> Option<serde_json::Value> {
        if !self.has_script {
            return None;
        }
        let domain = match url.registrable_domain() {
            d if d.is_empty() => url.host().to_string(),
            d => d,
        };
        if domain != self.domain {
            log::debug!("no script binding for {domain} (host bound to {})", self.domain);
            return None;
        }

        let common = self.common_src.clone();
        let script = self.script_src.clone()?;
        let body_text = String::from_utf8_lossy(body).into_owned();
        let url_text = url.to_string();
        let url_for_log = url_text.clone();
        let debug = self.debug;
        let stats = Arc::clone(&self.stats);

        let handle = tokio::task::spawn_blocking(move || {
            run_process(common.as_deref(), &script, &body_text, &url_text, debug, &stats)
        });
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                log::warn!("script task for {url_for_log} panicked: {e}");
                None
            }
        }
    }
}

/// Builds a fresh sandbox context.
fn make_context() -> Result<(Runtime, Context), rquickjs::Error> {
    let runtime = Runtime::new()?;
    runtime.set_memory_limit(SCRIPT_MEMORY_LIMIT);
    let context = Context::full(&runtime)?;
    Ok((runtime, context))
}

/// Evaluates the prelude and the domain script, checking that a global
/// `process` function emerges.
fn validate_script(common: Option<&str>, script: &str, debug: bool) -> anyhow::Result<()> {
    let (_runtime, context) = make_context()?;
    context.with(|ctx| -> anyhow::Result<()> {
        ctx.globals().set("DEBUG", debug)?;
        if let Some(common_src) = common {
            ctx.eval::<(), _>(common_src)
                .map_err(|e| anyhow::anyhow!("common prelude failed: {e}"))?;
        }
        ctx.eval::<(), _>(script)
            .map_err(|e| anyhow::anyhow!("script failed to evaluate: {e}"))?;
        let process: Result<Function, _> = ctx.globals().get("process");
        match process {
            Ok(_) => Ok(()),
            Err(_) => anyhow::bail!("script defines no process() function"),
        }
    })
}

fn run_process(
    common: Option<&str>,
    script: &str,
    body: &str,
    url: &str,
    debug: bool,
    stats: &ProcessingStats,
) -> Option<serde_json::Value> {
    let (_runtime, context) = match make_context() {
        Ok(pair) => pair,
        Err(e) => {
            log::warn!("failed to create script runtime: {e}");
            stats.increment(ErrorKind::ScriptError);
            return None;
        }
    };

    context.with(|ctx| {
        if let Err(e) = ctx.globals().set("DEBUG", debug) {
            log::warn!("failed to seed sandbox globals: {e}");
            stats.increment(ErrorKind::ScriptError);
            return None;
        }
        if let Some(common_src) = common {
            if let Err(e) = ctx.eval::<(), _>(common_src) {
                log::warn!("common prelude error: {e}");
                stats.increment(ErrorKind::ScriptError);
                return None;
            }
        }
        if let Err(e) = ctx.eval::<(), _>(script) {
            log::warn!("script error: {e}");
            stats.increment(ErrorKind::ScriptError);
            return None;
        }

        let process: Function = match ctx.globals().get("process") {
            Ok(f) => f,
            Err(_) => {
                log::warn!("script defines no process() function");
                stats.increment(ErrorKind::ScriptError);
                return None;
            }
        };

        let result: Result<Value, _> = process.call((body, url));
        let value = match result {
            Ok(v) => v,
            Err(e) => {
                log::warn!("process() raised: {e}");
                stats.increment(ErrorKind::ScriptError);
                return None;
            }
        };

        if value.is_undefined() || value.is_null() {
            log::warn!("process() returned no result for {url}");
            stats.increment(ErrorKind::ScriptNoResults);
            return None;
        }
        if value.is_function() || value.as_object().is_none() {
            log::warn!("process() did not return an object for {url}");
            stats.increment(ErrorKind::ScriptReturnedNonTable);
            return None;
        }

        let doc = value_to_json(&value);
        if debug {
            if let Ok(pretty) = serde_json::to_string_pretty(&doc) {
                log::debug!("{pretty}");
            }
        }
        Some(doc)
    })
}
