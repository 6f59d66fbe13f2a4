//! The network half of the pipeline: a manual redirect-following GET and
//! the error classification that drives recovery.
//!
//! Redirects are followed by hand on a no-redirect client so the hop
//! count and effective URL are known exactly, the Referer can be set per
//! hop, and a mid-chain TLS failure can be retried on a rebuilt client.

use reqwest::header;

use crate::config::MAX_SERVER_REDIRECT_HOPS;
use crate::response::HttpResponse;
use crate::url::Url;

/// What went wrong with a fetch, as far as recovery is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    /// Peer certificate did not verify against the local trust store;
    /// worth a trust-augmentation attempt.
    TlsVerification,
    /// HTTP/2 stream trouble or a truncated transfer; worth one retry on
    /// an HTTP/1.1-only client.
    Http2OrTruncation,
    /// Anything else; terminal for the attempt.
    Transport,
}

/// Classifies a reqwest error chain for the recovery ladder.
pub fn classify_error(error: &reqwest::Error) -> FetchFailure {
    let mut text = error.to_string().to_lowercase();
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(error);
    while let Some(cause) = source {
        text.push(' ');
        text.push_str(&cause.to_string().to_lowercase());
        source = cause.source();
    }

    if text.contains("certificate")
        || text.contains("unknownissuer")
        || text.contains("unable to get local issuer")
        || text.contains("invalid peer")
    {
        return FetchFailure::TlsVerification;
    }
    if text.contains("stream error")
        || text.contains("http2")
        || text.contains("h2 protocol")
        || text.contains("unexpected eof")
        || text.contains("peer closed connection")
        || error.is_body()
        || error.is_decode()
    {
        return FetchFailure::Http2OrTruncation;
    }
    FetchFailure::Transport
}

/// One complete fetch: GET `start`, follow up to ten server redirects
/// (resolving relative Locations, setting the Referer on hops), and
/// return the final response with its status, ordered headers, body,
/// redirect count, and effective URL.
pub async fn fetch_once(
    client: &reqwest::Client,
    start: &Url,
    user_agent: &str,
) -> Result<HttpResponse, reqwest::Error> {
    let mut current = start.clone();
    let mut referer: Option<String> = None;
    let mut redirects: u32 = 0;

    loop {
        let mut request = client
            .get(current.to_string())
            .header(header::USER_AGENT, user_agent);
        if let Some(prev) = &referer {
            request = request.header(header::REFERER, prev.clone());
        }
        let response = request.send().await?;
        let status = response.status();

        if status.is_redirection() && redirects < MAX_SERVER_REDIRECT_HOPS as u32 {
            if let Some(location) = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
            {
                let next = current.resolve(location);
                if next.is_valid() {
                    log::debug!("{current} -> {next} ({status})");
                    referer = Some(current.to_string());
                    current = next;
                    redirects += 1;
                    continue;
                }
                log::warn!("unresolvable Location header on {current}: {location}");
            } else {
                log::warn!("redirect status {status} without Location on {current}");
            }
        }

        let mut out = HttpResponse::new();
        out.set_status_code(status.as_u16());
        out.set_redirect_count(redirects);
        for (name, value) in response.headers() {
            out.push_header(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
        }
        let body = response.bytes().await?;
        out.append_body(&body);
        out.set_effective_url(current);
        return Ok(out);
    }
}
