//! Accumulated HTTP response: ordered headers, opaque body bytes, status
//! classification, and the client's post-redirect reporting.

use crate::url::Url;

/// A fetched response. Header names keep their original case; lookups are
/// case-insensitive. The body is an opaque byte buffer.
#[derive(Debug, Default, Clone)]
pub struct HttpResponse {
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    status_code: u16,
    redirect_count: u32,
    effective_url: Option<Url>,
}

impl HttpResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a raw `Name: Value` header line. Lines without a colon are
    /// dropped; both sides are trimmed.
    pub fn add_header_line(&mut self, line: &str) {
        let Some(colon) = line.find(':') else {
            return;
        };
        let name = line[..colon].trim();
        let value = line[colon + 1..].trim();
        if name.is_empty() {
            return;
        }
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Appends an already-split header pair, preserving order.
    pub fn push_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    pub fn append_body(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    /// First value for `key`, case-insensitive.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// All values for `key`, case-insensitive, in arrival order.
    pub fn headers_named(&self, key: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn set_status_code(&mut self, status: u16) {
        self.status_code = status;
    }

    pub fn redirect_count(&self) -> u32 {
        self.redirect_count
    }

    pub fn set_redirect_count(&mut self, count: u32) {
        self.redirect_count = count;
    }

    /// The URL the client ended up at after following server redirects.
    pub fn effective_url(&self) -> Option<&Url> {
        self.effective_url.as_ref()
    }

    pub fn set_effective_url(&mut self, url: Url) {
        self.effective_url = Some(url);
    }

    pub fn is_okay(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_line_splits_on_first_colon_and_trims() {
        let mut resp = HttpResponse::new();
        resp.add_header_line("Content-Type:  text/html; charset=utf-8 \r\n");
        assert_eq!(resp.header("content-type"), Some("text/html; charset=utf-8"));
    }

    #[test]
    fn header_line_without_colon_is_dropped() {
        let mut resp = HttpResponse::new();
        resp.add_header_line("HTTP/1.1 200 OK");
        resp.add_header_line("garbage line");
        assert!(resp.headers().is_empty());
    }

    #[test]
    fn header_lookup_is_case_insensitive_first_match() {
        let mut resp = HttpResponse::new();
        resp.add_header_line("Set-Cookie: a=1");
        resp.add_header_line("set-cookie: b=2");
        assert_eq!(resp.header("SET-COOKIE"), Some("a=1"));
        assert_eq!(resp.headers_named("Set-Cookie"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn header_value_keeps_embedded_colons() {
        let mut resp = HttpResponse::new();
        resp.add_header_line("Location: https://example.com/x");
        assert_eq!(resp.header("location"), Some("https://example.com/x"));
    }

    #[test]
    fn status_classification() {
        let mut resp = HttpResponse::new();
        resp.set_status_code(204);
        assert!(resp.is_okay());
        assert!(!resp.is_redirect());
        resp.set_status_code(302);
        assert!(resp.is_redirect());
        assert!(!resp.is_okay());
        resp.set_status_code(404);
        assert!(!resp.is_okay());
        assert!(!resp.is_redirect());
    }

    #[test]
    fn body_accumulates() {
        let mut resp = HttpResponse::new();
        resp.append_body(b"hello ");
        resp.append_body(b"world");
        assert_eq!(resp.body(), b"hello world");
    }
}
