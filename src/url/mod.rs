//! URL model: parsing, canonical serialization, relative resolution, and
//! registrable-domain decomposition.
//!
//! The accepted grammar is `[scheme://]host[/path][?query][#fragment]` with
//! scheme limited to `http`/`https` and host any run of characters other
//! than `/`, `?`, `#`. The canonical string produced by `Display` is the
//! identity used for equality, ordering, hashing, and the SHA-256 digest
//! that keys the on-disk cache. Paths and queries are kept verbatim: no
//! percent-decoding and no case changes outside the host.

mod suffix;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{LazyLock, OnceLock};

use regex::Regex;
use sha2::{Digest, Sha256};

use suffix::{is_ipv4, is_ipv6_literal, suffix_label_count};

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(https?)://)?([^/?#]+)(/[^?#]*)?(\?[^#]*)?(?:#(.*))?$")
        .expect("URL grammar regex must compile")
});

/// Lowercase hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let out = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in out {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// An immutable-by-convention URL value. Setters exist but produce a new
/// canonical form and invalidate the cached digest.
#[derive(Debug, Clone, Default)]
pub struct Url {
    scheme: String,
    host: String,
    path: String,
    /// Raw query including the leading `?`, or empty.
    raw_query: String,
    /// Fragment without the leading `#`, or empty.
    fragment: String,
    /// Materialized on first mutation of query parameters; once present it
    /// overrides `raw_query` in the canonical form.
    query_pairs: Option<Vec<(String, Option<String>)>>,
    digest: OnceLock<String>,
}

impl Url {
    /// Parses `input` against the accepted grammar. Inputs that do not
    /// match yield a value for which [`Url::is_valid`] is false.
    pub fn parse(input: &str) -> Self {
        let Some(caps) = URL_RE.captures(input.trim()) else {
            log::warn!("invalid URL: {input}");
            return Self::default();
        };
        Self {
            scheme: caps.get(1).map_or(String::new(), |m| m.as_str().to_string()),
            host: caps
                .get(2)
                .map_or(String::new(), |m| m.as_str().to_ascii_lowercase()),
            path: caps.get(3).map_or(String::new(), |m| m.as_str().to_string()),
            raw_query: caps.get(4).map_or(String::new(), |m| m.as_str().to_string()),
            fragment: caps.get(5).map_or(String::new(), |m| m.as_str().to_string()),
            query_pairs: None,
            digest: OnceLock::new(),
        }
    }

    /// A URL is valid when both a scheme and a host were recognized.
    pub fn is_valid(&self) -> bool {
        !self.scheme.is_empty() && !self.host.is_empty()
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// The effective query string including its leading `?` (composed from
    /// materialized pairs when present, else the raw capture).
    pub fn query(&self) -> String {
        match &self.query_pairs {
            Some(pairs) => compose_query(pairs),
            None => self.raw_query.clone(),
        }
    }

    /// All values for `key`, in insertion order, distinguishing `k=v`
    /// (`Some("v")`), `k=` (`Some("")`) and bare `k` (`None`). Returns
    /// `None` when the key never occurs.
    pub fn query_param(&self, key: &str) -> Option<Vec<Option<String>>> {
        let owned;
        let pairs = match &self.query_pairs {
            Some(p) => p,
            None => {
                owned = parse_query_pairs(&self.raw_query);
                &owned
            }
        };
        let values: Vec<Option<String>> = pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values)
        }
    }

    pub fn set_scheme(&mut self, scheme: &str) {
        self.scheme = scheme.to_string();
        self.digest = OnceLock::new();
    }

    pub fn set_host(&mut self, host: &str) {
        self.host = host.to_ascii_lowercase();
        self.digest = OnceLock::new();
    }

    pub fn set_path(&mut self, path: &str) {
        self.path = path.to_string();
        self.digest = OnceLock::new();
    }

    /// Replaces the raw query; a missing leading `?` is supplied. Any
    /// materialized pairs are discarded.
    pub fn set_query(&mut self, query: &str) {
        self.raw_query = if query.is_empty() || query.starts_with('?') {
            query.to_string()
        } else {
            format!("?{query}")
        };
        self.query_pairs = None;
        self.digest = OnceLock::new();
    }

    pub fn set_fragment(&mut self, fragment: &str) {
        self.fragment = fragment.to_string();
        self.digest = OnceLock::new();
    }

    /// Updates the first pair named `key`, or appends one.
    pub fn set_query_param(&mut self, key: &str, value: Option<&str>) {
        let pairs = self.materialize_pairs();
        match pairs.iter_mut().find(|(k, _)| k == key) {
            Some(pair) => pair.1 = value.map(str::to_string),
            None => pairs.push((key.to_string(), value.map(str::to_string))),
        }
        self.digest = OnceLock::new();
    }

    /// Appends a pair unconditionally, preserving duplicates.
    pub fn append_query_param(&mut self, key: &str, value: Option<&str>) {
        let pairs = self.materialize_pairs();
        pairs.push((key.to_string(), value.map(str::to_string)));
        self.digest = OnceLock::new();
    }

    fn materialize_pairs(&mut self) -> &mut Vec<(String, Option<String>)> {
        if self.query_pairs.is_none() {
            self.query_pairs = Some(parse_query_pairs(&self.raw_query));
        }
        self.query_pairs.as_mut().unwrap()
    }

    /// Resolves `reference` against `self`, per the crawler's resolution
    /// rules: absolute references replace the base, `//`-references inherit
    /// the scheme, otherwise the path is joined against the base directory
    /// and normalized (`.`/`..` collapsed, parents never escaping the
    /// root). The reference query wins; the base query is inherited only
    /// for an empty reference path.
    pub fn resolve(&self, reference: &str) -> Url {
        if reference.contains("://") {
            return Url::parse(reference);
        }
        if reference.starts_with("//") {
            return Url::parse(&format!("{}:{}", self.scheme, reference));
        }

        let mut rest = reference;
        let mut fragment = String::new();
        if let Some(hash) = rest.find('#') {
            fragment = rest[hash + 1..].to_string();
            rest = &rest[..hash];
        }
        let (ref_path, ref_query) = match rest.find('?') {
            Some(q) => (&rest[..q], rest[q..].to_string()),
            None => (rest, String::new()),
        };

        let origin = if self.scheme.is_empty() {
            String::new()
        } else {
            format!("{}://{}", self.scheme, self.host)
        };

        let path = if ref_path.is_empty() {
            if self.path.is_empty() {
                "/".to_string()
            } else {
                self.path.clone()
            }
        } else if ref_path.starts_with('/') {
            normalize_path(ref_path)
        } else {
            let base_dir = match self.path.rfind('/') {
                Some(slash) => &self.path[..=slash],
                None => "/",
            };
            normalize_path(&format!("{base_dir}{ref_path}"))
        };

        let query = if !ref_query.is_empty() {
            ref_query
        } else if ref_path.is_empty() {
            self.query()
        } else {
            String::new()
        };

        let frag = if fragment.is_empty() {
            String::new()
        } else {
            format!("#{fragment}")
        };
        Url::parse(&format!("{origin}{path}{query}{frag}"))
    }

    /// Longest known dotted suffix of the host (`com`, `co.uk`); empty for
    /// IP-literal hosts.
    pub fn public_suffix(&self) -> String {
        let count = suffix_label_count(&self.host);
        if count == 0 {
            return String::new();
        }
        let labels: Vec<&str> = self.host.split('.').collect();
        if count > labels.len() {
            return String::new();
        }
        labels[labels.len() - count..].join(".")
    }

    /// eTLD+1 (`example.com`, `example.co.uk`). IP-literal hosts return the
    /// host itself; suffix-only hosts return empty.
    pub fn registrable_domain(&self) -> String {
        if is_ipv6_literal(&self.host) || is_ipv4(&self.host) {
            return self.host.clone();
        }
        let count = suffix_label_count(&self.host);
        let labels: Vec<&str> = self.host.split('.').collect();
        if count == 0 || labels.len() <= count {
            return String::new();
        }
        labels[labels.len() - (count + 1)..].join(".")
    }

    /// The label immediately left of the public suffix (`example`).
    pub fn second_level_domain(&self) -> String {
        let count = suffix_label_count(&self.host);
        let labels: Vec<&str> = self.host.split('.').collect();
        if count == 0 || labels.len() <= count {
            return String::new();
        }
        labels[labels.len() - (count + 1)].to_string()
    }

    /// Labels left of the registrable domain, left to right (`["a", "b"]`
    /// for `a.b.example.com`).
    pub fn subdomains(&self) -> Vec<String> {
        let count = suffix_label_count(&self.host);
        if count == 0 {
            return Vec::new();
        }
        let labels: Vec<&str> = self.host.split('.').collect();
        if labels.len() <= count + 1 {
            return Vec::new();
        }
        labels[..labels.len() - (count + 1)]
            .iter()
            .map(|l| l.to_string())
            .collect()
    }

    pub fn host_is_ipv4(&self) -> bool {
        is_ipv4(&self.host)
    }

    pub fn host_is_ipv6(&self) -> bool {
        is_ipv6_literal(&self.host)
    }

    /// 64-hex SHA-256 of the canonical string; the cache key and hash
    /// identity. Cached until a setter changes the canonical form.
    pub fn digest(&self) -> &str {
        self.digest
            .get_or_init(|| sha256_hex(self.to_string().as_bytes()))
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.scheme.is_empty() {
            write!(f, "{}://", self.scheme)?;
        }
        f.write_str(&self.host)?;
        if !self.path.is_empty() {
            if !self.path.starts_with('/') {
                f.write_str("/")?;
            }
            f.write_str(&self.path)?;
        }
        f.write_str(&self.query())?;
        if !self.fragment.is_empty() {
            write!(f, "#{}", self.fragment)?;
        }
        Ok(())
    }
}

impl PartialEq for Url {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for Url {}

impl PartialOrd for Url {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Url {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl Hash for Url {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

/// Splits a raw query (leading `?`) into ordered pairs; empty segments and
/// empty keys are dropped.
fn parse_query_pairs(raw: &str) -> Vec<(String, Option<String>)> {
    let Some(stripped) = raw.strip_prefix('?') else {
        return Vec::new();
    };
    let mut pairs = Vec::new();
    for segment in stripped.split('&') {
        if segment.is_empty() {
            continue;
        }
        match segment.find('=') {
            Some(eq) => {
                let key = &segment[..eq];
                if !key.is_empty() {
                    pairs.push((key.to_string(), Some(segment[eq + 1..].to_string())));
                }
            }
            None => pairs.push((segment.to_string(), None)),
        }
    }
    pairs
}

fn compose_query(pairs: &[(String, Option<String>)]) -> String {
    if pairs.is_empty() {
        return String::new();
    }
    let mut out = String::from("?");
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(key);
        if let Some(v) = value {
            out.push('=');
            out.push_str(v);
        }
    }
    out
}

/// Collapses `.` and `..` segments; parents that would escape the root are
/// dropped. The result always begins with `/` and carries no trailing
/// slash except for the root itself.
fn normalize_path(raw: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            ".." => {
                parts.pop();
            }
            "" | "." => {}
            other => parts.push(other),
        }
    }
    let mut out = String::from("/");
    out.push_str(&parts.join("/"));
    out
}
