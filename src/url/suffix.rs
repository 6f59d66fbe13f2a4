//! Public-suffix resolution against a bundled snapshot.
//!
//! The snapshot (`data/public_suffix_list.dat`) is parsed once into a
//! `publicsuffix::List` and consulted as a set keyed by the full dotted
//! suffix. Hosts whose TLD is absent from the snapshot fall back to the
//! prevailing rule: the last label is the suffix. IPv4 and IPv6-literal
//! hosts have no label-based suffix semantics at all.

use std::sync::LazyLock;

use publicsuffix::{List, Psl};

static SUFFIX_LIST: LazyLock<List> = LazyLock::new(|| {
    include_str!("../../data/public_suffix_list.dat")
        .parse()
        .expect("bundled public suffix list must parse")
});

/// `true` for bracketed IPv6 literals such as `[::1]`.
pub(crate) fn is_ipv6_literal(host: &str) -> bool {
    host.len() >= 2 && host.starts_with('[') && host.ends_with(']')
}

/// `true` for four dotted decimal labels (`192.0.2.1`). A trailing
/// `:port` does not disqualify the host.
pub(crate) fn is_ipv4(host: &str) -> bool {
    let host = host.split_once(':').map_or(host, |(h, _)| h);
    let mut labels = 0;
    for part in host.split('.') {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        labels += 1;
    }
    labels == 4
}

/// Number of labels in the public suffix of `host_lc` (already lowercase).
///
/// Returns 0 when the host has no label-based suffix (IP literals, empty
/// host). Unknown TLDs resolve to 1 (last label).
pub(crate) fn suffix_label_count(host_lc: &str) -> usize {
    if host_lc.is_empty() || is_ipv6_literal(host_lc) || is_ipv4(host_lc) {
        return 0;
    }
    match SUFFIX_LIST.suffix(host_lc.as_bytes()) {
        Some(suffix) => {
            let s = String::from_utf8_lossy(suffix.as_bytes()).into_owned();
            s.split('.').filter(|l| !l.is_empty()).count()
        }
        // Prevailing rule: the last label is the suffix.
        None => 1,
    }
}
