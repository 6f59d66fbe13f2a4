//! URL model invariants exercised through the public API.

use domain_crawler::Url;

#[test]
fn canonical_form_is_a_fixed_point() {
    let inputs = [
        "https://example.com",
        "https://example.com/",
        "http://e.com/p?x=1&x=2&x",
        "https://Example.COM/Path/With/Case?Q=Mixed#Frag",
        "https://a.b.example.co.uk/deep/path?k=&m",
        "http://192.0.2.1/x?y=1",
        "http://[2001:db8::1]/x",
        "https://example.com/a/b/../c/./d",
    ];
    for input in inputs {
        let once = Url::parse(input).to_string();
        let twice = Url::parse(&once).to_string();
        assert_eq!(once, twice, "round-trip changed for {input}");
    }
}

#[test]
fn urls_compare_equal_iff_digests_match() {
    let pairs = [
        ("https://example.com/a", "https://EXAMPLE.com/a", true),
        ("https://example.com/a", "https://example.com/a#frag", false),
        ("https://example.com/a?x=1", "https://example.com/a?x=2", false),
        ("http://example.com/a", "https://example.com/a", false),
    ];
    for (left, right, expect_equal) in pairs {
        let a = Url::parse(left);
        let b = Url::parse(right);
        assert_eq!(a == b, expect_equal, "{left} vs {right}");
        assert_eq!(a.digest() == b.digest(), expect_equal, "{left} vs {right}");
    }
}

#[test]
fn label_decomposition_reassembles_the_host() {
    for host_url in [
        "https://www.example.com/",
        "https://a.b.c.example.co.uk/",
        "https://example.org/",
        "https://deep.sub.example.com.au/",
    ] {
        let url = Url::parse(host_url);
        assert!(!url.public_suffix().is_empty());
        let mut labels = url.subdomains();
        labels.push(url.second_level_domain());
        labels.extend(url.public_suffix().split('.').map(str::to_string));
        assert_eq!(labels.join("."), url.host(), "decomposition of {host_url}");
        assert!(
            url.host().ends_with(&url.registrable_domain()),
            "registrable domain is a host suffix for {host_url}"
        );
    }
}

#[test]
fn resolver_laws() {
    let base = Url::parse("https://example.com/a/b?q=1#frag");

    // empty reference: base minus fragment
    assert_eq!(base.resolve("").to_string(), "https://example.com/a/b?q=1");

    // rooted references keep scheme and host, drop base query
    assert_eq!(
        base.resolve("/abs").to_string(),
        "https://example.com/abs"
    );

    // relative references join against the base directory
    assert_eq!(
        base.resolve("rel").to_string(),
        "https://example.com/a/rel"
    );
    assert_eq!(
        base.resolve("sub/rel").to_string(),
        "https://example.com/a/sub/rel"
    );

    // dot segments collapse, parents cannot escape the root
    assert_eq!(
        base.resolve("../../../../up").to_string(),
        "https://example.com/up"
    );

    // fragments come only from the reference
    assert_eq!(
        base.resolve("rel#other").to_string(),
        "https://example.com/a/rel#other"
    );
}

#[test]
fn resolution_composes_with_digests() {
    // a resolved URL digests identically to parsing its canonical form
    let base = Url::parse("https://example.com/dir/");
    let resolved = base.resolve("../next?x=1");
    let reparsed = Url::parse(&resolved.to_string());
    assert_eq!(resolved, reparsed);
    assert_eq!(resolved.digest(), reparsed.digest());
}

#[test]
fn ip_literal_hosts_have_no_label_semantics() {
    for input in ["http://192.0.2.1/x", "http://[2001:db8::1]/x"] {
        let url = Url::parse(input);
        assert_eq!(url.public_suffix(), "");
        assert_eq!(url.registrable_domain(), url.host());
        assert!(url.subdomains().is_empty());
        assert_eq!(url.second_level_domain(), "");
    }
}
