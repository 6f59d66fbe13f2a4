//! Trust-augmentation tests: issuer fetch, normalization, persistence,
//! and per-host bundle assembly, against a local HTTP server.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use httptest::{matchers::*, responders::*, Expectation, Server};

use domain_crawler::cert_trust::{ensure_pem, issuer_common_name, CertTrust};
use domain_crawler::{ErrorKind, ProcessingStats};

const BASE_BUNDLE: &str = "-----BEGIN CERTIFICATE-----\nQkFTRQ==\n-----END CERTIFICATE-----\n";

struct Fixture {
    _root: tempfile::TempDir,
    pem_dir: PathBuf,
    stats: Arc<ProcessingStats>,
    trust: CertTrust,
}

async fn make_fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let base = root.path().join("base.pem");
    tokio::fs::write(&base, BASE_BUNDLE).await.unwrap();
    let pem_dir = root.path().join("pems");
    tokio::fs::create_dir_all(&pem_dir).await.unwrap();

    let stats = Arc::new(ProcessingStats::new());
    let trust = CertTrust::new(&pem_dir, Some(base), Arc::clone(&stats)).unwrap();
    Fixture {
        _root: root,
        pem_dir,
        stats,
        trust,
    }
}

#[tokio::test]
async fn augmentation_persists_issuer_and_builds_bundle() {
    let server = Server::run();
    let issuer_der = common::build_certificate("TestCA", "Intermediate", None);
    server.expect(
        Expectation::matching(request::method_path("GET", "/issuer.der")).respond_with(
            status_code(200)
                .insert_header("Content-Type", "application/pkix-cert")
                .body(issuer_der.clone()),
        ),
    );

    let mut fixture = make_fixture().await;
    let issuer_url = server.url("/issuer.der").to_string();
    let bundle = fixture
        .trust
        .augment_with_issuers("peer", &[issuer_url])
        .await
        .expect("augmentation should succeed");

    // the intermediate was persisted under <host>__<issuer_cn>.pem
    let pem_path = fixture.pem_dir.join("peer__TestCA.pem");
    assert!(pem_path.exists());
    let pem_text = tokio::fs::read_to_string(&pem_path).await.unwrap();
    assert_eq!(issuer_common_name(&pem_text).as_deref(), Some("TestCA"));

    // the bundle is base + intermediate, newline separated
    let bundle_path = fixture.pem_dir.join("bundles").join("peer.bundle.pem");
    assert!(bundle_path.exists());
    let bundle_text = String::from_utf8(bundle).unwrap();
    assert!(bundle_text.starts_with(BASE_BUNDLE));
    assert!(bundle_text.contains(pem_text.trim_end()));
    assert_eq!(
        tokio::fs::read_to_string(&bundle_path).await.unwrap(),
        bundle_text
    );
    assert_eq!(fixture.trust.bundle_path("peer"), Some(&bundle_path));
}

#[tokio::test]
async fn ldap_issuer_urls_are_skipped() {
    let mut fixture = make_fixture().await;
    let result = fixture
        .trust
        .augment_with_issuers("peer", &["ldap://directory.example/cn=ca".to_string()])
        .await;
    assert!(result.is_none());
}

#[tokio::test]
async fn failed_issuer_fetch_is_counted() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/gone"))
            .respond_with(status_code(404)),
    );

    let mut fixture = make_fixture().await;
    let issuer_url = server.url("/gone").to_string();
    let result = fixture.trust.augment_with_issuers("peer", &[issuer_url]).await;
    assert!(result.is_none());
    assert_eq!(fixture.stats.count(ErrorKind::AiaFetchFailed), 1);
}

#[tokio::test]
async fn unnormalizable_payload_is_counted() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/junk"))
            .respond_with(status_code(200).body("this is not a certificate")),
    );

    let mut fixture = make_fixture().await;
    let issuer_url = server.url("/junk").to_string();
    let result = fixture.trust.augment_with_issuers("peer", &[issuer_url]).await;
    assert!(result.is_none());
    assert_eq!(fixture.stats.count(ErrorKind::AiaPemUnparseable), 1);
}

#[tokio::test]
async fn known_issuers_are_not_refetched_into_new_files() {
    let server = Server::run();
    let issuer_der = common::build_certificate("TestCA", "Intermediate", None);
    server.expect(
        Expectation::matching(request::method_path("GET", "/issuer.der"))
            .times(2)
            .respond_with(status_code(200).body(issuer_der.clone())),
    );

    let mut fixture = make_fixture().await;
    let issuer_url = server.url("/issuer.der").to_string();

    let first = fixture
        .trust
        .augment_with_issuers("peer", &[issuer_url.clone()])
        .await;
    assert!(first.is_some());

    // same CN again: downloaded, recognized, but nothing new to apply
    let second = fixture.trust.augment_with_issuers("peer", &[issuer_url]).await;
    assert!(second.is_none());

    let mut pems = 0;
    let mut dir = tokio::fs::read_dir(&fixture.pem_dir).await.unwrap();
    while let Some(entry) = dir.next_entry().await.unwrap() {
        if entry.file_type().await.unwrap().is_file() {
            pems += 1;
        }
    }
    assert_eq!(pems, 1, "one persisted intermediate, no duplicates");
}

#[tokio::test]
async fn partial_success_still_builds_a_bundle() {
    let server = Server::run();
    let issuer_der = common::build_certificate("TestCA", "Intermediate", None);
    server.expect(
        Expectation::matching(request::method_path("GET", "/bad"))
            .respond_with(status_code(500)),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/good.der"))
            .respond_with(status_code(200).body(issuer_der.clone())),
    );

    let mut fixture = make_fixture().await;
    let urls = vec![
        server.url("/bad").to_string(),
        server.url("/good.der").to_string(),
    ];
    let bundle = fixture.trust.augment_with_issuers("peer", &urls).await;
    assert!(bundle.is_some(), "one good issuer out of two is success");
    assert!(fixture.pem_dir.join("peer__TestCA.pem").exists());
}

#[tokio::test]
async fn pkcs7_payload_normalizes_to_multiple_blocks() {
    // built the same way an AIA endpoint would serve a .p7c
    let cert = common::build_certificate("RootCA", "Intermediate", None);
    let version = common::tlv(0x02, &[1]);
    let digests = common::tlv(0x31, &[]);
    let encap = common::tlv(
        0x30,
        &common::tlv(0x06, &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x01]),
    );
    let mut signed = Vec::new();
    signed.extend_from_slice(&version);
    signed.extend_from_slice(&digests);
    signed.extend_from_slice(&encap);
    signed.extend_from_slice(&common::tlv(0xa0, &cert));
    let signed = common::tlv(0x30, &signed);
    let mut ci = common::tlv(0x06, &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02]);
    ci.extend_from_slice(&common::tlv(0xa0, &signed));
    let payload = common::tlv(0x30, &ci);

    let pem = ensure_pem(&payload).expect("certs-only payload should normalize");
    assert!(pem.contains("-----BEGIN CERTIFICATE-----"));
    assert_eq!(issuer_common_name(&pem).as_deref(), Some("RootCA"));
}
