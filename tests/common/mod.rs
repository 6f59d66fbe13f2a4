//! Shared fixtures for integration tests: a hand-assembled DER
//! certificate builder (syntactically valid, garbage signature) so
//! trust-augmentation paths can run without a real CA.

/// DER TLV with computed length encoding.
pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xff {
        out.push(0x81);
        out.push(len as u8);
    } else {
        out.push(0x82);
        out.push((len >> 8) as u8);
        out.push((len & 0xff) as u8);
    }
    out.extend_from_slice(content);
    out
}

fn name_cn(cn: &str) -> Vec<u8> {
    let atv = {
        let mut inner = tlv(0x06, &[0x55, 0x04, 0x03]);
        inner.extend_from_slice(&tlv(0x13, cn.as_bytes()));
        tlv(0x30, &inner)
    };
    tlv(0x30, &tlv(0x31, &atv))
}

fn algorithm_sha256_rsa() -> Vec<u8> {
    let mut inner = tlv(0x06, &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0b]);
    inner.extend_from_slice(&tlv(0x05, &[]));
    tlv(0x30, &inner)
}

fn subject_public_key_info() -> Vec<u8> {
    let mut alg = tlv(0x06, &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01]);
    alg.extend_from_slice(&tlv(0x05, &[]));
    let mut inner = tlv(0x30, &alg);
    let mut key = vec![0x00];
    key.extend_from_slice(&[0x30, 0x06, 0x02, 0x01, 0x03, 0x02, 0x01, 0x03]);
    inner.extend_from_slice(&tlv(0x03, &key));
    tlv(0x30, &inner)
}

fn aia_extension(uri: &str) -> Vec<u8> {
    let mut access = tlv(0x06, &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x02]);
    access.extend_from_slice(&tlv(0x86, uri.as_bytes()));
    let syntax = tlv(0x30, &tlv(0x30, &access));
    let mut ext = tlv(0x06, &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x01, 0x01]);
    ext.extend_from_slice(&tlv(0x04, &syntax));
    tlv(0x30, &ext)
}

/// A v3 certificate DER with the given issuer/subject CNs and an
/// optional AIA CA-Issuers URI.
pub fn build_certificate(issuer_cn: &str, subject_cn: &str, aia_uri: Option<&str>) -> Vec<u8> {
    let mut tbs = Vec::new();
    tbs.extend_from_slice(&tlv(0xa0, &tlv(0x02, &[0x02])));
    tbs.extend_from_slice(&tlv(0x02, &[0x01]));
    tbs.extend_from_slice(&algorithm_sha256_rsa());
    tbs.extend_from_slice(&name_cn(issuer_cn));
    let mut validity = tlv(0x17, b"240101000000Z");
    validity.extend_from_slice(&tlv(0x17, b"391231235959Z"));
    tbs.extend_from_slice(&tlv(0x30, &validity));
    tbs.extend_from_slice(&name_cn(subject_cn));
    tbs.extend_from_slice(&subject_public_key_info());
    if let Some(uri) = aia_uri {
        let exts = tlv(0x30, &aia_extension(uri));
        tbs.extend_from_slice(&tlv(0xa3, &exts));
    }
    let tbs = tlv(0x30, &tbs);

    let mut cert = tbs;
    cert.extend_from_slice(&algorithm_sha256_rsa());
    cert.extend_from_slice(&tlv(0x03, &[0x00, 0xde, 0xad, 0xbe, 0xef]));
    tlv(0x30, &cert)
}
