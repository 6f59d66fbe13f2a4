//! Certificate encoding normalization and field extraction.
//!
//! Issuer endpoints serve whatever they like: PEM, a single DER
//! certificate, or a PKCS#7 bag. Everything is normalized to PEM text
//! here; parsing stays in x509-parser.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use x509_parser::prelude::*;

use super::pkcs7;

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// id-ad-caIssuers as a dotted string, compared against access methods.
const OID_AD_CA_ISSUERS: &str = "1.3.6.1.5.5.7.48.2";

/// Normalizes an issuer payload to PEM. Tries, in order: already-PEM
/// passthrough, a single DER certificate, a PKCS#7 "certs only" bag
/// (PEM-concatenated). `None` when nothing usable was recognized.
pub fn ensure_pem(payload: &[u8]) -> Option<String> {
    if let Ok(text) = std::str::from_utf8(payload) {
        if text.contains(PEM_BEGIN) {
            return Some(text.to_string());
        }
    }

    if parse_x509_certificate(payload).is_ok() {
        return Some(pem_encode_certificate(payload));
    }

    let certs = pkcs7::extract_certificates(payload);
    let mut out = String::new();
    for der in &certs {
        if parse_x509_certificate(der).is_ok() {
            out.push_str(&pem_encode_certificate(der));
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Wraps raw certificate DER in a PEM block, base64 folded at 64 columns.
pub fn pem_encode_certificate(der: &[u8]) -> String {
    let encoded = BASE64.encode(der);
    let mut out = String::with_capacity(encoded.len() + 64);
    out.push_str(PEM_BEGIN);
    out.push('\n');
    for chunk in encoded.as_bytes().chunks(64) {
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push('\n');
    }
    out.push_str(PEM_END);
    out.push('\n');
    out
}

/// Decodes the first PEM certificate block back to DER.
pub fn first_certificate_der(pem: &str) -> Option<Vec<u8>> {
    let start = pem.find(PEM_BEGIN)? + PEM_BEGIN.len();
    let end = pem[start..].find(PEM_END)? + start;
    let body: String = pem[start..end].chars().filter(|c| !c.is_whitespace()).collect();
    BASE64.decode(body).ok()
}

/// Issuer common name of the first certificate in `pem`.
pub fn issuer_common_name(pem: &str) -> Option<String> {
    let der = first_certificate_der(pem)?;
    let (_, cert) = parse_x509_certificate(&der).ok()?;
    let name = cert
        .issuer()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_string);
    name
}

/// Every CA-Issuers URI in the certificate's Authority Information
/// Access extension, in order.
pub fn aia_ca_issuer_urls(leaf_der: &[u8]) -> Vec<String> {
    let Ok((_, cert)) = parse_x509_certificate(leaf_der) else {
        return Vec::new();
    };
    let mut urls = Vec::new();
    for ext in cert.extensions() {
        if let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() {
            for desc in &aia.accessdescs {
                if desc.access_method.to_id_string() != OID_AD_CA_ISSUERS {
                    continue;
                }
                if let GeneralName::URI(uri) = &desc.access_location {
                    urls.push((*uri).to_string());
                }
            }
        }
    }
    urls
}
