//! Minimal DER walk for PKCS#7/CMS "certs-only" payloads.
//!
//! AIA issuer endpoints frequently serve `.p7c` bundles: a ContentInfo
//! wrapping SignedData whose `[0]` field is a bag of certificates. Only
//! that bag is of interest here; the certificates themselves go through
//! x509-parser. Definite-length DER only; indefinite-length BER is
//! rejected and the caller treats the payload as unusable.

/// id-signedData, 1.2.840.113549.1.7.2
const OID_SIGNED_DATA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];

const TAG_INTEGER: u8 = 0x02;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;
const TAG_CONTEXT_0: u8 = 0xa0;

struct Tlv<'a> {
    tag: u8,
    /// Header plus content: the full encoding of this value.
    raw: &'a [u8],
    content: &'a [u8],
}

/// Reads one TLV from the front of `data`; `None` on truncation,
/// indefinite length, or oversized length fields.
fn read_tlv(data: &[u8]) -> Option<(Tlv<'_>, &[u8])> {
    if data.len() < 2 {
        return None;
    }
    let tag = data[0];
    let first = data[1];
    let (len, header_len) = if first < 0x80 {
        (first as usize, 2)
    } else {
        let n = (first & 0x7f) as usize;
        // 0x80 is the indefinite-length marker
        if n == 0 || n > 4 || data.len() < 2 + n {
            return None;
        }
        let mut len = 0usize;
        for &b in &data[2..2 + n] {
            len = (len << 8) | b as usize;
        }
        (len, 2 + n)
    };
    if data.len() < header_len + len {
        return None;
    }
    let tlv = Tlv {
        tag,
        raw: &data[..header_len + len],
        content: &data[header_len..header_len + len],
    };
    Some((tlv, &data[header_len + len..]))
}

/// Iterates the TLVs packed inside a constructed value's content.
fn children(mut content: &[u8]) -> Vec<Tlv<'_>> {
    let mut out = Vec::new();
    while !content.is_empty() {
        match read_tlv(content) {
            Some((tlv, rest)) => {
                out.push(tlv);
                content = rest;
            }
            None => break,
        }
    }
    out
}

/// Extracts every certificate from a PKCS#7/CMS SignedData payload.
/// Returns the raw DER of each certificate; empty when the payload is not
/// a certs-carrying SignedData.
pub fn extract_certificates(data: &[u8]) -> Vec<Vec<u8>> {
    let Some((content_info, _)) = read_tlv(data) else {
        return Vec::new();
    };
    if content_info.tag != TAG_SEQUENCE {
        return Vec::new();
    }

    let top = children(content_info.content);
    // ContentInfo ::= SEQUENCE { contentType OID, [0] EXPLICIT content }
    let [oid, wrapped, ..] = top.as_slice() else {
        return Vec::new();
    };
    if oid.tag != TAG_OID || oid.content != OID_SIGNED_DATA || wrapped.tag != TAG_CONTEXT_0 {
        return Vec::new();
    }

    let Some((signed_data, _)) = read_tlv(wrapped.content) else {
        return Vec::new();
    };
    if signed_data.tag != TAG_SEQUENCE {
        return Vec::new();
    }

    // SignedData ::= SEQUENCE { version INTEGER, digestAlgorithms SET,
    //   encapContentInfo SEQUENCE, certificates [0] IMPLICIT OPTIONAL, ... }
    let fields = children(signed_data.content);
    let mut saw_version = false;
    let mut saw_digests = false;
    let mut saw_encap = false;
    for field in &fields {
        match field.tag {
            TAG_INTEGER if !saw_version => saw_version = true,
            TAG_SET if !saw_digests => saw_digests = true,
            TAG_SEQUENCE if !saw_encap => saw_encap = true,
            TAG_CONTEXT_0 if saw_encap => {
                return children(field.content)
                    .into_iter()
                    .filter(|c| c.tag == TAG_SEQUENCE)
                    .map(|c| c.raw.to_vec())
                    .collect();
            }
            _ => {}
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// DER TLV with computed length encoding.
    fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
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

    fn build_certs_only(certs: &[&[u8]]) -> Vec<u8> {
        let version = tlv(TAG_INTEGER, &[1]);
        let digests = tlv(TAG_SET, &[]);
        let encap = tlv(TAG_SEQUENCE, &tlv(TAG_OID, &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x01]));
        let mut bag = Vec::new();
        for c in certs {
            bag.extend_from_slice(c);
        }
        let certificates = tlv(TAG_CONTEXT_0, &bag);

        let mut signed_data = Vec::new();
        signed_data.extend_from_slice(&version);
        signed_data.extend_from_slice(&digests);
        signed_data.extend_from_slice(&encap);
        signed_data.extend_from_slice(&certificates);
        let signed_data = tlv(TAG_SEQUENCE, &signed_data);

        let mut content_info = tlv(TAG_OID, OID_SIGNED_DATA);
        content_info.extend_from_slice(&tlv(TAG_CONTEXT_0, &signed_data));
        tlv(TAG_SEQUENCE, &content_info)
    }

    #[test]
    fn extracts_certificates_from_certs_only_payload() {
        // stand-in "certificates": syntactically plain SEQUENCEs
        let cert_a = tlv(TAG_SEQUENCE, b"first certificate body");
        let cert_b = tlv(TAG_SEQUENCE, b"second certificate body");
        let payload = build_certs_only(&[&cert_a, &cert_b]);

        let got = extract_certificates(&payload);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], cert_a);
        assert_eq!(got[1], cert_b);
    }

    #[test]
    fn empty_certificate_bag_yields_nothing() {
        let payload = build_certs_only(&[]);
        assert!(extract_certificates(&payload).is_empty());
    }

    #[test]
    fn rejects_non_signed_data_oid() {
        let mut content_info = tlv(TAG_OID, &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x01]);
        content_info.extend_from_slice(&tlv(TAG_CONTEXT_0, &tlv(TAG_SEQUENCE, &[])));
        let payload = tlv(TAG_SEQUENCE, &content_info);
        assert!(extract_certificates(&payload).is_empty());
    }

    #[test]
    fn rejects_garbage_and_truncation() {
        assert!(extract_certificates(b"").is_empty());
        assert!(extract_certificates(b"\x30").is_empty());
        assert!(extract_certificates(b"not der at all").is_empty());
        let cert = tlv(TAG_SEQUENCE, b"x");
        let mut payload = build_certs_only(&[&cert]);
        payload.truncate(payload.len() - 3);
        assert!(extract_certificates(&payload).is_empty());
    }

    #[test]
    fn long_form_lengths_are_handled() {
        let big_body = vec![0x41u8; 300];
        let cert = tlv(TAG_SEQUENCE, &big_body);
        let payload = build_certs_only(&[&cert]);
        let got = extract_certificates(&payload);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0], cert);
    }
}
