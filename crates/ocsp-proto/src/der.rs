//! Minimal DER encoding and structural decoding
//!
//! Encoding covers exactly the subset of DER needed to emit OCSP requests
//! (and, for tests, responses). Decoding splits TLVs with `asn1-rs` and keeps
//! the raw encoding of every element, which signature verification needs for
//! `tbsResponseData`.

use crate::error::RevocationError;
use asn1_rs::{Any, Class, FromDer, Oid, Tag};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::borrow::Cow;

// ============================================================================
// Encoding
// ============================================================================

/// Encode a SEQUENCE
pub(crate) fn der_sequence(contents: &[u8]) -> Vec<u8> {
    der_tlv(0x30, contents)
}

/// Encode an OCTET STRING
pub(crate) fn der_octet_string(contents: &[u8]) -> Vec<u8> {
    der_tlv(0x04, contents)
}

/// Encode an INTEGER from big-endian magnitude bytes
///
/// Already-encoded content (such as a certificate's raw serial) passes through
/// unchanged as long as its high bit is clear.
pub(crate) fn der_integer(value: &[u8]) -> Vec<u8> {
    let mut int_value = value.to_vec();
    if let Some(&first_byte) = int_value.first() {
        if first_byte & 0x80 != 0 {
            int_value.insert(0, 0x00);
        }
    } else {
        int_value.push(0x00);
    }
    der_tlv(0x02, &int_value)
}

/// Encode an ENUMERATED with a small value
#[cfg_attr(not(any(test, feature = "test-util")), allow(dead_code))]
pub(crate) fn der_enumerated(value: u8) -> Vec<u8> {
    if value & 0x80 != 0 {
        der_tlv(0x0A, &[0x00, value])
    } else {
        der_tlv(0x0A, &[value])
    }
}

/// Encode an OBJECT IDENTIFIER
pub(crate) fn der_oid(components: &[u64]) -> Vec<u8> {
    if components.len() < 2 {
        return der_tlv(0x06, &[]);
    }

    let mut encoded = encode_base128(40 * components[0] + components[1]);
    for &component in &components[2..] {
        encoded.extend_from_slice(&encode_base128(component));
    }

    der_tlv(0x06, &encoded)
}

/// Encode NULL
pub(crate) fn der_null() -> Vec<u8> {
    vec![0x05, 0x00]
}

/// Encode a BIT STRING with no unused bits
pub(crate) fn der_bit_string(bits: &[u8]) -> Vec<u8> {
    let mut content = Vec::with_capacity(bits.len() + 1);
    content.push(0x00);
    content.extend_from_slice(bits);
    der_tlv(0x03, &content)
}

/// Encode a GeneralizedTime with second precision
#[cfg_attr(not(any(test, feature = "test-util")), allow(dead_code))]
pub(crate) fn der_generalized_time(at: DateTime<Utc>) -> Vec<u8> {
    der_tlv(0x18, at.format("%Y%m%d%H%M%SZ").to_string().as_bytes())
}

/// Encode context-specific explicit tag
pub(crate) fn der_explicit_context(tag: u8, contents: &[u8]) -> Vec<u8> {
    der_tlv(0xA0 | tag, contents)
}

/// Encode context-specific implicit primitive tag
#[cfg_attr(not(any(test, feature = "test-util")), allow(dead_code))]
pub(crate) fn der_implicit_context(tag: u8, contents: &[u8]) -> Vec<u8> {
    der_tlv(0x80 | tag, contents)
}

/// Encode Tag-Length-Value
pub(crate) fn der_tlv(tag: u8, contents: &[u8]) -> Vec<u8> {
    let mut result = vec![tag];
    result.extend_from_slice(&der_length(contents.len()));
    result.extend_from_slice(contents);
    result
}

/// Encode DER length
fn der_length(length: usize) -> Vec<u8> {
    if length < 128 {
        vec![length as u8]
    } else {
        let mut length_bytes = Vec::new();
        let mut len = length;
        while len > 0 {
            length_bytes.insert(0, (len & 0xFF) as u8);
            len >>= 8;
        }
        let mut result = vec![0x80 | length_bytes.len() as u8];
        result.extend_from_slice(&length_bytes);
        result
    }
}

/// Encode value in base-128 (for OID components)
fn encode_base128(mut value: u64) -> Vec<u8> {
    let mut result = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        result.insert(0, (value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    result
}

// ============================================================================
// Decoding
// ============================================================================

/// One decoded element: header facts, content octets and the full encoding
#[derive(Debug, Clone, Copy)]
pub(crate) struct Tlv<'a> {
    pub class: Class,
    pub tag: u32,
    pub content: &'a [u8],
    pub raw: &'a [u8],
}

/// Read one element from the front of `input`
pub(crate) fn read_tlv(input: &[u8]) -> Result<(Tlv<'_>, &[u8]), RevocationError> {
    let (rest, any) = Any::from_der(input)
        .map_err(|e| RevocationError::MalformedResponse(format!("DER decode failed: {:?}", e)))?;
    let raw = &input[..input.len() - rest.len()];
    let tlv = Tlv {
        class: any.header.class(),
        tag: any.header.tag().0,
        content: any.data,
        raw,
    };
    Ok((tlv, rest))
}

/// Read exactly one element, rejecting trailing bytes
pub(crate) fn read_single(input: &[u8]) -> Result<Tlv<'_>, RevocationError> {
    let (tlv, rest) = read_tlv(input)?;
    if !rest.is_empty() {
        return Err(RevocationError::MalformedResponse(format!(
            "{} trailing bytes after DER element",
            rest.len()
        )));
    }
    Ok(tlv)
}

impl<'a> Tlv<'a> {
    pub fn is_universal(&self, tag: Tag) -> bool {
        self.class == Class::Universal && self.tag == tag.0
    }

    pub fn is_context(&self, number: u32) -> bool {
        self.class == Class::ContextSpecific && self.tag == number
    }

    /// Require a universal tag, naming the field in the error
    pub fn expect(self, tag: Tag, field: &str) -> Result<Self, RevocationError> {
        if self.is_universal(tag) {
            Ok(self)
        } else {
            Err(RevocationError::MalformedResponse(format!(
                "{} has unexpected tag {:?}/{}",
                field, self.class, self.tag
            )))
        }
    }

    /// Decode the content octets as a list of elements
    pub fn children(&self) -> Result<Vec<Tlv<'a>>, RevocationError> {
        let mut items = Vec::new();
        let mut input = self.content;
        while !input.is_empty() {
            let (item, rest) = read_tlv(input)?;
            items.push(item);
            input = rest;
        }
        Ok(items)
    }

    /// Dotted-decimal form of an OBJECT IDENTIFIER
    pub fn oid_string(&self) -> Result<String, RevocationError> {
        if !self.is_universal(Tag::Oid) {
            return Err(RevocationError::MalformedResponse(
                "expected OBJECT IDENTIFIER".to_string(),
            ));
        }
        Ok(Oid::new(Cow::Borrowed(self.content)).to_id_string())
    }

    /// Content of a BIT STRING without the unused-bits octet
    pub fn bit_string(&self) -> Result<&'a [u8], RevocationError> {
        match self.content.split_first() {
            Some((&0, bits)) if self.is_universal(Tag::BitString) => Ok(bits),
            _ => Err(RevocationError::MalformedResponse(
                "expected BIT STRING with no unused bits".to_string(),
            )),
        }
    }

    pub fn generalized_time(&self) -> Result<DateTime<Utc>, RevocationError> {
        if !self.is_universal(Tag::GeneralizedTime) {
            return Err(RevocationError::MalformedResponse(
                "expected GeneralizedTime".to_string(),
            ));
        }
        let text = std::str::from_utf8(self.content).map_err(|_| {
            RevocationError::MalformedResponse("GeneralizedTime is not ASCII".to_string())
        })?;
        parse_generalized_time(text)
    }
}

/// Parse ASN.1 GeneralizedTime
///
/// GeneralizedTime format: YYYYMMDDHHMMSS[.fff]Z
pub(crate) fn parse_generalized_time(time_str: &str) -> Result<DateTime<Utc>, RevocationError> {
    NaiveDateTime::parse_from_str(time_str, "%Y%m%d%H%M%SZ")
        .or_else(|_| NaiveDateTime::parse_from_str(time_str, "%Y%m%d%H%M%S%.fZ"))
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            RevocationError::MalformedResponse(format!(
                "Failed to parse GeneralizedTime '{}': {}",
                time_str, e
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_length_forms() {
        assert_eq!(der_length(5), vec![0x05]);
        assert_eq!(der_length(200), vec![0x81, 0xC8]);
        assert_eq!(der_length(0x1234), vec![0x82, 0x12, 0x34]);
    }

    #[test]
    fn test_oid_encoding() {
        // id-pkix-ocsp-basic
        assert_eq!(
            der_oid(&[1, 3, 6, 1, 5, 5, 7, 48, 1, 1]),
            vec![0x06, 0x09, 0x2B, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x01, 0x01]
        );
        // sha256: 2.16.840.1.101.3.4.2.1
        let encoded = der_oid(&[2, 16, 840, 1, 101, 3, 4, 2, 1]);
        let tlv = read_single(&encoded).unwrap();
        assert_eq!(tlv.oid_string().unwrap(), "2.16.840.1.101.3.4.2.1");
    }

    #[test]
    fn test_integer_sign_padding() {
        assert_eq!(der_integer(&[0x7F]), vec![0x02, 0x01, 0x7F]);
        assert_eq!(der_integer(&[0x80]), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(der_integer(&[]), vec![0x02, 0x01, 0x00]);
    }

    #[test]
    fn test_nested_structure_keeps_raw_encoding() {
        let inner = der_sequence(&der_null());
        let outer = der_sequence(&[inner.clone(), der_octet_string(b"hi")].concat());

        let tlv = read_single(&outer).unwrap();
        assert!(tlv.is_universal(Tag::Sequence));
        let children = tlv.children().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].raw, inner.as_slice());
        assert_eq!(children[1].content, b"hi");
    }

    #[test]
    fn test_context_tags() {
        let explicit = der_explicit_context(1, &der_null());
        let implicit = der_implicit_context(2, &[]);
        assert!(read_single(&explicit).unwrap().is_context(1));
        assert!(read_single(&implicit).unwrap().is_context(2));
        assert!(!read_single(&implicit).unwrap().is_context(1));
    }

    #[test]
    fn test_generalized_time() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let tlv_bytes = der_generalized_time(at);
        assert_eq!(&tlv_bytes[2..], b"20260304050607Z");
        assert_eq!(read_single(&tlv_bytes).unwrap().generalized_time().unwrap(), at);

        let fractional = parse_generalized_time("20260304050607.250Z").unwrap();
        assert_eq!(fractional.timestamp(), at.timestamp());
        assert!(parse_generalized_time("yesterday").is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = der_null();
        bytes.push(0x00);
        assert!(read_single(&bytes).is_err());
        assert!(read_tlv(&[0x30, 0x05, 0x01]).is_err());
    }
}
