//! # Protocol Detection
//!
//! Identifies the protocol of raw inbound bytes from their structural
//! markers, without parsing them.
//!
//! | Leading marker | Trailing marker | Result |
//! |----------------|-----------------|--------|
//! | `<` + name start, `?` or `!` | `>` | [`ProtocolId::XmlProtocol`] |
//! | `{` | `}` | [`ProtocolId::JsonLdProtocol`] |
//! | `<` | `}` | `AmbiguousFormat` |
//! | `{` | `>` | `AmbiguousFormat` |
//! | anything else | | `UnrecognizedProtocol` |
//!
//! A UTF-8 byte-order mark and surrounding ASCII whitespace are skipped.
//!
//! ## Security Invariant
//!
//! Detection fails closed. Input that carries markers of both protocols is
//! never resolved by guessing, and a caller-supplied hint never overrides
//! what the bytes say.

use fedwire_core::{DispatchError, ProtocolId};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Detect the protocol of `raw`.
///
/// # Errors
///
/// - [`DispatchError::AmbiguousFormat`] when leading and trailing markers
///   belong to different protocols.
/// - [`DispatchError::UnrecognizedProtocol`] for empty input, UTF-16
///   input, JSON arrays or scalars, and anything else without a known
///   leading marker.
pub fn detect_protocol(raw: &[u8]) -> Result<ProtocolId, DispatchError> {
    if raw.starts_with(&[0xFF, 0xFE]) || raw.starts_with(&[0xFE, 0xFF]) {
        return Err(DispatchError::UnrecognizedProtocol("UTF-16 payloads are not supported".into()));
    }
    let body = trim(raw.strip_prefix(UTF8_BOM).unwrap_or(raw));
    let (Some(&first), Some(&last)) = (body.first(), body.last()) else {
        return Err(DispatchError::UnrecognizedProtocol("empty payload".into()));
    };
    match (first, last) {
        (b'<', b'>') => {
            if body.get(1).copied().is_some_and(is_markup_start) {
                Ok(ProtocolId::XmlProtocol)
            } else {
                Err(DispatchError::UnrecognizedProtocol("'<' is not followed by markup".into()))
            }
        }
        (b'{', b'}') => Ok(ProtocolId::JsonLdProtocol),
        (b'<', b'}') | (b'{', b'>') => Err(DispatchError::AmbiguousFormat(format!(
            "payload opens with {:?} and closes with {:?}",
            first as char, last as char
        ))),
        (b'<', _) => Err(DispatchError::UnrecognizedProtocol("XML payload is not closed".into())),
        (b'{', _) => Err(DispatchError::UnrecognizedProtocol("JSON object is not closed".into())),
        (b'[', _) => Err(DispatchError::UnrecognizedProtocol(
            "JSON arrays are not federation payloads".into(),
        )),
        _ => Err(DispatchError::UnrecognizedProtocol(format!(
            "no structural marker at byte {first:#04x}"
        ))),
    }
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// A byte that may follow `<` in a document prolog or root element.
fn is_markup_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || matches!(b, b'_' | b':' | b'?' | b'!') || b >= 0x80
}
