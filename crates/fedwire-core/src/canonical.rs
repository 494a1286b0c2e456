//! # Canonical Serialization — Signing Input Production
//!
//! This module defines `CanonicalBytes`, the sole construction path for bytes
//! that are signed, verified, or digested anywhere in fedwire.
//!
//! ## Security Invariant
//!
//! The `CanonicalBytes` newtype has a private inner field. Every constructor
//! applies a deterministic canonicalization procedure, so any function that
//! signs or verifies must accept `&CanonicalBytes` and cannot be handed raw,
//! attacker-shaped bytes by mistake.
//!
//! ## Procedures
//!
//! - **JSON / JSON-LD**: RFC 8785 JSON Canonicalization Scheme via
//!   `serde_jcs` (sorted keys, compact separators, ES6 number rendering).
//!   Integers outside ±(2^53 − 1) are rejected: they cannot be rendered
//!   identically by every JSON implementation (I-JSON, RFC 7493).
//! - **XML**: parse into an [`XmlElement`] tree under [`XmlLimits`], then
//!   write the canonical form described in [`crate::xml`].
//! - **Magic signature base**: the Salmon magic-envelope string
//!   `b64url(data).b64url(type).b64url(encoding).b64url(alg)` over an
//!   already canonical payload.

use serde::Serialize;
use serde_json::Value;

use crate::encoding::b64url_encode;
use crate::error::CanonicalizationError;
use crate::protocol::ProtocolId;
use crate::xml::{parse_document, XmlElement, XmlLimits};

/// Largest integer magnitude every JSON implementation round-trips exactly.
const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Bytes produced exclusively by a canonicalization procedure.
///
/// # Invariants
///
/// - Constructors are [`CanonicalBytes::new()`], [`CanonicalBytes::from_value()`],
///   [`CanonicalBytes::from_json_slice()`], [`CanonicalBytes::from_xml()`],
///   [`CanonicalBytes::from_xml_slice()`], and
///   [`CanonicalBytes::magic_signature_base()`].
/// - Canonicalizing the bytes again with the same procedure yields the
///   same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value as JSON.
    ///
    /// # Errors
    ///
    /// Returns `CanonicalizationError::IntegerOutOfRange` for integers beyond
    /// the I-JSON range, `SerializationFailed` if serialization fails.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        Self::from_value(serde_json::to_value(obj)?)
    }

    /// Canonicalize a JSON value.
    pub fn from_value(value: Value) -> Result<Self, CanonicalizationError> {
        check_integer_range(&value)?;
        Ok(Self(serde_jcs::to_string(&value)?.into_bytes()))
    }

    /// Parse and canonicalize a JSON document.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, CanonicalizationError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Canonicalize an XML element tree.
    pub fn from_xml(element: &XmlElement) -> Self {
        Self(element.to_canonical_string().into_bytes())
    }

    /// Parse and canonicalize an XML document.
    pub fn from_xml_slice(bytes: &[u8], limits: &XmlLimits) -> Result<Self, CanonicalizationError> {
        let root = parse_document(bytes, limits)?;
        Ok(Self::from_xml(&root))
    }

    /// Build the magic-envelope signature base string over a canonical payload.
    pub fn magic_signature_base(payload: &CanonicalBytes, data_type: &str, encoding: &str, alg: &str) -> Self {
        let base = [
            b64url_encode(payload.as_bytes()),
            b64url_encode(data_type),
            b64url_encode(encoding),
            b64url_encode(alg),
        ]
        .join(".");
        Self(base.into_bytes())
    }

    /// Access the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into the underlying byte vector.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Canonicalize a wire payload with the procedure of its protocol.
pub fn canonicalize_payload(
    protocol: ProtocolId,
    bytes: &[u8],
    limits: &XmlLimits,
) -> Result<CanonicalBytes, CanonicalizationError> {
    match protocol {
        ProtocolId::XmlProtocol => CanonicalBytes::from_xml_slice(bytes, limits),
        ProtocolId::JsonLdProtocol => CanonicalBytes::from_json_slice(bytes),
    }
}

fn check_integer_range(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Number(n) => {
            let in_range = if let Some(i) = n.as_i64() {
                i.unsigned_abs() <= MAX_SAFE_INTEGER
            } else if let Some(u) = n.as_u64() {
                u <= MAX_SAFE_INTEGER
            } else {
                true
            };
            if in_range {
                Ok(())
            } else {
                Err(CanonicalizationError::IntegerOutOfRange(n.to_string()))
            }
        }
        Value::Array(items) => items.iter().try_for_each(check_integer_range),
        Value::Object(map) => map.values().try_for_each(check_integer_range),
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
    }
}
