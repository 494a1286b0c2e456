//! Envelope wire formats.
//!
//! - [`xml`]: Salmon magic envelopes, the legacy `<diaspora>` wrapper, and
//!   `<me:encrypted>` sealed envelopes.
//! - [`jsonld`]: documents with an embedded `signature` object, and
//!   `EncryptedEnvelope` documents.
//!
//! A payload document with no envelope markers is read as a plain
//! envelope in either format.

pub mod jsonld;
pub mod xml;

use fedwire_core::encoding::{b64url_decode, b64url_encode};
use fedwire_core::{EnvelopeError, ProtocolId, XmlLimits};
use fedwire_crypto::sealed::{FINGERPRINT_SIZE, NONCE_SIZE};
use fedwire_crypto::SealHeader;

use crate::envelope::Envelope;

/// Serialize an envelope in its protocol's wire format.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, EnvelopeError> {
    match envelope.protocol() {
        ProtocolId::XmlProtocol => Ok(xml::encode(envelope)),
        ProtocolId::JsonLdProtocol => jsonld::encode(envelope),
    }
}

/// Parse envelope wire bytes of a known protocol.
pub fn decode(protocol: ProtocolId, bytes: &[u8], limits: &XmlLimits) -> Result<Envelope, EnvelopeError> {
    match protocol {
        ProtocolId::XmlProtocol => xml::decode(bytes, limits),
        ProtocolId::JsonLdProtocol => jsonld::decode(bytes),
    }
}

/// Seal header fields in a fixed order: ephemeral key, recipient
/// fingerprint, key nonce, wrapped key, payload nonce.
pub(crate) fn header_values(header: &SealHeader) -> [String; 5] {
    [
        b64url_encode(header.ephemeral_public),
        b64url_encode(header.recipient_fingerprint),
        b64url_encode(header.key_nonce),
        b64url_encode(&header.wrapped_key),
        b64url_encode(header.payload_nonce),
    ]
}

/// Rebuild a seal header from its fields, named per wire format in the
/// order of [`header_values`].
pub(crate) fn header_from<'a>(
    protocol: ProtocolId,
    names: [&str; 5],
    lookup: impl Fn(&str) -> Option<&'a str>,
) -> Result<SealHeader, EnvelopeError> {
    let field = |index: usize| -> Result<Vec<u8>, EnvelopeError> {
        let name = names[index];
        let value = lookup(name).ok_or_else(|| malformed(protocol, format!("seal header has no {name}")))?;
        b64url_decode(value).map_err(|_| malformed(protocol, format!("seal header field {name} is not base64url")))
    };
    Ok(SealHeader {
        ephemeral_public: fixed::<32>(protocol, names[0], field(0)?)?,
        recipient_fingerprint: fixed::<FINGERPRINT_SIZE>(protocol, names[1], field(1)?)?,
        key_nonce: fixed::<NONCE_SIZE>(protocol, names[2], field(2)?)?,
        wrapped_key: field(3)?,
        payload_nonce: fixed::<NONCE_SIZE>(protocol, names[4], field(4)?)?,
    })
}

fn fixed<const N: usize>(protocol: ProtocolId, name: &str, bytes: Vec<u8>) -> Result<[u8; N], EnvelopeError> {
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| malformed(protocol, format!("seal header field {name} must be {N} bytes, got {len}")))
}

pub(crate) fn malformed(protocol: ProtocolId, reason: impl Into<String>) -> EnvelopeError {
    EnvelopeError::MalformedEnvelope {
        protocol,
        reason: reason.into(),
    }
}
