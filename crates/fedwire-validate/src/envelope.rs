//! # Envelope Structure Checks
//!
//! Cheap structural checks on a parsed [`Envelope`] that run before any
//! key is resolved or any signature verified. They reject containers that
//! cannot possibly verify, so a peer cannot make the engine perform key
//! lookups for obviously broken input.
//!
//! These checks never accept anything the envelope engine would reject; a
//! passing envelope still goes through full verification.

use fedwire_core::{ProtocolId, SignatureAlgorithm, ValidationError};
use fedwire_crypto::sealed::{TAG_SIZE, WRAPPED_KEY_SIZE};
use fedwire_crypto::ED25519_SIGNATURE_LENGTH;
use fedwire_envelope::{EncryptedPayload, Envelope, EnvelopeBody, SignedPayload};

/// Check the structure of a parsed envelope.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidValue`] naming the offending part.
pub fn validate_envelope(envelope: &Envelope) -> Result<(), ValidationError> {
    let protocol = envelope.protocol();
    match envelope.body() {
        EnvelopeBody::Plain { payload } => check_payload(protocol, payload),
        EnvelopeBody::Signed(signed) => check_signed(protocol, signed),
        EnvelopeBody::Encrypted(encrypted) => check_encrypted(encrypted),
    }
}

fn check_signed(protocol: ProtocolId, signed: &SignedPayload) -> Result<(), ValidationError> {
    check_payload(protocol, &signed.payload)?;
    let signature = &signed.signature;
    if signature.algorithm == SignatureAlgorithm::Ed25519 && signature.bytes.len() != ED25519_SIGNATURE_LENGTH {
        return Err(ValidationError::invalid(
            "signature",
            format!(
                "Ed25519 signature must be {ED25519_SIGNATURE_LENGTH} bytes, got {}",
                signature.bytes.len()
            ),
        ));
    }
    Ok(())
}

fn check_encrypted(encrypted: &EncryptedPayload) -> Result<(), ValidationError> {
    let sealed = &encrypted.sealed;
    if sealed.header.wrapped_key.len() != WRAPPED_KEY_SIZE {
        return Err(ValidationError::invalid(
            "wrapped_key",
            format!(
                "expected {WRAPPED_KEY_SIZE} bytes, got {}",
                sealed.header.wrapped_key.len()
            ),
        ));
    }
    if sealed.ciphertext.len() <= TAG_SIZE {
        return Err(ValidationError::invalid("ciphertext", "shorter than an authentication tag"));
    }
    Ok(())
}

fn check_payload(protocol: ProtocolId, payload: &[u8]) -> Result<(), ValidationError> {
    let first = payload.iter().copied().find(|b| !b.is_ascii_whitespace());
    let expected = match protocol {
        ProtocolId::XmlProtocol => b'<',
        ProtocolId::JsonLdProtocol => b'{',
    };
    match first {
        None => Err(ValidationError::invalid("payload", "empty")),
        Some(b) if b == expected => Ok(()),
        Some(_) => Err(ValidationError::invalid(
            "payload",
            format!("does not look like a {protocol} document"),
        )),
    }
}
