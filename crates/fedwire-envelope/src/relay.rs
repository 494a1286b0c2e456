//! # Relay Signatures
//!
//! A [`Relayable`] entity can be forwarded by an actor other than its
//! author. It carries an author signature and, once relayed, a relay
//! signature. Both sign the same protocol-independent input:
//!
//! ```text
//! JCS({"kind": <inner kind>, "entity": to_extension_bag(inner)})
//! ```
//!
//! so a relayable translated between protocols keeps verifiable signatures.
//!
//! ## Security Invariant
//!
//! - Every present signature is verified. A relay signature is never
//!   skipped because it was not expected.
//! - The author signature is mandatory, and its signer must own the inner
//!   entity's author.
//! - A relay signature without an author signature is rejected.

use fedwire_core::{
    to_extension_bag, CanonicalBytes, Entity, EnvelopeError, EnvelopeMode, KeyId, ProtocolId, RelaySignature,
    Relayable,
};
use fedwire_crypto::Ed25519Signature;
use serde_json::json;

use crate::keys::{KeyResolver, SenderKey};

/// Signers of a relayable whose signatures verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayVerification {
    /// Signer of the author signature.
    pub author: KeyId,
    /// Signer of the relay signature, if the entity was relayed.
    pub relay: Option<KeyId>,
}

/// The bytes author and relay signatures cover.
pub fn relay_signing_input(inner: &Entity) -> Result<CanonicalBytes, EnvelopeError> {
    let value = json!({
        "kind": inner.kind().as_str(),
        "entity": to_extension_bag(inner).to_json(),
    });
    CanonicalBytes::from_value(value).map_err(|source| EnvelopeError::RelayCanonicalization {
        kind: inner.kind(),
        source,
    })
}

/// Wrap `inner` as a relayable signed by its author.
///
/// # Errors
///
/// Returns [`EnvelopeError::SenderMismatch`] if `author_key` does not
/// belong to the author of `inner`.
pub fn sign_as_author(inner: Entity, author_key: &SenderKey) -> Result<Relayable, EnvelopeError> {
    if !author_key.key_id().is_owned_by(inner.author()) {
        return Err(EnvelopeError::SenderMismatch {
            sender: author_key.key_id().owner().to_string(),
            author: inner.author().to_string(),
        });
    }
    let input = relay_signing_input(&inner)?;
    let author_signature = RelaySignature {
        signer: author_key.key_id().clone(),
        signature: author_key.sign(&input),
    };
    Ok(Relayable {
        inner: Box::new(inner),
        author_signature: Some(author_signature),
        relay_signature: None,
    })
}

/// Add the signature of the actor relaying `relayable`.
pub fn add_relay_signature(mut relayable: Relayable, relay_key: &SenderKey) -> Result<Relayable, EnvelopeError> {
    let input = relay_signing_input(&relayable.inner)?;
    relayable.relay_signature = Some(RelaySignature {
        signer: relay_key.key_id().clone(),
        signature: relay_key.sign(&input),
    });
    Ok(relayable)
}

/// Verify every signature a relayable carries.
///
/// `protocol` and `mode` describe the envelope the relayable arrived in
/// and only label errors.
///
/// # Errors
///
/// - [`EnvelopeError::SignatureInvalid`] if the author signature is
///   missing, or any present signature fails.
/// - [`EnvelopeError::SenderMismatch`] if the author signer does not own
///   the inner entity.
/// - [`EnvelopeError::UnsupportedAlgorithm`] for non-Ed25519 signatures.
/// - [`EnvelopeError::KeyNotFound`] if a signer's key cannot be resolved.
pub fn verify_relayable<R>(
    relayable: &Relayable,
    resolver: &R,
    protocol: ProtocolId,
    mode: EnvelopeMode,
) -> Result<RelayVerification, EnvelopeError>
where
    R: KeyResolver + ?Sized,
{
    let Some(author_signature) = &relayable.author_signature else {
        let reason = if relayable.relay_signature.is_some() {
            "relay signature present without an author signature"
        } else {
            "relayable carries no author signature"
        };
        tracing::warn!(protocol = %protocol, mode = %mode, reason, "relayable rejected");
        return Err(EnvelopeError::SignatureInvalid {
            protocol,
            mode,
            reason: reason.into(),
        });
    };
    if !author_signature.signer.is_owned_by(relayable.inner.author()) {
        return Err(EnvelopeError::SenderMismatch {
            sender: author_signature.signer.owner().to_string(),
            author: relayable.inner.author().to_string(),
        });
    }

    let input = relay_signing_input(&relayable.inner)?;
    verify_one(author_signature, "author", &input, resolver, protocol, mode)?;
    if let Some(relay_signature) = &relayable.relay_signature {
        verify_one(relay_signature, "relay", &input, resolver, protocol, mode)?;
    }
    Ok(RelayVerification {
        author: author_signature.signer.clone(),
        relay: relayable.relay_signature.as_ref().map(|s| s.signer.clone()),
    })
}

fn verify_one<R>(
    signature: &RelaySignature,
    role: &str,
    input: &CanonicalBytes,
    resolver: &R,
    protocol: ProtocolId,
    mode: EnvelopeMode,
) -> Result<(), EnvelopeError>
where
    R: KeyResolver + ?Sized,
{
    let algorithm = signature.signature.algorithm;
    if !algorithm.is_supported() {
        return Err(EnvelopeError::UnsupportedAlgorithm {
            protocol,
            algorithm: algorithm.to_string(),
        });
    }
    let key = resolver
        .resolve(&signature.signer)
        .map_err(|e| e.into_envelope_error(&signature.signer))?;
    Ed25519Signature::from_tagged(&signature.signature)
        .and_then(|sig| key.verify(input, &sig))
        .map_err(|e| {
            tracing::warn!(
                protocol = %protocol,
                mode = %mode,
                signer = %signature.signer,
                role,
                error = %e,
                "relay signature rejected"
            );
            EnvelopeError::SignatureInvalid {
                protocol,
                mode,
                reason: format!("{role} signature: {e}"),
            }
        })
}
