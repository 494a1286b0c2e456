//! # Outbound Envelope Lifecycle
//!
//! Builds an outbound envelope with the typestate pattern. Each stage is a
//! distinct type, and each transition consumes the previous stage.
//!
//! ## States
//!
//! - `Unwrapped` → raw payload bytes from a codec.
//! - `Canonicalized` → payload re-serialized by the protocol's
//!   canonicalization procedure.
//! - `Signed` → sender signature computed over the canonical form.
//! - `Encrypted` → the signed envelope sealed to a recipient.
//!
//! ## Allowed Transitions
//!
//! ```text
//! Unwrapped ──canonicalize()──▶ Canonicalized ──sign()──▶ Signed ──encrypt()──▶ Encrypted
//!                                    │                       │                      │
//!                               into_plain()             finish()               finish()
//!                                    ▼                       ▼                      ▼
//!                                 Envelope               Envelope               Envelope
//! ```
//!
//! ## Security Invariant
//!
//! Only canonical bytes reach the signer: `sign()` exists on
//! `Outbound<Canonicalized>` alone. Encryption always seals a signed
//! envelope, because `encrypt()` exists on `Outbound<Signed>` alone. An
//! unsigned envelope is produced only through the explicit `into_plain()`
//! exit, which the engine gates on configuration.
//!
//! ## Compile-Time Safety Example
//!
//! The following code will NOT compile because `Outbound<Canonicalized>`
//! has no `.encrypt()` method:
//!
//! ```compile_fail
//! use fedwire_core::{KeyId, ProtocolId, XmlLimits};
//! use fedwire_crypto::RecipientKeyPair;
//! use fedwire_envelope::keys::Recipient;
//! use fedwire_envelope::lifecycle::Outbound;
//!
//! let recipient = Recipient::new(
//!     KeyId::new("bob@example.org").unwrap(),
//!     RecipientKeyPair::generate().public_key(),
//! );
//! let canonical = Outbound::new(ProtocolId::JsonLdProtocol, br#"{"a":1}"#.to_vec())
//!     .canonicalize(&XmlLimits::default())
//!     .unwrap();
//! // ERROR: no method named `encrypt` found for `Outbound<Canonicalized>`
//! let _sealed = canonical.encrypt(&recipient);
//! ```

use fedwire_core::{canonicalize_payload, CanonicalBytes, EnvelopeError, ProtocolId, XmlLimits};
use fedwire_crypto::seal;

use crate::envelope::{
    seal_aad, signing_input, EncryptedPayload, Envelope, EnvelopeBody, SignedPayload,
};
use crate::keys::{Recipient, SenderKey};
use crate::wire;

// ─── State Types ─────────────────────────────────────────────────────

/// Outbound state: payload as produced by a codec.
#[derive(Debug, Clone)]
pub struct Unwrapped {
    payload: Vec<u8>,
}

/// Outbound state: payload in canonical form.
#[derive(Debug, Clone)]
pub struct Canonicalized {
    canonical: CanonicalBytes,
}

/// Outbound state: canonical payload with the sender's signature.
#[derive(Debug, Clone)]
pub struct Signed {
    signed: SignedPayload,
}

/// Outbound state: signed envelope sealed to one recipient.
#[derive(Debug, Clone)]
pub struct Encrypted {
    encrypted: EncryptedPayload,
}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Unwrapped {}
    impl Sealed for super::Canonicalized {}
    impl Sealed for super::Signed {}
    impl Sealed for super::Encrypted {}
}

/// Marker trait for the outbound lifecycle states.
///
/// Sealed: only the four states defined in this module implement it.
pub trait OutboundState: private::Sealed + std::fmt::Debug {
    /// Name of the state, for logs.
    fn name() -> &'static str;
}

impl OutboundState for Unwrapped {
    fn name() -> &'static str {
        "unwrapped"
    }
}

impl OutboundState for Canonicalized {
    fn name() -> &'static str {
        "canonicalized"
    }
}

impl OutboundState for Signed {
    fn name() -> &'static str {
        "signed"
    }
}

impl OutboundState for Encrypted {
    fn name() -> &'static str {
        "encrypted"
    }
}

/// An outbound message at lifecycle stage `S`.
#[derive(Debug, Clone)]
pub struct Outbound<S: OutboundState> {
    protocol: ProtocolId,
    state: S,
}

impl<S: OutboundState> Outbound<S> {
    pub fn protocol(&self) -> ProtocolId {
        self.protocol
    }

    pub fn state_name(&self) -> &'static str {
        S::name()
    }
}

// ─── State-Specific Impl Blocks ─────────────────────────────────────

impl Outbound<Unwrapped> {
    /// Start the lifecycle with a codec-produced payload.
    pub fn new(protocol: ProtocolId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            protocol,
            state: Unwrapped {
                payload: payload.into(),
            },
        }
    }

    /// Re-serialize the payload canonically (UNWRAPPED → CANONICALIZED).
    ///
    /// JSON-LD payloads must be JSON objects without a top-level
    /// `signature` member, since the envelope embeds its signature there.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Canonicalization`] if the payload is not
    /// well-formed in the protocol's syntax, and
    /// [`EnvelopeError::MalformedEnvelope`] for a JSON-LD payload that
    /// cannot carry an embedded signature.
    pub fn canonicalize(self, limits: &XmlLimits) -> Result<Outbound<Canonicalized>, EnvelopeError> {
        let canonical = canonicalize_payload(self.protocol, &self.state.payload, limits).map_err(|source| {
            EnvelopeError::Canonicalization {
                protocol: self.protocol,
                source,
            }
        })?;
        if self.protocol == ProtocolId::JsonLdProtocol {
            wire::jsonld::check_signable(&canonical)?;
        }
        Ok(Outbound {
            protocol: self.protocol,
            state: Canonicalized { canonical },
        })
    }
}

impl Outbound<Canonicalized> {
    pub fn canonical(&self) -> &CanonicalBytes {
        &self.state.canonical
    }

    /// Sign the canonical payload (CANONICALIZED → SIGNED).
    pub fn sign(self, sender: &SenderKey) -> Outbound<Signed> {
        let signature = sender.sign(&signing_input(self.protocol, &self.state.canonical));
        tracing::debug!(
            protocol = %self.protocol,
            key_id = %sender.key_id(),
            bytes = self.state.canonical.len(),
            "payload signed"
        );
        Outbound {
            protocol: self.protocol,
            state: Signed {
                signed: SignedPayload {
                    payload: self.state.canonical.into_bytes(),
                    key_id: sender.key_id().clone(),
                    signature,
                },
            },
        }
    }

    /// Leave the lifecycle without a signature.
    pub fn into_plain(self) -> Envelope {
        Envelope::new(
            self.protocol,
            EnvelopeBody::Plain {
                payload: self.state.canonical.into_bytes(),
            },
        )
    }
}

impl Outbound<Signed> {
    /// Seal the signed envelope to `recipient` (SIGNED → ENCRYPTED).
    ///
    /// The sealed unit is the complete signed envelope in wire form, so
    /// the recipient verifies the signature after opening it.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::KeyError`] if the recipient key is unusable.
    pub fn encrypt(self, recipient: &Recipient) -> Result<Outbound<Encrypted>, EnvelopeError> {
        let inner = Envelope::new(self.protocol, EnvelopeBody::Signed(self.state.signed));
        let plaintext = wire::encode(&inner)?;
        let sealed = seal(&plaintext, recipient.public_key(), &seal_aad(self.protocol, recipient.key_id()))
            .map_err(|e| EnvelopeError::KeyError(e.to_string()))?;
        Ok(Outbound {
            protocol: self.protocol,
            state: Encrypted {
                encrypted: EncryptedPayload {
                    recipient: recipient.key_id().clone(),
                    sealed,
                },
            },
        })
    }

    pub fn signed(&self) -> &SignedPayload {
        &self.state.signed
    }

    /// The finished signed envelope (SIGNED → WIRE-READY).
    pub fn finish(self) -> Envelope {
        Envelope::new(self.protocol, EnvelopeBody::Signed(self.state.signed))
    }
}

impl Outbound<Encrypted> {
    /// The finished sealed envelope (ENCRYPTED → WIRE-READY).
    pub fn finish(self) -> Envelope {
        Envelope::new(self.protocol, EnvelopeBody::Encrypted(self.state.encrypted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedwire_core::{EnvelopeMode, KeyId};
    use fedwire_crypto::RecipientKeyPair;

    fn sender() -> SenderKey {
        SenderKey::from_seed_bytes(KeyId::new("alice@example.org").unwrap(), &[3u8; 32]).unwrap()
    }

    #[test]
    fn test_state_names_follow_transitions() {
        let outbound = Outbound::new(ProtocolId::JsonLdProtocol, br#"{"b":1,"a":2}"#.to_vec());
        assert_eq!(outbound.state_name(), "unwrapped");
        let canonical = outbound.canonicalize(&XmlLimits::default()).unwrap();
        assert_eq!(canonical.state_name(), "canonicalized");
        assert_eq!(canonical.canonical().as_bytes(), br#"{"a":2,"b":1}"#);
        let signed = canonical.sign(&sender());
        assert_eq!(signed.state_name(), "signed");
        assert_eq!(signed.finish().mode(), EnvelopeMode::Signed);
    }

    #[test]
    fn test_sign_covers_canonical_payload() {
        let signed = Outbound::new(ProtocolId::XmlProtocol, b"<post  b='1' a='2'/>".to_vec())
            .canonicalize(&XmlLimits::default())
            .unwrap()
            .sign(&sender());
        assert_eq!(signed.signed().payload, br#"<post a="2" b="1"></post>"#);
        assert_eq!(signed.signed().key_id.as_str(), "alice@example.org");
        assert_eq!(signed.signed().signature.bytes.len(), 64);
    }

    #[test]
    fn test_malformed_payload_fails_canonicalization() {
        let err = Outbound::new(ProtocolId::XmlProtocol, b"<post>".to_vec())
            .canonicalize(&XmlLimits::default())
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::Canonicalization { .. }));
    }

    #[test]
    fn test_jsonld_payload_must_be_signable_object() {
        for payload in [&br#"[1,2]"#[..], &br#"{"signature":{}}"#[..]] {
            let err = Outbound::new(ProtocolId::JsonLdProtocol, payload.to_vec())
                .canonicalize(&XmlLimits::default())
                .unwrap_err();
            assert!(matches!(err, EnvelopeError::MalformedEnvelope { .. }), "{err:?}");
        }
    }

    #[test]
    fn test_encrypt_seals_signed_envelope() {
        let recipient = Recipient::new(KeyId::new("bob@example.org").unwrap(), RecipientKeyPair::generate().public_key());
        let envelope = Outbound::new(ProtocolId::JsonLdProtocol, br#"{"a":1}"#.to_vec())
            .canonicalize(&XmlLimits::default())
            .unwrap()
            .sign(&sender())
            .encrypt(&recipient)
            .unwrap()
            .finish();
        assert_eq!(envelope.mode(), EnvelopeMode::SignedEncrypted);
        assert_eq!(envelope.sender_key_id(), None);
        assert!(!envelope.inner_payload().windows(5).any(|w| w == br#""a":1"#));
    }
}
