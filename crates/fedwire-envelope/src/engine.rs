//! # Envelope Engine
//!
//! `wrap` drives the outbound lifecycle in [`crate::lifecycle`] for a
//! requested mode. `unwrap` runs the inbound path:
//!
//! ```text
//! WireReady ──open()──▶ Decrypted (signed-encrypted only)
//!           ──verify()──▶ SignatureVerified ──▶ PayloadExtracted
//! ```
//!
//! ## Security Invariant
//!
//! - A signed payload is verified over its canonical form, and the payload
//!   bytes must already BE that canonical form. Any change to the signed
//!   bytes therefore fails with `SignatureInvalid`, whether or not it
//!   survives canonicalization.
//! - Plain envelopes are refused with `SignatureRequired` unless the caller
//!   opts in for that call.
//! - Verification is a pure function of the envelope and the resolved
//!   public key. Lookup failures are returned as `KeyNotFound` and never
//!   retried.

use fedwire_core::{
    canonicalize_payload, EngineConfig, EnvelopeError, EnvelopeMode, ProtocolId, XmlLimits,
};
use fedwire_crypto::{open, Ed25519Signature};

use crate::envelope::{
    seal_aad, signing_input, EncryptedPayload, Envelope, EnvelopeBody, OpenedEnvelope, SignedPayload,
};
use crate::keys::{KeyResolver, Recipient, RecipientSecret, SenderKey};
use crate::lifecycle::Outbound;
use crate::wire;

/// Keys used to wrap one outbound payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct WrapKeys<'a> {
    /// Signing key; required for `signed` and `signed-encrypted`.
    pub sender: Option<&'a SenderKey>,
    /// Recipient; required for `signed-encrypted`.
    pub recipient: Option<&'a Recipient>,
}

impl<'a> WrapKeys<'a> {
    /// Keys for a signed envelope.
    pub fn signed(sender: &'a SenderKey) -> Self {
        Self {
            sender: Some(sender),
            recipient: None,
        }
    }

    /// Keys for a signed-encrypted envelope.
    pub fn sealed(sender: &'a SenderKey, recipient: &'a Recipient) -> Self {
        Self {
            sender: Some(sender),
            recipient: Some(recipient),
        }
    }
}

/// Per-call unwrap policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnwrapOptions<'a> {
    /// Accept unsigned envelopes from legacy senders.
    pub accept_plain: bool,
    /// Key pair for opening envelopes sealed to this node.
    pub recipient: Option<&'a RecipientSecret>,
}

impl<'a> UnwrapOptions<'a> {
    /// Builder: accept plain envelopes.
    pub fn accept_plain(mut self, accept: bool) -> Self {
        self.accept_plain = accept;
        self
    }

    /// Builder: open sealed envelopes with `recipient`.
    pub fn with_recipient(mut self, recipient: &'a RecipientSecret) -> Self {
        self.recipient = Some(recipient);
        self
    }
}

/// Wraps and unwraps envelopes under one configuration.
#[derive(Debug, Clone)]
pub struct EnvelopeEngine {
    limits: XmlLimits,
    accept_plain_inbound: bool,
    allow_plain_outbound: bool,
}

impl EnvelopeEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            limits: config.xml_limits(),
            accept_plain_inbound: config.accept_plain_inbound,
            allow_plain_outbound: config.allow_plain_outbound,
        }
    }

    /// Unwrap options seeded from the configured plain-mode default.
    pub fn unwrap_options(&self) -> UnwrapOptions<'static> {
        UnwrapOptions {
            accept_plain: self.accept_plain_inbound,
            recipient: None,
        }
    }

    /// Canonicalize `payload` and wrap it in an envelope of `mode`.
    ///
    /// # Errors
    ///
    /// - [`EnvelopeError::KeyError`] if a key the mode needs is missing or
    ///   unusable.
    /// - [`EnvelopeError::SignatureRequired`] for `plain` unless plain
    ///   outbound envelopes are enabled in the configuration.
    /// - [`EnvelopeError::Canonicalization`] if the payload is not
    ///   well-formed.
    pub fn wrap(
        &self,
        protocol: ProtocolId,
        payload: &[u8],
        mode: EnvelopeMode,
        keys: WrapKeys<'_>,
    ) -> Result<Envelope, EnvelopeError> {
        if mode == EnvelopeMode::Plain && !self.allow_plain_outbound {
            return Err(EnvelopeError::SignatureRequired { protocol });
        }
        let canonical = Outbound::new(protocol, payload).canonicalize(&self.limits)?;
        let envelope = match mode {
            EnvelopeMode::Plain => canonical.into_plain(),
            EnvelopeMode::Signed => canonical.sign(require_sender(keys, mode)?).finish(),
            EnvelopeMode::SignedEncrypted => {
                let sender = require_sender(keys, mode)?;
                let recipient = keys
                    .recipient
                    .ok_or_else(|| EnvelopeError::KeyError(format!("{mode} envelopes need a recipient key")))?;
                canonical.sign(sender).encrypt(recipient)?.finish()
            }
        };
        tracing::debug!(protocol = %protocol, mode = %mode, "envelope wrapped");
        Ok(envelope)
    }

    /// Parse envelope wire bytes under this engine's XML limits.
    pub fn parse(&self, protocol: ProtocolId, bytes: &[u8]) -> Result<Envelope, EnvelopeError> {
        wire::decode(protocol, bytes, &self.limits)
    }

    /// Open and verify an envelope, returning its payload.
    ///
    /// # Errors
    ///
    /// - [`EnvelopeError::SignatureRequired`] for a plain envelope without
    ///   the opt-in.
    /// - [`EnvelopeError::UnsupportedAlgorithm`] for non-Ed25519 signatures.
    /// - [`EnvelopeError::KeyNotFound`] if the resolver fails.
    /// - [`EnvelopeError::SignatureInvalid`] if the payload is not canonical
    ///   or the signature does not verify.
    /// - [`EnvelopeError::KeyError`] / [`EnvelopeError::DecryptionFailed`]
    ///   for sealed envelopes without a usable recipient key.
    pub fn unwrap<R>(
        &self,
        envelope: &Envelope,
        resolver: &R,
        options: UnwrapOptions<'_>,
    ) -> Result<OpenedEnvelope, EnvelopeError>
    where
        R: KeyResolver + ?Sized,
    {
        let protocol = envelope.protocol();
        match envelope.body() {
            EnvelopeBody::Plain { payload } => {
                if !options.accept_plain {
                    return Err(EnvelopeError::SignatureRequired { protocol });
                }
                tracing::warn!(protocol = %protocol, "accepting unsigned envelope under plain-mode opt-in");
                Ok(OpenedEnvelope {
                    protocol,
                    mode: EnvelopeMode::Plain,
                    payload: payload.clone(),
                    signer: None,
                })
            }
            EnvelopeBody::Signed(signed) => self.verify_signed(protocol, EnvelopeMode::Signed, signed, resolver),
            EnvelopeBody::Encrypted(encrypted) => {
                let inner = self.open_sealed(protocol, encrypted, options.recipient)?;
                self.verify_signed(protocol, EnvelopeMode::SignedEncrypted, &inner, resolver)
            }
        }
    }

    fn open_sealed(
        &self,
        protocol: ProtocolId,
        encrypted: &EncryptedPayload,
        recipient: Option<&RecipientSecret>,
    ) -> Result<SignedPayload, EnvelopeError> {
        let recipient = recipient.ok_or_else(|| {
            EnvelopeError::KeyError("signed-encrypted envelope received without a recipient key".into())
        })?;
        let failed = |reason: String| {
            tracing::warn!(protocol = %protocol, recipient = %encrypted.recipient, reason = %reason, "decryption failed");
            EnvelopeError::DecryptionFailed { protocol, reason }
        };
        if encrypted.recipient != *recipient.key_id() {
            return Err(failed(format!("envelope is sealed to {}", encrypted.recipient)));
        }
        let plaintext = open(&encrypted.sealed, recipient.key_pair(), &seal_aad(protocol, &encrypted.recipient))
            .map_err(|e| failed(e.to_string()))?;
        match wire::decode(protocol, &plaintext, &self.limits)?.into_body() {
            EnvelopeBody::Signed(signed) => Ok(signed),
            EnvelopeBody::Plain { .. } | EnvelopeBody::Encrypted(_) => Err(wire::malformed(
                protocol,
                "sealed unit is not a signed envelope",
            )),
        }
    }

    fn verify_signed<R>(
        &self,
        protocol: ProtocolId,
        mode: EnvelopeMode,
        signed: &SignedPayload,
        resolver: &R,
    ) -> Result<OpenedEnvelope, EnvelopeError>
    where
        R: KeyResolver + ?Sized,
    {
        let algorithm = signed.signature.algorithm;
        if !algorithm.is_supported() {
            return Err(EnvelopeError::UnsupportedAlgorithm {
                protocol,
                algorithm: algorithm.to_string(),
            });
        }
        let invalid = |reason: String| {
            tracing::warn!(
                protocol = %protocol,
                mode = %mode,
                key_id = %signed.key_id,
                reason = %reason,
                "envelope signature rejected"
            );
            EnvelopeError::SignatureInvalid { protocol, mode, reason }
        };

        let canonical = canonicalize_payload(protocol, &signed.payload, &self.limits)
            .map_err(|e| invalid(format!("payload cannot be canonicalized: {e}")))?;
        if canonical.as_bytes() != signed.payload.as_slice() {
            return Err(invalid("payload is not in canonical form".into()));
        }
        let key = resolver
            .resolve(&signed.key_id)
            .map_err(|e| e.into_envelope_error(&signed.key_id))?;
        let signature = Ed25519Signature::from_tagged(&signed.signature).map_err(|e| invalid(e.to_string()))?;
        key.verify(&signing_input(protocol, &canonical), &signature)
            .map_err(|e| invalid(e.to_string()))?;

        tracing::debug!(protocol = %protocol, mode = %mode, key_id = %signed.key_id, "envelope signature verified");
        Ok(OpenedEnvelope {
            protocol,
            mode,
            payload: canonical.into_bytes(),
            signer: Some(signed.key_id.clone()),
        })
    }
}

impl Default for EnvelopeEngine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

fn require_sender<'a>(keys: WrapKeys<'a>, mode: EnvelopeMode) -> Result<&'a SenderKey, EnvelopeError> {
    keys.sender
        .ok_or_else(|| EnvelopeError::KeyError(format!("{mode} envelopes need a sender signing key")))
}
