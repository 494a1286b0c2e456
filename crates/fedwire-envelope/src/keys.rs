//! # Key Material and Key Resolution
//!
//! Senders sign with a [`SenderKey`], a signing key bound to the key id
//! peers will resolve it under. Encrypted envelopes are sealed to a
//! [`Recipient`] and opened with the matching [`RecipientSecret`].
//!
//! Public keys of remote senders come from the discovery collaborator
//! through the [`KeyResolver`] trait. Any closure
//! `Fn(&KeyId) -> Result<VerifyingKey, KeyLookupError>` is a resolver, and
//! [`StaticKeyResolver`] serves keys from a fixed map.
//!
//! ## Security Invariant
//!
//! Resolution failures of every kind surface as
//! [`EnvelopeError::KeyNotFound`]. The engine never retries a lookup and
//! never falls back to another key.

use std::collections::HashMap;

use fedwire_core::{CanonicalBytes, EnvelopeError, KeyId, TaggedSignature};
use fedwire_crypto::{RecipientKeyPair, RecipientPublicKey, SigningKey, VerifyingKey};
use thiserror::Error;
use zeroize::Zeroizing;

/// Why the key lookup collaborator could not produce a key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyLookupError {
    /// No key is published under the id.
    #[error("no key is published under this id")]
    NotFound,

    /// The key source could not be reached or answered with garbage.
    #[error("key source unavailable: {0}")]
    Unavailable(String),

    /// The lookup did not finish within the caller's deadline.
    #[error("key lookup timed out")]
    TimedOut,
}

impl KeyLookupError {
    pub(crate) fn into_envelope_error(self, key_id: &KeyId) -> EnvelopeError {
        EnvelopeError::KeyNotFound {
            key_id: key_id.to_string(),
            reason: self.to_string(),
        }
    }
}

/// Resolves a key id to the sender's Ed25519 public key.
pub trait KeyResolver {
    /// Look up the public key published under `key_id`.
    fn resolve(&self, key_id: &KeyId) -> Result<VerifyingKey, KeyLookupError>;
}

impl<F> KeyResolver for F
where
    F: Fn(&KeyId) -> Result<VerifyingKey, KeyLookupError>,
{
    fn resolve(&self, key_id: &KeyId) -> Result<VerifyingKey, KeyLookupError> {
        self(key_id)
    }
}

/// A resolver backed by a fixed map of key ids.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyResolver {
    keys: HashMap<KeyId, VerifyingKey>,
}

impl StaticKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` under `key_id`, replacing any previous key.
    pub fn insert(&mut self, key_id: KeyId, key: VerifyingKey) -> Option<VerifyingKey> {
        self.keys.insert(key_id, key)
    }

    /// Builder form of [`StaticKeyResolver::insert`].
    pub fn with_key(mut self, key_id: KeyId, key: VerifyingKey) -> Self {
        self.keys.insert(key_id, key);
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyResolver for StaticKeyResolver {
    fn resolve(&self, key_id: &KeyId) -> Result<VerifyingKey, KeyLookupError> {
        self.keys.get(key_id).copied().ok_or(KeyLookupError::NotFound)
    }
}

impl FromIterator<(KeyId, VerifyingKey)> for StaticKeyResolver {
    fn from_iter<I: IntoIterator<Item = (KeyId, VerifyingKey)>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

// ─── Sender ─────────────────────────────────────────────────────────

/// A signing key together with the key id it is published under.
#[derive(Debug)]
pub struct SenderKey {
    key_id: KeyId,
    signing_key: SigningKey,
}

impl SenderKey {
    pub fn new(key_id: KeyId, signing_key: SigningKey) -> Self {
        Self { key_id, signing_key }
    }

    /// A fresh random key.
    pub fn generate(key_id: KeyId) -> Self {
        Self::new(key_id, SigningKey::generate())
    }

    /// Restore a key from its 32-byte Ed25519 seed.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::KeyError`] if `seed` is not 32 bytes long.
    pub fn from_seed_bytes(key_id: KeyId, seed: &[u8]) -> Result<Self, EnvelopeError> {
        let seed: Zeroizing<[u8; 32]> = Zeroizing::new(seed.try_into().map_err(|_| {
            EnvelopeError::KeyError(format!("Ed25519 seed must be 32 bytes, got {}", seed.len()))
        })?);
        Ok(Self::new(key_id, SigningKey::from_seed(&seed)))
    }

    /// Restore a key from a hex-encoded 32-byte seed.
    pub fn from_seed_hex(key_id: KeyId, seed_hex: &str) -> Result<Self, EnvelopeError> {
        let bytes = Zeroizing::new(
            hex::decode(seed_hex.trim()).map_err(|_| EnvelopeError::KeyError("Ed25519 seed is not valid hex".into()))?,
        );
        Self::from_seed_bytes(key_id, &bytes)
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    /// The public key peers resolve for [`SenderKey::key_id`].
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub(crate) fn sign(&self, data: &CanonicalBytes) -> TaggedSignature {
        self.signing_key.sign(data).to_tagged()
    }
}

// ─── Recipient ──────────────────────────────────────────────────────

/// The public encryption key of the single recipient of a sealed envelope.
#[derive(Debug, Clone)]
pub struct Recipient {
    key_id: KeyId,
    public_key: RecipientPublicKey,
}

impl Recipient {
    pub fn new(key_id: KeyId, public_key: RecipientPublicKey) -> Self {
        Self { key_id, public_key }
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    pub fn public_key(&self) -> &RecipientPublicKey {
        &self.public_key
    }
}

/// A recipient's own key pair, used to open envelopes sealed to it.
#[derive(Debug)]
pub struct RecipientSecret {
    key_id: KeyId,
    key_pair: RecipientKeyPair,
}

impl RecipientSecret {
    pub fn new(key_id: KeyId, key_pair: RecipientKeyPair) -> Self {
        Self { key_id, key_pair }
    }

    /// A fresh random key pair.
    pub fn generate(key_id: KeyId) -> Self {
        Self::new(key_id, RecipientKeyPair::generate())
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    pub fn key_pair(&self) -> &RecipientKeyPair {
        &self.key_pair
    }

    /// The public half, as a sender addresses it.
    pub fn recipient(&self) -> Recipient {
        Recipient::new(self.key_id.clone(), self.key_pair.public_key())
    }
}
