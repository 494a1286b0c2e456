//! # Hybrid Sealing (X25519 + ChaCha20-Poly1305)
//!
//! Seals an already-signed envelope for a single recipient.
//!
//! ## Construction
//!
//! 1. A fresh 32-byte content key is drawn from the OS RNG for every
//!    message, and the payload is sealed with ChaCha20-Poly1305 under it.
//! 2. An ephemeral X25519 key agrees a shared secret with the recipient's
//!    static key. The key-encryption key is
//!    `SHA-256("fedwire-seal-v1" ‖ shared ‖ ephemeral_pk ‖ recipient_pk)`.
//! 3. The content key is sealed with ChaCha20-Poly1305 under the
//!    key-encryption key.
//!
//! Both AEAD operations take the caller's associated data, which binds the
//! sealed unit to its protocol and recipient key id.
//!
//! ## Security Invariant
//!
//! - Content keys, key-encryption keys and shared secrets live in
//!   `Zeroizing` buffers and are wiped when dropped.
//! - Non-contributory key exchanges (small-order ephemeral points) are
//!   rejected before any decryption is attempted.
//! - Error messages name the failing step, never key material.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Domain separator for key-encryption-key derivation.
const KEK_DOMAIN: &[u8] = b"fedwire-seal-v1";

/// ChaCha20-Poly1305 nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Length of the recipient fingerprint carried in a seal header.
pub const FINGERPRINT_SIZE: usize = 8;

/// Length of the authentication tag appended to every ciphertext.
pub const TAG_SIZE: usize = 16;

/// Length of a wrapped content key: a 32-byte key plus its tag.
pub const WRAPPED_KEY_SIZE: usize = 32 + TAG_SIZE;

/// Everything a recipient needs, besides its secret key, to recover the
/// content key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealHeader {
    /// Sender's ephemeral X25519 public key.
    pub ephemeral_public: [u8; 32],
    /// Leading bytes of SHA-256 of the recipient public key.
    pub recipient_fingerprint: [u8; FINGERPRINT_SIZE],
    /// Nonce for the content-key seal.
    pub key_nonce: [u8; NONCE_SIZE],
    /// The content key, sealed under the key-encryption key.
    pub wrapped_key: Vec<u8>,
    /// Nonce for the payload seal.
    pub payload_nonce: [u8; NONCE_SIZE],
}

/// A sealed payload and its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    pub header: SealHeader,
    /// Payload ciphertext including the authentication tag.
    pub ciphertext: Vec<u8>,
}

/// Public half of a recipient's X25519 key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecipientPublicKey([u8; 32]);

impl RecipientPublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create from a slice of exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short identifier used to detect misaddressed messages.
    pub fn fingerprint(&self) -> [u8; FINGERPRINT_SIZE] {
        let digest = Sha256::digest(self.0);
        let mut out = [0u8; FINGERPRINT_SIZE];
        out.copy_from_slice(&digest[..FINGERPRINT_SIZE]);
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s.trim()).map_err(|e| CryptoError::HexDecode(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl std::fmt::Debug for RecipientPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecipientPublicKey({}...)", hex::encode(&self.0[..4]))
    }
}

/// A recipient's static X25519 key pair. The secret zeroizes on drop.
pub struct RecipientKeyPair {
    secret: StaticSecret,
    public: RecipientPublicKey,
}

impl RecipientKeyPair {
    /// Generate a new key pair from the OS RNG.
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(OsRng))
    }

    /// Restore a key pair from its 32 secret bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self::from_secret(StaticSecret::from(bytes))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = RecipientPublicKey(PublicKey::from(&secret).to_bytes());
        Self { secret, public }
    }

    pub fn public_key(&self) -> RecipientPublicKey {
        self.public
    }
}

impl std::fmt::Debug for RecipientKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecipientKeyPair(<private>, public={:?})", self.public)
    }
}

/// Seal `plaintext` for `recipient`, authenticating `aad`.
pub fn seal(plaintext: &[u8], recipient: &RecipientPublicKey, aad: &[u8]) -> Result<SealedBox, CryptoError> {
    let mut content_key = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(&mut content_key[..]);
    let payload_nonce = random_nonce();
    let ciphertext = ChaCha20Poly1305::new(Key::from_slice(&content_key[..]))
        .encrypt(Nonce::from_slice(&payload_nonce), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::SealFailed("payload encryption failed".into()))?;

    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral).to_bytes();
    let shared = ephemeral.diffie_hellman(&PublicKey::from(recipient.0));
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidPublicKey("recipient key is a low-order point".into()));
    }
    let kek = derive_kek(shared.as_bytes(), &ephemeral_public, &recipient.0);

    let key_nonce = random_nonce();
    let wrapped_key = ChaCha20Poly1305::new(Key::from_slice(&kek[..]))
        .encrypt(
            Nonce::from_slice(&key_nonce),
            Payload {
                msg: &content_key[..],
                aad,
            },
        )
        .map_err(|_| CryptoError::SealFailed("content key wrapping failed".into()))?;

    Ok(SealedBox {
        header: SealHeader {
            ephemeral_public,
            recipient_fingerprint: recipient.fingerprint(),
            key_nonce,
            wrapped_key,
            payload_nonce,
        },
        ciphertext,
    })
}

/// Open a sealed box with the recipient's key pair, authenticating `aad`.
///
/// # Errors
///
/// - [`CryptoError::WrongRecipient`] if the header fingerprint does not
///   match `recipient`.
/// - [`CryptoError::OpenFailed`] if the key exchange is non-contributory or
///   either authentication tag fails (tampering, wrong key, or wrong `aad`).
pub fn open(sealed: &SealedBox, recipient: &RecipientKeyPair, aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let header = &sealed.header;
    let expected = recipient.public.fingerprint();
    if !bool::from(expected[..].ct_eq(&header.recipient_fingerprint[..])) {
        return Err(CryptoError::WrongRecipient);
    }

    let shared = recipient.secret.diffie_hellman(&PublicKey::from(header.ephemeral_public));
    if !shared.was_contributory() {
        return Err(CryptoError::OpenFailed("non-contributory key exchange".into()));
    }
    let kek = derive_kek(shared.as_bytes(), &header.ephemeral_public, &recipient.public.0);

    let content_key = Zeroizing::new(
        ChaCha20Poly1305::new(Key::from_slice(&kek[..]))
            .decrypt(
                Nonce::from_slice(&header.key_nonce),
                Payload {
                    msg: &header.wrapped_key,
                    aad,
                },
            )
            .map_err(|_| CryptoError::OpenFailed("content key authentication failed".into()))?,
    );
    if content_key.len() != 32 {
        return Err(CryptoError::OpenFailed("content key has the wrong length".into()));
    }

    ChaCha20Poly1305::new(Key::from_slice(&content_key[..]))
        .decrypt(
            Nonce::from_slice(&header.payload_nonce),
            Payload {
                msg: &sealed.ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::OpenFailed("payload authentication failed".into()))
}

fn derive_kek(shared: &[u8; 32], ephemeral_public: &[u8; 32], recipient_public: &[u8; 32]) -> Zeroizing<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(KEK_DOMAIN);
    hasher.update(shared);
    hasher.update(ephemeral_public);
    hasher.update(recipient_public);
    Zeroizing::new(hasher.finalize().into())
}

fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    const AAD: &[u8] = b"json-ld|bob@example.org";

    #[test]
    fn test_seal_open_roundtrip() {
        let bob = RecipientKeyPair::generate();
        let sealed = seal(b"signed envelope bytes", &bob.public_key(), AAD).unwrap();
        assert_ne!(sealed.ciphertext, b"signed envelope bytes");
        assert_eq!(open(&sealed, &bob, AAD).unwrap(), b"signed envelope bytes");
    }

    #[test]
    fn test_fresh_key_per_message() {
        let bob = RecipientKeyPair::generate();
        let a = seal(b"same", &bob.public_key(), AAD).unwrap();
        let b = seal(b"same", &bob.public_key(), AAD).unwrap();
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_ne!(a.header.ephemeral_public, b.header.ephemeral_public);
    }

    #[test]
    fn test_wrong_recipient() {
        let bob = RecipientKeyPair::generate();
        let eve = RecipientKeyPair::generate();
        let sealed = seal(b"secret", &bob.public_key(), AAD).unwrap();
        assert_eq!(open(&sealed, &eve, AAD).unwrap_err(), CryptoError::WrongRecipient);
    }

    #[test]
    fn test_wrong_aad_fails() {
        let bob = RecipientKeyPair::generate();
        let sealed = seal(b"secret", &bob.public_key(), AAD).unwrap();
        assert!(matches!(open(&sealed, &bob, b"xml|bob@example.org"), Err(CryptoError::OpenFailed(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let bob = RecipientKeyPair::generate();
        let mut sealed = seal(b"secret", &bob.public_key(), AAD).unwrap();
        sealed.ciphertext[0] ^= 0x01;
        assert!(matches!(open(&sealed, &bob, AAD), Err(CryptoError::OpenFailed(_))));
    }

    #[test]
    fn test_tampered_wrapped_key_fails() {
        let bob = RecipientKeyPair::generate();
        let mut sealed = seal(b"secret", &bob.public_key(), AAD).unwrap();
        sealed.header.wrapped_key[3] ^= 0x80;
        assert!(matches!(open(&sealed, &bob, AAD), Err(CryptoError::OpenFailed(_))));
    }

    #[test]
    fn test_low_order_ephemeral_rejected() {
        let bob = RecipientKeyPair::generate();
        let mut sealed = seal(b"secret", &bob.public_key(), AAD).unwrap();
        sealed.header.ephemeral_public = [0u8; 32];
        assert!(matches!(open(&sealed, &bob, AAD), Err(CryptoError::OpenFailed(_))));
    }

    #[test]
    fn test_restore_from_secret_bytes() {
        let a = RecipientKeyPair::from_secret_bytes([9u8; 32]);
        let b = RecipientKeyPair::from_secret_bytes([9u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
        let sealed = seal(b"x", &a.public_key(), AAD).unwrap();
        assert_eq!(open(&sealed, &b, AAD).unwrap(), b"x");
    }

    #[test]
    fn test_public_key_hex() {
        let pk = RecipientKeyPair::generate().public_key();
        assert_eq!(RecipientPublicKey::from_hex(&pk.to_hex()).unwrap(), pk);
        assert!(RecipientPublicKey::from_slice(&[0u8; 5]).is_err());
    }
}
