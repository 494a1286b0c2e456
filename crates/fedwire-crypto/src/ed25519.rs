//! # Ed25519 Signing and Verification
//!
//! Key types and operations used for envelope signatures and relay
//! signatures.
//!
//! ## Security Invariant
//!
//! - Signing input MUST be `&CanonicalBytes`; raw bytes cannot be signed.
//!   A signature therefore always covers the canonical form of a payload,
//!   never an incidental serialization of it.
//! - Verification uses `verify_strict`, which rejects non-canonical
//!   signature encodings and small-order public keys. Any single-bit change
//!   to the signed bytes or the signature fails verification.
//! - Private keys are never serialized or logged. `SigningKey` has no
//!   `Serialize` impl, its `Debug` output hides the key, and the inner
//!   dalek key zeroizes on drop.
//!
//! ## Serde
//!
//! Public keys and signatures serialize as lowercase hex strings.

use ed25519_dalek::Signer;
use fedwire_core::{CanonicalBytes, SignatureAlgorithm, TaggedSignature};
use rand_core::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CryptoError;

/// Length in bytes of an Ed25519 signature.
pub const SIGNATURE_LENGTH: usize = 64;

/// An Ed25519 public key (32 bytes), validated as a curve point.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VerifyingKey([u8; 32]);

/// An Ed25519 signature (64 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ed25519Signature([u8; SIGNATURE_LENGTH]);

/// An Ed25519 signing key.
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

// ─── VerifyingKey ───────────────────────────────────────────────────

impl VerifyingKey {
    /// Create a public key from raw bytes, rejecting invalid points.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|e| CryptoError::InvalidPublicKey(format!("not an Ed25519 point: {e}")))?;
        Ok(Self(bytes))
    }

    /// Create a public key from a byte slice of length 32.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        Self::from_bytes(arr)
    }

    /// Return the raw 32-byte public key.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Render the public key as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a public key from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s.trim()).map_err(|e| CryptoError::HexDecode(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Verify a signature over canonical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::VerificationFailed`] if the signature does not
    /// verify under strict rules.
    pub fn verify(&self, data: &CanonicalBytes, signature: &Ed25519Signature) -> Result<(), CryptoError> {
        let vk = ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        vk.verify_strict(data.as_bytes(), &sig)
            .map_err(|e| CryptoError::VerificationFailed(e.to_string()))
    }
}

impl Serialize for VerifyingKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for VerifyingKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({}...)", hex::encode(&self.0[..4]))
    }
}

impl std::fmt::Display for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ─── Ed25519Signature ───────────────────────────────────────────────

impl Ed25519Signature {
    /// Create a signature from raw 64 bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Create a signature from a slice, which must be exactly 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSignatureLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Extract the Ed25519 signature from an algorithm-tagged signature.
    ///
    /// Fails with `VerificationFailed` if the tag names another algorithm.
    pub fn from_tagged(tagged: &TaggedSignature) -> Result<Self, CryptoError> {
        if tagged.algorithm != SignatureAlgorithm::Ed25519 {
            return Err(CryptoError::VerificationFailed(format!(
                "expected an Ed25519 signature, got {}",
                tagged.algorithm
            )));
        }
        Self::from_slice(&tagged.bytes)
    }

    /// Return the raw 64-byte signature.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// The signature tagged with its algorithm.
    pub fn to_tagged(&self) -> TaggedSignature {
        TaggedSignature::new(SignatureAlgorithm::Ed25519, self.0.to_vec())
    }

    /// Render the signature as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a signature from a 128-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s.trim()).map_err(|e| CryptoError::HexDecode(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for Ed25519Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Ed25519Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519Signature({}...)", hex::encode(&self.0[..4]))
    }
}

// ─── SigningKey ─────────────────────────────────────────────────────

impl SigningKey {
    /// Generate a new random signing key from the OS RNG.
    pub fn generate() -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut OsRng),
        }
    }

    /// Create a signing key from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// The public half of this key.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.inner.verifying_key().to_bytes())
    }

    /// Sign canonical bytes.
    pub fn sign(&self, data: &CanonicalBytes) -> Ed25519Signature {
        Ed25519Signature(self.inner.sign(data.as_bytes()).to_bytes())
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<private>, public={:?})", self.verifying_key())
    }
}

/// Verify a signature over canonical bytes with `key`.
pub fn verify(data: &CanonicalBytes, signature: &Ed25519Signature, key: &VerifyingKey) -> Result<(), CryptoError> {
    key.verify(data, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(value: serde_json::Value) -> CanonicalBytes {
        CanonicalBytes::new(&value).unwrap()
    }

    #[test]
    fn test_sign_and_verify() {
        let sk = SigningKey::generate();
        let data = canonical(serde_json::json!({"message": "hello", "nonce": 42}));
        let sig = sk.sign(&data);
        verify(&data, &sig, &sk.verifying_key()).expect("valid signature should verify");
    }

    #[test]
    fn test_verify_wrong_key_fails() {
        let data = canonical(serde_json::json!({"test": true}));
        let sig = SigningKey::generate().sign(&data);
        let other = SigningKey::generate().verifying_key();
        assert!(matches!(verify(&data, &sig, &other), Err(CryptoError::VerificationFailed(_))));
    }

    #[test]
    fn test_verify_wrong_message_fails() {
        let sk = SigningKey::generate();
        let sig = sk.sign(&canonical(serde_json::json!({"msg": "original"})));
        let tampered = canonical(serde_json::json!({"msg": "tampered"}));
        assert!(verify(&tampered, &sig, &sk.verifying_key()).is_err());
    }

    #[test]
    fn test_deterministic_from_seed() {
        let a = SigningKey::from_seed(&[42u8; 32]);
        let b = SigningKey::from_seed(&[42u8; 32]);
        assert_eq!(a.verifying_key(), b.verifying_key());
        let data = canonical(serde_json::json!({"x": 1}));
        assert_eq!(a.sign(&data), b.sign(&data));
    }

    #[test]
    fn test_hex_roundtrip() {
        let sk = SigningKey::generate();
        let vk = sk.verifying_key();
        assert_eq!(VerifyingKey::from_hex(&vk.to_hex()).unwrap(), vk);
        let sig = sk.sign(&canonical(serde_json::json!({})));
        assert_eq!(sig.to_hex().len(), 128);
        assert_eq!(Ed25519Signature::from_hex(&sig.to_hex()).unwrap(), sig);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(VerifyingKey::from_hex("not-hex").is_err());
        assert!(VerifyingKey::from_slice(&[1u8; 31]).is_err());
        assert_eq!(
            Ed25519Signature::from_slice(&[0u8; 10]).unwrap_err(),
            CryptoError::InvalidSignatureLength(10)
        );
    }

    #[test]
    fn test_tagged_conversion() {
        let sig = SigningKey::generate().sign(&canonical(serde_json::json!({"a": 1})));
        let tagged = sig.to_tagged();
        assert_eq!(tagged.algorithm, SignatureAlgorithm::Ed25519);
        assert_eq!(Ed25519Signature::from_tagged(&tagged).unwrap(), sig);
        let rsa = TaggedSignature::new(SignatureAlgorithm::RsaSha256, vec![0u8; 64]);
        assert!(Ed25519Signature::from_tagged(&rsa).is_err());
    }

    #[test]
    fn test_debug_hides_private_key() {
        let sk = SigningKey::from_seed(&[7u8; 32]);
        let dbg = format!("{sk:?}");
        assert!(dbg.contains("<private>"));
        assert!(!dbg.contains(&hex::encode([7u8; 32])));
    }

    #[test]
    fn test_serde_roundtrip() {
        let vk = SigningKey::generate().verifying_key();
        let json = serde_json::to_string(&vk).unwrap();
        assert_eq!(json.len(), 64 + 2);
        let back: VerifyingKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vk);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Flipping any bit of the signature breaks verification.
        #[test]
        fn signature_bit_flip_rejected(seed in any::<[u8; 32]>(), text in "[a-z ]{0,40}", bit in 0usize..512) {
            let sk = SigningKey::from_seed(&seed);
            let data = CanonicalBytes::new(&serde_json::json!({"text": text})).unwrap();
            let mut bytes = *sk.sign(&data).as_bytes();
            bytes[bit / 8] ^= 1 << (bit % 8);
            let flipped = Ed25519Signature::from_bytes(bytes);
            prop_assert!(verify(&data, &flipped, &sk.verifying_key()).is_err());
        }

        /// A signature made with one key never verifies under another.
        #[test]
        fn signature_bound_to_key(a in any::<[u8; 32]>(), b in any::<[u8; 32]>()) {
            prop_assume!(a != b);
            let data = CanonicalBytes::new(&serde_json::json!({"k": 1})).unwrap();
            let sig = SigningKey::from_seed(&a).sign(&data);
            prop_assert!(verify(&data, &sig, &SigningKey::from_seed(&b).verifying_key()).is_err());
        }
    }
}
