//! Algorithm-tagged signature values.
//!
//! Signatures travel with their algorithm tag so that a verifier can refuse
//! an algorithm explicitly instead of misinterpreting its bytes.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::encoding::{b64_decode, b64_encode};
use crate::identity::KeyId;

/// Signature algorithms that appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// Ed25519 (RFC 8032). The only algorithm this engine signs with.
    Ed25519,
    /// RSA PKCS#1 v1.5 over SHA-256, used by legacy XML peers.
    /// Recognized so it can be rejected by name.
    RsaSha256,
}

impl SignatureAlgorithm {
    /// Wire tag of the algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ed25519 => "Ed25519",
            Self::RsaSha256 => "RSA-SHA256",
        }
    }

    /// Whether this engine can verify signatures made with the algorithm.
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Ed25519)
    }
}

impl std::fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ed25519" => Ok(Self::Ed25519),
            "rsa-sha256" => Ok(Self::RsaSha256),
            _ => Err(s.to_string()),
        }
    }
}

/// Raw signature bytes together with the algorithm that produced them.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TaggedSignature {
    /// Algorithm that produced `bytes`.
    pub algorithm: SignatureAlgorithm,
    /// The raw signature.
    pub bytes: Vec<u8>,
}

impl TaggedSignature {
    /// Tag raw bytes with an algorithm.
    pub fn new(algorithm: SignatureAlgorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    /// Standard base64 of the signature bytes.
    pub fn to_base64(&self) -> String {
        b64_encode(&self.bytes)
    }

    /// Parse standard base64 signature bytes.
    pub fn from_base64(algorithm: SignatureAlgorithm, s: &str) -> Result<Self, base64::DecodeError> {
        Ok(Self::new(algorithm, b64_decode(s)?))
    }
}

impl std::fmt::Debug for TaggedSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaggedSignature({}, {} bytes)", self.algorithm, self.bytes.len())
    }
}

impl Serialize for TaggedSignature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("TaggedSignature", 2)?;
        s.serialize_field("algorithm", self.algorithm.as_str())?;
        s.serialize_field("value", &self.to_base64())?;
        s.end()
    }
}

/// A signature over a relayable entity's canonical form, with its signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelaySignature {
    /// Key id of the signer, resolved through the key lookup collaborator.
    pub signer: KeyId,
    /// The signature itself.
    pub signature: TaggedSignature,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parse_is_case_insensitive() {
        assert_eq!("ed25519".parse::<SignatureAlgorithm>().unwrap(), SignatureAlgorithm::Ed25519);
        assert_eq!("RSA-SHA256".parse::<SignatureAlgorithm>().unwrap(), SignatureAlgorithm::RsaSha256);
        assert!("HS256".parse::<SignatureAlgorithm>().is_err());
    }

    #[test]
    fn test_only_ed25519_supported() {
        assert!(SignatureAlgorithm::Ed25519.is_supported());
        assert!(!SignatureAlgorithm::RsaSha256.is_supported());
    }

    #[test]
    fn test_debug_hides_bytes() {
        let sig = TaggedSignature::new(SignatureAlgorithm::Ed25519, vec![7u8; 64]);
        assert_eq!(format!("{sig:?}"), "TaggedSignature(Ed25519, 64 bytes)");
    }

    #[test]
    fn test_base64_roundtrip() {
        let sig = TaggedSignature::new(SignatureAlgorithm::Ed25519, vec![1, 2, 3, 250]);
        let parsed = TaggedSignature::from_base64(SignatureAlgorithm::Ed25519, &sig.to_base64()).unwrap();
        assert_eq!(parsed, sig);
    }
}
