//! # Cryptographic Error Types
//!
//! Structured errors for signing, verification, and sealing. Messages
//! describe the failing step only; they never carry key bytes or plaintext.

use thiserror::Error;

/// Errors from cryptographic operations in `fedwire-crypto`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("Ed25519 verification failed: {0}")]
    VerificationFailed(String),

    /// Invalid Ed25519 signature length.
    #[error("invalid Ed25519 signature length: expected 64 bytes, got {0}")]
    InvalidSignatureLength(usize),

    /// A public key is malformed or not a valid curve point.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Hex decoding error.
    #[error("hex decode error: {0}")]
    HexDecode(String),

    /// Sealing a payload failed.
    #[error("seal failed: {0}")]
    SealFailed(String),

    /// A sealed payload could not be opened.
    #[error("open failed: {0}")]
    OpenFailed(String),

    /// The sealed payload is addressed to a different recipient key.
    #[error("sealed payload is addressed to a different recipient")]
    WrongRecipient,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_signature_length_display() {
        let msg = CryptoError::InvalidSignatureLength(32).to_string();
        assert!(msg.contains("64 bytes"));
        assert!(msg.contains("32"));
    }

    #[test]
    fn test_open_failed_display() {
        let err = CryptoError::OpenFailed("authentication tag mismatch".into());
        assert!(err.to_string().contains("authentication tag mismatch"));
    }
}
