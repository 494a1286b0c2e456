//! # fedwire-crypto — Cryptographic Primitives
//!
//! - **Ed25519** signing and verification over
//!   [`CanonicalBytes`](fedwire_core::CanonicalBytes), used for envelope
//!   signatures and relay signatures.
//! - **Hybrid sealing**: X25519 key agreement wrapping a per-message
//!   ChaCha20-Poly1305 content key, used for `signed-encrypted` envelopes.
//!
//! ## Crate Policy
//!
//! - Depends only on `fedwire-core` internally.
//! - No mocking of cryptographic operations in tests; all tests use real
//!   keys and real ciphers.
//! - No `unsafe` code.

pub mod ed25519;
pub mod error;
pub mod sealed;

pub use ed25519::{verify, Ed25519Signature, SigningKey, VerifyingKey, SIGNATURE_LENGTH as ED25519_SIGNATURE_LENGTH};
pub use error::CryptoError;
pub use sealed::{open, seal, RecipientKeyPair, RecipientPublicKey, SealHeader, SealedBox};
