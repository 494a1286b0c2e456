//! # fedwire-envelope — Envelope Engine
//!
//! Wraps protocol payloads in containers that prove sender identity and
//! payload integrity, and unwraps and verifies them on the way in.
//!
//! ## Modes
//!
//! | Mode | Outbound | Inbound |
//! |------|----------|---------|
//! | `plain` | only if `allow_plain_outbound` | only with the per-call opt-in |
//! | `signed` | Ed25519 over the canonical payload | verified against the resolved key |
//! | `signed-encrypted` | signed envelope sealed to one recipient | opened, then verified |
//!
//! ## Modules
//!
//! - [`envelope`]: the immutable [`Envelope`] value.
//! - [`lifecycle`]: the typestate outbound lifecycle.
//! - [`engine`]: [`EnvelopeEngine::wrap`] and [`EnvelopeEngine::unwrap`].
//! - [`keys`]: sender and recipient keys, and the [`KeyResolver`] seam to
//!   the discovery collaborator.
//! - [`relay`]: author and relay signatures on relayable entities.
//! - [`wire`]: magic-envelope XML and linked-data signature JSON-LD.
//!
//! ## Crate Policy
//!
//! - No network access. Public keys arrive through [`KeyResolver`].
//! - No internal retries: a failed lookup is returned to the caller.
//! - Error messages never include key material or decrypted plaintext.

pub mod engine;
pub mod envelope;
pub mod keys;
pub mod lifecycle;
pub mod relay;
pub mod wire;

pub use engine::{EnvelopeEngine, UnwrapOptions, WrapKeys};
pub use envelope::{EncryptedPayload, Envelope, EnvelopeBody, OpenedEnvelope, SignedPayload};
pub use keys::{KeyLookupError, KeyResolver, Recipient, RecipientSecret, SenderKey, StaticKeyResolver};
pub use lifecycle::Outbound;
pub use relay::{add_relay_signature, relay_signing_input, sign_as_author, verify_relayable, RelayVerification};
