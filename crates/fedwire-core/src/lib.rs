//! # fedwire-core — Foundational Types for fedwire
//!
//! This crate defines the protocol-neutral vocabulary every other fedwire
//! crate speaks: the canonical entity model, validated identifiers,
//! timestamps, typed extension values, canonicalization, XML element trees,
//! engine configuration, and the error taxonomy. It depends on nothing
//! internal.
//!
//! ## Key Design Principles
//!
//! 1. **Closed entity variant.** [`Entity`] is an enum over eight variants.
//!    Codecs and the validator match on it exhaustively; there is no runtime
//!    registry of entity types.
//!
//! 2. **Newtype wrappers for identifiers.** [`EntityId`], [`Handle`] and
//!    [`KeyId`] have validated constructors. No bare strings for identity.
//!
//! 3. **`CanonicalBytes` newtype.** Every byte sequence that is signed,
//!    verified, or digested flows through [`CanonicalBytes`], whose only
//!    constructors canonicalize.
//!
//! 4. **UTC-only timestamps** with second precision, and an injectable
//!    [`Clock`] so the validator stays pure.
//!
//! 5. **Nothing is silently dropped.** Fields a protocol carries that the
//!    entity model does not name live in the entity's [`ExtensionBag`].
//!
//! ## Crate Policy
//!
//! - No dependencies on other `fedwire-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod config;
pub mod digest;
pub mod encoding;
pub mod entity;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod signature;
pub mod temporal;
pub mod value;
pub mod xml;

// Re-export primary types for ergonomic imports.
pub use canonical::{canonicalize_payload, CanonicalBytes};
pub use config::EngineConfig;
pub use digest::{sha256_digest, sha256_hex, ContentDigest};
pub use entity::{
    from_extension_bag, to_extension_bag, Comment, Entity, EntityKind, Follow, Post, ProfileImages, ProfileUpdate,
    Reaction, ReactionKind, Relayable, Retraction, TargetRef, Unfollow,
};
pub use error::{
    CanonicalizationError, ConfigError, DecodeError, DispatchError, EncodeError, EnvelopeError, FederationError,
    ValidationError,
};
pub use identity::{EntityId, Handle, KeyId};
pub use protocol::{EnvelopeMode, ProtocolId};
pub use signature::{RelaySignature, SignatureAlgorithm, TaggedSignature};
pub use temporal::{Clock, FixedClock, SystemClock, Timestamp};
pub use value::{ExtensionBag, FieldValue};
pub use xml::{XmlElement, XmlError, XmlLimits};
