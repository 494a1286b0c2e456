//! # fedwire-validate — Entity and Envelope Validation
//!
//! Decides whether a canonical entity is acceptable before any caller acts
//! on it, and rejects structurally hopeless envelopes before verification.
//!
//! ## Check Order
//!
//! [`Validator::validate`] applies its checks in a fixed order and reports
//! the first failure, so a given entity always fails with the same error:
//!
//! | # | Check | Error |
//! |---|-------|-------|
//! | 1 | Required fields | `MissingRequiredField` |
//! | 2 | Target compatibility | `IncompatibleTarget`, `UnexpectedTarget`, `InvalidValue` |
//! | 3 | Timestamp skew | `TimestampOutOfRange` |
//! | 4 | Extension bag bounds | `ExtensionBagTooLarge` |
//!
//! ## Purity
//!
//! Validation performs no I/O and reads no clock. The current time is an
//! argument, or comes from an injected [`fedwire_core::Clock`].

pub mod entity;
pub mod envelope;
pub mod targets;

pub use entity::{ValidationLimits, Validator};
pub use envelope::validate_envelope;
pub use targets::{allowed_targets, is_compatible, KnownTargets, TargetLookup};
