//! # Error Types — Structured Error Hierarchy
//!
//! Defines the error taxonomy shared by every fedwire crate. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Each component has its own error family: decoding, encoding,
//!   validation, envelope processing, and dispatch.
//! - Messages carry the protocol, the envelope mode, and the failing
//!   check so an operator can diagnose a rejected message.
//! - Messages never carry key material, shared secrets, or decrypted
//!   plaintext.
//! - [`FederationError`] wraps every family via `#[from]` so the facade
//!   operations compose with `?`.

use thiserror::Error;

use crate::entity::EntityKind;
use crate::protocol::{EnvelopeMode, ProtocolId};
use crate::temporal::Timestamp;
use crate::xml::XmlError;

/// Top-level error type returned by the composed facade operations.
#[derive(Error, Debug)]
pub enum FederationError {
    /// A wire payload could not be decoded into an entity.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// An entity could not be encoded into a wire payload.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// A decoded or outbound entity failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Envelope wrapping, unwrapping, or verification failed.
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// The inbound payload's protocol could not be determined.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Engine configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Error decoding protocol wire syntax into a canonical entity.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The payload is not well-formed in the protocol's syntax, or exceeds
    /// structural limits (nesting depth, element count).
    #[error("{protocol}: malformed syntax: {reason}")]
    MalformedSyntax {
        /// Protocol whose syntax was violated.
        protocol: ProtocolId,
        /// What was wrong.
        reason: String,
    },

    /// The payload names an entity type this engine does not model.
    #[error("{protocol}: unknown entity type {type_tag:?}")]
    UnknownEntityType {
        /// Protocol that carried the type tag.
        protocol: ProtocolId,
        /// The unrecognized type tag as it appeared on the wire.
        type_tag: String,
    },

    /// The payload exceeds the configured byte ceiling. Raised before any
    /// parsing takes place.
    #[error("payload of {size} bytes exceeds the ceiling of {limit} bytes")]
    PayloadTooLarge {
        /// Size of the rejected payload in bytes.
        size: usize,
        /// Configured ceiling in bytes.
        limit: usize,
    },

    /// The payload is well-formed but a field failed entity-level parsing.
    #[error("{protocol}: invalid field: {source}")]
    InvalidField {
        /// Protocol of the payload.
        protocol: ProtocolId,
        /// The underlying field error.
        #[source]
        source: ValidationError,
    },
}

/// Error encoding a canonical entity into protocol wire syntax.
#[derive(Error, Debug)]
pub enum EncodeError {
    /// An extension field name collides with a property the codec writes.
    #[error("{protocol}: extension field {field:?} collides with a reserved property")]
    ReservedFieldName {
        /// Target protocol.
        protocol: ProtocolId,
        /// The colliding field name.
        field: String,
    },

    /// An extension field name cannot be expressed in the protocol's syntax.
    #[error("{protocol}: extension field name {field:?} is not representable")]
    InvalidFieldName {
        /// Target protocol.
        protocol: ProtocolId,
        /// The offending field name.
        field: String,
    },

    /// A float extension value is NaN or infinite.
    #[error("extension field {field:?} holds a non-finite number")]
    NonFiniteNumber {
        /// Name of the offending field.
        field: String,
    },

    /// The entity shape has no representation in the protocol.
    #[error("{protocol}: cannot encode {kind}: {reason}")]
    UnsupportedEntity {
        /// Target protocol.
        protocol: ProtocolId,
        /// Kind of the entity.
        kind: EntityKind,
        /// Why it cannot be encoded.
        reason: String,
    },

    /// Serialization of the encoded document failed.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Error validating a canonical entity.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A field required by the entity variant is absent or empty.
    #[error("{kind}: missing required field {field:?}")]
    MissingRequiredField {
        /// Variant being built or validated.
        kind: EntityKind,
        /// Name of the missing field.
        field: String,
    },

    /// A field holds a value of the wrong kind.
    #[error("field {field:?}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Name of the field.
        field: String,
        /// The value kind the field requires.
        expected: &'static str,
        /// The value kind actually present.
        found: &'static str,
    },

    /// A field holds a value of the right kind that is not acceptable.
    #[error("field {field:?}: {reason}")]
    InvalidValue {
        /// Name of the field.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// An entity's target refers to a structurally incompatible variant.
    #[error("{kind} cannot target {target_kind} {target_id:?}")]
    IncompatibleTarget {
        /// Variant of the referencing entity.
        kind: EntityKind,
        /// Variant of the referenced entity.
        target_kind: EntityKind,
        /// Id of the referenced entity.
        target_id: String,
    },

    /// An entity variant that never has a target carries one.
    #[error("{kind} must not carry a target")]
    UnexpectedTarget {
        /// Variant of the entity.
        kind: EntityKind,
    },

    /// The entity timestamp is further in the future than the skew tolerance.
    #[error("created_at {created_at} is more than {skew_secs}s ahead of {now}")]
    TimestampOutOfRange {
        /// The entity's timestamp.
        created_at: Timestamp,
        /// The caller-supplied current time.
        now: Timestamp,
        /// The configured tolerance in seconds.
        skew_secs: i64,
    },

    /// The extension bag exceeds the configured size bound.
    #[error("extension bag too large: {reason}")]
    ExtensionBagTooLarge {
        /// Which bound was exceeded.
        reason: String,
    },
}

/// Error wrapping, unwrapping, or verifying an envelope.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// The signature does not verify over the canonical payload.
    #[error("{protocol}/{mode}: signature invalid: {reason}")]
    SignatureInvalid {
        /// Protocol of the envelope.
        protocol: ProtocolId,
        /// Mode of the envelope.
        mode: EnvelopeMode,
        /// The failing check.
        reason: String,
    },

    /// The envelope is unsigned and the caller did not opt in to plain mode.
    #[error("{protocol}: unsigned envelope rejected; plain mode requires explicit opt-in")]
    SignatureRequired {
        /// Protocol of the envelope.
        protocol: ProtocolId,
    },

    /// The key lookup collaborator failed to produce a public key.
    #[error("public key for {key_id:?} not found: {reason}")]
    KeyNotFound {
        /// Key id that was looked up.
        key_id: String,
        /// The collaborator's failure description.
        reason: String,
    },

    /// The envelope uses a mode this engine does not process.
    #[error("unsupported envelope mode {mode:?}")]
    UnsupportedMode {
        /// The mode as it appeared on the wire or in the request.
        mode: String,
    },

    /// Key material supplied by the caller is malformed.
    #[error("key error: {0}")]
    KeyError(String),

    /// The signature algorithm is recognized but not supported.
    #[error("{protocol}: unsupported signature algorithm {algorithm:?}")]
    UnsupportedAlgorithm {
        /// Protocol of the envelope.
        protocol: ProtocolId,
        /// Algorithm tag as it appeared on the wire.
        algorithm: String,
    },

    /// The envelope container itself is structurally invalid.
    #[error("{protocol}: malformed envelope: {reason}")]
    MalformedEnvelope {
        /// Protocol of the envelope.
        protocol: ProtocolId,
        /// What was wrong.
        reason: String,
    },

    /// The sealed payload could not be opened.
    #[error("{protocol}: decryption failed: {reason}")]
    DecryptionFailed {
        /// Protocol of the envelope.
        protocol: ProtocolId,
        /// The failing step.
        reason: String,
    },

    /// The verified sender is neither the author nor the relayer of the entity.
    #[error("envelope sender {sender:?} does not match entity author {author:?}")]
    SenderMismatch {
        /// Owner of the verified signing key.
        sender: String,
        /// Author of the decoded entity.
        author: String,
    },

    /// The outbound payload could not be canonicalized for signing.
    #[error("{protocol}: payload cannot be canonicalized: {source}")]
    Canonicalization {
        /// Protocol of the payload.
        protocol: ProtocolId,
        /// The underlying canonicalization failure.
        #[source]
        source: CanonicalizationError,
    },

    /// A relayable entity cannot be canonicalized for its relay signatures.
    #[error("relayable {kind} cannot be canonicalized for signing: {source}")]
    RelayCanonicalization {
        /// Kind of the inner entity.
        kind: EntityKind,
        /// The underlying canonicalization failure.
        #[source]
        source: CanonicalizationError,
    },
}

/// Error identifying the protocol of an inbound payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The payload carries conflicting structural markers.
    #[error("ambiguous payload format: {0}")]
    AmbiguousFormat(String),

    /// The payload matches no supported protocol.
    #[error("unrecognized protocol: {0}")]
    UnrecognizedProtocol(String),
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Integers outside the I-JSON safe range lose precision across
    /// implementations and are not permitted in signed JSON.
    #[error("integer {0} is outside the interoperable range of +/-(2^53 - 1)")]
    IntegerOutOfRange(String),

    /// JSON parsing or serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// The XML payload could not be parsed.
    #[error("xml: {0}")]
    Xml(#[from] XmlError),

    /// The payload is not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Error loading or validating engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration value is out of range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl ValidationError {
    /// Shorthand for a [`ValidationError::TypeMismatch`].
    pub fn type_mismatch(field: impl Into<String>, expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected,
            found,
        }
    }

    /// Shorthand for a [`ValidationError::InvalidValue`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
