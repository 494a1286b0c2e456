//! # Protocol and Envelope Mode Identifiers
//!
//! [`ProtocolId`] selects codec and envelope behavior. It is assigned by the
//! dispatcher from the structure of inbound bytes and never from
//! caller-supplied metadata alone.
//!
//! [`EnvelopeMode`] is ordered by increasing strictness, so
//! `mode >= EnvelopeMode::Signed` reads as "at least signed".

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;

/// The federation protocols this engine translates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProtocolId {
    /// XML payloads in Salmon magic envelopes (Diaspora-style).
    XmlProtocol,
    /// JSON-LD activities with linked-data signatures (ActivityPub-style).
    JsonLdProtocol,
}

impl ProtocolId {
    /// Every protocol, in declaration order.
    pub const ALL: [ProtocolId; 2] = [ProtocolId::XmlProtocol, ProtocolId::JsonLdProtocol];

    /// Short identifier used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::XmlProtocol => "xml",
            Self::JsonLdProtocol => "json-ld",
        }
    }

    /// The media type of a signed envelope in this protocol.
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::XmlProtocol => "application/magic-envelope+xml",
            Self::JsonLdProtocol => "application/ld+json",
        }
    }

    /// The media type of the payload carried inside an envelope.
    pub fn payload_type(&self) -> &'static str {
        match self {
            Self::XmlProtocol => "application/xml",
            Self::JsonLdProtocol => "application/activity+json",
        }
    }
}

impl std::fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an envelope protects its payload.
///
/// Variants are declared in order of increasing strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeMode {
    /// No signature. Accepted inbound only on explicit opt-in.
    Plain,
    /// Payload signed by the sender.
    Signed,
    /// Signed unit sealed to a single recipient.
    SignedEncrypted,
}

impl EnvelopeMode {
    /// Wire and log name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Signed => "signed",
            Self::SignedEncrypted => "signed-encrypted",
        }
    }

    /// Whether envelopes in this mode carry a sender signature.
    pub fn is_signed(&self) -> bool {
        *self >= Self::Signed
    }
}

impl std::fmt::Display for EnvelopeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvelopeMode {
    type Err = EnvelopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "signed" => Ok(Self::Signed),
            "signed-encrypted" => Ok(Self::SignedEncrypted),
            other => Err(EnvelopeError::UnsupportedMode {
                mode: other.to_string(),
            }),
        }
    }
}
