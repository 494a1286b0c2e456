//! # fedwire-codec — Payload Codecs
//!
//! Bidirectional translation between the canonical [`Entity`] model and
//! each protocol's payload syntax.
//!
//! - [`XmlCodec`]: Diaspora-style XML entity documents.
//! - [`JsonLdCodec`]: ActivityPub-style JSON-LD activities.
//!
//! Codecs are stateless apart from their limits and are chosen through a
//! [`CodecTable`], which holds exactly one codec per [`ProtocolId`]. The
//! table is built with an exhaustive match, so adding a protocol is a
//! compile error until its codec is registered.
//!
//! ## Security Invariant
//!
//! Every `decode` checks the byte ceiling before any parsing, and bounds
//! nesting depth before building field values. Untrusted payloads never
//! allocate more than the configured limits allow.
//!
//! ## Round-trip
//!
//! For every entity `e` a codec can represent,
//! `decode(encode(e)) == e`, extension bag included.

pub mod jsonld;
pub mod xml;

mod context;
mod limits;

use std::collections::BTreeMap;

use fedwire_core::{
    from_extension_bag, DecodeError, EncodeError, EngineConfig, Entity, EntityKind, ExtensionBag, FieldValue,
    ProtocolId,
};

pub use jsonld::JsonLdCodec;
pub use limits::CodecLimits;
pub use xml::XmlCodec;

/// Translation between canonical entities and one protocol's payloads.
pub trait PayloadCodec: Send + Sync {
    /// The protocol this codec speaks.
    fn protocol(&self) -> ProtocolId;

    /// Encode an entity as a payload document.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if an extension field cannot be represented
    /// or collides with a property the codec writes itself.
    fn encode(&self, entity: &Entity) -> Result<Vec<u8>, EncodeError>;

    /// Decode a payload document into an entity.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::PayloadTooLarge`] before any parsing if the payload
    ///   exceeds the ceiling.
    /// - [`DecodeError::MalformedSyntax`] for syntax or structural limit
    ///   violations.
    /// - [`DecodeError::UnknownEntityType`] for unmodelled entity types.
    /// - [`DecodeError::InvalidField`] if a field fails entity parsing.
    fn decode(&self, bytes: &[u8]) -> Result<Entity, DecodeError>;
}

/// One codec per protocol.
#[derive(Debug, Clone)]
pub struct CodecTable {
    xml: XmlCodec,
    json_ld: JsonLdCodec,
}

impl CodecTable {
    /// Build codecs with the limits of `config`.
    pub fn new(config: &EngineConfig) -> Self {
        let limits = CodecLimits::from_config(config);
        Self {
            xml: XmlCodec::new(limits),
            json_ld: JsonLdCodec::new(limits),
        }
    }

    /// The codec for `protocol`.
    pub fn get(&self, protocol: ProtocolId) -> &dyn PayloadCodec {
        match protocol {
            ProtocolId::XmlProtocol => &self.xml,
            ProtocolId::JsonLdProtocol => &self.json_ld,
        }
    }
}

impl Default for CodecTable {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

/// Signature mappings of a payload marked as relayable: author, relay.
pub(crate) type RelayMarks = (Option<FieldValue>, Option<FieldValue>);

/// Parse decoded payload fields into an entity of `kind`, wrapping it in a
/// relayable when the payload carried relay signature slots.
pub(crate) fn assemble_entity(
    protocol: ProtocolId,
    kind: EntityKind,
    mut fields: ExtensionBag,
    extensions: BTreeMap<String, FieldValue>,
    relay: Option<RelayMarks>,
) -> Result<Entity, DecodeError> {
    let invalid = |source| DecodeError::InvalidField { protocol, source };
    if !extensions.is_empty() {
        fields.insert("extensions", FieldValue::Map(extensions));
    }
    let Some((author_signature, relay_signature)) = relay else {
        return from_extension_bag(kind, fields).map_err(invalid);
    };
    let mut bag = ExtensionBag::new()
        .with("inner_kind", kind.as_str())
        .with("inner", FieldValue::Map(fields.into_inner()));
    if let Some(sig) = author_signature {
        bag.insert("author_signature", sig);
    }
    if let Some(sig) = relay_signature {
        bag.insert("relay_signature", sig);
    }
    from_extension_bag(EntityKind::Relayable, bag).map_err(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_covers_every_protocol() {
        let table = CodecTable::default();
        for protocol in ProtocolId::ALL {
            assert_eq!(table.get(protocol).protocol(), protocol);
        }
    }
}
