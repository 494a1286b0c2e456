//! # Cross-Protocol Translation and Wire Tampering
//!
//! - An entity received over one protocol can be re-encoded for the other
//!   and decodes to the same canonical entity.
//! - Flipping any single bit of a signed wire message never yields a
//!   verified message that differs from the original.
//! - Whatever the protocol, a signed entity comes out of
//!   `dispatch_and_verify` exactly as it went into `encode_and_wrap`,
//!   including whitespace-edged text and integral floats.

mod common;

use anyhow::Result;
use common::{comment_on_post, federation, key, post, resolver};
use fedwire_core::{Entity, EnvelopeMode, ExtensionBag, FederationError, FieldValue, ProtocolId};
use fedwire_envelope::WrapKeys;
use proptest::prelude::*;

#[test]
fn received_entities_translate_between_protocols() -> Result<()> {
    let fed = federation()?;
    let alice = key("alice@example", 1)?;
    let bob = key("bob@example.org", 2)?;
    let keys = resolver(&[&alice, &bob]);

    for (entity, signer) in [(post("p1", "alice@example")?, &alice), (comment_on_post("bob@example.org")?, &bob)] {
        for (from, to) in [
            (ProtocolId::XmlProtocol, ProtocolId::JsonLdProtocol),
            (ProtocolId::JsonLdProtocol, ProtocolId::XmlProtocol),
        ] {
            let inbound = fed.encode_and_wrap(&entity, from, EnvelopeMode::Signed, WrapKeys::signed(signer))?;
            let received = fed.dispatch_and_verify(&inbound, &keys)?.entity;

            let translated = fed.codecs().get(to).encode(&received)?;
            let decoded = fed.codecs().get(to).decode(&translated)?;
            assert_eq!(decoded, entity, "{from} -> {to}");
        }
    }
    Ok(())
}

#[test]
fn integral_float_extension_survives_the_envelope() -> Result<()> {
    let fed = federation()?;
    let alice = key("alice@example", 1)?;
    let Entity::Post(mut p) = post("p1", "alice@example")? else {
        unreachable!("fixture is a post");
    };
    p.extensions = ExtensionBag::new().with("ratio", FieldValue::Float(2.0));
    let original = Entity::Post(p);

    for protocol in ProtocolId::ALL {
        let wire = fed.encode_and_wrap(&original, protocol, EnvelopeMode::Signed, WrapKeys::signed(&alice))?;
        let message = fed.dispatch_and_verify(&wire, &resolver(&[&alice]))?;
        assert_eq!(message.entity.extensions().get("ratio"), Some(&FieldValue::Float(2.0)), "{protocol}");
        assert_eq!(message.entity, original, "{protocol}");
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn wire_bit_flips_never_forge_a_message(
        json in any::<bool>(),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let protocol = if json { ProtocolId::JsonLdProtocol } else { ProtocolId::XmlProtocol };
        let fed = federation().unwrap();
        let alice = key("alice@example", 1).unwrap();
        let original = post("p1", "alice@example").unwrap();
        let mut wire = fed
            .encode_and_wrap(&original, protocol, EnvelopeMode::Signed, WrapKeys::signed(&alice))
            .unwrap();
        let i = index.index(wire.len());
        wire[i] ^= 1 << bit;

        match fed.dispatch_and_verify(&wire, &resolver(&[&alice])) {
            // Flips in ignorable syntax (such as a base64 padding bit) may
            // still verify, but only as the untouched original.
            Ok(message) => prop_assert_eq!(message.entity, original),
            Err(
                FederationError::Dispatch(_)
                | FederationError::Envelope(_)
                | FederationError::Decode(_)
                | FederationError::Validation(_),
            ) => {}
            Err(other) => prop_assert!(false, "unexpected error family: {other}"),
        }
    }

    #[test]
    fn signed_posts_survive_the_envelope(
        json in any::<bool>(),
        text in "[ \n]{0,2}[a-zA-Z0-9][a-zA-Z0-9 .,<>&#]{0,30}[ \t\n]{0,2}",
        location in proptest::option::of("[ ]{0,2}[a-zA-Z ]{0,10}"),
        provider in proptest::option::of("[a-z]{0,6}[ \n]{0,2}"),
        whole in -1000i32..1000,
        half in -1000i32..1000,
    ) {
        let protocol = if json { ProtocolId::JsonLdProtocol } else { ProtocolId::XmlProtocol };
        let fed = federation().unwrap();
        let alice = key("alice@example", 1).unwrap();
        let Entity::Post(mut p) = post("p1", "alice@example").unwrap() else {
            unreachable!("fixture is a post");
        };
        p.text = text;
        p.location = location;
        p.provider_display_name = provider;
        p.extensions = ExtensionBag::new()
            .with("ratio", FieldValue::Float(f64::from(whole)))
            .with("offset", FieldValue::Float(f64::from(half) + 0.5))
            .with("count", FieldValue::Integer(i64::from(whole)));
        let original = Entity::Post(p);

        let wire = fed
            .encode_and_wrap(&original, protocol, EnvelopeMode::Signed, WrapKeys::signed(&alice))
            .unwrap();
        let message = fed.dispatch_and_verify(&wire, &resolver(&[&alice])).unwrap();
        prop_assert_eq!(message.entity, original, "protocol {}", protocol);
    }
}
