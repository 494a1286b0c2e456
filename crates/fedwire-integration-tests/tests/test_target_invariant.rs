//! # Target-Type Invariant
//!
//! A comment whose target id resolves to a follow is rejected with
//! `IncompatibleTarget`, whatever kind the comment itself claims for its
//! target. Checked directly against the validator and end-to-end through
//! the facade with a [`KnownTargets`] index of previously seen entities.

mod common;

use anyhow::Result;
use common::{comment, federation, key, post, resolver, ts, NOW};
use fedwire_core::{
    Entity, EntityId, EntityKind, EnvelopeMode, ExtensionBag, FederationError, Follow, Handle, ProtocolId, TargetRef,
    ValidationError,
};
use fedwire_dispatch::InboundOptions;
use fedwire_envelope::WrapKeys;
use fedwire_validate::{KnownTargets, Validator};

fn follow(id: &str) -> Result<Entity> {
    Ok(Entity::Follow(Follow {
        id: EntityId::new(id)?,
        author: Handle::new("alice@example")?,
        created_at: ts(NOW - 300)?,
        target: TargetRef::actor(&Handle::new("bob@example.org")?),
        extensions: ExtensionBag::new(),
    }))
}

fn seen() -> Result<KnownTargets> {
    let entities = [post("p1", "alice@example")?, follow("f1")?];
    Ok(entities.iter().collect())
}

#[test]
fn comment_on_follow_is_incompatible() -> Result<()> {
    let validator = Validator::default();
    let known = seen()?;
    // The comment claims its target is a post, but "f1" names a follow.
    let sneaky = comment("c1", "bob@example.org", TargetRef::new("f1", EntityKind::Post))?;
    let err = validator.validate_with_targets(&sneaky, ts(NOW)?, &known).unwrap_err();
    assert_eq!(
        err,
        ValidationError::IncompatibleTarget {
            kind: EntityKind::Comment,
            target_kind: EntityKind::Follow,
            target_id: "f1".into(),
        }
    );

    let honest = comment("c2", "bob@example.org", TargetRef::new("f1", EntityKind::Follow))?;
    assert!(matches!(
        validator.validate(&honest, ts(NOW)?),
        Err(ValidationError::IncompatibleTarget { .. })
    ));

    let fine = comment("c3", "bob@example.org", TargetRef::new("p1", EntityKind::Post))?;
    assert!(validator.validate_with_targets(&fine, ts(NOW)?, &known).is_ok());
    Ok(())
}

#[test]
fn facade_applies_target_lookup() -> Result<()> {
    let fed = federation()?;
    let bob = key("bob@example.org", 2)?;
    let keys = resolver(&[&bob]);
    let known = seen()?;
    let sneaky = comment("c1", "bob@example.org", TargetRef::new("f1", EntityKind::Post))?;

    for protocol in ProtocolId::ALL {
        // Without a lookup the sender cannot tell the target is a follow.
        let bytes = fed.encode_and_wrap(&sneaky, protocol, EnvelopeMode::Signed, WrapKeys::signed(&bob))?;
        assert!(fed.dispatch_and_verify(&bytes, &keys).is_ok());

        let err = fed
            .dispatch_and_verify_with(&bytes, &keys, InboundOptions::default().with_targets(&known))
            .unwrap_err();
        assert!(
            matches!(
                err,
                FederationError::Validation(ValidationError::IncompatibleTarget {
                    target_kind: EntityKind::Follow,
                    ..
                })
            ),
            "{protocol}: {err}"
        );
    }
    Ok(())
}
