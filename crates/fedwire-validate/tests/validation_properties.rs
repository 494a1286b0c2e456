//! # Validation Properties
//!
//! - Target invariant: a referencing entity validates only when its
//!   target kind is in the compatibility table.
//! - Timestamp skew: an entity validates exactly when its `created_at` is
//!   at most the configured skew ahead of now.

use fedwire_core::{
    Comment, Entity, EntityId, EntityKind, ExtensionBag, Handle, Post, Reaction, ReactionKind, Retraction, TargetRef,
    Timestamp, ValidationError,
};
use fedwire_validate::{is_compatible, Validator};
use proptest::prelude::*;

const NOW: i64 = 1_750_000_000;

fn ts(secs: i64) -> Timestamp {
    Timestamp::from_epoch_secs(secs).expect("in range")
}

fn any_kind() -> impl Strategy<Value = EntityKind> {
    proptest::sample::select(EntityKind::ALL.to_vec())
}

fn referencing(kind: EntityKind, target: TargetRef) -> Option<Entity> {
    let id = EntityId::new("e1").expect("valid id");
    let author = Handle::new("carol@example.net").expect("valid handle");
    let created_at = ts(NOW);
    let extensions = ExtensionBag::new();
    match kind {
        EntityKind::Comment => Some(Entity::Comment(Comment {
            id,
            author,
            created_at,
            target,
            text: "text".into(),
            extensions,
        })),
        EntityKind::Reaction => Some(Entity::Reaction(Reaction {
            id,
            author,
            created_at,
            target,
            reaction: ReactionKind::Dislike,
            extensions,
        })),
        EntityKind::Retraction => Some(Entity::Retraction(Retraction {
            id,
            author,
            created_at,
            target,
            extensions,
        })),
        _ => None,
    }
}

proptest! {
    #[test]
    fn target_kind_decides_acceptance(
        kind in proptest::sample::select(vec![EntityKind::Comment, EntityKind::Reaction, EntityKind::Retraction]),
        target_kind in any_kind(),
    ) {
        let entity = referencing(kind, TargetRef::new("t1", target_kind)).expect("referencing kind");
        let result = Validator::default().validate(&entity, ts(NOW));
        if is_compatible(kind, target_kind) {
            prop_assert!(result.is_ok(), "{result:?}");
        } else {
            let is_incompatible = matches!(result, Err(ValidationError::IncompatibleTarget { .. }));
            prop_assert!(is_incompatible, "{result:?}");
        }
    }

    #[test]
    fn skew_boundary_is_exact(offset in -100_000i64..100_000) {
        let validator = Validator::default();
        let skew = validator.limits().max_clock_skew_secs;
        let post = Entity::Post(Post::new(
            EntityId::new("p1").expect("valid id"),
            Handle::new("alice@example").expect("valid handle"),
            ts(NOW + offset),
            "hello",
        ));
        let result = validator.validate(&post, ts(NOW));
        prop_assert_eq!(result.is_ok(), offset <= skew);
    }
}
