//! # Target Compatibility
//!
//! Which entity kinds each variant may reference, and the [`TargetLookup`]
//! seam through which callers report what a target id actually names.

use std::collections::HashMap;

use fedwire_core::{Entity, EntityKind};

/// Kinds an entity of `kind` may target. Empty for variants that never
/// carry a target.
pub fn allowed_targets(kind: EntityKind) -> &'static [EntityKind] {
    match kind {
        EntityKind::Comment | EntityKind::Reaction => &[EntityKind::Post, EntityKind::Comment],
        EntityKind::Follow | EntityKind::Unfollow => &[EntityKind::ProfileUpdate],
        EntityKind::Retraction => &[EntityKind::Post, EntityKind::Comment, EntityKind::Reaction],
        EntityKind::Post | EntityKind::ProfileUpdate | EntityKind::Relayable => &[],
    }
}

/// Whether an entity of `kind` may reference an entity of `target`.
pub fn is_compatible(kind: EntityKind, target: EntityKind) -> bool {
    allowed_targets(kind).contains(&target)
}

/// Resolves a target id to the kind of entity it names, when known.
///
/// Implemented for closures `Fn(&str) -> Option<EntityKind>` and for
/// [`KnownTargets`].
pub trait TargetLookup {
    fn kind_of(&self, id: &str) -> Option<EntityKind>;
}

impl<F> TargetLookup for F
where
    F: Fn(&str) -> Option<EntityKind>,
{
    fn kind_of(&self, id: &str) -> Option<EntityKind> {
        self(id)
    }
}

/// In-memory index of entities already seen, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct KnownTargets {
    kinds: HashMap<String, EntityKind>,
}

impl KnownTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `entity`. A relayable is recorded under its inner kind.
    pub fn record(&mut self, entity: &Entity) {
        let kind = match entity {
            Entity::Relayable(relayable) => relayable.inner.kind(),
            other => other.kind(),
        };
        self.kinds.insert(entity.id().as_str().to_string(), kind);
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl TargetLookup for KnownTargets {
    fn kind_of(&self, id: &str) -> Option<EntityKind> {
        self.kinds.get(id).copied()
    }
}

impl<'a> FromIterator<&'a Entity> for KnownTargets {
    fn from_iter<I: IntoIterator<Item = &'a Entity>>(iter: I) -> Self {
        let mut known = Self::new();
        for entity in iter {
            known.record(entity);
        }
        known
    }
}
