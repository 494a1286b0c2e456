//! # Entity Validation
//!
//! [`Validator::validate`] runs four checks in a fixed order and stops at
//! the first failure:
//!
//! 1. **Required fields**: every field the variant needs is present and
//!    non-empty.
//! 2. **Target compatibility**: the target's kind is one the variant may
//!    reference, and, when a [`TargetLookup`] is supplied, the entity the
//!    target id actually resolves to is too.
//! 3. **Timestamp**: `created_at` is not further ahead of the caller's
//!    current time than the configured skew.
//! 4. **Extension bag bounds**: value count, nesting depth, and
//!    approximate size stay within the configured limits.
//!
//! Validation is pure. The current time is an argument; nothing here reads
//! a clock or performs I/O.

use fedwire_core::{
    Clock, EngineConfig, Entity, EntityKind, Handle, Relayable, TargetRef, Timestamp, ValidationError,
};

use crate::targets::{allowed_targets, TargetLookup};

/// Bounds applied by [`Validator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    /// Tolerance for `created_at` ahead of now.
    pub max_clock_skew_secs: i64,
    /// Maximum values, counted recursively, in an extension bag.
    pub max_extension_entries: usize,
    /// Maximum approximate encoded size of an extension bag.
    pub max_extension_bytes: usize,
    /// Maximum nesting depth of extension values.
    pub max_extension_depth: usize,
}

impl ValidationLimits {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_clock_skew_secs: config.max_clock_skew_secs,
            max_extension_entries: config.max_extension_entries,
            max_extension_bytes: config.max_extension_bytes,
            max_extension_depth: config.max_nesting_depth,
        }
    }
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Validates canonical entities before callers trust them.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    limits: ValidationLimits,
}

/// A lookup that knows no entities.
struct NoTargets;

impl TargetLookup for NoTargets {
    fn kind_of(&self, _id: &str) -> Option<EntityKind> {
        None
    }
}

impl Validator {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_limits(ValidationLimits::from_config(config))
    }

    pub fn with_limits(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Validate `entity` as of `now`.
    ///
    /// # Errors
    ///
    /// Returns the first failing check's [`ValidationError`]:
    /// `MissingRequiredField`, then `IncompatibleTarget` /
    /// `UnexpectedTarget` / `InvalidValue`, then `TimestampOutOfRange`,
    /// then `ExtensionBagTooLarge`.
    pub fn validate(&self, entity: &Entity, now: Timestamp) -> Result<(), ValidationError> {
        self.validate_with_targets(entity, now, &NoTargets)
    }

    /// Validate `entity` against the current time of `clock`.
    pub fn validate_at(&self, entity: &Entity, clock: &dyn Clock) -> Result<(), ValidationError> {
        self.validate(entity, clock.now())
    }

    /// Validate `entity`, also resolving its target id through `targets`.
    ///
    /// A target id the lookup resolves must name an entity of a compatible
    /// kind, whatever kind the reference itself declares.
    pub fn validate_with_targets<L>(&self, entity: &Entity, now: Timestamp, targets: &L) -> Result<(), ValidationError>
    where
        L: TargetLookup + ?Sized,
    {
        let result = self
            .check_required(entity)
            .and_then(|()| self.check_target(entity, targets))
            .and_then(|()| self.check_timestamp(entity, now))
            .and_then(|()| self.check_extensions(entity));
        if let Err(e) = &result {
            tracing::debug!(kind = %entity.kind(), id = %entity.id(), error = %e, "entity failed validation");
        }
        result
    }

    // ─── (1) Required fields ────────────────────────────────────────

    fn check_required(&self, entity: &Entity) -> Result<(), ValidationError> {
        let kind = entity.kind();
        let missing = |field: &str| ValidationError::MissingRequiredField {
            kind,
            field: field.to_string(),
        };
        match entity {
            Entity::Post(post) => {
                if post.text.trim().is_empty() && post.media.is_empty() {
                    return Err(missing("text"));
                }
                if post.media.iter().any(|m| m.trim().is_empty()) {
                    return Err(missing("media"));
                }
            }
            Entity::Comment(comment) => {
                if comment.text.trim().is_empty() {
                    return Err(missing("text"));
                }
            }
            Entity::Reaction(_)
            | Entity::Follow(_)
            | Entity::Unfollow(_)
            | Entity::ProfileUpdate(_)
            | Entity::Retraction(_) => {}
            Entity::Relayable(relayable) => return self.check_required(&relayable.inner),
        }
        if let Some(target) = entity.target() {
            if target.id.trim().is_empty() {
                return Err(missing("target_id"));
            }
        }
        Ok(())
    }

    // ─── (2) Target compatibility ───────────────────────────────────

    fn check_target<L>(&self, entity: &Entity, targets: &L) -> Result<(), ValidationError>
    where
        L: TargetLookup + ?Sized,
    {
        if let Entity::Relayable(relayable) = entity {
            check_relayable_shape(relayable)?;
            return self.check_target(&relayable.inner, targets);
        }
        let kind = entity.kind();
        let allowed = allowed_targets(kind);
        let Some(target) = entity.target() else {
            return Ok(());
        };
        if allowed.is_empty() {
            return Err(ValidationError::UnexpectedTarget { kind });
        }
        check_kind(kind, target, target.kind, allowed)?;
        if let Some(resolved) = targets.kind_of(&target.id) {
            check_kind(kind, target, resolved, allowed)?;
        }
        if matches!(kind, EntityKind::Follow | EntityKind::Unfollow) {
            Handle::new(target.id.as_str())
                .map_err(|e| ValidationError::invalid("target_id", format!("followed actor is not a handle: {e}")))?;
        }
        if target.id == entity.id().as_str() {
            return Err(ValidationError::invalid("target_id", "entity references itself"));
        }
        Ok(())
    }

    // ─── (3) Timestamp ──────────────────────────────────────────────

    fn check_timestamp(&self, entity: &Entity, now: Timestamp) -> Result<(), ValidationError> {
        let created_at = entity.created_at();
        if now.seconds_until(&created_at) > self.limits.max_clock_skew_secs {
            return Err(ValidationError::TimestampOutOfRange {
                created_at,
                now,
                skew_secs: self.limits.max_clock_skew_secs,
            });
        }
        Ok(())
    }

    // ─── (4) Extension bag bounds ───────────────────────────────────

    fn check_extensions(&self, entity: &Entity) -> Result<(), ValidationError> {
        let bag = entity.extensions();
        let entries = bag.entry_count();
        if entries > self.limits.max_extension_entries {
            return Err(ValidationError::ExtensionBagTooLarge {
                reason: format!("{entries} values exceed the limit of {}", self.limits.max_extension_entries),
            });
        }
        let depth = bag.depth();
        if depth > self.limits.max_extension_depth {
            return Err(ValidationError::ExtensionBagTooLarge {
                reason: format!("nesting depth {depth} exceeds the limit of {}", self.limits.max_extension_depth),
            });
        }
        let size = bag.approx_size();
        if size > self.limits.max_extension_bytes {
            return Err(ValidationError::ExtensionBagTooLarge {
                reason: format!("{size} bytes exceed the limit of {}", self.limits.max_extension_bytes),
            });
        }
        Ok(())
    }
}

fn check_kind(
    kind: EntityKind,
    target: &TargetRef,
    target_kind: EntityKind,
    allowed: &[EntityKind],
) -> Result<(), ValidationError> {
    if allowed.contains(&target_kind) {
        Ok(())
    } else {
        Err(ValidationError::IncompatibleTarget {
            kind,
            target_kind,
            target_id: target.id.clone(),
        })
    }
}

fn check_relayable_shape(relayable: &Relayable) -> Result<(), ValidationError> {
    let inner = relayable.inner.kind();
    if !inner.is_relay_capable() {
        return Err(ValidationError::invalid(
            "inner",
            format!("{inner} entities cannot be relayed"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedwire_core::{
        Comment, EntityId, ExtensionBag, FieldValue, FixedClock, Follow, Post, Reaction, ReactionKind, Retraction,
    };

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_epoch_secs(secs).unwrap()
    }

    const NOW: i64 = 1_700_000_000;

    fn post() -> Post {
        Post::new(
            EntityId::new("p1").unwrap(),
            Handle::new("alice@example").unwrap(),
            ts(NOW),
            "hello #fediverse",
        )
    }

    fn comment(target: TargetRef) -> Comment {
        Comment {
            id: EntityId::new("c1").unwrap(),
            author: Handle::new("bob@example.org").unwrap(),
            created_at: ts(NOW),
            target,
            text: "reply".into(),
            extensions: ExtensionBag::new(),
        }
    }

    fn validator() -> Validator {
        Validator::default()
    }

    #[test]
    fn test_valid_post_passes() {
        validator().validate(&Entity::Post(post()), ts(NOW)).unwrap();
    }

    #[test]
    fn test_empty_post_missing_text() {
        let mut p = post();
        p.text = "  ".into();
        let err = validator().validate(&Entity::Post(p.clone()), ts(NOW)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingRequiredField {
                kind: EntityKind::Post,
                field: "text".into()
            }
        );
        p.media.push("https://media.example/a.png".into());
        assert!(validator().validate(&Entity::Post(p), ts(NOW)).is_ok());
    }

    #[test]
    fn test_comment_on_follow_incompatible() {
        let c = comment(TargetRef::new("f1", EntityKind::Follow));
        let err = validator().validate(&Entity::Comment(c), ts(NOW)).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::IncompatibleTarget {
                kind: EntityKind::Comment,
                target_kind: EntityKind::Follow,
                ..
            }
        ));
    }

    #[test]
    fn test_resolved_target_overrides_declared_kind() {
        let c = Entity::Comment(comment(TargetRef::new("f1", EntityKind::Post)));
        let lookup = |id: &str| (id == "f1").then_some(EntityKind::Follow);
        let err = validator().validate_with_targets(&c, ts(NOW), &lookup).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::IncompatibleTarget {
                target_kind: EntityKind::Follow,
                ..
            }
        ));
        let lookup = |id: &str| (id == "f1").then_some(EntityKind::Comment);
        assert!(validator().validate_with_targets(&c, ts(NOW), &lookup).is_ok());
    }

    #[test]
    fn test_required_fields_checked_before_target() {
        let mut c = comment(TargetRef::new("f1", EntityKind::Follow));
        c.text = String::new();
        let err = validator().validate(&Entity::Comment(c), ts(NOW)).unwrap_err();
        assert!(matches!(err, ValidationError::MissingRequiredField { .. }));
    }

    #[test]
    fn test_retraction_targets() {
        let retraction = |kind| {
            Entity::Retraction(Retraction {
                id: EntityId::new("r1").unwrap(),
                author: Handle::new("alice@example").unwrap(),
                created_at: ts(NOW),
                target: TargetRef::new("x1", kind),
                extensions: ExtensionBag::new(),
            })
        };
        for kind in [EntityKind::Post, EntityKind::Comment, EntityKind::Reaction] {
            assert!(validator().validate(&retraction(kind), ts(NOW)).is_ok(), "{kind}");
        }
        assert!(validator().validate(&retraction(EntityKind::Retraction), ts(NOW)).is_err());
    }

    #[test]
    fn test_follow_target_must_be_actor() {
        let follow = |target: TargetRef| {
            Entity::Follow(Follow {
                id: EntityId::new("f1").unwrap(),
                author: Handle::new("alice@example").unwrap(),
                created_at: ts(NOW),
                target,
                extensions: ExtensionBag::new(),
            })
        };
        let bob = Handle::new("bob@example.org").unwrap();
        assert!(validator().validate(&follow(TargetRef::actor(&bob)), ts(NOW)).is_ok());
        let err = validator()
            .validate(&follow(TargetRef::new("not a handle", EntityKind::ProfileUpdate)), ts(NOW))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
        let err = validator()
            .validate(&follow(TargetRef::new("p1", EntityKind::Post)), ts(NOW))
            .unwrap_err();
        assert!(matches!(err, ValidationError::IncompatibleTarget { .. }));
    }

    #[test]
    fn test_future_timestamp_rejected_beyond_skew() {
        let mut p = post();
        p.created_at = ts(NOW + 300);
        assert!(validator().validate(&Entity::Post(p.clone()), ts(NOW)).is_ok());
        p.created_at = ts(NOW + 301);
        let err = validator().validate(&Entity::Post(p.clone()), ts(NOW)).unwrap_err();
        assert!(matches!(err, ValidationError::TimestampOutOfRange { skew_secs: 300, .. }));
        assert!(validator()
            .validate_at(&Entity::Post(p), &FixedClock(ts(NOW + 1)))
            .is_ok());
    }

    #[test]
    fn test_past_timestamps_accepted() {
        let mut p = post();
        p.created_at = ts(0);
        assert!(validator().validate(&Entity::Post(p), ts(NOW)).is_ok());
    }

    #[test]
    fn test_extension_bag_bounds() {
        let limits = ValidationLimits {
            max_extension_entries: 3,
            max_extension_bytes: 64,
            max_extension_depth: 2,
            ..ValidationLimits::default()
        };
        let v = Validator::with_limits(limits);

        let mut p = post();
        p.extensions = (0..4).map(|i| (format!("k{i}"), FieldValue::Integer(i))).collect();
        let err = v.validate(&Entity::Post(p.clone()), ts(NOW)).unwrap_err();
        assert!(matches!(err, ValidationError::ExtensionBagTooLarge { .. }));

        p.extensions = ExtensionBag::new().with("big", "x".repeat(100));
        assert!(v.validate(&Entity::Post(p.clone()), ts(NOW)).is_err());

        let deep = FieldValue::List(vec![FieldValue::List(vec![FieldValue::List(vec![])])]);
        p.extensions = ExtensionBag::new().with("deep", deep);
        assert!(v.validate(&Entity::Post(p), ts(NOW)).is_err());
    }

    #[test]
    fn test_timestamp_checked_before_extensions() {
        let v = Validator::with_limits(ValidationLimits {
            max_extension_entries: 0,
            ..ValidationLimits::default()
        });
        let mut p = post();
        p.created_at = ts(NOW + 10_000);
        p.extensions = ExtensionBag::new().with("k", 1i64);
        let err = v.validate(&Entity::Post(p), ts(NOW)).unwrap_err();
        assert!(matches!(err, ValidationError::TimestampOutOfRange { .. }));
    }

    #[test]
    fn test_relayable_inner_validated() {
        let reaction = Entity::Reaction(Reaction {
            id: EntityId::new("l1").unwrap(),
            author: Handle::new("bob@example.org").unwrap(),
            created_at: ts(NOW),
            target: TargetRef::new("p1", EntityKind::Post),
            reaction: ReactionKind::Like,
            extensions: ExtensionBag::new(),
        });
        let ok = Entity::Relayable(Relayable::unsigned(reaction));
        assert!(validator().validate(&ok, ts(NOW)).is_ok());

        let bad = Entity::Relayable(Relayable::unsigned(Entity::Post(post())));
        let err = validator().validate(&bad, ts(NOW)).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "inner"));

        let incompatible = Entity::Relayable(Relayable::unsigned(Entity::Comment(comment(TargetRef::new(
            "f1",
            EntityKind::Unfollow,
        )))));
        assert!(matches!(
            validator().validate(&incompatible, ts(NOW)),
            Err(ValidationError::IncompatibleTarget { .. })
        ));
    }

    #[test]
    fn test_self_reference_rejected() {
        let c = comment(TargetRef::new("c1", EntityKind::Comment));
        assert!(matches!(
            validator().validate(&Entity::Comment(c), ts(NOW)),
            Err(ValidationError::InvalidValue { .. })
        ));
    }
}
