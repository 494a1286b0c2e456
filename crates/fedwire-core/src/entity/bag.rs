//! Conversion between entities and their flat payload mapping.
//!
//! Layout of the mapping produced by [`to_extension_bag`]:
//!
//! | key | value | variants |
//! |-----|-------|----------|
//! | `id`, `author` | text | all but relayable |
//! | `created_at` | timestamp | all but relayable |
//! | `target_id`, `target_kind` | text | comment, reaction, follow, unfollow, retraction |
//! | `text` | text | post, comment |
//! | `public`, `provider_display_name`, `location`, `media` | bool / text / text / list | post |
//! | `reaction` | text (`like`, `dislike`) | reaction |
//! | `name`, `bio`, `location`, `gender`, `image_url_*`, `searchable`, `nsfw`, `tags` | | profile_update |
//! | `inner_kind`, `inner` | text / map | relayable |
//! | `author_signature`, `relay_signature` | map `{signer, algorithm, value}` | relayable |
//! | `extensions` | map | all but relayable |
//!
//! [`from_extension_bag`] accepts unknown top-level keys and keeps them as
//! extensions, so a mapping produced by a newer peer still loads.

use std::collections::BTreeMap;

use crate::encoding::{b64_decode, b64_encode};
use crate::error::ValidationError;
use crate::identity::{EntityId, Handle, KeyId};
use crate::signature::{RelaySignature, SignatureAlgorithm, TaggedSignature};
use crate::temporal::Timestamp;
use crate::value::{ExtensionBag, FieldValue};

use super::{
    Comment, Entity, EntityKind, Follow, Post, ProfileImages, ProfileUpdate, Reaction, ReactionKind, Relayable,
    Retraction, TargetRef, Unfollow,
};

const EXTENSIONS: &str = "extensions";

/// Flatten an entity into its payload mapping.
pub fn to_extension_bag(entity: &Entity) -> ExtensionBag {
    let mut bag = ExtensionBag::new();
    match entity {
        Entity::Post(p) => {
            common(&mut bag, &p.id, &p.author, p.created_at);
            bag.insert("text", p.text.as_str());
            bag.insert("public", p.public);
            optional(&mut bag, "provider_display_name", &p.provider_display_name);
            optional(&mut bag, "location", &p.location);
            bag.insert("media", text_list(&p.media));
            extensions(&mut bag, &p.extensions);
        }
        Entity::Comment(c) => {
            common(&mut bag, &c.id, &c.author, c.created_at);
            target(&mut bag, &c.target);
            bag.insert("text", c.text.as_str());
            extensions(&mut bag, &c.extensions);
        }
        Entity::Reaction(r) => {
            common(&mut bag, &r.id, &r.author, r.created_at);
            target(&mut bag, &r.target);
            bag.insert("reaction", r.reaction.as_str());
            extensions(&mut bag, &r.extensions);
        }
        Entity::Follow(f) => {
            common(&mut bag, &f.id, &f.author, f.created_at);
            target(&mut bag, &f.target);
            extensions(&mut bag, &f.extensions);
        }
        Entity::Unfollow(u) => {
            common(&mut bag, &u.id, &u.author, u.created_at);
            target(&mut bag, &u.target);
            extensions(&mut bag, &u.extensions);
        }
        Entity::ProfileUpdate(p) => {
            common(&mut bag, &p.id, &p.author, p.created_at);
            optional(&mut bag, "name", &p.name);
            optional(&mut bag, "bio", &p.bio);
            optional(&mut bag, "location", &p.location);
            optional(&mut bag, "gender", &p.gender);
            optional(&mut bag, "image_url_small", &p.image_urls.small);
            optional(&mut bag, "image_url_medium", &p.image_urls.medium);
            optional(&mut bag, "image_url_large", &p.image_urls.large);
            bag.insert("searchable", p.searchable);
            bag.insert("nsfw", p.nsfw);
            bag.insert("tags", text_list(&p.tags));
            extensions(&mut bag, &p.extensions);
        }
        Entity::Retraction(r) => {
            common(&mut bag, &r.id, &r.author, r.created_at);
            target(&mut bag, &r.target);
            extensions(&mut bag, &r.extensions);
        }
        Entity::Relayable(r) => {
            bag.insert("inner_kind", r.inner.kind().as_str());
            bag.insert("inner", FieldValue::Map(to_extension_bag(&r.inner).into_inner()));
            if let Some(sig) = &r.author_signature {
                bag.insert("author_signature", signature_value(sig));
            }
            if let Some(sig) = &r.relay_signature {
                bag.insert("relay_signature", signature_value(sig));
            }
        }
    }
    bag
}

/// Build an entity of the given kind from its payload mapping.
///
/// # Errors
///
/// - [`ValidationError::MissingRequiredField`] when a required key is absent,
///   null, or empty text.
/// - [`ValidationError::TypeMismatch`] when a key holds the wrong value kind.
/// - [`ValidationError::InvalidValue`] when an identifier, timestamp, or
///   enumerated value does not parse.
pub fn from_extension_bag(kind: EntityKind, bag: ExtensionBag) -> Result<Entity, ValidationError> {
    let mut r = BagReader::new(kind, bag);
    let entity = match kind {
        EntityKind::Post => Entity::Post(Post {
            id: r.id()?,
            author: r.author()?,
            created_at: r.timestamp("created_at")?,
            text: r.optional_text("text")?.unwrap_or_default(),
            public: r.bool_or("public", true)?,
            provider_display_name: r.optional_text("provider_display_name")?,
            location: r.optional_text("location")?,
            media: r.text_list("media")?,
            extensions: r.finish()?,
        }),
        EntityKind::Comment => Entity::Comment(Comment {
            id: r.id()?,
            author: r.author()?,
            created_at: r.timestamp("created_at")?,
            target: r.target()?,
            text: r.required_text("text")?,
            extensions: r.finish()?,
        }),
        EntityKind::Reaction => Entity::Reaction(Reaction {
            id: r.id()?,
            author: r.author()?,
            created_at: r.timestamp("created_at")?,
            target: r.target()?,
            reaction: r
                .required_text("reaction")?
                .parse::<ReactionKind>()
                .map_err(|e| ValidationError::invalid("reaction", e))?,
            extensions: r.finish()?,
        }),
        EntityKind::Follow => Entity::Follow(Follow {
            id: r.id()?,
            author: r.author()?,
            created_at: r.timestamp("created_at")?,
            target: r.target()?,
            extensions: r.finish()?,
        }),
        EntityKind::Unfollow => Entity::Unfollow(Unfollow {
            id: r.id()?,
            author: r.author()?,
            created_at: r.timestamp("created_at")?,
            target: r.target()?,
            extensions: r.finish()?,
        }),
        EntityKind::ProfileUpdate => Entity::ProfileUpdate(ProfileUpdate {
            id: r.id()?,
            author: r.author()?,
            created_at: r.timestamp("created_at")?,
            name: r.optional_text("name")?,
            bio: r.optional_text("bio")?,
            location: r.optional_text("location")?,
            gender: r.optional_text("gender")?,
            image_urls: ProfileImages {
                small: r.optional_text("image_url_small")?,
                medium: r.optional_text("image_url_medium")?,
                large: r.optional_text("image_url_large")?,
            },
            searchable: r.bool_or("searchable", true)?,
            nsfw: r.bool_or("nsfw", false)?,
            tags: r.text_list("tags")?,
            extensions: r.finish()?,
        }),
        EntityKind::Retraction => Entity::Retraction(Retraction {
            id: r.id()?,
            author: r.author()?,
            created_at: r.timestamp("created_at")?,
            target: r.target()?,
            extensions: r.finish()?,
        }),
        EntityKind::Relayable => {
            let inner_kind = r
                .required_text("inner_kind")?
                .parse::<EntityKind>()
                .map_err(|e| ValidationError::invalid("inner_kind", e))?;
            let inner = r.map("inner")?;
            let inner = from_extension_bag(inner_kind, ExtensionBag::from(inner))?;
            let author_signature = r.signature("author_signature")?;
            let relay_signature = r.signature("relay_signature")?;
            r.finish_closed()?;
            Entity::Relayable(Relayable {
                inner: Box::new(inner),
                author_signature,
                relay_signature,
            })
        }
    };
    Ok(entity)
}

fn common(bag: &mut ExtensionBag, id: &EntityId, author: &Handle, created_at: Timestamp) {
    bag.insert("id", id.as_str());
    bag.insert("author", author.as_str());
    bag.insert("created_at", created_at);
}

fn target(bag: &mut ExtensionBag, target: &TargetRef) {
    bag.insert("target_id", target.id.as_str());
    bag.insert("target_kind", target.kind.as_str());
}

fn optional(bag: &mut ExtensionBag, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        bag.insert(key, v.as_str());
    }
}

fn text_list(items: &[String]) -> FieldValue {
    FieldValue::List(items.iter().map(|s| FieldValue::Text(s.clone())).collect())
}

fn extensions(bag: &mut ExtensionBag, extensions: &ExtensionBag) {
    if !extensions.is_empty() {
        bag.insert(EXTENSIONS, FieldValue::Map(extensions.clone().into_inner()));
    }
}

fn signature_value(sig: &RelaySignature) -> FieldValue {
    let mut map = BTreeMap::new();
    map.insert("signer".to_string(), FieldValue::Text(sig.signer.to_string()));
    map.insert(
        "algorithm".to_string(),
        FieldValue::Text(sig.signature.algorithm.as_str().to_string()),
    );
    map.insert("value".to_string(), FieldValue::Text(b64_encode(&sig.signature.bytes)));
    FieldValue::Map(map)
}

/// Consumes keys from a mapping; whatever is left becomes extensions.
struct BagReader {
    kind: EntityKind,
    fields: BTreeMap<String, FieldValue>,
}

impl BagReader {
    fn new(kind: EntityKind, bag: ExtensionBag) -> Self {
        Self {
            kind,
            fields: bag.into_inner(),
        }
    }

    fn missing(&self, field: &str) -> ValidationError {
        ValidationError::MissingRequiredField {
            kind: self.kind,
            field: field.to_string(),
        }
    }

    /// Remove a key; `Null` counts as absent.
    fn take(&mut self, key: &str) -> Option<FieldValue> {
        match self.fields.remove(key) {
            Some(FieldValue::Null) | None => None,
            Some(v) => Some(v),
        }
    }

    fn required_text(&mut self, key: &str) -> Result<String, ValidationError> {
        match self.optional_text(key)? {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(self.missing(key)),
        }
    }

    fn optional_text(&mut self, key: &str) -> Result<Option<String>, ValidationError> {
        match self.take(key) {
            None => Ok(None),
            Some(FieldValue::Text(s)) => Ok(Some(s)),
            Some(other) => Err(ValidationError::type_mismatch(key, "text", other.kind_name())),
        }
    }

    fn bool_or(&mut self, key: &str, default: bool) -> Result<bool, ValidationError> {
        match self.take(key) {
            None => Ok(default),
            Some(FieldValue::Bool(b)) => Ok(b),
            Some(other) => Err(ValidationError::type_mismatch(key, "bool", other.kind_name())),
        }
    }

    fn timestamp(&mut self, key: &str) -> Result<Timestamp, ValidationError> {
        match self.take(key) {
            None => Err(self.missing(key)),
            Some(FieldValue::Timestamp(ts)) => Ok(ts),
            Some(FieldValue::Text(s)) if s.is_empty() => Err(self.missing(key)),
            Some(FieldValue::Text(s)) => {
                Timestamp::parse_wire(&s).map_err(|_| ValidationError::invalid(key, format!("unparsable timestamp {s:?}")))
            }
            Some(other) => Err(ValidationError::type_mismatch(key, "timestamp", other.kind_name())),
        }
    }

    fn text_list(&mut self, key: &str) -> Result<Vec<String>, ValidationError> {
        match self.take(key) {
            None => Ok(Vec::new()),
            Some(FieldValue::List(items)) => items
                .into_iter()
                .map(|item| match item {
                    FieldValue::Text(s) => Ok(s),
                    other => Err(ValidationError::type_mismatch(key, "list of text", other.kind_name())),
                })
                .collect(),
            Some(other) => Err(ValidationError::type_mismatch(key, "list", other.kind_name())),
        }
    }

    fn map(&mut self, key: &str) -> Result<BTreeMap<String, FieldValue>, ValidationError> {
        match self.take(key) {
            None => Err(self.missing(key)),
            Some(FieldValue::Map(m)) => Ok(m),
            Some(other) => Err(ValidationError::type_mismatch(key, "map", other.kind_name())),
        }
    }

    fn id(&mut self) -> Result<EntityId, ValidationError> {
        EntityId::new(self.required_text("id")?)
    }

    fn author(&mut self) -> Result<Handle, ValidationError> {
        Handle::new(self.required_text("author")?)
    }

    fn target(&mut self) -> Result<TargetRef, ValidationError> {
        let id = self.required_text("target_id")?;
        let kind = self
            .required_text("target_kind")?
            .parse::<EntityKind>()
            .map_err(|e| ValidationError::invalid("target_kind", e))?;
        Ok(TargetRef { id, kind })
    }

    fn signature(&mut self, key: &str) -> Result<Option<RelaySignature>, ValidationError> {
        let Some(value) = self.take(key) else {
            return Ok(None);
        };
        let FieldValue::Map(mut map) = value else {
            return Err(ValidationError::type_mismatch(key, "map", value.kind_name()));
        };
        let mut text = |field: &str| -> Result<String, ValidationError> {
            let name = format!("{key}.{field}");
            match map.remove(field) {
                Some(FieldValue::Text(s)) if !s.is_empty() => Ok(s),
                Some(FieldValue::Text(_)) | Some(FieldValue::Null) | None => {
                    Err(ValidationError::MissingRequiredField {
                        kind: EntityKind::Relayable,
                        field: name,
                    })
                }
                Some(other) => Err(ValidationError::type_mismatch(name, "text", other.kind_name())),
            }
        };
        let signer = KeyId::new(text("signer")?)?;
        let algorithm = text("algorithm")?
            .parse::<SignatureAlgorithm>()
            .map_err(|a| ValidationError::invalid(format!("{key}.algorithm"), format!("unknown algorithm {a:?}")))?;
        let bytes = b64_decode(&text("value")?)
            .map_err(|e| ValidationError::invalid(format!("{key}.value"), format!("invalid base64: {e}")))?;
        Ok(Some(RelaySignature {
            signer,
            signature: TaggedSignature::new(algorithm, bytes),
        }))
    }

    /// Merge the `extensions` map and all unconsumed keys into a bag.
    fn finish(mut self) -> Result<ExtensionBag, ValidationError> {
        let mut extensions = match self.fields.remove(EXTENSIONS) {
            None => BTreeMap::new(),
            Some(FieldValue::Map(m)) => m,
            Some(other) => {
                return Err(ValidationError::type_mismatch(EXTENSIONS, "map", other.kind_name()));
            }
        };
        for (k, v) in self.fields {
            extensions.entry(k).or_insert(v);
        }
        Ok(ExtensionBag::from(extensions))
    }

    /// Relayables have no extension bag of their own.
    fn finish_closed(self) -> Result<(), ValidationError> {
        match self.fields.into_keys().next() {
            None => Ok(()),
            Some(key) => Err(ValidationError::invalid(key, "not a relayable field")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> Timestamp {
        Timestamp::parse("2026-01-15T12:00:00Z").unwrap()
    }

    fn comment() -> Entity {
        Entity::Comment(Comment {
            id: EntityId::new("c1").unwrap(),
            author: Handle::new("bob@example.org").unwrap(),
            created_at: ts(),
            target: TargetRef::new("p1", EntityKind::Post),
            text: "nice".into(),
            extensions: ExtensionBag::new().with("x_lang", "en"),
        })
    }

    fn profile() -> Entity {
        Entity::ProfileUpdate(ProfileUpdate {
            id: EntityId::new("profile-alice").unwrap(),
            author: Handle::new("alice@example.org").unwrap(),
            created_at: ts(),
            name: Some("Alice".into()),
            bio: None,
            location: Some("Helsinki".into()),
            gender: None,
            image_urls: ProfileImages {
                small: Some("https://example.org/s.png".into()),
                medium: None,
                large: Some("https://example.org/l.png".into()),
            },
            searchable: false,
            nsfw: true,
            tags: vec!["rust".into(), "cats".into()],
            extensions: ExtensionBag::new(),
        })
    }

    #[test]
    fn test_roundtrip_comment() {
        let e = comment();
        let bag = to_extension_bag(&e);
        assert_eq!(bag.get("target_kind").and_then(FieldValue::as_text), Some("post"));
        assert_eq!(from_extension_bag(EntityKind::Comment, bag).unwrap(), e);
    }

    #[test]
    fn test_roundtrip_profile() {
        let e = profile();
        assert_eq!(from_extension_bag(EntityKind::ProfileUpdate, to_extension_bag(&e)).unwrap(), e);
    }

    #[test]
    fn test_roundtrip_relayable_with_signatures() {
        let sig = |signer: &str, byte: u8| RelaySignature {
            signer: KeyId::new(signer).unwrap(),
            signature: TaggedSignature::new(SignatureAlgorithm::Ed25519, vec![byte; 64]),
        };
        let e = Entity::Relayable(Relayable {
            inner: Box::new(comment()),
            author_signature: Some(sig("bob@example.org", 1)),
            relay_signature: Some(sig("alice@example.org", 2)),
        });
        let bag = to_extension_bag(&e);
        assert_eq!(bag.get("inner_kind").and_then(FieldValue::as_text), Some("comment"));
        assert_eq!(from_extension_bag(EntityKind::Relayable, bag).unwrap(), e);
    }

    #[test]
    fn test_missing_required_field() {
        let mut bag = to_extension_bag(&comment());
        bag.remove("text");
        let err = from_extension_bag(EntityKind::Comment, bag).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingRequiredField {
                kind: EntityKind::Comment,
                field: "text".into()
            }
        );
    }

    #[test]
    fn test_empty_author_is_missing() {
        let bag = to_extension_bag(&comment()).with("author", "");
        let err = from_extension_bag(EntityKind::Comment, bag).unwrap_err();
        assert!(matches!(err, ValidationError::MissingRequiredField { field, .. } if field == "author"));
    }

    #[test]
    fn test_type_mismatch() {
        let bag = to_extension_bag(&comment()).with("text", 42i64);
        let err = from_extension_bag(EntityKind::Comment, bag).unwrap_err();
        assert_eq!(err, ValidationError::type_mismatch("text", "text", "integer"));
    }

    #[test]
    fn test_timestamp_accepts_wire_text() {
        let bag = to_extension_bag(&comment()).with("created_at", "2026-01-15 12:00:00 UTC");
        let e = from_extension_bag(EntityKind::Comment, bag).unwrap();
        assert_eq!(e.created_at(), ts());
    }

    #[test]
    fn test_invalid_handle_rejected() {
        let bag = to_extension_bag(&comment()).with("author", "not a handle");
        let err = from_extension_bag(EntityKind::Comment, bag).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { field, .. } if field == "author"));
    }

    #[test]
    fn test_unknown_keys_become_extensions() {
        let bag = to_extension_bag(&comment()).with("sensitive", true);
        let e = from_extension_bag(EntityKind::Comment, bag).unwrap();
        assert_eq!(e.extensions().get("sensitive"), Some(&FieldValue::Bool(true)));
        assert_eq!(e.extensions().get("x_lang"), Some(&FieldValue::Text("en".into())));
    }

    #[test]
    fn test_relayable_rejects_stray_keys() {
        let e = Entity::Relayable(Relayable::unsigned(comment()));
        let bag = to_extension_bag(&e).with("surprise", 1i64);
        assert!(from_extension_bag(EntityKind::Relayable, bag).is_err());
    }

    #[test]
    fn test_post_defaults() {
        let bag = ExtensionBag::new()
            .with("id", "p1")
            .with("author", "alice@example")
            .with("created_at", ts())
            .with("text", "hello");
        let Entity::Post(p) = from_extension_bag(EntityKind::Post, bag).unwrap() else {
            panic!("expected a post");
        };
        assert!(p.public);
        assert!(p.media.is_empty());
        assert!(p.extensions.is_empty());
    }
}
