//! # JSON-LD Codec (ActivityPub-style)
//!
//! | Entity | Activity | Primary object |
//! |--------|----------|----------------|
//! | Post | `Create` (id `{id}#create`) | the `Note` |
//! | Comment | `Create` | the `Note`, with `inReplyTo` |
//! | Reaction | `Like` / `Dislike` | the activity |
//! | Follow | `Follow` | the activity |
//! | Unfollow | `Undo` of an embedded `Follow` | the activity |
//! | ProfileUpdate | `Update` of a `Person` | the `Person` |
//! | Retraction | `Delete` of a `Tombstone` | the activity |
//!
//! Decoding also accepts a bare `Note` and `Undo` of a `Like`, which
//! becomes a retraction of the reaction.
//!
//! Extension fields live on the primary object as additional properties.
//! Timestamps among them are written as typed values
//! (`{"@value": …, "@type": "xsd:dateTime"}`) so they survive the trip.
//! A relayable carries `authorSignature` and `relaySignature` on its primary
//! object; either property being present, even as `null`, marks the
//! payload as relayable.
//!
//! Type names are expanded against the document's `@context`
//! ([`crate::context`]); property names are matched in compact form.

use std::collections::BTreeMap;

use fedwire_core::{
    DecodeError, EncodeError, Entity, EntityKind, ExtensionBag, FieldValue, ProtocolId, RelaySignature, Relayable,
    TargetRef, Timestamp, ValidationError,
};
use serde_json::{Map, Value};

use crate::context::{outbound_context, ActiveContext, PUBLIC};
use crate::limits::CodecLimits;
use crate::{assemble_entity, PayloadCodec, RelayMarks};

const PROTOCOL: ProtocolId = ProtocolId::JsonLdProtocol;

const AUTHOR_SIGNATURE: &str = "authorSignature";
const RELAY_SIGNATURE: &str = "relaySignature";
const XSD_DATETIME: &str = "xsd:dateTime";
const XSD_DOUBLE: &str = "xsd:double";

/// Properties no extension may use, whatever the primary object.
const ALWAYS_RESERVED: &[&str] = &["id", "type", "signature", AUTHOR_SIGNATURE, RELAY_SIGNATURE];

const NOTE_PROPERTIES: &[&str] = &[
    "attributedTo",
    "published",
    "content",
    "to",
    "cc",
    "generator",
    "location",
    "attachment",
    "tag",
    "inReplyTo",
    "targetType",
];

const ACTIVITY_PROPERTIES: &[&str] = &["actor", "published", "object", "to", "cc", "targetType"];

const PERSON_PROPERTIES: &[&str] = &[
    "name",
    "summary",
    "location",
    "gender",
    "icon",
    "imageUrlMedium",
    "imageUrlSmall",
    "discoverable",
    "sensitive",
    "tag",
    "updated",
];

/// Codec for ActivityPub-style JSON-LD activities.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLdCodec {
    limits: CodecLimits,
}

impl JsonLdCodec {
    pub fn new(limits: CodecLimits) -> Self {
        Self { limits }
    }
}

impl PayloadCodec for JsonLdCodec {
    fn protocol(&self) -> ProtocolId {
        PROTOCOL
    }

    fn encode(&self, entity: &Entity) -> Result<Vec<u8>, EncodeError> {
        let mut document = Map::new();
        document.insert("@context".into(), outbound_context());
        document.extend(encode_entity(entity)?);
        serde_json::to_vec(&Value::Object(document)).map_err(|e| EncodeError::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Entity, DecodeError> {
        self.limits.check_size(bytes)?;
        self.limits.check_json_depth(bytes)?;
        let value: Value = serde_json::from_slice(bytes).map_err(|e| malformed(e.to_string()))?;
        let Value::Object(document) = value else {
            return Err(malformed("document is not a JSON object"));
        };
        let context = ActiveContext::from_document(&document)?;
        Decoder { context: &context }.document(&document)
    }
}

fn malformed(reason: impl Into<String>) -> DecodeError {
    DecodeError::MalformedSyntax {
        protocol: PROTOCOL,
        reason: reason.into(),
    }
}

fn invalid_field(source: ValidationError) -> DecodeError {
    DecodeError::InvalidField {
        protocol: PROTOCOL,
        source,
    }
}

/// ActivityStreams type recorded as `formerType` for a retracted entity.
fn former_type(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Post | EntityKind::Comment => "Note",
        EntityKind::Reaction => "Like",
        EntityKind::Follow => "Follow",
        EntityKind::Unfollow => "Undo",
        EntityKind::ProfileUpdate => "Person",
        EntityKind::Retraction => "Delete",
        EntityKind::Relayable => "Object",
    }
}

fn kind_from_former_type(former: &str) -> Option<EntityKind> {
    match former {
        "Note" | "Article" | "Page" => Some(EntityKind::Post),
        "Like" | "Dislike" => Some(EntityKind::Reaction),
        "Follow" => Some(EntityKind::Follow),
        "Undo" => Some(EntityKind::Unfollow),
        "Person" => Some(EntityKind::ProfileUpdate),
        "Delete" => Some(EntityKind::Retraction),
        _ => None,
    }
}

// ─── Encoding ───────────────────────────────────────────────────────

fn encode_entity(entity: &Entity) -> Result<Map<String, Value>, EncodeError> {
    match entity {
        Entity::Relayable(r) => {
            if matches!(*r.inner, Entity::Relayable(_)) {
                return Err(EncodeError::UnsupportedEntity {
                    protocol: PROTOCOL,
                    kind: EntityKind::Relayable,
                    reason: "relayables cannot be nested".into(),
                });
            }
            encode_with_signatures(&r.inner, Some(r))
        }
        other => encode_with_signatures(other, None),
    }
}

fn activity(id: &str, kind: &str, actor: &str, published: Timestamp) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("id".into(), Value::from(id));
    map.insert("type".into(), Value::from(kind));
    map.insert("actor".into(), Value::from(actor));
    map.insert("published".into(), Value::from(published.to_iso8601()));
    map
}

fn named(kind: &str, name: &str) -> Value {
    let mut map = Map::new();
    map.insert("type".into(), Value::from(kind));
    map.insert("name".into(), Value::from(name));
    Value::Object(map)
}

fn hashtags<'a>(tags: impl IntoIterator<Item = &'a String>) -> Value {
    Value::Array(tags.into_iter().map(|t| named("Hashtag", &format!("#{t}"))).collect())
}

fn encode_with_signatures(entity: &Entity, relay: Option<&Relayable>) -> Result<Map<String, Value>, EncodeError> {
    let extensions = entity.extensions();
    let document = match entity {
        Entity::Post(p) => {
            let mut note = note(p.id.as_str(), p.author.as_str(), p.created_at, &p.text);
            if p.public {
                note.insert("to".into(), Value::Array(vec![Value::from(PUBLIC)]));
            }
            if let Some(name) = &p.provider_display_name {
                note.insert("generator".into(), named("Application", name));
            }
            if let Some(name) = &p.location {
                note.insert("location".into(), named("Place", name));
            }
            if !p.media.is_empty() {
                let attachments = p
                    .media
                    .iter()
                    .map(|url| {
                        let mut doc = Map::new();
                        doc.insert("type".into(), Value::from("Document"));
                        doc.insert("url".into(), Value::from(url.as_str()));
                        Value::Object(doc)
                    })
                    .collect();
                note.insert("attachment".into(), Value::Array(attachments));
            }
            let tags = p.tags();
            if !tags.is_empty() {
                note.insert("tag".into(), hashtags(&tags));
            }
            finish_primary(&mut note, NOTE_PROPERTIES, extensions, relay)?;
            create(p.id.as_str(), p.author.as_str(), p.created_at, note, p.public)
        }
        Entity::Comment(c) => {
            let mut note = note(c.id.as_str(), c.author.as_str(), c.created_at, &c.text);
            note.insert("inReplyTo".into(), Value::from(c.target.id.as_str()));
            note.insert("targetType".into(), Value::from(c.target.kind.as_str()));
            finish_primary(&mut note, NOTE_PROPERTIES, extensions, relay)?;
            create(c.id.as_str(), c.author.as_str(), c.created_at, note, false)
        }
        Entity::Reaction(r) => {
            let kind = if r.reaction.is_positive() { "Like" } else { "Dislike" };
            let mut act = activity(r.id.as_str(), kind, r.author.as_str(), r.created_at);
            act.insert("object".into(), Value::from(r.target.id.as_str()));
            act.insert("targetType".into(), Value::from(r.target.kind.as_str()));
            finish_primary(&mut act, ACTIVITY_PROPERTIES, extensions, relay)?;
            act
        }
        Entity::Follow(f) => {
            require_actor_target(entity.kind(), &f.target)?;
            let mut act = activity(f.id.as_str(), "Follow", f.author.as_str(), f.created_at);
            act.insert("object".into(), Value::from(f.target.id.as_str()));
            finish_primary(&mut act, ACTIVITY_PROPERTIES, extensions, relay)?;
            act
        }
        Entity::Unfollow(u) => {
            require_actor_target(entity.kind(), &u.target)?;
            let mut follow = Map::new();
            follow.insert("type".into(), Value::from("Follow"));
            follow.insert("actor".into(), Value::from(u.author.as_str()));
            follow.insert("object".into(), Value::from(u.target.id.as_str()));
            let mut act = activity(u.id.as_str(), "Undo", u.author.as_str(), u.created_at);
            act.insert("object".into(), Value::Object(follow));
            finish_primary(&mut act, ACTIVITY_PROPERTIES, extensions, relay)?;
            act
        }
        Entity::ProfileUpdate(p) => {
            let mut person = Map::new();
            person.insert("id".into(), Value::from(p.author.as_str()));
            person.insert("type".into(), Value::from("Person"));
            let strings = [
                ("name", &p.name),
                ("summary", &p.bio),
                ("gender", &p.gender),
                ("imageUrlMedium", &p.image_urls.medium),
                ("imageUrlSmall", &p.image_urls.small),
            ];
            for (key, value) in strings {
                if let Some(v) = value {
                    person.insert(key.into(), Value::from(v.as_str()));
                }
            }
            if let Some(location) = &p.location {
                person.insert("location".into(), named("Place", location));
            }
            if let Some(url) = &p.image_urls.large {
                let mut icon = Map::new();
                icon.insert("type".into(), Value::from("Image"));
                icon.insert("url".into(), Value::from(url.as_str()));
                person.insert("icon".into(), Value::Object(icon));
            }
            person.insert("discoverable".into(), Value::Bool(p.searchable));
            person.insert("sensitive".into(), Value::Bool(p.nsfw));
            if !p.tags.is_empty() {
                person.insert("tag".into(), hashtags(&p.tags));
            }
            finish_primary(&mut person, PERSON_PROPERTIES, extensions, relay)?;
            let mut act = activity(p.id.as_str(), "Update", p.author.as_str(), p.created_at);
            act.insert("object".into(), Value::Object(person));
            act
        }
        Entity::Retraction(r) => {
            let mut tombstone = Map::new();
            tombstone.insert("id".into(), Value::from(r.target.id.as_str()));
            tombstone.insert("type".into(), Value::from("Tombstone"));
            tombstone.insert("formerType".into(), Value::from(former_type(r.target.kind)));
            let mut act = activity(r.id.as_str(), "Delete", r.author.as_str(), r.created_at);
            act.insert("object".into(), Value::Object(tombstone));
            act.insert("targetType".into(), Value::from(r.target.kind.as_str()));
            finish_primary(&mut act, ACTIVITY_PROPERTIES, extensions, relay)?;
            act
        }
        Entity::Relayable(_) => {
            return Err(EncodeError::UnsupportedEntity {
                protocol: PROTOCOL,
                kind: EntityKind::Relayable,
                reason: "relayables cannot be nested".into(),
            })
        }
    };
    Ok(document)
}

fn note(id: &str, author: &str, published: Timestamp, content: &str) -> Map<String, Value> {
    let mut note = Map::new();
    note.insert("id".into(), Value::from(id));
    note.insert("type".into(), Value::from("Note"));
    note.insert("attributedTo".into(), Value::from(author));
    note.insert("published".into(), Value::from(published.to_iso8601()));
    note.insert("content".into(), Value::from(content));
    note
}

fn create(id: &str, author: &str, published: Timestamp, note: Map<String, Value>, public: bool) -> Map<String, Value> {
    let mut act = activity(&format!("{id}#create"), "Create", author, published);
    if public {
        act.insert("to".into(), Value::Array(vec![Value::from(PUBLIC)]));
    }
    act.insert("object".into(), Value::Object(note));
    act
}

fn require_actor_target(kind: EntityKind, target: &TargetRef) -> Result<(), EncodeError> {
    if target.kind == EntityKind::ProfileUpdate {
        return Ok(());
    }
    Err(EncodeError::UnsupportedEntity {
        protocol: PROTOCOL,
        kind,
        reason: format!("target must be an actor, found {}", target.kind),
    })
}

/// Add extension properties and relay signature slots to the primary object.
fn finish_primary(
    object: &mut Map<String, Value>,
    reserved: &[&str],
    extensions: &ExtensionBag,
    relay: Option<&Relayable>,
) -> Result<(), EncodeError> {
    for (name, value) in extensions.iter() {
        if name.is_empty() || name.starts_with('@') {
            return Err(EncodeError::InvalidFieldName {
                protocol: PROTOCOL,
                field: name.clone(),
            });
        }
        if reserved.contains(&name.as_str()) || ALWAYS_RESERVED.contains(&name.as_str()) || object.contains_key(name) {
            return Err(EncodeError::ReservedFieldName {
                protocol: PROTOCOL,
                field: name.clone(),
            });
        }
        object.insert(name.clone(), extension_json(value, name)?);
    }
    if let Some(r) = relay {
        object.insert(AUTHOR_SIGNATURE.into(), signature_json(r.author_signature.as_ref()));
        object.insert(RELAY_SIGNATURE.into(), signature_json(r.relay_signature.as_ref()));
    }
    Ok(())
}

fn signature_json(signature: Option<&RelaySignature>) -> Value {
    let Some(sig) = signature else {
        return Value::Null;
    };
    let mut map = Map::new();
    map.insert("signer".into(), Value::from(sig.signer.as_str()));
    map.insert("algorithm".into(), Value::from(sig.signature.algorithm.as_str()));
    map.insert("signatureValue".into(), Value::from(sig.signature.to_base64()));
    Value::Object(map)
}

fn extension_json(value: &FieldValue, field: &str) -> Result<Value, EncodeError> {
    let json = match value {
        FieldValue::Float(f) if !f.is_finite() => {
            return Err(EncodeError::NonFiniteNumber {
                field: field.to_string(),
            })
        }
        FieldValue::Timestamp(ts) => typed_literal(Value::from(ts.to_iso8601()), XSD_DATETIME),
        // Canonical JSON writes 2.0 as 2, so floats carry their type.
        FieldValue::Float(_) => typed_literal(value.to_json(), XSD_DOUBLE),
        FieldValue::List(items) => Value::Array(
            items
                .iter()
                .map(|item| extension_json(item, field))
                .collect::<Result<_, _>>()?,
        ),
        FieldValue::Map(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                if key.starts_with('@') {
                    return Err(EncodeError::InvalidFieldName {
                        protocol: PROTOCOL,
                        field: format!("{field}.{key}"),
                    });
                }
                out.insert(key.clone(), extension_json(item, field)?);
            }
            Value::Object(out)
        }
        scalar => scalar.to_json(),
    };
    Ok(json)
}

fn typed_literal(value: Value, xsd_type: &str) -> Value {
    let mut typed = Map::new();
    typed.insert("@value".into(), value);
    typed.insert("@type".into(), Value::from(xsd_type));
    Value::Object(typed)
}

// ─── Decoding ───────────────────────────────────────────────────────

/// Value of a property, honouring the `@id` / `@type` keyword aliases.
fn prop<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get(name).or_else(|| match name {
        "id" => object.get("@id"),
        "type" => object.get("@type"),
        _ => None,
    })
}

/// An id given as a string or as an object with an `id`.
fn id_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => prop(map, "id").and_then(Value::as_str),
        Value::Array(items) => items.first().and_then(id_of),
        _ => None,
    }
}

/// Text given directly or as the `name` of an object.
fn name_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("name").and_then(Value::as_str),
        _ => None,
    }
}

/// A URL given as a string, as `href`/`url` of a link object, or as the
/// first entry of a list.
fn url_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("href").or_else(|| map.get("url")).and_then(url_of),
        Value::Array(items) => items.first().and_then(url_of),
        _ => None,
    }
}

fn as_list(value: Option<&Value>) -> &[Value] {
    match value {
        Some(Value::Array(items)) => items,
        Some(single) => std::slice::from_ref(single),
        None => &[],
    }
}

/// Timestamp given as a string or a typed `@value` object.
fn timestamp_text(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("@value").and_then(Value::as_str),
        _ => None,
    }
}

fn extension_value(value: &Value) -> FieldValue {
    match value {
        Value::Object(map) => {
            if map.len() == 2 {
                let literal = map.get("@value");
                match map.get("@type").and_then(Value::as_str) {
                    Some(XSD_DATETIME) => {
                        if let Some(ts) = literal.and_then(Value::as_str).and_then(|s| Timestamp::parse_wire(s).ok()) {
                            return FieldValue::Timestamp(ts);
                        }
                    }
                    Some(XSD_DOUBLE) => {
                        if let Some(f) = literal.and_then(Value::as_f64) {
                            return FieldValue::Float(f);
                        }
                    }
                    _ => {}
                }
            }
            FieldValue::Map(map.iter().map(|(k, v)| (k.clone(), extension_value(v))).collect())
        }
        Value::Array(items) => FieldValue::List(items.iter().map(extension_value).collect()),
        scalar => FieldValue::from_json(scalar),
    }
}

fn signature_mark(value: &Value) -> Option<FieldValue> {
    let Value::Object(map) = value else {
        return None;
    };
    let mut out = BTreeMap::new();
    for (from, to) in [("signer", "signer"), ("algorithm", "algorithm"), ("signatureValue", "value")] {
        if let Some(v) = map.get(from) {
            out.insert(to.to_string(), FieldValue::from_json(v));
        }
    }
    Some(FieldValue::Map(out))
}

struct Decoder<'c> {
    context: &'c ActiveContext,
}

impl Decoder<'_> {
    /// The ActivityStreams type of an object.
    fn type_of(&self, object: &Map<String, Value>) -> Result<String, DecodeError> {
        let raw = match prop(object, "type") {
            Some(Value::String(s)) => s.as_str(),
            Some(Value::Array(items)) => items
                .iter()
                .find_map(Value::as_str)
                .ok_or_else(|| malformed("type list holds no names"))?,
            Some(_) => return Err(malformed("type must be a string or list of strings")),
            None => return Err(malformed("object has no type")),
        };
        self.context
            .activity_type(raw)
            .ok_or_else(|| DecodeError::UnknownEntityType {
                protocol: PROTOCOL,
                type_tag: raw.to_string(),
            })
    }

    fn embedded<'a>(&self, activity: &'a Map<String, Value>) -> Result<&'a Map<String, Value>, DecodeError> {
        match activity.get("object") {
            Some(Value::Object(object)) => Ok(object),
            Some(_) => Err(malformed("activity object must be embedded")),
            None => Err(malformed("activity has no object")),
        }
    }

    fn document(&self, document: &Map<String, Value>) -> Result<Entity, DecodeError> {
        let kind = self.type_of(document)?;
        match kind.as_str() {
            "Create" => {
                let object = self.embedded(document)?;
                match self.type_of(object)?.as_str() {
                    "Note" | "Article" | "Page" => self.note(Some(document), object),
                    other => Err(DecodeError::UnknownEntityType {
                        protocol: PROTOCOL,
                        type_tag: format!("Create/{other}"),
                    }),
                }
            }
            "Note" | "Article" | "Page" => self.note(None, document),
            "Like" | "Dislike" => self.reaction(document, kind == "Like"),
            "Follow" => self.follow(document),
            "Undo" => self.undo(document),
            "Update" => {
                let object = self.embedded(document)?;
                match self.type_of(object)?.as_str() {
                    "Person" | "Service" | "Application" => self.profile(document, object),
                    other => Err(DecodeError::UnknownEntityType {
                        protocol: PROTOCOL,
                        type_tag: format!("Update/{other}"),
                    }),
                }
            }
            "Delete" => self.retraction(document),
            other => Err(DecodeError::UnknownEntityType {
                protocol: PROTOCOL,
                type_tag: other.to_string(),
            }),
        }
    }

    /// `id`, `author`, and `created_at` from an activity's own properties.
    fn activity_common(&self, activity: &Map<String, Value>) -> ExtensionBag {
        let mut bag = ExtensionBag::new();
        if let Some(id) = prop(activity, "id").and_then(id_of) {
            bag.insert("id", id);
        }
        if let Some(actor) = activity.get("actor").and_then(id_of) {
            bag.insert("author", actor);
        }
        if let Some(published) = activity.get("published").and_then(timestamp_text) {
            bag.insert("created_at", published);
        }
        bag
    }

    /// Unmodelled properties of the primary object, and its relay marks.
    fn leftovers(
        &self,
        object: &Map<String, Value>,
        known: &[&str],
    ) -> (BTreeMap<String, FieldValue>, Option<RelayMarks>) {
        let mut extensions = BTreeMap::new();
        for (key, value) in object {
            let modelled = known.contains(&key.as_str())
                || ALWAYS_RESERVED.contains(&key.as_str())
                || key.starts_with('@');
            if modelled {
                continue;
            }
            tracing::debug!(property = %key, "keeping unmodelled property as extension");
            extensions.insert(key.clone(), extension_value(value));
        }
        let relay = match (object.get(AUTHOR_SIGNATURE), object.get(RELAY_SIGNATURE)) {
            (None, None) => None,
            (author, relay) => Some((author.and_then(signature_mark), relay.and_then(signature_mark))),
        };
        (extensions, relay)
    }

    fn target_kind(&self, object: &Map<String, Value>, default: EntityKind) -> Result<EntityKind, DecodeError> {
        match object.get("targetType") {
            None | Some(Value::Null) => Ok(default),
            Some(Value::String(s)) => s
                .parse::<EntityKind>()
                .map_err(|e| invalid_field(ValidationError::invalid("targetType", e))),
            Some(other) => Err(invalid_field(ValidationError::type_mismatch(
                "targetType",
                "text",
                FieldValue::from_json(other).kind_name(),
            ))),
        }
    }

    fn note(&self, activity: Option<&Map<String, Value>>, note: &Map<String, Value>) -> Result<Entity, DecodeError> {
        let mut bag = ExtensionBag::new();
        if let Some(id) = prop(note, "id").and_then(id_of) {
            bag.insert("id", id);
        }
        let actor = activity.and_then(|a| a.get("actor")).and_then(id_of);
        let attributed = note.get("attributedTo").and_then(id_of);
        if let (Some(actor), Some(attributed)) = (actor, attributed) {
            if actor != attributed {
                return Err(invalid_field(ValidationError::invalid(
                    "attributedTo",
                    "does not match the activity actor",
                )));
            }
        }
        if let Some(author) = attributed.or(actor) {
            bag.insert("author", author);
        }
        let published = note
            .get("published")
            .or_else(|| activity.and_then(|a| a.get("published")))
            .and_then(timestamp_text);
        if let Some(published) = published {
            bag.insert("created_at", published);
        }
        match note.get("content") {
            Some(Value::String(s)) => {
                bag.insert("text", s.as_str());
            }
            Some(other) => {
                bag.insert("text", FieldValue::from_json(other));
            }
            None => {}
        }

        let kind = match note.get("inReplyTo").and_then(id_of) {
            Some(parent) => {
                bag.insert("target_id", parent);
                bag.insert("target_kind", self.target_kind(note, EntityKind::Post)?.as_str());
                EntityKind::Comment
            }
            None => {
                let addressed = |o: &Map<String, Value>| {
                    ["to", "cc"]
                        .iter()
                        .flat_map(|k| as_list(o.get(*k)))
                        .filter_map(Value::as_str)
                        .any(|a| self.context.is_public(a))
                };
                let public = addressed(note) || activity.is_some_and(addressed);
                bag.insert("public", public);
                if let Some(name) = note.get("generator").and_then(name_of) {
                    bag.insert("provider_display_name", name);
                }
                if let Some(name) = note.get("location").and_then(name_of) {
                    bag.insert("location", name);
                }
                let media = as_list(note.get("attachment"))
                    .iter()
                    .filter_map(url_of)
                    .map(FieldValue::from)
                    .collect();
                bag.insert("media", FieldValue::List(media));
                EntityKind::Post
            }
        };
        let (extensions, relay) = self.leftovers(note, NOTE_PROPERTIES);
        assemble_entity(PROTOCOL, kind, bag, extensions, relay)
    }

    fn reaction(&self, activity: &Map<String, Value>, positive: bool) -> Result<Entity, DecodeError> {
        let mut bag = self.activity_common(activity);
        if let Some(target) = activity.get("object").and_then(id_of) {
            bag.insert("target_id", target);
        }
        bag.insert("target_kind", self.target_kind(activity, EntityKind::Post)?.as_str());
        bag.insert("reaction", if positive { "like" } else { "dislike" });
        let (extensions, relay) = self.leftovers(activity, ACTIVITY_PROPERTIES);
        assemble_entity(PROTOCOL, EntityKind::Reaction, bag, extensions, relay)
    }

    fn follow(&self, activity: &Map<String, Value>) -> Result<Entity, DecodeError> {
        let mut bag = self.activity_common(activity);
        if let Some(target) = activity.get("object").and_then(id_of) {
            bag.insert("target_id", target);
        }
        bag.insert("target_kind", EntityKind::ProfileUpdate.as_str());
        let (extensions, relay) = self.leftovers(activity, ACTIVITY_PROPERTIES);
        assemble_entity(PROTOCOL, EntityKind::Follow, bag, extensions, relay)
    }

    fn undo(&self, activity: &Map<String, Value>) -> Result<Entity, DecodeError> {
        let object = self.embedded(activity)?;
        let mut bag = self.activity_common(activity);
        let kind = match self.type_of(object)?.as_str() {
            "Follow" => {
                if let (Some(actor), Some(follower)) = (bag.get("author"), object.get("actor").and_then(id_of)) {
                    if actor.as_text() != Some(follower) {
                        return Err(invalid_field(ValidationError::invalid(
                            "object.actor",
                            "undone follow belongs to another actor",
                        )));
                    }
                }
                if let Some(target) = object.get("object").and_then(id_of) {
                    bag.insert("target_id", target);
                }
                bag.insert("target_kind", EntityKind::ProfileUpdate.as_str());
                EntityKind::Unfollow
            }
            "Like" | "Dislike" => {
                if let Some(target) = prop(object, "id").and_then(id_of) {
                    bag.insert("target_id", target);
                }
                bag.insert("target_kind", EntityKind::Reaction.as_str());
                EntityKind::Retraction
            }
            other => {
                return Err(DecodeError::UnknownEntityType {
                    protocol: PROTOCOL,
                    type_tag: format!("Undo/{other}"),
                })
            }
        };
        let (extensions, relay) = self.leftovers(activity, ACTIVITY_PROPERTIES);
        assemble_entity(PROTOCOL, kind, bag, extensions, relay)
    }

    fn profile(&self, activity: &Map<String, Value>, person: &Map<String, Value>) -> Result<Entity, DecodeError> {
        let mut bag = self.activity_common(activity);
        if !bag.contains_key("author") {
            if let Some(id) = prop(person, "id").and_then(id_of) {
                bag.insert("author", id);
            }
        }
        if !bag.contains_key("created_at") {
            if let Some(updated) = person.get("updated").and_then(timestamp_text) {
                bag.insert("created_at", updated);
            }
        }
        for (from, to) in [
            ("name", "name"),
            ("summary", "bio"),
            ("gender", "gender"),
            ("imageUrlMedium", "image_url_medium"),
            ("imageUrlSmall", "image_url_small"),
        ] {
            if let Some(v) = person.get(from) {
                bag.insert(to, FieldValue::from_json(v));
            }
        }
        if let Some(location) = person.get("location").and_then(name_of) {
            bag.insert("location", location);
        }
        if let Some(icon) = person.get("icon").and_then(url_of) {
            bag.insert("image_url_large", icon);
        }
        for (from, to) in [("discoverable", "searchable"), ("sensitive", "nsfw")] {
            if let Some(v) = person.get(from) {
                bag.insert(to, FieldValue::from_json(v));
            }
        }
        let tags = as_list(person.get("tag"))
            .iter()
            .filter_map(name_of)
            .map(|t| t.strip_prefix('#').unwrap_or(t))
            .map(FieldValue::from)
            .collect();
        bag.insert("tags", FieldValue::List(tags));
        let (extensions, relay) = self.leftovers(person, PERSON_PROPERTIES);
        assemble_entity(PROTOCOL, EntityKind::ProfileUpdate, bag, extensions, relay)
    }

    fn retraction(&self, activity: &Map<String, Value>) -> Result<Entity, DecodeError> {
        let mut bag = self.activity_common(activity);
        let object = activity.get("object");
        if let Some(target) = object.and_then(id_of) {
            bag.insert("target_id", target);
        }
        let former = match object {
            Some(Value::Object(o)) => o
                .get("formerType")
                .and_then(Value::as_str)
                .and_then(|t| self.context.activity_type(t))
                .and_then(|t| kind_from_former_type(&t)),
            _ => None,
        };
        let kind = self.target_kind(activity, former.unwrap_or(EntityKind::Post))?;
        bag.insert("target_kind", kind.as_str());
        let (extensions, relay) = self.leftovers(activity, ACTIVITY_PROPERTIES);
        assemble_entity(PROTOCOL, EntityKind::Retraction, bag, extensions, relay)
    }
}
