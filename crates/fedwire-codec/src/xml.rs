//! # XML Codec (Diaspora-style)
//!
//! Entities are written as one element per entity inside the legacy
//! `<XML><post>…</post></XML>` wrapper; decoding accepts the wrapper or a
//! bare entity element.
//!
//! | Entity | Element | Notes |
//! |--------|---------|-------|
//! | Post | `status_message` | media as `photo` (`remote_photo_path` + `remote_photo_name`) |
//! | Comment | `comment` | `parent_type` written only when the target is not a post |
//! | Reaction | `like` | `positive=false` is a dislike |
//! | Follow | `request` | `contact` with `following=true` also decodes as a follow |
//! | Unfollow | `contact` | `following=false` |
//! | ProfileUpdate | `profile` | `tag_string` holds `#tag` words; `tags` array when a tag is not one word |
//! | Retraction | `retraction` | legacy `post_guid` / `type` accepted |
//!
//! A relayable is its inner element plus `author_signature` and
//! `parent_author_signature` children (base64 text, `signer` and `alg`
//! attributes). An empty signature element means "no signature".
//!
//! Optional text fields keep their exact content: an empty element is an
//! empty string, and only a missing element means "absent".
//!
//! Child elements the table does not name become extension fields. Their
//! values carry Rails-style type attributes: `type="integer|float|boolean|
//! datetime|array|map"`, `nil="true"`, and untyped text.

use std::collections::{BTreeMap, BTreeSet};

use fedwire_core::xml::parse_document;
use fedwire_core::{
    DecodeError, EncodeError, Entity, EntityId, EntityKind, ExtensionBag, FieldValue,
    ProtocolId, RelaySignature, Relayable, TargetRef, Timestamp, ValidationError, XmlElement,
};

use crate::limits::CodecLimits;
use crate::{assemble_entity, PayloadCodec};

const PROTOCOL: ProtocolId = ProtocolId::XmlProtocol;

const POST: &str = "status_message";
const COMMENT: &str = "comment";
const LIKE: &str = "like";
const REQUEST: &str = "request";
const CONTACT: &str = "contact";
const PROFILE: &str = "profile";
const RETRACTION: &str = "retraction";

const AUTHOR_SIGNATURE: &str = "author_signature";
const PARENT_AUTHOR_SIGNATURE: &str = "parent_author_signature";

/// Algorithm assumed for signature elements without an `alg` attribute.
const LEGACY_ALGORITHM: &str = "RSA-SHA256";

/// Children each entity element defines; everything else is an extension.
fn known_children(element: &str) -> &'static [&'static str] {
    match element {
        POST => &[
            "guid",
            "diaspora_handle",
            "author",
            "created_at",
            "raw_message",
            "public",
            "provider_display_name",
            "location",
            "photo",
        ],
        COMMENT => &["guid", "diaspora_handle", "author", "created_at", "parent_guid", "parent_type", "text"],
        LIKE => &[
            "guid",
            "diaspora_handle",
            "author",
            "created_at",
            "parent_guid",
            "parent_type",
            "target_type",
            "positive",
        ],
        REQUEST => &["guid", "sender_handle", "recipient_handle", "created_at"],
        CONTACT => &["guid", "author", "recipient", "following", "sharing", "created_at"],
        PROFILE => &[
            "guid",
            "diaspora_handle",
            "author",
            "created_at",
            "first_name",
            "last_name",
            "image_url",
            "image_url_medium",
            "image_url_small",
            "gender",
            "bio",
            "location",
            "searchable",
            "nsfw",
            "tag_string",
            "tags",
        ],
        RETRACTION => &[
            "guid",
            "diaspora_handle",
            "author",
            "created_at",
            "target_guid",
            "target_type",
            "post_guid",
            "type",
        ],
        _ => &[],
    }
}

/// Diaspora class name used in `target_type` / `parent_type`.
fn class_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Post => "Post",
        EntityKind::Comment => "Comment",
        EntityKind::Reaction => "Like",
        EntityKind::Follow => "Request",
        EntityKind::Unfollow => "Contact",
        EntityKind::ProfileUpdate => "Profile",
        EntityKind::Retraction => "Retraction",
        EntityKind::Relayable => "Relayable",
    }
}

fn kind_from_class(field: &str, class: &str) -> Result<EntityKind, ValidationError> {
    match class {
        "Post" | "StatusMessage" => Ok(EntityKind::Post),
        "Comment" => Ok(EntityKind::Comment),
        "Like" | "Reaction" => Ok(EntityKind::Reaction),
        "Request" => Ok(EntityKind::Follow),
        "Contact" => Ok(EntityKind::Unfollow),
        "Profile" | "Person" => Ok(EntityKind::ProfileUpdate),
        "Retraction" => Ok(EntityKind::Retraction),
        other => Err(ValidationError::invalid(field, format!("unknown class {other:?}"))),
    }
}

/// Codec for Diaspora-style XML entity documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlCodec {
    limits: CodecLimits,
}

impl XmlCodec {
    pub fn new(limits: CodecLimits) -> Self {
        Self { limits }
    }
}

impl PayloadCodec for XmlCodec {
    fn protocol(&self) -> ProtocolId {
        PROTOCOL
    }

    fn encode(&self, entity: &Entity) -> Result<Vec<u8>, EncodeError> {
        let element = encode_entity(entity)?;
        let document = XmlElement::new("XML").with_child(XmlElement::new("post").with_child(element));
        Ok(document.to_canonical_string().into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Entity, DecodeError> {
        self.limits.check_size(bytes)?;
        let root = parse_document(bytes, &self.limits.xml()).map_err(|e| malformed(e.to_string()))?;
        decode_entity(entity_element(&root)?)
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

/// Locate the entity element inside the optional `<XML><post>` wrapper.
fn entity_element(root: &XmlElement) -> Result<&XmlElement, DecodeError> {
    let mut element = root;
    for wrapper in ["XML", "post"] {
        if element.local_name() == wrapper {
            element = match element.children.as_slice() {
                [only] => only,
                [] => return Err(malformed(format!("<{wrapper}> wrapper is empty"))),
                _ => return Err(malformed(format!("<{wrapper}> wrapper holds more than one element"))),
            };
        }
    }
    Ok(element)
}

// ─── Encoding ───────────────────────────────────────────────────────

fn leaf(name: &str, text: impl Into<String>) -> XmlElement {
    XmlElement::new(name).with_text(text)
}

fn bool_text(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

fn encode_entity(entity: &Entity) -> Result<XmlElement, EncodeError> {
    let (name, mut element) = match entity {
        Entity::Post(p) => {
            let mut el = XmlElement::new(POST)
                .with_child(leaf("guid", p.id.as_str()))
                .with_child(leaf("diaspora_handle", p.author.as_str()))
                .with_child(leaf("created_at", p.created_at.to_legacy_format()))
                .with_child(leaf("raw_message", p.text.as_str()))
                .with_child(leaf("public", bool_text(p.public)));
            if let Some(v) = &p.provider_display_name {
                el.push(leaf("provider_display_name", v.as_str()));
            }
            if let Some(v) = &p.location {
                el.push(leaf("location", v.as_str()));
            }
            for url in &p.media {
                let (path, name) = match url.rfind('/') {
                    Some(i) => url.split_at(i + 1),
                    None => ("", url.as_str()),
                };
                el.push(
                    XmlElement::new("photo")
                        .with_child(leaf("remote_photo_path", path))
                        .with_child(leaf("remote_photo_name", name)),
                );
            }
            (POST, el)
        }
        Entity::Comment(c) => {
            let mut el = XmlElement::new(COMMENT)
                .with_child(leaf("guid", c.id.as_str()))
                .with_child(leaf("parent_guid", c.target.id.as_str()));
            if c.target.kind != EntityKind::Post {
                el.push(leaf("parent_type", class_name(c.target.kind)));
            }
            el.push(leaf("text", c.text.as_str()));
            el.push(leaf("diaspora_handle", c.author.as_str()));
            el.push(leaf("created_at", c.created_at.to_legacy_format()));
            (COMMENT, el)
        }
        Entity::Reaction(r) => {
            let el = XmlElement::new(LIKE)
                .with_child(leaf("target_type", class_name(r.target.kind)))
                .with_child(leaf("guid", r.id.as_str()))
                .with_child(leaf("parent_guid", r.target.id.as_str()))
                .with_child(leaf("positive", bool_text(r.reaction.is_positive())))
                .with_child(leaf("diaspora_handle", r.author.as_str()))
                .with_child(leaf("created_at", r.created_at.to_legacy_format()));
            (LIKE, el)
        }
        Entity::Follow(f) => {
            require_actor_target(entity.kind(), &f.target)?;
            let el = XmlElement::new(REQUEST)
                .with_child(leaf("guid", f.id.as_str()))
                .with_child(leaf("sender_handle", f.author.as_str()))
                .with_child(leaf("recipient_handle", f.target.id.as_str()))
                .with_child(leaf("created_at", f.created_at.to_legacy_format()));
            (REQUEST, el)
        }
        Entity::Unfollow(u) => {
            require_actor_target(entity.kind(), &u.target)?;
            let el = XmlElement::new(CONTACT)
                .with_child(leaf("guid", u.id.as_str()))
                .with_child(leaf("author", u.author.as_str()))
                .with_child(leaf("recipient", u.target.id.as_str()))
                .with_child(leaf("following", "false"))
                .with_child(leaf("sharing", "false"))
                .with_child(leaf("created_at", u.created_at.to_legacy_format()));
            (CONTACT, el)
        }
        Entity::ProfileUpdate(p) => {
            let mut el = XmlElement::new(PROFILE)
                .with_child(leaf("guid", p.id.as_str()))
                .with_child(leaf("diaspora_handle", p.author.as_str()))
                .with_child(leaf("created_at", p.created_at.to_legacy_format()));
            let optional = [
                ("first_name", &p.name),
                ("image_url", &p.image_urls.large),
                ("image_url_medium", &p.image_urls.medium),
                ("image_url_small", &p.image_urls.small),
                ("gender", &p.gender),
                ("bio", &p.bio),
                ("location", &p.location),
            ];
            for (name, value) in optional {
                if let Some(v) = value {
                    el.push(leaf(name, v.as_str()));
                }
            }
            el.push(leaf("searchable", bool_text(p.searchable)));
            el.push(leaf("nsfw", bool_text(p.nsfw)));
            if let Some(tags) = tags_element(&p.tags) {
                el.push(tags);
            }
            (PROFILE, el)
        }
        Entity::Retraction(r) => {
            let el = XmlElement::new(RETRACTION)
                .with_child(leaf("guid", r.id.as_str()))
                .with_child(leaf("author", r.author.as_str()))
                .with_child(leaf("target_guid", r.target.id.as_str()))
                .with_child(leaf("target_type", class_name(r.target.kind)))
                .with_child(leaf("created_at", r.created_at.to_legacy_format()));
            (RETRACTION, el)
        }
        Entity::Relayable(r) => return encode_relayable(r),
    };
    for child in extension_elements(name, entity.extensions())? {
        element.push(child);
    }
    Ok(element)
}

/// `tag_string` when every tag is a single word, otherwise a `tags` array.
fn tags_element(tags: &[String]) -> Option<XmlElement> {
    if tags.is_empty() {
        return None;
    }
    if tags.iter().all(|t| !t.is_empty() && !t.contains(char::is_whitespace)) {
        let tag_string = tags.iter().map(|t| format!("#{t}")).collect::<Vec<_>>().join(" ");
        return Some(leaf("tag_string", tag_string));
    }
    let mut list = XmlElement::new("tags").with_attribute("type", "array");
    for tag in tags {
        list.push(leaf("tag", tag.as_str()));
    }
    Some(list)
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

fn encode_relayable(r: &Relayable) -> Result<XmlElement, EncodeError> {
    if matches!(*r.inner, Entity::Relayable(_)) {
        return Err(EncodeError::UnsupportedEntity {
            protocol: PROTOCOL,
            kind: EntityKind::Relayable,
            reason: "relayables cannot be nested".into(),
        });
    }
    let mut element = encode_entity(&r.inner)?;
    element.push(signature_element(AUTHOR_SIGNATURE, r.author_signature.as_ref()));
    element.push(signature_element(PARENT_AUTHOR_SIGNATURE, r.relay_signature.as_ref()));
    Ok(element)
}

fn signature_element(name: &str, signature: Option<&RelaySignature>) -> XmlElement {
    match signature {
        None => XmlElement::new(name),
        Some(sig) => XmlElement::new(name)
            .with_attribute("signer", sig.signer.as_str())
            .with_attribute("alg", sig.signature.algorithm.as_str())
            .with_text(sig.signature.to_base64()),
    }
}

fn extension_elements(element: &str, extensions: &ExtensionBag) -> Result<Vec<XmlElement>, EncodeError> {
    let reserved = known_children(element);
    extensions
        .iter()
        .map(|(name, value)| {
            if reserved.contains(&name.as_str()) || name == AUTHOR_SIGNATURE || name == PARENT_AUTHOR_SIGNATURE {
                return Err(EncodeError::ReservedFieldName {
                    protocol: PROTOCOL,
                    field: name.clone(),
                });
            }
            value_element(name, value, name)
        })
        .collect()
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !name.to_ascii_lowercase().starts_with("xml")
}

/// Typed element for an extension value. `field` names the top-level
/// extension for error reporting.
fn value_element(name: &str, value: &FieldValue, field: &str) -> Result<XmlElement, EncodeError> {
    if !is_xml_name(name) {
        return Err(EncodeError::InvalidFieldName {
            protocol: PROTOCOL,
            field: name.to_string(),
        });
    }
    let el = XmlElement::new(name);
    let el = match value {
        FieldValue::Null => el.with_attribute("nil", "true"),
        FieldValue::Bool(b) => el.with_attribute("type", "boolean").with_text(bool_text(*b)),
        FieldValue::Integer(n) => el.with_attribute("type", "integer").with_text(n.to_string()),
        FieldValue::Float(f) if !f.is_finite() => {
            return Err(EncodeError::NonFiniteNumber {
                field: field.to_string(),
            })
        }
        FieldValue::Float(f) => el.with_attribute("type", "float").with_text(f.to_string()),
        FieldValue::Text(s) => el.with_text(s.as_str()),
        FieldValue::Timestamp(ts) => el.with_attribute("type", "datetime").with_text(ts.to_iso8601()),
        FieldValue::List(items) => {
            let mut el = el.with_attribute("type", "array");
            for item in items {
                el.push(value_element("item", item, field)?);
            }
            el
        }
        FieldValue::Map(map) => {
            let mut el = el.with_attribute("type", "map");
            for (key, item) in map {
                el.push(value_element(key, item, field)?);
            }
            el
        }
    };
    Ok(el)
}

// ─── Decoding ───────────────────────────────────────────────────────

fn decode_entity(element: &XmlElement) -> Result<Entity, DecodeError> {
    let name = element.local_name();
    let known = known_children(name);
    if known.is_empty() {
        return Err(DecodeError::UnknownEntityType {
            protocol: PROTOCOL,
            type_tag: name.to_string(),
        });
    }
    reject_duplicates(element)?;

    let fields = Fields(element);
    let (kind, bag) = match name {
        POST => (EntityKind::Post, post_bag(&fields)),
        COMMENT => (EntityKind::Comment, comment_bag(&fields)),
        LIKE => (EntityKind::Reaction, like_bag(&fields)),
        REQUEST => (EntityKind::Follow, request_bag(&fields)),
        CONTACT => contact_bag(&fields),
        PROFILE => (EntityKind::ProfileUpdate, profile_bag(&fields)),
        _ => (EntityKind::Retraction, retraction_bag(&fields)),
    };
    let bag = bag.map_err(invalid_field)?;

    let mut extensions = BTreeMap::new();
    for child in &element.children {
        let local = child.local_name();
        if known.contains(&local) || local == AUTHOR_SIGNATURE || local == PARENT_AUTHOR_SIGNATURE {
            continue;
        }
        extensions.insert(local.to_string(), element_value(child).map_err(invalid_field)?);
    }

    let author_sig = element.child(AUTHOR_SIGNATURE);
    let relay_sig = element.child(PARENT_AUTHOR_SIGNATURE);
    let relay = if author_sig.is_some() || relay_sig.is_some() {
        let author = bag.get("author").and_then(FieldValue::as_text).map(str::to_string);
        Some((
            author_sig.and_then(|el| signature_value(el, author.as_deref())),
            relay_sig.and_then(|el| signature_value(el, None)),
        ))
    } else {
        None
    };
    assemble_entity(PROTOCOL, kind, bag, extensions, relay)
}

fn reject_duplicates(element: &XmlElement) -> Result<(), DecodeError> {
    let mut seen = BTreeSet::new();
    for child in &element.children {
        let local = child.local_name();
        if local != "photo" && !seen.insert(local) {
            return Err(malformed(format!("<{}> repeats <{local}>", element.local_name())));
        }
    }
    Ok(())
}

/// Signature element as a mapping value; `None` when the element is empty.
fn signature_value(element: &XmlElement, default_signer: Option<&str>) -> Option<FieldValue> {
    let value = element.text.trim();
    if value.is_empty() {
        return None;
    }
    let mut map = BTreeMap::new();
    if let Some(signer) = element.attribute("signer").or(default_signer) {
        map.insert("signer".to_string(), FieldValue::from(signer));
    }
    let alg = element.attribute("alg").unwrap_or(LEGACY_ALGORITHM);
    map.insert("algorithm".to_string(), FieldValue::from(alg));
    map.insert("value".to_string(), FieldValue::from(value));
    Some(FieldValue::Map(map))
}

/// Read access to an entity element's leaf children.
struct Fields<'a>(&'a XmlElement);

impl Fields<'_> {
    /// Trimmed, non-empty text of the first child named by any of `names`.
    fn text(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .filter_map(|n| self.0.child_text(n))
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Untrimmed text of a content child.
    fn content(&self, name: &str) -> Option<String> {
        self.0.child_text(name).map(str::to_string)
    }

    /// Optional free text: kept verbatim, empty when the element is empty.
    fn insert_content(&self, bag: &mut ExtensionBag, key: &str, name: &str) {
        if let Some(v) = self.content(name) {
            bag.insert(key, v);
        }
    }

    fn insert_text(&self, bag: &mut ExtensionBag, key: &str, names: &[&str]) {
        if let Some(v) = self.text(names) {
            bag.insert(key, v);
        }
    }

    fn bool(&self, name: &str) -> Result<Option<bool>, ValidationError> {
        match self.text(&[name]).as_deref() {
            None => Ok(None),
            Some("true") | Some("1") => Ok(Some(true)),
            Some("false") | Some("0") => Ok(Some(false)),
            Some(other) => Err(ValidationError::invalid(name, format!("expected true or false, got {other:?}"))),
        }
    }

    fn common(&self, bag: &mut ExtensionBag, author_names: &[&str]) {
        self.insert_text(bag, "id", &["guid"]);
        self.insert_text(bag, "author", author_names);
        self.insert_text(bag, "created_at", &["created_at"]);
    }

    /// Use `guid` when present, otherwise derive a stable id.
    fn id_or_derived(&self, bag: &mut ExtensionBag, kind: EntityKind) -> Result<(), ValidationError> {
        if bag.contains_key("id") {
            return Ok(());
        }
        let author = bag.get("author").and_then(FieldValue::as_text).unwrap_or_default();
        let target = bag.get("target_id").and_then(FieldValue::as_text).unwrap_or_default();
        let id = EntityId::derived(kind.as_str(), &[author, target])?;
        bag.insert("id", id.as_str());
        Ok(())
    }
}

fn post_bag(f: &Fields<'_>) -> Result<ExtensionBag, ValidationError> {
    let mut bag = ExtensionBag::new();
    f.common(&mut bag, &["author", "diaspora_handle"]);
    bag.insert("text", f.content("raw_message").unwrap_or_default());
    bag.insert("public", f.bool("public")?.unwrap_or(false));
    f.insert_content(&mut bag, "provider_display_name", "provider_display_name");
    f.insert_content(&mut bag, "location", "location");
    let media = f
        .0
        .children_named("photo")
        .map(|photo| {
            let path = photo.child_text("remote_photo_path").unwrap_or_default();
            let name = photo.child_text("remote_photo_name").unwrap_or_default();
            FieldValue::Text(format!("{path}{name}"))
        })
        .collect();
    bag.insert("media", FieldValue::List(media));
    Ok(bag)
}

fn comment_bag(f: &Fields<'_>) -> Result<ExtensionBag, ValidationError> {
    let mut bag = ExtensionBag::new();
    f.common(&mut bag, &["author", "diaspora_handle"]);
    f.insert_text(&mut bag, "target_id", &["parent_guid"]);
    let parent = match f.text(&["parent_type"]) {
        Some(class) => kind_from_class("parent_type", &class)?,
        None => EntityKind::Post,
    };
    bag.insert("target_kind", parent.as_str());
    if let Some(text) = f.content("text") {
        bag.insert("text", text);
    }
    Ok(bag)
}

fn like_bag(f: &Fields<'_>) -> Result<ExtensionBag, ValidationError> {
    let mut bag = ExtensionBag::new();
    f.common(&mut bag, &["author", "diaspora_handle"]);
    f.insert_text(&mut bag, "target_id", &["parent_guid"]);
    let target = match f.text(&["target_type", "parent_type"]) {
        Some(class) => kind_from_class("target_type", &class)?,
        None => EntityKind::Post,
    };
    bag.insert("target_kind", target.as_str());
    let positive = f.bool("positive")?.unwrap_or(true);
    bag.insert("reaction", if positive { "like" } else { "dislike" });
    Ok(bag)
}

fn request_bag(f: &Fields<'_>) -> Result<ExtensionBag, ValidationError> {
    let mut bag = ExtensionBag::new();
    f.common(&mut bag, &["sender_handle"]);
    f.insert_text(&mut bag, "target_id", &["recipient_handle"]);
    bag.insert("target_kind", EntityKind::ProfileUpdate.as_str());
    f.id_or_derived(&mut bag, EntityKind::Follow)?;
    Ok(bag)
}

fn contact_bag(f: &Fields<'_>) -> (EntityKind, Result<ExtensionBag, ValidationError>) {
    let following = match f.bool("following") {
        Ok(v) => v.unwrap_or(false),
        Err(e) => return (EntityKind::Unfollow, Err(e)),
    };
    let kind = if following {
        EntityKind::Follow
    } else {
        EntityKind::Unfollow
    };
    let mut bag = ExtensionBag::new();
    f.common(&mut bag, &["author"]);
    f.insert_text(&mut bag, "target_id", &["recipient"]);
    bag.insert("target_kind", EntityKind::ProfileUpdate.as_str());
    let result = f.id_or_derived(&mut bag, kind).map(|()| bag);
    (kind, result)
}

fn profile_bag(f: &Fields<'_>) -> Result<ExtensionBag, ValidationError> {
    let mut bag = ExtensionBag::new();
    f.common(&mut bag, &["author", "diaspora_handle"]);
    // fedwire writes the whole name into first_name; older peers split it.
    let name = match (f.content("first_name"), f.text(&["last_name"])) {
        (Some(first), Some(last)) if !first.trim().is_empty() => Some(format!("{} {last}", first.trim())),
        (_, Some(last)) => Some(last),
        (first, None) => first,
    };
    if let Some(name) = name {
        bag.insert("name", name);
    }
    f.insert_content(&mut bag, "image_url_large", "image_url");
    f.insert_content(&mut bag, "image_url_medium", "image_url_medium");
    f.insert_content(&mut bag, "image_url_small", "image_url_small");
    f.insert_content(&mut bag, "gender", "gender");
    f.insert_content(&mut bag, "bio", "bio");
    f.insert_content(&mut bag, "location", "location");
    for key in ["searchable", "nsfw"] {
        if let Some(b) = f.bool(key)? {
            bag.insert(key, b);
        }
    }
    let tags: Vec<FieldValue> = match f.0.child("tags") {
        Some(list) => list.children.iter().map(|t| FieldValue::Text(t.text.clone())).collect(),
        None => f
            .text(&["tag_string"])
            .unwrap_or_default()
            .split_whitespace()
            .map(|t| t.strip_prefix('#').unwrap_or(t))
            .filter(|t| !t.is_empty())
            .map(FieldValue::from)
            .collect(),
    };
    bag.insert("tags", FieldValue::List(tags));
    f.id_or_derived(&mut bag, EntityKind::ProfileUpdate)?;
    Ok(bag)
}

fn retraction_bag(f: &Fields<'_>) -> Result<ExtensionBag, ValidationError> {
    let mut bag = ExtensionBag::new();
    f.common(&mut bag, &["author", "diaspora_handle"]);
    f.insert_text(&mut bag, "target_id", &["target_guid", "post_guid"]);
    if let Some(class) = f.text(&["target_type", "type"]) {
        bag.insert("target_kind", kind_from_class("target_type", &class)?.as_str());
    }
    f.id_or_derived(&mut bag, EntityKind::Retraction)?;
    Ok(bag)
}

/// Interpret a typed extension element.
fn element_value(element: &XmlElement) -> Result<FieldValue, ValidationError> {
    let field = element.local_name();
    if element.attribute("nil") == Some("true") {
        return Ok(FieldValue::Null);
    }
    let text = element.text.trim();
    let value = match element.attribute("type") {
        Some("integer") => FieldValue::Integer(
            text.parse()
                .map_err(|_| ValidationError::invalid(field, format!("{text:?} is not an integer")))?,
        ),
        Some("float") => {
            let f: f64 = text
                .parse()
                .map_err(|_| ValidationError::invalid(field, format!("{text:?} is not a number")))?;
            if !f.is_finite() {
                return Err(ValidationError::invalid(field, "number must be finite"));
            }
            FieldValue::Float(f)
        }
        Some("boolean") => match text {
            "true" => FieldValue::Bool(true),
            "false" => FieldValue::Bool(false),
            other => return Err(ValidationError::invalid(field, format!("{other:?} is not a boolean"))),
        },
        Some("datetime") => FieldValue::Timestamp(Timestamp::parse_wire(text)?),
        Some("array") => FieldValue::List(
            element
                .children
                .iter()
                .map(element_value)
                .collect::<Result<_, _>>()?,
        ),
        Some("map") => FieldValue::Map(map_children(element)?),
        Some("string") => FieldValue::Text(element.text.clone()),
        None if !element.children.is_empty() => FieldValue::Map(map_children(element)?),
        None => FieldValue::Text(element.text.clone()),
        Some(other) => return Err(ValidationError::invalid(field, format!("unknown value type {other:?}"))),
    };
    Ok(value)
}

fn map_children(element: &XmlElement) -> Result<BTreeMap<String, FieldValue>, ValidationError> {
    element
        .children
        .iter()
        .map(|c| Ok((c.local_name().to_string(), element_value(c)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedwire_core::{
        Comment, Follow, Handle, KeyId, Post, ProfileImages, ProfileUpdate, Reaction, ReactionKind, Retraction,
        SignatureAlgorithm, TaggedSignature, Unfollow,
    };

    fn ts() -> Timestamp {
        Timestamp::parse("2026-01-15T12:00:00Z").unwrap()
    }

    fn codec() -> XmlCodec {
        XmlCodec::default()
    }

    fn handle(s: &str) -> Handle {
        Handle::new(s).unwrap()
    }

    fn roundtrip(entity: Entity) {
        let bytes = codec().encode(&entity).unwrap();
        let decoded = codec().decode(&bytes).unwrap();
        assert_eq!(decoded, entity, "payload: {}", String::from_utf8_lossy(&bytes));
    }

    fn comment() -> Comment {
        Comment {
            id: EntityId::new("c1").unwrap(),
            author: handle("bob@example.org"),
            created_at: ts(),
            target: TargetRef::new("p1", EntityKind::Post),
            text: "nice <b>post</b> & more".into(),
            extensions: ExtensionBag::new(),
        }
    }

    #[test]
    fn test_post_roundtrip_with_media_and_extensions() {
        let mut post = Post::new(EntityId::new("p1").unwrap(), handle("alice@example"), ts(), "hello");
        post.public = false;
        post.location = Some("Helsinki".into());
        post.provider_display_name = Some("fedwire".into());
        post.media = vec!["https://example.org/uploads/a.jpg".into(), "https://example.org/b.png".into()];
        post.extensions = ExtensionBag::new()
            .with("sensitive", true)
            .with("score", 3i64)
            .with("ratio", FieldValue::Float(0.25))
            .with("edited_at", ts())
            .with("nothing", FieldValue::Null)
            .with("langs", FieldValue::List(vec!["en".into(), "fi".into()]))
            .with(
                "meta",
                FieldValue::Map([("k".to_string(), FieldValue::from("v"))].into_iter().collect()),
            );
        roundtrip(Entity::Post(post));
    }

    #[test]
    fn test_every_variant_roundtrips() {
        let target = TargetRef::actor(&handle("bob@example.org"));
        roundtrip(Entity::Comment(Comment {
            target: TargetRef::new("c0", EntityKind::Comment),
            ..comment()
        }));
        roundtrip(Entity::Reaction(Reaction {
            id: EntityId::new("r1").unwrap(),
            author: handle("bob@example.org"),
            created_at: ts(),
            target: TargetRef::new("p1", EntityKind::Post),
            reaction: ReactionKind::Dislike,
            extensions: ExtensionBag::new(),
        }));
        roundtrip(Entity::Follow(Follow {
            id: EntityId::new("f1").unwrap(),
            author: handle("alice@example.org"),
            created_at: ts(),
            target: target.clone(),
            extensions: ExtensionBag::new(),
        }));
        roundtrip(Entity::Unfollow(Unfollow {
            id: EntityId::new("u1").unwrap(),
            author: handle("alice@example.org"),
            created_at: ts(),
            target,
            extensions: ExtensionBag::new(),
        }));
        roundtrip(Entity::ProfileUpdate(ProfileUpdate {
            id: EntityId::new("prof1").unwrap(),
            author: handle("alice@example.org"),
            created_at: ts(),
            name: Some("Alice Liddell".into()),
            bio: Some("hi".into()),
            location: None,
            gender: None,
            image_urls: ProfileImages {
                small: Some("https://example.org/s.png".into()),
                medium: None,
                large: Some("https://example.org/l.png".into()),
            },
            searchable: false,
            nsfw: true,
            tags: vec!["cats".into(), "rust".into()],
            extensions: ExtensionBag::new(),
        }));
        roundtrip(Entity::Retraction(Retraction {
            id: EntityId::new("x1").unwrap(),
            author: handle("alice@example.org"),
            created_at: ts(),
            target: TargetRef::new("r1", EntityKind::Reaction),
            extensions: ExtensionBag::new(),
        }));
    }

    #[test]
    fn test_relayable_roundtrip() {
        let sig = |signer: &str, b: u8| RelaySignature {
            signer: KeyId::new(signer).unwrap(),
            signature: TaggedSignature::new(SignatureAlgorithm::Ed25519, vec![b; 64]),
        };
        roundtrip(Entity::Relayable(Relayable {
            inner: Box::new(Entity::Comment(comment())),
            author_signature: Some(sig("bob@example.org", 1)),
            relay_signature: Some(sig("alice@example.org", 2)),
        }));
        roundtrip(Entity::Relayable(Relayable::unsigned(Entity::Comment(comment()))));
    }

    #[test]
    fn test_decode_legacy_post_fixture() {
        let payload = br#"<XML>
          <post>
            <status_message>
              <raw_message>((status message))</raw_message>
              <guid>0f4a2bd0e6c2012ec8e2003048fa6b52</guid>
              <diaspora_handle>alice@alice.diaspora.example.org</diaspora_handle>
              <public>false</public>
              <created_at>2011-07-20 01:36:07 UTC</created_at>
            </status_message>
          </post>
        </XML>"#;
        let Entity::Post(post) = codec().decode(payload).unwrap() else {
            panic!("expected a post");
        };
        assert_eq!(post.text, "((status message))");
        assert_eq!(post.id.as_str(), "0f4a2bd0e6c2012ec8e2003048fa6b52");
        assert!(!post.public);
        assert_eq!(post.created_at.to_iso8601(), "2011-07-20T01:36:07Z");
        assert!(post.extensions.is_empty());
    }

    #[test]
    fn test_decode_legacy_request_derives_id() {
        let payload = br#"<XML><post><request>
            <sender_handle>bob@example.com</sender_handle>
            <recipient_handle>alice@alice.diaspora.example.org</recipient_handle>
            <created_at>2026-01-15 12:00:00 UTC</created_at>
        </request></post></XML>"#;
        let Entity::Follow(follow) = codec().decode(payload).unwrap() else {
            panic!("expected a follow");
        };
        assert_eq!(follow.author.as_str(), "bob@example.com");
        assert_eq!(follow.target, TargetRef::actor(&handle("alice@alice.diaspora.example.org")));
        assert_eq!(follow.id.as_str().len(), 64);
    }

    #[test]
    fn test_decode_legacy_profile_fixture() {
        let payload = br#"<XML><post><profile>
            <diaspora_handle>bob@example.com</diaspora_handle>
            <first_name>Bob Bobertson</first_name>
            <last_name></last_name>
            <image_url>https://example.com/l.jpg</image_url>
            <image_url_small>https://example.com/s.jpg</image_url_small>
            <image_url_medium>https://example.com/m.jpg</image_url_medium>
            <gender></gender>
            <bio>A cool bio</bio>
            <location>Helsinki</location>
            <searchable>true</searchable>
            <nsfw>false</nsfw>
            <tag_string>#socialfederation #federation</tag_string>
            <created_at>2026-01-15 12:00:00 UTC</created_at>
        </profile></post></XML>"#;
        let Entity::ProfileUpdate(p) = codec().decode(payload).unwrap() else {
            panic!("expected a profile");
        };
        assert_eq!(p.name.as_deref(), Some("Bob Bobertson"));
        assert_eq!(p.gender.as_deref(), Some(""));
        assert_eq!(p.image_urls.medium.as_deref(), Some("https://example.com/m.jpg"));
        assert_eq!(p.tags, vec!["socialfederation".to_string(), "federation".to_string()]);
        assert!(p.searchable);
    }

    #[test]
    fn test_optional_text_kept_verbatim() {
        let profile = ProfileUpdate {
            id: EntityId::new("prof2").unwrap(),
            author: handle("alice@example.org"),
            created_at: ts(),
            name: Some(" Alice ".into()),
            bio: Some("line one\n".into()),
            location: Some(String::new()),
            gender: Some("  ".into()),
            image_urls: ProfileImages::default(),
            searchable: true,
            nsfw: false,
            tags: vec!["two words".into(), "#hash".into(), String::new()],
            extensions: ExtensionBag::new(),
        };
        roundtrip(Entity::ProfileUpdate(profile));

        let mut post = Post::new(EntityId::new("p2").unwrap(), handle("alice@example"), ts(), "hi");
        post.provider_display_name = Some(" app ".into());
        post.location = Some("\tHelsinki".into());
        post.media = vec![" https://example.org/a.jpg".into()];
        roundtrip(Entity::Post(post));
    }

    #[test]
    fn test_tags_written_as_tag_string_when_single_words() {
        let profile = ProfileUpdate {
            id: EntityId::new("prof3").unwrap(),
            author: handle("alice@example.org"),
            created_at: ts(),
            name: None,
            bio: None,
            location: None,
            gender: None,
            image_urls: ProfileImages::default(),
            searchable: true,
            nsfw: false,
            tags: vec!["#x".into(), "rust".into()],
            extensions: ExtensionBag::new(),
        };
        let bytes = codec().encode(&Entity::ProfileUpdate(profile.clone())).unwrap();
        let xml = String::from_utf8(bytes).unwrap();
        assert!(xml.contains("<tag_string>##x #rust</tag_string>"), "{xml}");
        assert!(!xml.contains("<tags"), "{xml}");
        roundtrip(Entity::ProfileUpdate(profile));
    }

    #[test]
    fn test_contact_following_decodes_as_follow() {
        let payload = br#"<contact><author>a@x.org</author><recipient>b@y.org</recipient>
            <following>true</following><sharing>true</sharing>
            <created_at>2026-01-15T12:00:00Z</created_at></contact>"#;
        assert_eq!(codec().decode(payload).unwrap().kind(), EntityKind::Follow);
    }

    #[test]
    fn test_unknown_element_type() {
        let err = codec().decode(b"<XML><post><poll><guid>1</guid></poll></post></XML>").unwrap_err();
        assert!(matches!(err, DecodeError::UnknownEntityType { type_tag, .. } if type_tag == "poll"));
    }

    #[test]
    fn test_missing_field_reported() {
        let payload = b"<comment><guid>c1</guid><parent_guid>p1</parent_guid><text>hi</text>\
            <created_at>2026-01-15T12:00:00Z</created_at></comment>";
        let err = codec().decode(payload).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidField { source: ValidationError::MissingRequiredField { ref field, .. }, .. }
                if field == "author"
        ));
    }

    #[test]
    fn test_malformed_and_oversized() {
        assert!(matches!(
            codec().decode(b"<comment><guid>c1</comment>"),
            Err(DecodeError::MalformedSyntax { .. })
        ));
        let small = XmlCodec::new(CodecLimits {
            max_payload_bytes: 8,
            ..CodecLimits::default()
        });
        assert!(matches!(
            small.decode(b"<comment></comment>"),
            Err(DecodeError::PayloadTooLarge { size: 19, limit: 8 })
        ));
    }

    #[test]
    fn test_doctype_rejected() {
        let payload = b"<!DOCTYPE x [<!ENTITY a \"aaaa\">]><comment><text>&a;</text></comment>";
        assert!(matches!(codec().decode(payload), Err(DecodeError::MalformedSyntax { .. })));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let payload = b"<comment><guid>c1</guid><guid>c2</guid></comment>";
        assert!(matches!(codec().decode(payload), Err(DecodeError::MalformedSyntax { .. })));
    }

    #[test]
    fn test_reserved_extension_name_refused() {
        let mut post = Post::new(EntityId::new("p1").unwrap(), handle("alice@example"), ts(), "x");
        post.extensions.insert("guid", "spoofed");
        let err = codec().encode(&Entity::Post(post)).unwrap_err();
        assert!(matches!(err, EncodeError::ReservedFieldName { field, .. } if field == "guid"));
    }

    #[test]
    fn test_invalid_extension_name_refused() {
        let mut post = Post::new(EntityId::new("p1").unwrap(), handle("alice@example"), ts(), "x");
        post.extensions.insert("as:sensitive", true);
        assert!(matches!(
            codec().encode(&Entity::Post(post)),
            Err(EncodeError::InvalidFieldName { .. })
        ));
    }

    #[test]
    fn test_non_finite_extension_refused() {
        let mut post = Post::new(EntityId::new("p1").unwrap(), handle("alice@example"), ts(), "x");
        post.extensions.insert("score", FieldValue::Float(f64::NAN));
        assert!(matches!(
            codec().encode(&Entity::Post(post)),
            Err(EncodeError::NonFiniteNumber { .. })
        ));
    }

    #[test]
    fn test_follow_requires_actor_target() {
        let follow = Follow {
            id: EntityId::new("f1").unwrap(),
            author: handle("alice@example.org"),
            created_at: ts(),
            target: TargetRef::new("p1", EntityKind::Post),
            extensions: ExtensionBag::new(),
        };
        assert!(matches!(
            codec().encode(&Entity::Follow(follow)),
            Err(EncodeError::UnsupportedEntity { .. })
        ));
    }

    #[test]
    fn test_encoding_is_canonical() {
        let bytes = codec().encode(&Entity::Comment(comment())).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("<XML><post><comment><guid>c1</guid>"));
        assert!(text.contains("&lt;b&gt;post&lt;/b&gt; &amp; more"));
    }
}
