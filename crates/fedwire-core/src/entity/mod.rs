//! # Canonical Entity Model
//!
//! Protocol-neutral representations of federated objects. [`Entity`] is a
//! closed tagged variant: every codec, validator rule, and relay path
//! matches on it exhaustively, so adding a variant is a compile error at
//! every site that must handle it.
//!
//! Entities are immutable value objects. "Mutation" of a published object
//! is expressed as a new entity (a [`Retraction`] referencing the original
//! id), never an in-place edit.
//!
//! An actor appears in the target graph through its profile: `Follow` and
//! `Unfollow` target a [`TargetRef`] of kind [`EntityKind::ProfileUpdate`]
//! whose id is the followed account's handle.

mod bag;

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::identity::{EntityId, Handle};
use crate::signature::RelaySignature;
use crate::temporal::Timestamp;
use crate::value::ExtensionBag;

pub use bag::{from_extension_bag, to_extension_bag};

/// Variant tag of an [`Entity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Post,
    Comment,
    Reaction,
    Follow,
    Unfollow,
    ProfileUpdate,
    Retraction,
    Relayable,
}

impl EntityKind {
    /// Every kind, in declaration order.
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Post,
        EntityKind::Comment,
        EntityKind::Reaction,
        EntityKind::Follow,
        EntityKind::Unfollow,
        EntityKind::ProfileUpdate,
        EntityKind::Retraction,
        EntityKind::Relayable,
    ];

    /// The snake_case variant tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
            Self::Reaction => "reaction",
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
            Self::ProfileUpdate => "profile_update",
            Self::Retraction => "retraction",
            Self::Relayable => "relayable",
        }
    }

    /// Whether entities of this kind may be wrapped in a [`Relayable`].
    pub fn is_relay_capable(&self) -> bool {
        matches!(self, Self::Comment | Self::Reaction | Self::Retraction)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown entity kind {s:?}"))
    }
}

/// Reference from one entity to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TargetRef {
    /// Id of the referenced entity (a handle for actor targets).
    pub id: String,
    /// Variant of the referenced entity.
    pub kind: EntityKind,
}

impl TargetRef {
    pub fn new(id: impl Into<String>, kind: EntityKind) -> Self {
        Self { id: id.into(), kind }
    }

    /// A reference to an actor, represented by its profile.
    pub fn actor(handle: &Handle) -> Self {
        Self::new(handle.as_str(), EntityKind::ProfileUpdate)
    }
}

/// Polarity of a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    Like,
    Dislike,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Dislike => "dislike",
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Like)
    }
}

impl FromStr for ReactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(Self::Like),
            "dislike" => Ok(Self::Dislike),
            other => Err(format!("unknown reaction {other:?}")),
        }
    }
}

/// A top-level status message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: EntityId,
    pub author: Handle,
    pub created_at: Timestamp,
    /// Body text (markdown or HTML, as the protocol carries it).
    pub text: String,
    /// Whether the post is addressed to the public collection.
    pub public: bool,
    /// Name of the client application that created the post.
    pub provider_display_name: Option<String>,
    /// Free-form place name.
    pub location: Option<String>,
    /// Attached media URLs in display order.
    pub media: Vec<String>,
    pub extensions: ExtensionBag,
}

impl Post {
    /// A public post with no media or optional fields.
    pub fn new(id: EntityId, author: Handle, created_at: Timestamp, text: impl Into<String>) -> Self {
        Self {
            id,
            author,
            created_at,
            text: text.into(),
            public: true,
            provider_display_name: None,
            location: None,
            media: Vec::new(),
            extensions: ExtensionBag::new(),
        }
    }

    /// Hashtags in the text, lowercased, deduplicated and sorted.
    pub fn tags(&self) -> Vec<String> {
        extract_tags(&self.text)
    }
}

/// A reply to a post or to another comment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub id: EntityId,
    pub author: Handle,
    pub created_at: Timestamp,
    pub target: TargetRef,
    pub text: String,
    pub extensions: ExtensionBag,
}

/// A like or dislike of a post or comment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reaction {
    pub id: EntityId,
    pub author: Handle,
    pub created_at: Timestamp,
    pub target: TargetRef,
    pub reaction: ReactionKind,
    pub extensions: ExtensionBag,
}

/// A request to follow an actor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Follow {
    pub id: EntityId,
    pub author: Handle,
    pub created_at: Timestamp,
    pub target: TargetRef,
    pub extensions: ExtensionBag,
}

/// Withdrawal of a follow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unfollow {
    pub id: EntityId,
    pub author: Handle,
    pub created_at: Timestamp,
    pub target: TargetRef,
    pub extensions: ExtensionBag,
}

/// Profile image URLs by size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileImages {
    pub small: Option<String>,
    pub medium: Option<String>,
    pub large: Option<String>,
}

/// The current state of an actor's public profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileUpdate {
    pub id: EntityId,
    pub author: Handle,
    pub created_at: Timestamp,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub gender: Option<String>,
    pub image_urls: ProfileImages,
    /// Whether the profile may appear in directory searches.
    pub searchable: bool,
    /// Whether the account's content is not safe for work.
    pub nsfw: bool,
    pub tags: Vec<String>,
    pub extensions: ExtensionBag,
}

/// Withdrawal of a previously published entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Retraction {
    pub id: EntityId,
    pub author: Handle,
    pub created_at: Timestamp,
    pub target: TargetRef,
    pub extensions: ExtensionBag,
}

/// An entity that carries relay-signature semantics: the author signs its
/// canonical form and an intermediate actor that forwards it may add a
/// second signature over the same form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relayable {
    pub inner: Box<Entity>,
    pub author_signature: Option<RelaySignature>,
    pub relay_signature: Option<RelaySignature>,
}

impl Relayable {
    /// Wrap an entity without signatures.
    pub fn unsigned(inner: Entity) -> Self {
        Self {
            inner: Box::new(inner),
            author_signature: None,
            relay_signature: None,
        }
    }
}

/// A canonical federated object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Post(Post),
    Comment(Comment),
    Reaction(Reaction),
    Follow(Follow),
    Unfollow(Unfollow),
    ProfileUpdate(ProfileUpdate),
    Retraction(Retraction),
    Relayable(Relayable),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Post(_) => EntityKind::Post,
            Self::Comment(_) => EntityKind::Comment,
            Self::Reaction(_) => EntityKind::Reaction,
            Self::Follow(_) => EntityKind::Follow,
            Self::Unfollow(_) => EntityKind::Unfollow,
            Self::ProfileUpdate(_) => EntityKind::ProfileUpdate,
            Self::Retraction(_) => EntityKind::Retraction,
            Self::Relayable(_) => EntityKind::Relayable,
        }
    }

    /// Id of the entity; a relayable reports its inner entity's id.
    pub fn id(&self) -> &EntityId {
        match self {
            Self::Post(e) => &e.id,
            Self::Comment(e) => &e.id,
            Self::Reaction(e) => &e.id,
            Self::Follow(e) => &e.id,
            Self::Unfollow(e) => &e.id,
            Self::ProfileUpdate(e) => &e.id,
            Self::Retraction(e) => &e.id,
            Self::Relayable(r) => r.inner.id(),
        }
    }

    pub fn author(&self) -> &Handle {
        match self {
            Self::Post(e) => &e.author,
            Self::Comment(e) => &e.author,
            Self::Reaction(e) => &e.author,
            Self::Follow(e) => &e.author,
            Self::Unfollow(e) => &e.author,
            Self::ProfileUpdate(e) => &e.author,
            Self::Retraction(e) => &e.author,
            Self::Relayable(r) => r.inner.author(),
        }
    }

    pub fn created_at(&self) -> Timestamp {
        match self {
            Self::Post(e) => e.created_at,
            Self::Comment(e) => e.created_at,
            Self::Reaction(e) => e.created_at,
            Self::Follow(e) => e.created_at,
            Self::Unfollow(e) => e.created_at,
            Self::ProfileUpdate(e) => e.created_at,
            Self::Retraction(e) => e.created_at,
            Self::Relayable(r) => r.inner.created_at(),
        }
    }

    pub fn target(&self) -> Option<&TargetRef> {
        match self {
            Self::Post(_) | Self::ProfileUpdate(_) => None,
            Self::Comment(e) => Some(&e.target),
            Self::Reaction(e) => Some(&e.target),
            Self::Follow(e) => Some(&e.target),
            Self::Unfollow(e) => Some(&e.target),
            Self::Retraction(e) => Some(&e.target),
            Self::Relayable(r) => r.inner.target(),
        }
    }

    pub fn extensions(&self) -> &ExtensionBag {
        match self {
            Self::Post(e) => &e.extensions,
            Self::Comment(e) => &e.extensions,
            Self::Reaction(e) => &e.extensions,
            Self::Follow(e) => &e.extensions,
            Self::Unfollow(e) => &e.extensions,
            Self::ProfileUpdate(e) => &e.extensions,
            Self::Retraction(e) => &e.extensions,
            Self::Relayable(r) => r.inner.extensions(),
        }
    }

    /// The entity with any relayable wrapper removed.
    pub fn unwrap_relayable(&self) -> &Entity {
        match self {
            Self::Relayable(r) => r.inner.unwrap_relayable(),
            other => other,
        }
    }
}

fn extract_tags(text: &str) -> Vec<String> {
    let mut tags = BTreeSet::new();
    let mut chars = text.char_indices().peekable();
    let mut prev: Option<char> = None;
    while let Some((i, c)) = chars.next() {
        let starts_tag = c == '#' && prev.map_or(true, |p| !p.is_alphanumeric() && p != '&');
        prev = Some(c);
        if !starts_tag {
            continue;
        }
        let rest = &text[i + 1..];
        let tag: String = rest
            .chars()
            .take_while(|ch| ch.is_alphanumeric() || *ch == '_' || *ch == '-')
            .collect();
        if !tag.is_empty() {
            tags.insert(tag.to_lowercase());
        }
    }
    tags.into_iter().collect()
}
