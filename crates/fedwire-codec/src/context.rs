//! JSON-LD `@context` handling.
//!
//! Remote contexts are never fetched. A document must reference at least
//! one context from the bundled table; inline context objects may add term
//! definitions, prefixes, and `@vocab`. Type names are expanded to IRIs
//! against that context, so a document that redefines `Note` to point at a
//! foreign vocabulary is not mistaken for an ActivityStreams note.

use std::collections::BTreeMap;

use fedwire_core::{DecodeError, ProtocolId};
use serde_json::{Map, Value};

/// ActivityStreams 2.0 namespace.
pub(crate) const AS_NS: &str = "https://www.w3.org/ns/activitystreams#";
const AS_NS_HTTP: &str = "http://www.w3.org/ns/activitystreams#";

pub(crate) const ACTIVITYSTREAMS: &str = "https://www.w3.org/ns/activitystreams";
pub(crate) const SECURITY_V1: &str = "https://w3id.org/security/v1";
pub(crate) const FEDWIRE_CONTEXT: &str = "https://w3id.org/fedwire/v1";

/// The public addressing collection.
pub(crate) const PUBLIC: &str = "https://www.w3.org/ns/activitystreams#Public";

/// Contexts this engine knows without fetching.
const BUNDLED: &[(&str, Bundled)] = &[
    (ACTIVITYSTREAMS, Bundled::ActivityStreams),
    ("http://www.w3.org/ns/activitystreams", Bundled::ActivityStreams),
    ("https://www.w3.org/ns/activitystreams#", Bundled::ActivityStreams),
    ("https://litepub.social/litepub/context.jsonld", Bundled::ActivityStreams),
    (SECURITY_V1, Bundled::Security),
    ("https://w3id.org/security/v2", Bundled::Security),
    (FEDWIRE_CONTEXT, Bundled::Fedwire),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bundled {
    ActivityStreams,
    Security,
    Fedwire,
}

/// Compact type names the ActivityStreams context defines.
const AS_TYPES: &[&str] = &[
    "Activity",
    "Application",
    "Article",
    "Create",
    "Delete",
    "Dislike",
    "Document",
    "Follow",
    "Image",
    "Like",
    "Note",
    "Page",
    "Person",
    "Place",
    "Service",
    "Tombstone",
    "Undo",
    "Update",
];

/// The active context of one document.
#[derive(Debug, Default)]
pub(crate) struct ActiveContext {
    activity_streams: bool,
    vocab: Option<String>,
    terms: BTreeMap<String, String>,
}

impl ActiveContext {
    /// Read `@context` from a document's top-level object.
    pub(crate) fn from_document(doc: &Map<String, Value>) -> Result<Self, DecodeError> {
        let Some(context) = doc.get("@context") else {
            return Err(malformed("document has no @context"));
        };
        let mut active = Self::default();
        let mut recognized = false;
        let entries = match context {
            Value::Array(items) => items.as_slice(),
            other => std::slice::from_ref(other),
        };
        for entry in entries {
            match entry {
                Value::String(iri) => {
                    let bundled = BUNDLED.iter().find(|(known, _)| *known == iri.as_str());
                    match bundled {
                        Some((_, kind)) => {
                            recognized = true;
                            if *kind == Bundled::ActivityStreams {
                                active.activity_streams = true;
                            }
                        }
                        None => tracing::debug!(context = %iri, "ignoring unknown remote context"),
                    }
                }
                Value::Object(defs) => active.add_definitions(defs)?,
                Value::Null => {}
                _ => return Err(malformed("@context entries must be strings or objects")),
            }
        }
        if !recognized {
            return Err(malformed("@context references no recognized context"));
        }
        Ok(active)
    }

    fn add_definitions(&mut self, defs: &Map<String, Value>) -> Result<(), DecodeError> {
        for (term, definition) in defs {
            if term == "@vocab" {
                match definition {
                    Value::String(iri) => self.vocab = Some(iri.clone()),
                    Value::Null => self.vocab = None,
                    _ => return Err(malformed("@vocab must be a string")),
                }
                continue;
            }
            if term.starts_with('@') {
                continue;
            }
            let iri = match definition {
                Value::String(iri) => iri.clone(),
                Value::Object(def) => match def.get("@id") {
                    Some(Value::String(iri)) => iri.clone(),
                    _ => continue,
                },
                Value::Null => {
                    self.terms.remove(term);
                    continue;
                }
                _ => return Err(malformed(format!("term definition for {term:?} is not a string or object"))),
            };
            self.terms.insert(term.clone(), iri);
        }
        Ok(())
    }

    /// Expand a type name to an absolute IRI.
    pub(crate) fn expand(&self, name: &str) -> Option<String> {
        self.expand_depth(name, 0)
    }

    fn expand_depth(&self, name: &str, depth: usize) -> Option<String> {
        if depth > 4 {
            return None;
        }
        if let Some(iri) = self.terms.get(name) {
            if iri == name {
                return Some(iri.clone());
            }
            return self.expand_depth(iri, depth + 1);
        }
        if name.contains("://") {
            return Some(name.to_string());
        }
        if let Some((prefix, suffix)) = name.split_once(':') {
            if let Some(base) = self.terms.get(prefix) {
                return Some(format!("{base}{suffix}"));
            }
            if prefix == "as" && self.activity_streams {
                return Some(format!("{AS_NS}{suffix}"));
            }
            return None;
        }
        if self.activity_streams && AS_TYPES.contains(&name) {
            return Some(format!("{AS_NS}{name}"));
        }
        self.vocab.as_ref().map(|vocab| format!("{vocab}{name}"))
    }

    /// The ActivityStreams type name `name` denotes, if any.
    pub(crate) fn activity_type(&self, name: &str) -> Option<String> {
        let iri = self.expand(name)?;
        iri.strip_prefix(AS_NS)
            .or_else(|| iri.strip_prefix(AS_NS_HTTP))
            .map(str::to_string)
    }

    /// Whether `value` names the public collection.
    pub(crate) fn is_public(&self, value: &str) -> bool {
        value == PUBLIC || self.activity_type(value).as_deref() == Some("Public") || value == "Public"
    }
}

fn malformed(reason: impl Into<String>) -> DecodeError {
    DecodeError::MalformedSyntax {
        protocol: ProtocolId::JsonLdProtocol,
        reason: reason.into(),
    }
}

/// The `@context` value the encoder writes.
pub(crate) fn outbound_context() -> Value {
    Value::Array(vec![
        Value::from(ACTIVITYSTREAMS),
        Value::from(SECURITY_V1),
        Value::from(FEDWIRE_CONTEXT),
    ])
}
