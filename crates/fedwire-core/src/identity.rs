//! # Identity Newtypes
//!
//! Validated wrappers for the three identifier namespaces the engine
//! handles: entity ids, author handles, and signing key ids.
//!
//! ## Security Invariant
//!
//! Identifiers arrive from untrusted peers. Each newtype validates at
//! construction (including deserialization) so downstream code never sees
//! an identifier with embedded whitespace, control characters, or markup.

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::canonical::CanonicalBytes;
use crate::digest::sha256_hex;
use crate::error::ValidationError;

const MAX_ID_LEN: usize = 512;
const MAX_KEY_ID_LEN: usize = 1024;

/// Globally unique identifier of a federated entity: a GUID-style token or
/// an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Validate and wrap an identifier.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        check_token("id", &s, MAX_ID_LEN)?;
        if s.contains("://") {
            check_url("id", &s)?;
        } else if let Some(bad) = s.chars().find(|c| !is_guid_char(*c)) {
            return Err(ValidationError::invalid("id", format!("character {bad:?} is not permitted")));
        }
        Ok(Self(s))
    }

    /// Generate a fresh random identifier (UUID v4, simple form).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Derive a stable identifier from the parts that identify an entity on
    /// protocols that do not carry one (e.g. legacy relationship requests).
    pub fn derived(kind: &str, parts: &[&str]) -> Result<Self, ValidationError> {
        let mut items = Vec::with_capacity(parts.len() + 1);
        items.push(kind);
        items.extend_from_slice(parts);
        let canonical = CanonicalBytes::new(&items)
            .map_err(|e| ValidationError::invalid("id", e.to_string()))?;
        Ok(Self(sha256_hex(&canonical)))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is an absolute URL rather than a GUID.
    pub fn is_url(&self) -> bool {
        self.0.contains("://")
    }
}

/// Identity of the account that authored an entity: `user@host` or an
/// `http(s)` actor URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Handle(String);

impl Handle {
    /// Validate and wrap a handle. A single leading `@` is stripped.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s: String = s.into();
        let s = s.strip_prefix('@').map(str::to_string).unwrap_or(s);
        check_token("author", &s, MAX_ID_LEN)?;
        if s.contains("://") {
            let url = check_url("author", &s)?;
            if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
                return Err(ValidationError::invalid("author", "actor URL must be http(s) with a host"));
            }
            return Ok(Self(s));
        }
        let (local, domain) = s
            .split_once('@')
            .ok_or_else(|| ValidationError::invalid("author", "handle must be user@host or an actor URL"))?;
        if local.is_empty() || !local.chars().all(|c| c.is_ascii_alphanumeric() || "._+-".contains(c)) {
            return Err(ValidationError::invalid("author", format!("invalid local part {local:?}")));
        }
        if domain.is_empty()
            || domain.starts_with('.')
            || domain.ends_with('.')
            || !domain.chars().all(|c| c.is_ascii_alphanumeric() || ".-:".contains(c))
        {
            return Err(ValidationError::invalid("author", format!("invalid domain {domain:?}")));
        }
        Ok(Self(s))
    }

    /// The handle as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The host part of the handle, if it has one.
    pub fn domain(&self) -> Option<String> {
        if self.0.contains("://") {
            return Url::parse(&self.0).ok().and_then(|u| u.host_str().map(str::to_string));
        }
        self.0.split_once('@').map(|(_, d)| d.to_string())
    }
}

/// Identifier of a signing key, resolved through the key lookup collaborator.
///
/// Key ids name their owner: `alice@example.org`, `acct:alice@example.org`,
/// or `https://example.org/users/alice#main-key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyId(String);

impl KeyId {
    /// Validate and wrap a key id.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        check_token("key_id", &s, MAX_KEY_ID_LEN)?;
        Ok(Self(s))
    }

    /// The key id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The account that owns the key: the key id without a `#fragment` or
    /// an `acct:` prefix.
    pub fn owner(&self) -> &str {
        let s = self.0.strip_prefix("acct:").unwrap_or(&self.0);
        match s.split_once('#') {
            Some((owner, _)) => owner,
            None => s,
        }
    }

    /// Whether this key belongs to `handle`.
    pub fn is_owned_by(&self, handle: &Handle) -> bool {
        self.owner() == handle.as_str()
    }
}

macro_rules! string_newtype_impls {
    ($($ty:ident),*) => {$(
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = ValidationError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl From<$ty> for String {
            fn from(v: $ty) -> String {
                v.0
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    )*};
}

string_newtype_impls!(EntityId, Handle, KeyId);

fn check_token(field: &str, s: &str, max_len: usize) -> Result<(), ValidationError> {
    if s.is_empty() {
        return Err(ValidationError::invalid(field, "must not be empty"));
    }
    if s.len() > max_len {
        return Err(ValidationError::invalid(field, format!("longer than {max_len} bytes")));
    }
    if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::invalid(field, "must not contain whitespace or control characters"));
    }
    if s.chars().any(|c| matches!(c, '<' | '>' | '"' | '\'' | '\\' | '`')) {
        return Err(ValidationError::invalid(field, "must not contain markup or quote characters"));
    }
    Ok(())
}

fn check_url(field: &str, s: &str) -> Result<Url, ValidationError> {
    Url::parse(s).map_err(|e| ValidationError::invalid(field, format!("invalid URL: {e}")))
}

fn is_guid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_.:@#/+=~%".contains(c)
}
