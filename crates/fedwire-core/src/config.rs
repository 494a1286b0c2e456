//! # Engine Configuration
//!
//! Tunable ceilings and opt-ins shared by codecs, the envelope engine, the
//! validator, and the dispatcher. Every field has a default, so a YAML
//! document only needs the keys it overrides.
//!
//! ```yaml
//! max_payload_bytes: 131072
//! max_clock_skew_secs: 60
//! accept_plain_inbound: true
//! ```
//!
//! Environment overrides use the `FEDWIRE_` prefix with the field name in
//! upper case, e.g. `FEDWIRE_MAX_PAYLOAD_BYTES=131072`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::xml::XmlLimits;

const ENV_PREFIX: &str = "FEDWIRE_";

/// Limits and policy for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Byte ceiling on any inbound payload or envelope.
    pub max_payload_bytes: usize,
    /// Maximum XML element or JSON value nesting.
    pub max_nesting_depth: usize,
    /// Maximum elements in one XML document.
    pub max_xml_elements: usize,
    /// Tolerance for entity timestamps ahead of the current time.
    pub max_clock_skew_secs: i64,
    /// Maximum values, counted recursively, in an extension bag.
    pub max_extension_entries: usize,
    /// Maximum approximate encoded size of an extension bag.
    pub max_extension_bytes: usize,
    /// Default for the plain-mode opt-in on unwrap.
    pub accept_plain_inbound: bool,
    /// Whether wrapping may produce unsigned envelopes.
    pub allow_plain_outbound: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 256 * 1024,
            max_nesting_depth: 32,
            max_xml_elements: 4096,
            max_clock_skew_secs: 300,
            max_extension_entries: 64,
            max_extension_bytes: 16 * 1024,
            accept_plain_inbound: false,
            allow_plain_outbound: false,
        }
    }
}

impl EngineConfig {
    /// Parse a YAML document and validate the result.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `FEDWIRE_*` process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by values from `lookup`, keyed by
    /// `FEDWIRE_<FIELD>`. Unset keys keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |field: &str| lookup(&format!("{ENV_PREFIX}{}", field.to_ascii_uppercase()));

        override_with(&mut config.max_payload_bytes, "max_payload_bytes", get("max_payload_bytes"))?;
        override_with(&mut config.max_nesting_depth, "max_nesting_depth", get("max_nesting_depth"))?;
        override_with(&mut config.max_xml_elements, "max_xml_elements", get("max_xml_elements"))?;
        override_with(&mut config.max_clock_skew_secs, "max_clock_skew_secs", get("max_clock_skew_secs"))?;
        override_with(
            &mut config.max_extension_entries,
            "max_extension_entries",
            get("max_extension_entries"),
        )?;
        override_with(&mut config.max_extension_bytes, "max_extension_bytes", get("max_extension_bytes"))?;
        override_with(&mut config.accept_plain_inbound, "accept_plain_inbound", get("accept_plain_inbound"))?;
        override_with(&mut config.allow_plain_outbound, "allow_plain_outbound", get("allow_plain_outbound"))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject zero ceilings and a negative skew tolerance.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ceilings = [
            ("max_payload_bytes", self.max_payload_bytes),
            ("max_nesting_depth", self.max_nesting_depth),
            ("max_xml_elements", self.max_xml_elements),
            ("max_extension_entries", self.max_extension_entries),
            ("max_extension_bytes", self.max_extension_bytes),
        ];
        if let Some((key, _)) = ceilings.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::InvalidValue {
                key: (*key).to_string(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.max_clock_skew_secs < 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_clock_skew_secs".into(),
                reason: "must not be negative".into(),
            });
        }
        Ok(())
    }

    /// Parser limits derived from this configuration.
    pub fn xml_limits(&self) -> XmlLimits {
        XmlLimits {
            max_depth: self.max_nesting_depth,
            max_elements: self.max_xml_elements,
        }
    }
}

fn override_with<T: FromStr>(slot: &mut T, key: &str, raw: Option<String>) -> Result<(), ConfigError>
where
    T::Err: std::fmt::Display,
{
    if let Some(raw) = raw {
        *slot = raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("cannot parse {raw:?}: {e}"),
        })?;
    }
    Ok(())
}
