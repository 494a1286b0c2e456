//! Structural limits applied before and during decoding.

use fedwire_core::{DecodeError, EngineConfig, ProtocolId, XmlLimits};

/// Ceilings a codec enforces on untrusted payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecLimits {
    /// Byte ceiling, checked before parsing.
    pub max_payload_bytes: usize,
    /// Maximum nesting of JSON values or XML elements.
    pub max_depth: usize,
    /// Maximum elements in one XML document.
    pub max_xml_elements: usize,
}

impl CodecLimits {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_payload_bytes: config.max_payload_bytes,
            max_depth: config.max_nesting_depth,
            max_xml_elements: config.max_xml_elements,
        }
    }

    pub fn xml(&self) -> XmlLimits {
        XmlLimits {
            max_depth: self.max_depth,
            max_elements: self.max_xml_elements,
        }
    }

    /// Reject payloads above the byte ceiling.
    pub fn check_size(&self, bytes: &[u8]) -> Result<(), DecodeError> {
        if bytes.len() > self.max_payload_bytes {
            return Err(DecodeError::PayloadTooLarge {
                size: bytes.len(),
                limit: self.max_payload_bytes,
            });
        }
        Ok(())
    }

    /// Reject JSON whose array/object nesting exceeds the depth limit,
    /// without building any values.
    pub fn check_json_depth(&self, bytes: &[u8]) -> Result<(), DecodeError> {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for &b in bytes {
            if in_string {
                match (escaped, b) {
                    (true, _) => escaped = false,
                    (false, b'\\') => escaped = true,
                    (false, b'"') => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' | b'[' => {
                    depth += 1;
                    if depth > self.max_depth {
                        return Err(DecodeError::MalformedSyntax {
                            protocol: ProtocolId::JsonLdProtocol,
                            reason: format!("nesting depth exceeds {}", self.max_depth),
                        });
                    }
                }
                b'}' | b']' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        Ok(())
    }
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_ceiling() {
        let limits = CodecLimits {
            max_payload_bytes: 4,
            ..CodecLimits::default()
        };
        assert!(limits.check_size(b"1234").is_ok());
        assert!(matches!(
            limits.check_size(b"12345"),
            Err(DecodeError::PayloadTooLarge { size: 5, limit: 4 })
        ));
    }

    #[test]
    fn test_json_depth() {
        let limits = CodecLimits {
            max_depth: 3,
            ..CodecLimits::default()
        };
        assert!(limits.check_json_depth(br#"{"a":{"b":[1]}}"#).is_ok());
        assert!(limits.check_json_depth(br#"{"a":{"b":[[1]]}}"#).is_err());
        assert!(limits.check_json_depth(br#"{"a":"[[[[[[[["}"#).is_ok());
        assert!(limits.check_json_depth(br#"{"a":"\"[[[[[[["}"#).is_ok());
    }
}
