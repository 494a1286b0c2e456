//! # Dispatcher
//!
//! Turns raw inbound bytes into a protocol and a parsed [`Envelope`].
//!
//! ```text
//! raw ──ceiling──▶ detect_protocol ──compare hint──▶ parse ──▶ (ProtocolId, Envelope)
//! ```
//!
//! ## Security Invariant
//!
//! The protocol used for parsing is always the detected one. A hint that
//! disagrees is logged and ignored, so a JSON-LD payload labelled as XML
//! can never be pushed through the XML path (or the reverse).

use fedwire_core::{DecodeError, EngineConfig, FederationError, ProtocolId};
use fedwire_envelope::{Envelope, EnvelopeEngine};

use crate::detect::detect_protocol;

/// Detects and parses inbound payloads, one message at a time.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    engine: EnvelopeEngine,
    max_payload_bytes: usize,
}

impl Dispatcher {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            engine: EnvelopeEngine::new(config),
            max_payload_bytes: config.max_payload_bytes,
        }
    }

    /// Determine the protocol of `raw`.
    ///
    /// `hint` is only compared against structural detection.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::PayloadTooLarge`] before inspection if `raw`
    ///   exceeds the ceiling.
    /// - [`fedwire_core::DispatchError`] if detection fails.
    pub fn detect(&self, raw: &[u8], hint: Option<ProtocolId>) -> Result<ProtocolId, FederationError> {
        self.check_ceiling(raw)?;
        let detected = detect_protocol(raw).map_err(|e| {
            tracing::debug!(size = raw.len(), error = %e, "protocol detection failed");
            e
        })?;
        match hint {
            Some(hint) if hint != detected => {
                tracing::warn!(hint = %hint, detected = %detected, "protocol hint disagrees with payload; using detected protocol");
            }
            _ => tracing::debug!(protocol = %detected, size = raw.len(), "protocol detected"),
        }
        Ok(detected)
    }

    /// Detect the protocol of `raw` and parse its envelope.
    ///
    /// # Errors
    ///
    /// Everything [`Dispatcher::detect`] returns, plus
    /// [`fedwire_core::EnvelopeError`] if the envelope container is
    /// malformed or uses an unsupported mode.
    pub fn dispatch(&self, raw: &[u8], hint: Option<ProtocolId>) -> Result<(ProtocolId, Envelope), FederationError> {
        let protocol = self.detect(raw, hint)?;
        let envelope = self.engine.parse(protocol, raw)?;
        Ok((protocol, envelope))
    }

    pub fn engine(&self) -> &EnvelopeEngine {
        &self.engine
    }

    fn check_ceiling(&self, raw: &[u8]) -> Result<(), DecodeError> {
        if raw.len() > self.max_payload_bytes {
            tracing::warn!(size = raw.len(), limit = self.max_payload_bytes, "inbound payload over ceiling");
            return Err(DecodeError::PayloadTooLarge {
                size: raw.len(),
                limit: self.max_payload_bytes,
            });
        }
        Ok(())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedwire_core::{DispatchError, EnvelopeError, EnvelopeMode};

    #[test]
    fn test_hint_never_overrides_detection() {
        let d = Dispatcher::default();
        let raw = br#"{"type":"Note","content":"hi"}"#;
        let (protocol, envelope) = d.dispatch(raw, Some(ProtocolId::XmlProtocol)).unwrap();
        assert_eq!(protocol, ProtocolId::JsonLdProtocol);
        assert_eq!(envelope.protocol(), ProtocolId::JsonLdProtocol);
        assert_eq!(envelope.mode(), EnvelopeMode::Plain);

        let raw = b"<status_message><text>hi</text></status_message>";
        let (protocol, _) = d.dispatch(raw, Some(ProtocolId::JsonLdProtocol)).unwrap();
        assert_eq!(protocol, ProtocolId::XmlProtocol);
    }

    #[test]
    fn test_ceiling_checked_before_detection() {
        let config = EngineConfig {
            max_payload_bytes: 8,
            ..EngineConfig::default()
        };
        let d = Dispatcher::new(&config);
        let err = d.detect(b"not any protocol at all", None).unwrap_err();
        assert!(matches!(
            err,
            FederationError::Decode(DecodeError::PayloadTooLarge { size: 23, limit: 8 })
        ));
    }

    #[test]
    fn test_detection_errors_propagate() {
        let d = Dispatcher::default();
        assert!(matches!(
            d.dispatch(b"[]", None),
            Err(FederationError::Dispatch(DispatchError::UnrecognizedProtocol(_)))
        ));
        assert!(matches!(
            d.dispatch(b"<a>}", Some(ProtocolId::XmlProtocol)),
            Err(FederationError::Dispatch(DispatchError::AmbiguousFormat(_)))
        ));
    }

    #[test]
    fn test_envelope_errors_propagate() {
        let d = Dispatcher::default();
        let err = d.dispatch(br#"{"type":"Note","signature":"x"}"#, None).unwrap_err();
        assert!(matches!(err, FederationError::Envelope(EnvelopeError::MalformedEnvelope { .. })));
    }
}
