//! # Envelope Values
//!
//! An [`Envelope`] is an immutable container around one serialized payload.
//! Its mode is not a separate flag: it is determined by which
//! [`EnvelopeBody`] variant the envelope holds, so a "signed" envelope
//! without a signature cannot be represented.
//!
//! Envelopes are built by the outbound lifecycle in
//! [`crate::lifecycle`] or parsed from wire bytes with
//! [`Envelope::from_wire`]. Verification borrows the envelope and never
//! mutates it.

use fedwire_core::{CanonicalBytes, EnvelopeError, EnvelopeMode, KeyId, ProtocolId, TaggedSignature, XmlLimits};
use fedwire_crypto::SealedBox;

use crate::wire;

/// Media type signed over in XML magic envelopes.
pub(crate) const MAGIC_DATA_TYPE: &str = "application/xml";

/// Encoding of magic-envelope data.
pub(crate) const MAGIC_ENCODING: &str = "base64url";

/// A payload in one of the three envelope modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    protocol: ProtocolId,
    body: EnvelopeBody,
}

/// Mode-specific contents of an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeBody {
    /// An unsigned payload.
    Plain {
        /// The payload document.
        payload: Vec<u8>,
    },
    /// A payload with the sender's signature over its canonical form.
    Signed(SignedPayload),
    /// A complete signed envelope, sealed to one recipient.
    Encrypted(EncryptedPayload),
}

/// The signed unit: canonical payload bytes, signer, and signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    /// Canonical payload bytes.
    pub payload: Vec<u8>,
    /// Key id the verifier resolves the signer's public key under.
    pub key_id: KeyId,
    /// Signature over the protocol's signing input for `payload`.
    pub signature: TaggedSignature,
}

/// A sealed signed envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// Key id of the recipient the envelope is sealed to.
    pub recipient: KeyId,
    /// Header and ciphertext of the sealed signed envelope.
    pub sealed: SealedBox,
}

impl Envelope {
    pub fn new(protocol: ProtocolId, body: EnvelopeBody) -> Self {
        Self { protocol, body }
    }

    pub fn protocol(&self) -> ProtocolId {
        self.protocol
    }

    /// The mode implied by the body.
    pub fn mode(&self) -> EnvelopeMode {
        match self.body {
            EnvelopeBody::Plain { .. } => EnvelopeMode::Plain,
            EnvelopeBody::Signed(_) => EnvelopeMode::Signed,
            EnvelopeBody::Encrypted(_) => EnvelopeMode::SignedEncrypted,
        }
    }

    pub fn body(&self) -> &EnvelopeBody {
        &self.body
    }

    pub fn into_body(self) -> EnvelopeBody {
        self.body
    }

    /// The signer's key id. Sealed envelopes only reveal it once opened.
    pub fn sender_key_id(&self) -> Option<&KeyId> {
        match &self.body {
            EnvelopeBody::Signed(signed) => Some(&signed.key_id),
            EnvelopeBody::Plain { .. } | EnvelopeBody::Encrypted(_) => None,
        }
    }

    pub fn signature(&self) -> Option<&TaggedSignature> {
        match &self.body {
            EnvelopeBody::Signed(signed) => Some(&signed.signature),
            EnvelopeBody::Plain { .. } | EnvelopeBody::Encrypted(_) => None,
        }
    }

    /// The payload bytes, or the ciphertext of a sealed envelope.
    pub fn inner_payload(&self) -> &[u8] {
        match &self.body {
            EnvelopeBody::Plain { payload } => payload,
            EnvelopeBody::Signed(signed) => &signed.payload,
            EnvelopeBody::Encrypted(encrypted) => &encrypted.sealed.ciphertext,
        }
    }

    /// Serialize in the protocol's envelope wire format.
    pub fn to_wire(&self) -> Result<Vec<u8>, EnvelopeError> {
        wire::encode(self)
    }

    /// Parse envelope wire bytes of a known protocol.
    ///
    /// # Errors
    ///
    /// - [`EnvelopeError::MalformedEnvelope`] if the container is broken.
    /// - [`EnvelopeError::UnsupportedMode`] for envelope kinds this engine
    ///   does not process.
    /// - [`EnvelopeError::UnsupportedAlgorithm`] for recognized but
    ///   unsupported JSON-LD signature suites.
    pub fn from_wire(protocol: ProtocolId, bytes: &[u8], limits: &XmlLimits) -> Result<Self, EnvelopeError> {
        wire::decode(protocol, bytes, limits)
    }
}

/// The result of a successful unwrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedEnvelope {
    pub protocol: ProtocolId,
    /// Mode of the outermost envelope.
    pub mode: EnvelopeMode,
    /// The verified payload, in canonical form when signed.
    pub payload: Vec<u8>,
    /// Key id of the verified signer; `None` for plain envelopes.
    pub signer: Option<KeyId>,
}

/// The bytes an envelope signature covers for a canonical payload.
pub(crate) fn signing_input(protocol: ProtocolId, canonical: &CanonicalBytes) -> CanonicalBytes {
    match protocol {
        ProtocolId::XmlProtocol => {
            CanonicalBytes::magic_signature_base(canonical, MAGIC_DATA_TYPE, MAGIC_ENCODING, "Ed25519")
        }
        ProtocolId::JsonLdProtocol => canonical.clone(),
    }
}

/// Additional data bound into a sealed envelope.
pub(crate) fn seal_aad(protocol: ProtocolId, recipient: &KeyId) -> Vec<u8> {
    format!("fedwire-envelope|{protocol}|{recipient}").into_bytes()
}
