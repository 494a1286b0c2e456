//! # Linked-Data Signature Wire Format
//!
//! A signed JSON-LD envelope is the payload document itself with one added
//! member:
//!
//! ```json
//! "signature": {
//!   "type": "Ed25519Signature2020",
//!   "creator": "https://example.org/users/alice#main-key",
//!   "signatureValue": "{base64 signature}"
//! }
//! ```
//!
//! The signature covers the JCS form of the document without that member.
//! The `signature` object is read strictly: members other than the three
//! above are rejected.
//!
//! A sealed envelope is a separate document of type `EncryptedEnvelope`
//! carrying the seal header and the ciphertext of a complete signed
//! document. Other `*Envelope` types are not processed.

use fedwire_core::encoding::{b64_decode, b64_encode, b64url_decode, b64url_encode};
use fedwire_core::{CanonicalBytes, EnvelopeError, KeyId, ProtocolId, SignatureAlgorithm, TaggedSignature};
use fedwire_crypto::SealedBox;
use serde_json::{json, Map, Value};

use super::{header_from, header_values, malformed};
use crate::envelope::{EncryptedPayload, Envelope, EnvelopeBody, SignedPayload};

const PROTOCOL: ProtocolId = ProtocolId::JsonLdProtocol;

/// Linked-data signature suite for Ed25519.
pub const ED25519_SUITE: &str = "Ed25519Signature2020";

/// Suite used by legacy peers, recognized so it can be refused by name.
pub const RSA_SUITE: &str = "RsaSignature2017";

/// Document type of sealed envelopes.
pub const ENCRYPTED_TYPE: &str = "EncryptedEnvelope";

const SIGNATURE_MEMBERS: [&str; 3] = ["type", "creator", "signatureValue"];
const ENVELOPE_MEMBERS: [&str; 4] = ["type", "recipient", "header", "ciphertext"];

const HEADER_FIELDS: [&str; 5] = [
    "ephemeralKey",
    "recipientFingerprint",
    "keyNonce",
    "wrappedKey",
    "payloadNonce",
];

/// Check that a canonical payload can carry an embedded signature.
pub(crate) fn check_signable(canonical: &CanonicalBytes) -> Result<(), EnvelopeError> {
    match serde_json::from_slice::<Value>(canonical.as_bytes()) {
        Ok(Value::Object(doc)) if doc.contains_key("signature") => {
            Err(malformed(PROTOCOL, "payload already has a signature member"))
        }
        Ok(Value::Object(_)) => Ok(()),
        Ok(_) => Err(malformed(PROTOCOL, "payload is not a JSON object")),
        Err(e) => Err(malformed(PROTOCOL, e.to_string())),
    }
}

pub(crate) fn encode(envelope: &Envelope) -> Result<Vec<u8>, EnvelopeError> {
    match envelope.body() {
        EnvelopeBody::Plain { payload } => Ok(payload.clone()),
        EnvelopeBody::Signed(signed) => signed_document(signed),
        EnvelopeBody::Encrypted(encrypted) => {
            let mut header = Map::new();
            for (name, value) in HEADER_FIELDS.iter().zip(header_values(&encrypted.sealed.header)) {
                header.insert((*name).to_string(), Value::String(value));
            }
            let doc = json!({
                "type": ENCRYPTED_TYPE,
                "recipient": encrypted.recipient.as_str(),
                "header": header,
                "ciphertext": b64url_encode(&encrypted.sealed.ciphertext),
            });
            canonical(doc)
        }
    }
}

fn signed_document(signed: &SignedPayload) -> Result<Vec<u8>, EnvelopeError> {
    let mut doc = match serde_json::from_slice::<Value>(&signed.payload) {
        Ok(Value::Object(doc)) => doc,
        Ok(_) => return Err(malformed(PROTOCOL, "payload is not a JSON object")),
        Err(e) => return Err(malformed(PROTOCOL, e.to_string())),
    };
    let suite = match signed.signature.algorithm {
        SignatureAlgorithm::Ed25519 => ED25519_SUITE,
        SignatureAlgorithm::RsaSha256 => RSA_SUITE,
    };
    doc.insert(
        "signature".into(),
        json!({
            "type": suite,
            "creator": signed.key_id.as_str(),
            "signatureValue": b64_encode(&signed.signature.bytes),
        }),
    );
    canonical(Value::Object(doc))
}

fn canonical(value: Value) -> Result<Vec<u8>, EnvelopeError> {
    CanonicalBytes::from_value(value)
        .map(CanonicalBytes::into_bytes)
        .map_err(|source| EnvelopeError::Canonicalization {
            protocol: PROTOCOL,
            source,
        })
}

pub(crate) fn decode(bytes: &[u8]) -> Result<Envelope, EnvelopeError> {
    let mut doc = match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(doc)) => doc,
        Ok(_) => return Err(malformed(PROTOCOL, "envelope is not a JSON object")),
        Err(e) => return Err(malformed(PROTOCOL, e.to_string())),
    };
    let doc_type = doc.get("type").and_then(Value::as_str).map(str::to_string);
    let body = match doc_type.as_deref() {
        Some(ENCRYPTED_TYPE) => EnvelopeBody::Encrypted(encrypted_from(&doc)?),
        Some(other) if other.ends_with("Envelope") => {
            return Err(EnvelopeError::UnsupportedMode {
                mode: other.to_string(),
            })
        }
        _ => match doc.remove("signature") {
            Some(signature) => {
                let (key_id, signature) = signature_from(&signature)?;
                let payload = canonical(Value::Object(doc))?;
                EnvelopeBody::Signed(SignedPayload {
                    payload,
                    key_id,
                    signature,
                })
            }
            None => EnvelopeBody::Plain {
                payload: bytes.to_vec(),
            },
        },
    };
    Ok(Envelope::new(PROTOCOL, body))
}

fn signature_from(value: &Value) -> Result<(KeyId, TaggedSignature), EnvelopeError> {
    let Value::Object(sig) = value else {
        return Err(malformed(PROTOCOL, "signature is not an object"));
    };
    if let Some(unknown) = sig.keys().find(|k| !SIGNATURE_MEMBERS.contains(&k.as_str())) {
        return Err(malformed(PROTOCOL, format!("signature has unexpected member {unknown:?}")));
    }
    let suite = string_member(sig, "type", "signature")?;
    if suite != ED25519_SUITE {
        return Err(EnvelopeError::UnsupportedAlgorithm {
            protocol: PROTOCOL,
            algorithm: suite.to_string(),
        });
    }
    let creator = string_member(sig, "creator", "signature")?;
    let key_id = KeyId::new(creator).map_err(|e| malformed(PROTOCOL, e.to_string()))?;
    let bytes = b64_decode(string_member(sig, "signatureValue", "signature")?)
        .map_err(|_| malformed(PROTOCOL, "signatureValue is not base64"))?;
    Ok((key_id, TaggedSignature::new(SignatureAlgorithm::Ed25519, bytes)))
}

fn encrypted_from(doc: &Map<String, Value>) -> Result<EncryptedPayload, EnvelopeError> {
    if let Some(unknown) = doc.keys().find(|k| !ENVELOPE_MEMBERS.contains(&k.as_str())) {
        return Err(malformed(PROTOCOL, format!("encrypted envelope has unexpected member {unknown:?}")));
    }
    let recipient = KeyId::new(string_member(doc, "recipient", "encrypted envelope")?)
        .map_err(|e| malformed(PROTOCOL, e.to_string()))?;
    let Some(Value::Object(header)) = doc.get("header") else {
        return Err(malformed(PROTOCOL, "encrypted envelope has no header object"));
    };
    let seal_header = header_from(PROTOCOL, HEADER_FIELDS, |name| header.get(name).and_then(Value::as_str))?;
    let ciphertext = b64url_decode(string_member(doc, "ciphertext", "encrypted envelope")?)
        .map_err(|_| malformed(PROTOCOL, "ciphertext is not base64url"))?;
    Ok(EncryptedPayload {
        recipient,
        sealed: SealedBox {
            header: seal_header,
            ciphertext,
        },
    })
}

fn string_member<'a>(obj: &'a Map<String, Value>, name: &str, context: &str) -> Result<&'a str, EnvelopeError> {
    obj.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(PROTOCOL, format!("{context} has no string member {name:?}")))
}
