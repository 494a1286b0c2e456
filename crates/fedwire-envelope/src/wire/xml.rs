//! # Magic Envelope Wire Format
//!
//! Signed envelopes are Salmon magic envelopes:
//!
//! ```xml
//! <me:env xmlns:me="http://salmon-protocol.org/ns/magic-env">
//!   <me:data type="application/xml">{base64url payload}</me:data>
//!   <me:encoding>base64url</me:encoding>
//!   <me:alg>Ed25519</me:alg>
//!   <me:sig key_id="alice@example.org">{base64url signature}</me:sig>
//! </me:env>
//! ```
//!
//! Sealed envelopes carry the seal header and the ciphertext of a complete
//! magic envelope:
//!
//! ```xml
//! <me:encrypted xmlns:me="http://salmon-protocol.org/ns/magic-env">
//!   <me:header recipient="bob@example.org">
//!     <me:ephemeral_key/><me:recipient_fingerprint/><me:key_nonce/>
//!     <me:wrapped_key/><me:payload_nonce/>
//!   </me:header>
//!   <me:data>{base64url ciphertext}</me:data>
//! </me:encrypted>
//! ```
//!
//! Legacy peers wrap the magic envelope in `<diaspora><header>` with an
//! `author_id`, which serves as the key id when `me:sig` has none. The
//! legacy `<encrypted_header>` form is not processed.

use fedwire_core::encoding::{b64url_decode, b64url_encode};
use fedwire_core::{
    EnvelopeError, KeyId, ProtocolId, SignatureAlgorithm, TaggedSignature, XmlElement, XmlLimits,
};
use fedwire_core::xml::parse_document;
use fedwire_crypto::SealedBox;

use super::{header_from, header_values, malformed};
use crate::envelope::{
    EncryptedPayload, Envelope, EnvelopeBody, SignedPayload, MAGIC_DATA_TYPE, MAGIC_ENCODING,
};

/// Namespace of magic-envelope elements.
pub const MAGIC_ENV_NS: &str = "http://salmon-protocol.org/ns/magic-env";

const PROTOCOL: ProtocolId = ProtocolId::XmlProtocol;

const HEADER_FIELDS: [&str; 5] = [
    "ephemeral_key",
    "recipient_fingerprint",
    "key_nonce",
    "wrapped_key",
    "payload_nonce",
];

pub(crate) fn encode(envelope: &Envelope) -> Vec<u8> {
    match envelope.body() {
        EnvelopeBody::Plain { payload } => payload.clone(),
        EnvelopeBody::Signed(signed) => magic_env(signed).to_canonical_string().into_bytes(),
        EnvelopeBody::Encrypted(encrypted) => sealed_env(encrypted).to_canonical_string().into_bytes(),
    }
}

fn magic_env(signed: &SignedPayload) -> XmlElement {
    XmlElement::new("me:env")
        .with_attribute("xmlns:me", MAGIC_ENV_NS)
        .with_child(
            XmlElement::new("me:data")
                .with_attribute("type", MAGIC_DATA_TYPE)
                .with_text(b64url_encode(&signed.payload)),
        )
        .with_child(XmlElement::new("me:encoding").with_text(MAGIC_ENCODING))
        .with_child(XmlElement::new("me:alg").with_text(signed.signature.algorithm.as_str()))
        .with_child(
            XmlElement::new("me:sig")
                .with_attribute("key_id", signed.key_id.as_str())
                .with_text(b64url_encode(&signed.signature.bytes)),
        )
}

fn sealed_env(encrypted: &EncryptedPayload) -> XmlElement {
    let mut header = XmlElement::new("me:header").with_attribute("recipient", encrypted.recipient.as_str());
    for (name, value) in HEADER_FIELDS.iter().zip(header_values(&encrypted.sealed.header)) {
        header.push(XmlElement::new(format!("me:{name}")).with_text(value));
    }
    XmlElement::new("me:encrypted")
        .with_attribute("xmlns:me", MAGIC_ENV_NS)
        .with_child(header)
        .with_child(XmlElement::new("me:data").with_text(b64url_encode(&encrypted.sealed.ciphertext)))
}

pub(crate) fn decode(bytes: &[u8], limits: &XmlLimits) -> Result<Envelope, EnvelopeError> {
    let root = parse_document(bytes, limits).map_err(|e| malformed(PROTOCOL, e.to_string()))?;
    let body = match root.local_name() {
        "env" => EnvelopeBody::Signed(signed_from_env(&root, None)?),
        "diaspora" => legacy(&root)?,
        "encrypted" => EnvelopeBody::Encrypted(encrypted_from(&root)?),
        _ => EnvelopeBody::Plain {
            payload: bytes.to_vec(),
        },
    };
    Ok(Envelope::new(PROTOCOL, body))
}

fn legacy(root: &XmlElement) -> Result<EnvelopeBody, EnvelopeError> {
    if root.child("encrypted_header").is_some() {
        return Err(EnvelopeError::UnsupportedMode {
            mode: "legacy encrypted_header".into(),
        });
    }
    let author = root
        .child("header")
        .and_then(|h| h.child_text("author_id"))
        .map(str::trim)
        .filter(|a| !a.is_empty());
    let env = root
        .child("env")
        .ok_or_else(|| malformed(PROTOCOL, "legacy envelope has no me:env"))?;
    Ok(EnvelopeBody::Signed(signed_from_env(env, author)?))
}

fn signed_from_env(env: &XmlElement, fallback_key_id: Option<&str>) -> Result<SignedPayload, EnvelopeError> {
    let data = single(env, "data")?;
    if let Some(data_type) = data.attribute("type") {
        if data_type.trim() != MAGIC_DATA_TYPE {
            return Err(malformed(PROTOCOL, format!("unexpected data type {data_type:?}")));
        }
    }
    let encoding = single(env, "encoding")?.text.trim();
    if encoding != MAGIC_ENCODING {
        return Err(malformed(PROTOCOL, format!("unsupported data encoding {encoding:?}")));
    }
    let alg_text = single(env, "alg")?.text.trim();
    let algorithm: SignatureAlgorithm = alg_text.parse().map_err(|_| EnvelopeError::UnsupportedAlgorithm {
        protocol: PROTOCOL,
        algorithm: alg_text.to_string(),
    })?;
    let sig = single(env, "sig")?;
    let key_id = sig
        .attribute("key_id")
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .or(fallback_key_id)
        .ok_or_else(|| malformed(PROTOCOL, "signature names no key id"))?;
    let key_id = KeyId::new(key_id).map_err(|e| malformed(PROTOCOL, e.to_string()))?;

    let payload = b64url_decode(&data.text).map_err(|_| malformed(PROTOCOL, "data is not base64url"))?;
    let signature = b64url_decode(&sig.text).map_err(|_| malformed(PROTOCOL, "signature is not base64url"))?;
    Ok(SignedPayload {
        payload,
        key_id,
        signature: TaggedSignature::new(algorithm, signature),
    })
}

fn encrypted_from(root: &XmlElement) -> Result<EncryptedPayload, EnvelopeError> {
    let header = single(root, "header")?;
    let recipient = header
        .attribute("recipient")
        .ok_or_else(|| malformed(PROTOCOL, "seal header names no recipient"))?;
    let recipient = KeyId::new(recipient.trim()).map_err(|e| malformed(PROTOCOL, e.to_string()))?;
    let seal_header = header_from(PROTOCOL, HEADER_FIELDS, |name| header.child_text(name))?;
    let ciphertext = b64url_decode(&single(root, "data")?.text)
        .map_err(|_| malformed(PROTOCOL, "ciphertext is not base64url"))?;
    Ok(EncryptedPayload {
        recipient,
        sealed: SealedBox {
            header: seal_header,
            ciphertext,
        },
    })
}

/// The only child named `local`.
fn single<'a>(parent: &'a XmlElement, local: &str) -> Result<&'a XmlElement, EnvelopeError> {
    let mut matches = parent.children.iter().filter(|c| c.local_name() == local);
    match (matches.next(), matches.next()) {
        (Some(element), None) => Ok(element),
        (None, _) => Err(malformed(PROTOCOL, format!("<{}> has no {local} element", parent.name))),
        (Some(_), Some(_)) => Err(malformed(PROTOCOL, format!("<{}> has more than one {local} element", parent.name))),
    }
}
