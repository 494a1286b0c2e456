//! # Canonicalization Test Vectors
//!
//! Fixed inputs and the exact canonical bytes every fedwire peer must
//! produce for them. Signatures are computed over these bytes, so any
//! change here breaks interoperability with previously signed messages.

use fedwire_core::{
    canonicalize_payload, sha256_hex, CanonicalBytes, CanonicalizationError, ProtocolId, XmlLimits,
};
use proptest::prelude::*;

fn json(input: &str) -> String {
    let cb = CanonicalBytes::from_json_slice(input.as_bytes()).expect("valid JSON vector");
    String::from_utf8(cb.into_bytes()).expect("canonical JSON is UTF-8")
}

fn xml(input: &str) -> String {
    let cb = CanonicalBytes::from_xml_slice(input.as_bytes(), &XmlLimits::default()).expect("valid XML vector");
    String::from_utf8(cb.into_bytes()).expect("canonical XML is UTF-8")
}

// ─── JSON (RFC 8785) ────────────────────────────────────────────────

#[test]
fn json_vectors() {
    let vectors = [
        (r#"{"b":2,"a":1}"#, r#"{"a":1,"b":2}"#),
        (r#"{ "a" : [ 1, 2.0, "x" ] }"#, r#"{"a":[1,2,"x"]}"#),
        (r#"{"z":{"y":null,"x":true}}"#, r#"{"z":{"x":true,"y":null}}"#),
        (r#"{"name":"été"}"#, "{\"name\":\"été\"}"),
        (r#"{"n":1.5,"m":1e3}"#, r#"{"m":1000,"n":1.5}"#),
    ];
    for (input, expected) in vectors {
        assert_eq!(json(input), expected, "input: {input}");
    }
}

#[test]
fn json_digest_of_empty_object() {
    let cb = CanonicalBytes::from_json_slice(b" { } ").expect("valid");
    assert_eq!(
        sha256_hex(&cb),
        "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
    );
}

#[test]
fn json_unsafe_integers_rejected() {
    for input in [r#"{"n":9007199254740992}"#, r#"{"n":[-9007199254740992]}"#] {
        let err = CanonicalBytes::from_json_slice(input.as_bytes()).unwrap_err();
        assert!(matches!(err, CanonicalizationError::IntegerOutOfRange(_)), "{input}");
    }
    assert_eq!(json(r#"{"n":9007199254740991}"#), r#"{"n":9007199254740991}"#);
}

// ─── XML ────────────────────────────────────────────────────────────

#[test]
fn xml_vectors() {
    let vectors = [
        (r#"<b z="1" a="2"><c>x</c></b>"#, r#"<b a="2" z="1"><c>x</c></b>"#),
        ("<a>\n  <b/>\n  <c></c>\n</a>", "<a><b></b><c></c></a>"),
        (r#"<?xml version="1.0" encoding="UTF-8"?><a>t</a>"#, "<a>t</a>"),
        ("<a><!-- note --><b>1</b></a>", "<a><b>1</b></a>"),
        ("<a>&lt;&amp;<![CDATA[>]]></a>", "<a>&lt;&amp;&gt;</a>"),
        (
            r#"<me:env xmlns:me="urn:x"><me:data>d</me:data></me:env>"#,
            r#"<me:env xmlns:me="urn:x"><me:data>d</me:data></me:env>"#,
        ),
    ];
    for (input, expected) in vectors {
        assert_eq!(xml(input), expected, "input: {input}");
    }
}

#[test]
fn xml_doctype_rejected() {
    let err = CanonicalBytes::from_xml_slice(
        br#"<!DOCTYPE a [<!ENTITY e "x">]><a>&e;</a>"#,
        &XmlLimits::default(),
    )
    .unwrap_err();
    assert!(matches!(err, CanonicalizationError::Xml(_)));
}

#[test]
fn xml_depth_limit_enforced() {
    let limits = XmlLimits {
        max_depth: 3,
        max_elements: 100,
    };
    assert!(CanonicalBytes::from_xml_slice(b"<a><b><c/></b></a>", &limits).is_ok());
    assert!(CanonicalBytes::from_xml_slice(b"<a><b><c><d/></c></b></a>", &limits).is_err());
}

// ─── Magic signature base ───────────────────────────────────────────

#[test]
fn magic_signature_base_vector() {
    let payload = CanonicalBytes::from_xml_slice(b"<a/>", &XmlLimits::default()).expect("valid");
    let base = CanonicalBytes::magic_signature_base(&payload, "application/xml", "base64url", "Ed25519");
    assert_eq!(
        std::str::from_utf8(base.as_bytes()).expect("ASCII"),
        "PGE-PC9hPg==.YXBwbGljYXRpb24veG1s.YmFzZTY0dXJs.RWQyNTUxOQ=="
    );
}

// ─── Properties ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn json_canonicalization_is_idempotent(
        fields in proptest::collection::btree_map("[a-zA-Z]{1,6}", -1_000_000i64..1_000_000, 0..6),
    ) {
        let doc = serde_json::to_vec(&fields).expect("serializable");
        let once = canonicalize_payload(ProtocolId::JsonLdProtocol, &doc, &XmlLimits::default()).expect("valid");
        let twice = canonicalize_payload(ProtocolId::JsonLdProtocol, once.as_bytes(), &XmlLimits::default()).expect("valid");
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn xml_attribute_order_does_not_matter(
        attrs in proptest::collection::btree_map("[a-w][a-z]{0,4}", "[a-zA-Z0-9 ]{0,8}", 1..5),
    ) {
        let render = |pairs: Vec<(&String, &String)>| {
            let body: String = pairs.iter().map(|(k, v)| format!(" {k}=\"{v}\"")).collect();
            format!("<e{body}><c/></e>")
        };
        let forward = render(attrs.iter().collect());
        let backward = render(attrs.iter().rev().collect());
        let limits = XmlLimits::default();
        let a = canonicalize_payload(ProtocolId::XmlProtocol, forward.as_bytes(), &limits).expect("valid");
        let b = canonicalize_payload(ProtocolId::XmlProtocol, backward.as_bytes(), &limits).expect("valid");
        prop_assert_eq!(a, b);
    }
}
