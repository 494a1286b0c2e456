//! # Protocol Detection Properties
//!
//! - Detection depends only on the bytes: the hint never changes the
//!   result.
//! - Arbitrary input either detects as one protocol or fails with a
//!   dispatch error; it never panics.
//! - Whitespace and a UTF-8 byte-order mark around a document do not
//!   change its detected protocol.

use fedwire_core::{FederationError, ProtocolId};
use fedwire_dispatch::{detect_protocol, Dispatcher};
use proptest::prelude::*;

fn any_hint() -> impl Strategy<Value = Option<ProtocolId>> {
    prop_oneof![
        Just(None),
        Just(Some(ProtocolId::XmlProtocol)),
        Just(Some(ProtocolId::JsonLdProtocol)),
    ]
}

fn whitespace() -> impl Strategy<Value = String> {
    "[ \t\r\n]{0,4}"
}

proptest! {
    #[test]
    fn hint_does_not_change_detection(raw in proptest::collection::vec(any::<u8>(), 0..64), hint in any_hint()) {
        let dispatcher = Dispatcher::default();
        let with_hint = dispatcher.detect(&raw, hint).map_err(|e| e.to_string());
        let without = dispatcher.detect(&raw, None).map_err(|e| e.to_string());
        prop_assert_eq!(with_hint, without);
    }

    #[test]
    fn arbitrary_bytes_never_panic(raw in proptest::collection::vec(any::<u8>(), 0..256), hint in any_hint()) {
        match Dispatcher::default().dispatch(&raw, hint) {
            Ok((protocol, envelope)) => prop_assert_eq!(protocol, envelope.protocol()),
            Err(
                FederationError::Dispatch(_)
                | FederationError::Envelope(_)
                | FederationError::Decode(_),
            ) => {}
            Err(other) => prop_assert!(false, "unexpected error family: {other}"),
        }
    }

    #[test]
    fn padding_preserves_detection(
        before in whitespace(),
        after in whitespace(),
        bom in any::<bool>(),
        text in "[a-z ]{0,16}",
    ) {
        let prefix = if bom { "\u{FEFF}" } else { "" };
        let json = format!("{prefix}{before}{{\"type\":\"Note\",\"content\":\"{text}\"}}{after}");
        prop_assert_eq!(detect_protocol(json.as_bytes()), Ok(ProtocolId::JsonLdProtocol));
        let xml = format!("{prefix}{before}<status_message><text>{text}</text></status_message>{after}");
        prop_assert_eq!(detect_protocol(xml.as_bytes()), Ok(ProtocolId::XmlProtocol));
    }
}
