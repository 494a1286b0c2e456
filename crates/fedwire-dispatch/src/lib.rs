//! # fedwire-dispatch — Inbound Dispatch and Facade
//!
//! The outermost layer of fedwire. It detects which protocol raw inbound
//! bytes use, hands them to the envelope engine, and composes every crate
//! below it into the two facade operations:
//!
//! ```text
//! encode_and_wrap:     Entity ──validate──▶ encode ──▶ wrap ──▶ bytes
//! dispatch_and_verify: bytes ──detect──▶ parse ──▶ unwrap ──▶ decode ──▶ validate ──▶ VerifiedMessage
//! ```
//!
//! ## Crate Policy
//!
//! - One message per call. A failing message returns its own error and
//!   leaves no state behind that could affect the next one.
//! - No I/O. Keys arrive through [`fedwire_envelope::KeyResolver`], time
//!   through [`fedwire_core::Clock`].

pub mod detect;
pub mod dispatcher;
pub mod facade;

pub use detect::detect_protocol;
pub use dispatcher::Dispatcher;
pub use facade::{Federation, InboundOptions, Sender, VerifiedMessage};
