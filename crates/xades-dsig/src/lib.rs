#![forbid(unsafe_code)]

//! XML Digital Signature (XML-DSig) core for xades.
//!
//! Dereferences and canonicalizes references, computes digests, and signs
//! and verifies `SignedInfo`. XAdES properties are layered on top by the
//! `xades` crate.

pub mod context;
pub mod engine;
pub mod reference;
pub mod sign;
pub mod verify;

pub use context::{DsigContext, PrefixContext};
pub use engine::DigestEngine;
pub use reference::{CanonicalReferenceBuilder, Target};
pub use sign::sign_signature;
pub use verify::{verify_signature, VerifyResult};
