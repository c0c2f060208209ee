#![forbid(unsafe_code)]

//! Transform pipeline for xades references.
//!
//! Each reference carries a chain of XMLDSIG transforms applied in order to
//! the dereferenced data. Supported: inclusive C14N, the enveloped-signature
//! transform, the XPath filter that excludes every signature, and base64.

pub mod base64_transform;
pub mod enveloped;
pub mod pipeline;

pub use base64_transform::Base64DecodeTransform;
pub use enveloped::{EnvelopedSignatureTransform, SignatureExclusionTransform};
pub use pipeline::{C14nTransform, Transform, TransformData, TransformPipeline};
