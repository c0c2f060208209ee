#![forbid(unsafe_code)]

//! Cryptographic algorithms for xades.
//!
//! Digests and asymmetric signatures are looked up by their XMLDSIG URI (and
//! digests also by ASN.1 OID) through the process-wide [`AlgorithmRegistry`],
//! which applications may extend at startup.

pub mod digest;
pub mod registry;
pub mod sign;

pub use digest::DigestAlgorithm;
pub use registry::AlgorithmRegistry;
pub use sign::{SignatureAlgorithm, SigningKey};
