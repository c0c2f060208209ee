#![forbid(unsafe_code)]

//! Keys, certificates and CRLs for xades.
//!
//! Loads keys and certificates from PEM and DER, provides the [`Signer`]
//! abstraction with an in-memory RSA implementation, and the certificate
//! pool used to walk chains and find revocation data.

pub mod key;
pub mod loader;
pub mod signer;
pub mod store;
pub mod x509;

pub use key::{Key, KeyData, KeyUsage};
pub use signer::{RsaSigner, Signer};
pub use store::CertStore;
pub use x509::{Crl, CrlStatus, X509Cert};
