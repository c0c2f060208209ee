#![forbid(unsafe_code)]

//! XAdES signatures over XML-DSig.
//!
//! Signing ([`SignatureDocument::sign`]) produces a XAdES-BES signature in
//! one of four packagings. Existing signatures can be co-signed,
//! counter-signed, validated check by check, and upgraded through T, C,
//! X and XL to A with the help of a time-stamping authority and
//! revocation sources supplied by the caller.

pub mod checks;
pub mod clients;
pub mod coverage;
pub mod document;
pub mod ids;
pub mod layout;
pub mod model;
pub mod params;
pub mod revocation;
pub mod template;
pub mod tsp;
pub mod upgrade;

#[cfg(test)]
mod testutil;

pub use checks::{Check, CheckFailure, CheckSet, ReferenceGraphResolver, ValidationMode, ValidationReport};
pub use clients::{CertStatus, OcspClient, OcspResponse, ResponderId, TimeStampClient};
pub use document::{Content, SignatureDocument};
pub use model::{
    CertId, CommitmentScope, CommitmentType, DataObjectFormat, ProductionPlace, SignaturePolicy, SignerRole,
};
pub use params::{SignatureForm, SignaturePackaging, SignatureParameters, UpgradeParameters, XVariant};
pub use revocation::{Evidence, RevocationCollector};
pub use tsp::TimeStampToken;
pub use upgrade::{UpgradeReport, UpgradeStateMachine};

pub use xades_c14n as c14n;
pub use xades_core as core;
pub use xades_core::Error;
pub use xades_crypto as crypto;
pub use xades_dsig as dsig;
pub use xades_keys as keys;
pub use xades_transforms as transforms;
pub use xades_xml as xml;
