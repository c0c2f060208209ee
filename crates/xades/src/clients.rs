#![forbid(unsafe_code)]

//! Collaborators reached over the network: the time-stamping authority
//! and OCSP responders.
//!
//! Transports live outside this crate. Implementations report transport
//! trouble as `Error::NetworkFailure` and malformed or refused answers as
//! `Error::ProtocolFailure`.

use xades_core::Error;
use xades_keys::X509Cert;

/// Requests RFC 3161 time-stamp tokens.
pub trait TimeStampClient: Send + Sync {
    /// A DER time-stamp token over `digest`, computed with the hash
    /// algorithm `digest_oid`. With `request_certificate` the TSA is asked to
    /// include its certificate.
    fn get_timestamp(&self, digest: &[u8], digest_oid: &str, request_certificate: bool) -> Result<Vec<u8>, Error>;
}

/// Certificate status reported by an OCSP responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStatus {
    Good,
    Revoked,
    Unknown,
}

/// How a responder names itself in a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderId {
    /// RFC 4514 subject name.
    ByName(String),
    /// SHA-1 of the responder's public key.
    ByKey(Vec<u8>),
}

/// A decoded OCSP answer for one certificate.
#[derive(Debug, Clone)]
pub struct OcspResponse {
    pub status: CertStatus,
    pub responder_id: ResponderId,
    pub produced_at: der::DateTime,
    /// The complete DER `OCSPResponse`, embedded as revocation value.
    pub encoded: Vec<u8>,
    /// Certificates the response carries, responder first.
    pub responder_certificates: Vec<Vec<u8>>,
}

/// Queries OCSP responders.
pub trait OcspClient: Send + Sync {
    /// Status of `certificate`, issued by `issuer`, from the responder at `url`.
    fn query_status(&self, certificate: &X509Cert, issuer: &X509Cert, url: &str) -> Result<OcspResponse, Error>;
}
