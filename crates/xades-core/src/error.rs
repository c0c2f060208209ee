#![forbid(unsafe_code)]

/// Errors produced while signing, upgrading or validating XAdES signatures.
///
/// The first group is the XAdES taxonomy callers are expected to match on.
/// The second group covers the XML and crypto plumbing underneath.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("reference target not found: {0}")]
    ReferenceTargetNotFound(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("incomplete evidence chain: {0}")]
    IncompleteEvidenceChain(String),

    #[error("missing required element: {0}")]
    MissingRequiredElement(String),

    #[error("already upgraded: {0}")]
    AlreadyUpgraded(String),

    #[error("certificate revoked: {0}")]
    CertificateRevoked(String),

    #[error("revocation check failed: {0}")]
    RevocationCheckFailed(String),

    #[error("protocol failure: {0}")]
    ProtocolFailure(String),

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("schema validation error: {0}")]
    SchemaValidation(String),

    #[error("signature verification failed: {0}")]
    SignatureVerificationFailed(String),

    /// A named validation check failed.
    #[error("check {check} failed: {source}")]
    Check {
        check: &'static str,
        source: Box<Error>,
    },

    // ── Plumbing ─────────────────────────────────────────────────────

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("transform error: {0}")]
    Transform(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the same call may succeed.
    ///
    /// Only transport-level collaborator failures qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::NetworkFailure(_) => true,
            Error::Check { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// The innermost error, looking through check wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Check { source, .. } => source.root(),
            other => other,
        }
    }

    /// Name of the failed check, if this error came from validation.
    pub fn check_name(&self) -> Option<&'static str> {
        match self {
            Error::Check { check, .. } => Some(check),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_only_for_network() {
        assert!(Error::NetworkFailure("timeout".into()).is_retryable());
        assert!(!Error::ProtocolFailure("bad nonce".into()).is_retryable());
        let wrapped = Error::Check {
            check: "SignatureTimeStamp",
            source: Box::new(Error::NetworkFailure("reset".into())),
        };
        assert!(wrapped.is_retryable());
    }

    #[test]
    fn test_root_unwraps_checks() {
        let err = Error::Check {
            check: "CertificateValuesMatchRefs",
            source: Box::new(Error::IncompleteEvidenceChain("1 ref unmatched".into())),
        };
        assert_eq!(err.check_name(), Some("CertificateValuesMatchRefs"));
        assert!(matches!(err.root(), Error::IncompleteEvidenceChain(_)));
        assert!(err.to_string().contains("CertificateValuesMatchRefs"));
    }
}
