#![forbid(unsafe_code)]

//! The signing capability handed to signature operations.

use crate::key::{Key, KeyData};
use crate::x509::X509Cert;
use xades_core::{algorithm, Error};
use xades_crypto::AlgorithmRegistry;

/// An opaque signing capability bound to a certificate.
///
/// Implementations may keep the private key out of process (smart card,
/// HSM); only `sign` ever touches it.
pub trait Signer: Send + Sync {
    /// DER of the signing certificate.
    fn certificate(&self) -> &[u8];

    /// DER of further chain certificates, issuer first.
    fn chain(&self) -> &[Vec<u8>] {
        &[]
    }

    /// The signature method used when the caller names none.
    fn signature_method(&self) -> &str;

    /// Sign `data` with the algorithm identified by `signature_method`.
    fn sign(&self, signature_method: &str, data: &[u8]) -> Result<Vec<u8>, Error>;
}

/// An in-memory RSA key with its certificate.
#[derive(Debug, Clone)]
pub struct RsaSigner {
    key: Key,
    certificate: Vec<u8>,
    chain: Vec<Vec<u8>>,
}

impl RsaSigner {
    /// Pair an RSA private key with its certificate. The certificate's
    /// public key must be the key's public half.
    pub fn new(key: Key, certificate_der: &[u8]) -> Result<Self, Error> {
        let KeyData::Rsa {
            private: Some(_),
            public,
        } = &key.data
        else {
            return Err(Error::Key("RSA private key required".into()));
        };
        let cert_key = crate::loader::load_x509_cert_der(certificate_der)?;
        if cert_key.rsa_public_key() != Some(public) {
            return Err(Error::Key(format!(
                "certificate {} does not match the private key",
                X509Cert::from_der(certificate_der)?.subject_name()
            )));
        }
        Ok(Self {
            key,
            certificate: certificate_der.to_vec(),
            chain: Vec::new(),
        })
    }

    /// Load a PEM private key and pair it with a DER certificate.
    pub fn from_pem(key_pem: &[u8], certificate_der: &[u8]) -> Result<Self, Error> {
        Self::new(crate::loader::load_private_key_pem(key_pem)?, certificate_der)
    }

    /// Attach chain certificates (DER, issuer first).
    pub fn with_chain(mut self, chain: Vec<Vec<u8>>) -> Self {
        self.chain = chain;
        self
    }
}

impl Signer for RsaSigner {
    fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    fn chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    fn signature_method(&self) -> &str {
        algorithm::RSA_SHA256
    }

    fn sign(&self, signature_method: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
        let alg = AlgorithmRegistry::signature(signature_method)?;
        alg.sign(&self.key.to_signing_key(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNER_KEY: &[u8] = include_bytes!("../../xades/testdata/signer-key.pem");
    const SIGNER: &[u8] = include_bytes!("../../xades/testdata/signer.der");
    const TSA: &[u8] = include_bytes!("../../xades/testdata/tsa.der");

    #[test]
    fn test_sign_and_verify_with_certificate_key() {
        let signer = RsaSigner::from_pem(SIGNER_KEY, SIGNER).unwrap();
        let sig = signer.sign(algorithm::RSA_SHA256, b"payload").unwrap();

        let public = crate::loader::load_x509_cert_der(signer.certificate()).unwrap();
        let alg = AlgorithmRegistry::signature(algorithm::RSA_SHA256).unwrap();
        assert!(alg.verify(&public.to_verifying_key(), b"payload", &sig).unwrap());
    }

    #[test]
    fn test_mismatched_certificate() {
        assert!(matches!(RsaSigner::from_pem(SIGNER_KEY, TSA), Err(Error::Key(_))));
    }

    #[test]
    fn test_public_key_rejected() {
        let public = crate::loader::load_x509_cert_der(SIGNER).unwrap();
        assert!(matches!(RsaSigner::new(public, SIGNER), Err(Error::Key(_))));
    }
}
