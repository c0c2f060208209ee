#![forbid(unsafe_code)]

//! Digest and signature primitives over canonical octets.

use base64::Engine;
use xades_c14n::C14nMode;
use xades_core::{algorithm, ns, Error};
use xades_crypto::AlgorithmRegistry;
use xades_keys::{Key, Signer};
use xades_xml::document::find_child_element;

/// Digests, signs and verifies through the algorithm registry.
#[derive(Debug, Clone)]
pub struct DigestEngine {
    digest_method: String,
}

impl Default for DigestEngine {
    fn default() -> Self {
        Self::new(algorithm::SHA256)
    }
}

impl DigestEngine {
    /// An engine digesting with `digest_method` unless told otherwise.
    pub fn new(digest_method: &str) -> Self {
        Self {
            digest_method: digest_method.to_owned(),
        }
    }

    pub fn digest_method(&self) -> &str {
        &self.digest_method
    }

    /// Digest with the engine's method.
    pub fn digest(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        Self::digest_with(&self.digest_method, data)
    }

    /// Digest with the algorithm `uri` names.
    pub fn digest_with(uri: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut digest = AlgorithmRegistry::digest(uri)?;
        digest.update(data);
        Ok(digest.finalize())
    }

    /// Base64 of [`DigestEngine::digest_with`].
    pub fn digest_base64(uri: &str, data: &[u8]) -> Result<String, Error> {
        Ok(encode_base64(&Self::digest_with(uri, data)?))
    }

    /// Sign canonical octets. The signer may support algorithms the
    /// registry does not know.
    pub fn sign(&self, canonical: &[u8], signer: &dyn Signer, signature_method: &str) -> Result<Vec<u8>, Error> {
        let value = signer.sign(signature_method, canonical)?;
        tracing::debug!(signature_method, len = value.len(), "signed");
        Ok(value)
    }

    /// Check `signature` over canonical octets with the public half of `key`.
    pub fn verify(
        &self,
        canonical: &[u8],
        signature: &[u8],
        key: &Key,
        signature_method: &str,
    ) -> Result<bool, Error> {
        let alg = AlgorithmRegistry::signature(signature_method)?;
        alg.verify(&key.to_verifying_key(), canonical, signature)
    }

    /// Canonical form of a `ds:SignedInfo`, using its own
    /// `CanonicalizationMethod`.
    pub fn canonical_signed_info(signed_info: roxmltree::Node<'_, '_>) -> Result<Vec<u8>, Error> {
        let method = find_child_element(signed_info, ns::DSIG, ns::node::CANONICALIZATION_METHOD)
            .and_then(|n| n.attribute(ns::attr::ALGORITHM))
            .ok_or_else(|| Error::MissingRequiredElement("ds:CanonicalizationMethod".into()))?;
        xades_c14n::canonicalize_subtree(signed_info, C14nMode::require(method)?)
    }
}

pub fn encode_base64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decode base64 element content, ignoring whitespace.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, Error> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .map_err(|e| Error::Base64(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use xades_keys::RsaSigner;

    const SIGNER_KEY: &[u8] = include_bytes!("../../xades/testdata/signer-key.pem");
    const SIGNER: &[u8] = include_bytes!("../../xades/testdata/signer.der");

    #[test]
    fn test_digest_known_value() {
        let engine = DigestEngine::default();
        assert_eq!(
            encode_base64(&engine.digest(b"abc").unwrap()),
            "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0="
        );
        assert!(matches!(
            DigestEngine::digest_with("urn:nope", b""),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_sign_then_verify() {
        let signer = RsaSigner::from_pem(SIGNER_KEY, SIGNER).unwrap();
        let engine = DigestEngine::default();
        let sig = engine.sign(b"<x></x>", &signer, algorithm::RSA_SHA256).unwrap();
        let key = xades_keys::loader::load_x509_cert_der(SIGNER).unwrap();
        assert!(engine.verify(b"<x></x>", &sig, &key, algorithm::RSA_SHA256).unwrap());
        assert!(!engine.verify(b"<y></y>", &sig, &key, algorithm::RSA_SHA256).unwrap());
    }

    #[test]
    fn test_decode_ignores_line_breaks() {
        assert_eq!(decode_base64("YW\n Jj\r\n").unwrap(), b"abc");
        assert!(matches!(decode_base64("!!"), Err(Error::Base64(_))));
    }
}
