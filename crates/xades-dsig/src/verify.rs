#![forbid(unsafe_code)]

//! XML-DSig signature verification.
//!
//! Processing order:
//! 1. Read `<SignedInfo>`: CanonicalizationMethod, SignatureMethod
//! 2. For each `<Reference>`: resolve the target, run transforms, compare digests
//! 3. Take the signing key from the caller or the first `<X509Certificate>`
//! 4. Canonicalize `<SignedInfo>`
//! 5. Verify `<SignatureValue>`

use crate::context::DsigContext;
use crate::engine::{decode_base64, DigestEngine};
use crate::reference::CanonicalReferenceBuilder;
use roxmltree::Node;
use xades_core::{ns, Error};
use xades_keys::Key;
use xades_xml::document::{find_child_element, find_child_elements, find_path, is_element, text_content};

/// Result of signature verification.
#[derive(Debug)]
pub enum VerifyResult {
    /// Signature is valid.
    Valid,
    /// Signature is invalid.
    Invalid {
        reason: String,
    },
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid)
    }

    /// `Ok(())` when valid, `SignatureVerificationFailed` otherwise.
    pub fn into_result(self) -> Result<(), Error> {
        match self {
            VerifyResult::Valid => Ok(()),
            VerifyResult::Invalid { reason } => Err(Error::SignatureVerificationFailed(reason)),
        }
    }
}

/// Verify the first signature of a document.
pub fn verify(ctx: &DsigContext, xml: &str) -> Result<VerifyResult, Error> {
    let doc = xades_xml::parse(xml)?;
    let signature = doc
        .descendants()
        .find(|n| is_element(*n, ns::DSIG, ns::node::SIGNATURE))
        .ok_or_else(|| Error::MissingRequiredElement("ds:Signature".into()))?;
    verify_signature(&doc, ctx, signature, None)
}

/// Verify `signature` in `doc`.
///
/// `key` overrides the certificate carried in `ds:KeyInfo`.
pub fn verify_signature<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
    ctx: &DsigContext,
    signature: Node<'a, 'input>,
    key: Option<&Key>,
) -> Result<VerifyResult, Error> {
    if !is_element(signature, ns::DSIG, ns::node::SIGNATURE) {
        return Err(Error::MissingRequiredElement("ds:Signature".into()));
    }
    let builder = CanonicalReferenceBuilder::new(ctx, doc);
    let signed_info = find_child_element(signature, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingRequiredElement("ds:SignedInfo".into()))?;
    let method = find_child_element(signed_info, ns::DSIG, ns::node::SIGNATURE_METHOD)
        .and_then(|n| n.attribute(ns::attr::ALGORITHM))
        .ok_or_else(|| Error::MissingRequiredElement("ds:SignatureMethod".into()))?;

    for reference in find_child_elements(signed_info, ns::DSIG, ns::node::REFERENCE) {
        if let VerifyResult::Invalid { reason } = verify_reference(&builder, reference, signature)? {
            return Ok(VerifyResult::Invalid {
                reason: format!("Reference digest failed: {reason}"),
            });
        }
    }

    let embedded;
    let key = match key {
        Some(key) => key,
        None => {
            embedded = xades_keys::loader::load_x509_cert_der(&signing_certificate(signature)?)?;
            &embedded
        }
    };

    let canonical = DigestEngine::canonical_signed_info(signed_info)?;
    let value_node = find_child_element(signature, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .ok_or_else(|| Error::MissingRequiredElement("ds:SignatureValue".into()))?;
    let value = decode_base64(&text_content(value_node))?;

    if DigestEngine::default().verify(&canonical, &value, key, method)? {
        tracing::debug!(id = signature.attribute(ns::attr::ID), "signature value verified");
        Ok(VerifyResult::Valid)
    } else {
        Ok(VerifyResult::Invalid {
            reason: "signature value verification failed".into(),
        })
    }
}

/// Verify a single `<Reference>` element.
fn verify_reference<'a, 'input>(
    builder: &CanonicalReferenceBuilder<'a, 'input>,
    reference: Node<'a, 'input>,
    signature: Node<'a, 'input>,
) -> Result<VerifyResult, Error> {
    let uri = reference.attribute(ns::attr::URI).unwrap_or("");
    let digest_uri = find_child_element(reference, ns::DSIG, ns::node::DIGEST_METHOD)
        .and_then(|n| n.attribute(ns::attr::ALGORITHM))
        .ok_or_else(|| Error::MissingRequiredElement("ds:DigestMethod".into()))?;
    let expected = find_child_element(reference, ns::DSIG, ns::node::DIGEST_VALUE)
        .map(text_content)
        .ok_or_else(|| Error::MissingRequiredElement("ds:DigestValue".into()))?;
    let expected = decode_base64(&expected)?;

    let canonical = builder.resolve(reference, signature)?;
    let actual = DigestEngine::digest_with(digest_uri, &canonical)?;
    if actual == expected {
        Ok(VerifyResult::Valid)
    } else {
        tracing::debug!(uri, "digest mismatch");
        Ok(VerifyResult::Invalid {
            reason: format!("digest mismatch for URI {uri:?}"),
        })
    }
}

/// DER of the first `ds:X509Certificate` in the signature's `ds:KeyInfo`.
pub fn signing_certificate(signature: Node<'_, '_>) -> Result<Vec<u8>, Error> {
    let cert = find_path(
        signature,
        &[
            (ns::DSIG, ns::node::KEY_INFO),
            (ns::DSIG, ns::node::X509_DATA),
            (ns::DSIG, ns::node::X509_CERTIFICATE),
        ],
    )
    .ok_or_else(|| Error::MissingRequiredElement("ds:KeyInfo/ds:X509Data/ds:X509Certificate".into()))?;
    decode_base64(&text_content(cert))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::sign_signature;
    use xades_core::algorithm;
    use xades_keys::RsaSigner;
    use xades_xml::XmlDocument;

    const SIGNER_KEY: &[u8] = include_bytes!("../../xades/testdata/signer-key.pem");
    const SIGNER: &[u8] = include_bytes!("../../xades/testdata/signer.der");

    fn signed_with_key_info() -> String {
        let cert = crate::engine::encode_base64(SIGNER);
        let template = format!(
            r##"<ds:Signature xmlns:ds="{dsig}" Id="S"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="{c14n}"/><ds:SignatureMethod Algorithm="{rsa}"/><ds:Reference URI="#obj"><ds:DigestMethod Algorithm="{sha}"/><ds:DigestValue/></ds:Reference></ds:SignedInfo><ds:SignatureValue/><ds:KeyInfo><ds:X509Data><ds:X509Certificate>{cert}</ds:X509Certificate></ds:X509Data></ds:KeyInfo><ds:Object Id="obj">hello</ds:Object></ds:Signature>"##,
            dsig = ns::DSIG,
            c14n = algorithm::C14N,
            rsa = algorithm::RSA_SHA256,
            sha = algorithm::SHA256,
        );
        let signer = RsaSigner::from_pem(SIGNER_KEY, SIGNER).unwrap();
        let mut doc = XmlDocument::parse(template).unwrap();
        sign_signature(&mut doc, &DsigContext::new(), "S", &signer).unwrap();
        doc.into_text()
    }

    #[test]
    fn test_verify_with_key_info_certificate() {
        let xml = signed_with_key_info();
        assert!(verify(&DsigContext::new(), &xml).unwrap().is_valid());
    }

    #[test]
    fn test_tampered_object_detected() {
        let xml = signed_with_key_info().replace(">hello<", ">hullo<");
        let result = verify(&DsigContext::new(), &xml).unwrap();
        assert!(matches!(&result, VerifyResult::Invalid { reason } if reason.contains("digest")));
        assert!(matches!(
            result.into_result(),
            Err(Error::SignatureVerificationFailed(_))
        ));
    }

    #[test]
    fn test_tampered_signed_info_detected() {
        let xml = signed_with_key_info().replace("URI=\"#obj\"", "URI=\"#obj\" Type=\"urn:x\"");
        assert!(!verify(&DsigContext::new(), &xml).unwrap().is_valid());
    }

    #[test]
    fn test_missing_key_info() {
        let xml = format!(
            r#"<ds:Signature xmlns:ds="{}"><ds:SignedInfo><ds:SignatureMethod Algorithm="{}"/></ds:SignedInfo></ds:Signature>"#,
            ns::DSIG,
            algorithm::RSA_SHA256
        );
        assert!(matches!(
            verify(&DsigContext::new(), &xml),
            Err(Error::MissingRequiredElement(_))
        ));
    }
}
