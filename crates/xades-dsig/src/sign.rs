#![forbid(unsafe_code)]

//! XML-DSig signature creation.
//!
//! Processing order:
//! 1. Find the `<Signature>` by Id
//! 2. Fill every empty `<DigestValue>` from its reference
//! 3. Canonicalize `<SignedInfo>` and sign it
//! 4. Write `<SignatureValue>`
//!
//! The document is only replaced once every step succeeded.

use crate::context::DsigContext;
use crate::engine::{encode_base64, DigestEngine};
use crate::reference::CanonicalReferenceBuilder;
use xades_core::{ns, Error};
use xades_keys::Signer;
use xades_xml::document::{find_child_element, find_child_elements, is_element, text_content};
use xades_xml::{Splice, XmlDocument};

/// Complete the signature template with Id `signature_id` in `doc`.
pub fn sign_signature(
    doc: &mut XmlDocument,
    ctx: &DsigContext,
    signature_id: &str,
    signer: &dyn Signer,
) -> Result<(), Error> {
    let mut work = doc.clone();

    let digests = {
        let tree = work.parse_doc()?;
        let builder = CanonicalReferenceBuilder::new(ctx, &tree);
        let signature = signature_by_id(&builder, signature_id)?;
        let signed_info = child(signature, ns::node::SIGNED_INFO)?;

        let mut splices = Vec::new();
        for reference in find_child_elements(signed_info, ns::DSIG, ns::node::REFERENCE) {
            let value_node = child(reference, ns::node::DIGEST_VALUE)?;
            if !text_content(value_node).trim().is_empty() {
                continue;
            }
            let method = child(reference, ns::node::DIGEST_METHOD)?
                .attribute(ns::attr::ALGORITHM)
                .ok_or_else(|| Error::MissingRequiredElement("DigestMethod/@Algorithm".into()))?;
            let canonical = builder.resolve(reference, signature)?;
            let value = DigestEngine::digest_base64(method, &canonical)?;
            tracing::debug!(
                uri = reference.attribute(ns::attr::URI).unwrap_or(""),
                digest = %value,
                "reference digested"
            );
            splices.push(Splice::replace_content(tree.input_text(), value_node, &value)?);
        }
        splices
    };
    work.apply(digests)?;

    let signature_value = {
        let tree = work.parse_doc()?;
        let builder = CanonicalReferenceBuilder::new(ctx, &tree);
        let signature = signature_by_id(&builder, signature_id)?;
        let signed_info = child(signature, ns::node::SIGNED_INFO)?;
        let method = child(signed_info, ns::node::SIGNATURE_METHOD)?
            .attribute(ns::attr::ALGORITHM)
            .ok_or_else(|| Error::MissingRequiredElement("SignatureMethod/@Algorithm".into()))?;

        let canonical = DigestEngine::canonical_signed_info(signed_info)?;
        let value = DigestEngine::default().sign(&canonical, signer, method)?;
        let value_node = child(signature, ns::node::SIGNATURE_VALUE)?;
        Splice::replace_content(tree.input_text(), value_node, &encode_base64(&value))?
    };
    work.apply(vec![signature_value])?;

    tracing::info!(signature_id, "signature computed");
    *doc = work;
    Ok(())
}

fn signature_by_id<'a, 'input>(
    builder: &CanonicalReferenceBuilder<'a, 'input>,
    id: &str,
) -> Result<roxmltree::Node<'a, 'input>, Error> {
    let node = builder.element_by_id(id)?;
    if is_element(node, ns::DSIG, ns::node::SIGNATURE) {
        Ok(node)
    } else {
        Err(Error::MissingRequiredElement(format!("ds:Signature with Id {id}")))
    }
}

fn child<'a, 'input>(
    parent: roxmltree::Node<'a, 'input>,
    local: &str,
) -> Result<roxmltree::Node<'a, 'input>, Error> {
    find_child_element(parent, ns::DSIG, local)
        .ok_or_else(|| Error::MissingRequiredElement(format!("ds:{local}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::verify_signature;
    use xades_keys::RsaSigner;

    const SIGNER_KEY: &[u8] = include_bytes!("../../xades/testdata/signer-key.pem");
    const SIGNER: &[u8] = include_bytes!("../../xades/testdata/signer.der");

    fn template() -> String {
        format!(
            r##"<doc xmlns="urn:app"><item Id="item">payload</item><ds:Signature xmlns:ds="{dsig}" Id="S"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="{c14n}"/><ds:SignatureMethod Algorithm="{rsa}"/><ds:Reference URI="#item"><ds:DigestMethod Algorithm="{sha}"/><ds:DigestValue></ds:DigestValue></ds:Reference><ds:Reference URI=""><ds:Transforms><ds:Transform Algorithm="{env}"/></ds:Transforms><ds:DigestMethod Algorithm="{sha}"/><ds:DigestValue/></ds:Reference></ds:SignedInfo><ds:SignatureValue/></ds:Signature></doc>"##,
            dsig = ns::DSIG,
            c14n = xades_core::algorithm::C14N,
            rsa = xades_core::algorithm::RSA_SHA256,
            sha = xades_core::algorithm::SHA256,
            env = xades_core::algorithm::ENVELOPED_SIGNATURE,
        )
    }

    fn signed() -> XmlDocument {
        let signer = RsaSigner::from_pem(SIGNER_KEY, SIGNER).unwrap();
        let mut doc = XmlDocument::parse(template()).unwrap();
        sign_signature(&mut doc, &DsigContext::new(), "S", &signer).unwrap();
        doc
    }

    #[test]
    fn test_sign_fills_digests_and_value() {
        let doc = signed();
        let tree = doc.parse_doc().unwrap();
        for dv in tree
            .descendants()
            .filter(|n| is_element(*n, ns::DSIG, ns::node::DIGEST_VALUE))
        {
            assert_eq!(text_content(dv).len(), 44);
        }
        let key = xades_keys::loader::load_x509_cert_der(SIGNER).unwrap();
        let sig = tree
            .descendants()
            .find(|n| is_element(*n, ns::DSIG, ns::node::SIGNATURE))
            .unwrap();
        let result = verify_signature(&tree, &DsigContext::new(), sig, Some(&key)).unwrap();
        assert!(result.is_valid(), "{result:?}");
    }

    #[test]
    fn test_failure_leaves_document_untouched() {
        let signer = RsaSigner::from_pem(SIGNER_KEY, SIGNER).unwrap();
        let broken = template().replace("URI=\"#item\"", "URI=\"#absent\"");
        let mut doc = XmlDocument::parse(broken.clone()).unwrap();
        let err = sign_signature(&mut doc, &DsigContext::new(), "S", &signer).unwrap_err();
        assert!(matches!(err, Error::ReferenceTargetNotFound(_)));
        assert_eq!(doc.text(), broken);
    }

    #[test]
    fn test_unknown_signature_id() {
        let signer = RsaSigner::from_pem(SIGNER_KEY, SIGNER).unwrap();
        let mut doc = XmlDocument::parse(template()).unwrap();
        let err = sign_signature(&mut doc, &DsigContext::new(), "item", &signer).unwrap_err();
        assert!(matches!(err, Error::MissingRequiredElement(_)));
    }
}
