#![forbid(unsafe_code)]

//! Signed documents: creating, loading, validating and upgrading XAdES
//! signatures.
//!
//! A [`SignatureDocument`] is the whole XML text plus the Id of the one
//! signature it is about. Co-signatures and counter-signatures live in the
//! same text, so a handle for each of them is just another Id.

use crate::checks::{CheckSet, ReferenceGraphResolver, ValidationMode, ValidationReport};
use crate::ids::{self, SignatureIds};
use crate::layout;
use crate::model::DataObjectFormat;
use crate::params::{SignatureForm, SignaturePackaging, SignatureParameters, UpgradeParameters};
use crate::template::{ReferenceSpec, SignatureTemplate, TransformSpec};
use crate::upgrade::{detect_form, UpgradeReport, UpgradeStateMachine};
use roxmltree::Node;
use tracing::{debug, info};
use xades_core::{algorithm, ns, Error};
use xades_dsig::engine::encode_base64;
use xades_dsig::{sign_signature, CanonicalReferenceBuilder, DsigContext, PrefixContext};
use xades_xml::document::{find_child_element, find_child_elements, is_element, text_content};
use xades_xml::{Splice, XmlDocument, XmlWriter};

const TEXT_XML: &str = "text/xml";
const OCTET_STREAM: &str = "application/octet-stream";

/// Wrapper element of internally detached signatures.
const DETACHED_ROOT: &str = "DOCFIRMA";
/// Element carrying internally detached content.
const DETACHED_CONTENT: &str = "CONTENT";

/// Data to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// An XML document.
    Xml(String),
    /// Arbitrary octets.
    Binary(Vec<u8>),
}

impl Content {
    fn default_mime_type(&self) -> &'static str {
        match self {
            Content::Xml(_) => TEXT_XML,
            Content::Binary(_) => OCTET_STREAM,
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        match self {
            Content::Xml(text) => text.into_bytes(),
            Content::Binary(data) => data,
        }
    }
}

/// The markup of `xml`'s document element.
fn document_element(xml: &str) -> Result<String, Error> {
    let tree = xades_xml::parse(xml)?;
    Ok(xml[tree.root_element().range()].to_owned())
}

/// One signature inside an XML document.
#[derive(Debug, Clone)]
pub struct SignatureDocument {
    document: XmlDocument,
    ctx: DsigContext,
    signature_id: String,
}

impl SignatureDocument {
    /// Sign `content` with the default context.
    pub fn sign(content: Content, params: &SignatureParameters) -> Result<Self, Error> {
        Self::sign_with(content, params, DsigContext::new())
    }

    /// Sign `content`; `ctx` supplies the namespace prefixes and is kept for
    /// later validation.
    pub fn sign_with(content: Content, params: &SignatureParameters, ctx: DsigContext) -> Result<Self, Error> {
        let prefixes = layout::check_prefixes(&ctx.prefixes)?;
        let ids = SignatureIds::generate();
        let reference_id = ids::reference();
        let mut ctx = ctx;

        let mut format = DataObjectFormat {
            object_reference: format!("#{reference_id}"),
            description: params.description.clone(),
            mime_type: Some(
                params
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| content.default_mime_type().to_owned()),
            ),
            encoding: None,
        };
        let template = |reference: ReferenceSpec, format: DataObjectFormat, data_object: Option<String>| {
            SignatureTemplate {
                ids: &ids,
                params,
                prefixes: &prefixes,
                content: vec![reference],
                formats: vec![format],
                data_object,
            }
            .render()
        };

        let text = match &params.packaging {
            SignaturePackaging::Enveloped => {
                let Content::Xml(xml) = content else {
                    return Err(Error::XmlParse("enveloped signatures need XML content".into()));
                };
                let uri = match &params.signed_element {
                    Some(id) => format!("#{id}"),
                    None => String::new(),
                };
                let reference = ReferenceSpec::new(uri)
                    .with_id(&reference_id)
                    .with_transform(TransformSpec::Algorithm(algorithm::ENVELOPED_SIGNATURE.to_owned()))
                    .with_transform(TransformSpec::SignatureExclusion);
                let signature = template(reference, format, None)?;

                let tree = xades_xml::parse(&xml)?;
                let destination = match &params.destination {
                    Some(id) => CanonicalReferenceBuilder::new(&ctx, &tree).element_by_id(id)?,
                    None => tree.root_element(),
                };
                xades_xml::splice::apply(&xml, vec![Splice::append_child(&xml, destination, &signature)?])?
            }
            SignaturePackaging::Enveloping => {
                let object_id = ids::data_object();
                let object = prefixes.dsig(ns::node::OBJECT);
                let mut w = XmlWriter::new();
                let mut reference = ReferenceSpec::new(format!("#{object_id}"))
                    .with_id(&reference_id)
                    .with_type(algorithm::OBJECT_TYPE);
                match content {
                    Content::Xml(xml) => {
                        w.start_element(&object, &[(ns::attr::ID, &object_id)]);
                        w.write_raw(&document_element(&xml)?);
                        reference = reference.with_transform(TransformSpec::Algorithm(algorithm::C14N.to_owned()));
                    }
                    Content::Binary(data) => {
                        let mime = format.mime_type.clone().unwrap_or_default();
                        w.start_element(
                            &object,
                            &[
                                (ns::attr::ID, &object_id),
                                (ns::attr::MIME_TYPE, &mime),
                                (ns::attr::ENCODING, algorithm::BASE64_ENCODING),
                            ],
                        );
                        w.write_text(&encode_base64(&data));
                        reference = reference.with_transform(TransformSpec::Algorithm(algorithm::BASE64.to_owned()));
                        format.encoding = Some(algorithm::BASE64_ENCODING.to_owned());
                    }
                }
                w.end_element(&object);
                let signature = template(reference, format, Some(w.into_string()))?;
                let mut out = XmlWriter::new();
                out.write_declaration();
                out.write_raw(&signature);
                out.into_string()
            }
            SignaturePackaging::InternallyDetached => {
                let content_id = ids::content();
                let mut reference = ReferenceSpec::new(format!("#{content_id}")).with_id(&reference_id);
                let mime = format.mime_type.clone().unwrap_or_default();
                let mut w = XmlWriter::new();
                w.write_declaration();
                w.start_element(DETACHED_ROOT, &[]);
                match content {
                    Content::Xml(xml) => {
                        w.start_element(DETACHED_CONTENT, &[(ns::attr::ID, &content_id), (ns::attr::MIME_TYPE, &mime)]);
                        w.write_raw(&document_element(&xml)?);
                        reference = reference.with_transform(TransformSpec::Algorithm(algorithm::C14N.to_owned()));
                    }
                    Content::Binary(data) => {
                        w.start_element(
                            DETACHED_CONTENT,
                            &[
                                (ns::attr::ID, &content_id),
                                (ns::attr::MIME_TYPE, &mime),
                                (ns::attr::ENCODING, algorithm::BASE64_ENCODING),
                            ],
                        );
                        w.write_text(&encode_base64(&data));
                        reference = reference.with_transform(TransformSpec::Algorithm(algorithm::BASE64.to_owned()));
                        format.encoding = Some(algorithm::BASE64_ENCODING.to_owned());
                    }
                }
                w.end_element(DETACHED_CONTENT);
                w.write_raw(&template(reference, format, None)?);
                w.end_element(DETACHED_ROOT);
                w.into_string()
            }
            SignaturePackaging::ExternallyDetached { uri } => {
                ctx.detached.insert(uri.clone(), content.into_bytes());
                let reference = ReferenceSpec::new(uri.clone()).with_id(&reference_id);
                let mut out = XmlWriter::new();
                out.write_declaration();
                out.write_raw(&template(reference, format, None)?);
                out.into_string()
            }
        };

        let mut document = XmlDocument::parse(text)?;
        sign_signature(&mut document, &ctx, &ids.signature, &*params.signer)?;
        info!(signature_id = %ids.signature, packaging = ?params.packaging, "document signed");
        Ok(Self {
            document,
            ctx,
            signature_id: ids.signature,
        })
    }

    /// Every signature of `xml` that is not a counter-signature.
    pub fn load(xml: impl Into<String>) -> Result<Vec<Self>, Error> {
        Self::load_with(xml, DsigContext::new())
    }

    pub fn load_with(xml: impl Into<String>, ctx: DsigContext) -> Result<Vec<Self>, Error> {
        let document = XmlDocument::parse(xml.into())?;
        let ids = {
            let tree = document.parse_doc()?;
            let mut ids = Vec::new();
            for signature in tree
                .descendants()
                .filter(|n| is_element(*n, ns::DSIG, ns::node::SIGNATURE))
                .filter(|n| layout::countersigned_parent(*n).is_none())
            {
                let id = signature
                    .attribute(ns::attr::ID)
                    .ok_or_else(|| Error::MissingRequiredElement("ds:Signature/@Id".into()))?;
                ids.push(id.to_owned());
            }
            ids
        };
        if ids.is_empty() {
            return Err(Error::MissingRequiredElement("ds:Signature".into()));
        }
        debug!(signatures = ids.len(), "document loaded");
        Ok(ids
            .into_iter()
            .map(|signature_id| Self {
                document: document.clone(),
                ctx: ctx.clone(),
                signature_id,
            })
            .collect())
    }

    pub fn signature_id(&self) -> &str {
        &self.signature_id
    }

    pub fn context(&self) -> &DsigContext {
        &self.ctx
    }

    pub fn xml(&self) -> &str {
        self.document.text()
    }

    pub fn into_xml(self) -> String {
        self.document.into_text()
    }

    fn focus(&self, signature_id: impl Into<String>) -> Self {
        Self {
            document: self.document.clone(),
            ctx: self.ctx.clone(),
            signature_id: signature_id.into(),
        }
    }

    fn with_signature<T>(&self, f: impl FnOnce(&roxmltree::Document<'_>, Node<'_, '_>) -> Result<T, Error>) -> Result<T, Error> {
        let tree = self.document.parse_doc()?;
        let signature = CanonicalReferenceBuilder::new(&self.ctx, &tree).element_by_id(&self.signature_id)?;
        if !is_element(signature, ns::DSIG, ns::node::SIGNATURE) {
            return Err(Error::MissingRequiredElement(format!(
                "ds:Signature with Id {}",
                self.signature_id
            )));
        }
        f(&tree, signature)
    }

    /// The form the signature currently has.
    pub fn form(&self) -> Result<SignatureForm, Error> {
        self.with_signature(|_, signature| Ok(detect_form(signature)))
    }

    /// Run every check, stopping at the first failure.
    pub fn validate(&self) -> Result<(), Error> {
        self.validate_with(CheckSet::ALL, ValidationMode::FailFast)?.into_result()
    }

    pub fn validate_with(&self, checks: CheckSet, mode: ValidationMode) -> Result<ValidationReport, Error> {
        let tree = self.document.parse_doc()?;
        ReferenceGraphResolver::new(&self.ctx, &tree, &self.signature_id)?.validate(checks, mode)
    }

    /// Upgrade the signature to `to`. The document is left unchanged on
    /// failure.
    pub fn upgrade(&mut self, to: SignatureForm, params: &UpgradeParameters) -> Result<UpgradeReport, Error> {
        UpgradeStateMachine::new(&self.ctx, params).upgrade(&mut self.document, &self.signature_id, to)
    }

    /// Add a parallel signature over the same content. The returned
    /// document holds both signatures and is focused on the new one.
    pub fn co_sign(&self, params: &SignatureParameters) -> Result<Self, Error> {
        let ids = SignatureIds::generate();
        let splice = self.with_signature(|tree, signature| {
            let prefixes = layout::document_prefixes(signature)?;
            let existing = layout::content_reference(signature)?;
            let old_uri = existing.attribute(ns::attr::ID).map(|id| format!("#{id}"));

            let reference_id = ids::reference();
            let mut reference = ReferenceSpec::read(existing).with_id(&reference_id);
            if reference.ref_type.as_deref() != Some(algorithm::OBJECT_TYPE) {
                reference.ref_type = None;
            }

            let old_format = layout::signed_properties(signature)
                .ok()
                .and_then(|sp| find_child_element(sp, ns::XADES, ns::node::SIGNED_DATA_OBJECT_PROPERTIES))
                .into_iter()
                .flat_map(|dop| find_child_elements(dop, ns::XADES, ns::node::DATA_OBJECT_FORMAT))
                .find(|f| f.attribute(ns::attr::OBJECT_REFERENCE).map(str::to_owned) == old_uri);
            let format_field = |local: &str| {
                old_format
                    .and_then(|f| find_child_element(f, ns::XADES, local))
                    .map(|n| text_content(n).trim().to_owned())
            };
            let format = DataObjectFormat {
                object_reference: format!("#{reference_id}"),
                description: params.description.clone(),
                mime_type: params
                    .mime_type
                    .clone()
                    .or_else(|| format_field(ns::node::MIME_TYPE))
                    .or_else(|| Some(TEXT_XML.to_owned())),
                encoding: format_field(ns::node::ENCODING),
            };

            let markup = SignatureTemplate {
                ids: &ids,
                params,
                prefixes: &prefixes,
                content: vec![reference],
                formats: vec![format],
                data_object: None,
            }
            .render()?;
            let host = match signature.parent_element() {
                Some(parent) => parent,
                None => signature,
            };
            Splice::append_child(tree.input_text(), host, &markup)
        })?;

        let mut document = self.document.clone();
        document.apply(vec![splice])?;
        sign_signature(&mut document, &self.ctx, &ids.signature, &*params.signer)?;
        info!(signature_id = %ids.signature, parent = %self.signature_id, "co-signature added");
        Ok(Self {
            document,
            ctx: self.ctx.clone(),
            signature_id: ids.signature,
        })
    }

    /// Counter-sign this signature's value. The returned document is
    /// focused on this signature; [`Self::counter_signatures`] reaches the
    /// new one.
    pub fn counter_sign(&self, params: &SignatureParameters) -> Result<Self, Error> {
        let ids = SignatureIds::generate();
        let splice = self.with_signature(|tree, signature| {
            let prefixes = layout::document_prefixes(signature)?;
            let reference = ReferenceSpec::new(format!("#{}", layout::signature_value_id(signature)?))
                .with_id(ids::reference())
                .with_type(algorithm::COUNTERSIGNED_SIGNATURE_TYPE)
                .with_transform(TransformSpec::Algorithm(algorithm::C14N.to_owned()));
            let markup = SignatureTemplate {
                ids: &ids,
                params,
                prefixes: &prefixes,
                content: vec![reference],
                formats: Vec::new(),
                data_object: None,
            }
            .render()?;

            let wrapper = prefixes.xades(ns::node::COUNTER_SIGNATURE);
            let mut w = XmlWriter::new();
            w.start_element(&wrapper, &[]);
            w.write_raw(&markup);
            w.end_element(&wrapper);
            layout::append_unsigned(tree.input_text(), signature, &w.into_string())
        })?;

        let mut document = self.document.clone();
        document.apply(vec![splice])?;
        sign_signature(&mut document, &self.ctx, &ids.signature, &*params.signer)?;
        info!(signature_id = %ids.signature, parent = %self.signature_id, "counter-signature added");
        Ok(Self {
            document,
            ctx: self.ctx.clone(),
            signature_id: self.signature_id.clone(),
        })
    }

    /// Counter-signatures directly attached to this signature.
    pub fn counter_signatures(&self) -> Result<Vec<Self>, Error> {
        let ids = self.with_signature(|_, signature| {
            layout::counter_signatures(signature)
                .into_iter()
                .map(|cs| {
                    cs.attribute(ns::attr::ID)
                        .map(str::to_owned)
                        .ok_or_else(|| Error::MissingRequiredElement("ds:Signature/@Id".into()))
                })
                .collect::<Result<Vec<_>, Error>>()
        })?;
        Ok(ids.into_iter().map(|id| self.focus(id)).collect())
    }

    /// The signature this one counter-signs.
    pub fn parent(&self) -> Result<Option<Self>, Error> {
        let id = self.with_signature(|_, signature| {
            Ok(layout::countersigned_parent(signature)
                .and_then(|p| p.attribute(ns::attr::ID))
                .map(str::to_owned))
        })?;
        Ok(id.map(|id| self.focus(id)))
    }

    /// Prefixes the signature is written with.
    pub fn prefixes(&self) -> Result<PrefixContext, Error> {
        self.with_signature(|_, signature| layout::document_prefixes(signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::Check;
    use crate::coverage::{self, StampKind};
    use crate::model::{CommitmentType, ProductionPlace, SignaturePolicy, SignerRole};
    use crate::params::XVariant;
    use crate::testutil::*;
    use crate::upgrade::{certificate_refs, embedded_values};
    use std::collections::BTreeSet;
    use std::sync::{Arc, Mutex};

    const INVOICE: &str = r#"<?xml version="1.0" encoding="UTF-8"?><invoice xmlns="urn:example:invoice"><amount Id="amount">100</amount><signatures Id="dest"/></invoice>"#;

    fn enveloped() -> SignatureDocument {
        SignatureDocument::sign(Content::Xml(INVOICE.into()), &sign_params()).unwrap()
    }

    fn with_tree<T>(doc: &SignatureDocument, f: impl FnOnce(Node<'_, '_>) -> T) -> T {
        let tree = xades_xml::parse(doc.xml()).unwrap();
        let sig = tree
            .descendants()
            .find(|n| n.attribute("Id") == Some(doc.signature_id()))
            .unwrap();
        f(sig)
    }

    #[test]
    fn test_enveloped_sign_and_tamper() {
        let doc = enveloped();
        assert_eq!(doc.form().unwrap(), SignatureForm::Basic);
        doc.validate().unwrap();

        let tampered = doc.xml().replace(">100<", ">900<");
        let loaded = SignatureDocument::load(tampered).unwrap();
        let err = loaded[0].validate().unwrap_err();
        assert_eq!(err.check_name(), Some("XmldsigCore"));
        assert!(matches!(err.root(), Error::SignatureVerificationFailed(_)));
    }

    #[test]
    fn test_enveloped_destination_and_element() {
        let params = sign_params().with_destination("dest").with_signed_element("amount");
        let doc = SignatureDocument::sign(Content::Xml(INVOICE.into()), &params).unwrap();
        with_tree(&doc, |sig| {
            assert_eq!(sig.parent_element().unwrap().attribute("Id"), Some("dest"));
            assert_eq!(layout::content_reference(sig).unwrap().attribute("URI"), Some("#amount"));
        });
        doc.validate().unwrap();
    }

    #[test]
    fn test_enveloping_and_detached_packaging() {
        let cases = [
            (SignaturePackaging::Enveloping, Content::Xml(INVOICE.into())),
            (SignaturePackaging::Enveloping, Content::Binary(b"%PDF-1.7".to_vec())),
            (SignaturePackaging::InternallyDetached, Content::Xml(INVOICE.into())),
            (SignaturePackaging::InternallyDetached, Content::Binary(vec![0, 1, 2, 255])),
        ];
        for (packaging, content) in cases {
            let params = sign_params().with_packaging(packaging.clone());
            let doc = SignatureDocument::sign(content, &params).unwrap();
            doc.validate().unwrap();
            let reloaded = SignatureDocument::load(doc.xml()).unwrap();
            assert_eq!(reloaded.len(), 1, "{packaging:?}");
            reloaded[0].validate().unwrap();
        }
    }

    #[test]
    fn test_internally_detached_layout() {
        let params = sign_params().with_packaging(SignaturePackaging::InternallyDetached);
        let doc = SignatureDocument::sign(Content::Binary(b"hello".to_vec()), &params).unwrap();
        let tree = xades_xml::parse(doc.xml()).unwrap();
        let root = tree.root_element();
        assert_eq!(root.tag_name().name(), DETACHED_ROOT);
        let content = root.first_element_child().unwrap();
        assert_eq!(content.tag_name().name(), DETACHED_CONTENT);
        assert_eq!(content.attribute("Encoding"), Some(algorithm::BASE64_ENCODING));
        assert_eq!(content.attribute("MimeType"), Some(OCTET_STREAM));
    }

    #[test]
    fn test_externally_detached() {
        let packaging = SignaturePackaging::ExternallyDetached {
            uri: "https://files.example.test/report.pdf".into(),
        };
        let params = sign_params().with_packaging(packaging);
        let doc = SignatureDocument::sign(Content::Binary(b"report".to_vec()), &params).unwrap();
        doc.validate().unwrap();

        let ctx = DsigContext::new().with_detached("https://files.example.test/report.pdf", b"changed".to_vec());
        let loaded = SignatureDocument::load_with(doc.xml(), ctx).unwrap();
        assert!(matches!(loaded[0].validate().unwrap_err().root(), Error::SignatureVerificationFailed(_)));
    }

    #[test]
    fn test_custom_prefixes() {
        let ctx = DsigContext::new().with_prefixes(PrefixContext::new("", "xa"));
        let doc = SignatureDocument::sign_with(Content::Xml(INVOICE.into()), &sign_params(), ctx).unwrap();
        assert_eq!(doc.prefixes().unwrap(), PrefixContext::new("", "xa"));
        assert!(doc.xml().contains("<xa:SignedProperties"));
        doc.validate().unwrap();

        let mut doc = doc;
        doc.upgrade(SignatureForm::T, &upgrade_params()).unwrap();
        assert!(doc.xml().contains("<xa:SignatureTimeStamp"));
        doc.validate().unwrap();

        let clash = DsigContext::new().with_prefixes(PrefixContext::new("p", "p"));
        let err = SignatureDocument::sign_with(Content::Xml(INVOICE.into()), &sign_params(), clash).unwrap_err();
        assert!(matches!(err, Error::SchemaValidation(_)));
    }

    #[test]
    fn test_enveloped_needs_xml() {
        let err = SignatureDocument::sign(Content::Binary(vec![1]), &sign_params()).unwrap_err();
        assert!(matches!(err, Error::XmlParse(_)));
    }

    #[test]
    fn test_commitment_must_name_own_reference() {
        let params = sign_params()
            .with_commitment(CommitmentType::proof_of_origin().with_object_references(vec!["#elsewhere".into()]));
        let doc = SignatureDocument::sign(Content::Xml(INVOICE.into()), &params).unwrap();
        let err = doc.validate().unwrap_err();
        assert_eq!(err.check_name(), Some("CommitmentObjectReferences"));

        let report = doc.validate_with(CheckSet::ALL, ValidationMode::Aggregate).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.passed.contains(&Check::XmldsigCore));
    }

    #[test]
    fn test_t_upgrade_once() {
        let mut doc = enveloped();
        let report = doc.upgrade(SignatureForm::T, &upgrade_params()).unwrap();
        assert_eq!(report.from, SignatureForm::Basic);
        assert!(report.auto_upgraded.is_empty());

        let value_id = format!("#{}", doc.signature_id().replace("Signature-", "SignatureValue-"));
        with_tree(&doc, |sig| {
            let stamps = layout::unsigned(sig, ns::node::SIGNATURE_TIME_STAMP);
            assert_eq!(stamps.len(), 1);
            assert_eq!(coverage::hash_data_uris(stamps[0]), [value_id.clone()]);
        });
        doc.validate().unwrap();

        let err = doc.upgrade(SignatureForm::T, &upgrade_params()).unwrap_err();
        assert!(matches!(err, Error::AlreadyUpgraded(_)));
    }

    #[test]
    fn test_wrong_imprint_is_rejected() {
        let mut doc = enveloped();
        let before = doc.xml().to_owned();
        let tsa = FakeTsa {
            calls: Mutex::new(0),
            wrong_imprint: true,
        };
        let params = UpgradeParameters::new(Arc::new(tsa)).with_validation_time(test_time());
        let err = doc.upgrade(SignatureForm::T, &params).unwrap_err();
        assert!(matches!(err, Error::ProtocolFailure(_)));
        assert_eq!(doc.xml(), before);
    }

    #[test]
    fn test_failed_upgrade_leaves_document_untouched() {
        let mut doc = enveloped();
        let before = doc.xml().to_owned();
        let params = UpgradeParameters::new(Arc::new(FakeTsa::new())).with_validation_time(test_time());
        let err = doc.upgrade(SignatureForm::XL, &params).unwrap_err();
        assert!(matches!(err, Error::RevocationCheckFailed(_)));
        assert_eq!(doc.xml(), before);
        assert_eq!(doc.form().unwrap(), SignatureForm::Basic);
    }

    #[test]
    fn test_xl_values_match_refs() {
        let mut doc = enveloped();
        let report = doc.upgrade(SignatureForm::XL, &upgrade_params()).unwrap();
        assert_eq!(report.auto_upgraded, [SignatureForm::T, SignatureForm::C, SignatureForm::X]);
        assert_eq!(doc.form().unwrap(), SignatureForm::XL);
        doc.validate().unwrap();

        with_tree(&doc, |sig| {
            let refs = certificate_refs(sig).unwrap();
            let values = embedded_values(sig).unwrap();
            let referenced: BTreeSet<&Vec<u8>> = refs
                .iter()
                .map(|r| r.find(&values.certificates).unwrap().unwrap())
                .collect();
            let embedded: BTreeSet<&Vec<u8>> = values.certificates.iter().collect();
            assert_eq!(referenced, embedded);
            // Intermediate, root and TSA.
            assert_eq!(refs.len(), 3);
            assert!(values.certificates.iter().any(|c| c == TSA_CERT));
            assert_eq!(values.crls.len(), 2);
        });
    }

    #[test]
    fn test_refs_only_variant() {
        let mut doc = enveloped();
        let params = upgrade_params().with_x_variant(XVariant::RefsOnly);
        doc.upgrade(SignatureForm::X, &params).unwrap();
        with_tree(&doc, |sig| {
            assert_eq!(layout::unsigned(sig, ns::node::REFS_ONLY_TIME_STAMP).len(), 1);
            assert!(layout::unsigned(sig, ns::node::SIG_AND_REFS_TIME_STAMP).is_empty());
        });
        doc.validate().unwrap();
    }

    #[test]
    fn test_archive_stamps_accumulate() {
        let mut doc = enveloped();
        let report = doc.upgrade(SignatureForm::A, &upgrade_params()).unwrap();
        assert_eq!(report.auto_upgraded.len(), 4);
        let again = doc.upgrade(SignatureForm::A, &upgrade_params()).unwrap();
        assert_eq!(again.from, SignatureForm::A);
        assert!(again.auto_upgraded.is_empty());
        doc.validate().unwrap();

        with_tree(&doc, |sig| {
            let archives = layout::unsigned(sig, ns::node::ARCHIVE_TIME_STAMP);
            assert_eq!(archives.len(), 2);
            let first = coverage::hash_data_uris(archives[0]);
            let second = coverage::hash_data_uris(archives[1]);
            let first_id = archives[0].attribute("Id").unwrap();
            assert!(first.iter().all(|u| second.contains(u)));
            assert!(second.contains(&format!("#{first_id}")));
            assert!(second.len() > first.len());
            assert_eq!(StampKind::of(archives[1]), Some(StampKind::Archive));
        });
    }

    #[test]
    fn test_co_signatures_load_separately() {
        let first = enveloped();
        let both = first.co_sign(&sign_params()).unwrap();
        assert_ne!(both.signature_id(), first.signature_id());

        let loaded = SignatureDocument::load(both.xml()).unwrap();
        assert_eq!(loaded.len(), 2);
        for doc in &loaded {
            doc.validate().unwrap();
        }
        let ids: Vec<&str> = loaded.iter().map(|d| d.signature_id()).collect();
        assert!(ids.contains(&first.signature_id()) && ids.contains(&both.signature_id()));
    }

    #[test]
    fn test_co_sign_enveloping() {
        let params = sign_params().with_packaging(SignaturePackaging::Enveloping);
        let first = SignatureDocument::sign(Content::Binary(b"data".to_vec()), &params).unwrap();
        let second = first.co_sign(&sign_params()).unwrap();
        second.validate().unwrap();
        second.focus(first.signature_id()).validate().unwrap();
        assert_eq!(SignatureDocument::load(second.xml()).unwrap().len(), 2);
    }

    #[test]
    fn test_counter_signature_chain() {
        let parent = enveloped();
        let signed = parent.counter_sign(&sign_params()).unwrap();
        assert_eq!(signed.signature_id(), parent.signature_id());
        signed.validate().unwrap();

        let counters = signed.counter_signatures().unwrap();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0].parent().unwrap().unwrap().signature_id(), parent.signature_id());
        counters[0].validate().unwrap();

        let value_uri = format!("#{}", parent.signature_id().replace("Signature-", "SignatureValue-"));
        let reference_range = with_tree(&counters[0], |sig| {
            let r = layout::references(sig)
                .unwrap()
                .into_iter()
                .find(|r| r.attribute("Type") == Some(algorithm::COUNTERSIGNED_SIGNATURE_TYPE))
                .unwrap();
            assert_eq!(r.attribute("URI"), Some(value_uri.as_str()));
            r.range()
        });

        assert_eq!(SignatureDocument::load(signed.xml()).unwrap().len(), 1);

        let mut broken = signed.xml().to_owned();
        broken.replace_range(reference_range, "");
        let broken = SignatureDocument::load(broken).unwrap().remove(0);
        let tree = xades_xml::parse(broken.xml()).unwrap();
        let resolver = ReferenceGraphResolver::new(broken.context(), &tree, broken.signature_id()).unwrap();
        assert!(matches!(
            resolver.run(Check::CounterSignatureChain),
            Err(Error::ReferenceTargetNotFound(_))
        ));
    }

    #[test]
    fn test_counter_signature_may_cover_any_enclosing_value() {
        let root = enveloped().counter_sign(&sign_params()).unwrap();
        let child = root.counter_signatures().unwrap().remove(0);
        let nested = child.counter_sign(&sign_params()).unwrap();
        let grandchild_id = nested.counter_signatures().unwrap()[0].signature_id().to_owned();

        // Point the grandchild at the root's value instead of its parent's
        // and sign it again.
        let value_of = |id: &str| format!("#{}", id.replace("Signature-", "SignatureValue-"));
        let text = nested.xml().replace(
            &format!("URI=\"{}\"", value_of(child.signature_id())),
            &format!("URI=\"{}\"", value_of(root.signature_id())),
        );
        let mut document = XmlDocument::parse(text).unwrap();
        let splices = {
            let tree = document.parse_doc().unwrap();
            let grandchild = tree
                .descendants()
                .find(|n| n.attribute("Id") == Some(grandchild_id.as_str()))
                .unwrap();
            let reference = layout::references(grandchild)
                .unwrap()
                .into_iter()
                .find(|r| r.attribute("Type") == Some(algorithm::COUNTERSIGNED_SIGNATURE_TYPE))
                .unwrap();
            assert_eq!(reference.attribute("URI"), Some(value_of(root.signature_id()).as_str()));
            let digest = find_child_element(reference, ns::DSIG, ns::node::DIGEST_VALUE).unwrap();
            vec![Splice::replace_content(tree.input_text(), digest, "").unwrap()]
        };
        document.apply(splices).unwrap();
        sign_signature(&mut document, root.context(), &grandchild_id, &*signer()).unwrap();

        let loaded = SignatureDocument::load(document.text().to_owned()).unwrap();
        assert_eq!(loaded.len(), 1);
        loaded[0].validate().unwrap();
        let tree = xades_xml::parse(loaded[0].xml()).unwrap();
        let resolver = ReferenceGraphResolver::new(loaded[0].context(), &tree, root.signature_id()).unwrap();
        resolver.run(Check::CounterSignatureChain).unwrap();
    }

    #[test]
    fn test_signed_properties_with_sha512() {
        let policy = SignaturePolicy::new("urn:oid:1.3.6.1.4.1.99999.2")
            .with_description("Invoice policy")
            .with_document(algorithm::SHA256, b"policy text")
            .unwrap()
            .with_spuri("https://policy.example.test/invoice");
        let place = ProductionPlace {
            city: Some("Stockholm".into()),
            country_name: Some("SE".into()),
            ..Default::default()
        };
        let params = sign_params()
            .with_signature_method(algorithm::RSA_SHA512)
            .with_digest_method(algorithm::SHA512)
            .with_signer_role(SignerRole::claimed("Supplier").with_claimed("Auditor").with_certified(vec![0x30, 0x00]))
            .with_policy(policy)
            .with_production_place(place);
        let doc = SignatureDocument::sign(Content::Xml(INVOICE.into()), &params).unwrap();
        doc.validate().unwrap();

        with_tree(&doc, |sig| {
            let method = sig
                .descendants()
                .find(|n| is_element(*n, ns::DSIG, ns::node::SIGNATURE_METHOD))
                .unwrap();
            assert_eq!(method.attribute("Algorithm"), Some(algorithm::RSA_SHA512));
            let digests: Vec<&str> = layout::references(sig)
                .unwrap()
                .into_iter()
                .filter_map(|r| find_child_element(r, ns::DSIG, ns::node::DIGEST_METHOD))
                .filter_map(|m| m.attribute("Algorithm"))
                .collect();
            assert!(!digests.is_empty());
            assert!(digests.iter().all(|d| *d == algorithm::SHA512));
            let count = |local: &str| sig.descendants().filter(|n| is_element(*n, ns::XADES, local)).count();
            assert_eq!(count(ns::node::CLAIMED_ROLE), 2);
            assert_eq!(count(ns::node::CERTIFIED_ROLE), 1);
            assert_eq!(count(ns::node::SIG_POLICY_HASH), 1);
            assert_eq!(count(ns::node::SPURI), 1);
            assert_eq!(count(ns::node::CITY), 1);
            assert_eq!(count(ns::node::POSTAL_CODE), 0);
        });
    }

    #[test]
    fn test_counter_signed_then_upgraded() {
        let mut doc = enveloped().counter_sign(&sign_params()).unwrap();
        doc.upgrade(SignatureForm::T, &upgrade_params()).unwrap();
        doc.validate().unwrap();
        assert_eq!(doc.counter_signatures().unwrap()[0].form().unwrap(), SignatureForm::Basic);
    }

    #[test]
    fn test_load_without_signature() {
        let err = SignatureDocument::load(INVOICE).unwrap_err();
        assert!(matches!(err, Error::MissingRequiredElement(_)));
    }
}
