#![forbid(unsafe_code)]

//! Signature templates: the complete `ds:Signature` markup of a new
//! signature, with empty `DigestValue` and `SignatureValue` elements left
//! for the signing pass to fill.

use crate::ids::SignatureIds;
use crate::model::{CertId, DataObjectFormat, SignedProperties};
use crate::params::SignatureParameters;
use roxmltree::Node;
use xades_core::{algorithm, ns, Error};
use xades_dsig::engine::encode_base64;
use xades_dsig::PrefixContext;
use xades_keys::X509Cert;
use xades_transforms::SignatureExclusionTransform;
use xades_xml::document::{find_child_element, find_child_elements};
use xades_xml::XmlWriter;

/// One `ds:Transform` of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformSpec {
    Algorithm(String),
    /// XPath filter dropping every signature from the document.
    SignatureExclusion,
}

/// A `ds:Reference` to be digested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSpec {
    pub id: Option<String>,
    pub uri: String,
    pub ref_type: Option<String>,
    pub transforms: Vec<TransformSpec>,
}

impl ReferenceSpec {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            id: None,
            uri: uri.into(),
            ref_type: None,
            transforms: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_type(mut self, ref_type: impl Into<String>) -> Self {
        self.ref_type = Some(ref_type.into());
        self
    }

    pub fn with_transform(mut self, transform: TransformSpec) -> Self {
        self.transforms.push(transform);
        self
    }

    /// URI, type and transforms of an existing reference.
    pub fn read(reference: Node<'_, '_>) -> Self {
        let transforms = find_child_element(reference, ns::DSIG, ns::node::TRANSFORMS)
            .map(|t| {
                find_child_elements(t, ns::DSIG, ns::node::TRANSFORM)
                    .into_iter()
                    .filter_map(|n| n.attribute(ns::attr::ALGORITHM))
                    .map(|alg| match alg {
                        algorithm::XPATH => TransformSpec::SignatureExclusion,
                        other => TransformSpec::Algorithm(other.to_owned()),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            id: reference.attribute(ns::attr::ID).map(str::to_owned),
            uri: reference.attribute(ns::attr::URI).unwrap_or_default().to_owned(),
            ref_type: reference.attribute(ns::attr::TYPE).map(str::to_owned),
            transforms,
        }
    }

    fn write(&self, w: &mut XmlWriter, p: &PrefixContext, digest_method: &str) {
        let reference = p.dsig(ns::node::REFERENCE);
        let mut attrs: Vec<(&str, &str)> = Vec::new();
        if let Some(id) = &self.id {
            attrs.push((ns::attr::ID, id));
        }
        attrs.push((ns::attr::URI, &self.uri));
        if let Some(t) = &self.ref_type {
            attrs.push((ns::attr::TYPE, t));
        }
        w.start_element(&reference, &attrs);

        if !self.transforms.is_empty() {
            let transforms = p.dsig(ns::node::TRANSFORMS);
            let transform = p.dsig(ns::node::TRANSFORM);
            w.start_element(&transforms, &[]);
            for spec in &self.transforms {
                match spec {
                    TransformSpec::Algorithm(alg) => {
                        w.start_element(&transform, &[(ns::attr::ALGORITHM, alg)]);
                        w.end_element(&transform);
                    }
                    TransformSpec::SignatureExclusion => write_exclusion(w, p),
                }
            }
            w.end_element(&transforms);
        }

        let method = p.dsig(ns::node::DIGEST_METHOD);
        w.start_element(&method, &[(ns::attr::ALGORITHM, digest_method)]);
        w.end_element(&method);
        let value = p.dsig(ns::node::DIGEST_VALUE);
        w.start_element(&value, &[]);
        w.end_element(&value);
        w.end_element(&reference);
    }
}

/// The XPath expression needs a prefix bound to XMLDSIG, so unprefixed
/// markup declares `ds` locally on the `ds:XPath` element.
fn write_exclusion(w: &mut XmlWriter, p: &PrefixContext) {
    let transform = p.dsig(ns::node::TRANSFORM);
    w.start_element(&transform, &[(ns::attr::ALGORITHM, algorithm::XPATH)]);
    if p.dsig.is_empty() {
        let xpath = format!("{}:{}", ns::DSIG_PREFIX, ns::node::XPATH);
        let xmlns = format!("xmlns:{}", ns::DSIG_PREFIX);
        w.text_element(
            &xpath,
            &[(&xmlns, ns::DSIG)],
            &SignatureExclusionTransform::expression(ns::DSIG_PREFIX),
        );
    } else {
        w.text_element(
            &p.dsig(ns::node::XPATH),
            &[],
            &SignatureExclusionTransform::expression(&p.dsig),
        );
    }
    w.end_element(&transform);
}

/// Everything needed to write one new signature.
pub struct SignatureTemplate<'a> {
    pub ids: &'a SignatureIds,
    pub params: &'a SignatureParameters,
    pub prefixes: &'a PrefixContext,
    /// References to signed data, written before the `KeyInfo` and
    /// `SignedProperties` references.
    pub content: Vec<ReferenceSpec>,
    pub formats: Vec<DataObjectFormat>,
    /// Markup of a `ds:Object` carrying enveloped content.
    pub data_object: Option<String>,
}

impl SignatureTemplate<'_> {
    pub fn render(&self) -> Result<String, Error> {
        let p = self.prefixes;
        let ids = self.ids;
        let params = self.params;
        let signing_cert = X509Cert::from_der(params.signer.certificate())?;

        let properties = SignedProperties {
            id: ids.signed_properties.clone(),
            signing_time: match params.signing_time {
                Some(t) => t,
                None => xades_keys::x509::now()?,
            },
            signing_certificate: vec![CertId::of(&signing_cert, &params.digest_method)?],
            policy: params.policy.clone(),
            production_place: params.production_place.clone(),
            signer_role: params.signer_role.clone(),
            data_object_formats: self.formats.clone(),
            commitments: params.commitments.clone(),
        };

        let mut w = XmlWriter::new();
        let signature = p.dsig(ns::node::SIGNATURE);
        let (xmlns, dsig_ns) = p.dsig_xmlns();
        w.start_element(&signature, &[(&xmlns, dsig_ns), (ns::attr::ID, &ids.signature)]);

        let signed_info = p.dsig(ns::node::SIGNED_INFO);
        w.start_element(&signed_info, &[(ns::attr::ID, &ids.signed_info)]);
        let c14n = p.dsig(ns::node::CANONICALIZATION_METHOD);
        w.start_element(&c14n, &[(ns::attr::ALGORITHM, algorithm::C14N)]);
        w.end_element(&c14n);
        let method = p.dsig(ns::node::SIGNATURE_METHOD);
        w.start_element(&method, &[(ns::attr::ALGORITHM, params.signature_method())]);
        w.end_element(&method);

        for reference in &self.content {
            reference.write(&mut w, p, &params.digest_method);
        }
        ReferenceSpec::new(format!("#{}", ids.key_info))
            .with_id(&ids.key_info_reference)
            .write(&mut w, p, &params.digest_method);
        ReferenceSpec::new(format!("#{}", ids.signed_properties))
            .with_type(algorithm::SIGNED_PROPERTIES_TYPE)
            .write(&mut w, p, &params.digest_method);
        w.end_element(&signed_info);

        let value = p.dsig(ns::node::SIGNATURE_VALUE);
        w.start_element(&value, &[(ns::attr::ID, &ids.signature_value)]);
        w.end_element(&value);

        let key_info = p.dsig(ns::node::KEY_INFO);
        let x509_data = p.dsig(ns::node::X509_DATA);
        let x509_cert = p.dsig(ns::node::X509_CERTIFICATE);
        w.start_element(&key_info, &[(ns::attr::ID, &ids.key_info)]);
        w.start_element(&x509_data, &[]);
        w.text_element(&x509_cert, &[], &encode_base64(params.signer.certificate()));
        for cert in params.signer.chain() {
            w.text_element(&x509_cert, &[], &encode_base64(cert));
        }
        w.end_element(&x509_data);
        w.end_element(&key_info);

        if let Some(object) = &self.data_object {
            w.write_raw(object);
        }

        let object = p.dsig(ns::node::OBJECT);
        let qp = p.xades(ns::node::QUALIFYING_PROPERTIES);
        let (xades_xmlns, xades_ns) = p.xades_xmlns();
        let target = format!("#{}", ids.signature);
        w.start_element(&object, &[(ns::attr::ID, &ids.xades_object)]);
        w.start_element(
            &qp,
            &[
                (&xades_xmlns, xades_ns),
                (ns::attr::ID, &ids.qualifying_properties),
                (ns::attr::TARGET, &target),
            ],
        );
        properties.write(&mut w, p);
        w.end_element(&qp);
        w.end_element(&object);

        w.end_element(&signature);
        Ok(w.into_string())
    }
}
