#![forbid(unsafe_code)]

//! Reference dereferencing and canonicalization.
//!
//! A `ds:Reference` resolves to one of three kinds of target: the whole
//! document (`URI=""`), an element of the document (`#id`), or bytes
//! supplied by the caller for an externally detached URI.
//!
//! Element targets with no transforms other than C14N are canonicalized as
//! standalone clones carrying their inherited namespace context. This is
//! the form XAdES hashes `SignedProperties`, `SignatureValue` and the
//! properties covered by time-stamps in, and it yields the same bytes a
//! verifier gets from the in-place document subset. Everything else runs
//! through the transform pipeline over a node set of the document.

use crate::context::DsigContext;
use roxmltree::{Document, Node, NodeId};
use std::collections::HashMap;
use xades_c14n::render::NsDecl;
use xades_c14n::C14nMode;
use xades_core::{algorithm, ns, Error};
use xades_transforms::{
    Base64DecodeTransform, C14nTransform, EnvelopedSignatureTransform,
    SignatureExclusionTransform, TransformData, TransformPipeline,
};
use xades_xml::document::{find_child_element, find_child_elements, is_element};
use xades_xml::{xpath, NodeSet};

/// What a reference URI points at.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a, 'input> {
    /// `URI=""`: the document without comments.
    Document,
    Element(Node<'a, 'input>),
    /// Bytes supplied for an externally detached URI.
    Detached(&'a [u8]),
}

/// Computes the canonical octets a reference digests.
///
/// `doc` must have been parsed with [`xades_xml::parse`], so that node ids
/// stay valid when transforms re-parse its text.
pub struct CanonicalReferenceBuilder<'a, 'input> {
    ctx: &'a DsigContext,
    doc: &'a Document<'input>,
    ids: HashMap<String, NodeId>,
}

impl<'a, 'input> CanonicalReferenceBuilder<'a, 'input> {
    pub fn new(ctx: &'a DsigContext, doc: &'a Document<'input>) -> Self {
        let extra: Vec<String> = ctx
            .id_attrs
            .iter()
            .map(|name| name.rsplit(':').next().unwrap_or(name).to_owned())
            .collect();
        let ids = xades_xml::document::build_id_map(doc, &extra);
        Self { ctx, doc, ids }
    }

    pub fn document(&self) -> &'a Document<'input> {
        self.doc
    }

    /// The element carrying Id `id`.
    pub fn element_by_id(&self, id: &str) -> Result<Node<'a, 'input>, Error> {
        xpath::resolve_id(self.doc, &self.ids, id)
    }

    /// The element a same-document URI (`#id`, `#xpointer(id('id'))`) names.
    pub fn element_by_ref(&self, uri: &str) -> Result<Node<'a, 'input>, Error> {
        let id = xpath::parse_same_document_ref(uri)
            .ok_or_else(|| Error::InvalidUri(uri.to_owned()))?;
        self.element_by_id(id)
    }

    /// Locate the target of a reference.
    ///
    /// An Id that does not resolve falls back to the reference `Type`,
    /// looked up within `signature`, the signature owning the reference.
    pub fn locate(
        &self,
        uri: &str,
        ref_type: Option<&str>,
        signature: Node<'a, 'input>,
    ) -> Result<Target<'a, 'input>, Error> {
        if uri.is_empty() {
            return Ok(Target::Document);
        }
        if let Some(id) = xpath::parse_same_document_ref(uri) {
            if let Ok(node) = self.element_by_id(id) {
                return Ok(Target::Element(node));
            }
            if let Some(node) = ref_type.and_then(|t| self.locate_by_type(t, signature)) {
                tracing::debug!(uri, ref_type, "reference resolved by type");
                return Ok(Target::Element(node));
            }
            return Err(Error::ReferenceTargetNotFound(uri.to_owned()));
        }
        self.ctx
            .detached
            .get(uri)
            .map(|bytes| Target::Detached(bytes.as_slice()))
            .ok_or_else(|| Error::ReferenceTargetNotFound(uri.to_owned()))
    }

    fn locate_by_type(&self, ref_type: &str, signature: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
        match ref_type {
            algorithm::SIGNED_PROPERTIES_TYPE => {
                find_own(signature, ns::XADES, ns::node::SIGNED_PROPERTIES)
            }
            algorithm::OBJECT_TYPE => find_child_elements(signature, ns::DSIG, ns::node::OBJECT)
                .into_iter()
                .find(|o| {
                    find_child_element(*o, ns::XADES, ns::node::QUALIFYING_PROPERTIES).is_none()
                }),
            algorithm::COUNTERSIGNED_SIGNATURE_TYPE => signature
                .ancestors()
                .skip(1)
                .find(|n| is_element(*n, ns::DSIG, ns::node::SIGNATURE))
                .and_then(|parent| {
                    find_child_element(parent, ns::DSIG, ns::node::SIGNATURE_VALUE)
                }),
            _ => None,
        }
    }

    /// Canonical octets of the data `reference` covers, ready to digest.
    pub fn resolve(&self, reference: Node<'a, 'input>, signature: Node<'a, 'input>) -> Result<Vec<u8>, Error> {
        let uri = reference
            .attribute(ns::attr::URI)
            .ok_or_else(|| Error::ReferenceTargetNotFound("Reference without URI".into()))?;
        let target = self.locate(uri, reference.attribute(ns::attr::TYPE), signature)?;
        let transforms = read_transforms(reference);

        let only_c14n = transforms
            .iter()
            .all(|(alg, _)| C14nMode::from_uri(alg).is_some());
        // Only the xpointer form keeps comments; a bare `#id` drops them
        // whatever the transforms ask for.
        let keeps_comments = xpath::is_xpointer_ref(uri);
        if let (Target::Element(node), true) = (target, only_c14n) {
            let mode = match transforms.last().and_then(|(alg, _)| C14nMode::from_uri(alg)) {
                Some(C14nMode::InclusiveWithComments) if keeps_comments => C14nMode::InclusiveWithComments,
                _ => C14nMode::Inclusive,
            };
            return xades_c14n::canonicalize_subtree(node, mode);
        }

        let pipeline = self.pipeline(&transforms, signature)?;
        let input = match target {
            Target::Document => TransformData::Xml {
                xml_text: self.doc.input_text().to_owned(),
                node_set: Some(NodeSet::all_without_comments(self.doc)),
            },
            Target::Element(node) => TransformData::Xml {
                xml_text: self.doc.input_text().to_owned(),
                node_set: Some(if keeps_comments {
                    NodeSet::tree_with_comments(node)
                } else {
                    NodeSet::tree_without_comments(node)
                }),
            },
            Target::Detached(bytes) => TransformData::Binary(bytes.to_vec()),
        };
        tracing::trace!(uri, transforms = ?pipeline.uris(), "dereferencing");
        pipeline.execute(input)?.into_binary()
    }

    fn pipeline(
        &self,
        transforms: &[(&str, Node<'a, 'input>)],
        signature: Node<'a, 'input>,
    ) -> Result<TransformPipeline, Error> {
        let mut pipeline = TransformPipeline::new();
        for (alg, node) in transforms {
            match *alg {
                algorithm::ENVELOPED_SIGNATURE => {
                    pipeline.push(Box::new(EnvelopedSignatureTransform::new(signature.id())));
                }
                algorithm::XPATH => {
                    let expr = find_child_element(*node, ns::DSIG, ns::node::XPATH)
                        .ok_or_else(|| Error::MissingRequiredElement("ds:XPath".into()))?;
                    pipeline.push(Box::new(SignatureExclusionTransform::from_xpath_element(expr)?));
                }
                algorithm::BASE64 => pipeline.push(Box::new(Base64DecodeTransform)),
                other => pipeline.push(Box::new(C14nTransform::new(C14nMode::require(other)?))),
            }
        }
        Ok(pipeline)
    }

    /// Canonicalize `node` standalone, with its inherited context.
    pub fn canonicalize_element(&self, node: Node<'_, '_>, mode: C14nMode) -> Result<Vec<u8>, Error> {
        xades_c14n::canonicalize_subtree(node, mode)
    }

    /// Canonicalize the element a same-document URI names.
    pub fn canonicalize_ref(&self, uri: &str, mode: C14nMode) -> Result<Vec<u8>, Error> {
        let node = self.element_by_ref(uri)?;
        self.canonicalize_element(node, mode)
    }

    /// Namespace bindings injected when the element `uri` names is
    /// canonicalized standalone.
    pub fn inherited_namespaces(&self, uri: &str) -> Result<Vec<NsDecl>, Error> {
        Ok(xades_c14n::inherited_namespaces(self.element_by_ref(uri)?))
    }
}

/// `(Algorithm, ds:Transform)` pairs of a reference, in order.
fn read_transforms<'a, 'input>(reference: Node<'a, 'input>) -> Vec<(&'a str, Node<'a, 'input>)> {
    find_child_element(reference, ns::DSIG, ns::node::TRANSFORMS)
        .map(|t| {
            find_child_elements(t, ns::DSIG, ns::node::TRANSFORM)
                .into_iter()
                .filter_map(|n| n.attribute(ns::attr::ALGORITHM).map(|alg| (alg, n)))
                .collect()
        })
        .unwrap_or_default()
}

/// Whether `node` sits below `signature` without an intervening signature.
pub fn belongs_to(node: Node<'_, '_>, signature: Node<'_, '_>) -> bool {
    node.ancestors()
        .skip(1)
        .find(|a| is_element(*a, ns::DSIG, ns::node::SIGNATURE))
        .is_some_and(|owner| owner.id() == signature.id())
}

/// The first `{ns}local` element of `signature` outside nested
/// counter-signatures.
pub fn find_own<'a, 'input>(
    signature: Node<'a, 'input>,
    ns_uri: &str,
    local: &str,
) -> Option<Node<'a, 'input>> {
    signature
        .descendants()
        .skip(1)
        .find(|n| is_element(*n, ns_uri, local) && belongs_to(*n, signature))
}

/// Every `{ns}local` element of `signature` outside nested counter-signatures.
pub fn find_all_own<'a, 'input>(
    signature: Node<'a, 'input>,
    ns_uri: &str,
    local: &str,
) -> Vec<Node<'a, 'input>> {
    signature
        .descendants()
        .skip(1)
        .filter(|n| is_element(*n, ns_uri, local) && belongs_to(*n, signature))
        .collect()
}
