#![forbid(unsafe_code)]

//! Where things sit inside a XAdES signature.
//!
//! Lookups skip nested counter-signatures, so a parent signature never
//! picks up the properties of a signature it carries.

use roxmltree::Node;
use xades_core::{algorithm, ns, Error};
use xades_dsig::reference::{find_all_own, find_own};
use xades_dsig::PrefixContext;
use xades_xml::document::{find_child_element, find_child_elements, is_element};
use xades_xml::splice::qualified_name_end;
use xades_xml::{Splice, XmlWriter};

/// The prefix `node` is written with in the source text.
fn prefix_of(node: Node<'_, '_>) -> String {
    let raw = &node.document().input_text()[node.range()];
    let qname = &raw[1..qualified_name_end(raw)];
    qname.split_once(':').map(|(p, _)| p.to_owned()).unwrap_or_default()
}

/// Prefixes a signature is written with, for markup added to it later.
pub fn document_prefixes(signature: Node<'_, '_>) -> Result<PrefixContext, Error> {
    let dsig = prefix_of(signature);
    let xades = match find_own(signature, ns::XADES, ns::node::QUALIFYING_PROPERTIES) {
        Some(qp) => prefix_of(qp),
        None => ns::XADES_PREFIX.to_owned(),
    };
    check_prefixes(&PrefixContext::new(dsig, xades))
}

/// Both namespaces need distinct prefixes, or one of them unprefixed.
pub fn check_prefixes(prefixes: &PrefixContext) -> Result<PrefixContext, Error> {
    if prefixes.dsig == prefixes.xades {
        return Err(Error::SchemaValidation(format!(
            "XMLDSIG and XAdES cannot share the prefix {:?}",
            prefixes.dsig
        )));
    }
    Ok(prefixes.clone())
}

pub fn signed_info<'a, 'input>(signature: Node<'a, 'input>) -> Result<Node<'a, 'input>, Error> {
    find_child_element(signature, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::MissingRequiredElement("ds:SignedInfo".into()))
}

pub fn signature_value<'a, 'input>(signature: Node<'a, 'input>) -> Result<Node<'a, 'input>, Error> {
    find_child_element(signature, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .ok_or_else(|| Error::MissingRequiredElement("ds:SignatureValue".into()))
}

/// Id of the `ds:SignatureValue`; time-stamps and counter-signatures
/// reference it.
pub fn signature_value_id<'a>(signature: Node<'a, '_>) -> Result<&'a str, Error> {
    signature_value(signature)?
        .attribute(ns::attr::ID)
        .ok_or_else(|| Error::MissingRequiredElement("ds:SignatureValue/@Id".into()))
}

pub fn references<'a, 'input>(signature: Node<'a, 'input>) -> Result<Vec<Node<'a, 'input>>, Error> {
    Ok(find_child_elements(signed_info(signature)?, ns::DSIG, ns::node::REFERENCE))
}

/// The reference covering the signed content: neither the
/// `SignedProperties` reference nor the one covering `ds:KeyInfo`.
pub fn content_reference<'a, 'input>(signature: Node<'a, 'input>) -> Result<Node<'a, 'input>, Error> {
    let key_info_uri = find_child_element(signature, ns::DSIG, ns::node::KEY_INFO)
        .and_then(|k| k.attribute(ns::attr::ID))
        .map(|id| format!("#{id}"));
    references(signature)?
        .into_iter()
        .find(|r| {
            r.attribute(ns::attr::TYPE) != Some(algorithm::SIGNED_PROPERTIES_TYPE)
                && r.attribute(ns::attr::URI).map(str::to_owned) != key_info_uri
        })
        .ok_or_else(|| Error::ReferenceTargetNotFound("no reference to signed content".into()))
}

pub fn qualifying_properties<'a, 'input>(signature: Node<'a, 'input>) -> Result<Node<'a, 'input>, Error> {
    find_own(signature, ns::XADES, ns::node::QUALIFYING_PROPERTIES)
        .ok_or_else(|| Error::MissingRequiredElement("xades:QualifyingProperties".into()))
}

pub fn signed_properties<'a, 'input>(signature: Node<'a, 'input>) -> Result<Node<'a, 'input>, Error> {
    find_child_element(qualifying_properties(signature)?, ns::XADES, ns::node::SIGNED_PROPERTIES)
        .ok_or_else(|| Error::MissingRequiredElement("xades:SignedProperties".into()))
}

/// `UnsignedSignatureProperties`, when the signature has any.
pub fn unsigned_signature_properties<'a, 'input>(signature: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    let qp = find_own(signature, ns::XADES, ns::node::QUALIFYING_PROPERTIES)?;
    let up = find_child_element(qp, ns::XADES, ns::node::UNSIGNED_PROPERTIES)?;
    find_child_element(up, ns::XADES, ns::node::UNSIGNED_SIGNATURE_PROPERTIES)
}

/// Element children of `UnsignedSignatureProperties`, in document order.
pub fn unsigned_children<'a, 'input>(signature: Node<'a, 'input>) -> Vec<Node<'a, 'input>> {
    unsigned_signature_properties(signature)
        .map(|usp| usp.children().filter(|n| n.is_element()).collect())
        .unwrap_or_default()
}

/// Unsigned signature properties named `local`.
pub fn unsigned<'a, 'input>(signature: Node<'a, 'input>, local: &str) -> Vec<Node<'a, 'input>> {
    unsigned_children(signature)
        .into_iter()
        .filter(|n| is_element(*n, ns::XADES, local))
        .collect()
}

pub fn first_unsigned<'a, 'input>(signature: Node<'a, 'input>, local: &str) -> Option<Node<'a, 'input>> {
    unsigned(signature, local).into_iter().next()
}

/// Counter-signatures directly attached to `signature`.
pub fn counter_signatures<'a, 'input>(signature: Node<'a, 'input>) -> Vec<Node<'a, 'input>> {
    unsigned(signature, ns::node::COUNTER_SIGNATURE)
        .into_iter()
        .filter_map(|cs| find_child_element(cs, ns::DSIG, ns::node::SIGNATURE))
        .collect()
}

/// The signature `signature` counter-signs, if it is a counter-signature.
pub fn countersigned_parent<'a, 'input>(signature: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    let wrapper = signature.parent_element()?;
    if !is_element(wrapper, ns::XADES, ns::node::COUNTER_SIGNATURE) {
        return None;
    }
    wrapper
        .ancestors()
        .find(|n| is_element(*n, ns::DSIG, ns::node::SIGNATURE))
}

/// Own elements of the signature named `{ns}local` anywhere below it.
pub fn own<'a, 'input>(signature: Node<'a, 'input>, ns_uri: &str, local: &str) -> Vec<Node<'a, 'input>> {
    find_all_own(signature, ns_uri, local)
}

/// A splice adding `fragment` as the last unsigned signature property,
/// creating the unsigned containers when missing.
pub fn append_unsigned(source: &str, signature: Node<'_, '_>, fragment: &str) -> Result<Splice, Error> {
    let p = document_prefixes(signature)?;
    let qp = qualifying_properties(signature)?;
    let up = find_child_element(qp, ns::XADES, ns::node::UNSIGNED_PROPERTIES);
    if let Some(usp) = up.and_then(|up| find_child_element(up, ns::XADES, ns::node::UNSIGNED_SIGNATURE_PROPERTIES)) {
        return Splice::append_child(source, usp, fragment);
    }

    let mut w = XmlWriter::new();
    let usp_name = p.xades(ns::node::UNSIGNED_SIGNATURE_PROPERTIES);
    w.start_element(&usp_name, &[]);
    w.write_raw(fragment);
    w.end_element(&usp_name);

    match up {
        // UnsignedSignatureProperties precedes UnsignedDataObjectProperties.
        Some(up) => match up.first_element_child() {
            Some(first) => {
                let at = first.range().start;
                Ok(Splice::new(at..at, w.into_string()))
            }
            None => Splice::append_child(source, up, &w.into_string()),
        },
        None => {
            let up_name = p.xades(ns::node::UNSIGNED_PROPERTIES);
            let mut outer = XmlWriter::new();
            outer.start_element(&up_name, &[]);
            outer.write_raw(&w.into_string());
            outer.end_element(&up_name);
            Splice::append_child(source, qp, &outer.into_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIG: &str = r##"<d:Signature xmlns:d="http://www.w3.org/2000/09/xmldsig#" Id="S"><d:SignedInfo><d:Reference URI="#K"/><d:Reference URI="#SP" Type="http://uri.etsi.org/01903#SignedProperties"/><d:Reference Id="R" URI=""/></d:SignedInfo><d:SignatureValue Id="SV">AA==</d:SignatureValue><d:KeyInfo Id="K"/><d:Object><q:QualifyingProperties xmlns:q="http://uri.etsi.org/01903/v1.3.2#" Target="#S"><q:SignedProperties Id="SP"/></q:QualifyingProperties></d:Object></d:Signature>"##;

    fn signature<'a, 'i>(doc: &'a roxmltree::Document<'i>) -> Node<'a, 'i> {
        doc.root_element()
    }

    #[test]
    fn test_prefixes_and_lookups() {
        let doc = xades_xml::parse(SIG).unwrap();
        let sig = signature(&doc);
        assert_eq!(document_prefixes(sig).unwrap(), PrefixContext::new("d", "q"));
        assert_eq!(signature_value_id(sig).unwrap(), "SV");
        assert_eq!(content_reference(sig).unwrap().attribute("Id"), Some("R"));
        assert!(unsigned_signature_properties(sig).is_none());
    }

    #[test]
    fn test_append_unsigned_creates_containers() {
        let doc = xades_xml::parse(SIG).unwrap();
        let splice = append_unsigned(SIG, signature(&doc), "<q:X/>").unwrap();
        let updated = xades_xml::splice::apply(SIG, vec![splice]).unwrap();
        assert!(updated.contains(
            "<q:SignedProperties Id=\"SP\"/><q:UnsignedProperties><q:UnsignedSignatureProperties><q:X/></q:UnsignedSignatureProperties></q:UnsignedProperties>"
        ));

        let doc = xades_xml::parse(&updated).unwrap();
        let splice = append_unsigned(&updated, signature(&doc), "<q:Y/>").unwrap();
        let again = xades_xml::splice::apply(&updated, vec![splice]).unwrap();
        assert!(again.contains("<q:X/><q:Y/></q:UnsignedSignatureProperties>"));
        let doc = xades_xml::parse(&again).unwrap();
        let names: Vec<&str> = unsigned_children(signature(&doc)).iter().map(|n| n.tag_name().name()).collect();
        assert_eq!(names, ["X", "Y"]);
    }

    #[test]
    fn test_shared_prefix_rejected() {
        assert!(matches!(
            check_prefixes(&PrefixContext::new("x", "x")),
            Err(Error::SchemaValidation(_))
        ));
    }
}
