#![forbid(unsafe_code)]

//! Transforms that cut signatures out of the signed node set.

use crate::pipeline::{Transform, TransformData};
use roxmltree::{Node, NodeId};
use xades_core::{algorithm, ns, Error};
use xades_xml::NodeSet;

/// The enveloped signature transform: removes the `<Signature>` element
/// that contains the reference, with all its descendants.
pub struct EnvelopedSignatureTransform {
    signature: NodeId,
}

impl EnvelopedSignatureTransform {
    /// `signature` is the id of the enclosing `ds:Signature` in the text the
    /// pipeline runs over.
    pub fn new(signature: NodeId) -> Self {
        Self { signature }
    }
}

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let TransformData::Xml { xml_text, node_set } = input else {
            return Err(Error::Transform(
                "enveloped-signature transform requires XML input".into(),
            ));
        };
        let doc = xades_xml::parse(&xml_text)?;
        let mut set = node_set.unwrap_or_else(|| NodeSet::all(&doc));
        let signature = doc
            .get_node(self.signature)
            .filter(|n| n.has_tag_name((ns::DSIG, ns::node::SIGNATURE)))
            .ok_or_else(|| Error::Transform("enveloped signature element not found".into()))?;
        set.remove_subtree(signature);
        Ok(TransformData::Xml {
            xml_text,
            node_set: Some(set),
        })
    }
}

/// XPath filter `not(ancestor-or-self::ds:Signature)`: drops every
/// signature in the document, so that sibling signatures can be added or
/// upgraded without breaking each other.
pub struct SignatureExclusionTransform;

impl SignatureExclusionTransform {
    /// The expression for a document binding the XMLDSIG namespace to `prefix`.
    pub fn expression(prefix: &str) -> String {
        format!("not(ancestor-or-self::{prefix}:{})", ns::node::SIGNATURE)
    }

    /// Recognize the expression carried by a `ds:XPath` element. The prefix
    /// must be bound to the XMLDSIG namespace in the element's scope.
    pub fn from_xpath_element(xpath: Node<'_, '_>) -> Result<Self, Error> {
        let expr: String = xades_xml::document::text_content(xpath)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let prefix = expr
            .strip_prefix("not(ancestor-or-self::")
            .and_then(|rest| rest.strip_suffix(":Signature)"));
        match prefix {
            Some(prefix) if xpath.lookup_namespace_uri(Some(prefix)) == Some(ns::DSIG) => Ok(Self),
            _ => Err(Error::UnsupportedAlgorithm(format!("XPath expression: {expr}"))),
        }
    }
}

impl Transform for SignatureExclusionTransform {
    fn uri(&self) -> &str {
        algorithm::XPATH
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let TransformData::Xml { xml_text, node_set } = input else {
            return Err(Error::Transform("XPath transform requires XML input".into()));
        };
        let doc = xades_xml::parse(&xml_text)?;
        let mut set = node_set.unwrap_or_else(|| NodeSet::all(&doc));
        for signature in doc
            .descendants()
            .filter(|n| n.has_tag_name((ns::DSIG, ns::node::SIGNATURE)))
        {
            set.remove_subtree(signature);
        }
        Ok(TransformData::Xml {
            xml_text,
            node_set: Some(set),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<doc xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><data>v</data><ds:Signature Id="a"><ds:SignedInfo/></ds:Signature><ds:Signature Id="b"/></doc>"#;

    fn input() -> TransformData {
        TransformData::Xml {
            xml_text: DOC.to_owned(),
            node_set: None,
        }
    }

    #[test]
    fn test_enveloped_removes_own_signature_only() {
        let doc = xades_xml::parse(DOC).unwrap();
        let sig = doc
            .descendants()
            .find(|n| n.attribute("Id") == Some("a"))
            .unwrap();
        let out = EnvelopedSignatureTransform::new(sig.id()).execute(input()).unwrap();
        assert_eq!(
            out.into_binary().unwrap(),
            br#"<doc xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><data>v</data><ds:Signature Id="b"></ds:Signature></doc>"#
        );
    }

    #[test]
    fn test_exclusion_removes_all_signatures() {
        let out = SignatureExclusionTransform.execute(input()).unwrap();
        assert_eq!(
            out.into_binary().unwrap(),
            br#"<doc xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><data>v</data></doc>"#
        );
    }

    #[test]
    fn test_recognize_expression() {
        let xml = format!(
            r#"<ds:XPath xmlns:ds="{}">{}</ds:XPath>"#,
            ns::DSIG,
            SignatureExclusionTransform::expression("ds")
        );
        let doc = xades_xml::parse(&xml).unwrap();
        assert!(SignatureExclusionTransform::from_xpath_element(doc.root_element()).is_ok());

        let other = r#"<XPath xmlns:ds="urn:other">not(ancestor-or-self::ds:Signature)</XPath>"#;
        let doc = xades_xml::parse(other).unwrap();
        assert!(matches!(
            SignatureExclusionTransform::from_xpath_element(doc.root_element()),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }
}
