#![forbid(unsafe_code)]

//! Subtree cloning with inherited-context injection.
//!
//! XAdES hashes elements such as `SignedProperties` or a `SignatureValue` on
//! their own, yet a verifier canonicalizes them in place, where every
//! namespace binding and `xml:*` attribute of the ancestors is in scope.
//! Cloning the element's source text and declaring that context on the clone
//! yields the same canonical bytes from a standalone parse.

use crate::inclusive::{inherited_xml_attrs, inscope_namespaces};
use crate::render::{Attr, NsDecl};
use crate::C14nMode;
use roxmltree::Node;
use xades_core::{ns, Error};
use xades_xml::splice::{declared_prefixes, qualified_name_end};

/// Namespace bindings in scope at `node` that its own start tag does not
/// declare, nearest ancestor declaration winning.
pub fn inherited_namespaces(node: Node<'_, '_>) -> Vec<NsDecl> {
    let raw = &node.document().input_text()[node.range()];
    let own = declared_prefixes(raw);
    inscope_namespaces(node)
        .into_iter()
        .filter(|(prefix, _)| !own.contains(prefix))
        .map(|(prefix, uri)| NsDecl::new(prefix, uri))
        .collect()
}

/// `xml:*` attributes inherited by `node` that it does not carry itself.
pub fn missing_xml_attrs(node: Node<'_, '_>) -> Vec<Attr> {
    inherited_xml_attrs(node)
        .into_iter()
        .filter(|a| node.attribute((ns::XML, a.local_name.as_str())).is_none())
        .collect()
}

/// Source text of `node` with its inherited context declared on the root.
pub fn clone_with_inherited(node: Node<'_, '_>) -> Result<String, Error> {
    if !node.is_element() {
        return Err(Error::Canonicalization("only elements can be cloned".into()));
    }
    let raw = &node.document().input_text()[node.range()];
    let name_end = qualified_name_end(raw);

    let mut injected = Vec::new();
    for decl in inherited_namespaces(node) {
        decl.write_to(&mut injected);
    }
    for attr in missing_xml_attrs(node) {
        attr.write_to(&mut injected);
    }
    let injected = String::from_utf8(injected)
        .map_err(|e| Error::Canonicalization(format!("injected context: {e}")))?;

    let mut out = String::with_capacity(raw.len() + injected.len());
    out.push_str(&raw[..name_end]);
    out.push_str(&injected);
    out.push_str(&raw[name_end..]);
    Ok(out)
}

/// Canonicalize `node` as a standalone clone carrying its inherited context.
pub fn canonicalize_subtree(node: Node<'_, '_>, mode: C14nMode) -> Result<Vec<u8>, Error> {
    let clone = clone_with_inherited(node)?;
    let bytes = crate::canonicalize(&clone, mode, None)?;
    tracing::debug!(
        element = node.tag_name().name(),
        len = bytes.len(),
        "canonicalized detached subtree"
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xades_xml::NodeSet;

    const DOC: &str = r#"<root xmlns="urn:default" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" xmlns:x="urn:x" xml:lang="en"><ds:Signature Id="s" xmlns:x="urn:nearer"><ds:SignedInfo xml:space="preserve"><x:Item a="1">t &amp; u</x:Item><plain/></ds:SignedInfo></ds:Signature></root>"#;

    fn signed_info<'a, 'i>(doc: &'a roxmltree::Document<'i>) -> Node<'a, 'i> {
        doc.descendants()
            .find(|n| n.has_tag_name((ns::DSIG, "SignedInfo")))
            .unwrap()
    }

    #[test]
    fn test_nearest_declaration_wins() {
        let doc = roxmltree::Document::parse(DOC).unwrap();
        let decls = inherited_namespaces(signed_info(&doc));
        assert!(decls.contains(&NsDecl::new("x", "urn:nearer")));
        assert!(decls.contains(&NsDecl::new("", "urn:default")));
        assert!(decls.contains(&NsDecl::new("ds", ns::DSIG)));
        assert_eq!(decls.len(), 3);
    }

    #[test]
    fn test_clone_parses_standalone() {
        let doc = roxmltree::Document::parse(DOC).unwrap();
        let clone = clone_with_inherited(signed_info(&doc)).unwrap();
        let reparsed = roxmltree::Document::parse(&clone).unwrap();
        assert_eq!(reparsed.root_element().attribute((ns::XML, "lang")), Some("en"));
        assert_eq!(reparsed.root_element().attribute((ns::XML, "space")), Some("preserve"));
    }

    #[test]
    fn test_clone_matches_in_place_subset() {
        let doc = roxmltree::Document::parse(DOC).unwrap();
        let node = signed_info(&doc);
        let detached = canonicalize_subtree(node, C14nMode::Inclusive).unwrap();
        let subset = NodeSet::tree_without_comments(node);
        let in_place = crate::canonicalize_doc(&doc, C14nMode::Inclusive, Some(&subset)).unwrap();
        assert_eq!(detached, in_place);
    }

    #[test]
    fn test_own_declarations_not_duplicated() {
        let xml = r#"<r xmlns:a="urn:a"><a:e xmlns:a="urn:a"/></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let e = doc.root_element().first_element_child().unwrap();
        assert!(inherited_namespaces(e).is_empty());
        assert_eq!(clone_with_inherited(e).unwrap(), r#"<a:e xmlns:a="urn:a"/>"#);
    }
}
