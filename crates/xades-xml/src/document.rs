#![forbid(unsafe_code)]

//! Owned XML text, Id maps and element lookups over roxmltree.

use crate::splice::{self, Splice};
use xades_core::Error;
use std::collections::HashMap;

/// Id attribute spellings recognised on every element.
pub const DEFAULT_ID_ATTRS: [&str; 3] = ["Id", "ID", "id"];

/// Legacy spellings, consulted only when no default spelling matched.
pub const LEGACY_ID_ATTRS: [&str; 3] = ["_id", "_Id", "_ID"];

/// An owned XML document.
///
/// To work with the parsed tree, call [`XmlDocument::parse_doc`] which
/// returns a temporary `roxmltree::Document` borrowing from the text.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    text: String,
}

impl XmlDocument {
    /// Parse and validate XML from a string, taking ownership.
    pub fn parse(text: String) -> Result<Self, Error> {
        crate::parse(&text)?;
        Ok(Self { text })
    }

    /// Get the raw XML text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Parse the document and return a temporary `roxmltree::Document`.
    ///
    /// Call this once at the top of a processing step and pass the tree down.
    pub fn parse_doc(&self) -> Result<roxmltree::Document<'_>, Error> {
        crate::parse(&self.text)
    }

    /// Apply a batch of splices and re-validate the result.
    ///
    /// On error the document is left untouched.
    pub fn apply(&mut self, splices: Vec<Splice>) -> Result<(), Error> {
        let updated = splice::apply(&self.text, splices)?;
        crate::parse(&updated)?;
        self.text = updated;
        Ok(())
    }
}

/// Build an Id map from the default, legacy and `extra` attribute names.
///
/// The first element in document order wins for a duplicated value, and a
/// legacy spelling never shadows a default one.
pub fn build_id_map(
    doc: &roxmltree::Document<'_>,
    extra: &[String],
) -> HashMap<String, roxmltree::NodeId> {
    let mut map = HashMap::new();
    for node in doc.descendants().filter(|n| n.is_element()) {
        for attr_name in DEFAULT_ID_ATTRS {
            if let Some(val) = node.attribute(attr_name) {
                map.entry(val.to_owned()).or_insert(node.id());
            }
        }
        for attr in node.attributes() {
            if extra.iter().any(|e| e == attr.name()) {
                map.entry(attr.value().to_owned()).or_insert(node.id());
            }
        }
    }
    for node in doc.descendants().filter(|n| n.is_element()) {
        for attr_name in LEGACY_ID_ATTRS {
            if let Some(val) = node.attribute(attr_name) {
                map.entry(val.to_owned()).or_insert(node.id());
            }
        }
    }
    map
}

/// Whether `node` is an element named `{ns}local_name`.
pub fn is_element(node: roxmltree::Node<'_, '_>, ns: &str, local_name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local_name
        && node.tag_name().namespace().unwrap_or("") == ns
}

pub fn find_child_element<'a, 'input>(
    parent: roxmltree::Node<'a, 'input>,
    ns: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    parent.children().find(|n| is_element(*n, ns, local_name))
}

pub fn find_child_elements<'a, 'input>(
    parent: roxmltree::Node<'a, 'input>,
    ns: &str,
    local_name: &str,
) -> Vec<roxmltree::Node<'a, 'input>> {
    parent
        .children()
        .filter(|n| is_element(*n, ns, local_name))
        .collect()
}

/// Follow a path of child element names below `node`.
pub fn find_path<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    path: &[(&str, &str)],
) -> Option<roxmltree::Node<'a, 'input>> {
    path.iter()
        .try_fold(node, |cur, (ns, name)| find_child_element(cur, ns, name))
}

/// Concatenated text of all descendant text nodes.
pub fn text_content(node: roxmltree::Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a, 'input>(tree: &'a roxmltree::Document<'input>, extra: &[String], id: &str) -> Option<&'a str> {
        let map = build_id_map(tree, extra);
        map.get(id)
            .and_then(|nid| tree.get_node(*nid))
            .map(|n| n.tag_name().name())
    }

    #[test]
    fn test_id_spellings() {
        let xml = r#"<r><a Id="one"/><b ID="two"/><c id="three"/><d _id="four"/><e _ID="five"/></r>"#;
        let doc = XmlDocument::parse(xml.to_owned()).unwrap();
        let tree = doc.parse_doc().unwrap();
        for (id, name) in [("one", "a"), ("two", "b"), ("three", "c"), ("four", "d"), ("five", "e")] {
            assert_eq!(lookup(&tree, &[], id), Some(name));
        }
    }

    #[test]
    fn test_legacy_never_shadows_default() {
        let tree = roxmltree::Document::parse(r#"<r><a _id="x"/><b Id="x"/></r>"#).unwrap();
        assert_eq!(lookup(&tree, &[], "x"), Some("b"));
    }

    #[test]
    fn test_extra_id_attr_by_local_name() {
        let tree = roxmltree::Document::parse(r#"<r xmlns:wsu="urn:wsu"><a wsu:Id="t1"/></r>"#).unwrap();
        assert_eq!(lookup(&tree, &[], "t1"), None);
        assert_eq!(lookup(&tree, &["Id".to_owned()], "t1"), Some("a"));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            XmlDocument::parse("<a><b></a>".to_owned()),
            Err(Error::XmlParse(_))
        ));
    }

    #[test]
    fn test_find_path_and_text() {
        let xml = r#"<r xmlns="urn:x"><a><b>hello <i>big</i> world</b></a></r>"#;
        let tree = roxmltree::Document::parse(xml).unwrap();
        let b = find_path(tree.root_element(), &[("urn:x", "a"), ("urn:x", "b")]).unwrap();
        assert_eq!(text_content(b), "hello big world");
    }
}
