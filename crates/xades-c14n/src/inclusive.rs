#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0 (C14N 1.0).
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//! With comments: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
//!
//! The canonical form:
//! - outputs namespace declarations sorted by prefix (default first)
//! - outputs attributes sorted by (namespace-URI, local-name)
//! - escapes text and attribute values per C14N rules
//! - optionally preserves or strips comments
//! - supports document-subset canonicalization via [`NodeSet`]

use crate::escape;
use crate::render::{Attr, NsDecl};
use roxmltree::{Node, NodeType};
use std::collections::BTreeMap;
use xades_core::{ns, Error};
use xades_xml::nodeset::NodeSet;
use xades_xml::splice::qualified_name_end;

/// Canonicalize a document using Inclusive C14N 1.0.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    let mut output = Vec::new();
    let ctx = C14nContext {
        input: doc.input_text(),
        with_comments,
        node_set,
    };
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new())?;
    Ok(output)
}

struct C14nContext<'a> {
    input: &'a str,
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
}

impl C14nContext<'_> {
    fn is_visible(&self, node: &Node<'_, '_>) -> bool {
        self.node_set.map_or(true, |ns| ns.contains(node))
    }

    fn process_node(
        &self,
        node: Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        match node.node_type() {
            NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, output, rendered_ns)?;
                }
            }
            NodeType::Element => self.process_element(node, output, rendered_ns)?,
            NodeType::Text => {
                if self.is_visible(&node) {
                    escape::write_text(output, node.text().unwrap_or(""));
                }
            }
            NodeType::Comment => {
                if self.with_comments && self.is_visible(&node) {
                    self.around_document_element(node, output, |out| {
                        out.extend_from_slice(b"<!--");
                        out.extend_from_slice(node.text().unwrap_or("").as_bytes());
                        out.extend_from_slice(b"-->");
                    });
                }
            }
            NodeType::PI => {
                if let (true, Some(pi)) = (self.is_visible(&node), node.pi()) {
                    self.around_document_element(node, output, |out| {
                        out.extend_from_slice(b"<?");
                        out.extend_from_slice(pi.target.as_bytes());
                        if let Some(value) = pi.value.filter(|v| !v.is_empty()) {
                            out.push(b' ');
                            escape::write_pi(out, value);
                        }
                        out.extend_from_slice(b"?>");
                    });
                }
            }
        }
        Ok(())
    }

    /// Top-level comments and PIs get a line break on the side facing the
    /// document element.
    fn around_document_element(
        &self,
        node: Node<'_, '_>,
        output: &mut Vec<u8>,
        write: impl FnOnce(&mut Vec<u8>),
    ) {
        let top_level = node
            .parent()
            .is_some_and(|p| p.node_type() == NodeType::Root);
        if top_level && node.prev_siblings().skip(1).any(|s| s.is_element()) {
            output.push(b'\n');
        }
        write(output);
        if top_level && node.next_siblings().skip(1).any(|s| s.is_element()) {
            output.push(b'\n');
        }
    }

    fn process_element(
        &self,
        node: Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        if !self.is_visible(&node) {
            for child in node.children() {
                self.process_node(child, output, rendered_ns)?;
            }
            return Ok(());
        }

        let in_scope = inscope_namespaces(node);

        let mut ns_decls: Vec<NsDecl> = in_scope
            .iter()
            .filter(|(prefix, uri)| rendered_ns.get(*prefix) != Some(*uri))
            .map(|(prefix, uri)| NsDecl::new(prefix.as_str(), uri.as_str()))
            .collect();
        // A default namespace in effect on the output ancestor but not here
        // has to be undeclared explicitly.
        if rendered_ns.get("").is_some_and(|d| !d.is_empty()) && !in_scope.contains_key("") {
            ns_decls.push(NsDecl::new("", ""));
        }
        ns_decls.sort();

        let mut attrs: Vec<Attr> = node
            .attributes()
            .map(|attr| Attr {
                ns_uri: attr.namespace().unwrap_or("").to_owned(),
                local_name: attr.name().to_owned(),
                qualified_name: self.attr_qname(&attr),
                value: attr.value().to_owned(),
            })
            .collect();

        // xml:* attributes are inherited onto the apex of a document subset
        // whose parent element is not visible.
        if self.node_set.is_some() {
            let parent_hidden = node
                .parent()
                .map_or(true, |p| !p.is_element() || !self.is_visible(&p));
            if parent_hidden {
                let extra: Vec<Attr> = inherited_xml_attrs(node)
                    .into_iter()
                    .filter(|x| {
                        !attrs
                            .iter()
                            .any(|a| a.ns_uri == ns::XML && a.local_name == x.local_name)
                    })
                    .collect();
                attrs.extend(extra);
            }
        }
        attrs.sort();

        let elem_name = self.element_qname(node);

        output.push(b'<');
        output.extend_from_slice(elem_name.as_bytes());
        for decl in &ns_decls {
            decl.write_to(output);
        }
        for attr in &attrs {
            attr.write_to(output);
        }
        output.push(b'>');

        for child in node.children() {
            self.process_node(child, output, &in_scope)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
        Ok(())
    }

    fn element_qname(&self, node: Node<'_, '_>) -> String {
        let raw = &self.input[node.range()];
        raw[1..qualified_name_end(raw)].to_owned()
    }

    fn attr_qname(&self, attr: &roxmltree::Attribute<'_, '_>) -> String {
        if attr.namespace() == Some(ns::XML) {
            return format!("xml:{}", attr.name());
        }
        self.input
            .get(attr.range_qname())
            .map(str::to_owned)
            .unwrap_or_else(|| attr.name().to_owned())
    }
}

/// All namespace bindings in scope at `node`, without the implicit `xml`
/// binding and without undeclared defaults.
pub fn inscope_namespaces(node: Node<'_, '_>) -> BTreeMap<String, String> {
    node.namespaces()
        .filter(|n| n.name() != Some("xml") && !n.uri().is_empty())
        .map(|n| (n.name().unwrap_or("").to_owned(), n.uri().to_owned()))
        .collect()
}

/// `xml:*` attributes of the ancestors of `node`, nearest value winning.
pub fn inherited_xml_attrs(node: Node<'_, '_>) -> Vec<Attr> {
    let mut inherited: BTreeMap<String, String> = BTreeMap::new();
    for ancestor in node.ancestors().skip(1).filter(|n| n.is_element()) {
        for attr in ancestor.attributes() {
            if attr.namespace() == Some(ns::XML) {
                inherited
                    .entry(attr.name().to_owned())
                    .or_insert_with(|| attr.value().to_owned());
            }
        }
    }
    inherited
        .into_iter()
        .map(|(name, value)| Attr {
            ns_uri: ns::XML.to_owned(),
            qualified_name: format!("xml:{name}"),
            local_name: name,
            value,
        })
        .collect()
}
