#![forbid(unsafe_code)]

//! Namespace and attribute nodes as they are ordered and written by C14N.

use crate::escape;
use std::cmp::Ordering;

/// A namespace declaration to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// `""` for the default namespace.
    pub prefix: String,
    pub uri: String,
}

impl NsDecl {
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            uri: uri.into(),
        }
    }

    /// The attribute name, `xmlns` or `xmlns:prefix`.
    pub fn attr_name(&self) -> String {
        if self.prefix.is_empty() {
            "xmlns".to_owned()
        } else {
            format!("xmlns:{}", self.prefix)
        }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(b' ');
        out.extend_from_slice(self.attr_name().as_bytes());
        out.extend_from_slice(b"=\"");
        escape::write_attr(out, &self.uri);
        out.push(b'"');
    }
}

impl Ord for NsDecl {
    /// The default namespace sorts first, then prefixes lexicographically.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.prefix.is_empty(), other.prefix.is_empty()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.prefix.cmp(&other.prefix),
        }
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// `""` for no namespace.
    pub ns_uri: String,
    pub local_name: String,
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(b' ');
        out.extend_from_slice(self.qualified_name.as_bytes());
        out.extend_from_slice(b"=\"");
        escape::write_attr(out, &self.value);
        out.push(b'"');
    }
}

impl Ord for Attr {
    /// Unqualified attributes first, then by (namespace URI, local name).
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.ns_uri.is_empty(), other.ns_uri.is_empty()) {
            (true, true) => self.local_name.cmp(&other.local_name),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self
                .ns_uri
                .cmp(&other.ns_uri)
                .then_with(|| self.local_name.cmp(&other.local_name)),
        }
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ns_order() {
        let mut decls = vec![
            NsDecl::new("xades", "urn:x"),
            NsDecl::new("", "urn:d"),
            NsDecl::new("ds", "urn:ds"),
        ];
        decls.sort();
        let names: Vec<String> = decls.iter().map(NsDecl::attr_name).collect();
        assert_eq!(names, ["xmlns", "xmlns:ds", "xmlns:xades"]);
    }

    #[test]
    fn test_attr_order() {
        let a = |ns: &str, local: &str| Attr {
            ns_uri: ns.into(),
            local_name: local.into(),
            qualified_name: local.into(),
            value: String::new(),
        };
        let mut attrs = vec![a("urn:b", "a"), a("", "z"), a("urn:a", "z"), a("", "b")];
        attrs.sort();
        let order: Vec<(&str, &str)> = attrs
            .iter()
            .map(|x| (x.ns_uri.as_str(), x.local_name.as_str()))
            .collect();
        assert_eq!(order, [("", "b"), ("", "z"), ("urn:a", "z"), ("urn:b", "a")]);
    }
}
