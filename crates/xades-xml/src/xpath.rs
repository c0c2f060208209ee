#![forbid(unsafe_code)]

//! Same-document reference helpers.
//!
//! Only the forms XAdES produces are supported: `#id` and
//! `#xpointer(id('id'))`.

use xades_core::Error;
use std::collections::HashMap;

/// Parse a same-document reference (`#foo` → `foo`).
///
/// `#xpointer(id('foo'))` is accepted as well.
pub fn parse_same_document_ref(uri: &str) -> Option<&str> {
    let fragment = uri.strip_prefix('#')?;
    Some(parse_xpointer_id(fragment).unwrap_or(fragment))
}

/// Parse an `xpointer(id('...'))` expression and return the Id value.
pub fn parse_xpointer_id(expr: &str) -> Option<&str> {
    let inner = expr.strip_prefix("xpointer(id('")?;
    inner.strip_suffix("'))")
}

/// Whether `uri` is the `#xpointer(id('...'))` form, whose node set keeps
/// comments.
pub fn is_xpointer_ref(uri: &str) -> bool {
    uri.strip_prefix('#').and_then(parse_xpointer_id).is_some()
}

/// Resolve an Id value in a parsed document using a pre-built Id map.
pub fn resolve_id<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
    id_map: &HashMap<String, roxmltree::NodeId>,
    id: &str,
) -> Result<roxmltree::Node<'a, 'input>, Error> {
    id_map
        .get(id)
        .and_then(|nid| doc.get_node(*nid))
        .ok_or_else(|| Error::ReferenceTargetNotFound(format!("#{id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_document_forms() {
        assert_eq!(parse_same_document_ref("#abc"), Some("abc"));
        assert_eq!(parse_same_document_ref("#xpointer(id('abc'))"), Some("abc"));
        assert_eq!(parse_same_document_ref("abc"), None);
        assert_eq!(parse_same_document_ref(""), None);
    }

    #[test]
    fn test_xpointer_detection() {
        assert!(is_xpointer_ref("#xpointer(id('abc'))"));
        assert!(!is_xpointer_ref("#abc"));
        assert!(!is_xpointer_ref("xpointer(id('abc'))"));
    }
}
