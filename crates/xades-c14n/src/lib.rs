#![forbid(unsafe_code)]

//! XML canonicalization for the xades workspace.
//!
//! Implements Canonical XML 1.0 with and without comments, over whole
//! documents, document subsets, and detached element clones carrying their
//! inherited namespace context (see [`inject`]).

pub mod escape;
pub mod inclusive;
pub mod inject;
pub mod render;

pub use inject::{canonicalize_subtree, clone_with_inherited, inherited_namespaces};

use xades_core::{algorithm, Error};
use xades_xml::NodeSet;

/// The canonicalization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum C14nMode {
    /// Canonical XML 1.0
    #[default]
    Inclusive,
    /// Canonical XML 1.0 with comments
    InclusiveWithComments,
}

impl C14nMode {
    /// Get the algorithm URI for this mode.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Inclusive => algorithm::C14N,
            Self::InclusiveWithComments => algorithm::C14N_WITH_COMMENTS,
        }
    }

    /// Parse a C14N mode from an algorithm URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            algorithm::C14N => Some(Self::Inclusive),
            algorithm::C14N_WITH_COMMENTS => Some(Self::InclusiveWithComments),
            _ => None,
        }
    }

    /// Like [`C14nMode::from_uri`], failing with `UnsupportedAlgorithm`.
    pub fn require(uri: &str) -> Result<Self, Error> {
        Self::from_uri(uri)
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("canonicalization: {uri}")))
    }

    pub fn with_comments(&self) -> bool {
        matches!(self, Self::InclusiveWithComments)
    }
}

/// Canonicalize XML text, optionally restricted to a node set.
pub fn canonicalize(xml: &str, mode: C14nMode, node_set: Option<&NodeSet>) -> Result<Vec<u8>, Error> {
    let doc = xades_xml::parse(xml)?;
    canonicalize_doc(&doc, mode, node_set)
}

/// Canonicalize a pre-parsed document.
pub fn canonicalize_doc(
    doc: &roxmltree::Document<'_>,
    mode: C14nMode,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    inclusive::canonicalize(doc, mode.with_comments(), node_set)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "<?xml version=\"1.0\"?>\n<doc xmlns:b=\"urn:b\" z='1' a=\"2\">\r\n  <b:e   attr = 'x&#9;y'/><!-- note --><![CDATA[<raw>]]>\n</doc>";

    #[test]
    fn test_idempotent() {
        let once = canonicalize(SAMPLE, C14nMode::Inclusive, None).unwrap();
        let twice = canonicalize(std::str::from_utf8(&once).unwrap(), C14nMode::Inclusive, None).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_reserialized_input_same_form() {
        let doc = xades_xml::parse(SAMPLE).unwrap();
        let direct = canonicalize_doc(&doc, C14nMode::InclusiveWithComments, None).unwrap();
        let reparsed = canonicalize(
            std::str::from_utf8(&direct).unwrap(),
            C14nMode::InclusiveWithComments,
            None,
        )
        .unwrap();
        assert_eq!(direct, reparsed);
    }

    #[test]
    fn test_mode_uris() {
        for mode in [C14nMode::Inclusive, C14nMode::InclusiveWithComments] {
            assert_eq!(C14nMode::from_uri(mode.uri()), Some(mode));
        }
        assert!(matches!(
            C14nMode::require("http://www.w3.org/2001/10/xml-exc-c14n#"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_cdata_and_whitespace() {
        let out = canonicalize(SAMPLE, C14nMode::Inclusive, None).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<doc xmlns:b=\"urn:b\" a=\"2\" z=\"1\">\n  <b:e attr=\"x&#x9;y\"></b:e>&lt;raw&gt;\n</doc>"
        );
    }
}
