#![forbid(unsafe_code)]

//! DSig context: per-document configuration for signature operations.

use std::collections::HashMap;
use xades_core::ns;

/// Namespace prefixes used when writing signature markup.
///
/// An empty prefix writes unprefixed names with a default namespace
/// declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixContext {
    pub dsig: String,
    pub xades: String,
}

impl Default for PrefixContext {
    fn default() -> Self {
        Self {
            dsig: ns::DSIG_PREFIX.to_owned(),
            xades: ns::XADES_PREFIX.to_owned(),
        }
    }
}

impl PrefixContext {
    pub fn new(dsig: impl Into<String>, xades: impl Into<String>) -> Self {
        Self {
            dsig: dsig.into(),
            xades: xades.into(),
        }
    }

    /// Qualified name of an XMLDSIG element.
    pub fn dsig(&self, local: &str) -> String {
        qualify(&self.dsig, local)
    }

    /// Qualified name of a XAdES element.
    pub fn xades(&self, local: &str) -> String {
        qualify(&self.xades, local)
    }

    /// The `xmlns` attribute binding the XMLDSIG namespace.
    pub fn dsig_xmlns(&self) -> (String, &'static str) {
        (xmlns_attr(&self.dsig), ns::DSIG)
    }

    /// The `xmlns` attribute binding the XAdES namespace.
    pub fn xades_xmlns(&self) -> (String, &'static str) {
        (xmlns_attr(&self.xades), ns::XADES)
    }
}

fn qualify(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_owned()
    } else {
        format!("{prefix}:{local}")
    }
}

fn xmlns_attr(prefix: &str) -> String {
    if prefix.is_empty() {
        "xmlns".to_owned()
    } else {
        format!("xmlns:{prefix}")
    }
}

/// Context for signature operations on one document.
#[derive(Debug, Clone, Default)]
pub struct DsigContext {
    /// Additional Id attribute names to register.
    pub id_attrs: Vec<String>,
    /// Content of externally detached references, keyed by reference URI.
    pub detached: HashMap<String, Vec<u8>>,
    pub prefixes: PrefixContext,
}

impl DsigContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an Id attribute name to register during processing.
    pub fn add_id_attr(&mut self, name: &str) {
        self.id_attrs.push(name.to_owned());
    }

    /// Supply the bytes behind an externally detached reference URI.
    pub fn with_detached(mut self, uri: impl Into<String>, content: Vec<u8>) -> Self {
        self.detached.insert(uri.into(), content);
        self
    }

    pub fn with_prefixes(mut self, prefixes: PrefixContext) -> Self {
        self.prefixes = prefixes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes() {
        let p = PrefixContext::default();
        assert_eq!(p.dsig("SignedInfo"), "ds:SignedInfo");
        assert_eq!(p.xades_xmlns(), ("xmlns:xades".to_owned(), ns::XADES));

        let bare = PrefixContext::new("", "xa");
        assert_eq!(bare.dsig("Signature"), "Signature");
        assert_eq!(bare.dsig_xmlns().0, "xmlns");
        assert_eq!(bare.xades("Cert"), "xa:Cert");
    }
}
