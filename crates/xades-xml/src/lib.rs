#![forbid(unsafe_code)]

//! XML document layer for the xades workspace.
//!
//! Documents are kept as owned text and re-parsed with `roxmltree` whenever
//! a tree is needed. Mutation happens by splicing text ranges taken from the
//! parsed tree, so the bytes outside a splice are never re-serialized.

pub mod document;
pub mod nodeset;
pub mod splice;
pub mod writer;
pub mod xpath;

pub use document::XmlDocument;
pub use nodeset::NodeSet;
pub use splice::Splice;
pub use writer::XmlWriter;

/// Return roxmltree parsing options that allow DTD.
///
/// roxmltree never resolves external entities, so accepting a DTD only
/// enables internal entity definitions.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}

/// Parse `text` with [`parsing_options`], mapping failures to `XmlParse`.
pub fn parse(text: &str) -> Result<roxmltree::Document<'_>, xades_core::Error> {
    roxmltree::Document::parse_with_options(text, parsing_options())
        .map_err(|e| xades_core::Error::XmlParse(e.to_string()))
}
