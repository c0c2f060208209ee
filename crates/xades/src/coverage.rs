#![forbid(unsafe_code)]

//! What each kind of time-stamp covers.
//!
//! Both the upgrade and the validation checks go through here, so a stamp
//! is verified over exactly the octets it was requested for. Every
//! covered element is canonicalized standalone with inclusive C14N.

use crate::layout;
use roxmltree::Node;
use xades_c14n::C14nMode;
use xades_core::{ns, Error};
use xades_dsig::engine::decode_base64;
use xades_dsig::CanonicalReferenceBuilder;
use xades_xml::document::{find_child_element, find_child_elements, is_element, text_content};

/// The unsigned time-stamp properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StampKind {
    Signature,
    SigAndRefs,
    RefsOnly,
    Archive,
}

impl StampKind {
    pub const ALL: [StampKind; 4] = [
        StampKind::Signature,
        StampKind::SigAndRefs,
        StampKind::RefsOnly,
        StampKind::Archive,
    ];

    /// Local name of the property element.
    pub fn element(&self) -> &'static str {
        match self {
            StampKind::Signature => ns::node::SIGNATURE_TIME_STAMP,
            StampKind::SigAndRefs => ns::node::SIG_AND_REFS_TIME_STAMP,
            StampKind::RefsOnly => ns::node::REFS_ONLY_TIME_STAMP,
            StampKind::Archive => ns::node::ARCHIVE_TIME_STAMP,
        }
    }

    /// Id prefix of the encapsulated token.
    pub fn token_prefix(&self) -> &'static str {
        match self {
            StampKind::Signature => "SignatureTimeStamp",
            StampKind::SigAndRefs => "SigAndRefsStamp",
            StampKind::RefsOnly => "RefsOnlyStamp",
            StampKind::Archive => "ArchiveStamp",
        }
    }

    pub fn of(node: Node<'_, '_>) -> Option<StampKind> {
        Self::ALL
            .into_iter()
            .find(|kind| is_element(node, ns::XADES, kind.element()))
    }
}

/// The `HashDataInfo` URIs a stamp lists and the octets it stamps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Covered {
    pub uris: Vec<String>,
    pub bytes: Vec<u8>,
}

impl Covered {
    fn push(&mut self, uri: Option<String>, bytes: Vec<u8>) {
        self.uris.extend(uri);
        self.bytes.extend(bytes);
    }
}

/// Coverage of a `kind` stamp over `signature`. With `before`, only
/// unsigned properties preceding that element count, which is the state a
/// stamp already in the document was taken over.
pub fn covered<'a, 'input>(
    builder: &CanonicalReferenceBuilder<'a, 'input>,
    signature: Node<'a, 'input>,
    kind: StampKind,
    before: Option<Node<'a, 'input>>,
) -> Result<Covered, Error> {
    let preceding: Vec<Node<'a, 'input>> = layout::unsigned_children(signature)
        .into_iter()
        .filter(|n| before.map_or(true, |b| n.range().start < b.range().start))
        .collect();
    let c14n = |node: Node<'a, 'input>| builder.canonicalize_element(node, C14nMode::Inclusive);
    let value = layout::signature_value(signature)?;
    let value_uri = Some(format!("#{}", layout::signature_value_id(signature)?));

    let mut out = Covered::default();
    match kind {
        StampKind::Signature => out.push(value_uri, c14n(value)?),
        StampKind::SigAndRefs | StampKind::RefsOnly => {
            if kind == StampKind::SigAndRefs {
                out.push(value_uri, c14n(value)?);
                for stamp in preceding
                    .iter()
                    .filter(|n| is_element(**n, ns::XADES, ns::node::SIGNATURE_TIME_STAMP))
                {
                    out.push(child_uri(*stamp), c14n(*stamp)?);
                }
            }
            for local in [ns::node::COMPLETE_CERTIFICATE_REFS, ns::node::COMPLETE_REVOCATION_REFS] {
                let refs = preceding
                    .iter()
                    .find(|n| is_element(**n, ns::XADES, local))
                    .ok_or_else(|| Error::MissingRequiredElement(format!("xades:{local}")))?;
                out.push(child_uri(*refs), c14n(*refs)?);
            }
        }
        StampKind::Archive => {
            for reference in layout::references(signature)? {
                out.push(reference_uri(reference), builder.resolve(reference, signature)?);
            }
            let signed_info = layout::signed_info(signature)?;
            out.push(
                signed_info.attribute(ns::attr::ID).map(|id| format!("#{id}")),
                c14n(signed_info)?,
            );
            out.push(value_uri, c14n(value)?);
            for child in &preceding {
                out.push(child_uri(*child), c14n(*child)?);
            }
        }
    }
    Ok(out)
}

/// How an archive stamp names the data a reference covers.
fn reference_uri(reference: Node<'_, '_>) -> Option<String> {
    let uri = reference.attribute(ns::attr::URI).unwrap_or_default();
    if uri.starts_with('#') {
        return Some(uri.to_owned());
    }
    match reference.attribute(ns::attr::ID) {
        Some(id) => Some(format!("#{id}")),
        None => Some(uri.to_owned()),
    }
}

/// How stamps name an unsigned property: counter-signatures by the nested
/// signature, everything else by its own Id.
fn child_uri(node: Node<'_, '_>) -> Option<String> {
    let id = if is_element(node, ns::XADES, ns::node::COUNTER_SIGNATURE) {
        find_child_element(node, ns::DSIG, ns::node::SIGNATURE).and_then(|s| s.attribute(ns::attr::ID))
    } else {
        node.attribute(ns::attr::ID)
    };
    id.map(|id| format!("#{id}"))
}

/// `uri` attributes of a stamp's `HashDataInfo` children, in order.
pub fn hash_data_uris(stamp: Node<'_, '_>) -> Vec<String> {
    find_child_elements(stamp, ns::XADES, ns::node::HASH_DATA_INFO)
        .into_iter()
        .filter_map(|h| h.attribute(ns::attr::HASH_DATA_URI).map(str::to_owned))
        .collect()
}

/// DER of the token a stamp encapsulates.
pub fn encapsulated_token(stamp: Node<'_, '_>) -> Result<Vec<u8>, Error> {
    let token = find_child_element(stamp, ns::XADES, ns::node::ENCAPSULATED_TIME_STAMP)
        .ok_or_else(|| Error::MissingRequiredElement("xades:EncapsulatedTimeStamp".into()))?;
    decode_base64(&text_content(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use xades_dsig::DsigContext;

    fn doc() -> String {
        format!(
            r##"<ds:Signature xmlns:ds="{dsig}" Id="S"><ds:SignedInfo Id="SI"><ds:CanonicalizationMethod Algorithm="http://www.w3.org/TR/2001/REC-xml-c14n-20010315"/><ds:Reference URI="#K"/></ds:SignedInfo><ds:SignatureValue Id="SV">AA==</ds:SignatureValue><ds:KeyInfo Id="K"/><ds:Object><x:QualifyingProperties xmlns:x="{xades}"><x:UnsignedProperties><x:UnsignedSignatureProperties><x:SignatureTimeStamp Id="TS"><x:HashDataInfo uri="#SV"/><x:EncapsulatedTimeStamp Id="TOK">AQID</x:EncapsulatedTimeStamp></x:SignatureTimeStamp><x:CompleteCertificateRefs Id="CC"/><x:CompleteRevocationRefs Id="CR"/><x:ArchiveTimeStamp Id="A1"><x:EncapsulatedTimeStamp Id="ATOK">AQID</x:EncapsulatedTimeStamp></x:ArchiveTimeStamp></x:UnsignedSignatureProperties></x:UnsignedProperties></x:QualifyingProperties></ds:Object></ds:Signature>"##,
            dsig = ns::DSIG,
            xades = ns::XADES
        )
    }

    #[test]
    fn test_uris_per_kind() {
        let xml = doc();
        let tree = xades_xml::parse(&xml).unwrap();
        let ctx = DsigContext::new();
        let builder = CanonicalReferenceBuilder::new(&ctx, &tree);
        let sig = tree.root_element();

        let ts = covered(&builder, sig, StampKind::Signature, None).unwrap();
        assert_eq!(ts.uris, ["#SV"]);
        assert!(ts.bytes.starts_with(b"<ds:SignatureValue xmlns:ds="));

        let x = covered(&builder, sig, StampKind::SigAndRefs, None).unwrap();
        assert_eq!(x.uris, ["#SV", "#TS", "#CC", "#CR"]);
        let refs_only = covered(&builder, sig, StampKind::RefsOnly, None).unwrap();
        assert_eq!(refs_only.uris, ["#CC", "#CR"]);

        let archive = covered(&builder, sig, StampKind::Archive, None).unwrap();
        assert_eq!(archive.uris, ["#K", "#SI", "#SV", "#TS", "#CC", "#CR", "#A1"]);

        let first_archive = layout::first_unsigned(sig, ns::node::ARCHIVE_TIME_STAMP).unwrap();
        let earlier = covered(&builder, sig, StampKind::Archive, Some(first_archive)).unwrap();
        assert_eq!(earlier.uris, ["#K", "#SI", "#SV", "#TS", "#CC", "#CR"]);
        assert!(archive.bytes.starts_with(&earlier.bytes));
    }

    #[test]
    fn test_refs_required() {
        let xml = doc().replace(r#"<x:CompleteCertificateRefs Id="CC"/>"#, "");
        let tree = xades_xml::parse(&xml).unwrap();
        let ctx = DsigContext::new();
        let builder = CanonicalReferenceBuilder::new(&ctx, &tree);
        assert!(matches!(
            covered(&builder, tree.root_element(), StampKind::RefsOnly, None),
            Err(Error::MissingRequiredElement(_))
        ));
    }

    #[test]
    fn test_stamp_reading() {
        let xml = doc();
        let tree = xades_xml::parse(&xml).unwrap();
        let ts = layout::first_unsigned(tree.root_element(), ns::node::SIGNATURE_TIME_STAMP).unwrap();
        assert_eq!(StampKind::of(ts), Some(StampKind::Signature));
        assert_eq!(hash_data_uris(ts), ["#SV"]);
        assert_eq!(encapsulated_token(ts).unwrap(), [1, 2, 3]);
    }
}
