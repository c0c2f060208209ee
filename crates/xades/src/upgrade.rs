#![forbid(unsafe_code)]

//! Upgrading a signature along BES → T → C → X → XL → A.
//!
//! Stages run in order on a copy of the document. Missing prerequisites
//! of the requested form are performed first and reported; the caller's
//! document only changes once every stage succeeded.

use crate::clients::{OcspResponse, ResponderId};
use crate::coverage::{self, StampKind};
use crate::ids::uuid;
use crate::layout;
use crate::model::{write_digest, CertId};
use crate::params::{SignatureForm, UpgradeParameters, XVariant};
use crate::revocation::{key_info_certificates, Evidence, RevocationCollector};
use crate::tsp::TimeStampToken;
use roxmltree::Node;
use tracing::{debug, info, warn};
use xades_core::{algorithm, ns, Error};
use xades_crypto::AlgorithmRegistry;
use xades_dsig::engine::{decode_base64, encode_base64};
use xades_dsig::{CanonicalReferenceBuilder, DigestEngine, DsigContext, PrefixContext};
use xades_keys::{Crl, X509Cert};
use xades_xml::document::{find_child_element, find_child_elements, text_content};
use xades_xml::{XmlDocument, XmlWriter};

/// Outcome of an upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    pub from: SignatureForm,
    pub to: SignatureForm,
    /// Stages performed that the caller did not ask for.
    pub auto_upgraded: Vec<SignatureForm>,
}

/// The highest form whose property `signature` carries.
pub fn detect_form(signature: Node<'_, '_>) -> SignatureForm {
    let has = |local: &str| layout::first_unsigned(signature, local).is_some();
    if has(ns::node::ARCHIVE_TIME_STAMP) {
        SignatureForm::A
    } else if has(ns::node::CERTIFICATE_VALUES) && has(ns::node::REVOCATION_VALUES) {
        SignatureForm::XL
    } else if has(ns::node::SIG_AND_REFS_TIME_STAMP) || has(ns::node::REFS_ONLY_TIME_STAMP) {
        SignatureForm::X
    } else if has(ns::node::COMPLETE_CERTIFICATE_REFS) {
        SignatureForm::C
    } else if has(ns::node::SIGNATURE_TIME_STAMP) {
        SignatureForm::T
    } else {
        SignatureForm::Basic
    }
}

/// Evidence gathered by earlier stages of the same upgrade.
#[derive(Default)]
struct Carry {
    evidence: Option<Evidence>,
}

/// Drives one signature through the upgrade stages.
pub struct UpgradeStateMachine<'a> {
    ctx: &'a DsigContext,
    params: &'a UpgradeParameters,
}

impl<'a> UpgradeStateMachine<'a> {
    pub fn new(ctx: &'a DsigContext, params: &'a UpgradeParameters) -> Self {
        Self { ctx, params }
    }

    /// Upgrade the signature `signature_id` of `document` to `to`.
    pub fn upgrade(
        &self,
        document: &mut XmlDocument,
        signature_id: &str,
        to: SignatureForm,
    ) -> Result<UpgradeReport, Error> {
        let mut work = document.clone();
        let from = {
            let tree = work.parse_doc()?;
            detect_form(self.signature(&tree, signature_id)?)
        };

        let stages: Vec<SignatureForm> = if to == SignatureForm::A && from == SignatureForm::A {
            vec![SignatureForm::A]
        } else if from >= to {
            return Err(Error::AlreadyUpgraded(format!(
                "{signature_id} is already {from}, {to} requested"
            )));
        } else {
            [
                SignatureForm::T,
                SignatureForm::C,
                SignatureForm::X,
                SignatureForm::XL,
                SignatureForm::A,
            ]
            .into_iter()
            .filter(|stage| *stage > from && *stage <= to)
            .collect()
        };
        let auto_upgraded = stages[..stages.len() - 1].to_vec();
        if !auto_upgraded.is_empty() {
            warn!(
                signature_id,
                requested = %to,
                performed = ?auto_upgraded,
                "performing missing prerequisite upgrades"
            );
        }

        let mut carry = Carry::default();
        for stage in &stages {
            self.run(&mut work, signature_id, *stage, &mut carry)?;
            info!(signature_id, stage = %stage, "upgrade stage complete");
        }

        *document = work;
        Ok(UpgradeReport {
            from,
            to,
            auto_upgraded,
        })
    }

    fn signature<'t, 'input>(
        &self,
        tree: &'t roxmltree::Document<'input>,
        signature_id: &str,
    ) -> Result<Node<'t, 'input>, Error>
    where
        'a: 't,
    {
        let builder = CanonicalReferenceBuilder::new(self.ctx, tree);
        let node = builder.element_by_id(signature_id)?;
        if node.has_tag_name((ns::DSIG, ns::node::SIGNATURE)) {
            Ok(node)
        } else {
            Err(Error::MissingRequiredElement(format!("ds:Signature with Id {signature_id}")))
        }
    }

    fn run(&self, work: &mut XmlDocument, signature_id: &str, stage: SignatureForm, carry: &mut Carry) -> Result<(), Error> {
        match stage {
            SignatureForm::Basic => Ok(()),
            SignatureForm::T => self.add_stamp(
                work,
                signature_id,
                StampKind::Signature,
                format!("SignatureTimeStamp-{signature_id}"),
            ),
            SignatureForm::C => self.add_complete_refs(work, signature_id, carry),
            SignatureForm::X => match self.params.x_variant {
                XVariant::SigAndRefs => self.add_stamp(
                    work,
                    signature_id,
                    StampKind::SigAndRefs,
                    format!("SigAndRefsStamp-{signature_id}"),
                ),
                XVariant::RefsOnly => self.add_stamp(
                    work,
                    signature_id,
                    StampKind::RefsOnly,
                    format!("RefsOnlyStamp-{signature_id}"),
                ),
            },
            SignatureForm::XL => self.add_values(work, signature_id, carry),
            SignatureForm::A => {
                let n = {
                    let tree = work.parse_doc()?;
                    layout::unsigned(self.signature(&tree, signature_id)?, ns::node::ARCHIVE_TIME_STAMP).len() + 1
                };
                self.add_stamp(work, signature_id, StampKind::Archive, format!("ArchiveStamp-{n}-{signature_id}"))
            }
        }
    }

    /// Request a token over what `kind` covers and append the stamp.
    fn add_stamp(&self, work: &mut XmlDocument, signature_id: &str, kind: StampKind, id: String) -> Result<(), Error> {
        let splice = {
            let tree = work.parse_doc()?;
            let builder = CanonicalReferenceBuilder::new(self.ctx, &tree);
            let signature = self.signature(&tree, signature_id)?;
            let covered = coverage::covered(&builder, signature, kind, None)?;

            let method = &self.params.digest_method;
            let oid = AlgorithmRegistry::digest_oid(method)?;
            let digest = DigestEngine::digest_with(method, &covered.bytes)?;
            let der = self.params.tsa.get_timestamp(&digest, &oid, true)?;
            let token = TimeStampToken::from_der(&der)?;
            token.check_imprint(&digest, &oid)?;
            debug!(signature_id, kind = kind.element(), gen_time = %token.gen_time(), "time-stamp received");

            let p = layout::document_prefixes(signature)?;
            let fragment = write_stamp(&p, kind, &id, &covered.uris, &der);
            layout::append_unsigned(tree.input_text(), signature, &fragment)?
        };
        work.apply(vec![splice])
    }

    fn add_complete_refs(&self, work: &mut XmlDocument, signature_id: &str, carry: &mut Carry) -> Result<(), Error> {
        let (splice, evidence) = {
            let tree = work.parse_doc()?;
            let signature = self.signature(&tree, signature_id)?;
            let evidence = self.collect(signature)?;
            let p = layout::document_prefixes(signature)?;
            let fragment = self.write_refs(&p, &evidence)?;
            (layout::append_unsigned(tree.input_text(), signature, &fragment)?, evidence)
        };
        work.apply(vec![splice])?;
        carry.evidence = Some(evidence);
        Ok(())
    }

    /// Evidence for the signing chain and for the TSAs behind the
    /// signature time-stamps.
    fn collect(&self, signature: Node<'_, '_>) -> Result<Evidence, Error> {
        let (leaf, mut known) = key_info_certificates(signature)?;
        let mut stamp_signers = Vec::new();
        for token in signature_stamp_tokens(signature)? {
            for der in token.certificates() {
                known.push(X509Cert::from_der(der)?);
            }
            if let Some(der) = token.signer_certificate() {
                stamp_signers.push(X509Cert::from_der(der)?);
            }
        }
        RevocationCollector::new(self.params, known)?.collect(&leaf, &stamp_signers)
    }

    fn write_refs(&self, p: &PrefixContext, evidence: &Evidence) -> Result<String, Error> {
        let method = &self.params.digest_method;
        let mut w = XmlWriter::new();

        let complete_certs = p.xades(ns::node::COMPLETE_CERTIFICATE_REFS);
        let cert_refs = p.xades(ns::node::CERT_REFS);
        w.start_element(&complete_certs, &[(ns::attr::ID, &format!("CompleteCertificates-{}", uuid()))]);
        w.start_element(&cert_refs, &[]);
        for cert in &evidence.certificates {
            CertId::of(cert, method)?
                .with_uri(format!("#Cert{}", uuid()))
                .write(&mut w, p);
        }
        w.end_element(&cert_refs);
        w.end_element(&complete_certs);

        let complete_rev = p.xades(ns::node::COMPLETE_REVOCATION_REFS);
        w.start_element(&complete_rev, &[(ns::attr::ID, &format!("CompleteRev-{}", uuid()))]);
        if !evidence.crls.is_empty() {
            let crl_refs = p.xades(ns::node::CRL_REFS);
            w.start_element(&crl_refs, &[]);
            for crl in &evidence.crls {
                write_crl_ref(&mut w, p, method, crl)?;
            }
            w.end_element(&crl_refs);
        }
        if !evidence.ocsp.is_empty() {
            let ocsp_refs = p.xades(ns::node::OCSP_REFS);
            w.start_element(&ocsp_refs, &[]);
            for response in &evidence.ocsp {
                write_ocsp_ref(&mut w, p, method, response)?;
            }
            w.end_element(&ocsp_refs);
        }
        w.end_element(&complete_rev);
        Ok(w.into_string())
    }

    fn add_values(&self, work: &mut XmlDocument, signature_id: &str, carry: &mut Carry) -> Result<(), Error> {
        let splice = {
            let tree = work.parse_doc()?;
            let signature = self.signature(&tree, signature_id)?;
            let evidence = match carry.evidence.take() {
                Some(evidence) => evidence,
                None => {
                    debug!(signature_id, "collecting evidence again for the stored references");
                    self.collect(signature)?
                }
            };
            let p = layout::document_prefixes(signature)?;
            let fragment = write_values(&p, signature, &evidence)?;
            layout::append_unsigned(tree.input_text(), signature, &fragment)?
        };
        work.apply(vec![splice])
    }
}

fn write_stamp(p: &PrefixContext, kind: StampKind, id: &str, uris: &[String], token: &[u8]) -> String {
    let mut w = XmlWriter::new();
    let stamp = p.xades(kind.element());
    w.start_element(&stamp, &[(ns::attr::ID, id)]);
    for uri in uris {
        w.empty_element(&p.xades(ns::node::HASH_DATA_INFO), &[(ns::attr::HASH_DATA_URI, uri)]);
    }
    let c14n = p.dsig(ns::node::CANONICALIZATION_METHOD);
    w.start_element(&c14n, &[(ns::attr::ALGORITHM, algorithm::C14N)]);
    w.end_element(&c14n);
    let token_id = format!("{}-{}", kind.token_prefix(), uuid());
    w.text_element(
        &p.xades(ns::node::ENCAPSULATED_TIME_STAMP),
        &[(ns::attr::ID, &token_id)],
        &encode_base64(token),
    );
    w.end_element(&stamp);
    w.into_string()
}

fn write_crl_ref(w: &mut XmlWriter, p: &PrefixContext, method: &str, crl: &Crl) -> Result<(), Error> {
    let crl_ref = p.xades(ns::node::CRL_REF);
    let identifier = p.xades(ns::node::CRL_IDENTIFIER);
    w.start_element(&crl_ref, &[]);
    write_digest(
        w,
        p,
        &p.xades(ns::node::DIGEST_ALG_AND_VALUE),
        method,
        &DigestEngine::digest_with(method, crl.der())?,
    );
    w.start_element(&identifier, &[(ns::attr::URI, &format!("#CRLValue-{}", uuid()))]);
    w.text_element(&p.xades(ns::node::ISSUER), &[], &crl.issuer_name());
    w.text_element(&p.xades(ns::node::ISSUE_TIME), &[], &crl.this_update().to_string());
    if let Some(number) = crl.number() {
        w.text_element(&p.xades(ns::node::NUMBER), &[], &number);
    }
    w.end_element(&identifier);
    w.end_element(&crl_ref);
    Ok(())
}

fn write_ocsp_ref(w: &mut XmlWriter, p: &PrefixContext, method: &str, response: &OcspResponse) -> Result<(), Error> {
    let ocsp_ref = p.xades(ns::node::OCSP_REF);
    let identifier = p.xades(ns::node::OCSP_IDENTIFIER);
    let responder = p.xades(ns::node::RESPONDER_ID);
    w.start_element(&ocsp_ref, &[]);
    w.start_element(&identifier, &[(ns::attr::URI, &format!("#OcspValue{}", uuid()))]);
    w.start_element(&responder, &[]);
    match &response.responder_id {
        ResponderId::ByName(name) => w.text_element(&p.xades(ns::node::BY_NAME), &[], name),
        ResponderId::ByKey(hash) => w.text_element(&p.xades(ns::node::BY_KEY), &[], &encode_base64(hash)),
    }
    w.end_element(&responder);
    w.text_element(&p.xades(ns::node::PRODUCED_AT), &[], &response.produced_at.to_string());
    w.end_element(&identifier);
    write_digest(
        w,
        p,
        &p.xades(ns::node::DIGEST_ALG_AND_VALUE),
        method,
        &DigestEngine::digest_with(method, &response.encoded)?,
    );
    w.end_element(&ocsp_ref);
    Ok(())
}

/// A digest reference: the referenced value's Id and its digest.
pub(crate) struct DigestRef {
    pub value_id: Option<String>,
    pub method: String,
    pub digest: Vec<u8>,
}

impl DigestRef {
    /// `container` holds `ds:DigestMethod` and `ds:DigestValue`; `uri` is
    /// the attribute naming the value.
    pub fn read(container: Node<'_, '_>, uri: Option<&str>) -> Result<Self, Error> {
        let method = find_child_element(container, ns::DSIG, ns::node::DIGEST_METHOD)
            .and_then(|m| m.attribute(ns::attr::ALGORITHM))
            .ok_or_else(|| Error::MissingRequiredElement("ds:DigestMethod".into()))?;
        let value = find_child_element(container, ns::DSIG, ns::node::DIGEST_VALUE)
            .ok_or_else(|| Error::MissingRequiredElement("ds:DigestValue".into()))?;
        Ok(Self {
            value_id: uri.and_then(|u| u.strip_prefix('#')).map(str::to_owned),
            method: method.to_owned(),
            digest: decode_base64(&text_content(value))?,
        })
    }

    /// The first of `candidates` this reference digests to.
    pub fn find<'c>(&self, candidates: &'c [Vec<u8>]) -> Result<Option<&'c Vec<u8>>, Error> {
        for candidate in candidates {
            if DigestEngine::digest_with(&self.method, candidate)? == self.digest {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}

/// Certificate references of `CompleteCertificateRefs`.
pub(crate) fn certificate_refs(signature: Node<'_, '_>) -> Result<Vec<DigestRef>, Error> {
    let Some(refs) = layout::first_unsigned(signature, ns::node::COMPLETE_CERTIFICATE_REFS) else {
        return Ok(Vec::new());
    };
    find_child_element(refs, ns::XADES, ns::node::CERT_REFS)
        .into_iter()
        .flat_map(|c| find_child_elements(c, ns::XADES, ns::node::CERT))
        .map(|cert| {
            let digest = find_child_element(cert, ns::XADES, ns::node::CERT_DIGEST)
                .ok_or_else(|| Error::MissingRequiredElement("xades:CertDigest".into()))?;
            DigestRef::read(digest, cert.attribute(ns::attr::URI))
        })
        .collect()
}

/// CRL and OCSP references of `CompleteRevocationRefs`.
pub(crate) fn revocation_refs(signature: Node<'_, '_>) -> Result<(Vec<DigestRef>, Vec<DigestRef>), Error> {
    let Some(refs) = layout::first_unsigned(signature, ns::node::COMPLETE_REVOCATION_REFS) else {
        return Ok((Vec::new(), Vec::new()));
    };
    let read = |outer: &str, inner: &str, identifier: &str| -> Result<Vec<DigestRef>, Error> {
        find_child_element(refs, ns::XADES, outer)
            .into_iter()
            .flat_map(|c| find_child_elements(c, ns::XADES, inner))
            .map(|r| {
                let digest = find_child_element(r, ns::XADES, ns::node::DIGEST_ALG_AND_VALUE)
                    .ok_or_else(|| Error::MissingRequiredElement("xades:DigestAlgAndValue".into()))?;
                let uri = find_child_element(r, ns::XADES, identifier).and_then(|i| i.attribute(ns::attr::URI));
                DigestRef::read(digest, uri)
            })
            .collect()
    };
    Ok((
        read(ns::node::CRL_REFS, ns::node::CRL_REF, ns::node::CRL_IDENTIFIER)?,
        read(ns::node::OCSP_REFS, ns::node::OCSP_REF, ns::node::OCSP_IDENTIFIER)?,
    ))
}

/// Tokens of the signature's `SignatureTimeStamp`s.
fn signature_stamp_tokens(signature: Node<'_, '_>) -> Result<Vec<TimeStampToken>, Error> {
    layout::unsigned(signature, ns::node::SIGNATURE_TIME_STAMP)
        .into_iter()
        .map(|stamp| TimeStampToken::from_der(&coverage::encapsulated_token(stamp)?))
        .collect()
}

/// `CertificateValues` and `RevocationValues`, one value per stored
/// reference.
fn write_values(p: &PrefixContext, signature: Node<'_, '_>, evidence: &Evidence) -> Result<String, Error> {
    let cert_ders: Vec<Vec<u8>> = evidence.certificates.iter().map(|c| c.der().to_vec()).collect();
    let crl_ders: Vec<Vec<u8>> = evidence.crls.iter().map(|c| c.der().to_vec()).collect();
    let ocsp_ders: Vec<Vec<u8>> = evidence.ocsp.iter().map(|r| r.encoded.clone()).collect();

    let matched = |refs: Vec<DigestRef>, pool: &[Vec<u8>], what: &str| -> Result<Vec<(String, Vec<u8>)>, Error> {
        refs.iter()
            .map(|r| {
                let der = r
                    .find(pool)?
                    .ok_or_else(|| Error::IncompleteEvidenceChain(format!("no {what} matches a stored reference")))?;
                let id = r.value_id.clone().ok_or_else(|| {
                    Error::MissingRequiredElement(format!("URI on the {what} reference"))
                })?;
                Ok((id, der.clone()))
            })
            .collect()
    };
    let certs = matched(certificate_refs(signature)?, &cert_ders, "certificate")?;
    let (crl_refs, ocsp_refs) = revocation_refs(signature)?;
    let crls = matched(crl_refs, &crl_ders, "CRL")?;
    let ocsp = matched(ocsp_refs, &ocsp_ders, "OCSP response")?;

    let mut w = XmlWriter::new();
    let certificate_values = p.xades(ns::node::CERTIFICATE_VALUES);
    w.start_element(&certificate_values, &[(ns::attr::ID, &format!("CertificatesValues-{}", uuid()))]);
    for (id, der) in &certs {
        w.text_element(
            &p.xades(ns::node::ENCAPSULATED_X509_CERTIFICATE),
            &[(ns::attr::ID, id)],
            &encode_base64(der),
        );
    }
    w.end_element(&certificate_values);

    let revocation_values = p.xades(ns::node::REVOCATION_VALUES);
    w.start_element(&revocation_values, &[(ns::attr::ID, &format!("RevocationValues-{}", uuid()))]);
    for (container, element, values) in [
        (ns::node::CRL_VALUES, ns::node::ENCAPSULATED_CRL_VALUE, &crls),
        (ns::node::OCSP_VALUES, ns::node::ENCAPSULATED_OCSP_VALUE, &ocsp),
    ] {
        if values.is_empty() {
            continue;
        }
        let container = p.xades(container);
        w.start_element(&container, &[]);
        for (id, der) in values {
            w.text_element(&p.xades(element), &[(ns::attr::ID, id)], &encode_base64(der));
        }
        w.end_element(&container);
    }
    w.end_element(&revocation_values);
    Ok(w.into_string())
}

/// Values a signature embeds, as DER.
pub(crate) struct EmbeddedValues {
    pub certificates: Vec<Vec<u8>>,
    pub crls: Vec<Vec<u8>>,
    pub ocsp: Vec<Vec<u8>>,
}

pub(crate) fn embedded_values(signature: Node<'_, '_>) -> Result<EmbeddedValues, Error> {
    let revocation = layout::first_unsigned(signature, ns::node::REVOCATION_VALUES);
    let revocation_child =
        |local: &str| revocation.and_then(|r| find_child_element(r, ns::XADES, local));
    Ok(EmbeddedValues {
        certificates: decode_values(
            layout::first_unsigned(signature, ns::node::CERTIFICATE_VALUES),
            ns::node::ENCAPSULATED_X509_CERTIFICATE,
        )?,
        crls: decode_values(revocation_child(ns::node::CRL_VALUES), ns::node::ENCAPSULATED_CRL_VALUE)?,
        ocsp: decode_values(revocation_child(ns::node::OCSP_VALUES), ns::node::ENCAPSULATED_OCSP_VALUE)?,
    })
}

fn decode_values(container: Option<Node<'_, '_>>, local: &str) -> Result<Vec<Vec<u8>>, Error> {
    container
        .into_iter()
        .flat_map(|c| find_child_elements(c, ns::XADES, local))
        .map(|v| decode_base64(&text_content(v)))
        .collect()
}
