#![forbid(unsafe_code)]

//! Validation of a XAdES signature as a graph of references.
//!
//! Each check is named, so callers can pick a subset and learn which one
//! failed. Checks run in declaration order.

use crate::coverage::{self, StampKind};
use crate::layout;
use crate::params::SignatureForm;
use crate::revocation::key_info_certificates;
use crate::tsp::TimeStampToken;
use crate::upgrade::{certificate_refs, detect_form, embedded_values, revocation_refs, DigestRef};
use roxmltree::{Document, Node};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::BitOr;
use tracing::{debug, warn};
use xades_core::{algorithm, ns, Error};
use xades_crypto::AlgorithmRegistry;
use xades_dsig::{verify_signature, CanonicalReferenceBuilder, DigestEngine, DsigContext};
use xades_xml::document::{find_child_element, find_child_elements, find_path, is_element, text_content};

/// A named validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Check {
    /// Reference digests and the signature value.
    XmldsigCore,
    /// `SigningCertificate` names the certificate in `ds:KeyInfo`.
    SameCertificate,
    /// `QualifyingProperties` targets this signature and its signed
    /// properties are signed.
    QualifyingProperties,
    /// Object references of commitments and formats name own references.
    CommitmentObjectReferences,
    AllDataObjectsTimeStamp,
    IndividualDataObjectsTimeStamp,
    SignerRole,
    SignatureTimeStamp,
    SigAndRefsTimeStamp,
    RefsOnlyTimeStamp,
    ArchiveTimeStamp,
    /// Every unsigned time-stamp stamps what it covers.
    TimeStampImprint,
    /// C needs T, X needs C, XL needs X.
    FormImplications,
    CertificateValuesMatchRefs,
    RevocationValuesMatchRefs,
    /// Each counter-signature covers the signature value of an enclosing
    /// signature.
    CounterSignatureChain,
    /// Each counter-signature validates on its own.
    CounterSignatures,
}

impl Check {
    pub const ALL: [Check; 17] = [
        Check::XmldsigCore,
        Check::SameCertificate,
        Check::QualifyingProperties,
        Check::CommitmentObjectReferences,
        Check::AllDataObjectsTimeStamp,
        Check::IndividualDataObjectsTimeStamp,
        Check::SignerRole,
        Check::SignatureTimeStamp,
        Check::SigAndRefsTimeStamp,
        Check::RefsOnlyTimeStamp,
        Check::ArchiveTimeStamp,
        Check::TimeStampImprint,
        Check::FormImplications,
        Check::CertificateValuesMatchRefs,
        Check::RevocationValuesMatchRefs,
        Check::CounterSignatureChain,
        Check::CounterSignatures,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Check::XmldsigCore => "XmldsigCore",
            Check::SameCertificate => "SameCertificate",
            Check::QualifyingProperties => "QualifyingProperties",
            Check::CommitmentObjectReferences => "CommitmentObjectReferences",
            Check::AllDataObjectsTimeStamp => "AllDataObjectsTimeStamp",
            Check::IndividualDataObjectsTimeStamp => "IndividualDataObjectsTimeStamp",
            Check::SignerRole => "SignerRole",
            Check::SignatureTimeStamp => "SignatureTimeStamp",
            Check::SigAndRefsTimeStamp => "SigAndRefsTimeStamp",
            Check::RefsOnlyTimeStamp => "RefsOnlyTimeStamp",
            Check::ArchiveTimeStamp => "ArchiveTimeStamp",
            Check::TimeStampImprint => "TimeStampImprint",
            Check::FormImplications => "FormImplications",
            Check::CertificateValuesMatchRefs => "CertificateValuesMatchRefs",
            Check::RevocationValuesMatchRefs => "RevocationValuesMatchRefs",
            Check::CounterSignatureChain => "CounterSignatureChain",
            Check::CounterSignatures => "CounterSignatures",
        }
    }

    fn bit(&self) -> u32 {
        1 << (*self as u32)
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckSet(u32);

impl CheckSet {
    pub const EMPTY: CheckSet = CheckSet(0);
    pub const ALL: CheckSet = CheckSet((1 << Check::ALL.len()) - 1);

    pub fn contains(&self, check: Check) -> bool {
        self.0 & check.bit() != 0
    }

    pub fn without(self, check: Check) -> Self {
        CheckSet(self.0 & !check.bit())
    }

    /// The checks of the set, in run order.
    pub fn iter(&self) -> impl Iterator<Item = Check> + '_ {
        Check::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

impl From<Check> for CheckSet {
    fn from(check: Check) -> Self {
        CheckSet(check.bit())
    }
}

impl BitOr for CheckSet {
    type Output = CheckSet;
    fn bitor(self, rhs: CheckSet) -> CheckSet {
        CheckSet(self.0 | rhs.0)
    }
}

impl BitOr<Check> for CheckSet {
    type Output = CheckSet;
    fn bitor(self, rhs: Check) -> CheckSet {
        self | CheckSet::from(rhs)
    }
}

impl BitOr for Check {
    type Output = CheckSet;
    fn bitor(self, rhs: Check) -> CheckSet {
        CheckSet::from(self) | rhs
    }
}

/// Whether validation stops at the first failing check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    #[default]
    FailFast,
    Aggregate,
}

#[derive(Debug)]
pub struct CheckFailure {
    pub check: Check,
    pub error: Error,
}

/// Outcome of a validation run.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub passed: Vec<Check>,
    pub failures: Vec<CheckFailure>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    /// The first failure as an `Error::Check`.
    pub fn into_result(self) -> Result<(), Error> {
        match self.failures.into_iter().next() {
            None => Ok(()),
            Some(failure) => Err(Error::Check {
                check: failure.check.name(),
                source: Box::new(failure.error),
            }),
        }
    }
}

/// Runs checks against one signature of a parsed document.
pub struct ReferenceGraphResolver<'a, 'input> {
    ctx: &'a DsigContext,
    tree: &'a Document<'input>,
    builder: CanonicalReferenceBuilder<'a, 'input>,
    signature: Node<'a, 'input>,
}

impl<'a, 'input> ReferenceGraphResolver<'a, 'input> {
    /// A resolver for the signature with Id `signature_id`.
    pub fn new(ctx: &'a DsigContext, tree: &'a Document<'input>, signature_id: &str) -> Result<Self, Error> {
        let builder = CanonicalReferenceBuilder::new(ctx, tree);
        let signature = builder.element_by_id(signature_id)?;
        if !is_element(signature, ns::DSIG, ns::node::SIGNATURE) {
            return Err(Error::MissingRequiredElement(format!("ds:Signature with Id {signature_id}")));
        }
        Ok(Self {
            ctx,
            tree,
            builder,
            signature,
        })
    }

    fn for_node(&self, signature: Node<'a, 'input>) -> Self {
        Self {
            ctx: self.ctx,
            tree: self.tree,
            builder: CanonicalReferenceBuilder::new(self.ctx, self.tree),
            signature,
        }
    }

    pub fn validate(&self, checks: CheckSet, mode: ValidationMode) -> Result<ValidationReport, Error> {
        let id = self.signature.attribute(ns::attr::ID).unwrap_or_default();
        let mut report = ValidationReport::default();
        for check in checks.iter() {
            match self.run(check) {
                Ok(()) => {
                    debug!(signature = id, check = check.name(), "check passed");
                    report.passed.push(check);
                }
                Err(error) => {
                    warn!(signature = id, check = check.name(), %error, "check failed");
                    if mode == ValidationMode::FailFast {
                        return Err(Error::Check {
                            check: check.name(),
                            source: Box::new(error),
                        });
                    }
                    report.failures.push(CheckFailure { check, error });
                }
            }
        }
        Ok(report)
    }

    pub fn run(&self, check: Check) -> Result<(), Error> {
        match check {
            Check::XmldsigCore => verify_signature(self.tree, self.ctx, self.signature, None)?.into_result(),
            Check::SameCertificate => self.same_certificate(),
            Check::QualifyingProperties => self.qualifying_properties(),
            Check::CommitmentObjectReferences => self.object_references(),
            Check::AllDataObjectsTimeStamp => self.all_data_objects_stamps(),
            Check::IndividualDataObjectsTimeStamp => self.individual_data_objects_stamps(),
            Check::SignerRole => self.signer_role(),
            Check::SignatureTimeStamp => self.hash_data_info(StampKind::Signature),
            Check::SigAndRefsTimeStamp => self.hash_data_info(StampKind::SigAndRefs),
            Check::RefsOnlyTimeStamp => self.hash_data_info(StampKind::RefsOnly),
            Check::ArchiveTimeStamp => self.hash_data_info(StampKind::Archive),
            Check::TimeStampImprint => self.stamp_imprints(),
            Check::FormImplications => self.form_implications(),
            Check::CertificateValuesMatchRefs => self.certificate_values(),
            Check::RevocationValuesMatchRefs => self.revocation_values(),
            Check::CounterSignatureChain => self.counter_signature_chain(self.signature, &mut Vec::new()),
            Check::CounterSignatures => self.counter_signatures(),
        }
    }

    fn signed_signature_property(&self, local: &str) -> Result<Option<Node<'a, 'input>>, Error> {
        Ok(find_path(
            layout::signed_properties(self.signature)?,
            &[(ns::XADES, ns::node::SIGNED_SIGNATURE_PROPERTIES), (ns::XADES, local)],
        ))
    }

    fn data_object_properties(&self, local: &str) -> Result<Vec<Node<'a, 'input>>, Error> {
        Ok(
            find_child_element(layout::signed_properties(self.signature)?, ns::XADES, ns::node::SIGNED_DATA_OBJECT_PROPERTIES)
                .map(|props| find_child_elements(props, ns::XADES, local))
                .unwrap_or_default(),
        )
    }

    fn same_certificate(&self) -> Result<(), Error> {
        let (leaf, _) = key_info_certificates(self.signature)?;
        let signing = self
            .signed_signature_property(ns::node::SIGNING_CERTIFICATE)?
            .ok_or_else(|| Error::MissingRequiredElement("xades:SigningCertificate".into()))?;
        for cert in find_child_elements(signing, ns::XADES, ns::node::CERT) {
            let digest = find_child_element(cert, ns::XADES, ns::node::CERT_DIGEST)
                .ok_or_else(|| Error::MissingRequiredElement("xades:CertDigest".into()))?;
            let serial = find_path(
                cert,
                &[(ns::XADES, ns::node::ISSUER_SERIAL), (ns::DSIG, ns::node::X509_SERIAL_NUMBER)],
            )
            .map(text_content);
            let digest_matches = DigestRef::read(digest, None)?
                .find(&[leaf.der().to_vec()])?
                .is_some();
            if digest_matches && serial.as_deref().map(str::trim) == Some(leaf.serial_decimal().as_str()) {
                return Ok(());
            }
        }
        Err(Error::SignatureVerificationFailed(format!(
            "SigningCertificate does not name {}",
            leaf.subject_name()
        )))
    }

    fn qualifying_properties(&self) -> Result<(), Error> {
        let id = self.signature.attribute(ns::attr::ID).unwrap_or_default();
        let qp = layout::qualifying_properties(self.signature)?;
        let target = qp.attribute(ns::attr::TARGET).unwrap_or_default();
        if target != format!("#{id}") {
            return Err(Error::SchemaValidation(format!(
                "QualifyingProperties targets {target:?}, not #{id}"
            )));
        }
        if layout::own(self.signature, ns::XADES, ns::node::QUALIFYING_PROPERTIES).len() > 1 {
            return Err(Error::SchemaValidation("more than one QualifyingProperties".into()));
        }
        let props = layout::signed_properties(self.signature)?;
        let props_uri = props.attribute(ns::attr::ID).map(|i| format!("#{i}"));
        let signed = layout::references(self.signature)?.into_iter().any(|r| {
            r.attribute(ns::attr::TYPE) == Some(algorithm::SIGNED_PROPERTIES_TYPE)
                && r.attribute(ns::attr::URI).map(str::to_owned) == props_uri
        });
        if !signed {
            return Err(Error::SchemaValidation("SignedProperties are not referenced from SignedInfo".into()));
        }
        Ok(())
    }

    fn object_references(&self) -> Result<(), Error> {
        let own: Vec<String> = layout::references(self.signature)?
            .into_iter()
            .filter_map(|r| r.attribute(ns::attr::ID).map(|id| format!("#{id}")))
            .collect();
        let mut named: Vec<String> = self
            .data_object_properties(ns::node::DATA_OBJECT_FORMAT)?
            .into_iter()
            .filter_map(|f| f.attribute(ns::attr::OBJECT_REFERENCE).map(str::to_owned))
            .collect();
        for indication in self.data_object_properties(ns::node::COMMITMENT_TYPE_INDICATION)? {
            named.extend(
                find_child_elements(indication, ns::XADES, ns::node::OBJECT_REFERENCE)
                    .into_iter()
                    .map(|r| text_content(r).trim().to_owned()),
            );
        }
        match named.into_iter().find(|r| !own.contains(r)) {
            Some(missing) => Err(Error::ReferenceTargetNotFound(format!(
                "object reference {missing} names no reference of this signature"
            ))),
            None => Ok(()),
        }
    }

    fn all_data_objects_stamps(&self) -> Result<(), Error> {
        let stamps = self.data_object_properties(ns::node::ALL_DATA_OBJECTS_TIME_STAMP)?;
        if stamps.is_empty() {
            return Ok(());
        }
        let mut data = Vec::new();
        for reference in layout::references(self.signature)? {
            if reference.attribute(ns::attr::TYPE) != Some(algorithm::SIGNED_PROPERTIES_TYPE) {
                data.extend(self.builder.resolve(reference, self.signature)?);
            }
        }
        for stamp in stamps {
            check_token(&coverage::encapsulated_token(stamp)?, &data)?;
        }
        Ok(())
    }

    fn individual_data_objects_stamps(&self) -> Result<(), Error> {
        let references = layout::references(self.signature)?;
        for stamp in self.data_object_properties(ns::node::INDIVIDUAL_DATA_OBJECTS_TIME_STAMP)? {
            let mut data = Vec::new();
            for include in find_child_elements(stamp, ns::XADES, ns::node::INCLUDE) {
                let uri = include.attribute(ns::attr::URI).unwrap_or_default();
                let reference = references
                    .iter()
                    .find(|r| r.attribute(ns::attr::ID).map(|id| format!("#{id}")).as_deref() == Some(uri))
                    .ok_or_else(|| Error::ReferenceTargetNotFound(format!("time-stamp includes {uri:?}")))?;
                data.extend(self.builder.resolve(*reference, self.signature)?);
            }
            check_token(&coverage::encapsulated_token(stamp)?, &data)?;
        }
        Ok(())
    }

    fn signer_role(&self) -> Result<(), Error> {
        let Some(role) = self.signed_signature_property(ns::node::SIGNER_ROLE)? else {
            return Ok(());
        };
        let roles = [
            (ns::node::CLAIMED_ROLES, ns::node::CLAIMED_ROLE),
            (ns::node::CERTIFIED_ROLES, ns::node::CERTIFIED_ROLE),
        ]
        .into_iter()
        .filter_map(|(outer, inner)| find_child_element(role, ns::XADES, outer).map(|o| (o, inner)))
        .flat_map(|(outer, inner)| find_child_elements(outer, ns::XADES, inner))
        .filter(|r| !text_content(*r).trim().is_empty() || r.has_children())
        .count();
        if roles == 0 {
            return Err(Error::SchemaValidation("SignerRole without any role".into()));
        }
        Ok(())
    }

    fn stamps(&self, kind: StampKind) -> Vec<Node<'a, 'input>> {
        layout::unsigned(self.signature, kind.element())
    }

    /// A stamp lists exactly what its kind covered when it was taken.
    fn hash_data_info(&self, kind: StampKind) -> Result<(), Error> {
        for stamp in self.stamps(kind) {
            let expected = coverage::covered(&self.builder, self.signature, kind, Some(stamp))?;
            let listed = coverage::hash_data_uris(stamp);
            if listed != expected.uris {
                return Err(Error::IncompleteEvidenceChain(format!(
                    "{} lists {listed:?}, expected {:?}",
                    kind.element(),
                    expected.uris
                )));
            }
        }
        Ok(())
    }

    fn stamp_imprints(&self) -> Result<(), Error> {
        for kind in StampKind::ALL {
            for stamp in self.stamps(kind) {
                let covered = coverage::covered(&self.builder, self.signature, kind, Some(stamp))?;
                check_token(&coverage::encapsulated_token(stamp)?, &covered.bytes)?;
            }
        }
        Ok(())
    }

    fn form_implications(&self) -> Result<(), Error> {
        let has = |local: &str| layout::first_unsigned(self.signature, local).is_some();
        let rules = [
            (has(ns::node::COMPLETE_CERTIFICATE_REFS), has(ns::node::SIGNATURE_TIME_STAMP), "XAdES-C without a SignatureTimeStamp"),
            (has(ns::node::COMPLETE_CERTIFICATE_REFS), has(ns::node::COMPLETE_REVOCATION_REFS), "CompleteCertificateRefs without CompleteRevocationRefs"),
            (
                has(ns::node::SIG_AND_REFS_TIME_STAMP) || has(ns::node::REFS_ONLY_TIME_STAMP),
                has(ns::node::COMPLETE_CERTIFICATE_REFS),
                "XAdES-X without complete references",
            ),
            (
                has(ns::node::CERTIFICATE_VALUES) || has(ns::node::REVOCATION_VALUES),
                has(ns::node::SIG_AND_REFS_TIME_STAMP) || has(ns::node::REFS_ONLY_TIME_STAMP),
                "XAdES-XL without a XAdES-X time-stamp",
            ),
            (
                has(ns::node::ARCHIVE_TIME_STAMP),
                detect_form_below_archive(self.signature) >= SignatureForm::XL,
                "XAdES-A without XAdES-XL values",
            ),
        ];
        match rules.into_iter().find(|(present, implied, _)| *present && !*implied) {
            Some((_, _, reason)) => Err(Error::IncompleteEvidenceChain(reason.into())),
            None => Ok(()),
        }
    }

    fn certificate_values(&self) -> Result<(), Error> {
        if layout::first_unsigned(self.signature, ns::node::CERTIFICATE_VALUES).is_none() {
            return Ok(());
        }
        let values = embedded_values(self.signature)?;
        match_refs(&certificate_refs(self.signature)?, &values.certificates, "certificate")
    }

    fn revocation_values(&self) -> Result<(), Error> {
        if layout::first_unsigned(self.signature, ns::node::REVOCATION_VALUES).is_none() {
            return Ok(());
        }
        let values = embedded_values(self.signature)?;
        let (crl_refs, ocsp_refs) = revocation_refs(self.signature)?;
        match_refs(&crl_refs, &values.crls, "CRL")?;
        match_refs(&ocsp_refs, &values.ocsp, "OCSP response")
    }

    /// `ancestors` holds the signature value Ids of the enclosing
    /// signatures, kept sorted.
    fn counter_signature_chain(&self, signature: Node<'a, 'input>, ancestors: &mut Vec<String>) -> Result<(), Error> {
        let value_id = layout::signature_value_id(signature)?.to_owned();
        let at = ancestors.binary_search(&value_id).unwrap_or_else(|i| i);
        ancestors.insert(at, value_id.clone());
        for counter in layout::counter_signatures(signature) {
            let covers_ancestor = layout::references(counter)?.into_iter().any(|r| {
                r.attribute(ns::attr::TYPE) == Some(algorithm::COUNTERSIGNED_SIGNATURE_TYPE)
                    && r.attribute(ns::attr::URI)
                        .and_then(|uri| uri.strip_prefix('#'))
                        .is_some_and(|id| ancestors.binary_search_by(|a| a.as_str().cmp(id)).is_ok())
            });
            if !covers_ancestor {
                return Err(Error::ReferenceTargetNotFound(format!(
                    "counter-signature {} references no enclosing signature value",
                    counter.attribute(ns::attr::ID).unwrap_or_default()
                )));
            }
            self.counter_signature_chain(counter, ancestors)?;
        }
        if let Ok(i) = ancestors.binary_search(&value_id) {
            ancestors.remove(i);
        }
        Ok(())
    }

    /// The chain itself is left to `CounterSignatureChain`, which walks
    /// every level from this signature down with the enclosing values known.
    fn counter_signatures(&self) -> Result<(), Error> {
        let checks = CheckSet::ALL.without(Check::CounterSignatureChain);
        for counter in layout::counter_signatures(self.signature) {
            self.for_node(counter).validate(checks, ValidationMode::FailFast)?;
        }
        Ok(())
    }
}

/// Form carried apart from archive time-stamps.
fn detect_form_below_archive(signature: Node<'_, '_>) -> SignatureForm {
    let has = |local: &str| layout::first_unsigned(signature, local).is_some();
    if has(ns::node::CERTIFICATE_VALUES) && has(ns::node::REVOCATION_VALUES) {
        SignatureForm::XL
    } else {
        detect_form(signature).min(SignatureForm::X)
    }
}

/// References and `values` pair up: every reference digests to an
/// embedded value and every embedded value is referenced.
fn match_refs(refs: &[DigestRef], values: &[Vec<u8>], what: &str) -> Result<(), Error> {
    let mut referenced: BTreeSet<&[u8]> = BTreeSet::new();
    for r in refs {
        let value = r.find(values)?.ok_or_else(|| {
            Error::IncompleteEvidenceChain(format!(
                "no embedded {what} matches the reference to {}",
                r.value_id.as_deref().unwrap_or("an unnamed value")
            ))
        })?;
        referenced.insert(value.as_slice());
    }
    let embedded: BTreeSet<&[u8]> = values.iter().map(Vec::as_slice).collect();
    match embedded.difference(&referenced).count() {
        0 => Ok(()),
        n => Err(Error::IncompleteEvidenceChain(format!("{n} embedded {what} value(s) without a reference"))),
    }
}

/// The token's imprint is the digest of `data` under the token's own
/// hash algorithm.
fn check_token(token: &[u8], data: &[u8]) -> Result<(), Error> {
    let token = TimeStampToken::from_der(token)?;
    let oid = token.imprint_oid();
    let uri = AlgorithmRegistry::digest_uri_for_oid(&oid)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("time-stamp digest {oid}")))?;
    if DigestEngine::digest_with(&uri, data)? != token.imprint() {
        return Err(Error::SignatureVerificationFailed(
            "time-stamp imprint does not match the covered data".into(),
        ));
    }
    Ok(())
}
