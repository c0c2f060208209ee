#![forbid(unsafe_code)]

//! Qualifying property values and their XML form.
//!
//! Every property is an immutable value assembled before serialization.
//! Absent optional values produce no markup at all.

use xades_core::{algorithm, ns::node, Error};
use xades_dsig::engine::encode_base64;
use xades_dsig::{DigestEngine, PrefixContext};
use xades_keys::X509Cert;
use xades_xml::XmlWriter;

/// Roles claimed by the signer or certified by an attribute authority.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerRole {
    pub claimed: Vec<String>,
    /// DER attribute certificates.
    pub certified: Vec<Vec<u8>>,
}

impl SignerRole {
    pub fn claimed(role: impl Into<String>) -> Self {
        Self {
            claimed: vec![role.into()],
            certified: Vec::new(),
        }
    }

    pub fn with_claimed(mut self, role: impl Into<String>) -> Self {
        self.claimed.push(role.into());
        self
    }

    pub fn with_certified(mut self, attribute_certificate: Vec<u8>) -> Self {
        self.certified.push(attribute_certificate);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty() && self.certified.is_empty()
    }

    fn write(&self, w: &mut XmlWriter, p: &PrefixContext) {
        let role = p.xades(node::SIGNER_ROLE);
        w.start_element(&role, &[]);
        if !self.claimed.is_empty() {
            let roles = p.xades(node::CLAIMED_ROLES);
            w.start_element(&roles, &[]);
            for claimed in &self.claimed {
                w.text_element(&p.xades(node::CLAIMED_ROLE), &[], claimed);
            }
            w.end_element(&roles);
        }
        if !self.certified.is_empty() {
            let roles = p.xades(node::CERTIFIED_ROLES);
            w.start_element(&roles, &[]);
            for cert in &self.certified {
                w.text_element(
                    &p.xades(node::CERTIFIED_ROLE),
                    &[("Encoding", algorithm::DER_ENCODING)],
                    &encode_base64(cert),
                );
            }
            w.end_element(&roles);
        }
        w.end_element(&role);
    }
}

/// Digest of a policy document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyHash {
    pub digest_method: String,
    pub value: Vec<u8>,
}

/// An explicit signature policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePolicy {
    pub identifier: String,
    pub description: Option<String>,
    pub hash: Option<PolicyHash>,
    pub spuri: Option<String>,
}

impl SignaturePolicy {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            description: None,
            hash: None,
            spuri: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Record a precomputed policy digest.
    pub fn with_hash(mut self, digest_method: impl Into<String>, value: Vec<u8>) -> Self {
        self.hash = Some(PolicyHash {
            digest_method: digest_method.into(),
            value,
        });
        self
    }

    /// Digest the policy document itself.
    pub fn with_document(self, digest_method: &str, document: &[u8]) -> Result<Self, Error> {
        let value = DigestEngine::digest_with(digest_method, document)?;
        Ok(self.with_hash(digest_method, value))
    }

    pub fn with_spuri(mut self, uri: impl Into<String>) -> Self {
        self.spuri = Some(uri.into());
        self
    }

    fn write(&self, w: &mut XmlWriter, p: &PrefixContext) {
        let identifier = p.xades(node::SIGNATURE_POLICY_IDENTIFIER);
        let policy_id = p.xades(node::SIGNATURE_POLICY_ID);
        let sig_policy_id = p.xades(node::SIG_POLICY_ID);
        w.start_element(&identifier, &[]);
        w.start_element(&policy_id, &[]);
        w.start_element(&sig_policy_id, &[]);
        w.text_element(&p.xades(node::IDENTIFIER), &[], &self.identifier);
        if let Some(description) = &self.description {
            w.text_element(&p.xades(node::DESCRIPTION), &[], description);
        }
        w.end_element(&sig_policy_id);
        if let Some(hash) = &self.hash {
            write_digest(w, p, &p.xades(node::SIG_POLICY_HASH), &hash.digest_method, &hash.value);
        }
        if let Some(spuri) = &self.spuri {
            let qualifiers = p.xades(node::SIG_POLICY_QUALIFIERS);
            let qualifier = p.xades(node::SIG_POLICY_QUALIFIER);
            w.start_element(&qualifiers, &[]);
            w.start_element(&qualifier, &[]);
            w.text_element(&p.xades(node::SPURI), &[], spuri);
            w.end_element(&qualifier);
            w.end_element(&qualifiers);
        }
        w.end_element(&policy_id);
        w.end_element(&identifier);
    }
}

/// Where the signature was produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductionPlace {
    pub city: Option<String>,
    pub state_or_province: Option<String>,
    pub postal_code: Option<String>,
    pub country_name: Option<String>,
}

impl ProductionPlace {
    fn write(&self, w: &mut XmlWriter, p: &PrefixContext) {
        let place = p.xades(node::SIGNATURE_PRODUCTION_PLACE);
        w.start_element(&place, &[]);
        let fields = [
            (node::CITY, &self.city),
            (node::STATE_OR_PROVINCE, &self.state_or_province),
            (node::POSTAL_CODE, &self.postal_code),
            (node::COUNTRY_NAME, &self.country_name),
        ];
        for (local, value) in fields {
            if let Some(value) = value {
                w.text_element(&p.xades(local), &[], value);
            }
        }
        w.end_element(&place);
    }
}

/// Format of one signed data object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObjectFormat {
    /// `#` followed by the Id of the covering `ds:Reference`.
    pub object_reference: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    pub encoding: Option<String>,
}

impl DataObjectFormat {
    fn write(&self, w: &mut XmlWriter, p: &PrefixContext) {
        let format = p.xades(node::DATA_OBJECT_FORMAT);
        w.start_element(&format, &[("ObjectReference", &self.object_reference)]);
        if let Some(description) = &self.description {
            w.text_element(&p.xades(node::DESCRIPTION), &[], description);
        }
        if let Some(mime) = &self.mime_type {
            w.text_element(&p.xades(node::MIME_TYPE), &[], mime);
        }
        if let Some(encoding) = &self.encoding {
            w.text_element(&p.xades(node::ENCODING), &[], encoding);
        }
        w.end_element(&format);
    }
}

/// The data objects a commitment applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitmentScope {
    AllSignedDataObjects,
    /// `#`-prefixed reference Ids.
    ObjectReferences(Vec<String>),
}

/// A `CommitmentTypeIndication`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentType {
    pub identifier: String,
    pub description: Option<String>,
    pub scope: CommitmentScope,
}

impl CommitmentType {
    const ETSI: &'static str = "http://uri.etsi.org/01903/v1.2.2#";

    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            description: None,
            scope: CommitmentScope::AllSignedDataObjects,
        }
    }

    fn etsi(name: &str) -> Self {
        Self::new(format!("{}{name}", Self::ETSI))
    }

    pub fn proof_of_origin() -> Self {
        Self::etsi("ProofOfOrigin")
    }

    pub fn proof_of_receipt() -> Self {
        Self::etsi("ProofOfReceipt")
    }

    pub fn proof_of_delivery() -> Self {
        Self::etsi("ProofOfDelivery")
    }

    pub fn proof_of_sender() -> Self {
        Self::etsi("ProofOfSender")
    }

    pub fn proof_of_approval() -> Self {
        Self::etsi("ProofOfApproval")
    }

    pub fn proof_of_creation() -> Self {
        Self::etsi("ProofOfCreation")
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Restrict the commitment to the given `#`-prefixed reference Ids.
    pub fn with_object_references(mut self, references: Vec<String>) -> Self {
        self.scope = CommitmentScope::ObjectReferences(references);
        self
    }

    fn write(&self, w: &mut XmlWriter, p: &PrefixContext) {
        let indication = p.xades(node::COMMITMENT_TYPE_INDICATION);
        let type_id = p.xades(node::COMMITMENT_TYPE_ID);
        w.start_element(&indication, &[]);
        w.start_element(&type_id, &[]);
        w.text_element(&p.xades(node::IDENTIFIER), &[], &self.identifier);
        if let Some(description) = &self.description {
            w.text_element(&p.xades(node::DESCRIPTION), &[], description);
        }
        w.end_element(&type_id);
        match &self.scope {
            CommitmentScope::AllSignedDataObjects => {
                w.empty_element(&p.xades(node::ALL_SIGNED_DATA_OBJECTS), &[]);
            }
            CommitmentScope::ObjectReferences(refs) => {
                for reference in refs {
                    w.text_element(&p.xades(node::OBJECT_REFERENCE), &[], reference);
                }
            }
        }
        w.end_element(&indication);
    }
}

/// Digest plus issuer and serial of a certificate, as `xades:Cert`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertId {
    pub digest_method: String,
    pub digest: Vec<u8>,
    /// RFC 4514 issuer name.
    pub issuer: String,
    /// Decimal serial number.
    pub serial: String,
    pub uri: Option<String>,
}

impl CertId {
    pub fn of(cert: &X509Cert, digest_method: &str) -> Result<Self, Error> {
        Ok(Self {
            digest_method: digest_method.to_owned(),
            digest: DigestEngine::digest_with(digest_method, cert.der())?,
            issuer: cert.issuer_name(),
            serial: cert.serial_decimal(),
            uri: None,
        })
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub(crate) fn write(&self, w: &mut XmlWriter, p: &PrefixContext) {
        let cert = p.xades(node::CERT);
        match &self.uri {
            Some(uri) => w.start_element(&cert, &[("URI", uri)]),
            None => w.start_element(&cert, &[]),
        }
        write_digest(w, p, &p.xades(node::CERT_DIGEST), &self.digest_method, &self.digest);
        let issuer_serial = p.xades(node::ISSUER_SERIAL);
        w.start_element(&issuer_serial, &[]);
        w.text_element(&p.dsig(node::X509_ISSUER_NAME), &[], &self.issuer);
        w.text_element(&p.dsig(node::X509_SERIAL_NUMBER), &[], &self.serial);
        w.end_element(&issuer_serial);
        w.end_element(&cert);
    }
}

/// The complete `xades:SignedProperties` of a new signature.
#[derive(Debug, Clone)]
pub struct SignedProperties {
    pub id: String,
    pub signing_time: der::DateTime,
    pub signing_certificate: Vec<CertId>,
    pub policy: Option<SignaturePolicy>,
    pub production_place: Option<ProductionPlace>,
    pub signer_role: Option<SignerRole>,
    pub data_object_formats: Vec<DataObjectFormat>,
    pub commitments: Vec<CommitmentType>,
}

impl SignedProperties {
    pub fn write(&self, w: &mut XmlWriter, p: &PrefixContext) {
        let props = p.xades(node::SIGNED_PROPERTIES);
        let signature_props = p.xades(node::SIGNED_SIGNATURE_PROPERTIES);
        w.start_element(&props, &[("Id", &self.id)]);
        w.start_element(&signature_props, &[]);
        w.text_element(&p.xades(node::SIGNING_TIME), &[], &self.signing_time.to_string());

        let signing_cert = p.xades(node::SIGNING_CERTIFICATE);
        w.start_element(&signing_cert, &[]);
        for cert in &self.signing_certificate {
            cert.write(w, p);
        }
        w.end_element(&signing_cert);

        if let Some(policy) = &self.policy {
            policy.write(w, p);
        }
        if let Some(place) = &self.production_place {
            place.write(w, p);
        }
        if let Some(role) = self.signer_role.as_ref().filter(|r| !r.is_empty()) {
            role.write(w, p);
        }
        w.end_element(&signature_props);

        if !self.data_object_formats.is_empty() || !self.commitments.is_empty() {
            let object_props = p.xades(node::SIGNED_DATA_OBJECT_PROPERTIES);
            w.start_element(&object_props, &[]);
            for format in &self.data_object_formats {
                format.write(w, p);
            }
            for commitment in &self.commitments {
                commitment.write(w, p);
            }
            w.end_element(&object_props);
        }
        w.end_element(&props);
    }
}

/// `<container><ds:DigestMethod/><ds:DigestValue/></container>`
pub(crate) fn write_digest(w: &mut XmlWriter, p: &PrefixContext, container: &str, method: &str, value: &[u8]) {
    w.start_element(container, &[]);
    let digest_method = p.dsig(node::DIGEST_METHOD);
    w.start_element(&digest_method, &[("Algorithm", method)]);
    w.end_element(&digest_method);
    w.text_element(&p.dsig(node::DIGEST_VALUE), &[], &encode_base64(value));
    w.end_element(container);
}
