#![forbid(unsafe_code)]

//! Signing and upgrade configuration.

use crate::clients::{OcspClient, TimeStampClient};
use crate::model::{CommitmentType, ProductionPlace, SignaturePolicy, SignerRole};
use std::fmt;
use std::sync::Arc;
use xades_core::algorithm;
use xades_keys::Signer;

/// Where the signed content lives relative to the signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SignaturePackaging {
    /// The signature is placed inside the signed XML document.
    #[default]
    Enveloped,
    /// The content is placed inside the signature, in a `ds:Object`.
    Enveloping,
    /// Content and signature are siblings under a `DOCFIRMA` wrapper.
    InternallyDetached,
    /// The content stays outside; the reference points at `uri`.
    ExternallyDetached { uri: String },
}

/// Levels of a XAdES signature, in upgrade order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignatureForm {
    Basic,
    T,
    C,
    X,
    XL,
    A,
}

impl SignatureForm {
    pub fn name(&self) -> &'static str {
        match self {
            SignatureForm::Basic => "XAdES-BES",
            SignatureForm::T => "XAdES-T",
            SignatureForm::C => "XAdES-C",
            SignatureForm::X => "XAdES-X",
            SignatureForm::XL => "XAdES-XL",
            SignatureForm::A => "XAdES-A",
        }
    }
}

impl fmt::Display for SignatureForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which time-stamp XAdES-X adds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XVariant {
    /// `SigAndRefsTimeStamp` over the signature value, its time-stamps and
    /// the complete references.
    #[default]
    SigAndRefs,
    /// `RefsOnlyTimeStamp` over the complete references alone.
    RefsOnly,
}

/// Parameters of a signing operation.
#[derive(Clone)]
pub struct SignatureParameters {
    pub signer: Arc<dyn Signer>,
    /// Defaults to the signer's own method.
    pub signature_method: Option<String>,
    pub digest_method: String,
    /// Defaults to the current time.
    pub signing_time: Option<der::DateTime>,
    pub signer_role: Option<SignerRole>,
    pub policy: Option<SignaturePolicy>,
    pub production_place: Option<ProductionPlace>,
    pub commitments: Vec<CommitmentType>,
    pub packaging: SignaturePackaging,
    /// Defaults to `text/xml` for XML content and
    /// `application/octet-stream` otherwise.
    pub mime_type: Option<String>,
    pub description: Option<String>,
    /// Id of the element that receives an enveloped signature. Defaults to
    /// the document element.
    pub destination: Option<String>,
    /// Id of the element an enveloped signature covers. Defaults to the
    /// whole document.
    pub signed_element: Option<String>,
}

impl SignatureParameters {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self {
            signer,
            signature_method: None,
            digest_method: algorithm::SHA256.to_owned(),
            signing_time: None,
            signer_role: None,
            policy: None,
            production_place: None,
            commitments: Vec::new(),
            packaging: SignaturePackaging::default(),
            mime_type: None,
            description: None,
            destination: None,
            signed_element: None,
        }
    }

    pub fn with_signature_method(mut self, method: impl Into<String>) -> Self {
        self.signature_method = Some(method.into());
        self
    }

    pub fn with_digest_method(mut self, method: impl Into<String>) -> Self {
        self.digest_method = method.into();
        self
    }

    pub fn with_signing_time(mut self, time: der::DateTime) -> Self {
        self.signing_time = Some(time);
        self
    }

    pub fn with_signer_role(mut self, role: SignerRole) -> Self {
        self.signer_role = Some(role);
        self
    }

    pub fn with_policy(mut self, policy: SignaturePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_production_place(mut self, place: ProductionPlace) -> Self {
        self.production_place = Some(place);
        self
    }

    pub fn with_commitment(mut self, commitment: CommitmentType) -> Self {
        self.commitments.push(commitment);
        self
    }

    pub fn with_packaging(mut self, packaging: SignaturePackaging) -> Self {
        self.packaging = packaging;
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_destination(mut self, element_id: impl Into<String>) -> Self {
        self.destination = Some(element_id.into());
        self
    }

    pub fn with_signed_element(mut self, element_id: impl Into<String>) -> Self {
        self.signed_element = Some(element_id.into());
        self
    }

    pub(crate) fn signature_method(&self) -> &str {
        self.signature_method
            .as_deref()
            .unwrap_or_else(|| self.signer.signature_method())
    }
}

impl fmt::Debug for SignatureParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureParameters")
            .field("signature_method", &self.signature_method())
            .field("digest_method", &self.digest_method)
            .field("signing_time", &self.signing_time)
            .field("packaging", &self.packaging)
            .field("mime_type", &self.mime_type)
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

/// Parameters of an upgrade.
#[derive(Clone)]
pub struct UpgradeParameters {
    pub tsa: Arc<dyn TimeStampClient>,
    pub ocsp: Option<Arc<dyn OcspClient>>,
    /// Responders tried after the ones a certificate names itself.
    pub ocsp_servers: Vec<String>,
    /// DER CRLs available for revocation checks.
    pub crls: Vec<Vec<u8>>,
    /// DER certificates completing chains.
    pub certificates: Vec<Vec<u8>>,
    /// Digest for time-stamp imprints and evidence references.
    pub digest_method: String,
    pub x_variant: XVariant,
    /// Time revocation data must be current at. Defaults to now.
    pub validation_time: Option<der::DateTime>,
}

impl UpgradeParameters {
    pub fn new(tsa: Arc<dyn TimeStampClient>) -> Self {
        Self {
            tsa,
            ocsp: None,
            ocsp_servers: Vec::new(),
            crls: Vec::new(),
            certificates: Vec::new(),
            digest_method: algorithm::SHA256.to_owned(),
            x_variant: XVariant::default(),
            validation_time: None,
        }
    }

    pub fn with_ocsp(mut self, client: Arc<dyn OcspClient>) -> Self {
        self.ocsp = Some(client);
        self
    }

    pub fn with_ocsp_server(mut self, url: impl Into<String>) -> Self {
        self.ocsp_servers.push(url.into());
        self
    }

    pub fn with_crl(mut self, der: Vec<u8>) -> Self {
        self.crls.push(der);
        self
    }

    pub fn with_certificate(mut self, der: Vec<u8>) -> Self {
        self.certificates.push(der);
        self
    }

    pub fn with_digest_method(mut self, method: impl Into<String>) -> Self {
        self.digest_method = method.into();
        self
    }

    pub fn with_x_variant(mut self, variant: XVariant) -> Self {
        self.x_variant = variant;
        self
    }

    pub fn with_validation_time(mut self, at: der::DateTime) -> Self {
        self.validation_time = Some(at);
        self
    }
}

impl fmt::Debug for UpgradeParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeParameters")
            .field("ocsp", &self.ocsp.is_some())
            .field("ocsp_servers", &self.ocsp_servers)
            .field("crls", &self.crls.len())
            .field("certificates", &self.certificates.len())
            .field("digest_method", &self.digest_method)
            .field("x_variant", &self.x_variant)
            .field("validation_time", &self.validation_time)
            .finish()
    }
}
