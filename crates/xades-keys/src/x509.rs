#![forbid(unsafe_code)]

//! X.509 certificates and CRLs.
//!
//! Only what long-term signature evidence needs: issuer matching with
//! signature checks, chain walking, validity windows, CRL lookups and the
//! OCSP locations of the Authority Information Access extension. Full RFC
//! 5280 path validation is out of scope.

use der::oid::AssociatedOid;
use der::{Decode, Encode};
use x509_cert::crl::CertificateList;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{AuthorityInfoAccessSyntax, CrlNumber};
use x509_cert::Certificate;
use xades_core::Error;

const ID_AD_OCSP: der::asn1::ObjectIdentifier =
    der::asn1::ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1");

/// A parsed certificate that keeps its original DER encoding.
#[derive(Debug, Clone)]
pub struct X509Cert {
    der: Vec<u8>,
    cert: Certificate,
}

impl PartialEq for X509Cert {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for X509Cert {}

impl X509Cert {
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let cert = Certificate::from_der(der)
            .map_err(|e| Error::Certificate(format!("failed to parse X.509 certificate: {e}")))?;
        Ok(Self {
            der: der.to_vec(),
            cert,
        })
    }

    /// Parse the first certificate of a PEM bundle.
    pub fn from_pem(pem: &[u8]) -> Result<Self, Error> {
        let certs = crate::loader::load_certs_pem(pem)?;
        let first = certs
            .first()
            .ok_or_else(|| Error::Certificate("no CERTIFICATE block in PEM".into()))?;
        Self::from_der(first)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn cert(&self) -> &Certificate {
        &self.cert
    }

    /// Subject as an RFC 4514 string.
    pub fn subject_name(&self) -> String {
        self.cert.tbs_certificate.subject.to_string()
    }

    /// Issuer as an RFC 4514 string.
    pub fn issuer_name(&self) -> String {
        self.cert.tbs_certificate.issuer.to_string()
    }

    pub fn serial_bytes(&self) -> &[u8] {
        self.cert.tbs_certificate.serial_number.as_bytes()
    }

    /// Serial number in decimal, as `X509SerialNumber` carries it.
    pub fn serial_decimal(&self) -> String {
        rsa::BigUint::from_bytes_be(self.serial_bytes()).to_string()
    }

    /// Subject and issuer names are equal.
    pub fn is_self_issued(&self) -> bool {
        self.cert.tbs_certificate.subject == self.cert.tbs_certificate.issuer
    }

    /// Self-issued and verifiable with its own key, i.e. a root.
    pub fn is_self_signed(&self) -> bool {
        self.is_self_issued() && self.is_issued_by(self)
    }

    /// `issuer`'s subject is our issuer and its key verifies our signature.
    pub fn is_issued_by(&self, issuer: &X509Cert) -> bool {
        if self.cert.tbs_certificate.issuer != issuer.cert.tbs_certificate.subject {
            return false;
        }
        verify_cert_signature(&self.cert, &issuer.cert.tbs_certificate.subject_public_key_info)
            .is_ok()
    }

    pub fn not_before(&self) -> der::DateTime {
        self.cert.tbs_certificate.validity.not_before.to_date_time()
    }

    pub fn not_after(&self) -> der::DateTime {
        self.cert.tbs_certificate.validity.not_after.to_date_time()
    }

    /// Fails when `at` lies outside the validity window.
    pub fn check_validity(&self, at: &der::DateTime) -> Result<(), Error> {
        let not_before = self.not_before();
        let not_after = self.not_after();
        if *at < not_before {
            return Err(Error::Certificate(format!(
                "certificate {} is not yet valid (notBefore: {not_before})",
                self.subject_name()
            )));
        }
        if *at > not_after {
            return Err(Error::Certificate(format!(
                "certificate {} has expired (notAfter: {not_after})",
                self.subject_name()
            )));
        }
        Ok(())
    }

    /// OCSP responder URLs from the Authority Information Access extension.
    pub fn ocsp_urls(&self) -> Vec<String> {
        let Some(extensions) = &self.cert.tbs_certificate.extensions else {
            return Vec::new();
        };
        extensions
            .iter()
            .filter(|ext| ext.extn_id == AuthorityInfoAccessSyntax::OID)
            .filter_map(|ext| AuthorityInfoAccessSyntax::from_der(ext.extn_value.as_bytes()).ok())
            .flat_map(|aia| aia.0)
            .filter(|desc| desc.access_method == ID_AD_OCSP)
            .filter_map(|desc| match desc.access_location {
                GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
                _ => None,
            })
            .collect()
    }

    /// DER of the subject public key info.
    pub fn spki_der(&self) -> Result<Vec<u8>, Error> {
        self.cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode SPKI: {e}")))
    }
}

/// Walk issuer links from `leaf` through `pool` until a self-signed
/// certificate or a dead end. The result starts with `leaf`.
pub fn build_chain(leaf: &X509Cert, pool: &[X509Cert]) -> Vec<X509Cert> {
    const MAX_DEPTH: usize = 10;
    let mut chain = vec![leaf.clone()];
    while chain.len() < MAX_DEPTH {
        let Some(current) = chain.last() else { break };
        if current.is_self_signed() {
            break;
        }
        let next = pool
            .iter()
            .find(|candidate| !chain.contains(candidate) && current.is_issued_by(candidate))
            .cloned();
        match next {
            Some(issuer) => chain.push(issuer),
            None => {
                tracing::debug!(subject = %current.subject_name(), "no issuer in pool");
                break;
            }
        }
    }
    chain
}

// ── CRLs ─────────────────────────────────────────────────────────────

/// A parsed CRL that keeps its original DER encoding.
#[derive(Debug, Clone)]
pub struct Crl {
    der: Vec<u8>,
    crl: CertificateList,
}

/// Status of a certificate according to a CRL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrlStatus {
    Good,
    Revoked { at: der::DateTime },
}

impl Crl {
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let crl = CertificateList::from_der(der)
            .map_err(|e| Error::Certificate(format!("failed to parse CRL: {e}")))?;
        Ok(Self {
            der: der.to_vec(),
            crl,
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn issuer_name(&self) -> String {
        self.crl.tbs_cert_list.issuer.to_string()
    }

    pub fn this_update(&self) -> der::DateTime {
        self.crl.tbs_cert_list.this_update.to_date_time()
    }

    pub fn next_update(&self) -> Option<der::DateTime> {
        self.crl.tbs_cert_list.next_update.as_ref().map(|t| t.to_date_time())
    }

    /// The CRL number extension in decimal.
    pub fn number(&self) -> Option<String> {
        self.crl
            .tbs_cert_list
            .crl_extensions
            .as_ref()?
            .iter()
            .find(|ext| ext.extn_id == CrlNumber::OID)
            .and_then(|ext| CrlNumber::from_der(ext.extn_value.as_bytes()).ok())
            .map(|n| rsa::BigUint::from_bytes_be(n.0.as_bytes()).to_string())
    }

    /// Whether `issuer` issued and signed this CRL.
    pub fn is_issued_by(&self, issuer: &X509Cert) -> bool {
        if self.crl.tbs_cert_list.issuer != issuer.cert.tbs_certificate.subject {
            return false;
        }
        let Ok(tbs) = self.crl.tbs_cert_list.to_der() else {
            return false;
        };
        let Some(sig) = self.crl.signature.as_bytes() else {
            return false;
        };
        verify_signed(
            &tbs,
            &self.crl.signature_algorithm.oid.to_string(),
            sig,
            &issuer.cert.tbs_certificate.subject_public_key_info,
        )
        .is_ok()
    }

    /// Not yet past its `nextUpdate` at `at`.
    pub fn is_current(&self, at: &der::DateTime) -> bool {
        self.next_update().map_or(true, |next| next > *at)
    }

    /// Status of `cert` at `at` according to this CRL.
    pub fn status_of(&self, cert: &X509Cert, at: &der::DateTime) -> CrlStatus {
        let serial = &cert.cert.tbs_certificate.serial_number;
        self.crl
            .tbs_cert_list
            .revoked_certificates
            .iter()
            .flatten()
            .filter(|entry| entry.serial_number == *serial)
            .map(|entry| entry.revocation_date.to_date_time())
            .find(|revoked_at| revoked_at <= at)
            .map_or(CrlStatus::Good, |at| CrlStatus::Revoked { at })
    }
}

/// The first current CRL from `issuer` among `crls`, with the status it
/// gives `cert`.
pub fn crl_status<'a>(
    cert: &X509Cert,
    issuer: &X509Cert,
    crls: &'a [Crl],
    at: &der::DateTime,
) -> Option<(&'a Crl, CrlStatus)> {
    crls.iter()
        .filter(|crl| crl.crl.tbs_cert_list.issuer == cert.cert.tbs_certificate.issuer)
        .filter(|crl| {
            let current = crl.is_current(at);
            if !current {
                tracing::debug!(issuer = %crl.issuer_name(), "skipping expired CRL");
            }
            current
        })
        .find(|crl| crl.is_issued_by(issuer))
        .map(|crl| (crl, crl.status_of(cert, at)))
}

// ── Time ─────────────────────────────────────────────────────────────

/// The current time.
pub fn now() -> Result<der::DateTime, Error> {
    der::DateTime::from_system_time(std::time::SystemTime::now())
        .map_err(|e| Error::Certificate(format!("system time out of range: {e}")))
}

// ── Signature checks ─────────────────────────────────────────────────

fn verify_cert_signature(
    cert: &Certificate,
    issuer_spki: &spki::SubjectPublicKeyInfoOwned,
) -> Result<(), Error> {
    let tbs_der = cert
        .tbs_certificate
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode TBS: {e}")))?;
    let sig_bytes = cert
        .signature
        .as_bytes()
        .ok_or_else(|| Error::Certificate("no signature bytes".into()))?;
    verify_signed(&tbs_der, &cert.signature_algorithm.oid.to_string(), sig_bytes, issuer_spki)
}

/// Verify a signature over DER `tbs` with the issuer's key.
fn verify_signed(
    tbs: &[u8],
    sig_alg_oid: &str,
    sig_bytes: &[u8],
    issuer_spki: &spki::SubjectPublicKeyInfoOwned,
) -> Result<(), Error> {
    const SHA1_RSA: &str = "1.2.840.113549.1.1.5";
    const SHA224_RSA: &str = "1.2.840.113549.1.1.14";
    const SHA256_RSA: &str = "1.2.840.113549.1.1.11";
    const SHA384_RSA: &str = "1.2.840.113549.1.1.12";
    const SHA512_RSA: &str = "1.2.840.113549.1.1.13";
    const ECDSA_SHA256: &str = "1.2.840.10045.4.3.2";
    const ECDSA_SHA384: &str = "1.2.840.10045.4.3.3";

    let spki_der = issuer_spki
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode issuer SPKI: {e}")))?;

    match sig_alg_oid {
        SHA1_RSA => verify_rsa::<sha1::Sha1>(&spki_der, tbs, sig_bytes),
        SHA224_RSA => verify_rsa::<sha2::Sha224>(&spki_der, tbs, sig_bytes),
        SHA256_RSA => verify_rsa::<sha2::Sha256>(&spki_der, tbs, sig_bytes),
        SHA384_RSA => verify_rsa::<sha2::Sha384>(&spki_der, tbs, sig_bytes),
        SHA512_RSA => verify_rsa::<sha2::Sha512>(&spki_der, tbs, sig_bytes),
        ECDSA_SHA256 => verify_p256(&spki_der, tbs, sig_bytes),
        ECDSA_SHA384 => verify_p384(&spki_der, tbs, sig_bytes),
        _ => Err(Error::UnsupportedAlgorithm(format!(
            "certificate signature algorithm: {sig_alg_oid}"
        ))),
    }
}

fn verify_rsa<D>(issuer_spki_der: &[u8], tbs: &[u8], signature: &[u8]) -> Result<(), Error>
where
    D: digest::Digest + digest::const_oid::AssociatedOid,
    rsa::pkcs1v15::VerifyingKey<D>: signature::Verifier<rsa::pkcs1v15::Signature>,
{
    use signature::Verifier;
    use spki::DecodePublicKey;

    let public_key = rsa::RsaPublicKey::from_public_key_der(issuer_spki_der)
        .map_err(|e| Error::Certificate(format!("invalid RSA public key: {e}")))?;
    let sig = rsa::pkcs1v15::Signature::try_from(signature)
        .map_err(|e| Error::Certificate(format!("invalid RSA signature: {e}")))?;
    rsa::pkcs1v15::VerifyingKey::<D>::new(public_key)
        .verify(tbs, &sig)
        .map_err(|e| Error::Certificate(format!("signature verification failed: {e}")))
}

fn verify_p256(issuer_spki_der: &[u8], tbs: &[u8], signature: &[u8]) -> Result<(), Error> {
    use signature::Verifier;
    use spki::DecodePublicKey;

    let vk = p256::ecdsa::VerifyingKey::from_public_key_der(issuer_spki_der)
        .map_err(|e| Error::Certificate(format!("invalid EC P-256 key: {e}")))?;
    let sig = p256::ecdsa::DerSignature::from_bytes(signature)
        .map_err(|e| Error::Certificate(format!("invalid ECDSA signature: {e}")))?;
    vk.verify(tbs, &sig)
        .map_err(|e| Error::Certificate(format!("signature verification failed: {e}")))
}

fn verify_p384(issuer_spki_der: &[u8], tbs: &[u8], signature: &[u8]) -> Result<(), Error> {
    use signature::Verifier;
    use spki::DecodePublicKey;

    let vk = p384::ecdsa::VerifyingKey::from_public_key_der(issuer_spki_der)
        .map_err(|e| Error::Certificate(format!("invalid EC P-384 key: {e}")))?;
    let sig = p384::ecdsa::DerSignature::from_bytes(signature)
        .map_err(|e| Error::Certificate(format!("invalid ECDSA signature: {e}")))?;
    vk.verify(tbs, &sig)
        .map_err(|e| Error::Certificate(format!("signature verification failed: {e}")))
}
