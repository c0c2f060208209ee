//! Test PKI fixtures and in-process collaborators.

use crate::clients::{CertStatus, OcspClient, OcspResponse, ResponderId, TimeStampClient};
use crate::params::{SignatureParameters, UpgradeParameters};
use crate::tsp::{MessageImprint, TstInfo, ID_CT_TST_INFO, ID_SIGNED_DATA};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use der::asn1::{GeneralizedTime, Int, ObjectIdentifier, OctetString, SetOfVec};
use der::{Any, Decode, Encode};
use spki::AlgorithmIdentifierOwned;
use std::sync::{Arc, Mutex};
use x509_cert::Certificate;
use xades_core::{algorithm, Error};
use xades_keys::{RsaSigner, Signer, X509Cert};

pub const ROOT_CERT: &[u8] = include_bytes!("../testdata/root.der");
pub const INTER_CERT: &[u8] = include_bytes!("../testdata/inter.der");
pub const SIGNER_CERT: &[u8] = include_bytes!("../testdata/signer.der");
pub const SIGNER_KEY: &[u8] = include_bytes!("../testdata/signer-key.pem");
pub const TSA_CERT: &[u8] = include_bytes!("../testdata/tsa.der");
pub const TSA_KEY: &[u8] = include_bytes!("../testdata/tsa-key.pem");
pub const OCSP_CERT: &[u8] = include_bytes!("../testdata/ocsp.der");
pub const ROOT_CRL: &[u8] = include_bytes!("../testdata/root-crl.der");
pub const INTER_CRL: &[u8] = include_bytes!("../testdata/inter-crl.der");
pub const INTER_CRL_REVOKED: &[u8] = include_bytes!("../testdata/inter-crl-revoked.der");

/// Inside the validity window of every fixture certificate and CRL.
pub fn test_time() -> der::DateTime {
    der::DateTime::new(2030, 1, 1, 12, 0, 0).unwrap()
}

pub fn signer() -> Arc<RsaSigner> {
    Arc::new(
        RsaSigner::from_pem(SIGNER_KEY, SIGNER_CERT)
            .unwrap()
            .with_chain(vec![INTER_CERT.to_vec(), ROOT_CERT.to_vec()]),
    )
}

pub fn sign_params() -> SignatureParameters {
    SignatureParameters::new(signer()).with_signing_time(test_time())
}

/// Upgrade parameters with both CRLs, so no OCSP is needed.
pub fn upgrade_params() -> UpgradeParameters {
    UpgradeParameters::new(Arc::new(FakeTsa::new()))
        .with_crl(ROOT_CRL.to_vec())
        .with_crl(INTER_CRL.to_vec())
        .with_validation_time(test_time())
}

/// Mint a TSA token over `digest`, signed with the fixture TSA key.
pub fn mint_token(digest: &[u8], digest_oid: &str, with_cert: bool, at: der::DateTime) -> Vec<u8> {
    let info = TstInfo {
        version: 1,
        policy: ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1"),
        message_imprint: MessageImprint {
            hash_algorithm: AlgorithmIdentifierOwned {
                oid: ObjectIdentifier::new(digest_oid).unwrap(),
                parameters: None,
            },
            hashed_message: OctetString::new(digest.to_vec()).unwrap(),
        },
        serial_number: Int::new(&[0x2a]).unwrap(),
        gen_time: GeneralizedTime::from_date_time(at),
        accuracy: None,
        ordering: false,
        nonce: None,
        tsa: None,
        extensions: None,
    };
    let info_der = info.to_der().unwrap();

    let tsa_signer = RsaSigner::from_pem(TSA_KEY, TSA_CERT).unwrap();
    let signature = tsa_signer.sign(algorithm::RSA_SHA256, &info_der).unwrap();
    let cert = Certificate::from_der(TSA_CERT).unwrap();
    let sha256 = AlgorithmIdentifierOwned {
        oid: ObjectIdentifier::new_unwrap(algorithm::SHA256_OID),
        parameters: None,
    };
    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: cert.tbs_certificate.issuer.clone(),
            serial_number: cert.tbs_certificate.serial_number.clone(),
        }),
        digest_alg: sha256.clone(),
        signed_attrs: None,
        signature_algorithm: AlgorithmIdentifierOwned {
            oid: ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11"),
            parameters: None,
        },
        signature: OctetString::new(signature).unwrap(),
        unsigned_attrs: None,
    };
    let certificates = with_cert.then(|| {
        CertificateSet(SetOfVec::try_from(vec![CertificateChoices::Certificate(cert)]).unwrap())
    });
    let signed_data = SignedData {
        version: CmsVersion::V3,
        digest_algorithms: SetOfVec::try_from(vec![sha256]).unwrap(),
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: ID_CT_TST_INFO,
            econtent: Some(Any::encode_from(&OctetString::new(info_der).unwrap()).unwrap()),
        },
        certificates,
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info]).unwrap()),
    };
    ContentInfo {
        content_type: ID_SIGNED_DATA,
        content: Any::encode_from(&signed_data).unwrap(),
    }
    .to_der()
    .unwrap()
}

/// A TSA answering every request, counting calls.
pub struct FakeTsa {
    pub calls: Mutex<usize>,
    /// Stamp this digest instead of the requested one.
    pub wrong_imprint: bool,
}

impl FakeTsa {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(0),
            wrong_imprint: false,
        }
    }
}

impl TimeStampClient for FakeTsa {
    fn get_timestamp(&self, digest: &[u8], digest_oid: &str, request_certificate: bool) -> Result<Vec<u8>, Error> {
        *self.calls.lock().unwrap() += 1;
        let stamped = if self.wrong_imprint {
            vec![0u8; digest.len()]
        } else {
            digest.to_vec()
        };
        Ok(mint_token(&stamped, digest_oid, request_certificate, test_time()))
    }
}

/// An OCSP responder with one canned status, signed by the fixture
/// responder certificate.
pub struct FakeOcsp {
    pub status: CertStatus,
    pub urls: Mutex<Vec<String>>,
}

impl FakeOcsp {
    pub fn new(status: CertStatus) -> Self {
        Self {
            status,
            urls: Mutex::new(Vec::new()),
        }
    }
}

impl OcspClient for FakeOcsp {
    fn query_status(&self, certificate: &X509Cert, _issuer: &X509Cert, url: &str) -> Result<OcspResponse, Error> {
        self.urls.lock().unwrap().push(url.to_owned());
        let responder = X509Cert::from_der(OCSP_CERT)?;
        // Opaque but distinct per certificate.
        let mut encoded = vec![0x30, 0x03, 0x0a, 0x01, 0x00];
        encoded.extend_from_slice(certificate.serial_bytes());
        Ok(OcspResponse {
            status: self.status,
            responder_id: ResponderId::ByName(responder.subject_name()),
            produced_at: test_time(),
            encoded,
            responder_certificates: vec![OCSP_CERT.to_vec()],
        })
    }
}

/// An OCSP client whose every request fails in transport.
pub struct UnreachableOcsp;

impl OcspClient for UnreachableOcsp {
    fn query_status(&self, _certificate: &X509Cert, _issuer: &X509Cert, url: &str) -> Result<OcspResponse, Error> {
        Err(Error::NetworkFailure(format!("connection refused: {url}")))
    }
}
