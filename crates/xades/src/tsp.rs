#![forbid(unsafe_code)]

//! RFC 3161 time-stamp tokens.
//!
//! A token is a CMS `ContentInfo` carrying `SignedData` whose encapsulated
//! content is a DER `TSTInfo`. Only the parts XAdES needs are read: the
//! message imprint, the generation time and the certificates shipped with
//! the token.

use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier};
use der::asn1::{GeneralizedTime, Int, ObjectIdentifier, OctetString};
use der::{Decode, Encode, Sequence};
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::Extensions;
use x509_cert::Certificate;
use xades_core::Error;

/// `id-signedData`
pub const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");

/// `id-ct-TSTInfo`
pub const ID_CT_TST_INFO: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.4");

/// ```text
/// MessageImprint ::= SEQUENCE {
///     hashAlgorithm  AlgorithmIdentifier,
///     hashedMessage  OCTET STRING }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
#[allow(missing_docs)]
pub struct MessageImprint {
    pub hash_algorithm: AlgorithmIdentifierOwned,
    pub hashed_message: OctetString,
}

/// ```text
/// Accuracy ::= SEQUENCE {
///     seconds  INTEGER           OPTIONAL,
///     millis   [0] INTEGER (1..999) OPTIONAL,
///     micros   [1] INTEGER (1..999) OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
#[allow(missing_docs)]
pub struct Accuracy {
    #[asn1(optional = "true")]
    pub seconds: Option<u64>,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub millis: Option<u16>,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub micros: Option<u16>,
}

/// ```text
/// TSTInfo ::= SEQUENCE {
///     version         INTEGER { v1(1) },
///     policy          TSAPolicyId,
///     messageImprint  MessageImprint,
///     serialNumber    INTEGER,
///     genTime         GeneralizedTime,
///     accuracy        Accuracy OPTIONAL,
///     ordering        BOOLEAN DEFAULT FALSE,
///     nonce           INTEGER OPTIONAL,
///     tsa             [0] GeneralName OPTIONAL,
///     extensions      [1] IMPLICIT Extensions OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
#[allow(missing_docs)]
pub struct TstInfo {
    pub version: u8,
    pub policy: ObjectIdentifier,
    pub message_imprint: MessageImprint,
    pub serial_number: Int,
    pub gen_time: GeneralizedTime,
    #[asn1(optional = "true")]
    pub accuracy: Option<Accuracy>,
    #[asn1(default = "Default::default")]
    pub ordering: bool,
    #[asn1(optional = "true")]
    pub nonce: Option<Int>,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub tsa: Option<GeneralName>,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub extensions: Option<Extensions>,
}

/// A parsed time-stamp token.
#[derive(Debug, Clone)]
pub struct TimeStampToken {
    der: Vec<u8>,
    info: TstInfo,
    certificates: Vec<Vec<u8>>,
    /// Index into `certificates` of the TSA's own certificate.
    signer: Option<usize>,
}

fn malformed(what: &str) -> impl FnOnce(der::Error) -> Error + '_ {
    move |e| Error::ProtocolFailure(format!("malformed time-stamp token ({what}): {e}"))
}

impl TimeStampToken {
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let content_info = ContentInfo::from_der(der).map_err(malformed("ContentInfo"))?;
        if content_info.content_type != ID_SIGNED_DATA {
            return Err(Error::ProtocolFailure(format!(
                "time-stamp token content type {} is not signedData",
                content_info.content_type
            )));
        }
        let signed_data: SignedData = content_info
            .content
            .decode_as()
            .map_err(malformed("SignedData"))?;

        let encap = &signed_data.encap_content_info;
        if encap.econtent_type != ID_CT_TST_INFO {
            return Err(Error::ProtocolFailure(format!(
                "encapsulated content type {} is not TSTInfo",
                encap.econtent_type
            )));
        }
        let econtent = encap
            .econtent
            .as_ref()
            .ok_or_else(|| Error::ProtocolFailure("time-stamp token without TSTInfo".into()))?;
        let octets: OctetString = econtent.decode_as().map_err(malformed("eContent"))?;
        let info = TstInfo::from_der(octets.as_bytes()).map_err(malformed("TSTInfo"))?;

        let certs: Vec<&Certificate> = signed_data
            .certificates
            .iter()
            .flat_map(|set| set.0.iter())
            .filter_map(|choice| match choice {
                CertificateChoices::Certificate(cert) => Some(cert),
                CertificateChoices::Other(_) => None,
            })
            .collect();
        let signer = signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .and_then(|info| match &info.sid {
                SignerIdentifier::IssuerAndSerialNumber(sid) => certs.iter().position(|c| {
                    c.tbs_certificate.issuer == sid.issuer && c.tbs_certificate.serial_number == sid.serial_number
                }),
                SignerIdentifier::SubjectKeyIdentifier(_) => None,
            });
        let certificates = certs
            .iter()
            .map(|c| c.to_der().map_err(malformed("certificate")))
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Self {
            der: der.to_vec(),
            info,
            certificates,
            signer,
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn info(&self) -> &TstInfo {
        &self.info
    }

    /// The hashed message the TSA signed.
    pub fn imprint(&self) -> &[u8] {
        self.info.message_imprint.hashed_message.as_bytes()
    }

    /// OID of the imprint's hash algorithm, dotted.
    pub fn imprint_oid(&self) -> String {
        self.info.message_imprint.hash_algorithm.oid.to_string()
    }

    pub fn gen_time(&self) -> der::DateTime {
        self.info.gen_time.to_date_time()
    }

    /// DER certificates carried in the `SignedData`.
    pub fn certificates(&self) -> &[Vec<u8>] {
        &self.certificates
    }

    /// The TSA certificate the token's signer identifier names, when the
    /// token carries it.
    pub fn signer_certificate(&self) -> Option<&[u8]> {
        self.signer.and_then(|i| self.certificates.get(i)).map(Vec::as_slice)
    }

    /// Fails with `ProtocolFailure` unless the token stamps `digest`
    /// computed with the algorithm `digest_oid`.
    pub fn check_imprint(&self, digest: &[u8], digest_oid: &str) -> Result<(), Error> {
        if self.imprint_oid() != digest_oid {
            return Err(Error::ProtocolFailure(format!(
                "time-stamp imprint algorithm {} differs from requested {digest_oid}",
                self.imprint_oid()
            )));
        }
        if self.imprint() != digest {
            return Err(Error::ProtocolFailure(
                "time-stamp imprint differs from the requested digest".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{mint_token, test_time, TSA_CERT};
    use xades_core::algorithm;

    #[test]
    fn test_parse_minted_token() {
        let digest = [7u8; 32];
        let der = mint_token(&digest, algorithm::SHA256_OID, true, test_time());
        let token = TimeStampToken::from_der(&der).unwrap();
        assert_eq!(token.imprint(), &digest);
        assert_eq!(token.imprint_oid(), algorithm::SHA256_OID);
        assert_eq!(token.gen_time(), test_time());
        assert_eq!(token.certificates(), &[TSA_CERT.to_vec()]);
        assert_eq!(token.signer_certificate(), Some(TSA_CERT));
        assert!(token.check_imprint(&digest, algorithm::SHA256_OID).is_ok());
    }

    #[test]
    fn test_imprint_mismatch_is_protocol_failure() {
        let der = mint_token(&[1u8; 32], algorithm::SHA256_OID, false, test_time());
        let token = TimeStampToken::from_der(&der).unwrap();
        assert!(token.certificates().is_empty());
        assert_eq!(token.signer_certificate(), None);
        assert!(matches!(
            token.check_imprint(&[2u8; 32], algorithm::SHA256_OID),
            Err(Error::ProtocolFailure(_))
        ));
        assert!(matches!(
            token.check_imprint(&[1u8; 32], algorithm::SHA512_OID),
            Err(Error::ProtocolFailure(_))
        ));
    }

    #[test]
    fn test_garbage_is_protocol_failure() {
        assert!(matches!(
            TimeStampToken::from_der(&[0x30, 0x03, 0x0a, 0x01, 0x00]),
            Err(Error::ProtocolFailure(_))
        ));
    }
}
