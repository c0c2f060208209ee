#![forbid(unsafe_code)]

//! Revocation evidence for XAdES-C and XAdES-XL.
//!
//! Every certificate of the signing chain is checked against its issuer:
//! a current CRL first, then OCSP at the certificate's own responders and
//! the configured ones. A responder that is not the issuer itself gets its
//! own chain checked the same way, and so does the chain of every TSA
//! that stamped the signature.

use crate::clients::{CertStatus, OcspResponse};
use crate::params::UpgradeParameters;
use roxmltree::Node;
use std::collections::HashSet;
use tracing::{debug, warn};
use xades_core::{ns, Error};
use xades_dsig::engine::decode_base64;
use xades_keys::x509::crl_status;
use xades_keys::{CertStore, Crl, CrlStatus, X509Cert};
use xades_xml::document::{find_child_element, find_child_elements, text_content};

/// Certificates and revocation data completing a signature.
#[derive(Debug, Clone, Default)]
pub struct Evidence {
    /// Chain, responder and TSA certificates, without the signing
    /// certificate.
    pub certificates: Vec<X509Cert>,
    pub crls: Vec<Crl>,
    pub ocsp: Vec<OcspResponse>,
}

impl Evidence {
    fn add_certificate(&mut self, cert: &X509Cert) {
        if !self.certificates.contains(cert) {
            self.certificates.push(cert.clone());
        }
    }

    fn add_crl(&mut self, crl: &Crl) {
        if !self.crls.iter().any(|c| c.der() == crl.der()) {
            self.crls.push(crl.clone());
        }
    }
}

/// The signing certificate and the other `ds:X509Certificate`s of a
/// signature's own `ds:KeyInfo`.
pub fn key_info_certificates(signature: Node<'_, '_>) -> Result<(X509Cert, Vec<X509Cert>), Error> {
    let mut certs = find_child_element(signature, ns::DSIG, ns::node::KEY_INFO)
        .into_iter()
        .flat_map(|k| find_child_elements(k, ns::DSIG, ns::node::X509_DATA))
        .flat_map(|d| find_child_elements(d, ns::DSIG, ns::node::X509_CERTIFICATE))
        .map(|c| X509Cert::from_der(&decode_base64(&text_content(c))?))
        .collect::<Result<Vec<_>, Error>>()?
        .into_iter();
    let leaf = certs
        .next()
        .ok_or_else(|| Error::MissingRequiredElement("ds:KeyInfo/ds:X509Data/ds:X509Certificate".into()))?;
    Ok((leaf, certs.collect()))
}

pub struct RevocationCollector<'a> {
    params: &'a UpgradeParameters,
    store: CertStore,
    at: der::DateTime,
    visited: HashSet<Vec<u8>>,
    evidence: Evidence,
}

impl<'a> RevocationCollector<'a> {
    /// A collector over `known` certificates plus the configured ones.
    pub fn new(params: &'a UpgradeParameters, known: Vec<X509Cert>) -> Result<Self, Error> {
        let mut store = CertStore::new();
        for cert in known {
            store.add_cert(cert);
        }
        for der in &params.certificates {
            store.add_cert_der(der)?;
        }
        for der in &params.crls {
            store.add_crl_der(der)?;
        }
        let at = match params.validation_time {
            Some(at) => at,
            None => xades_keys::x509::now()?,
        };
        Ok(Self {
            params,
            store,
            at,
            visited: HashSet::new(),
            evidence: Evidence::default(),
        })
    }

    /// Evidence for the chain of `leaf`, then for the chain of each
    /// time-stamp signer, which is itself listed like a chain certificate.
    pub fn collect(mut self, leaf: &X509Cert, stamp_signers: &[X509Cert]) -> Result<Evidence, Error> {
        self.check_chain(leaf)?;
        for tsa in stamp_signers.iter().filter(|tsa| *tsa != leaf) {
            debug!(tsa = %tsa.subject_name(), "collecting evidence for time-stamp signer");
            self.evidence.add_certificate(tsa);
            self.check_chain(tsa)?;
        }
        Ok(self.evidence)
    }

    fn check_chain(&mut self, leaf: &X509Cert) -> Result<(), Error> {
        let chain = self.store.chain_for(leaf);
        if !chain.last().is_some_and(X509Cert::is_self_signed) {
            return Err(Error::IncompleteEvidenceChain(format!(
                "no trust anchor reachable from {}",
                leaf.subject_name()
            )));
        }
        for cert in &chain[1..] {
            self.evidence.add_certificate(cert);
        }
        for pair in chain.windows(2) {
            self.check(&pair[0], &pair[1])?;
        }
        Ok(())
    }

    fn check(&mut self, cert: &X509Cert, issuer: &X509Cert) -> Result<(), Error> {
        if !self.visited.insert(cert.der().to_vec()) {
            return Ok(());
        }
        let subject = cert.subject_name();
        match crl_status(cert, issuer, self.store.crls(), &self.at) {
            Some((crl, CrlStatus::Good)) => {
                debug!(%subject, crl_issuer = %crl.issuer_name(), "CRL status good");
                let crl = crl.clone();
                self.evidence.add_crl(&crl);
                return Ok(());
            }
            Some((_, CrlStatus::Revoked { at })) => {
                return Err(Error::CertificateRevoked(format!("{subject} revoked at {at}")));
            }
            None => warn!(%subject, "no current CRL, trying OCSP"),
        }

        let Some(client) = self.params.ocsp.clone() else {
            return Err(Error::RevocationCheckFailed(format!(
                "no CRL for {subject} and no OCSP client configured"
            )));
        };
        let mut urls = cert.ocsp_urls();
        for server in &self.params.ocsp_servers {
            if !urls.contains(server) {
                urls.push(server.clone());
            }
        }
        for url in &urls {
            match client.query_status(cert, issuer, url) {
                Ok(response) => match response.status {
                    CertStatus::Good => {
                        debug!(%subject, %url, "OCSP status good");
                        self.accept_responder(&response, issuer)?;
                        self.evidence.ocsp.push(response);
                        return Ok(());
                    }
                    CertStatus::Revoked => {
                        return Err(Error::CertificateRevoked(format!("{subject} revoked per {url}")));
                    }
                    CertStatus::Unknown => warn!(%subject, %url, "OCSP status unknown"),
                },
                Err(e) => warn!(%subject, %url, error = %e, "OCSP query failed"),
            }
        }
        Err(Error::RevocationCheckFailed(format!(
            "no CRL or OCSP response for {subject}"
        )))
    }

    /// A delegated responder's own chain becomes part of the evidence.
    fn accept_responder(&mut self, response: &OcspResponse, issuer: &X509Cert) -> Result<(), Error> {
        let Some(first) = response.responder_certificates.first() else {
            return Ok(());
        };
        let responder = X509Cert::from_der(first)?;
        if responder == *issuer {
            return Ok(());
        }
        for der in &response.responder_certificates {
            self.store.add_cert_der(der)?;
        }
        self.evidence.add_certificate(&responder);
        self.check_chain(&responder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use std::sync::Arc;

    fn known() -> (X509Cert, Vec<X509Cert>) {
        (
            X509Cert::from_der(SIGNER_CERT).unwrap(),
            vec![
                X509Cert::from_der(INTER_CERT).unwrap(),
                X509Cert::from_der(ROOT_CERT).unwrap(),
            ],
        )
    }

    #[test]
    fn test_crls_cover_the_chain() {
        let params = upgrade_params();
        let (leaf, pool) = known();
        let evidence = RevocationCollector::new(&params, pool).unwrap().collect(&leaf, &[]).unwrap();
        assert_eq!(evidence.certificates.len(), 2);
        assert_eq!(evidence.crls.len(), 2);
        assert!(evidence.ocsp.is_empty());
    }

    #[test]
    fn test_revoked_by_crl() {
        let params = UpgradeParameters::new(Arc::new(FakeTsa::new()))
            .with_crl(ROOT_CRL.to_vec())
            .with_crl(INTER_CRL_REVOKED.to_vec())
            .with_validation_time(test_time());
        let (leaf, pool) = known();
        let err = RevocationCollector::new(&params, pool).unwrap().collect(&leaf, &[]).unwrap_err();
        assert!(matches!(err, Error::CertificateRevoked(_)));
    }

    #[test]
    fn test_ocsp_fallback_checks_responder_chain() {
        let ocsp = Arc::new(FakeOcsp::new(CertStatus::Good));
        let params = UpgradeParameters::new(Arc::new(FakeTsa::new()))
            .with_crl(ROOT_CRL.to_vec())
            .with_ocsp(ocsp.clone())
            .with_validation_time(test_time());
        let (leaf, pool) = known();
        let evidence = RevocationCollector::new(&params, pool).unwrap().collect(&leaf, &[]).unwrap();

        assert_eq!(*ocsp.urls.lock().unwrap(), ["http://ocsp.example.test/"]);
        assert_eq!(evidence.ocsp.len(), 1);
        let responder = X509Cert::from_der(OCSP_CERT).unwrap();
        assert!(evidence.certificates.contains(&responder));
        assert_eq!(evidence.crls.len(), 1);
    }

    #[test]
    fn test_ocsp_revoked() {
        let params = UpgradeParameters::new(Arc::new(FakeTsa::new()))
            .with_crl(ROOT_CRL.to_vec())
            .with_ocsp(Arc::new(FakeOcsp::new(CertStatus::Revoked)))
            .with_validation_time(test_time());
        let (leaf, pool) = known();
        let err = RevocationCollector::new(&params, pool).unwrap().collect(&leaf, &[]).unwrap_err();
        assert!(matches!(err, Error::CertificateRevoked(_)));
    }

    #[test]
    fn test_no_source_fails() {
        let params = UpgradeParameters::new(Arc::new(FakeTsa::new()))
            .with_crl(ROOT_CRL.to_vec())
            .with_ocsp(Arc::new(UnreachableOcsp))
            .with_ocsp_server("http://fallback.example.test/")
            .with_validation_time(test_time());
        let (leaf, pool) = known();
        let err = RevocationCollector::new(&params, pool).unwrap().collect(&leaf, &[]).unwrap_err();
        assert!(matches!(err, Error::RevocationCheckFailed(_)));
    }

    #[test]
    fn test_missing_anchor() {
        let params = upgrade_params();
        let leaf = X509Cert::from_der(SIGNER_CERT).unwrap();
        let err = RevocationCollector::new(&params, Vec::new()).unwrap().collect(&leaf, &[]).unwrap_err();
        assert!(matches!(err, Error::IncompleteEvidenceChain(_)));
    }

    #[test]
    fn test_time_stamp_signer_is_checked_and_listed() {
        let params = upgrade_params();
        let (leaf, mut pool) = known();
        let tsa = X509Cert::from_der(TSA_CERT).unwrap();
        pool.push(tsa.clone());
        let evidence = RevocationCollector::new(&params, pool)
            .unwrap()
            .collect(&leaf, std::slice::from_ref(&tsa))
            .unwrap();
        assert_eq!(evidence.certificates.len(), 3);
        assert!(evidence.certificates.contains(&tsa));
        // The root CRL covers both the intermediate and the TSA.
        assert_eq!(evidence.crls.len(), 2);
    }
}
