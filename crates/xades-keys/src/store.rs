#![forbid(unsafe_code)]

//! Certificate and CRL pool used to walk chains and look up revocation data.

use crate::x509::{build_chain, Crl, X509Cert};
use xades_core::Error;

/// Collects certificates and CRLs from every source a signature operation
/// knows about: the signer, caller-supplied extras and the document itself.
#[derive(Debug, Clone, Default)]
pub struct CertStore {
    certs: Vec<X509Cert>,
    crls: Vec<Crl>,
}

impl CertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a certificate unless an identical one is present.
    pub fn add_cert(&mut self, cert: X509Cert) {
        if !self.certs.contains(&cert) {
            self.certs.push(cert);
        }
    }

    pub fn add_cert_der(&mut self, der: &[u8]) -> Result<(), Error> {
        self.add_cert(X509Cert::from_der(der)?);
        Ok(())
    }

    pub fn add_crl_der(&mut self, der: &[u8]) -> Result<(), Error> {
        let crl = Crl::from_der(der)?;
        if !self.crls.iter().any(|c| c.der() == crl.der()) {
            self.crls.push(crl);
        }
        Ok(())
    }

    pub fn certs(&self) -> &[X509Cert] {
        &self.certs
    }

    pub fn crls(&self) -> &[Crl] {
        &self.crls
    }

    /// Chain from `leaf` towards a root through the pooled certificates.
    pub fn chain_for(&self, leaf: &X509Cert) -> Vec<X509Cert> {
        build_chain(leaf, &self.certs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &[u8] = include_bytes!("../../xades/testdata/root.der");
    const INTER: &[u8] = include_bytes!("../../xades/testdata/inter.der");
    const SIGNER: &[u8] = include_bytes!("../../xades/testdata/signer.der");

    #[test]
    fn test_dedup_and_lookup() {
        let mut store = CertStore::new();
        for der in [ROOT, INTER, INTER, SIGNER] {
            store.add_cert_der(der).unwrap();
        }
        assert_eq!(store.certs().len(), 3);

        let signer = X509Cert::from_der(SIGNER).unwrap();
        let chain = store.chain_for(&signer);
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[1].der(), INTER);
    }

    #[test]
    fn test_bad_der() {
        let mut store = CertStore::new();
        assert!(matches!(store.add_cert_der(b"not a cert"), Err(Error::Certificate(_))));
        assert!(matches!(store.add_crl_der(b"\x30\x00"), Err(Error::Certificate(_))));
    }
}
