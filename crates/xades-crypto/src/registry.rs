#![forbid(unsafe_code)]

//! Algorithm registry mapping URIs (and digest OIDs) to factory functions.
//!
//! The registry is process-wide and starts with the built-in digests and
//! signature algorithms. Applications register further algorithms at
//! startup; lookups take a read lock, registration the write lock.

use crate::digest::DigestAlgorithm;
use crate::sign::SignatureAlgorithm;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use xades_core::Error;

/// Produces a fresh digest state.
pub type DigestFactory = Arc<dyn Fn() -> Box<dyn DigestAlgorithm> + Send + Sync>;
/// Produces a signature algorithm instance.
pub type SignatureFactory = Arc<dyn Fn() -> Box<dyn SignatureAlgorithm> + Send + Sync>;

struct DigestEntry {
    oid: Option<String>,
    factory: DigestFactory,
}

struct Tables {
    digests: HashMap<String, DigestEntry>,
    oids: HashMap<String, String>,
    signatures: HashMap<String, SignatureFactory>,
}

impl Tables {
    fn builtin() -> Self {
        let mut tables = Tables {
            digests: HashMap::new(),
            oids: HashMap::new(),
            signatures: HashMap::new(),
        };
        for (uri, oid, ctor) in crate::digest::builtin() {
            tables.add_digest(uri, Some(oid), Arc::new(ctor));
        }
        for (uri, ctor) in crate::sign::builtin() {
            tables.signatures.insert(uri.to_owned(), Arc::new(ctor));
        }
        tables
    }

    fn add_digest(&mut self, uri: &str, oid: Option<&str>, factory: DigestFactory) {
        if let Some(oid) = oid {
            self.oids.insert(oid.to_owned(), uri.to_owned());
        }
        self.digests.insert(
            uri.to_owned(),
            DigestEntry {
                oid: oid.map(str::to_owned),
                factory,
            },
        );
    }
}

static TABLES: OnceLock<RwLock<Tables>> = OnceLock::new();

fn tables() -> &'static RwLock<Tables> {
    TABLES.get_or_init(|| RwLock::new(Tables::builtin()))
}

// A panicking registrant cannot leave the maps half-updated, so a poisoned
// lock still guards consistent tables.
fn read() -> RwLockReadGuard<'static, Tables> {
    tables().read().unwrap_or_else(PoisonError::into_inner)
}

fn write() -> RwLockWriteGuard<'static, Tables> {
    tables().write().unwrap_or_else(PoisonError::into_inner)
}

/// Central registry for all cryptographic algorithms.
pub struct AlgorithmRegistry;

impl AlgorithmRegistry {
    /// Register (or replace) a digest algorithm under `uri`, optionally also
    /// reachable by its ASN.1 `oid`.
    pub fn register_digest<F>(uri: &str, oid: Option<&str>, factory: F)
    where
        F: Fn() -> Box<dyn DigestAlgorithm> + Send + Sync + 'static,
    {
        tracing::debug!(uri, oid, "registering digest algorithm");
        write().add_digest(uri, oid, Arc::new(factory));
    }

    /// Register (or replace) a signature algorithm under `uri`.
    pub fn register_signature<F>(uri: &str, factory: F)
    where
        F: Fn() -> Box<dyn SignatureAlgorithm> + Send + Sync + 'static,
    {
        tracing::debug!(uri, "registering signature algorithm");
        write().signatures.insert(uri.to_owned(), Arc::new(factory));
    }

    /// Look up a digest algorithm by URI.
    pub fn digest(uri: &str) -> Result<Box<dyn DigestAlgorithm>, Error> {
        let factory = read()
            .digests
            .get(uri)
            .map(|entry| Arc::clone(&entry.factory))
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("digest algorithm: {uri}")))?;
        Ok(factory())
    }

    /// Look up a digest algorithm by its ASN.1 OID (dotted form).
    pub fn digest_by_oid(oid: &str) -> Result<Box<dyn DigestAlgorithm>, Error> {
        let uri = Self::digest_uri_for_oid(oid)
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("digest OID: {oid}")))?;
        Self::digest(&uri)
    }

    /// The OID registered for a digest URI.
    pub fn digest_oid(uri: &str) -> Result<String, Error> {
        read()
            .digests
            .get(uri)
            .and_then(|entry| entry.oid.clone())
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("no OID for digest algorithm: {uri}")))
    }

    /// The digest URI registered for an OID.
    pub fn digest_uri_for_oid(oid: &str) -> Option<String> {
        read().oids.get(oid).cloned()
    }

    /// Look up a signature algorithm by URI.
    pub fn signature(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
        let factory = read()
            .signatures
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("signature algorithm: {uri}")))?;
        Ok(factory())
    }

    pub fn is_digest_supported(uri: &str) -> bool {
        read().digests.contains_key(uri)
    }

    pub fn is_signature_supported(uri: &str) -> bool {
        read().signatures.contains_key(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xades_core::algorithm;

    struct XorDigest(u8);

    impl DigestAlgorithm for XorDigest {
        fn update(&mut self, data: &[u8]) {
            self.0 = data.iter().fold(self.0, |acc, b| acc ^ b);
        }
        fn finalize(self: Box<Self>) -> Vec<u8> {
            vec![self.0]
        }
        fn uri(&self) -> &str {
            "urn:test:xor"
        }
    }

    #[test]
    fn test_builtin_oids() {
        assert_eq!(AlgorithmRegistry::digest_oid(algorithm::SHA256).unwrap(), algorithm::SHA256_OID);
        assert_eq!(
            AlgorithmRegistry::digest_uri_for_oid(algorithm::SHA1_OID).as_deref(),
            Some(algorithm::SHA1)
        );
        let d = AlgorithmRegistry::digest_by_oid(algorithm::SHA512_OID).unwrap();
        assert_eq!(d.uri(), algorithm::SHA512);
    }

    #[test]
    fn test_runtime_registration() {
        assert!(!AlgorithmRegistry::is_digest_supported("urn:test:xor"));
        AlgorithmRegistry::register_digest("urn:test:xor", Some("1.2.3.4.5"), || {
            Box::new(XorDigest(0))
        });
        let out = crate::digest::digest("urn:test:xor", &[0b1010, 0b0110]).unwrap();
        assert_eq!(out, vec![0b1100]);
        assert_eq!(AlgorithmRegistry::digest_by_oid("1.2.3.4.5").unwrap().uri(), "urn:test:xor");
    }

    #[test]
    fn test_unknown_signature() {
        assert!(matches!(
            AlgorithmRegistry::signature("http://www.w3.org/2000/09/xmldsig#dsa-sha1"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
        assert!(AlgorithmRegistry::is_signature_supported(algorithm::RSA_SHA256));
    }
}
