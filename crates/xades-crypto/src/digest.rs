#![forbid(unsafe_code)]

//! Digest (hash) algorithm implementations.

use crate::registry::AlgorithmRegistry;
use digest::Digest;
use xades_core::{algorithm, Error};

/// Trait for digest algorithms.
pub trait DigestAlgorithm: Send {
    /// Feed data into the hash.
    fn update(&mut self, data: &[u8]);
    /// Finalize and return the hash value.
    fn finalize(self: Box<Self>) -> Vec<u8>;
    /// Algorithm URI.
    fn uri(&self) -> &str;
}

/// Create a digest algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn DigestAlgorithm>, Error> {
    AlgorithmRegistry::digest(uri)
}

/// Compute a digest in one shot.
pub fn digest(uri: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut hasher = from_uri(uri)?;
    hasher.update(data);
    Ok(hasher.finalize())
}

/// The digests every registry starts with: `(uri, oid, constructor)`.
pub(crate) fn builtin() -> [(&'static str, &'static str, fn() -> Box<dyn DigestAlgorithm>); 5] {
    [
        (algorithm::SHA1, algorithm::SHA1_OID, Sha1Digest::boxed),
        (algorithm::SHA224, algorithm::SHA224_OID, Sha224Digest::boxed),
        (algorithm::SHA256, algorithm::SHA256_OID, Sha256Digest::boxed),
        (algorithm::SHA384, algorithm::SHA384_OID, Sha384Digest::boxed),
        (algorithm::SHA512, algorithm::SHA512_OID, Sha512Digest::boxed),
    ]
}

// ── Concrete implementations ─────────────────────────────────────────

macro_rules! impl_digest {
    ($name:ident, $hasher:ty, $uri:expr) => {
        struct $name {
            inner: $hasher,
        }

        impl $name {
            fn new() -> Self {
                Self {
                    inner: <$hasher>::new(),
                }
            }

            fn boxed() -> Box<dyn DigestAlgorithm> {
                Box::new(Self::new())
            }
        }

        impl DigestAlgorithm for $name {
            fn update(&mut self, data: &[u8]) {
                Digest::update(&mut self.inner, data);
            }

            fn finalize(self: Box<Self>) -> Vec<u8> {
                Digest::finalize(self.inner).to_vec()
            }

            fn uri(&self) -> &str {
                $uri
            }
        }
    };
}

impl_digest!(Sha1Digest, sha1::Sha1, algorithm::SHA1);
impl_digest!(Sha224Digest, sha2::Sha224, algorithm::SHA224);
impl_digest!(Sha256Digest, sha2::Sha256, algorithm::SHA256);
impl_digest!(Sha384Digest, sha2::Sha384, algorithm::SHA384);
impl_digest!(Sha512Digest, sha2::Sha512, algorithm::SHA512);
