#![forbid(unsafe_code)]

//! Signature algorithm implementations (RSA PKCS#1 v1.5, ECDSA).

use crate::registry::AlgorithmRegistry;
use signature::SignatureEncoding;
use xades_core::{algorithm, Error};

/// Key material for signature operations.
#[derive(Clone)]
pub enum SigningKey {
    Rsa(rsa::RsaPrivateKey),
    RsaPublic(rsa::RsaPublicKey),
    EcP256(p256::ecdsa::SigningKey),
    EcP256Public(p256::ecdsa::VerifyingKey),
    EcP384(p384::ecdsa::SigningKey),
    EcP384Public(p384::ecdsa::VerifyingKey),
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Rsa(_) => "Rsa",
            Self::RsaPublic(_) => "RsaPublic",
            Self::EcP256(_) => "EcP256",
            Self::EcP256Public(_) => "EcP256Public",
            Self::EcP384(_) => "EcP384",
            Self::EcP384Public(_) => "EcP384Public",
        };
        f.debug_tuple("SigningKey").field(&kind).finish()
    }
}

impl SigningKey {
    /// Whether this key can produce signatures.
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Rsa(_) | Self::EcP256(_) | Self::EcP384(_))
    }
}

/// Trait for signature algorithms.
pub trait SignatureAlgorithm: Send {
    fn uri(&self) -> &str;
    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error>;
    fn verify(&self, key: &SigningKey, data: &[u8], signature: &[u8]) -> Result<bool, Error>;
}

/// Create a signature algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
    AlgorithmRegistry::signature(uri)
}

/// The signature algorithms every registry starts with.
pub(crate) fn builtin() -> [(&'static str, fn() -> Box<dyn SignatureAlgorithm>); 6] {
    [
        (algorithm::RSA_SHA1, || rsa_pkcs1v15(algorithm::RSA_SHA1, HashType::Sha1)),
        (algorithm::RSA_SHA256, || rsa_pkcs1v15(algorithm::RSA_SHA256, HashType::Sha256)),
        (algorithm::RSA_SHA384, || rsa_pkcs1v15(algorithm::RSA_SHA384, HashType::Sha384)),
        (algorithm::RSA_SHA512, || rsa_pkcs1v15(algorithm::RSA_SHA512, HashType::Sha512)),
        (algorithm::ECDSA_SHA256, ecdsa_p256),
        (algorithm::ECDSA_SHA384, ecdsa_p384),
    ]
}

fn rsa_pkcs1v15(uri: &'static str, hash: HashType) -> Box<dyn SignatureAlgorithm> {
    Box::new(RsaPkcs1v15 { uri, hash })
}

fn ecdsa_p256() -> Box<dyn SignatureAlgorithm> {
    Box::new(EcdsaP256)
}

fn ecdsa_p384() -> Box<dyn SignatureAlgorithm> {
    Box::new(EcdsaP384)
}

#[derive(Debug, Clone, Copy)]
enum HashType {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

// ── RSA PKCS#1 v1.5 ─────────────────────────────────────────────────

struct RsaPkcs1v15 {
    uri: &'static str,
    hash: HashType,
}

impl RsaPkcs1v15 {
    fn sign_with_key(&self, private_key: &rsa::RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        macro_rules! do_sign {
            ($hasher:ty) => {{
                let sk = rsa::pkcs1v15::SigningKey::<$hasher>::new(private_key.clone());
                sk.try_sign(data)
                    .map(|sig| sig.to_vec())
                    .map_err(|e| Error::Crypto(format!("RSA signing failed: {e}")))
            }};
        }
        match self.hash {
            HashType::Sha1 => do_sign!(sha1::Sha1),
            HashType::Sha256 => do_sign!(sha2::Sha256),
            HashType::Sha384 => do_sign!(sha2::Sha384),
            HashType::Sha512 => do_sign!(sha2::Sha512),
        }
    }

    fn verify_with_key(&self, public_key: &rsa::RsaPublicKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use signature::Verifier;
        let sig = rsa::pkcs1v15::Signature::try_from(sig_bytes)
            .map_err(|e| Error::Crypto(format!("invalid RSA signature: {e}")))?;
        macro_rules! do_verify {
            ($hasher:ty) => {{
                let vk = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public_key.clone());
                Ok(vk.verify(data, &sig).is_ok())
            }};
        }
        match self.hash {
            HashType::Sha1 => do_verify!(sha1::Sha1),
            HashType::Sha256 => do_verify!(sha2::Sha256),
            HashType::Sha384 => do_verify!(sha2::Sha384),
            HashType::Sha512 => do_verify!(sha2::Sha512),
        }
    }
}

impl SignatureAlgorithm for RsaPkcs1v15 {
    fn uri(&self) -> &str {
        self.uri
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        match key {
            SigningKey::Rsa(pk) => self.sign_with_key(pk, data),
            _ => Err(Error::Key("RSA private key required".into())),
        }
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let pubk = match key {
            SigningKey::Rsa(pk) => pk.to_public_key(),
            SigningKey::RsaPublic(pk) => pk.clone(),
            _ => return Err(Error::Key("RSA key required".into())),
        };
        self.verify_with_key(&pubk, data, sig_bytes)
    }
}

// ── ECDSA ────────────────────────────────────────────────────────────
//
// XMLDSIG carries ECDSA signatures as the raw r||s concatenation.

struct EcdsaP256;

fn xmldsig_to_p256(rs: &[u8]) -> Result<p256::ecdsa::Signature, Error> {
    p256::ecdsa::Signature::from_slice(rs)
        .map_err(|e| Error::Crypto(format!("invalid P-256 signature ({} bytes): {e}", rs.len())))
}

impl SignatureAlgorithm for EcdsaP256 {
    fn uri(&self) -> &str {
        algorithm::ECDSA_SHA256
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        let SigningKey::EcP256(sk) = key else {
            return Err(Error::Key("P-256 signing key required".into()));
        };
        let sig: p256::ecdsa::Signature = sk
            .try_sign(data)
            .map_err(|e| Error::Crypto(format!("P-256 signing failed: {e}")))?;
        Ok(sig.to_bytes().to_vec())
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use signature::Verifier;
        let vk = match key {
            SigningKey::EcP256(sk) => *sk.verifying_key(),
            SigningKey::EcP256Public(vk) => *vk,
            _ => return Err(Error::Key("P-256 key required".into())),
        };
        let sig = xmldsig_to_p256(sig_bytes)?;
        Ok(vk.verify(data, &sig).is_ok())
    }
}

struct EcdsaP384;

fn xmldsig_to_p384(rs: &[u8]) -> Result<p384::ecdsa::Signature, Error> {
    p384::ecdsa::Signature::from_slice(rs)
        .map_err(|e| Error::Crypto(format!("invalid P-384 signature ({} bytes): {e}", rs.len())))
}

impl SignatureAlgorithm for EcdsaP384 {
    fn uri(&self) -> &str {
        algorithm::ECDSA_SHA384
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        let SigningKey::EcP384(sk) = key else {
            return Err(Error::Key("P-384 signing key required".into()));
        };
        let sig: p384::ecdsa::Signature = sk
            .try_sign(data)
            .map_err(|e| Error::Crypto(format!("P-384 signing failed: {e}")))?;
        Ok(sig.to_bytes().to_vec())
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use signature::Verifier;
        let vk = match key {
            SigningKey::EcP384(sk) => *sk.verifying_key(),
            SigningKey::EcP384Public(vk) => *vk,
            _ => return Err(Error::Key("P-384 key required".into())),
        };
        let sig = xmldsig_to_p384(sig_bytes)?;
        Ok(vk.verify(data, &sig).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsa_key() -> rsa::RsaPrivateKey {
        let mut rng = rand::thread_rng();
        rsa::RsaPrivateKey::new(&mut rng, 1024).unwrap()
    }

    #[test]
    fn test_rsa_sign_verify() {
        let key = SigningKey::Rsa(rsa_key());
        for uri in [algorithm::RSA_SHA1, algorithm::RSA_SHA256, algorithm::RSA_SHA512] {
            let alg = from_uri(uri).unwrap();
            let sig = alg.sign(&key, b"message").unwrap();
            assert!(alg.verify(&key, b"message", &sig).unwrap(), "{uri}");
            assert!(!alg.verify(&key, b"massage", &sig).unwrap(), "{uri}");
        }
    }

    #[test]
    fn test_rsa_public_key_cannot_sign() {
        let public = SigningKey::RsaPublic(rsa_key().to_public_key());
        assert!(!public.is_private());
        let alg = from_uri(algorithm::RSA_SHA256).unwrap();
        assert!(matches!(alg.sign(&public, b"m"), Err(Error::Key(_))));
    }

    #[test]
    fn test_ecdsa_p256_sign_verify() {
        let sk = p256::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let public = SigningKey::EcP256Public(*sk.verifying_key());
        let alg = from_uri(algorithm::ECDSA_SHA256).unwrap();
        let sig = alg.sign(&SigningKey::EcP256(sk), b"message").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(alg.verify(&public, b"message", &sig).unwrap());
        assert!(alg.verify(&public, b"message", &sig[..63]).is_err());
    }

    #[test]
    fn test_key_mismatch() {
        let sk = p384::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let alg = from_uri(algorithm::RSA_SHA256).unwrap();
        assert!(matches!(
            alg.verify(&SigningKey::EcP384(sk), b"m", &[0u8; 96]),
            Err(Error::Key(_))
        ));
    }
}
