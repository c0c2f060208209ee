#![forbid(unsafe_code)]

//! Key types and data structures.

use xades_crypto::SigningKey;

/// Usage flags for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    Sign,
    Verify,
    Any,
}

/// The underlying key data.
#[derive(Clone)]
pub enum KeyData {
    Rsa {
        private: Option<rsa::RsaPrivateKey>,
        public: rsa::RsaPublicKey,
    },
    EcP256 {
        private: Option<p256::ecdsa::SigningKey>,
        public: p256::ecdsa::VerifyingKey,
    },
    EcP384 {
        private: Option<p384::ecdsa::SigningKey>,
        public: p384::ecdsa::VerifyingKey,
    },
}

impl std::fmt::Debug for KeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (kind, private) = match self {
            Self::Rsa { private, .. } => ("RSA", private.is_some()),
            Self::EcP256 { private, .. } => ("EC P-256", private.is_some()),
            Self::EcP384 { private, .. } => ("EC P-384", private.is_some()),
        };
        if private {
            write!(f, "{kind} private+public key")
        } else {
            write!(f, "{kind} public key")
        }
    }
}

/// A key with its intended usage and any certificates that came with it.
#[derive(Debug, Clone)]
pub struct Key {
    pub data: KeyData,
    pub usage: KeyUsage,
    /// X.509 certificates (DER), leaf first.
    pub x509_chain: Vec<Vec<u8>>,
}

impl Key {
    pub fn new(data: KeyData, usage: KeyUsage) -> Self {
        Self {
            data,
            usage,
            x509_chain: Vec::new(),
        }
    }

    /// Convert to a `SigningKey` for use with crypto algorithms. The private
    /// half is used when present.
    pub fn to_signing_key(&self) -> SigningKey {
        match &self.data {
            KeyData::Rsa { private: Some(pk), .. } => SigningKey::Rsa(pk.clone()),
            KeyData::Rsa { public, .. } => SigningKey::RsaPublic(public.clone()),
            KeyData::EcP256 { private: Some(sk), .. } => SigningKey::EcP256(sk.clone()),
            KeyData::EcP256 { public, .. } => SigningKey::EcP256Public(*public),
            KeyData::EcP384 { private: Some(sk), .. } => SigningKey::EcP384(sk.clone()),
            KeyData::EcP384 { public, .. } => SigningKey::EcP384Public(*public),
        }
    }

    /// The public half only.
    pub fn to_verifying_key(&self) -> SigningKey {
        match &self.data {
            KeyData::Rsa { public, .. } => SigningKey::RsaPublic(public.clone()),
            KeyData::EcP256 { public, .. } => SigningKey::EcP256Public(*public),
            KeyData::EcP384 { public, .. } => SigningKey::EcP384Public(*public),
        }
    }

    pub fn rsa_public_key(&self) -> Option<&rsa::RsaPublicKey> {
        match &self.data {
            KeyData::Rsa { public, .. } => Some(public),
            _ => None,
        }
    }
}
