#![forbid(unsafe_code)]

//! Key and certificate loading from PEM and DER.

use crate::key::{Key, KeyData, KeyUsage};
use xades_core::Error;

/// Load a private key from PEM data (PKCS#8 RSA/P-256/P-384, or PKCS#1 RSA).
pub fn load_private_key_pem(pem_data: &[u8]) -> Result<Key, Error> {
    let pem_str = std::str::from_utf8(pem_data)
        .map_err(|e| Error::Key(format!("invalid PEM encoding: {e}")))?;
    let (label, der_bytes) = der::pem::decode_vec(pem_str.trim().as_bytes())
        .map_err(|e| Error::Key(format!("failed to decode PEM: {e}")))?;
    match label {
        "PRIVATE KEY" => load_private_key_der(&der_bytes),
        "RSA PRIVATE KEY" => load_rsa_pkcs1_der(&der_bytes),
        _ => Err(Error::Key(format!("unsupported PEM label: {label}"))),
    }
}

/// Load a private key from PKCS#8 DER, trying RSA, then EC P-256 and P-384.
pub fn load_private_key_der(der: &[u8]) -> Result<Key, Error> {
    use pkcs8::DecodePrivateKey;

    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_der(der) {
        let public = pk.to_public_key();
        return Ok(Key::new(
            KeyData::Rsa {
                private: Some(pk),
                public,
            },
            KeyUsage::Any,
        ));
    }
    if let Ok(sk) = p256::ecdsa::SigningKey::from_pkcs8_der(der) {
        let public = *sk.verifying_key();
        return Ok(Key::new(
            KeyData::EcP256 {
                private: Some(sk),
                public,
            },
            KeyUsage::Any,
        ));
    }
    if let Ok(sk) = p384::ecdsa::SigningKey::from_pkcs8_der(der) {
        let public = *sk.verifying_key();
        return Ok(Key::new(
            KeyData::EcP384 {
                private: Some(sk),
                public,
            },
            KeyUsage::Any,
        ));
    }
    // Some tools emit PKCS#1 RSA keys without the PEM label saying so.
    load_rsa_pkcs1_der(der)
        .map_err(|_| Error::Key("unsupported private key algorithm in PKCS#8".into()))
}

fn load_rsa_pkcs1_der(der: &[u8]) -> Result<Key, Error> {
    use pkcs1::DecodeRsaPrivateKey;
    let pk = rsa::RsaPrivateKey::from_pkcs1_der(der)
        .map_err(|e| Error::Key(format!("failed to parse RSA private key: {e}")))?;
    let public = pk.to_public_key();
    Ok(Key::new(
        KeyData::Rsa {
            private: Some(pk),
            public,
        },
        KeyUsage::Any,
    ))
}

/// Load a public key from raw SubjectPublicKeyInfo DER bytes.
pub fn load_spki_der(spki_der: &[u8]) -> Result<Key, Error> {
    use spki::DecodePublicKey;

    if let Ok(pk) = rsa::RsaPublicKey::from_public_key_der(spki_der) {
        return Ok(Key::new(
            KeyData::Rsa {
                private: None,
                public: pk,
            },
            KeyUsage::Verify,
        ));
    }
    if let Ok(vk) = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
        return Ok(Key::new(
            KeyData::EcP256 {
                private: None,
                public: vk,
            },
            KeyUsage::Verify,
        ));
    }
    if let Ok(vk) = p384::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
        return Ok(Key::new(
            KeyData::EcP384 {
                private: None,
                public: vk,
            },
            KeyUsage::Verify,
        ));
    }
    Err(Error::Key("unsupported public key algorithm".into()))
}

/// Load the public key of a DER-encoded X.509 certificate. The certificate
/// itself becomes the key's chain.
pub fn load_x509_cert_der(data: &[u8]) -> Result<Key, Error> {
    use der::{Decode, Encode};
    use x509_cert::Certificate;

    let cert = Certificate::from_der(data)
        .map_err(|e| Error::Certificate(format!("failed to parse X.509 certificate: {e}")))?;
    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode SPKI: {e}")))?;
    let mut key = load_spki_der(&spki_der)?;
    key.x509_chain = vec![data.to_vec()];
    Ok(key)
}

/// Decode every `CERTIFICATE` block of a PEM bundle to DER.
pub fn load_certs_pem(pem_data: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
    let text = std::str::from_utf8(pem_data)
        .map_err(|e| Error::Certificate(format!("invalid PEM encoding: {e}")))?;
    const END: &str = "-----END CERTIFICATE-----";
    let mut certs = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("-----BEGIN CERTIFICATE-----") {
        let Some(end) = rest[start..].find(END).map(|e| start + e + END.len()) else {
            return Err(Error::Certificate("unterminated CERTIFICATE block".into()));
        };
        let (_, der_bytes) = der::pem::decode_vec(rest[start..end].as_bytes())
            .map_err(|e| Error::Certificate(format!("failed to decode certificate PEM: {e}")))?;
        certs.push(der_bytes);
        rest = &rest[end..];
    }
    Ok(certs)
}
