#![forbid(unsafe_code)]

//! Element Id generation.

use uuid::Uuid;

/// A random version 4 UUID in its hyphenated lower-case form.
pub fn uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Ids of one new signature. `Signature` and `SignatureValue` share a uuid.
#[derive(Debug, Clone)]
pub struct SignatureIds {
    pub signature: String,
    pub signed_info: String,
    pub signature_value: String,
    pub key_info: String,
    pub key_info_reference: String,
    pub xades_object: String,
    pub qualifying_properties: String,
    pub signed_properties: String,
}

impl SignatureIds {
    pub fn generate() -> Self {
        let id = uuid();
        let signature = format!("Signature-{id}");
        Self {
            signed_info: format!("SignedInfo-{id}"),
            signature_value: format!("SignatureValue-{id}"),
            key_info: format!("KeyInfoId-{signature}"),
            key_info_reference: format!("ReferenceKeyInfo-{signature}"),
            xades_object: format!("XadesObjectId-{}", uuid()),
            qualifying_properties: format!("QualifyingProperties-{}", uuid()),
            signed_properties: format!("SignedProperties-{signature}"),
            signature,
        }
    }
}

pub fn reference() -> String {
    format!("Reference-{}", uuid())
}

pub fn data_object() -> String {
    format!("DataObject-{}", uuid())
}

pub fn content() -> String {
    format!("CONTENT-{}", uuid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_shape() {
        let id = uuid();
        let groups: Vec<&str> = id.split('-').collect();
        assert_eq!(groups.iter().map(|g| g.len()).collect::<Vec<_>>(), [8, 4, 4, 4, 12]);
        assert!(groups[2].starts_with('4'));
        assert!(matches!(groups[3].as_bytes()[0], b'8' | b'9' | b'a' | b'b'));
        assert_ne!(uuid(), id);
    }

    #[test]
    fn test_signature_ids_share_uuid() {
        let ids = SignatureIds::generate();
        let uuid = ids.signature.strip_prefix("Signature-").unwrap();
        assert_eq!(ids.signature_value, format!("SignatureValue-{uuid}"));
        assert_eq!(ids.key_info, format!("KeyInfoId-{}", ids.signature));
        assert_eq!(ids.signed_properties, format!("SignedProperties-{}", ids.signature));
    }
}
