#![forbid(unsafe_code)]

//! Base64 decode transform.

use crate::pipeline::{Transform, TransformData};
use xades_core::{algorithm, Error};

/// Decodes base64 input. A node set contributes the string value of its
/// text nodes.
pub struct Base64DecodeTransform;

impl Transform for Base64DecodeTransform {
    fn uri(&self) -> &str {
        algorithm::BASE64
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        use base64::Engine;

        let text = match input {
            TransformData::Binary(data) => String::from_utf8(data)
                .map_err(|e| Error::Transform(format!("base64 input not UTF-8: {e}")))?,
            TransformData::Xml { xml_text, node_set } => {
                let doc = xades_xml::parse(&xml_text)?;
                doc.descendants()
                    .filter(|n| n.is_text())
                    .filter(|n| node_set.as_ref().map_or(true, |set| set.contains(n)))
                    .filter_map(|n| n.text())
                    .collect()
            }
        };

        let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&cleaned)
            .map_err(|e| Error::Base64(format!("decode error: {e}")))?;
        Ok(TransformData::Binary(decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_element_text() {
        let out = Base64DecodeTransform
            .execute(TransformData::Xml {
                xml_text: "<CONTENT Encoding=\"x\">aGVs\n  bG8=</CONTENT>".into(),
                node_set: None,
            })
            .unwrap();
        assert_eq!(out.into_binary().unwrap(), b"hello");
    }

    #[test]
    fn test_bad_input() {
        let err = Base64DecodeTransform
            .execute(TransformData::Binary(b"***".to_vec()))
            .unwrap_err();
        assert!(matches!(err, Error::Base64(_)));
    }
}
