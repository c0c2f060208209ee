#![forbid(unsafe_code)]

//! Transform pipeline and trait definitions.

use xades_c14n::C14nMode;
use xades_core::Error;
use xades_xml::NodeSet;

/// Data flowing through the transform pipeline.
///
/// Node sets hold node ids of `xml_text` as parsed by [`xades_xml::parse`];
/// parsing is deterministic, so every transform re-parsing the same text
/// sees the same ids.
#[derive(Debug, Clone)]
pub enum TransformData {
    /// XML node set (for XML-aware transforms like C14N).
    Xml {
        xml_text: String,
        node_set: Option<NodeSet>,
    },
    /// Raw binary data.
    Binary(Vec<u8>),
}

impl TransformData {
    /// Convert to binary, canonicalizing a node set with inclusive C14N.
    pub fn to_binary(&self) -> Result<Vec<u8>, Error> {
        match self {
            TransformData::Binary(data) => Ok(data.clone()),
            TransformData::Xml { xml_text, node_set } => {
                xades_c14n::canonicalize(xml_text, C14nMode::Inclusive, node_set.as_ref())
            }
        }
    }

    pub fn into_binary(self) -> Result<Vec<u8>, Error> {
        match self {
            TransformData::Binary(data) => Ok(data),
            xml => xml.to_binary(),
        }
    }
}

/// Trait for individual transforms.
pub trait Transform: Send {
    /// The algorithm URI for this transform.
    fn uri(&self) -> &str;

    /// Execute the transform on the given data.
    fn execute(&self, input: TransformData) -> Result<TransformData, Error>;
}

/// A pipeline of transforms executed in sequence.
#[derive(Default)]
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Execute all transforms in order.
    pub fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let mut data = input;
        for transform in &self.transforms {
            tracing::trace!(transform = transform.uri(), "applying transform");
            data = transform.execute(data)?;
        }
        Ok(data)
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn uris(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.uri()).collect()
    }
}

// ── C14N Transform ───────────────────────────────────────────────────

/// A canonicalization transform.
pub struct C14nTransform {
    mode: C14nMode,
}

impl C14nTransform {
    pub fn new(mode: C14nMode) -> Self {
        Self { mode }
    }
}

impl Transform for C14nTransform {
    fn uri(&self) -> &str {
        self.mode.uri()
    }

    fn execute(&self, input: TransformData) -> Result<TransformData, Error> {
        let bytes = match input {
            TransformData::Xml { xml_text, node_set } => {
                xades_c14n::canonicalize(&xml_text, self.mode, node_set.as_ref())?
            }
            TransformData::Binary(data) => {
                let text = std::str::from_utf8(&data)
                    .map_err(|e| Error::Transform(format!("invalid UTF-8: {e}")))?;
                xades_c14n::canonicalize(text, self.mode, None)?
            }
        };
        Ok(TransformData::Binary(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c14n_over_binary_and_xml() {
        let xml = "<a  b='1'><c/></a>";
        let t = C14nTransform::new(C14nMode::Inclusive);
        let from_bin = t.execute(TransformData::Binary(xml.as_bytes().to_vec())).unwrap();
        let from_xml = t
            .execute(TransformData::Xml {
                xml_text: xml.to_owned(),
                node_set: None,
            })
            .unwrap();
        assert_eq!(from_bin.into_binary().unwrap(), b"<a b=\"1\"><c></c></a>");
        assert_eq!(from_xml.into_binary().unwrap(), b"<a b=\"1\"><c></c></a>");
    }

    #[test]
    fn test_empty_pipeline_canonicalizes() {
        let pipeline = TransformPipeline::new();
        assert!(pipeline.is_empty());
        let out = pipeline
            .execute(TransformData::Xml {
                xml_text: "<a><!--x--></a>".into(),
                node_set: None,
            })
            .unwrap();
        assert_eq!(out.to_binary().unwrap(), b"<a></a>");
    }

    #[test]
    fn test_invalid_utf8() {
        let t = C14nTransform::new(C14nMode::Inclusive);
        assert!(matches!(
            t.execute(TransformData::Binary(vec![0xff, 0xfe])),
            Err(Error::Transform(_))
        ));
    }
}
