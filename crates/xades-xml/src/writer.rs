#![forbid(unsafe_code)]

//! XML fragment writer used to build signature templates and properties.
//!
//! Elements are always written with an explicit end tag unless
//! [`XmlWriter::empty_element`] is used, so later splices can append
//! children without rewriting the start tag.

/// A small string-backed XML writer.
#[derive(Debug, Default)]
pub struct XmlWriter {
    buf: String,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the XML declaration.
    pub fn write_declaration(&mut self) {
        self.buf
            .push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    }

    /// Start an element with the given name and attributes.
    pub fn start_element(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.open(name, attrs);
        self.buf.push('>');
    }

    /// Write an empty element (self-closing).
    pub fn empty_element(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.open(name, attrs);
        self.buf.push_str("/>");
    }

    /// End the current element.
    pub fn end_element(&mut self, name: &str) {
        self.buf.push_str("</");
        self.buf.push_str(name);
        self.buf.push('>');
    }

    /// Write escaped text content.
    pub fn write_text(&mut self, text: &str) {
        for ch in text.chars() {
            match ch {
                '&' => self.buf.push_str("&amp;"),
                '<' => self.buf.push_str("&lt;"),
                '>' => self.buf.push_str("&gt;"),
                '\r' => self.buf.push_str("&#xD;"),
                _ => self.buf.push(ch),
            }
        }
    }

    /// Write markup verbatim.
    pub fn write_raw(&mut self, markup: &str) {
        self.buf.push_str(markup);
    }

    /// `<name attrs>text</name>`, with `text` escaped.
    pub fn text_element(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) {
        self.start_element(name, attrs);
        self.write_text(text);
        self.end_element(name);
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish writing and return the XML as a string.
    pub fn into_string(self) -> String {
        self.buf
    }

    fn open(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.buf.push('<');
        self.buf.push_str(name);
        for (key, value) in attrs {
            self.buf.push(' ');
            self.buf.push_str(key);
            self.buf.push_str("=\"");
            self.buf.push_str(&escape_attr(value));
            self.buf.push('"');
        }
    }
}

/// Escape an attribute value for a double-quoted attribute.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_output() {
        let mut w = XmlWriter::new();
        w.start_element("ds:Reference", &[("URI", "#a&b"), ("Id", "r\"1")]);
        w.empty_element("ds:DigestMethod", &[("Algorithm", "urn:sha")]);
        w.text_element("ds:DigestValue", &[], "x<y");
        w.end_element("ds:Reference");
        assert_eq!(
            w.into_string(),
            "<ds:Reference URI=\"#a&amp;b\" Id=\"r&quot;1\"><ds:DigestMethod Algorithm=\"urn:sha\"/>\
             <ds:DigestValue>x&lt;y</ds:DigestValue></ds:Reference>"
        );
    }
}
