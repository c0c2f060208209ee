#![forbid(unsafe_code)]

//! Text splicing against byte ranges of a parsed document.
//!
//! A [`Splice`] replaces one byte range of the source text. Ranges come from
//! `roxmltree::Node::range`, so every splice in a batch must be computed
//! against the same parse.

use std::ops::Range;
use xades_core::Error;

/// Replace `range` of the source text with `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice {
    pub range: Range<usize>,
    pub text: String,
}

impl Splice {
    pub fn new(range: Range<usize>, text: impl Into<String>) -> Self {
        Self {
            range,
            text: text.into(),
        }
    }

    /// Insert `fragment` as the last child of `element`.
    ///
    /// A self-closing element is rewritten into a start/end pair.
    pub fn append_child(
        source: &str,
        element: roxmltree::Node<'_, '_>,
        fragment: &str,
    ) -> Result<Self, Error> {
        let range = element.range();
        let raw = source
            .get(range.clone())
            .ok_or_else(|| Error::XmlParse("element range outside document".into()))?;
        if raw.ends_with("/>") {
            let qname = qualified_name(raw);
            let open_end = range.end - 2;
            Ok(Self::new(
                open_end..range.end,
                format!(">{fragment}</{qname}>"),
            ))
        } else {
            let close = raw
                .rfind("</")
                .ok_or_else(|| Error::XmlParse("element without end tag".into()))?;
            let at = range.start + close;
            Ok(Self::new(at..at, fragment))
        }
    }

    /// Replace the content of `element` (everything between its tags).
    pub fn replace_content(
        source: &str,
        element: roxmltree::Node<'_, '_>,
        content: &str,
    ) -> Result<Self, Error> {
        let range = element.range();
        let raw = source
            .get(range.clone())
            .ok_or_else(|| Error::XmlParse("element range outside document".into()))?;
        if raw.ends_with("/>") {
            let qname = qualified_name(raw);
            return Ok(Self::new(
                range.end - 2..range.end,
                format!(">{content}</{qname}>"),
            ));
        }
        let open_end = start_tag_end(raw)
            .ok_or_else(|| Error::XmlParse("unterminated start tag".into()))?;
        let close = raw
            .rfind("</")
            .ok_or_else(|| Error::XmlParse("element without end tag".into()))?;
        Ok(Self::new(range.start + open_end..range.start + close, content))
    }
}

/// Apply `splices` to `source`, last range first.
///
/// Overlapping ranges are rejected. Insertions at the same offset keep
/// their batch order.
pub fn apply(source: &str, mut splices: Vec<Splice>) -> Result<String, Error> {
    splices.sort_by_key(|s| (s.range.start, s.range.end));
    for pair in splices.windows(2) {
        if pair[0].range.end > pair[1].range.start {
            return Err(Error::XmlParse(format!(
                "overlapping edits at {:?} and {:?}",
                pair[0].range, pair[1].range
            )));
        }
    }
    let mut out = source.to_owned();
    for splice in splices.iter().rev() {
        if splice.range.end > out.len()
            || !out.is_char_boundary(splice.range.start)
            || !out.is_char_boundary(splice.range.end)
        {
            return Err(Error::XmlParse(format!(
                "edit range {:?} outside document",
                splice.range
            )));
        }
        out.replace_range(splice.range.clone(), &splice.text);
    }
    Ok(out)
}

/// Offset just past the `>` closing the start tag in `raw`.
///
/// Quote-aware, so a `>` inside an attribute value does not end the tag.
pub fn start_tag_end(raw: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, ch) in raw.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '>') => return Some(i + 1),
            _ => {}
        }
    }
    None
}

/// Offset just past the element's qualified name in `raw` (after `<`).
pub fn qualified_name_end(raw: &str) -> usize {
    raw.char_indices()
        .skip(1)
        .find(|(_, c)| c.is_whitespace() || *c == '/' || *c == '>')
        .map(|(i, _)| i)
        .unwrap_or(raw.len())
}

fn qualified_name(raw: &str) -> &str {
    &raw[1..qualified_name_end(raw)]
}

/// Names of the namespace prefixes declared directly in the start tag `raw`.
///
/// The default namespace is reported as `""`.
pub fn declared_prefixes(raw: &str) -> Vec<String> {
    let end = start_tag_end(raw).unwrap_or(raw.len());
    let tag = &raw[qualified_name_end(raw)..end];
    let mut out = Vec::new();
    let mut rest = tag;
    loop {
        rest = rest.trim_start();
        let Some(eq) = rest.find('=') else { break };
        let name = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let Some(q) = after.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            break;
        };
        let Some(close) = after[1..].find(q) else { break };
        if name == "xmlns" {
            out.push(String::new());
        } else if let Some(prefix) = name.strip_prefix("xmlns:") {
            out.push(prefix.to_owned());
        }
        rest = &after[close + 2..];
    }
    out
}
