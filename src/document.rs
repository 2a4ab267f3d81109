//! Pattern Documents - lossless SVG token stream with landmark lookup
//!
//! Every token keeps the exact source text it was read from. Serializing an
//! unmodified document therefore reproduces the input byte for byte; only
//! geometry attributes of edited landmark elements are ever rewritten.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use thiserror::Error;

use crate::geometry::{format_path_data, format_points, parse_path_data, parse_points, PathDataError, Segment};
use crate::schema::Landmark;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DocumentError {
    #[error("Markup error at byte {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Closing tag without matching start at byte {0}")]
    Unbalanced(usize),

    #[error("Element <{0}> is never closed")]
    Unclosed(String),

    #[error("Document has no root element")]
    MissingRoot,

    #[error("Document has more than one root element")]
    MultipleRoots,

    #[error("Root element is <{0}>, expected <svg>")]
    NotSvg(String),

    #[error("Duplicate id: {0}")]
    DuplicateId(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolveError {
    #[error("Landmark {0} not found")]
    Missing(Landmark),

    #[error("Landmark {0} has no path, polyline or polygon geometry")]
    NoGeometry(Landmark),

    #[error("Landmark {landmark}: {source}")]
    InvalidGeometry {
        landmark: Landmark,
        #[source]
        source: PathDataError,
    },
}

/// Which attribute carries an element's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GeometryAttr {
    PathData,
    Points { closed: bool },
}

impl GeometryAttr {
    fn for_element(name: &str) -> Option<Self> {
        match local_name(name) {
            "path" => Some(GeometryAttr::PathData),
            "polyline" => Some(GeometryAttr::Points { closed: false }),
            "polygon" => Some(GeometryAttr::Points { closed: true }),
            _ => None,
        }
    }

    fn key(&self) -> &'static str {
        match self {
            GeometryAttr::PathData => "d",
            GeometryAttr::Points { .. } => "points",
        }
    }

    fn parse(&self, text: &str) -> Result<Vec<Segment>, PathDataError> {
        match *self {
            GeometryAttr::PathData => parse_path_data(text),
            GeometryAttr::Points { closed } => parse_points(text, closed),
        }
    }

    fn format(&self, segments: &[Segment]) -> String {
        match self {
            GeometryAttr::PathData => format_path_data(segments),
            GeometryAttr::Points { .. } => format_points(segments),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    /// Token index of the matching end tag; `None` for self-closing elements.
    close: Option<usize>,
}

impl Element {
    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Start(Element),
    End,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    raw: String,
    kind: TokenKind,
}

#[derive(Debug, Clone, PartialEq)]
struct GeometryEdit {
    attribute: GeometryAttr,
    original: Vec<Segment>,
    current: Vec<Segment>,
}

/// One geometric element belonging to a landmark.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkPath {
    pub(crate) token: usize,
    pub segments: Vec<Segment>,
}

/// A landmark's geometry, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLandmark {
    pub landmark: Landmark,
    pub paths: Vec<LandmarkPath>,
}

impl ResolvedLandmark {
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.paths.iter().flat_map(|p| p.segments.iter())
    }
}

/// In-memory pattern piece. Owned by exactly one pipeline invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternDocument {
    tokens: Vec<Token>,
    ids: BTreeMap<String, usize>,
    edits: BTreeMap<usize, GeometryEdit>,
}

impl PatternDocument {
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let mut reader = Reader::from_str(text);
        let mut tokens: Vec<Token> = Vec::new();
        let mut ids = BTreeMap::new();
        let mut open: Vec<usize> = Vec::new();
        let mut root_seen = false;
        let mut last = 0usize;

        loop {
            let event = reader.read_event().map_err(|e| DocumentError::Syntax {
                position: reader.buffer_position(),
                message: e.to_string(),
            })?;
            let end = reader.buffer_position();
            let raw = text
                .get(last..end)
                .ok_or(DocumentError::Syntax {
                    position: end,
                    message: "token boundary inside a character".to_string(),
                })?
                .to_string();
            let index = tokens.len();

            let kind = match event {
                Event::Eof => break,
                Event::Start(ref start) | Event::Empty(ref start) => {
                    let self_closing = matches!(event, Event::Empty(_));
                    let element = read_element(start, last)?;

                    if open.is_empty() {
                        if root_seen {
                            return Err(DocumentError::MultipleRoots);
                        }
                        if local_name(&element.name) != "svg" {
                            return Err(DocumentError::NotSvg(element.name));
                        }
                        root_seen = true;
                    }
                    if let Some(id) = element.attribute("id") {
                        if ids.insert(id.to_string(), index).is_some() {
                            return Err(DocumentError::DuplicateId(id.to_string()));
                        }
                    }
                    if !self_closing {
                        open.push(index);
                    }
                    TokenKind::Start(element)
                }
                Event::End(_) => {
                    let start = open.pop().ok_or(DocumentError::Unbalanced(last))?;
                    if let TokenKind::Start(element) = &mut tokens[start].kind {
                        element.close = Some(index);
                    }
                    TokenKind::End
                }
                _ => TokenKind::Other,
            };

            tokens.push(Token { raw, kind });
            last = end;
        }

        if let Some(&index) = open.last() {
            let name = match &tokens[index].kind {
                TokenKind::Start(element) => element.name.clone(),
                _ => String::new(),
            };
            return Err(DocumentError::Unclosed(name));
        }
        if !root_seen {
            return Err(DocumentError::MissingRoot);
        }
        if last < text.len() {
            tokens.push(Token {
                raw: text[last..].to_string(),
                kind: TokenKind::Other,
            });
        }

        Ok(Self {
            tokens,
            ids,
            edits: BTreeMap::new(),
        })
    }

    /// Find a landmark by its anchor id and read its current geometry.
    ///
    /// The element itself may carry geometry, or it may be a group whose
    /// geometric descendants together form the landmark.
    pub fn resolve(&self, landmark: Landmark) -> Result<ResolvedLandmark, ResolveError> {
        let index = *self.ids.get(landmark.id()).ok_or(ResolveError::Missing(landmark))?;
        let element = self.element(index).ok_or(ResolveError::Missing(landmark))?;

        let candidates: Vec<usize> = match element.close {
            Some(close) if GeometryAttr::for_element(&element.name).is_none() => (index + 1..close)
                .filter(|&i| {
                    self.element(i)
                        .map_or(false, |e| GeometryAttr::for_element(&e.name).is_some())
                })
                .collect(),
            _ => vec![index],
        };

        let mut paths = Vec::new();
        for token in candidates {
            if let Some(segments) = self.read_geometry(token, landmark)? {
                paths.push(LandmarkPath { token, segments });
            }
        }
        if paths.is_empty() {
            return Err(ResolveError::NoGeometry(landmark));
        }
        Ok(ResolvedLandmark { landmark, paths })
    }

    /// Replace the geometry of every path in `resolved`.
    pub fn write_landmark(&mut self, resolved: &ResolvedLandmark) {
        for path in &resolved.paths {
            self.set_geometry(path.token, path.segments.clone());
        }
    }

    fn set_geometry(&mut self, token: usize, segments: Vec<Segment>) {
        if let Some(edit) = self.edits.get_mut(&token) {
            edit.current = segments;
            return;
        }
        let Some(element) = self.element(token) else { return };
        let Some(attribute) = GeometryAttr::for_element(&element.name) else { return };
        let Some(original) = element
            .attribute(attribute.key())
            .and_then(|text| attribute.parse(text).ok())
        else {
            return;
        };
        self.edits.insert(
            token,
            GeometryEdit {
                attribute,
                original,
                current: segments,
            },
        );
    }

    fn read_geometry(&self, token: usize, landmark: Landmark) -> Result<Option<Vec<Segment>>, ResolveError> {
        if let Some(edit) = self.edits.get(&token) {
            return Ok(Some(edit.current.clone()));
        }
        let Some(element) = self.element(token) else { return Ok(None) };
        let Some(attribute) = GeometryAttr::for_element(&element.name) else { return Ok(None) };
        let Some(text) = element.attribute(attribute.key()) else { return Ok(None) };
        attribute
            .parse(text)
            .map(Some)
            .map_err(|source| ResolveError::InvalidGeometry { landmark, source })
    }

    fn element(&self, index: usize) -> Option<&Element> {
        match &self.tokens.get(index)?.kind {
            TokenKind::Start(element) => Some(element),
            _ => None,
        }
    }

    /// True when any geometry differs numerically from the parsed source.
    pub fn is_modified(&self) -> bool {
        self.edits.values().any(|edit| edit.current != edit.original)
    }

    /// Render back to markup. Unchanged tokens are emitted verbatim.
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(self.tokens.iter().map(|t| t.raw.len()).sum());
        for (index, token) in self.tokens.iter().enumerate() {
            match self.edits.get(&index) {
                Some(edit) if edit.current != edit.original => {
                    out.push_str(&rewrite_attribute(
                        &token.raw,
                        edit.attribute.key(),
                        &edit.attribute.format(&edit.current),
                    ));
                }
                _ => out.push_str(&token.raw),
            }
        }
        out
    }
}

impl fmt::Display for PatternDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn read_element(start: &BytesStart<'_>, position: usize) -> Result<Element, DocumentError> {
    let syntax = |message: String| DocumentError::Syntax { position, message };

    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| syntax(e.to_string()))?
        .to_string();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| syntax(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| syntax(e.to_string()))?
            .to_string();
        let value = attr.unescape_value().map_err(|e| syntax(e.to_string()))?.into_owned();
        attributes.push((key, value));
    }

    Ok(Element {
        name,
        attributes,
        close: None,
    })
}

/// Byte range of the value of `key` inside a raw start tag, quotes excluded.
fn attribute_value_span(tag: &str, key: &str) -> Option<Range<usize>> {
    let bytes = tag.as_bytes();
    let mut i = tag.find('<')? + 1;

    // element name
    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' && bytes[i] != b'/' {
        i += 1;
    }

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] == b'>' || bytes[i] == b'/' {
            return None;
        }

        let key_start = i;
        while i < bytes.len() && bytes[i] != b'=' && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let found = &tag[key_start..i];

        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'=') {
            i += 1;
        }
        let quote = *bytes.get(i)?;
        if quote != b'"' && quote != b'\'' {
            return None;
        }
        let value_start = i + 1;
        let value_end = value_start + tag[value_start..].find(quote as char)?;
        if found == key {
            return Some(value_start..value_end);
        }
        i = value_end + 1;
    }
}

fn rewrite_attribute(tag: &str, key: &str, value: &str) -> String {
    match attribute_value_span(tag, key) {
        Some(span) => {
            let mut out = String::with_capacity(tag.len() + value.len());
            out.push_str(&tag[..span.start]);
            out.push_str(value);
            out.push_str(&tag[span.end..]);
            out
        }
        None => tag.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    const FRONT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- front bodice -->
<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 120">
  <g id="hem_line" class="seam"><path d="M 28 100 L 72 100" stroke-width='0.5'/></g>
  <path id="neckline_curve"   d="M40,8 C40,16 60,16 60,8" />
  <polyline id="side_seam" points="28,30 28,100"/>
  <text x="50" y="60">FRONT &amp; CENTER</text>
</svg>
"#;

    #[test]
    fn untouched_document_round_trips_exactly() {
        let doc = PatternDocument::parse(FRONT).unwrap();
        assert_eq!(doc.serialize(), FRONT);
        assert!(!doc.is_modified());
    }

    #[test]
    fn group_landmark_resolves_to_child_path() {
        let doc = PatternDocument::parse(FRONT).unwrap();
        let hem = doc.resolve(Landmark::HemLine).unwrap();
        assert_eq!(hem.paths.len(), 1);
        assert_eq!(
            hem.paths[0].segments,
            vec![Segment::MoveTo(Point::new(28.0, 100.0)), Segment::LineTo(Point::new(72.0, 100.0))]
        );
    }

    #[test]
    fn missing_landmark_reported() {
        let doc = PatternDocument::parse(FRONT).unwrap();
        assert_eq!(
            doc.resolve(Landmark::ArmholeCurve).unwrap_err(),
            ResolveError::Missing(Landmark::ArmholeCurve)
        );
    }

    #[test]
    fn edit_rewrites_only_geometry_attribute() {
        let mut doc = PatternDocument::parse(FRONT).unwrap();
        let mut hem = doc.resolve(Landmark::HemLine).unwrap();
        hem.paths[0].segments = hem.paths[0]
            .segments
            .iter()
            .map(|s| s.map_points(|p| p.offset(0.0, -5.0)))
            .collect();
        doc.write_landmark(&hem);

        let out = doc.serialize();
        assert!(out.contains(r#"<path d="M 28 95 L 72 95" stroke-width='0.5'/>"#));
        assert!(out.contains(r#"<path id="neckline_curve"   d="M40,8 C40,16 60,16 60,8" />"#));
        assert!(out.contains("FRONT &amp; CENTER"));
        assert!(doc.is_modified());
    }

    #[test]
    fn unchanged_edit_keeps_source_text() {
        let mut doc = PatternDocument::parse(FRONT).unwrap();
        let neck = doc.resolve(Landmark::NecklineCurve).unwrap();
        doc.write_landmark(&neck);
        assert_eq!(doc.serialize(), FRONT);
    }

    #[test]
    fn polyline_rewrites_points() {
        let mut doc = PatternDocument::parse(FRONT).unwrap();
        let mut seam = doc.resolve(Landmark::SideSeam).unwrap();
        seam.paths[0].segments[1] = Segment::LineTo(Point::new(28.0, 95.0));
        doc.write_landmark(&seam);
        assert!(doc.serialize().contains(r#"<polyline id="side_seam" points="28,30 28,95"/>"#));
    }

    #[test]
    fn structural_errors() {
        assert!(PatternDocument::parse("<svg><g></svg>").is_err());
        assert_eq!(PatternDocument::parse("<!-- nothing -->").unwrap_err(), DocumentError::MissingRoot);
        assert_eq!(
            PatternDocument::parse("<html></html>").unwrap_err(),
            DocumentError::NotSvg("html".to_string())
        );
        assert_eq!(
            PatternDocument::parse(r#"<svg><path id="a" d="M 0 0"/><path id="a" d="M 1 1"/></svg>"#).unwrap_err(),
            DocumentError::DuplicateId("a".to_string())
        );
        assert!(PatternDocument::parse("<svg><g>").is_err());
    }

    #[test]
    fn arc_landmark_is_invalid_geometry() {
        let doc = PatternDocument::parse(r#"<svg><path id="hem_line" d="M 0 0 A 5 5 0 0 1 10 0"/></svg>"#).unwrap();
        assert!(matches!(
            doc.resolve(Landmark::HemLine).unwrap_err(),
            ResolveError::InvalidGeometry { .. }
        ));
    }

    #[test]
    fn attribute_span_skips_similar_keys() {
        let tag = r#"<path data-d="x" d='M 0 0'/>"#;
        let span = attribute_value_span(tag, "d").unwrap();
        assert_eq!(&tag[span], "M 0 0");
    }
}
