//! Shared base blocks for integration tests.
//!
//! Coordinates are in centimeters (unit scale 1). The three families share
//! landmark placement but not body or sleeve length.

#![allow(dead_code)]

use patternforge_core::geometry::{end_anchors, vertical_extent, Point};
use patternforge_core::{BlockFamily, Landmark, PatternDocument, Piece, PieceMap};

/// Hem height on the front and back bodice.
pub fn hem_y(family: BlockFamily) -> f64 {
    match family {
        BlockFamily::Tshirt => 100.0,
        BlockFamily::LongSleeve => 110.0,
        BlockFamily::CropTop => 60.0,
    }
}

/// Height of the sleeve length line.
pub fn sleeve_y(family: BlockFamily) -> f64 {
    match family {
        BlockFamily::Tshirt => 60.0,
        BlockFamily::LongSleeve => 100.0,
        BlockFamily::CropTop => 50.0,
    }
}

fn bodice(label: &str, neckline: Option<&str>, hem: f64) -> String {
    let neckline = neckline
        .map(|d| format!("  <path id=\"neckline_curve\" d=\"{}\" fill=\"none\"/>\n", d))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 {height}">
  <!-- {label} bodice -->
{neckline}  <g id="shoulder_line" stroke="black"><path d="M 40 8 L 22 12"/><path d="M 60 8 L 78 12"/></g>
  <g id="armhole_curve"><path d="M 22 12 C 24 22 26 28 28 30"/><path d="M 78 12 C 76 22 74 28 72 30"/></g>
  <g id="side_seam">
    <path d="M 28 30 L 28 {hem}"/>
    <path d="M 72 30 L 72 {hem}"/>
  </g>
  <path id="hem_line" d='M 28 {hem} L 72 {hem}'/>
  <text x="50" y="50" font-size="4">{label} &amp; grain</text>
</svg>
"#,
        height = hem + 10.0,
        label = label,
        neckline = neckline,
        hem = hem,
    )
}

pub fn front(family: BlockFamily) -> String {
    bodice("front", Some("M 40 8 C 40 16 60 16 60 8"), hem_y(family))
}

/// A front bodice without its neckline landmark.
pub fn front_without_neckline(family: BlockFamily) -> String {
    bodice("front", None, hem_y(family))
}

/// The back neckline is shallow: its handles sit 3 units below the shoulder points.
pub fn back(family: BlockFamily) -> String {
    bodice("back", Some("M 40 8 C 40 11 60 11 60 8"), hem_y(family))
}

pub fn sleeve(family: BlockFamily) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 60 {height}">
  <path id="armhole_curve" d="M 8 20 C 15 5 45 5 52 20"/>
  <path id="sleeve_width_line" d="M 8 20 L 52 20" stroke-dasharray="2 1"/>
  <g id="side_seam"><path d="M 8 20 L 14 {len}"/><path d="M 52 20 L 46 {len}"/></g>
  <path id="sleeve_length_line" d="M 14 {len} L 46 {len}"/>
</svg>
"#,
        height = sleeve_y(family) + 10.0,
        len = sleeve_y(family),
    )
}

pub fn base(family: BlockFamily) -> PieceMap<String> {
    let mut pieces = PieceMap::new();
    pieces.insert(Piece::Front, front(family));
    pieces.insert(Piece::Back, back(family));
    pieces.insert(Piece::Sleeve, sleeve(family));
    pieces
}

pub fn parsed(pieces: &PieceMap<String>) -> PieceMap<PatternDocument> {
    pieces
        .iter()
        .map(|(piece, text)| (*piece, PatternDocument::parse(text).unwrap()))
        .collect()
}

/// (top, bottom) of a landmark in serialized markup.
pub fn extent(markup: &str, landmark: Landmark) -> (f64, f64) {
    let doc = PatternDocument::parse(markup).unwrap();
    let segments: Vec<_> = doc.resolve(landmark).unwrap().segments().copied().collect();
    vertical_extent(&segments).unwrap()
}

/// First and last on-curve point of a landmark in serialized markup.
pub fn anchors(markup: &str, landmark: Landmark) -> (Point, Point) {
    let doc = PatternDocument::parse(markup).unwrap();
    let segments: Vec<_> = doc.resolve(landmark).unwrap().segments().copied().collect();
    end_anchors(&segments).unwrap()
}
