//! Geometry primitives: absolute path segments, canonical number formatting,
//! curve sampling and self-intersection tests.

use std::fmt::Write as _;
use thiserror::Error;

/// Decimal places kept when a mutated coordinate is written back.
pub const COORDINATE_PRECISION: usize = 3;

/// Curves are sampled at this many steps for intersection and extent tests.
pub const CURVE_SAMPLES: usize = 16;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn lerp(self, other: Point, t: f64) -> Self {
        Self::new(self.x + (other.x - self.x) * t, self.y + (other.y - self.y) * t)
    }

    /// Mirror `self` through `center`.
    fn reflect(self, center: Point) -> Self {
        Self::new(2.0 * center.x - self.x, 2.0 * center.y - self.y)
    }
}

/// Absolute path segment. Every path is normalized to these five commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    MoveTo(Point),
    LineTo(Point),
    CubicTo(Point, Point, Point),
    QuadTo(Point, Point),
    Close,
}

impl Segment {
    /// The on-curve point the segment ends at.
    pub fn end(&self) -> Option<Point> {
        match *self {
            Segment::MoveTo(p) | Segment::LineTo(p) | Segment::CubicTo(_, _, p) | Segment::QuadTo(_, p) => Some(p),
            Segment::Close => None,
        }
    }

    /// Apply `f` to every coordinate, on-curve points and handles alike.
    pub fn map_points(&self, mut f: impl FnMut(Point) -> Point) -> Segment {
        match *self {
            Segment::MoveTo(p) => Segment::MoveTo(f(p)),
            Segment::LineTo(p) => Segment::LineTo(f(p)),
            Segment::CubicTo(c1, c2, p) => Segment::CubicTo(f(c1), f(c2), f(p)),
            Segment::QuadTo(c, p) => Segment::QuadTo(f(c), f(p)),
            Segment::Close => Segment::Close,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PathDataError {
    #[error("invalid path data: {0}")]
    Syntax(String),

    #[error("elliptical arcs are not supported on landmarks")]
    UnsupportedArc,

    #[error("path data must start with a move command")]
    MissingMoveTo,

    #[error("geometry has no points")]
    Empty,
}

/// Parse a `d` attribute into absolute segments.
pub fn parse_path_data(data: &str) -> Result<Vec<Segment>, PathDataError> {
    use svgtypes::PathSegment as S;

    let mut segments = Vec::new();
    let mut current = Point::new(0.0, 0.0);
    let mut subpath_start = current;
    // Last cubic / quadratic handle, for S and T reflection.
    let mut last_cubic: Option<Point> = None;
    let mut last_quad: Option<Point> = None;

    for parsed in svgtypes::PathParser::from(data) {
        let parsed = parsed.map_err(|e| PathDataError::Syntax(e.to_string()))?;
        if segments.is_empty() && !matches!(parsed, S::MoveTo { .. }) {
            return Err(PathDataError::MissingMoveTo);
        }

        let resolve = |abs: bool, x: f64, y: f64| if abs { Point::new(x, y) } else { current.offset(x, y) };

        let segment = match parsed {
            S::MoveTo { abs, x, y } => {
                let p = resolve(abs, x, y);
                subpath_start = p;
                Segment::MoveTo(p)
            }
            S::LineTo { abs, x, y } => Segment::LineTo(resolve(abs, x, y)),
            S::HorizontalLineTo { abs, x } => {
                Segment::LineTo(Point::new(if abs { x } else { current.x + x }, current.y))
            }
            S::VerticalLineTo { abs, y } => {
                Segment::LineTo(Point::new(current.x, if abs { y } else { current.y + y }))
            }
            S::CurveTo { abs, x1, y1, x2, y2, x, y } => {
                Segment::CubicTo(resolve(abs, x1, y1), resolve(abs, x2, y2), resolve(abs, x, y))
            }
            S::SmoothCurveTo { abs, x2, y2, x, y } => {
                let c1 = last_cubic.map_or(current, |c| c.reflect(current));
                Segment::CubicTo(c1, resolve(abs, x2, y2), resolve(abs, x, y))
            }
            S::Quadratic { abs, x1, y1, x, y } => Segment::QuadTo(resolve(abs, x1, y1), resolve(abs, x, y)),
            S::SmoothQuadratic { abs, x, y } => {
                let c = last_quad.map_or(current, |c| c.reflect(current));
                Segment::QuadTo(c, resolve(abs, x, y))
            }
            S::EllipticalArc { .. } => return Err(PathDataError::UnsupportedArc),
            S::ClosePath { .. } => Segment::Close,
        };

        last_cubic = match segment {
            Segment::CubicTo(_, c2, _) => Some(c2),
            _ => None,
        };
        last_quad = match segment {
            Segment::QuadTo(c, _) => Some(c),
            _ => None,
        };
        current = segment.end().unwrap_or(subpath_start);
        segments.push(segment);
    }

    if segments.is_empty() {
        return Err(PathDataError::Empty);
    }
    Ok(segments)
}

/// Parse a `points` attribute (polyline / polygon).
pub fn parse_points(data: &str, closed: bool) -> Result<Vec<Segment>, PathDataError> {
    let mut segments: Vec<Segment> = svgtypes::PointsParser::from(data)
        .enumerate()
        .map(|(i, (x, y))| {
            let p = Point::new(x, y);
            if i == 0 {
                Segment::MoveTo(p)
            } else {
                Segment::LineTo(p)
            }
        })
        .collect();

    if segments.is_empty() {
        return Err(PathDataError::Empty);
    }
    if closed {
        segments.push(Segment::Close);
    }
    Ok(segments)
}

/// Canonical coordinate text: fixed precision, trailing zeros trimmed, no `-0`.
pub fn format_number(value: f64) -> String {
    let mut text = format!("{:.*}", COORDINATE_PRECISION, value);
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

fn push_point(out: &mut String, p: Point) {
    let _ = write!(out, "{} {}", format_number(p.x), format_number(p.y));
}

/// Canonical `d` text for absolute segments.
pub fn format_path_data(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        match *segment {
            Segment::MoveTo(p) => {
                out.push_str("M ");
                push_point(&mut out, p);
            }
            Segment::LineTo(p) => {
                out.push_str("L ");
                push_point(&mut out, p);
            }
            Segment::CubicTo(c1, c2, p) => {
                out.push_str("C ");
                push_point(&mut out, c1);
                out.push(' ');
                push_point(&mut out, c2);
                out.push(' ');
                push_point(&mut out, p);
            }
            Segment::QuadTo(c, p) => {
                out.push_str("Q ");
                push_point(&mut out, c);
                out.push(' ');
                push_point(&mut out, p);
            }
            Segment::Close => out.push('Z'),
        }
    }
    out
}

/// Canonical `points` text. Close markers are implied by the element.
pub fn format_points(segments: &[Segment]) -> String {
    segments
        .iter()
        .filter_map(Segment::end)
        .map(|p| format!("{},{}", format_number(p.x), format_number(p.y)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// On-curve points in drawing order.
pub fn on_curve_points(segments: &[Segment]) -> Vec<Point> {
    segments.iter().filter_map(Segment::end).collect()
}

/// First and last on-curve points.
pub fn end_anchors(segments: &[Segment]) -> Option<(Point, Point)> {
    let points = on_curve_points(segments);
    Some((*points.first()?, *points.last()?))
}

fn cubic_at(p0: Point, c1: Point, c2: Point, p3: Point, t: f64) -> Point {
    let mt = 1.0 - t;
    let a = mt * mt * mt;
    let b = 3.0 * mt * mt * t;
    let c = 3.0 * mt * t * t;
    let d = t * t * t;
    Point::new(
        a * p0.x + b * c1.x + c * c2.x + d * p3.x,
        a * p0.y + b * c1.y + c * c2.y + d * p3.y,
    )
}

fn quad_at(p0: Point, c: Point, p2: Point, t: f64) -> Point {
    p0.lerp(c, t).lerp(c.lerp(p2, t), t)
}

/// Flatten into one polyline per subpath. Straight segments are not subdivided.
pub fn flatten(segments: &[Segment]) -> Vec<Vec<Point>> {
    let mut polylines: Vec<Vec<Point>> = Vec::new();
    let mut current: Vec<Point> = Vec::new();
    let mut cursor = Point::new(0.0, 0.0);

    for segment in segments {
        match *segment {
            Segment::MoveTo(p) => {
                if current.len() > 1 {
                    polylines.push(std::mem::take(&mut current));
                }
                current = vec![p];
                cursor = p;
            }
            Segment::LineTo(p) => {
                current.push(p);
                cursor = p;
            }
            Segment::CubicTo(c1, c2, p) => {
                current.extend((1..=CURVE_SAMPLES).map(|i| cubic_at(cursor, c1, c2, p, i as f64 / CURVE_SAMPLES as f64)));
                cursor = p;
            }
            Segment::QuadTo(c, p) => {
                current.extend((1..=CURVE_SAMPLES).map(|i| quad_at(cursor, c, p, i as f64 / CURVE_SAMPLES as f64)));
                cursor = p;
            }
            Segment::Close => {
                if let Some(&start) = current.first() {
                    if start.distance(cursor) > EPSILON {
                        current.push(start);
                    }
                    cursor = start;
                }
            }
        }
    }
    if current.len() > 1 {
        polylines.push(current);
    }
    polylines
}

/// Vertical extent `(min_y, max_y)` of the sampled geometry.
pub fn vertical_extent(segments: &[Segment]) -> Option<(f64, f64)> {
    flatten(segments)
        .into_iter()
        .flatten()
        .fold(None, |acc, p| match acc {
            None => Some((p.y, p.y)),
            Some((lo, hi)) => Some((lo.min(p.y), hi.max(p.y))),
        })
}

fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn sign(v: f64) -> i8 {
    if v > EPSILON {
        1
    } else if v < -EPSILON {
        -1
    } else {
        0
    }
}

fn within_box(a: Point, b: Point, p: Point) -> bool {
    p.x >= a.x.min(b.x) - EPSILON
        && p.x <= a.x.max(b.x) + EPSILON
        && p.y >= a.y.min(b.y) - EPSILON
        && p.y <= a.y.max(b.y) + EPSILON
}

fn segments_intersect(a: Point, b: Point, c: Point, d: Point) -> bool {
    let o1 = sign(orientation(a, b, c));
    let o2 = sign(orientation(a, b, d));
    let o3 = sign(orientation(c, d, a));
    let o4 = sign(orientation(c, d, b));

    if o1 != o2 && o3 != o4 && o1 != 0 && o2 != 0 && o3 != 0 && o4 != 0 {
        return true;
    }
    (o1 == 0 && within_box(a, b, c))
        || (o2 == 0 && within_box(a, b, d))
        || (o3 == 0 && within_box(c, d, a))
        || (o4 == 0 && within_box(c, d, b))
}

/// True when two non-adjacent edges of the polyline touch or cross.
pub fn polyline_self_intersects(points: &[Point]) -> bool {
    let edges: Vec<(Point, Point)> = points
        .windows(2)
        .map(|w| (w[0], w[1]))
        .filter(|(a, b)| a.distance(*b) > EPSILON)
        .collect();
    let closed = points.len() > 2
        && points
            .first()
            .zip(points.last())
            .map_or(false, |(first, last)| first.distance(*last) <= EPSILON);

    for i in 0..edges.len() {
        for j in (i + 2)..edges.len() {
            if closed && i == 0 && j == edges.len() - 1 {
                continue;
            }
            let (a, b) = edges[i];
            let (c, d) = edges[j];
            if segments_intersect(a, b, c, d) {
                return true;
            }
        }
    }
    false
}

pub fn self_intersects(segments: &[Segment]) -> bool {
    flatten(segments).iter().any(|polyline| polyline_self_intersects(polyline))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_and_shorthand_commands_become_absolute() {
        let segments = parse_path_data("m 10 10 h 5 v 5 l -5 0 z").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::MoveTo(Point::new(10.0, 10.0)),
                Segment::LineTo(Point::new(15.0, 10.0)),
                Segment::LineTo(Point::new(15.0, 15.0)),
                Segment::LineTo(Point::new(10.0, 15.0)),
                Segment::Close,
            ]
        );
    }

    #[test]
    fn smooth_cubic_reflects_previous_handle() {
        let segments = parse_path_data("M 0 0 C 0 10 10 10 10 0 S 20 -10 20 0").unwrap();
        assert_eq!(
            segments[2],
            Segment::CubicTo(Point::new(10.0, -10.0), Point::new(20.0, -10.0), Point::new(20.0, 0.0))
        );
    }

    #[test]
    fn arcs_rejected() {
        assert_eq!(parse_path_data("M 0 0 A 5 5 0 0 1 10 0"), Err(PathDataError::UnsupportedArc));
    }

    #[test]
    fn number_formatting_is_canonical() {
        assert_eq!(format_number(95.0), "95");
        assert_eq!(format_number(12.5), "12.5");
        assert_eq!(format_number(1.0 / 3.0), "0.333");
        assert_eq!(format_number(-0.0001), "0");
        assert_eq!(format_number(-2.25), "-2.25");
    }

    #[test]
    fn format_path_data_round_trips_through_parser() {
        let segments = parse_path_data("M 40 8 C 40 16 60 16 60 8").unwrap();
        let text = format_path_data(&segments);
        assert_eq!(text, "M 40 8 C 40 16 60 16 60 8");
        assert_eq!(parse_path_data(&text).unwrap(), segments);
    }

    #[test]
    fn points_parse_and_format() {
        let segments = parse_points("0,0 10,0 10,10", false).unwrap();
        assert_eq!(on_curve_points(&segments).len(), 3);
        assert_eq!(format_points(&segments), "0,0 10,0 10,10");
    }

    #[test]
    fn bow_tie_self_intersects() {
        let segments = parse_path_data("M 0 0 L 10 10 L 10 0 L 0 10").unwrap();
        assert!(self_intersects(&segments));
    }

    #[test]
    fn straight_hem_does_not_self_intersect() {
        let segments = parse_path_data("M 28 100 L 50 100 L 72 100").unwrap();
        assert!(!self_intersects(&segments));
    }

    #[test]
    fn closed_square_does_not_self_intersect() {
        let segments = parse_path_data("M 0 0 L 10 0 L 10 10 L 0 10 Z").unwrap();
        assert!(!self_intersects(&segments));
    }

    #[test]
    fn extent_includes_curve_dip() {
        let segments = parse_path_data("M 40 8 C 40 16 60 16 60 8").unwrap();
        let (lo, hi) = vertical_extent(&segments).unwrap();
        assert_eq!(lo, 8.0);
        assert!((hi - 14.0).abs() < 1e-9);
    }
}
