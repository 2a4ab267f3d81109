//! Geometry Transformer - sequential, atomic application of descriptors
//!
//! Descriptors are applied in order, each to the output of the previous one.
//! Work happens on private copies of the base documents; the copies are only
//! handed back if every descriptor succeeds and no piece degenerates.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

use crate::compiler::{Axis, LandmarkRef, TransformDescriptor};
use crate::document::{PatternDocument, ResolveError, ResolvedLandmark};
use crate::geometry::{end_anchors, on_curve_points, self_intersects, vertical_extent, Point, Segment};
use crate::operations::{Operation, TransformKind};
use crate::schema::{BlockSchema, Landmark, Piece};

pub type PieceMap<T> = BTreeMap<Piece, T>;

/// Seam endpoints closer than this to a moved landmark point follow it.
pub const JOIN_TOLERANCE: f64 = 1e-3;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateReason {
    SelfIntersection,
    InvertedOrientation,
    ZeroReferenceWidth,
    CollapsedHandle,
    CrossedHandles,
    FlatCurve,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeometryError {
    #[error("Piece {piece} is missing landmark {landmark}")]
    MissingLandmark { piece: Piece, landmark: Landmark },

    #[error("Rule {rule_index} ({operation}) left {landmark} on {piece} degenerate: {reason:?}")]
    DegenerateResult {
        rule_index: usize,
        operation: Operation,
        piece: Piece,
        landmark: Landmark,
        reason: DegenerateReason,
    },

    #[error("No base document supplied for piece {0}")]
    MissingPiece(Piece),

    #[error("Piece {piece}: {source}")]
    MalformedLandmark {
        piece: Piece,
        #[source]
        source: ResolveError,
    },
}

/// Orientation facts about a piece. A fact true on the base piece must stay true.
#[derive(Debug, Clone, Default, PartialEq)]
struct PieceShape {
    self_intersecting: BTreeSet<Landmark>,
    hem_below_armhole: Option<bool>,
    neckline_dips: Option<bool>,
    neckline_above_hem: Option<bool>,
    sleeve_length_below_width: Option<bool>,
    sleeve_width_sign: Option<i8>,
}

impl PieceShape {
    fn measure(doc: &PatternDocument, landmarks: &BTreeSet<Landmark>) -> Self {
        let mut geometry: BTreeMap<Landmark, Vec<Segment>> = BTreeMap::new();
        for landmark in landmarks {
            if let Ok(resolved) = doc.resolve(*landmark) {
                geometry.insert(*landmark, resolved.segments().copied().collect());
            }
        }
        let extent = |landmark: Landmark| geometry.get(&landmark).and_then(|s| vertical_extent(s));

        let self_intersecting = geometry
            .iter()
            .filter(|(_, segments)| self_intersects(segments))
            .map(|(landmark, _)| *landmark)
            .collect();

        let hem = extent(Landmark::HemLine);
        let armhole = extent(Landmark::ArmholeCurve);
        let neckline = extent(Landmark::NecklineCurve);
        let width = extent(Landmark::SleeveWidthLine);
        let length = extent(Landmark::SleeveLengthLine);

        let neckline_dips = geometry.get(&Landmark::NecklineCurve).and_then(|segments| {
            let (a, b) = end_anchors(segments)?;
            let (_, lowest) = vertical_extent(segments)?;
            Some(lowest > a.y.max(b.y) + EPSILON)
        });

        let sleeve_width_sign = geometry
            .get(&Landmark::SleeveWidthLine)
            .and_then(|segments| end_anchors(segments))
            .map(|(a, b)| sign(b.x - a.x));

        Self {
            self_intersecting,
            hem_below_armhole: hem.zip(armhole).map(|(h, a)| h.0 > a.1),
            neckline_dips,
            neckline_above_hem: neckline.zip(hem).map(|(n, h)| n.1 < h.0),
            sleeve_length_below_width: length.zip(width).map(|(l, w)| l.0 > w.1),
            sleeve_width_sign,
        }
    }

    /// First fact that held on `base` but no longer holds on `self`.
    fn violation(&self, base: &PieceShape) -> Option<(Landmark, DegenerateReason)> {
        use DegenerateReason::*;

        if let Some(landmark) = self.self_intersecting.difference(&base.self_intersecting).next() {
            return Some((*landmark, SelfIntersection));
        }
        let lost = |before: Option<bool>, after: Option<bool>| before == Some(true) && after != Some(true);
        if lost(base.hem_below_armhole, self.hem_below_armhole) {
            return Some((Landmark::HemLine, InvertedOrientation));
        }
        if lost(base.neckline_dips, self.neckline_dips) || lost(base.neckline_above_hem, self.neckline_above_hem) {
            return Some((Landmark::NecklineCurve, InvertedOrientation));
        }
        if lost(base.sleeve_length_below_width, self.sleeve_length_below_width) {
            return Some((Landmark::SleeveLengthLine, InvertedOrientation));
        }
        match base.sleeve_width_sign {
            Some(s) if s != 0 && self.sleeve_width_sign != Some(s) => {
                Some((Landmark::SleeveWidthLine, InvertedOrientation))
            }
            _ => None,
        }
    }
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

fn delta(from: Point, to: Point) -> Point {
    Point::new(to.x - from.x, to.y - from.y)
}

/// Point-wise motion of a translated or scaled landmark.
#[derive(Debug, Clone, Copy)]
enum Motion {
    Shift { dx: f64, dy: f64 },
    ScaleX { pivot: f64, factor: f64 },
}

impl Motion {
    fn apply(&self, p: Point) -> Point {
        match *self {
            Motion::Shift { dx, dy } => p.offset(dx, dy),
            Motion::ScaleX { pivot, factor } => Point::new(p.x * factor + pivot * (1.0 - factor), p.y),
        }
    }
}

pub struct GeometryTransformer<'a> {
    schema: &'a BlockSchema,
}

impl<'a> GeometryTransformer<'a> {
    pub fn new(schema: &'a BlockSchema) -> Self {
        Self { schema }
    }

    pub fn apply(
        &self,
        base: &PieceMap<PatternDocument>,
        descriptors: &[TransformDescriptor],
    ) -> Result<PieceMap<PatternDocument>, GeometryError> {
        let touched: BTreeSet<Piece> = descriptors.iter().flat_map(|d| d.pieces()).collect();

        // Every promised landmark must resolve before anything moves.
        let mut baselines = BTreeMap::new();
        for piece in &touched {
            let doc = base.get(piece).ok_or(GeometryError::MissingPiece(*piece))?;
            let required = self.schema.required_landmarks(*piece);
            for landmark in &required {
                resolve(doc, *piece, *landmark)?;
            }
            baselines.insert(*piece, (PieceShape::measure(doc, &required), required));
        }

        let mut working = base.clone();
        for descriptor in descriptors {
            debug!(
                rule = descriptor.rule_index,
                operation = %descriptor.operation,
                magnitude = descriptor.magnitude,
                "applying descriptor"
            );
            for target in &descriptor.target_landmarks {
                let doc = working
                    .get_mut(&target.piece)
                    .ok_or(GeometryError::MissingPiece(target.piece))?;
                self.apply_to_piece(doc, descriptor, target)?;
            }

            for piece in descriptor.pieces() {
                let (base_shape, required) = match baselines.get(&piece) {
                    Some(entry) => entry,
                    None => continue,
                };
                let doc = working.get(&piece).ok_or(GeometryError::MissingPiece(piece))?;
                if let Some((landmark, reason)) = PieceShape::measure(doc, required).violation(base_shape) {
                    return Err(GeometryError::DegenerateResult {
                        rule_index: descriptor.rule_index,
                        operation: descriptor.operation,
                        piece,
                        landmark,
                        reason,
                    });
                }
            }
        }

        Ok(working)
    }

    fn apply_to_piece(
        &self,
        doc: &mut PatternDocument,
        descriptor: &TransformDescriptor,
        target: &LandmarkRef,
    ) -> Result<(), GeometryError> {
        let degenerate = |landmark: Landmark, reason: DegenerateReason| GeometryError::DegenerateResult {
            rule_index: descriptor.rule_index,
            operation: descriptor.operation,
            piece: target.piece,
            landmark,
            reason,
        };

        let mut resolved = resolve(doc, target.piece, target.landmark)?;
        let anchors: Vec<Point> = resolved
            .paths
            .iter()
            .flat_map(|p| on_curve_points(&p.segments))
            .collect();

        let motion = match descriptor.kind {
            TransformKind::Translate => match descriptor.axis {
                Axis::Vertical => Motion::Shift { dx: 0.0, dy: descriptor.magnitude },
                Axis::Horizontal => Motion::Shift { dx: descriptor.magnitude, dy: 0.0 },
            },
            TransformKind::Scale => {
                let (first, last) = match (anchors.first(), anchors.last()) {
                    (Some(first), Some(last)) => (*first, *last),
                    _ => return Err(degenerate(target.landmark, DegenerateReason::ZeroReferenceWidth)),
                };
                let reference_width = (last.x - first.x).abs();
                if reference_width < EPSILON {
                    return Err(degenerate(target.landmark, DegenerateReason::ZeroReferenceWidth));
                }
                let factor = 1.0 + descriptor.magnitude / reference_width;
                if factor <= EPSILON {
                    return Err(degenerate(target.landmark, DegenerateReason::InvertedOrientation));
                }
                Motion::ScaleX {
                    pivot: (first.x + last.x) / 2.0,
                    factor,
                }
            }
            TransformKind::CurveReshape => {
                for path in &mut resolved.paths {
                    path.segments = reshape_curve(&path.segments, descriptor.magnitude)
                        .map_err(|reason| degenerate(target.landmark, reason))?;
                }
                doc.write_landmark(&resolved);
                return Ok(());
            }
        };

        for path in &mut resolved.paths {
            path.segments = path.segments.iter().map(|s| s.map_points(|p| motion.apply(p))).collect();
        }
        doc.write_landmark(&resolved);

        for seam in descriptor.blend_region.iter().filter(|b| b.piece == target.piece) {
            let mut region = resolve(doc, seam.piece, seam.landmark)?;
            for path in &mut region.paths {
                path.segments = blend_path(&path.segments, &anchors, &motion);
            }
            doc.write_landmark(&region);
        }
        Ok(())
    }
}

fn resolve(doc: &PatternDocument, piece: Piece, landmark: Landmark) -> Result<ResolvedLandmark, GeometryError> {
    doc.resolve(landmark).map_err(|e| match e {
        ResolveError::Missing(landmark) => GeometryError::MissingLandmark { piece, landmark },
        source => GeometryError::MalformedLandmark { piece, source },
    })
}

/// Displace a seam so it stays joined to a moved landmark.
///
/// Endpoints that sit on a landmark anchor take that anchor's full
/// displacement; interior points get a share interpolated by arc length.
fn blend_path(segments: &[Segment], anchors: &[Point], motion: &Motion) -> Vec<Segment> {
    let points = on_curve_points(segments);
    let (first, last) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return segments.to_vec(),
    };

    let attached = |p: Point| anchors.iter().any(|a| a.distance(p) <= JOIN_TOLERANCE);
    let displacement = |p: Point| {
        if attached(p) {
            delta(p, motion.apply(p))
        } else {
            Point::new(0.0, 0.0)
        }
    };
    let start = displacement(first);
    let end = if points.len() > 1 { displacement(last) } else { start };
    if start == Point::new(0.0, 0.0) && end == Point::new(0.0, 0.0) {
        return segments.to_vec();
    }

    let mut arc = Vec::with_capacity(points.len());
    let mut total = 0.0;
    for (i, p) in points.iter().enumerate() {
        if i > 0 {
            total += points[i - 1].distance(*p);
        }
        arc.push(total);
    }
    let shares: Vec<Point> = arc
        .iter()
        .map(|s| {
            let t = if total > EPSILON { s / total } else { 0.0 };
            Point::new(start.x + (end.x - start.x) * t, start.y + (end.y - start.y) * t)
        })
        .collect();

    let shift = |p: Point, d: Point| p.offset(d.x, d.y);
    let mut k = 0usize;
    let mut out = Vec::with_capacity(segments.len());
    for segment in segments {
        let here = shares.get(k).copied().unwrap_or(start);
        let previous = if k > 0 { shares[k - 1] } else { here };
        let moved = match *segment {
            Segment::MoveTo(p) => Segment::MoveTo(shift(p, here)),
            Segment::LineTo(p) => Segment::LineTo(shift(p, here)),
            Segment::CubicTo(c1, c2, p) => Segment::CubicTo(shift(c1, previous), shift(c2, here), shift(p, here)),
            Segment::QuadTo(c, p) => {
                let mid = Point::new((previous.x + here.x) / 2.0, (previous.y + here.y) / 2.0);
                Segment::QuadTo(shift(c, mid), shift(p, here))
            }
            Segment::Close => Segment::Close,
        };
        if segment.end().is_some() {
            k += 1;
        }
        out.push(moved);
    }
    out
}

/// Move a curve's handles vertically by `magnitude` with its endpoints fixed.
///
/// Handles attached to an endpoint keep their direction and are rescaled so
/// their vertical offset grows by `magnitude`. Interior on-curve points and
/// their handles shift by `magnitude` directly.
///
/// Fails if a handle would collapse onto or flip through its endpoint, if the
/// two endpoint handles swap sides (a cusp), or if a non-zero magnitude
/// moves nothing because the curve has no vertical handle to stretch.
fn reshape_curve(segments: &[Segment], magnitude: f64) -> Result<Vec<Segment>, DegenerateReason> {
    if magnitude.abs() <= EPSILON {
        return Ok(segments.to_vec());
    }
    let (start, end) = end_anchors(segments).ok_or(DegenerateReason::FlatCurve)?;
    let drawn = |s: &Segment| !matches!(s, Segment::MoveTo(_) | Segment::Close);
    let first_drawn = segments.iter().position(drawn).ok_or(DegenerateReason::FlatCurve)?;
    let last_drawn = segments.iter().rposition(drawn).ok_or(DegenerateReason::FlatCurve)?;

    let lift = |p: Point| p.offset(0.0, magnitude);
    let rescale = |handle: Point, anchor: Point| -> Result<Point, DegenerateReason> {
        let dy = handle.y - anchor.y;
        if dy.abs() < EPSILON {
            return Ok(handle);
        }
        let stretch = magnitude / dy;
        if 1.0 + stretch <= EPSILON {
            return Err(DegenerateReason::CollapsedHandle);
        }
        Ok(Point::new(handle.x + (handle.x - anchor.x) * stretch, handle.y + magnitude))
    };

    let out = segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            let on_curve = |p: Point| if i == last_drawn { p } else { lift(p) };
            Ok(match *segment {
                Segment::MoveTo(p) => Segment::MoveTo(if i < first_drawn { p } else { lift(p) }),
                Segment::LineTo(p) => Segment::LineTo(on_curve(p)),
                Segment::CubicTo(c1, c2, p) => {
                    let c1 = if i == first_drawn { rescale(c1, start)? } else { lift(c1) };
                    let c2 = if i == last_drawn { rescale(c2, end)? } else { lift(c2) };
                    Segment::CubicTo(c1, c2, on_curve(p))
                }
                Segment::QuadTo(c, p) => {
                    let c = if i == first_drawn {
                        rescale(c, start)?
                    } else if i == last_drawn {
                        rescale(c, end)?
                    } else {
                        lift(c)
                    };
                    Segment::QuadTo(c, on_curve(p))
                }
                Segment::Close => Segment::Close,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let before = endpoint_handles(segments, first_drawn, last_drawn);
    let after = endpoint_handles(&out, first_drawn, last_drawn);
    if let (Some((start_before, end_before)), Some((start_after, end_after))) = (before, after) {
        let side = sign(end_before.x - start_before.x);
        if side != 0 && sign(end_after.x - start_after.x) != side {
            return Err(DegenerateReason::CrossedHandles);
        }
    }
    if out == segments {
        return Err(DegenerateReason::FlatCurve);
    }
    Ok(out)
}

/// The handle leaving the start anchor and the one entering the end anchor.
fn endpoint_handles(segments: &[Segment], first_drawn: usize, last_drawn: usize) -> Option<(Point, Point)> {
    let leaving = match segments.get(first_drawn)? {
        Segment::CubicTo(c1, _, _) => *c1,
        Segment::QuadTo(c, _) => *c,
        _ => return None,
    };
    let entering = match segments.get(last_drawn)? {
        Segment::CubicTo(_, c2, _) => *c2,
        Segment::QuadTo(c, _) => *c,
        _ => return None,
    };
    Some((leaving, entering))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::parse_path_data;

    #[test]
    fn blend_tapers_from_attached_end() {
        let seam = parse_path_data("M 28 30 L 28 65 L 28 100").unwrap();
        let anchors = [Point::new(28.0, 100.0), Point::new(72.0, 100.0)];
        let out = blend_path(&seam, &anchors, &Motion::Shift { dx: 0.0, dy: -5.0 });
        assert_eq!(
            out,
            vec![
                Segment::MoveTo(Point::new(28.0, 30.0)),
                Segment::LineTo(Point::new(28.0, 62.5)),
                Segment::LineTo(Point::new(28.0, 95.0)),
            ]
        );
    }

    #[test]
    fn unattached_seam_is_untouched() {
        let seam = parse_path_data("M 0 0 L 0 10").unwrap();
        let out = blend_path(&seam, &[Point::new(50.0, 50.0)], &Motion::Shift { dx: 0.0, dy: 3.0 });
        assert_eq!(out, seam);
    }

    #[test]
    fn reshape_keeps_endpoints_and_handle_direction() {
        let curve = parse_path_data("M 40 8 C 40 16 60 16 60 8").unwrap();
        let out = reshape_curve(&curve, 2.0).unwrap();
        assert_eq!(
            out,
            vec![
                Segment::MoveTo(Point::new(40.0, 8.0)),
                Segment::CubicTo(Point::new(40.0, 18.0), Point::new(60.0, 18.0), Point::new(60.0, 8.0)),
            ]
        );
    }

    #[test]
    fn reshape_moves_interior_joint() {
        let curve = parse_path_data("M 40 8 C 40 14 46 18 50 18 C 54 18 60 14 60 8").unwrap();
        let out = reshape_curve(&curve, 1.0).unwrap();
        assert_eq!(
            out[1],
            Segment::CubicTo(Point::new(40.0, 15.0), Point::new(46.0, 19.0), Point::new(50.0, 19.0))
        );
        assert_eq!(
            out[2],
            Segment::CubicTo(Point::new(54.0, 19.0), Point::new(60.0, 15.0), Point::new(60.0, 8.0))
        );
    }

    #[test]
    fn reshape_collapse_is_rejected() {
        let curve = parse_path_data("M 40 8 C 40 12 60 12 60 8").unwrap();
        assert_eq!(reshape_curve(&curve, -4.0).unwrap_err(), DegenerateReason::CollapsedHandle);
        assert!(reshape_curve(&curve, -3.0).is_ok());
    }

    #[test]
    fn zero_magnitude_is_identity() {
        let curve = parse_path_data("M 40 8 C 40 14 46 18 50 18 C 54 18 60 14 60 8").unwrap();
        assert_eq!(reshape_curve(&curve, 0.0).unwrap(), curve);

        let seam = parse_path_data("M 28 30 L 28 100").unwrap();
        let anchors = [Point::new(28.0, 100.0)];
        let motion = Motion::ScaleX { pivot: 50.0, factor: 1.0 };
        assert_eq!(blend_path(&seam, &anchors, &motion), seam);
    }

    #[test]
    fn reshape_crossing_handles_is_rejected() {
        let shallow = parse_path_data("M 40 8 C 45 9 55 9 60 8").unwrap();
        assert_eq!(reshape_curve(&shallow, 3.0).unwrap_err(), DegenerateReason::CrossedHandles);
        assert_eq!(
            reshape_curve(&parse_path_data("M 40 8 C 44 10 56 10 60 8").unwrap(), 6.0).unwrap_err(),
            DegenerateReason::CrossedHandles
        );

        // a small lowering keeps the handles apart
        let out = reshape_curve(&shallow, 0.5).unwrap();
        assert_eq!(
            out[1],
            Segment::CubicTo(Point::new(47.5, 9.5), Point::new(52.5, 9.5), Point::new(60.0, 8.0))
        );
    }

    #[test]
    fn reshape_without_vertical_handle_is_rejected() {
        for d in ["M 40 8 L 60 8", "M 40 8 Q 50 8 60 8", "M 40 8 C 45 8 55 8 60 8"] {
            let curve = parse_path_data(d).unwrap();
            assert_eq!(reshape_curve(&curve, 3.0).unwrap_err(), DegenerateReason::FlatCurve, "{}", d);
            assert_eq!(reshape_curve(&curve, 0.0).unwrap(), curve);
        }
    }
}
