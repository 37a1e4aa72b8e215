// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Curves and curve loops.
//!
//! A [`Curve`] is an unbounded (or periodic) carrier; a [`CurveSegment`]
//! bounds it by a start and end parameter and may run backwards. Loops are
//! ordered, connected segments. Everything is tessellated lazily.

use std::f64::consts::TAU;

use nalgebra::{Matrix4, Point3, Vector3};

use crate::error::{Error, Result};
use crate::transform::{linear_part, transform_vector};

const JOIN_TOLERANCE: f64 = 1e-9;

/// Non-uniform rational B-spline carrier
#[derive(Debug, Clone, PartialEq)]
pub struct BSpline {
    pub degree: usize,
    pub control_points: Vec<Point3<f64>>,
    /// Rational weights, one per control point
    pub weights: Option<Vec<f64>>,
    /// Expanded knot vector (multiplicities applied)
    pub knots: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Curve {
    /// `origin + t * direction`; the direction length is the parametric scaling
    Line {
        origin: Point3<f64>,
        direction: Vector3<f64>,
    },
    /// Circle or ellipse: `frame * (r1 cos t, r2 sin t, 0)` with `t` in radians
    Conic {
        frame: Matrix4<f64>,
        radius_x: f64,
        radius_y: f64,
    },
    /// Parameter `i` is the i-th vertex
    Polyline(Vec<Point3<f64>>),
    BSpline(BSpline),
}

impl BSpline {
    /// Build from IFC style knots with multiplicities
    pub fn new(
        degree: usize,
        control_points: Vec<Point3<f64>>,
        weights: Option<Vec<f64>>,
        multiplicities: &[i64],
        knots: &[f64],
    ) -> Result<Self> {
        let expanded: Vec<f64> = multiplicities
            .iter()
            .zip(knots)
            .flat_map(|(&m, &k)| std::iter::repeat(k).take(m.max(0) as usize))
            .collect();
        if degree == 0 || control_points.len() <= degree {
            return Err(Error::geometry(format!(
                "B-spline of degree {} needs more than {} control points",
                degree,
                control_points.len()
            )));
        }
        if expanded.len() != control_points.len() + degree + 1 {
            return Err(Error::geometry(format!(
                "B-spline has {} knots, expected {}",
                expanded.len(),
                control_points.len() + degree + 1
            )));
        }
        if let Some(w) = &weights {
            if w.len() != control_points.len() || w.iter().any(|&w| w <= 0.0) {
                return Err(Error::geometry("B-spline weights are invalid"));
            }
        }
        Ok(Self {
            degree,
            control_points,
            weights,
            knots: expanded,
        })
    }

    pub fn domain(&self) -> (f64, f64) {
        (
            self.knots[self.degree],
            self.knots[self.control_points.len()],
        )
    }

    /// De Boor evaluation in homogeneous coordinates
    pub fn point_at(&self, t: f64) -> Point3<f64> {
        let (lo, hi) = self.domain();
        let t = t.clamp(lo, hi);
        let p = self.degree;
        let n = self.control_points.len();

        let mut span = p;
        while span < n - 1 && t >= self.knots[span + 1] {
            span += 1;
        }

        let weight = |i: usize| self.weights.as_ref().map_or(1.0, |w| w[i]);
        let mut d: Vec<(Vector3<f64>, f64)> = (0..=p)
            .map(|j| {
                let i = span + j - p;
                let w = weight(i);
                (self.control_points[i].coords * w, w)
            })
            .collect();

        for r in 1..=p {
            for j in (r..=p).rev() {
                let i = span + j - p;
                let denominator = self.knots[i + p - r + 1] - self.knots[i];
                let alpha = if denominator.abs() < f64::EPSILON {
                    0.0
                } else {
                    (t - self.knots[i]) / denominator
                };
                d[j] = (
                    d[j - 1].0 * (1.0 - alpha) + d[j].0 * alpha,
                    d[j - 1].1 * (1.0 - alpha) + d[j].1 * alpha,
                );
            }
        }
        let (point, w) = d[p];
        Point3::from(point / w)
    }
}

impl Curve {
    /// Natural parameter range of a bare carrier
    pub fn default_range(&self) -> (f64, f64) {
        match self {
            Curve::Line { .. } => (0.0, 1.0),
            Curve::Conic { .. } => (0.0, TAU),
            Curve::Polyline(points) => (0.0, points.len().saturating_sub(1) as f64),
            Curve::BSpline(spline) => spline.domain(),
        }
    }

    pub fn is_periodic(&self) -> bool {
        matches!(self, Curve::Conic { .. })
    }

    pub fn point_at(&self, t: f64) -> Point3<f64> {
        match self {
            Curve::Line { origin, direction } => origin + direction * t,
            Curve::Conic {
                frame,
                radius_x,
                radius_y,
            } => frame.transform_point(&Point3::new(radius_x * t.cos(), radius_y * t.sin(), 0.0)),
            Curve::Polyline(points) => {
                if points.len() < 2 {
                    return points.first().copied().unwrap_or_else(Point3::origin);
                }
                let last = (points.len() - 2) as f64;
                let index = t.floor().clamp(0.0, last);
                let i = index as usize;
                let local = t - index;
                points[i] + (points[i + 1] - points[i]) * local
            }
            Curve::BSpline(spline) => spline.point_at(t),
        }
    }

    /// First derivative with respect to the curve parameter
    pub fn derivative_at(&self, t: f64) -> Vector3<f64> {
        match self {
            Curve::Line { direction, .. } => *direction,
            Curve::Conic {
                frame,
                radius_x,
                radius_y,
            } => transform_vector(
                frame,
                &Vector3::new(-radius_x * t.sin(), radius_y * t.cos(), 0.0),
            ),
            Curve::Polyline(points) => {
                if points.len() < 2 {
                    return Vector3::zeros();
                }
                let last = points.len() - 2;
                let i = (t.floor().max(0.0) as usize).min(last);
                points[i + 1] - points[i]
            }
            Curve::BSpline(spline) => {
                let (lo, hi) = spline.domain();
                let h = (hi - lo) * 1e-6;
                let a = (t - h).max(lo);
                let b = (t + h).min(hi);
                if b - a <= 0.0 {
                    return Vector3::zeros();
                }
                (spline.point_at(b) - spline.point_at(a)) / (b - a)
            }
        }
    }

    /// Parameter of the curve point closest to `point`, used for cartesian trims
    pub fn parameter_of(&self, point: &Point3<f64>) -> Option<f64> {
        match self {
            Curve::Line { origin, direction } => {
                let squared = direction.norm_squared();
                (squared > f64::EPSILON).then(|| (point - origin).dot(direction) / squared)
            }
            Curve::Conic {
                frame,
                radius_x,
                radius_y,
            } => {
                let local = frame.try_inverse()?.transform_point(point);
                let angle = (local.y / radius_y).atan2(local.x / radius_x);
                Some(if angle < 0.0 { angle + TAU } else { angle })
            }
            Curve::Polyline(points) => points
                .windows(2)
                .enumerate()
                .map(|(i, w)| {
                    let edge = w[1] - w[0];
                    let squared = edge.norm_squared();
                    let local = if squared > f64::EPSILON {
                        ((point - w[0]).dot(&edge) / squared).clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    let distance = (w[0] + edge * local - point).norm();
                    (i as f64 + local, distance)
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(t, _)| t),
            Curve::BSpline(spline) => {
                let (lo, hi) = spline.domain();
                let samples = spline.control_points.len() * 16;
                (0..=samples)
                    .map(|i| lo + (hi - lo) * i as f64 / samples as f64)
                    .min_by(|&a, &b| {
                        let da = (spline.point_at(a) - point).norm();
                        let db = (spline.point_at(b) - point).norm();
                        da.total_cmp(&db)
                    })
            }
        }
    }

    pub fn transformed(&self, m: &Matrix4<f64>) -> Curve {
        match self {
            Curve::Line { origin, direction } => Curve::Line {
                origin: m.transform_point(origin),
                direction: linear_part(m) * direction,
            },
            Curve::Conic {
                frame,
                radius_x,
                radius_y,
            } => Curve::Conic {
                frame: m * frame,
                radius_x: *radius_x,
                radius_y: *radius_y,
            },
            Curve::Polyline(points) => {
                Curve::Polyline(points.iter().map(|p| m.transform_point(p)).collect())
            }
            Curve::BSpline(spline) => Curve::BSpline(BSpline {
                control_points: spline
                    .control_points
                    .iter()
                    .map(|p| m.transform_point(p))
                    .collect(),
                ..spline.clone()
            }),
        }
    }
}

/// A carrier bounded by two parameters; runs backwards when `end < start`
#[derive(Debug, Clone, PartialEq)]
pub struct CurveSegment {
    pub curve: Curve,
    pub start: f64,
    pub end: f64,
}

impl CurveSegment {
    pub fn new(curve: Curve, start: f64, end: f64) -> Self {
        Self { curve, start, end }
    }

    /// The carrier over its natural range
    pub fn full(curve: Curve) -> Self {
        let (start, end) = curve.default_range();
        Self { curve, start, end }
    }

    pub fn line(from: Point3<f64>, to: Point3<f64>) -> Self {
        Self::new(
            Curve::Line {
                origin: from,
                direction: to - from,
            },
            0.0,
            1.0,
        )
    }

    pub fn polyline(points: Vec<Point3<f64>>) -> Self {
        Self::full(Curve::Polyline(points))
    }

    pub fn start_point(&self) -> Point3<f64> {
        self.curve.point_at(self.start)
    }

    pub fn end_point(&self) -> Point3<f64> {
        self.curve.point_at(self.end)
    }

    /// Map a unit parameter `s` in `[0, 1]` to the carrier parameter
    pub fn parameter_at(&self, s: f64) -> f64 {
        self.start + (self.end - self.start) * s
    }

    /// Tangent in the direction of travel
    pub fn tangent_at(&self, t: f64) -> Vector3<f64> {
        let d = self.curve.derivative_at(t);
        if self.end < self.start {
            -d
        } else {
            d
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            curve: self.curve.clone(),
            start: self.end,
            end: self.start,
        }
    }

    pub fn transformed(&self, m: &Matrix4<f64>) -> Self {
        Self {
            curve: self.curve.transformed(m),
            start: self.start,
            end: self.end,
        }
    }

    /// Sub-segment between two unit parameters
    pub fn sub_segment(&self, from: f64, to: f64) -> Self {
        Self {
            curve: self.curve.clone(),
            start: self.parameter_at(from),
            end: self.parameter_at(to),
        }
    }

    /// Points along the segment, both ends included
    pub fn tessellate(&self, arc_segments: usize) -> Vec<Point3<f64>> {
        match &self.curve {
            Curve::Line { .. } => vec![self.start_point(), self.end_point()],
            Curve::Conic { .. } => {
                let sweep = self.end - self.start;
                let steps = ((sweep.abs() / TAU) * arc_segments.max(3) as f64)
                    .ceil()
                    .max(2.0) as usize;
                self.sample(steps)
            }
            Curve::Polyline(_) => {
                let mut points = vec![self.start_point()];
                let (lo, hi) = (self.start.min(self.end), self.start.max(self.end));
                let mut interior: Vec<f64> = ((lo.floor() as i64 + 1)..=(hi.ceil() as i64 - 1))
                    .map(|i| i as f64)
                    .filter(|&t| t > lo && t < hi)
                    .collect();
                if self.end < self.start {
                    interior.reverse();
                }
                points.extend(interior.into_iter().map(|t| self.curve.point_at(t)));
                points.push(self.end_point());
                points
            }
            Curve::BSpline(spline) => {
                let steps = (spline.control_points.len() * 4).max(8);
                self.sample(steps)
            }
        }
    }

    fn sample(&self, steps: usize) -> Vec<Point3<f64>> {
        (0..=steps)
            .map(|i| self.curve.point_at(self.parameter_at(i as f64 / steps as f64)))
            .collect()
    }
}

/// Ordered, connected segments
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CurveLoop {
    pub segments: Vec<CurveSegment>,
}

impl CurveLoop {
    pub fn new(segments: Vec<CurveSegment>) -> Self {
        Self { segments }
    }

    /// Closed polygon through the given points
    pub fn polygon(points: &[Point3<f64>]) -> Self {
        let mut closed = points.to_vec();
        if let (Some(first), Some(last)) = (points.first(), points.last()) {
            if (first - last).norm() > JOIN_TOLERANCE {
                closed.push(*first);
            }
        }
        Self::new(vec![CurveSegment::polyline(closed)])
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn start_point(&self) -> Option<Point3<f64>> {
        self.segments.first().map(CurveSegment::start_point)
    }

    pub fn end_point(&self) -> Option<Point3<f64>> {
        self.segments.last().map(CurveSegment::end_point)
    }

    pub fn is_closed(&self, tolerance: f64) -> bool {
        match (self.start_point(), self.end_point()) {
            (Some(a), Some(b)) => (a - b).norm() <= tolerance,
            _ => false,
        }
    }

    /// Tessellated vertices with joints merged; a closing duplicate is removed
    pub fn points(&self, arc_segments: usize) -> Vec<Point3<f64>> {
        let mut points: Vec<Point3<f64>> = Vec::new();
        for segment in &self.segments {
            for p in segment.tessellate(arc_segments) {
                if points
                    .last()
                    .map_or(true, |last| (last - p).norm() > JOIN_TOLERANCE)
                {
                    points.push(p);
                }
            }
        }
        if points.len() > 1 {
            let (first, last) = (points[0], points[points.len() - 1]);
            if (first - last).norm() <= JOIN_TOLERANCE {
                points.pop();
            }
        }
        points
    }

    pub fn transformed(&self, m: &Matrix4<f64>) -> Self {
        Self::new(self.segments.iter().map(|s| s.transformed(m)).collect())
    }

    pub fn reversed(&self) -> Self {
        Self::new(self.segments.iter().rev().map(CurveSegment::reversed).collect())
    }

    /// Parameter range; segment `i` spans `[i, i + 1]`
    pub fn end_parameter(&self) -> f64 {
        self.segments.len() as f64
    }

    pub fn point_at(&self, t: f64) -> Option<Point3<f64>> {
        let (segment, s) = self.locate(t)?;
        Some(segment.curve.point_at(segment.parameter_at(s)))
    }

    pub fn tangent_at(&self, t: f64) -> Option<Vector3<f64>> {
        let (segment, s) = self.locate(t)?;
        Some(segment.tangent_at(segment.parameter_at(s)))
    }

    fn locate(&self, t: f64) -> Option<(&CurveSegment, f64)> {
        if self.segments.is_empty() {
            return None;
        }
        let t = t.clamp(0.0, self.end_parameter());
        let i = (t.floor() as usize).min(self.segments.len() - 1);
        Some((&self.segments[i], t - i as f64))
    }

    /// Portion of the loop between two loop parameters
    pub fn sub_loop(&self, from: f64, to: f64) -> Self {
        let end = self.end_parameter();
        let (from, to) = (from.clamp(0.0, end), to.clamp(0.0, end));
        if to <= from {
            return Self::default();
        }
        let segments = self
            .segments
            .iter()
            .enumerate()
            .filter_map(|(i, segment)| {
                let lo = (from - i as f64).clamp(0.0, 1.0);
                let hi = (to - i as f64).clamp(0.0, 1.0);
                (hi > lo).then(|| segment.sub_segment(lo, hi))
            })
            .collect();
        Self::new(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn unit_circle() -> Curve {
        Curve::Conic {
            frame: Matrix4::identity(),
            radius_x: 1.0,
            radius_y: 1.0,
        }
    }

    #[test]
    fn test_line_parametric_scaling() {
        let line = Curve::Line {
            origin: Point3::origin(),
            direction: Vector3::new(2.0, 0.0, 0.0),
        };
        assert_relative_eq!(line.point_at(1.5), Point3::new(3.0, 0.0, 0.0));
        assert_relative_eq!(line.parameter_of(&Point3::new(3.0, 1.0, 0.0)).unwrap(), 1.5);
    }

    #[test]
    fn test_conic_parameter_round_trips() {
        let circle = unit_circle();
        let p = circle.point_at(3.0 * FRAC_PI_2);
        assert_relative_eq!(circle.parameter_of(&p).unwrap(), 3.0 * FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_reversed_arc_tessellation() {
        let arc = CurveSegment::new(unit_circle(), PI, 0.0);
        let points = arc.tessellate(24);
        assert_relative_eq!(points[0], Point3::new(-1.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(points[points.len() - 1], Point3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
        assert!(points[points.len() / 2].y > 0.9);
    }

    #[test]
    fn test_polyline_sub_range() {
        let segment = CurveSegment::new(
            Curve::Polyline(vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
            ]),
            0.5,
            2.0,
        );
        let points = segment.tessellate(24);
        assert_eq!(
            points,
            vec![
                Point3::new(0.5, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0)
            ]
        );
    }

    #[test]
    fn test_bspline_clamped_endpoints() {
        let spline = BSpline::new(
            2,
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 2.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
            ],
            None,
            &[3, 3],
            &[0.0, 1.0],
        )
        .unwrap();
        assert_relative_eq!(spline.point_at(0.0), Point3::new(0.0, 0.0, 0.0));
        assert_relative_eq!(spline.point_at(1.0), Point3::new(2.0, 0.0, 0.0));
        assert_relative_eq!(spline.point_at(0.5), Point3::new(1.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_bspline_rejects_bad_knots() {
        let result = BSpline::new(
            2,
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)],
            None,
            &[2, 2],
            &[0.0, 1.0],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_polygon_loop_points_drop_closing_duplicate() {
        let square = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let curve_loop = CurveLoop::polygon(&square);
        assert!(curve_loop.is_closed(1e-9));
        assert_eq!(curve_loop.points(24), square.to_vec());
    }

    #[test]
    fn test_sub_loop() {
        let curve_loop = CurveLoop::new(vec![
            CurveSegment::line(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)),
            CurveSegment::line(Point3::new(2.0, 0.0, 0.0), Point3::new(2.0, 2.0, 0.0)),
        ]);
        let sub = curve_loop.sub_loop(0.5, 1.5);
        assert_eq!(sub.segments.len(), 2);
        assert_relative_eq!(sub.start_point().unwrap(), Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(sub.end_point().unwrap(), Point3::new(2.0, 1.0, 0.0));
        assert_relative_eq!(curve_loop.tangent_at(1.2).unwrap(), Vector3::new(0.0, 2.0, 0.0));
    }
}
