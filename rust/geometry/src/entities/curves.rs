// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Curve entities: lines, conics, trimmed and composite curves,
//! indexed poly curves, B-splines and 2D offset curves.

use std::f64::consts::TAU;

use ifc_import_core::{AttributeValue, DecodedEntity, IfcType};
use nalgebra::{Matrix4, Point3, Vector3};

use super::{Entity, EntityCache};
use crate::error::{Error, Result};
use crate::kernel::{BSpline, Curve, CurveLoop, CurveSegment};
use crate::transform::from_axes;

const PARAMETER_EPSILON: f64 = 1e-9;

/// A bounded curve, either a single trimmed carrier or a chain of them
#[derive(Debug, Clone, PartialEq)]
pub enum CurveShape {
    Segment(CurveSegment),
    Loop(CurveLoop),
}

/// Resolved curve together with the length of its defining direction
#[derive(Debug, Clone, PartialEq)]
pub struct CurveGeometry {
    pub shape: CurveShape,
    /// Length of a line's direction vector; parameters are scaled by it
    pub parametric_scaling: f64,
}

impl CurveGeometry {
    pub fn segment(segment: CurveSegment) -> Self {
        Self {
            shape: CurveShape::Segment(segment),
            parametric_scaling: 1.0,
        }
    }

    pub fn from_loop(curve_loop: CurveLoop) -> Self {
        Self {
            shape: CurveShape::Loop(curve_loop),
            parametric_scaling: 1.0,
        }
    }

    pub fn as_segment(&self) -> Option<&CurveSegment> {
        match &self.shape {
            CurveShape::Segment(segment) => Some(segment),
            CurveShape::Loop(_) => None,
        }
    }

    pub fn to_loop(&self) -> CurveLoop {
        match &self.shape {
            CurveShape::Segment(segment) => CurveLoop::new(vec![segment.clone()]),
            CurveShape::Loop(curve_loop) => curve_loop.clone(),
        }
    }

    pub fn transformed(&self, m: &Matrix4<f64>) -> Self {
        let shape = match &self.shape {
            CurveShape::Segment(segment) => CurveShape::Segment(segment.transformed(m)),
            CurveShape::Loop(curve_loop) => CurveShape::Loop(curve_loop.transformed(m)),
        };
        Self {
            shape,
            parametric_scaling: self.parametric_scaling,
        }
    }

    /// Loop between two curve parameters.
    ///
    /// A single segment is parametrized like its carrier; a chain uses one
    /// unit of parameter per member segment.
    pub fn trimmed(&self, start: Option<f64>, end: Option<f64>) -> CurveLoop {
        let curve_loop = self.to_loop();
        let to_loop_parameter = |t: f64| match &self.shape {
            CurveShape::Segment(segment) => {
                let span = segment.end - segment.start;
                if span.abs() < PARAMETER_EPSILON {
                    0.0
                } else {
                    (t - segment.start) / span
                }
            }
            CurveShape::Loop(_) => t,
        };
        let from = start.map_or(0.0, to_loop_parameter);
        let to = end.map_or(curve_loop.end_parameter(), to_loop_parameter);
        if from == 0.0 && to == curve_loop.end_parameter() {
            curve_loop
        } else {
            curve_loop.sub_loop(from, to)
        }
    }

    /// Portion of the carrier running from `from` to `to`.
    ///
    /// `same_sense` false means travelling against the carrier's parameter
    /// direction, which matters only for closed carriers.
    pub fn between(
        &self,
        from: &Point3<f64>,
        to: &Point3<f64>,
        same_sense: bool,
    ) -> Option<CurveSegment> {
        let segment = self.as_segment()?;
        let curve = &segment.curve;
        let t0 = curve.parameter_of(from)?;
        let mut t1 = curve.parameter_of(to)?;
        if curve.is_periodic() {
            if same_sense && t1 <= t0 + PARAMETER_EPSILON {
                t1 += TAU;
            } else if !same_sense && t1 >= t0 - PARAMETER_EPSILON {
                t1 -= TAU;
            }
        }
        Some(CurveSegment::new(curve.clone(), t0, t1))
    }
}

impl EntityCache<'_> {
    pub(crate) fn curve(&mut self, id: u32) -> Result<CurveGeometry> {
        self.settled_as(id, IfcType::IfcCurve, "a curve", |e| match e {
            Entity::Curve(curve) => Some(curve.clone()),
            _ => None,
        })
    }
}

pub(crate) fn load_line(cache: &mut EntityCache<'_>, entity: &DecodedEntity) -> Result<Entity> {
    let origin = cache.point(entity.required_ref(0, "Pnt")?)?;
    let direction = cache.vector(entity.required_ref(1, "Dir")?)?;
    let scaling = direction.norm();
    if scaling < PARAMETER_EPSILON {
        return Err(Error::entity(entity.id, "line direction has zero length"));
    }
    Ok(Entity::Curve(CurveGeometry {
        shape: CurveShape::Segment(CurveSegment::full(Curve::Line { origin, direction })),
        parametric_scaling: scaling,
    }))
}

pub(crate) fn load_circle(cache: &mut EntityCache<'_>, entity: &DecodedEntity) -> Result<Entity> {
    let frame = cache.placement(entity.required_ref(0, "Position")?)?;
    let radius = entity.required_float(1, "Radius")?;
    if radius <= 0.0 {
        return Err(Error::entity(entity.id, "circle radius must be positive"));
    }
    Ok(Entity::Curve(CurveGeometry::segment(CurveSegment::full(
        Curve::Conic {
            frame,
            radius_x: radius,
            radius_y: radius,
        },
    ))))
}

pub(crate) fn load_ellipse(cache: &mut EntityCache<'_>, entity: &DecodedEntity) -> Result<Entity> {
    let frame = cache.placement(entity.required_ref(0, "Position")?)?;
    let radius_x = entity.required_float(1, "SemiAxis1")?;
    let radius_y = entity.required_float(2, "SemiAxis2")?;
    if radius_x <= 0.0 || radius_y <= 0.0 {
        return Err(Error::entity(entity.id, "ellipse semi axes must be positive"));
    }
    Ok(Entity::Curve(CurveGeometry::segment(CurveSegment::full(
        Curve::Conic {
            frame,
            radius_x,
            radius_y,
        },
    ))))
}

pub(crate) fn load_polyline(cache: &mut EntityCache<'_>, entity: &DecodedEntity) -> Result<Entity> {
    let points = entity
        .required_refs(0, "Points")?
        .into_iter()
        .map(|id| cache.point(id))
        .collect::<Result<Vec<_>>>()?;
    if points.len() < 2 {
        return Err(Error::entity(entity.id, "polyline needs at least two points"));
    }
    Ok(Entity::Curve(CurveGeometry::segment(CurveSegment::polyline(
        points,
    ))))
}

/// Trim select values: a cartesian point and/or a parameter
fn trim_values(
    cache: &mut EntityCache<'_>,
    values: &[AttributeValue],
) -> Result<(Option<Point3<f64>>, Option<f64>)> {
    let mut point = None;
    let mut parameter = None;
    for value in values {
        if let Some(id) = value.as_entity_ref() {
            point = Some(cache.point(id)?);
        } else if let Some(t) = value.as_float() {
            parameter = Some(t);
        }
    }
    Ok((point, parameter))
}

pub(crate) fn load_trimmed_curve(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let basis = cache.curve(entity.required_ref(0, "BasisCurve")?)?;
    let carrier = basis
        .as_segment()
        .map(|segment| segment.curve.clone())
        .ok_or_else(|| Error::entity(entity.id, "trimmed curve basis must be a single carrier"))?;
    let trim1 = trim_values(cache, entity.list(1).unwrap_or_default())?;
    let trim2 = trim_values(cache, entity.list(2).unwrap_or_default())?;
    let sense = entity.optional_bool(3).unwrap_or(true);
    let prefer_parameter = entity.optional_enum(4) == Some("PARAMETER");

    let resolve = |(point, parameter): (Option<Point3<f64>>, Option<f64>)| -> Option<f64> {
        let from_point = point.and_then(|p| carrier.parameter_of(&p));
        if prefer_parameter {
            parameter.or(from_point)
        } else {
            from_point.or(parameter)
        }
    };
    let (Some(start), Some(mut end)) = (resolve(trim1), resolve(trim2)) else {
        return Err(Error::entity(entity.id, "trimming values could not be resolved"));
    };

    if carrier.is_periodic() {
        if sense && end <= start + PARAMETER_EPSILON {
            end += TAU;
        } else if !sense && end >= start - PARAMETER_EPSILON {
            end -= TAU;
        }
    }

    Ok(Entity::Curve(CurveGeometry {
        shape: CurveShape::Segment(CurveSegment::new(carrier, start, end)),
        parametric_scaling: basis.parametric_scaling,
    }))
}

pub(crate) fn load_composite_curve_segment(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let same_sense = entity.required_bool(1, "SameSense")?;
    let parent = cache.curve(entity.required_ref(2, "ParentCurve")?)?;
    let curve_loop = parent.to_loop();
    Ok(Entity::Curve(CurveGeometry::from_loop(if same_sense {
        curve_loop
    } else {
        curve_loop.reversed()
    })))
}

pub(crate) fn load_composite_curve(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let mut segments = Vec::new();
    for id in entity.required_refs(0, "Segments")? {
        let member = cache.settled_as(
            id,
            IfcType::IfcCompositeCurveSegment,
            "a composite curve segment",
            |e| match e {
                Entity::Curve(curve) => Some(curve.to_loop()),
                _ => None,
            },
        )?;
        segments.extend(member.segments);
    }
    if segments.is_empty() {
        return Err(Error::entity(entity.id, "composite curve has no segments"));
    }
    Ok(Entity::Curve(CurveGeometry::from_loop(CurveLoop::new(
        segments,
    ))))
}

/// Circular arc through three points, or a line when they are collinear
pub(crate) fn arc_through(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) -> CurveSegment {
    let ab = b - a;
    let ac = c - a;
    let normal = ab.cross(&ac);
    let squared = normal.norm_squared();
    if squared < 1e-18 {
        return CurveSegment::line(a, c);
    }
    let center = a + (normal.cross(&ab) * ac.norm_squared() + ac.cross(&normal) * ab.norm_squared())
        / (2.0 * squared);
    let radius = (a - center).norm();
    let x = (a - center) / radius;
    let z = normal / squared.sqrt();
    let y = z.cross(&x);
    let to_c = c - center;
    let mut end = to_c.dot(&y).atan2(to_c.dot(&x));
    if end <= 0.0 {
        end += TAU;
    }
    CurveSegment::new(
        Curve::Conic {
            frame: from_axes(&center, &x, &y, &z),
            radius_x: radius,
            radius_y: radius,
        },
        0.0,
        end,
    )
}

pub(crate) fn load_indexed_poly_curve(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let points = cache.point_list(entity.required_ref(0, "Points")?)?;
    let at = |index: i64| -> Result<Point3<f64>> {
        usize::try_from(index - 1)
            .ok()
            .and_then(|i| points.get(i).copied())
            .ok_or_else(|| Error::entity(entity.id, format!("point index {} out of range", index)))
    };

    let Some(segment_values) = entity.list(1) else {
        if points.len() < 2 {
            return Err(Error::entity(entity.id, "poly curve needs at least two points"));
        }
        return Ok(Entity::Curve(CurveGeometry::segment(
            CurveSegment::polyline(points.clone()),
        )));
    };

    let mut segments = Vec::with_capacity(segment_values.len());
    for value in segment_values {
        let (name, args) = value
            .as_typed()
            .ok_or_else(|| Error::entity(entity.id, "segment must be a line or arc index"))?;
        let indices: Vec<i64> = args
            .first()
            .and_then(AttributeValue::as_list)
            .map(|list| list.iter().filter_map(AttributeValue::as_int).collect())
            .unwrap_or_default();
        if name.eq_ignore_ascii_case("IFCARCINDEX") {
            let [a, b, c] = indices[..] else {
                return Err(Error::entity(entity.id, "arc index needs three points"));
            };
            segments.push(arc_through(at(a)?, at(b)?, at(c)?));
        } else if indices.len() >= 2 {
            let polyline = indices.iter().map(|&i| at(i)).collect::<Result<Vec<_>>>()?;
            segments.push(CurveSegment::polyline(polyline));
        } else {
            return Err(Error::entity(entity.id, "line index needs two points"));
        }
    }
    Ok(Entity::Curve(CurveGeometry::from_loop(CurveLoop::new(
        segments,
    ))))
}

pub(crate) fn load_bspline_curve(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
    rational: bool,
) -> Result<Entity> {
    let degree = entity
        .optional_int(0)
        .and_then(|d| usize::try_from(d).ok())
        .filter(|&d| d > 0)
        .ok_or_else(|| Error::entity(entity.id, "invalid B-spline degree"))?;
    let control_points = entity
        .required_refs(1, "ControlPointsList")?
        .into_iter()
        .map(|id| cache.point(id))
        .collect::<Result<Vec<_>>>()?;
    let multiplicities = entity.required_ints(5, "KnotMultiplicities")?;
    let knots = entity.required_floats(6, "Knots")?;
    let weights = if rational {
        Some(entity.required_floats(8, "WeightsData")?)
    } else {
        None
    };
    let spline = BSpline::new(degree, control_points, weights, &multiplicities, &knots)
        .map_err(|e| Error::entity(entity.id, e.to_string()))?;
    Ok(Entity::Curve(CurveGeometry::segment(CurveSegment::full(
        Curve::BSpline(spline),
    ))))
}

/// Offset of a planar polyline in its XY plane, positive to the left
fn offset_polyline(points: &[Point3<f64>], distance: f64, closed: bool) -> Vec<Point3<f64>> {
    let n = points.len();
    let edge_count = if closed { n } else { n - 1 };
    let left_normal = |i: usize| {
        let d = points[(i + 1) % n] - points[i];
        Vector3::new(-d.y, d.x, 0.0)
            .try_normalize(1e-12)
            .unwrap_or_else(Vector3::zeros)
    };
    let normals: Vec<Vector3<f64>> = (0..edge_count).map(left_normal).collect();

    (0..n)
        .map(|i| {
            let before = if i > 0 {
                Some(normals[i - 1])
            } else if closed {
                normals.last().copied()
            } else {
                None
            };
            let after = normals.get(i).copied();
            let offset = match (before, after) {
                (Some(a), Some(b)) => {
                    let bisector = a + b;
                    let cos_half = bisector.norm() / 2.0;
                    match bisector.try_normalize(1e-9) {
                        Some(dir) if cos_half > 1e-3 => dir * (distance / cos_half),
                        _ => a * distance,
                    }
                }
                (Some(a), None) | (None, Some(a)) => a * distance,
                (None, None) => Vector3::zeros(),
            };
            points[i] + offset
        })
        .collect()
}

pub(crate) fn load_offset_curve_2d(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let basis = cache.curve(entity.required_ref(0, "BasisCurve")?)?;
    let distance = entity.required_float(1, "Distance")?;
    let basis_loop = basis.to_loop();
    let closed = basis_loop.is_closed(1e-9);
    let points = basis_loop.points(cache.options.arc_segments);
    if points.len() < 2 {
        return Err(Error::entity(entity.id, "offset basis curve is degenerate"));
    }
    let mut offset = offset_polyline(&points, distance, closed);
    if closed {
        offset.push(offset[0]);
    }
    Ok(Entity::Curve(CurveGeometry::segment(CurveSegment::polyline(
        offset,
    ))))
}
