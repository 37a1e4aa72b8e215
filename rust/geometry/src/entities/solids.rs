// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Swept solids, CSG primitives and half-spaces.

use ifc_import_core::{DecodedEntity, IfcType};
use nalgebra::{Matrix4, Point3, Vector3};

use super::{CurveGeometry, Entity, EntityCache, EntityKey, Item, Profile};
use crate::builder::{BuilderMode, TessellationFallback, TessellationTarget};
use crate::diagnostics::DiagnosticKind;
use crate::error::{Error, Result};
use crate::kernel::{box_solid, BooleanOperator, Curve, CurveLoop, CurveSegment, GeometryObject, Solid};
use crate::scope::ShapeEditScope;
use crate::transform::{
    from_axes, origin, perpendicular_to, transform_vector, translation, x_axis, y_axis, z_axis,
};

/// Position of a cross-section along a directrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceExpression {
    pub distance_along: f64,
    pub offset_lateral: f64,
    pub offset_vertical: f64,
    pub offset_longitudinal: f64,
    /// Measure `distance_along` in plan, ignoring elevation
    pub along_horizontal: bool,
}

impl EntityCache<'_> {
    pub(crate) fn plane(&mut self, id: u32) -> Result<Matrix4<f64>> {
        self.settled_as(id, IfcType::IfcSurface, "a plane", |e| match e {
            Entity::Plane(m) => Some(*m),
            _ => None,
        })
    }

    fn distance_expression(&mut self, id: u32) -> Result<DistanceExpression> {
        self.settled_as(id, IfcType::IfcDistanceExpression, "a distance expression", |e| match e {
            Entity::DistanceExpression(d) => Some(*d),
            _ => None,
        })
    }
}

pub(crate) fn load_plane(cache: &mut EntityCache<'_>, entity: &DecodedEntity) -> Result<Entity> {
    let position = cache.placement(entity.required_ref(0, "Position")?)?;
    Ok(Entity::Plane(position))
}

pub(crate) fn load_extruded_area_solid(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let profile = cache.child(entity.required_ref(0, "SweptArea")?, IfcType::IfcProfileDef)?;
    let position = cache.optional_placement(entity.optional_ref(1))?;
    let direction = cache.direction(entity.required_ref(2, "ExtrudedDirection")?)?;
    let depth = entity.required_float(3, "Depth")?;
    if direction.norm() < 1e-12 {
        return Err(Error::entity(entity.id, "extrusion direction has zero length"));
    }
    Ok(Entity::Item(Item::ExtrudedArea {
        profile,
        position,
        direction,
        depth,
    }))
}

pub(crate) fn load_revolved_area_solid(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let profile = cache.child(entity.required_ref(0, "SweptArea")?, IfcType::IfcProfileDef)?;
    let position = cache.optional_placement(entity.optional_ref(1))?;
    let axis = cache.placement(entity.required_ref(2, "Axis")?)?;
    let angle = entity.required_float(3, "Angle")?;
    Ok(Entity::Item(Item::RevolvedArea {
        profile,
        position,
        axis_origin: origin(&axis),
        axis: z_axis(&axis),
        angle,
    }))
}

pub(crate) fn load_surface_curve_swept_area_solid(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let profile = cache.child(entity.required_ref(0, "SweptArea")?, IfcType::IfcProfileDef)?;
    let position = cache.optional_placement(entity.optional_ref(1))?;
    let directrix = cache.curve(entity.required_ref(2, "Directrix")?)?;
    let reference = cache.plane(entity.required_ref(5, "ReferenceSurface")?)?;
    Ok(Entity::Item(Item::SurfaceCurveSwept {
        profile,
        position,
        directrix,
        start: entity.optional_float(3),
        end: entity.optional_float(4),
        reference,
    }))
}

pub(crate) fn load_swept_disk_solid(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let directrix = cache.curve(entity.required_ref(0, "Directrix")?)?;
    let radius = entity.required_float(1, "Radius")?;
    let inner_radius = entity.optional_float(2).filter(|&r| r > 0.0);
    if radius <= 0.0 || inner_radius.is_some_and(|r| r >= radius) {
        return Err(Error::entity(entity.id, "invalid disk radii"));
    }
    Ok(Entity::Item(Item::SweptDisk {
        directrix,
        radius,
        inner_radius,
        start: entity.optional_float(3),
        end: entity.optional_float(4),
    }))
}

pub(crate) fn load_sectioned_solid_horizontal(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let directrix = cache.curve(entity.required_ref(0, "Directrix")?)?;
    let sections = cache.children(
        &entity.required_refs(1, "CrossSections")?,
        IfcType::IfcProfileDef,
    )?;
    let positions = entity
        .required_refs(2, "CrossSectionPositions")?
        .into_iter()
        .map(|id| cache.distance_expression(id))
        .collect::<Result<Vec<_>>>()?;
    if sections.len() < 2 || sections.len() != positions.len() {
        return Err(Error::entity(
            entity.id,
            "needs at least two cross sections, each with a position",
        ));
    }
    Ok(Entity::Item(Item::SectionedHorizontal {
        directrix,
        sections,
        positions,
    }))
}

pub(crate) fn load_distance_expression(
    _cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    Ok(Entity::DistanceExpression(DistanceExpression {
        distance_along: entity.required_float(0, "DistanceAlong")?,
        offset_lateral: entity.optional_float(1).unwrap_or(0.0),
        offset_vertical: entity.optional_float(2).unwrap_or(0.0),
        offset_longitudinal: entity.optional_float(3).unwrap_or(0.0),
        along_horizontal: entity.optional_bool(4).unwrap_or(true),
    }))
}

pub(crate) fn load_half_space_solid(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let plane = cache.plane(entity.required_ref(0, "BaseSurface")?)?;
    let agreement = entity.required_bool(1, "AgreementFlag")?;
    let boundary = if entity.is_subtype_of(IfcType::IfcPolygonalBoundedHalfSpace) {
        let position = cache.placement(entity.required_ref(2, "Position")?)?;
        let polygon = cache.curve(entity.required_ref(3, "PolygonalBoundary")?)?;
        Some((position, polygon.to_loop()))
    } else {
        None
    };
    Ok(Entity::Item(Item::HalfSpace {
        plane,
        agreement,
        boundary,
    }))
}

pub(crate) fn load_block(cache: &mut EntityCache<'_>, entity: &DecodedEntity) -> Result<Entity> {
    let position = cache.placement(entity.required_ref(0, "Position")?)?;
    let size = Vector3::new(
        entity.required_float(1, "XLength")?,
        entity.required_float(2, "YLength")?,
        entity.required_float(3, "ZLength")?,
    );
    if size.iter().any(|&l| l <= 0.0) {
        return Err(Error::entity(entity.id, "block lengths must be positive"));
    }
    Ok(Entity::Item(Item::Block { position, size }))
}

pub(crate) fn load_bounding_box(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let corner = cache.point(entity.required_ref(0, "Corner")?)?;
    let size = Vector3::new(
        entity.required_float(1, "XDim")?,
        entity.required_float(2, "YDim")?,
        entity.required_float(3, "ZDim")?,
    );
    Ok(Entity::Item(Item::BoundingBox { corner, size }))
}

fn placed_loops(profile: &Profile, m: &Matrix4<f64>) -> Vec<CurveLoop> {
    profile.loops().map(|l| l.transformed(m)).collect()
}

pub(crate) fn create_extrusion(
    scope: &mut ShapeEditScope<'_>,
    profile: EntityKey,
    position: &Matrix4<f64>,
    direction: &Vector3<f64>,
    depth: f64,
    lcs: &Matrix4<f64>,
) -> Result<Vec<GeometryObject>> {
    let m = lcs * position;
    let loops = placed_loops(scope.cache.profile(profile)?, &m);
    let sweep = transform_vector(&m, &(direction * depth));
    let length = sweep.norm();
    let tolerance = scope.options.short_curve_tolerance;
    if length < tolerance {
        return Err(Error::geometry(format!(
            "extrusion depth {} is below the tolerance {}",
            length, tolerance
        )));
    }
    let direction = sweep / length;
    let solid = scope.kernel.create_extrusion(&loops, &direction, length)?;
    Ok(vec![GeometryObject::Solid(solid)])
}

/// Frame for a revolution: Z along the axis, X towards the profile
fn revolution_frame(
    axis_origin: &Point3<f64>,
    axis: &Vector3<f64>,
    profile: &CurveLoop,
) -> Matrix4<f64> {
    let end = profile.end_parameter();
    let x = [0.0, 0.25, 0.5, 0.75, 0.125, 0.375, 0.625, 0.875]
        .iter()
        .filter_map(|&f| profile.point_at(f * end))
        .find_map(|p| {
            let d = p - axis_origin;
            (d - axis * d.dot(axis)).try_normalize(1e-9)
        })
        .unwrap_or_else(|| perpendicular_to(axis));
    from_axes(axis_origin, &x, &axis.cross(&x), axis)
}

pub(crate) fn create_revolution(
    scope: &mut ShapeEditScope<'_>,
    profile: EntityKey,
    position: &Matrix4<f64>,
    axis_origin: &Point3<f64>,
    axis: &Vector3<f64>,
    angle: f64,
    lcs: &Matrix4<f64>,
) -> Result<Vec<GeometryObject>> {
    let m = lcs * position;
    let loops = placed_loops(scope.cache.profile(profile)?, &m);
    let world_origin = m.transform_point(axis_origin);
    let world_axis = transform_vector(&m, axis)
        .try_normalize(1e-12)
        .ok_or_else(|| Error::geometry("revolution axis has zero length"))?;
    let outer = loops
        .first()
        .ok_or_else(|| Error::geometry("revolved profile has no loops"))?;
    let frame = revolution_frame(&world_origin, &world_axis, outer);
    let solid = scope.kernel.create_revolution(&frame, &loops, 0.0, angle)?;
    Ok(vec![GeometryObject::Solid(solid)])
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn create_surface_curve_sweep(
    scope: &mut ShapeEditScope<'_>,
    profile: EntityKey,
    position: &Matrix4<f64>,
    directrix: &CurveGeometry,
    start: Option<f64>,
    end: Option<f64>,
    reference: &Matrix4<f64>,
    lcs: &Matrix4<f64>,
) -> Result<Vec<GeometryObject>> {
    // Frame at the path start, in the solid's position coordinates
    let path = directrix.trimmed(start, end);
    let (Some(start_point), Some(tangent)) = (path.point_at(0.0), path.tangent_at(0.0)) else {
        return Err(Error::geometry("directrix is empty"));
    };
    let z = tangent
        .try_normalize(1e-12)
        .ok_or_else(|| Error::geometry("directrix has no tangent at its start"))?;
    let normal = z_axis(reference);
    let y = (normal - z * normal.dot(&z))
        .try_normalize(1e-9)
        .unwrap_or_else(|| perpendicular_to(&z));
    let x = y.cross(&z);
    let start_frame = from_axes(&start_point, &x, &y, &z);

    let m = lcs * position;
    let profile_frame = m * start_frame;
    let loops = placed_loops(scope.cache.profile(profile)?, &profile_frame);
    let solid = scope
        .kernel
        .create_sweep(&path.transformed(&m), 0.0, &loops, &profile_frame)?;
    Ok(vec![GeometryObject::Solid(solid)])
}

fn circle_loop(frame: &Matrix4<f64>, radius: f64) -> CurveLoop {
    CurveLoop::new(vec![CurveSegment::full(Curve::Conic {
        frame: *frame,
        radius_x: radius,
        radius_y: radius,
    })])
}

pub(crate) fn create_swept_disk(
    scope: &mut ShapeEditScope<'_>,
    directrix: &CurveGeometry,
    radius: f64,
    inner_radius: Option<f64>,
    start: Option<f64>,
    end: Option<f64>,
    lcs: &Matrix4<f64>,
) -> Result<Vec<GeometryObject>> {
    let path = directrix.trimmed(start, end).transformed(lcs);
    let (Some(start_point), Some(tangent)) = (path.point_at(0.0), path.tangent_at(0.0)) else {
        return Err(Error::geometry("directrix is empty"));
    };
    let z = tangent
        .try_normalize(1e-12)
        .ok_or_else(|| Error::geometry("directrix has no tangent at its start"))?;
    let x = perpendicular_to(&z);
    let frame = from_axes(&start_point, &x, &z.cross(&x), &z);

    let mut loops = vec![circle_loop(&frame, radius)];
    if let Some(inner) = inner_radius {
        loops.push(circle_loop(&frame, inner).reversed());
    }
    let solid = scope.kernel.create_sweep(&path, 0.0, &loops, &frame)?;
    Ok(vec![GeometryObject::Solid(solid)])
}

/// Point and horizontal tangent at a plan distance along a polyline
fn station_along(points: &[Point3<f64>], distance: f64, horizontal: bool) -> Option<(Point3<f64>, Vector3<f64>)> {
    let measure = |a: &Point3<f64>, b: &Point3<f64>| {
        let d = b - a;
        if horizontal {
            d.x.hypot(d.y)
        } else {
            d.norm()
        }
    };
    let flat = |d: Vector3<f64>| Vector3::new(d.x, d.y, 0.0).try_normalize(1e-12);

    let mut travelled = 0.0;
    let mut last = None;
    for w in points.windows(2) {
        let length = measure(&w[0], &w[1]);
        let Some(tangent) = flat(w[1] - w[0]) else {
            continue;
        };
        if distance <= travelled + length {
            let local = ((distance - travelled) / length).clamp(0.0, 1.0);
            return Some((w[0] + (w[1] - w[0]) * local, tangent));
        }
        travelled += length;
        last = Some((w[1], tangent));
    }
    // Past the end: clamp to the last vertex
    last
}

pub(crate) fn create_sectioned_horizontal(
    scope: &mut ShapeEditScope<'_>,
    id: u32,
    directrix: &CurveGeometry,
    sections: &[EntityKey],
    positions: &[DistanceExpression],
    lcs: &Matrix4<f64>,
) -> Result<Vec<GeometryObject>> {
    let cache = scope.cache;
    let arc_segments = scope.options.arc_segments;
    let path = directrix.to_loop().points(arc_segments);
    if path.len() < 2 {
        return Err(Error::entity(id, "directrix is degenerate"));
    }

    // Each station: one ring per profile loop, outer first
    let mut stations: Vec<Vec<Vec<Point3<f64>>>> = Vec::with_capacity(sections.len());
    for (&section, expression) in sections.iter().zip(positions) {
        let (point, z) = station_along(&path, expression.distance_along, expression.along_horizontal)
            .ok_or_else(|| Error::entity(id, "directrix has no horizontal extent"))?;
        let y = Vector3::z();
        let x = y.cross(&z);
        let station_origin = point
            + x * expression.offset_lateral
            + y * expression.offset_vertical
            + z * expression.offset_longitudinal;
        let frame = lcs * from_axes(&station_origin, &x, &y, &z);
        let rings = cache.profile(section)?
            .loops()
            .map(|l| l.transformed(&frame).points(arc_segments))
            .collect();
        stations.push(rings);
    }

    let mut tessellated = scope.with_builder_mode(BuilderMode::Tessellated {
        target: TessellationTarget::Solid,
        fallback: TessellationFallback::Mesh,
    });
    let material = tessellated.current_material();
    let mut builder = tessellated.new_builder();

    for (k, pair) in stations.windows(2).enumerate() {
        let (a, b) = (&pair[0], &pair[1]);
        let compatible = a.len() == b.len() && a.iter().zip(b).all(|(ra, rb)| ra.len() == rb.len());
        if !compatible {
            tessellated.log.warning(
                id,
                DiagnosticKind::InvalidFace,
                format!("cross sections {} and {} differ in vertex count, span skipped", k, k + 1),
            );
            continue;
        }
        for (ra, rb) in a.iter().zip(b) {
            let n = ra.len();
            for i in 0..n {
                let j = (i + 1) % n;
                builder.start_face(material);
                // Collapsed quads between coincident vertices are rejected
                if builder.add_loop(vec![ra[i], rb[i], rb[j], ra[j]], true).is_ok() {
                    builder.stop_face();
                }
            }
        }
    }

    for (rings, reverse) in [(stations.first(), false), (stations.last(), true)] {
        let Some(rings) = rings else { continue };
        builder.start_face(material);
        for (i, ring) in rings.iter().enumerate() {
            let mut ring = ring.clone();
            if reverse {
                ring.reverse();
            }
            if builder.add_loop(ring, i == 0).is_err() && i == 0 {
                break;
            }
        }
        builder.stop_face();
    }

    builder
        .finish()
        .map(|object| vec![object])
        .ok_or_else(|| Error::entity(id, "no faces between cross sections"))
}

/// Large extruded rectangle approximating the material side of a plane
fn unbounded_half_space(
    scope: &ShapeEditScope<'_>,
    plane: &Matrix4<f64>,
    agreement: bool,
) -> Result<Solid> {
    let extent = scope.options.half_space_extent;
    let (o, x, y, n) = (origin(plane), x_axis(plane), y_axis(plane), z_axis(plane));
    let corners = [
        o - x * extent - y * extent,
        o + x * extent - y * extent,
        o + x * extent + y * extent,
        o - x * extent + y * extent,
    ];
    // Agreement: the normal points away from the material
    let direction = if agreement { -n } else { n };
    scope
        .kernel
        .create_extrusion(&[CurveLoop::polygon(&corners)], &direction, extent)
}

pub(crate) fn create_half_space(
    scope: &mut ShapeEditScope<'_>,
    id: u32,
    plane: &Matrix4<f64>,
    agreement: bool,
    boundary: Option<&(Matrix4<f64>, CurveLoop)>,
    lcs: &Matrix4<f64>,
) -> Result<Vec<GeometryObject>> {
    let world_plane = lcs * plane;
    let half_space = unbounded_half_space(scope, &world_plane, agreement)?;

    let Some((position, polygon)) = boundary else {
        return Ok(vec![GeometryObject::Solid(half_space)]);
    };

    let extent = scope.options.half_space_extent;
    let m = lcs * position;
    let axis = z_axis(&m)
        .try_normalize(1e-12)
        .ok_or_else(|| Error::entity(id, "boundary position has no Z axis"))?;
    let base = polygon.transformed(&(translation(&(-axis * extent)) * m));
    let bounded = scope
        .kernel
        .create_extrusion(&[base], &axis, 2.0 * extent)
        .and_then(|prism| {
            scope
                .kernel
                .execute_boolean(&half_space, &prism, BooleanOperator::Intersection)
        });
    // A bad boundary fails the item instead of widening it to the whole half-space
    match bounded {
        Ok(Some(solid)) if !solid.is_empty() => Ok(vec![GeometryObject::Solid(solid)]),
        Ok(_) => Err(Error::entity(id, "polygonal boundary bounds no volume")),
        Err(e) => Err(Error::entity(id, format!("invalid polygonal boundary: {}", e))),
    }
}

pub(crate) fn create_block(
    position: &Matrix4<f64>,
    size: &Vector3<f64>,
    lcs: &Matrix4<f64>,
) -> Vec<GeometryObject> {
    let solid = box_solid(Point3::origin(), *size).transformed(&(lcs * position));
    vec![GeometryObject::Solid(solid)]
}

pub(crate) fn create_bounding_box(
    corner: &Point3<f64>,
    size: &Vector3<f64>,
    lcs: &Matrix4<f64>,
) -> Vec<GeometryObject> {
    vec![GeometryObject::Solid(box_solid(*corner, *size).transformed(lcs))]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_revolution_frame_points_at_profile() {
        let profile = CurveLoop::polygon(&[
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(0.0, 3.0, 0.0),
            Point3::new(0.0, 3.0, 1.0),
        ]);
        let frame = revolution_frame(&Point3::origin(), &Vector3::z(), &profile);
        assert_relative_eq!(x_axis(&frame), Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(y_axis(&frame), -Vector3::x(), epsilon = 1e-12);
    }

    #[test]
    fn test_profile_on_axis_falls_back_to_perpendicular() {
        let profile = CurveLoop::polygon(&[Point3::origin(), Point3::new(0.0, 0.0, 1.0)]);
        let frame = revolution_frame(&Point3::origin(), &Vector3::z(), &profile);
        assert_relative_eq!(x_axis(&frame).dot(&Vector3::z()), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_station_along_measures_in_plan() {
        let path = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 5.0),
            Point3::new(10.0, 10.0, 5.0),
        ];
        let (p, t) = station_along(&path, 15.0, true).unwrap();
        assert_relative_eq!(p, Point3::new(10.0, 5.0, 5.0), epsilon = 1e-12);
        assert_relative_eq!(t, Vector3::y(), epsilon = 1e-12);

        let (end, _) = station_along(&path, 100.0, true).unwrap();
        assert_eq!(end, Point3::new(10.0, 10.0, 5.0));
    }
}
