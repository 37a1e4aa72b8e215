// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Points, directions, placements and transformation operators

use ifc_import_core::{DecodedEntity, IfcType};
use nalgebra::{Matrix4, Point3, Vector3};
use rustc_hash::FxHashSet;

use super::{Entity, EntityCache, EntityKey};
use crate::diagnostics::{DiagnosticKind, ImportLog};
use crate::error::{Error, Result};
use crate::transform::{from_axes, orthonormal_frame, perpendicular_to, Frame};

fn point_from(coordinates: &[f64]) -> Option<Point3<f64>> {
    match coordinates {
        [x] => Some(Point3::new(*x, 0.0, 0.0)),
        [x, y] => Some(Point3::new(*x, *y, 0.0)),
        [x, y, z] => Some(Point3::new(*x, *y, *z)),
        _ => None,
    }
}

pub(crate) fn load_cartesian_point(
    _cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let coordinates = entity.required_floats(0, "Coordinates")?;
    point_from(&coordinates)
        .map(Entity::Point)
        .ok_or_else(|| Error::entity(entity.id, "point must have 1 to 3 coordinates"))
}

pub(crate) fn load_direction(
    _cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let ratios = entity.required_floats(0, "DirectionRatios")?;
    let raw = point_from(&ratios)
        .ok_or_else(|| Error::entity(entity.id, "direction must have 1 to 3 ratios"))?
        .coords;
    // Zero directions are kept and repaired where a frame is built from them
    Ok(Entity::Direction(raw.try_normalize(1e-12).unwrap_or(raw)))
}

pub(crate) fn load_vector(cache: &mut EntityCache<'_>, entity: &DecodedEntity) -> Result<Entity> {
    let orientation = cache.direction(entity.required_ref(0, "Orientation")?)?;
    let magnitude = entity.required_float(1, "Magnitude")?;
    Ok(Entity::Vector(orientation * magnitude))
}

pub(crate) fn load_point_list(
    _cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    entity
        .required_float_lists(0, "CoordList")?
        .iter()
        .map(|coordinates| {
            point_from(coordinates)
                .ok_or_else(|| Error::entity(entity.id, "point list entry must have 2 or 3 values"))
        })
        .collect::<Result<Vec<_>>>()
        .map(Entity::PointList)
}

fn log_corrected(cache: &mut EntityCache<'_>, id: u32, frame: Frame) -> Matrix4<f64> {
    if frame.corrected {
        cache.log.comment(
            id,
            DiagnosticKind::AutoCorrection,
            "placement axes were degenerate and have been repaired",
        );
    }
    frame.matrix
}

pub(crate) fn load_axis1_placement(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let location = cache.point(entity.required_ref(0, "Location")?)?;
    let axis = cache.optional_direction(entity.optional_ref(1))?;
    let frame = orthonormal_frame(location, axis, None);
    Ok(Entity::Placement(log_corrected(cache, entity.id, frame)))
}

pub(crate) fn load_axis2_placement_2d(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let location = cache.point(entity.required_ref(0, "Location")?)?;
    let ref_direction = cache
        .optional_direction(entity.optional_ref(1))?
        .map(|d| Vector3::new(d.x, d.y, 0.0));
    let frame = orthonormal_frame(location, None, ref_direction);
    Ok(Entity::Placement(log_corrected(cache, entity.id, frame)))
}

pub(crate) fn load_axis2_placement_3d(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let location = cache.point(entity.required_ref(0, "Location")?)?;
    let axis = cache.optional_direction(entity.optional_ref(1))?;
    let ref_direction = cache.optional_direction(entity.optional_ref(2))?;
    let frame = orthonormal_frame(location, axis, ref_direction);
    Ok(Entity::Placement(log_corrected(cache, entity.id, frame)))
}

/// `IfcCartesianTransformationOperator3D` and its non-uniform subtype.
///
/// Axis2 is projected rather than derived from Z x X, so an operator whose
/// second axis opposes that cross product describes a mirror.
pub(crate) fn load_transform_operator(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
    non_uniform: bool,
) -> Result<Entity> {
    let axis1 = cache.optional_direction(entity.optional_ref(0))?;
    let axis2 = cache.optional_direction(entity.optional_ref(1))?;
    let origin = cache.point(entity.required_ref(2, "LocalOrigin")?)?;
    let scale = entity.optional_float(3).unwrap_or(1.0);
    let axis3 = cache.optional_direction(entity.optional_ref(4))?;
    let (scale2, scale3) = if non_uniform {
        (
            entity.optional_float(5).unwrap_or(scale),
            entity.optional_float(6).unwrap_or(scale),
        )
    } else {
        (scale, scale)
    };
    if scale == 0.0 || scale2 == 0.0 || scale3 == 0.0 {
        return Err(Error::entity(entity.id, "transformation scale must be non-zero"));
    }

    let z = axis3
        .and_then(|a| a.try_normalize(1e-9))
        .unwrap_or_else(Vector3::z);
    let x = axis1
        .and_then(|a| (a - z * a.dot(&z)).try_normalize(1e-9))
        .unwrap_or_else(|| {
            let fallback = Vector3::x();
            (fallback - z * fallback.dot(&z))
                .try_normalize(1e-9)
                .unwrap_or_else(|| perpendicular_to(&z))
        });
    let y = axis2
        .and_then(|a| (a - z * a.dot(&z) - x * a.dot(&x)).try_normalize(1e-9))
        .unwrap_or_else(|| z.cross(&x));

    Ok(Entity::Transform(from_axes(
        &origin,
        &(x * scale),
        &(y * scale2),
        &(z * scale3),
    )))
}

pub(crate) fn load_local_placement(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let relative_to = cache.optional_child(entity.optional_ref(0), IfcType::IfcObjectPlacement)?;
    let relative = cache.placement(entity.required_ref(1, "RelativePlacement")?)?;
    Ok(Entity::LocalPlacement {
        relative_to,
        relative,
    })
}

/// World matrix of a local placement.
///
/// Walks the `PlacementRelTo` chain; a chain that revisits a placement is
/// cut at the repeat and reported.
pub fn absolute_placement(cache: &EntityCache<'_>, key: EntityKey, log: &mut ImportLog) -> Matrix4<f64> {
    let mut visited = FxHashSet::default();
    let mut chain = Vec::new();
    let mut current = Some(key);
    while let Some(k) = current {
        if !visited.insert(k) {
            log.warning(
                cache.record(k).id,
                DiagnosticKind::ReferenceCycle,
                "placement chain refers back to itself",
            );
            break;
        }
        match cache.entity(k) {
            Entity::LocalPlacement {
                relative_to,
                relative,
            } => {
                chain.push(*relative);
                current = *relative_to;
            }
            Entity::Placement(matrix) => {
                chain.push(*matrix);
                current = None;
            }
            _ => current = None,
        }
    }
    chain
        .iter()
        .rev()
        .fold(Matrix4::identity(), |world, relative| world * relative)
}

impl EntityCache<'_> {
    /// Resolve `id` and extract a value from its settled entity
    pub(crate) fn settled_as<T>(
        &mut self,
        id: u32,
        declared: IfcType,
        expected: &str,
        extract: impl FnOnce(&Entity) -> Option<T>,
    ) -> Result<T> {
        let key = self.child(id, declared)?;
        extract(self.settled(key)?)
            .ok_or_else(|| Error::entity(id, format!("expected {}", expected)))
    }

    pub(crate) fn point(&mut self, id: u32) -> Result<Point3<f64>> {
        self.settled_as(id, IfcType::IfcCartesianPoint, "a point", |e| match e {
            Entity::Point(p) => Some(*p),
            _ => None,
        })
    }

    pub(crate) fn direction(&mut self, id: u32) -> Result<Vector3<f64>> {
        self.settled_as(id, IfcType::IfcDirection, "a direction", |e| match e {
            Entity::Direction(d) => Some(*d),
            _ => None,
        })
    }

    pub(crate) fn optional_direction(&mut self, id: Option<u32>) -> Result<Option<Vector3<f64>>> {
        id.map(|id| self.direction(id)).transpose()
    }

    pub(crate) fn vector(&mut self, id: u32) -> Result<Vector3<f64>> {
        self.settled_as(id, IfcType::IfcVector, "a vector", |e| match e {
            Entity::Vector(v) => Some(*v),
            _ => None,
        })
    }

    pub(crate) fn point_list(&mut self, id: u32) -> Result<Vec<Point3<f64>>> {
        self.settled_as(id, IfcType::IfcCartesianPointList, "a point list", |e| match e {
            Entity::PointList(points) => Some(points.clone()),
            _ => None,
        })
    }

    /// Any `IfcPlacement` as a matrix
    pub(crate) fn placement(&mut self, id: u32) -> Result<Matrix4<f64>> {
        self.settled_as(id, IfcType::IfcPlacement, "a placement", |e| match e {
            Entity::Placement(m) => Some(*m),
            _ => None,
        })
    }

    /// Optional placement, identity when absent
    pub(crate) fn optional_placement(&mut self, id: Option<u32>) -> Result<Matrix4<f64>> {
        Ok(match id {
            Some(id) => self.placement(id)?,
            None => Matrix4::identity(),
        })
    }

    pub(crate) fn transform_operator(&mut self, id: u32) -> Result<Matrix4<f64>> {
        self.settled_as(
            id,
            IfcType::IfcCartesianTransformationOperator,
            "a transformation operator",
            |e| match e {
                Entity::Transform(m) => Some(*m),
                _ => None,
            },
        )
    }
}
