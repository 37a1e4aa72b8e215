// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shells, faceted B-reps, surface models and tessellated face sets.
//!
//! Shell assembly runs in up to two passes. The first uses the active
//! builder mode; if it produces no face at all and mesh fallback is
//! allowed, the shell is rebuilt with the permissive mesh builder.

use ifc_import_core::{DecodedEntity, IfcType};
use nalgebra::{Matrix4, Point3};

use super::boolean::execute_with_retry;
use super::topology::build_face;
use super::{Entity, EntityCache, EntityKey, Item};
use crate::builder::{BuilderMode, TessellationFallback, TessellationTarget};
use crate::diagnostics::DiagnosticKind;
use crate::error::{Error, Result};
use crate::kernel::{BooleanOperator, GeometryObject};
use crate::scope::ShapeEditScope;
use crate::transform::has_reflection;

/// One polygon of an `IfcPolygonalFaceSet`, zero-based indices
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedFace {
    pub outer: Vec<usize>,
    pub inner: Vec<Vec<usize>>,
}

fn zero_based(id: u32, indices: &[i64]) -> Result<Vec<usize>> {
    indices
        .iter()
        .map(|&i| {
            usize::try_from(i - 1)
                .map_err(|_| Error::entity(id, format!("index {} is not 1-based", i)))
        })
        .collect()
}

pub(crate) fn load_shell(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
    closed: bool,
) -> Result<Entity> {
    let faces = cache.children_lenient(&entity.required_refs(0, "CfsFaces")?, IfcType::IfcFace);
    Ok(Entity::Shell { faces, closed })
}

pub(crate) fn load_faceted_brep(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let outer = cache.child(entity.required_ref(0, "Outer")?, IfcType::IfcConnectedFaceSet)?;
    let voids = if entity.is_subtype_of(IfcType::IfcFacetedBrepWithVoids) {
        cache.children_lenient(&entity.optional_refs(1), IfcType::IfcConnectedFaceSet)
    } else {
        Vec::new()
    };
    Ok(Entity::Item(Item::FacetedBrep { outer, voids }))
}

pub(crate) fn load_surface_model(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let shells = cache.children_lenient(&entity.required_refs(0, "Shells")?, IfcType::IfcConnectedFaceSet);
    if shells.is_empty() {
        return Err(Error::entity(entity.id, "surface model has no usable shell"));
    }
    Ok(Entity::Item(Item::SurfaceModel { shells }))
}

/// Apply an optional `PnIndex` indirection
fn through_pn_index(
    id: u32,
    coordinates: Vec<Point3<f64>>,
    pn_index: Option<Vec<i64>>,
) -> Result<Vec<Point3<f64>>> {
    let Some(pn_index) = pn_index else {
        return Ok(coordinates);
    };
    zero_based(id, &pn_index)?
        .into_iter()
        .map(|i| {
            coordinates
                .get(i)
                .copied()
                .ok_or_else(|| Error::entity(id, format!("PnIndex {} out of range", i + 1)))
        })
        .collect()
}

fn check_range(id: u32, indices: &[usize], count: usize) -> Result<()> {
    match indices.iter().find(|&&i| i >= count) {
        Some(i) => Err(Error::entity(id, format!("coordinate index {} out of range", i + 1))),
        None => Ok(()),
    }
}

pub(crate) fn load_triangulated_face_set(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let coordinates = cache.point_list(entity.required_ref(0, "Coordinates")?)?;
    let closed = entity.optional_bool(2);
    let coordinates = through_pn_index(entity.id, coordinates, entity.optional_ints(4))?;
    let triangles = entity
        .required_int_lists(3, "CoordIndex")?
        .iter()
        .map(|triangle| {
            let indices = zero_based(entity.id, triangle)?;
            check_range(entity.id, &indices, coordinates.len())?;
            match indices[..] {
                [a, b, c] => Ok([a, b, c]),
                _ => Err(Error::entity(entity.id, "triangle must have three indices")),
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Entity::Item(Item::TriangulatedFaceSet {
        coordinates,
        triangles,
        closed,
    }))
}

pub(crate) fn load_indexed_polygonal_face(
    _cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let outer = zero_based(entity.id, &entity.required_ints(0, "CoordIndex")?)?;
    let inner = if entity.is_subtype_of(IfcType::IfcIndexedPolygonalFaceWithVoids) {
        entity
            .required_int_lists(1, "InnerCoordIndices")?
            .iter()
            .map(|hole| zero_based(entity.id, hole))
            .collect::<Result<Vec<_>>>()?
    } else {
        Vec::new()
    };
    Ok(Entity::IndexedFace(IndexedFace { outer, inner }))
}

pub(crate) fn load_polygonal_face_set(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let coordinates = cache.point_list(entity.required_ref(0, "Coordinates")?)?;
    let closed = entity.optional_bool(1);
    let faces = cache.children(
        &entity.required_refs(2, "Faces")?,
        IfcType::IfcIndexedPolygonalFace,
    )?;
    let coordinates = through_pn_index(entity.id, coordinates, entity.optional_ints(3))?;
    for &face in &faces {
        if let Entity::IndexedFace(indexed) = cache.settled(face)? {
            check_range(entity.id, &indexed.outer, coordinates.len())?;
            for hole in &indexed.inner {
                check_range(entity.id, hole, coordinates.len())?;
            }
        }
    }
    Ok(Entity::Item(Item::PolygonalFaceSet {
        coordinates,
        faces,
        closed,
    }))
}

/// Build all faces of a shell with the active builder
fn assemble_pass(
    scope: &mut ShapeEditScope<'_>,
    faces: &[EntityKey],
    lcs: &Matrix4<f64>,
) -> (usize, Option<GeometryObject>) {
    let mut builder = scope.new_builder();
    let mut built = 0;
    for &face in faces {
        match build_face(scope, &mut builder, face, lcs) {
            Ok(()) => built += 1,
            Err(e) => scope.log.warning(
                scope.cache.record(face).id,
                DiagnosticKind::InvalidFace,
                e.to_string(),
            ),
        }
    }
    (built, builder.finish())
}

/// Two-pass shell assembly
pub(crate) fn assemble_shell(
    scope: &mut ShapeEditScope<'_>,
    shell: EntityKey,
    lcs: &Matrix4<f64>,
) -> Result<GeometryObject> {
    let cache = scope.cache;
    let shell_id = cache.record(shell).id;
    let Entity::Shell { faces, .. } = cache.settled(shell)? else {
        return Err(Error::entity(shell_id, "expected a shell"));
    };

    let (built, object) = assemble_pass(scope, faces, lcs);
    if built > 0 {
        if built < faces.len() {
            scope.log.warning(
                shell_id,
                DiagnosticKind::FaceCountShortfall,
                format!("built {} of {} faces", built, faces.len()),
            );
        }
        return object.ok_or_else(|| Error::entity(shell_id, "shell produced no geometry"));
    }

    if scope.options.allow_mesh_fallback && scope.mode() != BuilderMode::ANY_MESH {
        scope.log.warning(
            shell_id,
            DiagnosticKind::MeshFallback,
            "no face could be built, retrying as a mesh",
        );
        let mut fallback = scope.with_builder_mode(BuilderMode::ANY_MESH);
        let (built, object) = assemble_pass(&mut fallback, faces, lcs);
        if built > 0 {
            if built < faces.len() {
                fallback.log.warning(
                    shell_id,
                    DiagnosticKind::FaceCountShortfall,
                    format!("built {} of {} faces", built, faces.len()),
                );
            }
            if let Some(object) = object {
                return Ok(object);
            }
        }
    }

    Err(Error::entity(shell_id, "no face of the shell could be built"))
}

pub(crate) fn create_faceted_brep(
    scope: &mut ShapeEditScope<'_>,
    id: u32,
    outer: EntityKey,
    voids: &[EntityKey],
    lcs: &Matrix4<f64>,
) -> Result<Vec<GeometryObject>> {
    let mut brep = scope.with_builder_mode(BuilderMode::Brep);
    let mut object = assemble_shell(&mut brep, outer, lcs)?;

    for &void in voids {
        let void_id = brep.cache.record(void).id;
        let cavity = match assemble_shell(&mut brep, void, lcs) {
            Ok(GeometryObject::Solid(cavity)) => cavity,
            outcome => {
                let reason = match outcome {
                    Err(e) => e.to_string(),
                    Ok(_) => "void shell is not closed".to_string(),
                };
                brep.log.warning(
                    id,
                    DiagnosticKind::BooleanFailed,
                    format!("void shell #{} could not be subtracted: {}", void_id, reason),
                );
                continue;
            }
        };
        let GeometryObject::Solid(host) = &object else {
            brep.log.warning(
                id,
                DiagnosticKind::BooleanFailed,
                format!("void shell #{} cut from an open shell", void_id),
            );
            continue;
        };
        // A cavity has no preferred shift direction
        if let Some(solid) =
            execute_with_retry(&mut brep, void_id, host, &cavity, BooleanOperator::Difference, None)
        {
            object = GeometryObject::Solid(solid);
        }
    }
    Ok(vec![object])
}

pub(crate) fn create_surface_model(
    scope: &mut ShapeEditScope<'_>,
    shells: &[EntityKey],
    lcs: &Matrix4<f64>,
) -> Result<Vec<GeometryObject>> {
    let mut surfaces = scope.with_builder_mode(BuilderMode::ANY_MESH);
    let mut objects = Vec::with_capacity(shells.len());
    let mut last_error = None;
    for &shell in shells {
        match assemble_shell(&mut surfaces, shell, lcs) {
            Ok(object) => objects.push(object),
            Err(e) => last_error = Some(e),
        }
    }
    match (objects.is_empty(), last_error) {
        (true, Some(e)) => Err(e),
        _ => Ok(objects),
    }
}

fn face_set_mode(closed: Option<bool>) -> BuilderMode {
    if closed == Some(true) {
        BuilderMode::Tessellated {
            target: TessellationTarget::Solid,
            fallback: TessellationFallback::Mesh,
        }
    } else {
        BuilderMode::ANY_MESH
    }
}

/// Feed indexed polygons to a tessellated builder
fn create_indexed_faces<'f>(
    scope: &mut ShapeEditScope<'_>,
    id: u32,
    coordinates: &[Point3<f64>],
    faces: impl ExactSizeIterator<Item = (&'f [usize], &'f [Vec<usize>])>,
    closed: Option<bool>,
    lcs: &Matrix4<f64>,
) -> Result<Vec<GeometryObject>> {
    let world: Vec<Point3<f64>> = coordinates.iter().map(|p| lcs.transform_point(p)).collect();
    let mirrored = has_reflection(lcs);
    let ring = |indices: &[usize]| -> Vec<Point3<f64>> {
        let mut points: Vec<Point3<f64>> = indices.iter().map(|&i| world[i]).collect();
        if mirrored {
            points.reverse();
        }
        points
    };

    let mut tessellated = scope.with_builder_mode(face_set_mode(closed));
    let material = tessellated.current_material();
    let mut builder = tessellated.new_builder();
    let declared = faces.len();
    let mut built = 0;
    for (outer, inner) in faces {
        builder.start_face(material);
        if builder.add_loop(ring(outer), true).is_err() {
            continue;
        }
        for hole in inner {
            if let Err(e) = builder.add_loop(ring(&hole[..]), false) {
                tessellated
                    .log
                    .warning(id, DiagnosticKind::DroppedHole, e.to_string());
            }
        }
        if builder.stop_face() {
            built += 1;
        }
    }
    if built < declared {
        tessellated.log.warning(
            id,
            DiagnosticKind::FaceCountShortfall,
            format!("built {} of {} faces", built, declared),
        );
    }
    builder
        .finish()
        .map(|object| vec![object])
        .ok_or_else(|| Error::entity(id, "face set has no valid face"))
}

pub(crate) fn create_triangulated_face_set(
    scope: &mut ShapeEditScope<'_>,
    id: u32,
    coordinates: &[Point3<f64>],
    triangles: &[[usize; 3]],
    closed: Option<bool>,
    lcs: &Matrix4<f64>,
) -> Result<Vec<GeometryObject>> {
    let faces = triangles
        .iter()
        .map(|triangle| (&triangle[..], &[] as &[Vec<usize>]));
    create_indexed_faces(scope, id, coordinates, faces, closed, lcs)
}

pub(crate) fn create_polygonal_face_set(
    scope: &mut ShapeEditScope<'_>,
    id: u32,
    coordinates: &[Point3<f64>],
    faces: &[EntityKey],
    closed: Option<bool>,
    lcs: &Matrix4<f64>,
) -> Result<Vec<GeometryObject>> {
    let cache = scope.cache;
    let indexed = faces
        .iter()
        .map(|&face| match cache.settled(face)? {
            Entity::IndexedFace(indexed) => Ok(indexed),
            _ => Err(Error::entity(id, "expected an indexed polygonal face")),
        })
        .collect::<Result<Vec<_>>>()?;
    let faces = indexed
        .iter()
        .map(|face| (&face.outer[..], &face.inner[..]));
    create_indexed_faces(scope, id, coordinates, faces, closed, lcs)
}
