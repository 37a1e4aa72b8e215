// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shape representations, mapped items and products.
//!
//! [`create_item_geometry`] is the single entry point that turns a
//! representation item into geometry; Boolean operands, mapped
//! representations and product representations all go through it.

use ifc_import_core::{DecodedEntity, IfcType};
use nalgebra::Matrix4;

use super::boolean::create_boolean_result;
use super::shells::{
    create_faceted_brep, create_polygonal_face_set, create_surface_model,
    create_triangulated_face_set,
};
use super::solids::{
    create_block, create_bounding_box, create_extrusion, create_half_space, create_revolution,
    create_sectioned_horizontal, create_surface_curve_sweep, create_swept_disk,
};
use super::{Entity, EntityCache, EntityKey, Item};
use crate::diagnostics::DiagnosticKind;
use crate::error::{Error, Result};
use crate::kernel::GeometryObject;
use crate::scope::{CreatedGeometry, ShapeEditScope, SharedDefinition};
use crate::transform::is_rigid;

/// Relative tolerance for treating a mapping target as a rigid motion
const RIGID_TOLERANCE: f64 = 1e-9;

/// Processing group of a shape representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RepresentationKind {
    Body,
    BodyFallback,
    Box,
    Other,
}

impl RepresentationKind {
    pub const ORDER: [RepresentationKind; 4] = [
        RepresentationKind::Body,
        RepresentationKind::BodyFallback,
        RepresentationKind::Box,
        RepresentationKind::Other,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub struct Representation {
    pub identifier: Option<String>,
    pub rep_type: Option<String>,
    pub items: Vec<EntityKey>,
}

impl Representation {
    pub fn kind(&self) -> RepresentationKind {
        match self.identifier.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("body") => RepresentationKind::Body,
            Some("body-fallback") => RepresentationKind::BodyFallback,
            Some("box") => RepresentationKind::Box,
            Some(_) => RepresentationKind::Other,
            None if self.rep_type.as_deref() == Some("BoundingBox") => RepresentationKind::Box,
            None => RepresentationKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub name: Option<String>,
    pub placement: Option<EntityKey>,
    pub shape: Option<EntityKey>,
}

pub(crate) fn load_shape_representation(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let items = cache.children_lenient(
        &entity.required_refs(3, "Items")?,
        IfcType::IfcRepresentationItem,
    );
    Ok(Entity::Representation(Representation {
        identifier: entity.optional_string(1).map(str::to_string),
        rep_type: entity.optional_string(2).map(str::to_string),
        items,
    }))
}

pub(crate) fn load_product_definition_shape(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let representations = cache.children_lenient(
        &entity.required_refs(2, "Representations")?,
        IfcType::IfcRepresentation,
    );
    Ok(Entity::ProductShape { representations })
}

pub(crate) fn load_representation_map(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let origin = cache.placement(entity.required_ref(0, "MappingOrigin")?)?;
    let representation = cache.child(
        entity.required_ref(1, "MappedRepresentation")?,
        IfcType::IfcRepresentation,
    )?;
    Ok(Entity::RepresentationMap {
        origin,
        representation,
    })
}

pub(crate) fn load_mapped_item(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let source = cache.child(
        entity.required_ref(0, "MappingSource")?,
        IfcType::IfcRepresentationMap,
    )?;
    let target = cache.transform_operator(entity.required_ref(1, "MappingTarget")?)?;
    Ok(Entity::Item(Item::Mapped { source, target }))
}

pub(crate) fn load_rel_voids_element(
    _cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    Ok(Entity::VoidsRelation {
        host: entity.required_ref(4, "RelatingBuildingElement")?,
        opening: entity.required_ref(5, "RelatedOpeningElement")?,
    })
}

pub(crate) fn load_product(cache: &mut EntityCache<'_>, entity: &DecodedEntity) -> Result<Entity> {
    let placement = cache.optional_child(entity.optional_ref(5), IfcType::IfcObjectPlacement)?;
    let shape = cache.optional_child(entity.optional_ref(6), IfcType::IfcProductRepresentation)?;
    Ok(Entity::Product(Product {
        name: entity.optional_string(2).map(str::to_string),
        placement,
        shape,
    }))
}

/// Geometry of one representation item in the frame `lcs`.
///
/// Failure marks the item invalid for creation; later requests for the
/// same item fail immediately.
pub(crate) fn create_item_geometry(
    scope: &mut ShapeEditScope<'_>,
    key: EntityKey,
    lcs: &Matrix4<f64>,
) -> Result<Vec<GeometryObject>> {
    let cache = scope.cache;
    let record = cache.record(key);
    let id = record.id;
    if !record.is_valid_for_creation() {
        return Err(Error::entity(id, "geometry creation already failed"));
    }

    let item = match cache.settled(key)? {
        Entity::Item(item) => item,
        Entity::Curve(_) => {
            scope.log.comment(
                id,
                DiagnosticKind::SkippedEntity,
                "curve item produces no solid geometry",
            );
            return Ok(Vec::new());
        }
        _ => {
            scope.log.comment(
                id,
                DiagnosticKind::SkippedEntity,
                format!("{} is not a geometric item", record.ifc_type),
            );
            return Ok(Vec::new());
        }
    };

    let styles = scope.styles;
    let mut styled = scope.push_material(styles.item_material(id));
    match item_geometry(&mut styled, key, id, item, lcs) {
        Ok(mut objects) => {
            if let Some(material) = styled.current_material() {
                objects.iter_mut().for_each(|o| o.fill_material(material));
            }
            Ok(objects)
        }
        Err(e) => {
            record.mark_invalid();
            Err(e)
        }
    }
}

fn item_geometry(
    scope: &mut ShapeEditScope<'_>,
    key: EntityKey,
    id: u32,
    item: &Item,
    lcs: &Matrix4<f64>,
) -> Result<Vec<GeometryObject>> {
    match item {
        Item::FacetedBrep { outer, voids } => create_faceted_brep(scope, id, *outer, voids, lcs),
        Item::SurfaceModel { shells } => create_surface_model(scope, shells, lcs),
        Item::TriangulatedFaceSet {
            coordinates,
            triangles,
            closed,
        } => create_triangulated_face_set(scope, id, coordinates, triangles, *closed, lcs),
        Item::PolygonalFaceSet {
            coordinates,
            faces,
            closed,
        } => create_polygonal_face_set(scope, id, coordinates, faces, *closed, lcs),
        Item::ExtrudedArea {
            profile,
            position,
            direction,
            depth,
        } => create_extrusion(scope, *profile, position, direction, *depth, lcs),
        Item::RevolvedArea {
            profile,
            position,
            axis_origin,
            axis,
            angle,
        } => create_revolution(scope, *profile, position, axis_origin, axis, *angle, lcs),
        Item::SurfaceCurveSwept {
            profile,
            position,
            directrix,
            start,
            end,
            reference,
        } => create_surface_curve_sweep(
            scope, *profile, position, directrix, *start, *end, reference, lcs,
        ),
        Item::SweptDisk {
            directrix,
            radius,
            inner_radius,
            start,
            end,
        } => create_swept_disk(scope, directrix, *radius, *inner_radius, *start, *end, lcs),
        Item::SectionedHorizontal {
            directrix,
            sections,
            positions,
        } => create_sectioned_horizontal(scope, id, directrix, sections, positions, lcs),
        Item::HalfSpace {
            plane,
            agreement,
            boundary,
        } => create_half_space(scope, id, plane, *agreement, boundary.as_ref(), lcs),
        Item::Block { position, size } => Ok(create_block(position, size, lcs)),
        Item::BoundingBox { corner, size } => Ok(create_bounding_box(corner, size, lcs)),
        Item::Boolean {
            operator,
            first,
            second,
        } => create_boolean_result(scope, key, *operator, *first, *second, lcs),
        Item::Mapped { source, target } => bake_mapped_item(scope, key, *source, target, lcs),
    }
}

/// Claim a mapped item for expansion, refusing one that contains itself
fn enter_mapped_item(scope: &mut ShapeEditScope<'_>, key: EntityKey) -> Result<()> {
    if scope.mapped_in_progress.insert(key) {
        return Ok(());
    }
    let id = scope.cache.record(key).id;
    scope.log.warning(
        id,
        DiagnosticKind::ReferenceCycle,
        "mapped representation contains itself",
    );
    Err(Error::entity(id, "mapped representation contains itself"))
}

fn representation_map(
    scope: &ShapeEditScope<'_>,
    source: EntityKey,
) -> Result<(Matrix4<f64>, EntityKey)> {
    match scope.cache.settled(source)? {
        Entity::RepresentationMap {
            origin,
            representation,
        } => Ok((*origin, *representation)),
        _ => Err(Error::entity(
            scope.cache.record(source).id,
            "expected a representation map",
        )),
    }
}

/// Mapped item geometry placed directly in `lcs`
fn bake_mapped_item(
    scope: &mut ShapeEditScope<'_>,
    key: EntityKey,
    source: EntityKey,
    target: &Matrix4<f64>,
    lcs: &Matrix4<f64>,
) -> Result<Vec<GeometryObject>> {
    let cache = scope.cache;
    let (origin, representation) = representation_map(scope, source)?;
    let Entity::Representation(mapped) = cache.settled(representation)? else {
        return Err(Error::entity(
            cache.record(representation).id,
            "expected a shape representation",
        ));
    };

    enter_mapped_item(scope, key)?;
    let placed = lcs * target * origin;
    let mut objects = Vec::new();
    for &item in &mapped.items {
        match create_item_geometry(scope, item, &placed) {
            Ok(geometry) => objects.extend(geometry),
            Err(e) => {
                scope
                    .log
                    .error(cache.record(item).id, DiagnosticKind::NoGeometry, e.to_string());
            }
        }
    }
    scope.mapped_in_progress.remove(&key);
    Ok(objects)
}

/// Instance of the shared definition built from a map, creating the
/// definition on first use. `None` when the definition is empty.
fn instance_mapped_item(
    scope: &mut ShapeEditScope<'_>,
    key: EntityKey,
    source: EntityKey,
    target: &Matrix4<f64>,
    representation_id: u32,
    lcs: &Matrix4<f64>,
) -> Result<Option<CreatedGeometry>> {
    let map_id = scope.cache.record(source).id;
    if !scope.definitions.contains_key(&map_id) {
        let (origin, representation) = representation_map(scope, source)?;
        enter_mapped_item(scope, key)?;
        let geometry = representation_geometry(scope, representation, &origin, false);
        scope.mapped_in_progress.remove(&key);
        tracing::debug!(map_id, objects = geometry.len(), "Created shared definition");
        scope
            .definitions
            .insert(map_id, SharedDefinition { map_id, geometry });
    }

    let has_geometry = scope
        .definitions
        .get(&map_id)
        .is_some_and(|definition| !definition.geometry.is_empty());
    Ok(has_geometry.then(|| CreatedGeometry::Instance {
        definition_id: map_id,
        transform: lcs * target,
        representation_id,
    }))
}

/// Geometry of every item of one shape representation.
///
/// Item failures are logged and skipped. With `allow_instances`, mapped
/// items with a rigid target become instances of a shared definition.
pub(crate) fn representation_geometry(
    scope: &mut ShapeEditScope<'_>,
    representation: EntityKey,
    lcs: &Matrix4<f64>,
    allow_instances: bool,
) -> Vec<CreatedGeometry> {
    let cache = scope.cache;
    let styles = scope.styles;
    let representation_id = cache.record(representation).id;
    let Entity::Representation(shape) = cache.entity(representation) else {
        return Vec::new();
    };

    let mut created = Vec::new();
    for &item in &shape.items {
        let item_id = cache.record(item).id;

        if let Entity::Item(Item::Mapped { source, target }) = cache.entity(item) {
            if allow_instances && scope.options.use_instancing && is_rigid(target, RIGID_TOLERANCE)
            {
                match instance_mapped_item(scope, item, *source, target, representation_id, lcs) {
                    Ok(instance) => created.extend(instance),
                    Err(e) => scope.log.error(item_id, DiagnosticKind::NoGeometry, e.to_string()),
                }
                continue;
            }
        }

        match create_item_geometry(scope, item, lcs) {
            Ok(objects) => {
                let layer = styles
                    .layer(item_id)
                    .or_else(|| styles.layer(representation_id))
                    .map(str::to_string);
                created.extend(objects.into_iter().filter(|o| !o.is_empty()).map(|object| {
                    CreatedGeometry::Direct {
                        material: object.unique_material(),
                        object,
                        representation_id,
                        layer: layer.clone(),
                    }
                }));
            }
            Err(e) => scope.log.error(item_id, DiagnosticKind::NoGeometry, e.to_string()),
        }
    }
    created
}

/// Append the geometry of a product's representations to the scope.
///
/// Groups run as Body, BodyFallback, Box, Other. The fallback body is
/// skipped once Body produced geometry and bounding boxes are skipped once
/// anything exists, unless boxes are always imported.
pub(crate) fn create_product_representation(
    scope: &mut ShapeEditScope<'_>,
    representations: &[EntityKey],
    lcs: &Matrix4<f64>,
) {
    let cache = scope.cache;
    let kind_of = |key: EntityKey| match cache.entity(key) {
        Entity::Representation(representation) => Some(representation.kind()),
        _ => None,
    };

    let mut body_produced = false;
    for kind in RepresentationKind::ORDER {
        let skip = match kind {
            RepresentationKind::BodyFallback => body_produced,
            RepresentationKind::Box => {
                !scope.options.always_import_bounding_boxes && !scope.created.is_empty()
            }
            _ => false,
        };

        for &representation in representations.iter().filter(|&&r| kind_of(r) == Some(kind)) {
            if skip {
                tracing::debug!(
                    representation = cache.record(representation).id,
                    kind = ?kind,
                    "Skipped redundant representation"
                );
                continue;
            }
            let geometry = representation_geometry(scope, representation, lcs, true);
            if kind == RepresentationKind::Body && !geometry.is_empty() {
                body_produced = true;
            }
            scope.created.extend(geometry);
        }
    }
}
