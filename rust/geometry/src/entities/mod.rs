// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity cache and resolution.
//!
//! Every STEP entity the importer touches is resolved exactly once into an
//! [`EntityRecord`] stored in a slot-map arena. A record is registered
//! *before* its attributes are resolved, so a reference cycle re-entering
//! [`EntityCache::resolve`] finds the pending record instead of recursing.
//!
//! The concrete loader is chosen from a priority-ordered dispatch table
//! whose entries are tested with `is_subtype_of`, most specific first.

pub mod boolean;
pub mod curves;
pub mod primitives;
pub mod profiles;
pub mod representation;
pub mod shells;
pub mod solids;
pub mod styles;
pub mod topology;

use std::cell::Cell;

use ifc_import_core::{DecodedEntity, EntityDecoder, IfcType};
use nalgebra::{Matrix4, Point3, Vector3};
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};

use crate::config::ImportOptions;
use crate::diagnostics::{DiagnosticKind, ImportLog};
use crate::error::{Error, Result};
use crate::kernel::{BooleanOperator, CurveLoop, Material};

pub use curves::{CurveGeometry, CurveShape};
pub use profiles::Profile;
pub use representation::{Product, Representation};
pub use shells::IndexedFace;
pub use solids::DistanceExpression;
pub use topology::{EdgeData, LoopData};

new_key_type! {
    /// Arena key of a resolved entity
    pub struct EntityKey;
}

/// Representation items that produce geometry
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    FacetedBrep {
        outer: EntityKey,
        voids: Vec<EntityKey>,
    },
    /// Face based and shell based surface models
    SurfaceModel { shells: Vec<EntityKey> },
    TriangulatedFaceSet {
        coordinates: Vec<Point3<f64>>,
        triangles: Vec<[usize; 3]>,
        closed: Option<bool>,
    },
    PolygonalFaceSet {
        coordinates: Vec<Point3<f64>>,
        faces: Vec<EntityKey>,
        closed: Option<bool>,
    },
    ExtrudedArea {
        profile: EntityKey,
        position: Matrix4<f64>,
        direction: Vector3<f64>,
        depth: f64,
    },
    RevolvedArea {
        profile: EntityKey,
        position: Matrix4<f64>,
        axis_origin: Point3<f64>,
        axis: Vector3<f64>,
        angle: f64,
    },
    SurfaceCurveSwept {
        profile: EntityKey,
        position: Matrix4<f64>,
        directrix: CurveGeometry,
        start: Option<f64>,
        end: Option<f64>,
        reference: Matrix4<f64>,
    },
    SweptDisk {
        directrix: CurveGeometry,
        radius: f64,
        inner_radius: Option<f64>,
        start: Option<f64>,
        end: Option<f64>,
    },
    SectionedHorizontal {
        directrix: CurveGeometry,
        sections: Vec<EntityKey>,
        positions: Vec<DistanceExpression>,
    },
    HalfSpace {
        plane: Matrix4<f64>,
        agreement: bool,
        /// Position and boundary polygon of a polygonal bounded half-space
        boundary: Option<(Matrix4<f64>, CurveLoop)>,
    },
    Block {
        position: Matrix4<f64>,
        size: Vector3<f64>,
    },
    BoundingBox {
        corner: Point3<f64>,
        size: Vector3<f64>,
    },
    Boolean {
        operator: BooleanOperator,
        first: EntityKey,
        /// `None` when the second operand could not be resolved
        second: Option<EntityKey>,
    },
    Mapped {
        source: EntityKey,
        target: Matrix4<f64>,
    },
}

/// Resolved content of one entity
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// Registered, attributes still being resolved
    Pending,
    Point(Point3<f64>),
    Direction(Vector3<f64>),
    /// Orientation scaled by magnitude
    Vector(Vector3<f64>),
    Placement(Matrix4<f64>),
    Transform(Matrix4<f64>),
    LocalPlacement {
        relative_to: Option<EntityKey>,
        relative: Matrix4<f64>,
    },
    PointList(Vec<Point3<f64>>),
    Curve(CurveGeometry),
    Plane(Matrix4<f64>),
    Vertex(Point3<f64>),
    Edge(EdgeData),
    OrientedEdge {
        edge: EntityKey,
        orientation: bool,
    },
    Loop(LoopData),
    FaceBound {
        bound: EntityKey,
        orientation: bool,
        outer: bool,
    },
    Face {
        bounds: Vec<EntityKey>,
    },
    Shell {
        faces: Vec<EntityKey>,
        closed: bool,
    },
    Profile(Profile),
    IndexedFace(IndexedFace),
    DistanceExpression(DistanceExpression),
    Item(Item),
    Colour([f64; 3]),
    Shading {
        color: [f64; 3],
        transparency: f64,
    },
    SurfaceStyle(Material),
    StyleAssignment(Vec<EntityKey>),
    StyledItem {
        item: Option<u32>,
        styles: Vec<EntityKey>,
    },
    LayerAssignment {
        name: String,
        items: Vec<u32>,
    },
    Representation(Representation),
    ProductShape {
        representations: Vec<EntityKey>,
    },
    RepresentationMap {
        origin: Matrix4<f64>,
        representation: EntityKey,
    },
    /// Host and opening are looked up by id, never owned
    VoidsRelation {
        host: u32,
        opening: u32,
    },
    Product(Product),
}

/// Cached entity with its sticky creation flag
#[derive(Debug)]
pub struct EntityRecord {
    pub id: u32,
    pub ifc_type: IfcType,
    valid: Cell<bool>,
    pub entity: Entity,
}

impl EntityRecord {
    /// False once geometry creation for this entity has failed
    pub fn is_valid_for_creation(&self) -> bool {
        self.valid.get()
    }

    pub fn mark_invalid(&self) {
        self.valid.set(false);
    }
}

/// Result of resolving an entity id
#[derive(Debug, Clone, PartialEq)]
pub enum EntityOutcome {
    Imported(EntityKey),
    /// Deliberately not imported
    Skipped,
    Failed(String),
}

type LoadFn = fn(&mut EntityCache<'_>, &DecodedEntity) -> Result<Entity>;

/// Loaders in priority order: an entry must come before every entry for
/// one of its supertypes.
const DISPATCH_TABLE: &[(IfcType, LoadFn)] = &[
    // Points, directions, placements
    (IfcType::IfcCartesianPoint, primitives::load_cartesian_point),
    (IfcType::IfcDirection, primitives::load_direction),
    (IfcType::IfcVector, primitives::load_vector),
    (IfcType::IfcCartesianPointList, primitives::load_point_list),
    (IfcType::IfcAxis1Placement, primitives::load_axis1_placement),
    (IfcType::IfcAxis2Placement2D, primitives::load_axis2_placement_2d),
    (IfcType::IfcAxis2Placement3D, primitives::load_axis2_placement_3d),
    (
        IfcType::IfcCartesianTransformationOperator3DnonUniform,
        |cache, entity| primitives::load_transform_operator(cache, entity, true),
    ),
    (
        IfcType::IfcCartesianTransformationOperator3D,
        |cache, entity| primitives::load_transform_operator(cache, entity, false),
    ),
    (IfcType::IfcLocalPlacement, primitives::load_local_placement),
    // Curves
    (IfcType::IfcLine, curves::load_line),
    (IfcType::IfcCircle, curves::load_circle),
    (IfcType::IfcEllipse, curves::load_ellipse),
    (IfcType::IfcTrimmedCurve, curves::load_trimmed_curve),
    (IfcType::IfcPolyline, curves::load_polyline),
    (IfcType::IfcCompositeCurveSegment, curves::load_composite_curve_segment),
    (IfcType::IfcCompositeCurve, curves::load_composite_curve),
    (IfcType::IfcIndexedPolyCurve, curves::load_indexed_poly_curve),
    (
        IfcType::IfcRationalBSplineCurveWithKnots,
        |cache, entity| curves::load_bspline_curve(cache, entity, true),
    ),
    (
        IfcType::IfcBSplineCurveWithKnots,
        |cache, entity| curves::load_bspline_curve(cache, entity, false),
    ),
    (IfcType::IfcOffsetCurve2D, curves::load_offset_curve_2d),
    (IfcType::IfcPlane, solids::load_plane),
    // Topology
    (IfcType::IfcVertexPoint, topology::load_vertex_point),
    (IfcType::IfcEdgeCurve, topology::load_edge_curve),
    (IfcType::IfcOrientedEdge, topology::load_oriented_edge),
    (IfcType::IfcEdge, topology::load_edge),
    (IfcType::IfcPolyLoop, topology::load_poly_loop),
    (IfcType::IfcEdgeLoop, topology::load_edge_loop),
    (
        IfcType::IfcFaceOuterBound,
        |cache, entity| topology::load_face_bound(cache, entity, true),
    ),
    (
        IfcType::IfcFaceBound,
        |cache, entity| topology::load_face_bound(cache, entity, false),
    ),
    (IfcType::IfcFace, topology::load_face),
    (
        IfcType::IfcClosedShell,
        |cache, entity| shells::load_shell(cache, entity, true),
    ),
    (
        IfcType::IfcOpenShell,
        |cache, entity| shells::load_shell(cache, entity, false),
    ),
    (
        IfcType::IfcConnectedFaceSet,
        |cache, entity| shells::load_shell(cache, entity, false),
    ),
    // Profiles
    (IfcType::IfcArbitraryProfileDefWithVoids, profiles::load_arbitrary_profile_with_voids),
    (IfcType::IfcArbitraryClosedProfileDef, profiles::load_arbitrary_closed_profile),
    (IfcType::IfcRectangleProfileDef, profiles::load_rectangle_profile),
    (IfcType::IfcCircleProfileDef, profiles::load_circle_profile),
    // Shells, surface models, tessellation
    (IfcType::IfcFacetedBrepWithVoids, shells::load_faceted_brep),
    (IfcType::IfcFacetedBrep, shells::load_faceted_brep),
    (IfcType::IfcFaceBasedSurfaceModel, shells::load_surface_model),
    (IfcType::IfcShellBasedSurfaceModel, shells::load_surface_model),
    (IfcType::IfcTriangulatedFaceSet, shells::load_triangulated_face_set),
    (IfcType::IfcIndexedPolygonalFaceWithVoids, shells::load_indexed_polygonal_face),
    (IfcType::IfcIndexedPolygonalFace, shells::load_indexed_polygonal_face),
    (IfcType::IfcPolygonalFaceSet, shells::load_polygonal_face_set),
    // Solids
    (IfcType::IfcExtrudedAreaSolid, solids::load_extruded_area_solid),
    (IfcType::IfcRevolvedAreaSolid, solids::load_revolved_area_solid),
    (IfcType::IfcSurfaceCurveSweptAreaSolid, solids::load_surface_curve_swept_area_solid),
    (IfcType::IfcSweptDiskSolid, solids::load_swept_disk_solid),
    (IfcType::IfcSectionedSolidHorizontal, solids::load_sectioned_solid_horizontal),
    (IfcType::IfcDistanceExpression, solids::load_distance_expression),
    (IfcType::IfcPolygonalBoundedHalfSpace, solids::load_half_space_solid),
    (IfcType::IfcHalfSpaceSolid, solids::load_half_space_solid),
    (IfcType::IfcBlock, solids::load_block),
    (IfcType::IfcBoundingBox, solids::load_bounding_box),
    (IfcType::IfcBooleanClippingResult, boolean::load_boolean_result),
    (IfcType::IfcBooleanResult, boolean::load_boolean_result),
    (IfcType::IfcMappedItem, representation::load_mapped_item),
    // Presentation
    (IfcType::IfcColourRgb, styles::load_colour_rgb),
    (IfcType::IfcSurfaceStyleRendering, styles::load_surface_style_shading),
    (IfcType::IfcSurfaceStyleShading, styles::load_surface_style_shading),
    (IfcType::IfcSurfaceStyle, styles::load_surface_style),
    (IfcType::IfcPresentationStyleAssignment, styles::load_style_assignment),
    (IfcType::IfcStyledItem, styles::load_styled_item),
    (IfcType::IfcPresentationLayerAssignment, styles::load_layer_assignment),
    // Representations and products
    (IfcType::IfcShapeRepresentation, representation::load_shape_representation),
    (IfcType::IfcProductDefinitionShape, representation::load_product_definition_shape),
    (IfcType::IfcRepresentationMap, representation::load_representation_map),
    (IfcType::IfcRelVoidsElement, representation::load_rel_voids_element),
    (IfcType::IfcProduct, representation::load_product),
];

fn find_loader(ifc_type: IfcType) -> Option<LoadFn> {
    DISPATCH_TABLE
        .iter()
        .find(|(candidate, _)| ifc_type.is_subtype_of(*candidate))
        .map(|(_, load)| *load)
}

/// Id-keyed cache of resolved entities for one import
pub struct EntityCache<'a> {
    decoder: EntityDecoder<'a>,
    arena: SlotMap<EntityKey, EntityRecord>,
    index: FxHashMap<u32, EntityOutcome>,
    pub(crate) options: ImportOptions,
    pub(crate) log: ImportLog,
}

impl<'a> EntityCache<'a> {
    pub fn new(content: &'a str, options: ImportOptions) -> Self {
        Self {
            decoder: EntityDecoder::new(content),
            arena: SlotMap::with_key(),
            index: FxHashMap::default(),
            options,
            log: ImportLog::new(),
        }
    }

    /// `Resolve(id)`: construct on first use, then return the cached outcome.
    ///
    /// `declared` is the type the referencing attribute expects; a cached
    /// entity of an incompatible type is reported as `Failed` without
    /// touching the cache.
    pub fn resolve(&mut self, id: u32, declared: IfcType) -> EntityOutcome {
        if let Some(outcome) = self.index.get(&id) {
            return match outcome {
                EntityOutcome::Imported(key) => {
                    let record = &self.arena[*key];
                    if record.ifc_type.is_subtype_of(declared) {
                        outcome.clone()
                    } else {
                        EntityOutcome::Failed(type_mismatch(id, record.ifc_type, declared))
                    }
                }
                other => other.clone(),
            };
        }

        let decoded = match self.decoder.decode_by_id(id) {
            Ok(decoded) => decoded,
            Err(e) => {
                let message = e.to_string();
                self.log.error(id, DiagnosticKind::InvalidEntity, &message);
                self.index.insert(id, EntityOutcome::Failed(message.clone()));
                return EntityOutcome::Failed(message);
            }
        };

        let Some(load) = find_loader(decoded.ifc_type) else {
            self.log.comment(
                id,
                DiagnosticKind::SkippedEntity,
                format!("{} is not imported", decoded.step_name),
            );
            self.index.insert(id, EntityOutcome::Skipped);
            return EntityOutcome::Skipped;
        };

        if !decoded.is_subtype_of(declared) {
            return EntityOutcome::Failed(type_mismatch(id, decoded.ifc_type, declared));
        }

        // Register before resolving attributes
        let key = self.arena.insert(EntityRecord {
            id,
            ifc_type: decoded.ifc_type,
            valid: Cell::new(true),
            entity: Entity::Pending,
        });
        self.index.insert(id, EntityOutcome::Imported(key));

        match load(self, &decoded) {
            Ok(entity) => {
                self.arena[key].entity = entity;
                EntityOutcome::Imported(key)
            }
            Err(e) => {
                let message = e.to_string();
                self.arena[key].mark_invalid();
                self.log.error(id, DiagnosticKind::InvalidEntity, &message);
                self.index.insert(id, EntityOutcome::Failed(message.clone()));
                EntityOutcome::Failed(message)
            }
        }
    }

    /// Resolve a required reference
    pub(crate) fn child(&mut self, id: u32, declared: IfcType) -> Result<EntityKey> {
        match self.resolve(id, declared) {
            EntityOutcome::Imported(key) => Ok(key),
            EntityOutcome::Skipped => Err(Error::entity(id, "referenced entity is not imported")),
            EntityOutcome::Failed(reason) => Err(Error::entity(id, reason)),
        }
    }

    pub(crate) fn optional_child(
        &mut self,
        id: Option<u32>,
        declared: IfcType,
    ) -> Result<Option<EntityKey>> {
        id.map(|id| self.child(id, declared)).transpose()
    }

    /// Resolve every reference, failing on the first that cannot be resolved
    pub(crate) fn children(&mut self, ids: &[u32], declared: IfcType) -> Result<Vec<EntityKey>> {
        ids.iter().map(|&id| self.child(id, declared)).collect()
    }

    /// Resolve references, dropping the ones that are skipped or fail
    pub(crate) fn children_lenient(&mut self, ids: &[u32], declared: IfcType) -> Vec<EntityKey> {
        ids.iter()
            .filter_map(|&id| match self.resolve(id, declared) {
                EntityOutcome::Imported(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    /// Whether record `id` is written as `ifc_type` or a subtype, without
    /// resolving it
    pub(crate) fn declares(&mut self, id: u32, ifc_type: IfcType) -> bool {
        self.decoder
            .decode_by_id(id)
            .map_or(false, |decoded| decoded.is_subtype_of(ifc_type))
    }

    pub fn outcome(&self, id: u32) -> Option<&EntityOutcome> {
        self.index.get(&id)
    }

    pub fn key_of(&self, id: u32) -> Option<EntityKey> {
        match self.index.get(&id) {
            Some(EntityOutcome::Imported(key)) => Some(*key),
            _ => None,
        }
    }

    pub fn record(&self, key: EntityKey) -> &EntityRecord {
        &self.arena[key]
    }

    pub fn entity(&self, key: EntityKey) -> &Entity {
        &self.arena[key].entity
    }

    /// Number of constructed records
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Ids of all entities of `declared` or a subtype, in file order
    pub fn ids_of_type(&self, declared: IfcType) -> Vec<u32> {
        self.decoder.ids_of_type(declared)
    }

    pub fn log(&self) -> &ImportLog {
        &self.log
    }

    pub fn take_log(&mut self) -> ImportLog {
        std::mem::take(&mut self.log)
    }

    /// A resolved entity that must not be pending
    pub(crate) fn settled(&self, key: EntityKey) -> Result<&Entity> {
        let record = &self.arena[key];
        match &record.entity {
            Entity::Pending => Err(Error::entity(
                record.id,
                "reference cycle reached an entity that is still being resolved",
            )),
            entity => Ok(entity),
        }
    }
}

fn type_mismatch(id: u32, actual: IfcType, declared: IfcType) -> String {
    format!("#{} is {}, expected {}", id, actual, declared)
}
