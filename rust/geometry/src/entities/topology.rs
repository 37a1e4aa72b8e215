// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Vertices, edges, loops, bounds and faces.
//!
//! Faces are fed to the active builder outer bound first. A failing outer
//! bound fails the face; a failing inner bound only drops that hole.

use ifc_import_core::{DecodedEntity, IfcType};
use nalgebra::{Matrix4, Point3};

use super::{CurveGeometry, Entity, EntityCache, EntityKey, EntityOutcome};
use crate::builder::ShapeBuilder;
use crate::diagnostics::DiagnosticKind;
use crate::error::{Error, Result};
use crate::kernel::Curve;
use crate::repair::repair_loop;
use crate::scope::ShapeEditScope;
use crate::transform::has_reflection;

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeData {
    pub start: Point3<f64>,
    pub end: Point3<f64>,
    /// Edge geometry; a straight segment when absent
    pub curve: Option<CurveGeometry>,
    pub same_sense: bool,
}

impl EdgeData {
    /// Points from the travel start up to, not including, the travel end
    fn points(&self, forward: bool, arc_segments: usize) -> Vec<Point3<f64>> {
        let from = if forward { self.start } else { self.end };
        let curved = self
            .curve
            .as_ref()
            .and_then(|curve| {
                // Always trace in the edge's own direction, then flip
                let segment = curve.between(&self.start, &self.end, self.same_sense)?;
                (!matches!(segment.curve, Curve::Line { .. })).then_some(segment)
            })
            .map(|segment| segment.tessellate(arc_segments));

        match curved {
            Some(mut points) if points.len() > 2 => {
                if !forward {
                    points.reverse();
                }
                // Snap the ends to the topological vertices
                points[0] = from;
                points.pop();
                points
            }
            _ => vec![from],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopData {
    /// `IfcPolyLoop` vertices
    Poly(Vec<Point3<f64>>),
    /// `IfcEdgeLoop` oriented edges
    Edges(Vec<EntityKey>),
}

impl EntityCache<'_> {
    fn vertex(&mut self, id: u32) -> Result<Point3<f64>> {
        self.settled_as(id, IfcType::IfcVertex, "a vertex", |e| match e {
            Entity::Vertex(p) => Some(*p),
            _ => None,
        })
    }
}

pub(crate) fn load_vertex_point(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let point = cache.point(entity.required_ref(0, "VertexGeometry")?)?;
    Ok(Entity::Vertex(point))
}

pub(crate) fn load_edge(cache: &mut EntityCache<'_>, entity: &DecodedEntity) -> Result<Entity> {
    let start = cache.vertex(entity.required_ref(0, "EdgeStart")?)?;
    let end = cache.vertex(entity.required_ref(1, "EdgeEnd")?)?;
    Ok(Entity::Edge(EdgeData {
        start,
        end,
        curve: None,
        same_sense: true,
    }))
}

pub(crate) fn load_edge_curve(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let start = cache.vertex(entity.required_ref(0, "EdgeStart")?)?;
    let end = cache.vertex(entity.required_ref(1, "EdgeEnd")?)?;
    let curve = cache.curve(entity.required_ref(2, "EdgeGeometry")?)?;
    let same_sense = entity.optional_bool(3).unwrap_or(true);
    Ok(Entity::Edge(EdgeData {
        start,
        end,
        curve: Some(curve),
        same_sense,
    }))
}

pub(crate) fn load_oriented_edge(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let edge = cache.child(entity.required_ref(2, "EdgeElement")?, IfcType::IfcEdge)?;
    let orientation = entity.optional_bool(3).unwrap_or(true);
    Ok(Entity::OrientedEdge { edge, orientation })
}

pub(crate) fn load_poly_loop(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let points = entity
        .required_refs(0, "Polygon")?
        .into_iter()
        .map(|id| cache.point(id))
        .collect::<Result<Vec<_>>>()?;
    Ok(Entity::Loop(LoopData::Poly(points)))
}

pub(crate) fn load_edge_loop(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let edges = cache.children(&entity.required_refs(0, "EdgeList")?, IfcType::IfcEdge)?;
    Ok(Entity::Loop(LoopData::Edges(edges)))
}

pub(crate) fn load_face_bound(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
    outer: bool,
) -> Result<Entity> {
    let bound = cache.child(entity.required_ref(0, "Bound")?, IfcType::IfcLoop)?;
    let orientation = entity.optional_bool(1).unwrap_or(true);
    Ok(Entity::FaceBound {
        bound,
        orientation,
        outer,
    })
}

/// A bound that fails to resolve is dropped as a hole unless it is the
/// outer bound: the declared outer bound, or the first one when none is
/// declared.
pub(crate) fn load_face(cache: &mut EntityCache<'_>, entity: &DecodedEntity) -> Result<Entity> {
    let ids = entity.required_refs(0, "Bounds")?;
    let declared_outer: Vec<bool> = ids
        .iter()
        .map(|&id| cache.declares(id, IfcType::IfcFaceOuterBound))
        .collect();
    let has_declared_outer = declared_outer.contains(&true);

    let mut bounds = Vec::with_capacity(ids.len());
    for (i, &id) in ids.iter().enumerate() {
        let reason = match cache.resolve(id, IfcType::IfcFaceBound) {
            EntityOutcome::Imported(key) => {
                bounds.push(key);
                continue;
            }
            EntityOutcome::Skipped => "bound is not imported".to_string(),
            EntityOutcome::Failed(reason) => reason,
        };
        if declared_outer[i] || (!has_declared_outer && i == 0) {
            return Err(Error::entity(
                entity.id,
                format!("outer bound #{} failed: {}", id, reason),
            ));
        }
        cache.log.warning(
            entity.id,
            DiagnosticKind::DroppedHole,
            format!("inner bound #{} dropped: {}", id, reason),
        );
    }

    if bounds.is_empty() {
        return Err(Error::entity(entity.id, "face has no bounds"));
    }
    Ok(Entity::Face { bounds })
}

/// Loop vertices in loop order, in the loop's own coordinates
pub(crate) fn loop_vertices(
    cache: &EntityCache<'_>,
    key: EntityKey,
    arc_segments: usize,
) -> Result<Vec<Point3<f64>>> {
    let id = cache.record(key).id;
    match cache.settled(key)? {
        Entity::Loop(LoopData::Poly(points)) => Ok(points.clone()),
        Entity::Loop(LoopData::Edges(edges)) => {
            let mut points = Vec::new();
            for &edge_key in edges {
                let (edge, forward) = match cache.settled(edge_key)? {
                    Entity::OrientedEdge { edge, orientation } => (*edge, *orientation),
                    Entity::Edge(_) => (edge_key, true),
                    _ => return Err(Error::entity(id, "edge loop member is not an edge")),
                };
                let Entity::Edge(data) = cache.settled(edge)? else {
                    return Err(Error::entity(id, "oriented edge does not refer to an edge"));
                };
                points.extend(data.points(forward, arc_segments));
            }
            Ok(points)
        }
        _ => Err(Error::entity(id, "expected a loop")),
    }
}

/// World-space, repaired points of one face bound
fn bound_points(
    scope: &mut ShapeEditScope<'_>,
    bound_key: EntityKey,
    lcs: &Matrix4<f64>,
) -> Result<Vec<Point3<f64>>> {
    let cache = scope.cache;
    let record = cache.record(bound_key);
    let Entity::FaceBound {
        bound, orientation, ..
    } = cache.settled(bound_key)?
    else {
        return Err(Error::entity(record.id, "expected a face bound"));
    };

    let points: Vec<Point3<f64>> = loop_vertices(cache, *bound, scope.options.arc_segments)?
        .iter()
        .map(|p| lcs.transform_point(p))
        .collect();
    let repaired = repair_loop(&points, scope.options.vertex_tolerance)?;
    if repaired.was_corrected() {
        scope.log.comment(
            record.id,
            DiagnosticKind::AutoCorrection,
            format!(
                "merged {} vertices and projected {} onto the loop plane",
                repaired.merged, repaired.projected
            ),
        );
    }

    let mut points = repaired.points;
    if has_reflection(lcs) != !*orientation {
        points.reverse();
    }
    Ok(points)
}

/// Feed one face to `builder`; errors mean the face was not added
pub(crate) fn build_face(
    scope: &mut ShapeEditScope<'_>,
    builder: &mut ShapeBuilder,
    face: EntityKey,
    lcs: &Matrix4<f64>,
) -> Result<()> {
    let cache = scope.cache;
    let face_id = cache.record(face).id;
    let Entity::Face { bounds } = cache.settled(face)? else {
        return Err(Error::entity(face_id, "expected a face"));
    };

    // The first declared outer bound wins; faces without one use their
    // first bound.
    let mut outer_index = None;
    for (i, &bound) in bounds.iter().enumerate() {
        if let Entity::FaceBound { outer: true, .. } = cache.entity(bound) {
            if outer_index.is_none() {
                outer_index = Some(i);
            } else {
                scope.log.warning(
                    face_id,
                    DiagnosticKind::DuplicateOuterBound,
                    format!("bound #{} is treated as an inner bound", cache.record(bound).id),
                );
            }
        }
    }
    let outer_index = outer_index.unwrap_or(0);

    builder.start_face(scope.current_material());

    let outer_bound = bounds[outer_index];
    let outer = bound_points(scope, outer_bound, lcs)
        .and_then(|points| builder.add_loop(points, true));
    if let Err(e) = outer {
        builder.stop_face();
        scope.log.warning(
            cache.record(outer_bound).id,
            DiagnosticKind::InvalidLoop,
            format!("outer bound rejected: {}", e),
        );
        return Err(Error::entity(face_id, "face has no valid outer bound"));
    }

    for (i, &bound) in bounds.iter().enumerate() {
        if i == outer_index {
            continue;
        }
        let hole = bound_points(scope, bound, lcs).and_then(|points| builder.add_loop(points, false));
        if let Err(e) = hole {
            scope.log.warning(
                cache.record(bound).id,
                DiagnosticKind::DroppedHole,
                format!("inner bound dropped: {}", e),
            );
        }
    }

    if builder.stop_face() {
        Ok(())
    } else {
        Err(Error::entity(face_id, "face could not be closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuilderMode;
    use crate::config::ImportOptions;
    use crate::diagnostics::ImportLog;
    use crate::entities::styles::StyleIndex;
    use crate::kernel::{GeometryObject, PolyhedralKernel};

    const FACES: &str = r#"
#1=IFCCARTESIANPOINT((0.,0.,0.));
#2=IFCCARTESIANPOINT((10.,0.,0.));
#3=IFCCARTESIANPOINT((10.,10.,0.));
#4=IFCCARTESIANPOINT((0.,10.,0.));
#5=IFCCARTESIANPOINT((4.,4.,0.));
#6=IFCCARTESIANPOINT((6.,4.,0.));
#7=IFCCARTESIANPOINT((6.,6.,0.));
#8=IFCCARTESIANPOINT((4.,6.,0.));
#9=IFCCARTESIANPOINT((1.,1.,0.));
#10=IFCPOLYLOOP((#1,#2,#3,#4));
#11=IFCPOLYLOOP((#5,#8,#7,#6));
#12=IFCPOLYLOOP((#1,#9,#1));
#20=IFCFACEOUTERBOUND(#10,.T.);
#21=IFCFACEBOUND(#11,.T.);
#22=IFCFACEBOUND(#12,.T.);
#23=IFCFACEOUTERBOUND(#11,.T.);
#24=IFCDIRECTION((0.,0.,1.));
#25=IFCPOLYLOOP((#24,#5,#6));
#26=IFCFACEBOUND(#25,.T.);
#27=IFCFACEOUTERBOUND(#25,.T.);
#30=IFCFACE((#20,#21));
#31=IFCFACE((#20,#22));
#32=IFCFACE((#22,#21));
#33=IFCFACE((#20,#23));
"#;

    fn build(face_id: u32) -> (Result<()>, ImportLog, Option<GeometryObject>) {
        let mut cache = EntityCache::new(FACES, ImportOptions::default());
        let face = cache.child(face_id, IfcType::IfcFace).unwrap();
        let kernel = PolyhedralKernel::default();
        let options = ImportOptions::default();
        let styles = StyleIndex::default();
        let log = cache.take_log();
        let mut scope = ShapeEditScope::new(&cache, &kernel, &options, &styles, log);
        let mut builder = scope
            .with_builder_mode(BuilderMode::ANY_MESH)
            .new_builder();
        let result = build_face(&mut scope, &mut builder, face, &Matrix4::identity());
        (result, scope.log, builder.finish())
    }

    #[test]
    fn test_face_with_hole() {
        let (result, log, geometry) = build(30);
        assert!(result.is_ok());
        assert!(log.is_empty());
        let mesh = geometry.unwrap().to_mesh();
        // 100 minus the 4 of the hole, single sided
        let area: f64 = mesh
            .indices
            .chunks_exact(3)
            .map(|t| {
                let (a, b, c) = (
                    mesh.position(t[0] as usize),
                    mesh.position(t[1] as usize),
                    mesh.position(t[2] as usize),
                );
                (b - a).cross(&(c - a)).norm() / 2.0
            })
            .sum();
        assert!((area - 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_hole_is_dropped() {
        let (result, log, geometry) = build(31);
        assert!(result.is_ok());
        assert!(log.has(DiagnosticKind::DroppedHole));
        assert!(geometry.is_some());
    }

    #[test]
    fn test_degenerate_outer_fails_face() {
        // No bound is marked outer, so the degenerate first bound is used
        let (result, log, geometry) = build(32);
        assert!(result.is_err());
        assert!(log.has(DiagnosticKind::InvalidLoop));
        assert!(geometry.is_none());
    }

    #[test]
    fn test_second_outer_bound_becomes_hole() {
        let (result, log, _) = build(33);
        assert!(result.is_ok());
        assert!(log.has(DiagnosticKind::DuplicateOuterBound));
    }

    #[test]
    fn test_unresolvable_hole_is_dropped_at_load() {
        let mut cache = EntityCache::new(FACES, ImportOptions::default());
        let face = cache.child(34, IfcType::IfcFace).unwrap();
        let Entity::Face { bounds } = cache.entity(face) else {
            panic!("expected a face");
        };
        assert_eq!(bounds.len(), 2);
        assert!(cache
            .log()
            .for_entity(34)
            .any(|d| d.kind == DiagnosticKind::DroppedHole));

        let (result, _, geometry) = build(34);
        assert!(result.is_ok());
        assert!(geometry.is_some());
    }

    #[test]
    fn test_unresolvable_outer_bound_fails_face() {
        let mut cache = EntityCache::new(FACES, ImportOptions::default());
        // Declared outer bound
        assert!(matches!(
            cache.resolve(35, IfcType::IfcFace),
            EntityOutcome::Failed(_)
        ));
        // First bound when none is declared outer
        assert!(matches!(
            cache.resolve(36, IfcType::IfcFace),
            EntityOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_edge_loop_follows_orientation() {
        let content = r#"
#1=IFCCARTESIANPOINT((0.,0.,0.));
#2=IFCCARTESIANPOINT((1.,0.,0.));
#3=IFCCARTESIANPOINT((0.,1.,0.));
#4=IFCVERTEXPOINT(#1);
#5=IFCVERTEXPOINT(#2);
#6=IFCVERTEXPOINT(#3);
#7=IFCEDGE(#4,#5);
#8=IFCEDGE(#6,#5);
#9=IFCEDGE(#6,#4);
#10=IFCORIENTEDEDGE(*,*,#7,.T.);
#11=IFCORIENTEDEDGE(*,*,#8,.F.);
#12=IFCORIENTEDEDGE(*,*,#9,.T.);
#13=IFCEDGELOOP((#10,#11,#12));
"#;
        let mut cache = EntityCache::new(content, ImportOptions::default());
        let key = cache.child(13, IfcType::IfcLoop).unwrap();
        let points = loop_vertices(&cache, key, 24).unwrap();
        assert_eq!(
            points,
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ]
        );
    }

    #[test]
    fn test_curved_edge_is_tessellated() {
        let content = r#"
#1=IFCCARTESIANPOINT((1.,0.,0.));
#2=IFCCARTESIANPOINT((-1.,0.,0.));
#3=IFCVERTEXPOINT(#1);
#4=IFCVERTEXPOINT(#2);
#5=IFCCARTESIANPOINT((0.,0.,0.));
#6=IFCAXIS2PLACEMENT3D(#5,$,$);
#7=IFCCIRCLE(#6,1.);
#8=IFCEDGECURVE(#3,#4,#7,.T.);
#9=IFCEDGE(#4,#3);
#10=IFCORIENTEDEDGE(*,*,#8,.T.);
#11=IFCORIENTEDEDGE(*,*,#9,.T.);
#12=IFCEDGELOOP((#10,#11));
"#;
        let mut cache = EntityCache::new(content, ImportOptions::default());
        let key = cache.child(12, IfcType::IfcLoop).unwrap();
        let points = loop_vertices(&cache, key, 24).unwrap();
        // Half circle over the top: 12 arc steps, then the closing diameter
        assert_eq!(points.len(), 13);
        assert!(points.iter().all(|p| p.y >= -1e-12));
    }
}
