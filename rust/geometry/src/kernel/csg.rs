// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boolean operations on polyhedral solids through csgrs BSP trees.
//!
//! Face materials travel through the CSG as polygon metadata, so faces cut
//! out of the second operand keep the material that operand carried.

use csgrs::mesh::{polygon::Polygon, vertex::Vertex, Mesh as CSGMesh};
use csgrs::traits::CSG;
use nalgebra::Point3;

use super::solid::{Face, Solid};
use super::{BooleanOperator, MaterialId};
use crate::triangulation::polygon_normal;

/// Convert a solid to csgrs polygons, one triangle fan per face
fn solid_to_csgrs(solid: &Solid) -> CSGMesh<MaterialId> {
    let mut polygons = Vec::new();

    for face in &solid.faces {
        let Some(normal) = face.normal() else {
            continue;
        };

        for [a, b, c] in face.triangles() {
            // Skip slivers, they poison the BSP planes
            if (b - a).cross(&(c - a)).norm() < 1e-12 {
                continue;
            }
            let vertices = vec![
                Vertex::new(a, normal),
                Vertex::new(b, normal),
                Vertex::new(c, normal),
            ];
            polygons.push(Polygon::new(vertices, face.material));
        }
    }

    CSGMesh::from_polygons(&polygons, None)
}

/// Convert csgrs polygons back to solid faces
fn csgrs_to_solid(csg_mesh: &CSGMesh<MaterialId>) -> Solid {
    let faces = csg_mesh
        .polygons
        .iter()
        .filter(|polygon| polygon.vertices.len() >= 3)
        .filter_map(|polygon| {
            let outer: Vec<Point3<f64>> = polygon
                .vertices
                .iter()
                .map(|v| Point3::new(v.pos[0], v.pos[1], v.pos[2]))
                .collect();
            polygon_normal(&outer)?;
            Some(Face {
                outer,
                inner: Vec::new(),
                material: polygon.metadata,
            })
        })
        .collect();
    Solid::new(faces)
}

/// Run one Boolean; `None` when the result is unusable
pub(crate) fn boolean(first: &Solid, second: &Solid, operator: BooleanOperator) -> Option<Solid> {
    let a = solid_to_csgrs(first);
    let b = solid_to_csgrs(second);
    if a.polygons.is_empty() {
        return None;
    }

    let result = match operator {
        BooleanOperator::Union => a.union(&b),
        BooleanOperator::Difference => a.difference(&b),
        BooleanOperator::Intersection => a.intersection(&b),
    };

    let solid = csgrs_to_solid(&result);
    let finite = solid
        .faces
        .iter()
        .flat_map(|f| f.outer.iter())
        .all(|p| p.coords.iter().all(|c| c.is_finite()));
    if !finite {
        return None;
    }
    // An empty union means the kernel lost the operands
    if solid.is_empty() && operator == BooleanOperator::Union {
        return None;
    }
    Some(solid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::solid::box_solid;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn cube(origin: [f64; 3], size: f64) -> Solid {
        box_solid(Point3::from(origin), Vector3::new(size, size, size))
    }

    #[test]
    fn test_conversion_keeps_material() {
        let mut solid = cube([0.0, 0.0, 0.0], 1.0);
        solid.fill_material(MaterialId(4));
        let csg = solid_to_csgrs(&solid);
        assert_eq!(csg.polygons.len(), 12);
        let back = csgrs_to_solid(&csg);
        assert_eq!(back.unique_material(), Some(MaterialId(4)));
        assert_relative_eq!(back.signed_volume(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_difference_volume() {
        let host = cube([0.0, 0.0, 0.0], 2.0);
        let tool = cube([1.0, 1.0, 1.0], 2.0);
        let result = boolean(&host, &tool, BooleanOperator::Difference).unwrap();
        assert_relative_eq!(result.signed_volume(), 7.0, epsilon = 1e-6);
    }

    #[test]
    fn test_intersection_volume() {
        let a = cube([0.0, 0.0, 0.0], 2.0);
        let b = cube([1.0, 1.0, 1.0], 2.0);
        let result = boolean(&a, &b, BooleanOperator::Intersection).unwrap();
        assert_relative_eq!(result.signed_volume(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_disjoint_intersection_is_empty_but_valid() {
        let a = cube([0.0, 0.0, 0.0], 1.0);
        let b = cube([5.0, 5.0, 5.0], 1.0);
        let result = boolean(&a, &b, BooleanOperator::Intersection).unwrap();
        assert!(result.is_empty());
    }
}
