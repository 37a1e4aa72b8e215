// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polyhedral solids: planar faces with one outer loop and optional holes.

use nalgebra::{Matrix4, Point3, Vector3};

use super::MaterialId;
use crate::mesh::Mesh;
use crate::transform::has_reflection;
use crate::triangulation::{polygon_normal, triangulate_face};

#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    /// Counter-clockwise seen from outside the solid
    pub outer: Vec<Point3<f64>>,
    /// Clockwise seen from outside the solid
    pub inner: Vec<Vec<Point3<f64>>>,
    pub material: Option<MaterialId>,
}

impl Face {
    pub fn new(outer: Vec<Point3<f64>>) -> Self {
        Self {
            outer,
            inner: Vec::new(),
            material: None,
        }
    }

    pub fn with_holes(outer: Vec<Point3<f64>>, inner: Vec<Vec<Point3<f64>>>) -> Self {
        Self {
            outer,
            inner,
            material: None,
        }
    }

    pub fn normal(&self) -> Option<Vector3<f64>> {
        polygon_normal(&self.outer)
    }

    pub fn reverse(&mut self) {
        self.outer.reverse();
        self.inner.iter_mut().for_each(|hole| hole.reverse());
    }

    /// Triangles as point triples
    pub fn triangles(&self) -> Vec<[Point3<f64>; 3]> {
        let Ok(indices) = triangulate_face(&self.outer, &self.inner) else {
            return Vec::new();
        };
        let all: Vec<Point3<f64>> = self
            .outer
            .iter()
            .chain(self.inner.iter().flatten())
            .copied()
            .collect();
        indices
            .into_iter()
            .map(|[a, b, c]| [all[a], all[b], all[c]])
            .collect()
    }
}

/// Boundary representation of a closed (or intended-closed) polyhedron
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Solid {
    pub faces: Vec<Face>,
}

impl Solid {
    pub fn new(faces: Vec<Face>) -> Self {
        Self { faces }
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// The material shared by every face, if there is exactly one
    pub fn unique_material(&self) -> Option<MaterialId> {
        let first = self.faces.first()?.material?;
        self.faces
            .iter()
            .all(|f| f.material == Some(first))
            .then_some(first)
    }

    /// Assign `material` to faces that have none
    pub fn fill_material(&mut self, material: MaterialId) {
        self.faces
            .iter_mut()
            .filter(|f| f.material.is_none())
            .for_each(|f| f.material = Some(material));
    }

    pub fn transform(&mut self, m: &Matrix4<f64>) {
        let mirror = has_reflection(m);
        for face in &mut self.faces {
            face.outer.iter_mut().for_each(|p| *p = m.transform_point(p));
            face.inner
                .iter_mut()
                .flatten()
                .for_each(|p| *p = m.transform_point(p));
            if mirror {
                face.reverse();
            }
        }
    }

    pub fn transformed(&self, m: &Matrix4<f64>) -> Solid {
        let mut solid = self.clone();
        solid.transform(m);
        solid
    }

    pub fn translated(&self, offset: &Vector3<f64>) -> Solid {
        self.transformed(&Matrix4::new_translation(offset))
    }

    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let mut points = self.faces.iter().flat_map(|f| f.outer.iter());
        let first = *points.next()?;
        Some(points.fold((first, first), |(min, max), p| {
            (min.inf(p), max.sup(p))
        }))
    }

    /// Volume from the divergence theorem; negative when faces point inwards
    pub fn signed_volume(&self) -> f64 {
        self.faces
            .iter()
            .flat_map(Face::triangles)
            .map(|[a, b, c]| a.coords.dot(&b.coords.cross(&c.coords)) / 6.0)
            .sum()
    }

    /// Flip every face if the solid is inside out
    pub fn orient_outward(&mut self) {
        if self.signed_volume() < 0.0 {
            self.faces.iter_mut().for_each(Face::reverse);
        }
    }

    pub fn to_mesh(&self) -> Mesh {
        let mut mesh = Mesh::new();
        for face in &self.faces {
            let Some(normal) = face.normal() else {
                continue;
            };
            for [a, b, c] in face.triangles() {
                let i0 = mesh.add_vertex(a, normal);
                let i1 = mesh.add_vertex(b, normal);
                let i2 = mesh.add_vertex(c, normal);
                mesh.add_triangle(i0, i1, i2);
            }
        }
        mesh.material = self.unique_material();
        mesh
    }
}

/// Axis-aligned box with its minimum corner at `origin`
pub fn box_solid(origin: Point3<f64>, size: Vector3<f64>) -> Solid {
    let (x0, y0, z0) = (origin.x, origin.y, origin.z);
    let (x1, y1, z1) = (x0 + size.x, y0 + size.y, z0 + size.z);
    let p = |x, y, z| Point3::new(x, y, z);
    let mut solid = Solid::new(vec![
        Face::new(vec![p(x0, y0, z0), p(x0, y1, z0), p(x1, y1, z0), p(x1, y0, z0)]),
        Face::new(vec![p(x0, y0, z1), p(x1, y0, z1), p(x1, y1, z1), p(x0, y1, z1)]),
        Face::new(vec![p(x0, y0, z0), p(x1, y0, z0), p(x1, y0, z1), p(x0, y0, z1)]),
        Face::new(vec![p(x1, y0, z0), p(x1, y1, z0), p(x1, y1, z1), p(x1, y0, z1)]),
        Face::new(vec![p(x1, y1, z0), p(x0, y1, z0), p(x0, y1, z1), p(x1, y1, z1)]),
        Face::new(vec![p(x0, y1, z0), p(x0, y0, z0), p(x0, y0, z1), p(x0, y1, z1)]),
    ]);
    solid.orient_outward();
    solid
}
