// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Permissive polygon-soup builder.
//!
//! Any loop with three non-collinear vertices is accepted. The result is a
//! solid when the faces close up and a mesh otherwise.

use nalgebra::Point3;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::kernel::{Face, GeometryObject, MaterialId, Solid};
use crate::triangulation::polygon_normal;

/// What `create_geometry` should try to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TessellationTarget {
    /// A closed solid, or the fallback
    Solid,
    /// A solid when closed, a mesh otherwise
    AnyGeometry,
}

/// What to return when `TessellationTarget::Solid` cannot be met
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TessellationFallback {
    Mesh,
    Abort,
}

#[derive(Debug)]
pub struct TessellatedBuilder {
    weld_tolerance: f64,
    faces: Vec<Face>,
    current: Option<Face>,
}

impl TessellatedBuilder {
    pub fn new(weld_tolerance: f64) -> Self {
        Self {
            weld_tolerance,
            faces: Vec::new(),
            current: None,
        }
    }

    pub fn start_face(&mut self, material: Option<MaterialId>) {
        self.current = Some(Face {
            outer: Vec::new(),
            inner: Vec::new(),
            material,
        });
    }

    pub fn add_loop_vertices(&mut self, points: Vec<Point3<f64>>, is_outer: bool) -> Result<()> {
        let face = self
            .current
            .as_mut()
            .ok_or_else(|| Error::geometry("add_loop_vertices called outside a face"))?;
        if polygon_normal(&points).is_none() {
            return Err(Error::DegenerateLoop("polygon has no area".to_string()));
        }
        if is_outer && face.outer.is_empty() {
            face.outer = points;
        } else {
            face.inner.push(points);
        }
        Ok(())
    }

    /// Close the open face; `false` when it had no outer loop
    pub fn stop_face(&mut self) -> bool {
        match self.current.take() {
            Some(face) if !face.outer.is_empty() => {
                self.faces.push(face);
                true
            }
            _ => false,
        }
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Every welded edge is used by exactly two face boundaries
    pub fn is_closed(&self) -> bool {
        if self.faces.is_empty() {
            return false;
        }
        let scale = 1.0 / self.weld_tolerance.max(f64::EPSILON);
        let key = |p: &Point3<f64>| {
            (
                (p.x * scale).round() as i64,
                (p.y * scale).round() as i64,
                (p.z * scale).round() as i64,
            )
        };

        let mut edges: FxHashMap<_, u32> = FxHashMap::default();
        let loops = self
            .faces
            .iter()
            .flat_map(|f| std::iter::once(&f.outer).chain(f.inner.iter()));
        for ring in loops {
            let n = ring.len();
            for i in 0..n {
                let (a, b) = (key(&ring[i]), key(&ring[(i + 1) % n]));
                if a == b {
                    continue;
                }
                let edge = if a < b { (a, b) } else { (b, a) };
                *edges.entry(edge).or_insert(0) += 1;
            }
        }
        edges.values().all(|&count| count == 2)
    }

    pub fn create_geometry(
        self,
        target: TessellationTarget,
        fallback: TessellationFallback,
    ) -> Option<GeometryObject> {
        if self.faces.is_empty() {
            return None;
        }
        if self.is_closed() {
            let mut solid = Solid::new(self.faces);
            solid.orient_outward();
            return Some(GeometryObject::Solid(solid));
        }
        match (target, fallback) {
            (TessellationTarget::Solid, TessellationFallback::Abort) => None,
            _ => {
                let mesh = Solid::new(self.faces).to_mesh();
                (!mesh.is_empty()).then_some(GeometryObject::Mesh(mesh))
            }
        }
    }
}
