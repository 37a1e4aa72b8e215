// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Strict boundary-representation builder.

use nalgebra::{Point2, Point3};
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::kernel::{Face, MaterialId, Solid};
use crate::triangulation::{plane_basis, polygon_normal, project_to_plane};

#[derive(Debug, Default)]
struct FaceInProgress {
    outer: Option<Vec<Point3<f64>>>,
    /// Most faces have at most a couple of holes
    inner: SmallVec<[Vec<Point3<f64>>; 2]>,
    material: Option<MaterialId>,
}

/// Accepts only faces whose loops are valid model edges: no edge shorter
/// than the short-curve tolerance, a simple outer loop, and holes inside it.
#[derive(Debug)]
pub struct BrepBuilder {
    short_curve_tolerance: f64,
    faces: Vec<Face>,
    current: Option<FaceInProgress>,
}

impl BrepBuilder {
    pub fn new(short_curve_tolerance: f64) -> Self {
        Self {
            short_curve_tolerance,
            faces: Vec::new(),
            current: None,
        }
    }

    pub fn start_face(&mut self, material: Option<MaterialId>) {
        self.current = Some(FaceInProgress {
            material,
            ..Default::default()
        });
    }

    /// Add a boundary to the open face.
    ///
    /// An outer loop arriving when the face already has one is rejected;
    /// callers decide whether to retry it as a hole.
    pub fn add_loop(&mut self, points: Vec<Point3<f64>>, is_outer: bool) -> Result<()> {
        let tolerance = self.short_curve_tolerance;
        let face = self
            .current
            .as_mut()
            .ok_or_else(|| Error::geometry("add_loop called outside start_face/stop_face"))?;

        if let Some((i, length)) = shortest_edge(&points).filter(|(_, l)| *l < tolerance) {
            return Err(Error::DegenerateLoop(format!(
                "edge {} is {:.3e} long, below the short curve tolerance {:.0e}",
                i, length, tolerance
            )));
        }

        if is_outer {
            if face.outer.is_some() {
                return Err(Error::geometry("face already has an outer boundary"));
            }
            if is_self_intersecting(&points) {
                return Err(Error::DegenerateLoop(
                    "outer boundary intersects itself".to_string(),
                ));
            }
            face.outer = Some(points);
        } else {
            if let Some(outer) = &face.outer {
                if !contains_loop(outer, &points) {
                    return Err(Error::DegenerateLoop(
                        "inner boundary lies outside the outer boundary".to_string(),
                    ));
                }
            }
            face.inner.push(points);
        }
        Ok(())
    }

    /// Close the open face; `false` when it had no valid outer boundary
    pub fn stop_face(&mut self) -> bool {
        let Some(face) = self.current.take() else {
            return false;
        };
        let Some(outer) = face.outer else {
            return false;
        };
        // Holes added before the outer loop are checked now
        let inner = face
            .inner
            .into_iter()
            .filter(|hole| contains_loop(&outer, hole))
            .collect();
        self.faces.push(Face {
            outer,
            inner,
            material: face.material,
        });
        true
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// The solid, or `None` when no face was built
    pub fn finish(self) -> Option<Solid> {
        (!self.faces.is_empty()).then(|| Solid::new(self.faces))
    }
}

fn shortest_edge(points: &[Point3<f64>]) -> Option<(usize, f64)> {
    let n = points.len();
    (0..n)
        .map(|i| (i, (points[(i + 1) % n] - points[i]).norm()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

fn flatten(reference: &[Point3<f64>], points: &[Point3<f64>]) -> Option<Vec<Point2<f64>>> {
    let normal = polygon_normal(reference)?;
    let (u, v) = plane_basis(&normal);
    Some(project_to_plane(points, &reference[0], &u, &v))
}

fn orientation(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn segments_cross(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>, d: &Point2<f64>) -> bool {
    let eps = 1e-12;
    let d1 = orientation(c, d, a);
    let d2 = orientation(c, d, b);
    let d3 = orientation(a, b, c);
    let d4 = orientation(a, b, d);
    ((d1 > eps && d2 < -eps) || (d1 < -eps && d2 > eps))
        && ((d3 > eps && d4 < -eps) || (d3 < -eps && d4 > eps))
}

/// Proper crossing between any two non-adjacent edges
fn is_self_intersecting(points: &[Point3<f64>]) -> bool {
    let Some(flat) = flatten(points, points) else {
        return true;
    };
    let n = flat.len();
    for i in 0..n {
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            if segments_cross(&flat[i], &flat[(i + 1) % n], &flat[j], &flat[(j + 1) % n]) {
                return true;
            }
        }
    }
    false
}

fn point_in_polygon(p: &Point2<f64>, polygon: &[Point2<f64>]) -> bool {
    let mut inside = false;
    let n = polygon.len();
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn contains_loop(outer: &[Point3<f64>], hole: &[Point3<f64>]) -> bool {
    let (Some(outer_flat), Some(hole_flat)) = (flatten(outer, outer), flatten(outer, hole)) else {
        return false;
    };
    hole_flat.iter().all(|p| point_in_polygon(p, &outer_flat))
}
