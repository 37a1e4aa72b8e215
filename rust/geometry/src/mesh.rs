// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh data structures

use nalgebra::{Matrix4, Point3, Vector3};

use crate::kernel::MaterialId;

/// Triangle mesh in model coordinates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// Vertex positions (x, y, z)
    pub positions: Vec<f64>,
    /// Vertex normals (nx, ny, nz)
    pub normals: Vec<f64>,
    /// Triangle indices (i0, i1, i2)
    pub indices: Vec<u32>,
    pub material: Option<MaterialId>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(vertex_count: usize, index_count: usize) -> Self {
        Self {
            positions: Vec::with_capacity(vertex_count * 3),
            normals: Vec::with_capacity(vertex_count * 3),
            indices: Vec::with_capacity(index_count),
            material: None,
        }
    }

    /// Add a vertex with normal, returning its index
    #[inline]
    pub fn add_vertex(&mut self, position: Point3<f64>, normal: Vector3<f64>) -> u32 {
        let index = self.vertex_count() as u32;
        self.positions.extend_from_slice(&[position.x, position.y, position.z]);
        self.normals.extend_from_slice(&[normal.x, normal.y, normal.z]);
        index
    }

    #[inline]
    pub fn add_triangle(&mut self, i0: u32, i1: u32, i2: u32) {
        self.indices.extend_from_slice(&[i0, i1, i2]);
    }

    /// Merge another mesh into this one
    pub fn merge(&mut self, other: &Mesh) {
        if other.is_empty() {
            return;
        }

        let vertex_offset = self.vertex_count() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
        self.indices
            .extend(other.indices.iter().map(|&i| i + vertex_offset));
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[inline]
    pub fn position(&self, index: usize) -> Point3<f64> {
        Point3::new(
            self.positions[index * 3],
            self.positions[index * 3 + 1],
            self.positions[index * 3 + 2],
        )
    }

    /// Axis-aligned bounds (min, max)
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        if self.positions.is_empty() {
            return None;
        }

        let mut min = Point3::new(f64::MAX, f64::MAX, f64::MAX);
        let mut max = Point3::new(f64::MIN, f64::MIN, f64::MIN);
        self.positions.chunks_exact(3).for_each(|chunk| {
            min.x = min.x.min(chunk[0]);
            min.y = min.y.min(chunk[1]);
            min.z = min.z.min(chunk[2]);
            max.x = max.x.max(chunk[0]);
            max.y = max.y.max(chunk[1]);
            max.z = max.z.max(chunk[2]);
        });
        Some((min, max))
    }

    /// Apply a transform to positions and normals.
    ///
    /// Triangles are re-wound when the transform mirrors space.
    pub fn transform(&mut self, transform: &Matrix4<f64>) {
        self.positions.chunks_exact_mut(3).for_each(|chunk| {
            let t = transform.transform_point(&Point3::new(chunk[0], chunk[1], chunk[2]));
            chunk[0] = t.x;
            chunk[1] = t.y;
            chunk[2] = t.z;
        });

        let linear = transform.fixed_view::<3, 3>(0, 0).into_owned();
        let normal_matrix = linear
            .try_inverse()
            .map(|inverse| inverse.transpose())
            .unwrap_or(linear);
        self.normals.chunks_exact_mut(3).for_each(|chunk| {
            let n = normal_matrix * Vector3::new(chunk[0], chunk[1], chunk[2]);
            let n = n.try_normalize(1e-12).unwrap_or(n);
            chunk[0] = n.x;
            chunk[1] = n.y;
            chunk[2] = n.z;
        });

        if linear.determinant() < 0.0 {
            self.indices.chunks_exact_mut(3).for_each(|tri| tri.swap(1, 2));
        }
    }

    pub fn transformed(&self, transform: &Matrix4<f64>) -> Mesh {
        let mut mesh = self.clone();
        mesh.transform(transform);
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Mesh {
        let mut mesh = Mesh::new();
        let a = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0), Vector3::z());
        let b = mesh.add_vertex(Point3::new(1.0, 0.0, 0.0), Vector3::z());
        let c = mesh.add_vertex(Point3::new(0.0, 1.0, 0.0), Vector3::z());
        mesh.add_triangle(a, b, c);
        mesh
    }

    #[test]
    fn test_merge_offsets_indices() {
        let mut mesh = triangle();
        mesh.merge(&triangle());
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(&mesh.indices[3..], &[3, 4, 5]);
    }

    #[test]
    fn test_bounds() {
        let (min, max) = triangle().bounds().unwrap();
        assert_eq!(min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(1.0, 1.0, 0.0));
        assert!(Mesh::new().bounds().is_none());
    }

    #[test]
    fn test_mirror_rewinds_triangles() {
        let mut mirror = Matrix4::identity();
        mirror[(0, 0)] = -1.0;
        let mesh = triangle().transformed(&mirror);
        assert_eq!(mesh.indices, vec![0, 2, 1]);
        assert_eq!(mesh.position(1), Point3::new(-1.0, 0.0, 0.0));
    }
}
