// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polygon triangulation utilities
//!
//! Planar faces are projected into a 2D basis of their plane and handed to
//! earcutr together with their holes.

use crate::{Error, Point2, Point3, Result, Vector3};

/// Newell normal of a polygon; `None` when the polygon has no area
pub fn polygon_normal(points: &[Point3<f64>]) -> Option<Vector3<f64>> {
    if points.len() < 3 {
        return None;
    }

    let mut normal = Vector3::<f64>::zeros();
    for (i, current) in points.iter().enumerate() {
        let next = &points[(i + 1) % points.len()];
        normal.x += (current.y - next.y) * (current.z + next.z);
        normal.y += (current.z - next.z) * (current.x + next.x);
        normal.z += (current.x - next.x) * (current.y + next.y);
    }
    normal.try_normalize(1e-12)
}

/// Orthonormal `(u, v)` axes spanning the plane with the given normal
pub fn plane_basis(normal: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    // Cross with the axis least parallel to the normal
    let reference = if normal.x.abs() <= normal.y.abs() && normal.x.abs() <= normal.z.abs() {
        Vector3::x()
    } else if normal.y.abs() <= normal.z.abs() {
        Vector3::y()
    } else {
        Vector3::z()
    };
    let u = normal.cross(&reference).normalize();
    let v = normal.cross(&u).normalize();
    (u, v)
}

/// Project points into the `(u, v)` basis anchored at `origin`
pub fn project_to_plane(
    points: &[Point3<f64>],
    origin: &Point3<f64>,
    u: &Vector3<f64>,
    v: &Vector3<f64>,
) -> Vec<Point2<f64>> {
    points
        .iter()
        .map(|p| {
            let d = p - origin;
            Point2::new(d.dot(u), d.dot(v))
        })
        .collect()
}

/// Signed area of a 2D polygon, positive when counter-clockwise
pub fn signed_area(points: &[Point2<f64>]) -> f64 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let a = points[i];
            let b = points[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
        * 0.5
}

/// Triangulate a planar face with holes.
///
/// Returned triangles index into the concatenation of `outer` and all
/// `holes`, and are wound to agree with the outer loop's orientation.
pub fn triangulate_face(
    outer: &[Point3<f64>],
    holes: &[Vec<Point3<f64>>],
) -> Result<Vec<[usize; 3]>> {
    if outer.len() < 3 {
        return Err(Error::Triangulation(
            "Need at least 3 points in outer boundary".to_string(),
        ));
    }

    let normal = polygon_normal(outer)
        .ok_or_else(|| Error::Triangulation("Outer boundary has no area".to_string()))?;

    if outer.len() == 3 && holes.is_empty() {
        return Ok(vec![[0, 1, 2]]);
    }

    let (u, v) = plane_basis(&normal);
    let origin = outer[0];

    let total: usize = outer.len() + holes.iter().map(Vec::len).sum::<usize>();
    let mut flat = Vec::with_capacity(total * 2);
    for p in project_to_plane(outer, &origin, &u, &v) {
        flat.extend_from_slice(&[p.x, p.y]);
    }

    let mut hole_starts = Vec::with_capacity(holes.len());
    for hole in holes {
        hole_starts.push(flat.len() / 2);
        for p in project_to_plane(hole, &origin, &u, &v) {
            flat.extend_from_slice(&[p.x, p.y]);
        }
    }

    let indices = earcutr::earcut(&flat, &hole_starts, 2)
        .map_err(|e| Error::Triangulation(format!("{:?}", e)))?;
    if indices.is_empty() {
        return Err(Error::Triangulation("No triangles produced".to_string()));
    }

    // The (u, v) basis is right-handed about `normal`, so earcut output that
    // is clockwise in 2D must be flipped to match the outer loop.
    let position = |i: usize| Point2::new(flat[i * 2], flat[i * 2 + 1]);
    Ok(indices
        .chunks_exact(3)
        .map(|tri| {
            let area = signed_area(&[position(tri[0]), position(tri[1]), position(tri[2])]);
            if area < 0.0 {
                [tri[0], tri[2], tri[1]]
            } else {
                [tri[0], tri[1], tri[2]]
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(z: f64, size: f64, offset: f64) -> Vec<Point3<f64>> {
        vec![
            Point3::new(offset, offset, z),
            Point3::new(offset + size, offset, z),
            Point3::new(offset + size, offset + size, z),
            Point3::new(offset, offset + size, z),
        ]
    }

    #[test]
    fn test_polygon_normal() {
        let normal = polygon_normal(&square(0.0, 1.0, 0.0)).unwrap();
        assert!((normal - Vector3::z()).norm() < 1e-12);

        let collinear = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        assert!(polygon_normal(&collinear).is_none());
    }

    #[test]
    fn test_triangulate_square_keeps_winding() {
        let outer = square(2.0, 1.0, 0.0);
        let triangles = triangulate_face(&outer, &[]).unwrap();
        assert_eq!(triangles.len(), 2);
        for [a, b, c] in triangles {
            let n = (outer[b] - outer[a]).cross(&(outer[c] - outer[a]));
            assert!(n.z > 0.0);
        }
    }

    #[test]
    fn test_triangulate_with_hole() {
        let outer = square(0.0, 10.0, 0.0);
        let mut hole = square(0.0, 4.0, 3.0);
        hole.reverse();
        let triangles = triangulate_face(&outer, &[hole]).unwrap();
        assert!(triangles.len() > 2);
    }

    #[test]
    fn test_insufficient_points() {
        let outer = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        assert!(triangulate_face(&outer, &[]).is_err());
    }
}
