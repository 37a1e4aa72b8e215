// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Loop validity repair: near-duplicate vertex removal and planarity
//! correction.

use nalgebra::{Point3, Vector3};

use crate::error::{Error, Result};

/// A loop that passed repair
#[derive(Debug, Clone, PartialEq)]
pub struct RepairedLoop {
    pub points: Vec<Point3<f64>>,
    /// Unit normal of the plane the points were projected onto
    pub normal: Vector3<f64>,
    /// Vertices dropped as near-duplicates
    pub merged: usize,
    /// Vertices moved back onto the plane by more than the tolerance
    pub projected: usize,
}

impl RepairedLoop {
    pub fn was_corrected(&self) -> bool {
        self.merged > 0 || self.projected > 0
    }
}

/// Drop consecutive points closer than `tolerance`, including the closing pair
pub fn remove_near_duplicates(points: &[Point3<f64>], tolerance: f64) -> Vec<Point3<f64>> {
    let mut result: Vec<Point3<f64>> = Vec::with_capacity(points.len());
    for p in points {
        if result
            .last()
            .map_or(true, |last| (last - p).norm() > tolerance)
        {
            result.push(*p);
        }
    }
    while result.len() > 1 && (result[0] - result[result.len() - 1]).norm() <= tolerance {
        result.pop();
    }
    result
}

/// Plane through the first non-degenerate triple: anchor, first distinct
/// point, first point off their line.
pub fn loop_plane(points: &[Point3<f64>], tolerance: f64) -> Option<(Point3<f64>, Vector3<f64>)> {
    let anchor = *points.first()?;
    let (a_index, a) = points
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, p)| (*p - anchor).norm() > tolerance)?;
    let edge = a - anchor;
    points[a_index + 1..]
        .iter()
        .map(|p| edge.cross(&(p - anchor)))
        .find(|n| n.norm() > tolerance * edge.norm())
        .and_then(|n| n.try_normalize(f64::EPSILON))
        .map(|n| (anchor, n))
}

/// Deduplicate, then project every vertex onto the loop's plane.
///
/// Fails when fewer than 3 distinct vertices remain or no plane exists.
pub fn repair_loop(points: &[Point3<f64>], tolerance: f64) -> Result<RepairedLoop> {
    let deduped = remove_near_duplicates(points, tolerance);
    if deduped.len() < 3 {
        return Err(Error::DegenerateLoop(format!(
            "{} distinct vertices after merging, need 3",
            deduped.len()
        )));
    }

    let (anchor, normal) = loop_plane(&deduped, tolerance)
        .ok_or_else(|| Error::DegenerateLoop("all vertices are collinear".to_string()))?;

    let mut projected = 0;
    let flattened: Vec<Point3<f64>> = deduped
        .iter()
        .map(|p| {
            let distance = (p - anchor).dot(&normal);
            if distance.abs() > tolerance {
                projected += 1;
            }
            p - normal * distance
        })
        .collect();

    let repaired = remove_near_duplicates(&flattened, tolerance);
    if repaired.len() < 3 {
        return Err(Error::DegenerateLoop(
            "loop collapsed while projecting onto its plane".to_string(),
        ));
    }

    Ok(RepairedLoop {
        merged: points.len() - repaired.len(),
        points: repaired,
        normal,
        projected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-6;

    fn distance_to_plane(p: &Point3<f64>, repaired: &RepairedLoop) -> f64 {
        (p - repaired.points[0]).dot(&repaired.normal).abs()
    }

    #[test]
    fn test_two_distinct_points_are_rejected() {
        let points = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0 + 1e-9, 0.0, 0.0),
            Point3::new(0.0, 1e-9, 0.0),
        ];
        assert!(matches!(
            repair_loop(&points, TOLERANCE),
            Err(Error::DegenerateLoop(_))
        ));
    }

    #[test]
    fn test_three_points_after_merge_succeed() {
        let points = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1e-8, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1e-8),
        ];
        let repaired = repair_loop(&points, TOLERANCE).unwrap();
        assert_eq!(repaired.points.len(), 3);
        assert_eq!(repaired.merged, 2);
    }

    #[test]
    fn test_collinear_loop_is_rejected() {
        let points = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        assert!(repair_loop(&points, TOLERANCE).is_err());
    }

    #[test]
    fn test_small_perturbation_is_corrected_silently() {
        let points = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 1e-9),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let repaired = repair_loop(&points, TOLERANCE).unwrap();
        assert_eq!(repaired.points.len(), 4);
        assert_eq!(repaired.projected, 0);
        assert!(!repaired.was_corrected());
        assert!(distance_to_plane(&repaired.points[2], &repaired) < 1e-15);
    }

    #[test]
    fn test_large_perturbation_is_projected_back() {
        let points = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 1.0),
        ];
        let repaired = repair_loop(&points, TOLERANCE).unwrap();
        assert_eq!(repaired.points.len(), 4);
        assert_eq!(repaired.projected, 1);
        for p in &repaired.points {
            assert!(distance_to_plane(p, &repaired) <= TOLERANCE);
        }
        assert_eq!(repaired.points[3], Point3::new(0.0, 1.0, 0.0));
    }
}
