// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Default kernel: faceted sweeps plus csgrs Booleans.

use std::f64::consts::TAU;

use nalgebra::{Matrix4, Point3, Rotation3, Unit, Vector3};

use super::curve::CurveLoop;
use super::solid::{Face, Solid};
use super::{csg, BooleanOperator, GeometryKernel};
use crate::config::ImportOptions;
use crate::error::{Error, Result};
use crate::transform::{inverse, origin, x_axis, y_axis, z_axis};
use crate::triangulation::polygon_normal;

const POINT_EPSILON: f64 = 1e-9;

/// Faceted kernel. Curved surfaces are approximated with `arc_segments`
/// facets per full turn.
#[derive(Debug, Clone)]
pub struct PolyhedralKernel {
    pub arc_segments: usize,
}

impl Default for PolyhedralKernel {
    fn default() -> Self {
        Self { arc_segments: 24 }
    }
}

impl PolyhedralKernel {
    pub fn new(arc_segments: usize) -> Self {
        Self {
            arc_segments: arc_segments.max(3),
        }
    }

    pub fn from_options(options: &ImportOptions) -> Self {
        Self::new(options.arc_segments)
    }

    fn loop_points(&self, loops: &[CurveLoop]) -> Result<Vec<Vec<Point3<f64>>>> {
        if loops.is_empty() {
            return Err(Error::kernel("No profile loops"));
        }
        loops
            .iter()
            .enumerate()
            .map(|(i, l)| {
                let points = l.points(self.arc_segments);
                if points.len() < 3 {
                    Err(Error::kernel(format!("Profile loop {} has fewer than 3 points", i)))
                } else {
                    Ok(points)
                }
            })
            .collect()
    }
}

/// Orient loops so the outer one winds against `motion` and holes with it
fn orient_against(loops: &mut [Vec<Point3<f64>>], motion: &Vector3<f64>) -> Result<()> {
    for (i, ring) in loops.iter_mut().enumerate() {
        let normal = polygon_normal(ring)
            .ok_or_else(|| Error::kernel(format!("Profile loop {} has no area", i)))?;
        let along = normal.dot(motion);
        if along.abs() < POINT_EPSILON {
            return Err(Error::kernel("Profile is parallel to the sweep direction"));
        }
        let is_outer = i == 0;
        if (is_outer && along > 0.0) || (!is_outer && along < 0.0) {
            ring.reverse();
        }
    }
    Ok(())
}

fn dedup_ring(points: Vec<Point3<f64>>) -> Vec<Point3<f64>> {
    let mut result: Vec<Point3<f64>> = Vec::with_capacity(points.len());
    for p in points {
        if result.last().map_or(true, |q| (q - p).norm() > POINT_EPSILON) {
            result.push(p);
        }
    }
    while result.len() > 1 && (result[0] - result[result.len() - 1]).norm() <= POINT_EPSILON {
        result.pop();
    }
    result
}

/// Skin consecutive stations of each loop.
///
/// `stations[k][l]` is loop `l` at station `k`. Loop 0 is the outer
/// boundary and winds against the direction of travel.
fn loft(stations: &[Vec<Vec<Point3<f64>>>], capped: bool) -> Solid {
    let mut faces = Vec::new();

    for pair in stations.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        for (ring_a, ring_b) in from.iter().zip(to) {
            let n = ring_a.len();
            for i in 0..n {
                let j = (i + 1) % n;
                let quad = dedup_ring(vec![ring_a[i], ring_b[i], ring_b[j], ring_a[j]]);
                if quad.len() >= 3 && polygon_normal(&quad).is_some() {
                    faces.push(Face::new(quad));
                }
            }
        }
    }

    if capped {
        if let (Some(first), Some(last)) = (stations.first(), stations.last()) {
            faces.push(Face::with_holes(first[0].clone(), first[1..].to_vec()));
            let mut end = Face::with_holes(last[0].clone(), last[1..].to_vec());
            end.reverse();
            faces.push(end);
        }
    }

    let mut solid = Solid::new(faces);
    solid.orient_outward();
    solid
}

impl GeometryKernel for PolyhedralKernel {
    fn create_extrusion(
        &self,
        loops: &[CurveLoop],
        direction: &Vector3<f64>,
        length: f64,
    ) -> Result<Solid> {
        let mut dir = direction
            .try_normalize(POINT_EPSILON)
            .ok_or_else(|| Error::kernel("Extrusion direction has zero length"))?;
        if length.abs() < POINT_EPSILON {
            return Err(Error::kernel("Extrusion depth is zero"));
        }
        if length < 0.0 {
            dir = -dir;
        }
        let offset = dir * length.abs();

        let mut base = self.loop_points(loops)?;
        orient_against(&mut base, &dir)?;
        let top: Vec<Vec<Point3<f64>>> = base
            .iter()
            .map(|ring| ring.iter().map(|p| p + offset).collect())
            .collect();

        Ok(loft(&[base, top], true))
    }

    fn create_revolution(
        &self,
        frame: &Matrix4<f64>,
        loops: &[CurveLoop],
        start_angle: f64,
        end_angle: f64,
    ) -> Result<Solid> {
        let sweep = end_angle - start_angle;
        if sweep.abs() < POINT_EPSILON {
            return Err(Error::kernel("Revolution angle is zero"));
        }
        let axis = Unit::try_new(z_axis(frame), POINT_EPSILON)
            .ok_or_else(|| Error::kernel("Revolution axis has zero length"))?;
        let center = origin(frame);
        let full = sweep.abs() >= TAU - 1e-9;

        let mut profile = self.loop_points(loops)?;
        let count = profile[0].len() as f64;
        let centroid = Point3::from(profile[0].iter().map(|p| p.coords).sum::<Vector3<f64>>() / count);
        let motion = axis.cross(&(centroid - center)) * sweep.signum();
        if motion.norm() < POINT_EPSILON {
            return Err(Error::kernel("Revolved profile lies on its axis"));
        }
        orient_against(&mut profile, &motion)?;

        let steps = ((sweep.abs() / TAU) * self.arc_segments as f64).ceil().max(1.0) as usize;
        let mut stations: Vec<Vec<Vec<Point3<f64>>>> = (0..=steps)
            .map(|k| {
                let angle = start_angle + sweep * k as f64 / steps as f64;
                let rotation = Rotation3::from_axis_angle(&axis, angle);
                profile
                    .iter()
                    .map(|ring| ring.iter().map(|p| center + rotation * (p - center)).collect())
                    .collect()
            })
            .collect();
        if full {
            stations[steps] = stations[0].clone();
        }

        Ok(loft(&stations, !full))
    }

    fn create_sweep(
        &self,
        path: &CurveLoop,
        start_param: f64,
        profile_loops: &[CurveLoop],
        profile_frame: &Matrix4<f64>,
    ) -> Result<Solid> {
        let path = path.sub_loop(start_param, path.end_parameter());
        let mut path_points = path.points(self.arc_segments);
        if path_points.len() < 2 {
            return Err(Error::kernel("Sweep path is degenerate"));
        }
        let closed = path.is_closed(POINT_EPSILON);
        if closed {
            path_points.push(path_points[0]);
        }

        // Profile in its own 2D frame, outer loop clockwise about +Z
        let to_local = inverse(profile_frame)?;
        let mut local: Vec<Vec<Point3<f64>>> = self
            .loop_points(profile_loops)?
            .into_iter()
            .map(|ring| {
                ring.iter()
                    .map(|p| {
                        let q = to_local.transform_point(p);
                        Point3::new(q.x, q.y, 0.0)
                    })
                    .collect()
            })
            .collect();
        orient_against(&mut local, &Vector3::z())?;

        let mut x = x_axis(profile_frame);
        let mut y = y_axis(profile_frame);
        let mut previous = z_axis(profile_frame);
        let last = path_points.len() - 1;

        let mut stations = Vec::with_capacity(path_points.len());
        for k in 0..=last {
            let tangent = if k == 0 {
                previous
            } else {
                let ahead = path_points[(k + 1).min(last)];
                let behind = path_points[k - 1];
                let chord = if k == last {
                    path_points[k] - behind
                } else {
                    ahead - behind
                };
                chord.try_normalize(POINT_EPSILON).unwrap_or(previous)
            };
            // Parallel transport of the section frame
            if let Some(rotation) = Rotation3::rotation_between(&previous, &tangent) {
                x = rotation * x;
                y = rotation * y;
            }
            previous = tangent;

            let station_origin = path_points[k];
            stations.push(
                local
                    .iter()
                    .map(|ring| {
                        ring.iter()
                            .map(|p| station_origin + x * p.x + y * p.y)
                            .collect()
                    })
                    .collect(),
            );
        }

        Ok(loft(&stations, !closed))
    }

    fn execute_boolean(
        &self,
        first: &Solid,
        second: &Solid,
        operator: BooleanOperator,
    ) -> Result<Option<Solid>> {
        if first.is_empty() {
            return Err(Error::kernel("First Boolean operand has no faces"));
        }
        Ok(csg::boolean(first, second, operator))
    }
}
