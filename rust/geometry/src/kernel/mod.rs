// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometry kernel boundary.
//!
//! The reconstruction pipeline never builds swept or Boolean geometry
//! itself; it calls a [`GeometryKernel`]. [`PolyhedralKernel`] is the
//! default implementation, faceting curved surfaces and running Booleans
//! through csgrs.

mod csg;
pub mod curve;
mod polyhedral;
pub mod solid;

use nalgebra::{Matrix4, Vector3};

use crate::error::Result;
use crate::mesh::Mesh;

pub use curve::{BSpline, Curve, CurveLoop, CurveSegment};
pub use polyhedral::PolyhedralKernel;
pub use solid::{box_solid, Face, Solid};

/// Identifies a surface style; the id of the style entity it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

/// Surface appearance resolved from a style
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: Option<String>,
    /// Linear RGB in `0..=1`
    pub color: [f64; 3],
    pub transparency: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOperator {
    Union,
    Difference,
    Intersection,
}

impl BooleanOperator {
    /// Parse an `IfcBooleanOperator` enumeration value
    pub fn from_ifc(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "UNION" => Some(Self::Union),
            "DIFFERENCE" => Some(Self::Difference),
            "INTERSECTION" => Some(Self::Intersection),
            _ => None,
        }
    }
}

/// A piece of produced geometry
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryObject {
    Solid(Solid),
    Mesh(Mesh),
}

impl GeometryObject {
    pub fn as_solid(&self) -> Option<&Solid> {
        match self {
            GeometryObject::Solid(solid) => Some(solid),
            GeometryObject::Mesh(_) => None,
        }
    }

    pub fn is_solid(&self) -> bool {
        matches!(self, GeometryObject::Solid(_))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            GeometryObject::Solid(solid) => solid.is_empty(),
            GeometryObject::Mesh(mesh) => mesh.is_empty(),
        }
    }

    pub fn unique_material(&self) -> Option<MaterialId> {
        match self {
            GeometryObject::Solid(solid) => solid.unique_material(),
            GeometryObject::Mesh(mesh) => mesh.material,
        }
    }

    pub fn fill_material(&mut self, material: MaterialId) {
        match self {
            GeometryObject::Solid(solid) => solid.fill_material(material),
            GeometryObject::Mesh(mesh) => {
                mesh.material.get_or_insert(material);
            }
        }
    }

    pub fn transform(&mut self, m: &Matrix4<f64>) {
        match self {
            GeometryObject::Solid(solid) => solid.transform(m),
            GeometryObject::Mesh(mesh) => mesh.transform(m),
        }
    }

    pub fn to_mesh(&self) -> Mesh {
        match self {
            GeometryObject::Solid(solid) => solid.to_mesh(),
            GeometryObject::Mesh(mesh) => mesh.clone(),
        }
    }
}

/// Native solid construction and Boolean evaluation.
///
/// All loops are in world coordinates. Constructors fail with an error for
/// malformed input; `execute_boolean` returns `Ok(None)` when the kernel
/// could not evaluate the operation.
pub trait GeometryKernel {
    fn create_extrusion(
        &self,
        loops: &[CurveLoop],
        direction: &Vector3<f64>,
        length: f64,
    ) -> Result<Solid>;

    /// Revolve about the Z axis of `frame`, through its origin
    fn create_revolution(
        &self,
        frame: &Matrix4<f64>,
        loops: &[CurveLoop],
        start_angle: f64,
        end_angle: f64,
    ) -> Result<Solid>;

    /// Sweep profile loops along `path` starting at `start_param`.
    ///
    /// `profile_frame` locates the profile at the start of the path, with its
    /// Z axis along the path tangent.
    fn create_sweep(
        &self,
        path: &CurveLoop,
        start_param: f64,
        profile_loops: &[CurveLoop],
        profile_frame: &Matrix4<f64>,
    ) -> Result<Solid>;

    fn execute_boolean(
        &self,
        first: &Solid,
        second: &Solid,
        operator: BooleanOperator,
    ) -> Result<Option<Solid>>;
}
