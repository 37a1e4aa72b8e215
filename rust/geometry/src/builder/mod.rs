// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Face builders.
//!
//! Loops and faces are fed to whichever builder the active
//! [`BuilderMode`] selects. Both share the same face lifecycle:
//! `start_face`, one or more loops, `stop_face`, then a final build.

mod brep;
mod tessellated;

use nalgebra::Point3;

use crate::config::ImportOptions;
use crate::error::Result;
use crate::kernel::{GeometryObject, MaterialId};

pub use brep::BrepBuilder;
pub use tessellated::{TessellatedBuilder, TessellationFallback, TessellationTarget};

/// Which builder receives faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuilderMode {
    #[default]
    Brep,
    Tessellated {
        target: TessellationTarget,
        fallback: TessellationFallback,
    },
}

impl BuilderMode {
    /// Permissive mode used by the second assembly pass
    pub const ANY_MESH: BuilderMode = BuilderMode::Tessellated {
        target: TessellationTarget::AnyGeometry,
        fallback: TessellationFallback::Mesh,
    };

    pub fn is_brep(&self) -> bool {
        matches!(self, BuilderMode::Brep)
    }
}

/// The builder chosen for one shell
#[derive(Debug)]
pub enum ShapeBuilder {
    Brep(BrepBuilder),
    Tessellated {
        builder: TessellatedBuilder,
        target: TessellationTarget,
        fallback: TessellationFallback,
    },
}

impl ShapeBuilder {
    pub fn new(mode: BuilderMode, options: &ImportOptions) -> Self {
        match mode {
            BuilderMode::Brep => ShapeBuilder::Brep(BrepBuilder::new(options.short_curve_tolerance)),
            BuilderMode::Tessellated { target, fallback } => ShapeBuilder::Tessellated {
                builder: TessellatedBuilder::new(options.vertex_tolerance),
                target,
                fallback,
            },
        }
    }

    pub fn start_face(&mut self, material: Option<MaterialId>) {
        match self {
            ShapeBuilder::Brep(b) => b.start_face(material),
            ShapeBuilder::Tessellated { builder, .. } => builder.start_face(material),
        }
    }

    pub fn add_loop(&mut self, points: Vec<Point3<f64>>, is_outer: bool) -> Result<()> {
        match self {
            ShapeBuilder::Brep(b) => b.add_loop(points, is_outer),
            ShapeBuilder::Tessellated { builder, .. } => builder.add_loop_vertices(points, is_outer),
        }
    }

    pub fn stop_face(&mut self) -> bool {
        match self {
            ShapeBuilder::Brep(b) => b.stop_face(),
            ShapeBuilder::Tessellated { builder, .. } => builder.stop_face(),
        }
    }

    pub fn face_count(&self) -> usize {
        match self {
            ShapeBuilder::Brep(b) => b.face_count(),
            ShapeBuilder::Tessellated { builder, .. } => builder.face_count(),
        }
    }

    pub fn finish(self) -> Option<GeometryObject> {
        match self {
            ShapeBuilder::Brep(b) => b.finish().map(GeometryObject::Solid),
            ShapeBuilder::Tessellated {
                builder,
                target,
                fallback,
            } => builder.create_geometry(target, fallback),
        }
    }
}
