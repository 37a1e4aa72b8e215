// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # IFC-Import Geometry
//!
//! B-rep, solid and Boolean reconstruction for IFC STEP files.
//!
//! Entities are resolved once through an id-keyed [`EntityCache`], turned
//! into faces, shells, swept solids and Boolean trees, and handed to a
//! [`GeometryKernel`]. Malformed geometry degrades instead of failing:
//! loops are repaired, shells fall back to meshes, Booleans retry with a
//! shifted operand. Everything that was corrected or dropped ends up in
//! the [`ImportLog`].
//!
//! ```rust,ignore
//! use ifc_import_geometry::{ImportOptions, Importer, PolyhedralKernel};
//!
//! let importer = Importer::new(ImportOptions::from_env(), PolyhedralKernel::default());
//! let result = importer.import(&content);
//! for product in &result.products {
//!     let objects = result.world_objects(product);
//!     println!("#{} {}: {} objects", product.entity_id, product.ifc_type, objects.len());
//! }
//! ```

pub mod builder;
pub mod config;
pub mod diagnostics;
pub mod entities;
pub mod error;
pub mod import;
pub mod kernel;
pub mod mesh;
pub mod repair;
pub mod scope;
pub mod transform;
pub mod triangulation;

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix4, Point2, Point3, Vector2, Vector3};

pub use builder::{BuilderMode, ShapeBuilder};
pub use config::ImportOptions;
pub use diagnostics::{Diagnostic, DiagnosticKind, ImportLog, Severity};
pub use entities::{EntityCache, EntityKey, EntityOutcome};
pub use error::{Error, Result};
pub use import::{ImportResult, Importer, ProductGeometry};
pub use kernel::{
    BooleanOperator, CurveLoop, GeometryKernel, GeometryObject, Material, MaterialId,
    PolyhedralKernel, Solid,
};
pub use mesh::Mesh;
pub use scope::{CreatedGeometry, SharedDefinition};
