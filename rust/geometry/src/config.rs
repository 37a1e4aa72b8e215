// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Import options, loadable from environment variables.

use serde::Deserialize;

/// Tolerances and fallback switches for one import.
///
/// Lengths are in model units.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Distance under which consecutive loop vertices are merged, and above
    /// which an off-plane vertex is reported when projected back onto its face.
    pub vertex_tolerance: f64,
    /// Shortest edge the strict B-rep builder accepts.
    pub short_curve_tolerance: f64,
    /// Retry shells that produced no faces with the permissive mesh builder.
    pub allow_mesh_fallback: bool,
    /// Import `Box` representations even when body geometry exists.
    pub always_import_bounding_boxes: bool,
    /// Share mapped representations as instanced definitions.
    pub use_instancing: bool,
    /// Half-size of the finite rectangle standing in for an unbounded half-space.
    pub half_space_extent: f64,
    /// Translation applied to the second operand of a retried Boolean.
    pub boolean_shift_distance: f64,
    /// Deepest nesting of Boolean results that is still evaluated.
    pub max_boolean_depth: usize,
    /// Segments used to tessellate a full circle or ellipse.
    pub arc_segments: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            vertex_tolerance: 1e-6,
            short_curve_tolerance: 1e-3,
            allow_mesh_fallback: true,
            always_import_bounding_boxes: false,
            use_instancing: true,
            half_space_extent: 1.0e4,
            boolean_shift_distance: 1e-4,
            max_boolean_depth: 20,
            arc_segments: 24,
        }
    }
}

impl ImportOptions {
    /// Load options from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            vertex_tolerance: env_or("IFC_IMPORT_VERTEX_TOLERANCE", defaults.vertex_tolerance),
            short_curve_tolerance: env_or(
                "IFC_IMPORT_SHORT_CURVE_TOLERANCE",
                defaults.short_curve_tolerance,
            ),
            allow_mesh_fallback: env_or(
                "IFC_IMPORT_ALLOW_MESH_FALLBACK",
                defaults.allow_mesh_fallback,
            ),
            always_import_bounding_boxes: env_or(
                "IFC_IMPORT_ALWAYS_IMPORT_BOXES",
                defaults.always_import_bounding_boxes,
            ),
            use_instancing: env_or("IFC_IMPORT_USE_INSTANCING", defaults.use_instancing),
            ..defaults
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
