// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shape edit scope.
//!
//! Geometry creation state that has to be restored on every exit path is
//! held behind guards: [`BuilderScope`] switches the face builder mode and
//! [`MaterialScope`] pushes an inherited material. Both restore the
//! previous state when dropped, including during `?` propagation.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use nalgebra::Matrix4;
use rustc_hash::FxHashSet;

use crate::builder::{BuilderMode, ShapeBuilder};
use crate::config::ImportOptions;
use crate::diagnostics::ImportLog;
use crate::entities::styles::StyleIndex;
use crate::entities::{EntityCache, EntityKey};
use crate::kernel::{GeometryKernel, GeometryObject, MaterialId};

/// Geometry attached to a product
#[derive(Debug, Clone, PartialEq)]
pub enum CreatedGeometry {
    /// Geometry in world coordinates
    Direct {
        object: GeometryObject,
        representation_id: u32,
        material: Option<MaterialId>,
        layer: Option<String>,
    },
    /// Placement of a shared definition
    Instance {
        definition_id: u32,
        transform: Matrix4<f64>,
        representation_id: u32,
    },
}

impl CreatedGeometry {
    pub fn is_instance(&self) -> bool {
        matches!(self, CreatedGeometry::Instance { .. })
    }

    pub fn object(&self) -> Option<&GeometryObject> {
        match self {
            CreatedGeometry::Direct { object, .. } => Some(object),
            CreatedGeometry::Instance { .. } => None,
        }
    }
}

/// A mapped representation built once in its map's own coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct SharedDefinition {
    /// Id of the `IfcRepresentationMap`
    pub map_id: u32,
    pub geometry: Vec<CreatedGeometry>,
}

pub struct ShapeEditScope<'s> {
    pub(crate) cache: &'s EntityCache<'s>,
    pub(crate) kernel: &'s dyn GeometryKernel,
    pub(crate) options: &'s ImportOptions,
    pub(crate) styles: &'s StyleIndex,
    pub(crate) log: ImportLog,
    mode: BuilderMode,
    materials: Vec<MaterialId>,
    pub(crate) booleans_in_progress: FxHashSet<EntityKey>,
    pub(crate) mapped_in_progress: FxHashSet<EntityKey>,
    pub(crate) created: Vec<CreatedGeometry>,
    pub(crate) definitions: BTreeMap<u32, SharedDefinition>,
}

impl<'s> ShapeEditScope<'s> {
    pub fn new(
        cache: &'s EntityCache<'s>,
        kernel: &'s dyn GeometryKernel,
        options: &'s ImportOptions,
        styles: &'s StyleIndex,
        log: ImportLog,
    ) -> Self {
        Self {
            cache,
            kernel,
            options,
            styles,
            log,
            mode: BuilderMode::default(),
            materials: Vec::new(),
            booleans_in_progress: FxHashSet::default(),
            mapped_in_progress: FxHashSet::default(),
            created: Vec::new(),
            definitions: BTreeMap::new(),
        }
    }

    pub fn mode(&self) -> BuilderMode {
        self.mode
    }

    /// A fresh face builder for the active mode
    pub fn new_builder(&self) -> ShapeBuilder {
        ShapeBuilder::new(self.mode, self.options)
    }

    /// Switch the builder mode until the returned guard is dropped
    pub fn with_builder_mode(&mut self, mode: BuilderMode) -> BuilderScope<'_, 's> {
        let previous = std::mem::replace(&mut self.mode, mode);
        BuilderScope {
            scope: self,
            previous,
        }
    }

    /// Inherit `material` until the returned guard is dropped; `None`
    /// leaves the current material in place.
    pub fn push_material(&mut self, material: Option<MaterialId>) -> MaterialScope<'_, 's> {
        let pushed = match material {
            Some(material) => {
                self.materials.push(material);
                true
            }
            None => false,
        };
        MaterialScope {
            scope: self,
            pushed,
        }
    }

    /// Innermost inherited material
    pub fn current_material(&self) -> Option<MaterialId> {
        self.materials.last().copied()
    }

    pub fn into_parts(self) -> (ImportLog, BTreeMap<u32, SharedDefinition>) {
        (self.log, self.definitions)
    }
}

/// Restores the previous builder mode on drop
pub struct BuilderScope<'b, 's> {
    scope: &'b mut ShapeEditScope<'s>,
    previous: BuilderMode,
}

impl<'s> Deref for BuilderScope<'_, 's> {
    type Target = ShapeEditScope<'s>;

    fn deref(&self) -> &Self::Target {
        self.scope
    }
}

impl DerefMut for BuilderScope<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.scope
    }
}

impl Drop for BuilderScope<'_, '_> {
    fn drop(&mut self) {
        self.scope.mode = self.previous;
    }
}

/// Pops the pushed material on drop
pub struct MaterialScope<'b, 's> {
    scope: &'b mut ShapeEditScope<'s>,
    pushed: bool,
}

impl<'s> Deref for MaterialScope<'_, 's> {
    type Target = ShapeEditScope<'s>;

    fn deref(&self) -> &Self::Target {
        self.scope
    }
}

impl DerefMut for MaterialScope<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.scope
    }
}

impl Drop for MaterialScope<'_, '_> {
    fn drop(&mut self) {
        if self.pushed {
            self.scope.materials.pop();
        }
    }
}
