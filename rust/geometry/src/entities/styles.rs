// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Presentation styles and layers.
//!
//! Follows IfcStyledItem -> IfcPresentationStyleAssignment (IFC2x3) or
//! IfcSurfaceStyle -> IfcSurfaceStyleShading/Rendering -> IfcColourRgb.

use std::collections::BTreeMap;

use ifc_import_core::{DecodedEntity, IfcType};
use rustc_hash::FxHashMap;

use super::{Entity, EntityCache, EntityKey, EntityOutcome};
use crate::error::{Error, Result};
use crate::kernel::{Material, MaterialId};

/// Style targets that have no common supertype
const STYLE_TYPES: [IfcType; 2] = [
    IfcType::IfcPresentationStyle,
    IfcType::IfcPresentationStyleAssignment,
];

impl EntityCache<'_> {
    /// Resolve against the first candidate type the entity derives from
    fn resolve_one_of(&mut self, id: u32, candidates: &[IfcType]) -> Option<EntityKey> {
        candidates.iter().find_map(|&declared| match self.resolve(id, declared) {
            EntityOutcome::Imported(key) => Some(key),
            _ => None,
        })
    }
}

pub(crate) fn load_colour_rgb(
    _cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    Ok(Entity::Colour([
        entity.required_float(1, "Red")?,
        entity.required_float(2, "Green")?,
        entity.required_float(3, "Blue")?,
    ]))
}

pub(crate) fn load_surface_style_shading(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let colour_id = entity.required_ref(0, "SurfaceColour")?;
    let color = cache.settled_as(colour_id, IfcType::IfcColourRgb, "a colour", |e| match e {
        Entity::Colour(rgb) => Some(*rgb),
        _ => None,
    })?;
    // 0 is opaque, 1 fully transparent
    let transparency = entity.optional_float(1).unwrap_or(0.0).clamp(0.0, 1.0);
    Ok(Entity::Shading {
        color,
        transparency,
    })
}

pub(crate) fn load_surface_style(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let name = entity.optional_string(0).map(str::to_string);
    let elements = cache.children_lenient(
        &entity.required_refs(2, "Styles")?,
        IfcType::IfcSurfaceStyleShading,
    );
    elements
        .iter()
        .find_map(|&key| match cache.entity(key) {
            Entity::Shading {
                color,
                transparency,
            } => Some(Material {
                name: name.clone(),
                color: *color,
                transparency: *transparency,
            }),
            _ => None,
        })
        .map(Entity::SurfaceStyle)
        .ok_or_else(|| Error::entity(entity.id, "surface style has no shading"))
}

pub(crate) fn load_style_assignment(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let styles = cache.children_lenient(
        &entity.required_refs(0, "Styles")?,
        IfcType::IfcPresentationStyle,
    );
    Ok(Entity::StyleAssignment(styles))
}

pub(crate) fn load_styled_item(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let styles = entity
        .required_refs(1, "Styles")?
        .into_iter()
        .filter_map(|id| cache.resolve_one_of(id, &STYLE_TYPES))
        .collect();
    Ok(Entity::StyledItem {
        item: entity.optional_ref(0),
        styles,
    })
}

pub(crate) fn load_layer_assignment(
    _cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    Ok(Entity::LayerAssignment {
        name: entity.optional_string(0).unwrap_or_default().to_string(),
        items: entity.required_refs(2, "AssignedItems")?,
    })
}

/// Materials and layers keyed by the id of the item they are attached to
#[derive(Debug, Default)]
pub struct StyleIndex {
    materials: BTreeMap<MaterialId, Material>,
    item_styles: FxHashMap<u32, MaterialId>,
    layers: FxHashMap<u32, String>,
}

impl StyleIndex {
    /// Resolve every styled item and layer assignment in the file
    pub fn build(cache: &mut EntityCache<'_>) -> Self {
        let mut index = Self::default();

        for id in cache.ids_of_type(IfcType::IfcStyledItem) {
            let EntityOutcome::Imported(key) = cache.resolve(id, IfcType::IfcStyledItem) else {
                continue;
            };
            let Entity::StyledItem {
                item: Some(item),
                styles,
            } = cache.entity(key)
            else {
                continue;
            };
            let material = styles
                .iter()
                .find_map(|&style| index.material_for(cache, style, 2));
            if let Some(material) = material {
                index.item_styles.entry(*item).or_insert(material);
            }
        }

        for id in cache.ids_of_type(IfcType::IfcPresentationLayerAssignment) {
            let EntityOutcome::Imported(key) =
                cache.resolve(id, IfcType::IfcPresentationLayerAssignment)
            else {
                continue;
            };
            if let Entity::LayerAssignment { name, items } = cache.entity(key) {
                for item in items {
                    index.layers.entry(*item).or_insert_with(|| name.clone());
                }
            }
        }

        tracing::debug!(
            materials = index.materials.len(),
            styled_items = index.item_styles.len(),
            layered_items = index.layers.len(),
            "Built style index"
        );
        index
    }

    /// Material of a style or style assignment, registered on first use
    fn material_for(
        &mut self,
        cache: &EntityCache<'_>,
        style: EntityKey,
        depth: usize,
    ) -> Option<MaterialId> {
        match cache.entity(style) {
            Entity::SurfaceStyle(material) => {
                let id = MaterialId(cache.record(style).id);
                self.materials.entry(id).or_insert_with(|| material.clone());
                Some(id)
            }
            Entity::StyleAssignment(styles) if depth > 0 => styles
                .iter()
                .find_map(|&inner| self.material_for(cache, inner, depth - 1)),
            _ => None,
        }
    }

    /// Material of a styled representation item
    pub fn item_material(&self, item_id: u32) -> Option<MaterialId> {
        self.item_styles.get(&item_id).copied()
    }

    /// Layer name of a representation item or representation
    pub fn layer(&self, id: u32) -> Option<&str> {
        self.layers.get(&id).map(String::as_str)
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(&id)
    }

    pub fn materials(&self) -> &BTreeMap<MaterialId, Material> {
        &self.materials
    }
}
