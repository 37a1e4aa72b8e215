// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Top-level import driver.
//!
//! Resolves every product through the entity cache, then creates the
//! geometry of each product's representations in its absolute placement
//! and cuts the openings that void it. A product that produces nothing is
//! logged; it never stops the others.

use std::collections::BTreeMap;

use ifc_import_core::IfcType;
use nalgebra::{Matrix4, Vector3};
use rustc_hash::FxHashMap;

use crate::config::ImportOptions;
use crate::diagnostics::{DiagnosticKind, ImportLog};
use crate::entities::boolean::{execute_with_retry, leaf_shift_direction};
use crate::entities::primitives::absolute_placement;
use crate::entities::representation::{
    create_product_representation, representation_geometry, RepresentationKind,
};
use crate::entities::styles::StyleIndex;
use crate::entities::{Entity, EntityCache, EntityKey, EntityOutcome, Product};
use crate::kernel::{
    BooleanOperator, GeometryKernel, GeometryObject, Material, MaterialId, PolyhedralKernel, Solid,
};
use crate::scope::{CreatedGeometry, ShapeEditScope, SharedDefinition};

/// Geometry created for one product
#[derive(Debug, Clone, PartialEq)]
pub struct ProductGeometry {
    pub entity_id: u32,
    pub ifc_type: IfcType,
    pub name: Option<String>,
    pub geometry: Vec<CreatedGeometry>,
}

#[derive(Debug, Clone)]
pub struct ImportResult {
    pub products: Vec<ProductGeometry>,
    /// Shared definitions referenced by `CreatedGeometry::Instance`
    pub shared_definitions: BTreeMap<u32, SharedDefinition>,
    pub materials: BTreeMap<MaterialId, Material>,
    pub log: ImportLog,
}

impl ImportResult {
    pub fn product(&self, entity_id: u32) -> Option<&ProductGeometry> {
        self.products.iter().find(|p| p.entity_id == entity_id)
    }

    /// World-space objects of a product, with instances expanded
    pub fn world_objects(&self, product: &ProductGeometry) -> Vec<GeometryObject> {
        product
            .geometry
            .iter()
            .flat_map(|created| expand(&self.shared_definitions, created.clone()))
            .filter_map(|created| match created {
                CreatedGeometry::Direct { object, .. } => Some(object),
                CreatedGeometry::Instance { .. } => None,
            })
            .collect()
    }
}

/// Replace an instance by its definition's geometry, placed
fn expand(
    definitions: &BTreeMap<u32, SharedDefinition>,
    created: CreatedGeometry,
) -> Vec<CreatedGeometry> {
    match created {
        CreatedGeometry::Instance {
            definition_id,
            transform,
            representation_id,
        } => definitions
            .get(&definition_id)
            .map(|definition| {
                definition
                    .geometry
                    .iter()
                    .filter_map(|shared| match shared {
                        CreatedGeometry::Direct {
                            object,
                            material,
                            layer,
                            ..
                        } => {
                            let mut object = object.clone();
                            object.transform(&transform);
                            Some(CreatedGeometry::Direct {
                                object,
                                representation_id,
                                material: *material,
                                layer: layer.clone(),
                            })
                        }
                        CreatedGeometry::Instance { .. } => None,
                    })
                    .collect()
            })
            .unwrap_or_default(),
        direct => vec![direct],
    }
}

/// Imports IFC STEP content with a geometry kernel
pub struct Importer<K: GeometryKernel = PolyhedralKernel> {
    options: ImportOptions,
    kernel: K,
}

impl Default for Importer<PolyhedralKernel> {
    fn default() -> Self {
        Self::new(ImportOptions::default(), PolyhedralKernel::default())
    }
}

impl<K: GeometryKernel> Importer<K> {
    pub fn new(options: ImportOptions, kernel: K) -> Self {
        Self { options, kernel }
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn import(&self, content: &str) -> ImportResult {
        let mut cache = EntityCache::new(content, self.options.clone());
        let styles = StyleIndex::build(&mut cache);
        let voids = void_index(&mut cache);

        let mut products = Vec::new();
        for id in cache.ids_of_type(IfcType::IfcProduct) {
            if let EntityOutcome::Imported(key) = cache.resolve(id, IfcType::IfcProduct) {
                products.push((id, key));
            }
        }
        tracing::info!(
            products = products.len(),
            entities = cache.len(),
            "Resolved products"
        );

        let log = cache.take_log();
        let mut scope = ShapeEditScope::new(&cache, &self.kernel, &self.options, &styles, log);

        let mut created = Vec::with_capacity(products.len());
        for (id, key) in products {
            let record = cache.record(key);
            // Openings only exist to be cut from their hosts
            if record.ifc_type.is_subtype_of(IfcType::IfcOpeningElement) {
                continue;
            }
            let Entity::Product(product) = cache.entity(key) else {
                continue;
            };
            if product.shape.is_none() {
                continue;
            }

            let openings = voids.get(&id).map(Vec::as_slice).unwrap_or_default();
            let geometry = product_geometry(&mut scope, id, product, openings);
            if geometry.is_empty() {
                scope
                    .log
                    .warning(id, DiagnosticKind::NoGeometry, "product has no geometry");
            }
            created.push(ProductGeometry {
                entity_id: id,
                ifc_type: record.ifc_type,
                name: product.name.clone(),
                geometry,
            });
        }

        let (log, shared_definitions) = scope.into_parts();
        tracing::info!(
            products = created.len(),
            definitions = shared_definitions.len(),
            diagnostics = log.len(),
            "Import finished"
        );
        ImportResult {
            products: created,
            shared_definitions,
            materials: styles.materials().clone(),
            log,
        }
    }
}

/// Host element id to the ids of the openings voiding it
fn void_index(cache: &mut EntityCache<'_>) -> FxHashMap<u32, Vec<u32>> {
    let mut voids: FxHashMap<u32, Vec<u32>> = FxHashMap::default();
    for id in cache.ids_of_type(IfcType::IfcRelVoidsElement) {
        let EntityOutcome::Imported(key) = cache.resolve(id, IfcType::IfcRelVoidsElement) else {
            continue;
        };
        if let Entity::VoidsRelation { host, opening } = cache.entity(key) {
            voids.entry(*host).or_default().push(*opening);
        }
    }
    voids
}

fn placement_of(scope: &mut ShapeEditScope<'_>, product: &Product) -> Matrix4<f64> {
    match product.placement {
        Some(placement) => absolute_placement(scope.cache, placement, &mut scope.log),
        None => Matrix4::identity(),
    }
}

fn representations_of<'c>(cache: &'c EntityCache<'_>, product: &Product) -> &'c [EntityKey] {
    match product.shape.map(|shape| cache.entity(shape)) {
        Some(Entity::ProductShape { representations }) => representations,
        _ => &[],
    }
}

fn product_geometry(
    scope: &mut ShapeEditScope<'_>,
    id: u32,
    product: &Product,
    openings: &[u32],
) -> Vec<CreatedGeometry> {
    let cache = scope.cache;
    let lcs = placement_of(scope, product);
    create_product_representation(scope, representations_of(cache, product), &lcs);
    let geometry = std::mem::take(&mut scope.created);
    if openings.is_empty() {
        geometry
    } else {
        cut_openings(scope, id, geometry, openings)
    }
}

/// An opening's body solids in world coordinates and its cut direction
struct OpeningTool {
    id: u32,
    solids: Vec<Solid>,
    shift: Option<Vector3<f64>>,
}

fn opening_tool(scope: &mut ShapeEditScope<'_>, opening_id: u32) -> Option<OpeningTool> {
    let cache = scope.cache;
    let Entity::Product(opening) = cache.entity(cache.key_of(opening_id)?) else {
        return None;
    };
    let lcs = placement_of(scope, opening);

    let mut solids = Vec::new();
    let mut shift = None;
    for &representation in representations_of(cache, opening) {
        let Entity::Representation(shape) = cache.entity(representation) else {
            continue;
        };
        if shape.kind() != RepresentationKind::Body {
            continue;
        }
        shift = shift.or_else(|| {
            shape.items.iter().find_map(|&item| match cache.entity(item) {
                Entity::Item(item) => leaf_shift_direction(item, &lcs),
                _ => None,
            })
        });
        for created in representation_geometry(scope, representation, &lcs, false) {
            if let CreatedGeometry::Direct {
                object: GeometryObject::Solid(solid),
                ..
            } = created
            {
                solids.push(solid);
            }
        }
    }
    Some(OpeningTool {
        id: opening_id,
        solids,
        shift,
    })
}

/// Subtract every opening from the host's solids.
///
/// Instances are expanded first so each host keeps its own cut copy of
/// shared geometry. A failed cut keeps the uncut solid.
fn cut_openings(
    scope: &mut ShapeEditScope<'_>,
    host_id: u32,
    geometry: Vec<CreatedGeometry>,
    openings: &[u32],
) -> Vec<CreatedGeometry> {
    let mut tools = Vec::with_capacity(openings.len());
    for &opening_id in openings {
        match opening_tool(scope, opening_id) {
            Some(tool) if !tool.solids.is_empty() => tools.push(tool),
            Some(_) => scope.log.warning(
                host_id,
                DiagnosticKind::VoidNotCut,
                format!("opening #{} has no body solid", opening_id),
            ),
            None => scope.log.warning(
                host_id,
                DiagnosticKind::VoidNotCut,
                format!("opening #{} was not imported", opening_id),
            ),
        }
    }
    if tools.is_empty() {
        return geometry;
    }

    let expanded: Vec<CreatedGeometry> = geometry
        .into_iter()
        .flat_map(|created| expand(&scope.definitions, created))
        .collect();

    let mut result = Vec::with_capacity(expanded.len());
    for created in expanded {
        let CreatedGeometry::Direct {
            object: GeometryObject::Solid(mut solid),
            representation_id,
            material,
            layer,
        } = created
        else {
            result.push(created);
            continue;
        };

        for tool in &tools {
            for cutter in &tool.solids {
                match execute_with_retry(
                    scope,
                    host_id,
                    &solid,
                    cutter,
                    BooleanOperator::Difference,
                    tool.shift,
                ) {
                    Some(cut) => solid = cut,
                    None => scope.log.warning(
                        host_id,
                        DiagnosticKind::VoidNotCut,
                        format!("opening #{} could not be cut", tool.id),
                    ),
                }
            }
        }

        if !solid.is_empty() {
            result.push(CreatedGeometry::Direct {
                object: GeometryObject::Solid(solid),
                representation_id,
                material,
                layer,
            });
        }
    }
    result
}
