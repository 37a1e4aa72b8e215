// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boolean results.
//!
//! The first operand must produce geometry; a broken second operand is
//! dropped with a warning and the first operand is used as is. Each kernel
//! call that fails is retried twice with the second operand nudged along a
//! suggested direction, first forwards and then backwards.

use ifc_import_core::{DecodedEntity, IfcType};
use nalgebra::{Matrix4, Vector3};

use super::representation::create_item_geometry;
use super::{Entity, EntityCache, EntityKey, EntityOutcome, Item};
use crate::diagnostics::DiagnosticKind;
use crate::error::{Error, Result};
use crate::kernel::{BooleanOperator, GeometryObject, MaterialId, Solid};
use crate::scope::ShapeEditScope;
use crate::transform::{transform_vector, z_axis};

pub(crate) fn load_boolean_result(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let operator_name = entity.required_enum(0, "Operator")?;
    let operator = BooleanOperator::from_ifc(operator_name).ok_or_else(|| {
        Error::entity(entity.id, format!("unknown Boolean operator {}", operator_name))
    })?;
    let first = cache.child(
        entity.required_ref(1, "FirstOperand")?,
        IfcType::IfcGeometricRepresentationItem,
    )?;
    let second_id = entity.required_ref(2, "SecondOperand")?;
    let second = match cache.resolve(second_id, IfcType::IfcGeometricRepresentationItem) {
        EntityOutcome::Imported(key) => Some(key),
        EntityOutcome::Skipped => {
            cache.log.warning(
                entity.id,
                DiagnosticKind::DroppedOperand,
                format!("second operand #{} is not imported", second_id),
            );
            None
        }
        EntityOutcome::Failed(reason) => {
            cache.log.warning(
                entity.id,
                DiagnosticKind::DroppedOperand,
                format!("second operand #{} failed: {}", second_id, reason),
            );
            None
        }
    };
    Ok(Entity::Item(Item::Boolean {
        operator,
        first,
        second,
    }))
}

/// One side of a Boolean
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOperand {
    Leaf(EntityKey),
    /// Another Boolean result
    Nested(EntityKey),
}

impl BooleanOperand {
    pub fn new(cache: &EntityCache<'_>, key: EntityKey) -> Self {
        match cache.entity(key) {
            Entity::Item(Item::Boolean { .. }) => BooleanOperand::Nested(key),
            _ => BooleanOperand::Leaf(key),
        }
    }

    pub fn key(&self) -> EntityKey {
        match self {
            BooleanOperand::Leaf(key) | BooleanOperand::Nested(key) => *key,
        }
    }

    pub fn produce_geometry(
        &self,
        scope: &mut ShapeEditScope<'_>,
        lcs: &Matrix4<f64>,
    ) -> Result<Vec<GeometryObject>> {
        create_item_geometry(scope, self.key(), lcs)
    }

    /// Direction along which nudging this operand is least likely to change
    /// the intended result
    pub fn suggested_shift_direction(
        &self,
        cache: &EntityCache<'_>,
        lcs: &Matrix4<f64>,
        depth: usize,
    ) -> Option<Vector3<f64>> {
        match (self, cache.entity(self.key())) {
            (BooleanOperand::Leaf(_), Entity::Item(item)) => leaf_shift_direction(item, lcs),
            (BooleanOperand::Nested(_), Entity::Item(Item::Boolean { first, second, .. })) => {
                let depth = depth.checked_sub(1)?;
                BooleanOperand::new(cache, *first)
                    .suggested_shift_direction(cache, lcs, depth)
                    .or_else(|| {
                        second.and_then(|second| {
                            BooleanOperand::new(cache, second)
                                .suggested_shift_direction(cache, lcs, depth)
                        })
                    })
            }
            _ => None,
        }
    }
}

/// Plane normal of a half-space, extrusion direction of an extruded area
pub(crate) fn leaf_shift_direction(item: &Item, lcs: &Matrix4<f64>) -> Option<Vector3<f64>> {
    let direction = match item {
        Item::HalfSpace { plane, .. } => z_axis(&(lcs * plane)),
        Item::ExtrudedArea {
            position,
            direction,
            ..
        } => transform_vector(&(lcs * position), direction),
        _ => return None,
    };
    direction.try_normalize(1e-12)
}

/// Run one Boolean, retrying with the second operand shifted by
/// `+shift` and then `-shift` when the unshifted call fails.
pub(crate) fn execute_with_retry(
    scope: &mut ShapeEditScope<'_>,
    entity_id: u32,
    first: &Solid,
    second: &Solid,
    operator: BooleanOperator,
    shift: Option<Vector3<f64>>,
) -> Option<Solid> {
    let kernel = scope.kernel;
    let attempt = |operand: &Solid| match kernel.execute_boolean(first, operand, operator) {
        Ok(Some(solid)) => Some(solid),
        Ok(None) => None,
        Err(e) => {
            tracing::debug!(entity_id, error = %e, "Boolean attempt failed");
            None
        }
    };

    if let Some(solid) = attempt(second) {
        return Some(solid);
    }

    if let Some(direction) = shift.and_then(|d| d.try_normalize(1e-12)) {
        let offset = direction * scope.options.boolean_shift_distance;
        for (sign, label) in [(1.0, "forwards"), (-1.0, "backwards")] {
            if let Some(solid) = attempt(&second.translated(&(offset * sign))) {
                scope.log.comment(
                    entity_id,
                    DiagnosticKind::BooleanRetry,
                    format!(
                        "{:?} succeeded after shifting the second operand {} by {:e}",
                        operator, label, scope.options.boolean_shift_distance
                    ),
                );
                return Some(solid);
            }
        }
    }

    scope.log.warning(
        entity_id,
        DiagnosticKind::BooleanFailed,
        format!("{:?} failed in every attempt", operator),
    );
    None
}

fn unique_material(objects: &[GeometryObject]) -> Option<MaterialId> {
    let mut materials = objects.iter().map(GeometryObject::unique_material);
    let first = materials.next()??;
    materials.all(|m| m == Some(first)).then_some(first)
}

pub(crate) fn create_boolean_result(
    scope: &mut ShapeEditScope<'_>,
    key: EntityKey,
    operator: BooleanOperator,
    first: EntityKey,
    second: Option<EntityKey>,
    lcs: &Matrix4<f64>,
) -> Result<Vec<GeometryObject>> {
    let id = scope.cache.record(key).id;
    if scope.booleans_in_progress.len() >= scope.options.max_boolean_depth {
        return Err(Error::entity(id, "Boolean nesting is too deep"));
    }
    if !scope.booleans_in_progress.insert(key) {
        scope.log.warning(
            id,
            DiagnosticKind::ReferenceCycle,
            "Boolean result contains itself",
        );
        return Err(Error::entity(id, "Boolean result contains itself"));
    }
    let result = evaluate(scope, id, operator, first, second, lcs);
    scope.booleans_in_progress.remove(&key);
    result
}

fn evaluate(
    scope: &mut ShapeEditScope<'_>,
    id: u32,
    operator: BooleanOperator,
    first: EntityKey,
    second: Option<EntityKey>,
    lcs: &Matrix4<f64>,
) -> Result<Vec<GeometryObject>> {
    let cache = scope.cache;
    let first = BooleanOperand::new(cache, first);
    let second = second.map(|key| BooleanOperand::new(cache, key));

    let first_geometry = first.produce_geometry(scope, lcs)?;

    // The second operand inherits the first operand's material
    let second_geometry = match second {
        Some(operand) => {
            let mut styled = scope.push_material(unique_material(&first_geometry));
            match operand.produce_geometry(&mut styled, lcs) {
                Ok(geometry) => Some(geometry),
                Err(e) => {
                    styled.log.warning(
                        id,
                        DiagnosticKind::DroppedOperand,
                        format!("second operand ignored: {}", e),
                    );
                    None
                }
            }
        }
        None => None,
    };

    if first_geometry.iter().all(GeometryObject::is_empty) {
        return Ok(match (operator, second_geometry) {
            (BooleanOperator::Union, Some(geometry)) => geometry,
            _ => Vec::new(),
        });
    }
    let Some(second_geometry) = second_geometry else {
        return Ok(first_geometry);
    };

    let depth = scope.options.max_boolean_depth;
    let shift = second
        .and_then(|operand| operand.suggested_shift_direction(cache, lcs, depth))
        .or_else(|| first.suggested_shift_direction(cache, lcs, depth));
    let tools: Vec<&Solid> = second_geometry
        .iter()
        .filter_map(GeometryObject::as_solid)
        .filter(|solid| !solid.is_empty())
        .collect();

    let mut result = Vec::with_capacity(first_geometry.len());
    for object in first_geometry {
        let GeometryObject::Solid(solid) = object else {
            // Meshes are not closed and cannot take part in a Boolean
            result.push(object);
            continue;
        };
        let mut current = Some(solid);
        for tool in &tools {
            current = current
                .and_then(|solid| execute_with_retry(scope, id, &solid, tool, operator, shift));
        }
        if let Some(solid) = current.filter(|solid| !solid.is_empty()) {
            result.push(GeometryObject::Solid(solid));
        }
    }
    Ok(result)
}
