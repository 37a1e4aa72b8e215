// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Profile definitions, resolved to closed curve loops in the XY plane of
//! the profile's own position.

use ifc_import_core::DecodedEntity;
use nalgebra::Point3;

use super::{Entity, EntityCache, EntityKey};
use crate::diagnostics::DiagnosticKind;
use crate::error::{Error, Result};
use crate::kernel::{Curve, CurveLoop, CurveSegment};

const CLOSURE_TOLERANCE: f64 = 1e-6;

/// Outer boundary and holes of a swept area
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub outer: CurveLoop,
    pub inner: Vec<CurveLoop>,
}

impl Profile {
    /// All loops, outer first
    pub fn loops(&self) -> impl Iterator<Item = &CurveLoop> {
        std::iter::once(&self.outer).chain(self.inner.iter())
    }
}

impl EntityCache<'_> {
    /// Profile behind a key returned by `child(.., IfcProfileDef)`
    pub(crate) fn profile(&self, key: EntityKey) -> Result<&Profile> {
        match self.settled(key)? {
            Entity::Profile(profile) => Ok(profile),
            _ => Err(Error::entity(self.record(key).id, "expected a profile")),
        }
    }

    fn closed_curve(&mut self, id: u32, owner: u32) -> Result<CurveLoop> {
        let curve_loop = self.curve(id)?.to_loop();
        if !curve_loop.is_closed(CLOSURE_TOLERANCE) {
            self.log.comment(
                owner,
                DiagnosticKind::AutoCorrection,
                format!("profile curve #{} is open and was closed", id),
            );
        }
        Ok(curve_loop)
    }
}

pub(crate) fn load_arbitrary_closed_profile(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let outer = cache.closed_curve(entity.required_ref(2, "OuterCurve")?, entity.id)?;
    Ok(Entity::Profile(Profile {
        outer,
        inner: Vec::new(),
    }))
}

pub(crate) fn load_arbitrary_profile_with_voids(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let outer = cache.closed_curve(entity.required_ref(2, "OuterCurve")?, entity.id)?;
    let inner = entity
        .required_refs(3, "InnerCurves")?
        .into_iter()
        .map(|id| cache.closed_curve(id, entity.id))
        .collect::<Result<Vec<_>>>()?;
    Ok(Entity::Profile(Profile { outer, inner }))
}

pub(crate) fn load_rectangle_profile(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let position = cache.optional_placement(entity.optional_ref(2))?;
    let x = entity.required_float(3, "XDim")? / 2.0;
    let y = entity.required_float(4, "YDim")? / 2.0;
    if x <= 0.0 || y <= 0.0 {
        return Err(Error::entity(entity.id, "rectangle dimensions must be positive"));
    }
    let corners = [
        Point3::new(-x, -y, 0.0),
        Point3::new(x, -y, 0.0),
        Point3::new(x, y, 0.0),
        Point3::new(-x, y, 0.0),
    ];
    Ok(Entity::Profile(Profile {
        outer: CurveLoop::polygon(&corners).transformed(&position),
        inner: Vec::new(),
    }))
}

pub(crate) fn load_circle_profile(
    cache: &mut EntityCache<'_>,
    entity: &DecodedEntity,
) -> Result<Entity> {
    let frame = cache.optional_placement(entity.optional_ref(2))?;
    let radius = entity.required_float(3, "Radius")?;
    if radius <= 0.0 {
        return Err(Error::entity(entity.id, "circle radius must be positive"));
    }
    Ok(Entity::Profile(Profile {
        outer: CurveLoop::new(vec![CurveSegment::full(Curve::Conic {
            frame,
            radius_x: radius,
            radius_y: radius,
        })]),
        inner: Vec::new(),
    }))
}
