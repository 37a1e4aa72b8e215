// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC entity types known to the importer, with their supertype chain.
//!
//! Only the part of the EXPRESS hierarchy the importer dispatches on is
//! modelled. Everything else decodes as [`IfcType::Unknown`] and keeps its
//! raw STEP name on the decoded entity.

use rustc_hash::FxHashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

macro_rules! ifc_types {
    ($($variant:ident $(: $parent:ident)?),* $(,)?) => {
        /// IFC entity type
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub enum IfcType {
            $($variant,)*
            Unknown,
        }

        impl IfcType {
            /// Every known type, in declaration order
            pub const ALL: &'static [IfcType] = &[$(IfcType::$variant,)*];

            /// Schema name in EXPRESS casing, e.g. `IfcExtrudedAreaSolid`
            pub fn name(&self) -> &'static str {
                match self {
                    $(IfcType::$variant => stringify!($variant),)*
                    IfcType::Unknown => "Unknown",
                }
            }

            /// Direct supertype, `None` for roots of the modelled hierarchy
            pub fn supertype(&self) -> Option<IfcType> {
                match self {
                    $(IfcType::$variant => None$(.or(Some(IfcType::$parent)))?,)*
                    IfcType::Unknown => None,
                }
            }
        }
    };
}

ifc_types! {
    // Representation item roots
    IfcRepresentationItem,
    IfcGeometricRepresentationItem: IfcRepresentationItem,
    IfcTopologicalRepresentationItem: IfcRepresentationItem,
    IfcStyledItem: IfcRepresentationItem,
    IfcMappedItem: IfcRepresentationItem,

    // Points, directions, placements
    IfcCartesianPoint: IfcGeometricRepresentationItem,
    IfcDirection: IfcGeometricRepresentationItem,
    IfcVector: IfcGeometricRepresentationItem,
    IfcCartesianPointList: IfcGeometricRepresentationItem,
    IfcCartesianPointList2D: IfcCartesianPointList,
    IfcCartesianPointList3D: IfcCartesianPointList,
    IfcPlacement: IfcGeometricRepresentationItem,
    IfcAxis1Placement: IfcPlacement,
    IfcAxis2Placement2D: IfcPlacement,
    IfcAxis2Placement3D: IfcPlacement,
    IfcCartesianTransformationOperator: IfcGeometricRepresentationItem,
    IfcCartesianTransformationOperator3D: IfcCartesianTransformationOperator,
    IfcCartesianTransformationOperator3DnonUniform: IfcCartesianTransformationOperator3D,

    // Curves
    IfcCurve: IfcGeometricRepresentationItem,
    IfcLine: IfcCurve,
    IfcConic: IfcCurve,
    IfcCircle: IfcConic,
    IfcEllipse: IfcConic,
    IfcOffsetCurve2D: IfcCurve,
    IfcBoundedCurve: IfcCurve,
    IfcTrimmedCurve: IfcBoundedCurve,
    IfcPolyline: IfcBoundedCurve,
    IfcCompositeCurve: IfcBoundedCurve,
    IfcIndexedPolyCurve: IfcBoundedCurve,
    IfcBSplineCurve: IfcBoundedCurve,
    IfcBSplineCurveWithKnots: IfcBSplineCurve,
    IfcRationalBSplineCurveWithKnots: IfcBSplineCurveWithKnots,
    IfcCompositeCurveSegment: IfcGeometricRepresentationItem,

    // Surfaces
    IfcSurface: IfcGeometricRepresentationItem,
    IfcElementarySurface: IfcSurface,
    IfcPlane: IfcElementarySurface,

    // Solids
    IfcSolidModel: IfcGeometricRepresentationItem,
    IfcSweptAreaSolid: IfcSolidModel,
    IfcExtrudedAreaSolid: IfcSweptAreaSolid,
    IfcRevolvedAreaSolid: IfcSweptAreaSolid,
    IfcSurfaceCurveSweptAreaSolid: IfcSweptAreaSolid,
    IfcSweptDiskSolid: IfcSolidModel,
    IfcSectionedSolid: IfcSolidModel,
    IfcSectionedSolidHorizontal: IfcSectionedSolid,
    IfcManifoldSolidBrep: IfcSolidModel,
    IfcFacetedBrep: IfcManifoldSolidBrep,
    IfcFacetedBrepWithVoids: IfcFacetedBrep,
    IfcBoundingBox: IfcGeometricRepresentationItem,
    IfcDistanceExpression: IfcGeometricRepresentationItem,
    IfcCsgPrimitive3D: IfcGeometricRepresentationItem,
    IfcBlock: IfcCsgPrimitive3D,
    IfcHalfSpaceSolid: IfcGeometricRepresentationItem,
    IfcPolygonalBoundedHalfSpace: IfcHalfSpaceSolid,
    IfcBooleanResult: IfcGeometricRepresentationItem,
    IfcBooleanClippingResult: IfcBooleanResult,

    // Surface models and tessellation
    IfcFaceBasedSurfaceModel: IfcGeometricRepresentationItem,
    IfcShellBasedSurfaceModel: IfcGeometricRepresentationItem,
    IfcTessellatedItem: IfcGeometricRepresentationItem,
    IfcTessellatedFaceSet: IfcTessellatedItem,
    IfcTriangulatedFaceSet: IfcTessellatedFaceSet,
    IfcPolygonalFaceSet: IfcTessellatedFaceSet,
    IfcIndexedPolygonalFace: IfcTessellatedItem,
    IfcIndexedPolygonalFaceWithVoids: IfcIndexedPolygonalFace,

    // Topology
    IfcVertex: IfcTopologicalRepresentationItem,
    IfcVertexPoint: IfcVertex,
    IfcEdge: IfcTopologicalRepresentationItem,
    IfcEdgeCurve: IfcEdge,
    IfcOrientedEdge: IfcEdge,
    IfcLoop: IfcTopologicalRepresentationItem,
    IfcPolyLoop: IfcLoop,
    IfcEdgeLoop: IfcLoop,
    IfcFaceBound: IfcTopologicalRepresentationItem,
    IfcFaceOuterBound: IfcFaceBound,
    IfcFace: IfcTopologicalRepresentationItem,
    IfcConnectedFaceSet: IfcTopologicalRepresentationItem,
    IfcClosedShell: IfcConnectedFaceSet,
    IfcOpenShell: IfcConnectedFaceSet,

    // Profiles
    IfcProfileDef,
    IfcArbitraryClosedProfileDef: IfcProfileDef,
    IfcArbitraryProfileDefWithVoids: IfcArbitraryClosedProfileDef,
    IfcParameterizedProfileDef: IfcProfileDef,
    IfcRectangleProfileDef: IfcParameterizedProfileDef,
    IfcCircleProfileDef: IfcParameterizedProfileDef,

    // Presentation
    IfcPresentationStyle,
    IfcSurfaceStyle: IfcPresentationStyle,
    IfcSurfaceStyleShading,
    IfcSurfaceStyleRendering: IfcSurfaceStyleShading,
    IfcColourRgb,
    IfcPresentationStyleAssignment,
    IfcPresentationLayerAssignment,

    // Representations
    IfcRepresentation,
    IfcShapeModel: IfcRepresentation,
    IfcShapeRepresentation: IfcShapeModel,
    IfcProductRepresentation,
    IfcProductDefinitionShape: IfcProductRepresentation,
    IfcRepresentationMap,
    IfcObjectPlacement,
    IfcLocalPlacement: IfcObjectPlacement,

    // Products
    IfcProduct,
    IfcElement: IfcProduct,
    IfcBuildingElement: IfcElement,
    IfcWall: IfcBuildingElement,
    IfcWallStandardCase: IfcWall,
    IfcSlab: IfcBuildingElement,
    IfcColumn: IfcBuildingElement,
    IfcBeam: IfcBuildingElement,
    IfcMember: IfcBuildingElement,
    IfcPlate: IfcBuildingElement,
    IfcRoof: IfcBuildingElement,
    IfcDoor: IfcBuildingElement,
    IfcWindow: IfcBuildingElement,
    IfcBuildingElementProxy: IfcBuildingElement,
    IfcFurnishingElement: IfcElement,
    IfcDistributionElement: IfcElement,
    IfcFeatureElement: IfcElement,
    IfcOpeningElement: IfcFeatureElement,
    IfcPort: IfcProduct,
    IfcDistributionPort: IfcPort,

    // Relationships
    IfcRelationship,
    IfcRelVoidsElement: IfcRelationship,
}

fn upper_case_lookup() -> &'static FxHashMap<String, IfcType> {
    static LOOKUP: OnceLock<FxHashMap<String, IfcType>> = OnceLock::new();
    LOOKUP.get_or_init(|| {
        IfcType::ALL
            .iter()
            .map(|ty| (ty.name().to_ascii_uppercase(), *ty))
            .collect()
    })
}

impl IfcType {
    /// Map a STEP type keyword (any casing) to a known type
    pub fn from_step_name(name: &str) -> IfcType {
        let lookup = upper_case_lookup();
        if let Some(ty) = lookup.get(name) {
            return *ty;
        }
        lookup
            .get(&name.to_ascii_uppercase())
            .copied()
            .unwrap_or(IfcType::Unknown)
    }

    /// `IsSubTypeOf`: true when `self` is `declared` or derives from it
    pub fn is_subtype_of(&self, declared: IfcType) -> bool {
        let mut current = Some(*self);
        while let Some(ty) = current {
            if ty == declared {
                return true;
            }
            current = ty.supertype();
        }
        false
    }

    /// Number of supertypes above this type
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.supertype();
        while let Some(ty) = current {
            depth += 1;
            current = ty.supertype();
        }
        depth
    }
}

impl FromStr for IfcType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(IfcType::from_step_name(s))
    }
}

impl fmt::Display for IfcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_step_name() {
        assert_eq!(IfcType::from_step_name("IFCEXTRUDEDAREASOLID"), IfcType::IfcExtrudedAreaSolid);
        assert_eq!(IfcType::from_step_name("IfcFacetedBrep"), IfcType::IfcFacetedBrep);
        assert_eq!(IfcType::from_step_name("IFCPROJECT"), IfcType::Unknown);
    }

    #[test]
    fn test_subtype_chain() {
        assert!(IfcType::IfcBooleanClippingResult.is_subtype_of(IfcType::IfcBooleanResult));
        assert!(IfcType::IfcRationalBSplineCurveWithKnots.is_subtype_of(IfcType::IfcCurve));
        assert!(IfcType::IfcWallStandardCase.is_subtype_of(IfcType::IfcProduct));
        assert!(!IfcType::IfcFace.is_subtype_of(IfcType::IfcGeometricRepresentationItem));
        assert!(!IfcType::Unknown.is_subtype_of(IfcType::IfcRepresentationItem));
    }

    #[test]
    fn test_depth_orders_most_specific_first() {
        assert!(IfcType::IfcPolygonalBoundedHalfSpace.depth() > IfcType::IfcHalfSpaceSolid.depth());
        assert_eq!(IfcType::IfcProduct.depth(), 0);
    }
}
