// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end import scenarios on small STEP snippets.

use std::cell::RefCell;

use approx::assert_relative_eq;
use ifc_import_core::IfcType;
use ifc_import_geometry::{
    BooleanOperator, CreatedGeometry, CurveLoop, DiagnosticKind, EntityCache, EntityOutcome,
    GeometryKernel, GeometryObject, ImportOptions, ImportResult, Importer, Matrix4, MaterialId,
    Point3, PolyhedralKernel, Result, Severity, Solid, Vector3,
};

/// STEP content with sequential entity ids
struct Step {
    content: String,
    next_id: u32,
}

impl Step {
    fn new() -> Self {
        Self {
            content: String::new(),
            next_id: 1,
        }
    }

    fn add(&mut self, body: impl AsRef<str>) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.content
            .push_str(&format!("#{}={};\n", id, body.as_ref()));
        id
    }

    fn point(&mut self, [x, y, z]: [f64; 3]) -> u32 {
        self.add(format!("IFCCARTESIANPOINT(({:?},{:?},{:?}))", x, y, z))
    }

    fn placement_at(&mut self, origin: [f64; 3]) -> u32 {
        let point = self.point(origin);
        self.add(format!("IFCAXIS2PLACEMENT3D(#{},$,$)", point))
    }

    /// Closed shell of an axis-aligned cube with outward face loops.
    ///
    /// Faces listed in `short_edge_faces` get an extra vertex 0.5 mm from
    /// their first corner, which the strict builder rejects.
    fn cube_shell(&mut self, min: [f64; 3], size: f64, short_edge_faces: &[usize]) -> u32 {
        self.cube_shell_with_holes(min, size, short_edge_faces, &[])
    }

    /// Like `cube_shell`, with faces in `bad_hole_faces` carrying an extra
    /// inner bound whose loop cannot be resolved
    fn cube_shell_with_holes(
        &mut self,
        min: [f64; 3],
        size: f64,
        short_edge_faces: &[usize],
        bad_hole_faces: &[usize],
    ) -> u32 {
        const FACES: [[usize; 4]; 6] = [
            [0, 3, 2, 1],
            [4, 5, 6, 7],
            [0, 1, 5, 4],
            [1, 2, 6, 5],
            [2, 3, 7, 6],
            [3, 0, 4, 7],
        ];
        let [x, y, z] = min;
        let s = size;
        let corners = [
            [x, y, z],
            [x + s, y, z],
            [x + s, y + s, z],
            [x, y + s, z],
            [x, y, z + s],
            [x + s, y, z + s],
            [x + s, y + s, z + s],
            [x, y + s, z + s],
        ];

        let mut faces = Vec::new();
        for (index, face) in FACES.iter().enumerate() {
            let mut points: Vec<u32> = face.iter().map(|&c| self.point(corners[c])).collect();
            if short_edge_faces.contains(&index) {
                let (a, b) = (corners[face[0]], corners[face[1]]);
                let t = 0.0005 / s;
                let extra = self.point([
                    a[0] + (b[0] - a[0]) * t,
                    a[1] + (b[1] - a[1]) * t,
                    a[2] + (b[2] - a[2]) * t,
                ]);
                points.insert(1, extra);
            }
            let polyloop = self.add(format!("IFCPOLYLOOP(({}))", refs(&points)));
            let mut bounds = vec![self.add(format!("IFCFACEOUTERBOUND(#{},.T.)", polyloop))];
            if bad_hole_faces.contains(&index) {
                let direction = self.add("IFCDIRECTION((0.,0.,1.))");
                let bad_loop = self.add(format!("IFCPOLYLOOP((#{},#{},#{}))", direction, points[0], points[1]));
                bounds.push(self.add(format!("IFCFACEBOUND(#{},.T.)", bad_loop)));
            }
            faces.push(self.add(format!("IFCFACE(({}))", refs(&bounds))));
        }
        self.add(format!("IFCCLOSEDSHELL(({}))", refs(&faces)))
    }

    /// Product at the origin with one Body representation
    fn product(&mut self, items: &[u32]) -> u32 {
        let placement = self.placement_at([0.0, 0.0, 0.0]);
        let local = self.add(format!("IFCLOCALPLACEMENT($,#{})", placement));
        let representation = self.add(format!(
            "IFCSHAPEREPRESENTATION($,'Body','Brep',({}))",
            refs(items)
        ));
        let shape = self.add(format!("IFCPRODUCTDEFINITIONSHAPE($,$,(#{}))", representation));
        self.add(format!(
            "IFCBUILDINGELEMENTPROXY('guid',$,'Proxy',$,$,#{},#{},$,$)",
            local, shape
        ))
    }
}

fn refs(ids: &[u32]) -> String {
    ids.iter()
        .map(|id| format!("#{}", id))
        .collect::<Vec<_>>()
        .join(",")
}

type Policy = fn(&Solid, &Solid, BooleanOperator, usize) -> Option<Solid>;

/// Polyhedral kernel whose Booleans follow a script and are recorded
struct ScriptedKernel {
    inner: PolyhedralKernel,
    policy: Policy,
    /// Operator and minimum corner of the second operand, per call
    calls: RefCell<Vec<(BooleanOperator, Point3<f64>)>>,
}

impl ScriptedKernel {
    fn new(policy: Policy) -> Self {
        Self {
            inner: PolyhedralKernel::default(),
            policy,
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl GeometryKernel for ScriptedKernel {
    fn create_extrusion(
        &self,
        loops: &[CurveLoop],
        direction: &Vector3<f64>,
        length: f64,
    ) -> Result<Solid> {
        self.inner.create_extrusion(loops, direction, length)
    }

    fn create_revolution(
        &self,
        frame: &Matrix4<f64>,
        loops: &[CurveLoop],
        start_angle: f64,
        end_angle: f64,
    ) -> Result<Solid> {
        self.inner
            .create_revolution(frame, loops, start_angle, end_angle)
    }

    fn create_sweep(
        &self,
        path: &CurveLoop,
        start_param: f64,
        profile_loops: &[CurveLoop],
        profile_frame: &Matrix4<f64>,
    ) -> Result<Solid> {
        self.inner
            .create_sweep(path, start_param, profile_loops, profile_frame)
    }

    fn execute_boolean(
        &self,
        first: &Solid,
        second: &Solid,
        operator: BooleanOperator,
    ) -> Result<Option<Solid>> {
        let attempt = self.calls.borrow().len();
        let corner = second
            .bounds()
            .map(|(min, _)| min)
            .unwrap_or_else(Point3::origin);
        self.calls.borrow_mut().push((operator, corner));
        Ok((self.policy)(first, second, operator, attempt))
    }
}

fn import(content: &str) -> ImportResult {
    Importer::new(ImportOptions::default(), PolyhedralKernel::default()).import(content)
}

fn solids(result: &ImportResult, product_id: u32) -> Vec<Solid> {
    let product = result.product(product_id).expect("product was imported");
    result
        .world_objects(product)
        .into_iter()
        .filter_map(|object| match object {
            GeometryObject::Solid(solid) => Some(solid),
            GeometryObject::Mesh(_) => None,
        })
        .collect()
}

/// Axis-aligned bounds over every object of a product, in world coordinates
fn product_bounds(result: &ImportResult, product_id: u32) -> (Point3<f64>, Point3<f64>) {
    let product = result.product(product_id).expect("product was imported");
    let mut min = Point3::new(f64::MAX, f64::MAX, f64::MAX);
    let mut max = Point3::new(f64::MIN, f64::MIN, f64::MIN);
    for object in result.world_objects(product) {
        for p in object.to_mesh().positions.chunks_exact(3) {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
    }
    assert!(min.x <= max.x, "product #{} has no geometry", product_id);
    (min, max)
}

const PLACEMENT: &str = r#"
#1=IFCCARTESIANPOINT((0.,0.,0.));
#2=IFCAXIS2PLACEMENT3D(#1,$,$);
#3=IFCLOCALPLACEMENT($,#2);
"#;

#[test]
fn test_extruded_wall_with_style() {
    let content = format!(
        "{}{}",
        PLACEMENT,
        r#"
#4=IFCCARTESIANPOINT((0.,0.));
#5=IFCAXIS2PLACEMENT2D(#4,$);
#6=IFCRECTANGLEPROFILEDEF(.AREA.,$,#5,4.,2.);
#7=IFCDIRECTION((0.,0.,1.));
#8=IFCEXTRUDEDAREASOLID(#6,#2,#7,3.);
#9=IFCSHAPEREPRESENTATION($,'Body','SweptSolid',(#8));
#10=IFCPRODUCTDEFINITIONSHAPE($,$,(#9));
#11=IFCWALL('guid',$,'Wall',$,$,#3,#10,$,$);
#12=IFCCOLOURRGB($,0.5,0.25,0.);
#13=IFCSURFACESTYLERENDERING(#12,0.,$,$,$,$,$,$,.NOTDEFINED.);
#14=IFCSURFACESTYLE('Brick',.BOTH.,(#13));
#15=IFCSTYLEDITEM(#8,(#14),$);
"#
    );
    let result = import(&content);

    let wall = result.product(11).unwrap();
    assert_eq!(wall.ifc_type, IfcType::IfcWall);
    assert_eq!(wall.name.as_deref(), Some("Wall"));
    assert_eq!(wall.geometry.len(), 1);
    let CreatedGeometry::Direct {
        object,
        representation_id,
        material,
        ..
    } = &wall.geometry[0]
    else {
        panic!("expected direct geometry");
    };
    assert_eq!(*representation_id, 9);
    assert_eq!(*material, Some(MaterialId(14)));
    assert_eq!(
        result.materials.get(&MaterialId(14)).map(|m| m.color),
        Some([0.5, 0.25, 0.0])
    );

    let (min, max) = object.as_solid().unwrap().bounds().unwrap();
    assert_relative_eq!(min, Point3::new(-2.0, -1.0, 0.0), epsilon = 1e-9);
    assert_relative_eq!(max, Point3::new(2.0, 1.0, 3.0), epsilon = 1e-9);
}

#[test]
fn test_resolution_is_idempotent_and_cycles_terminate() {
    let content = r#"
#1=IFCCARTESIANPOINT((0.,0.,0.));
#2=IFCAXIS2PLACEMENT3D(#1,$,$);
#3=IFCLOCALPLACEMENT(#4,#2);
#4=IFCLOCALPLACEMENT(#3,#2);
#5=IFCBLOCK(#2,1.,1.,1.);
#6=IFCSHAPEREPRESENTATION($,'Body','CSG',(#5));
#7=IFCPRODUCTDEFINITIONSHAPE($,$,(#6));
#8=IFCBUILDINGELEMENTPROXY('guid',$,'Proxy',$,$,#3,#7,$,$);
"#;

    let mut cache = EntityCache::new(content, ImportOptions::default());
    let first = cache.resolve(8, IfcType::IfcProduct);
    let constructed = cache.len();
    let second = cache.resolve(8, IfcType::IfcProduct);
    assert!(matches!(first, EntityOutcome::Imported(_)));
    assert_eq!(first, second);
    assert_eq!(cache.len(), constructed);
    assert_eq!(first, EntityOutcome::Imported(cache.key_of(8).unwrap()));

    let result = import(content);
    assert_eq!(solids(&result, 8).len(), 1);
    assert!(result.log.has(DiagnosticKind::ReferenceCycle));
}

#[test]
fn test_unknown_entities_are_skipped() {
    let content = format!(
        "{}{}",
        PLACEMENT,
        r#"
#4=IFCPROPERTYSET('guid',$,'Pset',$,());
#5=IFCBLOCK(#2,1.,1.,1.);
#6=IFCSHAPEREPRESENTATION($,'Body','CSG',(#5,#4));
#7=IFCPRODUCTDEFINITIONSHAPE($,$,(#6));
#8=IFCBUILDINGELEMENTPROXY('guid',$,'Proxy',$,$,#3,#7,$,$);
"#
    );
    let result = import(&content);
    assert_eq!(solids(&result, 8).len(), 1);
    assert!(result
        .log
        .for_entity(4)
        .any(|d| d.kind == DiagnosticKind::SkippedEntity));
}

#[test]
fn test_partial_shell_keeps_valid_faces() {
    let mut step = Step::new();
    let shell = step.cube_shell([0.0, 0.0, 0.0], 1.0, &[1]);
    let brep = step.add(format!("IFCFACETEDBREP(#{})", shell));
    let product = step.product(&[brep]);

    let result = import(&step.content);
    let solids = solids(&result, product);
    assert_eq!(solids.len(), 1);
    assert_eq!(solids[0].faces.len(), 5);
    assert!(result
        .log
        .for_entity(shell)
        .any(|d| d.kind == DiagnosticKind::FaceCountShortfall));
    assert!(result.log.has(DiagnosticKind::InvalidFace));
    assert!(!result.log.has(DiagnosticKind::MeshFallback));
}

#[test]
fn test_shell_without_strict_faces_falls_back_to_mesh() {
    let mut step = Step::new();
    let shell = step.cube_shell([0.0, 0.0, 0.0], 1.0, &[0, 1, 2, 3, 4, 5]);
    let brep = step.add(format!("IFCFACETEDBREP(#{})", shell));
    let product = step.product(&[brep]);

    let result = import(&step.content);
    let objects = result.world_objects(result.product(product).unwrap());
    assert_eq!(objects.len(), 1);
    let GeometryObject::Mesh(mesh) = &objects[0] else {
        panic!("expected a mesh");
    };
    assert!(!mesh.is_empty());
    assert!(result
        .log
        .for_entity(shell)
        .any(|d| d.kind == DiagnosticKind::MeshFallback));
}

#[test]
fn test_mesh_fallback_can_be_disabled() {
    let mut step = Step::new();
    let shell = step.cube_shell([0.0, 0.0, 0.0], 1.0, &[0, 1, 2, 3, 4, 5]);
    let brep = step.add(format!("IFCFACETEDBREP(#{})", shell));
    let product = step.product(&[brep]);

    let options = ImportOptions {
        allow_mesh_fallback: false,
        ..ImportOptions::default()
    };
    let result = Importer::new(options, PolyhedralKernel::default()).import(&step.content);
    assert!(result.product(product).unwrap().geometry.is_empty());
    assert!(result.log.for_entity(brep).any(|d| d.kind == DiagnosticKind::NoGeometry));
}

#[test]
fn test_unresolvable_hole_keeps_face() {
    let mut step = Step::new();
    let shell = step.cube_shell_with_holes([0.0, 0.0, 0.0], 1.0, &[], &[2]);
    let brep = step.add(format!("IFCFACETEDBREP(#{})", shell));
    let product = step.product(&[brep]);

    let result = import(&step.content);
    let solids = solids(&result, product);
    assert_eq!(solids.len(), 1);
    assert_eq!(solids[0].faces.len(), 6);
    assert!(result.log.has(DiagnosticKind::DroppedHole));
    assert!(!result.log.has(DiagnosticKind::FaceCountShortfall));
    assert!(!result.log.has(DiagnosticKind::MeshFallback));
}

#[test]
fn test_void_shell_is_subtracted() {
    let mut step = Step::new();
    let outer = step.cube_shell([0.0, 0.0, 0.0], 4.0, &[]);
    let void = step.cube_shell([1.0, 1.0, 1.0], 1.0, &[]);
    let brep = step.add(format!("IFCFACETEDBREPWITHVOIDS(#{},(#{}))", outer, void));
    let product = step.product(&[brep]);

    let kernel = ScriptedKernel::new(|first, _, _, _| Some(first.clone()));
    let importer = Importer::new(ImportOptions::default(), kernel);
    let result = importer.import(&step.content);

    assert_eq!(solids(&result, product).len(), 1);
    assert!(!result.log.has(DiagnosticKind::BooleanFailed));
    let calls = importer.kernel().calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, BooleanOperator::Difference);
    assert_relative_eq!(calls[0].1, Point3::new(1.0, 1.0, 1.0), epsilon = 1e-9);
}

#[test]
fn test_failed_void_keeps_outer_shell() {
    let mut step = Step::new();
    let outer = step.cube_shell([0.0, 0.0, 0.0], 4.0, &[]);
    let void = step.cube_shell([1.0, 1.0, 1.0], 1.0, &[]);
    let brep = step.add(format!("IFCFACETEDBREPWITHVOIDS(#{},(#{}))", outer, void));
    let product = step.product(&[brep]);

    let kernel = ScriptedKernel::new(|_, _, _, _| None);
    let result = Importer::new(ImportOptions::default(), kernel).import(&step.content);

    let solids = solids(&result, product);
    assert_eq!(solids.len(), 1);
    let (min, max) = solids[0].bounds().unwrap();
    assert_relative_eq!(min, Point3::new(0.0, 0.0, 0.0), epsilon = 1e-9);
    assert_relative_eq!(max, Point3::new(4.0, 4.0, 4.0), epsilon = 1e-9);
    assert!(result
        .log
        .for_entity(void)
        .any(|d| d.kind == DiagnosticKind::BooleanFailed));
}

#[test]
fn test_polygonal_bounded_half_space() {
    let content = format!(
        "{}{}",
        PLACEMENT,
        r#"
#10=IFCPLANE(#2);
#11=IFCCARTESIANPOINT((0.,0.));
#12=IFCCARTESIANPOINT((2.,0.));
#13=IFCCARTESIANPOINT((2.,3.));
#14=IFCCARTESIANPOINT((0.,3.));
#15=IFCPOLYLINE((#11,#12,#13,#14,#11));
#16=IFCPOLYGONALBOUNDEDHALFSPACE(#10,.T.,#2,#15);
#17=IFCSHAPEREPRESENTATION($,'Body','CSG',(#16));
#18=IFCPRODUCTDEFINITIONSHAPE($,$,(#17));
#19=IFCBUILDINGELEMENTPROXY('a',$,'HalfSpace',$,$,#3,#18,$,$);
#20=IFCCARTESIANPOINT((-1.,-1.,-1.));
#21=IFCAXIS2PLACEMENT3D(#20,$,$);
#22=IFCBLOCK(#21,4.,4.,4.);
#23=IFCBOOLEANRESULT(.INTERSECTION.,#22,#16);
#24=IFCSHAPEREPRESENTATION($,'Body','CSG',(#23));
#25=IFCPRODUCTDEFINITIONSHAPE($,$,(#24));
#26=IFCBUILDINGELEMENTPROXY('b',$,'Clipped',$,$,#3,#25,$,$);
"#
    );
    let result = import(&content);

    // Material below the plane, limited to the boundary prism
    let extent = ImportOptions::default().half_space_extent;
    let (min, max) = product_bounds(&result, 19);
    assert_relative_eq!(min, Point3::new(0.0, 0.0, -extent), epsilon = 1e-6);
    assert_relative_eq!(max, Point3::new(2.0, 3.0, 0.0), epsilon = 1e-6);

    let (min, max) = product_bounds(&result, 26);
    assert_relative_eq!(min, Point3::new(0.0, 0.0, -1.0), epsilon = 1e-6);
    assert_relative_eq!(max, Point3::new(2.0, 3.0, 0.0), epsilon = 1e-6);
}

#[test]
fn test_degenerate_half_space_boundary_produces_nothing() {
    let content = format!(
        "{}{}",
        PLACEMENT,
        r#"
#10=IFCPLANE(#2);
#11=IFCCARTESIANPOINT((0.,0.));
#12=IFCCARTESIANPOINT((1.,0.));
#13=IFCCARTESIANPOINT((2.,0.));
#14=IFCPOLYLINE((#11,#12,#13,#11));
#15=IFCPOLYGONALBOUNDEDHALFSPACE(#10,.T.,#2,#14);
#16=IFCSHAPEREPRESENTATION($,'Body','CSG',(#15));
#17=IFCPRODUCTDEFINITIONSHAPE($,$,(#16));
#18=IFCBUILDINGELEMENTPROXY('a',$,'HalfSpace',$,$,#3,#17,$,$);
"#
    );
    let result = import(&content);

    assert!(result.product(18).unwrap().geometry.is_empty());
    assert!(result
        .log
        .for_entity(15)
        .any(|d| d.kind == DiagnosticKind::NoGeometry && d.severity == Severity::Error));
}

#[test]
fn test_revolution_of_profile_touching_axis() {
    let content = format!(
        "{}{}",
        PLACEMENT,
        r#"
#10=IFCCARTESIANPOINT((0.,0.));
#11=IFCCARTESIANPOINT((1.,0.));
#12=IFCCARTESIANPOINT((1.,2.));
#13=IFCCARTESIANPOINT((0.,2.));
#14=IFCPOLYLINE((#10,#11,#12,#13,#10));
#15=IFCARBITRARYCLOSEDPROFILEDEF(.AREA.,$,#14);
#16=IFCDIRECTION((0.,1.,0.));
#17=IFCAXIS1PLACEMENT(#1,#16);
#18=IFCREVOLVEDAREASOLID(#15,#2,#17,6.283185307179586);
#19=IFCSHAPEREPRESENTATION($,'Body','SweptSolid',(#18));
#20=IFCPRODUCTDEFINITIONSHAPE($,$,(#19));
#21=IFCBUILDINGELEMENTPROXY('a',$,'Cylinder',$,$,#3,#20,$,$);
"#
    );
    let result = import(&content);

    // Full turn about Y of a unit-wide strip starting on the axis
    let (min, max) = product_bounds(&result, 21);
    assert_relative_eq!(min, Point3::new(-1.0, 0.0, -1.0), epsilon = 1e-6);
    assert_relative_eq!(max, Point3::new(1.0, 2.0, 1.0), epsilon = 1e-6);
}

#[test]
fn test_surface_curve_sweep_follows_reference_plane() {
    let content = format!(
        "{}{}",
        PLACEMENT,
        r#"
#10=IFCRECTANGLEPROFILEDEF(.AREA.,$,$,2.,1.);
#11=IFCCARTESIANPOINT((10.,0.,0.));
#12=IFCPOLYLINE((#1,#11));
#13=IFCPLANE(#2);
#14=IFCSURFACECURVESWEPTAREASOLID(#10,$,#12,$,$,#13);
#15=IFCSHAPEREPRESENTATION($,'Body','AdvancedSweptSolid',(#14));
#16=IFCPRODUCTDEFINITIONSHAPE($,$,(#15));
#17=IFCBUILDINGELEMENTPROXY('a',$,'Sweep',$,$,#3,#16,$,$);
"#
    );
    let result = import(&content);

    // Profile Y follows the plane normal, profile X lies in the plane
    let (min, max) = product_bounds(&result, 17);
    assert_relative_eq!(min, Point3::new(0.0, -1.0, -0.5), epsilon = 1e-6);
    assert_relative_eq!(max, Point3::new(10.0, 1.0, 0.5), epsilon = 1e-6);
}

#[test]
fn test_sectioned_solid_between_stations() {
    let content = format!(
        "{}{}",
        PLACEMENT,
        r#"
#10=IFCRECTANGLEPROFILEDEF(.AREA.,$,$,2.,1.);
#11=IFCCARTESIANPOINT((10.,0.,0.));
#12=IFCPOLYLINE((#1,#11));
#13=IFCDISTANCEEXPRESSION(0.,$,1.,$,$);
#14=IFCDISTANCEEXPRESSION(10.,$,1.,$,$);
#15=IFCSECTIONEDSOLIDHORIZONTAL(#12,(#10,#10),(#13,#14));
#16=IFCSHAPEREPRESENTATION($,'Body','AdvancedSweptSolid',(#15));
#17=IFCPRODUCTDEFINITIONSHAPE($,$,(#16));
#18=IFCBUILDINGELEMENTPROXY('a',$,'Sectioned',$,$,#3,#17,$,$);
"#
    );
    let result = import(&content);

    // Sections raised by their vertical offset
    let (min, max) = product_bounds(&result, 18);
    assert_relative_eq!(min, Point3::new(0.0, -1.0, 0.5), epsilon = 1e-6);
    assert_relative_eq!(max, Point3::new(10.0, 1.0, 1.5), epsilon = 1e-6);
}

#[test]
fn test_extrusion_below_tolerance_is_rejected() {
    let content = format!(
        "{}{}",
        PLACEMENT,
        r#"
#4=IFCCARTESIANPOINT((0.,0.));
#5=IFCAXIS2PLACEMENT2D(#4,$);
#6=IFCRECTANGLEPROFILEDEF(.AREA.,$,#5,4.,2.);
#7=IFCDIRECTION((0.,0.,1.));
#8=IFCEXTRUDEDAREASOLID(#6,#2,#7,0.0005);
#9=IFCSHAPEREPRESENTATION($,'Body','SweptSolid',(#8));
#10=IFCPRODUCTDEFINITIONSHAPE($,$,(#9));
#11=IFCWALL('guid',$,'Wall',$,$,#3,#10,$,$);
"#
    );
    let result = import(&content);

    assert!(result.product(11).unwrap().geometry.is_empty());
    assert!(result
        .log
        .for_entity(8)
        .any(|d| d.kind == DiagnosticKind::NoGeometry && d.message.contains("tolerance")));
}

#[test]
fn test_body_suppresses_bounding_box() {
    let content = format!(
        "{}{}",
        PLACEMENT,
        r#"
#4=IFCBLOCK(#2,1.,1.,1.);
#5=IFCSHAPEREPRESENTATION($,'Body','CSG',(#4));
#6=IFCBOUNDINGBOX(#1,1.,1.,1.);
#7=IFCSHAPEREPRESENTATION($,'Box','BoundingBox',(#6));
#8=IFCBLOCK(#2,2.,2.,2.);
#9=IFCSHAPEREPRESENTATION($,'Body-FallBack','CSG',(#8));
#10=IFCPRODUCTDEFINITIONSHAPE($,$,(#7,#9,#5));
#11=IFCBUILDINGELEMENTPROXY('guid',$,'Proxy',$,$,#3,#10,$,$);
#12=IFCPRODUCTDEFINITIONSHAPE($,$,(#7));
#13=IFCBUILDINGELEMENTPROXY('guid',$,'BoxOnly',$,$,#3,#12,$,$);
"#
    );

    let representation_ids = |result: &ImportResult, product: u32| -> Vec<u32> {
        result
            .product(product)
            .unwrap()
            .geometry
            .iter()
            .map(|created| match created {
                CreatedGeometry::Direct {
                    representation_id, ..
                }
                | CreatedGeometry::Instance {
                    representation_id, ..
                } => *representation_id,
            })
            .collect()
    };

    let result = import(&content);
    assert_eq!(representation_ids(&result, 11), vec![5]);
    assert_eq!(representation_ids(&result, 13), vec![7]);

    let options = ImportOptions {
        always_import_bounding_boxes: true,
        ..ImportOptions::default()
    };
    let result = Importer::new(options, PolyhedralKernel::default()).import(&content);
    assert_eq!(representation_ids(&result, 11), vec![5, 7]);
}

const BOOLEAN_OPERANDS: &str = r#"
#10=IFCBLOCK(#2,1.,1.,1.);
#11=IFCCARTESIANPOINT((5.,0.,0.));
#12=IFCAXIS2PLACEMENT3D(#11,$,$);
#13=IFCBLOCK(#12,1.,1.,1.);
#14=IFCBOOLEANRESULT(.INTERSECTION.,#10,#13);
#15=IFCCARTESIANPOINT((0.,5.,0.));
#16=IFCAXIS2PLACEMENT3D(#15,$,$);
#17=IFCBLOCK(#16,2.,2.,2.);
"#;

#[test]
fn test_boolean_with_empty_first_operand() {
    let content = format!(
        "{}{}{}",
        PLACEMENT,
        BOOLEAN_OPERANDS,
        r#"
#20=IFCBOOLEANRESULT(.UNION.,#14,#17);
#21=IFCSHAPEREPRESENTATION($,'Body','CSG',(#20));
#22=IFCPRODUCTDEFINITIONSHAPE($,$,(#21));
#23=IFCBUILDINGELEMENTPROXY('guid',$,'Union',$,$,#3,#22,$,$);
#30=IFCBOOLEANRESULT(.DIFFERENCE.,#14,#17);
#31=IFCSHAPEREPRESENTATION($,'Body','CSG',(#30));
#32=IFCPRODUCTDEFINITIONSHAPE($,$,(#31));
#33=IFCBUILDINGELEMENTPROXY('guid',$,'Difference',$,$,#3,#32,$,$);
#40=IFCBOOLEANRESULT(.UNION.,#14,#14);
#41=IFCSHAPEREPRESENTATION($,'Body','CSG',(#40));
#42=IFCPRODUCTDEFINITIONSHAPE($,$,(#41));
#43=IFCBUILDINGELEMENTPROXY('guid',$,'Empty',$,$,#3,#42,$,$);
"#
    );
    // Disjoint blocks intersect to nothing
    let kernel = ScriptedKernel::new(|first, _, operator, _| match operator {
        BooleanOperator::Intersection => Some(Solid::new(Vec::new())),
        _ => Some(first.clone()),
    });
    let result = Importer::new(ImportOptions::default(), kernel).import(&content);

    let union = solids(&result, 23);
    assert_eq!(union.len(), 1);
    let (min, _) = union[0].bounds().unwrap();
    assert_relative_eq!(min, Point3::new(0.0, 5.0, 0.0), epsilon = 1e-9);

    assert!(result.product(33).unwrap().geometry.is_empty());
    assert!(result.product(43).unwrap().geometry.is_empty());
    assert!(!result.log.has(DiagnosticKind::BooleanFailed));
}

#[test]
fn test_unresolvable_second_operand_is_dropped() {
    let content = format!(
        "{}{}",
        PLACEMENT,
        r#"
#10=IFCBLOCK(#2,1.,1.,1.);
#11=IFCBLOCK(#2,-1.,1.,1.);
#12=IFCBOOLEANRESULT(.DIFFERENCE.,#10,#11);
#13=IFCSHAPEREPRESENTATION($,'Body','CSG',(#12));
#14=IFCPRODUCTDEFINITIONSHAPE($,$,(#13));
#15=IFCBUILDINGELEMENTPROXY('guid',$,'Proxy',$,$,#3,#14,$,$);
"#
    );
    let kernel = ScriptedKernel::new(|_, _, _, _| None);
    let result = Importer::new(ImportOptions::default(), kernel).import(&content);

    assert_eq!(solids(&result, 15).len(), 1);
    assert!(result
        .log
        .for_entity(12)
        .any(|d| d.kind == DiagnosticKind::DroppedOperand));
}

const CUT_BY_EXTRUSION: &str = r#"
#10=IFCBLOCK(#2,4.,4.,4.);
#11=IFCCARTESIANPOINT((2.,2.));
#12=IFCAXIS2PLACEMENT2D(#11,$);
#13=IFCRECTANGLEPROFILEDEF(.AREA.,$,#12,1.,1.);
#14=IFCDIRECTION((0.,0.,1.));
#15=IFCEXTRUDEDAREASOLID(#13,#2,#14,4.);
#16=IFCBOOLEANRESULT(.DIFFERENCE.,#10,#15);
#17=IFCSHAPEREPRESENTATION($,'Body','CSG',(#16));
#18=IFCPRODUCTDEFINITIONSHAPE($,$,(#17));
#19=IFCBUILDINGELEMENTPROXY('guid',$,'Proxy',$,$,#3,#18,$,$);
"#;

#[test]
fn test_boolean_retries_with_shifted_operand() {
    let content = format!("{}{}", PLACEMENT, CUT_BY_EXTRUSION);
    let kernel = ScriptedKernel::new(|first, _, _, attempt| (attempt > 0).then(|| first.clone()));
    let importer = Importer::new(ImportOptions::default(), kernel);
    let result = importer.import(&content);

    assert_eq!(solids(&result, 19).len(), 1);
    assert!(result
        .log
        .for_entity(16)
        .any(|d| d.kind == DiagnosticKind::BooleanRetry));

    let calls = importer.kernel().calls.borrow();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, BooleanOperator::Difference);
    assert_relative_eq!(calls[0].1, Point3::new(1.5, 1.5, 0.0), epsilon = 1e-9);
    // Nudged along the extrusion direction
    let shift = ImportOptions::default().boolean_shift_distance;
    assert_relative_eq!(calls[1].1, Point3::new(1.5, 1.5, shift), epsilon = 1e-9);
}

#[test]
fn test_boolean_gives_up_after_both_shift_directions() {
    let content = format!("{}{}", PLACEMENT, CUT_BY_EXTRUSION);
    let kernel = ScriptedKernel::new(|_, _, _, _| None);
    let importer = Importer::new(ImportOptions::default(), kernel);
    let result = importer.import(&content);

    assert!(result.product(19).unwrap().geometry.is_empty());
    assert!(result
        .log
        .for_entity(16)
        .any(|d| d.kind == DiagnosticKind::BooleanFailed));

    let calls = importer.kernel().calls.borrow();
    assert_eq!(calls.len(), 3);
    let shift = ImportOptions::default().boolean_shift_distance;
    assert_relative_eq!(calls[2].1.z, -shift, epsilon = 1e-9);
}

#[test]
fn test_failed_pair_leaves_sibling_solids() {
    let mut step = Step::new();
    let near = step.cube_shell([0.0, 0.0, 0.0], 1.0, &[]);
    let far = step.cube_shell([10.0, 0.0, 0.0], 1.0, &[]);
    let model = step.add(format!("IFCSHELLBASEDSURFACEMODEL((#{},#{}))", near, far));
    let placement = step.placement_at([0.0, 0.0, 0.0]);
    let block = step.add(format!("IFCBLOCK(#{},0.5,0.5,0.5)", placement));
    let boolean = step.add(format!("IFCBOOLEANRESULT(.DIFFERENCE.,#{},#{})", model, block));
    let product = step.product(&[boolean]);

    // Only pairs whose first solid lies near the origin succeed
    let kernel = ScriptedKernel::new(|first, _, _, _| {
        first
            .bounds()
            .filter(|(min, _)| min.x < 5.0)
            .map(|_| first.clone())
    });
    let result = Importer::new(ImportOptions::default(), kernel).import(&step.content);

    let solids = solids(&result, product);
    assert_eq!(solids.len(), 1);
    assert!(solids[0].bounds().unwrap().0.x < 5.0);
    assert_eq!(result.log.of_kind(DiagnosticKind::BooleanFailed).count(), 1);
}

const MAPPED: &str = r#"
#10=IFCBLOCK(#2,1.,1.,1.);
#11=IFCSHAPEREPRESENTATION($,'Body','CSG',(#10));
#12=IFCREPRESENTATIONMAP(#2,#11);
#13=IFCCARTESIANPOINT((5.,0.,0.));
#14=IFCCARTESIANTRANSFORMATIONOPERATOR3D($,$,#13,$,$);
#15=IFCMAPPEDITEM(#12,#14);
#16=IFCSHAPEREPRESENTATION($,'Body','MappedRepresentation',(#15));
#17=IFCPRODUCTDEFINITIONSHAPE($,$,(#16));
#18=IFCBUILDINGELEMENTPROXY('a',$,'Rigid',$,$,#3,#17,$,$);
#19=IFCBUILDINGELEMENTPROXY('b',$,'RigidAgain',$,$,#3,#17,$,$);
#20=IFCCARTESIANTRANSFORMATIONOPERATOR3DNONUNIFORM($,$,#1,1.,$,2.,1.);
#21=IFCMAPPEDITEM(#12,#20);
#22=IFCSHAPEREPRESENTATION($,'Body','MappedRepresentation',(#21));
#23=IFCPRODUCTDEFINITIONSHAPE($,$,(#22));
#24=IFCBUILDINGELEMENTPROXY('c',$,'Stretched',$,$,#3,#23,$,$);
"#;

#[test]
fn test_rigid_mapped_items_share_a_definition() {
    let content = format!("{}{}", PLACEMENT, MAPPED);
    let result = import(&content);

    for product in [18, 19] {
        let geometry = &result.product(product).unwrap().geometry;
        assert_eq!(geometry.len(), 1);
        let CreatedGeometry::Instance {
            definition_id,
            transform,
            ..
        } = &geometry[0]
        else {
            panic!("expected an instance");
        };
        assert_eq!(*definition_id, 12);
        assert_relative_eq!(
            *transform,
            Matrix4::new_translation(&Vector3::new(5.0, 0.0, 0.0)),
            epsilon = 1e-12
        );
    }
    assert_eq!(result.shared_definitions.len(), 1);
    assert_eq!(result.shared_definitions[&12].geometry.len(), 1);

    let placed = solids(&result, 18);
    let (min, max) = placed[0].bounds().unwrap();
    assert_relative_eq!(min, Point3::new(5.0, 0.0, 0.0), epsilon = 1e-9);
    assert_relative_eq!(max, Point3::new(6.0, 1.0, 1.0), epsilon = 1e-9);
}

#[test]
fn test_non_uniform_mapped_item_is_baked() {
    let content = format!("{}{}", PLACEMENT, MAPPED);
    let result = import(&content);

    let geometry = &result.product(24).unwrap().geometry;
    assert_eq!(geometry.len(), 1);
    assert!(!geometry[0].is_instance());
    let (_, max) = geometry[0]
        .object()
        .and_then(GeometryObject::as_solid)
        .and_then(Solid::bounds)
        .unwrap();
    assert_relative_eq!(max, Point3::new(1.0, 2.0, 1.0), epsilon = 1e-9);
}

#[test]
fn test_instancing_can_be_disabled() {
    let content = format!("{}{}", PLACEMENT, MAPPED);
    let options = ImportOptions {
        use_instancing: false,
        ..ImportOptions::default()
    };
    let result = Importer::new(options, PolyhedralKernel::default()).import(&content);
    assert!(result.shared_definitions.is_empty());
    assert!(result
        .products
        .iter()
        .flat_map(|p| &p.geometry)
        .all(|created| !created.is_instance()));
}

const WALL_WITH_OPENING: &str = r#"
#4=IFCCARTESIANPOINT((0.,0.));
#5=IFCAXIS2PLACEMENT2D(#4,$);
#6=IFCRECTANGLEPROFILEDEF(.AREA.,$,#5,4.,0.2);
#7=IFCDIRECTION((0.,0.,1.));
#8=IFCEXTRUDEDAREASOLID(#6,#2,#7,3.);
#9=IFCSHAPEREPRESENTATION($,'Body','SweptSolid',(#8));
#10=IFCPRODUCTDEFINITIONSHAPE($,$,(#9));
#11=IFCWALL('wall',$,'Wall',$,$,#3,#10,$,$);
#20=IFCCARTESIANPOINT((0.,0.,1.));
#21=IFCAXIS2PLACEMENT3D(#20,$,$);
#22=IFCLOCALPLACEMENT(#3,#21);
#23=IFCRECTANGLEPROFILEDEF(.AREA.,$,#5,1.,1.);
#24=IFCEXTRUDEDAREASOLID(#23,#2,#7,1.);
#25=IFCSHAPEREPRESENTATION($,'Body','SweptSolid',(#24));
#26=IFCPRODUCTDEFINITIONSHAPE($,$,(#25));
#27=IFCOPENINGELEMENT('opening',$,'Opening',$,$,#22,#26,$,$);
#28=IFCRELVOIDSELEMENT('rel',$,$,$,#11,#27);
"#;

#[test]
fn test_opening_is_cut_from_host() {
    let content = format!("{}{}", PLACEMENT, WALL_WITH_OPENING);
    let kernel = ScriptedKernel::new(|first, _, _, _| Some(first.clone()));
    let importer = Importer::new(ImportOptions::default(), kernel);
    let result = importer.import(&content);

    assert!(result.product(27).is_none());
    assert_eq!(solids(&result, 11).len(), 1);
    assert!(!result.log.has(DiagnosticKind::VoidNotCut));

    let calls = importer.kernel().calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, BooleanOperator::Difference);
    assert_relative_eq!(calls[0].1, Point3::new(-0.5, -0.5, 1.0), epsilon = 1e-9);
}

#[test]
fn test_failed_cut_keeps_host() {
    let content = format!("{}{}", PLACEMENT, WALL_WITH_OPENING);
    let kernel = ScriptedKernel::new(|_, _, _, _| None);
    let importer = Importer::new(ImportOptions::default(), kernel);
    let result = importer.import(&content);

    assert_eq!(solids(&result, 11).len(), 1);
    assert!(result
        .log
        .for_entity(11)
        .any(|d| d.kind == DiagnosticKind::VoidNotCut));
    // Unshifted, then both directions along the opening's extrusion
    assert_eq!(importer.kernel().calls.borrow().len(), 3);
}
