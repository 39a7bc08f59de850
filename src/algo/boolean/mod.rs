//! Boolean operations on closed triangle meshes.
//!
//! Both inputs are corefined so that their intersection curve becomes a
//! chain of edges in each, every face is classified as inside, outside or on
//! the other surface, and the faces that bound the result are welded
//! together along the seam.
//!
//! # Example
//!
//! ```
//! use surfmesh::prelude::*;
//! use surfmesh::algo::boolean::{union, BooleanOptions};
//!
//! let a: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 1).unwrap();
//! let b: HalfEdgeMesh = make_cube(&Point3::new(0.5, 0.25, 0.3), &Point3::new(1.5, 1.25, 1.3), 1).unwrap();
//!
//! let merged = union(&a, &b, &BooleanOptions::default()).unwrap();
//! assert!(merged.is_closed());
//! assert!((merged.volume() - 1.7375).abs() < 1e-9);
//! ```

mod classify;
mod corefine;

use std::collections::HashMap;

use nalgebra::Point3;

use crate::algo::query::{MeshBvh, PointGrid, DEFAULT_CONTAINMENT_RAYS};
use crate::algo::repair::num_self_intersections;
use crate::error::{MeshError, Result};
use crate::mesh::{build_compacted, to_polygons, FaceId, HalfEdgeMesh, MeshIndex};

pub use classify::FaceClass;

use classify::classify_faces;
use corefine::corefine;

/// Which Boolean operation to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    /// Points inside either mesh.
    Union,
    /// Points inside both meshes.
    Intersection,
    /// Points inside the first mesh and outside the second.
    Difference,
}

/// Options for Boolean operations.
#[derive(Debug, Clone)]
pub struct BooleanOptions {
    /// Distance below which points are snapped together, relative to the
    /// diagonal of the combined bounding box.
    pub snap_tolerance: f64,

    /// Rays cast per inside/outside decision.
    pub rays: usize,
}

impl Default for BooleanOptions {
    fn default() -> Self {
        Self {
            snap_tolerance: 1e-9,
            rays: DEFAULT_CONTAINMENT_RAYS,
        }
    }
}

impl BooleanOptions {
    /// Set the relative snapping tolerance.
    pub fn with_snap_tolerance(mut self, tolerance: f64) -> Self {
        self.snap_tolerance = tolerance;
        self
    }

    /// Set the number of classification rays.
    pub fn with_rays(mut self, rays: usize) -> Self {
        self.rays = rays;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.snap_tolerance.is_finite() && self.snap_tolerance > 0.0 && self.snap_tolerance < 1.0) {
            return Err(MeshError::invalid_param(
                "snap_tolerance",
                self.snap_tolerance,
                "must lie strictly between 0 and 1",
            ));
        }
        if self.rays == 0 {
            return Err(MeshError::invalid_param("rays", self.rays, "must be at least 1"));
        }
        Ok(())
    }
}

/// Union of two closed meshes.
pub fn union<I: MeshIndex>(
    a: &HalfEdgeMesh<I>,
    b: &HalfEdgeMesh<I>,
    options: &BooleanOptions,
) -> Result<HalfEdgeMesh<I>> {
    boolean(a, b, BooleanOp::Union, options)
}

/// Intersection of two closed meshes.
pub fn intersection<I: MeshIndex>(
    a: &HalfEdgeMesh<I>,
    b: &HalfEdgeMesh<I>,
    options: &BooleanOptions,
) -> Result<HalfEdgeMesh<I>> {
    boolean(a, b, BooleanOp::Intersection, options)
}

/// `a` minus `b`.
pub fn difference<I: MeshIndex>(
    a: &HalfEdgeMesh<I>,
    b: &HalfEdgeMesh<I>,
    options: &BooleanOptions,
) -> Result<HalfEdgeMesh<I>> {
    boolean(a, b, BooleanOp::Difference, options)
}

/// Run a Boolean operation and return the result as a new mesh.
///
/// # Errors
///
/// - [`MeshError::InvalidParameter`] for bad options.
/// - [`MeshError::NonManifoldInput`] when either input is not a closed,
///   valid triangle mesh. Nothing is computed in that case.
/// - [`MeshError::DegenerateGeometry`] when the result is not a closed
///   manifold or intersects itself.
///
/// An empty result (for example the intersection of disjoint meshes) is an
/// empty mesh, not an error.
pub fn boolean<I: MeshIndex>(
    a: &HalfEdgeMesh<I>,
    b: &HalfEdgeMesh<I>,
    op: BooleanOp,
    options: &BooleanOptions,
) -> Result<HalfEdgeMesh<I>> {
    options.validate()?;
    check_input(a, "first")?;
    check_input(b, "second")?;

    let diagonal = match (a.bounding_box(), b.bounding_box()) {
        (Some(x), Some(y)) => x.union(&y).diagonal(),
        _ => return Err(MeshError::EmptyMesh),
    };
    let tolerance = options.snap_tolerance * diagonal;

    let mut refined_a = a.clone();
    let mut refined_b = b.clone();
    corefine(&mut refined_a, &mut refined_b, tolerance)?;

    let a_classes = classify_faces(&refined_a, b, &MeshBvh::new(b), tolerance, options.rays);
    let b_classes = classify_faces(&refined_b, a, &MeshBvh::new(a), tolerance, options.rays);

    let result = assemble(
        (&refined_a, &a_classes),
        (&refined_b, &b_classes),
        op,
        tolerance,
    )?;
    if result.is_empty() {
        log::debug!("{:?} is empty", op);
        return Ok(result);
    }
    if !(result.is_valid() && result.is_closed()) {
        return Err(MeshError::degenerate(format!("{op:?} result is not a closed manifold")));
    }
    let crossings = num_self_intersections(&result);
    if crossings > 0 {
        return Err(MeshError::degenerate(format!(
            "{op:?} result has {crossings} self-intersecting face pairs"
        )));
    }
    log::debug!(
        "{:?}: {} vertices, {} faces",
        op,
        result.num_vertices(),
        result.num_faces()
    );
    Ok(result)
}

fn check_input<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, which: &str) -> Result<()> {
    if mesh.num_faces() == 0 {
        return Err(MeshError::non_manifold_input(format!("{which} mesh has no faces")));
    }
    if !mesh.is_triangle_mesh() {
        return Err(MeshError::non_manifold_input(format!("{which} mesh is not triangulated")));
    }
    if !(mesh.is_valid() && mesh.is_closed()) {
        return Err(MeshError::non_manifold_input(format!("{which} mesh is not closed")));
    }
    Ok(())
}

/// Whether a face with the given class bounds the result, and if so whether
/// it has to be reversed.
fn select(op: BooleanOp, from_first: bool, class: FaceClass) -> Option<bool> {
    use FaceClass::*;
    match (op, from_first, class) {
        (BooleanOp::Union, true, Outside | OnSame) | (BooleanOp::Union, false, Outside) => Some(false),
        (BooleanOp::Intersection, true, Inside | OnSame) | (BooleanOp::Intersection, false, Inside) => {
            Some(false)
        }
        (BooleanOp::Difference, true, Outside | OnOpposite) => Some(false),
        (BooleanOp::Difference, false, Inside) => Some(true),
        _ => None,
    }
}

type Classified<'a, I> = (&'a HalfEdgeMesh<I>, &'a HashMap<FaceId<I>, FaceClass>);

/// Collect the selected faces of both meshes, weld the seam and rebuild.
fn assemble<I: MeshIndex>(
    (a, a_classes): Classified<'_, I>,
    (b, b_classes): Classified<'_, I>,
    op: BooleanOp,
    tolerance: f64,
) -> Result<HalfEdgeMesh<I>> {
    let (mut positions, a_polygons) = to_polygons(a);
    let (b_positions, b_polygons) = to_polygons(b);

    // Every vertex of b within the tolerance of a vertex of a becomes that vertex.
    let grid = PointGrid::new(positions.clone(), tolerance);
    let b_index: Vec<usize> = b_positions
        .iter()
        .map(|p| match grid.within(p, tolerance).first() {
            Some(&i) => i,
            None => {
                positions.push(*p);
                positions.len() - 1
            }
        })
        .collect();

    let mut faces: Vec<Vec<usize>> = Vec::new();
    for (f, polygon) in a.face_ids().zip(a_polygons) {
        if let Some(reverse) = a_classes.get(&f).and_then(|&c| select(op, true, c)) {
            faces.push(oriented(polygon, reverse));
        }
    }
    for (f, polygon) in b.face_ids().zip(b_polygons) {
        if let Some(reverse) = b_classes.get(&f).and_then(|&c| select(op, false, c)) {
            let polygon: Vec<usize> = polygon.into_iter().map(|i| b_index[i]).collect();
            faces.push(oriented(polygon, reverse));
        }
    }
    let before = faces.len();
    faces.retain(|polygon| distinct(polygon) && !is_sliver(&positions, polygon, tolerance));
    if faces.len() < before {
        log::debug!("dropped {} collapsed faces at the seam", before - faces.len());
    }

    build_compacted(&positions, &faces).map_err(|err| match err {
        MeshError::NonManifoldInput { details } => {
            MeshError::degenerate(format!("{op:?} result is not manifold: {details}"))
        }
        other => other,
    })
}

fn oriented(mut polygon: Vec<usize>, reverse: bool) -> Vec<usize> {
    if reverse {
        polygon.reverse();
    }
    polygon
}

fn distinct(polygon: &[usize]) -> bool {
    polygon
        .iter()
        .enumerate()
        .all(|(k, i)| !polygon[k + 1..].contains(i))
}

/// A triangle whose corners are collinear within the tolerance.
fn is_sliver(positions: &[Point3<f64>], polygon: &[usize], tolerance: f64) -> bool {
    let [a, b, c] = match polygon {
        &[a, b, c] => [positions[a], positions[b], positions[c]],
        _ => return false,
    };
    let longest = (b - a).norm().max((c - b).norm()).max((a - c).norm());
    longest > 0.0 && (b - a).cross(&(c - a)).norm() / longest <= tolerance * 1e-3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::primitives::{make_cube, make_cylinder, make_icosahedron, make_sphere};
    use approx::assert_relative_eq;
    use std::f64::consts::{PI, TAU};

    fn cube(lo: [f64; 3], hi: [f64; 3]) -> HalfEdgeMesh {
        make_cube(&Point3::from(lo), &Point3::from(hi), 1).unwrap()
    }

    fn overlapping_boxes() -> (HalfEdgeMesh, HalfEdgeMesh) {
        (cube([0.0; 3], [1.0; 3]), cube([0.5, 0.25, 0.3], [1.5, 1.25, 1.3]))
    }

    fn check_closed(mesh: &HalfEdgeMesh) {
        assert!(mesh.is_valid());
        assert!(mesh.is_closed());
        assert!(mesh.is_triangle_mesh());
        assert_eq!(num_self_intersections(mesh), 0);
    }

    #[test]
    fn test_union_of_boxes() {
        let (a, b) = overlapping_boxes();
        let result = union(&a, &b, &BooleanOptions::default()).unwrap();

        check_closed(&result);
        assert_relative_eq!(result.volume(), 2.0 - 0.2625, epsilon = 1e-9);
        assert!(result.volume() >= a.volume().max(b.volume()));
        assert_eq!(result.euler_characteristic(), 2);
    }

    #[test]
    fn test_intersection_of_boxes() {
        let (a, b) = overlapping_boxes();
        let result = intersection(&a, &b, &BooleanOptions::default()).unwrap();

        check_closed(&result);
        assert_relative_eq!(result.volume(), 0.5 * 0.75 * 0.7, epsilon = 1e-9);
        assert!(result.volume() <= a.volume().min(b.volume()));
        assert_relative_eq!(crate::algo::query::span(&result, 0).unwrap().0, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_difference_of_boxes() {
        let (a, b) = overlapping_boxes();
        let result = difference(&a, &b, &BooleanOptions::default()).unwrap();

        check_closed(&result);
        assert_relative_eq!(result.volume(), 1.0 - 0.2625, epsilon = 1e-9);
    }

    #[test]
    fn test_inclusion_exclusion_with_icosahedron() {
        let a = cube([0.0; 3], [1.0; 3]);
        let b: HalfEdgeMesh = make_icosahedron(&Point3::new(1.1, 0.45, 0.52), 0.6).unwrap();
        let options = BooleanOptions::default();

        let joined = union(&a, &b, &options).unwrap();
        let common = intersection(&a, &b, &options).unwrap();
        let cut = difference(&a, &b, &options).unwrap();
        for mesh in [&joined, &common, &cut] {
            check_closed(mesh);
        }

        assert!(joined.volume() >= a.volume().max(b.volume()));
        assert!(common.volume() <= a.volume().min(b.volume()));
        assert!(common.volume() > 0.0);
        assert_relative_eq!(joined.volume() + common.volume(), a.volume() + b.volume(), epsilon = 1e-9);
        assert_relative_eq!(cut.volume() + common.volume(), a.volume(), epsilon = 1e-9);
    }

    fn overlapping_spheres() -> (HalfEdgeMesh, HalfEdgeMesh) {
        (
            make_sphere(&Point3::origin(), 1.0, 16).unwrap(),
            make_sphere(&Point3::new(0.7, 0.2, 0.1), 1.0, 16).unwrap(),
        )
    }

    #[test]
    fn test_union_of_spheres() {
        let (a, b) = overlapping_spheres();
        let joined = union(&a, &b, &BooleanOptions::default()).unwrap();

        check_closed(&joined);
        assert_eq!(joined.euler_characteristic(), 2);
        assert!(joined.volume() > a.volume().max(b.volume()));
        assert!(joined.volume() < a.volume() + b.volume());
    }

    #[test]
    fn test_intersection_of_spheres() {
        let (a, b) = overlapping_spheres();
        let options = BooleanOptions::default();
        let common = intersection(&a, &b, &options).unwrap();
        let joined = union(&a, &b, &options).unwrap();

        check_closed(&common);
        assert_eq!(common.euler_characteristic(), 2);
        // Lens of two unit balls whose centres are d apart.
        let d: f64 = Point3::new(0.7, 0.2, 0.1).coords.norm();
        let lens = PI * (4.0 + d) * (2.0 - d).powi(2) / 12.0;
        assert!((common.volume() - lens).abs() < 0.15 * lens);
        assert!(common.volume() < a.volume().min(b.volume()));
        assert_relative_eq!(joined.volume() + common.volume(), a.volume() + b.volume(), epsilon = 1e-9);
    }

    #[test]
    fn test_cylinder_through_cube() {
        let a = cube([0.0; 3], [1.0; 3]);
        let (p0, p1, r, n) = (Point3::new(0.3, 0.4, -0.6), Point3::new(0.6, 0.55, 1.7), 0.2, 16);
        let b: HalfEdgeMesh = make_cylinder(&p0, &p1, r, n, None).unwrap();
        let options = BooleanOptions::default();

        let joined = union(&a, &b, &options).unwrap();
        let common = intersection(&a, &b, &options).unwrap();
        let drilled = difference(&a, &b, &options).unwrap();
        for mesh in [&joined, &common, &drilled] {
            check_closed(mesh);
        }

        // The part inside the cube is a slanted prism between z = 0 and z = 1.
        let axis = p1 - p0;
        let section = 0.5 * n as f64 * r * r * (TAU / n as f64).sin();
        let prism = section * axis.norm() / axis.z;
        assert_relative_eq!(common.volume(), prism, epsilon = 1e-9);
        assert_relative_eq!(drilled.volume(), 1.0 - prism, epsilon = 1e-9);
        assert_relative_eq!(joined.volume(), 1.0 + b.volume() - prism, epsilon = 1e-9);
        // Drilling through leaves a handle.
        assert_eq!(drilled.euler_characteristic(), 0);
        assert_eq!(common.euler_characteristic(), 2);
    }

    #[test]
    fn test_stacked_boxes_share_a_face() {
        let a = cube([0.0; 3], [1.0; 3]);
        let b = cube([0.0, 0.0, 1.0], [1.0, 1.0, 2.0]);
        let options = BooleanOptions::default();

        let joined = union(&a, &b, &options).unwrap();
        check_closed(&joined);
        assert_relative_eq!(joined.volume(), 2.0, epsilon = 1e-9);

        assert!(intersection(&a, &b, &options).unwrap().is_empty());

        let cut = difference(&a, &b, &options).unwrap();
        check_closed(&cut);
        assert_relative_eq!(cut.volume(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_disjoint_and_nested() {
        let a = cube([0.0; 3], [1.0; 3]);
        let far = cube([3.0; 3], [4.0; 3]);
        let inner = cube([0.25; 3], [0.75; 3]);
        let options = BooleanOptions::default();

        let both = union(&a, &far, &options).unwrap();
        assert_eq!(both.connected_components().len(), 2);
        assert_relative_eq!(both.volume(), 2.0, epsilon = 1e-12);
        assert!(intersection(&a, &far, &options).unwrap().is_empty());

        assert_relative_eq!(intersection(&a, &inner, &options).unwrap().volume(), 0.125, epsilon = 1e-12);
        assert_relative_eq!(union(&a, &inner, &options).unwrap().volume(), 1.0, epsilon = 1e-12);
        // A hollow cube: the inner surface is reversed.
        let hollow = difference(&a, &inner, &options).unwrap();
        assert_eq!(hollow.connected_components().len(), 2);
        assert_relative_eq!(hollow.volume(), 0.875, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_open_input() {
        let a = cube([0.0; 3], [1.0; 3]);
        let (vertices, mut faces) = to_polygons(&a);
        faces.pop();
        let open: HalfEdgeMesh = crate::mesh::build_from_polygons(&vertices, &faces).unwrap();

        assert!(matches!(
            union(&a, &open, &BooleanOptions::default()),
            Err(MeshError::NonManifoldInput { .. })
        ));
        assert!(matches!(
            union(&a, &a, &BooleanOptions::default().with_rays(0)),
            Err(MeshError::InvalidParameter { .. })
        ));
    }
}
