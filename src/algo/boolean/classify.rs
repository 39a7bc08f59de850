//! Inside/outside classification of corefined faces.

use std::collections::{HashMap, HashSet};

use crate::algo::query::MeshBvh;
use crate::mesh::{FaceId, HalfEdgeMesh, MeshIndex, VertexId};

use super::corefine::vertices_on;

/// Where a face of one mesh lies relative to the other mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaceClass {
    /// Strictly inside the other surface.
    Inside,
    /// Strictly outside the other surface.
    Outside,
    /// On the other surface, both normals pointing the same way.
    OnSame,
    /// On the other surface, normals pointing opposite ways.
    OnOpposite,
}

/// Classify every face of the corefined `mesh` against `other`.
///
/// Faces are grouped into patches that are connected across every edge
/// except those lying on `other`; the seam separates patches. Each patch is
/// classified once by ray parity from the face centroid farthest from
/// `other`. A face whose corners and centroid all lie on `other` is "on" it
/// and compares its normal with the nearest face of `other`.
pub(crate) fn classify_faces<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    other: &HalfEdgeMesh<I>,
    other_bvh: &MeshBvh<I>,
    tolerance: f64,
    rays: usize,
) -> HashMap<FaceId<I>, FaceClass> {
    let on: HashSet<VertexId<I>> = vertices_on(mesh, other_bvh, tolerance);
    let mut classes: HashMap<FaceId<I>, FaceClass> = HashMap::with_capacity(mesh.num_faces());

    for f in mesh.face_ids() {
        if !mesh.face_vertices(f).all(|v| on.contains(&v)) {
            continue;
        }
        let centroid = mesh.face_centroid(f);
        if other_bvh
            .closest_point(&centroid)
            .is_some_and(|hit| hit.distance <= tolerance)
        {
            classes.insert(f, on_class(mesh, other, other_bvh, f));
        }
    }

    let mut patches = 0;
    for seed in mesh.face_ids() {
        if classes.contains_key(&seed) {
            continue;
        }
        let patch = flood_patch(mesh, seed, &on, other_bvh, tolerance, &classes);
        let representative = patch
            .iter()
            .map(|&f| {
                let c = mesh.face_centroid(f);
                let d = other_bvh.closest_point(&c).map_or(f64::INFINITY, |hit| hit.distance);
                (d, f)
            })
            .max_by(|x, y| x.0.total_cmp(&y.0))
            .map(|(_, f)| f)
            .unwrap_or(seed);

        let class = if other_bvh.contains(&mesh.face_centroid(representative), rays) {
            FaceClass::Inside
        } else {
            FaceClass::Outside
        };
        for f in patch {
            classes.insert(f, class);
        }
        patches += 1;
    }
    log::debug!("classified {} faces in {} patches", classes.len(), patches);
    classes
}

fn on_class<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    other: &HalfEdgeMesh<I>,
    other_bvh: &MeshBvh<I>,
    f: FaceId<I>,
) -> FaceClass {
    let normal = mesh.face_area_vector(f);
    let facing = other_bvh
        .closest_point(&mesh.face_centroid(f))
        .map_or(0.0, |hit| normal.dot(&other.face_area_vector(hit.face)));
    if facing >= 0.0 {
        FaceClass::OnSame
    } else {
        FaceClass::OnOpposite
    }
}

/// Faces reachable from `seed` without crossing an edge that lies on the
/// other surface: both end points and the midpoint within `tolerance`.
fn flood_patch<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    seed: FaceId<I>,
    on: &HashSet<VertexId<I>>,
    other_bvh: &MeshBvh<I>,
    tolerance: f64,
    classified: &HashMap<FaceId<I>, FaceClass>,
) -> Vec<FaceId<I>> {
    let mut patch = vec![seed];
    let mut seen: HashSet<FaceId<I>> = HashSet::from([seed]);
    let mut next = 0;
    while next < patch.len() {
        let f = patch[next];
        next += 1;
        for h in mesh.face_halfedges(f) {
            if on.contains(&mesh.origin(h))
                && on.contains(&mesh.target(h))
                && other_bvh
                    .closest_point(&mesh.edge_midpoint(h))
                    .is_some_and(|hit| hit.distance <= tolerance)
            {
                continue;
            }
            let twin = mesh.twin(h);
            if mesh.is_boundary_halfedge(twin) {
                continue;
            }
            let g = mesh.face_of(twin);
            if !classified.contains_key(&g) && seen.insert(g) {
                patch.push(g);
            }
        }
    }
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::boolean::corefine::corefine;
    use crate::algo::primitives::make_cube;
    use nalgebra::Point3;

    fn cube(lo: [f64; 3], hi: [f64; 3]) -> HalfEdgeMesh {
        make_cube(&Point3::from(lo), &Point3::from(hi), 1).unwrap()
    }

    #[test]
    fn test_disjoint_faces_outside() {
        let a = cube([0.0; 3], [1.0; 3]);
        let b = cube([2.0; 3], [3.0; 3]);
        let classes = classify_faces(&a, &b, &MeshBvh::new(&b), 1e-9, 5);

        assert_eq!(classes.len(), 12);
        assert!(classes.values().all(|&c| c == FaceClass::Outside));
    }

    #[test]
    fn test_nested_faces_inside() {
        let a = cube([0.25; 3], [0.75; 3]);
        let b = cube([0.0; 3], [1.0; 3]);
        let classes = classify_faces(&a, &b, &MeshBvh::new(&b), 1e-9, 5);
        assert!(classes.values().all(|&c| c == FaceClass::Inside));
    }

    #[test]
    fn test_overlapping_cubes_split_areas() {
        let mut a = cube([0.0; 3], [1.0; 3]);
        let mut b = cube([0.5, 0.25, 0.3], [1.5, 1.25, 1.3]);
        let (a0, b0) = (a.clone(), b.clone());
        corefine(&mut a, &mut b, 1e-9).unwrap();

        let classes = classify_faces(&a, &b0, &MeshBvh::new(&b0), 1e-9, 5);
        let inside_area: f64 = classes
            .iter()
            .filter(|(_, &c)| c == FaceClass::Inside)
            .map(|(&f, _)| a.face_area(f))
            .sum();
        // The part of the unit cube inside the other box: three rectangles
        // of the faces x = 1, y = 1, z = 1.
        let expected = 0.75 * 0.7 + 0.5 * 0.7 + 0.5 * 0.75;
        assert!((inside_area - expected).abs() < 1e-9);
        assert!(classes.values().all(|&c| c != FaceClass::OnSame && c != FaceClass::OnOpposite));
        assert!((a.surface_area() - a0.surface_area()).abs() < 1e-9);
    }

    #[test]
    fn test_shared_face_is_on() {
        // The second box sits on top of the first, sharing part of z = 1.
        let a = cube([0.0; 3], [1.0; 3]);
        let b = cube([0.0, 0.0, 1.0], [1.0, 1.0, 2.0]);
        let classes = classify_faces(&a, &b, &MeshBvh::new(&b), 1e-9, 5);

        let top: Vec<FaceClass> = a
            .face_ids()
            .filter(|&f| a.face_centroid(f).z > 1.0 - 1e-12)
            .map(|f| classes[&f])
            .collect();
        assert_eq!(top, vec![FaceClass::OnOpposite; 2]);
    }
}
