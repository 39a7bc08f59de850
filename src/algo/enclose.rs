//! Enclosure repairs between two surfaces.
//!
//! These adjust vertex positions so one surface ends up strictly inside, or
//! strictly apart from, another. None of them is guaranteed to converge:
//! each reports how many vertices violated the condition and callers run
//! them again under their own iteration cap.

use std::collections::HashSet;

use nalgebra::Point3;

use crate::algo::query::{MeshBvh, DEFAULT_CONTAINMENT_RAYS};
use crate::algo::smooth::{smooth_taubin_region, SmoothOptions};
use crate::mesh::{HalfEdgeMesh, MeshIndex, VertexId};

fn shortest_incident_edge<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>) -> f64 {
    mesh.vertex_halfedges(v)
        .map(|h| mesh.edge_length(h))
        .fold(f64::INFINITY, f64::min)
}

/// Move each listed vertex against its normal by `offset` times its shortest
/// incident edge. Normals are taken before any vertex moves.
fn push_inward<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, vertices: &[VertexId<I>], offset: f64) {
    let targets: Vec<(VertexId<I>, Point3<f64>)> = vertices
        .iter()
        .filter_map(|&v| {
            let shortest = shortest_incident_edge(mesh, v);
            shortest.is_finite().then(|| {
                (v, mesh.position(v) - mesh.vertex_normal(v) * (offset * shortest))
            })
        })
        .collect();
    for (v, p) in targets {
        mesh.set_position(v, p);
    }
}

fn vertices_outside<I: MeshIndex, J: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    other: &MeshBvh<J>,
) -> Vec<VertexId<I>> {
    mesh.vertex_ids()
        .filter(|&v| !mesh.is_isolated(v))
        .filter(|&v| !other.contains(mesh.position(v), DEFAULT_CONTAINMENT_RAYS))
        .collect()
}

fn vertices_inside<I: MeshIndex, J: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    other: &MeshBvh<J>,
) -> Vec<VertexId<I>> {
    mesh.vertex_ids()
        .filter(|&v| !mesh.is_isolated(v))
        .filter(|&v| other.contains(mesh.position(v), DEFAULT_CONTAINMENT_RAYS))
        .collect()
}

/// Pull the vertices of `mesh` that lie outside `other` inward.
///
/// Each offending vertex moves against its normal by `offset` times its
/// shortest incident edge. Returns the number of vertices that were outside
/// before the move.
pub fn strictly_inside<I: MeshIndex, J: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    other: &HalfEdgeMesh<J>,
    offset: f64,
) -> usize {
    let bvh = MeshBvh::new(other);
    let outside = vertices_outside(mesh, &bvh);
    push_inward(mesh, &outside, offset);
    log::debug!("{} vertices were outside the enclosing surface", outside.len());
    outside.len()
}

/// Like [`strictly_inside`], but a vertex closer to `other` than its shortest
/// incident edge also counts as a violation.
pub fn separate_enclosed_surface<I: MeshIndex, J: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    other: &HalfEdgeMesh<J>,
    offset: f64,
) -> usize {
    let bvh = MeshBvh::new(other);
    let violating: Vec<VertexId<I>> = mesh
        .vertex_ids()
        .filter(|&v| !mesh.is_isolated(v))
        .filter(|&v| {
            let p = mesh.position(v);
            if !bvh.contains(p, DEFAULT_CONTAINMENT_RAYS) {
                return true;
            }
            bvh.closest_point(p)
                .is_some_and(|hit| hit.distance < shortest_incident_edge(mesh, v))
        })
        .collect();
    push_inward(mesh, &violating, offset);
    log::debug!("{} vertices too close to or outside the enclosing surface", violating.len());
    violating.len()
}

/// Pull two overlapping closed surfaces apart.
///
/// Each round, the vertices of either surface that lie inside the other move
/// against their normals (see [`strictly_inside`]) and the moved vertices with
/// their one-rings get two rounds of Taubin smoothing. Stops when no vertex
/// is inside the other surface or after `max_iterations` rounds. Returns the
/// number of vertices still inside at the end.
pub fn separate_overlapping_surfaces<I: MeshIndex>(
    a: &mut HalfEdgeMesh<I>,
    b: &mut HalfEdgeMesh<I>,
    offset: f64,
    max_iterations: usize,
) -> usize {
    for round in 0..max_iterations {
        let a_inside = vertices_inside(a, &MeshBvh::new(b));
        let b_inside = vertices_inside(b, &MeshBvh::new(a));
        log::debug!(
            "overlap round {}: {} + {} vertices inside",
            round,
            a_inside.len(),
            b_inside.len()
        );
        if a_inside.is_empty() && b_inside.is_empty() {
            return 0;
        }
        pull_back(a, &a_inside, offset);
        pull_back(b, &b_inside, offset);
    }

    let remaining = vertices_inside(a, &MeshBvh::new(b)).len() + vertices_inside(b, &MeshBvh::new(a)).len();
    if remaining > 0 {
        log::warn!("{} vertices still overlap after {} rounds", remaining, max_iterations);
    }
    remaining
}

fn pull_back<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, vertices: &[VertexId<I>], offset: f64) {
    if vertices.is_empty() {
        return;
    }
    push_inward(mesh, vertices, offset);
    let mut region: HashSet<VertexId<I>> = vertices.iter().copied().collect();
    for &v in vertices {
        region.extend(mesh.vertex_neighbors(v));
    }
    let mut region: Vec<VertexId<I>> = region.into_iter().collect();
    region.sort_unstable();
    smooth_taubin_region(mesh, &region, 2, &SmoothOptions::default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::primitives::make_cube;

    fn cube(lo: f64, hi: f64, n: usize) -> HalfEdgeMesh {
        make_cube(&Point3::new(lo, lo, lo), &Point3::new(hi, hi, hi), n).unwrap()
    }

    #[test]
    fn test_strictly_inside() {
        let outer = cube(-1.0, 1.0, 1);
        let mut inner = cube(-0.5, 1.2, 1);

        assert_eq!(strictly_inside(&mut inner, &outer, 0.5), 7);
        assert_eq!(strictly_inside(&mut inner, &outer, 0.5), 0);
        assert!(inner.is_valid());
    }

    #[test]
    fn test_strictly_inside_leaves_enclosed_mesh() {
        let outer = cube(-1.0, 1.0, 1);
        let mut inner = cube(-0.5, 0.5, 2);
        let before: Vec<_> = inner.vertex_ids().map(|v| *inner.position(v)).collect();

        assert_eq!(strictly_inside(&mut inner, &outer, 0.5), 0);
        let after: Vec<_> = inner.vertex_ids().map(|v| *inner.position(v)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_separate_enclosed_surface() {
        let outer = cube(-1.0, 1.0, 1);
        let mut inner = cube(-0.5, 0.95, 4);

        assert_eq!(strictly_inside(&mut inner.clone(), &outer, 0.1), 0);
        // The 61 vertices on the three faces at 0.95 are closer to the outer
        // cube than their 0.3625 edges; the rest are at least 0.4125 away.
        assert_eq!(separate_enclosed_surface(&mut inner, &outer, 0.1), 61);
    }

    #[test]
    fn test_separate_overlapping_surfaces() {
        let mut a = make_cube(&Point3::new(0.0, 0.0, 0.0), &Point3::new(1.0, 1.0, 1.0), 4).unwrap();
        let mut b: HalfEdgeMesh = make_cube(&Point3::new(0.9, 0.1, 0.1), &Point3::new(1.9, 1.1, 1.1), 4).unwrap();
        assert!(!vertices_inside(&a, &MeshBvh::new(&b)).is_empty());

        assert_eq!(separate_overlapping_surfaces(&mut a, &mut b, 0.5, 10), 0);
        assert!(vertices_inside(&a, &MeshBvh::new(&b)).is_empty());
        assert!(vertices_inside(&b, &MeshBvh::new(&a)).is_empty());
    }
}
