//! Plane clipping.

use std::collections::HashMap;

use nalgebra::Point2;

use crate::algo::primitives::orthonormal_frame;
use crate::error::{MeshError, Result};
use crate::geometry::{orient2d, Orientation, Plane, Side};
use crate::mesh::{build_compacted, to_polygons, EdgeId, HalfEdgeMesh, MeshIndex, VertexId};

/// Vertices closer to the plane than this fraction of the bounding box
/// diagonal are treated as lying on it.
const ON_PLANE_FACTOR: f64 = 1e-10;

/// Remove the part of the mesh in front of `plane`.
///
/// Triangles straddling the plane are cut along it. With `keep_closed`, every
/// boundary loop created by the cut is closed with a cap triangulated in the
/// plane, so a closed input stays closed. Returns the number of caps added.
///
/// The mesh is rebuilt, so ids are compacted. Clipping everything away
/// leaves an empty mesh.
///
/// # Example
///
/// ```
/// use surfmesh::prelude::*;
/// use surfmesh::algo::clip::clip;
/// use surfmesh::geometry::Plane;
///
/// let mut mesh: HalfEdgeMesh =
///     make_cube(&Point3::new(-1.0, -1.0, -1.0), &Point3::new(1.0, 1.0, 1.0), 1).unwrap();
/// let plane = Plane::axis_aligned(2, 0.0, true).unwrap();
///
/// assert_eq!(clip(&mut mesh, &plane, true).unwrap(), 1);
/// assert!(mesh.is_closed());
/// ```
pub fn clip<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, plane: &Plane, keep_closed: bool) -> Result<usize> {
    if !mesh.is_triangle_mesh() {
        return Err(MeshError::non_manifold_input("clipping needs a triangle mesh"));
    }
    let Some(bbox) = mesh.bounding_box() else {
        return Ok(0);
    };
    let tolerance = ON_PLANE_FACTOR * bbox.diagonal().max(f64::MIN_POSITIVE);

    // Classify, snapping near-plane vertices onto the plane.
    let mut sides: HashMap<VertexId<I>, Side> = HashMap::new();
    let vertices: Vec<VertexId<I>> = mesh.vertex_ids().collect();
    for v in vertices {
        let side = plane.classify(mesh.position(v), tolerance);
        if side == Side::On {
            let p = plane.project(mesh.position(v));
            mesh.set_position(v, p);
        }
        sides.insert(v, side);
    }

    // Cut every straddling edge at the plane.
    let crossing: Vec<EdgeId<I>> = mesh
        .edge_ids()
        .filter(|e| {
            let h = e.halfedge(0);
            let a = sides[&mesh.origin(h)];
            let b = sides[&mesh.target(h)];
            matches!((a, b), (Side::Front, Side::Back) | (Side::Back, Side::Front))
        })
        .collect();
    for e in crossing {
        let h = e.halfedge(0);
        let (p, q) = (*mesh.position(mesh.origin(h)), *mesh.position(mesh.target(h)));
        let Some(cut) = plane.intersect_segment(&p, &q) else {
            continue;
        };
        let m = mesh.split_edge_at(e, plane.project(&cut))?;
        sides.insert(m, Side::On);
    }

    // Keep faces behind the plane, plus in-plane faces facing out of the
    // kept half-space.
    let order: Vec<VertexId<I>> = mesh.vertex_ids().collect();
    let (positions, polygons) = to_polygons(mesh);
    let kept: Vec<Vec<usize>> = polygons
        .into_iter()
        .filter(|polygon| {
            let face_sides: Vec<Side> = polygon.iter().map(|&i| sides[&order[i]]).collect();
            if face_sides.contains(&Side::Front) {
                return false;
            }
            if face_sides.iter().all(|&s| s == Side::On) {
                let [a, b, c] = [positions[polygon[0]], positions[polygon[1]], positions[polygon[2]]];
                return (b - a).cross(&(c - a)).dot(&plane.normal) > 0.0;
            }
            true
        })
        .collect();

    *mesh = build_compacted(&positions, &kept)?;
    if mesh.is_empty() {
        return Ok(0);
    }

    let caps = if keep_closed { cap_cut_loops(mesh, plane, tolerance) } else { 0 };
    log::debug!("clipped mesh to {} faces, {} caps", mesh.num_faces(), caps);
    Ok(caps)
}

/// Clip with the plane `p[axis] = offset`, removing the side its normal
/// points to: `+axis` when `positive` is set, `-axis` otherwise.
pub fn clip_axis<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    axis: usize,
    offset: f64,
    positive: bool,
    keep_closed: bool,
) -> Result<usize> {
    let plane = Plane::axis_aligned(axis, offset, positive)?;
    clip(mesh, &plane, keep_closed)
}

/// Close each boundary loop lying in the plane by ear clipping.
fn cap_cut_loops<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, plane: &Plane, tolerance: f64) -> usize {
    let (u, w) = orthonormal_frame(&plane.normal);
    let mut caps = 0;
    for boundary in mesh.boundary_loops() {
        let ring: Vec<VertexId<I>> = boundary.iter().map(|&h| mesh.origin(h)).collect();
        if ring
            .iter()
            .any(|&v| plane.signed_distance(mesh.position(v)).abs() > tolerance)
        {
            continue;
        }
        let flat: Vec<Point2<f64>> = ring
            .iter()
            .map(|&v| {
                let p = mesh.position(v).coords;
                Point2::new(p.dot(&u), p.dot(&w))
            })
            .collect();

        let mut complete = true;
        for [a, b, c] in ear_clip(&flat) {
            if let Err(err) = mesh.add_face(&[ring[a], ring[b], ring[c]]) {
                log::warn!("cap of {} edges left open: {}", ring.len(), err);
                complete = false;
                break;
            }
        }
        if complete {
            caps += 1;
        }
    }
    caps
}

/// Ear-clipping triangulation of a simple polygon, either winding.
///
/// Each ear uses two consecutive polygon edges, so adding the triangles in
/// order to a mesh always extends the filled region along an edge.
pub(crate) fn ear_clip(points: &[Point2<f64>]) -> Vec<[usize; 3]> {
    let n = points.len();
    if n < 3 {
        return Vec::new();
    }
    let twice_area: f64 = (0..n)
        .map(|i| {
            let (p, q) = (&points[i], &points[(i + 1) % n]);
            p.x * q.y - q.x * p.y
        })
        .sum();
    let winding = if twice_area >= 0.0 { Orientation::Positive } else { Orientation::Negative };

    let mut remaining: Vec<usize> = (0..n).collect();
    let mut triangles = Vec::with_capacity(n - 2);
    while remaining.len() > 3 {
        let m = remaining.len();
        let ear = (0..m)
            .find(|&k| {
                let (a, b, c) = (remaining[(k + m - 1) % m], remaining[k], remaining[(k + 1) % m]);
                is_ear(points, &remaining, a, b, c, winding)
            })
            // No strict ear in a degenerate ring: cut the first corner anyway.
            .unwrap_or(0);
        let (a, b, c) = (remaining[(ear + m - 1) % m], remaining[ear], remaining[(ear + 1) % m]);
        triangles.push([a, b, c]);
        remaining.remove(ear);
    }
    triangles.push([remaining[0], remaining[1], remaining[2]]);
    triangles
}

fn is_ear(points: &[Point2<f64>], ring: &[usize], a: usize, b: usize, c: usize, winding: Orientation) -> bool {
    let (pa, pb, pc) = (&points[a], &points[b], &points[c]);
    if orient2d(pa, pb, pc) != winding {
        return false;
    }
    ring.iter().all(|&k| {
        if k == a || k == b || k == c {
            return true;
        }
        let p = &points[k];
        if p == pa || p == pb || p == pc {
            return true;
        }
        // Outside or strictly on the far side of some edge.
        [orient2d(pa, pb, p), orient2d(pb, pc, p), orient2d(pc, pa, p)]
            .iter()
            .any(|&o| o == winding.reversed())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::primitives::make_cube;
    use crate::algo::query::span;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn cube(n: usize) -> HalfEdgeMesh {
        make_cube(&Point3::new(-1.0, -1.0, -1.0), &Point3::new(1.0, 1.0, 1.0), n).unwrap()
    }

    #[test]
    fn test_clip_cube_in_half() {
        let mut mesh = cube(1);
        assert_eq!(clip_axis(&mut mesh, 2, 0.0, true, true).unwrap(), 1);

        assert_eq!(span(&mesh, 0).unwrap(), (-1.0, 1.0));
        assert_eq!(span(&mesh, 1).unwrap(), (-1.0, 1.0));
        assert_eq!(span(&mesh, 2).unwrap(), (-1.0, 0.0));
        assert!(mesh.is_closed());
        assert!(mesh.is_valid());
        assert_relative_eq!(mesh.volume(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_clip_without_cap_leaves_hole() {
        let mut mesh = cube(1);
        assert_eq!(clip_axis(&mut mesh, 2, 0.0, true, false).unwrap(), 0);

        assert!(!mesh.is_closed());
        assert_eq!(mesh.boundary_loops().len(), 1);
        assert_relative_eq!(mesh.surface_area(), 4.0 + 4.0 * 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_clip_through_vertices() {
        // The n = 2 lattice has a vertex layer exactly at z = 0.
        let mut mesh = cube(2);
        clip_axis(&mut mesh, 2, 0.0, false, true).unwrap();

        assert_eq!(span(&mesh, 2).unwrap(), (0.0, 1.0));
        assert!(mesh.is_closed());
        assert_relative_eq!(mesh.volume(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_clip_oblique_plane() {
        let mut mesh = cube(2);
        let plane = Plane::new(nalgebra::Vector3::new(1.0, 1.0, 1.0), 0.0).unwrap();
        clip(&mut mesh, &plane, true).unwrap();

        assert!(mesh.is_closed());
        assert!(mesh.is_valid());
        assert_relative_eq!(mesh.volume(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_clip_everything_or_nothing() {
        let mut mesh = cube(1);
        clip_axis(&mut mesh, 0, -2.0, true, true).unwrap();
        assert!(mesh.is_empty());

        let mut mesh = cube(1);
        clip_axis(&mut mesh, 0, 2.0, true, true).unwrap();
        assert_eq!(mesh.num_faces(), 12);
    }

    #[test]
    fn test_ear_clip_concave() {
        // L-shaped hexagon, clockwise.
        let points = vec![
            Point2::new(0.0, 0.0),
            Point2::new(0.0, 2.0),
            Point2::new(1.0, 2.0),
            Point2::new(1.0, 1.0),
            Point2::new(2.0, 1.0),
            Point2::new(2.0, 0.0),
        ];
        let triangles = ear_clip(&points);
        assert_eq!(triangles.len(), 4);
        let area: f64 = triangles
            .iter()
            .map(|&[a, b, c]| {
                let (pa, pb, pc) = (points[a], points[b], points[c]);
                0.5 * ((pb - pa).perp(&(pc - pa))).abs()
            })
            .sum();
        assert_relative_eq!(area, 3.0, epsilon = 1e-12);
    }
}
