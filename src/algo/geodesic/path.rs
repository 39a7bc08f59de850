//! Shortest path between two arbitrary points on the surface.

use nalgebra::Point3;

use crate::algo::query::{MeshBvh, SurfacePoint};
use crate::error::{MeshError, Result};
use crate::mesh::{HalfEdgeMesh, MeshIndex, VertexId};

use super::{dijkstra_seeded, DijkstraOptions};

/// Approximate geodesic between `p` and `q`.
///
/// Both points are first moved to their nearest surface point. Each located
/// point is joined to the corners of its triangle and the corners are linked
/// through the edge graph. The result runs from `q` back to `p`, both located
/// points included, with repeated points dropped.
///
/// # Errors
///
/// [`MeshError::EmptyMesh`] for a mesh without faces and
/// [`MeshError::DegenerateGeometry`] when the points lie on different
/// connected components.
///
/// # Example
///
/// ```
/// use surfmesh::prelude::*;
/// use surfmesh::algo::geodesic::shortest_surface_path;
///
/// let mesh: HalfEdgeMesh =
///     make_cube(&Point3::new(-1.0, -1.0, -1.0), &Point3::new(1.0, 1.0, 1.0), 1).unwrap();
/// let p = Point3::new(-1.0, -1.0, 1.0);
/// let q = Point3::new(1.0, -1.0, 1.0);
/// assert_eq!(shortest_surface_path(&mesh, &p, &q).unwrap(), vec![q, p]);
/// ```
pub fn shortest_surface_path<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    p: &Point3<f64>,
    q: &Point3<f64>,
) -> Result<Vec<Point3<f64>>> {
    let bvh = MeshBvh::new(mesh);
    let start = bvh.closest_point(p).ok_or(MeshError::EmptyMesh)?;
    let end = bvh.closest_point(q).ok_or(MeshError::EmptyMesh)?;
    let tolerance = 1e-12 * bvh.bvh().bounding_box().diagonal();

    if start.face == end.face {
        return Ok(dedup(vec![end.point, start.point], tolerance));
    }

    let seeds: Vec<(VertexId<I>, f64)> = mesh
        .face_vertices(start.face)
        .map(|v| (v, (mesh.position(v) - start.point).norm()))
        .collect();
    let result = dijkstra_seeded(mesh, &seeds, &DijkstraOptions::default().with_predecessors(true));

    let exit = best_exit(mesh, &end, |v| result.distance(v)).ok_or_else(|| {
        MeshError::degenerate("path endpoints lie on disconnected components")
    })?;
    let chain = result.path_to(exit).ok_or_else(|| {
        MeshError::degenerate("path endpoints lie on disconnected components")
    })?;

    let mut points = Vec::with_capacity(chain.len() + 2);
    points.push(end.point);
    points.extend(chain.iter().rev().map(|&v| *mesh.position(v)));
    points.push(start.point);
    Ok(dedup(points, tolerance))
}

/// Corner of the end face minimizing graph distance plus the final hop.
fn best_exit<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    end: &SurfacePoint<I>,
    distance: impl Fn(VertexId<I>) -> f64,
) -> Option<VertexId<I>> {
    mesh.face_vertices(end.face)
        .map(|v| (distance(v) + (mesh.position(v) - end.point).norm(), v))
        .filter(|(d, _)| d.is_finite())
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, v)| v)
}

fn dedup(mut points: Vec<Point3<f64>>, tolerance: f64) -> Vec<Point3<f64>> {
    points.dedup_by(|b, a| (*b - *a).norm() <= tolerance);
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::primitives::make_cube;
    use crate::mesh::build_from_triangles;
    use approx::assert_relative_eq;

    fn cube() -> HalfEdgeMesh {
        make_cube(&Point3::new(-1.0, -1.0, -1.0), &Point3::new(1.0, 1.0, 1.0), 1).unwrap()
    }

    fn length(path: &[Point3<f64>]) -> f64 {
        path.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }

    #[test]
    fn test_adjacent_corners() {
        let mesh = cube();
        let p = Point3::new(-1.0, -1.0, 1.0);
        let q = Point3::new(1.0, -1.0, 1.0);
        let path = shortest_surface_path(&mesh, &p, &q).unwrap();
        assert_eq!(path, vec![q, p]);
    }

    #[test]
    fn test_path_is_reversed_and_on_surface() {
        let mesh = cube();
        let p = Point3::new(-0.5, -0.5, 3.0);
        let q = Point3::new(0.5, 0.5, -3.0);
        let path = shortest_surface_path(&mesh, &p, &q).unwrap();

        assert_relative_eq!(path[0], Point3::new(0.5, 0.5, -1.0), epsilon = 1e-12);
        assert_relative_eq!(path[path.len() - 1], Point3::new(-0.5, -0.5, 1.0), epsilon = 1e-12);
        for point in &path[1..path.len() - 1] {
            assert!(point.coords.iter().any(|c| (c.abs() - 1.0).abs() < 1e-12));
        }
        // Across two faces at the very least.
        assert!(length(&path) >= 2.0);
    }

    #[test]
    fn test_same_face_is_straight() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
            Point3::new(0.0, 4.0, 0.0),
        ];
        let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
        let p = Point3::new(0.5, 0.5, 1.0);
        let q = Point3::new(1.0, 1.0, -1.0);
        let path = shortest_surface_path(&mesh, &p, &q).unwrap();
        assert_eq!(path.len(), 2);
        assert_relative_eq!(path[0], Point3::new(1.0, 1.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(path[1], Point3::new(0.5, 0.5, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_disconnected_components() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(5.0, 0.0, 0.0),
            Point3::new(6.0, 0.0, 0.0),
            Point3::new(5.0, 1.0, 0.0),
        ];
        let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &[[0, 1, 2], [3, 4, 5]]).unwrap();
        let result = shortest_surface_path(&mesh, &Point3::new(0.2, 0.2, 0.0), &Point3::new(5.2, 0.2, 0.0));
        assert!(matches!(result, Err(MeshError::DegenerateGeometry { .. })));
        assert!(matches!(
            shortest_surface_path(&HalfEdgeMesh::<u32>::new(), &Point3::origin(), &Point3::origin()),
            Err(MeshError::EmptyMesh)
        ));
    }
}
