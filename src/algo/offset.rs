//! Normal offsets and cylindrical extensions.

use nalgebra::{Point3, Vector3};

use crate::algo::boolean::{union, BooleanOptions};
use crate::algo::primitives::make_cylinder;
use crate::algo::query::{closest_vertices, MeshBvh, DEFAULT_CONTAINMENT_RAYS};
use crate::error::{MeshError, Result};
use crate::mesh::{HalfEdgeMesh, MeshIndex, VertexId};

/// Vertices averaged to find the foot and direction of an extension.
const EXTENSION_NEIGHBOURS: usize = 8;

/// Angular segments of the extension cylinder.
const EXTENSION_SEGMENTS: usize = 32;

/// Move every vertex by `delta` along its vertex normal.
///
/// Normals are computed before anything moves. On an outward-oriented closed
/// surface a positive `delta` grows the surface and a negative one shrinks it.
pub fn adjust_boundary<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, delta: f64) {
    let moved: Vec<(VertexId<I>, Point3<f64>)> = mesh
        .vertex_ids()
        .filter(|&v| !mesh.is_isolated(v))
        .map(|v| (v, mesh.position(v) + mesh.vertex_normal(v) * delta))
        .collect();
    for (v, p) in moved {
        mesh.set_position(v, p);
    }
}

/// Grow a cylinder out of the surface and union it with the mesh.
///
/// The cylinder is rooted at the centroid of the vertices nearest to the
/// surface point closest to `point`. It points along the averaged normal of
/// those vertices when `along_normal` is set, and towards `point` otherwise.
/// It starts `radius` below the surface so the union has a clean seam, and
/// reaches `length` above it.
///
/// # Errors
///
/// - [`MeshError::InvalidParameter`] for a non-positive radius or length, or
///   when `point` lies inside the mesh.
/// - [`MeshError::DegenerateGeometry`] when no direction can be found.
/// - Any error of the [`union`].
pub fn extension<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    point: &Point3<f64>,
    radius: f64,
    length: f64,
    along_normal: bool,
) -> Result<()> {
    if !(radius.is_finite() && radius > 0.0) {
        return Err(MeshError::invalid_param("radius", radius, "must be positive"));
    }
    if !(length.is_finite() && length > 0.0) {
        return Err(MeshError::invalid_param("length", length, "must be positive"));
    }
    let bvh = MeshBvh::new(mesh);
    let Some(foot) = bvh.closest_point(point) else {
        return Err(MeshError::EmptyMesh);
    };
    if bvh.contains(point, DEFAULT_CONTAINMENT_RAYS) {
        return Err(MeshError::invalid_param(
            "point",
            format!("({}, {}, {})", point.x, point.y, point.z),
            "must lie outside the surface",
        ));
    }

    let near = closest_vertices(mesh, &foot.point, EXTENSION_NEIGHBOURS);
    let root = Point3::from(
        near.iter().map(|&v| mesh.position(v).coords).sum::<Vector3<f64>>() / near.len().max(1) as f64,
    );
    let direction = if along_normal {
        near.iter().map(|&v| mesh.vertex_normal(v)).sum::<Vector3<f64>>()
    } else {
        point - root
    };
    let direction = direction
        .try_normalize(f64::EPSILON)
        .ok_or_else(|| MeshError::degenerate("extension direction is undefined"))?;

    let start = root - direction * radius;
    let end = root + direction * length;
    let cylinder: HalfEdgeMesh<I> = make_cylinder(&start, &end, radius, EXTENSION_SEGMENTS, None)?;
    log::debug!(
        "extension from ({:.3}, {:.3}, {:.3}) along ({:.3}, {:.3}, {:.3})",
        root.x,
        root.y,
        root.z,
        direction.x,
        direction.y,
        direction.z
    );

    *mesh = union(mesh, &cylinder, &BooleanOptions::default())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::primitives::make_cube;
    use crate::algo::query::span;
    use approx::assert_relative_eq;

    fn cube() -> HalfEdgeMesh {
        make_cube(&Point3::new(-1.0, -1.0, -1.0), &Point3::new(1.0, 1.0, 1.0), 1).unwrap()
    }

    #[test]
    fn test_adjust_boundary_grows_and_shrinks() {
        let mut grown = cube();
        adjust_boundary(&mut grown, 0.1);
        let (lo, hi) = span(&grown, 0).unwrap();
        assert!(hi - lo > 2.0);

        let mut shrunk = cube();
        adjust_boundary(&mut shrunk, -0.1);
        let (lo, hi) = span(&shrunk, 0).unwrap();
        assert!(hi - lo < 2.0);
        assert!(shrunk.volume() < 8.0 && grown.volume() > 8.0);
    }

    #[test]
    fn test_adjust_boundary_on_sphere_scales_radius() {
        let mut ico: HalfEdgeMesh =
            crate::algo::primitives::make_icosahedron(&Point3::origin(), 1.0).unwrap();
        adjust_boundary(&mut ico, 0.5);
        for v in ico.vertex_ids() {
            assert_relative_eq!(ico.position(v).coords.norm(), 1.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_extension_along_normal() {
        // Fine enough that the eight nearest vertices all lie on the top face.
        let mut mesh: HalfEdgeMesh =
            make_cube(&Point3::new(-1.0, -1.0, -1.0), &Point3::new(1.0, 1.0, 1.0), 4).unwrap();
        let before = mesh.volume();
        extension(&mut mesh, &Point3::new(0.0, 0.0, 2.0), 0.5, 1.0, true).unwrap();

        assert!(mesh.is_closed());
        assert!(mesh.is_valid());
        assert!(mesh.volume() > before);
        let (_, top) = span(&mesh, 2).unwrap();
        assert_relative_eq!(top, 2.0, epsilon = 1e-9);
        let (lo, hi) = span(&mesh, 0).unwrap();
        assert_relative_eq!(lo, -1.0, epsilon = 1e-9);
        assert_relative_eq!(hi, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_extension_rejects_inside_point() {
        let mut mesh = cube();
        assert!(matches!(
            extension(&mut mesh, &Point3::origin(), 0.5, 1.0, false),
            Err(MeshError::InvalidParameter { .. })
        ));
        assert!(matches!(
            extension(&mut mesh, &Point3::new(0.0, 0.0, 2.0), -1.0, 1.0, false),
            Err(MeshError::InvalidParameter { .. })
        ));
    }
}
