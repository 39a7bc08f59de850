//! Closed primitive surfaces.
//!
//! Boxes are built from per-side quad grids, cones and cylinders from two
//! rings and their cap centres. All primitives come out closed and outward
//! oriented.
//!
//! ```
//! use surfmesh::algo::primitives::{make_cone, make_cube};
//! use surfmesh::mesh::HalfEdgeMesh;
//! use nalgebra::Point3;
//!
//! let cube: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 1).unwrap();
//! assert_eq!((cube.num_vertices(), cube.num_faces(), cube.num_edges()), (8, 12, 18));
//!
//! let cone: HalfEdgeMesh =
//!     make_cone(&Point3::origin(), &Point3::new(0.0, 0.0, 1.0), 1.0, 0.0, 3, None).unwrap();
//! assert_eq!((cone.num_vertices(), cone.num_faces(), cone.num_edges()), (5, 6, 9));
//! ```

use std::f64::consts::TAU;

use nalgebra::{Point3, Vector3};

use crate::error::{MeshError, Result};
use crate::mesh::{build_from_triangles, HalfEdgeMesh, MeshIndex};

use super::implicit::{implicit_surface, ImplicitOptions};
use super::remesh::split_edges;

/// Axis-aligned box from `p0` to `p1` with an `n × n` quad grid per side.
pub fn make_cube<I: MeshIndex>(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    n: usize,
) -> Result<HalfEdgeMesh<I>> {
    make_box(p0, p1, [n, n, n])
}

/// Axis-aligned box with `divisions[a]` grid cells along axis `a`.
///
/// Only surface vertices are created; every quad is split into two
/// triangles.
pub fn make_box<I: MeshIndex>(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    divisions: [usize; 3],
) -> Result<HalfEdgeMesh<I>> {
    if let Some(&zero) = divisions.iter().find(|&&d| d == 0) {
        return Err(MeshError::invalid_param("divisions", zero, "must be at least 1"));
    }
    let lo = p0.inf(p1);
    let hi = p0.sup(p1);
    if (0..3).any(|a| hi[a] - lo[a] <= 0.0) {
        return Err(MeshError::degenerate("box has zero extent along an axis"));
    }

    let [nx, ny, nz] = divisions;
    let dims = [nx + 1, ny + 1, nz + 1];
    let lattice = |i: usize, j: usize, k: usize| (k * dims[1] + j) * dims[0] + i;

    let mut index = vec![usize::MAX; dims[0] * dims[1] * dims[2]];
    let mut vertices = Vec::new();
    for k in 0..dims[2] {
        for j in 0..dims[1] {
            for i in 0..dims[0] {
                let on_surface = i == 0 || i == nx || j == 0 || j == ny || k == 0 || k == nz;
                if !on_surface {
                    continue;
                }
                index[lattice(i, j, k)] = vertices.len();
                let t = [i as f64 / nx as f64, j as f64 / ny as f64, k as f64 / nz as f64];
                vertices.push(Point3::new(
                    lo.x + t[0] * (hi.x - lo.x),
                    lo.y + t[1] * (hi.y - lo.y),
                    lo.z + t[2] * (hi.z - lo.z),
                ));
            }
        }
    }

    let mut faces = Vec::new();
    for axis in 0..3 {
        let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
        for (layer, outward_positive) in [(0, false), (divisions[axis], true)] {
            for s in 0..divisions[u] {
                for t in 0..divisions[v] {
                    let corner = |du: usize, dv: usize| {
                        let mut c = [0usize; 3];
                        c[axis] = layer;
                        c[u] = s + du;
                        c[v] = t + dv;
                        index[lattice(c[0], c[1], c[2])]
                    };
                    // (u, v) is right-handed about +axis.
                    let quad = [corner(0, 0), corner(1, 0), corner(1, 1), corner(0, 1)];
                    if outward_positive {
                        faces.push([quad[0], quad[1], quad[2]]);
                        faces.push([quad[0], quad[2], quad[3]]);
                    } else {
                        faces.push([quad[0], quad[2], quad[1]]);
                        faces.push([quad[0], quad[3], quad[2]]);
                    }
                }
            }
        }
    }

    build_from_triangles(&vertices, &faces)
}

/// Frustum from `p0` (radius `r0`) to `p1` (radius `r1`) with `n` angular
/// segments.
///
/// Both caps are fans around their centre points. A zero radius turns that
/// end into an apex shared by the side triangles, giving a true cone with
/// `n + 2` vertices instead of the frustum's `2n + 2`. `refine_length`
/// splits every longer edge afterwards.
pub fn make_cone<I: MeshIndex>(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    r0: f64,
    r1: f64,
    n: usize,
    refine_length: Option<f64>,
) -> Result<HalfEdgeMesh<I>> {
    if n < 3 {
        return Err(MeshError::invalid_param("segments", n, "must be at least 3"));
    }
    if r0 < 0.0 || r1 < 0.0 || !(r0 > 0.0 || r1 > 0.0) {
        return Err(MeshError::invalid_param(
            "radius",
            format!("({}, {})", r0, r1),
            "must be non-negative with at least one positive",
        ));
    }
    let axis = p1 - p0;
    let height = axis.norm();
    if height <= 0.0 {
        return Err(MeshError::degenerate("cone axis has zero length"));
    }
    let d = axis / height;
    let (u, w) = orthonormal_frame(&d);
    let ring = |centre: &Point3<f64>, r: f64, k: usize| {
        let theta = TAU * k as f64 / n as f64;
        centre + (u * theta.cos() + w * theta.sin()) * r
    };

    let mut vertices = Vec::with_capacity(2 * n + 2);
    let mut faces = Vec::with_capacity(4 * n);

    // Bottom end: either a capped ring or an apex.
    let bottom: Vec<usize> = if r0 > 0.0 {
        let c0 = vertices.len();
        vertices.push(*p0);
        let first = vertices.len();
        vertices.extend((0..n).map(|k| ring(p0, r0, k)));
        for k in 0..n {
            faces.push([c0, first + (k + 1) % n, first + k]);
        }
        (0..n).map(|k| first + k).collect()
    } else {
        vertices.push(*p0);
        vec![0; n]
    };

    let top: Vec<usize> = if r1 > 0.0 {
        let c1 = vertices.len();
        vertices.push(*p1);
        let first = vertices.len();
        vertices.extend((0..n).map(|k| ring(p1, r1, k)));
        for k in 0..n {
            faces.push([c1, first + k, first + (k + 1) % n]);
        }
        (0..n).map(|k| first + k).collect()
    } else {
        let apex = vertices.len();
        vertices.push(*p1);
        vec![apex; n]
    };

    for k in 0..n {
        let k1 = (k + 1) % n;
        if r0 > 0.0 {
            faces.push([bottom[k], bottom[k1], top[k1]]);
        }
        if r1 > 0.0 {
            faces.push([bottom[k], top[k1], top[k]]);
        }
    }

    let mut mesh = build_from_triangles(&vertices, &faces)?;
    if let Some(length) = refine_length {
        split_edges(&mut mesh, length)?;
    }
    Ok(mesh)
}

/// Cylinder: a cone with equal radii.
pub fn make_cylinder<I: MeshIndex>(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    r: f64,
    n: usize,
    refine_length: Option<f64>,
) -> Result<HalfEdgeMesh<I>> {
    make_cone(p0, p1, r, r, n, refine_length)
}

/// Sphere polygonized from its distance field.
///
/// `resolution` is the number of grid cells along each axis of the sampling
/// box.
pub fn make_sphere<I: MeshIndex>(
    centre: &Point3<f64>,
    radius: f64,
    resolution: usize,
) -> Result<HalfEdgeMesh<I>> {
    if radius <= 0.0 {
        return Err(MeshError::invalid_param("radius", radius, "must be positive"));
    }
    let c = *centre;
    let options = ImplicitOptions::new(1.2 * radius)
        .with_centre(c)
        .with_resolution(resolution)
        .with_error_bound(1e-6 * radius);
    implicit_surface(&move |p: Point3<f64>| (p - c).norm() - radius, &options)
}

/// Regular icosahedron with its vertices on the given sphere.
pub fn make_icosahedron<I: MeshIndex>(centre: &Point3<f64>, radius: f64) -> Result<HalfEdgeMesh<I>> {
    let phi = (1.0 + 5f64.sqrt()) / 2.0;
    let raw = [
        (-1.0, phi, 0.0),
        (1.0, phi, 0.0),
        (-1.0, -phi, 0.0),
        (1.0, -phi, 0.0),
        (0.0, -1.0, phi),
        (0.0, 1.0, phi),
        (0.0, -1.0, -phi),
        (0.0, 1.0, -phi),
        (phi, 0.0, -1.0),
        (phi, 0.0, 1.0),
        (-phi, 0.0, -1.0),
        (-phi, 0.0, 1.0),
    ];
    let vertices: Vec<Point3<f64>> = raw
        .iter()
        .map(|&(x, y, z)| centre + Vector3::new(x, y, z).normalize() * radius)
        .collect();
    let faces = [
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];
    build_from_triangles(&vertices, &faces)
}

/// Two unit vectors `u`, `w` with `u × w = d`.
pub(crate) fn orthonormal_frame(d: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let helper = if d.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let u = helper.cross(d).normalize();
    let w = d.cross(&u);
    (u, w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn counts(mesh: &HalfEdgeMesh) -> (usize, usize, usize) {
        (mesh.num_vertices(), mesh.num_faces(), mesh.num_edges())
    }

    #[test]
    fn test_unit_cube() {
        let mesh: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 1).unwrap();
        assert_eq!(counts(&mesh), (8, 12, 18));
        assert!(mesh.is_valid());
        assert!(mesh.is_closed());
        assert_eq!(mesh.euler_characteristic(), 2);
        assert_relative_eq!(mesh.volume(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(mesh.surface_area(), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_subdivided_box() {
        let mesh: HalfEdgeMesh =
            make_box(&Point3::new(2.0, 1.0, 3.0), &Point3::origin(), [2, 1, 3]).unwrap();
        // A single cell along y leaves no interior lattice point.
        assert_eq!(mesh.num_vertices(), 3 * 2 * 4);
        assert_eq!(mesh.num_faces(), 2 * 2 * (2 * 1 + 1 * 3 + 3 * 2));
        assert!(mesh.is_closed());
        assert_eq!(mesh.euler_characteristic(), 2);
        assert_relative_eq!(mesh.volume(), 6.0, epsilon = 1e-12);

        let cube: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 3).unwrap();
        assert_eq!(cube.num_vertices(), 4 * 4 * 4 - 2 * 2 * 2);
    }

    #[test]
    fn test_box_rejects_bad_input() {
        let r: Result<HalfEdgeMesh> = make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 0);
        assert!(matches!(r, Err(MeshError::InvalidParameter { .. })));
        let r: Result<HalfEdgeMesh> = make_cube(&Point3::origin(), &Point3::new(1.0, 0.0, 1.0), 1);
        assert!(matches!(r, Err(MeshError::DegenerateGeometry { .. })));
    }

    #[test]
    fn test_frustum_and_cone_counts() {
        let p0 = Point3::origin();
        let p1 = Point3::new(0.0, 0.0, 2.0);

        let frustum: HalfEdgeMesh = make_cone(&p0, &p1, 1.0, 0.5, 3, None).unwrap();
        assert_eq!(counts(&frustum), (8, 12, 18));
        assert!(frustum.is_closed() && frustum.is_valid());
        assert!(frustum.volume() > 0.0);

        let cone: HalfEdgeMesh = make_cone(&p0, &p1, 1.0, 0.0, 3, None).unwrap();
        assert_eq!(counts(&cone), (5, 6, 9));
        assert!(cone.volume() > 0.0);

        let inverted: HalfEdgeMesh = make_cone(&p0, &p1, 0.0, 1.0, 5, None).unwrap();
        assert_eq!(counts(&inverted), (7, 10, 15));
        assert!(inverted.is_closed());
        assert!(inverted.volume() > 0.0);
    }

    #[test]
    fn test_cylinder_counts_and_volume() {
        let mesh: HalfEdgeMesh =
            make_cylinder(&Point3::origin(), &Point3::new(1.0, 0.0, 0.0), 1.0, 4, None).unwrap();
        assert_eq!(counts(&mesh), (10, 16, 24));
        // Square cross-section of diagonal 2.
        assert_relative_eq!(mesh.volume(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_refined_cylinder() {
        let mesh: HalfEdgeMesh =
            make_cylinder(&Point3::origin(), &Point3::new(0.0, 0.0, 3.0), 1.0, 8, Some(0.5)).unwrap();
        let coarse: HalfEdgeMesh =
            make_cylinder(&Point3::origin(), &Point3::new(0.0, 0.0, 3.0), 1.0, 8, None).unwrap();
        assert!(mesh.is_valid() && mesh.is_closed());
        assert!(mesh.num_vertices() > coarse.num_vertices());
        // Midpoint splits keep every face in its plane.
        assert_relative_eq!(mesh.volume(), coarse.volume(), epsilon = 1e-9);
    }

    #[test]
    fn test_icosahedron() {
        let mesh: HalfEdgeMesh = make_icosahedron(&Point3::new(1.0, 0.0, 0.0), 2.0).unwrap();
        assert_eq!(counts(&mesh), (12, 20, 30));
        assert!(mesh.volume() > 0.0);
        for v in mesh.vertex_ids() {
            assert_relative_eq!((mesh.position(v) - Point3::new(1.0, 0.0, 0.0)).norm(), 2.0, epsilon = 1e-12);
            assert_eq!(mesh.valence(v), 5);
        }
    }

    #[test]
    fn test_sphere() {
        let mesh: HalfEdgeMesh = make_sphere(&Point3::new(0.0, 0.0, 1.0), 1.0, 12).unwrap();
        assert!(mesh.is_valid());
        assert!(mesh.is_closed());
        assert_eq!(mesh.euler_characteristic(), 2);
        let v = mesh.volume();
        assert!((v - 4.0 / 3.0 * std::f64::consts::PI).abs() < 0.4, "volume {}", v);
    }
}
