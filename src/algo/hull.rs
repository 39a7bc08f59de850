//! Incremental 3D convex hull.

use std::collections::{BTreeSet, HashMap, HashSet};

use nalgebra::Point3;

use crate::error::{MeshError, Result};
use crate::geometry::{orient3d, Orientation};
use crate::mesh::{build_from_triangles, HalfEdgeMesh, MeshIndex};

/// Convex hull of the vertices of `mesh`.
///
/// Points that lie on the hull without being corners of it (inside a flat
/// face or along a straight edge) are dropped, so a subdivided cube gives
/// back its 8 corners.
///
/// # Errors
///
/// [`MeshError::DegenerateGeometry`] when all vertices are coplanar.
///
/// # Example
///
/// ```
/// use surfmesh::prelude::*;
/// use surfmesh::algo::hull::convex_hull;
///
/// let cube: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 4).unwrap();
/// assert_eq!(convex_hull(&cube).unwrap().num_vertices(), 8);
/// ```
pub fn convex_hull<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> Result<HalfEdgeMesh<I>> {
    let points: Vec<Point3<f64>> = mesh.vertex_ids().map(|v| *mesh.position(v)).collect();
    convex_hull_of_points(&points)
}

/// Convex hull of a point set. See [`convex_hull`].
pub fn convex_hull_of_points<I: MeshIndex>(points: &[Point3<f64>]) -> Result<HalfEdgeMesh<I>> {
    let mut active: Vec<Point3<f64>> = points.to_vec();
    loop {
        let faces = hull_faces(&active)
            .ok_or_else(|| MeshError::degenerate("convex hull of coplanar points"))?;
        let redundant = redundant_vertices(&active, &faces);
        let on_hull: BTreeSet<usize> = faces.iter().flatten().copied().collect();

        if redundant.is_empty() {
            let (vertices, triangles) = compact(&active, &faces);
            log::debug!(
                "convex hull: {} of {} points, {} faces",
                vertices.len(),
                points.len(),
                triangles.len()
            );
            return build_from_triangles(&vertices, &triangles);
        }
        active = on_hull
            .into_iter()
            .filter(|i| !redundant.contains(i))
            .map(|i| active[i])
            .collect();
    }
}

/// Outward triangles of the hull, indexing into `points`. A point is added
/// only when it lies strictly outside the current hull.
fn hull_faces(points: &[Point3<f64>]) -> Option<Vec<[usize; 3]>> {
    let [a, b, c, d] = initial_tetrahedron(points)?;
    // Orient (a, b, c) away from d; the other three follow.
    let (b, c) = if orient3d(&points[a], &points[b], &points[c], &points[d]) == Orientation::Positive {
        (c, b)
    } else {
        (b, c)
    };
    let mut faces = vec![[a, b, c], [a, d, b], [b, d, c], [c, d, a]];

    for (i, p) in points.iter().enumerate() {
        if [a, b, c, d].contains(&i) {
            continue;
        }
        let visible: Vec<bool> = faces
            .iter()
            .map(|&[u, v, w]| orient3d(&points[u], &points[v], &points[w], p) == Orientation::Positive)
            .collect();
        if !visible.contains(&true) {
            continue;
        }

        let visible_edges: HashSet<(usize, usize)> = faces
            .iter()
            .zip(&visible)
            .filter(|(_, &seen)| seen)
            .flat_map(|(&[u, v, w], _)| [(u, v), (v, w), (w, u)])
            .collect();
        let mut horizon: Vec<(usize, usize)> = visible_edges
            .iter()
            .copied()
            .filter(|&(u, v)| !visible_edges.contains(&(v, u)))
            .collect();
        horizon.sort_unstable();

        faces = faces
            .into_iter()
            .zip(visible)
            .filter(|(_, seen)| !seen)
            .map(|(face, _)| face)
            .collect();
        faces.extend(horizon.into_iter().map(|(u, v)| [u, v, i]));
    }
    Some(faces)
}

/// Four affinely independent points chosen for spread, `None` when the set
/// is coplanar.
fn initial_tetrahedron(points: &[Point3<f64>]) -> Option<[usize; 4]> {
    let a = (0..points.len()).min_by(|&i, &j| {
        let (p, q) = (&points[i], &points[j]);
        p.x.total_cmp(&q.x).then(p.y.total_cmp(&q.y)).then(p.z.total_cmp(&q.z))
    })?;
    let b = (0..points.len())
        .max_by(|&i, &j| {
            (points[i] - points[a])
                .norm_squared()
                .total_cmp(&(points[j] - points[a]).norm_squared())
        })
        .filter(|&b| points[b] != points[a])?;
    let area = |k: usize| (points[b] - points[a]).cross(&(points[k] - points[a])).norm_squared();
    let c = (0..points.len())
        .max_by(|&i, &j| area(i).total_cmp(&area(j)))
        .filter(|&c| area(c) > 0.0)?;
    let volume = |k: usize| orient3d_magnitude(&points[a], &points[b], &points[c], &points[k]);
    let d = (0..points.len())
        .filter(|&k| orient3d(&points[a], &points[b], &points[c], &points[k]) != Orientation::Zero)
        .max_by(|&i, &j| volume(i).total_cmp(&volume(j)))?;
    Some([a, b, c, d])
}

fn orient3d_magnitude(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    crate::geometry::orient3d_value(a, b, c, d).abs()
}

/// Hull vertices that are not corners: their whole one-ring is coplanar with
/// them, or they sit strictly between two collinear neighbours.
fn redundant_vertices(points: &[Point3<f64>], faces: &[[usize; 3]]) -> HashSet<usize> {
    let mut ring: HashMap<usize, BTreeSet<usize>> = HashMap::new();
    for &[u, v, w] in faces {
        for (x, y) in [(u, v), (v, w), (w, u)] {
            ring.entry(x).or_default().insert(y);
            ring.entry(y).or_default().insert(x);
        }
    }

    let mut redundant = HashSet::new();
    for (&v, neighbours) in &ring {
        let p = &points[v];
        let neighbours: Vec<usize> = neighbours.iter().copied().collect();

        let between = neighbours.iter().enumerate().any(|(k, &u)| {
            neighbours[k + 1..].iter().any(|&w| strictly_between(&points[u], p, &points[w]))
        });
        if between {
            redundant.insert(v);
            continue;
        }

        let flat = neighbours.iter().enumerate().find_map(|(k, &u)| {
            neighbours[k + 1..]
                .iter()
                .find(|&&w| (points[u] - p).cross(&(points[w] - p)).norm_squared() > 0.0)
                .map(|&w| (u, w))
        });
        if let Some((u, w)) = flat {
            if neighbours
                .iter()
                .all(|&x| orient3d(p, &points[u], &points[w], &points[x]) == Orientation::Zero)
            {
                redundant.insert(v);
            }
        }
    }
    redundant
}

/// Whether `v` lies on the open segment `u`–`w`.
fn strictly_between(u: &Point3<f64>, v: &Point3<f64>, w: &Point3<f64>) -> bool {
    let uv = v - u;
    let uw = w - u;
    let cross = uv.cross(&uw).norm();
    let t = uv.dot(&uw);
    cross <= 1e-12 * uv.norm() * uw.norm() && t > 0.0 && t < uw.norm_squared()
}

fn compact(points: &[Point3<f64>], faces: &[[usize; 3]]) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let mut faces = faces.to_vec();
    faces.sort_unstable();
    let mut remap: HashMap<usize, usize> = HashMap::new();
    let mut vertices = Vec::new();
    let triangles = faces
        .iter()
        .map(|face| {
            face.map(|i| {
                *remap.entry(i).or_insert_with(|| {
                    vertices.push(points[i]);
                    vertices.len() - 1
                })
            })
        })
        .collect();
    (vertices, triangles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::primitives::{make_cube, make_icosahedron};
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_hull_has_eight_vertices() {
        let cube: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 3).unwrap();
        let hull = convex_hull(&cube).unwrap();

        assert_eq!(hull.num_vertices(), 8);
        assert_eq!(hull.num_faces(), 12);
        assert!(hull.is_closed());
        assert!(hull.is_valid());
        assert_relative_eq!(hull.volume(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_hull_of_convex_mesh_keeps_it() {
        let ico: HalfEdgeMesh = make_icosahedron(&Point3::new(1.0, 0.0, 0.0), 2.0).unwrap();
        let hull = convex_hull(&ico).unwrap();

        assert_eq!(hull.num_vertices(), 12);
        assert_eq!(hull.num_faces(), 20);
        assert_relative_eq!(hull.volume(), ico.volume(), epsilon = 1e-9);
    }

    #[test]
    fn test_hull_drops_interior_points() {
        let points = vec![
            Point3::new(0.1, 0.1, 0.1),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.2, 0.2, 0.2),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let hull: HalfEdgeMesh = convex_hull_of_points(&points).unwrap();

        assert_eq!(hull.num_vertices(), 4);
        assert_relative_eq!(hull.volume(), 1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_coplanar_points_fail() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        let result: Result<HalfEdgeMesh> = convex_hull_of_points(&points);
        assert!(matches!(result, Err(MeshError::DegenerateGeometry { .. })));
        let empty: Result<HalfEdgeMesh> = convex_hull_of_points(&[]);
        assert!(empty.is_err());
    }
}
