//! Mesh construction utilities.
//!
//! This module provides functions for building half-edge meshes from
//! face-vertex lists as found in mesh file formats, and for turning a mesh
//! back into such lists.

use std::collections::HashMap;

use nalgebra::Point3;

use super::halfedge::HalfEdgeMesh;
use super::index::{FaceId, HalfEdgeId, MeshIndex, VertexId};
use crate::error::{MeshError, Result};

/// Build a half-edge mesh from vertices and triangle faces.
///
/// # Arguments
/// * `vertices` - List of vertex positions
/// * `faces` - List of triangle faces, each as [v0, v1, v2] indices
///
/// # Returns
/// A half-edge mesh, or an error if the input is invalid.
///
/// # Example
/// ```
/// use surfmesh::mesh::{build_from_triangles, HalfEdgeMesh};
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.5, 1.0, 0.0),
/// ];
/// let faces = vec![[0, 1, 2]];
///
/// let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
/// assert_eq!(mesh.num_vertices(), 3);
/// assert_eq!(mesh.num_faces(), 1);
/// ```
pub fn build_from_triangles<I: MeshIndex>(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
) -> Result<HalfEdgeMesh<I>> {
    build_from_polygons(vertices, faces)
}

/// Build a half-edge mesh from a consistently oriented polygon soup.
///
/// A vertex whose incident faces form several separate fans is duplicated
/// once per extra fan, so the result is always manifold. A directed edge used
/// by two faces is rejected with [`MeshError::NonManifoldInput`].
pub fn build_from_polygons<I: MeshIndex, P: AsRef<[usize]>>(
    vertices: &[Point3<f64>],
    faces: &[P],
) -> Result<HalfEdgeMesh<I>> {
    if faces.is_empty() {
        return Err(MeshError::EmptyMesh);
    }

    // Validate vertex indices
    for (fi, face) in faces.iter().enumerate() {
        let face = face.as_ref();
        for &vi in face {
            if vi >= vertices.len() {
                return Err(MeshError::InvalidVertexIndex { face: fi, vertex: vi });
            }
        }
        if face.len() < 3 {
            return Err(MeshError::DegenerateFace { face: fi });
        }
        for (i, &vi) in face.iter().enumerate() {
            if face[i + 1..].contains(&vi) {
                return Err(MeshError::DegenerateFace { face: fi });
            }
        }
    }

    // Directed edge -> (face, corner of the edge's origin)
    let mut directed: HashMap<(usize, usize), (usize, usize)> = HashMap::new();
    let mut corner_base = Vec::with_capacity(faces.len());
    let mut num_corners = 0;
    for (fi, face) in faces.iter().enumerate() {
        let face = face.as_ref();
        corner_base.push(num_corners);
        for i in 0..face.len() {
            let a = face[i];
            let b = face[(i + 1) % face.len()];
            if directed.insert((a, b), (fi, i)).is_some() {
                return Err(MeshError::non_manifold_input(format!(
                    "edge ({a}, {b}) is used twice with the same orientation"
                )));
            }
        }
        num_corners += face.len();
    }

    let (positions, polygons) = split_fans(vertices, faces, &directed, &corner_base, num_corners);

    let mut mesh = HalfEdgeMesh::with_capacity(positions.len(), polygons.len());
    for &p in &positions {
        mesh.add_vertex(p);
    }

    // Undirected edge -> half-edge running from the smaller to the larger index
    let mut edge_map: HashMap<(usize, usize), HalfEdgeId<I>> = HashMap::new();

    for face in &polygons {
        let n = face.len();
        let mut hes = Vec::with_capacity(n);
        for i in 0..n {
            let a = face[i];
            let b = face[(i + 1) % n];
            let key = (a.min(b), a.max(b));
            let h = match edge_map.get(&key) {
                Some(&h) => h,
                None => {
                    let h = mesh.new_edge(VertexId::new(key.0), VertexId::new(key.1));
                    edge_map.insert(key, h);
                    h
                }
            };
            hes.push(if a < b { h } else { h.pair() });
        }

        let face_id: FaceId<I> = mesh.new_face(hes[0]);
        for i in 0..n {
            mesh.halfedge_mut(hes[i]).face = face_id;
            mesh.link(hes[i], hes[(i + 1) % n]);
            mesh.vertex_mut(VertexId::new(face[i])).halfedge = hes[i];
        }
    }

    link_boundary_loops(&mut mesh);
    fix_boundary_vertex_halfedges(&mut mesh);

    Ok(mesh)
}

/// Give every fan of a vertex its own vertex.
///
/// Corners of the same vertex are joined when two faces share an edge at that
/// vertex; each resulting group beyond the first gets a copy of the position.
fn split_fans<P: AsRef<[usize]>>(
    vertices: &[Point3<f64>],
    faces: &[P],
    directed: &HashMap<(usize, usize), (usize, usize)>,
    corner_base: &[usize],
    num_corners: usize,
) -> (Vec<Point3<f64>>, Vec<Vec<usize>>) {
    let mut parent: Vec<usize> = (0..num_corners).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for (fi, face) in faces.iter().enumerate() {
        let face = face.as_ref();
        let n = face.len();
        for i in 0..n {
            let a = face[i];
            let b = face[(i + 1) % n];
            let Some(&(gi, j)) = directed.get(&(b, a)) else {
                continue;
            };
            let m = faces[gi].as_ref().len();
            // Corner of a in f is i; in g the edge b -> a starts at j, so a sits at j + 1.
            let pairs = [
                (corner_base[fi] + i, corner_base[gi] + (j + 1) % m),
                (corner_base[fi] + (i + 1) % n, corner_base[gi] + j),
            ];
            for (x, y) in pairs {
                let rx = find(&mut parent, x);
                let ry = find(&mut parent, y);
                if rx != ry {
                    parent[rx] = ry;
                }
            }
        }
    }

    let mut positions = vertices.to_vec();
    let mut first_group: Vec<Option<usize>> = vec![None; vertices.len()];
    let mut group_vertex: HashMap<usize, usize> = HashMap::new();
    let mut polygons = Vec::with_capacity(faces.len());

    for (fi, face) in faces.iter().enumerate() {
        let face = face.as_ref();
        let mut polygon = Vec::with_capacity(face.len());
        for (i, &v) in face.iter().enumerate() {
            let root = find(&mut parent, corner_base[fi] + i);
            let id = match group_vertex.get(&root) {
                Some(&id) => id,
                None => {
                    let id = match first_group[v] {
                        None => {
                            first_group[v] = Some(root);
                            v
                        }
                        Some(_) => {
                            positions.push(vertices[v]);
                            positions.len() - 1
                        }
                    };
                    group_vertex.insert(root, id);
                    id
                }
            };
            polygon.push(id);
        }
        polygons.push(polygon);
    }

    let duplicated = positions.len() - vertices.len();
    if duplicated > 0 {
        log::debug!("duplicated {duplicated} vertices shared by several fans");
    }

    (positions, polygons)
}

/// Link boundary half-edges into proper loops.
fn link_boundary_loops<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>) {
    // Find all boundary half-edges
    let boundary_hes: Vec<HalfEdgeId<I>> = mesh
        .halfedge_ids()
        .filter(|&he| mesh.is_boundary_halfedge(he))
        .collect();

    // Every vertex has a single fan, hence at most one outgoing boundary half-edge
    let mut outgoing: HashMap<usize, HalfEdgeId<I>> = HashMap::new();
    for &he in &boundary_hes {
        outgoing.insert(mesh.origin(he).index(), he);
    }

    for &he in &boundary_hes {
        // The next boundary half-edge starts where this one ends
        let dest = mesh.target(he).index();
        if let Some(&next_he) = outgoing.get(&dest) {
            mesh.link(he, next_he);
        }
    }
}

/// Ensure boundary vertices point to a boundary half-edge.
fn fix_boundary_vertex_halfedges<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>) {
    for he in mesh.halfedge_ids().collect::<Vec<_>>() {
        if mesh.is_boundary_halfedge(he) {
            let origin = mesh.origin(he);
            mesh.vertex_mut(origin).halfedge = he;
        }
    }
}

/// Convert a half-edge mesh into polygon lists over contiguous vertex indices.
///
/// Removed elements are skipped; returns (vertices, faces).
pub fn to_polygons<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> (Vec<Point3<f64>>, Vec<Vec<usize>>) {
    let mut remap = vec![usize::MAX; mesh.vertex_capacity()];
    let mut vertices = Vec::with_capacity(mesh.num_vertices());
    for v in mesh.vertex_ids() {
        remap[v.index()] = vertices.len();
        vertices.push(*mesh.position(v));
    }

    let faces = mesh
        .face_ids()
        .map(|f| mesh.face_vertices(f).map(|v| remap[v.index()]).collect())
        .collect();

    (vertices, faces)
}

/// Convert a half-edge mesh back to a face-vertex representation.
///
/// Polygon faces are fan-triangulated. Returns (vertices, faces) tuple.
pub fn to_face_vertex<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let (vertices, polygons) = to_polygons(mesh);
    let mut faces = Vec::with_capacity(polygons.len());
    for polygon in polygons {
        for i in 1..polygon.len() - 1 {
            faces.push([polygon[0], polygon[i], polygon[i + 1]]);
        }
    }
    (vertices, faces)
}

/// Combine two meshes into one with two disjoint vertex sets.
///
/// Vertices of `a` come first, followed by those of `b`; ids are compacted.
pub fn merge<I: MeshIndex>(a: &HalfEdgeMesh<I>, b: &HalfEdgeMesh<I>) -> Result<HalfEdgeMesh<I>> {
    let (mut vertices, mut polygons) = to_polygons(a);
    let (b_vertices, b_polygons) = to_polygons(b);
    let offset = vertices.len();
    vertices.extend(b_vertices);
    polygons.extend(
        b_polygons
            .into_iter()
            .map(|polygon| polygon.into_iter().map(|i| i + offset).collect::<Vec<_>>()),
    );
    build_from_polygons(&vertices, &polygons)
}

/// Build from a polygon soup, keeping only the vertices some face uses.
///
/// Vertices are renumbered in order of first use. An empty face list gives
/// an empty mesh.
pub(crate) fn build_compacted<I: MeshIndex, P: AsRef<[usize]>>(
    vertices: &[Point3<f64>],
    faces: &[P],
) -> Result<HalfEdgeMesh<I>> {
    if faces.is_empty() {
        return Ok(HalfEdgeMesh::new());
    }
    let mut remap = vec![usize::MAX; vertices.len()];
    let mut used = Vec::new();
    let mut polygons = Vec::with_capacity(faces.len());
    for face in faces {
        let mut polygon = Vec::with_capacity(face.as_ref().len());
        for &i in face.as_ref() {
            let Some(slot) = remap.get_mut(i) else {
                return Err(MeshError::InvalidVertexIndex {
                    face: polygons.len(),
                    vertex: i,
                });
            };
            if *slot == usize::MAX {
                *slot = used.len();
                used.push(vertices[i]);
            }
            polygon.push(*slot);
        }
        polygons.push(polygon);
    }
    build_from_polygons(&used, &polygons)
}

impl<I: MeshIndex> HalfEdgeMesh<I> {
    /// Reverse the winding of every face.
    ///
    /// The mesh is rebuilt, so ids are compacted as by `collect_garbage`.
    pub fn reverse_orientation(&mut self) -> Result<()> {
        if self.num_faces() == 0 {
            return Ok(());
        }
        let (vertices, mut polygons) = to_polygons(self);
        for polygon in &mut polygons {
            polygon.reverse();
        }
        *self = build_from_polygons(&vertices, &polygons)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_triangle() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2]];
        (vertices, faces)
    }

    fn two_triangles() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        // Two triangles sharing an edge
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, -1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [1, 0, 3]];
        (vertices, faces)
    }

    #[test]
    fn test_single_triangle() {
        let (vertices, faces) = single_triangle();
        let mesh: HalfEdgeMesh<u32> = build_from_triangles(&vertices, &faces).unwrap();

        assert_eq!(mesh.num_vertices(), 3);
        assert_eq!(mesh.num_faces(), 1);
        // 3 interior half-edges + 3 boundary half-edges
        assert_eq!(mesh.num_halfedges(), 6);
        assert!(mesh.is_valid());

        // All vertices should be on boundary
        for v in mesh.vertex_ids() {
            assert!(mesh.is_boundary_vertex(v));
        }
    }

    #[test]
    fn test_two_triangles() {
        let (vertices, faces) = two_triangles();
        let mesh: HalfEdgeMesh<u32> = build_from_triangles(&vertices, &faces).unwrap();

        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_faces(), 2);
        // 6 interior half-edges + 4 boundary half-edges
        assert_eq!(mesh.num_halfedges(), 10);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_roundtrip() {
        let (vertices, faces) = two_triangles();
        let mesh: HalfEdgeMesh<u32> = build_from_triangles(&vertices, &faces).unwrap();

        let (out_verts, out_faces) = to_face_vertex(&mesh);

        assert_eq!(vertices.len(), out_verts.len());
        assert_eq!(faces.len(), out_faces.len());

        // Positions should match
        for (v_in, v_out) in vertices.iter().zip(out_verts.iter()) {
            assert!((v_in - v_out).norm() < 1e-10);
        }
    }

    #[test]
    fn test_invalid_vertex_index() {
        let vertices = vec![Point3::new(0.0, 0.0, 0.0)];
        let faces = vec![[0, 1, 2]]; // Indices 1 and 2 are invalid

        let result: Result<HalfEdgeMesh<u32>> = build_from_triangles(&vertices, &faces);
        assert!(matches!(result, Err(MeshError::InvalidVertexIndex { .. })));
    }

    #[test]
    fn test_degenerate_face() {
        let (vertices, _) = single_triangle();
        let faces = vec![[0, 0, 2]]; // Degenerate: v0 == v1

        let result: Result<HalfEdgeMesh<u32>> = build_from_triangles(&vertices, &faces);
        assert!(matches!(result, Err(MeshError::DegenerateFace { face: 0 })));
    }

    #[test]
    fn test_same_direction_edge_rejected() {
        let (vertices, _) = two_triangles();
        // Both faces traverse 0 -> 1
        let faces = vec![[0, 1, 2], [0, 1, 3]];

        let result: Result<HalfEdgeMesh<u32>> = build_from_triangles(&vertices, &faces);
        assert!(matches!(result, Err(MeshError::NonManifoldInput { .. })));
    }

    #[test]
    fn test_bowtie_vertex_is_duplicated() {
        // Two triangles touching only at vertex 0
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(-1.0, -1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [0, 3, 4]];
        let mesh: HalfEdgeMesh<u32> = build_from_triangles(&vertices, &faces).unwrap();

        assert_eq!(mesh.num_vertices(), 6);
        assert!(mesh.is_valid());
        assert_eq!(mesh.boundary_loops().len(), 2);
        assert_eq!(mesh.connected_components().len(), 2);
    }

    #[test]
    fn test_polygon_faces() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(2.0, 0.5, 0.0),
        ];
        let faces: Vec<Vec<usize>> = vec![vec![0, 1, 2, 3], vec![1, 4, 2]];
        let mesh: HalfEdgeMesh<u32> = build_from_polygons(&vertices, &faces).unwrap();

        assert_eq!(mesh.num_faces(), 2);
        assert_eq!(mesh.num_edges(), 6);
        assert!(!mesh.is_triangle_mesh());
        assert!(mesh.is_valid());
        assert!((mesh.face_area(FaceId::new(0)) - 1.0).abs() < 1e-12);

        let (_, polygons) = to_polygons(&mesh);
        assert_eq!(polygons[0], vec![0, 1, 2, 3]);
        let (_, triangles) = to_face_vertex(&mesh);
        assert_eq!(triangles.len(), 3);
    }

    #[test]
    fn test_reverse_orientation() {
        let (vertices, faces) = two_triangles();
        let mut mesh: HalfEdgeMesh<u32> = build_from_triangles(&vertices, &faces).unwrap();
        let before = mesh.face_normal(FaceId::new(0));
        mesh.reverse_orientation().unwrap();

        assert!(mesh.is_valid());
        assert!((mesh.face_normal(FaceId::new(0)) + before).norm() < 1e-12);
    }
}
