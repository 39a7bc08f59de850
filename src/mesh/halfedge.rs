//! Half-edge mesh data structure.
//!
//! This module provides a half-edge (doubly-connected edge list) representation
//! for polygon and triangle meshes. This structure enables O(1) adjacency queries
//! and local edits, and is the foundation for every algorithm in the crate.
//!
//! # Structure
//!
//! - Each edge is split into two **half-edges** pointing in opposite directions.
//!   The two halves are stored next to each other, so the twin of half-edge `h`
//!   is `h ^ 1` and the pair index is the [`EdgeId`].
//! - Each half-edge knows its **target vertex**, its **next** and **prev**
//!   half-edge around the face, and its incident **face**.
//! - Each vertex stores one outgoing half-edge
//! - Each face stores one half-edge on its boundary
//!
//! # Boundary Handling
//!
//! Boundary half-edges (on mesh boundaries) have an invalid face ID. They are
//! linked into loops through `next`/`prev`, and a boundary vertex always stores
//! its outgoing boundary half-edge.
//!
//! # Removal
//!
//! Local edits (collapse) leave tombstones behind. Counts and iterators only
//! report live elements; [`HalfEdgeMesh::collect_garbage`] compacts the arenas.

use std::collections::HashSet;

use nalgebra::{Point3, Vector3};

use super::index::{EdgeId, FaceId, HalfEdgeId, MeshIndex, VertexId};
use crate::geometry::Aabb;

/// A vertex in the half-edge mesh.
#[derive(Debug, Clone)]
pub struct Vertex<I: MeshIndex = u32> {
    /// The 3D position of this vertex.
    pub position: Point3<f64>,

    /// One outgoing half-edge from this vertex.
    /// For boundary vertices, this is guaranteed to be a boundary half-edge.
    pub halfedge: HalfEdgeId<I>,
}

impl<I: MeshIndex> Vertex<I> {
    /// Create a new isolated vertex at the given position.
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            halfedge: HalfEdgeId::invalid(),
        }
    }
}

/// A half-edge in the mesh.
#[derive(Debug, Clone, Copy)]
pub struct HalfEdge<I: MeshIndex = u32> {
    /// The vertex this half-edge points to.
    pub target: VertexId<I>,

    /// The next half-edge around the face (counter-clockwise).
    pub next: HalfEdgeId<I>,

    /// The previous half-edge around the face.
    pub prev: HalfEdgeId<I>,

    /// The face this half-edge belongs to.
    /// Invalid for boundary half-edges.
    pub face: FaceId<I>,
}

impl<I: MeshIndex> HalfEdge<I> {
    /// Create a new unlinked half-edge pointing at `target`.
    pub fn new(target: VertexId<I>) -> Self {
        Self {
            target,
            next: HalfEdgeId::invalid(),
            prev: HalfEdgeId::invalid(),
            face: FaceId::invalid(),
        }
    }

    /// Check if this half-edge is on the boundary.
    #[inline]
    pub fn is_boundary(&self) -> bool {
        !self.face.is_valid()
    }
}

/// A face in the half-edge mesh.
#[derive(Debug, Clone, Copy)]
pub struct Face<I: MeshIndex = u32> {
    /// One half-edge on the boundary of this face.
    pub halfedge: HalfEdgeId<I>,
}

impl<I: MeshIndex> Face<I> {
    /// Create a new face with the given half-edge.
    pub fn new(halfedge: HalfEdgeId<I>) -> Self {
        Self { halfedge }
    }
}

/// A half-edge mesh.
///
/// Stores vertices, half-edges and faces with full connectivity information.
/// Faces are usually triangles; polygons are accepted by the builders and
/// removed by [`crate::algo::repair::triangulate_faces`].
#[derive(Debug, Clone)]
pub struct HalfEdgeMesh<I: MeshIndex = u32> {
    pub(crate) vertices: Vec<Vertex<I>>,
    pub(crate) halfedges: Vec<HalfEdge<I>>,
    pub(crate) faces: Vec<Face<I>>,

    pub(crate) vertex_removed: Vec<bool>,
    pub(crate) edge_removed: Vec<bool>,
    pub(crate) face_removed: Vec<bool>,

    pub(crate) removed_vertices: usize,
    pub(crate) removed_edges: usize,
    pub(crate) removed_faces: usize,
}

impl<I: MeshIndex> Default for HalfEdgeMesh<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: MeshIndex> HalfEdgeMesh<I> {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self::with_capacity(0, 0)
    }

    /// Create a mesh with pre-allocated capacity.
    pub fn with_capacity(num_vertices: usize, num_faces: usize) -> Self {
        // For a closed triangle mesh E = 3F/2, so HE = 3F; leave room for a boundary.
        let num_halfedges = num_faces * 3 + num_faces / 2;

        Self {
            vertices: Vec::with_capacity(num_vertices),
            halfedges: Vec::with_capacity(num_halfedges),
            faces: Vec::with_capacity(num_faces),
            vertex_removed: Vec::with_capacity(num_vertices),
            edge_removed: Vec::with_capacity(num_halfedges / 2),
            face_removed: Vec::with_capacity(num_faces),
            removed_vertices: 0,
            removed_edges: 0,
            removed_faces: 0,
        }
    }

    /// Remove every element. Ids handed out before become invalid.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.halfedges.clear();
        self.faces.clear();
        self.vertex_removed.clear();
        self.edge_removed.clear();
        self.face_removed.clear();
        self.removed_vertices = 0;
        self.removed_edges = 0;
        self.removed_faces = 0;
    }

    /// Whether the mesh has no vertices at all.
    pub fn is_empty(&self) -> bool {
        self.num_vertices() == 0
    }

    // ==================== Accessors ====================

    /// Number of live vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len() - self.removed_vertices
    }

    /// Number of live edges.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.halfedges.len() / 2 - self.removed_edges
    }

    /// Number of live half-edges.
    #[inline]
    pub fn num_halfedges(&self) -> usize {
        2 * self.num_edges()
    }

    /// Number of live faces.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len() - self.removed_faces
    }

    /// Size of the vertex arena, including tombstones.
    ///
    /// Per-vertex scratch buffers are indexed by `VertexId::index()` and must
    /// have this length.
    #[inline]
    pub fn vertex_capacity(&self) -> usize {
        self.vertices.len()
    }

    /// Size of the face arena, including tombstones.
    #[inline]
    pub fn face_capacity(&self) -> usize {
        self.faces.len()
    }

    /// Size of the edge arena, including tombstones.
    #[inline]
    pub fn edge_capacity(&self) -> usize {
        self.halfedges.len() / 2
    }

    /// Whether the arenas contain tombstones.
    #[inline]
    pub fn has_garbage(&self) -> bool {
        self.removed_vertices + self.removed_edges + self.removed_faces > 0
    }

    /// Get a vertex by ID.
    #[inline]
    pub fn vertex(&self, id: VertexId<I>) -> &Vertex<I> {
        &self.vertices[id.index()]
    }

    #[inline]
    pub(crate) fn vertex_mut(&mut self, id: VertexId<I>) -> &mut Vertex<I> {
        &mut self.vertices[id.index()]
    }

    /// Get a half-edge by ID.
    #[inline]
    pub fn halfedge(&self, id: HalfEdgeId<I>) -> &HalfEdge<I> {
        &self.halfedges[id.index()]
    }

    #[inline]
    pub(crate) fn halfedge_mut(&mut self, id: HalfEdgeId<I>) -> &mut HalfEdge<I> {
        &mut self.halfedges[id.index()]
    }

    /// Get a face by ID.
    #[inline]
    pub fn face(&self, id: FaceId<I>) -> &Face<I> {
        &self.faces[id.index()]
    }

    #[inline]
    pub(crate) fn face_mut(&mut self, id: FaceId<I>) -> &mut Face<I> {
        &mut self.faces[id.index()]
    }

    /// Get the position of a vertex.
    #[inline]
    pub fn position(&self, v: VertexId<I>) -> &Point3<f64> {
        &self.vertex(v).position
    }

    /// Set the position of a vertex.
    #[inline]
    pub fn set_position(&mut self, v: VertexId<I>, pos: Point3<f64>) {
        self.vertex_mut(v).position = pos;
    }

    /// Whether a vertex id refers to a live vertex.
    #[inline]
    pub fn is_live_vertex(&self, v: VertexId<I>) -> bool {
        v.is_valid() && v.index() < self.vertices.len() && !self.vertex_removed[v.index()]
    }

    /// Whether an edge id refers to a live edge.
    #[inline]
    pub fn is_live_edge(&self, e: EdgeId<I>) -> bool {
        e.is_valid() && e.index() < self.edge_removed.len() && !self.edge_removed[e.index()]
    }

    /// Whether a face id refers to a live face.
    #[inline]
    pub fn is_live_face(&self, f: FaceId<I>) -> bool {
        f.is_valid() && f.index() < self.faces.len() && !self.face_removed[f.index()]
    }

    // ==================== Topology Queries ====================

    /// Get the twin (opposite) half-edge.
    #[inline]
    pub fn twin(&self, he: HalfEdgeId<I>) -> HalfEdgeId<I> {
        he.pair()
    }

    /// Get the next half-edge around the face.
    #[inline]
    pub fn next(&self, he: HalfEdgeId<I>) -> HalfEdgeId<I> {
        self.halfedge(he).next
    }

    /// Get the previous half-edge around the face.
    #[inline]
    pub fn prev(&self, he: HalfEdgeId<I>) -> HalfEdgeId<I> {
        self.halfedge(he).prev
    }

    /// Get the vertex a half-edge points to.
    #[inline]
    pub fn target(&self, he: HalfEdgeId<I>) -> VertexId<I> {
        self.halfedge(he).target
    }

    /// Get the vertex a half-edge starts from.
    #[inline]
    pub fn origin(&self, he: HalfEdgeId<I>) -> VertexId<I> {
        self.target(he.pair())
    }

    /// Get the face of a half-edge.
    #[inline]
    pub fn face_of(&self, he: HalfEdgeId<I>) -> FaceId<I> {
        self.halfedge(he).face
    }

    /// Check if a half-edge is on the boundary.
    #[inline]
    pub fn is_boundary_halfedge(&self, he: HalfEdgeId<I>) -> bool {
        self.halfedge(he).is_boundary()
    }

    /// Check if a vertex is on the boundary (isolated vertices count as boundary).
    pub fn is_boundary_vertex(&self, v: VertexId<I>) -> bool {
        let h = self.vertex(v).halfedge;
        !h.is_valid() || self.is_boundary_halfedge(h)
    }

    /// Whether a vertex has no incident edge.
    #[inline]
    pub fn is_isolated(&self, v: VertexId<I>) -> bool {
        !self.vertex(v).halfedge.is_valid()
    }

    /// Check if an edge (represented by one of its half-edges) is on the boundary.
    #[inline]
    pub fn is_boundary_edge(&self, he: HalfEdgeId<I>) -> bool {
        self.is_boundary_halfedge(he) || self.is_boundary_halfedge(he.pair())
    }

    /// Find the half-edge going from `from` to `to`, if the edge exists.
    pub fn find_halfedge(&self, from: VertexId<I>, to: VertexId<I>) -> Option<HalfEdgeId<I>> {
        self.vertex_halfedges(from).find(|&h| self.target(h) == to)
    }

    /// Whether `a` and `b` are connected by an edge.
    #[inline]
    pub fn are_adjacent(&self, a: VertexId<I>, b: VertexId<I>) -> bool {
        self.find_halfedge(a, b).is_some()
    }

    // ==================== Iteration ====================

    /// Iterate over all live vertex IDs.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId<I>> + '_ {
        (0..self.vertices.len())
            .filter(|&i| !self.vertex_removed[i])
            .map(VertexId::new)
    }

    /// Iterate over all live half-edge IDs.
    pub fn halfedge_ids(&self) -> impl Iterator<Item = HalfEdgeId<I>> + '_ {
        (0..self.halfedges.len())
            .filter(|&i| !self.edge_removed[i >> 1])
            .map(HalfEdgeId::new)
    }

    /// Iterate over all live edge IDs.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId<I>> + '_ {
        (0..self.edge_removed.len())
            .filter(|&i| !self.edge_removed[i])
            .map(EdgeId::new)
    }

    /// Iterate over all live face IDs.
    pub fn face_ids(&self) -> impl Iterator<Item = FaceId<I>> + '_ {
        (0..self.faces.len())
            .filter(|&i| !self.face_removed[i])
            .map(FaceId::new)
    }

    /// Iterate over outgoing half-edges around a vertex.
    pub fn vertex_halfedges(&self, v: VertexId<I>) -> VertexHalfEdgeIter<'_, I> {
        VertexHalfEdgeIter::new(self, v)
    }

    /// Iterate over vertices adjacent to a vertex.
    pub fn vertex_neighbors(&self, v: VertexId<I>) -> impl Iterator<Item = VertexId<I>> + '_ {
        self.vertex_halfedges(v).map(|he| self.target(he))
    }

    /// Iterate over faces adjacent to a vertex.
    pub fn vertex_faces(&self, v: VertexId<I>) -> impl Iterator<Item = FaceId<I>> + '_ {
        self.vertex_halfedges(v).filter_map(|he| {
            let f = self.face_of(he);
            f.is_valid().then_some(f)
        })
    }

    /// Iterate over half-edges around a face.
    pub fn face_halfedges(&self, f: FaceId<I>) -> FaceHalfEdgeIter<'_, I> {
        FaceHalfEdgeIter::new(self, f)
    }

    /// Iterate over vertices of a face, in winding order.
    pub fn face_vertices(&self, f: FaceId<I>) -> impl Iterator<Item = VertexId<I>> + '_ {
        self.face_halfedges(f).map(|he| self.origin(he))
    }

    /// Iterate over faces sharing an edge with `f`.
    pub fn face_neighbors(&self, f: FaceId<I>) -> impl Iterator<Item = FaceId<I>> + '_ {
        self.face_halfedges(f).filter_map(|he| {
            let g = self.face_of(he.pair());
            g.is_valid().then_some(g)
        })
    }

    /// Number of corners of a face.
    pub fn face_degree(&self, f: FaceId<I>) -> usize {
        self.face_halfedges(f).count()
    }

    /// Get the three vertices of a triangular face.
    pub fn face_triangle(&self, f: FaceId<I>) -> [VertexId<I>; 3] {
        let he0 = self.face(f).halfedge;
        let he1 = self.next(he0);
        let he2 = self.next(he1);
        [self.origin(he0), self.origin(he1), self.origin(he2)]
    }

    /// Get the positions of the three vertices of a triangular face.
    pub fn face_positions(&self, f: FaceId<I>) -> [Point3<f64>; 3] {
        let [v0, v1, v2] = self.face_triangle(f);
        [*self.position(v0), *self.position(v1), *self.position(v2)]
    }

    /// Every boundary loop, each as the ordered list of its boundary half-edges.
    pub fn boundary_loops(&self) -> Vec<Vec<HalfEdgeId<I>>> {
        let mut visited: HashSet<HalfEdgeId<I>> = HashSet::new();
        let mut loops = Vec::new();

        for start in self.halfedge_ids() {
            if !self.is_boundary_halfedge(start) || visited.contains(&start) {
                continue;
            }
            let mut cycle = Vec::new();
            let mut he = start;
            loop {
                if !visited.insert(he) {
                    break;
                }
                cycle.push(he);
                he = self.next(he);
                if he == start || !he.is_valid() {
                    break;
                }
            }
            loops.push(cycle);
        }

        loops
    }

    /// Whether the mesh has no boundary edge.
    pub fn is_closed(&self) -> bool {
        self.halfedge_ids().all(|h| !self.is_boundary_halfedge(h))
    }

    /// Whether every face is a triangle.
    pub fn is_triangle_mesh(&self) -> bool {
        self.face_ids().all(|f| self.face_degree(f) == 3)
    }

    /// Group faces into edge-connected components.
    pub fn connected_components(&self) -> Vec<Vec<FaceId<I>>> {
        let mut component = vec![usize::MAX; self.faces.len()];
        let mut components = Vec::new();

        for seed in self.face_ids() {
            if component[seed.index()] != usize::MAX {
                continue;
            }
            let id = components.len();
            let mut members = Vec::new();
            let mut stack = vec![seed];
            component[seed.index()] = id;
            while let Some(f) = stack.pop() {
                members.push(f);
                for g in self.face_neighbors(f) {
                    if component[g.index()] == usize::MAX {
                        component[g.index()] = id;
                        stack.push(g);
                    }
                }
            }
            components.push(members);
        }

        components
    }

    // ==================== Geometry ====================

    /// Unit normal of a face (Newell's method, valid for polygons).
    pub fn face_normal(&self, f: FaceId<I>) -> Vector3<f64> {
        let n = self.face_area_vector(f);
        let len = n.norm();
        if len > 0.0 {
            n / len
        } else {
            n
        }
    }

    /// Area-weighted normal of a face: half the Newell vector.
    pub fn face_area_vector(&self, f: FaceId<I>) -> Vector3<f64> {
        let mut n = Vector3::zeros();
        for he in self.face_halfedges(f) {
            let p = self.position(self.origin(he));
            let q = self.position(self.target(he));
            n.x += (p.y - q.y) * (p.z + q.z);
            n.y += (p.z - q.z) * (p.x + q.x);
            n.z += (p.x - q.x) * (p.y + q.y);
        }
        n * 0.5
    }

    /// Compute the area of a face.
    pub fn face_area(&self, f: FaceId<I>) -> f64 {
        self.face_area_vector(f).norm()
    }

    /// Compute the area-weighted normal at a vertex.
    ///
    /// Returns the zero vector for isolated vertices and fully degenerate fans.
    pub fn vertex_normal(&self, v: VertexId<I>) -> Vector3<f64> {
        let mut normal = Vector3::zeros();
        for f in self.vertex_faces(v) {
            normal += self.face_area_vector(f);
        }
        let len = normal.norm();
        if len > 1e-300 {
            normal / len
        } else {
            normal
        }
    }

    /// Compute the length of an edge.
    pub fn edge_length(&self, he: HalfEdgeId<I>) -> f64 {
        self.edge_vector(he).norm()
    }

    /// Compute the edge vector (from origin to target).
    pub fn edge_vector(&self, he: HalfEdgeId<I>) -> Vector3<f64> {
        self.position(self.target(he)) - self.position(self.origin(he))
    }

    /// Compute the midpoint of an edge.
    pub fn edge_midpoint(&self, he: HalfEdgeId<I>) -> Point3<f64> {
        let p0 = self.position(self.origin(he));
        let p1 = self.position(self.target(he));
        Point3::from((p0.coords + p1.coords) * 0.5)
    }

    /// Dihedral angle across an edge in radians, `0` for a flat configuration.
    ///
    /// Boundary edges return `0`.
    pub fn dihedral_angle(&self, he: HalfEdgeId<I>) -> f64 {
        let f0 = self.face_of(he);
        let f1 = self.face_of(he.pair());
        if !f0.is_valid() || !f1.is_valid() {
            return 0.0;
        }
        let n0 = self.face_normal(f0);
        let n1 = self.face_normal(f1);
        let axis = self.edge_vector(he);
        let len = axis.norm();
        if len == 0.0 {
            return 0.0;
        }
        let sin = n0.cross(&n1).dot(&(axis / len));
        let cos = n0.dot(&n1);
        sin.atan2(cos)
    }

    /// Compute the valence (degree) of a vertex.
    pub fn valence(&self, v: VertexId<I>) -> usize {
        self.vertex_halfedges(v).count()
    }

    /// Compute the centroid of a face.
    pub fn face_centroid(&self, f: FaceId<I>) -> Point3<f64> {
        let mut sum = Vector3::zeros();
        let mut n = 0usize;
        for v in self.face_vertices(f) {
            sum += self.position(v).coords;
            n += 1;
        }
        Point3::from(sum / n.max(1) as f64)
    }

    /// Compute the bounding box of the live vertices.
    pub fn bounding_box(&self) -> Option<Aabb> {
        if self.num_vertices() == 0 {
            return None;
        }
        Some(Aabb::from_points(
            self.vertex_ids().map(|v| *self.position(v)),
        ))
    }

    /// Compute the total surface area of the mesh.
    pub fn surface_area(&self) -> f64 {
        self.face_ids().map(|f| self.face_area(f)).sum()
    }

    /// Signed enclosed volume (positive for an outward-oriented closed mesh).
    pub fn volume(&self) -> f64 {
        let mut volume = 0.0;
        for f in self.face_ids() {
            let hs: Vec<_> = self.face_halfedges(f).collect();
            let p0 = self.position(self.origin(hs[0])).coords;
            for w in hs[1..].windows(2) {
                let p1 = self.position(self.origin(w[0])).coords;
                let p2 = self.position(self.origin(w[1])).coords;
                volume += p0.dot(&p1.cross(&p2));
            }
        }
        volume / 6.0
    }

    /// Mean length over all live edges (0 for an edgeless mesh).
    pub fn average_edge_length(&self) -> f64 {
        let n = self.num_edges();
        if n == 0 {
            return 0.0;
        }
        self.edge_ids()
            .map(|e| self.edge_length(e.halfedge(0)))
            .sum::<f64>()
            / n as f64
    }

    /// V − E + F over the live elements.
    pub fn euler_characteristic(&self) -> i64 {
        self.num_vertices() as i64 - self.num_edges() as i64 + self.num_faces() as i64
    }

    // ==================== Construction ====================

    /// Add a new isolated vertex and return its ID.
    pub fn add_vertex(&mut self, position: Point3<f64>) -> VertexId<I> {
        let id = VertexId::new(self.vertices.len());
        self.vertices.push(Vertex::new(position));
        self.vertex_removed.push(false);
        id
    }

    /// Allocate a twin pair `from -> to` / `to -> from`, both unlinked.
    pub(crate) fn new_edge(&mut self, from: VertexId<I>, to: VertexId<I>) -> HalfEdgeId<I> {
        let h = HalfEdgeId::new(self.halfedges.len());
        self.halfedges.push(HalfEdge::new(to));
        self.halfedges.push(HalfEdge::new(from));
        self.edge_removed.push(false);
        h
    }

    pub(crate) fn new_face(&mut self, halfedge: HalfEdgeId<I>) -> FaceId<I> {
        let f = FaceId::new(self.faces.len());
        self.faces.push(Face::new(halfedge));
        self.face_removed.push(false);
        f
    }

    pub(crate) fn remove_vertex_slot(&mut self, v: VertexId<I>) {
        if !self.vertex_removed[v.index()] {
            self.vertex_removed[v.index()] = true;
            self.vertices[v.index()].halfedge = HalfEdgeId::invalid();
            self.removed_vertices += 1;
        }
    }

    pub(crate) fn remove_edge_slot(&mut self, e: EdgeId<I>) {
        if !self.edge_removed[e.index()] {
            self.edge_removed[e.index()] = true;
            self.removed_edges += 1;
        }
    }

    pub(crate) fn remove_face_slot(&mut self, f: FaceId<I>) {
        if !self.face_removed[f.index()] {
            self.face_removed[f.index()] = true;
            self.removed_faces += 1;
        }
    }

    /// Link `a -> b` in the next/prev chain.
    #[inline]
    pub(crate) fn link(&mut self, a: HalfEdgeId<I>, b: HalfEdgeId<I>) {
        self.halfedge_mut(a).next = b;
        self.halfedge_mut(b).prev = a;
    }

    /// Compact the arenas, dropping tombstones. All ids are renumbered.
    ///
    /// Returns the old-to-new vertex map (`None` for removed vertices).
    pub fn collect_garbage(&mut self) -> Vec<Option<VertexId<I>>> {
        let mut vmap: Vec<Option<VertexId<I>>> = vec![None; self.vertices.len()];
        let mut hmap: Vec<HalfEdgeId<I>> = vec![HalfEdgeId::invalid(); self.halfedges.len()];
        let mut fmap: Vec<FaceId<I>> = vec![FaceId::invalid(); self.faces.len()];

        if !self.has_garbage() {
            for (i, slot) in vmap.iter_mut().enumerate() {
                *slot = Some(VertexId::new(i));
            }
            return vmap;
        }

        let mut next_v = 0;
        for (i, slot) in vmap.iter_mut().enumerate() {
            if !self.vertex_removed[i] {
                *slot = Some(VertexId::new(next_v));
                next_v += 1;
            }
        }
        let mut next_e = 0;
        for e in 0..self.edge_removed.len() {
            if !self.edge_removed[e] {
                hmap[2 * e] = HalfEdgeId::new(2 * next_e);
                hmap[2 * e + 1] = HalfEdgeId::new(2 * next_e + 1);
                next_e += 1;
            }
        }
        let mut next_f = 0;
        for (i, slot) in fmap.iter_mut().enumerate() {
            if !self.face_removed[i] {
                *slot = FaceId::new(next_f);
                next_f += 1;
            }
        }

        let remap_h = |h: HalfEdgeId<I>| {
            if h.is_valid() {
                hmap[h.index()]
            } else {
                h
            }
        };
        let remap_f = |f: FaceId<I>| if f.is_valid() { fmap[f.index()] } else { f };

        let vertices: Vec<Vertex<I>> = self
            .vertices
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.vertex_removed[*i])
            .map(|(_, v)| Vertex {
                position: v.position,
                halfedge: remap_h(v.halfedge),
            })
            .collect();

        let halfedges: Vec<HalfEdge<I>> = self
            .halfedges
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.edge_removed[i >> 1])
            .map(|(_, h)| HalfEdge {
                target: vmap[h.target.index()].unwrap_or_default(),
                next: remap_h(h.next),
                prev: remap_h(h.prev),
                face: remap_f(h.face),
            })
            .collect();

        let faces: Vec<Face<I>> = self
            .faces
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.face_removed[*i])
            .map(|(_, f)| Face::new(remap_h(f.halfedge)))
            .collect();

        self.vertex_removed = vec![false; vertices.len()];
        self.edge_removed = vec![false; halfedges.len() / 2];
        self.face_removed = vec![false; faces.len()];
        self.vertices = vertices;
        self.halfedges = halfedges;
        self.faces = faces;
        self.removed_vertices = 0;
        self.removed_edges = 0;
        self.removed_faces = 0;

        vmap
    }

    // ==================== Validation ====================

    /// Check that all connectivity is consistent.
    ///
    /// Verifies twin/next/prev symmetry, that every face cycle closes, that
    /// each vertex's half-edge leaves that vertex, that boundary vertices store
    /// a boundary half-edge and that every vertex has a single fan.
    pub fn is_valid(&self) -> bool {
        for h in self.halfedge_ids() {
            let he = self.halfedge(h);
            if !he.next.is_valid() || !he.prev.is_valid() || !self.is_live_vertex(he.target) {
                return false;
            }
            if self.halfedge(he.next).prev != h || self.halfedge(he.prev).next != h {
                return false;
            }
            if self.origin(he.next) != he.target {
                return false;
            }
            if he.target == self.origin(h) {
                return false;
            }
            if he.face.is_valid() {
                if !self.is_live_face(he.face) || self.face_of(he.next) != he.face {
                    return false;
                }
            } else if !self.is_boundary_halfedge(he.next) {
                return false;
            }
        }

        for f in self.face_ids() {
            let start = self.face(f).halfedge;
            if !start.is_valid() || self.face_of(start) != f {
                return false;
            }
            let mut n = 0;
            let mut he = start;
            loop {
                n += 1;
                he = self.next(he);
                if he == start {
                    break;
                }
                if n > self.halfedges.len() {
                    return false;
                }
            }
            if n < 3 {
                return false;
            }
        }

        for v in self.vertex_ids() {
            let start = self.vertex(v).halfedge;
            if !start.is_valid() {
                continue;
            }
            if self.origin(start) != v {
                return false;
            }
            // Every outgoing half-edge must be reachable by rotation (single fan),
            // and at most one may be a boundary half-edge.
            let mut boundary = 0;
            let mut visited = 0usize;
            let mut he = start;
            loop {
                if self.origin(he) != v {
                    return false;
                }
                if self.is_boundary_halfedge(he) {
                    boundary += 1;
                }
                visited += 1;
                he = self.next(he.pair());
                if he == start {
                    break;
                }
                if visited > self.halfedges.len() {
                    return false;
                }
            }
            if boundary > 1 || (boundary == 1 && !self.is_boundary_halfedge(start)) {
                return false;
            }
        }

        let mut degree = vec![0usize; self.vertices.len()];
        for h in self.halfedge_ids() {
            degree[self.origin(h).index()] += 1;
        }
        self.vertex_ids()
            .all(|v| degree[v.index()] == self.valence(v))
    }
}

/// Iterator over outgoing half-edges around a vertex.
pub struct VertexHalfEdgeIter<'a, I: MeshIndex = u32> {
    mesh: &'a HalfEdgeMesh<I>,
    start: HalfEdgeId<I>,
    current: HalfEdgeId<I>,
    done: bool,
}

impl<'a, I: MeshIndex> VertexHalfEdgeIter<'a, I> {
    fn new(mesh: &'a HalfEdgeMesh<I>, v: VertexId<I>) -> Self {
        let start = mesh.vertex(v).halfedge;
        Self {
            mesh,
            start,
            current: start,
            done: !start.is_valid(),
        }
    }
}

impl<'a, I: MeshIndex> Iterator for VertexHalfEdgeIter<'a, I> {
    type Item = HalfEdgeId<I>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.current;

        // twin(he) comes back into v; the half-edge after it leaves v again.
        self.current = self.mesh.next(self.current.pair());

        if self.current == self.start || !self.current.is_valid() {
            self.done = true;
        }

        Some(result)
    }
}

/// Iterator over half-edges around a face.
pub struct FaceHalfEdgeIter<'a, I: MeshIndex = u32> {
    mesh: &'a HalfEdgeMesh<I>,
    start: HalfEdgeId<I>,
    current: HalfEdgeId<I>,
    done: bool,
}

impl<'a, I: MeshIndex> FaceHalfEdgeIter<'a, I> {
    fn new(mesh: &'a HalfEdgeMesh<I>, f: FaceId<I>) -> Self {
        let start = mesh.face(f).halfedge;
        Self {
            mesh,
            start,
            current: start,
            done: !start.is_valid(),
        }
    }
}

impl<'a, I: MeshIndex> Iterator for FaceHalfEdgeIter<'a, I> {
    type Item = HalfEdgeId<I>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.current;
        self.current = self.mesh.next(self.current);

        if self.current == self.start {
            self.done = true;
        }

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::build_from_triangles;

    fn tetrahedron() -> HalfEdgeMesh {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
        build_from_triangles(&vertices, &faces).unwrap()
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = HalfEdgeMesh::<u32>::new();
        assert_eq!(mesh.num_vertices(), 0);
        assert_eq!(mesh.num_halfedges(), 0);
        assert_eq!(mesh.num_faces(), 0);
        assert!(mesh.is_valid());
        assert!(mesh.bounding_box().is_none());
    }

    #[test]
    fn test_add_vertex() {
        let mut mesh = HalfEdgeMesh::<u32>::new();
        let v0 = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
        let v1 = mesh.add_vertex(Point3::new(1.0, 0.0, 0.0));

        assert_eq!(mesh.num_vertices(), 2);
        assert_eq!(v0.index(), 0);
        assert_eq!(v1.index(), 1);
        assert!(mesh.is_isolated(v0));
    }

    #[test]
    fn test_tetrahedron_queries() {
        let mesh = tetrahedron();
        assert_eq!(mesh.num_edges(), 6);
        assert_eq!(mesh.euler_characteristic(), 2);
        assert!(mesh.is_closed());
        assert!(mesh.is_valid());

        for v in mesh.vertex_ids() {
            assert_eq!(mesh.valence(v), 3);
            assert_eq!(mesh.vertex_faces(v).count(), 3);
        }
        assert!((mesh.volume() - 1.0 / 6.0).abs() < 1e-12);
        assert_eq!(mesh.connected_components().len(), 1);
    }

    #[test]
    fn test_find_halfedge() {
        let mesh = tetrahedron();
        let v0 = VertexId::new(0);
        let v1 = VertexId::new(1);
        let h = mesh.find_halfedge(v0, v1).unwrap();
        assert_eq!(mesh.origin(h), v0);
        assert_eq!(mesh.target(h), v1);
        assert_eq!(mesh.origin(mesh.twin(h)), v1);
    }

    #[test]
    fn test_dihedral_angle_flat() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [1, 3, 2]];
        let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
        let h = mesh
            .find_halfedge(VertexId::new(1), VertexId::new(2))
            .unwrap();
        assert!(mesh.dihedral_angle(h).abs() < 1e-12);
        assert_eq!(mesh.boundary_loops().len(), 1);
        assert_eq!(mesh.boundary_loops()[0].len(), 4);
    }

    #[test]
    fn test_clear() {
        let mut mesh = tetrahedron();
        mesh.clear();
        assert_eq!(mesh.num_vertices(), 0);
        assert_eq!(mesh.num_edges(), 0);
        assert_eq!(mesh.num_faces(), 0);
        assert!(mesh.is_valid());
    }
}
