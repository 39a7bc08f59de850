//! Corefinement of two triangle meshes.
//!
//! Every crossing pair of triangles contributes its intersection segment
//! once, and the segment end points go into a shared pool, so both meshes
//! see exactly the same seam points. Each mesh then receives the pooled
//! points lying on it (vertex snap, edge split or face split) and every
//! segment as an edge: the edges crossing a segment inside the input
//! triangle it lies on are flipped away until the segment itself is an edge.
//! Afterwards the two seams are the same points joined by the same edges.

use std::collections::{HashMap, HashSet, VecDeque};

use nalgebra::{Point2, Point3, Vector3};

use crate::algo::query::{MeshBvh, PointGrid};
use crate::error::{MeshError, Result};
use crate::geometry::{orient2d, point_triangle_distance_squared, triangle_triangle, Aabb, TriangleIntersection};
use crate::mesh::{EdgeId, FaceId, HalfEdgeId, HalfEdgeMesh, MeshIndex, VertexId};

/// Nested splits allowed when a segment runs through existing vertices.
const MAX_SEGMENT_SPLITS: usize = 8;

/// What a corefinement pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Corefinement {
    /// Seam segments inserted into both meshes.
    pub segments: usize,
    /// Vertices added to the two meshes together.
    pub inserted: usize,
}

/// Corefine `a` and `b` in place. Points closer than `tolerance` are the
/// same point.
pub(crate) fn corefine<I: MeshIndex>(
    a: &mut HalfEdgeMesh<I>,
    b: &mut HalfEdgeMesh<I>,
    tolerance: f64,
) -> Result<Corefinement> {
    let seam = Seam::trace(a, [&MeshBvh::new(a), &MeshBvh::new(b)], tolerance);
    if seam.segments.is_empty() {
        return Ok(Corefinement::default());
    }

    let inserted = embed(a, &seam, 0, tolerance)? + embed(b, &seam, 1, tolerance)?;
    log::debug!(
        "corefinement: {} seam segments through {} points, {} vertices inserted",
        seam.segments.len(),
        seam.points.len(),
        inserted
    );
    Ok(Corefinement {
        segments: seam.segments.len(),
        inserted,
    })
}

/// A piece of the intersection curve: two pooled points, and the input
/// faces of the first and second mesh it lies on.
#[derive(Debug, Clone, Copy)]
struct Segment<I: MeshIndex> {
    ends: [usize; 2],
    faces: [FaceId<I>; 2],
}

/// The intersection curve of two meshes.
struct Seam<I: MeshIndex> {
    points: PointGrid,
    segments: Vec<Segment<I>>,
    /// Per mesh and pooled point, the input faces the point lies on.
    support: [Vec<Vec<FaceId<I>>>; 2],
}

impl<I: MeshIndex> Seam<I> {
    fn trace(a: &HalfEdgeMesh<I>, bvhs: [&MeshBvh<I>; 2], tolerance: f64) -> Self {
        let mut seam = Seam {
            points: PointGrid::new(Vec::new(), tolerance),
            segments: Vec::new(),
            support: [Vec::new(), Vec::new()],
        };
        let other = bvhs[1].bvh();

        for fa in a.face_ids() {
            let ta = a.face_positions(fa);
            for j in other.query_box(&Aabb::from_triangle(&ta).inflate(tolerance)) {
                let tb = other.triangle(j);
                let faces = [fa, bvhs[1].face(j)];
                match triangle_triangle(&ta, tb) {
                    TriangleIntersection::Segment(p, q) => seam.add(p, q, faces, tolerance),
                    TriangleIntersection::Coplanar => {
                        // The overlap is bounded by the sides of both triangles.
                        for (sides, window) in [(tb, &ta), (&ta, tb)] {
                            for i in 0..3 {
                                if let Some((p, q)) = clip_segment(&sides[i], &sides[(i + 1) % 3], window, tolerance)
                                {
                                    seam.add(p, q, faces, tolerance);
                                }
                            }
                        }
                    }
                    TriangleIntersection::Point(_) | TriangleIntersection::None => {}
                }
            }
        }

        seam.attach(bvhs, tolerance);
        seam.subdivide(tolerance);
        seam
    }

    fn add(&mut self, p: Point3<f64>, q: Point3<f64>, faces: [FaceId<I>; 2], tolerance: f64) {
        if (q - p).norm() <= tolerance {
            return;
        }
        let ends = [self.pool(p, tolerance), self.pool(q, tolerance)];
        if ends[0] != ends[1] {
            self.segments.push(Segment { ends, faces });
        }
    }

    fn pool(&mut self, p: Point3<f64>, tolerance: f64) -> usize {
        match self.points.within(&p, tolerance).first() {
            Some(&i) => i,
            None => self.points.insert(p),
        }
    }

    /// Find the input faces of both meshes each pooled point lies on.
    fn attach(&mut self, bvhs: [&MeshBvh<I>; 2], tolerance: f64) {
        for (side, mesh_bvh) in bvhs.into_iter().enumerate() {
            let bvh = mesh_bvh.bvh();
            let mut support: Vec<Vec<FaceId<I>>> = (0..self.points.len())
                .map(|k| {
                    let p = self.points.point(k);
                    bvh.query_box(&Aabb::new(*p, *p).inflate(tolerance))
                        .into_iter()
                        .filter(|&j| {
                            let t = bvh.triangle(j);
                            point_triangle_distance_squared(p, &t[0], &t[1], &t[2]) <= tolerance * tolerance
                        })
                        .map(|j| mesh_bvh.face(j))
                        .collect()
                })
                .collect();
            for s in &self.segments {
                for k in s.ends {
                    if !support[k].contains(&s.faces[side]) {
                        support[k].push(s.faces[side]);
                    }
                }
            }
            self.support[side] = support;
        }
    }

    /// Split segments at the pooled points lying on them, so that collinear
    /// pieces coming from different face pairs share their vertices.
    fn subdivide(&mut self, tolerance: f64) {
        let mut on_face: [HashMap<FaceId<I>, Vec<usize>>; 2] = [HashMap::new(), HashMap::new()];
        for (side, faces_of) in on_face.iter_mut().enumerate() {
            for (k, faces) in self.support[side].iter().enumerate() {
                for &f in faces {
                    faces_of.entry(f).or_default().push(k);
                }
            }
        }

        let mut pieces = Vec::with_capacity(self.segments.len());
        for s in &self.segments {
            let p = *self.points.point(s.ends[0]);
            let d = self.points.point(s.ends[1]) - p;
            let len2 = d.norm_squared();

            let mut inner: Vec<(f64, usize)> = Vec::new();
            for side in 0..2 {
                let nearby = on_face[side].get(&s.faces[side]).map_or(&[][..], Vec::as_slice);
                for &k in nearby {
                    if s.ends.contains(&k) || inner.iter().any(|&(_, i)| i == k) {
                        continue;
                    }
                    let x = self.points.point(k);
                    let t = (x - p).dot(&d) / len2;
                    if t > 0.0 && t < 1.0 && (p + d * t - x).norm() <= tolerance {
                        inner.push((t, k));
                    }
                }
            }
            inner.sort_by(|x, y| x.0.total_cmp(&y.0));

            let mut last = s.ends[0];
            for (_, k) in inner {
                pieces.push(Segment { ends: [last, k], faces: s.faces });
                last = k;
            }
            pieces.push(Segment {
                ends: [last, s.ends[1]],
                faces: s.faces,
            });
        }
        self.segments = pieces;
    }
}

/// The part of segment `p q` inside `window`, both lying in one plane.
///
/// The sides of `window` are pushed out by `tolerance`.
fn clip_segment(
    p: &Point3<f64>,
    q: &Point3<f64>,
    window: &[Point3<f64>; 3],
    tolerance: f64,
) -> Option<(Point3<f64>, Point3<f64>)> {
    let normal = (window[1] - window[0]).cross(&(window[2] - window[0]));
    let d = q - p;
    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    for i in 0..3 {
        let a = window[i];
        let inward = normal.cross(&(window[(i + 1) % 3] - a));
        let start = inward.dot(&(p - a)) + tolerance * inward.norm();
        let rate = inward.dot(&d);
        if rate == 0.0 {
            if start < 0.0 {
                return None;
            }
        } else if rate > 0.0 {
            lo = lo.max(-start / rate);
        } else {
            hi = hi.min(-start / rate);
        }
    }
    (lo < hi).then(|| (p + d * lo, p + d * hi))
}

/// Insert the seam into one mesh (`side` 0 for the first, 1 for the second)
/// and return the number of vertices added.
fn embed<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    seam: &Seam<I>,
    side: usize,
    tolerance: f64,
) -> Result<usize> {
    let before = mesh.num_vertices();
    let mut pieces = Pieces::new(mesh);

    let mut vertex_of: Vec<Option<VertexId<I>>> = vec![None; seam.points.len()];
    for (k, support) in seam.support[side].iter().enumerate() {
        if !support.is_empty() {
            vertex_of[k] = Some(pieces.insert_point(mesh, support, seam.points.point(k), tolerance)?);
        }
    }

    for s in &seam.segments {
        let (Some(u), Some(w)) = (vertex_of[s.ends[0]], vertex_of[s.ends[1]]) else {
            continue;
        };
        if u != w {
            pieces.insert_edge(mesh, s.faces[side], u, w, tolerance, 0)?;
        }
    }
    Ok(mesh.num_vertices() - before)
}

/// Faces of a mesh under refinement, grouped by the input face they came
/// from.
struct Pieces<I: MeshIndex> {
    origin: HashMap<FaceId<I>, FaceId<I>>,
    pieces: HashMap<FaceId<I>, Vec<FaceId<I>>>,
    normals: HashMap<FaceId<I>, Vector3<f64>>,
    /// Seam edges already in place, as ordered vertex pairs.
    constrained: HashSet<(VertexId<I>, VertexId<I>)>,
}

impl<I: MeshIndex> Pieces<I> {
    fn new(mesh: &HalfEdgeMesh<I>) -> Self {
        Self {
            origin: HashMap::new(),
            pieces: HashMap::new(),
            normals: mesh.face_ids().map(|f| (f, mesh.face_area_vector(f))).collect(),
            constrained: HashSet::new(),
        }
    }

    fn origin(&self, f: FaceId<I>) -> FaceId<I> {
        self.origin.get(&f).copied().unwrap_or(f)
    }

    fn of(&self, original: FaceId<I>) -> Vec<FaceId<I>> {
        self.pieces.get(&original).cloned().unwrap_or_else(|| vec![original])
    }

    fn adopt(&mut self, f: FaceId<I>, parent: FaceId<I>) {
        let o = self.origin(parent);
        self.origin.insert(f, o);
        self.pieces.entry(o).or_insert_with(|| vec![o]).push(f);
    }

    /// The vertex at `p`, inserted into the pieces of `support` unless one
    /// is already there.
    fn insert_point(
        &mut self,
        mesh: &mut HalfEdgeMesh<I>,
        support: &[FaceId<I>],
        p: &Point3<f64>,
        tolerance: f64,
    ) -> Result<VertexId<I>> {
        let candidates: Vec<FaceId<I>> = support.iter().flat_map(|&o| self.of(o)).collect();

        let mut nearest: Option<(f64, VertexId<I>)> = None;
        for &f in &candidates {
            for v in mesh.face_vertices(f) {
                let d = (mesh.position(v) - p).norm();
                if d <= tolerance && nearest.map_or(true, |(best, _)| d < best) {
                    nearest = Some((d, v));
                }
            }
        }
        if let Some((_, v)) = nearest {
            return Ok(v);
        }

        let face = candidates
            .iter()
            .map(|&f| {
                let [x, y, z] = mesh.face_positions(f);
                (point_triangle_distance_squared(p, &x, &y, &z), f)
            })
            .min_by(|x, y| x.0.total_cmp(&y.0))
            .map(|(_, f)| f)
            .ok_or_else(|| MeshError::degenerate("seam point lies on no face"))?;

        let on_edge = mesh.face_halfedges(face).find(|&h| {
            segment_distance(p, mesh.position(mesh.origin(h)), mesh.position(mesh.target(h))) <= tolerance
        });
        match on_edge {
            Some(h) => self.split_edge(mesh, h, *p),
            None => self.split_face(mesh, face, *p),
        }
    }

    fn split_edge(&mut self, mesh: &mut HalfEdgeMesh<I>, h: HalfEdgeId<I>, p: Point3<f64>) -> Result<VertexId<I>> {
        let e = h.edge();
        let h0 = e.halfedge(0);
        let b = mesh.target(h0);
        let sides = [mesh.face_of(h0), mesh.face_of(h0.pair())];

        let m = mesh.split_edge_at(e, p)?;
        // The new triangle on each side holds the half of the edge ending at b.
        let halves = [mesh.find_halfedge(m, b), mesh.find_halfedge(b, m)];
        for (parent, half) in sides.into_iter().zip(halves) {
            let Some(half) = half else { continue };
            let f = mesh.face_of(half);
            if parent.is_valid() && f.is_valid() && f != parent {
                self.adopt(f, parent);
            }
        }
        Ok(m)
    }

    fn split_face(&mut self, mesh: &mut HalfEdgeMesh<I>, f: FaceId<I>, p: Point3<f64>) -> Result<VertexId<I>> {
        let m = mesh.split_face(f, p)?;
        let created: Vec<FaceId<I>> = mesh.vertex_faces(m).filter(|&g| g != f).collect();
        for g in created {
            self.adopt(g, f);
        }
        Ok(m)
    }

    /// Make `u - w` an edge inside the pieces of `original`.
    fn insert_edge(
        &mut self,
        mesh: &mut HalfEdgeMesh<I>,
        original: FaceId<I>,
        u: VertexId<I>,
        w: VertexId<I>,
        tolerance: f64,
        depth: usize,
    ) -> Result<()> {
        if !mesh.are_adjacent(u, w) {
            self.flip_out(mesh, original, u, w);
        }
        if !mesh.are_adjacent(u, w) {
            // The segment runs through a vertex: insert both halves.
            match self.vertex_on_segment(mesh, original, u, w, tolerance) {
                Some(x) if depth < MAX_SEGMENT_SPLITS => {
                    self.insert_edge(mesh, original, u, x, tolerance, depth + 1)?;
                    return self.insert_edge(mesh, original, x, w, tolerance, depth + 1);
                }
                _ => {
                    return Err(MeshError::degenerate(format!(
                        "seam edge {u} - {w} could not be inserted"
                    )))
                }
            }
        }
        self.constrained.insert(ordered(u, w));
        Ok(())
    }

    /// Flip the edges crossing `u - w` until none is left or no flip helps.
    fn flip_out(&self, mesh: &mut HalfEdgeMesh<I>, original: FaceId<I>, u: VertexId<I>, w: VertexId<I>) {
        let plane = Projection::new(&self.normals.get(&original).copied().unwrap_or_else(Vector3::z));
        let (pu, pw) = (plane.apply(mesh.position(u)), plane.apply(mesh.position(w)));
        let crosses = |mesh: &HalfEdgeMesh<I>, e: EdgeId<I>| {
            let h = e.halfedge(0);
            let (c, d) = (mesh.origin(h), mesh.target(h));
            if c == u || c == w || d == u || d == w {
                return false;
            }
            strictly_crossing(&pu, &pw, &plane.apply(mesh.position(c)), &plane.apply(mesh.position(d)))
        };

        let mut queue: VecDeque<EdgeId<I>> = self
            .edges_of(mesh, original)
            .into_iter()
            .filter(|&e| crosses(mesh, e))
            .collect();
        let limit = 4 * (queue.len() + 1) * (queue.len() + 1);
        let mut rounds = 0;
        while let Some(e) = queue.pop_front() {
            rounds += 1;
            if rounds > limit {
                break;
            }
            if !crosses(mesh, e) {
                continue;
            }
            if self.flippable(mesh, e, &plane) && mesh.flip_edge(e).is_ok() {
                if crosses(mesh, e) {
                    queue.push_back(e);
                }
            } else {
                queue.push_back(e);
            }
        }
    }

    /// An unconstrained edge between two pieces of the same input face whose
    /// quadrilateral is strictly convex.
    fn flippable(&self, mesh: &HalfEdgeMesh<I>, e: EdgeId<I>, plane: &Projection) -> bool {
        let h = e.halfedge(0);
        let t = h.pair();
        let (f, g) = (mesh.face_of(h), mesh.face_of(t));
        if !f.is_valid() || !g.is_valid() || self.origin(f) != self.origin(g) {
            return false;
        }
        let (c, d) = (mesh.origin(h), mesh.target(h));
        if self.constrained.contains(&ordered(c, d)) {
            return false;
        }
        let x = mesh.target(mesh.next(h));
        let y = mesh.target(mesh.next(t));
        let at = |v: VertexId<I>| plane.apply(mesh.position(v));
        strictly_crossing(&at(x), &at(y), &at(c), &at(d))
    }

    fn edges_of(&self, mesh: &HalfEdgeMesh<I>, original: FaceId<I>) -> Vec<EdgeId<I>> {
        let mut edges: Vec<EdgeId<I>> = self
            .of(original)
            .into_iter()
            .flat_map(|f| mesh.face_halfedges(f).map(|h| h.edge()))
            .collect();
        edges.sort_unstable_by_key(|e| e.index());
        edges.dedup();
        edges
    }

    /// The vertex of the pieces of `original` on the open segment `u - w`
    /// nearest to `u`.
    fn vertex_on_segment(
        &self,
        mesh: &HalfEdgeMesh<I>,
        original: FaceId<I>,
        u: VertexId<I>,
        w: VertexId<I>,
        tolerance: f64,
    ) -> Option<VertexId<I>> {
        let (p, q) = (mesh.position(u), mesh.position(w));
        let d = q - p;
        let len2 = d.norm_squared();
        if len2 == 0.0 {
            return None;
        }
        self.of(original)
            .into_iter()
            .flat_map(|f| mesh.face_vertices(f))
            .filter(|&x| x != u && x != w)
            .filter_map(|x| {
                let t = (mesh.position(x) - p).dot(&d) / len2;
                (t > 0.0 && t < 1.0 && segment_distance(mesh.position(x), p, q) <= tolerance).then_some((t, x))
            })
            .min_by(|x, y| x.0.total_cmp(&y.0))
            .map(|(_, x)| x)
    }
}

fn ordered<I: MeshIndex>(u: VertexId<I>, w: VertexId<I>) -> (VertexId<I>, VertexId<I>) {
    if u.index() <= w.index() {
        (u, w)
    } else {
        (w, u)
    }
}

/// Projection onto the coordinate plane most parallel to a face.
#[derive(Debug, Clone, Copy)]
struct Projection(usize);

impl Projection {
    fn new(normal: &Vector3<f64>) -> Self {
        let n = normal.abs();
        Self(if n.x >= n.y && n.x >= n.z {
            0
        } else if n.y >= n.z {
            1
        } else {
            2
        })
    }

    fn apply(self, p: &Point3<f64>) -> Point2<f64> {
        match self.0 {
            0 => Point2::new(p.y, p.z),
            1 => Point2::new(p.z, p.x),
            _ => Point2::new(p.x, p.y),
        }
    }
}

/// Whether the open segments `a b` and `c d` cross at a single interior point.
fn strictly_crossing(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>, d: &Point2<f64>) -> bool {
    orient2d(a, b, c).sign() * orient2d(a, b, d).sign() < 0
        && orient2d(c, d, a).sign() * orient2d(c, d, b).sign() < 0
}

fn segment_distance(p: &Point3<f64>, u: &Point3<f64>, w: &Point3<f64>) -> f64 {
    let uw = w - u;
    let len2 = uw.norm_squared();
    if len2 == 0.0 {
        return (p - u).norm();
    }
    let t = ((p - u).dot(&uw) / len2).clamp(0.0, 1.0);
    (p - (u + uw * t)).norm()
}

/// Vertices of `mesh` within `tolerance` of the surface behind `other`.
pub(crate) fn vertices_on<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    other: &MeshBvh<I>,
    tolerance: f64,
) -> HashSet<VertexId<I>> {
    mesh.vertex_ids()
        .filter(|&v| {
            other
                .closest_point(mesh.position(v))
                .is_some_and(|hit| hit.distance <= tolerance)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::primitives::{make_cube, make_cylinder, make_sphere};

    fn cube(lo: [f64; 3], hi: [f64; 3]) -> HalfEdgeMesh {
        make_cube(&Point3::from(lo), &Point3::from(hi), 1).unwrap()
    }

    /// Edges of `mesh` lying on the surface behind `other`, as end point pairs.
    fn seam_edges(mesh: &HalfEdgeMesh, other: &MeshBvh, tolerance: f64) -> Vec<[Point3<f64>; 2]> {
        let on = vertices_on(mesh, other, tolerance);
        mesh.edge_ids()
            .filter_map(|e| {
                let h = e.halfedge(0);
                let (u, w) = (mesh.origin(h), mesh.target(h));
                let (p, q) = (*mesh.position(u), *mesh.position(w));
                let midpoint = Point3::from((p.coords + q.coords) / 2.0);
                let on_other = on.contains(&u)
                    && on.contains(&w)
                    && other.closest_point(&midpoint).is_some_and(|hit| hit.distance <= tolerance);
                on_other.then_some([p, q])
            })
            .collect()
    }

    /// Both meshes carry the same seam edges.
    fn assert_seams_match(a: &HalfEdgeMesh, a0: &HalfEdgeMesh, b: &HalfEdgeMesh, b0: &HalfEdgeMesh, tolerance: f64) {
        let on_b = seam_edges(a, &MeshBvh::new(b0), tolerance);
        let on_a = seam_edges(b, &MeshBvh::new(a0), tolerance);
        assert!(!on_b.is_empty());
        assert_eq!(on_b.len(), on_a.len());
        let same = |x: &Point3<f64>, y: &Point3<f64>| (x - y).norm() <= 2.0 * tolerance;
        for [p, q] in &on_b {
            assert!(
                on_a.iter()
                    .any(|[r, s]| (same(p, r) && same(q, s)) || (same(p, s) && same(q, r))),
                "seam edge {p} - {q} missing from the second mesh"
            );
        }
    }

    #[test]
    fn test_disjoint_meshes_untouched() {
        let mut a = cube([0.0; 3], [1.0; 3]);
        let mut b = cube([2.0; 3], [3.0; 3]);
        let result = corefine(&mut a, &mut b, 1e-9).unwrap();

        assert_eq!(result, Corefinement::default());
        assert_eq!(a.num_faces(), 12);
        assert_eq!(b.num_faces(), 12);
    }

    #[test]
    fn test_seams_match_on_boxes() {
        let mut a = cube([0.0; 3], [1.0; 3]);
        let mut b = cube([0.5, 0.25, 0.3], [1.5, 1.25, 1.3]);
        let (a0, b0) = (a.clone(), b.clone());
        let result = corefine(&mut a, &mut b, 1e-9).unwrap();

        assert!(result.segments > 0 && result.inserted > 0);
        assert!(a.is_valid() && a.is_closed());
        assert!(b.is_valid() && b.is_closed());
        assert!((a.volume() - a0.volume()).abs() < 1e-12);
        assert!((b.volume() - b0.volume()).abs() < 1e-12);
        assert_seams_match(&a, &a0, &b, &b0, 1e-9);
    }

    #[test]
    fn test_seams_match_on_spheres() {
        let mut a: HalfEdgeMesh = make_sphere(&Point3::origin(), 1.0, 8).unwrap();
        let mut b: HalfEdgeMesh = make_sphere(&Point3::new(0.7, 0.2, 0.1), 1.0, 8).unwrap();
        let (a0, b0) = (a.clone(), b.clone());
        let tolerance = 1e-9;
        corefine(&mut a, &mut b, tolerance).unwrap();

        assert!(a.is_valid() && a.is_closed());
        assert!(b.is_valid() && b.is_closed());
        assert!((a.volume() - a0.volume()).abs() < 1e-9);
        assert!((b.volume() - b0.volume()).abs() < 1e-9);
        assert_seams_match(&a, &a0, &b, &b0, tolerance);
    }

    #[test]
    fn test_seams_match_on_cylinder_through_box() {
        let mut a = cube([0.0; 3], [1.0; 3]);
        let mut b: HalfEdgeMesh =
            make_cylinder(&Point3::new(0.3, 0.4, -0.6), &Point3::new(0.6, 0.55, 1.7), 0.2, 16, None).unwrap();
        let (a0, b0) = (a.clone(), b.clone());
        corefine(&mut a, &mut b, 1e-9).unwrap();

        assert!(a.is_valid() && a.is_closed());
        assert!(b.is_valid() && b.is_closed());
        assert_seams_match(&a, &a0, &b, &b0, 1e-9);
    }

    #[test]
    fn test_segment_through_vertex_is_split() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        ];
        let mut mesh: HalfEdgeMesh = crate::mesh::build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
        let mut pieces = Pieces::new(&mesh);
        let original = FaceId::new(0);

        let x = pieces
            .insert_point(&mut mesh, &[original], &Point3::new(0.5, 0.5, 0.0), 1e-9)
            .unwrap();
        // On the long side, so the segment from the corner runs through x.
        let w = pieces
            .insert_point(&mut mesh, &[original], &Point3::new(1.0, 1.0, 0.0), 1e-9)
            .unwrap();
        let u = VertexId::new(0);
        assert_eq!(mesh.num_faces(), 4);
        assert!(!mesh.are_adjacent(u, w));

        pieces.insert_edge(&mut mesh, original, u, w, 1e-9, 0).unwrap();
        assert!(mesh.are_adjacent(u, x));
        assert!(mesh.are_adjacent(x, w));
        assert!(pieces.constrained.contains(&ordered(u, x)));
        assert!(pieces.constrained.contains(&ordered(x, w)));
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_flips_recover_a_crossing_segment() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        let mut mesh: HalfEdgeMesh = crate::mesh::build_from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
        let mut pieces = Pieces::new(&mesh);
        let original = FaceId::new(0);

        let inner: Vec<VertexId> = [[0.5, 0.2], [0.9, 0.3]]
            .iter()
            .map(|&[x, y]| {
                pieces
                    .insert_point(&mut mesh, &[original], &Point3::new(x, y, 0.0), 1e-9)
                    .unwrap()
            })
            .collect();
        assert_eq!(mesh.num_faces(), 5);

        // The edge from inner[0] to corner 1 crosses the segment.
        let (u, w) = (VertexId::new(0), inner[1]);
        assert!(!mesh.are_adjacent(u, w));
        pieces.insert_edge(&mut mesh, original, u, w, 1e-9, 0).unwrap();

        assert!(mesh.are_adjacent(u, w));
        assert!(!mesh.are_adjacent(inner[0], VertexId::new(1)));
        assert!(mesh.is_valid());
        assert!((mesh.surface_area() - 0.5).abs() < 1e-12);
    }
}
