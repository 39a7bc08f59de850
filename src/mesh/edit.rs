//! Local topological edits on a [`HalfEdgeMesh`].
//!
//! Every edit either succeeds and leaves a valid 2-manifold behind, or fails
//! before touching the mesh. Rejected collapses report
//! [`MeshError::NonCollapsible`]; every other rejection is
//! [`MeshError::Topology`].

use std::collections::HashSet;

use nalgebra::Point3;

use super::halfedge::HalfEdgeMesh;
use super::index::{EdgeId, FaceId, HalfEdgeId, MeshIndex, VertexId};
use crate::error::{MeshError, Result};

impl<I: MeshIndex> HalfEdgeMesh<I> {
    // ==================== Face insertion ====================

    /// Add a face through the given vertices (counter-clockwise).
    ///
    /// Existing boundary edges are reused; new edges are created for the rest.
    /// Fails if a directed edge already has a face, if a vertex repeats, or if
    /// the face would touch an existing fan only at a vertex.
    pub fn add_face(&mut self, vertices: &[VertexId<I>]) -> Result<FaceId<I>> {
        let n = vertices.len();
        if n < 3 {
            return Err(MeshError::topology(format!(
                "a face needs at least three vertices, got {n}"
            )));
        }
        let mut seen = HashSet::with_capacity(n);
        for &v in vertices {
            if !self.is_live_vertex(v) {
                return Err(MeshError::topology(format!("{v} is not a live vertex")));
            }
            if !seen.insert(v) {
                return Err(MeshError::topology(format!("{v} appears twice in the face")));
            }
        }

        let mut existing: Vec<Option<HalfEdgeId<I>>> = Vec::with_capacity(n);
        for i in 0..n {
            let a = vertices[i];
            let b = vertices[(i + 1) % n];
            let h = self.find_halfedge(a, b);
            if let Some(h) = h {
                if !self.is_boundary_halfedge(h) {
                    return Err(MeshError::topology(format!(
                        "directed edge {a} -> {b} already has a face"
                    )));
                }
            }
            existing.push(h);
        }

        for i in 0..n {
            let v = vertices[i];
            if self.is_isolated(v) {
                continue;
            }
            if !self.is_boundary_vertex(v) {
                return Err(MeshError::topology(format!("{v} is an interior vertex")));
            }
            let incoming = existing[(i + n - 1) % n];
            let outgoing = existing[i];
            if incoming.is_none() && outgoing.is_none() {
                return Err(MeshError::topology(format!(
                    "face would touch the fan of {v} only at the vertex"
                )));
            }
        }

        // Boundary links to apply once the face cycle is in place.
        let mut links: Vec<(HalfEdgeId<I>, HalfEdgeId<I>)> = Vec::new();
        let mut halfedges = Vec::with_capacity(n);
        for i in 0..n {
            let h = match existing[i] {
                Some(h) => h,
                None => self.new_edge(vertices[i], vertices[(i + 1) % n]),
            };
            halfedges.push(h);
        }

        let mut new_outgoing: Vec<Option<HalfEdgeId<I>>> = vec![None; n];
        for i in 0..n {
            let h_in = halfedges[(i + n - 1) % n];
            let h_out = halfedges[i];
            let in_new = existing[(i + n - 1) % n].is_none();
            let out_new = existing[i].is_none();

            match (in_new, out_new) {
                (true, true) => {
                    links.push((h_out.pair(), h_in.pair()));
                    new_outgoing[i] = Some(h_in.pair());
                }
                (true, false) => {
                    let p = self.prev(h_out);
                    links.push((p, h_in.pair()));
                    new_outgoing[i] = Some(h_in.pair());
                }
                (false, true) => {
                    let nx = self.next(h_in);
                    links.push((h_out.pair(), nx));
                }
                (false, false) => {}
            }
        }

        let f = self.new_face(halfedges[0]);
        for i in 0..n {
            let h = halfedges[i];
            self.halfedge_mut(h).face = f;
            self.link(h, halfedges[(i + 1) % n]);
        }
        for (a, b) in links {
            self.link(a, b);
        }

        for i in 0..n {
            let v = vertices[i];
            if let Some(h) = new_outgoing[i] {
                self.vertex_mut(v).halfedge = h;
            } else if !self.vertex(v).halfedge.is_valid() {
                self.vertex_mut(v).halfedge = halfedges[i];
            }
        }

        Ok(f)
    }

    // ==================== Edge split ====================

    /// Split an edge at `origin + ratio * (target - origin)`.
    ///
    /// Incident triangles are split in two; polygon faces just gain a corner.
    /// Returns the new vertex.
    pub fn split_edge(&mut self, e: EdgeId<I>, ratio: f64) -> Result<VertexId<I>> {
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(MeshError::invalid_param(
                "ratio",
                ratio,
                "must lie strictly between 0 and 1",
            ));
        }
        self.check_live_edge(e)?;
        let h = e.halfedge(0);
        let a = self.position(self.origin(h)).coords;
        let b = self.position(self.target(h)).coords;
        self.split_edge_at(e, Point3::from(a + (b - a) * ratio))
    }

    /// Split an edge at an arbitrary point (the point is not projected).
    pub fn split_edge_at(&mut self, e: EdgeId<I>, point: Point3<f64>) -> Result<VertexId<I>> {
        self.check_live_edge(e)?;

        let h = e.halfedge(0);
        let t = h.pair();
        let fh = self.face_of(h);
        let ft = self.face_of(t);
        if !fh.is_valid() && !ft.is_valid() {
            return Err(MeshError::topology(format!("{e} has no incident face")));
        }

        let b = self.target(h);
        let hn = self.next(h);
        let tp = self.prev(t);
        let tn = self.next(t);
        let h_triangle = fh.is_valid() && self.face_degree(fh) == 3;
        let t_triangle = ft.is_valid() && self.face_degree(ft) == 3;

        let m = self.add_vertex(point);
        let h2 = self.new_edge(m, b);
        let t2 = h2.pair();
        self.halfedge_mut(h).target = m;

        // Side of h: a -> m, m -> b.
        if h_triangle {
            let hp = self.prev(h);
            let c = self.target(hn);
            let d = self.new_edge(m, c);
            let dt = d.pair();

            self.halfedge_mut(d).face = fh;
            self.link(h, d);
            self.link(d, hp);
            self.face_mut(fh).halfedge = h;

            let g = self.new_face(h2);
            for he in [h2, hn, dt] {
                self.halfedge_mut(he).face = g;
            }
            self.link(h2, hn);
            self.link(hn, dt);
            self.link(dt, h2);
        } else {
            self.halfedge_mut(h2).face = fh;
            self.link(h, h2);
            self.link(h2, hn);
        }

        // Side of t: b -> m, m -> a.
        if t_triangle {
            let x = self.target(tn);
            let ex = self.new_edge(m, x);
            let et = ex.pair();

            self.halfedge_mut(et).face = ft;
            self.link(t, tn);
            self.link(tn, et);
            self.link(et, t);
            self.face_mut(ft).halfedge = t;

            let k = self.new_face(t2);
            for he in [t2, ex, tp] {
                self.halfedge_mut(he).face = k;
            }
            self.link(t2, ex);
            self.link(ex, tp);
            self.link(tp, t2);
        } else {
            self.halfedge_mut(t2).face = ft;
            self.link(tp, t2);
            self.link(t2, t);
        }

        if self.vertex(b).halfedge == t {
            self.vertex_mut(b).halfedge = t2;
        }
        let m_out = if !fh.is_valid() {
            h2
        } else if !ft.is_valid() {
            t
        } else {
            h2
        };
        self.vertex_mut(m).halfedge = m_out;

        Ok(m)
    }

    // ==================== Face split ====================

    /// Split a triangle into three by inserting a vertex at `point`.
    pub fn split_face(&mut self, f: FaceId<I>, point: Point3<f64>) -> Result<VertexId<I>> {
        if !self.is_live_face(f) {
            return Err(MeshError::topology(format!("{f} is not a live face")));
        }
        if self.face_degree(f) != 3 {
            return Err(MeshError::topology(format!("{f} is not a triangle")));
        }

        let h0 = self.face(f).halfedge;
        let h1 = self.next(h0);
        let h2 = self.next(h1);
        let a = self.origin(h0);
        let b = self.origin(h1);
        let c = self.origin(h2);

        let m = self.add_vertex(point);
        let pa = self.new_edge(a, m);
        let pb = self.new_edge(b, m);
        let pc = self.new_edge(c, m);

        self.link(h0, pb);
        self.link(pb, pa.pair());
        self.link(pa.pair(), h0);
        for he in [pb, pa.pair()] {
            self.halfedge_mut(he).face = f;
        }
        self.face_mut(f).halfedge = h0;

        let g = self.new_face(h1);
        self.link(h1, pc);
        self.link(pc, pb.pair());
        self.link(pb.pair(), h1);
        for he in [h1, pc, pb.pair()] {
            self.halfedge_mut(he).face = g;
        }

        let k = self.new_face(h2);
        self.link(h2, pa);
        self.link(pa, pc.pair());
        self.link(pc.pair(), h2);
        for he in [h2, pa, pc.pair()] {
            self.halfedge_mut(he).face = k;
        }

        self.vertex_mut(m).halfedge = pa.pair();
        Ok(m)
    }

    // ==================== Edge flip ====================

    /// Flip the diagonal shared by two triangles.
    ///
    /// For triangles `(a, b, c)` and `(b, a, d)` the edge `a-b` becomes `d-c`.
    pub fn flip_edge(&mut self, e: EdgeId<I>) -> Result<()> {
        self.check_live_edge(e)?;
        let h = e.halfedge(0);
        let t = h.pair();
        let f = self.face_of(h);
        let g = self.face_of(t);
        if !f.is_valid() || !g.is_valid() {
            return Err(MeshError::topology(format!("{e} is a boundary edge")));
        }
        if self.face_degree(f) != 3 || self.face_degree(g) != 3 {
            return Err(MeshError::topology(format!("{e} borders a non-triangle")));
        }

        let hn = self.next(h);
        let hp = self.prev(h);
        let tn = self.next(t);
        let tp = self.prev(t);
        let a = self.origin(h);
        let b = self.target(h);
        let c = self.target(hn);
        let d = self.target(tn);

        if c == d {
            return Err(MeshError::topology(format!("{e} has a repeated opposite vertex")));
        }
        if self.are_adjacent(c, d) {
            return Err(MeshError::topology(format!(
                "flipping {e} would duplicate edge {c} - {d}"
            )));
        }

        self.halfedge_mut(h).target = c;
        self.halfedge_mut(t).target = d;

        self.link(tn, h);
        self.link(h, hp);
        self.link(hp, tn);
        self.halfedge_mut(tn).face = f;
        self.face_mut(f).halfedge = h;

        self.link(tp, hn);
        self.link(hn, t);
        self.link(t, tp);
        self.halfedge_mut(hn).face = g;
        self.face_mut(g).halfedge = t;

        if self.vertex(a).halfedge == h {
            self.vertex_mut(a).halfedge = tn;
        }
        if self.vertex(b).halfedge == t {
            self.vertex_mut(b).halfedge = hn;
        }

        Ok(())
    }

    // ==================== Edge collapse ====================

    /// Position the collapse of `e` would use by default.
    ///
    /// The midpoint, or the boundary endpoint when exactly one endpoint lies on
    /// the boundary.
    pub fn collapse_position(&self, e: EdgeId<I>) -> Point3<f64> {
        let h = e.halfedge(0);
        let a = self.origin(h);
        let b = self.target(h);
        match (self.is_boundary_vertex(a), self.is_boundary_vertex(b)) {
            (true, false) => *self.position(a),
            (false, true) => *self.position(b),
            _ => self.edge_midpoint(h),
        }
    }

    /// Collapse an edge at its default position. Returns the surviving vertex.
    pub fn collapse_edge(&mut self, e: EdgeId<I>) -> Result<VertexId<I>> {
        self.check_live_edge(e)?;
        let p = self.collapse_position(e);
        self.collapse_edge_to(e, p)
    }

    /// Check whether `e` may be collapsed to `position`.
    pub fn can_collapse(&self, e: EdgeId<I>, position: &Point3<f64>) -> Result<()> {
        let reject = |reason| {
            Err(MeshError::NonCollapsible {
                edge: e.index(),
                reason,
            })
        };
        if !self.is_live_edge(e) {
            return reject("edge is not live");
        }

        let h = e.halfedge(0);
        let t = h.pair();
        let a = self.origin(h);
        let b = self.target(h);
        let f = self.face_of(h);
        let g = self.face_of(t);

        let mut opposite = Vec::with_capacity(2);
        for (he, face) in [(h, f), (t, g)] {
            if face.is_valid() {
                if self.face_degree(face) != 3 {
                    return reject("incident face is not a triangle");
                }
                opposite.push(self.target(self.next(he)));
            }
        }

        // Link condition: the only common neighbours are the opposite vertices.
        let na: HashSet<VertexId<I>> = self.vertex_neighbors(a).collect();
        let common = self.vertex_neighbors(b).filter(|v| na.contains(v)).count();
        if common != opposite.len() || opposite.iter().any(|v| !na.contains(v)) {
            return reject("link condition");
        }

        if f.is_valid()
            && g.is_valid()
            && self.is_boundary_vertex(a)
            && self.is_boundary_vertex(b)
        {
            return reject("interior edge joins two boundary vertices");
        }

        for &c in &opposite {
            let valence = self.valence(c);
            if self.is_boundary_vertex(c) {
                if valence <= 2 {
                    return reject("opposite vertex is a boundary ear");
                }
            } else if valence <= 3 {
                return reject("opposite vertex would drop below valence 3");
            }
        }

        for (moved, other) in [(a, b), (b, a)] {
            for face in self.vertex_faces(moved) {
                if face == f || face == g {
                    continue;
                }
                let corners: Vec<VertexId<I>> = self.face_vertices(face).collect();
                if corners.contains(&other) {
                    continue;
                }
                let old: Vec<Point3<f64>> =
                    corners.iter().map(|&v| *self.position(v)).collect();
                let new: Vec<Point3<f64>> = corners
                    .iter()
                    .map(|&v| if v == moved { *position } else { *self.position(v) })
                    .collect();
                let n0 = (old[1] - old[0]).cross(&(old[2] - old[0]));
                let n1 = (new[1] - new[0]).cross(&(new[2] - new[0]));
                if n1.norm_squared() <= f64::EPSILON * n0.norm_squared() || n0.dot(&n1) <= 0.0
                {
                    return reject("face normal would flip");
                }
            }
        }

        Ok(())
    }

    /// Collapse an edge, moving the surviving vertex to `position`.
    ///
    /// The edge's origin is removed and its target survives.
    pub fn collapse_edge_to(&mut self, e: EdgeId<I>, position: Point3<f64>) -> Result<VertexId<I>> {
        self.can_collapse(e, &position)?;

        let h = e.halfedge(0);
        let t = h.pair();
        let a = self.origin(h);
        let b = self.target(h);
        let f = self.face_of(h);
        let g = self.face_of(t);

        let incoming: Vec<HalfEdgeId<I>> = self.vertex_halfedges(a).map(|o| o.pair()).collect();
        for he in incoming {
            self.halfedge_mut(he).target = b;
        }

        let mut b_start = HalfEdgeId::invalid();

        if f.is_valid() {
            let hn = self.next(h);
            let hp = self.prev(h);
            let hpt = hp.pair();
            let c = self.target(hn);
            let outer = self.face_of(hpt);
            let (p1, n1) = (self.prev(hpt), self.next(hpt));

            self.halfedge_mut(hn).face = outer;
            self.link(p1, hn);
            self.link(hn, n1);
            if outer.is_valid() && self.face(outer).halfedge == hpt {
                self.face_mut(outer).halfedge = hn;
            }
            if self.vertex(c).halfedge == hp {
                self.vertex_mut(c).halfedge = hn.pair();
            }
            self.remove_edge_slot(hp.edge());
            self.remove_face_slot(f);
            b_start = hn;
        }

        if g.is_valid() {
            let tn = self.next(t);
            let tp = self.prev(t);
            let tnt = tn.pair();
            let d = self.origin(tp);
            let outer = self.face_of(tnt);
            let (p1, n1) = (self.prev(tnt), self.next(tnt));

            self.halfedge_mut(tp).face = outer;
            self.link(p1, tp);
            self.link(tp, n1);
            if outer.is_valid() && self.face(outer).halfedge == tnt {
                self.face_mut(outer).halfedge = tp;
            }
            if self.vertex(d).halfedge == tnt {
                self.vertex_mut(d).halfedge = tp;
            }
            self.remove_edge_slot(tn.edge());
            self.remove_face_slot(g);
            if !b_start.is_valid() {
                b_start = tp.pair();
            }
        }

        if !f.is_valid() {
            let (p, n) = (self.prev(h), self.next(h));
            self.link(p, n);
        }
        if !g.is_valid() {
            let (p, n) = (self.prev(t), self.next(t));
            self.link(p, n);
        }

        self.remove_edge_slot(e);
        self.remove_vertex_slot(a);

        self.vertex_mut(b).halfedge = b_start;
        let boundary_out = self
            .vertex_halfedges(b)
            .find(|&o| self.is_boundary_halfedge(o));
        if let Some(o) = boundary_out {
            self.vertex_mut(b).halfedge = o;
        }
        self.set_position(b, position);

        Ok(b)
    }

    fn check_live_edge(&self, e: EdgeId<I>) -> Result<()> {
        if self.is_live_edge(e) {
            Ok(())
        } else {
            Err(MeshError::topology(format!("{e} is not a live edge")))
        }
    }
}
