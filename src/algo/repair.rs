//! Mesh repair.
//!
//! Hole filling, polygon triangulation, narrow-gap separation, self-intersection
//! counting and orientation fixes for polygon soups and closed meshes.
//!
//! Iterative repairs report how much they changed rather than failing, so
//! callers can run them to a fixed point under their own iteration cap.

use std::collections::{HashMap, HashSet, VecDeque};

use nalgebra::{Point3, Vector3};

use crate::algo::query::PointGrid;
use crate::algo::smooth::{smooth_taubin_region, SmoothOptions};
use crate::error::{MeshError, Result};
use crate::geometry::{triangle_triangle, Aabb, Bvh, TriangleIntersection};
use crate::mesh::{build_from_polygons, to_polygons, HalfEdgeMesh, MeshIndex, VertexId};

/// Weight of the squared diagonal length in the triangulation cost. Breaks
/// ties between triangulations of a planar polygon, which all have the same
/// area, in favour of short diagonals.
const DIAGONAL_WEIGHT: f64 = 1e-3;

/// Smallest triangle area a triangulation may use, relative to the squared
/// diagonal of the polygon's bounding box.
const MIN_TRIANGLE_AREA: f64 = 1e-12;

/// Options for [`fill_holes_with_options`].
#[derive(Debug, Clone)]
pub struct HoleFillOptions {
    /// Holes with more boundary edges than this are left open.
    pub max_hole_edges: Option<usize>,

    /// Largest hole triangulated by the minimal-area dynamic program; larger
    /// holes get a fan.
    pub max_optimal_edges: usize,
}

impl Default for HoleFillOptions {
    fn default() -> Self {
        Self {
            max_hole_edges: None,
            max_optimal_edges: 200,
        }
    }
}

impl HoleFillOptions {
    /// Leave holes with more than `edges` boundary edges open.
    pub fn with_max_hole_edges(mut self, edges: usize) -> Self {
        self.max_hole_edges = Some(edges);
        self
    }

    /// Set the size limit of the optimal triangulation.
    pub fn with_max_optimal_edges(mut self, edges: usize) -> Self {
        self.max_optimal_edges = edges;
        self
    }
}

/// Close every boundary loop with a minimal-area triangulation.
///
/// Returns the number of holes filled. A second call returns 0.
///
/// # Example
///
/// ```
/// use surfmesh::prelude::*;
/// use surfmesh::algo::repair::fill_holes;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
///     Point3::new(0.0, 0.0, 1.0),
/// ];
/// // A tetrahedron with its base missing.
/// let mut mesh: HalfEdgeMesh =
///     build_from_triangles(&vertices, &[[0, 1, 3], [1, 2, 3], [2, 0, 3]]).unwrap();
///
/// assert_eq!(fill_holes(&mut mesh), 1);
/// assert!(mesh.is_closed());
/// assert_eq!(fill_holes(&mut mesh), 0);
/// ```
pub fn fill_holes<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>) -> usize {
    fill_holes_with_options(mesh, &HoleFillOptions::default())
}

/// Fill holes with explicit options.
///
/// A hole is filled completely or not at all. Triangles that fold against
/// the winding of the hole or have no area are never used; a hole with no
/// triangulation made of other triangles is left open.
pub fn fill_holes_with_options<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    options: &HoleFillOptions,
) -> usize {
    let mut filled = 0;
    for hole in mesh.boundary_loops() {
        let vertices: Vec<VertexId<I>> = hole.iter().map(|&h| mesh.origin(h)).collect();
        let n = vertices.len();
        if options.max_hole_edges.is_some_and(|max| n > max) {
            continue;
        }
        if vertices.iter().collect::<HashSet<_>>().len() != n {
            log::warn!("hole of {} edges passes a vertex twice, left open", n);
            continue;
        }

        let points: Vec<Point3<f64>> = vertices.iter().map(|&v| *mesh.position(v)).collect();
        let allowed = |i: usize, j: usize| {
            j == i + 1 || (i == 0 && j == n - 1) || !mesh.are_adjacent(vertices[i], vertices[j])
        };
        let triangles = if n <= options.max_optimal_edges {
            minimal_area_triangulation(&points, allowed)
        } else {
            fan_triangulation(&points, allowed)
        };
        let Some(triangles) = triangles else {
            log::warn!("hole of {} edges has no valid triangulation, left open", n);
            continue;
        };

        // Post-order emission: each triangle meets the filled region along an edge.
        let before = mesh.clone();
        let added = triangles
            .iter()
            .try_for_each(|&[a, b, c]| mesh.add_face(&[vertices[a], vertices[b], vertices[c]]).map(|_| ()));
        match added {
            Ok(()) => filled += 1,
            Err(err) => {
                log::warn!("hole of {} edges left open: {}", n, err);
                *mesh = before;
            }
        }
    }
    log::debug!("filled {} holes", filled);
    filled
}

/// Split every face with more than three sides.
///
/// Each polygon gets the minimal-area triangulation of its corners, ties going
/// to the shortest diagonals. The mesh is rebuilt, so ids are compacted.
///
/// # Errors
///
/// [`MeshError::DegenerateGeometry`] when a polygon has fewer than three
/// distinct corner positions or all its corners are collinear. The mesh is
/// unchanged in that case.
pub fn triangulate_faces<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>) -> Result<()> {
    if mesh.is_triangle_mesh() {
        return Ok(());
    }
    let (positions, polygons) = to_polygons(mesh);
    let mut triangles: Vec<[usize; 3]> = Vec::with_capacity(polygons.len() * 2);

    for (fi, polygon) in polygons.iter().enumerate() {
        if polygon.len() == 3 {
            triangles.push([polygon[0], polygon[1], polygon[2]]);
            continue;
        }
        let points: Vec<Point3<f64>> = polygon.iter().map(|&i| positions[i]).collect();
        check_polygon(&points).map_err(|details| {
            MeshError::degenerate(format!("face {fi} cannot be triangulated: {details}"))
        })?;
        let local = minimal_area_triangulation(&points, |_, _| true).ok_or_else(|| {
            MeshError::degenerate(format!("face {fi} cannot be triangulated"))
        })?;
        triangles.extend(local.into_iter().map(|[a, b, c]| [polygon[a], polygon[b], polygon[c]]));
    }

    *mesh = build_from_polygons(&positions, &triangles)?;
    Ok(())
}

fn check_polygon(points: &[Point3<f64>]) -> std::result::Result<(), &'static str> {
    let distinct = points
        .iter()
        .enumerate()
        .filter(|(i, p)| !points[..*i].contains(p))
        .count();
    if distinct < 3 {
        return Err("fewer than three distinct corners");
    }
    let scale = Aabb::from_points(points.iter().copied()).diagonal();
    if newell_normal(points).norm() <= 1e-12 * scale * scale {
        return Err("corners are collinear");
    }
    Ok(())
}

fn newell_normal(points: &[Point3<f64>]) -> Vector3<f64> {
    let mut n = Vector3::zeros();
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        n += p.coords.cross(&q.coords);
    }
    n * 0.5
}

/// Triangles of a polygon that keep its winding and have some area.
fn proper_triangles(points: &[Point3<f64>]) -> impl Fn(usize, usize, usize) -> bool + '_ {
    let normal = newell_normal(points);
    let scale = Aabb::from_points(points.iter().copied()).diagonal();
    let min_area = MIN_TRIANGLE_AREA * scale * scale;
    move |i, k, j| {
        let area = (points[k] - points[i]).cross(&(points[j] - points[i])) * 0.5;
        area.dot(&normal) > 0.0 && area.norm() > min_area
    }
}

fn triangle_cost(points: &[Point3<f64>], i: usize, k: usize, j: usize) -> f64 {
    let area = 0.5 * (points[k] - points[i]).cross(&(points[j] - points[i])).norm();
    area + DIAGONAL_WEIGHT * (points[j] - points[i]).norm_squared()
}

/// Minimal-cost triangulation of a closed polygon by dynamic programming.
///
/// `allowed(i, j)` (with `i < j`) says whether the chord between corners `i`
/// and `j` may be used. Triangles `[i, k, j]` keep the polygon's winding and
/// come out in post-order, so every triangle after the first shares an edge
/// with an earlier one or with the polygon boundary. Triangles facing against
/// the polygon's Newell normal or without area are skipped. `None` when no
/// triangulation avoids the forbidden chords and those triangles.
pub(crate) fn minimal_area_triangulation(
    points: &[Point3<f64>],
    allowed: impl Fn(usize, usize) -> bool,
) -> Option<Vec<[usize; 3]>> {
    let n = points.len();
    if n < 3 {
        return None;
    }
    let proper = proper_triangles(points);
    let mut cost = vec![vec![0.0f64; n]; n];
    let mut split = vec![vec![usize::MAX; n]; n];

    for gap in 2..n {
        for i in 0..n - gap {
            let j = i + gap;
            cost[i][j] = f64::INFINITY;
            if !allowed(i, j) {
                continue;
            }
            for k in (i + 1..j).filter(|&k| proper(i, k, j)) {
                let c = cost[i][k] + cost[k][j] + triangle_cost(points, i, k, j);
                if c < cost[i][j] {
                    cost[i][j] = c;
                    split[i][j] = k;
                }
            }
        }
    }
    if !cost[0][n - 1].is_finite() {
        return None;
    }

    let mut triangles = Vec::with_capacity(n - 2);
    emit_post_order(&split, 0, n - 1, &mut triangles);
    Some(triangles)
}

fn emit_post_order(split: &[Vec<usize>], i: usize, j: usize, out: &mut Vec<[usize; 3]>) {
    if j <= i + 1 {
        return;
    }
    let k = split[i][j];
    emit_post_order(split, i, k, out);
    emit_post_order(split, k, j, out);
    out.push([i, k, j]);
}

/// Fan around corner 0, in the same post-order as the optimal triangulation.
fn fan_triangulation(
    points: &[Point3<f64>],
    allowed: impl Fn(usize, usize) -> bool,
) -> Option<Vec<[usize; 3]>> {
    let n = points.len();
    if n < 3 || (2..n).any(|k| !allowed(0, k)) {
        return None;
    }
    let proper = proper_triangles(points);
    let fan: Vec<[usize; 3]> = (1..n - 1).map(|k| [0, k, k + 1]).collect();
    fan.iter().all(|&[i, k, j]| proper(i, k, j)).then_some(fan)
}

/// Push apart surface sheets that come closer than the local edge length.
///
/// A vertex whose nearest non-adjacent vertex is closer than every edge of its
/// one-ring moves inward along its normal by a third of that distance. The
/// moved vertices and their one-rings are then Taubin-smoothed for two rounds.
/// Returns the number of vertices moved.
pub fn separate_narrow_gaps<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>) -> usize {
    let vertices: Vec<VertexId<I>> = mesh.vertex_ids().filter(|&v| !mesh.is_isolated(v)).collect();
    if vertices.is_empty() {
        return 0;
    }
    let max_edge = mesh
        .edge_ids()
        .map(|e| mesh.edge_length(e.halfedge(0)))
        .fold(0.0, f64::max);
    let grid = PointGrid::new(vertices.iter().map(|&v| *mesh.position(v)).collect(), max_edge);

    let mut moves: Vec<(VertexId<I>, Point3<f64>)> = Vec::new();
    for (slot, &v) in vertices.iter().enumerate() {
        let p = *mesh.position(v);
        let ring: HashSet<VertexId<I>> = mesh.vertex_neighbors(v).collect();
        let shortest = mesh
            .vertex_halfedges(v)
            .map(|h| mesh.edge_length(h))
            .fold(f64::INFINITY, f64::min);
        if !shortest.is_finite() {
            continue;
        }
        let nearest = grid
            .within(&p, shortest)
            .into_iter()
            .filter(|&i| i != slot && !ring.contains(&vertices[i]))
            .map(|i| (grid.point(i) - p).norm())
            .fold(f64::INFINITY, f64::min);
        if nearest < shortest {
            let normal = mesh.vertex_normal(v);
            moves.push((v, p - normal * (nearest / 3.0)));
        }
    }

    if moves.is_empty() {
        return 0;
    }
    let mut region: HashSet<VertexId<I>> = HashSet::new();
    for &(v, p) in &moves {
        mesh.set_position(v, p);
        region.insert(v);
        region.extend(mesh.vertex_neighbors(v));
    }
    let mut region: Vec<VertexId<I>> = region.into_iter().collect();
    region.sort_unstable();
    smooth_taubin_region(mesh, &region, 2, &SmoothOptions::default());

    log::debug!("separated {} vertices from narrow gaps", moves.len());
    moves.len()
}

/// Number of intersecting pairs of triangles that share no vertex.
pub fn num_self_intersections<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> usize {
    let faces: Vec<_> = mesh.face_ids().filter(|&f| mesh.face_degree(f) == 3).collect();
    let corners: Vec<[VertexId<I>; 3]> = faces.iter().map(|&f| mesh.face_triangle(f)).collect();
    let bvh = Bvh::build(faces.iter().map(|&f| mesh.face_positions(f)).collect());

    let mut count = 0;
    for i in 0..faces.len() {
        let tri = *bvh.triangle(i);
        for j in bvh.query_box(&Aabb::from_triangle(&tri)) {
            if j <= i || corners[i].iter().any(|v| corners[j].contains(v)) {
                continue;
            }
            if triangle_triangle(&tri, bvh.triangle(j)) != TriangleIntersection::None {
                count += 1;
            }
        }
    }
    count
}

/// Make the winding of a polygon soup consistent across shared edges.
///
/// Faces are visited breadth-first from each unvisited face; a neighbour that
/// traverses a shared edge in the same direction is reversed. Edges shared by
/// more than two faces do not propagate. Returns `false` when some component
/// cannot be oriented consistently (a Möbius-like strip); the faces are still
/// left in the best orientation found.
pub fn orient_polygon_soup(polygons: &mut [Vec<usize>]) -> bool {
    let mut edge_faces: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    for (fi, polygon) in polygons.iter().enumerate() {
        for (i, &a) in polygon.iter().enumerate() {
            let b = polygon[(i + 1) % polygon.len()];
            edge_faces.entry((a.min(b), a.max(b))).or_default().push(fi);
        }
    }

    let uses_directed = |polygon: &[usize], a: usize, b: usize| {
        (0..polygon.len()).any(|i| polygon[i] == a && polygon[(i + 1) % polygon.len()] == b)
    };

    let mut visited = vec![false; polygons.len()];
    let mut consistent = true;
    for seed in 0..polygons.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let mut queue = VecDeque::from([seed]);
        while let Some(f) = queue.pop_front() {
            let polygon = polygons[f].clone();
            for (i, &a) in polygon.iter().enumerate() {
                let b = polygon[(i + 1) % polygon.len()];
                let Some(shared) = edge_faces.get(&(a.min(b), a.max(b))) else {
                    continue;
                };
                if shared.len() != 2 {
                    continue;
                }
                let g = if shared[0] == f { shared[1] } else { shared[0] };
                if g == f {
                    continue;
                }
                let clash = uses_directed(&polygons[g], a, b);
                if !visited[g] {
                    if clash {
                        polygons[g].reverse();
                    }
                    visited[g] = true;
                    queue.push_back(g);
                } else if clash {
                    consistent = false;
                }
            }
        }
    }
    consistent
}

/// Reverse a closed mesh whose normals point inward.
///
/// Returns whether the mesh was reversed. Open meshes are left alone.
pub fn orient_outward<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>) -> Result<bool> {
    if mesh.num_faces() == 0 || !mesh.is_closed() || mesh.volume() >= 0.0 {
        return Ok(false);
    }
    mesh.reverse_orientation()?;
    Ok(true)
}
