//! Edge-length driven remeshing.
//!
//! - [`split_edges`]: split every edge longer than a bound
//! - [`collapse_edges`]: collapse short edges, shortest first
//! - [`isotropic_remeshing`]: split / collapse / flip / relax iterations
//!   towards a uniform target length
//!
//! All of them are built on the local edits of [`HalfEdgeMesh`], so the mesh
//! stays a valid manifold throughout. Collapses the mesh refuses are skipped
//! and the batch continues.

mod isotropic;

use std::collections::{HashSet, VecDeque};

use crate::error::{MeshError, Result};
use crate::mesh::{EdgeId, HalfEdgeMesh, MeshIndex, VertexId};

pub use isotropic::{
    isotropic_remeshing, isotropic_remeshing_with_progress, RemeshOptions,
};

/// Collapse threshold used when no length is given, relative to the
/// bounding box diagonal.
pub const DEGENERATE_EDGE_FACTOR: f64 = 1e-6;

/// Minimum, maximum and mean edge length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeLengthStats {
    /// Shortest edge.
    pub min: f64,
    /// Longest edge.
    pub max: f64,
    /// Mean over all edges.
    pub mean: f64,
}

/// Edge length statistics, `None` for a mesh without edges.
pub fn edge_length_stats<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> Option<EdgeLengthStats> {
    let mut stats: Option<EdgeLengthStats> = None;
    let mut sum = 0.0;
    for e in mesh.edge_ids() {
        let l = mesh.edge_length(e.halfedge(0));
        sum += l;
        stats = Some(match stats {
            None => EdgeLengthStats {
                min: l,
                max: l,
                mean: 0.0,
            },
            Some(s) => EdgeLengthStats {
                min: s.min.min(l),
                max: s.max.max(l),
                mean: 0.0,
            },
        });
    }
    stats.map(|s| EdgeLengthStats {
        mean: sum / mesh.num_edges() as f64,
        ..s
    })
}

/// Mean edge length; useful for picking a remeshing target.
pub fn average_edge_length<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> f64 {
    mesh.average_edge_length()
}

/// Split every edge longer than `max_length` at its midpoint.
///
/// Both halves of a split edge go back on the worklist; the edges that
/// re-triangulate the incident faces do not. The worklist is seeded in edge
/// order, so the result is deterministic. Returns the number of splits.
///
/// ```
/// use surfmesh::algo::primitives::make_cube;
/// use surfmesh::algo::remesh::split_edges;
/// use surfmesh::mesh::HalfEdgeMesh;
/// use nalgebra::Point3;
///
/// let mut cube: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 1).unwrap();
/// split_edges(&mut cube, 0.5).unwrap();
/// assert_eq!(cube.num_edges(), 108);
/// ```
pub fn split_edges<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, max_length: f64) -> Result<usize> {
    if !(max_length.is_finite() && max_length > 0.0) {
        return Err(MeshError::invalid_param("max_length", max_length, "must be positive"));
    }
    Ok(split_long_edges(mesh, max_length, false))
}

pub(crate) fn split_long_edges<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    max_length: f64,
    protect_borders: bool,
) -> usize {
    let mut queue: VecDeque<EdgeId<I>> = mesh.edge_ids().collect();
    let mut splits = 0;

    while let Some(e) = queue.pop_front() {
        if !mesh.is_live_edge(e) {
            continue;
        }
        let h = e.halfedge(0);
        if mesh.edge_length(h) <= max_length {
            continue;
        }
        if protect_borders && mesh.is_boundary_edge(h) {
            continue;
        }
        let (a, b) = (mesh.origin(h), mesh.target(h));
        match mesh.split_edge(e, 0.5) {
            Ok(m) => {
                splits += 1;
                for (from, to) in [(a, m), (m, b)] {
                    if let Some(half) = mesh.find_halfedge(from, to) {
                        queue.push_back(half.edge());
                    }
                }
            }
            Err(err) => log::warn!("skipping split of {}: {}", e, err),
        }
    }

    log::debug!("split {} edges longer than {}", splits, max_length);
    splits
}

/// Collapse edges shorter than `min_length`, shortest first.
///
/// With `None` only near-degenerate edges are collapsed: those shorter than
/// [`DEGENERATE_EDGE_FACTOR`] times the bounding box diagonal. Collapses the
/// mesh refuses ([`MeshError::NonCollapsible`]) are skipped. Candidates are
/// re-examined until a pass changes nothing, and the arenas are compacted
/// afterwards. Returns the number of collapses performed.
pub fn collapse_edges<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    min_length: Option<f64>,
) -> Result<usize> {
    let threshold = match min_length {
        Some(l) if l.is_nan() || l < 0.0 => {
            return Err(MeshError::invalid_param("min_length", l, "must be non-negative"));
        }
        Some(l) => l,
        None => match mesh.bounding_box() {
            Some(bbox) => DEGENERATE_EDGE_FACTOR * bbox.diagonal(),
            None => return Ok(0),
        },
    };
    let collapsed = collapse_short_edges(mesh, threshold, None, false)?;
    if collapsed > 0 {
        mesh.collect_garbage();
    }
    Ok(collapsed)
}

/// Collapse every edge shorter than `min_length`.
///
/// With `max_length`, collapses that would leave an edge longer than it are
/// refused. With `protect_borders`, edges touching the boundary are kept.
pub(crate) fn collapse_short_edges<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    min_length: f64,
    max_length: Option<f64>,
    protect_borders: bool,
) -> Result<usize> {
    let mut total = 0;
    loop {
        let mut candidates: Vec<(f64, EdgeId<I>)> = mesh
            .edge_ids()
            .map(|e| (mesh.edge_length(e.halfedge(0)), e))
            .filter(|&(l, _)| l < min_length)
            .collect();
        if candidates.is_empty() {
            break;
        }
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut collapsed = 0;
        for (_, e) in candidates {
            if !mesh.is_live_edge(e) {
                continue;
            }
            let h = e.halfedge(0);
            if mesh.edge_length(h) >= min_length {
                continue;
            }
            let (a, b) = (mesh.origin(h), mesh.target(h));
            if protect_borders && (mesh.is_boundary_vertex(a) || mesh.is_boundary_vertex(b)) {
                continue;
            }
            let position = mesh.collapse_position(e);
            if let Some(max) = max_length {
                if longest_edge_after_collapse(mesh, a, b, &position) > max {
                    continue;
                }
            }
            match mesh.collapse_edge_to(e, position) {
                Ok(_) => collapsed += 1,
                Err(err) if err.is_local_rejection() => {
                    log::trace!("{}", err);
                }
                Err(err) => return Err(err),
            }
        }

        total += collapsed;
        if collapsed == 0 {
            break;
        }
    }

    log::debug!("collapsed {} edges shorter than {}", total, min_length);
    Ok(total)
}

fn longest_edge_after_collapse<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    a: VertexId<I>,
    b: VertexId<I>,
    position: &nalgebra::Point3<f64>,
) -> f64 {
    let ring: HashSet<VertexId<I>> = mesh
        .vertex_neighbors(a)
        .chain(mesh.vertex_neighbors(b))
        .filter(|&v| v != a && v != b)
        .collect();
    ring.iter()
        .map(|&v| (mesh.position(v) - position).norm())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::primitives::make_cube;
    use crate::mesh::build_from_triangles;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn unit_cube() -> HalfEdgeMesh {
        make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 1).unwrap()
    }

    #[test]
    fn test_split_unit_cube() {
        let mut mesh = unit_cube();
        let splits = split_edges(&mut mesh, 0.5).unwrap();

        // Twelve sides split once, six diagonals split three times.
        assert_eq!(splits, 30);
        assert_eq!(mesh.num_vertices(), 38);
        assert_eq!(mesh.num_edges(), 108);
        assert!(mesh.is_valid());
        assert!(mesh.is_closed());
        assert_relative_eq!(mesh.volume(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_split_is_noop_below_bound() {
        let mut mesh = unit_cube();
        assert_eq!(split_edges(&mut mesh, 2.0).unwrap(), 0);
        assert_eq!(mesh.num_edges(), 18);
        assert!(split_edges(&mut mesh, 0.0).is_err());
    }

    #[test]
    fn test_split_open_strip() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let mut mesh: HalfEdgeMesh = build_from_triangles(&vertices, &[[0, 1, 2], [0, 2, 3]]).unwrap();
        split_edges(&mut mesh, 0.6).unwrap();

        assert!(mesh.is_valid());
        let loops = mesh.boundary_loops();
        assert_eq!(loops.len(), 1);
        // Boundary edges are only ever halves of split edges.
        assert_eq!(loops[0].len(), 12);
        for &h in &loops[0] {
            assert!(mesh.edge_length(h) <= 0.6);
        }
        assert_relative_eq!(mesh.surface_area(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_split_then_collapse() {
        let mut mesh = unit_cube();
        split_edges(&mut mesh, 0.5).unwrap();
        let before = mesh.num_edges();

        let collapsed = collapse_edges(&mut mesh, Some(0.4)).unwrap();

        assert!(collapsed > 0);
        assert!(mesh.num_edges() < before);
        assert!(!mesh.has_garbage());
        assert!(mesh.is_valid());
        assert!(mesh.is_closed());
        assert_eq!(mesh.euler_characteristic(), 2);
    }

    #[test]
    fn test_collapse_degenerate_only() {
        let mut mesh = unit_cube();
        split_edges(&mut mesh, 0.5).unwrap();
        assert_eq!(collapse_edges(&mut mesh, None).unwrap(), 0);

        // Vertices 5 and 6 are neighbours inside the z = 0 side of a 3x3 cube.
        let mut mesh: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 3).unwrap();
        let (v, w) = (VertexId::new(6), VertexId::new(5));
        assert!(mesh.are_adjacent(v, w));
        let target = *mesh.position(w) + (mesh.position(v) - mesh.position(w)) * 1e-9;
        mesh.set_position(v, target);

        assert_eq!(collapse_edges(&mut mesh, None).unwrap(), 1);
        assert!(mesh.is_valid());
        assert_eq!(mesh.num_vertices(), 55);
    }

    #[test]
    fn test_collapse_stops_at_valid_mesh() {
        // Every edge is a candidate; refused collapses are skipped.
        let mut mesh = unit_cube();
        let collapsed = collapse_edges(&mut mesh, Some(2.0)).unwrap();
        assert!(mesh.is_valid());
        assert!(mesh.is_closed());
        assert!(mesh.num_vertices() >= 4);
        assert_eq!(mesh.num_vertices(), 8 - collapsed);
    }

    #[test]
    fn test_edge_length_stats() {
        let mesh = unit_cube();
        let stats = edge_length_stats(&mesh).unwrap();
        assert_relative_eq!(stats.min, 1.0);
        assert_relative_eq!(stats.max, 2f64.sqrt());
        assert_relative_eq!(stats.mean, (12.0 + 6.0 * 2f64.sqrt()) / 18.0);
        assert_relative_eq!(average_edge_length(&mesh), stats.mean);
        assert!(edge_length_stats(&HalfEdgeMesh::<u32>::new()).is_none());
    }
}
