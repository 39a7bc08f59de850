//! Dijkstra's algorithm over the mesh edge graph.
//!
//! Distances are exact on the edge graph and an upper bound of the true
//! geodesic distance on the surface.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::mesh::{HalfEdgeMesh, MeshIndex, VertexId};

use super::GeodesicResult;

/// Options for Dijkstra's algorithm.
#[derive(Debug, Clone, Default)]
pub struct DijkstraOptions {
    /// Whether to store predecessor information for path reconstruction.
    pub store_predecessors: bool,

    /// Maximum distance to explore. Vertices beyond this distance won't be visited.
    /// Set to `None` for no limit.
    pub max_distance: Option<f64>,

    /// Stop as soon as this vertex is settled.
    pub target: Option<usize>,
}

impl DijkstraOptions {
    /// Enable predecessor storage for path reconstruction.
    pub fn with_predecessors(mut self, store: bool) -> Self {
        self.store_predecessors = store;
        self
    }

    /// Set maximum distance to explore.
    pub fn with_max_distance(mut self, max_dist: f64) -> Self {
        self.max_distance = Some(max_dist);
        self
    }

    /// Set target vertex for early termination.
    pub fn with_target(mut self, target: usize) -> Self {
        self.target = Some(target);
        self
    }
}

/// Entry in Dijkstra's priority queue.
#[derive(Debug, Clone)]
struct DijkstraEntry {
    vertex: usize,
    distance: f64,
}

impl DijkstraEntry {
    fn new(vertex: usize, distance: f64) -> Self {
        Self { vertex, distance }
    }
}

// Min-heap ordering on distance; BinaryHeap is a max-heap.
impl PartialEq for DijkstraEntry {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl Eq for DijkstraEntry {}

impl PartialOrd for DijkstraEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DijkstraEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.distance.total_cmp(&self.distance)
    }
}

/// Edge-graph distances from a single source vertex.
///
/// # Example
///
/// ```
/// use surfmesh::prelude::*;
/// use surfmesh::algo::geodesic::{dijkstra, DijkstraOptions};
///
/// let mesh: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 1).unwrap();
/// let options = DijkstraOptions::default().with_predecessors(true);
/// let result = dijkstra(&mesh, VertexId::new(0), &options);
///
/// let path = result.path_to(VertexId::new(7)).unwrap();
/// assert_eq!(path.first(), Some(&VertexId::new(0)));
/// ```
pub fn dijkstra<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    source: VertexId<I>,
    options: &DijkstraOptions,
) -> GeodesicResult<I> {
    dijkstra_multiple(mesh, &[source], options)
}

/// Edge-graph distances from the nearest of several sources, all at distance 0.
pub fn dijkstra_multiple<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    sources: &[VertexId<I>],
    options: &DijkstraOptions,
) -> GeodesicResult<I> {
    let seeds: Vec<(VertexId<I>, f64)> = sources.iter().map(|&v| (v, 0.0)).collect();
    dijkstra_seeded(mesh, &seeds, options)
}

/// Edge-graph distances from seeds that start at a given distance.
///
/// Used to measure from a point inside a face: the face's corners are seeded
/// with their straight-line distance to the point. Seeds that are not live
/// vertices are ignored.
pub fn dijkstra_seeded<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    seeds: &[(VertexId<I>, f64)],
    options: &DijkstraOptions,
) -> GeodesicResult<I> {
    let n = mesh.vertex_capacity();
    let mut distances = vec![f64::INFINITY; n];
    let mut predecessors: Option<Vec<Option<usize>>> = if options.store_predecessors {
        Some(vec![None; n])
    } else {
        None
    };

    let mut heap = BinaryHeap::new();
    for &(source, start) in seeds {
        let idx = source.index();
        if idx < n && mesh.is_live_vertex(source) && start < distances[idx] {
            distances[idx] = start;
            heap.push(DijkstraEntry::new(idx, start));
        }
    }

    while let Some(entry) = heap.pop() {
        let u = entry.vertex;
        let dist_u = entry.distance;

        // Stale entry.
        if dist_u > distances[u] {
            continue;
        }
        if options.target == Some(u) {
            break;
        }
        if options.max_distance.is_some_and(|max| dist_u > max) {
            continue;
        }

        for he in mesh.vertex_halfedges(VertexId::new(u)) {
            let v = mesh.target(he).index();
            let new_dist = dist_u + mesh.edge_length(he);
            if new_dist < distances[v] {
                distances[v] = new_dist;
                if let Some(ref mut preds) = predecessors {
                    preds[v] = Some(u);
                }
                heap.push(DijkstraEntry::new(v, new_dist));
            }
        }
    }

    GeodesicResult::new(distances, predecessors)
}
