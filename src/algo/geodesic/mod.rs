//! Shortest paths along a mesh surface.
//!
//! Distances are measured along mesh edges with Dijkstra's algorithm, which
//! approximates true geodesic distance from above. [`shortest_surface_path`]
//! connects two arbitrary points by first locating them on the surface.
//!
//! # Example
//!
//! ```
//! use surfmesh::prelude::*;
//! use surfmesh::algo::geodesic::{dijkstra, DijkstraOptions};
//!
//! let mesh: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 2).unwrap();
//!
//! let result = dijkstra(&mesh, VertexId::new(0), &DijkstraOptions::default());
//! if let Some((v, d)) = result.farthest_vertex() {
//!     println!("farthest vertex {} at {}", v, d);
//! }
//! ```

mod dijkstra;
mod path;

use std::marker::PhantomData;

pub use dijkstra::{dijkstra, dijkstra_multiple, dijkstra_seeded, DijkstraOptions};
pub use path::shortest_surface_path;

use crate::mesh::{MeshIndex, VertexId};

/// Result of geodesic distance computation.
///
/// Contains distances from source vertex/vertices to all other vertices,
/// and optionally predecessor information for path reconstruction.
#[derive(Debug, Clone)]
pub struct GeodesicResult<I: MeshIndex = u32> {
    /// Distance from source(s) to each vertex slot, sized to the vertex
    /// capacity. `f64::INFINITY` if the vertex is unreachable or removed.
    distances: Vec<f64>,

    /// Predecessor vertex for each vertex (for path reconstruction).
    /// `None` if predecessors weren't computed or vertex is a source/unreachable.
    predecessors: Option<Vec<Option<usize>>>,

    /// Phantom data for the index type.
    _marker: PhantomData<I>,
}

impl<I: MeshIndex> GeodesicResult<I> {
    /// Create a new geodesic result.
    pub(crate) fn new(distances: Vec<f64>, predecessors: Option<Vec<Option<usize>>>) -> Self {
        Self {
            distances,
            predecessors,
            _marker: PhantomData,
        }
    }

    /// Get the distance to a vertex.
    ///
    /// Returns `f64::INFINITY` if the vertex is unreachable from the source(s).
    #[inline]
    pub fn distance(&self, v: VertexId<I>) -> f64 {
        self.distances[v.index()]
    }

    /// Get all distances as a slice.
    #[inline]
    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// Get the number of vertices.
    #[inline]
    pub fn len(&self) -> usize {
        self.distances.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    /// Find the vertex with the maximum finite distance from the source(s).
    ///
    /// Returns `None` if all vertices are either sources or unreachable.
    pub fn farthest_vertex(&self) -> Option<(VertexId<I>, f64)> {
        let mut max_dist = f64::NEG_INFINITY;
        let mut max_vertex = None;

        for (i, &d) in self.distances.iter().enumerate() {
            if d.is_finite() && d > max_dist {
                max_dist = d;
                max_vertex = Some(i);
            }
        }

        max_vertex.map(|i| (VertexId::new(i), max_dist))
    }

    /// Vertices from a source to `target`, both included.
    ///
    /// `None` when predecessors were not stored
    /// (`DijkstraOptions::with_predecessors(true)`) or `target` is unreachable.
    /// A source yields a single-vertex path.
    pub fn path_to(&self, target: VertexId<I>) -> Option<Vec<VertexId<I>>> {
        let predecessors = self.predecessors.as_ref()?;

        if !self.distances[target.index()].is_finite() {
            return None;
        }

        let mut path = Vec::new();
        let mut current = target.index();

        loop {
            path.push(VertexId::new(current));

            match predecessors[current] {
                Some(pred) => current = pred,
                None => break,
            }

            if path.len() > self.distances.len() {
                return None;
            }
        }

        path.reverse();
        Some(path)
    }

    /// Check if a vertex is reachable from the source(s).
    #[inline]
    pub fn is_reachable(&self, v: VertexId<I>) -> bool {
        self.distances[v.index()].is_finite()
    }

    /// Count the number of reachable vertices.
    pub fn reachable_count(&self) -> usize {
        self.distances.iter().filter(|d| d.is_finite()).count()
    }

    /// Iterate over all vertices with their distances.
    pub fn iter(&self) -> impl Iterator<Item = (VertexId<I>, f64)> + '_ {
        self.distances
            .iter()
            .enumerate()
            .map(|(i, &d)| (VertexId::new(i), d))
    }

    /// Iterate over only reachable vertices with their distances.
    pub fn reachable_iter(&self) -> impl Iterator<Item = (VertexId<I>, f64)> + '_ {
        self.iter().filter(|(_, d)| d.is_finite())
    }
}
