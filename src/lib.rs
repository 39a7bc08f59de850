//! # surfmesh
//!
//! A triangulated-surface mesh engine: construction, repair, remeshing,
//! Boolean combination, smoothing and geometric queries on closed or open
//! 2-manifold triangle meshes.
//!
//! ## Features
//!
//! - **Half-edge data structure**: O(1) adjacency queries with type-safe indices
//! - **Flexible indexing**: 16-bit, 32-bit and 64-bit indices
//! - **Exact predicates**: filtered `orient2d`/`orient3d` with an exact fallback
//! - **Primitives**: boxes, cones, cylinders, spheres, implicit surfaces
//! - **Booleans**: union, intersection and difference by corefinement
//! - **File formats**: OFF and STL
//!
//! ## Quick Start
//!
//! ```
//! use surfmesh::prelude::*;
//!
//! let mut surface: Surface = Surface::new();
//! surface.make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 1).unwrap();
//! assert_eq!(surface.num_vertices(), 8);
//! assert_eq!(surface.num_faces(), 12);
//! assert_eq!(surface.num_edges(), 18);
//!
//! surface.split_edges(0.5).unwrap();
//! assert_eq!(surface.num_edges(), 108);
//! ```
//!
//! ## Building Meshes Programmatically
//!
//! ```
//! use surfmesh::prelude::*;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//!     Point3::new(0.5, 0.5, 1.0),
//! ];
//! let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
//!
//! let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
//! assert!(mesh.is_closed());
//! assert!(mesh.volume() > 0.0);
//! ```
//!
//! ## Mesh Traversal
//!
//! ```
//! use surfmesh::prelude::*;
//!
//! let mesh: HalfEdgeMesh = make_icosahedron(&Point3::origin(), 1.0).unwrap();
//! let v = VertexId::new(0);
//! assert_eq!(mesh.vertex_neighbors(v).count(), 5);
//! for f in mesh.vertex_faces(v) {
//!     let [a, b, c] = mesh.face_triangle(f);
//!     assert!(a == v || b == v || c == v);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod geometry;
pub mod io;
pub mod mesh;
pub mod surface;

/// Prelude module for convenient imports.
///
/// ```
/// use surfmesh::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::primitives::{
        make_box, make_cone, make_cube, make_cylinder, make_icosahedron, make_sphere,
    };
    pub use crate::error::{MeshError, Result};
    pub use crate::mesh::{
        build_from_polygons, build_from_triangles, to_face_vertex, to_polygons, EdgeId, FaceId,
        HalfEdgeId, HalfEdgeMesh, MeshIndex, VertexId,
    };
    pub use crate::surface::Surface;
    pub use nalgebra::{Point3, Vector3};
}

// Re-export nalgebra types for convenience
pub use nalgebra;
