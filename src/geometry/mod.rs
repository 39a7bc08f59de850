//! Geometry kernel.
//!
//! Exact orientation predicates, planes, bounding boxes, triangle
//! intersection and distance queries, and a triangle BVH. Every numeric
//! decision made by the mesh algorithms goes through this module.

pub mod aabb;
pub mod bvh;
pub mod intersect;
pub mod plane;
pub mod predicates;

pub use aabb::Aabb;
pub use bvh::{Bvh, ClosestPoint};
pub use intersect::{
    barycentric, closest_point_on_triangle, coplanar_triangles_overlap,
    point_triangle_distance_squared, ray_triangle, segment_triangle, triangle_triangle, Ray,
    RayHit, TriangleIntersection,
};
pub use plane::{Plane, Side};
pub use predicates::{orient2d, orient3d, orient3d_value, Orientation};
