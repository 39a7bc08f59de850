//! Mesh processing algorithms.
//!
//! - **Primitives**: boxes, cones, cylinders, spheres and implicit surfaces
//! - **Repair**: hole filling, face triangulation, gap separation, orientation
//! - **Enclosure**: keeping one surface inside or apart from another
//! - **Remeshing**: edge splits and collapses, isotropic remeshing
//! - **Booleans**: union, intersection and difference of closed meshes
//! - **Smoothing**: Laplacian, Taubin, mean curvature flow
//! - **Queries**: spans, containment, geodesics, convex hulls, clipping,
//!   normal offsets
//! - **Reconstruction**: surfaces from oriented point samples

pub mod boolean;
pub mod clip;
pub mod enclose;
pub mod geodesic;
pub mod hull;
pub mod implicit;
pub mod offset;
pub mod primitives;
pub mod progress;
pub mod query;
pub mod reconstruct;
pub mod remesh;
pub mod repair;
pub mod smooth;
pub mod sparse;

pub use progress::Progress;
