//! Object-style API over a single mesh.
//!
//! [`Surface`] owns a [`HalfEdgeMesh`] and exposes every engine operation as
//! a method. Constructors replace the current contents; in-place operations
//! mutate it. The free functions in [`crate::algo`] remain available for
//! callers that work with meshes directly.
//!
//! ```
//! use surfmesh::prelude::*;
//!
//! let mut surface: Surface = Surface::new();
//! surface.make_cube(&Point3::new(-1.0, -1.0, -1.0), &Point3::new(1.0, 1.0, 1.0), 1).unwrap();
//! surface.clip_axis(2, 0.0, true, true).unwrap();
//! assert_eq!(surface.span(2).unwrap(), (-1.0, 0.0));
//! ```

use std::path::Path;

use nalgebra::Point3;

use crate::algo::boolean::{self, BooleanOptions};
use crate::algo::clip;
use crate::algo::enclose;
use crate::algo::geodesic::shortest_surface_path;
use crate::algo::hull::convex_hull;
use crate::algo::implicit::{implicit_surface, ImplicitOptions, ScalarField};
use crate::algo::offset;
use crate::algo::primitives;
use crate::algo::query::{self, DEFAULT_CONTAINMENT_RAYS};
use crate::algo::reconstruct::{self, PointSource, ReconstructOptions};
use crate::algo::remesh::{self, RemeshOptions};
use crate::algo::repair;
use crate::algo::smooth::{self, CurvatureFlowOptions, SmoothOptions};
use crate::error::Result;
use crate::geometry::{Aabb, Plane};
use crate::io;
use crate::mesh::{HalfEdgeMesh, MeshIndex, VertexId};

/// A triangulated surface.
#[derive(Debug, Clone)]
pub struct Surface<I: MeshIndex = u32> {
    mesh: HalfEdgeMesh<I>,
}

impl<I: MeshIndex> Default for Surface<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: MeshIndex> From<HalfEdgeMesh<I>> for Surface<I> {
    fn from(mesh: HalfEdgeMesh<I>) -> Self {
        Self { mesh }
    }
}

impl<I: MeshIndex> Surface<I> {
    /// An empty surface.
    pub fn new() -> Self {
        Self {
            mesh: HalfEdgeMesh::new(),
        }
    }

    /// Load a surface from an OFF or STL file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self { mesh: io::load(path)? })
    }

    /// Save the surface; the format follows the file extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        io::save(&self.mesh, path)
    }

    /// The underlying mesh.
    pub fn mesh(&self) -> &HalfEdgeMesh<I> {
        &self.mesh
    }

    /// Mutable access to the underlying mesh.
    pub fn mesh_mut(&mut self) -> &mut HalfEdgeMesh<I> {
        &mut self.mesh
    }

    /// Take the underlying mesh.
    pub fn into_mesh(self) -> HalfEdgeMesh<I> {
        self.mesh
    }

    /// Number of live vertices.
    pub fn num_vertices(&self) -> usize {
        self.mesh.num_vertices()
    }

    /// Number of live edges.
    pub fn num_edges(&self) -> usize {
        self.mesh.num_edges()
    }

    /// Number of live faces.
    pub fn num_faces(&self) -> usize {
        self.mesh.num_faces()
    }

    /// Remove every element.
    pub fn clear(&mut self) {
        self.mesh.clear();
    }

    // Construction. Each replaces the current contents.

    /// Axis-aligned box between `p0` and `p1`, `n` grid cells per side.
    pub fn make_cube(&mut self, p0: &Point3<f64>, p1: &Point3<f64>, n: usize) -> Result<()> {
        self.mesh = primitives::make_cube(p0, p1, n)?;
        Ok(())
    }

    /// Axis-aligned box with per-axis grid cells.
    pub fn make_box(&mut self, p0: &Point3<f64>, p1: &Point3<f64>, divisions: [usize; 3]) -> Result<()> {
        self.mesh = primitives::make_box(p0, p1, divisions)?;
        Ok(())
    }

    /// Frustum from `p0` (radius `r0`) to `p1` (radius `r1`).
    pub fn make_cone(
        &mut self,
        p0: &Point3<f64>,
        p1: &Point3<f64>,
        r0: f64,
        r1: f64,
        n: usize,
        refine_length: Option<f64>,
    ) -> Result<()> {
        self.mesh = primitives::make_cone(p0, p1, r0, r1, n, refine_length)?;
        Ok(())
    }

    /// Cylinder of radius `r` from `p0` to `p1`.
    pub fn make_cylinder(
        &mut self,
        p0: &Point3<f64>,
        p1: &Point3<f64>,
        r: f64,
        n: usize,
        refine_length: Option<f64>,
    ) -> Result<()> {
        self.mesh = primitives::make_cylinder(p0, p1, r, n, refine_length)?;
        Ok(())
    }

    /// Polygonized sphere.
    pub fn make_sphere(&mut self, centre: &Point3<f64>, radius: f64, resolution: usize) -> Result<()> {
        self.mesh = primitives::make_sphere(centre, radius, resolution)?;
        Ok(())
    }

    /// Zero set of a scalar field.
    pub fn implicit_surface<F: ScalarField + Sync>(&mut self, field: &F, options: &ImplicitOptions) -> Result<()> {
        self.mesh = implicit_surface(field, options)?;
        Ok(())
    }

    /// Replace the surface by one reconstructed from its own vertices and
    /// normals.
    pub fn reconstruct(&mut self, options: &ReconstructOptions) -> Result<()> {
        self.mesh = reconstruct::reconstruct(&self.mesh, options)?;
        Ok(())
    }

    /// Replace the surface by one reconstructed from `source`.
    pub fn reconstruct_from<S: PointSource + ?Sized>(&mut self, source: &S, options: &ReconstructOptions) -> Result<()> {
        self.mesh = reconstruct::reconstruct(source, options)?;
        Ok(())
    }

    // Repair.

    /// Fill every hole; returns how many were filled.
    pub fn fill_holes(&mut self) -> usize {
        repair::fill_holes(&mut self.mesh)
    }

    /// Triangulate every polygon face.
    pub fn triangulate_faces(&mut self) -> Result<()> {
        repair::triangulate_faces(&mut self.mesh)
    }

    /// Push apart vertices that nearly touch another part of the surface.
    pub fn separate_narrow_gaps(&mut self) -> usize {
        repair::separate_narrow_gaps(&mut self.mesh)
    }

    /// Number of intersecting pairs of non-adjacent triangles.
    pub fn num_self_intersections(&self) -> usize {
        repair::num_self_intersections(&self.mesh)
    }

    /// Move vertices outside `other` inward; returns how many were outside.
    pub fn strictly_inside(&mut self, other: &Surface<I>, offset: f64) -> usize {
        enclose::strictly_inside(&mut self.mesh, &other.mesh, offset)
    }

    /// Keep the surface inside `other` and away from it.
    pub fn separate_enclosed_surface(&mut self, other: &Surface<I>, offset: f64) -> usize {
        enclose::separate_enclosed_surface(&mut self.mesh, &other.mesh, offset)
    }

    /// Pull both surfaces out of each other; returns the remaining overlap.
    pub fn separate_overlapping_surfaces(&mut self, other: &mut Surface<I>, offset: f64, max_iterations: usize) -> usize {
        enclose::separate_overlapping_surfaces(&mut self.mesh, &mut other.mesh, offset, max_iterations)
    }

    // Remeshing.

    /// Split edges longer than `max_length`.
    pub fn split_edges(&mut self, max_length: f64) -> Result<usize> {
        remesh::split_edges(&mut self.mesh, max_length)
    }

    /// Collapse edges shorter than `min_length`, or only degenerate ones.
    pub fn collapse_edges(&mut self, min_length: Option<f64>) -> Result<usize> {
        remesh::collapse_edges(&mut self.mesh, min_length)
    }

    /// Drive edge lengths toward a uniform target.
    pub fn isotropic_remeshing(&mut self, target_length: f64, iterations: usize, protect_borders: bool) -> Result<()> {
        let options = RemeshOptions::with_target_length(target_length)
            .with_iterations(iterations)
            .with_protect_borders(protect_borders);
        remesh::isotropic_remeshing(&mut self.mesh, &options)
    }

    // Booleans. The surface is replaced by the result.

    /// Union with `other`.
    pub fn union(&mut self, other: &Surface<I>) -> Result<()> {
        self.mesh = boolean::union(&self.mesh, &other.mesh, &BooleanOptions::default())?;
        Ok(())
    }

    /// Intersection with `other`.
    pub fn intersection(&mut self, other: &Surface<I>) -> Result<()> {
        self.mesh = boolean::intersection(&self.mesh, &other.mesh, &BooleanOptions::default())?;
        Ok(())
    }

    /// Subtract `other`.
    pub fn difference(&mut self, other: &Surface<I>) -> Result<()> {
        self.mesh = boolean::difference(&self.mesh, &other.mesh, &BooleanOptions::default())?;
        Ok(())
    }

    // Smoothing.

    /// Uniform Laplacian smoothing.
    pub fn smooth_laplacian(&mut self, factor: f64, iterations: usize) {
        smooth::smooth_laplacian(&mut self.mesh, factor, iterations, &SmoothOptions::default());
    }

    /// Laplacian smoothing of a vertex subset.
    pub fn smooth_laplacian_region(&mut self, region: &[VertexId<I>], factor: f64, iterations: usize) {
        smooth::smooth_laplacian_region(&mut self.mesh, region, factor, iterations, &SmoothOptions::default());
    }

    /// Taubin smoothing.
    pub fn smooth_taubin(&mut self, iterations: usize) {
        smooth::smooth_taubin(&mut self.mesh, iterations, &SmoothOptions::default());
    }

    /// Taubin smoothing of a vertex subset.
    pub fn smooth_taubin_region(&mut self, region: &[VertexId<I>], iterations: usize) {
        smooth::smooth_taubin_region(&mut self.mesh, region, iterations, &SmoothOptions::default());
    }

    /// Implicit mean curvature flow; returns the area after each step.
    pub fn mean_curvature_flow(&mut self, options: &CurvatureFlowOptions) -> Result<Vec<f64>> {
        smooth::mean_curvature_flow(&mut self.mesh, options)
    }

    // Queries.

    /// Min and max vertex coordinate along `axis`.
    pub fn span(&self, axis: usize) -> Result<(f64, f64)> {
        query::span(&self.mesh, axis)
    }

    /// Enclosed volume.
    pub fn volume(&self) -> f64 {
        self.mesh.volume()
    }

    /// Total face area.
    pub fn area(&self) -> f64 {
        self.mesh.surface_area()
    }

    /// Bounding box, `None` when empty.
    pub fn bounding_box(&self) -> Option<Aabb> {
        self.mesh.bounding_box()
    }

    /// Whether `p` lies inside the closed surface.
    pub fn is_point_inside(&self, p: &Point3<f64>) -> bool {
        query::MeshBvh::new(&self.mesh).contains(p, DEFAULT_CONTAINMENT_RAYS)
    }

    /// The `k` vertices closest to `p`, nearest first.
    pub fn closest_vertices(&self, p: &Point3<f64>, k: usize) -> Vec<VertexId<I>> {
        query::closest_vertices(&self.mesh, p, k)
    }

    /// Shortest path over the surface, listed from `q` back to `p`.
    pub fn shortest_surface_path(&self, p: &Point3<f64>, q: &Point3<f64>) -> Result<Vec<Point3<f64>>> {
        shortest_surface_path(&self.mesh, p, q)
    }

    /// Convex hull of the vertices as a new surface.
    pub fn convex_hull(&self) -> Result<Surface<I>> {
        Ok(Surface {
            mesh: convex_hull(&self.mesh)?,
        })
    }

    /// Remove the part in front of `plane`; returns the number of caps.
    pub fn clip(&mut self, plane: &Plane, keep_closed: bool) -> Result<usize> {
        clip::clip(&mut self.mesh, plane, keep_closed)
    }

    /// Clip with the plane `axis = offset`.
    pub fn clip_axis(&mut self, axis: usize, offset: f64, positive: bool, keep_closed: bool) -> Result<usize> {
        clip::clip_axis(&mut self.mesh, axis, offset, positive, keep_closed)
    }

    /// Move every vertex along its normal.
    pub fn adjust_boundary(&mut self, delta: f64) {
        offset::adjust_boundary(&mut self.mesh, delta);
    }

    /// Grow a cylinder out of the surface towards `point`.
    pub fn extension(&mut self, point: &Point3<f64>, radius: f64, length: f64, along_normal: bool) -> Result<()> {
        offset::extension(&mut self.mesh, point, radius, length, along_normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MeshError;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn counts(s: &Surface) -> (usize, usize, usize) {
        (s.num_vertices(), s.num_faces(), s.num_edges())
    }

    fn cube(lo: f64, hi: f64, n: usize) -> Surface {
        let mut s = Surface::new();
        s.make_cube(&Point3::new(lo, lo, lo), &Point3::new(hi, hi, hi), n).unwrap();
        s
    }

    #[test]
    fn test_io_round_trip() {
        let dir = tempdir().unwrap();
        let s = cube(0.0, 1.0, 1);
        for name in ["cube.off", "cube.stl"] {
            let path = dir.path().join(name);
            s.save(&path).unwrap();
            let back: Surface = Surface::load(&path).unwrap();
            assert_eq!(counts(&back), (8, 12, 18), "{name}");
        }
    }

    #[test]
    fn test_shapes() {
        let mut s = cube(0.0, 1.0, 1);
        assert_eq!(counts(&s), (8, 12, 18));
        s.clear();
        assert_eq!(s.num_vertices(), 0);

        let (p0, p1) = (Point3::origin(), Point3::new(0.0, 0.0, 2.0));
        s.make_cone(&p0, &p1, 4.0, 2.0, 3, None).unwrap();
        assert_eq!(counts(&s), (8, 12, 18));
        s.make_cone(&p0, &p1, 1.0, 0.0, 3, None).unwrap();
        assert_eq!(counts(&s), (5, 6, 9));
        s.make_cylinder(&p0, &Point3::new(1.0, 1.0, 0.1), 2.0, 4, None).unwrap();
        assert_eq!(counts(&s), (10, 16, 24));
    }

    #[test]
    fn test_meshing() {
        let mut s: Surface = Surface::new();
        s.make_sphere(&Point3::origin(), 1.0, 10).unwrap();
        assert!(s.num_vertices() > 0 && s.num_faces() > 0 && s.num_edges() > 0);

        s.clear();
        let ellipsoid = |p: Point3<f64>| p.x * p.x + 4.0 * p.y * p.y + 4.0 * p.z * p.z - 1.0;
        s.implicit_surface(&ellipsoid, &ImplicitOptions::new(1.1).with_resolution(10)).unwrap();
        assert!(s.num_faces() > 0);
        assert!(s.mesh().is_closed());
    }

    #[test]
    fn test_remeshing_keeps_cube_closed() {
        let mut s = cube(0.0, 1.0, 1);
        s.isotropic_remeshing(1.0, 1, true).unwrap();
        assert!(s.mesh().is_valid());
        assert!(s.mesh().is_closed());
        assert_eq!(s.mesh().euler_characteristic(), 2);
    }

    #[test]
    fn test_span() {
        let mut s: Surface = Surface::new();
        s.make_cube(&Point3::origin(), &Point3::new(2.0, 1.0, 3.0), 1).unwrap();
        assert_eq!(s.span(0).unwrap(), (0.0, 2.0));
        assert_eq!(s.span(1).unwrap(), (0.0, 1.0));
        assert_eq!(s.span(2).unwrap(), (0.0, 3.0));
        assert!(matches!(s.span(3), Err(MeshError::InvalidParameter { .. })));
    }

    #[test]
    fn test_clip_and_adjust_boundary() {
        let mut s = cube(-1.0, 1.0, 1);
        s.clip_axis(2, 0.0, true, true).unwrap();
        assert_eq!(s.span(0).unwrap(), (-1.0, 1.0));
        assert_eq!(s.span(1).unwrap(), (-1.0, 1.0));
        assert_eq!(s.span(2).unwrap(), (-1.0, 0.0));
        assert!(s.mesh().is_closed());

        let mut shrunk = cube(-1.0, 1.0, 1);
        shrunk.adjust_boundary(-0.1);
        let (lo, hi) = shrunk.span(0).unwrap();
        assert!(hi - lo < 2.0);

        let mut grown = cube(-1.0, 1.0, 1);
        grown.adjust_boundary(0.1);
        let (lo, hi) = grown.span(0).unwrap();
        assert!(hi - lo > 2.0);
    }

    #[test]
    fn test_smoothing_and_flow() {
        let mut s = cube(-1.0, 1.0, 1);
        s.smooth_laplacian(0.8, 1);
        s.smooth_taubin(2);
        assert!(s.mesh().is_valid());

        let mut sphere: Surface = Surface::new();
        sphere.make_sphere(&Point3::new(0.0, 1.0, 0.0), 2.0, 10).unwrap();
        let areas = sphere
            .mean_curvature_flow(&CurvatureFlowOptions::default().with_parallel(false))
            .unwrap();
        let (first, last) = (areas[0], areas[areas.len() - 1]);
        assert_relative_eq!(first, last, max_relative = 1e-4);
    }

    #[test]
    fn test_shortest_path_reversed() {
        let s = cube(-1.0, 1.0, 1);
        let (p, q) = (Point3::new(-1.0, -1.0, 1.0), Point3::new(1.0, -1.0, 1.0));
        let path = s.shortest_surface_path(&p, &q).unwrap();
        assert_relative_eq!(path[0], q, epsilon = 1e-12);
        assert_relative_eq!(path[path.len() - 1], p, epsilon = 1e-12);
    }

    #[test]
    fn test_split_then_collapse() {
        let mut s = cube(0.0, 1.0, 1);
        s.split_edges(0.5).unwrap();
        assert_eq!(s.num_edges(), 108);
        s.collapse_edges(Some(0.4)).unwrap();
        let after = s.num_edges();
        assert!(after < 108);
        assert!(s.mesh().is_closed());

        s.split_edges(0.5).unwrap();
        let split = s.num_edges();
        // Nothing in the refined mesh is near-degenerate.
        assert_eq!(s.collapse_edges(None).unwrap(), 0);
        assert_eq!(s.num_edges(), split);
    }

    #[test]
    fn test_booleans() {
        let a: Surface = cube(0.0, 1.0, 1);
        let mut b: Surface = Surface::new();
        b.make_cube(&Point3::new(0.5, 0.25, 0.3), &Point3::new(1.5, 1.25, 1.3), 1).unwrap();

        let mut u = a.clone();
        u.union(&b).unwrap();
        assert!(u.volume() >= a.volume().max(b.volume()));

        let mut i = a.clone();
        i.intersection(&b).unwrap();
        assert!(i.volume() <= a.volume().min(b.volume()));

        let mut d = a.clone();
        d.difference(&b).unwrap();
        assert_relative_eq!(d.volume() + i.volume(), a.volume(), epsilon = 1e-9);
    }

    #[test]
    fn test_extension_grows_surface() {
        let mut s = cube(-1.0, 1.0, 4);
        let before = s.volume();
        s.extension(&Point3::new(0.0, 0.0, 2.0), 0.5, 1.0, true).unwrap();
        assert!(s.volume() > before);
        assert!(s.mesh().is_closed());
    }

    #[test]
    fn test_strictly_inside_pulls_vertices_in() {
        let outer = cube(0.0, 2.0, 4);
        let mut inner = cube(0.3, 2.3, 4);
        // Every vertex with a coordinate at 2.3 starts outside.
        assert_eq!(inner.strictly_inside(&outer, 0.5), 61);
        let mut remaining = 61;
        for _ in 0..20 {
            remaining = inner.strictly_inside(&outer, 0.5);
            if remaining == 0 {
                break;
            }
        }
        assert!(remaining < 61);
        assert!(inner.mesh().is_valid());
    }

    #[test]
    fn test_separate_enclosed_surface_stays_valid() {
        let outer = cube(0.0, 2.0, 1);
        let mut inner = cube(0.2, 1.8, 5);
        let mut rounds = 0;
        while inner.separate_enclosed_surface(&outer, 0.1) > 0 && rounds < 200 {
            rounds += 1;
        }
        assert!(rounds > 0);
        assert!(inner.mesh().is_valid());
    }

    #[test]
    fn test_reconstruction_and_hull() {
        let mut s: Surface = Surface::new();
        s.make_cube(&Point3::origin(), &Point3::new(10.0, 10.0, 10.0), 10).unwrap();
        s.reconstruct(&ReconstructOptions::default().with_resolution(20).with_bound(1.0))
            .unwrap();
        s.collapse_edges(None).unwrap();
        assert!(s.num_vertices() > 0 && s.num_faces() > 0 && s.num_edges() > 0);

        let hull = cube(-1.0, 1.0, 1).convex_hull().unwrap();
        assert_eq!(hull.num_vertices(), 8);
    }

    #[test]
    fn test_point_queries() {
        let s = cube(-1.0, 1.0, 1);
        assert!(s.is_point_inside(&Point3::origin()));
        assert!(!s.is_point_inside(&Point3::new(0.0, 3.0, 0.0)));

        let near = s.closest_vertices(&Point3::new(2.0, 2.0, 2.0), 1);
        assert_eq!(*s.mesh().position(near[0]), Point3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(s.area(), 24.0, epsilon = 1e-12);
        assert_eq!(s.num_self_intersections(), 0);
        assert!(s.bounding_box().is_some());
    }
}
