//! Surface reconstruction from oriented points.
//!
//! The surface is the zero set of a signed distance estimate: the distance
//! of a query point to the tangent planes of its nearest samples, blended
//! with Gaussian weights. It is extracted with the implicit polygonizer.

use nalgebra::{Point3, Vector3};

use crate::algo::implicit::{implicit_surface, ImplicitOptions};
use crate::algo::query::PointGrid;
use crate::error::{MeshError, Result};
use crate::geometry::Aabb;
use crate::mesh::{HalfEdgeMesh, MeshIndex};

/// Samples blended per field evaluation.
const NEIGHBOURS: usize = 8;

/// A source of oriented sample points.
pub trait PointSource {
    /// Sample positions with their outward normals.
    fn oriented_points(&self) -> Vec<(Point3<f64>, Vector3<f64>)>;
}

impl<I: MeshIndex> PointSource for HalfEdgeMesh<I> {
    fn oriented_points(&self) -> Vec<(Point3<f64>, Vector3<f64>)> {
        self.vertex_ids()
            .filter(|&v| !self.is_isolated(v))
            .map(|v| (*self.position(v), self.vertex_normal(v)))
            .collect()
    }
}

impl PointSource for [(Point3<f64>, Vector3<f64>)] {
    fn oriented_points(&self) -> Vec<(Point3<f64>, Vector3<f64>)> {
        self.to_vec()
    }
}

impl PointSource for Vec<(Point3<f64>, Vector3<f64>)> {
    fn oriented_points(&self) -> Vec<(Point3<f64>, Vector3<f64>)> {
        self.clone()
    }
}

/// Options for [`reconstruct`].
#[derive(Debug, Clone)]
pub struct ReconstructOptions {
    /// Grid cells along each axis of the sampling box.
    pub resolution: usize,

    /// How sharply the nearest sample dominates the blend. The Gaussian width
    /// is the sample spacing divided by this.
    pub sharpness: f64,

    /// Radius of the sampling sphere as a multiple of the half diagonal of
    /// the points' bounding box.
    pub bound: f64,
}

impl Default for ReconstructOptions {
    fn default() -> Self {
        Self {
            resolution: 32,
            sharpness: 1.0,
            bound: 1.2,
        }
    }
}

impl ReconstructOptions {
    /// Set the grid resolution.
    pub fn with_resolution(mut self, resolution: usize) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set the blending sharpness.
    pub fn with_sharpness(mut self, sharpness: f64) -> Self {
        self.sharpness = sharpness;
        self
    }

    /// Set the relative bounding radius.
    pub fn with_bound(mut self, bound: f64) -> Self {
        self.bound = bound;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.resolution < 2 {
            return Err(MeshError::invalid_param("resolution", self.resolution, "must be at least 2"));
        }
        if !(self.sharpness.is_finite() && self.sharpness > 0.0) {
            return Err(MeshError::invalid_param("sharpness", self.sharpness, "must be positive"));
        }
        if !(self.bound.is_finite() && self.bound >= 1.0) {
            return Err(MeshError::invalid_param("bound", self.bound, "must be at least 1"));
        }
        Ok(())
    }
}

/// Signed distance estimate to the surface sampled by oriented points.
struct TangentPlaneField {
    grid: PointGrid,
    normals: Vec<Vector3<f64>>,
    cell: f64,
    reach: f64,
    inv_width2: f64,
}

impl TangentPlaneField {
    fn new(samples: Vec<(Point3<f64>, Vector3<f64>)>, spacing: f64, sharpness: f64, reach: f64) -> Self {
        let (points, normals): (Vec<_>, Vec<_>) = samples.into_iter().unzip();
        let width = spacing / sharpness;
        Self {
            grid: PointGrid::new(points, spacing),
            normals,
            cell: spacing,
            reach,
            inv_width2: 1.0 / (width * width),
        }
    }

    /// Nearest samples, closest first.
    fn nearest(&self, p: &Point3<f64>) -> Vec<(f64, usize)> {
        let mut radius = self.cell;
        loop {
            let found = self.grid.within(p, radius);
            if found.len() >= NEIGHBOURS || radius >= self.reach {
                let mut by_distance: Vec<(f64, usize)> = found
                    .into_iter()
                    .map(|i| ((self.grid.point(i) - p).norm_squared(), i))
                    .collect();
                by_distance.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                by_distance.truncate(NEIGHBOURS);
                return by_distance;
            }
            radius *= 2.0;
        }
    }

    fn value(&self, p: &Point3<f64>) -> f64 {
        let nearest = self.nearest(p);
        let Some(&(d0, _)) = nearest.first() else {
            return f64::MAX;
        };
        let plane_distance = |i: usize| self.normals[i].dot(&(p - self.grid.point(i)));

        let mut weighted = 0.0;
        let mut total = 0.0;
        for &(d2, i) in &nearest {
            // Weights relative to the nearest sample so they never all underflow.
            let w = (-(d2 - d0) * self.inv_width2).exp();
            weighted += w * plane_distance(i);
            total += w;
        }
        weighted / total
    }
}

/// Reconstruct a closed surface from oriented points.
///
/// The result is a closed manifold but may contain very short edges; run
/// [`collapse_edges`](crate::algo::remesh::collapse_edges) on it afterwards.
///
/// # Errors
///
/// - [`MeshError::InvalidParameter`] for bad options.
/// - [`MeshError::DegenerateGeometry`] when there are no usable samples,
///   when they are coplanar, or when no surface is found.
///
/// # Example
///
/// ```
/// use surfmesh::prelude::*;
/// use surfmesh::algo::reconstruct::{reconstruct, ReconstructOptions};
///
/// let cube: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(10.0, 10.0, 10.0), 10).unwrap();
/// let options = ReconstructOptions::default().with_resolution(20).with_bound(1.0);
/// let mesh: HalfEdgeMesh = reconstruct(&cube, &options).unwrap();
/// assert!(mesh.num_faces() > 0);
/// ```
pub fn reconstruct<I, S>(source: &S, options: &ReconstructOptions) -> Result<HalfEdgeMesh<I>>
where
    I: MeshIndex,
    S: PointSource + ?Sized,
{
    options.validate()?;
    let samples: Vec<(Point3<f64>, Vector3<f64>)> = source
        .oriented_points()
        .into_iter()
        .filter(|(p, _)| p.coords.iter().all(|c| c.is_finite()))
        .filter_map(|(p, n)| n.try_normalize(f64::EPSILON).map(|n| (p, n)))
        .collect();
    if samples.is_empty() {
        return Err(MeshError::degenerate("no oriented samples to reconstruct from"));
    }

    let bbox = Aabb::from_points(samples.iter().map(|(p, _)| *p));
    let diagonal = bbox.diagonal();
    if is_flat(&samples, diagonal) {
        return Err(MeshError::degenerate("samples are coplanar"));
    }

    let spacing = diagonal / (samples.len() as f64).sqrt();
    let field = TangentPlaneField::new(samples, spacing, options.sharpness, 2.0 * diagonal);
    let implicit = ImplicitOptions::new(0.5 * diagonal * options.bound)
        .with_centre(bbox.center())
        .with_resolution(options.resolution)
        .with_error_bound(1e-6 * diagonal);

    let mesh = implicit_surface(&|p: Point3<f64>| field.value(&p), &implicit)?;
    log::debug!(
        "reconstructed {} vertices, {} faces from {} samples",
        mesh.num_vertices(),
        mesh.num_faces(),
        field.normals.len()
    );
    Ok(mesh)
}

/// Whether every sample lies in one plane (or on one line or point).
fn is_flat(samples: &[(Point3<f64>, Vector3<f64>)], diagonal: f64) -> bool {
    let tolerance = 1e-9 * diagonal.max(f64::MIN_POSITIVE);
    let origin = samples[0].0;
    let Some(&(far, _)) = samples
        .iter()
        .max_by(|a, b| (a.0 - origin).norm_squared().total_cmp(&(b.0 - origin).norm_squared()))
    else {
        return true;
    };
    let axis = far - origin;
    let normal = samples
        .iter()
        .map(|(p, _)| axis.cross(&(p - origin)))
        .max_by(|a, b| a.norm_squared().total_cmp(&b.norm_squared()))
        .and_then(|n| n.try_normalize(f64::EPSILON));
    match normal {
        None => true,
        Some(n) => samples.iter().all(|(p, _)| n.dot(&(p - origin)).abs() <= tolerance),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::primitives::{make_cube, make_sphere};
    use crate::algo::remesh::collapse_edges;

    #[test]
    fn test_reconstruct_cube() {
        let cube: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(10.0, 10.0, 10.0), 10).unwrap();
        let options = ReconstructOptions::default().with_resolution(20).with_bound(1.0);
        let mut mesh: HalfEdgeMesh = reconstruct(&cube, &options).unwrap();
        collapse_edges(&mut mesh, None).unwrap();

        assert!(mesh.num_vertices() > 0 && mesh.num_faces() > 0 && mesh.num_edges() > 0);
        assert!(mesh.is_closed());
        assert!((mesh.volume() - 1000.0).abs() < 200.0);
    }

    #[test]
    fn test_reconstruct_sphere_radius() {
        let sphere: HalfEdgeMesh = make_sphere(&Point3::new(1.0, 2.0, 3.0), 2.0, 16).unwrap();
        let mesh: HalfEdgeMesh = reconstruct(&sphere, &ReconstructOptions::default().with_resolution(24)).unwrap();

        for v in mesh.vertex_ids() {
            let r = (mesh.position(v) - Point3::new(1.0, 2.0, 3.0)).norm();
            assert!((r - 2.0).abs() < 0.2, "vertex at radius {r}");
        }
    }

    #[test]
    fn test_reconstruct_degenerate_inputs() {
        let empty: Vec<(Point3<f64>, Vector3<f64>)> = Vec::new();
        let r: Result<HalfEdgeMesh> = reconstruct(&empty, &ReconstructOptions::default());
        assert!(matches!(r, Err(MeshError::DegenerateGeometry { .. })));

        let flat: Vec<(Point3<f64>, Vector3<f64>)> = (0..25)
            .map(|i| (Point3::new((i % 5) as f64, (i / 5) as f64, 0.0), Vector3::z()))
            .collect();
        let r: Result<HalfEdgeMesh> = reconstruct(&flat, &ReconstructOptions::default());
        assert!(matches!(r, Err(MeshError::DegenerateGeometry { .. })));

        let r: Result<HalfEdgeMesh> = reconstruct(&flat, &ReconstructOptions::default().with_sharpness(0.0));
        assert!(matches!(r, Err(MeshError::InvalidParameter { .. })));
    }
}
