//! Polygonization of implicit surfaces.
//!
//! The zero set of a scalar field is extracted by marching tetrahedra on a
//! regular grid: every cube is cut into six tetrahedra around its main
//! diagonal, which has no ambiguous cases and makes neighbouring cells agree
//! on their shared faces. Each sign-changing grid edge gets one vertex, found
//! by bisection and shared by every cell around the edge, so the output is a
//! closed manifold.
//!
//! Negative values are inside. Samples on the outer layer of the grid are
//! clamped to the outside, which caps any part of the surface that leaves
//! the sampling box.

use std::collections::HashMap;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::error::{MeshError, Result};
use crate::mesh::{build_from_triangles, HalfEdgeMesh, MeshIndex};

use super::remesh::{collapse_edges, split_edges};

/// A scalar field sampled by the polygonizer; negative means inside.
pub trait ScalarField {
    /// Field value at `p`.
    fn value(&self, p: &Point3<f64>) -> f64;
}

impl<F> ScalarField for F
where
    F: Fn(Point3<f64>) -> f64,
{
    fn value(&self, p: &Point3<f64>) -> f64 {
        self(*p)
    }
}

/// Options for [`implicit_surface`].
#[derive(Debug, Clone)]
pub struct ImplicitOptions {
    /// Centre of the bounding sphere.
    pub centre: Point3<f64>,

    /// Radius of the bounding sphere; the sampling box circumscribes it.
    pub bounding_radius: f64,

    /// Grid cells along each axis.
    pub resolution: usize,

    /// Bisection stops once the bracketing interval is shorter than this.
    pub error_bound: f64,

    /// Edges longer than this are split after extraction.
    pub edge_bound: Option<f64>,
}

impl ImplicitOptions {
    /// Options for a bounding sphere of the given radius around the origin.
    pub fn new(bounding_radius: f64) -> Self {
        Self {
            centre: Point3::origin(),
            bounding_radius,
            resolution: 32,
            error_bound: 1e-6 * bounding_radius.abs(),
            edge_bound: None,
        }
    }

    /// Set the bounding sphere centre.
    pub fn with_centre(mut self, centre: Point3<f64>) -> Self {
        self.centre = centre;
        self
    }

    /// Set the grid resolution.
    pub fn with_resolution(mut self, resolution: usize) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set the bisection tolerance.
    pub fn with_error_bound(mut self, error_bound: f64) -> Self {
        self.error_bound = error_bound;
        self
    }

    /// Set the maximum edge length.
    pub fn with_edge_bound(mut self, edge_bound: f64) -> Self {
        self.edge_bound = Some(edge_bound);
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.bounding_radius.is_finite() && self.bounding_radius > 0.0) {
            return Err(MeshError::invalid_param(
                "bounding_radius",
                self.bounding_radius,
                "must be positive",
            ));
        }
        if self.resolution < 2 {
            return Err(MeshError::invalid_param(
                "resolution",
                self.resolution,
                "must be at least 2",
            ));
        }
        if self.error_bound.is_nan() || self.error_bound <= 0.0 {
            return Err(MeshError::invalid_param(
                "error_bound",
                self.error_bound,
                "must be positive",
            ));
        }
        if let Some(bound) = self.edge_bound {
            if bound.is_nan() || bound <= 0.0 {
                return Err(MeshError::invalid_param("edge_bound", bound, "must be positive"));
            }
        }
        Ok(())
    }
}

/// Cube corner offsets; corner `c` sits at `CORNERS[c]` grid steps.
const CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// The six tetrahedra around the diagonal 0-6.
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 5, 1, 6],
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
];

struct Grid {
    origin: Point3<f64>,
    step: f64,
    n: usize,
}

impl Grid {
    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * (self.n + 1) + j) * (self.n + 1) + i
    }

    fn point(&self, index: usize) -> Point3<f64> {
        let m = self.n + 1;
        let (i, j, k) = (index % m, (index / m) % m, index / (m * m));
        self.origin + Vector3::new(i as f64, j as f64, k as f64) * self.step
    }

    fn on_border(&self, index: usize) -> bool {
        let m = self.n + 1;
        let (i, j, k) = (index % m, (index / m) % m, index / (m * m));
        [i, j, k].iter().any(|&c| c == 0 || c == self.n)
    }
}

/// Polygonize the zero set of `field`.
///
/// # Errors
///
/// [`MeshError::InvalidParameter`] for bad options and
/// [`MeshError::DegenerateGeometry`] when the field has no sign change inside
/// the sampling box.
pub fn implicit_surface<I, F>(field: &F, options: &ImplicitOptions) -> Result<HalfEdgeMesh<I>>
where
    I: MeshIndex,
    F: ScalarField + Sync,
{
    options.validate()?;

    let n = options.resolution;
    let r = options.bounding_radius;
    let grid = Grid {
        origin: options.centre - Vector3::repeat(r),
        step: 2.0 * r / n as f64,
        n,
    };

    let samples: Vec<f64> = (0..(n + 1).pow(3))
        .into_par_iter()
        .map(|idx| {
            let value = field.value(&grid.point(idx));
            if grid.on_border(idx) {
                value.max(f64::MIN_POSITIVE)
            } else {
                value
            }
        })
        .collect();
    let inside = |idx: usize| samples[idx] < 0.0;

    let mut vertices: Vec<Point3<f64>> = Vec::new();
    let mut crossing: HashMap<(usize, usize), usize> = HashMap::new();
    let mut faces: Vec<[usize; 3]> = Vec::new();

    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                let corner_index: [usize; 8] =
                    CORNERS.map(|[di, dj, dk]| grid.index(i + di, j + dj, k + dk));
                let mask = corner_index.iter().filter(|&&c| inside(c)).count();
                if mask == 0 || mask == 8 {
                    continue;
                }
                for tet in &TETRAHEDRA {
                    let ids = tet.map(|c| corner_index[c]);
                    let (neg, pos): (Vec<usize>, Vec<usize>) =
                        ids.iter().partition(|&&c| inside(c));
                    let mut vertex_on = |a: usize, b: usize| {
                        let key = (a.min(b), a.max(b));
                        *crossing.entry(key).or_insert_with(|| {
                            vertices.push(bisect(field, &grid, a, b, options.error_bound));
                            vertices.len() - 1
                        })
                    };
                    let triangles: Vec<[usize; 3]> = match (neg.len(), pos.len()) {
                        (1, 3) => vec![[
                            vertex_on(neg[0], pos[0]),
                            vertex_on(neg[0], pos[1]),
                            vertex_on(neg[0], pos[2]),
                        ]],
                        (3, 1) => vec![[
                            vertex_on(pos[0], neg[0]),
                            vertex_on(pos[0], neg[1]),
                            vertex_on(pos[0], neg[2]),
                        ]],
                        (2, 2) => {
                            let ac = vertex_on(neg[0], pos[0]);
                            let ad = vertex_on(neg[0], pos[1]);
                            let bd = vertex_on(neg[1], pos[1]);
                            let bc = vertex_on(neg[1], pos[0]);
                            vec![[ac, ad, bd], [ac, bd, bc]]
                        }
                        _ => Vec::new(),
                    };
                    let outward = centroid_of(&grid, &pos) - centroid_of(&grid, &neg);
                    for tri in triangles {
                        faces.push(orient_towards(&vertices, tri, &outward));
                    }
                }
            }
        }
    }

    if faces.is_empty() {
        return Err(MeshError::degenerate("scalar field has no zero crossing in the sampling box"));
    }
    log::debug!(
        "implicit surface: {} crossings, {} triangles on a {}^3 grid",
        vertices.len(),
        faces.len(),
        n
    );

    let mut mesh = build_from_triangles(&vertices, &faces)?;
    collapse_edges(&mut mesh, Some(1e-3 * grid.step))?;
    if let Some(bound) = options.edge_bound {
        split_edges(&mut mesh, bound)?;
    }
    Ok(mesh)
}

/// Bisect the grid edge `a`-`b` (one end inside, one outside).
fn bisect<F: ScalarField>(field: &F, grid: &Grid, a: usize, b: usize, error_bound: f64) -> Point3<f64> {
    let (mut lo, mut hi) = (grid.point(a), grid.point(b));
    if field.value(&lo) >= 0.0 {
        std::mem::swap(&mut lo, &mut hi);
    }
    for _ in 0..64 {
        if (hi - lo).norm() <= error_bound {
            break;
        }
        let mid = nalgebra::center(&lo, &hi);
        if field.value(&mid) < 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    nalgebra::center(&lo, &hi)
}

fn centroid_of(grid: &Grid, ids: &[usize]) -> Point3<f64> {
    let sum: Vector3<f64> = ids.iter().map(|&i| grid.point(i).coords).sum();
    Point3::from(sum / ids.len().max(1) as f64)
}

/// Wind `tri` so its normal points along `outward`.
fn orient_towards(vertices: &[Point3<f64>], tri: [usize; 3], outward: &Vector3<f64>) -> [usize; 3] {
    let [a, b, c] = tri.map(|i| vertices[i]);
    if (b - a).cross(&(c - a)).dot(outward) < 0.0 {
        [tri[0], tri[2], tri[1]]
    } else {
        tri
    }
}
