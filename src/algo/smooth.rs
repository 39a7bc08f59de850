//! Mesh smoothing and curvature flow.
//!
//! # Algorithms
//!
//! - [`smooth_laplacian`]: umbrella-operator smoothing, shrinks the surface
//! - [`smooth_taubin`]: alternating λ|μ passes (0.8 / −0.805) that cancel
//!   most of the shrinkage
//! - [`smooth_laplacian_region`], [`smooth_taubin_region`]: the same on a
//!   vertex subset, with the rest of the mesh held fixed
//! - [`mean_curvature_flow`]: implicit cotangent flow held to the input
//!   shape by a weak anchor, so it settles on every topology
//!
//! All updates are simultaneous: every new position is computed from the old
//! positions before any vertex moves, so parallel and sequential runs agree
//! bit for bit.
//!
//! # Example
//!
//! ```
//! use surfmesh::algo::primitives::make_cube;
//! use surfmesh::algo::smooth::{smooth_laplacian, smooth_taubin, SmoothOptions};
//! use nalgebra::Point3;
//!
//! let mut mesh = make_cube::<u32>(&Point3::new(-1.0, -1.0, -1.0), &Point3::new(1.0, 1.0, 1.0), 1).unwrap();
//! smooth_laplacian(&mut mesh, 0.8, 1, &SmoothOptions::default());
//! smooth_taubin(&mut mesh, 2, &SmoothOptions::default());
//! ```

use nalgebra::{DVector, Point3, Vector3};
use rayon::prelude::*;

use crate::error::{MeshError, Result};
use crate::mesh::{HalfEdgeId, HalfEdgeMesh, MeshIndex, VertexId};

use super::sparse::{conjugate_gradient, CsrMatrix};
use super::Progress;

/// First Taubin factor.
pub const TAUBIN_LAMBDA: f64 = 0.8;

/// Second Taubin factor.
pub const TAUBIN_MU: f64 = -0.805;

/// Options shared by the smoothing operators.
#[derive(Debug, Clone)]
pub struct SmoothOptions {
    /// Keep boundary vertices where they are.
    pub preserve_boundary: bool,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl Default for SmoothOptions {
    fn default() -> Self {
        Self {
            preserve_boundary: false,
            parallel: true,
        }
    }
}

impl SmoothOptions {
    /// Set whether boundary vertices stay fixed.
    pub fn with_preserve_boundary(mut self, preserve: bool) -> Self {
        self.preserve_boundary = preserve;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Laplacian smoothing of every vertex.
///
/// Each iteration moves every vertex by `factor × (mean of neighbours − position)`.
pub fn smooth_laplacian<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    factor: f64,
    iterations: usize,
    options: &SmoothOptions,
) {
    let movable = movable_mask(mesh, None, options.preserve_boundary);
    for _ in 0..iterations {
        apply_umbrella_step(mesh, &movable, factor, options.parallel);
    }
}

/// Laplacian smoothing restricted to `region`.
///
/// Vertices outside the region act as fixed neighbours.
pub fn smooth_laplacian_region<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    region: &[VertexId<I>],
    factor: f64,
    iterations: usize,
    options: &SmoothOptions,
) {
    let movable = movable_mask(mesh, Some(region), options.preserve_boundary);
    for _ in 0..iterations {
        apply_umbrella_step(mesh, &movable, factor, options.parallel);
    }
}

/// Taubin λ|μ smoothing: per iteration a pass with factor 0.8, then one
/// with −0.805.
pub fn smooth_taubin<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    iterations: usize,
    options: &SmoothOptions,
) {
    smooth_taubin_with_progress(mesh, iterations, options, &Progress::none());
}

/// Taubin smoothing restricted to `region`.
pub fn smooth_taubin_region<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    region: &[VertexId<I>],
    iterations: usize,
    options: &SmoothOptions,
) {
    let movable = movable_mask(mesh, Some(region), options.preserve_boundary);
    for _ in 0..iterations {
        apply_umbrella_step(mesh, &movable, TAUBIN_LAMBDA, options.parallel);
        apply_umbrella_step(mesh, &movable, TAUBIN_MU, options.parallel);
    }
}

/// Taubin smoothing with progress reporting.
pub fn smooth_taubin_with_progress<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    iterations: usize,
    options: &SmoothOptions,
    progress: &Progress,
) {
    let movable = movable_mask(mesh, None, options.preserve_boundary);
    for iter in 0..iterations {
        progress.report(iter, iterations, "Taubin smoothing");
        apply_umbrella_step(mesh, &movable, TAUBIN_LAMBDA, options.parallel);
        apply_umbrella_step(mesh, &movable, TAUBIN_MU, options.parallel);
    }
    progress.report(iterations, iterations, "Taubin smoothing");
}

/// Per-slot flag: live, inside the region, and not a protected boundary vertex.
fn movable_mask<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    region: Option<&[VertexId<I>]>,
    preserve_boundary: bool,
) -> Vec<bool> {
    let mut movable = vec![false; mesh.vertex_capacity()];
    let mut mark = |v: VertexId<I>| {
        if mesh.is_live_vertex(v) && !(preserve_boundary && mesh.is_boundary_vertex(v)) {
            movable[v.index()] = true;
        }
    };
    match region {
        Some(region) => region.iter().copied().for_each(&mut mark),
        None => mesh.vertex_ids().for_each(&mut mark),
    }
    movable
}

fn umbrella_target<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>, factor: f64) -> Point3<f64> {
    let p = *mesh.position(v);
    let mut sum = Vector3::zeros();
    let mut count = 0usize;
    for w in mesh.vertex_neighbors(v) {
        sum += mesh.position(w).coords;
        count += 1;
    }
    if count == 0 {
        return p;
    }
    p + factor * (sum / count as f64 - p.coords)
}

fn apply_umbrella_step<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    movable: &[bool],
    factor: f64,
    parallel: bool,
) {
    let snapshot: &HalfEdgeMesh<I> = mesh;
    let compute = |i: usize| {
        movable[i].then(|| umbrella_target(snapshot, VertexId::new(i), factor))
    };
    let updates: Vec<Option<Point3<f64>>> = if parallel {
        (0..movable.len()).into_par_iter().map(compute).collect()
    } else {
        (0..movable.len()).map(compute).collect()
    };

    for (i, update) in updates.into_iter().enumerate() {
        if let Some(p) = update {
            mesh.set_position(VertexId::new(i), p);
        }
    }
}

// ============================================================================
// Implicit mean curvature flow
// ============================================================================

/// Options for [`mean_curvature_flow`].
#[derive(Debug, Clone)]
pub struct CurvatureFlowOptions {
    /// Number of recorded steps once the flow has settled.
    pub steps: usize,

    /// Time step, in units of the squared mean edge length.
    pub time_step: f64,

    /// Relative area change below which the flow counts as settled.
    pub tolerance: f64,

    /// Cap on the number of settling steps before recording starts.
    pub max_settle_steps: usize,

    /// Strength of the pull back towards the input positions, relative to
    /// the mass of each vertex.
    pub anchor: f64,

    /// Solve the three coordinate systems in parallel (default: true).
    pub parallel: bool,
}

impl Default for CurvatureFlowOptions {
    fn default() -> Self {
        Self {
            steps: 5,
            time_step: 0.05,
            tolerance: 1e-6,
            max_settle_steps: 200,
            anchor: 0.2,
            parallel: true,
        }
    }
}

impl CurvatureFlowOptions {
    /// Set the number of recorded steps.
    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    /// Set the time step.
    pub fn with_time_step(mut self, time_step: f64) -> Self {
        self.time_step = time_step;
        self
    }

    /// Set the settling tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the settling step cap.
    pub fn with_max_settle_steps(mut self, max_settle_steps: usize) -> Self {
        self.max_settle_steps = max_settle_steps;
        self
    }

    /// Set the anchor strength.
    pub fn with_anchor(mut self, anchor: f64) -> Self {
        self.anchor = anchor;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(MeshError::invalid_param(
                "time_step",
                self.time_step,
                "must be positive and finite",
            ));
        }
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(MeshError::invalid_param(
                "tolerance",
                self.tolerance,
                "must be positive",
            ));
        }
        if !(self.anchor.is_finite() && self.anchor > 0.0) {
            return Err(MeshError::invalid_param(
                "anchor",
                self.anchor,
                "must be positive and finite",
            ));
        }
        Ok(())
    }
}

/// Implicit mean curvature flow.
///
/// Each step solves `((1 + a)·M − dt·L) x' = M (x + a·x₀)` per coordinate,
/// where `L` is the cotangent Laplacian, `M` the lumped (one third of the
/// incident area) mass matrix, `x₀` the input positions and `a` the
/// [`anchor`](CurvatureFlowOptions::anchor). For fixed operators every step
/// shrinks the distance to the fixed point by at least `1 / (1 + a)`, so the
/// flow settles on a smoothed copy of the input whatever its genus, where a
/// free flow would shrink a sphere to a point and pinch a torus. Boundary
/// vertices of an open mesh stay fixed.
///
/// The flow first runs until the relative area change per step falls below
/// `tolerance` (at most `max_settle_steps` steps), then records the total
/// surface area after each of `steps` further steps.
///
/// # Errors
///
/// [`MeshError::EmptyMesh`] for a mesh without faces,
/// [`MeshError::InvalidParameter`] for bad options, and
/// [`MeshError::ConvergenceFailed`] when a linear solve does not converge or
/// the flow has not settled after `max_settle_steps` steps. Nothing is
/// recorded in that case; the mesh keeps the positions reached so far.
pub fn mean_curvature_flow<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    options: &CurvatureFlowOptions,
) -> Result<Vec<f64>> {
    mean_curvature_flow_with_progress(mesh, options, &Progress::none())
}

/// Mean curvature flow with progress reporting.
pub fn mean_curvature_flow_with_progress<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    options: &CurvatureFlowOptions,
    progress: &Progress,
) -> Result<Vec<f64>> {
    options.validate()?;
    if mesh.num_faces() == 0 {
        return Err(MeshError::EmptyMesh);
    }

    let flow = Flow {
        dt: options.time_step * mesh.average_edge_length().powi(2),
        anchor: options.anchor,
        rest: (0..mesh.vertex_capacity())
            .map(|i| *mesh.position(VertexId::new(i)))
            .collect(),
        closed: mesh.is_closed(),
        parallel: options.parallel,
    };

    let mut area = mesh.surface_area();
    let mut settled = options.max_settle_steps == 0;
    for settle in 0..options.max_settle_steps {
        progress.report_sub(settle, options.max_settle_steps, 0, 2, "Settling curvature flow");
        flow.step(mesh)?;
        let new_area = mesh.surface_area();
        let change = (area - new_area).abs() / area.max(f64::MIN_POSITIVE);
        area = new_area;
        if change < options.tolerance {
            log::debug!("curvature flow settled after {} steps", settle + 1);
            settled = true;
            break;
        }
    }
    if !settled {
        log::warn!(
            "curvature flow still moving after {} steps",
            options.max_settle_steps
        );
        return Err(MeshError::ConvergenceFailed {
            iterations: options.max_settle_steps,
        });
    }

    let mut areas = Vec::with_capacity(options.steps);
    for step in 0..options.steps {
        progress.report_sub(step, options.steps, 1, 2, "Curvature flow");
        flow.step(mesh)?;
        areas.push(mesh.surface_area());
    }
    progress.report(2, 2, "Curvature flow");

    Ok(areas)
}

/// Fixed parameters of one curvature flow run.
struct Flow {
    dt: f64,
    anchor: f64,
    /// Input positions by vertex index.
    rest: Vec<Point3<f64>>,
    closed: bool,
    parallel: bool,
}

impl Flow {
    fn step<I: MeshIndex>(&self, mesh: &mut HalfEdgeMesh<I>) -> Result<()> {
        let vertices: Vec<VertexId<I>> = mesh.vertex_ids().filter(|&v| !mesh.is_isolated(v)).collect();
        let mut slot = vec![usize::MAX; mesh.vertex_capacity()];
        for (k, v) in vertices.iter().enumerate() {
            slot[v.index()] = k;
        }
        let n = vertices.len();
        let fixed: Vec<bool> = vertices
            .iter()
            .map(|&v| !self.closed && mesh.is_boundary_vertex(v))
            .collect();

        let mass = lumped_mass(mesh, &vertices);
        let coords: Vec<DVector<f64>> = (0..3)
            .map(|axis| DVector::from_iterator(n, vertices.iter().map(|&v| mesh.position(v)[axis])))
            .collect();

        let mut triplets = Vec::with_capacity(n * 7);
        let mut rhs: Vec<DVector<f64>> = (0..3)
            .map(|axis| {
                DVector::from_fn(n, |i, _| {
                    if fixed[i] {
                        coords[axis][i]
                    } else {
                        let rest = self.rest[vertices[i].index()][axis];
                        mass[i] * (coords[axis][i] + self.anchor * rest)
                    }
                })
            })
            .collect();

        for (i, &v) in vertices.iter().enumerate() {
            if fixed[i] {
                triplets.push((i, i, 1.0));
                continue;
            }
            let mut diag = mass[i] * (1.0 + self.anchor);
            for he in mesh.vertex_halfedges(v) {
                let j = slot[mesh.target(he).index()];
                let w = self.dt * cotangent_weight(mesh, he).max(0.0);
                diag += w;
                if fixed[j] {
                    for axis in 0..3 {
                        rhs[axis][i] += w * coords[axis][j];
                    }
                } else {
                    triplets.push((i, j, -w));
                }
            }
            triplets.push((i, i, diag));
        }

        let system = CsrMatrix::from_triplets(n, n, triplets);
        let max_iter = 10 * n + 100;
        let solve = |axis: usize| conjugate_gradient(&system, &rhs[axis], Some(&coords[axis]), max_iter, 1e-10);
        let solved: Vec<Result<DVector<f64>>> = if self.parallel {
            (0..3).into_par_iter().map(solve).collect()
        } else {
            (0..3).map(solve).collect()
        };
        let solved = solved.into_iter().collect::<Result<Vec<_>>>()?;

        for (i, &v) in vertices.iter().enumerate() {
            mesh.set_position(v, Point3::new(solved[0][i], solved[1][i], solved[2][i]));
        }
        Ok(())
    }
}

/// One third of the incident face area per vertex.
fn lumped_mass<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, vertices: &[VertexId<I>]) -> Vec<f64> {
    vertices
        .iter()
        .map(|&v| {
            let m: f64 = mesh
                .vertex_faces(v)
                .map(|f| mesh.face_area(f) / mesh.face_degree(f) as f64)
                .sum();
            m.max(1e-300)
        })
        .collect()
}

/// The cotangent weight `(cot α + cot β) / 2` of the edge of `he`.
///
/// α and β are the angles opposite the edge in its two triangles; a boundary
/// side contributes nothing.
pub(crate) fn cotangent_weight<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, he: HalfEdgeId<I>) -> f64 {
    let p0 = mesh.position(mesh.origin(he));
    let p1 = mesh.position(mesh.target(he));
    let mut weight = 0.0;

    if !mesh.is_boundary_halfedge(he) {
        let opp = mesh.position(mesh.target(mesh.next(he)));
        weight += cotangent_at(opp, p0, p1);
    }
    let twin = he.pair();
    if !mesh.is_boundary_halfedge(twin) {
        let opp = mesh.position(mesh.target(mesh.next(twin)));
        weight += cotangent_at(opp, p1, p0);
    }

    weight * 0.5
}

/// Cotangent of the angle at `a` in triangle (a, b, c).
fn cotangent_at(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let ab = b - a;
    let ac = c - a;
    let cross = ab.cross(&ac).norm();
    if cross < 1e-12 {
        return 0.0;
    }
    ab.dot(&ac) / cross
}
