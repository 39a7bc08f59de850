//! Isotropic remeshing.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::algo::query::MeshBvh;
use crate::algo::Progress;
use crate::error::{MeshError, Result};
use crate::mesh::{EdgeId, HalfEdgeMesh, MeshIndex, VertexId};

use super::{collapse_short_edges, split_long_edges};

/// Options for isotropic remeshing.
#[derive(Debug, Clone)]
pub struct RemeshOptions {
    /// Target edge length for the remeshed surface.
    pub target_length: f64,

    /// Number of remeshing iterations.
    pub iterations: usize,

    /// Leave boundary vertices and boundary edges untouched.
    pub protect_borders: bool,

    /// Number of tangential relaxation rounds per iteration.
    pub relaxation_steps: usize,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl RemeshOptions {
    /// Create options with the specified target edge length.
    pub fn with_target_length(target_length: f64) -> Self {
        Self {
            target_length,
            iterations: 5,
            protect_borders: true,
            relaxation_steps: 1,
            parallel: true,
        }
    }

    /// Set the number of remeshing iterations.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set whether boundary vertices and edges are protected.
    pub fn with_protect_borders(mut self, protect: bool) -> Self {
        self.protect_borders = protect;
        self
    }

    /// Set the number of relaxation rounds per iteration.
    pub fn with_relaxation_steps(mut self, steps: usize) -> Self {
        self.relaxation_steps = steps;
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

/// Remesh towards uniform edge lengths and regular valences.
///
/// # Algorithm Steps (per iteration)
///
/// 1. **Split** edges longer than 4/3 × target
/// 2. **Collapse** edges shorter than 4/5 × target, unless that would create
///    an edge longer than 4/3 × target
/// 3. **Flip** edges when it brings valences closer to 6 (4 on the boundary)
/// 4. **Relax** vertices tangentially towards their neighbour centroid and
///    project them back onto the input surface
///
/// # Errors
///
/// [`MeshError::InvalidParameter`] for a non-positive target and
/// [`MeshError::NonManifoldInput`] when the input is not a valid triangle
/// mesh. The mesh is untouched in both cases.
pub fn isotropic_remeshing<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    options: &RemeshOptions,
) -> Result<()> {
    isotropic_remeshing_with_progress(mesh, options, &Progress::none())
}

/// Isotropic remeshing with progress reporting.
///
/// See [`isotropic_remeshing`] for algorithm details.
pub fn isotropic_remeshing_with_progress<I: MeshIndex>(
    mesh: &mut HalfEdgeMesh<I>,
    options: &RemeshOptions,
    progress: &Progress,
) -> Result<()> {
    if !(options.target_length.is_finite() && options.target_length > 0.0) {
        return Err(MeshError::invalid_param(
            "target_length",
            options.target_length,
            "must be positive",
        ));
    }
    if mesh.num_faces() == 0 {
        return Err(MeshError::EmptyMesh);
    }
    if !mesh.is_triangle_mesh() || !mesh.is_valid() {
        return Err(MeshError::non_manifold_input(
            "remeshing needs a valid triangle mesh",
        ));
    }

    let high = options.target_length * 4.0 / 3.0;
    let low = options.target_length * 4.0 / 5.0;
    let reference = MeshBvh::new(mesh);

    // 4 sub-steps per iteration
    let total_steps = options.iterations * 4;

    for iter in 0..options.iterations {
        let base_step = iter * 4;

        progress.report(base_step, total_steps, "Splitting edges");
        let splits = split_long_edges(mesh, high, options.protect_borders);

        progress.report(base_step + 1, total_steps, "Collapsing edges");
        let collapses = collapse_short_edges(mesh, low, Some(high), options.protect_borders)?;

        progress.report(base_step + 2, total_steps, "Flipping edges");
        let flips = flip_edges_for_valence(mesh, options.protect_borders);

        progress.report(base_step + 3, total_steps, "Relaxing vertices");
        for _ in 0..options.relaxation_steps {
            tangential_relaxation(mesh, &reference, options.parallel);
        }

        log::debug!(
            "remesh iteration {}: {} splits, {} collapses, {} flips",
            iter + 1,
            splits,
            collapses,
            flips
        );
    }

    mesh.collect_garbage();
    progress.report(total_steps, total_steps, "Isotropic remeshing complete");
    Ok(())
}

fn target_valence<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>) -> i64 {
    if mesh.is_boundary_vertex(v) {
        4
    } else {
        6
    }
}

/// Flip interior edges whose flip lowers the total valence deviation.
fn flip_edges_for_valence<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, protect_borders: bool) -> usize {
    let edges: Vec<EdgeId<I>> = mesh.edge_ids().collect();
    let mut flips = 0;

    for e in edges {
        let h = e.halfedge(0);
        if !mesh.is_live_edge(e) || mesh.is_boundary_edge(h) {
            continue;
        }
        let t = h.pair();
        let a = mesh.origin(h);
        let b = mesh.target(h);
        let c = mesh.target(mesh.next(h));
        let d = mesh.target(mesh.next(t));
        if protect_borders && [a, b, c, d].iter().any(|&v| mesh.is_boundary_vertex(v)) {
            continue;
        }

        let deviation = |v: VertexId<I>, delta: i64| {
            (mesh.valence(v) as i64 + delta - target_valence(mesh, v)).abs()
        };
        let before = deviation(a, 0) + deviation(b, 0) + deviation(c, 0) + deviation(d, 0);
        let after = deviation(a, -1) + deviation(b, -1) + deviation(c, 1) + deviation(d, 1);
        if after >= before || mesh.valence(a) <= 3 || mesh.valence(b) <= 3 {
            continue;
        }
        if !flip_keeps_orientation(mesh, a, b, c, d) {
            continue;
        }
        if mesh.flip_edge(e).is_ok() {
            flips += 1;
        }
    }

    flips
}

/// Whether triangles `(c, d, b)` and `(d, c, a)` face the same way as the
/// pair `(a, b, c)`, `(b, a, d)` they replace.
fn flip_keeps_orientation<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    a: VertexId<I>,
    b: VertexId<I>,
    c: VertexId<I>,
    d: VertexId<I>,
) -> bool {
    let [pa, pb, pc, pd] = [a, b, c, d].map(|v| *mesh.position(v));
    let normal = |p: &Point3<f64>, q: &Point3<f64>, r: &Point3<f64>| (q - p).cross(&(r - p));
    let reference = normal(&pa, &pb, &pc) + normal(&pb, &pa, &pd);
    let n1 = normal(&pc, &pd, &pb);
    let n2 = normal(&pd, &pc, &pa);
    n1.dot(&reference) > 0.0 && n2.dot(&reference) > 0.0
}

/// Move interior vertices towards their neighbour centroid within the
/// tangent plane, then project them onto the reference surface.
fn tangential_relaxation<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>, reference: &MeshBvh<I>, parallel: bool) {
    let snapshot: &HalfEdgeMesh<I> = mesh;
    let relax = |i: usize| -> Option<Point3<f64>> {
        let v = VertexId::new(i);
        if !snapshot.is_live_vertex(v) || snapshot.is_boundary_vertex(v) {
            return None;
        }
        let p = *snapshot.position(v);
        let mut sum = Vector3::zeros();
        let mut count = 0usize;
        for w in snapshot.vertex_neighbors(v) {
            sum += snapshot.position(w).coords;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        let n = snapshot.vertex_normal(v);
        let delta = sum / count as f64 - p.coords;
        let moved = p + (delta - n * n.dot(&delta));
        Some(reference.closest_point(&moved).map_or(moved, |hit| hit.point))
    };

    let n = snapshot.vertex_capacity();
    let updates: Vec<Option<Point3<f64>>> = if parallel {
        (0..n).into_par_iter().map(relax).collect()
    } else {
        (0..n).map(relax).collect()
    };

    for (i, update) in updates.into_iter().enumerate() {
        if let Some(p) = update {
            mesh.set_position(VertexId::new(i), p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::primitives::{make_cube, make_cylinder};
    use crate::algo::remesh::edge_length_stats;
    use crate::mesh::build_from_triangles;

    #[test]
    fn test_unit_cube_stays_closed() {
        let mut mesh: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 1).unwrap();
        let options = RemeshOptions::with_target_length(1.0).with_iterations(1);

        isotropic_remeshing(&mut mesh, &options).unwrap();

        assert!(mesh.is_valid());
        assert!(mesh.is_closed());
        assert_eq!(mesh.euler_characteristic(), 2);
        assert!(!mesh.has_garbage());
    }

    #[test]
    fn test_remesh_moves_lengths_towards_target() {
        let mut mesh: HalfEdgeMesh =
            make_cylinder(&Point3::origin(), &Point3::new(0.0, 0.0, 2.0), 1.0, 16, None).unwrap();
        let target = 0.3;
        let options = RemeshOptions::with_target_length(target).with_iterations(3);

        isotropic_remeshing(&mut mesh, &options).unwrap();

        assert!(mesh.is_valid());
        assert!(mesh.is_closed());
        assert_eq!(mesh.euler_characteristic(), 2);
        let stats = edge_length_stats(&mesh).unwrap();
        assert!((stats.mean - target).abs() < 0.5 * target, "mean {}", stats.mean);
    }

    #[test]
    fn test_protected_border_is_kept() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(3.0, 3.0, 0.0),
            Point3::new(0.0, 3.0, 0.0),
        ];
        let mut mesh: HalfEdgeMesh = build_from_triangles(&vertices, &[[0, 1, 2], [0, 2, 3]]).unwrap();
        let options = RemeshOptions::with_target_length(0.5).with_iterations(2).sequential();

        isotropic_remeshing(&mut mesh, &options).unwrap();

        assert!(mesh.is_valid());
        let loops = mesh.boundary_loops();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].len(), 4);
        for v in mesh.vertex_ids() {
            assert!(mesh.position(v).z.abs() < 1e-12);
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let base: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 2).unwrap();
        let mut a = base.clone();
        let mut b = base;
        let options = RemeshOptions::with_target_length(0.4).with_iterations(2);

        isotropic_remeshing(&mut a, &options).unwrap();
        isotropic_remeshing(&mut b, &options.clone().sequential()).unwrap();

        assert_eq!(a.num_vertices(), b.num_vertices());
        for v in a.vertex_ids() {
            assert_eq!(a.position(v), b.position(v));
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        let mut mesh: HalfEdgeMesh = make_cube(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 1).unwrap();
        let options = RemeshOptions::with_target_length(0.0);
        assert!(matches!(
            isotropic_remeshing(&mut mesh, &options),
            Err(MeshError::InvalidParameter { .. })
        ));
        assert_eq!(mesh.num_faces(), 12);

        let mut empty: HalfEdgeMesh = HalfEdgeMesh::new();
        assert!(matches!(
            isotropic_remeshing(&mut empty, &RemeshOptions::with_target_length(1.0)),
            Err(MeshError::EmptyMesh)
        ));
    }
}
