//! Spatial queries on a mesh.
//!
//! [`MeshBvh`] wraps a triangle [`Bvh`] built over the live faces of a mesh and
//! answers closest-point and point-containment queries. The free functions
//! build one on demand.

use std::cmp::Ordering;
use std::collections::HashMap;

use nalgebra::{Point3, Vector3};

use crate::error::{MeshError, Result};
use crate::geometry::{Bvh, Ray};
use crate::mesh::{FaceId, HalfEdgeMesh, MeshIndex, VertexId};

/// Default number of rays cast by [`MeshBvh::contains`].
pub const DEFAULT_CONTAINMENT_RAYS: usize = 5;

/// Fixed, deliberately skewed ray directions. None is parallel to an axis or a
/// coordinate plane, so axis-aligned meshes are never hit edge-on.
const RAY_DIRECTIONS: [[f64; 3]; 7] = [
    [0.3102, 0.7213, 0.6193],
    [-0.5714, 0.4127, 0.7093],
    [0.8311, -0.2893, 0.4750],
    [-0.2207, -0.8718, 0.4374],
    [0.6432, 0.5219, -0.5603],
    [-0.4471, -0.3386, -0.8279],
    [0.1213, -0.6157, -0.7787],
];

/// Barycentric slack under which a ray hit counts as grazing an edge.
const GRAZING_TOLERANCE: f64 = 1e-9;

/// The nearest point of a mesh surface to a query point.
#[derive(Debug, Clone, Copy)]
pub struct SurfacePoint<I: MeshIndex = u32> {
    /// Face containing the nearest point.
    pub face: FaceId<I>,
    /// Nearest point on the surface.
    pub point: Point3<f64>,
    /// Distance from the query point.
    pub distance: f64,
}

/// Triangle hierarchy over the live faces of a mesh.
///
/// The hierarchy is a snapshot: later edits to the mesh are not reflected.
#[derive(Debug, Clone)]
pub struct MeshBvh<I: MeshIndex = u32> {
    bvh: Bvh,
    faces: Vec<FaceId<I>>,
}

impl<I: MeshIndex> MeshBvh<I> {
    /// Build a hierarchy over every live face of `mesh`.
    pub fn new(mesh: &HalfEdgeMesh<I>) -> Self {
        let faces: Vec<FaceId<I>> = mesh.face_ids().collect();
        let triangles = faces.iter().map(|&f| mesh.face_positions(f)).collect();
        Self {
            bvh: Bvh::build(triangles),
            faces,
        }
    }

    /// The underlying triangle hierarchy; triangle `i` is [`MeshBvh::face`]`(i)`.
    pub fn bvh(&self) -> &Bvh {
        &self.bvh
    }

    /// Face that produced triangle `index`.
    pub fn face(&self, index: usize) -> FaceId<I> {
        self.faces[index]
    }

    /// Number of triangles.
    pub fn len(&self) -> usize {
        self.faces.len()
    }

    /// Whether the hierarchy holds no triangles.
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Nearest surface point, `None` when the mesh had no faces.
    pub fn closest_point(&self, p: &Point3<f64>) -> Option<SurfacePoint<I>> {
        self.bvh.closest_point(p).map(|hit| SurfacePoint {
            face: self.faces[hit.triangle],
            point: hit.point,
            distance: hit.distance_squared.sqrt(),
        })
    }

    /// Whether `p` lies inside the closed surface.
    ///
    /// Casts up to `rays` rays in fixed skewed directions and counts crossings;
    /// an odd count votes inside. Rays that graze an edge or start on the
    /// surface abstain. When every ray abstains the side of the nearest
    /// triangle decides.
    pub fn contains(&self, p: &Point3<f64>, rays: usize) -> bool {
        if self.is_empty() {
            return false;
        }
        let rays = rays.clamp(1, RAY_DIRECTIONS.len());
        let scale = self.bvh.bounding_box().diagonal().max(f64::MIN_POSITIVE);

        let mut inside_votes = 0usize;
        let mut outside_votes = 0usize;
        for dir in RAY_DIRECTIONS.iter().take(rays) {
            match self.crossing_parity(p, Vector3::new(dir[0], dir[1], dir[2]), scale) {
                Some(true) => inside_votes += 1,
                Some(false) => outside_votes += 1,
                None => {}
            }
        }

        match inside_votes.cmp(&outside_votes) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.nearest_side_is_inside(p),
        }
    }

    /// `Some(odd)` for a clean ray, `None` for an ambiguous one.
    fn crossing_parity(&self, p: &Point3<f64>, direction: Vector3<f64>, scale: f64) -> Option<bool> {
        let ray = Ray::new(*p, direction);
        let mut crossings = 0usize;
        for (_, hit) in self.bvh.ray_hits(&ray) {
            let w = 1.0 - hit.u - hit.v;
            if hit.t <= 1e-12 * scale
                || hit.u < GRAZING_TOLERANCE
                || hit.v < GRAZING_TOLERANCE
                || w < GRAZING_TOLERANCE
            {
                return None;
            }
            crossings += 1;
        }
        Some(crossings % 2 == 1)
    }

    fn nearest_side_is_inside(&self, p: &Point3<f64>) -> bool {
        let Some(hit) = self.bvh.closest_point(p) else {
            return false;
        };
        let [a, b, c] = self.bvh.triangle(hit.triangle);
        let normal = (b - a).cross(&(c - a));
        (p - hit.point).dot(&normal) < 0.0
    }
}

/// Minimum and maximum vertex coordinate along `axis` (0, 1 or 2).
///
/// # Example
///
/// ```
/// use surfmesh::algo::primitives::make_box;
/// use surfmesh::algo::query::span;
/// use surfmesh::mesh::HalfEdgeMesh;
/// use nalgebra::Point3;
///
/// let mesh: HalfEdgeMesh = make_box(&Point3::origin(), &Point3::new(2.0, 1.0, 3.0), [1, 1, 1]).unwrap();
/// assert_eq!(span(&mesh, 2).unwrap(), (0.0, 3.0));
/// ```
pub fn span<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, axis: usize) -> Result<(f64, f64)> {
    if axis > 2 {
        return Err(MeshError::invalid_param("axis", axis, "must be 0, 1 or 2"));
    }
    mesh.vertex_ids()
        .map(|v| mesh.position(v)[axis])
        .fold(None, |acc: Option<(f64, f64)>, x| match acc {
            None => Some((x, x)),
            Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
        })
        .ok_or(MeshError::EmptyMesh)
}

/// Whether `p` lies inside the closed mesh.
pub fn is_point_inside<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, p: &Point3<f64>) -> bool {
    MeshBvh::new(mesh).contains(p, DEFAULT_CONTAINMENT_RAYS)
}

/// The `k` vertices nearest to `p`, closest first.
pub fn closest_vertices<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    p: &Point3<f64>,
    k: usize,
) -> Vec<VertexId<I>> {
    let mut by_distance: Vec<(f64, VertexId<I>)> = mesh
        .vertex_ids()
        .map(|v| ((mesh.position(v) - p).norm_squared(), v))
        .collect();
    by_distance.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    by_distance.into_iter().take(k).map(|(_, v)| v).collect()
}

/// Uniform hash grid over a point set for fixed-radius neighbour queries.
#[derive(Debug, Clone)]
pub(crate) struct PointGrid {
    cell: f64,
    cells: HashMap<[i64; 3], Vec<usize>>,
    points: Vec<Point3<f64>>,
}

impl PointGrid {
    /// Bucket `points` into cubic cells of side `cell`.
    pub(crate) fn new(points: Vec<Point3<f64>>, cell: f64) -> Self {
        let cell = if cell.is_finite() && cell > 0.0 { cell } else { 1.0 };
        let mut cells: HashMap<[i64; 3], Vec<usize>> = HashMap::new();
        for (i, p) in points.iter().enumerate() {
            cells.entry(Self::key(p, cell)).or_default().push(i);
        }
        Self { cell, cells, points }
    }

    fn key(p: &Point3<f64>, cell: f64) -> [i64; 3] {
        [
            (p.x / cell).floor() as i64,
            (p.y / cell).floor() as i64,
            (p.z / cell).floor() as i64,
        ]
    }

    pub(crate) fn point(&self, i: usize) -> &Point3<f64> {
        &self.points[i]
    }

    pub(crate) fn len(&self) -> usize {
        self.points.len()
    }

    /// Add a point and return its index.
    pub(crate) fn insert(&mut self, p: Point3<f64>) -> usize {
        let i = self.points.len();
        self.cells.entry(Self::key(&p, self.cell)).or_default().push(i);
        self.points.push(p);
        i
    }

    /// Indices of the points within `radius` of `p` (inclusive).
    pub(crate) fn within(&self, p: &Point3<f64>, radius: f64) -> Vec<usize> {
        let reach = (radius / self.cell).ceil().max(0.0) as i64;
        let [cx, cy, cz] = Self::key(p, self.cell);
        let r2 = radius * radius;
        let mut found = Vec::new();
        for x in cx - reach..=cx + reach {
            for y in cy - reach..=cy + reach {
                for z in cz - reach..=cz + reach {
                    if let Some(bucket) = self.cells.get(&[x, y, z]) {
                        found.extend(
                            bucket
                                .iter()
                                .copied()
                                .filter(|&i| (self.points[i] - p).norm_squared() <= r2),
                        );
                    }
                }
            }
        }
        found.sort_unstable();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::primitives::{make_box, make_cube, make_icosahedron};
    use approx::assert_relative_eq;

    fn unit_cube() -> HalfEdgeMesh {
        make_cube(&Point3::new(-1.0, -1.0, -1.0), &Point3::new(1.0, 1.0, 1.0), 1).unwrap()
    }

    #[test]
    fn test_span() {
        let mesh: HalfEdgeMesh = make_box(&Point3::origin(), &Point3::new(2.0, 1.0, 3.0), [1, 1, 1]).unwrap();
        assert_eq!(span(&mesh, 0).unwrap(), (0.0, 2.0));
        assert_eq!(span(&mesh, 1).unwrap(), (0.0, 1.0));
        assert_eq!(span(&mesh, 2).unwrap(), (0.0, 3.0));
        assert!(matches!(span(&mesh, 3), Err(MeshError::InvalidParameter { .. })));
        assert!(matches!(span(&HalfEdgeMesh::<u32>::new(), 0), Err(MeshError::EmptyMesh)));
    }

    #[test]
    fn test_contains() {
        let mesh = unit_cube();
        let bvh = MeshBvh::new(&mesh);
        assert!(bvh.contains(&Point3::origin(), DEFAULT_CONTAINMENT_RAYS));
        assert!(bvh.contains(&Point3::new(0.9, -0.9, 0.5), DEFAULT_CONTAINMENT_RAYS));
        assert!(!bvh.contains(&Point3::new(1.5, 0.0, 0.0), DEFAULT_CONTAINMENT_RAYS));
        assert!(!bvh.contains(&Point3::new(-3.0, 2.0, 7.0), 1));
    }

    #[test]
    fn test_contains_on_sphere() {
        let mesh: HalfEdgeMesh = make_icosahedron(&Point3::new(1.0, 2.0, 3.0), 1.0).unwrap();
        assert!(is_point_inside(&mesh, &Point3::new(1.0, 2.0, 3.0)));
        assert!(is_point_inside(&mesh, &Point3::new(1.5, 2.0, 3.0)));
        assert!(!is_point_inside(&mesh, &Point3::new(1.0, 2.0, 4.5)));
    }

    #[test]
    fn test_closest_point() {
        let mesh = unit_cube();
        let bvh = MeshBvh::new(&mesh);
        let hit = bvh.closest_point(&Point3::new(0.2, 0.3, 3.0)).unwrap();
        assert_relative_eq!(hit.point, Point3::new(0.2, 0.3, 1.0), epsilon = 1e-12);
        assert_relative_eq!(hit.distance, 2.0, epsilon = 1e-12);
        assert!(mesh.is_live_face(hit.face));
        assert_relative_eq!(mesh.face_normal(hit.face).z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_point_grid_within() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.05, 0.0, 0.0),
            Point3::new(0.3, 0.0, 0.0),
            Point3::new(-0.09, 0.01, 0.0),
        ];
        let mut grid = PointGrid::new(points, 0.1);
        assert_eq!(grid.within(&Point3::origin(), 0.1), vec![0, 1, 3]);
        assert_eq!(grid.within(&Point3::new(0.3, 0.0, 0.0), 0.01), vec![2]);
        assert_eq!(grid.within(&Point3::origin(), 0.5).len(), 4);
        assert_eq!(*grid.point(2), Point3::new(0.3, 0.0, 0.0));

        assert_eq!(grid.insert(Point3::new(0.31, 0.0, 0.0)), 4);
        assert_eq!(grid.len(), 5);
        assert_eq!(grid.within(&Point3::new(0.3, 0.0, 0.0), 0.02), vec![2, 4]);
    }

    #[test]
    fn test_closest_vertices() {
        let mesh = unit_cube();
        let near = closest_vertices(&mesh, &Point3::new(-2.0, -2.0, -2.0), 2);
        assert_eq!(near.len(), 2);
        assert_eq!(*mesh.position(near[0]), Point3::new(-1.0, -1.0, -1.0));

        let all = closest_vertices(&mesh, &Point3::origin(), 100);
        assert_eq!(all.len(), 8);
    }
}
