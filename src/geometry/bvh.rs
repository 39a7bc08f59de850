//! Bounding volume hierarchy over triangles.
//!
//! Built once by recursive median splits along the longest axis of the node
//! box. Used for overlap, ray and closest-point queries.

use nalgebra::Point3;

use super::aabb::Aabb;
use super::intersect::{closest_point_on_triangle, ray_triangle, Ray, RayHit};

const MAX_DEPTH: usize = 32;
const LEAF_SIZE: usize = 4;

/// BVH node
#[derive(Debug, Clone)]
pub struct BvhNode {
    /// Bounding box of this node
    pub bbox: Aabb,
    /// Left child (None for leaf)
    pub left: Option<Box<BvhNode>>,
    /// Right child (None for leaf)
    pub right: Option<Box<BvhNode>>,
    /// Triangle indices (only for leaf nodes)
    pub triangle_indices: Vec<usize>,
}

impl BvhNode {
    fn leaf(bbox: Aabb, triangle_indices: Vec<usize>) -> Self {
        Self {
            bbox,
            left: None,
            right: None,
            triangle_indices,
        }
    }

    /// Check if this is a leaf node
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Closest-point query result.
#[derive(Debug, Clone, Copy)]
pub struct ClosestPoint {
    /// Index of the nearest triangle.
    pub triangle: usize,
    /// Nearest point on that triangle.
    pub point: Point3<f64>,
    /// Squared distance to the query point.
    pub distance_squared: f64,
}

/// Bounding volume hierarchy for a triangle soup.
#[derive(Debug, Clone)]
pub struct Bvh {
    root: BvhNode,
    triangles: Vec<[Point3<f64>; 3]>,
}

impl Bvh {
    /// Build a BVH over the triangles; indices refer to positions in `triangles`.
    pub fn build(triangles: Vec<[Point3<f64>; 3]>) -> Self {
        let items: Vec<(usize, Aabb)> = triangles
            .iter()
            .enumerate()
            .map(|(i, t)| (i, Aabb::from_triangle(t)))
            .collect();
        let root = if items.is_empty() {
            BvhNode::leaf(Aabb::empty(), Vec::new())
        } else {
            Self::build_recursive(items, 0)
        };
        Self { root, triangles }
    }

    fn build_recursive(mut items: Vec<(usize, Aabb)>, depth: usize) -> BvhNode {
        let bbox = items
            .iter()
            .fold(Aabb::empty(), |acc, (_, b)| acc.union(b));

        if items.len() <= LEAF_SIZE || depth >= MAX_DEPTH {
            return BvhNode::leaf(bbox, items.iter().map(|(i, _)| *i).collect());
        }

        let centers = Aabb::from_points(items.iter().map(|(_, b)| b.center()));
        let axis = centers.longest_axis();
        items.sort_by(|(_, a), (_, b)| a.center()[axis].total_cmp(&b.center()[axis]));

        let right_items = items.split_off(items.len() / 2);
        let left = Box::new(Self::build_recursive(items, depth + 1));
        let right = Box::new(Self::build_recursive(right_items, depth + 1));

        BvhNode {
            bbox,
            left: Some(left),
            right: Some(right),
            triangle_indices: Vec::new(),
        }
    }

    /// Number of triangles.
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    /// Whether the hierarchy holds no triangle.
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// The indexed triangles.
    pub fn triangle(&self, index: usize) -> &[Point3<f64>; 3] {
        &self.triangles[index]
    }

    /// Box around everything.
    pub fn bounding_box(&self) -> Aabb {
        self.root.bbox
    }

    /// Root node.
    pub fn root(&self) -> &BvhNode {
        &self.root
    }

    /// Triangles whose boxes overlap `bbox`.
    pub fn query_box(&self, bbox: &Aabb) -> Vec<usize> {
        let mut result = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            if !node.bbox.overlaps(bbox) {
                continue;
            }
            if node.is_leaf() {
                result.extend(
                    node.triangle_indices
                        .iter()
                        .copied()
                        .filter(|&i| Aabb::from_triangle(&self.triangles[i]).overlaps(bbox)),
                );
            }
            stack.extend(node.left.as_deref());
            stack.extend(node.right.as_deref());
        }
        result
    }

    /// Every triangle hit by the ray, unsorted.
    pub fn ray_hits(&self, ray: &Ray) -> Vec<(usize, RayHit)> {
        let mut result = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            if node
                .bbox
                .ray_entry(&ray.origin, &ray.direction, f64::INFINITY)
                .is_none()
            {
                continue;
            }
            for &i in &node.triangle_indices {
                if let Some(hit) = ray_triangle(ray, &self.triangles[i]) {
                    result.push((i, hit));
                }
            }
            stack.extend(node.left.as_deref());
            stack.extend(node.right.as_deref());
        }
        result
    }

    /// Nearest point on any triangle, `None` for an empty hierarchy.
    pub fn closest_point(&self, p: &Point3<f64>) -> Option<ClosestPoint> {
        let mut best: Option<ClosestPoint> = None;
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            let bound = best.map_or(f64::INFINITY, |b| b.distance_squared);
            if node.bbox.is_empty() || node.bbox.distance_squared(p) > bound {
                continue;
            }
            for &i in &node.triangle_indices {
                let [a, b, c] = &self.triangles[i];
                let q = closest_point_on_triangle(p, a, b, c);
                let d2 = (q - p).norm_squared();
                if best.map_or(true, |b| d2 < b.distance_squared) {
                    best = Some(ClosestPoint {
                        triangle: i,
                        point: q,
                        distance_squared: d2,
                    });
                }
            }
            // Visit the nearer child first.
            if let (Some(l), Some(r)) = (node.left.as_deref(), node.right.as_deref()) {
                if l.bbox.distance_squared(p) < r.bbox.distance_squared(p) {
                    stack.push(r);
                    stack.push(l);
                } else {
                    stack.push(l);
                    stack.push(r);
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    /// A flat strip of 2n triangles along x.
    fn strip(n: usize) -> Vec<[Point3<f64>; 3]> {
        let mut tris = Vec::new();
        for i in 0..n {
            let x = i as f64;
            tris.push([
                Point3::new(x, 0.0, 0.0),
                Point3::new(x + 1.0, 0.0, 0.0),
                Point3::new(x, 1.0, 0.0),
            ]);
            tris.push([
                Point3::new(x + 1.0, 0.0, 0.0),
                Point3::new(x + 1.0, 1.0, 0.0),
                Point3::new(x, 1.0, 0.0),
            ]);
        }
        tris
    }

    #[test]
    fn test_bvh_build() {
        let bvh = Bvh::build(strip(10));
        assert_eq!(bvh.len(), 20);
        assert!(!bvh.root().is_leaf());
        assert_eq!(bvh.bounding_box().axis_span(0), (0.0, 10.0));
    }

    #[test]
    fn test_bvh_query() {
        let bvh = Bvh::build(strip(10));
        let query = Aabb::new(Point3::new(2.2, 0.2, -1.0), Point3::new(2.4, 0.4, 1.0));
        let mut hits = bvh.query_box(&query);
        hits.sort_unstable();
        assert_eq!(hits, vec![4, 5]);
    }

    #[test]
    fn test_bvh_ray_and_closest() {
        let bvh = Bvh::build(strip(10));
        let ray = Ray::new(Point3::new(5.2, 0.2, 1.0), Vector3::new(0.0, 0.0, -1.0));
        let hits = bvh.ray_hits(&ray);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 10);

        let closest = bvh.closest_point(&Point3::new(3.5, 0.5, 2.0)).unwrap();
        assert!((closest.distance_squared - 4.0).abs() < 1e-12);
        assert!((closest.point - Point3::new(3.5, 0.5, 0.0)).norm() < 1e-12);

        assert!(Bvh::build(Vec::new()).closest_point(&Point3::origin()).is_none());
    }
}
