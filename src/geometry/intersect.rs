//! Intersection and distance queries on triangles.

use nalgebra::{Point2, Point3, Vector3};

use super::predicates::{orient2d, orient3d, Orientation};

/// A half-line `origin + t * direction`, `t >= 0`.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Start of the ray.
    pub origin: Point3<f64>,
    /// Direction (need not be unit length).
    pub direction: Vector3<f64>,
}

impl Ray {
    /// Create a ray.
    pub fn new(origin: Point3<f64>, direction: Vector3<f64>) -> Self {
        Self { origin, direction }
    }

    /// Point at parameter `t`.
    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction * t
    }
}

/// A ray/triangle hit: ray parameter and barycentric `(u, v)` of the hit.
#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    /// Ray parameter.
    pub t: f64,
    /// Weight of the second corner.
    pub u: f64,
    /// Weight of the third corner.
    pub v: f64,
}

/// Result of a triangle/triangle test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriangleIntersection {
    /// Disjoint.
    None,
    /// The triangles touch in a single point.
    Point(Point3<f64>),
    /// The triangles cross along a segment.
    Segment(Point3<f64>, Point3<f64>),
    /// The triangles are coplanar and overlap.
    Coplanar,
}

/// Möller–Trumbore ray/triangle intersection (both sides count).
pub fn ray_triangle(ray: &Ray, tri: &[Point3<f64>; 3]) -> Option<RayHit> {
    const EPS: f64 = 1e-12;
    let e1 = tri[1] - tri[0];
    let e2 = tri[2] - tri[0];
    let pvec = ray.direction.cross(&e2);
    let det = e1.dot(&pvec);
    let scale = e1.norm() * e2.norm() * ray.direction.norm();
    if det.abs() <= EPS * scale {
        return None;
    }
    let inv_det = 1.0 / det;
    let tvec = ray.origin - tri[0];
    let u = tvec.dot(&pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let qvec = tvec.cross(&e1);
    let v = ray.direction.dot(&qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(&qvec) * inv_det;
    (t > 0.0).then_some(RayHit { t, u, v })
}

/// Point where the segment `p -> q` crosses the triangle, if any.
pub fn segment_triangle(
    p: &Point3<f64>,
    q: &Point3<f64>,
    tri: &[Point3<f64>; 3],
) -> Option<Point3<f64>> {
    let ray = Ray::new(*p, q - p);
    let hit = ray_triangle(&ray, tri)?;
    (hit.t <= 1.0).then(|| ray.at(hit.t))
}

/// Intersection of two triangles by the plane-interval method.
///
/// Plane sides are decided with [`orient3d`], so touching and crossing are
/// told apart exactly; the crossing points themselves are floating point.
pub fn triangle_triangle(a: &[Point3<f64>; 3], b: &[Point3<f64>; 3]) -> TriangleIntersection {
    let sa: [Orientation; 3] = [0, 1, 2].map(|i| orient3d(&b[0], &b[1], &b[2], &a[i]));
    if same_strict_side(&sa) {
        return TriangleIntersection::None;
    }
    let sb: [Orientation; 3] = [0, 1, 2].map(|i| orient3d(&a[0], &a[1], &a[2], &b[i]));
    if same_strict_side(&sb) {
        return TriangleIntersection::None;
    }

    if sa.iter().all(|s| *s == Orientation::Zero) {
        return if coplanar_triangles_overlap(a, b) {
            TriangleIntersection::Coplanar
        } else {
            TriangleIntersection::None
        };
    }

    let na = (a[1] - a[0]).cross(&(a[2] - a[0]));
    let nb = (b[1] - b[0]).cross(&(b[2] - b[0]));
    let dir = na.cross(&nb);
    if dir.norm_squared() == 0.0 {
        return TriangleIntersection::None;
    }

    let da = [0, 1, 2].map(|i| nb.dot(&(a[i] - b[0])));
    let db = [0, 1, 2].map(|i| na.dot(&(b[i] - a[0])));
    let Some((a_lo, a_hi)) = plane_crossing(a, &sa, &da, &dir) else {
        return TriangleIntersection::None;
    };
    let Some((b_lo, b_hi)) = plane_crossing(b, &sb, &db, &dir) else {
        return TriangleIntersection::None;
    };

    let lo = if a_lo.0 >= b_lo.0 { a_lo } else { b_lo };
    let hi = if a_hi.0 <= b_hi.0 { a_hi } else { b_hi };
    if lo.0 > hi.0 {
        return TriangleIntersection::None;
    }

    let scale = dir.norm() * (a[0].coords.norm() + b[0].coords.norm() + 1.0);
    if (hi.0 - lo.0) <= 1e-14 * scale {
        TriangleIntersection::Point(lo.1)
    } else {
        TriangleIntersection::Segment(lo.1, hi.1)
    }
}

fn same_strict_side(s: &[Orientation; 3]) -> bool {
    s.iter().all(|o| *o == Orientation::Positive) || s.iter().all(|o| *o == Orientation::Negative)
}

/// The part of a triangle lying on the other triangle's plane, as the
/// extreme points along `dir` with their parameters.
#[allow(clippy::type_complexity)]
fn plane_crossing(
    tri: &[Point3<f64>; 3],
    side: &[Orientation; 3],
    dist: &[f64; 3],
    dir: &Vector3<f64>,
) -> Option<((f64, Point3<f64>), (f64, Point3<f64>))> {
    let mut points: Vec<Point3<f64>> = Vec::with_capacity(3);
    for i in 0..3 {
        if side[i] == Orientation::Zero {
            points.push(tri[i]);
        }
        let j = (i + 1) % 3;
        if side[i].sign() * side[j].sign() < 0 {
            let t = (dist[i] / (dist[i] - dist[j])).clamp(0.0, 1.0);
            points.push(tri[i] + (tri[j] - tri[i]) * t);
        }
    }

    let mut lo: Option<(f64, Point3<f64>)> = None;
    let mut hi: Option<(f64, Point3<f64>)> = None;
    for p in points {
        let s = dir.dot(&p.coords);
        if lo.map_or(true, |(v, _)| s < v) {
            lo = Some((s, p));
        }
        if hi.map_or(true, |(v, _)| s > v) {
            hi = Some((s, p));
        }
    }
    Some((lo?, hi?))
}

/// Whether two coplanar triangles share interior area or boundary points.
pub fn coplanar_triangles_overlap(a: &[Point3<f64>; 3], b: &[Point3<f64>; 3]) -> bool {
    let n = (a[1] - a[0]).cross(&(a[2] - a[0]));
    let drop = dominant_axis(&n);
    let project = |p: &Point3<f64>| match drop {
        0 => Point2::new(p.y, p.z),
        1 => Point2::new(p.z, p.x),
        _ => Point2::new(p.x, p.y),
    };
    let pa = a.map(|p| project(&p));
    let pb = b.map(|p| project(&p));

    for i in 0..3 {
        for j in 0..3 {
            if segments_intersect_2d(&pa[i], &pa[(i + 1) % 3], &pb[j], &pb[(j + 1) % 3]) {
                return true;
            }
        }
    }
    point_in_triangle_2d(&pa[0], &pb) || point_in_triangle_2d(&pb[0], &pa)
}

fn dominant_axis(n: &Vector3<f64>) -> usize {
    let a = n.abs();
    if a.x >= a.y && a.x >= a.z {
        0
    } else if a.y >= a.z {
        1
    } else {
        2
    }
}

fn segments_intersect_2d(p: &Point2<f64>, q: &Point2<f64>, r: &Point2<f64>, s: &Point2<f64>) -> bool {
    let o1 = orient2d(p, q, r).sign();
    let o2 = orient2d(p, q, s).sign();
    let o3 = orient2d(r, s, p).sign();
    let o4 = orient2d(r, s, q).sign();
    if o1 * o2 < 0 && o3 * o4 < 0 {
        return true;
    }
    let on = |a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>| {
        c.x >= a.x.min(b.x) && c.x <= a.x.max(b.x) && c.y >= a.y.min(b.y) && c.y <= a.y.max(b.y)
    };
    (o1 == 0 && on(p, q, r))
        || (o2 == 0 && on(p, q, s))
        || (o3 == 0 && on(r, s, p))
        || (o4 == 0 && on(r, s, q))
}

fn point_in_triangle_2d(p: &Point2<f64>, tri: &[Point2<f64>; 3]) -> bool {
    let s0 = orient2d(&tri[0], &tri[1], p).sign();
    let s1 = orient2d(&tri[1], &tri[2], p).sign();
    let s2 = orient2d(&tri[2], &tri[0], p).sign();
    (s0 >= 0 && s1 >= 0 && s2 >= 0) || (s0 <= 0 && s1 <= 0 && s2 <= 0)
}

/// Closest point to `p` on triangle `(a, b, c)`.
pub fn closest_point_on_triangle(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Point3<f64> {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// Squared distance from `p` to triangle `(a, b, c)`.
pub fn point_triangle_distance_squared(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> f64 {
    (closest_point_on_triangle(p, a, b, c) - p).norm_squared()
}

/// Barycentric coordinates of `p` projected onto the plane of `(a, b, c)`.
///
/// Degenerate triangles give `(1, 0, 0)`.
pub fn barycentric(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Vector3<f64> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() <= f64::EPSILON * d00 * d11 {
        return Vector3::new(1.0, 0.0, 0.0);
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    Vector3::new(1.0 - v - w, v, w)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> [Point3<f64>; 3] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_ray_triangle() {
        let tri = unit_triangle();
        let ray = Ray::new(Point3::new(0.25, 0.25, 1.0), Vector3::new(0.0, 0.0, -1.0));
        let hit = ray_triangle(&ray, &tri).unwrap();
        assert!((hit.t - 1.0).abs() < 1e-12);
        assert!((hit.u - 0.25).abs() < 1e-12);

        let miss = Ray::new(Point3::new(2.0, 2.0, 1.0), Vector3::new(0.0, 0.0, -1.0));
        assert!(ray_triangle(&miss, &tri).is_none());
        let away = Ray::new(Point3::new(0.25, 0.25, 1.0), Vector3::new(0.0, 0.0, 1.0));
        assert!(ray_triangle(&away, &tri).is_none());
    }

    #[test]
    fn test_segment_triangle() {
        let tri = unit_triangle();
        let p = segment_triangle(&Point3::new(0.2, 0.2, -1.0), &Point3::new(0.2, 0.2, 1.0), &tri)
            .unwrap();
        assert!(p.z.abs() < 1e-12);
        assert!(
            segment_triangle(&Point3::new(0.2, 0.2, 0.5), &Point3::new(0.2, 0.2, 1.0), &tri)
                .is_none()
        );
    }

    #[test]
    fn test_crossing_triangles() {
        let a = unit_triangle();
        let b = [
            Point3::new(0.2, 0.2, -1.0),
            Point3::new(0.2, 0.2, 1.0),
            Point3::new(2.0, 0.2, 0.0),
        ];
        match triangle_triangle(&a, &b) {
            TriangleIntersection::Segment(p, q) => {
                assert!(p.z.abs() < 1e-12 && q.z.abs() < 1e-12);
                assert!((p.y - 0.2).abs() < 1e-12 && (q.y - 0.2).abs() < 1e-12);
                let xs = (p.x.min(q.x), p.x.max(q.x));
                assert!((xs.0 - 0.2).abs() < 1e-12);
                assert!((xs.1 - 0.8).abs() < 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_disjoint_and_coplanar() {
        let a = unit_triangle();
        let far = a.map(|p| p + Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(triangle_triangle(&a, &far), TriangleIntersection::None);

        let shifted = a.map(|p| p + Vector3::new(0.3, 0.3, 0.0));
        assert_eq!(triangle_triangle(&a, &shifted), TriangleIntersection::Coplanar);

        let apart = a.map(|p| p + Vector3::new(3.0, 0.0, 0.0));
        assert_eq!(triangle_triangle(&a, &apart), TriangleIntersection::None);
    }

    #[test]
    fn test_touching_at_vertex() {
        let a = unit_triangle();
        let b = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(-1.0, 0.0, 1.0),
            Point3::new(0.0, -1.0, 1.0),
        ];
        assert!(matches!(
            triangle_triangle(&a, &b),
            TriangleIntersection::Point(_)
        ));
    }

    #[test]
    fn test_closest_point() {
        let [a, b, c] = unit_triangle();
        let inside = closest_point_on_triangle(&Point3::new(0.2, 0.2, 3.0), &a, &b, &c);
        assert!((inside - Point3::new(0.2, 0.2, 0.0)).norm() < 1e-12);

        let corner = closest_point_on_triangle(&Point3::new(-1.0, -1.0, 0.0), &a, &b, &c);
        assert!((corner - a).norm() < 1e-12);

        let edge = closest_point_on_triangle(&Point3::new(1.0, 1.0, 0.0), &a, &b, &c);
        assert!((edge - Point3::new(0.5, 0.5, 0.0)).norm() < 1e-12);

        let d2 = point_triangle_distance_squared(&Point3::new(0.2, 0.2, 3.0), &a, &b, &c);
        assert!((d2 - 9.0).abs() < 1e-12);

        let bary = barycentric(&Point3::new(0.25, 0.5, 0.0), &a, &b, &c);
        assert!((bary - Vector3::new(0.25, 0.25, 0.5)).norm() < 1e-12);
    }
}
