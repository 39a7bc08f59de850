//! Oriented planes.

use nalgebra::{Point3, Vector3};

use crate::error::{MeshError, Result};

/// Which side of a plane a point lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Along the normal.
    Front,
    /// Against the normal.
    Back,
    /// Within the tolerance of the plane.
    On,
}

/// A plane `normal . p = offset` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal.
    pub normal: Vector3<f64>,
    /// Signed distance of the plane from the origin along the normal.
    pub offset: f64,
}

impl Plane {
    /// Create a plane from a (not necessarily unit) normal and an offset.
    ///
    /// The offset is interpreted for the normalized normal.
    pub fn new(normal: Vector3<f64>, offset: f64) -> Result<Self> {
        let len = normal.norm();
        if !(len.is_finite() && len > 0.0) {
            return Err(MeshError::invalid_param(
                "normal",
                format!("{:?}", normal.as_slice()),
                "must be a finite non-zero vector",
            ));
        }
        Ok(Self {
            normal: normal / len,
            offset,
        })
    }

    /// Plane through `point` with the given normal.
    pub fn from_point_normal(point: &Point3<f64>, normal: Vector3<f64>) -> Result<Self> {
        let plane = Self::new(normal, 0.0)?;
        Ok(Self {
            offset: plane.normal.dot(&point.coords),
            ..plane
        })
    }

    /// Plane of a counter-clockwise triangle, `None` if it is degenerate.
    pub fn from_triangle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Option<Self> {
        Self::from_point_normal(a, (b - a).cross(&(c - a))).ok()
    }

    /// The plane `p[axis] = offset` whose normal points along `+axis` when
    /// `positive` is set and along `-axis` otherwise.
    pub fn axis_aligned(axis: usize, offset: f64, positive: bool) -> Result<Self> {
        if axis > 2 {
            return Err(MeshError::invalid_param("axis", axis, "must be 0, 1 or 2"));
        }
        let sign = if positive { 1.0 } else { -1.0 };
        let mut normal = Vector3::zeros();
        normal[axis] = sign;
        Ok(Self {
            normal,
            offset: sign * offset,
        })
    }

    /// Signed distance from the plane (positive in front).
    #[inline]
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) - self.offset
    }

    /// Classify a point with an absolute tolerance.
    pub fn classify(&self, p: &Point3<f64>, tolerance: f64) -> Side {
        let d = self.signed_distance(p);
        if d > tolerance {
            Side::Front
        } else if d < -tolerance {
            Side::Back
        } else {
            Side::On
        }
    }

    /// Orthogonal projection onto the plane.
    pub fn project(&self, p: &Point3<f64>) -> Point3<f64> {
        p - self.normal * self.signed_distance(p)
    }

    /// Crossing point of the segment `p -> q`, if its endpoints lie strictly
    /// on opposite sides.
    pub fn intersect_segment(&self, p: &Point3<f64>, q: &Point3<f64>) -> Option<Point3<f64>> {
        let dp = self.signed_distance(p);
        let dq = self.signed_distance(q);
        if dp * dq >= 0.0 {
            return None;
        }
        let t = dp / (dp - dq);
        Some(p + (q - p) * t)
    }

    /// The same plane facing the other way.
    pub fn flipped(&self) -> Self {
        Self {
            normal: -self.normal,
            offset: -self.offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_aligned() {
        let plane = Plane::axis_aligned(2, 0.5, true).unwrap();
        assert_eq!(plane.classify(&Point3::new(0.0, 0.0, 1.0), 1e-9), Side::Front);
        assert_eq!(plane.classify(&Point3::new(3.0, 1.0, 0.5), 1e-9), Side::On);

        let down = Plane::axis_aligned(2, 0.5, false).unwrap();
        assert_eq!(down.classify(&Point3::new(0.0, 0.0, 1.0), 1e-9), Side::Back);
        assert!((down.signed_distance(&Point3::new(0.0, 0.0, 0.0)) - 0.5).abs() < 1e-12);

        assert!(Plane::axis_aligned(3, 0.0, true).is_err());
    }

    #[test]
    fn test_segment_intersection() {
        let plane = Plane::from_point_normal(&Point3::origin(), Vector3::new(0.0, 0.0, 2.0)).unwrap();
        let hit = plane
            .intersect_segment(&Point3::new(1.0, 0.0, -1.0), &Point3::new(1.0, 0.0, 3.0))
            .unwrap();
        assert!((hit - Point3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
        assert!(plane
            .intersect_segment(&Point3::new(0.0, 0.0, 1.0), &Point3::new(0.0, 0.0, 2.0))
            .is_none());
        assert!(Plane::new(Vector3::zeros(), 1.0).is_err());
    }
}
