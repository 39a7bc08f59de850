//! Robust orientation predicates.
//!
//! Each predicate first evaluates the determinant in plain floating point and
//! compares it against a static error bound. Only when the result is too
//! close to zero to trust is the determinant recomputed exactly with
//! floating-point expansions (two-sum / two-product error-free transforms).

use nalgebra::{Point2, Point3};

/// Sign of an orientation determinant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// Positive determinant.
    Positive,
    /// Negative determinant.
    Negative,
    /// Exactly zero (degenerate configuration).
    Zero,
}

impl Orientation {
    fn of(value: f64) -> Self {
        if value > 0.0 {
            Orientation::Positive
        } else if value < 0.0 {
            Orientation::Negative
        } else {
            Orientation::Zero
        }
    }

    /// `+1`, `-1` or `0`.
    pub fn sign(self) -> i32 {
        match self {
            Orientation::Positive => 1,
            Orientation::Negative => -1,
            Orientation::Zero => 0,
        }
    }

    /// The opposite orientation.
    pub fn reversed(self) -> Self {
        match self {
            Orientation::Positive => Orientation::Negative,
            Orientation::Negative => Orientation::Positive,
            Orientation::Zero => Orientation::Zero,
        }
    }
}

const EPSILON: f64 = f64::EPSILON * 0.5;
const SPLITTER: f64 = 134_217_729.0; // 2^27 + 1
const ORIENT2D_BOUND: f64 = (3.0 + 16.0 * EPSILON) * EPSILON;
const ORIENT3D_BOUND: f64 = (7.0 + 56.0 * EPSILON) * EPSILON;

/// Orientation of `d` relative to the plane through `a`, `b`, `c`.
///
/// Positive when `d` lies on the side the normal `(b - a) x (c - a)` points
/// to, i.e. when `(a, b, c, d)` is a positively oriented tetrahedron.
pub fn orient3d(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    d: &Point3<f64>,
) -> Orientation {
    let ab = b - a;
    let ac = c - a;
    let ad = d - a;

    let t0 = ac.y * ad.z;
    let t1 = ac.z * ad.y;
    let t2 = ac.z * ad.x;
    let t3 = ac.x * ad.z;
    let t4 = ac.x * ad.y;
    let t5 = ac.y * ad.x;

    let det = ab.x * (t0 - t1) + ab.y * (t2 - t3) + ab.z * (t4 - t5);
    let permanent = ab.x.abs() * (t0.abs() + t1.abs())
        + ab.y.abs() * (t2.abs() + t3.abs())
        + ab.z.abs() * (t4.abs() + t5.abs());

    if det.abs() > ORIENT3D_BOUND * permanent {
        return Orientation::of(det);
    }
    Orientation::of(orient3d_exact(a, b, c, d))
}

/// Orientation of `c` relative to the directed line `a -> b`.
///
/// Positive when `a, b, c` turn counter-clockwise.
pub fn orient2d(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> Orientation {
    let left = (b.x - a.x) * (c.y - a.y);
    let right = (b.y - a.y) * (c.x - a.x);
    let det = left - right;

    if det.abs() > ORIENT2D_BOUND * (left.abs() + right.abs()) {
        return Orientation::of(det);
    }

    let bx = two_diff(b.x, a.x);
    let by = two_diff(b.y, a.y);
    let cx = two_diff(c.x, a.x);
    let cy = two_diff(c.y, a.y);
    let det = expansion_diff(&expansion_product(&bx, &cy), &expansion_product(&by, &cx));
    Orientation::of(estimate(&det))
}

/// Floating-point orient3d value (six times the signed tetrahedron volume).
///
/// Not robust; used where a magnitude is needed rather than a sign.
#[inline]
pub fn orient3d_value(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    (b - a).dot(&(c - a).cross(&(d - a)))
}

fn orient3d_exact(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    let ab = [two_diff(b.x, a.x), two_diff(b.y, a.y), two_diff(b.z, a.z)];
    let ac = [two_diff(c.x, a.x), two_diff(c.y, a.y), two_diff(c.z, a.z)];
    let ad = [two_diff(d.x, a.x), two_diff(d.y, a.y), two_diff(d.z, a.z)];

    let minor = |i: usize, j: usize| {
        expansion_diff(
            &expansion_product(&ac[i], &ad[j]),
            &expansion_product(&ac[j], &ad[i]),
        )
    };

    let x = expansion_product(&ab[0], &minor(1, 2));
    let y = expansion_product(&ab[1], &minor(2, 0));
    let z = expansion_product(&ab[2], &minor(0, 1));

    estimate(&expansion_sum(&expansion_sum(&x, &y), &z))
}

// ==================== Expansion arithmetic ====================

/// `a + b = x + y` exactly, with `x = fl(a + b)`.
#[inline]
fn two_sum(a: f64, b: f64) -> (f64, f64) {
    let x = a + b;
    let bv = x - a;
    let av = x - bv;
    (x, (a - av) + (b - bv))
}

#[inline]
fn split(a: f64) -> (f64, f64) {
    let c = SPLITTER * a;
    let big = c - a;
    let hi = c - big;
    (hi, a - hi)
}

/// `a * b = x + y` exactly, with `x = fl(a * b)`.
#[inline]
fn two_product(a: f64, b: f64) -> (f64, f64) {
    let x = a * b;
    let (ahi, alo) = split(a);
    let (bhi, blo) = split(b);
    let err = x - ahi * bhi - alo * bhi - ahi * blo;
    (x, alo * blo - err)
}

/// `a - b` as a two-component expansion (smallest component first).
#[inline]
fn two_diff(a: f64, b: f64) -> Vec<f64> {
    let (x, y) = two_sum(a, -b);
    vec![y, x]
}

/// Add a scalar to an expansion, eliminating zero components.
fn grow_expansion(e: &[f64], b: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(e.len() + 1);
    let mut q = b;
    for &component in e {
        let (sum, err) = two_sum(q, component);
        q = sum;
        if err != 0.0 {
            out.push(err);
        }
    }
    if q != 0.0 || out.is_empty() {
        out.push(q);
    }
    out
}

fn expansion_sum(e: &[f64], f: &[f64]) -> Vec<f64> {
    let mut out = e.to_vec();
    for &component in f {
        out = grow_expansion(&out, component);
    }
    out
}

fn expansion_diff(e: &[f64], f: &[f64]) -> Vec<f64> {
    let negated: Vec<f64> = f.iter().map(|x| -x).collect();
    expansion_sum(e, &negated)
}

/// Multiply an expansion by a scalar, eliminating zero components.
fn scale_expansion(e: &[f64], b: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(2 * e.len());
    let Some((&first, rest)) = e.split_first() else {
        return vec![0.0];
    };
    let (mut q, err) = two_product(first, b);
    if err != 0.0 {
        out.push(err);
    }
    for &component in rest {
        let (p_hi, p_lo) = two_product(component, b);
        let (sum, err) = two_sum(q, p_lo);
        if err != 0.0 {
            out.push(err);
        }
        let (sum2, err2) = two_sum(p_hi, sum);
        if err2 != 0.0 {
            out.push(err2);
        }
        q = sum2;
    }
    if q != 0.0 || out.is_empty() {
        out.push(q);
    }
    out
}

fn expansion_product(e: &[f64], f: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0];
    for &component in f {
        out = expansion_sum(&out, &scale_expansion(e, component));
    }
    out
}

/// The largest component carries the sign of a non-overlapping expansion.
fn estimate(e: &[f64]) -> f64 {
    e.iter().rev().copied().find(|x| *x != 0.0).unwrap_or(0.0)
}
