//! Sparse symmetric systems for the implicit solvers.
//!
//! A compressed sparse row matrix assembled from triplets, and a Jacobi
//! preconditioned conjugate gradient solver for symmetric positive definite
//! systems. Curvature flow builds `M - dt * L` here once per step and solves
//! it three times, once per coordinate.

use nalgebra::DVector;

use crate::error::{MeshError, Result};

/// Compressed Sparse Row (CSR) matrix.
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    /// `row_ptr[i]..row_ptr[i + 1]` indexes the entries of row `i`.
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Assemble a matrix from `(row, col, value)` triplets.
    ///
    /// Duplicate entries at the same position are summed, which is what
    /// per-face stiffness assembly needs.
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<(usize, usize, f64)>) -> Self {
        triplets.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut counts = vec![0usize; rows + 1];
        let mut col_idx: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());
        let mut last: Option<(usize, usize)> = None;

        for (row, col, val) in triplets {
            debug_assert!(row < rows && col < cols);
            if last == Some((row, col)) {
                if let Some(acc) = values.last_mut() {
                    *acc += val;
                }
                continue;
            }
            col_idx.push(col);
            values.push(val);
            counts[row + 1] += 1;
            last = Some((row, col));
        }

        for r in 0..rows {
            counts[r + 1] += counts[r];
        }

        Self {
            rows,
            cols,
            row_ptr: counts,
            col_idx,
            values,
        }
    }

    /// Get the number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Get the number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Get the number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// The diagonal entries (zero where none is stored).
    pub fn diagonal(&self) -> DVector<f64> {
        let mut d = DVector::zeros(self.rows.min(self.cols));
        for i in 0..d.len() {
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                if self.col_idx[k] == i {
                    d[i] += self.values[k];
                }
            }
        }
        d
    }

    /// Multiply matrix by vector: `y = A * x`.
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        debug_assert_eq!(x.len(), self.cols);

        let mut y = DVector::zeros(self.rows);
        for i in 0..self.rows {
            let mut sum = 0.0;
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                sum += self.values[k] * x[self.col_idx[k]];
            }
            y[i] = sum;
        }
        y
    }
}

/// Solve `A * x = b` by Jacobi-preconditioned conjugate gradient.
///
/// `A` must be symmetric positive definite. Iteration stops once the residual
/// norm relative to `|b|` drops below `tolerance`; running out of iterations
/// is reported as [`MeshError::ConvergenceFailed`].
pub fn conjugate_gradient(
    a: &CsrMatrix,
    b: &DVector<f64>,
    x0: Option<&DVector<f64>>,
    max_iter: usize,
    tolerance: f64,
) -> Result<DVector<f64>> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n {
        return Err(MeshError::invalid_param(
            "matrix",
            format!("{}x{}", a.nrows(), a.ncols()),
            "must be square and match the right-hand side",
        ));
    }

    let mut x = match x0 {
        Some(x0) => x0.clone(),
        None => DVector::zeros(n),
    };

    let b_norm = b.norm();
    if b_norm < 1e-300 {
        return Ok(DVector::zeros(n));
    }

    let inv_diag = a
        .diagonal()
        .map(|d| if d.abs() > 1e-300 { 1.0 / d } else { 1.0 });

    let mut r = b - a.mul_vec(&x);
    if r.norm() / b_norm < tolerance {
        return Ok(x);
    }
    let mut z = r.component_mul(&inv_diag);
    let mut p = z.clone();
    let mut rz = r.dot(&z);

    for _ in 0..max_iter {
        let ap = a.mul_vec(&p);
        let p_ap = p.dot(&ap);
        if p_ap.abs() < 1e-300 {
            break;
        }
        let alpha = rz / p_ap;
        x += alpha * &p;
        r -= alpha * &ap;

        if r.norm() / b_norm < tolerance {
            return Ok(x);
        }

        z = r.component_mul(&inv_diag);
        let rz_new = r.dot(&z);
        let beta = rz_new / rz;
        p = &z + beta * &p;
        rz = rz_new;
    }

    Err(MeshError::ConvergenceFailed {
        iterations: max_iter,
    })
}
