//! Progress reporting for long-running algorithms.
//!
//! Remeshing, curvature flow, hole filling and the Boolean engine accept a
//! [`Progress`] through their `*_with_progress` variants.
//!
//! # Example
//!
//! ```
//! use surfmesh::algo::progress::Progress;
//! use surfmesh::algo::smooth::{smooth_taubin_with_progress, SmoothOptions};
//! use surfmesh::algo::primitives::make_cube;
//! use nalgebra::Point3;
//!
//! let mut mesh = make_cube::<u32>(&Point3::origin(), &Point3::new(1.0, 1.0, 1.0), 2).unwrap();
//! let progress = Progress::new(|current, total, message| {
//!     println!("[{}/{}] {}", current, total, message);
//! });
//! smooth_taubin_with_progress(&mut mesh, 3, &SmoothOptions::default(), &progress);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A progress callback that receives `(current, total, message)` updates.
///
/// `current` runs from 0 to `total`; the message names the running stage.
pub struct Progress {
    callback: Box<dyn Fn(usize, usize, &str) + Send + Sync>,
}

impl Progress {
    /// Create a new progress reporter with the given callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Report progress.
    #[inline]
    pub fn report(&self, current: usize, total: usize, message: &str) {
        (self.callback)(current, total, message);
    }

    /// Report progress of a sub-stage.
    ///
    /// Maps `[0, sub_total]` onto the slot `[stage, stage + 1]` of a run with
    /// `stages` slots, in thousandths.
    #[inline]
    pub fn report_sub(
        &self,
        sub_current: usize,
        sub_total: usize,
        stage: usize,
        stages: usize,
        message: &str,
    ) {
        if sub_total == 0 || stages == 0 {
            return;
        }
        let sub_fraction = (sub_current.min(sub_total) * 1000) / sub_total;
        (self.callback)(stage * 1000 + sub_fraction, stages * 1000, message);
    }

    /// A reporter that discards all updates.
    pub fn none() -> Self {
        Self::new(|_, _, _| {})
    }

    /// A reporter that counts its calls, with a handle to read the count.
    ///
    /// Mostly useful in tests.
    pub fn counting() -> (Self, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let progress = Self::new(move |_, _, _| {
            inner.fetch_add(1, Ordering::Relaxed);
        });
        (progress, count)
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_report_sub_scales_into_slot() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = Progress::new(move |c, t, _| sink.lock().unwrap().push((c, t)));

        progress.report_sub(1, 2, 1, 4, "stage");
        progress.report_sub(5, 0, 1, 4, "ignored");

        assert_eq!(*seen.lock().unwrap(), vec![(1500, 4000)]);
    }

    #[test]
    fn test_counting() {
        let (progress, count) = Progress::counting();
        progress.report(0, 3, "a");
        progress.report(1, 3, "b");
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }
}
