//! Progress reporting and cooperative cancellation for long-running operations.

use common::{CancelToken, SharedFn};

use crate::error::{Error, Result};

/// Progress information passed to the callback at each checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Steps completed so far.
    pub current: usize,
    /// Total number of steps in this stage.
    pub total: usize,
    /// Stage the counters refer to.
    pub stage: Stage,
}

impl Progress {
    /// Percentage complete in `[0, 100]`. An empty stage counts as done.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        100.0 * self.current.min(self.total) as f64 / self.total as f64
    }
}

/// Stage of a detection or registration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Laplacian-of-Gaussian filtering, one step per scale.
    ScaleSpace,
    /// Greedy non-maximum suppression.
    Suppression,
    /// Centroid extraction from a label volume, one step per z plane.
    Centroids,
    /// Shape-context descriptor construction, one step per variant.
    Descriptors,
    /// Cost matrix and assignment, one step per variant combination.
    Matching,
    /// RANSAC trials.
    Ransac,
    /// ICP iterations.
    Icp,
}

/// Callback type for progress reporting.
pub type ProgressCallback = SharedFn<dyn Fn(Progress) + Send + Sync>;

/// Report progress using the callback if set.
pub fn report_progress(callback: &ProgressCallback, current: usize, total: usize, stage: Stage) {
    if let Some(f) = callback.get() {
        f(Progress {
            current,
            total,
            stage,
        });
    }
}

/// Progress and cancellation handles threaded through a run.
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    pub progress: ProgressCallback,
    pub cancel: CancelToken,
}

impl Checkpoint {
    pub fn new(progress: ProgressCallback, cancel: CancelToken) -> Self {
        Self { progress, cancel }
    }

    /// Fails with [`Error::Cancelled`] once cancellation was requested,
    /// otherwise reports progress.
    pub fn step(&self, current: usize, total: usize, stage: Stage) -> Result<()> {
        if self.cancel.is_cancelled() {
            tracing::info!(?stage, current, total, "cancelled at checkpoint");
            return Err(Error::Cancelled);
        }
        report_progress(&self.progress, current, total, stage);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn percent_handles_empty_and_overflow() {
        let p = Progress {
            current: 1,
            total: 4,
            stage: Stage::Ransac,
        };
        assert_eq!(p.percent(), 25.0);

        let empty = Progress {
            current: 0,
            total: 0,
            stage: Stage::Icp,
        };
        assert_eq!(empty.percent(), 100.0);

        let over = Progress {
            current: 9,
            total: 4,
            stage: Stage::Icp,
        };
        assert_eq!(over.percent(), 100.0);
    }

    #[test]
    fn step_reports_until_cancelled() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback = ProgressCallback::new(Arc::new(move |p: Progress| {
            sink.lock().unwrap().push(p.current);
        }));
        let checkpoint = Checkpoint::new(callback, CancelToken::new());

        checkpoint.step(1, 3, Stage::ScaleSpace).unwrap();
        checkpoint.step(2, 3, Stage::ScaleSpace).unwrap();
        checkpoint.cancel.cancel();
        assert!(matches!(
            checkpoint.step(3, 3, Stage::ScaleSpace),
            Err(Error::Cancelled)
        ));

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn unset_callback_is_silent() {
        let checkpoint = Checkpoint::default();
        assert!(checkpoint.step(0, 10, Stage::Matching).is_ok());
    }
}
