//! Result: a completed job's output, carried from worker to queue

use crate::job::ResultCleanup;
use dstpool_core::Serial;
use std::any::Any;
use std::fmt;

/// Whether a job's closure returned normally or panicked.
///
/// The C original this engine is modeled on has no concept of unwinding; a
/// worker thread that panicked would simply die. Rust lets us do better
/// without changing any ordering invariant: the panicking job still
/// produces exactly one `JobResult` at its serial, just tagged as such.
pub enum JobOutcome {
    /// The closure returned normally; holds the type-erased return value.
    Completed(Box<dyn Any + Send>),
    /// The closure panicked; holds the panic payload.
    Panicked(Box<dyn Any + Send>),
}

impl fmt::Debug for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Completed(_) => write!(f, "JobOutcome::Completed(..)"),
            JobOutcome::Panicked(_) => write!(f, "JobOutcome::Panicked(..)"),
        }
    }
}

/// A completed job's result.
///
/// Owned by the queue's output set until consumed via `next_result`/
/// `next_result_wait`, then owned by the caller.
pub struct JobResult {
    pub(crate) serial: Serial,
    outcome: Option<JobOutcome>,
    cleanup: Option<ResultCleanup>,
}

impl JobResult {
    pub(crate) fn new(serial: Serial, outcome: JobOutcome, cleanup: Option<ResultCleanup>) -> Self {
        Self {
            serial,
            outcome: Some(outcome),
            cleanup,
        }
    }

    /// The serial number this result completes.
    pub fn serial(&self) -> Serial {
        self.serial
    }

    /// True if the job panicked instead of returning normally.
    pub fn panicked(&self) -> bool {
        matches!(self.outcome, Some(JobOutcome::Panicked(_)))
    }

    /// Drop this result without running its cleanup callback, as if the
    /// caller had already taken ownership of the data some other way.
    pub(crate) fn forget_cleanup(mut self) {
        self.cleanup = None;
    }

    /// Recover the concrete result type `T`.
    ///
    /// Consumes `self` on success: the caller now owns the data and the
    /// result cleanup will not run for it. On type mismatch or if the job
    /// panicked, returns `self` back to the caller so they can inspect
    /// [`JobResult::panicked`] or try a different type.
    pub fn downcast<T: 'static>(mut self) -> Result<T, JobResult> {
        match self.outcome.take() {
            Some(JobOutcome::Completed(data)) => match data.downcast::<T>() {
                Ok(boxed) => Ok(*boxed),
                Err(data) => {
                    self.outcome = Some(JobOutcome::Completed(data));
                    Err(self)
                }
            },
            Some(other) => {
                self.outcome = Some(other);
                Err(self)
            }
            None => Err(self),
        }
    }
}

impl fmt::Debug for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobResult")
            .field("serial", &self.serial)
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl Drop for JobResult {
    /// If the data was never taken via [`JobResult::downcast`], run its
    /// cleanup now.
    fn drop(&mut self) {
        if let (Some(outcome), Some(cleanup)) = (self.outcome.take(), self.cleanup.take()) {
            let data = match outcome {
                JobOutcome::Completed(data) | JobOutcome::Panicked(data) => data,
            };
            cleanup(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_recovers_value() {
        let result = JobResult::new(
            Serial::new(3),
            JobOutcome::Completed(Box::new(42i32)),
            None,
        );
        assert_eq!(result.downcast::<i32>().unwrap(), 42);
    }

    #[test]
    fn downcast_type_mismatch_returns_self() {
        let result = JobResult::new(
            Serial::new(1),
            JobOutcome::Completed(Box::new(42i32)),
            None,
        );
        let back = result.downcast::<String>().unwrap_err();
        assert_eq!(back.serial(), Serial::new(1));
    }

    #[test]
    fn panicked_result_reports_itself() {
        let result = JobResult::new(
            Serial::new(0),
            JobOutcome::Panicked(Box::new("boom")),
            None,
        );
        assert!(result.panicked());
    }

    #[test]
    fn drop_without_downcast_runs_cleanup() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        let cleanup: ResultCleanup = Box::new(move |_data| {
            ran_clone.store(true, Ordering::SeqCst);
        });
        let result = JobResult::new(
            Serial::new(0),
            JobOutcome::Completed(Box::new(1i32)),
            Some(cleanup),
        );
        drop(result);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn drop_after_downcast_does_not_run_cleanup() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        let cleanup: ResultCleanup = Box::new(move |_data| {
            ran_clone.store(true, Ordering::SeqCst);
        });
        let result = JobResult::new(
            Serial::new(0),
            JobOutcome::Completed(Box::new(1i32)),
            Some(cleanup),
        );
        let value = result.downcast::<i32>().unwrap();
        assert_eq!(value, 1);
        assert!(!ran.load(Ordering::SeqCst));
    }
}
