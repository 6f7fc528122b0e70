//! Job: an immutable record dispatched onto a `ProcessQueue`

use crate::result::JobOutcome;
use dstpool_core::Serial;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// A job's executable payload.
///
/// The engine treats this closure as fully opaque: it captures its own
/// argument and returns a type-erased result. Callers recover the
/// concrete type with [`crate::JobResult::downcast`].
pub type JobFn = Box<dyn FnOnce() -> Box<dyn Any + Send> + Send>;

/// Cleanup run on a job's captured input when it is discarded *without*
/// executing (queue reset, shutdown, or `wake_dispatch` cancellation).
pub type InputCleanup = Box<dyn FnOnce() + Send>;

/// Cleanup run on a job's result when it is discarded instead of consumed
/// normally (queue reset with `free_results = true`, or error-shutdown).
pub type ResultCleanup = Box<dyn FnOnce(Box<dyn Any + Send>) + Send>;

/// An immutable job record.
///
/// Owned by the queue's input list while pending, owned by the worker
/// thread while executing, and dropped immediately after its result is
/// enqueued.
pub struct Job {
    pub(crate) func: JobFn,
    pub(crate) input_cleanup: Option<InputCleanup>,
    pub(crate) result_cleanup: Option<ResultCleanup>,
    pub(crate) serial: Serial,
}

impl Job {
    pub(crate) fn new(
        func: JobFn,
        input_cleanup: Option<InputCleanup>,
        result_cleanup: Option<ResultCleanup>,
        serial: Serial,
    ) -> Self {
        Self {
            func,
            input_cleanup,
            result_cleanup,
            serial,
        }
    }

    /// The serial number stamped on this job at dispatch time.
    pub fn serial(&self) -> Serial {
        self.serial
    }

    /// Discard this job without running it, invoking `input_cleanup` if
    /// one was supplied. Used by reset/shutdown/wake_dispatch paths.
    pub(crate) fn discard(self) {
        if let Some(cleanup) = self.input_cleanup {
            cleanup();
        }
    }

    /// Run the job's closure. Must be called outside the pool lock.
    ///
    /// The closure is captured by value and owns everything it touches, so
    /// it is unwind-safe by construction; a panic inside it is caught and
    /// reported as [`JobOutcome::Panicked`] instead of tearing down the
    /// worker thread.
    pub(crate) fn run(self) -> (JobOutcome, Option<ResultCleanup>, Serial) {
        let func = self.func;
        let outcome = match panic::catch_unwind(AssertUnwindSafe(move || func())) {
            Ok(data) => JobOutcome::Completed(data),
            Err(payload) => JobOutcome::Panicked(payload),
        };
        (outcome, self.result_cleanup, self.serial)
    }
}
