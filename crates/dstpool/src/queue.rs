//! ProcessQueue: one producer/consumer ordered pipeline bound to a pool.

use crate::job::{InputCleanup, Job, JobFn, ResultCleanup};
use crate::pool::{Pool, PoolState, QueueId, QueueSlot};
use crate::result::JobResult;
use dstpool_core::serial::Serial;
use dstpool_core::{kdebug, DispatchError, DispatchResult};

/// Terminal states a queue can reach. Both reject new dispatches and
/// unblock every waiter; they differ only in diagnostic reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueShutdown {
    Running,
    /// `Queue::shutdown`/`Queue::destroy` was called explicitly.
    Graceful,
    /// A worker hit an unrecoverable allocation failure in `add_result`
    /// and marked every queue on the pool this way.
    Error,
}

/// Back-pressure mode for [`Queue::dispatch_ex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Block while the queue is saturated.
    Block,
    /// Return [`DispatchError::Saturated`] immediately instead of blocking.
    TryAgain,
    /// Ignore `qsize` entirely. Used internally by flush-time dispatch;
    /// exposed for callers that need the same escape hatch.
    IgnoreQsize,
}

/// Handle to one attached queue.
///
/// Cheap to clone (`queue_ref`) and cheap to drop (`queue_unref`); the
/// queue's actual state lives in a slab owned by the pool, indexed by
/// [`QueueId`], so this handle never needs to resolve a cycle with the
/// pool it belongs to.
pub struct Queue {
    pool: Pool,
    id: QueueId,
}

impl Queue {
    pub(crate) fn from_parts(pool: Pool, id: QueueId) -> Self {
        Self { pool, id }
    }

    fn slot<'a>(&self, state: &'a PoolState) -> DispatchResult<&'a QueueSlot> {
        state.slab.get(self.id).ok_or(DispatchError::Shutdown)
    }

    fn slot_mut<'a>(&self, state: &'a mut PoolState) -> DispatchResult<&'a mut QueueSlot> {
        state.slab.get_mut(self.id).ok_or(DispatchError::Shutdown)
    }

    /// `n_input + n_processing + n_output`.
    pub fn size(&self) -> usize {
        let state = self.pool.shared.lock();
        state
            .slab
            .get(self.id)
            .map(|s| s.n_input() + s.n_processing + s.n_output())
            .unwrap_or(0)
    }

    /// Configured capacity (may be transiently raised during a flush).
    pub fn qsize(&self) -> usize {
        let state = self.pool.shared.lock();
        state.slab.get(self.id).map(|s| s.qsize).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_shutdown(&self) -> bool {
        let state = self.pool.shared.lock();
        state
            .slab
            .get(self.id)
            .map(|s| s.shutdown != QueueShutdown::Running)
            .unwrap_or(true)
    }

    /// Simple blocking dispatch with no cleanups.
    pub fn dispatch(&self, func: JobFn) -> DispatchResult<()> {
        self.dispatch_ex(func, None, None, DispatchMode::Block)
    }

    /// Dispatch a job with optional cleanups and an explicit back-pressure
    /// mode.
    ///
    /// The job's serial is stamped unconditionally once past the
    /// [`DispatchMode::TryAgain`] gate, *before* any blocking wait — a
    /// producer released early by [`Queue::wake_dispatch`] still burns a
    /// serial even though its job is discarded, which is why serials can
    /// show gaps after a cancellation.
    pub fn dispatch_ex(
        &self,
        func: JobFn,
        input_cleanup: Option<InputCleanup>,
        result_cleanup: Option<ResultCleanup>,
        mode: DispatchMode,
    ) -> DispatchResult<()> {
        let mut state = self.pool.shared.lock();

        {
            let slot = self.slot(&state)?;
            if slot.shutdown != QueueShutdown::Running {
                return Err(DispatchError::Shutdown);
            }
            if matches!(mode, DispatchMode::TryAgain)
                && (slot.no_more_input || slot.n_input() >= slot.qsize)
            {
                return Err(DispatchError::Saturated);
            }
        }

        let stamped = {
            let slot = self.slot_mut(&mut state)?;
            let (next, stamped) = slot.curr_serial.next();
            slot.curr_serial = next;
            stamped
        };
        let job = Job::new(func, input_cleanup, result_cleanup, stamped);

        if matches!(mode, DispatchMode::Block) {
            loop {
                let slot = self.slot(&state)?;
                let must_wait = (slot.no_more_input || slot.n_input() >= slot.qsize)
                    && slot.shutdown == QueueShutdown::Running
                    && !slot.wake_dispatch;
                if !must_wait {
                    break;
                }
                let cv = slot.cv.clone();
                state = cv.input_not_full.wait(state).unwrap_or_else(|e| e.into_inner());
            }
        }

        let slot = self.slot_mut(&mut state)?;
        if slot.no_more_input || slot.shutdown != QueueShutdown::Running {
            job.discard();
            return Err(DispatchError::Shutdown);
        }
        if slot.wake_dispatch {
            slot.wake_dispatch = false;
            job.discard();
            return Err(DispatchError::Woken);
        }
        if slot.input.try_reserve(1).is_err() {
            job.discard();
            return Err(DispatchError::Allocation);
        }

        slot.input.push_back(job);
        state.njobs += 1;
        kdebug!("queue {}: dispatched serial {}", self.id, stamped);
        self.pool.shared.maybe_wake(&mut state, self.id);
        Ok(())
    }

    /// Force exactly one blocked producer to observe cancellation instead
    /// of capacity freeing up normally.
    pub fn wake_dispatch(&self) {
        let mut state = self.pool.shared.lock();
        if let Some(slot) = state.slab.get_mut(self.id) {
            slot.wake_dispatch = true;
            slot.cv.input_not_full.notify_all();
        }
    }

    /// Non-blocking: return the result for `next_serial` if it has already
    /// completed.
    pub fn next_result(&self) -> Option<JobResult> {
        let mut state = self.pool.shared.lock();
        self.next_result_locked(&mut state)
    }

    fn next_result_locked(&self, state: &mut PoolState) -> Option<JobResult> {
        let slot = state.slab.get_mut(self.id)?;
        if slot.shutdown != QueueShutdown::Running && slot.output.is_empty() {
            return None;
        }
        let idx = slot.output.iter().position(|r| r.serial() == slot.next_serial)?;
        let result = slot.output.remove(idx);
        let (next, _) = slot.next_serial.next();
        slot.next_serial = next;
        let occupancy = slot.n_input() + slot.n_processing + slot.n_output();
        if occupancy < slot.qsize {
            slot.cv.input_not_full.notify_all();
        }
        self.pool.shared.maybe_wake(state, self.id);
        Some(result)
    }

    /// Block until the result for `next_serial` is available, or the queue
    /// shuts down.
    pub fn next_result_wait(&self) -> Option<JobResult> {
        let mut state = self.pool.shared.lock();
        if let Some(slot) = state.slab.get_mut(self.id) {
            slot.ref_count += 1;
        }
        let result = loop {
            if let Some(r) = self.next_result_locked(&mut state) {
                break Some(r);
            }
            let slot = match state.slab.get(self.id) {
                Some(s) => s,
                None => break None,
            };
            if slot.shutdown != QueueShutdown::Running {
                break None;
            }
            let cv = slot.cv.clone();
            state = cv.output_available.wait(state).unwrap_or_else(|e| e.into_inner());
        };
        self.release_ref_and_maybe_destroy(&mut state);
        result
    }

    /// Wake every worker, temporarily raise `qsize` so no producer blocks
    /// the drain, then wait until no input is pending and no job is
    /// in-flight. Does not wake a waiting consumer.
    pub fn flush(&self) -> DispatchResult<()> {
        let mut state = self.pool.shared.lock();
        for cv in &self.pool.shared.worker_condvars {
            cv.notify_all();
        }
        {
            let slot = self.slot_mut(&mut state)?;
            let occupancy = slot.n_input() + slot.n_processing + slot.n_output();
            if slot.saved_qsize.is_none() {
                slot.saved_qsize = Some(slot.qsize);
            }
            slot.qsize = occupancy.max(slot.qsize);
        }
        loop {
            let slot = self.slot(&state)?;
            if slot.n_input() == 0 || slot.shutdown != QueueShutdown::Running {
                break;
            }
            let cv = slot.cv.clone();
            state = cv.input_empty.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        loop {
            let slot = self.slot(&state)?;
            if slot.n_processing == 0 || slot.shutdown != QueueShutdown::Running {
                break;
            }
            let cv = slot.cv.clone();
            state = cv.none_processing.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        if let Some(slot) = state.slab.get_mut(self.id) {
            if let Some(saved) = slot.saved_qsize.take() {
                slot.qsize = saved;
            }
        }
        Ok(())
    }

    /// Drain and discard pending input and output, wait out any in-flight
    /// job, then restart serial numbering at zero. A producer stamping a
    /// serial after this returns observes a fresh serial space.
    ///
    /// `free_results` controls whether already-completed results that get
    /// discarded run their result cleanup (`true`) or are dropped without
    /// running it (`false`) — the same choice `JobResult::downcast`
    /// vs. an ordinary drop makes for a result reaching the caller
    /// normally.
    pub fn reset(&self, free_results: bool) -> DispatchResult<()> {
        let (discarded_input, discarded_output) = {
            let mut state = self.pool.shared.lock();
            let slot = self.slot_mut(&mut state)?;
            slot.next_serial = Serial::RESET_SENTINEL;
            let discarded_input: Vec<_> = slot.input.drain(..).collect();
            let discarded_output: Vec<_> = slot.output.drain(..).collect();
            (discarded_input, discarded_output)
        };
        for job in discarded_input {
            job.discard();
        }
        for result in discarded_output {
            if free_results {
                drop(result);
            } else {
                result.forget_cleanup();
            }
        }

        self.flush()?;

        let newly_arrived = {
            let mut state = self.pool.shared.lock();
            let slot = self.slot_mut(&mut state)?;
            let newly_arrived: Vec<_> = slot.output.drain(..).collect();
            slot.curr_serial = Serial::ZERO;
            slot.next_serial = Serial::ZERO;
            slot.cv.input_not_full.notify_all();
            newly_arrived
        };
        for result in newly_arrived {
            if free_results {
                drop(result);
            } else {
                result.forget_cleanup();
            }
        }
        kdebug!("queue {} reset", self.id);
        Ok(())
    }

    /// Mark the queue shut down without detaching it: rejects new
    /// dispatches and unblocks every waiter, but does not drop buffered
    /// output already sitting in the queue.
    pub fn shutdown(&self) {
        let mut state = self.pool.shared.lock();
        if let Some(slot) = state.slab.get_mut(self.id) {
            if slot.shutdown == QueueShutdown::Running {
                slot.shutdown = QueueShutdown::Graceful;
            }
            slot.cv.input_not_full.notify_all();
            slot.cv.input_empty.notify_all();
            slot.cv.output_available.notify_all();
            slot.cv.none_processing.notify_all();
        }
        for cv in &self.pool.shared.worker_condvars {
            cv.notify_all();
        }
    }

    /// Retire the queue: reject further input, drain and discard
    /// outstanding work, detach from the pool's ring, and release this
    /// handle's reference. If other clones or an in-flight worker still
    /// hold a reference, the slab entry is released when the last one
    /// drops.
    pub fn destroy(self) {
        {
            let mut state = self.pool.shared.lock();
            if let Some(slot) = state.slab.get_mut(self.id) {
                slot.no_more_input = true;
            }
        }
        let _ = self.reset(false);
        let mut state = self.pool.shared.lock();
        if let Some(slot) = state.slab.get_mut(self.id) {
            if slot.shutdown == QueueShutdown::Running {
                slot.shutdown = QueueShutdown::Graceful;
            }
        }
        self.release_ref_and_maybe_destroy(&mut state);
        drop(state);
        std::mem::forget(self);
    }

    fn release_ref_and_maybe_destroy(&self, state: &mut PoolState) {
        let should_remove = match state.slab.get_mut(self.id) {
            Some(slot) => {
                if slot.ref_count > 0 {
                    slot.ref_count -= 1;
                }
                slot.ref_count == 0
            }
            None => false,
        };
        if should_remove {
            state.ring.retain(|&q| q != self.id);
            if let Some(slot) = state.slab.remove(self.id) {
                for job in slot.input {
                    job.discard();
                }
                for result in slot.output {
                    drop(result);
                }
            }
            kdebug!("queue {} fully released", self.id);
        }
    }
}

impl Clone for Queue {
    fn clone(&self) -> Self {
        let mut state = self.pool.shared.lock();
        if let Some(slot) = state.slab.get_mut(self.id) {
            slot.ref_count += 1;
        }
        drop(state);
        Queue {
            pool: self.pool.clone(),
            id: self.id,
        }
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        let mut state = self.pool.shared.lock();
        self.release_ref_and_maybe_destroy(&mut state);
    }
}
