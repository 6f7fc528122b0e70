//! Pool: owns the worker threads, the queue ring, and the single shared
//! mutex that protects all pool and queue state.

use crate::config::DispatchConfig;
use crate::queue::{Queue, QueueShutdown};
use crate::slab::Slab;
use crate::worker;
use dstpool_core::serial::Serial;
use dstpool_core::{kdebug, kerror, kinfo, DispatchError, DispatchResult};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

pub(crate) type QueueId = usize;

/// A completed-or-pending job's result, stored in a queue's output set.
pub(crate) use crate::result::JobResult;

/// The four per-queue condition variables, boxed behind an `Arc` so a
/// waiter can clone the handle out of a locked [`QueueSlot`] and then move
/// the pool's `MutexGuard` into `Condvar::wait` without the guard still
/// being borrowed by the slot it came from.
#[derive(Default)]
pub(crate) struct QueueCondvars {
    pub(crate) input_not_full: Condvar,
    pub(crate) input_empty: Condvar,
    pub(crate) output_available: Condvar,
    pub(crate) none_processing: Condvar,
}

/// Mutable state for one attached queue, living inside the pool's slab.
pub(crate) struct QueueSlot {
    pub(crate) input: VecDeque<crate::job::Job>,
    pub(crate) output: Vec<JobResult>,
    pub(crate) qsize: usize,
    pub(crate) saved_qsize: Option<usize>,
    pub(crate) n_processing: usize,
    pub(crate) curr_serial: Serial,
    pub(crate) next_serial: Serial,
    pub(crate) in_only: bool,
    pub(crate) shutdown: QueueShutdown,
    pub(crate) no_more_input: bool,
    pub(crate) wake_dispatch: bool,
    pub(crate) ref_count: usize,
    pub(crate) cv: Arc<QueueCondvars>,
}

impl QueueSlot {
    pub(crate) fn new(qsize: usize, in_only: bool) -> Self {
        Self {
            input: VecDeque::new(),
            output: Vec::new(),
            qsize,
            saved_qsize: None,
            n_processing: 0,
            curr_serial: Serial::ZERO,
            next_serial: Serial::ZERO,
            in_only,
            shutdown: QueueShutdown::Running,
            no_more_input: false,
            wake_dispatch: false,
            ref_count: 1,
            cv: Arc::new(QueueCondvars::default()),
        }
    }

    pub(crate) fn n_input(&self) -> usize {
        self.input.len()
    }

    pub(crate) fn n_output(&self) -> usize {
        self.output.len()
    }

    /// A queue is runnable iff it has input, the output+processing set
    /// leaves room under `qsize`, and it has not shut down.
    pub(crate) fn is_runnable(&self) -> bool {
        !self.input.is_empty()
            && self.qsize.saturating_sub(self.n_output()) > self.n_processing
            && self.shutdown == QueueShutdown::Running
    }
}

/// State guarded by the pool's single mutex.
pub(crate) struct PoolState {
    pub(crate) shutdown: bool,
    pub(crate) njobs: usize,
    pub(crate) nwaiting: usize,
    pub(crate) worker_count: usize,
    pub(crate) free_workers: Vec<usize>,
    pub(crate) ring: VecDeque<QueueId>,
    pub(crate) slab: Slab<QueueSlot>,
}

/// Shared, reference-counted pool internals. Cloning a [`Pool`] clones this
/// `Arc`; the workers hold their own clone so the pool can be dropped by
/// its creator without invalidating threads still running.
pub(crate) struct PoolShared {
    pub(crate) state: Mutex<PoolState>,
    pub(crate) worker_condvars: Vec<Condvar>,
    pub(crate) config: DispatchConfig,
}

impl PoolShared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wake the lowest-indexed sleeping worker, but only if there is
    /// strictly more work than already-awake workers and the named queue
    /// can actually accept another concurrent job.
    pub(crate) fn maybe_wake(&self, state: &mut PoolState, qid: QueueId) {
        let awake = state.worker_count - state.nwaiting;
        if state.njobs <= awake {
            return;
        }
        let Some(slot) = state.slab.get(qid) else {
            return;
        };
        if slot.n_processing >= slot.qsize.saturating_sub(slot.n_output()) {
            return;
        }
        if state.free_workers.is_empty() {
            return;
        }
        let widx = state.free_workers.remove(0);
        state.nwaiting -= 1;
        self.worker_condvars[widx].notify_one();
    }

    /// Mark every attached queue error-shutdown and wake everyone waiting
    /// on it. Used by the worker's hard-failure (allocation) path.
    pub(crate) fn error_shutdown_all(&self, state: &mut PoolState) {
        kerror!("pool: allocation failure, marking all queues error-shutdown");
        let ids: Vec<QueueId> = state.ring.iter().copied().collect();
        for qid in ids {
            if let Some(slot) = state.slab.get_mut(qid) {
                slot.shutdown = QueueShutdown::Error;
                slot.cv.input_not_full.notify_all();
                slot.cv.input_empty.notify_all();
                slot.cv.output_available.notify_all();
                slot.cv.none_processing.notify_all();
            }
        }
    }
}

/// Handle to a running dispatch engine. Cloning shares the same worker
/// pool. Tearing the pool down is an explicit act — call [`Pool::destroy`]
/// once every queue attached to it has been destroyed; there is no
/// implicit teardown on drop, matching the pool's explicit-lifecycle
/// contract.
pub struct Pool {
    pub(crate) shared: Arc<PoolShared>,
    joins: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Clone for Pool {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            joins: self.joins.clone(),
        }
    }
}

impl Pool {
    /// Start a pool with `thread_count` worker threads using default
    /// configuration. See [`Pool::with_config`] to override worker count,
    /// default queue depth, or logging.
    pub fn new(thread_count: usize) -> DispatchResult<Pool> {
        let config = DispatchConfig::default().num_workers(thread_count);
        Self::with_config(config)
    }

    /// Start a pool from an explicit [`DispatchConfig`].
    ///
    /// If a worker thread fails to spawn partway through start-up, already
    /// spawned workers are signalled to exit and joined before returning
    /// the error — no partially-started pool is ever handed back.
    pub fn with_config(config: DispatchConfig) -> DispatchResult<Pool> {
        let thread_count = config.num_workers.max(1);
        let state = PoolState {
            shutdown: false,
            njobs: 0,
            nwaiting: 0,
            worker_count: thread_count,
            free_workers: Vec::with_capacity(thread_count),
            ring: VecDeque::new(),
            slab: Slab::new(),
        };
        let worker_condvars = (0..thread_count).map(|_| Condvar::new()).collect();
        let shared = Arc::new(PoolShared {
            state: Mutex::new(state),
            worker_condvars,
            config,
        });

        let mut joins = Vec::with_capacity(thread_count);
        for idx in 0..thread_count {
            let shared_for_worker = shared.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("dstpool-worker-{idx}"))
                .spawn(move || worker::run(shared_for_worker, idx));
            match spawned {
                Ok(handle) => joins.push(handle),
                Err(_) => {
                    let mut guard = shared.lock();
                    guard.shutdown = true;
                    for cv in &shared.worker_condvars {
                        cv.notify_all();
                    }
                    drop(guard);
                    for handle in joins {
                        let _ = handle.join();
                    }
                    return Err(DispatchError::Allocation);
                }
            }
        }

        kinfo!("pool started with {} workers", thread_count);
        Ok(Pool {
            shared,
            joins: Arc::new(Mutex::new(joins)),
        })
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.shared.lock().worker_count
    }

    /// Create a new queue attached to this pool.
    ///
    /// `qsize` bounds `n_input + n_processing + n_output` under normal
    /// operation; `in_only` queues never retain results (`next_result`
    /// always returns `None`, and `result_cleanup` runs immediately after
    /// every job completes).
    pub fn new_queue(&self, qsize: usize, in_only: bool) -> DispatchResult<Queue> {
        let qsize = qsize.max(1);
        let mut state = self.shared.lock();
        let slot = QueueSlot::new(qsize, in_only);
        let id = state.slab.insert(slot);
        state.ring.push_back(id);
        drop(state);
        kdebug!("queue {id} attached (qsize={qsize}, in_only={in_only})");
        Ok(Queue::from_parts(self.clone(), id))
    }

    /// Create a new queue using the pool's configured `default_qsize`.
    pub fn new_queue_default(&self, in_only: bool) -> DispatchResult<Queue> {
        let qsize = self.shared.config.default_qsize;
        self.new_queue(qsize, in_only)
    }

    /// Shut the pool down: sets the pool-wide shutdown flag, wakes every
    /// worker condition, and joins all worker threads.
    ///
    /// Does **not** wait for attached queues to drain. Queues that outlive
    /// the pool are a caller bug — destroy queues before the pool.
    pub fn destroy(&self) {
        {
            let mut state = self.shared.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            for cv in &self.shared.worker_condvars {
                cv.notify_all();
            }
        }
        let mut joins = self.joins.lock().unwrap_or_else(|e| e.into_inner());
        for handle in joins.drain(..) {
            let _ = handle.join();
        }
        kinfo!("pool destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_reports_configured_size() {
        let pool = Pool::new(3).unwrap();
        assert_eq!(pool.size(), 3);
        pool.destroy();
    }

    #[test]
    fn destroy_is_idempotent() {
        let pool = Pool::new(1).unwrap();
        pool.destroy();
        pool.destroy();
    }

    #[test]
    fn new_queue_default_uses_configured_qsize() {
        let config = DispatchConfig::from_env().num_workers(1).default_qsize(5);
        let pool = Pool::with_config(config).unwrap();
        let queue = pool.new_queue_default(false).unwrap();
        assert_eq!(queue.qsize(), 5);
        pool.destroy();
    }
}
