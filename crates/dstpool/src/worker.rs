//! Worker: the loop each pool thread runs.

use crate::job::ResultCleanup;
use crate::pool::{PoolShared, PoolState, QueueId};
use crate::result::{JobOutcome, JobResult};
use dstpool_core::serial::Serial;
use dstpool_core::{kdebug, kerror};
use std::sync::Arc;

fn insert_sorted(v: &mut Vec<usize>, x: usize) {
    if let Err(pos) = v.binary_search(&x) {
        v.insert(pos, x);
    }
}

/// Removes `x` if present; returns whether it was found.
fn remove_sorted(v: &mut Vec<usize>, x: usize) -> bool {
    match v.binary_search(&x) {
        Ok(pos) => {
            v.remove(pos);
            true
        }
        Err(_) => false,
    }
}

/// Rotates the ring until a runnable queue reaches the front, or gives up
/// after one full revolution.
fn find_runnable(state: &mut PoolState) -> Option<QueueId> {
    let len = state.ring.len();
    for _ in 0..len {
        let qid = *state.ring.front()?;
        if let Some(slot) = state.slab.get(qid) {
            if slot.is_runnable() {
                return Some(qid);
            }
        }
        state.ring.rotate_left(1);
    }
    None
}

/// Insert a completed job's outcome into its queue's output set, or run
/// its cleanup immediately for an `in_only` queue. Returns `true` if an
/// allocation failure occurred, in which case every queue on the pool has
/// already been marked error-shutdown and the caller must exit.
fn add_result(
    shared: &PoolShared,
    state: &mut PoolState,
    qid: QueueId,
    serial: Serial,
    outcome: JobOutcome,
    cleanup: Option<ResultCleanup>,
) -> bool {
    let Some(slot) = state.slab.get_mut(qid) else {
        return false;
    };
    if slot.n_processing > 0 {
        slot.n_processing -= 1;
    }
    let in_only = slot.in_only;

    if in_only {
        if let Some(cleanup) = cleanup {
            let data = match outcome {
                JobOutcome::Completed(d) | JobOutcome::Panicked(d) => d,
            };
            cleanup(data);
        }
    } else {
        let needs_shutdown = {
            let slot = state.slab.get_mut(qid).expect("queue present");
            slot.output.try_reserve(1).is_err()
        };
        if needs_shutdown {
            shared.error_shutdown_all(state);
            return true;
        }
        let slot = state.slab.get_mut(qid).expect("queue present");
        let next_serial = slot.next_serial;
        let result = JobResult::new(serial, outcome, cleanup);
        slot.output.push(result);
        if serial == next_serial {
            slot.cv.output_available.notify_all();
        }
    }

    if let Some(slot) = state.slab.get_mut(qid) {
        if slot.n_processing == 0 {
            slot.cv.none_processing.notify_all();
        }
    }
    shared.maybe_wake(state, qid);
    false
}

/// Entry point spawned once per pool worker thread.
pub(crate) fn run(shared: Arc<PoolShared>, index: usize) {
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            break;
        }

        let qid = match find_runnable(&mut state) {
            Some(qid) => qid,
            None => {
                insert_sorted(&mut state.free_workers, index);
                state.nwaiting += 1;
                let timeout = shared.config.idle_park_timeout;
                state = shared.worker_condvars[index]
                    .wait_timeout(state, timeout)
                    .unwrap_or_else(|e| e.into_inner())
                    .0;
                if remove_sorted(&mut state.free_workers, index) {
                    state.nwaiting -= 1;
                }
                continue;
            }
        };

        if let Some(slot) = state.slab.get_mut(qid) {
            slot.ref_count += 1;
        }

        loop {
            if state.shutdown {
                break;
            }
            let runnable = match state.slab.get(qid) {
                Some(slot) => slot.is_runnable(),
                None => false,
            };
            if !runnable {
                break;
            }

            let job = {
                let slot = state.slab.get_mut(qid).expect("runnable queue present");
                let job = slot.input.pop_front().expect("runnable queue has input");
                slot.n_processing += 1;
                job
            };
            state.njobs -= 1;

            let slot = state.slab.get_mut(qid).expect("queue present after claim");
            if slot.n_input() < slot.qsize {
                slot.cv.input_not_full.notify_all();
            }
            if slot.input.is_empty() {
                slot.cv.input_empty.notify_all();
            }

            drop(state);
            let (outcome, cleanup, serial) = job.run();
            state = shared.lock();

            let fatal = add_result(&shared, &mut state, qid, serial, outcome, cleanup);
            if fatal {
                if let Some(slot) = state.slab.get_mut(qid) {
                    if slot.ref_count > 0 {
                        slot.ref_count -= 1;
                    }
                }
                kerror!("worker {index}: exiting after hard failure");
                return;
            }
        }

        let should_remove = match state.slab.get_mut(qid) {
            Some(slot) => {
                if slot.ref_count > 0 {
                    slot.ref_count -= 1;
                }
                slot.ref_count == 0
            }
            None => false,
        };
        if should_remove {
            state.ring.retain(|&q| q != qid);
            if let Some(slot) = state.slab.remove(qid) {
                for job in slot.input {
                    job.discard();
                }
                for result in slot.output {
                    drop(result);
                }
            }
            kdebug!("queue {qid} fully released by worker {index}");
        } else if state.ring.front().copied() == Some(qid) {
            state.ring.rotate_left(1);
        }
    }
    kdebug!("worker {index}: exiting, pool shutdown");
}
