//! The dispatcher (spec.md §4.4): drains `ready`, firing callbacks for
//! finished tasks and starting the next transfer. Re-entrant across
//! invocations but never within one — the embedder's [`crate::platform::
//! Platform::schedule`] implementation is responsible for that guarantee
//! (spec.md §5, "functionally equivalent to a tasklet").

use log::error;

use crate::engine::DmaEngine;
use crate::platform::Platform;
use crate::state::RunState;

impl<P: Platform> DmaEngine<P> {
    /// One dispatcher pass (spec.md §4.4).
    pub(crate) fn dispatch_once(&self) {
        {
            let mut inner = self.inner.lock();
            let dma_state = inner.dma_state;
            inner.task_state = dma_state;
            if dma_state != RunState::Enabled {
                return;
            }
        }

        let pool_len = self.inner.lock().pool.len();
        for _ in 0..pool_len.max(1) {
            let Some(task_index) = self.inner.lock().pool.peek_ready() else {
                return;
            };

            let (is_done, result) = {
                let inner = self.inner.lock();
                let task = inner.pool.task(task_index);
                (task.is_done(), task.result())
            };

            if is_done {
                let callback = self.inner.lock().pool.task_mut(task_index).take_callback();
                if let Some(callback) = callback {
                    callback(result);
                }
                self.inner.lock().pool.retire_ready_head();
                continue;
            }

            let started = self.inner.lock().pool.task(task_index).started();
            if started {
                return;
            }

            match self.build_and_start(task_index) {
                Ok(()) => return,
                Err(err) => {
                    let callback = self.inner.lock().pool.task_mut(task_index).take_callback();
                    if let Some(callback) = callback {
                        callback(err.as_errno());
                    }
                    self.inner.lock().pool.retire_ready_head();
                }
            }
        }

        error!(target: "dma::dispatch", "{}: dispatcher loop limit reached", self.name);
    }
}
