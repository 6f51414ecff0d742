//! The watchdog and `stop_hardware` (spec.md §4.7).

use crate::engine::DmaEngine;
use crate::error::DmaError;
use crate::platform::{Platform, SchedJob};
use crate::regs::{ControlStatus, RegisterSpace};
use crate::state::EngineState;

impl<P: Platform> DmaEngine<P> {
    /// Called by the embedder when a previously-armed watchdog expires
    /// without a completion interrupt (spec.md §4.7). A no-op outside
    /// `Transfer` — the watchdog lost the race with a normal completion.
    pub fn watchdog_fires(&self) {
        let transitioned = {
            let mut inner = self.inner.lock();
            if inner.engine_state == EngineState::Transfer {
                inner.engine_state = EngineState::Timeout;
                true
            } else {
                false
            }
        };
        if !transitioned {
            return;
        }

        let status = self.platform.read_control_status(self.index);
        log::warn!(
            target: "dma::watchdog",
            "{}: transfer timed out, control/status {status:?}",
            self.name
        );

        self.stop_hardware();

        {
            let mut inner = self.inner.lock();
            if let Some(task_index) = inner.current_task {
                inner
                    .pool
                    .task_mut(task_index)
                    .mark_done(DmaError::Timeout.as_errno());
            }
        }
        self.cleanup();
        self.inner.lock().engine_state = EngineState::Idle;
        self.platform.schedule(SchedJob::Dispatch);
    }

    /// `stop_hardware` (spec.md §4.7): cancel the watchdog, then disable,
    /// reset-request, and re-disable the channel.
    pub(crate) fn stop_hardware(&self) {
        self.platform.cancel_watchdog();
        self.platform
            .write_control_status(self.index, ControlStatus::INTERRUPT_ACTIVE);
        self.platform
            .write_control_status(self.index, ControlStatus::STATUS_DMA_RESET_REQUEST);
        self.platform
            .write_control_status(self.index, ControlStatus::INTERRUPT_ACTIVE);
    }

    /// Clears per-transfer bookkeeping after any terminal transition
    /// (`Done`/`Timeout`/`Abort` → `Idle`), spec.md §4.6.
    pub(crate) fn cleanup(&self) {
        let mut inner = self.inner.lock();
        inner.current_task = None;
        inner.descriptor_count = 0;
        inner.descriptor_bytes = 0;
        inner.dpc_control_status = None;
    }
}
