//! Top-half interrupt recognition, the completion DPC, and `abort`
//! (spec.md §4.6).

use core::time::Duration;

use crate::engine::{DmaEngine, InterruptResult};
use crate::error::DmaError;
use crate::platform::{Platform, SchedJob};
use crate::regs::{ControlStatus, RegId, RegisterSpace};
use crate::state::EngineState;

impl<P: Platform> DmaEngine<P> {
    /// `interrupt(engine)` (spec.md §4.6): safe to call from hard-interrupt
    /// context — no blocking, no allocation, only the one lock acquisition
    /// the ISR shares with the DPC's own (spec.md §5).
    pub fn interrupt(&self) -> InterruptResult {
        let status = self.platform.read_control_status(self.index);
        if !(status.contains(ControlStatus::INTERRUPT_ENABLE)
            && status.contains(ControlStatus::INTERRUPT_ACTIVE))
        {
            return InterruptResult::NotOurs;
        }

        self.platform
            .write_control_status(self.index, ControlStatus::INTERRUPT_ACTIVE);

        {
            let mut inner = self.inner.lock();
            inner.dpc_control_status = Some(status);
            inner.stats.interrupt_count += 1;
        }

        self.platform.schedule(SchedJob::Completion);
        InterruptResult::Handled
    }

    /// `completion_dpc` (spec.md §4.6), scheduled from [`Self::interrupt`].
    pub(crate) fn completion_dpc(&self) {
        let transitioned = {
            let mut inner = self.inner.lock();
            if inner.engine_state != EngineState::Transfer {
                inner.stats.error_count += 1;
                false
            } else {
                inner.engine_state = EngineState::Done;
                true
            }
        };
        if !transitioned {
            log::error!(
                target: "dma::isr",
                "{}: completion dpc ran outside Transfer state",
                self.name
            );
            return;
        }

        self.platform.cancel_watchdog();

        let hardware_time =
            Duration::from_nanos(u64::from(self.platform.reg_read(RegId::HardwareTime, self.index)));
        let byte_count = self.platform.reg_read(RegId::ChainCompleteByteCount, self.index);
        let chain_complete = self
            .inner
            .lock()
            .dpc_control_status
            .unwrap_or(ControlStatus::empty())
            .contains(ControlStatus::CHAIN_COMPLETE);

        let result = if chain_complete {
            let now = self.platform.now();
            let mut inner = self.inner.lock();
            inner.stats.dpc_count += 1;
            let soft_transfer_time = now.saturating_sub(inner.soft_transfer_start);
            let soft_dma_time = now.saturating_sub(inner.soft_dma_start);
            let descriptor_count = inner.descriptor_count;
            inner.stats.record_completion(
                byte_count,
                descriptor_count,
                hardware_time,
                soft_transfer_time,
                soft_dma_time,
            );
            let direction = self.direction;
            let engine_number = self.engine_number;
            let interval = self.limits.statistic_interval;
            inner.stats.maybe_publish(now, interval, direction, engine_number);
            0
        } else {
            self.stop_hardware();
            let mut inner = self.inner.lock();
            inner.stats.error_count += 1;
            inner.stats.dpc_count += 1;
            DmaError::Io.as_errno()
        };

        {
            let mut inner = self.inner.lock();
            if let Some(task_index) = inner.current_task {
                inner.pool.task_mut(task_index).mark_done(result);
            }
        }
        self.cleanup();
        self.inner.lock().engine_state = EngineState::Idle;
        self.platform.schedule(SchedJob::Dispatch);
    }

    /// `abort(engine)` (spec.md §4.6). A no-op outside `Transfer`.
    pub fn abort(&self) {
        let transitioned = {
            let mut inner = self.inner.lock();
            if inner.engine_state == EngineState::Transfer {
                inner.engine_state = EngineState::Abort;
                true
            } else {
                false
            }
        };
        if !transitioned {
            return;
        }

        self.stop_hardware();

        {
            let mut inner = self.inner.lock();
            if let Some(task_index) = inner.current_task {
                inner
                    .pool
                    .task_mut(task_index)
                    .mark_done(DmaError::Canceled.as_errno());
            }
        }
        self.cleanup();
        self.inner.lock().engine_state = EngineState::Idle;
        self.platform.schedule(SchedJob::Dispatch);
    }
}
