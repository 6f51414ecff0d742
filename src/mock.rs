//! In-memory [`RegisterSpace`]/[`Platform`] fakes, built for this crate's
//! own tests and exported behind `test-util` so dependent crates can reuse
//! them (spec.md §1 lists the register-accessor and enclosing device
//! object as external collaborators — this is a from-scratch, single-
//! process MMIO fake built for these tests).

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::Arc;
use alloc::vec;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

use hermit_sync::InterruptTicketMutex;

use crate::descriptor::Descriptor;
use crate::engine::DmaEngine;
use crate::error::{DmaError, DmaResult};
use crate::platform::{CoherentDescriptors, Platform, SchedJob};
use crate::regs::{RegId, RegisterSpace};

#[derive(Default)]
struct State {
    registers: BTreeMap<(RegId, u32), u32>,
    scheduled: VecDeque<SchedJob>,
    watchdog_armed: bool,
}

struct Inner {
    state: InterruptTicketMutex<State>,
    clock_ns: AtomicU64,
}

/// A single-process register space, descriptor allocator, and scheduler
/// that a test drives by hand instead of a real interrupt controller and
/// reactor. Cheap to clone: every clone shares the same underlying state,
/// so a test keeps one handle while handing another to [`DmaEngineBuilder`]
/// (`crate::engine::DmaEngineBuilder`).
#[derive(Clone)]
pub struct MockPlatform(Arc<Inner>);

impl MockPlatform {
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            state: InterruptTicketMutex::new(State::default()),
            clock_ns: AtomicU64::new(0),
        }))
    }

    pub fn set_reg(&self, reg: RegId, channel: u32, value: u32) {
        self.0.state.lock().registers.insert((reg, channel), value);
    }

    pub fn get_reg(&self, reg: RegId, channel: u32) -> u32 {
        self.0
            .state
            .lock()
            .registers
            .get(&(reg, channel))
            .copied()
            .unwrap_or(0)
    }

    /// Advances the mock's monotonic clock, letting a test simulate
    /// hardware latency or a watchdog expiry without a real sleep.
    pub fn advance(&self, by: Duration) {
        self.0
            .clock_ns
            .fetch_add(by.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn is_watchdog_armed(&self) -> bool {
        self.0.state.lock().watchdog_armed
    }

    /// Pops the next job a [`Platform::schedule`] call queued, in order.
    pub fn pop_scheduled(&self) -> Option<SchedJob> {
        self.0.state.lock().scheduled.pop_front()
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterSpace for MockPlatform {
    fn reg_read(&self, reg: RegId, channel: u32) -> u32 {
        self.get_reg(reg, channel)
    }

    fn reg_write(&self, reg: RegId, channel: u32, value: u32) {
        self.set_reg(reg, channel, value);
    }
}

impl Platform for MockPlatform {
    fn alloc_descriptors(&self, count: usize) -> DmaResult<CoherentDescriptors> {
        if count == 0 {
            return Err(DmaError::InvalidArgument);
        }
        let boxed: Box<[Descriptor]> = vec![Descriptor::default(); count].into_boxed_slice();
        let ptr = Box::into_raw(boxed) as *mut Descriptor;
        // SAFETY: `ptr` was just allocated by `Box` with `count` properly
        // aligned, initialized `Descriptor` slots, and nothing else aliases
        // it; `bus_address == ptr` since this mock has no separate device
        // address space.
        Ok(unsafe {
            CoherentDescriptors::new(NonNull::new(ptr).expect("box never null"), ptr as u64, count)
        })
    }

    fn free_descriptors(&self, mem: CoherentDescriptors) {
        // SAFETY: `mem` was produced by `alloc_descriptors` above, whose
        // pointer came from a `Box<[Descriptor]>` of the same length.
        let slice = core::ptr::slice_from_raw_parts_mut(mem.ptr.as_ptr(), mem.count);
        unsafe { drop(Box::from_raw(slice)) };
    }

    fn descriptor_write_barrier(&self) {}

    fn schedule(&self, job: SchedJob) {
        self.0.state.lock().scheduled.push_back(job);
    }

    fn arm_watchdog(&self, _timeout: Duration) {
        self.0.state.lock().watchdog_armed = true;
    }

    fn cancel_watchdog(&self) {
        self.0.state.lock().watchdog_armed = false;
    }

    fn now(&self) -> Duration {
        Duration::from_nanos(self.0.clock_ns.load(Ordering::Relaxed))
    }
}

/// Runs every job a [`DmaEngine`] has queued on `platform` until none are
/// left, standing in for the reactor loop a real embedder would drive
/// (spec.md §9, "Cooperative worker → runtime-appropriate primitive").
pub fn pump<P: Platform>(engine: &DmaEngine<P>, platform: &MockPlatform) {
    while let Some(job) = platform.pop_scheduled() {
        engine.run(job);
    }
}
