//! The public façade: one [`DmaEngine`] per hardware channel, tying
//! together the descriptor ring, task pool, state machine, builder,
//! dispatcher, ISR/DPC, and watchdog (spec.md §2).

use alloc::string::String;
use core::time::Duration;

use hermit_sync::InterruptTicketMutex;
use log::{debug, error, warn};

use crate::config::EngineLimits;
use crate::descriptor::DescriptorRing;
use crate::error::{DmaError, DmaResult};
use crate::platform::{wait_until, Platform, SchedJob};
use crate::regs::{
    ChannelIdentifier, ChannelTarget, Capabilities, CommonControlStatus, RegId, CHN_SUBSYSTEM_ID,
};
use crate::regs::RegisterSpace;
use crate::stats::Stats;
use crate::state::{EngineState, RunState};
use crate::task::TaskPool;
use crate::transfer::{Direction, TransferRequest};

/// Top-half result (spec.md §6): whether this engine's interrupt fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptResult {
    Handled,
    NotOurs,
}

/// State protected by the per-engine lock (spec.md §5): a spin-style lock
/// acquired with interrupt-save semantics, realized here with
/// `hermit_sync::InterruptTicketMutex`, the same kind of lock used
/// elsewhere to protect state an ISR also touches.
pub(crate) struct EngineInner {
    pub(crate) engine_state: EngineState,
    pub(crate) dma_state: RunState,
    pub(crate) task_state: RunState,
    pub(crate) pool: TaskPool,
    pub(crate) current_task: Option<usize>,
    pub(crate) descriptor_count: u32,
    pub(crate) descriptor_bytes: u32,
    pub(crate) dpc_control_status: Option<crate::regs::ControlStatus>,
    pub(crate) soft_transfer_start: Duration,
    pub(crate) soft_dma_start: Duration,
    pub(crate) stats: Stats,
}

/// One DMA engine, bound to one hardware channel (spec.md §2).
///
/// Everything in this struct outside `inner` is set once by [`configure`]
/// and never changes afterward (spec.md §3, "Engine: immutable after
/// configure"), so reading it never needs the lock.
pub struct DmaEngine<P: Platform> {
    pub(crate) name: String,
    pub(crate) index: u32,
    pub(crate) direction: Direction,
    pub(crate) engine_number: u32,
    pub(crate) interrupt_mask: u32,
    pub(crate) card_address_bits: u32,
    pub(crate) limits: EngineLimits,
    pub(crate) ring: InterruptTicketMutex<DescriptorRing>,
    pub(crate) platform: P,
    pub(crate) inner: InterruptTicketMutex<EngineInner>,
}

/// Result of scanning the channel-identifier registers during `configure`.
struct ChannelMatch {
    direction: Direction,
    engine_number: u32,
    interrupt_mask: u32,
}

/// `open(parent, name, index)` (spec.md §4.1): allocates the engine state
/// but touches no hardware. Returned as a builder rather than a bare
/// `DmaEngine` so the immutable, post-configure fields never exist in an
/// uninitialized state — the typestate replacement for the original's
/// "null on failure" convention, since a configured-but-half-built engine
/// has no safe representation in Rust.
pub struct DmaEngineBuilder<P: Platform> {
    name: String,
    index: u32,
    limits: EngineLimits,
    platform: P,
}

impl<P: Platform> DmaEngineBuilder<P> {
    pub fn open(parent_name: &str, name: &str, index: u32, platform: P) -> Self {
        Self {
            name: alloc::format!("{parent_name}-{name}{index}"),
            index,
            limits: EngineLimits::default(),
            platform,
        }
    }

    pub fn with_limits(mut self, limits: EngineLimits) -> Self {
        self.limits = limits;
        self
    }

    /// `configure(engine, register_space)` (spec.md §4.1). Walks every
    /// channel-identifier register in `0..max_channels`, classifies each
    /// match, resets it, and — if one matches this engine's own index —
    /// records this engine's direction/ordinal/interrupt-mask bit.
    pub fn configure(self, max_channels: u32) -> DmaResult<DmaEngine<P>> {
        let mut s2c_channels: u32 = 0;
        let mut c2s_channels: u32 = 0;
        let mut own_match: Option<ChannelMatch> = None;

        for channel in 0..max_channels {
            let value = self.platform.reg_read(RegId::ChnIdentifier, channel);
            let ident = ChannelIdentifier(value);
            if ident.subsystem_id() != CHN_SUBSYSTEM_ID {
                continue;
            }

            let found = match ident.target() {
                ChannelTarget::HostToCard => {
                    let ordinal = s2c_channels;
                    let mask = 1u32 << ordinal;
                    s2c_channels += 1;
                    ChannelMatch {
                        direction: Direction::HostToCard,
                        engine_number: ordinal,
                        interrupt_mask: mask,
                    }
                }
                ChannelTarget::CardToHost => {
                    let ordinal = c2s_channels;
                    let mask = 1u32 << (s2c_channels + ordinal);
                    c2s_channels += 1;
                    ChannelMatch {
                        direction: Direction::CardToHost,
                        engine_number: ordinal,
                        interrupt_mask: mask,
                    }
                }
                ChannelTarget::Other => continue,
            };

            self.platform.reg_write(RegId::ChnControl, channel, 0);

            if channel == self.index {
                own_match = Some(found);
            }
        }

        // spec.md §9: the original checks a loop-local `mode` after the
        // scan, which only coincidentally reflects "did we match our own
        // index" — here that question is an explicit flag instead.
        let Some(own_match) = own_match else {
            error!(
                target: "dma::engine",
                "{}: dma engine index {} not present", self.name, self.index
            );
            return Err(DmaError::PermissionDenied);
        };

        let alignments = self.platform.reg_read(RegId::ChnAlignments, self.index);
        let card_address_bits = ChannelIdentifier(alignments).address_bits();

        let mem = self
            .platform
            .alloc_descriptors(self.limits.max_descriptors as usize)?;
        let ring = DescriptorRing::new(mem);

        debug!(
            target: "dma::engine",
            "{}: configured, card address bits {} max transfer size {}",
            self.name, card_address_bits, self.limits.max_transfer_size
        );

        Ok(DmaEngine {
            name: self.name,
            index: self.index,
            direction: own_match.direction,
            engine_number: own_match.engine_number,
            interrupt_mask: own_match.interrupt_mask,
            card_address_bits,
            limits: self.limits,
            ring: InterruptTicketMutex::new(ring),
            platform: self.platform,
            inner: InterruptTicketMutex::new(EngineInner {
                engine_state: EngineState::Idle,
                dma_state: RunState::Disabled,
                task_state: RunState::Disabled,
                pool: TaskPool::new(self.limits.max_tasks),
                current_task: None,
                descriptor_count: 0,
                descriptor_bytes: 0,
                dpc_control_status: None,
                soft_transfer_start: Duration::ZERO,
                soft_dma_start: Duration::ZERO,
                stats: Stats::default(),
            }),
        })
    }
}

impl<P: Platform> DmaEngine<P> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn engine_number(&self) -> u32 {
        self.engine_number
    }

    pub fn interrupt_mask(&self) -> u32 {
        self.interrupt_mask
    }

    pub fn card_address_bits(&self) -> u32 {
        self.card_address_bits
    }

    pub fn limits(&self) -> &EngineLimits {
        &self.limits
    }

    /// A snapshot of this engine's rolling and lifetime counters
    /// (spec.md §2 "Stats").
    pub fn stats(&self) -> Stats {
        self.inner.lock().stats
    }

    /// `enable(engine)` (spec.md §4.2).
    pub fn enable(&self) -> DmaResult<()> {
        {
            let mut inner = self.inner.lock();
            if inner.dma_state == RunState::Enabled {
                return Ok(());
            }
            debug!(target: "dma::engine", "{}: dma task enable", self.name);
            inner.pool.reset_all_to_done();
            inner.stats.reset(self.platform.now());
            inner.dma_state = RunState::Enabled;
        }

        self.platform.schedule(SchedJob::Dispatch);

        wait_until(&self.platform, self.limits.transfer_timeout, || {
            self.inner.lock().task_state == RunState::Enabled
        })
        .inspect_err(|_| {
            error!(
                target: "dma::engine",
                "{}: timeout waiting for engine task start", self.name
            );
        })
    }

    /// `disable(engine)` (spec.md §4.2).
    pub fn disable(&self) -> DmaResult<()> {
        {
            let mut inner = self.inner.lock();
            if inner.dma_state == RunState::Disabled {
                return Ok(());
            }
            debug!(target: "dma::engine", "{}: dma task disable", self.name);
            inner.dma_state = RunState::Disabled;
        }

        self.platform.schedule(SchedJob::Dispatch);

        wait_until(&self.platform, self.limits.transfer_timeout, || {
            self.inner.lock().task_state == RunState::Disabled
        })
        .inspect_err(|_| {
            error!(
                target: "dma::engine",
                "{}: timeout waiting for engine task stop", self.name
            );
        })?;

        self.abort();

        // `abort` reaches Idle synchronously, but the canceled task's
        // callback only fires once the dispatcher drains it from the head
        // of `ready` (spec.md §6, "invoked from dispatcher context").
        // Waiting on that too, not just `engine_state`, is what makes
        // "submit then disable" guarantee the callback already ran
        // (spec.md §8).
        wait_until(&self.platform, self.limits.transfer_timeout, || {
            let inner = self.inner.lock();
            inner.engine_state == EngineState::Idle
                && inner
                    .pool
                    .peek_ready()
                    .is_none_or(|index| !inner.pool.task(index).is_done())
        })
        .inspect_err(|_| {
            error!(
                target: "dma::engine",
                "{}: timeout waiting for dma engine idle", self.name
            );
        })
    }

    /// `submit(engine, transfer)` (spec.md §4.3). Never blocks and never
    /// touches hardware.
    pub fn submit(&self, request: TransferRequest) -> DmaResult<()> {
        if request.sg_pages == 0 || request.regions.size[0] == 0 {
            return Err(DmaError::InvalidArgument);
        }

        let acquired = {
            let mut inner = self.inner.lock();
            if inner.dma_state != RunState::Enabled {
                None
            } else {
                inner.pool.acquire_for_submit(request)
            }
        };

        let Some(task_index) = acquired else {
            warn!(target: "dma::engine", "{}: dma transfer could not be queued", self.name);
            return Err(DmaError::WouldBlock);
        };

        debug!(target: "dma::engine", "{}: dma task queue {}", self.name, task_index);
        self.platform.schedule(SchedJob::Dispatch);
        Ok(())
    }

    /// Entry point the embedder calls back into whenever a previously
    /// requested [`SchedJob`] actually runs (spec.md §9, "runtime-
    /// appropriate primitive").
    pub fn run(&self, job: SchedJob) {
        match job {
            SchedJob::Dispatch => self.dispatch_once(),
            SchedJob::Completion => self.completion_dpc(),
        }
    }

    /// `close(engine)` (spec.md §4.1): disable, stop the hardware, and
    /// free the descriptor ring's coherent memory.
    pub fn close(self) {
        let _ = self.disable();
        self.stop_hardware();
        let ring = self.ring.into_inner();
        self.platform.free_descriptors(ring.into_coherent());
    }
}

/// `global_enable(register_space)` (spec.md §4.8).
pub fn global_enable<R: RegisterSpace>(regs: &R) {
    regs.reg_write(
        RegId::CommonControlStatus,
        0,
        (CommonControlStatus::DMA_INTERRUPT_ENABLE | CommonControlStatus::USER_INTERRUPT_ENABLE)
            .bits(),
    );
}

/// `global_disable(register_space)` (spec.md §4.8).
pub fn global_disable<R: RegisterSpace>(regs: &R, num_engines: u32) {
    regs.reg_write(RegId::CommonControlStatus, 0, 0);

    for engine in 0..num_engines {
        let caps = Capabilities::from_bits_truncate(regs.reg_read(RegId::Capabilities, engine));
        if caps.contains(Capabilities::PRESENT) {
            regs.reg_write(RegId::EngineControlStatus, engine, 0);
        }
    }
}
