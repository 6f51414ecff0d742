//! Per-channel scatter-gather DMA engine core for a Xilinx-style PCIe
//! video capture/playback card.
//!
//! One [`engine::DmaEngine`] drives one hardware channel through
//! `Idle -> Start -> Transfer -> {Done, Timeout, Abort} -> Idle`, taking
//! transfer submissions from any thread, building descriptor chains,
//! arming the device, and reporting completion through a callback. MMIO,
//! DMA-coherent allocation, scheduling, and timekeeping are all supplied
//! by the embedder through the [`platform::Platform`] trait — this crate
//! never maps a BAR or spawns a thread itself.
#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod builder;
mod config;
mod descriptor;
mod dispatcher;
mod engine;
mod error;
mod isr;
mod platform;
mod regs;
mod state;
mod stats;
mod task;
mod transfer;
mod watchdog;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use config::EngineLimits;
pub use descriptor::Descriptor;
pub use engine::{global_disable, global_enable, DmaEngine, DmaEngineBuilder, InterruptResult};
pub use error::{DmaError, DmaResult};
pub use platform::{CoherentDescriptors, Platform, SchedJob};
pub use regs::{ChannelIdentifier, ChannelTarget, RegId, RegisterSpace, CHN_SUBSYSTEM_ID};
pub use state::{EngineState, RunState};
pub use stats::Stats;
pub use transfer::{CardRegions, Direction, SgEntry, SgList, TransferRequest};
