//! Tunables from spec.md §6, gathered into one struct instead of bare
//! `#define`s so an integrator can override pool size or timeouts per board
//! revision without touching engine code.

use core::time::Duration;

/// 64 MiB, spec.md §6 `MAX_TRANSFER_SIZE`.
pub const MAX_TRANSFER_SIZE: u32 = 64 * 1024 * 1024;

/// One hardware descriptor covers at most this many bytes (≈ 15 × 4096),
/// spec.md §3.
pub const MAX_SEGMENT_SIZE: u32 = 15 * 4096;

/// `2048 * 1080 * 4 * 6`, the largest single video frame the card moves.
pub const MAX_FRAME_SIZE: u32 = 2048 * 1080 * 4 * 6;

/// Page size assumed for `MAX_PAGES`; matches the host's SG-list granularity.
pub const PAGE_SIZE: u32 = 4096;

/// `MAX_FRAME_SIZE / PAGE_SIZE`.
pub const MAX_PAGES: u32 = MAX_FRAME_SIZE / PAGE_SIZE;

/// `2 * MAX_PAGES`, the descriptor ring size (a split transfer can double
/// the descriptor count for the same page count).
pub const MAX_DESCRIPTORS: u32 = MAX_PAGES * 2;

/// Every state-change wait and every in-flight transfer is bounded by this.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_millis(100);

/// Rolling throughput counters are logged and reset on this cadence.
pub const STATISTIC_INTERVAL: Duration = Duration::from_secs(5);

/// Task pool size: an implementation choice constrained only by the
/// engine's invariants, typically 1-4; 4 gives a capture/playback pair
/// each independent in-flight headroom.
pub const DEFAULT_MAX_TASKS: usize = 4;

/// Per-engine limits, computed once at `open` and immutable afterward
/// (spec.md §3, "Engine... immutable after configure").
#[derive(Debug, Clone, Copy)]
pub struct EngineLimits {
    pub max_transfer_size: u32,
    pub max_segment_size: u32,
    pub max_descriptors: u32,
    pub transfer_timeout: Duration,
    pub statistic_interval: Duration,
    pub max_tasks: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_transfer_size: MAX_TRANSFER_SIZE,
            max_segment_size: MAX_SEGMENT_SIZE,
            max_descriptors: MAX_DESCRIPTORS,
            transfer_timeout: TRANSFER_TIMEOUT,
            statistic_interval: STATISTIC_INTERVAL,
            max_tasks: DEFAULT_MAX_TASKS,
        }
    }
}
