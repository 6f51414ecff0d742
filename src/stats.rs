//! Rolling throughput counters, published on an interval (spec.md §2, §4.6).

use core::time::Duration;

use log::{debug, info};

use crate::transfer::Direction;

/// Lifetime and rolling-window counters for one engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub transfer_start_count: u64,
    pub transfer_complete_count: u64,
    pub interrupt_count: u64,
    pub dpc_count: u64,
    pub error_count: u64,

    // Rolling window, reset every `statistic_interval` (spec.md §4.6).
    window_transfer_count: u64,
    window_transfer_bytes: u64,
    window_hardware_time: Duration,
    window_descriptor_count: u64,
    window_soft_transfer_time: Duration,
    window_soft_dma_time: Duration,
    last_display: Duration,
}

impl Stats {
    pub fn reset(&mut self, now: Duration) {
        *self = Stats {
            last_display: now,
            ..Stats::default()
        };
    }

    /// Folds one successful transfer's numbers into the rolling window
    /// (spec.md §4.6).
    #[allow(clippy::too_many_arguments)]
    pub fn record_completion(
        &mut self,
        byte_count: u32,
        descriptor_count: u32,
        hardware_time: Duration,
        soft_transfer_time: Duration,
        soft_dma_time: Duration,
    ) {
        self.transfer_complete_count += 1;
        self.window_transfer_count += 1;
        self.window_transfer_bytes += u64::from(byte_count);
        self.window_hardware_time += hardware_time;
        self.window_descriptor_count += u64::from(descriptor_count);
        self.window_soft_transfer_time += soft_transfer_time;
        self.window_soft_dma_time += soft_dma_time;
    }

    /// Every `interval`, emit one stats line and reset the window
    /// (spec.md §4.6, "Every STATISTIC_INTERVAL (5 s) emit one stats line
    /// and reset the rolling counters.").
    pub fn maybe_publish(
        &mut self,
        now: Duration,
        interval: Duration,
        direction: Direction,
        engine_number: u32,
    ) {
        if now < self.last_display + interval {
            return;
        }

        let count = self.window_transfer_count.max(1);
        let kbytes = self.window_transfer_bytes / 1000;
        let hw_time_us = self.window_hardware_time.as_micros().max(1) as u64;
        let dir = match direction {
            Direction::HostToCard => "S2C",
            Direction::CardToHost => "C2S",
        };

        info!(
            target: "dma::stats",
            "dma dir {dir} eng {engine_number} cnt {count} size {} (kB) perf {} (MB/s)",
            kbytes / count,
            (kbytes * 1000) / hw_time_us,
        );
        debug!(
            target: "dma::stats",
            "dma dir {dir} eng {engine_number} desc {} strn {} sdma {} hdma {} (us)",
            self.window_descriptor_count / count,
            (self.window_soft_transfer_time.as_micros() as u64) / count,
            (self.window_soft_dma_time.as_micros() as u64) / count,
            hw_time_us / count,
        );

        self.window_transfer_count = 0;
        self.window_transfer_bytes = 0;
        self.window_hardware_time = Duration::ZERO;
        self.window_descriptor_count = 0;
        self.window_soft_transfer_time = Duration::ZERO;
        self.window_soft_dma_time = Duration::ZERO;
        self.last_display = now;
    }
}
