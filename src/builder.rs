//! `DmaBuilder::build_and_start` (spec.md §4.5): turns a queued
//! [`crate::task::Task`] into a running transfer — descriptor chain
//! generation plus the arming write. Only called by the dispatcher, on
//! the slot at the head of `ready`.

use crate::descriptor::{DescriptorRing, Le32, Le64, TERMINATOR_FLAGS};
use crate::engine::DmaEngine;
use crate::error::{DmaError, DmaResult};
use crate::platform::Platform;
use crate::regs::{ControlStatus, RegId, RegisterSpace};
use crate::state::EngineState;
use crate::transfer::SgEntry;

/// Writes descriptor `index`, patching the previous descriptor's
/// `next_address` to point at it. The descriptor written here always
/// carries `next_address = 0` and `control = 0` — whichever descriptor
/// turns out to be last keeps that `next_address`, and only needs its
/// control bits set during finalization.
fn emit_descriptor(
    ring: &mut DescriptorRing,
    index: usize,
    bus_address: u64,
    byte_count: u32,
    card_address: u64,
) {
    if index > 0 {
        let next_bus = ring.bus_address(index);
        ring.as_mut_slice()[index - 1].next_address = Le64::from_ne(next_bus);
    }
    let slot = &mut ring.as_mut_slice()[index];
    slot.control = Le32::from_ne(0);
    slot.byte_count = Le32::from_ne(byte_count);
    slot.system_address = Le64::from_ne(bus_address);
    slot.card_address = Le64::from_ne(card_address);
    slot.next_address = Le64::from_ne(0);
}

impl<P: Platform> DmaEngine<P> {
    /// spec.md §4.4 step 2d / §4.5. Builds the descriptor chain for the
    /// task at `task_index` and arms the hardware, or fails and restores
    /// `Idle` without touching the `ready`/`done` queues — the dispatcher
    /// decides what happens to the slot.
    pub(crate) fn build_and_start(&self, task_index: usize) -> DmaResult<()> {
        let total_size;
        let regions;
        {
            let inner = self.inner.lock();
            let task = inner.pool.task(task_index);
            if task.direction() != self.direction {
                return Err(DmaError::InvalidArgument);
            }
            regions = task.regions();
            total_size = regions.total_size();
        }

        {
            let mut inner = self.inner.lock();
            if inner.engine_state != EngineState::Idle {
                return Err(DmaError::Busy);
            }
            inner.engine_state = EngineState::Start;
            inner.current_task = Some(task_index);
            inner.soft_transfer_start = self.platform.now();
        }

        match self.try_build_chain(task_index, total_size, regions) {
            Ok((descriptor_count, descriptor_bytes)) => {
                self.arm(task_index, descriptor_count, descriptor_bytes);
                Ok(())
            }
            Err(err) => {
                let mut inner = self.inner.lock();
                inner.stats.error_count += 1;
                inner.current_task = None;
                inner.engine_state = EngineState::Idle;
                Err(err)
            }
        }
    }

    /// The precondition checks and descriptor-chain generation loop of
    /// spec.md §4.5, isolated so `build_and_start` can restore `Idle`
    /// uniformly on any failure path.
    fn try_build_chain(
        &self,
        task_index: usize,
        total_size: u64,
        regions: crate::transfer::CardRegions,
    ) -> DmaResult<(u32, u32)> {
        if total_size == 0 {
            return Err(DmaError::InvalidArgument);
        }

        let max_descriptors = self.limits.max_descriptors as usize;
        let sg_pages = self.inner.lock().pool.task(task_index).sg_pages();
        if sg_pages == 0 || sg_pages >= max_descriptors {
            return Err(DmaError::InvalidArgument);
        }

        if self.platform.read_control_status(self.index).contains(ControlStatus::CHAIN_RUNNING) {
            self.stop_hardware();
            if self.platform.read_control_status(self.index).contains(ControlStatus::CHAIN_RUNNING) {
                return Err(DmaError::WouldBlock);
            }
        }

        let mut data_size: u64 = 0;
        let mut card_address = regions.address[0];
        let mut desc_index: usize = 0;
        let mut pending: Option<SgEntry> = None;

        while data_size < total_size && desc_index < max_descriptors {
            let entry = match pending.take() {
                Some(entry) => entry,
                None => {
                    let mut inner = self.inner.lock();
                    match inner.pool.task_mut(task_index).sg_list_mut().next() {
                        Some(entry) => entry,
                        None => break,
                    }
                }
            };

            let remaining = (total_size - data_size) as u32;
            let byte_count = entry.length.min(remaining);

            let crosses_boundary =
                regions.is_split() && data_size < regions.size[0] && data_size + u64::from(byte_count) >= regions.size[0];

            if crosses_boundary {
                let first_part = (regions.size[0] - data_size) as u32;
                let mut ring = self.ring.lock();
                emit_descriptor(&mut ring, desc_index, entry.bus_address, first_part, card_address);
                drop(ring);
                desc_index += 1;
                data_size += u64::from(first_part);
                card_address = regions.address[1];

                let remainder_len = byte_count - first_part;
                if remainder_len > 0 {
                    pending = Some(SgEntry {
                        bus_address: entry.bus_address + u64::from(first_part),
                        length: remainder_len,
                    });
                }
                continue;
            }

            if byte_count > 0 {
                let mut ring = self.ring.lock();
                emit_descriptor(&mut ring, desc_index, entry.bus_address, byte_count, card_address);
                drop(ring);
                desc_index += 1;
                card_address += u64::from(byte_count);
                data_size += u64::from(byte_count);
            }
        }

        if data_size < total_size {
            return Err(DmaError::InvalidArgument);
        }

        let mut ring = self.ring.lock();
        ring.as_mut_slice()[desc_index - 1].set_control_flags(TERMINATOR_FLAGS);
        drop(ring);

        Ok((desc_index as u32, data_size as u32))
    }

    /// spec.md §4.5 "Arming": Start → Transfer, program the chain head,
    /// mark the task started, and kick off the watchdog.
    fn arm(&self, task_index: usize, descriptor_count: u32, descriptor_bytes: u32) {
        let chain_start = self.ring.lock().chain_start_address();
        let now = self.platform.now();

        {
            let mut inner = self.inner.lock();
            inner.engine_state = EngineState::Transfer;
            inner.descriptor_count = descriptor_count;
            inner.descriptor_bytes = descriptor_bytes;
            inner.pool.task_mut(task_index).mark_started();
            inner.soft_dma_start = now;
            inner.stats.transfer_start_count += 1;
        }

        self.platform.descriptor_write_barrier();

        self.platform
            .reg_write(RegId::ChainStartAddressLow, self.index, chain_start as u32);
        self.platform
            .reg_write(RegId::ChainStartAddressHigh, self.index, (chain_start >> 32) as u32);

        self.platform.write_control_status(
            self.index,
            ControlStatus::INTERRUPT_ENABLE
                | ControlStatus::INTERRUPT_ACTIVE
                | ControlStatus::CHAIN_START
                | ControlStatus::CHAIN_COMPLETE,
        );

        self.platform.arm_watchdog(self.limits.transfer_timeout);
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;
    use crate::config::EngineLimits;
    use crate::descriptor::DescriptorControl;
    use crate::engine::{DmaEngine, DmaEngineBuilder};
    use crate::mock::MockPlatform;
    use crate::regs::CHN_SUBSYSTEM_ID;
    use crate::transfer::{CardRegions, Direction, SgEntry, TransferRequest};

    fn open(direction: Direction) -> (DmaEngine<MockPlatform>, MockPlatform) {
        let platform = MockPlatform::new();
        let nibble: u32 = match direction {
            Direction::HostToCard => 0x0,
            Direction::CardToHost => 0x4,
        };
        let ident = (CHN_SUBSYSTEM_ID << 20) | (nibble << 16);
        platform.set_reg(RegId::ChnIdentifier, 0, ident);
        platform.set_reg(RegId::ChnAlignments, 0, 32);
        let engine = DmaEngineBuilder::open("card0", "dma", 0, platform.clone())
            .with_limits(EngineLimits::default())
            .configure(1)
            .expect("configure succeeds");
        (engine, platform)
    }

    fn queue(
        engine: &DmaEngine<MockPlatform>,
        direction: Direction,
        regions: CardRegions,
        entries: Vec<SgEntry>,
    ) -> usize {
        let sg_pages = entries.len();
        let request = TransferRequest {
            direction,
            sg_list: Box::new(entries.into_iter()),
            sg_pages,
            sg_offset: 0,
            regions,
            callback: Box::new(|_| {}),
        };
        engine.inner.lock().pool.acquire_for_submit(request).unwrap()
    }

    #[test]
    fn single_region_happy_path_emits_two_descriptors() {
        let (engine, _platform) = open(Direction::HostToCard);
        engine.inner.lock().pool.reset_all_to_done();
        let regions = CardRegions {
            address: [0x10000, 0],
            size: [8192, 0],
        };
        let entries = vec![
            SgEntry { bus_address: 0xA000, length: 4096 },
            SgEntry { bus_address: 0xB000, length: 4096 },
        ];
        let index = queue(&engine, Direction::HostToCard, regions, entries);
        engine.build_and_start(index).expect("build succeeds");

        let inner = engine.inner.lock();
        assert_eq!(inner.descriptor_count, 2);
        assert_eq!(inner.descriptor_bytes, 8192);
        drop(inner);

        let ring = engine.ring.lock();
        let next_of_first = ring.as_slice()[0].next_address.to_ne();
        assert_eq!(next_of_first, ring.bus_address(1));
        assert_eq!(ring.as_slice()[0].control_flags(), DescriptorControl::empty());
        assert_eq!(ring.as_slice()[1].next_address.to_ne(), 0);
        assert_eq!(ring.as_slice()[1].control_flags(), TERMINATOR_FLAGS);
    }

    #[test]
    fn split_transfer_breaks_one_entry_at_the_region_boundary() {
        let (engine, _platform) = open(Direction::HostToCard);
        engine.inner.lock().pool.reset_all_to_done();
        let regions = CardRegions {
            address: [0x10000, 0x20000],
            size: [6144, 2048],
        };
        let entries = vec![SgEntry { bus_address: 0xA000, length: 8192 }];
        let index = queue(&engine, Direction::HostToCard, regions, entries);
        engine.build_and_start(index).expect("build succeeds");

        let inner = engine.inner.lock();
        assert_eq!(inner.descriptor_count, 2);
        assert_eq!(inner.descriptor_bytes, 8192);
        drop(inner);

        let ring = engine.ring.lock();
        let slice = ring.as_slice();
        assert_eq!(slice[0].byte_count.to_ne(), 6144);
        assert_eq!(slice[0].card_address.to_ne(), 0x10000);
        assert_eq!(slice[0].system_address.to_ne(), 0xA000);
        assert_eq!(slice[1].byte_count.to_ne(), 2048);
        assert_eq!(slice[1].card_address.to_ne(), 0x20000);
        assert_eq!(slice[1].system_address.to_ne(), 0xA000 + 6144);
        assert_eq!(slice[1].control_flags(), TERMINATOR_FLAGS);
    }

    #[test]
    fn split_boundary_aligned_with_sg_entries_splits_nothing() {
        let (engine, _platform) = open(Direction::HostToCard);
        engine.inner.lock().pool.reset_all_to_done();
        let regions = CardRegions {
            address: [0x10000, 0x20000],
            size: [4096, 4096],
        };
        let entries = vec![
            SgEntry { bus_address: 0xA000, length: 4096 },
            SgEntry { bus_address: 0xB000, length: 4096 },
        ];
        let index = queue(&engine, Direction::HostToCard, regions, entries);
        engine.build_and_start(index).expect("build succeeds");

        let inner = engine.inner.lock();
        assert_eq!(inner.descriptor_count, 2);
        drop(inner);

        let ring = engine.ring.lock();
        let slice = ring.as_slice();
        assert_eq!(slice[0].card_address.to_ne(), 0x10000);
        assert_eq!(slice[1].card_address.to_ne(), 0x20000);
    }

    #[test]
    fn direction_mismatch_is_rejected_before_touching_engine_state() {
        let (engine, _platform) = open(Direction::HostToCard);
        engine.inner.lock().pool.reset_all_to_done();
        let regions = CardRegions {
            address: [0x10000, 0],
            size: [4096, 0],
        };
        let entries = vec![SgEntry { bus_address: 0xA000, length: 4096 }];
        let index = queue(&engine, Direction::CardToHost, regions, entries);

        let err = engine.build_and_start(index).unwrap_err();
        assert_eq!(err, DmaError::InvalidArgument);
        assert_eq!(engine.inner.lock().engine_state, crate::state::EngineState::Idle);
    }
}
