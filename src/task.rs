//! Fixed-size pool of transfer slots with two FIFO queues of indices
//! (spec.md §9, "Intrusive lists → explicit task pool"): this is the
//! array-indexed replacement for the original's `ready`/`done`
//! `list_head`s, giving O(1) enqueue/dequeue with no allocation on the
//! hot path.

use alloc::collections::VecDeque;

use crate::transfer::{CardRegions, Callback, Direction, SgList, TransferRequest};

/// What a slot holds while a transfer is in flight or awaiting its
/// callback (spec.md §3, "Task").
struct ActiveTransfer {
    direction: Direction,
    sg_list: SgList,
    sg_pages: usize,
    #[allow(dead_code)] // spec.md §9: stored but never consumed.
    sg_offset: u32,
    regions: CardRegions,
    callback: Option<Callback>,
    started: bool,
    done: bool,
    result: i32,
}

/// One pool slot. `index` is stable for the slot's lifetime and is the
/// value carried on the `ready`/`done` queues.
pub struct Task {
    pub index: usize,
    active: Option<ActiveTransfer>,
}

impl Task {
    fn active(&self) -> &ActiveTransfer {
        self.active
            .as_ref()
            .expect("task queried while not holding a transfer")
    }

    fn active_mut(&mut self) -> &mut ActiveTransfer {
        self.active
            .as_mut()
            .expect("task queried while not holding a transfer")
    }

    pub fn direction(&self) -> Direction {
        self.active().direction
    }

    pub fn sg_pages(&self) -> usize {
        self.active().sg_pages
    }

    pub fn regions(&self) -> CardRegions {
        self.active().regions
    }

    pub fn sg_list_mut(&mut self) -> &mut SgList {
        &mut self.active_mut().sg_list
    }

    pub fn started(&self) -> bool {
        self.active().started
    }

    pub fn is_done(&self) -> bool {
        self.active().done
    }

    pub fn result(&self) -> i32 {
        self.active().result
    }

    pub fn mark_started(&mut self) {
        self.active_mut().started = true;
    }

    /// Marks the task done with `result`, invariant 4's one true setter
    /// (spec.md §3, invariant 4: "A task's callback is invoked exactly
    /// once between submission and slot reuse.").
    pub fn mark_done(&mut self, result: i32) {
        let active = self.active_mut();
        active.done = true;
        active.result = result;
    }

    /// Takes the callback so it can be fired exactly once, outside the
    /// engine lock (spec.md §5: "Callback... invoked from dispatcher
    /// context").
    pub fn take_callback(&mut self) -> Option<Callback> {
        self.active_mut().callback.take()
    }

    fn occupy(&mut self, request: TransferRequest) {
        self.active = Some(ActiveTransfer {
            direction: request.direction,
            sg_list: request.sg_list,
            sg_pages: request.sg_pages,
            sg_offset: request.sg_offset,
            regions: request.regions,
            callback: Some(request.callback),
            started: false,
            done: false,
            result: 0,
        });
    }

    fn vacate(&mut self) {
        self.active = None;
    }
}

/// The pool itself: `MAX_TASKS` slots plus the `ready`/`done` index queues
/// (spec.md §3, "Pool size >= 1").
pub struct TaskPool {
    slots: alloc::vec::Vec<Task>,
    ready: VecDeque<usize>,
    done: VecDeque<usize>,
}

impl TaskPool {
    pub fn new(max_tasks: usize) -> Self {
        let slots = (0..max_tasks)
            .map(|index| Task {
                index,
                active: None,
            })
            .collect();
        Self {
            slots,
            ready: VecDeque::with_capacity(max_tasks),
            done: VecDeque::with_capacity(max_tasks),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// `enable` repopulates `done` with every slot (spec.md §4.2).
    pub fn reset_all_to_done(&mut self) {
        self.ready.clear();
        self.done.clear();
        for slot in &mut self.slots {
            slot.vacate();
        }
        self.done.extend(0..self.slots.len());
    }

    pub fn clear(&mut self) {
        self.ready.clear();
        self.done.clear();
        for slot in &mut self.slots {
            slot.vacate();
        }
    }

    /// `submit`: pop a free slot, install the request, push to `ready`
    /// tail (spec.md §4.3). Returns the task index on success.
    pub fn acquire_for_submit(&mut self, request: TransferRequest) -> Option<usize> {
        let index = self.done.pop_front()?;
        self.slots[index].occupy(request);
        self.ready.push_back(index);
        Some(index)
    }

    pub fn peek_ready(&self) -> Option<usize> {
        self.ready.front().copied()
    }

    /// Moves the head of `ready` to the tail of `done` (a task the
    /// dispatcher just fired the callback for, or that failed to build).
    pub fn retire_ready_head(&mut self) -> Option<usize> {
        let index = self.ready.pop_front()?;
        self.slots[index].vacate();
        self.done.push_back(index);
        Some(index)
    }

    pub fn task(&self, index: usize) -> &Task {
        &self.slots[index]
    }

    pub fn task_mut(&mut self, index: usize) -> &mut Task {
        &mut self.slots[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::CardRegions;

    fn request() -> TransferRequest {
        TransferRequest {
            direction: Direction::HostToCard,
            sg_list: Box::new(core::iter::empty()),
            sg_pages: 1,
            sg_offset: 0,
            regions: CardRegions {
                address: [0x1000, 0],
                size: [4096, 0],
            },
            callback: Box::new(|_| {}),
        }
    }

    #[test]
    fn fresh_pool_starts_in_done() {
        let mut pool = TaskPool::new(2);
        pool.reset_all_to_done();
        assert_eq!(pool.peek_ready(), None);
        assert!(pool.acquire_for_submit(request()).is_some());
    }

    #[test]
    fn acquire_then_retire_round_trips_the_slot() {
        let mut pool = TaskPool::new(1);
        pool.reset_all_to_done();

        let index = pool.acquire_for_submit(request()).expect("slot available");
        assert_eq!(pool.peek_ready(), Some(index));

        // Pool exhausted: a second submit before the first retires fails.
        assert!(pool.acquire_for_submit(request()).is_none());

        pool.task_mut(index).mark_done(0);
        assert!(pool.task(index).is_done());
        assert_eq!(pool.retire_ready_head(), Some(index));
        assert_eq!(pool.peek_ready(), None);

        // The slot is back in `done` and can be reused.
        assert!(pool.acquire_for_submit(request()).is_some());
    }

    #[test]
    fn mark_started_is_observable_before_completion() {
        let mut pool = TaskPool::new(1);
        pool.reset_all_to_done();
        let index = pool.acquire_for_submit(request()).unwrap();
        assert!(!pool.task(index).started());
        pool.task_mut(index).mark_started();
        assert!(pool.task(index).started());
        assert!(!pool.task(index).is_done());
    }
}
