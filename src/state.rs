//! The engine's phase state machine (spec.md §2, §3 invariant 1):
//! `Idle -> Start -> Transfer -> {Done, Timeout, Abort} -> Idle`.

/// Engine phase. `current_task` is set iff the engine is in one of
/// `{Start, Transfer, Done, Timeout, Abort}` (spec.md §3, invariant 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Start,
    Transfer,
    Done,
    Timeout,
    Abort,
}

impl EngineState {
    pub fn has_current_task(self) -> bool {
        !matches!(self, EngineState::Idle)
    }
}

/// `dma_state`/`task_state` (spec.md §3, invariant 5): whether the
/// dispatcher loop is permitted to start new transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Disabled,
    Enabled,
}
