use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::BTreeMap};

///
/// EventState
/// Ephemeral, in-memory counters for the coordinating thread.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub stages: BTreeMap<String, StageCounters>,
    pub statuses: BTreeMap<String, u64>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    pub jobs: u64,
    pub hash_resizes: u64,
    pub hash_size_max: u64,
    pub failed_statuses: u64,
}

///
/// StageCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct StageCounters {
    pub calls: u64,
    pub rows_in: u64,
    pub rows_out: u64,

    // Wall-clock microseconds per stage call
    pub elapsed_micros_total: u128,
    pub elapsed_micros_max: u64,
}

///
/// EventReport
/// Point-in-time snapshot returned to callers.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    pub counters: EventState,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

pub(crate) fn report() -> EventReport {
    EventReport {
        counters: with_state(Clone::clone),
    }
}

/// Accumulate elapsed time and track a max.
pub(crate) fn add_elapsed(total: &mut u128, max: &mut u64, delta: u64) {
    *total = total.saturating_add(u128::from(delta));
    if delta > *max {
        *max = delta;
    }
}
