use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

///
/// BarrierBroken
///
/// A teammate left the team without reaching the barrier.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BarrierBroken;

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    broken: bool,
}

///
/// TeamBarrier
///
/// Reusable generation-counted barrier that can be broken. Once broken,
/// every current and future waiter returns `BarrierBroken` instead of
/// blocking on a member that will never arrive.
///

#[derive(Debug)]
pub struct TeamBarrier {
    members: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl TeamBarrier {
    #[must_use]
    pub fn new(members: usize) -> Self {
        Self {
            members: members.max(1),
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until every member arrives or the barrier breaks.
    pub fn wait(&self) -> Result<(), BarrierBroken> {
        let mut state = self.lock();
        if state.broken {
            return Err(BarrierBroken);
        }

        state.arrived += 1;
        if state.arrived == self.members {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.released.notify_all();
            return Ok(());
        }

        let generation = state.generation;
        loop {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            // a completed generation wins over a later break
            if state.generation != generation {
                return Ok(());
            }
            if state.broken {
                return Err(BarrierBroken);
            }
        }
    }

    /// Release every waiter with `BarrierBroken`.
    pub fn break_all(&self) {
        let mut state = self.lock();
        state.broken = true;
        self.released.notify_all();
    }

    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.lock().broken
    }
}
