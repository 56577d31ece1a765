//! Module: team
//! Responsibility: CPU rendition of SIMT thread teams: barrier-synchronized
//! member threads, team-shared scratch, and team dispatch over a pool.
//! Does not own: kernel bodies or job status semantics.
//! Boundary: kernels see only `TeamContext`; the executor sees only
//! `TeamLauncher` and `NdRange`.


mod barrier;
mod launch;

pub use barrier::{BarrierBroken, TeamBarrier};
pub use launch::{NdRange, TeamLauncher};

use crate::{
    buffer::AtomicDatum,
    job::crc32::LOOKUP_TABLE_LEN,
    kernel::{LookupTable, SlotTable, StatusChannel},
};
use std::{
    panic,
    sync::atomic::{AtomicU32, AtomicU64, Ordering},
};

/// Largest supported team.
pub const MAX_TEAM_SIZE: u32 = 1024;

const BROADCAST_NONE: u64 = u64::MAX;

///
/// TeamShared
///
/// Memory shared by the members of one team for one launch. Each phase
/// has its own named buffer; nothing is reused across phases.
///

#[derive(Debug)]
pub struct TeamShared {
    barrier: TeamBarrier,
    scan: [Box<[AtomicU32]>; 2],
    lookup: Box<[AtomicU32]>,
    broadcast: AtomicU64,

    /// Team-local hash slots, twice the team size.
    pub local_slots: SlotTable,

    /// One accumulator cell per member.
    pub accumulators: Box<[AtomicDatum]>,

    /// Team status; the leader forwards it to the job.
    pub status: StatusChannel,
}

impl TeamShared {
    #[must_use]
    pub fn new(team_size: u32) -> Self {
        let members = team_size as usize;
        let atomics = |len: usize| (0..len).map(|_| AtomicU32::new(0)).collect();

        Self {
            barrier: TeamBarrier::new(members),
            scan: [atomics(members), atomics(members)],
            lookup: atomics(LOOKUP_TABLE_LEN),
            broadcast: AtomicU64::new(BROADCAST_NONE),
            local_slots: SlotTable::new(team_size.saturating_mul(2)),
            accumulators: (0..members).map(|_| AtomicDatum::null()).collect(),
            status: StatusChannel::new(),
        }
    }

    /// Release teammates blocked on a member that is gone.
    pub fn abort(&self) {
        self.barrier.break_all();
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.barrier.is_broken()
    }
}

///
/// TeamContext
///
/// One member thread's view of its position and its team.
///

#[derive(Clone, Copy, Debug)]
pub struct TeamContext<'a> {
    shared: &'a TeamShared,
    global_id: u32,
    local_id: u32,
    team_id: u32,
    team_size: u32,
    global_size: u32,
}

impl<'a> TeamContext<'a> {
    #[must_use]
    pub const fn new(shared: &'a TeamShared, range: NdRange, team_id: u32, local_id: u32) -> Self {
        Self {
            shared,
            global_id: team_id * range.team_size + local_id,
            local_id,
            team_id,
            team_size: range.team_size,
            global_size: range.global_size,
        }
    }

    #[must_use]
    pub const fn global_id(&self) -> u32 {
        self.global_id
    }

    #[must_use]
    pub const fn local_id(&self) -> u32 {
        self.local_id
    }

    #[must_use]
    pub const fn team_id(&self) -> u32 {
        self.team_id
    }

    #[must_use]
    pub const fn team_size(&self) -> u32 {
        self.team_size
    }

    #[must_use]
    pub const fn global_size(&self) -> u32 {
        self.global_size
    }

    #[must_use]
    pub const fn is_leader(&self) -> bool {
        self.local_id == 0
    }

    #[must_use]
    pub const fn shared(&self) -> &'a TeamShared {
        self.shared
    }

    /// Global id of the teammate at `local_id`.
    #[must_use]
    pub const fn teammate_global_id(&self, local_id: u32) -> u32 {
        self.team_id * self.team_size + local_id
    }

    /// Stall until every teammate arrives.
    ///
    /// If the team was aborted this member unwinds out of its kernel with
    /// a `BarrierBroken` payload; the launcher catches it.
    pub fn barrier(&self) {
        if let Err(broken) = self.shared.barrier.wait() {
            panic::resume_unwind(Box::new(broken));
        }
    }

    /// Team-wide prefix sum of `value`.
    ///
    /// Returns (exclusive offset of this member, team total). Hillis-Steele
    /// scan over two scratch arrays; every member must call it.
    #[must_use]
    pub fn stairlike_add(&self, value: u32) -> (u32, u32) {
        let lid = self.local_id as usize;
        let members = self.team_size as usize;
        let mut src = 0;

        self.shared.scan[src][lid].store(value, Ordering::Relaxed);
        self.barrier();

        let mut stride = 1;
        while stride < members {
            let dst = 1 - src;
            let mut sum = self.shared.scan[src][lid].load(Ordering::Relaxed);
            if lid >= stride {
                sum = sum.wrapping_add(self.shared.scan[src][lid - stride].load(Ordering::Relaxed));
            }
            self.shared.scan[dst][lid].store(sum, Ordering::Relaxed);
            self.barrier();
            src = dst;
            stride <<= 1;
        }

        let inclusive = self.shared.scan[src][lid].load(Ordering::Relaxed);
        let total = self.shared.scan[src][members - 1].load(Ordering::Relaxed);
        // scratch is rewritten by the next scan
        self.barrier();

        (inclusive.wrapping_sub(value), total)
    }

    /// Leader computes one value; every member receives it.
    #[must_use]
    pub fn broadcast(&self, leader: impl FnOnce() -> Option<u32>) -> Option<u32> {
        if self.is_leader() {
            let word = leader().map_or(BROADCAST_NONE, u64::from);
            self.shared.broadcast.store(word, Ordering::Relaxed);
        }
        self.barrier();
        let word = self.shared.broadcast.load(Ordering::Relaxed);
        self.barrier();

        u32::try_from(word).ok()
    }

    /// Copy the job's lookup table into team memory.
    pub fn stage_lookup(&self, table: &[u32; LOOKUP_TABLE_LEN]) {
        let mut index = self.local_id as usize;
        while index < LOOKUP_TABLE_LEN {
            self.shared.lookup[index].store(table[index], Ordering::Relaxed);
            index += self.team_size as usize;
        }
        self.barrier();
    }

    /// Staged lookup table; valid after `stage_lookup`.
    #[must_use]
    pub fn lookup(&self) -> LookupTable<'a> {
        LookupTable::new(&self.shared.lookup)
    }

    #[must_use]
    pub fn accumulator(&self, local_id: u32) -> Option<&'a AtomicDatum> {
        self.shared.accumulators.get(local_id as usize)
    }
}
