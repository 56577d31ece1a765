//! Module: kernel::slot
//! Responsibility: single-word hash slots and the open-addressing claim
//! protocol shared by local and global reduction.
//! Does not own: hashing or key comparison (injected by the caller).
//! Boundary: a settled (hash, owner) slot is never rewritten until the
//! table is cleared for the next pass.

use crate::{kernel::KernelError, team::TeamContext};
use std::sync::atomic::{AtomicU64, Ordering};

///
/// HashSlot
///
/// {hash, owner index} packed into one word so a single compare-and-swap
/// claims or observes both. Hash in the low half, owner in the high half.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HashSlot {
    pub hash: u32,
    pub index: u32,
}

impl HashSlot {
    pub const EMPTY: Self = Self {
        hash: 0,
        index: u32::MAX,
    };

    #[must_use]
    pub const fn new(hash: u32, index: u32) -> Self {
        Self { hash, index }
    }

    #[must_use]
    pub const fn pack(self) -> u64 {
        ((self.index as u64) << 32) | self.hash as u64
    }

    #[must_use]
    pub const fn unpack(word: u64) -> Self {
        Self {
            hash: word as u32,
            index: (word >> 32) as u32,
        }
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.hash == Self::EMPTY.hash && self.index == Self::EMPTY.index
    }
}

///
/// SlotTable
///

#[derive(Debug)]
pub struct SlotTable {
    slots: Box<[AtomicU64]>,
}

impl SlotTable {
    /// Table of `capacity` empty slots; never smaller than one slot.
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        let slots = (0..capacity.max(1))
            .map(|_| AtomicU64::new(HashSlot::EMPTY.pack()))
            .collect();

        Self { slots }
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        u32::try_from(self.slots.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn get(&self, index: u32) -> Option<HashSlot> {
        self.slots
            .get(index as usize)
            .map(|slot| HashSlot::unpack(slot.load(Ordering::Acquire)))
    }

    pub fn clear(&self, index: u32) {
        if let Some(slot) = self.slots.get(index as usize) {
            slot.store(HashSlot::EMPTY.pack(), Ordering::Release);
        }
    }

    /// Clear the slots at `start`, `start + stride`, ...
    pub fn clear_strided(&self, start: u32, stride: u32) {
        let stride = stride.max(1) as usize;
        for slot in self.slots.iter().skip(start as usize).step_by(stride) {
            slot.store(HashSlot::EMPTY.pack(), Ordering::Release);
        }
    }

    /// Team-cooperative clear followed by a barrier.
    pub fn clear_by_team(&self, ctx: &TeamContext<'_>) {
        self.clear_strided(ctx.local_id(), ctx.team_size());
        ctx.barrier();
    }

    /// Elect or find the owner of a key with hash `hash`.
    ///
    /// Scans forward from `hash % capacity`: an empty slot is claimed with
    /// one CAS; an occupied slot with an equal hash whose owner row
    /// `same_key` accepts is adopted. The scan stops after visiting every
    /// slot once, reported as `DataStoreNoSpace`.
    pub fn claim(
        &self,
        hash: u32,
        my_index: u32,
        mut same_key: impl FnMut(u32) -> Result<bool, KernelError>,
    ) -> Result<u32, KernelError> {
        let capacity = self.capacity();
        let mine = HashSlot::new(hash, my_index).pack();
        let mut cursor = hash % capacity;

        for _ in 0..capacity {
            let slot = &self.slots[cursor as usize];
            let occupant = match slot.compare_exchange(
                HashSlot::EMPTY.pack(),
                mine,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(my_index),
                Err(word) => HashSlot::unpack(word),
            };
            if occupant.hash == hash && (occupant.index == my_index || same_key(occupant.index)?) {
                return Ok(occupant.index);
            }
            cursor = (cursor + 1) % capacity;
        }

        Err(KernelError::DataStoreNoSpace {
            resource: "hash slot table",
            requested: 1,
            used: capacity,
            capacity,
        })
    }
}
