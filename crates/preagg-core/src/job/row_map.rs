use crate::buffer::ReserveError;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

/// `nvalids` sentinel: every row is valid and indices are implicit.
pub const ALL_VALID: i32 = -1;

///
/// RowMap
///
/// Valid-row count plus the row indices it covers. A negative count means
/// "all rows valid" and `rindex` is not consulted.
///
/// Projection consumes it as a filter; global reduction rebuilds it as the
/// destination-row to representative-row association.
///

#[derive(Debug)]
pub struct RowMap {
    nvalids: AtomicI32,
    rindex: Box<[AtomicU32]>,
}

impl RowMap {
    /// All-valid map with room for `capacity` later entries.
    #[must_use]
    pub fn all_valid(capacity: u32) -> Self {
        Self {
            nvalids: AtomicI32::new(ALL_VALID),
            rindex: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Explicit filter map over `indices`.
    #[must_use]
    pub fn from_indices(indices: &[u32]) -> Self {
        let nvalids = i32::try_from(indices.len()).unwrap_or(i32::MAX);

        Self {
            nvalids: AtomicI32::new(nvalids),
            rindex: indices.iter().map(|row| AtomicU32::new(*row)).collect(),
        }
    }

    /// Empty explicit map, ready for reservations.
    #[must_use]
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            nvalids: AtomicI32::new(0),
            rindex: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    #[must_use]
    pub fn nvalids(&self) -> i32 {
        self.nvalids.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_all_valid(&self) -> bool {
        self.nvalids() < 0
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        u32::try_from(self.rindex.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn get(&self, index: u32) -> Option<u32> {
        self.rindex
            .get(index as usize)
            .map(|entry| entry.load(Ordering::Acquire))
    }

    /// Record one entry; returns false when `index` is outside the map.
    pub fn set(&self, index: u32, row: u32) -> bool {
        self.rindex.get(index as usize).is_some_and(|entry| {
            entry.store(row, Ordering::Release);
            true
        })
    }

    /// Clear to an empty explicit map.
    pub fn reset(&self) {
        self.nvalids.store(0, Ordering::Release);
    }

    /// Reserve `n` entries against `min(capacity, limit)`.
    ///
    /// Never overshoots; a failed reservation leaves `nvalids` unchanged.
    /// An all-valid map cannot take reservations until reset.
    pub fn reserve(&self, n: u32, limit: u32) -> Result<u32, ReserveError> {
        let capacity = self.capacity().min(limit);
        let mut used = self.nvalids.load(Ordering::Acquire);
        loop {
            let used_u32 = u32::try_from(used).unwrap_or(u32::MAX);
            let next = used_u32
                .checked_add(n)
                .filter(|next| *next <= capacity)
                .and_then(|next| i32::try_from(next).ok())
                .ok_or(ReserveError {
                    requested: n,
                    used: used_u32,
                    capacity,
                })?;
            match self
                .nvalids
                .compare_exchange_weak(used, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(used_u32),
                Err(observed) => used = observed,
            }
        }
    }

    /// Explicit entries in reservation order, or `None` when all-valid.
    #[must_use]
    pub fn snapshot(&self) -> Option<Vec<u32>> {
        let nvalids = u32::try_from(self.nvalids()).ok()?;

        Some((0..nvalids).filter_map(|index| self.get(index)).collect())
    }

    /// Input row selected at position `index`, for a map scoped to
    /// `nitems` rows.
    #[must_use]
    pub fn source_row(&self, index: u32, nitems: u32) -> Option<u32> {
        match u32::try_from(self.nvalids()) {
            Ok(nvalids) if index < nvalids => self.get(index),
            Ok(_) => None,
            Err(_) => (index < nitems).then_some(index),
        }
    }

    /// Number of positions a stage must cover.
    #[must_use]
    pub fn scope(&self, nitems: u32) -> u32 {
        u32::try_from(self.nvalids()).unwrap_or(nitems)
    }
}
