//! Module: kernel::functions
//! Responsibility: the per-query strategy contract the reduction kernels
//! depend on, plus the staged lookup-table view handed to `hash`.
//! Does not own: any concrete plan (see `plan`).
//! Boundary: resolved once per job and passed explicitly into every stage.

use crate::{
    aggregate::AggDatum,
    buffer::{AtomicDatum, ColumnMeta, TableBuffer},
    error::InternalError,
    job::FieldRoleMap,
    kernel::KernelError,
};
use std::{
    cmp::Ordering,
    sync::atomic::{AtomicU32, Ordering as AtomicOrdering},
};

///
/// LookupTable
///
/// Read-only view of the team-staged 256-entry hash table.
///

#[derive(Clone, Copy, Debug)]
pub struct LookupTable<'a> {
    entries: &'a [AtomicU32],
}

impl<'a> LookupTable<'a> {
    #[must_use]
    pub const fn new(entries: &'a [AtomicU32]) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn entry(&self, index: u8) -> u32 {
        self.entries
            .get(usize::from(index))
            .map_or(0, |entry| entry.load(AtomicOrdering::Relaxed))
    }

    /// Fold `bytes` into a running reflected CRC-32.
    #[must_use]
    pub fn crc32_update(&self, crc: u32, bytes: &[u8]) -> u32 {
        bytes.iter().fold(crc, |crc, byte| {
            self.entry((crc as u8) ^ byte) ^ (crc >> 8)
        })
    }
}

///
/// PreAggFunctions
///
/// Generated per-query behavior: row qualification and projection,
/// grouping-key hashing and comparison, and per-column merges.
///
/// Implementations run on kernel threads and must not panic; every
/// failure is reported as a `KernelError`.
///

pub trait PreAggFunctions: Send + Sync {
    /// Column layout of projected rows.
    fn output_columns(&self, input: &[ColumnMeta]) -> Result<Vec<ColumnMeta>, InternalError>;

    /// Role of each projected column.
    fn field_roles(&self) -> FieldRoleMap;

    /// Whether input row `row` survives filtering.
    fn qualify(&self, input: &TableBuffer, row: u32) -> Result<bool, KernelError>;

    /// Write the projection of input row `row` into `dst` row `slot`.
    fn project(
        &self,
        input: &TableBuffer,
        row: u32,
        dst: &TableBuffer,
        slot: u32,
    ) -> Result<(), KernelError>;

    /// Hash of the grouping key of `row`.
    fn hash(
        &self,
        lookup: &LookupTable<'_>,
        buf: &TableBuffer,
        row: u32,
    ) -> Result<u32, KernelError>;

    /// Compare the grouping keys of two rows of one buffer.
    fn keys_equal(&self, buf: &TableBuffer, a: u32, b: u32) -> Result<Ordering, KernelError>;

    /// Merge `newval` into a team accumulator for column `col`.
    fn merge_local(
        &self,
        col: usize,
        accum: &AtomicDatum,
        newval: &AggDatum,
    ) -> Result<(), KernelError>;

    /// Merge row `newval_row` into row `accum_row` of `buf` for column `col`.
    fn merge_global(
        &self,
        col: usize,
        buf: &TableBuffer,
        accum_row: u32,
        newval_row: u32,
    ) -> Result<(), KernelError>;
}
