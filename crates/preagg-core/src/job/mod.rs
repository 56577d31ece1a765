//! Module: job
//! Responsibility: the caller-owned job descriptor and its packed layout.
//! Does not own: transport of the descriptor or scheduling of stages.
//! Boundary: mutated during execution only through the status channel,
//! the atomic hash-size field, and row-map reservations.


pub mod crc32;
mod layout;
mod param;
mod row_map;

pub use layout::{
    ALIGN, HASH_SIZE_OFFSET, JobLayout, LOOKUP_TABLE_OFFSET, PARAMS_OFFSET, STATUS_LEN,
    STATUS_OFFSET, align_up,
};
pub use param::{FieldRole, FieldRoleMap, ParamBuf};
pub use row_map::{ALL_VALID, RowMap};

use crate::{
    error::InternalError,
    job::crc32::{CRC32_TABLE, LOOKUP_TABLE_LEN},
    kernel::{KernelError, StatusChannel, StatusCode},
};
use std::sync::atomic::{AtomicU32, Ordering};

///
/// JobDescriptor
///
/// Written once by the caller before dispatch and read back after the
/// batch completes.
///

#[derive(Debug)]
pub struct JobDescriptor {
    status: StatusChannel,
    hash_size: AtomicU32,
    lookup_table: [u32; LOOKUP_TABLE_LEN],
    params: ParamBuf,
    row_map: RowMap,
}

impl JobDescriptor {
    /// Build a descriptor; `hash_size` zero means "derive at execution".
    #[must_use]
    pub fn new(params: ParamBuf, row_map: RowMap) -> Self {
        Self {
            status: StatusChannel::new(),
            hash_size: AtomicU32::new(0),
            lookup_table: CRC32_TABLE,
            params,
            row_map,
        }
    }

    #[must_use]
    pub fn with_hash_size(self, hash_size: u32) -> Self {
        self.hash_size.store(hash_size, Ordering::Release);
        self
    }

    #[must_use]
    pub const fn status_channel(&self) -> &StatusChannel {
        &self.status
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status.code()
    }

    /// Full error behind a non-success status.
    #[must_use]
    pub fn status_detail(&self) -> Option<&KernelError> {
        self.status.detail()
    }

    #[must_use]
    pub fn hash_size(&self) -> u32 {
        self.hash_size.load(Ordering::Acquire)
    }

    pub(crate) fn set_hash_size(&self, hash_size: u32) {
        self.hash_size.store(hash_size, Ordering::Release);
    }

    #[must_use]
    pub const fn lookup_table(&self) -> &[u32; LOOKUP_TABLE_LEN] {
        &self.lookup_table
    }

    #[must_use]
    pub const fn params(&self) -> &ParamBuf {
        &self.params
    }

    #[must_use]
    pub const fn row_map(&self) -> &RowMap {
        &self.row_map
    }

    /// Packed layout for the descriptor's current row map.
    pub fn layout(&self) -> Result<JobLayout, InternalError> {
        let nvalids = self.row_map.nvalids();
        let layout = JobLayout::compute(self.params.length(), nvalids)?;
        if nvalids > 0 && nvalids.unsigned_abs() > self.row_map.capacity() {
            return Err(InternalError::layout_corruption(format!(
                "row map declares {nvalids} entries but holds {}",
                self.row_map.capacity()
            )));
        }

        Ok(layout)
    }
}
