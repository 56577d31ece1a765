//! Module: job::layout
//! Responsibility: derive every offset of the packed job descriptor from its
//! header and the parameter block's declared length.
//! Does not own: encoding or transport of the descriptor.
//! Boundary: all derived-offset access goes through a validated `JobLayout`.

use crate::{error::InternalError, job::crc32::LOOKUP_TABLE_LEN};
use std::ops::Range;

/// Alignment applied between packed sections.
pub const ALIGN: usize = 8;

pub const STATUS_OFFSET: usize = 0;
pub const STATUS_LEN: usize = 4;
pub const HASH_SIZE_OFFSET: usize = STATUS_OFFSET + STATUS_LEN;
pub const LOOKUP_TABLE_OFFSET: usize = HASH_SIZE_OFFSET + 4;
pub const HEADER_PADDING: usize = 8;

/// Offset of the parameter block; the header ends here.
pub const PARAMS_OFFSET: usize = LOOKUP_TABLE_OFFSET + 4 * LOOKUP_TABLE_LEN + HEADER_PADDING;

/// Row map header: the signed `nvalids` count.
pub const ROW_MAP_HEADER_LEN: usize = 4;

/// Round up to the section alignment.
#[must_use]
pub const fn align_up(len: usize) -> usize {
    len.div_ceil(ALIGN) * ALIGN
}

///
/// JobLayout
///
/// Offsets of one packed descriptor. The row map has no stored offset; it
/// begins at the aligned end of the parameter block.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct JobLayout {
    pub params_offset: usize,
    pub params_len: usize,
    pub row_map_offset: usize,
    pub row_map_len: usize,
    pub total_len: usize,
}

impl JobLayout {
    /// Compute the layout for a parameter block of `params_len` bytes and a
    /// row map holding `nvalids` entries (negative means implicit rows).
    pub fn compute(params_len: usize, nvalids: i32) -> Result<Self, InternalError> {
        let entries = usize::try_from(nvalids.max(0)).unwrap_or(0);
        let row_map_offset = PARAMS_OFFSET
            .checked_add(params_len)
            .map(align_up)
            .ok_or_else(|| InternalError::layout_corruption("parameter block length overflows"))?;
        let row_map_len = entries
            .checked_mul(4)
            .and_then(|len| len.checked_add(ROW_MAP_HEADER_LEN))
            .ok_or_else(|| InternalError::layout_corruption("row map length overflows"))?;
        let total_len = row_map_offset
            .checked_add(row_map_len)
            .ok_or_else(|| InternalError::layout_corruption("descriptor length overflows"))?;

        Ok(Self {
            params_offset: PARAMS_OFFSET,
            params_len,
            row_map_offset,
            row_map_len,
            total_len,
        })
    }

    /// Derive the layout from a packed buffer, bounds-checking every read.
    pub fn from_header(buffer: &[u8]) -> Result<Self, InternalError> {
        let params_len = read_u32(buffer, PARAMS_OFFSET)? as usize;
        let header = Self::compute(params_len, 0)?;
        let nvalids = read_u32(buffer, header.row_map_offset)? as i32;
        let layout = Self::compute(params_len, nvalids)?;
        layout.validate(buffer.len())?;

        Ok(layout)
    }

    /// Reject buffers too short for this layout.
    pub fn validate(&self, buffer_len: usize) -> Result<(), InternalError> {
        if self.total_len > buffer_len {
            return Err(InternalError::layout_corruption(format!(
                "descriptor needs {} bytes, buffer holds {buffer_len}",
                self.total_len
            )));
        }

        Ok(())
    }

    /// Byte range sent to the executor.
    #[must_use]
    pub const fn dma_send(&self) -> Range<usize> {
        0..self.total_len
    }

    /// Byte range read back after completion (the status word only).
    #[must_use]
    pub const fn dma_recv(&self) -> Range<usize> {
        STATUS_OFFSET..STATUS_OFFSET + STATUS_LEN
    }

    /// Byte range of row map entry `index`.
    #[must_use]
    pub const fn rindex_range(&self, index: usize) -> Range<usize> {
        let start = self.row_map_offset + ROW_MAP_HEADER_LEN + 4 * index;
        start..start + 4
    }
}

fn read_u32(buffer: &[u8], offset: usize) -> Result<u32, InternalError> {
    let bytes = offset
        .checked_add(4)
        .and_then(|end| buffer.get(offset..end))
        .ok_or_else(|| {
            InternalError::layout_corruption(format!(
                "read of 4 bytes at offset {offset} exceeds descriptor of {} bytes",
                buffer.len()
            ))
        })?;
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);

    Ok(u32::from_le_bytes(word))
}
