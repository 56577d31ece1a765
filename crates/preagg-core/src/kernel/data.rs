use crate::{
    aggregate::{AggDatum, AggType},
    buffer::{ColumnType, ColumnWidth, TableBuffer, ToastRef},
    kernel::KernelError,
};

/// Load one live cell.
pub fn data_load(buf: &TableBuffer, col: usize, row: u32) -> Result<Option<u64>, KernelError> {
    if row >= buf.nitems() {
        return Err(KernelError::corruption_at(
            format!("row {row} is beyond nitems {}", buf.nitems()),
            col,
            row,
        ));
    }
    let cell = buf.cell(row, col).ok_or_else(|| {
        KernelError::corruption_at(format!("column {col} is out of range"), col, row)
    })?;

    Ok(cell.load())
}

/// Load one live cell as a running total.
pub fn data_load_agg(buf: &TableBuffer, col: usize, row: u32) -> Result<AggDatum, KernelError> {
    let ty = agg_type(buf, col, row)?;

    Ok(AggDatum::from_bits(ty, data_load(buf, col, row)?))
}

/// Store into a reserved cell; the caller owns the row for this phase.
pub fn data_store(
    buf: &TableBuffer,
    col: usize,
    row: u32,
    value: Option<u64>,
) -> Result<(), KernelError> {
    let cell = buf.cell(row, col).ok_or_else(|| {
        KernelError::corruption_at(
            format!("store to ({row}, {col}) is outside {} rooms", buf.nrooms()),
            col,
            row,
        )
    })?;
    cell.store(value);

    Ok(())
}

/// Copy one cell between buffers of the same column type, re-validating
/// out-of-line references against the destination arena.
pub fn data_move(
    dst: &TableBuffer,
    dst_col: usize,
    dst_row: u32,
    src: &TableBuffer,
    src_col: usize,
    src_row: u32,
) -> Result<(), KernelError> {
    let dst_ty = column_type(dst, dst_col, dst_row)?;
    let src_ty = column_type(src, src_col, src_row)?;
    if dst_ty != src_ty {
        return Err(KernelError::corruption_at(
            format!("cannot move {src_ty} into {dst_ty}"),
            dst_col,
            dst_row,
        ));
    }

    let value = match (data_load(src, src_col, src_row)?, dst_ty.width()) {
        (Some(bits), ColumnWidth::VarLen) => Some(fixup_varlena(dst, dst_col, dst_row, bits)?),
        (value, _) => value,
    };

    data_store(dst, dst_col, dst_row, value)
}

/// Validate that an out-of-line reference resolves in `dst`'s arena.
pub fn fixup_varlena(
    dst: &TableBuffer,
    col: usize,
    row: u32,
    bits: u64,
) -> Result<u64, KernelError> {
    if dst.toast().contains(ToastRef::from_bits(bits)) {
        Ok(bits)
    } else {
        Err(KernelError::corruption_at(
            "variable-length reference does not resolve in the destination arena",
            col,
            row,
        ))
    }
}

pub(crate) fn column_type(
    buf: &TableBuffer,
    col: usize,
    row: u32,
) -> Result<ColumnType, KernelError> {
    buf.column(col)
        .map(|meta| meta.ty)
        .ok_or_else(|| {
            KernelError::corruption_at(format!("column {col} is out of range"), col, row)
        })
}

pub(crate) fn agg_type(buf: &TableBuffer, col: usize, row: u32) -> Result<AggType, KernelError> {
    let ty = column_type(buf, col, row)?;

    AggType::for_column(ty).ok_or_else(|| {
        KernelError::corruption_at(
            format!("{ty} column cannot hold a running total"),
            col,
            row,
        )
    })
}
