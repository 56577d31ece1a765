//! Module: buffer
//! Responsibility: columnar table buffers with typed, nullable, atomically
//! addressable cells and a capacity-checked row reservation counter.
//! Does not own: grouping semantics or which column plays which role.
//! Boundary: kernels address cells by (row, column); hosts build and read
//! buffers through `Datum` rows.

#[cfg(test)]
mod tests;

mod cell;
mod toast;

pub use cell::AtomicDatum;
pub use toast::{ToastArena, ToastRef};

use crate::{
    aggregate::{AggType, AggValue, numeric::PackedNumeric},
    error::InternalError,
};
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

///
/// ColumnType
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
pub enum ColumnType {
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Numeric,
    Text,
}

impl ColumnType {
    #[must_use]
    pub const fn width(self) -> ColumnWidth {
        match AggType::for_column(self) {
            Some(ty) => ty.width(),
            None => ColumnWidth::VarLen,
        }
    }
}

///
/// ColumnWidth
///
/// Fixed byte width of an in-line value, or variable-length indirection
/// through the shared out-of-line arena.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnWidth {
    Fixed(u8),
    VarLen,
}

///
/// ColumnMeta
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ColumnMeta {
    pub name: String,
    pub ty: ColumnType,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    #[must_use]
    pub const fn width(&self) -> ColumnWidth {
        self.ty.width()
    }
}

///
/// Datum
///
/// Host-side value used to populate and read back buffers.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Datum {
    Null,
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Numeric(Decimal),
    Text(String),
}

impl Datum {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

///
/// ReserveError
///
/// A reservation that would overrun a buffer's room count. The counter is
/// left exactly as it was before the attempt.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReserveError {
    pub requested: u32,
    pub used: u32,
    pub capacity: u32,
}

/// Capacity-checked fetch-and-add shared by buffers and row maps.
///
/// Never overshoots: the counter only moves when `used + n <= capacity`.
pub(crate) fn reserve_rooms(
    counter: &AtomicU32,
    n: u32,
    capacity: u32,
) -> Result<u32, ReserveError> {
    let mut used = counter.load(Ordering::Acquire);
    loop {
        let next = used
            .checked_add(n)
            .filter(|next| *next <= capacity)
            .ok_or(ReserveError {
                requested: n,
                used,
                capacity,
            })?;
        match counter.compare_exchange_weak(used, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(base) => return Ok(base),
            Err(observed) => used = observed,
        }
    }
}

///
/// TableBuffer
///
/// Row-major grid of `AtomicDatum` cells. Rows `[0, nitems)` are live;
/// `nitems` only grows, via `reserve`, and never exceeds `nrooms`.
///

#[derive(Debug)]
pub struct TableBuffer {
    columns: Arc<[ColumnMeta]>,
    nrooms: u32,
    nitems: AtomicU32,
    cells: Box<[AtomicDatum]>,
    toast: Arc<ToastArena>,
}

impl TableBuffer {
    /// Allocate an empty buffer.
    pub fn empty(
        columns: Vec<ColumnMeta>,
        nrooms: u32,
        toast: Arc<ToastArena>,
    ) -> Result<Self, InternalError> {
        Self::allocate(columns.into(), nrooms, toast)
    }

    /// Allocate an empty buffer sharing this buffer's schema and arena.
    pub fn empty_like(&self, nrooms: u32) -> Result<Self, InternalError> {
        Self::allocate(Arc::clone(&self.columns), nrooms, Arc::clone(&self.toast))
    }

    /// Allocate an empty buffer with a different schema but the same arena.
    pub fn empty_with_columns(
        &self,
        columns: Vec<ColumnMeta>,
        nrooms: u32,
    ) -> Result<Self, InternalError> {
        Self::allocate(columns.into(), nrooms, Arc::clone(&self.toast))
    }

    fn allocate(
        columns: Arc<[ColumnMeta]>,
        nrooms: u32,
        toast: Arc<ToastArena>,
    ) -> Result<Self, InternalError> {
        if columns.is_empty() {
            return Err(InternalError::buffer_unsupported(
                "table buffer requires at least one column",
            ));
        }
        let ncells = (nrooms as usize)
            .checked_mul(columns.len())
            .ok_or_else(|| InternalError::buffer_unsupported("table buffer size overflows"))?;
        let cells = (0..ncells).map(|_| AtomicDatum::null()).collect();

        Ok(Self {
            columns,
            nrooms,
            nitems: AtomicU32::new(0),
            cells,
            toast,
        })
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, col: usize) -> Option<&ColumnMeta> {
        self.columns.get(col)
    }

    #[must_use]
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub const fn nrooms(&self) -> u32 {
        self.nrooms
    }

    #[must_use]
    pub fn nitems(&self) -> u32 {
        self.nitems.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn toast(&self) -> &ToastArena {
        &self.toast
    }

    #[must_use]
    pub fn shares_toast_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.toast, &other.toast)
    }

    /// Bounds-checked cell access; rows are checked against `nrooms`.
    #[must_use]
    pub fn cell(&self, row: u32, col: usize) -> Option<&AtomicDatum> {
        if row >= self.nrooms || col >= self.columns.len() {
            return None;
        }
        self.cells.get(row as usize * self.columns.len() + col)
    }

    /// Reserve `n` contiguous rows; returns the first reserved row index.
    pub fn reserve(&self, n: u32) -> Result<u32, ReserveError> {
        reserve_rooms(&self.nitems, n, self.nrooms)
    }

    /// Decode one row into host values.
    pub fn row(&self, row: u32) -> Result<Vec<Datum>, InternalError> {
        (0..self.ncols()).map(|col| self.datum(row, col)).collect()
    }

    /// Decode every live row.
    pub fn rows(&self) -> Result<Vec<Vec<Datum>>, InternalError> {
        (0..self.nitems()).map(|row| self.row(row)).collect()
    }

    /// Decode one cell into a host value.
    pub fn datum(&self, row: u32, col: usize) -> Result<Datum, InternalError> {
        let (Some(meta), Some(cell)) = (self.column(col), self.cell(row, col)) else {
            return Err(InternalError::buffer_invariant(format!(
                "cell ({row}, {col}) is outside the buffer"
            )));
        };
        let Some(bits) = cell.load() else {
            return Ok(Datum::Null);
        };

        decode_datum(meta.ty, bits, &self.toast).ok_or_else(|| {
            InternalError::buffer_corruption(format!(
                "cell ({row}, {col}) holds an undecodable {} value",
                meta.ty
            ))
        })
    }
}

fn decode_datum(ty: ColumnType, bits: u64, toast: &ToastArena) -> Option<Datum> {
    let datum = match AggType::for_column(ty) {
        Some(agg_ty) => match AggValue::from_bits(agg_ty, bits) {
            AggValue::Int16(v) => Datum::Int16(v),
            AggValue::Int32(v) => Datum::Int32(v),
            AggValue::Int64(v) => Datum::Int64(v),
            AggValue::Float32(v) => Datum::Float32(v),
            AggValue::Float64(v) => Datum::Float64(v),
            AggValue::Numeric(v) => Datum::Numeric(v.decode()?),
        },
        None => Datum::Text(toast.get(ToastRef::from_bits(bits))?.to_string()),
    };

    Some(datum)
}

///
/// TableBufferBuilder
///
/// Host-side population of an input buffer.
///

#[derive(Debug)]
pub struct TableBufferBuilder {
    columns: Vec<ColumnMeta>,
    rows: Vec<Vec<Datum>>,
    nrooms: Option<u32>,
}

impl TableBufferBuilder {
    #[must_use]
    pub const fn new(columns: Vec<ColumnMeta>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            nrooms: None,
        }
    }

    #[must_use]
    pub fn row(mut self, row: Vec<Datum>) -> Self {
        self.rows.push(row);
        self
    }

    #[must_use]
    pub fn rows(mut self, rows: impl IntoIterator<Item = Vec<Datum>>) -> Self {
        self.rows.extend(rows);
        self
    }

    /// Room count; defaults to the number of rows pushed.
    #[must_use]
    pub const fn nrooms(mut self, nrooms: u32) -> Self {
        self.nrooms = Some(nrooms);
        self
    }

    pub fn build(self) -> Result<TableBuffer, InternalError> {
        let nrows = u32::try_from(self.rows.len())
            .map_err(|_| InternalError::buffer_unsupported("too many rows for one buffer"))?;
        let nrooms = self.nrooms.unwrap_or(nrows);
        if nrows > nrooms {
            return Err(InternalError::buffer_unsupported(format!(
                "{nrows} rows do not fit a buffer with {nrooms} rooms"
            )));
        }

        // encode every row before allocating so the arena is complete
        let mut toast = ToastArena::new();
        let mut encoded = Vec::with_capacity(self.rows.len());
        for (index, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(InternalError::buffer_unsupported(format!(
                    "row {index} has {} values, expected {}",
                    row.len(),
                    self.columns.len()
                )));
            }
            let words = row
                .iter()
                .zip(&self.columns)
                .map(|(datum, meta)| encode_datum(datum, meta, &mut toast))
                .collect::<Result<Vec<_>, _>>()?;
            encoded.push(words);
        }

        let buffer = TableBuffer::empty(self.columns, nrooms, Arc::new(toast))?;
        let base = buffer.reserve(nrows).map_err(|err| {
            InternalError::buffer_invariant(format!(
                "builder reservation failed: requested={}, capacity={}",
                err.requested, err.capacity
            ))
        })?;
        for (offset, words) in encoded.into_iter().enumerate() {
            let row = base + offset as u32;
            for (col, word) in words.into_iter().enumerate() {
                if let Some(cell) = buffer.cell(row, col) {
                    cell.store(word);
                }
            }
        }

        Ok(buffer)
    }
}

fn encode_datum(
    datum: &Datum,
    meta: &ColumnMeta,
    toast: &mut ToastArena,
) -> Result<Option<u64>, InternalError> {
    let word = match (meta.ty, datum) {
        (_, Datum::Null) => return Ok(None),
        (ColumnType::Int16, Datum::Int16(v)) => AggValue::Int16(*v).to_bits(),
        (ColumnType::Int32, Datum::Int32(v)) => AggValue::Int32(*v).to_bits(),
        (ColumnType::Int64, Datum::Int64(v)) => AggValue::Int64(*v).to_bits(),
        (ColumnType::Float32, Datum::Float32(v)) => AggValue::Float32(*v).to_bits(),
        (ColumnType::Float64, Datum::Float64(v)) => AggValue::Float64(*v).to_bits(),
        (ColumnType::Numeric, Datum::Numeric(v)) => PackedNumeric::encode(*v)
            .ok_or_else(|| {
                InternalError::buffer_unsupported(format!(
                    "numeric {v} does not fit column '{}'",
                    meta.name
                ))
            })?
            .to_bits(),
        (ColumnType::Text, Datum::Text(v)) => toast
            .push(v)
            .ok_or_else(|| InternalError::buffer_unsupported("out-of-line arena is full"))?
            .to_bits(),
        (ty, datum) => {
            return Err(InternalError::buffer_unsupported(format!(
                "value {datum:?} does not match column '{}' of type {ty}",
                meta.name
            )));
        }
    };

    Ok(Some(word))
}
