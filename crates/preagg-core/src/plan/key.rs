//! Module: plan::key
//! Responsibility: canonical hashing and null-aware ordering of grouping keys.
//! Does not own: which columns form the key (the plan decides).
//! Boundary: values that compare equal here always hash equal.

use crate::{
    aggregate::numeric::PackedNumeric,
    buffer::{ColumnType, TableBuffer, ToastRef},
    kernel::{KernelError, LookupTable, data_load},
};
use std::cmp::Ordering;

const NULL_TAG: u8 = 0;
const VALUE_TAG: u8 = 1;

/// CRC-32 over the canonical bytes of every key column of `row`.
pub(super) fn hash_key(
    lookup: &LookupTable<'_>,
    buf: &TableBuffer,
    row: u32,
    keys: &[(usize, ColumnType)],
) -> Result<u32, KernelError> {
    let mut crc = u32::MAX;
    for &(col, ty) in keys {
        crc = match data_load(buf, col, row)? {
            None => lookup.crc32_update(crc, &[NULL_TAG]),
            Some(bits) => {
                let crc = lookup.crc32_update(crc, &[VALUE_TAG]);
                match ty {
                    ColumnType::Text => {
                        lookup.crc32_update(crc, text(buf, col, row, bits)?.as_bytes())
                    }
                    _ => lookup.crc32_update(crc, &canonical_word(ty, col, row, bits)?),
                }
            }
        };
    }

    Ok(!crc)
}

/// Lexicographic comparison of key columns; nulls equal each other and
/// sort after every value.
pub(super) fn compare_keys(
    buf: &TableBuffer,
    a: u32,
    b: u32,
    keys: &[(usize, ColumnType)],
) -> Result<Ordering, KernelError> {
    for &(col, ty) in keys {
        let ordering = match (data_load(buf, col, a)?, data_load(buf, col, b)?) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => compare_values(buf, ty, col, (a, x), (b, y))?,
        };
        if ordering.is_ne() {
            return Ok(ordering);
        }
    }

    Ok(Ordering::Equal)
}

fn compare_values(
    buf: &TableBuffer,
    ty: ColumnType,
    col: usize,
    (a, x): (u32, u64),
    (b, y): (u32, u64),
) -> Result<Ordering, KernelError> {
    let ordering = match ty {
        ColumnType::Int16 => (x as u16 as i16).cmp(&(y as u16 as i16)),
        ColumnType::Int32 => (x as u32 as i32).cmp(&(y as u32 as i32)),
        ColumnType::Int64 => (x as i64).cmp(&(y as i64)),
        ColumnType::Float32 => {
            canonical_f32(x as u32).total_cmp(&canonical_f32(y as u32))
        }
        ColumnType::Float64 => canonical_f64(x).total_cmp(&canonical_f64(y)),
        ColumnType::Numeric => {
            let x = decimal(col, a, x)?;
            let y = decimal(col, b, y)?;
            x.cmp(&y)
        }
        ColumnType::Text => text(buf, col, a, x)?.cmp(text(buf, col, b, y)?),
    };

    Ok(ordering)
}

// Fixed-width key bytes; equal values always produce equal bytes.
fn canonical_word(ty: ColumnType, col: usize, row: u32, bits: u64) -> Result<Vec<u8>, KernelError> {
    let bytes = match ty {
        ColumnType::Int16 | ColumnType::Int32 | ColumnType::Int64 => bits.to_le_bytes().to_vec(),
        ColumnType::Float32 => canonical_f32(bits as u32).to_bits().to_le_bytes().to_vec(),
        ColumnType::Float64 => canonical_f64(bits).to_bits().to_le_bytes().to_vec(),
        ColumnType::Numeric => {
            let value = decimal(col, row, bits)?.normalize();
            let mut bytes = value.mantissa().to_le_bytes().to_vec();
            bytes.extend_from_slice(&value.scale().to_le_bytes());
            bytes
        }
        ColumnType::Text => {
            return Err(KernelError::corruption_at(
                "variable-length key reached the fixed-width encoder",
                col,
                row,
            ));
        }
    };

    Ok(bytes)
}

fn canonical_f32(bits: u32) -> f32 {
    let value = f32::from_bits(bits);
    if value.is_nan() {
        f32::NAN
    } else if value == 0.0 {
        0.0
    } else {
        value
    }
}

fn canonical_f64(bits: u64) -> f64 {
    let value = f64::from_bits(bits);
    if value.is_nan() {
        f64::NAN
    } else if value == 0.0 {
        0.0
    } else {
        value
    }
}

fn decimal(col: usize, row: u32, bits: u64) -> Result<rust_decimal::Decimal, KernelError> {
    PackedNumeric::from_bits(bits)
        .decode()
        .ok_or_else(|| KernelError::corruption_at("numeric key has an invalid encoding", col, row))
}

fn text(buf: &TableBuffer, col: usize, row: u32, bits: u64) -> Result<&str, KernelError> {
    buf.toast()
        .get(ToastRef::from_bits(bits))
        .ok_or_else(|| KernelError::corruption_at("text key does not resolve", col, row))
}
