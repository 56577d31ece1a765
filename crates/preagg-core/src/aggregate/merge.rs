//! Module: aggregate::merge
//! Responsibility: per-type, per-operator partial aggregate merges with null
//! and overflow semantics.
//! Does not own: which column uses which operator (plans decide that).
//! Boundary: consumed by local (team cell) and global (buffer cell) reductions.

use crate::{
    aggregate::{
        AggDatum, AggType, AggValue, AggregateOp,
        numeric::{NumericFault, numeric_add, numeric_cmp},
    },
    buffer::AtomicDatum,
};
use num_traits::{Float, PrimInt, Signed, WrappingAdd};
use std::cmp::Ordering;
use thiserror::Error as ThisError;

///
/// MergeError
///
/// Overflow is recoverable: the caller re-aggregates the affected rows on a
/// non-overflowing fallback path. Everything else is a contract violation.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, ThisError)]
pub enum MergeError {
    #[error("{op}({ty}) overflowed; running total is not trusted")]
    Overflow { op: AggregateOp, ty: AggType },

    #[error("{op} cannot merge {found} into a {expected} running total")]
    TypeMismatch {
        op: AggregateOp,
        expected: AggType,
        found: AggType,
    },

    #[error("{op}({ty}) operand carries an invalid encoding")]
    Corrupt { op: AggregateOp, ty: AggType },
}

///
/// Merged
///
/// Result of one merge step. `overflow` marks the value as untrusted; fixed
/// width sums still carry the wrapped result so later merges stay defined,
/// numeric sums keep the previous total.
///

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Merged {
    pub value: Option<AggValue>,
    pub overflow: bool,
}

/// Integer sum with the sign-overflow check: equal-sign operands whose sum
/// flips sign.
fn sum_int<T: PrimInt + Signed + WrappingAdd>(x: T, y: T) -> (T, bool) {
    let sum = x.wrapping_add(&y);
    let overflow = x.is_negative() == y.is_negative() && sum.is_negative() != x.is_negative();

    (sum, overflow)
}

/// Float sum; overflow is a transition to infinity from finite operands.
fn sum_float<T: Float>(x: T, y: T) -> (T, bool) {
    let sum = x + y;
    let overflow = sum.is_infinite() && !x.is_infinite() && !y.is_infinite();

    (sum, overflow)
}

// Strictly-less for MIN, strictly-greater for MAX.
fn favors(op: AggregateOp, ordering: Option<Ordering>) -> bool {
    matches!(
        (op, ordering),
        (AggregateOp::Min, Some(Ordering::Less)) | (AggregateOp::Max, Some(Ordering::Greater))
    )
}

fn extremum<T: Ord + Copy>(op: AggregateOp, current: T, challenger: T) -> T {
    if favors(op, Some(challenger.cmp(&current))) {
        challenger
    } else {
        current
    }
}

/// MIN/MAX over floats under a total order: every NaN collapses to one
/// canonical NaN that sorts above +inf, as grouping keys already treat it.
fn float_extremum<T: Float>(
    op: AggregateOp,
    current: T,
    challenger: T,
    total_cmp: fn(&T, &T) -> Ordering,
) -> T {
    let canonical = |value: T| if value.is_nan() { T::nan() } else { value };
    let (current, challenger) = (canonical(current), canonical(challenger));

    if favors(op, Some(total_cmp(&challenger, &current))) {
        challenger
    } else {
        current
    }
}

const fn numeric_corrupt(op: AggregateOp) -> MergeError {
    MergeError::Corrupt {
        op,
        ty: AggType::Numeric,
    }
}

// Combine two non-null operands of the same type.
fn combine(op: AggregateOp, accum: AggValue, newval: AggValue) -> Result<Merged, MergeError> {
    use AggValue as V;

    let (value, overflow) = match (op, accum, newval) {
        (AggregateOp::Sum, V::Int16(x), V::Int16(y)) => {
            let (sum, overflow) = sum_int(x, y);
            (V::Int16(sum), overflow)
        }
        (AggregateOp::Sum, V::Int32(x), V::Int32(y)) => {
            let (sum, overflow) = sum_int(x, y);
            (V::Int32(sum), overflow)
        }
        (AggregateOp::Sum, V::Int64(x), V::Int64(y)) => {
            let (sum, overflow) = sum_int(x, y);
            (V::Int64(sum), overflow)
        }
        (AggregateOp::Sum, V::Float32(x), V::Float32(y)) => {
            let (sum, overflow) = sum_float(x, y);
            (V::Float32(sum), overflow)
        }
        (AggregateOp::Sum, V::Float64(x), V::Float64(y)) => {
            let (sum, overflow) = sum_float(x, y);
            (V::Float64(sum), overflow)
        }
        (AggregateOp::Sum, V::Numeric(x), V::Numeric(y)) => match numeric_add(x, y) {
            Ok(sum) => (V::Numeric(sum), false),
            Err(NumericFault::Overflow) => (V::Numeric(x), true),
            Err(NumericFault::Corrupt) => return Err(numeric_corrupt(op)),
        },
        (_, V::Numeric(x), V::Numeric(y)) => {
            let ordering = numeric_cmp(y, x).map_err(|_| numeric_corrupt(op))?;
            let winner = if favors(op, Some(ordering)) { y } else { x };
            (V::Numeric(winner), false)
        }
        (_, V::Int16(x), V::Int16(y)) => (V::Int16(extremum(op, x, y)), false),
        (_, V::Int32(x), V::Int32(y)) => (V::Int32(extremum(op, x, y)), false),
        (_, V::Int64(x), V::Int64(y)) => (V::Int64(extremum(op, x, y)), false),
        (_, V::Float32(x), V::Float32(y)) => {
            (V::Float32(float_extremum(op, x, y, f32::total_cmp)), false)
        }
        (_, V::Float64(x), V::Float64(y)) => {
            (V::Float64(float_extremum(op, x, y, f64::total_cmp)), false)
        }
        (_, accum, newval) => {
            return Err(MergeError::TypeMismatch {
                op,
                expected: accum.ty(),
                found: newval.ty(),
            });
        }
    };

    Ok(Merged {
        value: Some(value),
        overflow,
    })
}

/// Merge one optional operand into one optional running total.
///
/// Null operands are ignored by every operator; a null running total
/// adopts the first non-null operand. SUM stays null only while every
/// operand so far was null.
pub fn merge_values(
    op: AggregateOp,
    accum: Option<AggValue>,
    newval: Option<AggValue>,
) -> Result<Merged, MergeError> {
    match (accum, newval) {
        (accum, None) => Ok(Merged {
            value: accum,
            overflow: false,
        }),
        (None, Some(newval)) => Ok(Merged {
            value: Some(newval),
            overflow: false,
        }),
        (Some(accum), Some(newval)) => combine(op, accum, newval),
    }
}

/// Merge `newval` into `accum` in place.
///
/// On overflow the wrapped total is still written and `Overflow` is
/// returned so the caller can raise the recheck status.
pub fn merge_datum(
    op: AggregateOp,
    accum: &mut AggDatum,
    newval: &AggDatum,
) -> Result<(), MergeError> {
    if accum.ty() != newval.ty() {
        return Err(MergeError::TypeMismatch {
            op,
            expected: accum.ty(),
            found: newval.ty(),
        });
    }
    let current = (!accum.isnull).then_some(accum.value);
    let incoming = (!newval.isnull).then_some(newval.value);
    let merged = merge_values(op, current, incoming)?;

    if let Some(value) = merged.value {
        accum.isnull = false;
        accum.value = value;
    }
    if merged.overflow {
        return Err(MergeError::Overflow { op, ty: accum.ty() });
    }

    Ok(())
}

/// Atomically merge one stored word into a shared cell.
///
/// Used by both team-local accumulators and destination buffer cells; the
/// retry loop re-derives the merge from the latest observed total.
pub fn merge_into_cell(
    op: AggregateOp,
    ty: AggType,
    cell: &AtomicDatum,
    newval: Option<u64>,
) -> Result<(), MergeError> {
    let Some(new_bits) = newval else {
        return Ok(());
    };
    let incoming = AggValue::from_bits(ty, new_bits);
    let mut overflow = false;

    cell.update(|current| {
        let current = current.map(|bits| AggValue::from_bits(ty, bits));
        let merged = merge_values(op, current, Some(incoming))?;
        overflow = merged.overflow;

        Ok(merged.value.map(AggValue::to_bits))
    })?;

    if overflow {
        return Err(MergeError::Overflow { op, ty });
    }

    Ok(())
}
