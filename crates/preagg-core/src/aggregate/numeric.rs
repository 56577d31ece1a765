//! Module: aggregate::numeric
//! Responsibility: 64-bit packed decimal encoding plus its compare/add paths.
//! Does not own: null handling (callers merge non-null operands only).
//! Boundary: arbitrary-precision arithmetic is delegated to `rust_decimal`.

use rust_decimal::Decimal;
use std::cmp::Ordering;

const SCALE_SHIFT: u32 = 56;
const MANTISSA_BITS: u32 = 56;
const MANTISSA_MASK: u64 = (1 << MANTISSA_BITS) - 1;
const MANTISSA_MAX: i128 = (1 << (MANTISSA_BITS - 1)) - 1;
const MANTISSA_MIN: i128 = -(1 << (MANTISSA_BITS - 1));

/// Largest scale `rust_decimal` accepts.
pub const MAX_SCALE: u32 = 28;

///
/// PackedNumeric
///
/// Decimal squeezed into one word: the top 8 bits hold the scale and the
/// low 56 bits hold a two's complement mantissa.
///
/// Invariant: value == mantissa * 10^-scale, scale <= MAX_SCALE.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PackedNumeric(u64);

impl PackedNumeric {
    pub const ZERO: Self = Self(0);

    /// Pack one decimal, normalizing trailing zeros if the raw mantissa
    /// does not fit. Returns `None` when the value is out of range.
    #[must_use]
    pub fn encode(value: Decimal) -> Option<Self> {
        Self::pack(value).or_else(|| Self::pack(value.normalize()))
    }

    fn pack(value: Decimal) -> Option<Self> {
        let mantissa = value.mantissa();
        let scale = value.scale();
        if !(MANTISSA_MIN..=MANTISSA_MAX).contains(&mantissa) || scale > MAX_SCALE {
            return None;
        }
        let low = (mantissa as i64 as u64) & MANTISSA_MASK;

        Some(Self((u64::from(scale) << SCALE_SHIFT) | low))
    }

    /// Unpack into a decimal. Returns `None` for an invalid scale byte.
    #[must_use]
    pub fn decode(self) -> Option<Decimal> {
        let scale = (self.0 >> SCALE_SHIFT) as u32;
        if scale > MAX_SCALE {
            return None;
        }
        // sign-extend the 56-bit mantissa
        let mantissa = ((self.0 << (64 - MANTISSA_BITS)) as i64) >> (64 - MANTISSA_BITS);

        Decimal::try_from_i128_with_scale(i128::from(mantissa), scale).ok()
    }

    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }
}

///
/// NumericFault
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NumericFault {
    /// An operand carried an invalid encoding.
    Corrupt,
    /// The exact result does not fit the packed representation.
    Overflow,
}

/// Compare two packed decimals by value.
pub fn numeric_cmp(x: PackedNumeric, y: PackedNumeric) -> Result<Ordering, NumericFault> {
    let x = x.decode().ok_or(NumericFault::Corrupt)?;
    let y = y.decode().ok_or(NumericFault::Corrupt)?;

    Ok(x.cmp(&y))
}

/// Add two packed decimals exactly.
pub fn numeric_add(x: PackedNumeric, y: PackedNumeric) -> Result<PackedNumeric, NumericFault> {
    let x = x.decode().ok_or(NumericFault::Corrupt)?;
    let y = y.decode().ok_or(NumericFault::Corrupt)?;
    let sum = x.checked_add(y).ok_or(NumericFault::Overflow)?;

    PackedNumeric::encode(sum).ok_or(NumericFault::Overflow)
}
