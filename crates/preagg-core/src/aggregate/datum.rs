use crate::aggregate::{AggType, numeric::PackedNumeric};

///
/// AggValue
///
/// Typed view of one running total. Converts to and from the 64-bit word
/// stored in buffer cells.
///

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AggValue {
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Numeric(PackedNumeric),
}

impl AggValue {
    /// Zero of one running-total type.
    #[must_use]
    pub const fn zero(ty: AggType) -> Self {
        match ty {
            AggType::Int16 => Self::Int16(0),
            AggType::Int32 => Self::Int32(0),
            AggType::Int64 => Self::Int64(0),
            AggType::Float32 => Self::Float32(0.0),
            AggType::Float64 => Self::Float64(0.0),
            AggType::Numeric => Self::Numeric(PackedNumeric::ZERO),
        }
    }

    #[must_use]
    pub const fn ty(self) -> AggType {
        match self {
            Self::Int16(_) => AggType::Int16,
            Self::Int32(_) => AggType::Int32,
            Self::Int64(_) => AggType::Int64,
            Self::Float32(_) => AggType::Float32,
            Self::Float64(_) => AggType::Float64,
            Self::Numeric(_) => AggType::Numeric,
        }
    }

    /// Reinterpret one stored word as a value of `ty`.
    #[must_use]
    pub const fn from_bits(ty: AggType, bits: u64) -> Self {
        match ty {
            AggType::Int16 => Self::Int16(bits as u16 as i16),
            AggType::Int32 => Self::Int32(bits as u32 as i32),
            AggType::Int64 => Self::Int64(bits as i64),
            AggType::Float32 => Self::Float32(f32::from_bits(bits as u32)),
            AggType::Float64 => Self::Float64(f64::from_bits(bits)),
            AggType::Numeric => Self::Numeric(PackedNumeric::from_bits(bits)),
        }
    }

    /// Word written into buffer cells; narrow types are zero-extended.
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        match self {
            Self::Int16(v) => v as u16 as u64,
            Self::Int32(v) => v as u32 as u64,
            Self::Int64(v) => v as u64,
            Self::Float32(v) => v.to_bits() as u64,
            Self::Float64(v) => v.to_bits(),
            Self::Numeric(v) => v.to_bits(),
        }
    }
}

///
/// AggDatum
///
/// One accumulator cell: the owning group, a null flag, and the running
/// total. A null datum keeps a zero value of its type.
///

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AggDatum {
    pub group_id: u32,
    pub isnull: bool,
    pub value: AggValue,
}

impl AggDatum {
    /// Null datum for one running-total type.
    #[must_use]
    pub const fn null(ty: AggType) -> Self {
        Self {
            group_id: u32::MAX,
            isnull: true,
            value: AggValue::zero(ty),
        }
    }

    #[must_use]
    pub const fn new(value: AggValue) -> Self {
        Self {
            group_id: u32::MAX,
            isnull: false,
            value,
        }
    }

    /// Build a datum from an optional stored word.
    #[must_use]
    pub const fn from_bits(ty: AggType, bits: Option<u64>) -> Self {
        match bits {
            Some(bits) => Self::new(AggValue::from_bits(ty, bits)),
            None => Self::null(ty),
        }
    }

    /// Stored word, or `None` when null.
    #[must_use]
    pub const fn bits(&self) -> Option<u64> {
        if self.isnull {
            None
        } else {
            Some(self.value.to_bits())
        }
    }

    #[must_use]
    pub const fn with_group(mut self, group_id: u32) -> Self {
        self.group_id = group_id;
        self
    }

    #[must_use]
    pub const fn ty(&self) -> AggType {
        self.value.ty()
    }
}
