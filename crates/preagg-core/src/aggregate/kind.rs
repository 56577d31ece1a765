//! Module: aggregate::kind
//! Responsibility: aggregate operator and running-total type vocabulary.
//! Does not own: merge arithmetic or cell storage.
//! Boundary: shared by plans, kernels, and the merge library.

use crate::buffer::{ColumnType, ColumnWidth};
use derive_more::Display;
use serde::{Deserialize, Serialize};

///
/// AggregateOp
///
/// Partial aggregate operators the merge library can combine.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
pub enum AggregateOp {
    #[display("psum")]
    Sum,
    #[display("pmin")]
    Min,
    #[display("pmax")]
    Max,
}

///
/// AggType
///
/// Running-total representation held by one accumulator cell.
/// Every variant packs into one 64-bit word.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
pub enum AggType {
    #[display("int2")]
    Int16,
    #[display("int4")]
    Int32,
    #[display("int8")]
    Int64,
    #[display("float4")]
    Float32,
    #[display("float8")]
    Float64,
    #[display("numeric")]
    Numeric,
}

impl AggType {
    /// Resolve the running-total type that backs one column type.
    ///
    /// Variable-length columns never hold running totals.
    #[must_use]
    pub const fn for_column(column_type: ColumnType) -> Option<Self> {
        match column_type {
            ColumnType::Int16 => Some(Self::Int16),
            ColumnType::Int32 => Some(Self::Int32),
            ColumnType::Int64 => Some(Self::Int64),
            ColumnType::Float32 => Some(Self::Float32),
            ColumnType::Float64 => Some(Self::Float64),
            ColumnType::Numeric => Some(Self::Numeric),
            ColumnType::Text => None,
        }
    }

    /// Fixed storage width of this running total, in bytes.
    #[must_use]
    pub const fn width(self) -> ColumnWidth {
        match self {
            Self::Int16 => ColumnWidth::Fixed(2),
            Self::Int32 | Self::Float32 => ColumnWidth::Fixed(4),
            Self::Int64 | Self::Float64 | Self::Numeric => ColumnWidth::Fixed(8),
        }
    }
}
