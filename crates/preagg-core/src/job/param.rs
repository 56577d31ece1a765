//! Module: job::param
//! Responsibility: the constant parameter block and the field role map it carries.
//! Does not own: parameter interpretation beyond parameter 0.
//! Boundary: packed length feeds the job layout; roles feed the reductions.

use crate::{error::InternalError, job::layout::align_up};
use derive_more::{Deref, IntoIterator};
use serde::{Deserialize, Serialize};

/// Fixed parameter block header: declared length + parameter count.
pub const PARAM_HEADER_LEN: usize = 8;

/// Per-value length header, as carried by variable-length values.
pub const PARAM_VALUE_HEADER_LEN: usize = 4;

///
/// FieldRole
///
/// Usage of one destination column during reduction.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[repr(u8)]
pub enum FieldRole {
    /// Not referenced by the aggregate; copied verbatim.
    Null = 0,
    GroupKey = 1,
    AggFunc = 2,
}

impl FieldRole {
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Null),
            1 => Some(Self::GroupKey),
            2 => Some(Self::AggFunc),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_aggregate(self) -> bool {
        matches!(self, Self::AggFunc)
    }
}

///
/// FieldRoleMap
///

#[derive(Clone, Debug, Default, Deref, Eq, IntoIterator, PartialEq)]
pub struct FieldRoleMap(Vec<FieldRole>);

impl FieldRoleMap {
    #[must_use]
    pub const fn new(roles: Vec<FieldRole>) -> Self {
        Self(roles)
    }

    /// Decode from the one-byte-per-column wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self, InternalError> {
        bytes
            .iter()
            .enumerate()
            .map(|(col, byte)| {
                FieldRole::from_byte(*byte).ok_or_else(|| {
                    InternalError::layout_corruption(format!(
                        "field role byte {byte} at column {col} is not a known role"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.0.iter().map(|role| *role as u8).collect()
    }

    /// Reject role maps that disagree with the destination column count.
    pub fn ensure_columns(&self, ncols: usize) -> Result<(), InternalError> {
        if self.0.len() != ncols {
            return Err(InternalError::layout_corruption(format!(
                "field role map covers {} columns, destination has {ncols}",
                self.0.len()
            )));
        }

        Ok(())
    }
}

///
/// ParamBuf
///
/// Caller-supplied constant values. Parameter 0 is always the field role
/// map, encoded one byte per destination column.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParamBuf {
    values: Vec<Vec<u8>>,
}

impl ParamBuf {
    #[must_use]
    pub fn new(roles: &FieldRoleMap) -> Self {
        Self {
            values: vec![roles.encode()],
        }
    }

    /// Append one constant; returns its parameter index.
    pub fn push(&mut self, value: impl Into<Vec<u8>>) -> usize {
        self.values.push(value.into());
        self.values.len() - 1
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.values.get(index).map(Vec::as_slice)
    }

    #[must_use]
    pub fn nparams(&self) -> usize {
        self.values.len()
    }

    /// Decode parameter 0.
    pub fn field_roles(&self) -> Result<FieldRoleMap, InternalError> {
        let bytes = self
            .get(0)
            .ok_or_else(|| InternalError::layout_corruption("parameter block has no role map"))?;

        FieldRoleMap::decode(bytes)
    }

    /// Declared packed length: header, one offset per value, then each
    /// value with its length header, aligned.
    #[must_use]
    pub fn length(&self) -> usize {
        let offsets = 4 * self.values.len();
        let payload: usize = self
            .values
            .iter()
            .map(|value| align_up(PARAM_VALUE_HEADER_LEN + value.len()))
            .sum();

        align_up(PARAM_HEADER_LEN + offsets) + payload
    }
}
