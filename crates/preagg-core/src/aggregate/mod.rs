//! Module: aggregate
//! Responsibility: the partial aggregate merge library.
//! Does not own: column roles, hashing, or reduction orchestration.
//! Boundary: kernels call into merges through plan dispatch tables.

#[cfg(test)]
mod tests;

mod datum;
mod kind;
mod merge;
pub mod numeric;

pub use datum::{AggDatum, AggValue};
pub use kind::{AggType, AggregateOp};
pub use merge::{MergeError, Merged, merge_datum, merge_into_cell, merge_values};
