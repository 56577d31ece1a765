//! Module: kernel
//! Responsibility: the per-thread bodies of every reduction stage and the
//! primitives they share (slot claims, typed cell moves, status writeback).
//! Does not own: launch geometry or thread management (see `team`).
//! Boundary: kernels never return errors; they raise into the job status.

#[cfg(test)]
mod tests;

mod data;
mod functions;
mod global;
mod local;
mod projection;
mod slot;
mod status;

pub use data::{data_load, data_load_agg, data_move, data_store, fixup_varlena};
pub use functions::{LookupTable, PreAggFunctions};
pub use global::{
    GlobalPreparationArgs, GlobalReductionArgs, global_preparation, global_reduction,
};
pub use local::{LocalReductionArgs, local_reduction};
pub use projection::{ProjectionArgs, projection};
pub use slot::{HashSlot, SlotTable};
pub use status::{ErrorSlot, KernelError, StatusChannel, StatusCode, writeback_status};
